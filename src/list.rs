use std::io::{Read, Write};
use std::ops::{Deref, DerefMut};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::block::{self, Block};
use crate::error::{Error, Result};
use crate::store::Store;
use crate::uint_vector::UintVector;

/// Persisted descriptor of a key's value list.
#[derive(Debug, Default, Clone)]
pub struct Head {
    /// Cumulative append count; never decreases.
    pub num_values_total: u64,
    /// Cumulative count of entries flagged deleted; each entry counts once.
    pub num_values_removed: u64,
    /// Ids of committed blocks, in append order.
    pub block_ids: UintVector,
}

impl Head {
    pub fn num_values_valid(&self) -> u64 {
        debug_assert!(self.num_values_total >= self.num_values_removed);
        self.num_values_total - self.num_values_removed
    }

    pub fn serialize_into<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u64::<LittleEndian>(self.num_values_total)?;
        writer.write_u64::<LittleEndian>(self.num_values_removed)?;
        self.block_ids.serialize_into(writer)
    }

    pub fn deserialize_from<R: Read>(reader: &mut R) -> Result<Self> {
        let num_values_total = reader.read_u64::<LittleEndian>()?;
        let num_values_removed = reader.read_u64::<LittleEndian>()?;
        let block_ids = UintVector::deserialize_from(reader)?;
        if num_values_removed > num_values_total {
            return Err(Error::Corrupted(format!(
                "list head counts {num_values_removed} removed of {num_values_total} total"
            )));
        }
        Ok(Self { num_values_total, num_values_removed, block_ids })
    }
}

/// The value list of one key: committed blocks described by the head, plus
/// an in-memory tail block that appends fill.
///
/// A list never holds a reference to its store; every operation that touches
/// blocks receives the store at call time. Callers must hold the list's
/// unique lock for mutation and at least the shared lock for iteration.
#[derive(Debug, Default)]
pub struct List {
    head: Head,
    tail: Option<Block>,
}

impl List {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a list from its persisted head; the tail starts empty.
    pub fn from_head(head: Head) -> Self {
        Self { head, tail: None }
    }

    pub fn head(&self) -> &Head {
        &self.head
    }

    pub fn num_values_valid(&self) -> u64 {
        self.head.num_values_valid()
    }

    pub fn is_empty(&self) -> bool {
        self.head.num_values_valid() == 0
            && self.tail.as_ref().map_or(true, |tail| !tail.has_entries())
    }

    /// Appends a value, rotating the tail block into the store when full.
    pub fn append(&mut self, value: &[u8], store: &Store) -> Result<()> {
        let max = block::max_value_size(store.block_size());
        if value.len() > max {
            return Err(Error::ValueTooLarge { size: value.len(), max });
        }
        if self.tail.is_none() {
            self.tail = Some(Block::with_size(store.block_size()));
        }
        let tail = self.tail.as_mut().expect("tail was just ensured");
        if !tail.try_add(value) {
            tail.seal();
            let id = store.append(tail.bytes())?;
            self.head.block_ids.append(id)?;
            tail.reset();
            let added = tail.try_add(value);
            debug_assert!(added, "value must fit into an empty block");
        }
        self.head.num_values_total += 1;
        Ok(())
    }

    /// Seals the tail block into the store if it holds any entries.
    pub fn flush(&mut self, store: &Store) -> Result<()> {
        if let Some(tail) = self.tail.as_mut() {
            if tail.has_entries() {
                tail.seal();
                let id = store.append(tail.bytes())?;
                self.head.block_ids.append(id)?;
                tail.reset();
            }
        }
        Ok(())
    }

    /// Drops all values. Committed blocks stay in the store but are no
    /// longer referenced. Returns the number of values removed.
    pub fn clear(&mut self) -> u64 {
        let removed = self.head.num_values_valid();
        self.head.num_values_removed = self.head.num_values_total;
        self.head.block_ids = UintVector::new();
        self.tail = None;
        removed
    }

    /// Cursor over the valid values, committed blocks first, then the tail.
    pub fn iter<'a>(&'a self, store: &'a Store) -> ListIter<'a, &'a List> {
        ListIter::new(self, store)
    }

    /// Cursor that can additionally flag values as deleted in place.
    pub fn iter_mut<'a>(&'a mut self, store: &'a Store) -> ListIterMut<'a, &'a mut List> {
        ListIterMut::new(self, store)
    }
}

/// Read access to a value list, independent of how the list is borrowed:
/// directly, or through a held lock guard.
pub trait ValueCursor {
    /// Remaining not-yet-yielded valid values.
    fn available(&self) -> u64;

    fn has_next(&self) -> bool {
        self.available() != 0
    }

    /// The next non-deleted value, or None when the list is exhausted. The
    /// returned bytes stay valid only until the next call.
    fn next(&mut self) -> Result<Option<&[u8]>>;
}

/// Walk position shared by both iterator flavors.
#[derive(Debug, Default)]
struct Cursor {
    /// Index into the snapshotted block ids.
    block_index: usize,
    /// Decode offset within the current block or tail.
    pos: usize,
    /// The block at `block_index` is loaded into the iterator buffer.
    loaded: bool,
    /// The loaded block's last-entry marker was consumed.
    exhausted: bool,
    /// Committed blocks are done; `pos` now walks the tail.
    in_tail: bool,
}

/// Outcome of one cursor step. Stepping never does I/O itself; the caller
/// loads requested blocks so it can write back mutated ones first.
enum Step {
    /// Load `block_ids[index]` into the iterator buffer and step again.
    Load(usize),
    Entry(block::Entry, EntryPlace),
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryPlace {
    /// Index into the snapshotted block ids.
    Committed(usize),
    Tail,
}

/// Advances to the next non-deleted entry in the loaded block, the next
/// block to load, or the tail.
fn step_cursor(
    cursor: &mut Cursor,
    current_block: &[u8],
    num_blocks: usize,
    tail: Option<(&[u8], usize)>,
) -> Result<Step> {
    loop {
        if !cursor.in_tail && cursor.block_index < num_blocks {
            if !cursor.loaded {
                return Ok(Step::Load(cursor.block_index));
            }
            if cursor.exhausted {
                cursor.block_index += 1;
                cursor.loaded = false;
                continue;
            }
            let (entry, next_pos, is_last) =
                block::decode_entry(current_block, cursor.pos, current_block.len())?;
            cursor.pos = next_pos;
            if is_last {
                cursor.exhausted = true;
            } else if cursor.pos >= current_block.len() {
                return Err(Error::Corrupted("stored block has no last-entry marker".into()));
            }
            if entry.deleted {
                continue;
            }
            return Ok(Step::Entry(entry, EntryPlace::Committed(cursor.block_index)));
        }

        let Some((tail_data, tail_end)) = tail else { return Ok(Step::End) };
        if !cursor.in_tail {
            cursor.in_tail = true;
            cursor.pos = 0;
        }
        if cursor.pos >= tail_end {
            return Ok(Step::End);
        }
        let (entry, next_pos, _) = block::decode_entry(tail_data, cursor.pos, tail_end)?;
        cursor.pos = next_pos;
        if entry.deleted {
            continue;
        }
        return Ok(Step::Entry(entry, EntryPlace::Tail));
    }
}

/// Shared read cursor. Values yielded by [`next`](ValueCursor::next) borrow
/// the iterator's block buffer and stay valid only until the next call.
///
/// `L` is how the list is reached: a plain `&List`, or an owning lock guard
/// so the cursor keeps the list locked for its whole lifetime.
pub struct ListIter<'s, L: Deref<Target = List>> {
    store: &'s Store,
    list: L,
    block_ids: Vec<u32>,
    available: u64,
    cursor: Cursor,
    current_block: Vec<u8>,
}

impl<'s, L: Deref<Target = List>> ListIter<'s, L> {
    pub fn new(list: L, store: &'s Store) -> Self {
        let block_ids = list.head.block_ids.unpack();
        let available = list.head.num_values_valid();
        Self {
            store,
            list,
            block_ids,
            available,
            cursor: Cursor::default(),
            current_block: Vec::new(),
        }
    }

    pub fn available(&self) -> u64 {
        self.available
    }

    pub fn has_next(&self) -> bool {
        self.available != 0
    }

    /// The next non-deleted value, or None when the list is exhausted.
    pub fn next(&mut self) -> Result<Option<&[u8]>> {
        loop {
            let tail = self
                .list
                .tail
                .as_ref()
                .map(|tail| (tail.bytes(), tail.write_offset()));
            match step_cursor(&mut self.cursor, &self.current_block, self.block_ids.len(), tail)? {
                Step::Load(index) => {
                    if self.current_block.len() != self.store.block_size() {
                        self.current_block.resize(self.store.block_size(), 0);
                    }
                    self.store.read(self.block_ids[index], &mut self.current_block)?;
                    self.cursor.loaded = true;
                    self.cursor.exhausted = false;
                    self.cursor.pos = 0;
                }
                Step::Entry(entry, EntryPlace::Committed(_)) => {
                    self.available -= 1;
                    return Ok(Some(&self.current_block[entry.value_range()]));
                }
                Step::Entry(entry, EntryPlace::Tail) => {
                    self.available -= 1;
                    let tail = self.list.tail.as_ref().expect("entry came from the tail");
                    return Ok(Some(&tail.bytes()[entry.value_range()]));
                }
                Step::End => return Ok(None),
            }
        }
    }
}

impl<L: Deref<Target = List>> ValueCursor for ListIter<'_, L> {
    fn available(&self) -> u64 {
        self.available
    }

    fn next(&mut self) -> Result<Option<&[u8]>> {
        ListIter::next(self)
    }
}

/// Exclusive cursor that can mark the value it last yielded as deleted.
///
/// Committed blocks whose flags changed are written back through the store
/// when the cursor moves past them; the write-back for the final block
/// happens on drop, or earlier via [`finish`](Self::finish) for callers who
/// want the I/O error.
pub struct ListIterMut<'s, L: DerefMut<Target = List>> {
    store: &'s Store,
    list: L,
    block_ids: Vec<u32>,
    available: u64,
    cursor: Cursor,
    current_block: Vec<u8>,
    /// Which committed block occupies `current_block`.
    loaded_index: Option<usize>,
    current_dirty: bool,
    current_entry: Option<(block::Entry, EntryPlace)>,
}

impl<'s, L: DerefMut<Target = List>> ListIterMut<'s, L> {
    pub fn new(list: L, store: &'s Store) -> Self {
        let block_ids = list.head.block_ids.unpack();
        let available = list.head.num_values_valid();
        Self {
            store,
            list,
            block_ids,
            available,
            cursor: Cursor::default(),
            current_block: Vec::new(),
            loaded_index: None,
            current_dirty: false,
            current_entry: None,
        }
    }

    pub fn available(&self) -> u64 {
        self.available
    }

    pub fn has_next(&self) -> bool {
        self.available != 0
    }

    pub fn next(&mut self) -> Result<Option<&[u8]>> {
        loop {
            let tail = self
                .list
                .tail
                .as_ref()
                .map(|tail| (tail.bytes(), tail.write_offset()));
            let step =
                step_cursor(&mut self.cursor, &self.current_block, self.block_ids.len(), tail)?;
            match step {
                Step::Load(index) => {
                    // The buffer is about to be overwritten; persist any
                    // flag changes made to the block it still holds.
                    self.write_back_loaded()?;
                    if self.current_block.len() != self.store.block_size() {
                        self.current_block.resize(self.store.block_size(), 0);
                    }
                    self.store.read(self.block_ids[index], &mut self.current_block)?;
                    self.loaded_index = Some(index);
                    self.cursor.loaded = true;
                    self.cursor.exhausted = false;
                    self.cursor.pos = 0;
                }
                Step::Entry(entry, place) => {
                    self.current_entry = Some((entry, place));
                    self.available -= 1;
                    return match place {
                        EntryPlace::Committed(_) => {
                            Ok(Some(&self.current_block[entry.value_range()]))
                        }
                        EntryPlace::Tail => {
                            let tail =
                                self.list.tail.as_ref().expect("entry came from the tail");
                            Ok(Some(&tail.bytes()[entry.value_range()]))
                        }
                    };
                }
                Step::End => {
                    self.current_entry = None;
                    return Ok(None);
                }
            }
        }
    }

    /// Flags the value returned by the last `next` call as deleted. Calling
    /// it again for the same value has no further effect.
    pub fn mark_current_deleted(&mut self) -> Result<()> {
        let Some((entry, place)) = self.current_entry else {
            return Err(Error::Precondition(
                "mark_current_deleted requires a preceding next".into(),
            ));
        };
        match place {
            EntryPlace::Committed(_) => {
                if self.current_block[entry.flags_offset] & block::FLAG_DELETED == 0 {
                    self.current_block[entry.flags_offset] |= block::FLAG_DELETED;
                    self.current_dirty = true;
                    self.list.head.num_values_removed += 1;
                }
            }
            EntryPlace::Tail => {
                let tail = self.list.tail.as_mut().expect("entry came from the tail");
                if !tail.is_deleted(entry.flags_offset) {
                    tail.set_deleted(entry.flags_offset);
                    self.list.head.num_values_removed += 1;
                }
            }
        }
        Ok(())
    }

    /// Writes back a dirty current block and consumes the cursor. Preferred
    /// over plain drop when the caller wants the error.
    pub fn finish(mut self) -> Result<()> {
        self.write_back_loaded()
    }

    fn write_back_loaded(&mut self) -> Result<()> {
        if self.current_dirty {
            if let Some(index) = self.loaded_index {
                self.store.write(self.block_ids[index], &self.current_block)?;
            }
            self.current_dirty = false;
        }
        Ok(())
    }
}

impl<L: DerefMut<Target = List>> ValueCursor for ListIterMut<'_, L> {
    fn available(&self) -> u64 {
        self.available
    }

    fn next(&mut self) -> Result<Option<&[u8]>> {
        ListIterMut::next(self)
    }
}

impl<L: DerefMut<Target = List>> Drop for ListIterMut<'_, L> {
    fn drop(&mut self) {
        if let Err(err) = self.write_back_loaded() {
            tracing::error!(error = %err, "failed to write back a mutated block");
        }
    }
}
