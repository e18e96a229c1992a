use std::cell::UnsafeCell;
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use itertools::Itertools;

use crate::arena::{Arena, ArenaSlice};
use crate::error::{Error, Result};
use crate::list::{Head, List, ValueCursor};
use crate::lock::{LockRegistry, LockToken};
use crate::stats::Stats;
use crate::store::{AccessPattern, Store};

/// Keys longer than this cannot be stored; the keys file encodes key
/// lengths as u16.
pub const MAX_KEY_SIZE: usize = u16::MAX as usize;

/// One list slot in the table. The list body lives in an `UnsafeCell`
/// because its reader/writer lock is materialized on demand in the lock
/// registry rather than sitting next to the data.
struct Slot {
    id: u64,
    list: UnsafeCell<List>,
}

// Safety: the cell is only dereferenced through Shared/UniqueList guards,
// which hold the registry lock for `id` in the matching mode.
unsafe impl Send for Slot {}
unsafe impl Sync for Slot {}

/// Mapping from keys to lists, with per-list lock arbitration.
///
/// The map structure is guarded by one reader/writer lock; each list is
/// guarded by its own lazily materialized lock in the registry. Lookups
/// clone the slot out under the map lock and block on the list lock only
/// after releasing it.
pub struct Table {
    map: RwLock<HashMap<ArenaSlice, Arc<Slot>>>,
    locks: LockRegistry,
    next_list_id: AtomicU64,
    path: PathBuf,
    readonly: bool,
}

impl Table {
    /// Opens the keys file at `path`, loading every entry; keys are copied
    /// into `arena`. A missing file is created empty unless `readonly`.
    pub fn open(path: &Path, arena: &Arena, readonly: bool) -> Result<Self> {
        let mut map = HashMap::new();
        let mut next_list_id = 0u64;

        if path.is_file() {
            let file = OpenOptions::new().read(true).open(path)?;
            let mut reader = BufReader::new(file);
            let num_entries = reader.read_u32::<LittleEndian>()?;
            for _ in 0..num_entries {
                let (key, head) = read_entry(&mut reader, arena)?;
                let slot = Arc::new(Slot {
                    id: next_list_id,
                    list: UnsafeCell::new(List::from_head(head)),
                });
                next_list_id += 1;
                if map.insert(key, slot).is_some() {
                    return Err(Error::Corrupted(format!(
                        "duplicate key in {}",
                        path.display()
                    )));
                }
            }
        } else if readonly {
            return Err(Error::Io(format!("no such keys file: {}", path.display())));
        } else {
            let file = OpenOptions::new().create(true).write(true).open(path)?;
            let mut writer = BufWriter::new(file);
            writer.write_u32::<LittleEndian>(0)?;
            writer.flush()?;
        }

        Ok(Self {
            map: RwLock::new(map),
            locks: LockRegistry::new(),
            next_list_id: AtomicU64::new(next_list_id),
            path: path.to_path_buf(),
            readonly,
        })
    }

    pub fn is_readonly(&self) -> bool {
        self.readonly
    }

    pub fn num_keys(&self) -> usize {
        self.map.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Shared lock on the key's list, or None for an absent key.
    pub fn get_shared(&self, key: &[u8]) -> Result<Option<SharedList<'_>>> {
        let slot = {
            let map = self.map.read()?;
            match map.get(key) {
                Some(slot) => Arc::clone(slot),
                None => return Ok(None),
            }
        };
        Ok(Some(self.lock_shared_slot(slot)))
    }

    /// Unique lock on the key's list, or None for an absent key.
    pub fn get_unique(&self, key: &[u8]) -> Result<Option<UniqueList<'_>>> {
        let slot = {
            let map = self.map.read()?;
            match map.get(key) {
                Some(slot) => Arc::clone(slot),
                None => return Ok(None),
            }
        };
        Ok(Some(self.lock_unique_slot(slot)))
    }

    /// Unique lock on the key's list, inserting an empty list first if the
    /// key is absent. The key is copied into the arena on insert so the map
    /// never points at caller memory.
    pub fn get_unique_or_create(&self, key: &[u8], arena: &Arena) -> Result<UniqueList<'_>> {
        if self.readonly {
            return Err(Error::ReadOnly);
        }
        if key.len() > MAX_KEY_SIZE {
            return Err(Error::KeyTooLarge(key.len()));
        }

        // Fast path under the shared map lock.
        let existing = {
            let map = self.map.read()?;
            map.get(key).map(Arc::clone)
        };
        if let Some(slot) = existing {
            return Ok(self.lock_unique_slot(slot));
        }

        let slot = {
            let mut map = self.map.write()?;
            // A racing writer may have inserted the key meanwhile.
            if let Some(slot) = map.get(key) {
                Arc::clone(slot)
            } else {
                let owned = arena.store(key);
                let slot = Arc::new(Slot {
                    id: self.next_list_id.fetch_add(1, Ordering::Relaxed),
                    list: UnsafeCell::new(List::new()),
                });
                map.insert(owned, Arc::clone(&slot));
                slot
            }
        };
        Ok(self.lock_unique_slot(slot))
    }

    /// Calls `f` for every key whose list is non-empty. Lists whose lock
    /// cannot be taken without blocking are skipped.
    pub fn for_each_key<F: FnMut(&[u8])>(&self, mut f: F) -> Result<()> {
        let map = self.map.read()?;
        for (key, slot) in map.iter() {
            if let Some(guard) = self.try_lock_shared_slot(slot) {
                if !guard.is_empty() {
                    f(key.as_bytes());
                }
            }
        }
        Ok(())
    }

    /// Clears every non-empty list whose key matches `predicate`. Returns
    /// the number of keys cleared.
    pub fn remove_keys<P: FnMut(&[u8]) -> bool>(&self, mut predicate: P) -> Result<u64> {
        if self.readonly {
            return Err(Error::ReadOnly);
        }
        let map = self.map.read()?;
        let mut num_removed = 0;
        for (key, slot) in map.iter() {
            if predicate(key.as_bytes()) {
                let mut guard = self.lock_unique_slot(Arc::clone(slot));
                if !guard.is_empty() {
                    guard.clear();
                    num_removed += 1;
                }
            }
        }
        Ok(num_removed)
    }

    /// Calls `f` with a value cursor for every non-empty list, one shared
    /// list lock at a time.
    pub fn for_each_entry<F>(&self, store: &Store, mut f: F) -> Result<()>
    where
        F: FnMut(&[u8], &mut dyn ValueCursor) -> Result<()>,
    {
        let map = self.map.read()?;
        store.advise_access_pattern(AccessPattern::Sequential);
        let result = (|| -> Result<()> {
            for (key, slot) in map.iter() {
                let guard = self.lock_shared_slot(Arc::clone(slot));
                if !guard.is_empty() {
                    let mut iter = guard.iter(store);
                    f(key.as_bytes(), &mut iter)?;
                }
            }
            Ok(())
        })();
        store.advise_access_pattern(AccessPattern::Normal);
        result
    }

    /// Scans the table for statistics. Lists that cannot be try-locked are
    /// counted in `num_lists_locked` and excluded from the size figures.
    pub fn get_stats(&self, store: &Store) -> Result<Stats> {
        let map = self.map.read()?;
        let mut stats = Stats {
            block_size: store.block_size() as u64,
            num_blocks: u64::from(store.num_blocks()),
            num_keys: map.len() as u64,
            ..Stats::default()
        };
        let mut key_sizes = Vec::with_capacity(map.len());
        let mut list_sizes = Vec::new();
        for (key, slot) in map.iter() {
            key_sizes.push(key.len() as u64);
            match self.try_lock_shared_slot(slot) {
                Some(guard) => {
                    if guard.is_empty() {
                        stats.num_lists_empty += 1;
                    } else {
                        list_sizes.push(guard.num_values_valid());
                    }
                    stats.num_values_total += guard.head().num_values_total;
                    stats.num_values_removed += guard.head().num_values_removed;
                }
                None => stats.num_lists_locked += 1,
            }
        }
        match key_sizes.iter().minmax() {
            itertools::MinMaxResult::NoElements => {}
            itertools::MinMaxResult::OneElement(&only) => {
                stats.key_size_min = only;
                stats.key_size_max = only;
            }
            itertools::MinMaxResult::MinMax(&min, &max) => {
                stats.key_size_min = min;
                stats.key_size_max = max;
            }
        }
        match list_sizes.iter().minmax() {
            itertools::MinMaxResult::NoElements => {}
            itertools::MinMaxResult::OneElement(&only) => {
                stats.list_size_min = only;
                stats.list_size_max = only;
            }
            itertools::MinMaxResult::MinMax(&min, &max) => {
                stats.list_size_min = min;
                stats.list_size_max = max;
            }
        }
        if stats.num_keys != 0 {
            stats.key_size_avg = key_sizes.iter().sum::<u64>() / stats.num_keys;
            // The average is over raw append counts, deleted values included;
            // only min/max describe the currently valid sizes.
            stats.list_size_avg = stats.num_values_total / stats.num_keys;
        }
        Ok(stats)
    }

    /// Flushes every list and rewrites the keys file.
    ///
    /// Each list is try-locked: lists still held by others are skipped with
    /// a warning, losing their unflushed tail but no committed blocks. The
    /// new file is written to `<path>.new`, the store is synced so every
    /// referenced block is on disk, and the rename makes the result visible
    /// atomically.
    pub fn close(&self, store: &Store) -> Result<()> {
        if self.readonly {
            return Ok(());
        }
        let map = self.map.read()?;

        let tmp_path = self.path.with_extension("keys.new");
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        writer.write_u32::<LittleEndian>(0)?;

        let mut num_written = 0u32;
        for (key, slot) in map.iter() {
            match self.locks.try_lock_unique(slot.id) {
                Some(token) => {
                    // Safety: the unique token for this slot is held.
                    let list = unsafe { &mut *slot.list.get() };
                    let flushed = list.flush(store);
                    let entry = flushed.and_then(|()| {
                        if list.is_empty() {
                            Ok(false)
                        } else {
                            write_entry(&mut writer, key.as_bytes(), list.head())?;
                            Ok(true)
                        }
                    });
                    token.release(&self.locks);
                    match entry {
                        Ok(true) => num_written += 1,
                        Ok(false) => {}
                        Err(err) => {
                            tracing::warn!(error = %err, key = ?key, "failed to flush list on close");
                        }
                    }
                }
                None => {
                    tracing::warn!(key = ?key, "list still locked on close, tail not persisted");
                }
            }
        }

        writer.seek(SeekFrom::Start(0))?;
        writer.write_u32::<LittleEndian>(num_written)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;

        // Referenced blocks must hit the store file before the keys file
        // rename commits to them.
        store.sync()?;
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    fn lock_shared_slot(&self, slot: Arc<Slot>) -> SharedList<'_> {
        let token = self.locks.lock_shared(slot.id);
        SharedList { slot, token: Some(token), registry: &self.locks }
    }

    fn try_lock_shared_slot(&self, slot: &Arc<Slot>) -> Option<SharedList<'_>> {
        let token = self.locks.try_lock_shared(slot.id)?;
        Some(SharedList { slot: Arc::clone(slot), token: Some(token), registry: &self.locks })
    }

    fn lock_unique_slot(&self, slot: Arc<Slot>) -> UniqueList<'_> {
        let token = self.locks.lock_unique(slot.id);
        UniqueList { slot, token: Some(token), registry: &self.locks }
    }
}

/// A held shared lock on one list; derefs to the list.
pub struct SharedList<'a> {
    slot: Arc<Slot>,
    token: Option<LockToken>,
    registry: &'a LockRegistry,
}

impl Deref for SharedList<'_> {
    type Target = List;

    fn deref(&self) -> &List {
        // Safety: a shared token for this slot is held, so no unique holder
        // can mutate the list concurrently.
        unsafe { &*self.slot.list.get() }
    }
}

impl Drop for SharedList<'_> {
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            token.release(self.registry);
        }
    }
}

/// A held unique lock on one list; derefs mutably to the list.
pub struct UniqueList<'a> {
    slot: Arc<Slot>,
    token: Option<LockToken>,
    registry: &'a LockRegistry,
}

impl Deref for UniqueList<'_> {
    type Target = List;

    fn deref(&self) -> &List {
        // Safety: the unique token for this slot is held.
        unsafe { &*self.slot.list.get() }
    }
}

impl DerefMut for UniqueList<'_> {
    fn deref_mut(&mut self) -> &mut List {
        // Safety: the unique token for this slot is held.
        unsafe { &mut *self.slot.list.get() }
    }
}

impl Drop for UniqueList<'_> {
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            token.release(self.registry);
        }
    }
}

fn read_entry<R: Read>(reader: &mut R, arena: &Arena) -> Result<(ArenaSlice, Head)> {
    let key_len = reader.read_u16::<LittleEndian>()? as usize;
    let mut key = vec![0u8; key_len];
    reader.read_exact(&mut key)?;
    let head = Head::deserialize_from(reader)?;
    Ok((arena.store(&key), head))
}

fn write_entry<W: Write>(writer: &mut W, key: &[u8], head: &Head) -> Result<()> {
    writer.write_u16::<LittleEndian>(key.len() as u16)?;
    writer.write_all(key)?;
    head.serialize_into(writer)
}
