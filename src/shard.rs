use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::arena::Arena;
use crate::error::{Error, Result};
use crate::list::{ListIter, ValueCursor};
use crate::stats::Stats;
use crate::store::{Store, StoreOptions};
use crate::table::{SharedList, Table};

/// Construction parameters shared by all shards of a map.
#[derive(Debug, Clone)]
pub struct ShardOptions {
    pub block_size: usize,
    pub buffer_size: usize,
    pub readonly: bool,
    pub create_if_missing: bool,
    pub error_if_exists: bool,
}

/// One independent concurrency domain of a map: a key table, a value store
/// and the arena owning the table's key bytes, all under one file prefix.
pub struct Shard {
    // The table's map keys point into the arena; keep the table first so it
    // drops before the arena does.
    table: Table,
    store: Store,
    arena: Arena,
    prefix: PathBuf,
}

/// A held shared lock plus a cursor over the locked list's values.
pub type Values<'a> = ListIter<'a, SharedList<'a>>;

fn path_with_suffix(prefix: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(prefix.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

pub fn keys_file(prefix: &Path) -> PathBuf {
    path_with_suffix(prefix, ".keys")
}

pub fn values_file(prefix: &Path) -> PathBuf {
    path_with_suffix(prefix, ".values")
}

pub fn stats_file(prefix: &Path) -> PathBuf {
    path_with_suffix(prefix, ".stats")
}

impl Shard {
    /// Opens the shard files under `prefix` (`<prefix>.keys`,
    /// `<prefix>.values`, `<prefix>.stats`).
    pub fn open(prefix: &Path, options: &ShardOptions) -> Result<Self> {
        let arena = Arena::new();
        let store = Store::open(
            values_file(prefix),
            &StoreOptions {
                block_size: options.block_size,
                buffer_size: options.buffer_size,
                readonly: options.readonly,
                create_if_missing: options.create_if_missing,
                error_if_exists: options.error_if_exists,
            },
        )?;
        let table = Table::open(&keys_file(prefix), &arena, options.readonly)?;
        Ok(Self { table, store, arena, prefix: prefix.to_path_buf() })
    }

    pub fn is_readonly(&self) -> bool {
        self.store.is_readonly()
    }

    pub fn block_size(&self) -> usize {
        self.store.block_size()
    }

    pub fn num_keys(&self) -> usize {
        self.table.num_keys()
    }

    /// Appends a value to the key's list, creating the list if needed.
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let mut list = self.table.get_unique_or_create(key, &self.arena)?;
        list.append(value, &self.store)
    }

    /// Cursor over the key's values, holding the shared list lock for the
    /// cursor's lifetime. None for an absent key.
    pub fn get(&self, key: &[u8]) -> Result<Option<Values<'_>>> {
        match self.table.get_shared(key)? {
            Some(guard) => Ok(Some(ListIter::new(guard, &self.store))),
            None => Ok(None),
        }
    }

    /// Whether the key holds at least one valid value.
    pub fn contains(&self, key: &[u8]) -> Result<bool> {
        match self.table.get_shared(key)? {
            Some(guard) => Ok(!guard.is_empty()),
            None => Ok(false),
        }
    }

    /// Drops all values of a key. Returns false if the key was absent or
    /// already empty.
    pub fn remove_key(&self, key: &[u8]) -> Result<bool> {
        if self.is_readonly() {
            return Err(Error::ReadOnly);
        }
        match self.table.get_unique(key)? {
            Some(mut guard) if !guard.is_empty() => {
                guard.clear();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Clears every list whose key matches the predicate.
    pub fn remove_keys<P: FnMut(&[u8]) -> bool>(&self, predicate: P) -> Result<u64> {
        self.table.remove_keys(predicate)
    }

    /// Flags matching values of a key as deleted. With `first_only`, stops
    /// after the first match. Returns the number of values removed.
    pub fn remove_values<P>(&self, key: &[u8], mut predicate: P, first_only: bool) -> Result<u64>
    where
        P: FnMut(&[u8]) -> bool,
    {
        if self.is_readonly() {
            return Err(Error::ReadOnly);
        }
        let Some(mut guard) = self.table.get_unique(key)? else {
            return Ok(0);
        };
        let mut num_removed = 0;
        let mut iter = guard.iter_mut(&self.store);
        while let Some(value) = iter.next()? {
            if predicate(value) {
                iter.mark_current_deleted()?;
                num_removed += 1;
                if first_only {
                    break;
                }
            }
        }
        iter.finish()?;
        Ok(num_removed)
    }

    /// Replaces matching values of a key: the old value is flagged deleted
    /// and the replacement appended at the end of the list. Returns the
    /// number of values replaced.
    pub fn replace_values<F>(&self, key: &[u8], mut map_fn: F, first_only: bool) -> Result<u64>
    where
        F: FnMut(&[u8]) -> Option<Vec<u8>>,
    {
        if self.is_readonly() {
            return Err(Error::ReadOnly);
        }
        let Some(mut guard) = self.table.get_unique(key)? else {
            return Ok(0);
        };
        let mut replacements = Vec::new();
        {
            let mut iter = guard.iter_mut(&self.store);
            while let Some(value) = iter.next()? {
                if let Some(replacement) = map_fn(value) {
                    replacements.push(replacement);
                    iter.mark_current_deleted()?;
                    if first_only {
                        break;
                    }
                }
            }
            iter.finish()?;
        }
        for value in &replacements {
            guard.append(value, &self.store)?;
        }
        Ok(replacements.len() as u64)
    }

    /// Calls `f` for every key with a non-empty list.
    pub fn for_each_key<F: FnMut(&[u8])>(&self, f: F) -> Result<()> {
        self.table.for_each_key(f)
    }

    /// Calls `f` for every valid value of the key, in list order.
    pub fn for_each_value<F: FnMut(&[u8])>(&self, key: &[u8], mut f: F) -> Result<()> {
        if let Some(mut values) = self.get(key)? {
            while let Some(value) = values.next()? {
                f(value);
            }
        }
        Ok(())
    }

    /// Calls `f` with each key and a cursor over its values, taking shared
    /// list locks one at a time.
    pub fn for_each_entry<F>(&self, f: F) -> Result<()>
    where
        F: FnMut(&[u8], &mut dyn ValueCursor) -> Result<()>,
    {
        self.table.for_each_entry(&self.store, f)
    }

    /// Scans the table for statistics.
    pub fn get_stats(&self) -> Result<Stats> {
        self.table.get_stats(&self.store)
    }

    /// Flushes all lists, persists the keys file and writes the stats
    /// snapshot next to it.
    pub fn close(&self) -> Result<()> {
        self.table.close(&self.store)?;
        if !self.is_readonly() {
            let stats = self.table.get_stats(&self.store)?;
            stats.write_to_file(stats_file(&self.prefix))?;
        }
        Ok(())
    }
}
