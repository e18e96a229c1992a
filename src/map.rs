use std::fs::OpenOptions;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::block;
use crate::error::{Error, Result};
use crate::flock::DirectoryLock;
use crate::hasher::fnv1a_64;
use crate::list::ValueCursor;
use crate::options::Options;
use crate::shard::{self, Shard, ShardOptions};
use crate::stats::Stats;
use crate::table::MAX_KEY_SIZE;

/// Major version of the on-disk format; maps written by a different major
/// version cannot be opened.
pub const MAJOR_VERSION: u64 = 0;
/// Minor version; maps written by a newer minor version cannot be opened.
pub const MINOR_VERSION: u64 = 1;

const FILE_PREFIX: &str = "multimap";

fn lock_file(dir: &Path) -> PathBuf {
    dir.join(format!("{FILE_PREFIX}.lock"))
}

fn id_file(dir: &Path) -> PathBuf {
    dir.join(format!("{FILE_PREFIX}.id"))
}

fn shard_prefix(dir: &Path, index: usize) -> PathBuf {
    dir.join(format!("{FILE_PREFIX}.{index}"))
}

/// The 32-byte id file fixing a map's creation-time parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MapId {
    block_size: u64,
    num_partitions: u64,
    major_version: u64,
    minor_version: u64,
}

impl MapId {
    fn read_from_file(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().read(true).open(path)?;
        let mut reader = BufReader::new(file);
        let id = Self {
            block_size: reader.read_u64::<LittleEndian>()?,
            num_partitions: reader.read_u64::<LittleEndian>()?,
            major_version: reader.read_u64::<LittleEndian>()?,
            minor_version: reader.read_u64::<LittleEndian>()?,
        };
        if id.block_size == 0 || id.num_partitions == 0 {
            return Err(Error::Corrupted(format!("bad id file: {}", path.display())));
        }
        Ok(id)
    }

    fn write_to_file(&self, path: &Path) -> Result<()> {
        let file = OpenOptions::new().create(true).write(true).truncate(true).open(path)?;
        let mut writer = BufWriter::new(file);
        writer.write_u64::<LittleEndian>(self.block_size)?;
        writer.write_u64::<LittleEndian>(self.num_partitions)?;
        writer.write_u64::<LittleEndian>(self.major_version)?;
        writer.write_u64::<LittleEndian>(self.minor_version)?;
        writer.into_inner().map_err(|e| Error::Io(e.to_string()))?.sync_all()?;
        Ok(())
    }

    fn check_version(&self) -> Result<()> {
        if self.major_version != MAJOR_VERSION || self.minor_version > MINOR_VERSION {
            return Err(Error::VersionMismatch {
                found: (self.major_version, self.minor_version),
                expected: (MAJOR_VERSION, MINOR_VERSION),
            });
        }
        Ok(())
    }
}

/// A persistent map from byte keys to ordered lists of byte values.
///
/// Keys are hashed onto a fixed number of shards, each an independent
/// concurrency domain with its own files. All methods take `&self` and are
/// safe to call from any number of threads. The directory is protected by
/// an exclusive OS file lock for the lifetime of the map.
pub struct Map {
    shards: Vec<Shard>,
    dir: PathBuf,
    block_size: usize,
    quiet: bool,
    closed: bool,
    // Held last so the directory stays locked through shard teardown.
    _lock: DirectoryLock,
}

impl Map {
    /// Opens the map in `dir` with default [`Options`].
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        Self::open_with(dir, Options::default())
    }

    /// Opens or creates the map in `dir`.
    pub fn open_with<P: AsRef<Path>>(dir: P, options: Options) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        if !dir.is_dir() {
            if !options.create_if_missing {
                return Err(Error::Io(format!("no such directory: {}", dir.display())));
            }
            std::fs::create_dir_all(&dir)?;
        }
        let lock = DirectoryLock::acquire(lock_file(&dir))?;

        let id_path = id_file(&dir);
        let id = if id_path.is_file() {
            if options.error_if_exists {
                return Err(Error::Precondition(format!(
                    "map already exists in {}",
                    dir.display()
                )));
            }
            let id = MapId::read_from_file(&id_path)?;
            id.check_version()?;
            id
        } else {
            if !options.create_if_missing {
                return Err(Error::Io(format!("no map in directory: {}", dir.display())));
            }
            if options.readonly {
                return Err(Error::ReadOnly);
            }
            options.validate()?;
            let id = MapId {
                block_size: options.block_size as u64,
                num_partitions: options.num_partitions as u64,
                major_version: MAJOR_VERSION,
                minor_version: MINOR_VERSION,
            };
            id.write_to_file(&id_path)?;
            id
        };

        let shard_options = ShardOptions {
            block_size: id.block_size as usize,
            buffer_size: options.buffer_size.max(id.block_size as usize),
            readonly: options.readonly,
            create_if_missing: options.create_if_missing,
            error_if_exists: options.error_if_exists,
        };
        let mut shards = Vec::with_capacity(id.num_partitions as usize);
        for index in 0..id.num_partitions as usize {
            shards.push(Shard::open(&shard_prefix(&dir, index), &shard_options)?);
        }

        if !options.quiet {
            tracing::info!(
                dir = %dir.display(),
                num_partitions = shards.len(),
                block_size = id.block_size,
                readonly = options.readonly,
                "opened multimap"
            );
        }
        Ok(Self {
            shards,
            dir,
            block_size: id.block_size as usize,
            quiet: options.quiet,
            closed: false,
            _lock: lock,
        })
    }

    fn shard(&self, key: &[u8]) -> &Shard {
        let index = (fnv1a_64(key) % self.shards.len() as u64) as usize;
        &self.shards[index]
    }

    pub fn is_readonly(&self) -> bool {
        self.shards[0].is_readonly()
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn num_partitions(&self) -> usize {
        self.shards.len()
    }

    /// Largest storable key, in bytes.
    pub fn max_key_size(&self) -> usize {
        MAX_KEY_SIZE
    }

    /// Largest storable value for this map's block size, in bytes.
    pub fn max_value_size(&self) -> usize {
        block::max_value_size(self.block_size)
    }

    /// Appends a value to the key's list.
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.shard(key).put(key, value)
    }

    /// Cursor over the key's values in insertion order. The cursor holds a
    /// shared lock on the list; an absent key yields an empty cursor.
    pub fn get(&self, key: &[u8]) -> Result<Values<'_>> {
        Ok(Values { inner: self.shard(key).get(key)? })
    }

    /// Whether the key holds at least one valid value.
    pub fn contains(&self, key: &[u8]) -> Result<bool> {
        self.shard(key).contains(key)
    }

    /// Drops all values of the key. Returns false for an absent or already
    /// empty key.
    pub fn remove_key(&self, key: &[u8]) -> Result<bool> {
        self.shard(key).remove_key(key)
    }

    /// Clears every list whose key matches the predicate; returns the
    /// number of keys cleared.
    pub fn remove_keys<P: FnMut(&[u8]) -> bool>(&self, mut predicate: P) -> Result<u64> {
        let mut num_removed = 0;
        for shard in &self.shards {
            num_removed += shard.remove_keys(&mut predicate)?;
        }
        Ok(num_removed)
    }

    /// Removes the first value matching the predicate from the key's list.
    pub fn remove_value<P: FnMut(&[u8]) -> bool>(&self, key: &[u8], predicate: P) -> Result<bool> {
        Ok(self.shard(key).remove_values(key, predicate, true)? != 0)
    }

    /// Removes every value matching the predicate from the key's list;
    /// returns how many were removed.
    pub fn remove_values<P: FnMut(&[u8]) -> bool>(&self, key: &[u8], predicate: P) -> Result<u64> {
        self.shard(key).remove_values(key, predicate, false)
    }

    /// Replaces the first value for which `map_fn` returns a replacement.
    /// The replacement is appended at the end of the list.
    pub fn replace_value<F>(&self, key: &[u8], map_fn: F) -> Result<bool>
    where
        F: FnMut(&[u8]) -> Option<Vec<u8>>,
    {
        Ok(self.shard(key).replace_values(key, map_fn, true)? != 0)
    }

    /// Replaces every value for which `map_fn` returns a replacement;
    /// returns how many were replaced.
    pub fn replace_values<F>(&self, key: &[u8], map_fn: F) -> Result<u64>
    where
        F: FnMut(&[u8]) -> Option<Vec<u8>>,
    {
        self.shard(key).replace_values(key, map_fn, false)
    }

    /// Replaces the first occurrence of `old_value` with `new_value`.
    pub fn replace_first_equal(&self, key: &[u8], old_value: &[u8], new_value: &[u8]) -> Result<bool> {
        self.replace_value(key, |value| (value == old_value).then(|| new_value.to_vec()))
    }

    /// Replaces every occurrence of `old_value` with `new_value`.
    pub fn replace_all_equal(&self, key: &[u8], old_value: &[u8], new_value: &[u8]) -> Result<u64> {
        self.replace_values(key, |value| (value == old_value).then(|| new_value.to_vec()))
    }

    /// Calls `f` for every key with a non-empty list, across all shards.
    pub fn for_each_key<F: FnMut(&[u8])>(&self, mut f: F) -> Result<()> {
        for shard in &self.shards {
            shard.for_each_key(&mut f)?;
        }
        Ok(())
    }

    /// Calls `f` for every valid value of the key, in list order.
    pub fn for_each_value<F: FnMut(&[u8])>(&self, key: &[u8], f: F) -> Result<()> {
        self.shard(key).for_each_value(key, f)
    }

    /// Calls `f` with each key and a cursor over its values. Shards are
    /// visited in order; within a shard, one shared list lock is held at a
    /// time.
    pub fn for_each_entry<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(&[u8], &mut dyn ValueCursor) -> Result<()>,
    {
        for shard in &self.shards {
            shard.for_each_entry(&mut f)?;
        }
        Ok(())
    }

    /// Statistics per shard; triggers a full scan of each.
    pub fn stats_per_shard(&self) -> Result<Vec<Stats>> {
        self.shards.iter().map(Shard::get_stats).collect()
    }

    /// Aggregated statistics over all shards.
    pub fn stats(&self) -> Result<Stats> {
        Ok(Stats::total(&self.stats_per_shard()?))
    }

    /// Flushes and persists every shard, then releases the directory.
    /// Errors are reported after all shards have been attempted.
    pub fn close(mut self) -> Result<()> {
        self.close_inner()
    }

    fn close_inner(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let mut first_error = None;
        for shard in &self.shards {
            if let Err(err) = shard.close() {
                tracing::warn!(error = %err, "failed to close shard");
                first_error.get_or_insert(err);
            }
        }
        if !self.quiet {
            tracing::info!(dir = %self.dir.display(), "closed multimap");
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl Drop for Map {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(err) = self.close_inner() {
                tracing::error!(error = %err, "failed to close multimap on drop");
            }
        }
    }
}

/// Cursor over one key's values, holding the list's shared lock. An absent
/// key yields an exhausted cursor.
pub struct Values<'a> {
    inner: Option<shard::Values<'a>>,
}

impl Values<'_> {
    pub fn available(&self) -> u64 {
        self.inner.as_ref().map_or(0, |iter| iter.available())
    }

    pub fn has_next(&self) -> bool {
        self.available() != 0
    }

    /// The next value; borrowed bytes stay valid until the next call.
    pub fn next(&mut self) -> Result<Option<&[u8]>> {
        match self.inner.as_mut() {
            Some(iter) => iter.next(),
            None => Ok(None),
        }
    }
}

impl ValueCursor for Values<'_> {
    fn available(&self) -> u64 {
        Values::available(self)
    }

    fn next(&mut self) -> Result<Option<&[u8]>> {
        Values::next(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    fn create_options() -> Options {
        Options::new().create_if_missing(true).num_partitions(4).quiet(true)
    }

    fn collect(map: &Map, key: &[u8]) -> Vec<Vec<u8>> {
        let mut values = map.get(key).unwrap();
        let mut out = Vec::new();
        while let Some(value) = values.next().unwrap() {
            out.push(value.to_vec());
        }
        out
    }

    #[test]
    fn test_append_then_iterate_small_values() {
        let dir = tempfile::tempdir().unwrap();
        let map = Map::open_with(dir.path(), create_options().block_size(512)).unwrap();
        for i in 0..10u32 {
            map.put(b"k", i.to_string().as_bytes()).unwrap();
        }

        let mut values = map.get(b"k").unwrap();
        let mut remaining = 10;
        assert_eq!(values.available(), remaining);
        let mut seen = Vec::new();
        while values.has_next() {
            seen.push(values.next().unwrap().unwrap().to_vec());
            remaining -= 1;
            assert_eq!(values.available(), remaining);
        }
        let expected: Vec<Vec<u8>> = (0..10u32).map(|i| i.to_string().into_bytes()).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn test_get_missing_key_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let map = Map::open_with(dir.path(), create_options()).unwrap();
        let mut values = map.get(b"missing").unwrap();
        assert_eq!(values.available(), 0);
        assert!(!values.has_next());
        assert!(values.next().unwrap().is_none());
    }

    #[test]
    fn test_block_rollover() {
        let dir = tempfile::tempdir().unwrap();
        let map = Map::open_with(dir.path(), create_options().block_size(128)).unwrap();
        let values: Vec<Vec<u8>> = (0..100u32).map(|i| format!("{i:020}").into_bytes()).collect();
        for value in &values {
            map.put(b"k", value).unwrap();
        }
        assert_eq!(collect(&map, b"k"), values);
    }

    #[test]
    fn test_delete_every_23rd() {
        let dir = tempfile::tempdir().unwrap();
        let map = Map::open_with(dir.path(), create_options().block_size(128)).unwrap();
        for i in 0..1000u32 {
            map.put(b"k", i.to_string().as_bytes()).unwrap();
        }

        let removed = map
            .remove_values(b"k", |value| {
                let n: u64 = std::str::from_utf8(value).unwrap().parse().unwrap();
                n % 23 == 0
            })
            .unwrap();
        assert_eq!(removed, 44);

        let survivors = collect(&map, b"k");
        assert_eq!(survivors.len(), 956);
        for value in &survivors {
            let n: u64 = std::str::from_utf8(value).unwrap().parse().unwrap();
            assert_ne!(n % 23, 0);
        }

        let stats = map.stats().unwrap();
        assert_eq!(stats.num_keys, 1);
        assert_eq!(stats.num_values_total, 1000);
        assert_eq!(stats.num_values_removed, 44);
        // The aggregated average counts every appended value, deletions
        // included; min/max reflect the 956 still valid.
        assert_eq!(stats.list_size_avg, 1000);
        assert_eq!(stats.list_size_min, 956);
        assert_eq!(stats.list_size_max, 956);
    }

    #[test]
    fn test_reader_does_not_block_reader() {
        let dir = tempfile::tempdir().unwrap();
        let map = Map::open_with(dir.path(), create_options()).unwrap();
        map.put(b"k", b"v").unwrap();

        let _first = map.get(b"k").unwrap();
        let started = Instant::now();
        let second = map.get(b"k").unwrap();
        assert!(started.elapsed() < Duration::from_millis(100));
        assert_eq!(second.available(), 1);
    }

    #[test]
    fn test_writer_blocks_until_reader_drops() {
        let dir = tempfile::tempdir().unwrap();
        let map = Arc::new(Map::open_with(dir.path(), create_options()).unwrap());
        map.put(b"k", b"v").unwrap();

        let reader = map.get(b"k").unwrap();
        let wrote = Arc::new(AtomicBool::new(false));
        std::thread::scope(|scope| {
            let map_in_thread = Arc::clone(&map);
            let wrote_in_thread = Arc::clone(&wrote);
            scope.spawn(move || {
                map_in_thread.put(b"k", b"w").unwrap();
                wrote_in_thread.store(true, Ordering::SeqCst);
            });
            std::thread::sleep(Duration::from_millis(100));
            assert!(!wrote.load(Ordering::SeqCst), "writer ran while reader held the list");
            drop(reader);
        });
        assert!(wrote.load(Ordering::SeqCst));
        assert_eq!(collect(&map, b"k"), vec![b"v".to_vec(), b"w".to_vec()]);
    }

    #[test]
    fn test_reopen_durability() {
        let dir = tempfile::tempdir().unwrap();
        {
            let map = Map::open_with(dir.path(), create_options()).unwrap();
            for key in [b"a".as_slice(), b"b", b"c"] {
                map.put(key, b"v").unwrap();
            }
            map.close().unwrap();
        }
        let map = Map::open_with(
            dir.path(),
            Options::new().create_if_missing(false).quiet(true),
        )
        .unwrap();
        for key in [b"a".as_slice(), b"b", b"c"] {
            assert_eq!(collect(&map, key), vec![b"v".to_vec()], "key {key:?}");
        }
        assert!(!map.contains(b"d").unwrap());
    }

    #[test]
    fn test_sharding_is_balanced_and_stable() {
        let dir = tempfile::tempdir().unwrap();
        let map = Map::open_with(dir.path(), create_options().num_partitions(4)).unwrap();
        assert_eq!(map.num_partitions(), 4);
        for i in 0..10_000u32 {
            map.put(format!("key-{i}").as_bytes(), b"v").unwrap();
        }
        let stats = map.stats_per_shard().unwrap();
        for shard_stats in &stats {
            // Within 15% of the uniform 2500 keys per shard.
            assert!(
                (2125..=2875).contains(&shard_stats.num_keys),
                "skewed shard: {} keys",
                shard_stats.num_keys
            );
        }
        let total = Stats::total(&stats);
        assert_eq!(total.num_keys, 10_000);
    }

    #[test]
    fn test_reopen_uses_recorded_parameters() {
        let dir = tempfile::tempdir().unwrap();
        {
            let map = Map::open_with(
                dir.path(),
                create_options().block_size(256).num_partitions(2),
            )
            .unwrap();
            map.put(b"k", b"v").unwrap();
            map.close().unwrap();
        }
        // Different options on reopen are ignored in favor of the id file.
        let map = Map::open_with(
            dir.path(),
            Options::new().block_size(1024).num_partitions(8).quiet(true),
        )
        .unwrap();
        assert_eq!(map.block_size(), 256);
        assert_eq!(map.num_partitions(), 2);
        assert_eq!(collect(&map, b"k"), vec![b"v".to_vec()]);
    }

    #[test]
    fn test_error_if_exists() {
        let dir = tempfile::tempdir().unwrap();
        {
            let map = Map::open_with(dir.path(), create_options()).unwrap();
            map.close().unwrap();
        }
        let result = Map::open_with(dir.path(), create_options().error_if_exists(true));
        assert!(matches!(result, Err(Error::Precondition(_))));
    }

    #[test]
    fn test_missing_map_without_create() {
        let dir = tempfile::tempdir().unwrap();
        let result = Map::open_with(dir.path(), Options::new().quiet(true));
        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[test]
    fn test_directory_locked() {
        let dir = tempfile::tempdir().unwrap();
        let _map = Map::open_with(dir.path(), create_options()).unwrap();
        let result = Map::open_with(dir.path(), create_options());
        assert!(matches!(result, Err(Error::DirectoryLocked(_))));
    }

    #[test]
    fn test_readonly_map() {
        let dir = tempfile::tempdir().unwrap();
        {
            let map = Map::open_with(dir.path(), create_options()).unwrap();
            map.put(b"k", b"v").unwrap();
            map.close().unwrap();
        }
        let map =
            Map::open_with(dir.path(), Options::new().readonly(true).quiet(true)).unwrap();
        assert!(map.is_readonly());
        assert_eq!(map.put(b"k", b"w"), Err(Error::ReadOnly));
        assert_eq!(map.remove_key(b"k"), Err(Error::ReadOnly));
        assert_eq!(map.remove_values(b"k", |_| true), Err(Error::ReadOnly));
        assert_eq!(map.replace_values(b"k", |_| None), Err(Error::ReadOnly));
        assert_eq!(collect(&map, b"k"), vec![b"v".to_vec()]);
    }

    #[test]
    fn test_version_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        {
            let map = Map::open_with(dir.path(), create_options()).unwrap();
            map.close().unwrap();
        }
        // Bump the major version in the id file.
        let id_path = id_file(dir.path());
        let id = MapId {
            block_size: 512,
            num_partitions: 4,
            major_version: MAJOR_VERSION + 1,
            minor_version: 0,
        };
        id.write_to_file(&id_path).unwrap();
        let result = Map::open_with(dir.path(), Options::new().quiet(true));
        assert!(matches!(result, Err(Error::VersionMismatch { .. })));
    }

    #[test]
    fn test_for_each_key_and_entry() {
        let dir = tempfile::tempdir().unwrap();
        let map = Map::open_with(dir.path(), create_options()).unwrap();
        map.put(b"a", b"1").unwrap();
        map.put(b"b", b"2").unwrap();
        map.put(b"b", b"3").unwrap();
        map.put(b"gone", b"x").unwrap();
        map.remove_key(b"gone").unwrap();

        let mut keys = Vec::new();
        map.for_each_key(|key| keys.push(key.to_vec())).unwrap();
        keys.sort();
        assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec()]);

        let mut entries = Vec::new();
        map.for_each_entry(|key, values| {
            let mut list = Vec::new();
            while let Some(value) = values.next()? {
                list.push(value.to_vec());
            }
            entries.push((key.to_vec(), list));
            Ok(())
        })
        .unwrap();
        entries.sort();
        assert_eq!(
            entries,
            vec![
                (b"a".to_vec(), vec![b"1".to_vec()]),
                (b"b".to_vec(), vec![b"2".to_vec(), b"3".to_vec()]),
            ]
        );
    }

    #[test]
    fn test_replace_equal_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let map = Map::open_with(dir.path(), create_options()).unwrap();
        for value in [b"x".as_slice(), b"y", b"x"] {
            map.put(b"k", value).unwrap();
        }
        assert!(map.replace_first_equal(b"k", b"x", b"z").unwrap());
        assert_eq!(map.replace_all_equal(b"k", b"x", b"z").unwrap(), 1);
        assert_eq!(map.replace_all_equal(b"k", b"absent", b"z").unwrap(), 0);
        let mut values = collect(&map, b"k");
        values.sort();
        assert_eq!(values, vec![b"y".to_vec(), b"z".to_vec(), b"z".to_vec()]);
    }

    #[test]
    fn test_limits() {
        let dir = tempfile::tempdir().unwrap();
        let map = Map::open_with(dir.path(), create_options().block_size(512)).unwrap();
        assert_eq!(map.max_key_size(), usize::from(u16::MAX));
        assert_eq!(map.max_value_size(), 509);
        let oversized = vec![0u8; map.max_value_size() + 1];
        assert!(matches!(
            map.put(b"k", &oversized),
            Err(Error::ValueTooLarge { .. })
        ));
        let just_fits = vec![0u8; map.max_value_size()];
        map.put(b"k", &just_fits).unwrap();
    }

    #[test]
    fn test_concurrent_writers_different_keys() {
        let dir = tempfile::tempdir().unwrap();
        let map = Arc::new(Map::open_with(dir.path(), create_options()).unwrap());

        let mut handles = Vec::new();
        for t in 0..4u32 {
            let map = Arc::clone(&map);
            handles.push(std::thread::spawn(move || {
                for i in 0..250u32 {
                    let key = format!("key-{}", (t * 250 + i) % 40);
                    map.put(key.as_bytes(), format!("{t}:{i}").as_bytes()).unwrap();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let stats = map.stats().unwrap();
        assert_eq!(stats.num_values_total, 1000);
        assert_eq!(stats.num_keys, 40);
    }
}
