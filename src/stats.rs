use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Counters describing one shard's table, collected by a full scan.
///
/// Aggregate views over several shards come from [`Stats::total`] and
/// [`Stats::max`]. A snapshot is written next to the shard files at close
/// time and can be read back without opening the map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub block_size: u64,
    pub num_blocks: u64,
    pub num_keys: u64,
    pub num_lists_empty: u64,
    /// Lists whose lock could not be taken during the scan; their sizes are
    /// missing from the other counters.
    pub num_lists_locked: u64,
    pub num_values_total: u64,
    pub num_values_removed: u64,
    pub key_size_min: u64,
    pub key_size_max: u64,
    pub key_size_avg: u64,
    pub list_size_min: u64,
    pub list_size_max: u64,
    pub list_size_avg: u64,
}

impl Stats {
    pub fn num_values_valid(&self) -> u64 {
        self.num_values_total - self.num_values_removed
    }

    /// Element-wise sum; min/max/avg fields combine accordingly.
    pub fn total(stats: &[Stats]) -> Stats {
        let mut out = Stats::default();
        let mut num_nonempty = 0u64;
        for s in stats {
            out.block_size = s.block_size;
            out.num_blocks += s.num_blocks;
            out.num_keys += s.num_keys;
            out.num_lists_empty += s.num_lists_empty;
            out.num_lists_locked += s.num_lists_locked;
            out.num_values_total += s.num_values_total;
            out.num_values_removed += s.num_values_removed;
            if s.num_keys != 0 {
                out.key_size_min = if num_nonempty == 0 {
                    s.key_size_min
                } else {
                    out.key_size_min.min(s.key_size_min)
                };
                out.key_size_max = out.key_size_max.max(s.key_size_max);
                out.list_size_min = if num_nonempty == 0 {
                    s.list_size_min
                } else {
                    out.list_size_min.min(s.list_size_min)
                };
                out.list_size_max = out.list_size_max.max(s.list_size_max);
                num_nonempty += 1;
            }
        }
        if out.num_keys != 0 {
            let key_size_sum: u64 = stats.iter().map(|s| s.key_size_avg * s.num_keys).sum();
            out.key_size_avg = key_size_sum / out.num_keys;
            // Same formula as the per-shard scan: raw append counts over all
            // keys, deleted values included.
            out.list_size_avg = out.num_values_total / out.num_keys;
        }
        out
    }

    /// Element-wise maximum.
    pub fn max(stats: &[Stats]) -> Stats {
        let mut out = Stats::default();
        for s in stats {
            out.block_size = out.block_size.max(s.block_size);
            out.num_blocks = out.num_blocks.max(s.num_blocks);
            out.num_keys = out.num_keys.max(s.num_keys);
            out.num_lists_empty = out.num_lists_empty.max(s.num_lists_empty);
            out.num_lists_locked = out.num_lists_locked.max(s.num_lists_locked);
            out.num_values_total = out.num_values_total.max(s.num_values_total);
            out.num_values_removed = out.num_values_removed.max(s.num_values_removed);
            out.key_size_min = out.key_size_min.max(s.key_size_min);
            out.key_size_max = out.key_size_max.max(s.key_size_max);
            out.key_size_avg = out.key_size_avg.max(s.key_size_avg);
            out.list_size_min = out.list_size_min.max(s.list_size_min);
            out.list_size_max = out.list_size_max.max(s.list_size_max);
            out.list_size_avg = out.list_size_avg.max(s.list_size_avg);
        }
        out
    }

    /// Writes the snapshot file for one shard.
    pub fn write_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let encoded = bincode::serialize(self)?;
        std::fs::write(path, encoded)?;
        Ok(())
    }

    /// Reads a snapshot written by [`write_to_file`](Self::write_to_file).
    pub fn read_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let encoded = std::fs::read(path)?;
        Ok(bincode::deserialize(&encoded)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_combines_counters() {
        let a = Stats {
            block_size: 512,
            num_blocks: 10,
            num_keys: 2,
            num_values_total: 100,
            num_values_removed: 10,
            key_size_min: 3,
            key_size_max: 8,
            key_size_avg: 5,
            list_size_min: 20,
            list_size_max: 70,
            list_size_avg: 45,
            ..Stats::default()
        };
        let b = Stats {
            block_size: 512,
            num_blocks: 4,
            num_keys: 1,
            num_values_total: 30,
            num_values_removed: 0,
            key_size_min: 1,
            key_size_max: 4,
            key_size_avg: 4,
            list_size_min: 30,
            list_size_max: 30,
            list_size_avg: 30,
            ..Stats::default()
        };
        let total = Stats::total(&[a, b]);
        assert_eq!(total.block_size, 512);
        assert_eq!(total.num_blocks, 14);
        assert_eq!(total.num_keys, 3);
        assert_eq!(total.num_values_total, 130);
        assert_eq!(total.num_values_removed, 10);
        assert_eq!(total.num_values_valid(), 120);
        assert_eq!(total.key_size_min, 1);
        assert_eq!(total.key_size_max, 8);
        assert_eq!(total.key_size_avg, (5 * 2 + 4) / 3);
        assert_eq!(total.list_size_min, 20);
        assert_eq!(total.list_size_max, 70);
        // 130 values were ever appended over 3 keys; the 10 removed ones
        // still count toward the average.
        assert_eq!(total.list_size_avg, 130 / 3);
    }

    #[test]
    fn test_total_ignores_empty_shards_for_minima() {
        let empty = Stats { block_size: 512, ..Stats::default() };
        let one = Stats {
            block_size: 512,
            num_keys: 1,
            num_values_total: 5,
            key_size_min: 9,
            key_size_max: 9,
            key_size_avg: 9,
            list_size_min: 5,
            list_size_max: 5,
            list_size_avg: 5,
            ..Stats::default()
        };
        let total = Stats::total(&[empty, one]);
        assert_eq!(total.key_size_min, 9);
        assert_eq!(total.list_size_min, 5);
    }

    #[test]
    fn test_max() {
        let a = Stats { num_keys: 5, num_blocks: 1, ..Stats::default() };
        let b = Stats { num_keys: 2, num_blocks: 9, ..Stats::default() };
        let max = Stats::max(&[a, b]);
        assert_eq!(max.num_keys, 5);
        assert_eq!(max.num_blocks, 9);
    }

    #[test]
    fn test_snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shard.stats");
        let stats = Stats {
            block_size: 512,
            num_blocks: 42,
            num_keys: 7,
            num_values_total: 1000,
            num_values_removed: 13,
            ..Stats::default()
        };
        stats.write_to_file(&path).unwrap();
        assert_eq!(Stats::read_from_file(&path).unwrap(), stats);
    }
}
