use crate::error::{Error, Result};

/// Smallest accepted block size.
pub const MIN_BLOCK_SIZE: usize = 128;
/// Largest accepted block size.
pub const MAX_BLOCK_SIZE: usize = 1 << 20;

/// Configuration recognized when opening a [`Map`](crate::Map).
///
/// `block_size` and `num_partitions` only take effect when the map is
/// created; reopening an existing directory uses the values recorded in its
/// id file. `buffer_size` applies on every open.
#[derive(Debug, Clone)]
pub struct Options {
    /// Bytes per block in the value stores (default: 512).
    pub block_size: usize,

    /// Number of shards, fixed at creation (default: 23).
    pub num_partitions: usize,

    /// Store write-buffer size in bytes (default: 1 MiB).
    pub buffer_size: usize,

    /// Create the directory and shard files if absent; otherwise error.
    pub create_if_missing: bool,

    /// Error when opening a directory that already holds a map.
    pub error_if_exists: bool,

    /// Open stores read-only; all mutating operations fail.
    pub readonly: bool,

    /// Suppress informational log output.
    pub quiet: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            block_size: 512,
            num_partitions: 23,
            buffer_size: 1024 * 1024,
            create_if_missing: false,
            error_if_exists: false,
            readonly: false,
            quiet: false,
        }
    }
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set bytes per block (create-time only).
    pub fn block_size(mut self, size: usize) -> Self {
        self.block_size = size;
        self
    }

    /// Set the number of shards (create-time only).
    pub fn num_partitions(mut self, n: usize) -> Self {
        self.num_partitions = n;
        self
    }

    /// Set the store write-buffer size in bytes.
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    /// Create the map if the directory holds none.
    pub fn create_if_missing(mut self, yes: bool) -> Self {
        self.create_if_missing = yes;
        self
    }

    /// Fail when the directory already holds a map.
    pub fn error_if_exists(mut self, yes: bool) -> Self {
        self.error_if_exists = yes;
        self
    }

    /// Open in read-only mode.
    pub fn readonly(mut self, yes: bool) -> Self {
        self.readonly = yes;
        self
    }

    /// Suppress informational log output.
    pub fn quiet(mut self, yes: bool) -> Self {
        self.quiet = yes;
        self
    }

    /// Validates create-time parameters.
    pub(crate) fn validate(&self) -> Result<()> {
        if self.block_size < MIN_BLOCK_SIZE || self.block_size > MAX_BLOCK_SIZE {
            return Err(Error::Precondition(format!(
                "block size {} outside [{MIN_BLOCK_SIZE}, {MAX_BLOCK_SIZE}]",
                self.block_size
            )));
        }
        if self.num_partitions == 0 {
            return Err(Error::Precondition("number of partitions must be positive".into()));
        }
        if self.buffer_size < self.block_size {
            return Err(Error::Precondition(format!(
                "buffer size {} smaller than one block of {} bytes",
                self.buffer_size, self.block_size
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = Options::default();
        assert_eq!(options.block_size, 512);
        assert_eq!(options.num_partitions, 23);
        assert_eq!(options.buffer_size, 1024 * 1024);
        assert!(!options.create_if_missing);
        assert!(!options.readonly);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_options_builder() {
        let options = Options::new()
            .block_size(128)
            .num_partitions(4)
            .buffer_size(4096)
            .create_if_missing(true)
            .quiet(true);
        assert_eq!(options.block_size, 128);
        assert_eq!(options.num_partitions, 4);
        assert_eq!(options.buffer_size, 4096);
        assert!(options.create_if_missing);
        assert!(options.quiet);
    }

    #[test]
    fn test_validate_rejects_bad_sizes() {
        assert!(Options::new().block_size(64).validate().is_err());
        assert!(Options::new().block_size(MAX_BLOCK_SIZE * 2).validate().is_err());
        assert!(Options::new().num_partitions(0).validate().is_err());
        assert!(Options::new().buffer_size(256).validate().is_err());
    }
}
