use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

#[cfg(unix)]
use std::os::unix::fs::FileExt;
#[cfg(unix)]
use std::os::unix::io::AsRawFd;

use crate::error::{Error, Result};

/// Kernel hint for upcoming read behavior; purely advisory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessPattern {
    Normal,
    Sequential,
    Random,
}

/// Construction parameters for a [`Store`].
#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub block_size: usize,
    pub buffer_size: usize,
    pub readonly: bool,
    pub create_if_missing: bool,
    pub error_if_exists: bool,
}

/// Block-indexed append-only file with a bounded in-memory write buffer.
///
/// Block `i` either sits in the file at offset `i * block_size` or in the
/// write buffer at index `i - first_buffered_id`. Appends buffer until the
/// buffer is full, then the whole buffer goes to the file with one write.
/// All methods take `&self` and are safe to call from multiple threads.
pub struct Store {
    file: File,
    path: PathBuf,
    block_size: usize,
    readonly: bool,
    buffer: RwLock<Buffer>,
}

struct Buffer {
    data: Vec<u8>,
    capacity_blocks: usize,
    /// Number of blocks already written to the file.
    num_flushed: u32,
}

impl Buffer {
    fn num_buffered(&self, block_size: usize) -> u32 {
        (self.data.len() / block_size) as u32
    }
}

impl Store {
    pub fn open<P: AsRef<Path>>(path: P, options: &StoreOptions) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if options.error_if_exists && path.exists() {
            return Err(Error::Precondition(format!(
                "store file already exists: {}",
                path.display()
            )));
        }
        let file = OpenOptions::new()
            .read(true)
            .write(!options.readonly)
            .create(options.create_if_missing && !options.readonly)
            .open(&path)?;

        let file_size = file.metadata()?.len();
        if file_size % options.block_size as u64 != 0 {
            return Err(Error::Corrupted(format!(
                "store file {} has size {file_size}, not a multiple of block size {}",
                path.display(),
                options.block_size
            )));
        }
        let num_flushed = (file_size / options.block_size as u64) as u32;

        let capacity_blocks = (options.buffer_size / options.block_size).max(1);
        Ok(Self {
            file,
            path,
            block_size: options.block_size,
            readonly: options.readonly,
            buffer: RwLock::new(Buffer {
                data: Vec::with_capacity(capacity_blocks * options.block_size),
                capacity_blocks,
                num_flushed,
            }),
        })
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn is_readonly(&self) -> bool {
        self.readonly
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Total number of blocks, committed plus buffered.
    pub fn num_blocks(&self) -> u32 {
        let buffer = self.buffer.read().unwrap_or_else(|e| e.into_inner());
        buffer.num_flushed + buffer.num_buffered(self.block_size)
    }

    /// Appends a sealed block and returns its id. When the buffer fills, its
    /// blocks are written to the end of the file in one call.
    pub fn append(&self, block: &[u8]) -> Result<u32> {
        if self.readonly {
            return Err(Error::ReadOnly);
        }
        if block.len() != self.block_size {
            return Err(Error::Precondition(format!(
                "appended block has {} bytes, store block size is {}",
                block.len(),
                self.block_size
            )));
        }
        let mut buffer = self.buffer.write()?;
        let id = buffer.num_flushed + buffer.num_buffered(self.block_size);
        buffer.data.extend_from_slice(block);
        if buffer.num_buffered(self.block_size) as usize >= buffer.capacity_blocks {
            self.flush_locked(&mut buffer)?;
        }
        Ok(id)
    }

    /// Reads block `id` into `out`, from the buffer if it has not been
    /// flushed yet, from the file otherwise.
    pub fn read(&self, id: u32, out: &mut [u8]) -> Result<()> {
        if out.len() != self.block_size {
            return Err(Error::Precondition(format!(
                "read buffer has {} bytes, store block size is {}",
                out.len(),
                self.block_size
            )));
        }
        {
            let buffer = self.buffer.read()?;
            let num_buffered = buffer.num_buffered(self.block_size);
            if id >= buffer.num_flushed + num_buffered {
                return Err(Error::Precondition(format!(
                    "block {id} was never appended ({} blocks exist)",
                    buffer.num_flushed + num_buffered
                )));
            }
            if id >= buffer.num_flushed {
                let at = (id - buffer.num_flushed) as usize * self.block_size;
                out.copy_from_slice(&buffer.data[at..at + self.block_size]);
                return Ok(());
            }
            // On file; read outside the lock.
        }
        self.read_at(out, id as u64 * self.block_size as u64)?;
        Ok(())
    }

    /// Overwrites a previously appended block in place. Used to persist
    /// deleted-flag changes made by mutable iterators.
    pub fn write(&self, id: u32, block: &[u8]) -> Result<()> {
        if self.readonly {
            return Err(Error::ReadOnly);
        }
        if block.len() != self.block_size {
            return Err(Error::Precondition(format!(
                "written block has {} bytes, store block size is {}",
                block.len(),
                self.block_size
            )));
        }
        let mut buffer = self.buffer.write()?;
        let num_buffered = buffer.num_buffered(self.block_size);
        if id >= buffer.num_flushed + num_buffered {
            return Err(Error::Precondition(format!(
                "block {id} was never appended ({} blocks exist)",
                buffer.num_flushed + num_buffered
            )));
        }
        if id >= buffer.num_flushed {
            let at = (id - buffer.num_flushed) as usize * self.block_size;
            buffer.data[at..at + self.block_size].copy_from_slice(block);
            return Ok(());
        }
        self.write_at(block, id as u64 * self.block_size as u64)?;
        Ok(())
    }

    /// Forces buffered blocks to the file.
    pub fn flush(&self) -> Result<()> {
        let mut buffer = self.buffer.write()?;
        self.flush_locked(&mut buffer)
    }

    /// Flushes and then asks the OS to persist the file.
    pub fn sync(&self) -> Result<()> {
        self.flush()?;
        self.file.sync_all()?;
        Ok(())
    }

    /// Advises the kernel about the upcoming access pattern. Best effort.
    pub fn advise_access_pattern(&self, pattern: AccessPattern) {
        #[cfg(unix)]
        {
            let advice = match pattern {
                AccessPattern::Normal => libc::POSIX_FADV_NORMAL,
                AccessPattern::Sequential => libc::POSIX_FADV_SEQUENTIAL,
                AccessPattern::Random => libc::POSIX_FADV_RANDOM,
            };
            unsafe {
                libc::posix_fadvise(self.file.as_raw_fd(), 0, 0, advice);
            }
        }
        #[cfg(not(unix))]
        let _ = pattern;
    }

    fn flush_locked(&self, buffer: &mut Buffer) -> Result<()> {
        if buffer.data.is_empty() {
            return Ok(());
        }
        let offset = buffer.num_flushed as u64 * self.block_size as u64;
        self.write_at(&buffer.data, offset)?;
        buffer.num_flushed += buffer.num_buffered(self.block_size);
        buffer.data.clear();
        Ok(())
    }

    #[cfg(unix)]
    fn read_at(&self, out: &mut [u8], offset: u64) -> Result<()> {
        self.file.read_exact_at(out, offset)?;
        Ok(())
    }

    #[cfg(unix)]
    fn write_at(&self, data: &[u8], offset: u64) -> Result<()> {
        self.file.write_all_at(data, offset)?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn read_at(&self, out: &mut [u8], offset: u64) -> Result<()> {
        use std::io::{Read, Seek, SeekFrom};
        let mut file = &self.file;
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(out)?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn write_at(&self, data: &[u8], offset: u64) -> Result<()> {
        use std::io::{Seek, SeekFrom, Write};
        let mut file = &self.file;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;
        Ok(())
    }
}
