use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

#[cfg(unix)]
use std::os::unix::io::AsRawFd;

use crate::error::{Error, Result};

/// Exclusive advisory lock on a map directory.
///
/// The lock is tied to an open file handle inside the directory and excludes
/// other processes for the lifetime of the guard. The file contains the
/// owning process id for debugging; it is left in place on drop because the
/// OS releases the lock with the handle.
pub struct DirectoryLock {
    _file: File,
    path: PathBuf,
}

impl DirectoryLock {
    /// Acquires the lock, failing immediately if another process holds it.
    pub fn acquire<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&path)?;

        if let Err(err) = Self::try_lock(&file) {
            return if err.kind() == io::ErrorKind::WouldBlock {
                Err(Error::DirectoryLocked(path))
            } else {
                Err(err.into())
            };
        }

        // Truncate only after the lock is ours, then record our pid.
        file.set_len(0)?;
        writeln!(file, "{}", std::process::id())?;
        file.flush()?;

        Ok(Self { _file: file, path })
    }

    #[cfg(unix)]
    fn try_lock(file: &File) -> io::Result<()> {
        use libc::{flock, LOCK_EX, LOCK_NB};

        let fd = file.as_raw_fd();
        let result = unsafe { flock(fd, LOCK_EX | LOCK_NB) };
        if result != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    #[cfg(not(unix))]
    fn try_lock(_file: &File) -> io::Result<()> {
        // No advisory locking on this platform; rely on cooperative use.
        Ok(())
    }

    /// The path of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_writes_pid() {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = dir.path().join("multimap.lock");

        let lock = DirectoryLock::acquire(&lock_path).expect("failed to acquire lock");
        assert_eq!(lock.path(), lock_path.as_path());

        let content = std::fs::read_to_string(&lock_path).unwrap();
        assert_eq!(content.trim(), std::process::id().to_string());
    }

    #[test]
    fn test_reacquire_after_drop() {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = dir.path().join("multimap.lock");

        {
            let _lock = DirectoryLock::acquire(&lock_path).unwrap();
            assert!(lock_path.exists());
        }

        // Dropping the guard releases the OS lock even though the file stays.
        DirectoryLock::acquire(&lock_path).expect("lock should be free after drop");
    }
}
