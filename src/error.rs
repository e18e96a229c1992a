use std::fmt::Display;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Multimap errors.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Error {
    /// A filesystem read, write or rename failed.
    Io(String),
    /// The directory lock file is already held by another process.
    DirectoryLocked(PathBuf),
    /// Invalid on-disk data: truncated file, bad id file, varint overflow
    /// mid-stream, or a block entry running past the block size.
    Corrupted(String),
    /// The map was created by an incompatible library version.
    VersionMismatch { found: (u64, u64), expected: (u64, u64) },
    /// A key exceeds the maximum key size of 2^16 - 1 bytes.
    KeyTooLarge(usize),
    /// A value does not fit into a single block.
    ValueTooLarge { size: usize, max: usize },
    /// A mutating operation was attempted on a read-only map.
    ReadOnly,
    /// API misuse, e.g. reading a block id that was never assigned.
    Precondition(String),
}

impl std::error::Error for Error {}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::Io(msg) => write!(f, "io error: {msg}"),
            Error::DirectoryLocked(path) => {
                write!(f, "directory already locked: {}", path.display())
            }
            Error::Corrupted(msg) => write!(f, "corrupted data: {msg}"),
            Error::VersionMismatch { found, expected } => write!(
                f,
                "version mismatch: map was written by {}.{}, library is {}.{}",
                found.0, found.1, expected.0, expected.1
            ),
            Error::KeyTooLarge(size) => {
                write!(f, "key of {size} bytes exceeds the maximum of {} bytes", u16::MAX)
            }
            Error::ValueTooLarge { size, max } => {
                write!(f, "value of {size} bytes exceeds the block capacity of {max} bytes")
            }
            Error::ReadOnly => write!(f, "write attempted on read-only map"),
            Error::Precondition(msg) => write!(f, "precondition violated: {msg}"),
        }
    }
}

/// Constructs an Error::Corrupted from the given format string.
#[macro_export]
macro_rules! errcorrupt {
    ($($args:tt)*) => { $crate::error::Error::Corrupted(format!($($args)*)) };
}

/// A multimap Result returning Error.
pub type Result<T> = std::result::Result<T, Error>;

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<Box<bincode::ErrorKind>> for Error {
    fn from(err: Box<bincode::ErrorKind>) -> Self {
        Error::Corrupted(err.to_string())
    }
}
