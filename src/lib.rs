//! A persistent, embeddable multimap: byte keys mapped to ordered lists of
//! byte values, stored in fixed-size blocks in per-shard append-only files.
//!
//! ```no_run
//! use multimap::{Map, Options};
//!
//! let map = Map::open_with("/tmp/db", Options::new().create_if_missing(true))?;
//! map.put(b"key", b"first")?;
//! map.put(b"key", b"second")?;
//! let mut values = map.get(b"key")?;
//! while let Some(value) = values.next()? {
//!     println!("{:?}", value);
//! }
//! # Ok::<(), multimap::Error>(())
//! ```

pub mod arena;
pub mod block;
pub mod error;
pub mod flock;
pub mod hasher;
pub mod list;
pub mod lock;
pub mod map;
pub mod options;
pub mod shard;
pub mod stats;
pub mod store;
pub mod table;
pub mod uint_vector;
pub mod varint;

pub use error::{Error, Result};
pub use list::ValueCursor;
pub use map::{Map, Values, MAJOR_VERSION, MINOR_VERSION};
pub use options::Options;
pub use stats::Stats;
