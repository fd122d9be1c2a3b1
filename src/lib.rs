//! Casky is an embeddable, crash-safe key-value store in the Bitcask mould:
//! every mutation is appended to a single log file on disk, while an
//! in-memory directory indexes the live value for each key. Records carry a
//! CRC-32 digest and an optional expiry instant; opening a database replays
//! the log, and compaction rewrites it from the live directory.
//!
//! ```rust,no_run
//! use casky::Casky;
//!
//! let db = Casky::open("casky.db").unwrap();
//! db.put("hello", "world", 0).unwrap();
//! assert_eq!(db.get("hello").unwrap(), Some(b"world".to_vec()));
//! db.delete("hello").unwrap();
//! ```
//!
//! By default the engine performs no internal locking and callers serialise
//! access externally; build with the `thread-safe` feature to embed a mutex
//! and share clones of a handle across threads.

mod casky;
mod data;
mod errors;
mod key_dir;
mod logfile;
pub mod server;
mod stats;
mod sync;
mod util;

pub use crate::casky::{Casky, CaskyOptions};
pub use crate::data::{read_record, Decoded, Record, DEFAULT_MAX_FIELD_BYTES};
pub use crate::errors::{strerror, Error, ErrorCode, Result};
pub use crate::stats::Stats;

/// The library version string.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
