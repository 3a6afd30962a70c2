//! Page-granular copy-on-write versioning storage layer over an immutable
//! canonical file.
//!
//! An onion-backed file pairs a canonical data file with an append-only
//! `.onion` sidecar that records a sequence of revisions. Writes never touch
//! the canonical file; each revision's modified pages are appended to the
//! sidecar and indexed. Opening a given revision replays the canonical file
//! with that revision's page-level overlay applied on top.
//!
//! ```no_run
//! use onion_store::{OnionConfig, OnionHandle};
//!
//! # fn main() -> onion_store::Result<()> {
//! let path = std::path::Path::new("/tmp/example.dat");
//! let mut handle = OnionHandle::open_create_truncate(path, OnionConfig::new(4096, 0))?;
//! handle.write(0, b"hello")?;
//! handle.close()?;
//!
//! let mut handle = OnionHandle::open_read_only(path, OnionConfig::new(4096, 0))?;
//! assert_eq!(handle.read(0, 5)?, b"hello");
//! # Ok(())
//! # }
//! ```

pub mod archival_index;
pub mod backend;
pub mod checksum;
pub mod config;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod format;
pub mod io;
pub mod merge;
pub mod read;
pub mod revision_index;
mod util;
pub mod write;

pub use backend::{sidecar_paths, BackendFactory, FileBackend, FileBackendFactory, RawBackend};
pub use config::{CreationFlags, OnionConfig, RevisionSelector, StoreTarget};
pub use engine::{OnionHandle, Stats};
pub use error::{CorruptReason, OnionError, Result};
pub use format::IndexEntry;
