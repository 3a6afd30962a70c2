//! On-disk binary layouts shared by the archival index, revision index, and
//! engine orchestrator.
//!
//! Every encoded structure here follows the same two-phase contract: a fixed
//! prefix carries enough information (a count, or counts) to compute the
//! total encoded length, and a second pass parses the variable-length tail
//! and verifies a trailing Fletcher-32 checksum. Callers that already hold
//! the whole buffer can use the `decode` convenience wrapper; callers reading
//! off a [`crate::backend::RawBackend`] call `decode_fixed` first to learn
//! how many more bytes to read.

pub mod header;
pub mod record;
pub mod whole_history;

pub use header::Header;
pub use record::{IndexEntry, RevisionRecord};
pub use whole_history::{RecordPointer, WholeHistory};
