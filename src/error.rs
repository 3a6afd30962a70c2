//! Error taxonomy for the onion storage engine.
//!
//! Five kinds, matching the on-disk format's failure modes one-to-one: a caller
//! never needs a side-channel error-code registry to understand what went wrong.

use thiserror::Error;

/// Why a decoded record was rejected as corrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorruptReason {
    /// Four-byte signature didn't match the expected magic for this record type.
    BadSignature,
    /// Version byte is higher than this build knows how to decode.
    UnsupportedVersion,
    /// The trailing checksum didn't match the recomputed one.
    ChecksumMismatch,
    /// A `logi_addr` field wasn't a multiple of the record's page size.
    Misaligned,
    /// The first and second decode passes disagreed on entry count.
    CountMismatch,
}

impl std::fmt::Display for CorruptReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::BadSignature => "bad signature",
            Self::UnsupportedVersion => "unsupported version",
            Self::ChecksumMismatch => "checksum mismatch",
            Self::Misaligned => "non-page-aligned logical address",
            Self::CountMismatch => "entry count mismatch between decode passes",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum OnionError {
    #[error("bad argument: {0}")]
    BadArgument(String),

    #[error("corrupt onion record at offset {offset}: {reason}")]
    Corrupt { offset: u64, reason: CorruptReason },

    #[error("allocation failed: {0}")]
    ResourceExhausted(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported: {0}")]
    Unsupported(&'static str),
}

impl OnionError {
    #[must_use]
    pub fn corrupt(offset: u64, reason: CorruptReason) -> Self {
        Self::Corrupt { offset, reason }
    }

    #[must_use]
    pub fn bad_argument(msg: impl Into<String>) -> Self {
        Self::BadArgument(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, OnionError>;
