//! On-disk revision record: one per committed revision, holding its archival
//! index entries plus the metadata needed to reconstruct `WholeHistory`.
//!
//! ```text
//! "ORRS" | ver:u8 | pad:u24
//!       | revision_id:u64 | parent_revision_id:u64
//!       | creation_time:[u8;16]
//!       | logi_eof:u64 | page_size:u32 | user_id:u32
//!       | n_entries:u64 | username_size:u32 | comment_size:u32
//!       | { logi_addr:u64, phys_addr:u64, entry_checksum:u32 } * n_entries
//!       | username:[u8; username_size] | comment:[u8; comment_size]
//!       | checksum:u32
//! ```
//!
//! Like [`crate::format::whole_history`], decoding is two-phase: `decode_fixed`
//! parses the 72-byte prefix (everything needed to compute the total record
//! length), `decode_tail` parses entries, username, comment, and verifies the
//! trailing checksum.

use chrono::{DateTime, Utc};

use crate::checksum::fletcher32;
use crate::error::{CorruptReason, OnionError, Result};
use crate::util::num::{u32_to_usize, u64_to_usize, usize_checked_add, usize_to_u64};

pub const MAGIC: [u8; 4] = *b"ORRS";
pub const VERSION: u8 = 1;
pub const FIXED_PREFIX_LEN: usize = 72;
pub const ENTRY_LEN: usize = 20;

/// A single logical-page-to-physical-page mapping inside a revision record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    pub logi_addr: u64,
    pub phys_addr: u64,
}

impl IndexEntry {
    fn encode_into(self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.logi_addr.to_le_bytes());
        buf.extend_from_slice(&self.phys_addr.to_le_bytes());
        let checksum = fletcher32(&buf[buf.len() - 16..]);
        buf.extend_from_slice(&checksum.to_le_bytes());
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionRecord {
    pub revision_id: u64,
    pub parent_revision_id: u64,
    pub creation_time: DateTime<Utc>,
    pub logi_eof: u64,
    pub page_size: u32,
    pub user_id: u32,
    /// `None` means no username was ever supplied; `Some(String::new())` means
    /// it was explicitly set to the empty string. The wire format distinguishes
    /// the two: `None` occupies zero bytes, `Some` is NUL-terminated.
    pub username: Option<String>,
    pub comment: Option<String>,
    /// Sorted ascending by `logi_addr`; this is this revision's own contribution
    /// to the archival index, not the merged view.
    pub entries: Vec<IndexEntry>,
}

pub struct FixedPart {
    pub n_entries: u64,
    pub username_size: u32,
    pub comment_size: u32,
    pub total_len: usize,
}

fn encode_time(t: DateTime<Utc>) -> [u8; 16] {
    let mut buf = [0u8; 16];
    buf[0..8].copy_from_slice(&t.timestamp().to_le_bytes());
    buf[8..16].copy_from_slice(&u64::from(t.timestamp_subsec_nanos()).to_le_bytes());
    buf
}

fn decode_time(buf: &[u8]) -> Result<DateTime<Utc>> {
    let secs = i64::from_le_bytes(buf[0..8].try_into().unwrap());
    let nanos = u64::from_le_bytes(buf[8..16].try_into().unwrap());
    let nanos = u32::try_from(nanos)
        .map_err(|_| OnionError::bad_argument("creation_time nanosecond field out of range"))?;
    DateTime::from_timestamp(secs, nanos)
        .ok_or_else(|| OnionError::bad_argument("creation_time is not a valid instant"))
}

/// Wire size of a length-prefixed, NUL-terminated optional string: zero for
/// `None`, `s.len() + 1` for `Some(s)`.
fn wire_len(s: &Option<String>) -> usize {
    s.as_ref().map_or(0, |s| s.len() + 1)
}

fn encode_optional_string(s: &Option<String>, buf: &mut Vec<u8>) {
    if let Some(s) = s {
        buf.extend_from_slice(s.as_bytes());
        buf.push(0);
    }
}

/// Splits off a NUL-terminated optional string of `size` bytes from the front
/// of `buf`, returning the decoded value and the remaining bytes.
///
/// # Errors
/// Returns `BadArgument` if `size` is nonzero and the last byte isn't NUL, or
/// if the bytes preceding it aren't valid UTF-8.
fn decode_optional_string(buf: &[u8], size: usize) -> Result<(Option<String>, &[u8])> {
    if size == 0 {
        return Ok((None, buf));
    }
    let (field, rest) = buf.split_at(size);
    let (body, nul) = field.split_at(size - 1);
    if nul != [0u8] {
        return Err(OnionError::bad_argument("string field is missing its trailing NUL"));
    }
    let s = std::str::from_utf8(body)
        .map_err(|_| OnionError::bad_argument("string field is not valid UTF-8"))?
        .to_string();
    Ok((Some(s), rest))
}

impl RevisionRecord {
    /// Computes the total encoded length, or `None` if the computation would
    /// overflow `usize`.
    #[must_use]
    pub fn encoded_len(n_entries: usize, username_size: usize, comment_size: usize) -> Option<usize> {
        let with_entries = usize_checked_add(FIXED_PREFIX_LEN, ENTRY_LEN.checked_mul(n_entries)?)?;
        let with_strings = usize_checked_add(usize_checked_add(with_entries, username_size)?, comment_size)?;
        usize_checked_add(with_strings, 4)
    }

    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let username_size = wire_len(&self.username);
        let comment_size = wire_len(&self.comment);
        let len = Self::encoded_len(self.entries.len(), username_size, comment_size)
            .expect("in-memory record fits in usize");
        let mut buf = Vec::with_capacity(len);
        buf.extend_from_slice(&MAGIC);
        buf.push(VERSION);
        buf.extend_from_slice(&[0u8; 3]);
        buf.extend_from_slice(&self.revision_id.to_le_bytes());
        buf.extend_from_slice(&self.parent_revision_id.to_le_bytes());
        buf.extend_from_slice(&encode_time(self.creation_time));
        buf.extend_from_slice(&self.logi_eof.to_le_bytes());
        buf.extend_from_slice(&self.page_size.to_le_bytes());
        buf.extend_from_slice(&self.user_id.to_le_bytes());
        buf.extend_from_slice(&usize_to_u64(self.entries.len()).to_le_bytes());
        buf.extend_from_slice(&(username_size as u32).to_le_bytes());
        buf.extend_from_slice(&(comment_size as u32).to_le_bytes());
        debug_assert_eq!(buf.len(), FIXED_PREFIX_LEN);
        for &entry in &self.entries {
            entry.encode_into(&mut buf);
        }
        encode_optional_string(&self.username, &mut buf);
        encode_optional_string(&self.comment, &mut buf);
        let checksum = fletcher32(&buf);
        buf.extend_from_slice(&checksum.to_le_bytes());
        buf
    }

    /// First decode pass: reads only the fixed 72-byte prefix.
    ///
    /// # Errors
    /// Returns `Corrupt` on bad signature/version, `BadArgument` if `buf` is
    /// shorter than the fixed prefix or its sizes overflow `usize`.
    pub fn decode_fixed(buf: &[u8]) -> Result<FixedPart> {
        if buf.len() < FIXED_PREFIX_LEN {
            return Err(OnionError::bad_argument("revision record buffer shorter than prefix"));
        }
        if buf[0..4] != MAGIC {
            return Err(OnionError::corrupt(0, CorruptReason::BadSignature));
        }
        if buf[4] != VERSION {
            return Err(OnionError::corrupt(0, CorruptReason::UnsupportedVersion));
        }
        let n_entries = u64::from_le_bytes(buf[56..64].try_into().unwrap());
        let username_size = u32::from_le_bytes(buf[64..68].try_into().unwrap());
        let comment_size = u32::from_le_bytes(buf[68..72].try_into().unwrap());
        let n = u64_to_usize(n_entries)
            .ok_or_else(|| OnionError::bad_argument("n_entries too large for this platform"))?;
        let total_len = Self::encoded_len(n, u32_to_usize(username_size), u32_to_usize(comment_size))
            .ok_or_else(|| OnionError::bad_argument("n_entries too large to compute record length"))?;
        Ok(FixedPart { n_entries, username_size, comment_size, total_len })
    }

    /// Second decode pass: `buf` must be exactly `fixed.total_len` bytes.
    ///
    /// # Errors
    /// Returns `Corrupt` on checksum mismatch (overall or per-entry), a count
    /// mismatch between the two passes, or a misaligned logical address when
    /// `page_size` is known to require page alignment; `BadArgument` if the
    /// username/comment bytes are not valid UTF-8 or the creation time is
    /// invalid.
    pub fn decode_tail(buf: &[u8], fixed: &FixedPart) -> Result<Self> {
        if buf.len() != fixed.total_len {
            return Err(OnionError::corrupt(0, CorruptReason::CountMismatch));
        }
        let expected_checksum = fletcher32(&buf[..buf.len() - 4]);
        let actual_checksum = u32::from_le_bytes(buf[buf.len() - 4..].try_into().unwrap());
        if expected_checksum != actual_checksum {
            return Err(OnionError::corrupt(0, CorruptReason::ChecksumMismatch));
        }

        let revision_id = u64::from_le_bytes(buf[8..16].try_into().unwrap());
        let parent_revision_id = u64::from_le_bytes(buf[16..24].try_into().unwrap());
        let creation_time = decode_time(&buf[24..40])?;
        let logi_eof = u64::from_le_bytes(buf[40..48].try_into().unwrap());
        let page_size = u32::from_le_bytes(buf[48..52].try_into().unwrap());
        let user_id = u32::from_le_bytes(buf[52..56].try_into().unwrap());

        let n = u64_to_usize(fixed.n_entries).expect("validated by decode_fixed");
        let mut entries: Vec<IndexEntry> = Vec::new();
        entries
            .try_reserve_exact(n)
            .map_err(|_| OnionError::ResourceExhausted(format!("cannot allocate {n} revision record entries")))?;
        let mut prev_addr: Option<u64> = None;
        for i in 0..n {
            let start = FIXED_PREFIX_LEN + i * ENTRY_LEN;
            let entry = &buf[start..start + ENTRY_LEN];
            let expected = fletcher32(&entry[0..16]);
            let actual = u32::from_le_bytes(entry[16..20].try_into().unwrap());
            if expected != actual {
                return Err(OnionError::corrupt(start as u64, CorruptReason::ChecksumMismatch));
            }
            let logi_addr = u64::from_le_bytes(entry[0..8].try_into().unwrap());
            let phys_addr = u64::from_le_bytes(entry[8..16].try_into().unwrap());
            if page_size > 0 && logi_addr % u64::from(page_size) != 0 {
                return Err(OnionError::corrupt(start as u64, CorruptReason::Misaligned));
            }
            if let Some(prev) = prev_addr {
                if logi_addr <= prev {
                    return Err(OnionError::bad_argument(
                        "revision record entries are not strictly increasing by logical address",
                    ));
                }
            }
            prev_addr = Some(logi_addr);
            entries.push(IndexEntry { logi_addr, phys_addr });
        }

        let strings_start = FIXED_PREFIX_LEN + ENTRY_LEN * n;
        let tail = &buf[strings_start..buf.len() - 4];
        let (username, tail) = decode_optional_string(tail, u32_to_usize(fixed.username_size))?;
        let (comment, _) = decode_optional_string(tail, u32_to_usize(fixed.comment_size))?;

        Ok(Self {
            revision_id,
            parent_revision_id,
            creation_time,
            logi_eof,
            page_size,
            user_id,
            username,
            comment,
            entries,
        })
    }

    /// Convenience wrapper over both passes for callers that already hold the
    /// full buffer (tests, in-memory round-trips).
    ///
    /// # Errors
    /// See [`Self::decode_fixed`] and [`Self::decode_tail`].
    pub fn decode(buf: &[u8]) -> Result<Self> {
        let fixed = Self::decode_fixed(buf)?;
        Self::decode_tail(&buf[..fixed.total_len], &fixed)
    }
}
