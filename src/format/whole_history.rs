//! On-disk whole-history: an ordered list of pointers to every committed
//! revision record.
//!
//! ```text
//! "OWHS" | ver:u8 | pad:u24 | n_revisions:u64
//!       | { phys_addr:u64, record_size:u64, entry_checksum:u32 } * n_revisions
//!       | checksum:u32
//! ```
//!
//! Decoded in the same two-phase shape as the revision record: [`decode_fixed`]
//! reads just the 16-byte prefix to learn `n_revisions` (and hence the total
//! encoded length); the caller then supplies that many bytes to [`decode_tail`].

use crate::checksum::fletcher32;
use crate::error::{CorruptReason, OnionError, Result};
use crate::util::num::{u64_to_usize, usize_checked_add, usize_to_u64};

pub const MAGIC: [u8; 4] = *b"OWHS";
pub const VERSION: u8 = 1;
pub const FIXED_PREFIX_LEN: usize = 16;
pub const POINTER_LEN: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordPointer {
    pub phys_addr: u64,
    pub record_size: u64,
}

impl RecordPointer {
    fn encode_into(self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.phys_addr.to_le_bytes());
        buf.extend_from_slice(&self.record_size.to_le_bytes());
        let checksum = fletcher32(&buf[buf.len() - 16..]);
        buf.extend_from_slice(&checksum.to_le_bytes());
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WholeHistory {
    pub pointers: Vec<RecordPointer>,
}

/// Result of the first decode pass: just enough to size the second read.
pub struct FixedPart {
    pub n_revisions: u64,
    pub total_len: usize,
}

impl WholeHistory {
    /// Computes the total encoded length for `n_revisions` pointers, or
    /// `None` if the computation would overflow `usize`.
    #[must_use]
    pub fn encoded_len(n_revisions: usize) -> Option<usize> {
        let with_pointers = usize_checked_add(FIXED_PREFIX_LEN, POINTER_LEN.checked_mul(n_revisions)?)?;
        usize_checked_add(with_pointers, 4)
    }

    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let len = Self::encoded_len(self.pointers.len()).expect("in-memory pointer count fits in usize");
        let mut buf = Vec::with_capacity(len);
        buf.extend_from_slice(&MAGIC);
        buf.push(VERSION);
        buf.extend_from_slice(&[0u8; 3]);
        buf.extend_from_slice(&usize_to_u64(self.pointers.len()).to_le_bytes());
        for &prev in &self.pointers {
            debug_assert!(
                buf.len() >= FIXED_PREFIX_LEN,
                "pointer must follow the fixed prefix"
            );
            prev.encode_into(&mut buf);
        }
        let checksum = fletcher32(&buf);
        buf.extend_from_slice(&checksum.to_le_bytes());
        buf
    }

    /// First decode pass: reads only the fixed 16-byte prefix.
    ///
    /// # Errors
    /// Returns `Corrupt` on bad signature/version, `BadArgument` if `buf` is
    /// shorter than the fixed prefix.
    pub fn decode_fixed(buf: &[u8]) -> Result<FixedPart> {
        if buf.len() < FIXED_PREFIX_LEN {
            return Err(OnionError::bad_argument("whole-history buffer shorter than prefix"));
        }
        if buf[0..4] != MAGIC {
            return Err(OnionError::corrupt(0, CorruptReason::BadSignature));
        }
        if buf[4] != VERSION {
            return Err(OnionError::corrupt(0, CorruptReason::UnsupportedVersion));
        }
        let n_revisions = u64::from_le_bytes(buf[8..16].try_into().unwrap());
        let n = u64_to_usize(n_revisions)
            .ok_or_else(|| OnionError::bad_argument("n_revisions too large for this platform"))?;
        let total_len = Self::encoded_len(n)
            .ok_or_else(|| OnionError::bad_argument("n_revisions too large to compute whole-history length"))?;
        Ok(FixedPart { n_revisions, total_len })
    }

    /// Second decode pass: `buf` must be exactly `fixed.total_len` bytes
    /// (the same bytes the first pass saw, as a prefix).
    ///
    /// # Errors
    /// Returns `Corrupt` on a count mismatch between the two passes, a
    /// per-entry checksum mismatch, or an overall checksum mismatch.
    pub fn decode_tail(buf: &[u8], fixed: &FixedPart) -> Result<Self> {
        if buf.len() != fixed.total_len {
            return Err(OnionError::corrupt(0, CorruptReason::CountMismatch));
        }
        let expected_checksum = fletcher32(&buf[..buf.len() - 4]);
        let actual_checksum = u32::from_le_bytes(buf[buf.len() - 4..].try_into().unwrap());
        if expected_checksum != actual_checksum {
            return Err(OnionError::corrupt(0, CorruptReason::ChecksumMismatch));
        }

        let n = u64_to_usize(fixed.n_revisions).expect("validated by decode_fixed");
        let mut pointers: Vec<RecordPointer> = Vec::new();
        pointers
            .try_reserve_exact(n)
            .map_err(|_| OnionError::ResourceExhausted(format!("cannot allocate {n} whole-history pointers")))?;
        let mut prev_addr: Option<u64> = None;
        for i in 0..n {
            let start = FIXED_PREFIX_LEN + i * POINTER_LEN;
            let entry = &buf[start..start + POINTER_LEN];
            let expected = fletcher32(&entry[0..16]);
            let actual = u32::from_le_bytes(entry[16..20].try_into().unwrap());
            if expected != actual {
                return Err(OnionError::corrupt(start as u64, CorruptReason::ChecksumMismatch));
            }
            let phys_addr = u64::from_le_bytes(entry[0..8].try_into().unwrap());
            let record_size = u64::from_le_bytes(entry[8..16].try_into().unwrap());
            if let Some(prev) = prev_addr {
                if phys_addr <= prev {
                    return Err(OnionError::bad_argument(
                        "whole-history pointers are not strictly increasing",
                    ));
                }
            }
            prev_addr = Some(phys_addr);
            pointers.push(RecordPointer { phys_addr, record_size });
        }
        Ok(Self { pointers })
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

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> WholeHistory {
        WholeHistory {
            pointers: vec![
                RecordPointer { phys_addr: 40, record_size: 100 },
                RecordPointer { phys_addr: 140, record_size: 120 },
            ],
        }
    }

    #[test]
    fn empty_history_roundtrips() {
        let h = WholeHistory { pointers: vec![] };
        let bytes = h.encode();
        assert_eq!(bytes.len(), WholeHistory::encoded_len(0).unwrap());
        assert_eq!(WholeHistory::decode(&bytes).unwrap(), h);
    }

    #[test]
    fn two_phase_decode_matches_single_shot() {
        let h = sample();
        let bytes = h.encode();
        let fixed = WholeHistory::decode_fixed(&bytes[..FIXED_PREFIX_LEN]).unwrap();
        assert_eq!(fixed.n_revisions, 2);
        assert_eq!(fixed.total_len, bytes.len());
        let full = WholeHistory::decode_tail(&bytes, &fixed).unwrap();
        assert_eq!(full, h);
    }

    #[test]
    fn encode_decode_is_byte_identical() {
        let h = sample();
        let bytes = h.encode();
        let decoded = WholeHistory::decode(&bytes).unwrap();
        assert_eq!(decoded.encode(), bytes);
    }

    #[test]
    fn huge_revision_count_is_rejected_without_overflow() {
        let mut prefix = Vec::with_capacity(FIXED_PREFIX_LEN);
        prefix.extend_from_slice(&MAGIC);
        prefix.push(VERSION);
        prefix.extend_from_slice(&[0u8; 3]);
        prefix.extend_from_slice(&u64::MAX.to_le_bytes());
        assert!(WholeHistory::decode_fixed(&prefix).is_err());
    }

    #[test]
    fn rejects_non_increasing_pointers() {
        let h = WholeHistory {
            pointers: vec![
                RecordPointer { phys_addr: 100, record_size: 10 },
                RecordPointer { phys_addr: 50, record_size: 10 },
            ],
        };
        let bytes = h.encode();
        assert!(WholeHistory::decode(&bytes).is_err());
    }

    #[test]
    fn rejects_entry_checksum_corruption() {
        let h = sample();
        let mut bytes = h.encode();
        bytes[FIXED_PREFIX_LEN] ^= 0xff;
        assert!(WholeHistory::decode(&bytes).is_err());
    }
}
