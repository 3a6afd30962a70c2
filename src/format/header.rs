//! On-disk header: 40 bytes at offset 0 of the onion file.
//!
//! ```text
//! "OHDH" | ver:u8 | flags:u24 | page_size:u32
//!       | origin_eof:u64 | whole_history_addr:u64 | whole_history_size:u64
//!       | checksum:u32
//! ```

use crate::checksum::fletcher32;
use crate::error::{CorruptReason, OnionError, Result};

pub const MAGIC: [u8; 4] = *b"OHDH";
pub const VERSION: u8 = 1;
pub const ENCODED_LEN: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub flags: u32,
    pub page_size: u32,
    pub origin_eof: u64,
    pub whole_history_addr: u64,
    pub whole_history_size: u64,
}

impl Header {
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(ENCODED_LEN);
        buf.extend_from_slice(&MAGIC);
        buf.push(VERSION);
        let flags24 = self.flags & 0x00ff_ffff;
        buf.extend_from_slice(&flags24.to_le_bytes()[..3]);
        buf.extend_from_slice(&self.page_size.to_le_bytes());
        buf.extend_from_slice(&self.origin_eof.to_le_bytes());
        buf.extend_from_slice(&self.whole_history_addr.to_le_bytes());
        buf.extend_from_slice(&self.whole_history_size.to_le_bytes());
        let checksum = fletcher32(&buf);
        buf.extend_from_slice(&checksum.to_le_bytes());
        debug_assert_eq!(buf.len(), ENCODED_LEN);
        buf
    }

    /// # Errors
    /// Returns `Corrupt` on bad signature, unsupported version, or checksum
    /// mismatch; `BadArgument` if `buf` is shorter than the fixed header size.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < ENCODED_LEN {
            return Err(OnionError::bad_argument("header buffer shorter than 40 bytes"));
        }
        if buf[0..4] != MAGIC {
            return Err(OnionError::corrupt(0, CorruptReason::BadSignature));
        }
        if buf[4] != VERSION {
            return Err(OnionError::corrupt(0, CorruptReason::UnsupportedVersion));
        }
        let expected = fletcher32(&buf[0..36]);
        let actual = u32::from_le_bytes(buf[36..40].try_into().unwrap());
        if expected != actual {
            return Err(OnionError::corrupt(0, CorruptReason::ChecksumMismatch));
        }
        let mut flag_bytes = [0u8; 4];
        flag_bytes[..3].copy_from_slice(&buf[5..8]);
        let flags = u32::from_le_bytes(flag_bytes);
        let page_size = u32::from_le_bytes(buf[8..12].try_into().unwrap());
        let origin_eof = u64::from_le_bytes(buf[12..20].try_into().unwrap());
        let whole_history_addr = u64::from_le_bytes(buf[20..28].try_into().unwrap());
        let whole_history_size = u64::from_le_bytes(buf[28..36].try_into().unwrap());
        Ok(Self { flags, page_size, origin_eof, whole_history_addr, whole_history_size })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Header {
        Header { flags: 0b101, page_size: 4096, origin_eof: 1024, whole_history_addr: 4096, whole_history_size: 20 }
    }

    #[test]
    fn encode_decode_roundtrips() {
        let h = sample();
        let bytes = h.encode();
        assert_eq!(bytes.len(), ENCODED_LEN);
        let decoded = Header::decode(&bytes).unwrap();
        assert_eq!(decoded, h);
    }

    #[test]
    fn encode_then_decode_is_byte_identical() {
        let h = sample();
        let bytes = h.encode();
        let decoded = Header::decode(&bytes).unwrap();
        assert_eq!(decoded.encode(), bytes);
    }

    #[test]
    fn rejects_bad_signature() {
        let mut bytes = sample().encode();
        bytes[0] = b'X';
        assert!(matches!(
            Header::decode(&bytes),
            Err(OnionError::Corrupt { reason: CorruptReason::BadSignature, .. })
        ));
    }

    #[test]
    fn rejects_unsupported_version() {
        let mut bytes = sample().encode();
        bytes[4] = VERSION + 1;
        assert!(matches!(
            Header::decode(&bytes),
            Err(OnionError::Corrupt { reason: CorruptReason::UnsupportedVersion, .. })
        ));
    }

    #[test]
    fn rejects_checksum_mismatch() {
        let mut bytes = sample().encode();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        assert!(matches!(
            Header::decode(&bytes),
            Err(OnionError::Corrupt { reason: CorruptReason::ChecksumMismatch, .. })
        ));
    }

    #[test]
    fn flags_are_truncated_to_24_bits() {
        let h = Header { flags: 0xff_ab_cd_ef, ..sample() };
        let bytes = h.encode();
        let decoded = Header::decode(&bytes).unwrap();
        assert_eq!(decoded.flags, 0x00_ab_cd_ef);
    }
}
