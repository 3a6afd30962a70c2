//! Embedder-supplied configuration.
//!
//! This is a plain struct, not a property-list or a file/env-parsed config
//! object: file/env parsing is the embedding library's concern. This crate
//! only consumes an already-validated bag of options.

use crate::backend::{BackendFactory, FileBackendFactory};
use crate::error::{OnionError, Result};

/// Where committed history physically lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreTarget {
    /// History lives in a `.onion` sidecar file. The only supported target.
    OnionSidecar,
    /// History would live inside the canonical file itself. Reserved, always refused.
    CanonicalEmbedded,
}

/// Which revision to open for reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevisionSelector {
    Id(u64),
    Latest,
}

/// Header flag bits (at most 24 of the 32 encoded bits are ever meaningful).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CreationFlags {
    pub divergent_history: bool,
    pub page_alignment: bool,
}

impl CreationFlags {
    const WRITE_LOCK_BIT: u32 = 1 << 0;
    const DIVERGENT_HISTORY_BIT: u32 = 1 << 1;
    const PAGE_ALIGNMENT_BIT: u32 = 1 << 2;
    const KNOWN_BITS: u32 = Self::WRITE_LOCK_BIT | Self::DIVERGENT_HISTORY_BIT | Self::PAGE_ALIGNMENT_BIT;

    /// Packs these flags plus the write-lock bit into the header's 24-bit field.
    #[must_use]
    pub fn pack(self, write_lock: bool) -> u32 {
        let mut bits = 0u32;
        if write_lock {
            bits |= Self::WRITE_LOCK_BIT;
        }
        if self.divergent_history {
            bits |= Self::DIVERGENT_HISTORY_BIT;
        }
        if self.page_alignment {
            bits |= Self::PAGE_ALIGNMENT_BIT;
        }
        bits
    }

    /// Unpacks a 24-bit header flags field. Rejects unknown bits.
    ///
    /// # Errors
    /// Returns `BadArgument` if any bit outside the three known bits is set.
    pub fn unpack(bits: u32) -> Result<(Self, bool)> {
        if bits & !Self::KNOWN_BITS != 0 {
            return Err(OnionError::bad_argument(format!(
                "unknown header flag bits set: {:#x}",
                bits & !Self::KNOWN_BITS
            )));
        }
        let write_lock = bits & Self::WRITE_LOCK_BIT != 0;
        let flags = Self {
            divergent_history: bits & Self::DIVERGENT_HISTORY_BIT != 0,
            page_alignment: bits & Self::PAGE_ALIGNMENT_BIT != 0,
        };
        Ok((flags, write_lock))
    }
}

/// Full embedder configuration for opening an onion-backed file.
pub struct OnionConfig {
    pub page_size: u32,
    pub store_target: StoreTarget,
    pub revision: RevisionSelector,
    pub creation_flags: CreationFlags,
    pub comment: Option<String>,
    pub user_id: u32,
    pub username: Option<String>,
    pub backend: Box<dyn BackendFactory>,
}

impl OnionConfig {
    /// A config suitable for `open_create_truncate`, using the default
    /// OS-file backend and no flags set.
    #[must_use]
    pub fn new(page_size: u32, user_id: u32) -> Self {
        Self {
            page_size,
            store_target: StoreTarget::OnionSidecar,
            revision: RevisionSelector::Latest,
            creation_flags: CreationFlags::default(),
            comment: None,
            user_id,
            username: None,
            backend: Box::new(FileBackendFactory),
        }
    }

    #[must_use]
    pub fn with_creation_flags(mut self, flags: CreationFlags) -> Self {
        self.creation_flags = flags;
        self
    }

    #[must_use]
    pub fn with_revision(mut self, revision: RevisionSelector) -> Self {
        self.revision = revision;
        self
    }

    #[must_use]
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Validates the config fields this crate owns (page size, store target).
    /// Does not touch the backend or revision selector — those are validated
    /// at open time, where the on-disk state is available to check against.
    ///
    /// # Errors
    /// Returns `BadArgument` if `page_size` isn't a power of two in range, or
    /// `Unsupported` if `store_target` is `CanonicalEmbedded`.
    pub fn validate(&self) -> Result<()> {
        if self.store_target == StoreTarget::CanonicalEmbedded {
            return Err(OnionError::Unsupported(
                "canonical-embedded store target is reserved and unsupported",
            ));
        }
        let log2 = self.page_size.trailing_zeros();
        let is_pow2 = self.page_size != 0 && (self.page_size & (self.page_size - 1)) == 0;
        if !is_pow2 || !(9..=22).contains(&log2) {
            return Err(OnionError::bad_argument(format!(
                "page_size {} must be a power of two with 9 <= log2 <= 22",
                self.page_size
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_roundtrip_through_pack_unpack() {
        let flags = CreationFlags { divergent_history: true, page_alignment: false };
        let bits = flags.pack(true);
        let (unpacked, write_lock) = CreationFlags::unpack(bits).unwrap();
        assert_eq!(unpacked, flags);
        assert!(write_lock);
    }

    #[test]
    fn unpack_rejects_unknown_bits() {
        assert!(CreationFlags::unpack(1 << 5).is_err());
    }

    #[test]
    fn validate_rejects_non_power_of_two_page_size() {
        let cfg = OnionConfig::new(513, 0);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_page_size_out_of_log2_range() {
        let cfg = OnionConfig::new(256, 0);
        assert!(cfg.validate().is_err());
        let cfg = OnionConfig::new(1 << 23, 0);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_accepts_in_range_power_of_two() {
        let cfg = OnionConfig::new(4096, 0);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn validate_rejects_canonical_embedded_target() {
        let mut cfg = OnionConfig::new(512, 0);
        cfg.store_target = StoreTarget::CanonicalEmbedded;
        assert!(matches!(cfg.validate(), Err(OnionError::Unsupported(_))));
    }
}
