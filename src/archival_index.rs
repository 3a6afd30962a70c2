//! Archival index: the sorted, immutable page map belonging to one committed
//! revision.

use crate::error::{OnionError, Result};
use crate::format::IndexEntry;

/// A committed revision's logical-page → physical-offset map, strictly
/// ascending by `logi_addr`, no duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchivalIndex {
    entries: Vec<IndexEntry>,
}

impl ArchivalIndex {
    /// Builds an index from entries already known to be sorted and
    /// deduplicated (e.g. the output of [`crate::merge::merge`]).
    ///
    /// # Errors
    /// Returns `BadArgument` if `entries` is not strictly ascending by
    /// `logi_addr`.
    pub fn from_sorted(entries: Vec<IndexEntry>) -> Result<Self> {
        for pair in entries.windows(2) {
            if pair[0].logi_addr >= pair[1].logi_addr {
                return Err(OnionError::bad_argument(
                    "archival index entries must be strictly ascending by logi_addr",
                ));
            }
        }
        Ok(Self { entries })
    }

    #[must_use]
    pub fn empty() -> Self {
        Self { entries: Vec::new() }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Binary-search lookup by logical address. Out-of-range addresses
    /// return `None` without scanning.
    #[must_use]
    pub fn find(&self, logi_addr: u64) -> Option<IndexEntry> {
        match self.entries.first() {
            None => return None,
            Some(first) if logi_addr < first.logi_addr => return None,
            _ => {}
        }
        match self.entries.last() {
            Some(last) if logi_addr > last.logi_addr => return None,
            _ => {}
        }
        self.entries
            .binary_search_by_key(&logi_addr, |e| e.logi_addr)
            .ok()
            .map(|i| self.entries[i])
    }
}
