//! Revision index: the hashed, live page map for the revision currently
//! being authored.
//!
//! Each bucket owns its chain as a plain `Vec<IndexEntry>` rather than a
//! linked list of heap nodes — `Vec`'s ownership already gives deterministic,
//! non-shared drop order, which is what the chain-of-nodes design is after.
//! Doubling the table just walks every bucket's `Vec` and re-homes each entry
//! under the new mask.

use crate::error::{OnionError, Result};
use crate::format::IndexEntry;

const INITIAL_BUCKET_COUNT: usize = 1 << 10;

/// Hashed, chained page map for the in-progress revision.
pub struct RevisionIndex {
    buckets: Vec<Vec<IndexEntry>>,
    entries: usize,
    populated_buckets: usize,
}

impl Default for RevisionIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl RevisionIndex {
    #[must_use]
    pub fn new() -> Self {
        Self {
            buckets: (0..INITIAL_BUCKET_COUNT).map(|_| Vec::new()).collect(),
            entries: 0,
            populated_buckets: 0,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    #[must_use]
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    fn bucket_of(&self, logi_addr: u64) -> usize {
        (logi_addr as usize) & (self.buckets.len() - 1)
    }

    fn should_resize(&self) -> bool {
        self.entries >= 2 * self.buckets.len() || self.populated_buckets >= self.buckets.len() / 2
    }

    fn resize(&mut self) {
        let new_len = self.buckets.len() * 2;
        let mut new_buckets: Vec<Vec<IndexEntry>> = (0..new_len).map(|_| Vec::new()).collect();
        let mut populated = 0;
        for chain in self.buckets.drain(..) {
            for entry in chain {
                let key = (entry.logi_addr as usize) & (new_len - 1);
                if new_buckets[key].is_empty() {
                    populated += 1;
                }
                new_buckets[key].push(entry);
            }
        }
        crate::dev_trace!("revision index resized to {} buckets", new_len);
        self.buckets = new_buckets;
        self.populated_buckets = populated;
    }

    /// Inserts `entry`. Re-inserting the same `(logi_addr, phys_addr)` pair is
    /// a no-op; inserting the same `logi_addr` with a different `phys_addr` is
    /// a hard error, not an overwrite — a logical page is assigned exactly one
    /// physical slot for the lifetime of the revision being authored.
    ///
    /// # Errors
    /// Returns `BadArgument` if `entry.logi_addr` is already present with a
    /// different `phys_addr`.
    pub fn insert(&mut self, entry: IndexEntry) -> Result<()> {
        if let Some(err) = self.validate_error(entry.logi_addr, entry.phys_addr) {
            return Err(err);
        }
        if self.should_resize() {
            self.resize();
        }
        let key = self.bucket_of(entry.logi_addr);
        let chain = &mut self.buckets[key];
        if chain.iter().any(|e| e.logi_addr == entry.logi_addr) {
            return Ok(());
        }
        if chain.is_empty() {
            self.populated_buckets += 1;
        }
        chain.push(entry);
        self.entries += 1;
        Ok(())
    }

    #[must_use]
    pub fn find(&self, logi_addr: u64) -> Option<IndexEntry> {
        let key = self.bucket_of(logi_addr);
        self.buckets[key].iter().copied().find(|e| e.logi_addr == logi_addr)
    }

    /// Every entry across every bucket, in no particular order. Used by the
    /// merge step to build the scratch array.
    pub fn iter(&self) -> impl Iterator<Item = IndexEntry> + '_ {
        self.buckets.iter().flatten().copied()
    }

    #[must_use]
    pub fn validate_error(&self, logi_addr: u64, phys_addr: u64) -> Option<OnionError> {
        self.find(logi_addr).filter(|e| e.phys_addr != phys_addr).map(|e| {
            OnionError::bad_argument(format!(
                "revision index conflict at logi_addr {logi_addr}: existing phys_addr {} vs {phys_addr}",
                e.phys_addr
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::{drain_trace, enable_trace_sink};

    fn entry(logi_addr: u64, phys_addr: u64) -> IndexEntry {
        IndexEntry { logi_addr, phys_addr }
    }

    #[test]
    fn insert_then_find_roundtrips() {
        let mut idx = RevisionIndex::new();
        idx.insert(entry(4096, 200)).unwrap();
        assert_eq!(idx.find(4096), Some(entry(4096, 200)));
        assert_eq!(idx.len(), 1);
    }

    #[test]
    fn reinserting_same_pair_is_noop() {
        let mut idx = RevisionIndex::new();
        idx.insert(entry(0, 10)).unwrap();
        idx.insert(entry(0, 10)).unwrap();
        assert_eq!(idx.len(), 1);
    }

    #[test]
    fn reinserting_different_phys_addr_is_a_hard_error() {
        let mut idx = RevisionIndex::new();
        idx.insert(entry(0, 10)).unwrap();
        assert!(idx.insert(entry(0, 20)).is_err());
        assert_eq!(idx.len(), 1);
        assert_eq!(idx.find(0), Some(entry(0, 10)));
    }

    #[test]
    fn find_missing_returns_none() {
        let idx = RevisionIndex::new();
        assert_eq!(idx.find(4096), None);
    }

    #[test]
    fn table_doubles_once_entries_pass_threshold() {
        let _g = enable_trace_sink();
        let mut idx = RevisionIndex::new();
        let initial_buckets = idx.bucket_count();
        for i in 0..(2 * initial_buckets as u64 + 1) {
            idx.insert(entry(i * 4096, i)).unwrap();
        }
        assert!(idx.bucket_count() > initial_buckets);
        assert!(drain_trace().iter().any(|m| m.contains("resized")));
    }

    #[test]
    fn all_entries_survive_a_resize() {
        let mut idx = RevisionIndex::new();
        let n = 4000u64;
        for i in 0..n {
            idx.insert(entry(i * 4096, i)).unwrap();
        }
        assert_eq!(idx.len(), n as usize);
        for i in 0..n {
            assert_eq!(idx.find(i * 4096), Some(entry(i * 4096, i)));
        }
    }

    #[test]
    fn validate_error_flags_conflicting_phys_addr() {
        let mut idx = RevisionIndex::new();
        idx.insert(entry(0, 10)).unwrap();
        assert!(idx.validate_error(0, 99).is_some());
        assert!(idx.validate_error(0, 10).is_none());
        assert!(idx.validate_error(4096, 1).is_none());
    }
}
