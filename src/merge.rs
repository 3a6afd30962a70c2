//! Archival/revision merge: fold a revision index into its parent's
//! archival index to produce the committing revision's own archival index.

use crate::archival_index::ArchivalIndex;
use crate::format::IndexEntry;
use crate::revision_index::RevisionIndex;

/// Merges `revision` into `parent`, producing a new, sorted archival index
/// containing every entry from `revision` plus every entry from `parent`
/// whose logical address does not appear in `revision`.
#[must_use]
pub fn merge(revision: &RevisionIndex, parent: &ArchivalIndex) -> ArchivalIndex {
    let mut scratch: Vec<IndexEntry> = revision.iter().collect();
    scratch.sort_unstable_by_key(|e| e.logi_addr);

    let superseded = |logi_addr: u64| scratch.binary_search_by_key(&logi_addr, |e| e.logi_addr).is_ok();

    let mut merged: Vec<IndexEntry> =
        parent.entries().iter().filter(|e| !superseded(e.logi_addr)).copied().collect();
    merged.extend(scratch);
    merged.sort_unstable_by_key(|e| e.logi_addr);

    ArchivalIndex::from_sorted(merged).expect("merge output is constructed sorted and deduplicated")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(logi_addr: u64, phys_addr: u64) -> IndexEntry {
        IndexEntry { logi_addr, phys_addr }
    }

    #[test]
    fn merge_keeps_non_superseded_parent_entries() {
        let parent = ArchivalIndex::from_sorted(vec![entry(0, 10), entry(4096, 20), entry(8192, 30)]).unwrap();
        let mut revision = RevisionIndex::new();
        revision.insert(entry(4096, 99)).unwrap();

        let merged = merge(&revision, &parent);
        assert_eq!(merged.entries(), &[entry(0, 10), entry(4096, 99), entry(8192, 30)]);
    }

    #[test]
    fn merge_adds_brand_new_pages() {
        let parent = ArchivalIndex::empty();
        let mut revision = RevisionIndex::new();
        revision.insert(entry(0, 10)).unwrap();
        revision.insert(entry(4096, 20)).unwrap();

        let merged = merge(&revision, &parent);
        assert_eq!(merged.entries(), &[entry(0, 10), entry(4096, 20)]);
    }

    #[test]
    fn merge_of_empty_revision_is_identity() {
        let parent = ArchivalIndex::from_sorted(vec![entry(0, 1), entry(512, 2)]).unwrap();
        let revision = RevisionIndex::new();
        let merged = merge(&revision, &parent);
        assert_eq!(merged, parent);
    }

    #[test]
    fn merged_output_is_always_ascending() {
        let parent = ArchivalIndex::from_sorted(vec![entry(1024, 1), entry(2048, 2), entry(3072, 3)]).unwrap();
        let mut revision = RevisionIndex::new();
        revision.insert(entry(512, 9)).unwrap();
        revision.insert(entry(2048, 8)).unwrap();
        revision.insert(entry(4096, 7)).unwrap();

        let merged = merge(&revision, &parent);
        let addrs: Vec<u64> = merged.entries().iter().map(|e| e.logi_addr).collect();
        let mut sorted = addrs.clone();
        sorted.sort_unstable();
        assert_eq!(addrs, sorted);
        assert_eq!(addrs, vec![512, 1024, 2048, 3072, 4096]);
    }
}
