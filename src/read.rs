//! Page-by-page read path.
//!
//! Source resolution per touched page, strictly in this order: the live
//! revision index (if open for write), then the committed archival index,
//! then the canonical file (zero-filled past `origin_eof`).

use crate::archival_index::ArchivalIndex;
use crate::backend::RawBackend;
use crate::error::Result;
use crate::revision_index::RevisionIndex;

/// One page-sized source to satisfy a read, computed by [`plan_pages`].
/// Shared with the write path, which touches the same page slices.
pub(crate) struct PageRead {
    pub(crate) page_start: u64,
    pub(crate) head_gap: u64,
    pub(crate) chunk: u64,
}

pub(crate) fn plan_pages(offset: u64, len: u64, page_size: u64) -> Vec<PageRead> {
    if len == 0 {
        return Vec::new();
    }
    let first_page = offset / page_size;
    let last_byte = offset + len - 1;
    let last_page = last_byte / page_size;
    let n_pages = (last_page - first_page + 1) as usize;

    let mut plans = Vec::with_capacity(n_pages);
    let mut remaining = len;
    for i in 0..n_pages {
        let page = first_page + i as u64;
        let page_start = page * page_size;
        let head_gap = if i == 0 { offset - page_start } else { 0 };
        let available_in_page = page_size - head_gap;
        let chunk = remaining.min(available_in_page);
        plans.push(PageRead { page_start, head_gap, chunk });
        remaining -= chunk;
    }
    debug_assert_eq!(remaining, 0);
    plans
}

/// Reads `len` bytes starting at logical `offset`, consulting (in order) the
/// live revision index, the committed archival index, and the canonical
/// file. Bytes beyond `origin_eof` and not covered by either index are
/// zero-filled.
///
/// # Errors
/// Returns an error if any backing read fails.
#[allow(clippy::too_many_arguments)]
pub fn read_range(
    canonical: &mut dyn RawBackend,
    onion: &mut dyn RawBackend,
    revision_index: Option<&RevisionIndex>,
    archival_index: &ArchivalIndex,
    page_size: u64,
    origin_eof: u64,
    offset: u64,
    len: u64,
) -> Result<Vec<u8>> {
    if len == 0 {
        return Ok(Vec::new());
    }
    let mut out = Vec::with_capacity(len as usize);
    for plan in plan_pages(offset, len, page_size) {
        let page_addr = plan.page_start;
        let chunk = plan.chunk as usize;

        if let Some(entry) = revision_index.and_then(|idx| idx.find(page_addr)) {
            let bytes = onion.read(entry.phys_addr + plan.head_gap, chunk)?;
            out.extend_from_slice(&bytes);
            continue;
        }
        if let Some(entry) = archival_index.find(page_addr) {
            let bytes = onion.read(entry.phys_addr + plan.head_gap, chunk)?;
            out.extend_from_slice(&bytes);
            continue;
        }

        let start = page_addr + plan.head_gap;
        let available = origin_eof.saturating_sub(start).min(plan.chunk) as usize;
        if available > 0 {
            let bytes = canonical.read(start, available)?;
            out.extend_from_slice(&bytes);
        }
        out.resize(out.len() + (chunk - available), 0);
    }
    Ok(out)
}
