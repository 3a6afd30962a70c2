//! Page-by-page write path.
//!
//! A page already present in the revision index is rewritten in place at its
//! existing physical slot (the dedup-on-rewrite contract: one revision never
//! allocates two slots for the same page). A page touched for the first time
//! this revision gets a fresh slot at `history_eof`, seeded from the archival
//! index or the canonical file before the new bytes are overlaid.

use crate::archival_index::ArchivalIndex;
use crate::backend::RawBackend;
use crate::error::Result;
use crate::format::IndexEntry;
use crate::read::plan_pages;
use crate::revision_index::RevisionIndex;

/// Applies `data` at logical `offset`, mutating `revision_index` and
/// `history_eof` (and, transitively through `revision_index`, what the next
/// read of this session will see).
///
/// # Errors
/// Returns an error if any backing read/write fails, or if a page is already
/// present in `revision_index` under a conflicting physical address.
#[allow(clippy::too_many_arguments)]
pub fn write_range(
    canonical: &mut dyn RawBackend,
    onion: &mut dyn RawBackend,
    revision_index: &mut RevisionIndex,
    archival_index: &ArchivalIndex,
    page_size: u64,
    origin_eof: u64,
    history_eof: &mut u64,
    logi_eof: &mut u64,
    offset: u64,
    data: &[u8],
) -> Result<()> {
    if data.is_empty() {
        return Ok(());
    }
    let page_size_usize = page_size as usize;
    let mut consumed = 0usize;

    for plan in plan_pages(offset, data.len() as u64, page_size) {
        let page_addr = plan.page_start;
        let head_gap = plan.head_gap as usize;
        let chunk = plan.chunk as usize;
        let tail_gap = page_size_usize - head_gap - chunk;
        let incoming = &data[consumed..consumed + chunk];
        consumed += chunk;

        if let Some(existing) = revision_index.find(page_addr) {
            let mut page_buf = if head_gap != 0 || tail_gap != 0 {
                onion.read(existing.phys_addr, page_size_usize)?
            } else {
                vec![0u8; page_size_usize]
            };
            page_buf[head_gap..head_gap + chunk].copy_from_slice(incoming);
            onion.write(existing.phys_addr, &page_buf)?;
            continue;
        }

        let mut page_buf = vec![0u8; page_size_usize];
        if let Some(arch) = archival_index.find(page_addr) {
            page_buf = onion.read(arch.phys_addr, page_size_usize)?;
        } else {
            let available = origin_eof.saturating_sub(page_addr).min(page_size) as usize;
            if available > 0 {
                let bytes = canonical.read(page_addr, available)?;
                page_buf[..available].copy_from_slice(&bytes);
            }
        }
        page_buf[head_gap..head_gap + chunk].copy_from_slice(incoming);

        let phys_addr = *history_eof;
        onion.write(phys_addr, &page_buf)?;
        revision_index.insert(IndexEntry { logi_addr: page_addr, phys_addr })?;
        *history_eof += page_size;
    }

    *logi_eof = (*logi_eof).max(offset + data.len() as u64);
    Ok(())
}
