//! Open/commit orchestrator: wires the codecs, indices, and read/write
//! paths together into the single type embedders touch, `OnionHandle`.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::archival_index::ArchivalIndex;
use crate::backend::{sidecar_paths, BackendFactory, RawBackend};
use crate::config::{CreationFlags, OnionConfig, RevisionSelector};
use crate::error::{OnionError, Result};
use crate::format::header::ENCODED_LEN as HEADER_ENCODED_LEN;
use crate::format::{Header, RevisionRecord, WholeHistory};
use crate::io as onion_io;
use crate::merge;
use crate::read::read_range;
use crate::revision_index::RevisionIndex;
use crate::write::write_range;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpenMode {
    ReadOnly,
    ReadWrite,
}

fn align_up(n: u64, page_size: u64) -> u64 {
    let rem = n % page_size;
    if rem == 0 {
        n
    } else {
        n + (page_size - rem)
    }
}

/// A cheap, read-only snapshot of engine state, for diagnostics and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    pub revision_id: u64,
    pub parent_revision_id: u64,
    pub logi_eof: u64,
    pub history_eof: u64,
    pub archival_entries: usize,
    pub revision_entries: usize,
    pub revision_buckets: usize,
}

/// An open onion-backed file: either a read-only view of one committed
/// revision, or a read/write session authoring the next one.
pub struct OnionHandle {
    canonical: Box<dyn RawBackend>,
    onion: Box<dyn RawBackend>,
    recovery: Option<Box<dyn RawBackend>>,
    recovery_path: PathBuf,
    backend_factory: Box<dyn BackendFactory>,

    mode: OpenMode,
    header: Header,
    whole_history: WholeHistory,
    /// Base archival index reads and writes resolve against once the
    /// revision index misses: the opened revision's own map in read-only
    /// mode, the parent's map in read/write mode.
    archival_index: ArchivalIndex,
    revision_index: Option<RevisionIndex>,

    revision_id: u64,
    parent_revision_id: u64,
    page_size: u32,
    user_id: u32,
    username: Option<String>,
    comment: Option<String>,
    divergent_history: bool,
    page_alignment: bool,

    origin_eof: u64,
    logi_eof: u64,
    history_eof: u64,
}

impl OnionHandle {
    /// Creates a brand-new onion file (and its canonical sentinel) and opens
    /// it for writing the root revision.
    ///
    /// # Errors
    /// Returns `BadArgument` if `config` fails validation; `Io` if any
    /// backing file cannot be created.
    pub fn open_create_truncate(canonical_path: &Path, config: OnionConfig) -> Result<Self> {
        config.validate()?;
        let (onion_path, recovery_path) = sidecar_paths(canonical_path);

        let mut canonical = config.backend.open(canonical_path, true)?;
        let mut onion = config.backend.open(&onion_path, true)?;
        let mut recovery = config.backend.open(&recovery_path, true)?;

        log::info!("creating onion file at {}", onion_path.display());

        let sentinel = b"ONIONEOF";
        canonical.write(0, sentinel)?;
        let origin_eof = sentinel.len() as u64;

        onion_io::write_whole_history(&mut *recovery, 0, &WholeHistory { pointers: vec![] })?;

        let write_lock = true;
        let header = Header {
            flags: config.creation_flags.pack(write_lock),
            page_size: config.page_size,
            origin_eof,
            whole_history_addr: 0,
            whole_history_size: 0,
        };
        onion_io::write_header(&mut *onion, &header)?;

        let mut history_eof = HEADER_ENCODED_LEN as u64;
        if config.creation_flags.page_alignment {
            history_eof = align_up(history_eof, u64::from(config.page_size));
        }

        Ok(Self {
            canonical,
            onion,
            recovery: Some(recovery),
            recovery_path,
            backend_factory: config.backend,
            mode: OpenMode::ReadWrite,
            header,
            whole_history: WholeHistory { pointers: vec![] },
            archival_index: ArchivalIndex::empty(),
            revision_index: Some(RevisionIndex::new()),
            revision_id: 0,
            parent_revision_id: 0,
            page_size: config.page_size,
            user_id: config.user_id,
            username: config.username,
            comment: config.comment,
            divergent_history: config.creation_flags.divergent_history,
            page_alignment: config.creation_flags.page_alignment,
            origin_eof,
            logi_eof: 0,
            history_eof,
        })
    }

    fn open_existing_for_read(
        canonical_path: &Path,
        config: &OnionConfig,
    ) -> Result<(Box<dyn RawBackend>, Box<dyn RawBackend>, PathBuf, Header, WholeHistory, RevisionRecord)> {
        config.validate()?;
        let (onion_path, recovery_path) = sidecar_paths(canonical_path);
        let canonical = config.backend.open(canonical_path, false)?;
        let mut onion = config.backend.open(&onion_path, false)?;

        let header = onion_io::ingest_header(&mut *onion)?;
        let (_flags, write_lock) = CreationFlags::unpack(header.flags)?;
        if write_lock {
            return Err(OnionError::Unsupported(
                "onion file has an open write session (write-lock set)",
            ));
        }

        let whole_history = onion_io::ingest_whole_history(&mut *onion, header.whole_history_addr)?;
        let n_revisions = whole_history.pointers.len() as u64;
        if n_revisions == 0 {
            return Err(OnionError::bad_argument("onion file has no committed revisions"));
        }
        let revision_index = match config.revision {
            RevisionSelector::Latest => n_revisions - 1,
            RevisionSelector::Id(id) => {
                if id >= n_revisions {
                    return Err(OnionError::bad_argument(format!(
                        "requested revision {id} is out of range (0..{n_revisions})"
                    )));
                }
                id
            }
        };
        let pointer = whole_history.pointers[revision_index as usize];
        let record = onion_io::ingest_revision_record(&mut *onion, pointer.phys_addr)?;

        Ok((canonical, onion, recovery_path, header, whole_history, record))
    }

    /// Opens an existing onion file read-only at the configured revision
    /// (or the latest committed one).
    ///
    /// # Errors
    /// Returns `Unsupported` if the write-lock flag is set, `Corrupt` on any
    /// codec/checksum failure, `BadArgument` if the requested revision is
    /// out of range.
    pub fn open_read_only(canonical_path: &Path, config: OnionConfig) -> Result<Self> {
        let (canonical, onion, recovery_path, header, whole_history, record) =
            Self::open_existing_for_read(canonical_path, &config)?;
        log::info!("opened onion file read-only at revision {}", record.revision_id);

        let (flags, _write_lock) = CreationFlags::unpack(header.flags)?;
        let archival_index = ArchivalIndex::from_sorted(record.entries.clone())?;
        let history_eof = if flags.page_alignment {
            align_up(onion.eoa(), u64::from(header.page_size))
        } else {
            onion.eoa()
        };

        Ok(Self {
            canonical,
            onion,
            recovery: None,
            recovery_path,
            backend_factory: config.backend,
            mode: OpenMode::ReadOnly,
            header,
            whole_history,
            archival_index,
            revision_index: None,
            revision_id: record.revision_id,
            parent_revision_id: record.parent_revision_id,
            page_size: header.page_size,
            user_id: record.user_id,
            username: record.username,
            comment: record.comment,
            divergent_history: flags.divergent_history,
            page_alignment: flags.page_alignment,
            origin_eof: header.origin_eof,
            logi_eof: record.logi_eof,
            history_eof,
        })
    }

    /// Opens an existing onion file for writing the next revision atop the
    /// configured parent (or the latest committed one).
    ///
    /// # Errors
    /// Same as [`Self::open_read_only`], plus `Io` if the recovery file
    /// cannot be created.
    pub fn open_read_write(canonical_path: &Path, config: OnionConfig) -> Result<Self> {
        let (canonical, mut onion, recovery_path, mut header, whole_history, record) =
            Self::open_existing_for_read(canonical_path, &config)?;
        log::info!("opened onion file read/write atop revision {}", record.revision_id);

        let (flags, _write_lock) = CreationFlags::unpack(header.flags)?;
        let archival_index = ArchivalIndex::from_sorted(record.entries.clone())?;
        let history_eof = if flags.page_alignment {
            align_up(onion.eoa(), u64::from(header.page_size))
        } else {
            onion.eoa()
        };

        let mut recovery = config.backend.open(&recovery_path, true)?;
        onion_io::write_whole_history(&mut *recovery, 0, &whole_history)?;

        header.flags = flags.pack(true);
        onion_io::write_header(&mut *onion, &header)?;

        Ok(Self {
            canonical,
            onion,
            recovery: Some(recovery),
            recovery_path,
            backend_factory: config.backend,
            mode: OpenMode::ReadWrite,
            header,
            whole_history,
            archival_index,
            revision_index: Some(RevisionIndex::new()),
            revision_id: record.revision_id + 1,
            parent_revision_id: record.revision_id,
            page_size: header.page_size,
            user_id: config.user_id,
            username: config.username,
            comment: config.comment,
            divergent_history: flags.divergent_history,
            page_alignment: flags.page_alignment,
            origin_eof: header.origin_eof,
            logi_eof: record.logi_eof,
            history_eof,
        })
    }

    /// The page-aligned logical extent reads are allowed to address: zero
    /// when nothing has been written yet, otherwise `logi_eof` rounded up to
    /// the next page boundary (so a short write still exposes a full
    /// zero-padded final page, per scenario S1).
    #[must_use]
    pub fn logi_eoa(&self) -> u64 {
        if self.logi_eof == 0 {
            0
        } else {
            align_up(self.logi_eof, u64::from(self.page_size))
        }
    }

    /// Reads `len` bytes starting at logical `offset`.
    ///
    /// # Errors
    /// Returns `BadArgument` if `offset + len` exceeds the page-aligned
    /// logical end-of-addressable extent; otherwise propagates backend I/O
    /// errors.
    pub fn read(&mut self, offset: u64, len: u64) -> Result<Vec<u8>> {
        let logi_eoa = self.logi_eoa();
        let in_range = matches!(offset.checked_add(len), Some(end) if end <= logi_eoa);
        if !in_range {
            return Err(OnionError::bad_argument(format!(
                "read range [{offset}, {offset}+{len}) exceeds logical end-of-addressable {logi_eoa}"
            )));
        }
        read_range(
            &mut *self.canonical,
            &mut *self.onion,
            self.revision_index.as_ref(),
            &self.archival_index,
            u64::from(self.page_size),
            self.origin_eof,
            offset,
            len,
        )
    }

    /// Writes `data` at logical `offset`, extending `logi_eof` as needed.
    ///
    /// # Errors
    /// Returns `Unsupported` if this handle is read-only; otherwise
    /// propagates backend I/O errors.
    pub fn write(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        let revision_index = self
            .revision_index
            .as_mut()
            .ok_or(OnionError::Unsupported("handle is open read-only"))?;
        write_range(
            &mut *self.canonical,
            &mut *self.onion,
            revision_index,
            &self.archival_index,
            u64::from(self.page_size),
            self.origin_eof,
            &mut self.history_eof,
            &mut self.logi_eof,
            offset,
            data,
        )
    }

    /// Commits the in-progress revision (if any) and closes the handle.
    ///
    /// # Errors
    /// Propagates any codec or backend I/O failure. On failure, the header's
    /// write-lock flag is left set, matching the dirty-close policy.
    pub fn close(mut self) -> Result<()> {
        let Some(revision_index) = self.revision_index.take() else {
            log::info!("closed read-only onion handle at revision {}", self.revision_id);
            return Ok(());
        };
        self.commit(&revision_index)
    }

    fn commit(&mut self, revision_index: &RevisionIndex) -> Result<()> {
        log::info!("committing revision {}", self.revision_id);
        let creation_time: DateTime<Utc> = Utc::now();
        let merged = merge::merge(revision_index, &self.archival_index);

        let record = RevisionRecord {
            revision_id: self.revision_id,
            parent_revision_id: self.parent_revision_id,
            creation_time,
            logi_eof: self.logi_eof,
            page_size: self.page_size,
            user_id: self.user_id,
            username: self.username.clone(),
            comment: self.comment.clone(),
            entries: merged.entries().to_vec(),
        };

        let record_addr = self.history_eof;
        let record_len = onion_io::write_revision_record(&mut *self.onion, record_addr, &record)?;
        self.history_eof = record_addr + record_len;
        if self.page_alignment {
            self.history_eof = align_up(self.history_eof, u64::from(self.page_size));
        }

        self.whole_history
            .pointers
            .push(crate::format::RecordPointer { phys_addr: record_addr, record_size: record_len });

        let wh_addr = self.history_eof;
        onion_io::write_whole_history(&mut *self.onion, wh_addr, &self.whole_history)?;
        let wh_len = self.whole_history.encode().len() as u64;
        self.header.whole_history_addr = wh_addr;
        self.header.whole_history_size = wh_len;
        self.history_eof = wh_addr + wh_len;

        let flags = CreationFlags { divergent_history: self.divergent_history, page_alignment: self.page_alignment };
        self.header.flags = flags.pack(false);
        onion_io::write_header(&mut *self.onion, &self.header)?;

        self.recovery = None;
        self.backend_factory.remove(&self.recovery_path)?;

        log::info!("committed revision {} ({} archival entries)", self.revision_id, merged.len());
        Ok(())
    }

    #[must_use]
    pub fn divergent_history(&self) -> bool {
        self.divergent_history
    }

    #[must_use]
    pub fn logi_eof(&self) -> u64 {
        self.logi_eof
    }

    #[must_use]
    pub fn revision_id(&self) -> u64 {
        self.revision_id
    }

    /// The archival index entries visible to this handle: the opened
    /// revision's own map in read-only mode, the parent's map in read/write
    /// mode (reads and writes both resolve against it once the live
    /// revision index misses).
    #[must_use]
    pub fn archival_entries(&self) -> &[crate::format::IndexEntry] {
        self.archival_index.entries()
    }

    #[must_use]
    pub fn stats(&self) -> Stats {
        Stats {
            revision_id: self.revision_id,
            parent_revision_id: self.parent_revision_id,
            logi_eof: self.logi_eof,
            history_eof: self.history_eof,
            archival_entries: self.archival_index.len(),
            revision_entries: self.revision_index.as_ref().map_or(0, RevisionIndex::len),
            revision_buckets: self.revision_index.as_ref().map_or(0, RevisionIndex::bucket_count),
        }
    }
}
