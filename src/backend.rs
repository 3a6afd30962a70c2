//! Pluggable raw-I/O backend for the three byte streams the engine touches:
//! the canonical file, the onion file, and the recovery file.
//!
//! The engine never calls `std::fs` directly outside of [`FileBackend`] — every
//! read, write, and end-of-addressable tracking call goes through [`RawBackend`].
//! This keeps the storage format testable against something other than a real
//! filesystem, with the backend itself as an external, swappable
//! collaborator.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::{OnionError, Result};

/// A single opened byte stream: read/write at arbitrary offsets, track EOF/EOA.
pub trait RawBackend: Send {
    /// Reads exactly `size` bytes starting at `offset`.
    ///
    /// # Errors
    /// Returns an error if the read is short or the underlying I/O fails.
    fn read(&mut self, offset: u64, size: usize) -> Result<Vec<u8>>;

    /// Writes `data` starting at `offset`, extending the file if necessary.
    ///
    /// # Errors
    /// Returns an error if the underlying I/O fails.
    fn write(&mut self, offset: u64, data: &[u8]) -> Result<()>;

    /// Current size of the underlying file.
    fn eof(&self) -> u64;

    /// Current end-of-addressable offset (may exceed `eof` after a `set_eoa`
    /// that hasn't been backed by a write yet).
    fn eoa(&self) -> u64;

    /// Extends the end-of-addressable offset. Never shrinks it.
    ///
    /// # Errors
    /// Returns an error if `eoa` would move backwards.
    fn set_eoa(&mut self, eoa: u64) -> Result<()>;
}

/// Factory for opening a [`RawBackend`] at a path, supplied by the embedder.
pub trait BackendFactory: Send {
    /// # Errors
    /// Returns an error if the backend cannot be opened.
    fn open(&self, path: &Path, create: bool) -> Result<Box<dyn RawBackend>>;

    /// Removes the backing object at `path` (used to unlink the recovery
    /// file on clean commit).
    ///
    /// # Errors
    /// Returns an error if the underlying remove fails.
    fn remove(&self, path: &Path) -> Result<()>;
}

/// Default backend: an OS file opened via `std::fs`.
pub struct FileBackend {
    file: File,
    eof: u64,
    eoa: u64,
}

impl FileBackend {
    /// # Errors
    /// Returns an error if the file cannot be opened (and, if `create` is
    /// false, if it does not already exist).
    pub fn open(path: &Path, create: bool) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(create)
            .truncate(false)
            .open(path)?;
        let eof = file.metadata()?.len();
        Ok(Self { file, eof, eoa: eof })
    }
}

/// Opens backing files directly off the filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileBackendFactory;

impl BackendFactory for FileBackendFactory {
    fn open(&self, path: &Path, create: bool) -> Result<Box<dyn RawBackend>> {
        Ok(Box::new(FileBackend::open(path, create)?))
    }

    fn remove(&self, path: &Path) -> Result<()> {
        std::fs::remove_file(path)?;
        Ok(())
    }
}

impl RawBackend for FileBackend {
    fn read(&mut self, offset: u64, size: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; size];
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn write(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(data)?;
        self.file.sync_data()?;
        let end = offset + data.len() as u64;
        if end > self.eof {
            self.eof = end;
        }
        if end > self.eoa {
            self.eoa = end;
        }
        Ok(())
    }

    fn eof(&self) -> u64 {
        self.eof
    }

    fn eoa(&self) -> u64 {
        self.eoa
    }

    fn set_eoa(&mut self, eoa: u64) -> Result<()> {
        if eoa < self.eoa {
            return Err(OnionError::bad_argument(format!(
                "set_eoa would move eoa backwards: {eoa} < {}",
                self.eoa
            )));
        }
        self.eoa = eoa;
        Ok(())
    }
}

/// Derives the onion and recovery sidecar paths from the canonical file path.
#[must_use]
pub fn sidecar_paths(canonical: &Path) -> (PathBuf, PathBuf) {
    let mut onion = canonical.as_os_str().to_owned();
    onion.push(".onion");
    let onion = PathBuf::from(onion);
    let mut recovery = onion.as_os_str().to_owned();
    recovery.push(".recovery");
    (onion, PathBuf::from(recovery))
}
