//! Onion-file I/O: ingest (read + two-phase decode + checksum verify)
//! and write-back for the header, whole-history, and revision record.
//!
//! Every ingest call bounds-checks `addr + size <= backend.eof()` before
//! reading, and every write call extends the backend's end-of-addressable
//! offset when it writes past the current one.

use crate::backend::RawBackend;
use crate::error::{OnionError, Result};
use crate::format::{header, record, whole_history, Header, RevisionRecord, WholeHistory};

fn bounds_check(backend: &dyn RawBackend, addr: u64, size: u64) -> Result<()> {
    let end = addr.checked_add(size).ok_or_else(|| OnionError::bad_argument("offset+size overflows u64"))?;
    if end > backend.eof() {
        return Err(OnionError::corrupt(addr, crate::error::CorruptReason::CountMismatch));
    }
    Ok(())
}

/// # Errors
/// See [`Header::decode`]; also fails if the backend is shorter than 40 bytes.
pub fn ingest_header(backend: &mut dyn RawBackend) -> Result<Header> {
    bounds_check(backend, 0, header::ENCODED_LEN as u64)?;
    let buf = backend.read(0, header::ENCODED_LEN)?;
    Header::decode(&buf)
}

/// # Errors
/// Returns an error if the backend write fails.
pub fn write_header(backend: &mut dyn RawBackend, header: &Header) -> Result<()> {
    let buf = header.encode();
    backend.write(0, &buf)?;
    if backend.eoa() < buf.len() as u64 {
        backend.set_eoa(buf.len() as u64)?;
    }
    Ok(())
}

/// # Errors
/// See [`WholeHistory::decode_fixed`] / [`WholeHistory::decode_tail`].
pub fn ingest_whole_history(backend: &mut dyn RawBackend, addr: u64) -> Result<WholeHistory> {
    bounds_check(backend, addr, whole_history::FIXED_PREFIX_LEN as u64)?;
    let prefix = backend.read(addr, whole_history::FIXED_PREFIX_LEN)?;
    let fixed = WholeHistory::decode_fixed(&prefix)?;
    bounds_check(backend, addr, fixed.total_len as u64)?;
    let full = backend.read(addr, fixed.total_len)?;
    let history = WholeHistory::decode_tail(&full, &fixed)?;
    let end = addr + fixed.total_len as u64;
    if backend.eoa() < end {
        backend.set_eoa(end)?;
    }
    Ok(history)
}

/// # Errors
/// Returns an error if the backend write fails.
pub fn write_whole_history(backend: &mut dyn RawBackend, addr: u64, history: &WholeHistory) -> Result<()> {
    let buf = history.encode();
    backend.write(addr, &buf)?;
    let end = addr + buf.len() as u64;
    if backend.eoa() < end {
        backend.set_eoa(end)?;
    }
    Ok(())
}

/// # Errors
/// See [`RevisionRecord::decode_fixed`] / [`RevisionRecord::decode_tail`].
pub fn ingest_revision_record(backend: &mut dyn RawBackend, addr: u64) -> Result<RevisionRecord> {
    bounds_check(backend, addr, record::FIXED_PREFIX_LEN as u64)?;
    let prefix = backend.read(addr, record::FIXED_PREFIX_LEN)?;
    let fixed = RevisionRecord::decode_fixed(&prefix)?;
    bounds_check(backend, addr, fixed.total_len as u64)?;
    let full = backend.read(addr, fixed.total_len)?;
    let rec = RevisionRecord::decode_tail(&full, &fixed)?;
    let end = addr + fixed.total_len as u64;
    if backend.eoa() < end {
        backend.set_eoa(end)?;
    }
    Ok(rec)
}

/// Returns the encoded length of `record`, so the caller can advance
/// `history_eof` without re-encoding.
///
/// # Errors
/// Returns an error if the backend write fails.
pub fn write_revision_record(backend: &mut dyn RawBackend, addr: u64, record: &RevisionRecord) -> Result<u64> {
    let buf = record.encode();
    backend.write(addr, &buf)?;
    let end = addr + buf.len() as u64;
    if backend.eoa() < end {
        backend.set_eoa(end)?;
    }
    Ok(buf.len() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::FileBackend;
    use crate::format::RecordPointer;

    fn backend() -> (tempfile::TempDir, FileBackend) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.onion");
        let backend = FileBackend::open(&path, true).unwrap();
        (dir, backend)
    }

    #[test]
    fn header_roundtrips_through_backend() {
        let (_dir, mut backend) = backend();
        let h = Header { flags: 1, page_size: 512, origin_eof: 0, whole_history_addr: 40, whole_history_size: 24 };
        write_header(&mut backend, &h).unwrap();
        let decoded = ingest_header(&mut backend).unwrap();
        assert_eq!(decoded, h);
    }

    #[test]
    fn whole_history_roundtrips_through_backend() {
        let (_dir, mut backend) = backend();
        let wh = WholeHistory { pointers: vec![RecordPointer { phys_addr: 40, record_size: 100 }] };
        write_whole_history(&mut backend, 0, &wh).unwrap();
        let decoded = ingest_whole_history(&mut backend, 0).unwrap();
        assert_eq!(decoded, wh);
    }

    #[test]
    fn ingest_rejects_reading_past_eof() {
        let (_dir, mut backend) = backend();
        assert!(ingest_header(&mut backend).is_err());
    }
}
