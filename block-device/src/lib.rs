//! Block device abstraction: fixed-size pages addressed by physical page
//! id, exposing `read`/`write`/`write_bytes`/`erase` at page granularity.
//!
//! Grounded in the teacher's `common::disk_manager::DiskManager`, which
//! already uses positioned I/O (`read_at`/`write_at`) over a single
//! `std::fs::File`. This module generalizes that into a trait so the
//! buffer manager and the B-tree core never depend on `std::fs` directly,
//! and adds an in-memory implementation for tests.

use common::PageId;
use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::FileExt;
use std::path::Path;

/// Errors a `BlockDevice` implementation can raise. Distinct from
/// `common::Error` because a device has no notion of tree-level concerns
/// like "storage full" — those are layered on top by the buffer manager.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("device I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("page {0} out of range for this device")]
    OutOfRange(PageId),
}

pub type DeviceResult<T> = Result<T, DeviceError>;

/// Lets `?` carry a `DeviceError` straight into the workspace-wide
/// `common::Result` used by the buffer manager and the tree.
impl From<DeviceError> for common::Error {
    fn from(err: DeviceError) -> Self {
        match err {
            DeviceError::Io(e) => common::Error::Io(e),
            DeviceError::OutOfRange(pid) => {
                common::Error::Io(io::Error::new(io::ErrorKind::InvalidInput, format!("page {pid} out of range for this device")))
            }
        }
    }
}

/// A fixed-size-page storage backend.
///
/// `erase` is only meaningful for Variant B (flash-like) backends; Variant
/// A callers simply never invoke it.
pub trait BlockDevice {
    /// Size in bytes of one page on this device.
    fn page_size(&self) -> usize;

    /// Reads page `pid` into `buf`, which must be exactly `page_size()` long.
    fn read_page(&mut self, pid: PageId, buf: &mut [u8]) -> DeviceResult<()>;

    /// Writes `buf` (exactly `page_size()` long) to page `pid`.
    fn write_page(&mut self, pid: PageId, buf: &[u8]) -> DeviceResult<()>;

    /// Patches `bytes` into page `pid` starting at byte `offset`, without
    /// touching the rest of the page. Used exclusively to stamp the
    /// `nextId` forward-chain field of an already-written page.
    fn write_bytes(&mut self, pid: PageId, offset: usize, bytes: &[u8]) -> DeviceResult<()>;

    /// Erases the inclusive page range `[start_pid, end_pid]`, which must
    /// be aligned to an erase block boundary.
    fn erase(&mut self, start_pid: PageId, end_pid: PageId) -> DeviceResult<()>;
}

/// A host-file-backed block device using positioned I/O, so reads and
/// writes never need to share a seek cursor.
pub struct FileBlockDevice {
    file: File,
    page_size: usize,
}

impl FileBlockDevice {
    pub fn open<P: AsRef<Path>>(path: P, page_size: usize) -> DeviceResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        Ok(Self { file, page_size })
    }

    /// Number of whole pages currently present in the backing file.
    pub fn page_count(&self) -> DeviceResult<u64> {
        let len = self.file.metadata()?.len();
        Ok(len / self.page_size as u64)
    }
}

impl BlockDevice for FileBlockDevice {
    fn page_size(&self) -> usize {
        self.page_size
    }

    fn read_page(&mut self, pid: PageId, buf: &mut [u8]) -> DeviceResult<()> {
        debug_assert_eq!(buf.len(), self.page_size);
        let offset = pid as u64 * self.page_size as u64;
        self.file.read_exact_at(buf, offset)?;
        Ok(())
    }

    fn write_page(&mut self, pid: PageId, buf: &[u8]) -> DeviceResult<()> {
        debug_assert_eq!(buf.len(), self.page_size);
        let offset = pid as u64 * self.page_size as u64;
        self.file.write_all_at(buf, offset)?;
        Ok(())
    }

    fn write_bytes(&mut self, pid: PageId, offset: usize, bytes: &[u8]) -> DeviceResult<()> {
        let abs = pid as u64 * self.page_size as u64 + offset as u64;
        self.file.write_all_at(bytes, abs)?;
        Ok(())
    }

    fn erase(&mut self, start_pid: PageId, end_pid: PageId) -> DeviceResult<()> {
        // A real flash device would issue a hardware erase here. A regular
        // file has no such operation; zeroing the range keeps behavior
        // observable in tests without pretending to model wear-leveling.
        log::trace!("erase pages {}..={}", start_pid, end_pid);
        let zeros = vec![0u8; self.page_size];
        for pid in start_pid..=end_pid {
            self.write_page(pid, &zeros)?;
        }
        Ok(())
    }
}

/// An in-memory block device backed by a growable byte arena. Used by
/// tests and by deployments that want the tree's semantics without a host
/// filesystem (e.g. a RAM-resident prototype).
pub struct MemBlockDevice {
    pages: Vec<u8>,
    page_size: usize,
}

impl MemBlockDevice {
    pub fn new(page_size: usize) -> Self {
        Self { pages: Vec::new(), page_size }
    }

    fn ensure_capacity(&mut self, pid: PageId) {
        let needed = (pid as usize + 1) * self.page_size;
        if self.pages.len() < needed {
            self.pages.resize(needed, 0);
        }
    }
}

impl BlockDevice for MemBlockDevice {
    fn page_size(&self) -> usize {
        self.page_size
    }

    fn read_page(&mut self, pid: PageId, buf: &mut [u8]) -> DeviceResult<()> {
        debug_assert_eq!(buf.len(), self.page_size);
        let start = pid as usize * self.page_size;
        if start + self.page_size > self.pages.len() {
            // Unwritten pages read as zeroed, matching a freshly-erased device.
            buf.fill(0);
            return Ok(());
        }
        buf.copy_from_slice(&self.pages[start..start + self.page_size]);
        Ok(())
    }

    fn write_page(&mut self, pid: PageId, buf: &[u8]) -> DeviceResult<()> {
        debug_assert_eq!(buf.len(), self.page_size);
        self.ensure_capacity(pid);
        let start = pid as usize * self.page_size;
        self.pages[start..start + self.page_size].copy_from_slice(buf);
        Ok(())
    }

    fn write_bytes(&mut self, pid: PageId, offset: usize, bytes: &[u8]) -> DeviceResult<()> {
        self.ensure_capacity(pid);
        let start = pid as usize * self.page_size + offset;
        self.pages[start..start + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    fn erase(&mut self, start_pid: PageId, end_pid: PageId) -> DeviceResult<()> {
        self.ensure_capacity(end_pid);
        let start = start_pid as usize * self.page_size;
        let end = (end_pid as usize + 1) * self.page_size;
        self.pages[start..end].fill(0);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mem_device_round_trips_a_page() {
        let mut dev = MemBlockDevice::new(256);
        let mut data = [0u8; 256];
        for (i, b) in data.iter_mut().enumerate() {
            *b = i as u8;
        }
        dev.write_page(3, &data).unwrap();

        let mut out = [0u8; 256];
        dev.read_page(3, &mut out).unwrap();
        assert_eq!(data, out);
    }

    #[test]
    fn mem_device_reads_unwritten_page_as_zero() {
        let mut dev = MemBlockDevice::new(64);
        let mut out = [0xffu8; 64];
        dev.read_page(5, &mut out).unwrap();
        assert_eq!(out, [0u8; 64]);
    }

    #[test]
    fn mem_device_erase_zeroes_range() {
        let mut dev = MemBlockDevice::new(16);
        dev.write_page(0, &[7u8; 16]).unwrap();
        dev.write_page(1, &[7u8; 16]).unwrap();
        dev.erase(0, 1).unwrap();

        let mut out = [0xffu8; 16];
        dev.read_page(0, &mut out).unwrap();
        assert_eq!(out, [0u8; 16]);
        dev.read_page(1, &mut out).unwrap();
        assert_eq!(out, [0u8; 16]);
    }

    #[test]
    fn file_device_round_trips_a_page() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pages.db");
        let mut dev = FileBlockDevice::open(&path, 128).unwrap();

        let data = [9u8; 128];
        dev.write_page(2, &data).unwrap();

        let mut out = [0u8; 128];
        dev.read_page(2, &mut out).unwrap();
        assert_eq!(data, out);
        assert_eq!(dev.page_count().unwrap(), 3);
    }

    #[test]
    fn file_device_write_bytes_patches_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pages.db");
        let mut dev = FileBlockDevice::open(&path, 32).unwrap();
        dev.write_page(0, &[0u8; 32]).unwrap();
        dev.write_bytes(0, 4, &[1, 2, 3, 4]).unwrap();

        let mut out = [0u8; 32];
        dev.read_page(0, &mut out).unwrap();
        assert_eq!(&out[4..8], &[1, 2, 3, 4]);
    }
}
