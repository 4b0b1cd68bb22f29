//! File store accessed with positional reads and writes.

use std::path::Path;

use px_core::{Error, INDEX_PACKET_SIZE, IndexPacket, PIXEL_PACKET_SIZE, PixelPacket, Result};
use tracing::debug;

use super::{BackingFile, CacheBackend, StorageType, check_range, read_exact_at, store_length, write_all_at};

/// Pixels paged through a file.
///
/// Every request is a positional syscall, so windows over a disk cache are
/// always staged through nexus scratch buffers.
pub(crate) struct DiskBackend {
    file: BackingFile,
    base: u64,
    pixel_count: usize,
    has_indexes: bool,
}

impl DiskBackend {
    /// Creates a sparse temporary cache file.
    pub fn temporary(dir: Option<&Path>, pixel_count: usize, has_indexes: bool) -> Result<Self> {
        let len = byte_length(pixel_count, has_indexes)?;
        let file = BackingFile::temporary(dir, len)?;
        debug!(path = %file.path().display(), len, "disk pixel cache");
        Ok(Self {
            file,
            base: 0,
            pixel_count,
            has_indexes,
        })
    }

    /// Opens a persisted cache at `offset` in `path`, creating or growing the file.
    pub fn persistent(path: &Path, offset: u64, pixel_count: usize, has_indexes: bool) -> Result<Self> {
        let len = byte_length(pixel_count, has_indexes)?;
        let file = BackingFile::persistent(path, offset + len)?;
        debug!(path = %path.display(), offset, len, "persisted disk pixel cache");
        Ok(Self {
            file,
            base: offset,
            pixel_count,
            has_indexes,
        })
    }

    #[inline]
    fn pixel_position(&self, offset: usize) -> u64 {
        self.base + (offset * PIXEL_PACKET_SIZE) as u64
    }

    #[inline]
    fn index_position(&self, offset: usize) -> u64 {
        self.base + (self.pixel_count * PIXEL_PACKET_SIZE + offset * INDEX_PACKET_SIZE) as u64
    }

    fn index_extent(&self) -> usize {
        if self.has_indexes { self.pixel_count } else { 0 }
    }
}

fn byte_length(pixel_count: usize, has_indexes: bool) -> Result<u64> {
    store_length(pixel_count, has_indexes)
        .map(|len| len as u64)
        .ok_or_else(|| Error::invalid_argument(format!("cache of {pixel_count} pixels is too large")))
}

impl CacheBackend for DiskBackend {
    fn storage_type(&self) -> StorageType {
        StorageType::Disk
    }

    fn has_indexes(&self) -> bool {
        self.has_indexes
    }

    fn read_pixels(&self, offset: usize, dst: &mut [PixelPacket]) -> Result<()> {
        check_range(offset, dst.len(), self.pixel_count)?;
        read_exact_at(
            self.file.file(),
            bytemuck::cast_slice_mut(dst),
            self.pixel_position(offset),
        )?;
        Ok(())
    }

    fn write_pixels(&self, offset: usize, src: &[PixelPacket]) -> Result<()> {
        check_range(offset, src.len(), self.pixel_count)?;
        write_all_at(
            self.file.file(),
            bytemuck::cast_slice(src),
            self.pixel_position(offset),
        )?;
        Ok(())
    }

    fn read_indexes(&self, offset: usize, dst: &mut [IndexPacket]) -> Result<()> {
        check_range(offset, dst.len(), self.index_extent())?;
        read_exact_at(
            self.file.file(),
            bytemuck::cast_slice_mut(dst),
            self.index_position(offset),
        )?;
        Ok(())
    }

    fn write_indexes(&self, offset: usize, src: &[IndexPacket]) -> Result<()> {
        check_range(offset, src.len(), self.index_extent())?;
        write_all_at(
            self.file.file(),
            bytemuck::cast_slice(src),
            self.index_position(offset),
        )?;
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        if self.file.is_persistent() {
            self.file.file().sync_data()?;
        }
        Ok(())
    }

    fn path(&self) -> Option<&Path> {
        Some(self.file.path())
    }
}
