//! Memory-mapped file store.

use std::mem::align_of;
use std::path::Path;
use std::ptr::NonNull;

use memmap2::{MmapMut, MmapOptions};
use px_core::{Error, IndexPacket, PIXEL_PACKET_SIZE, PixelPacket, Result};
use tracing::{debug, warn};

use super::memory::RawStore;
use super::{BackingFile, CacheBackend, DirectStore, StorageType, store_length};

/// Pixels and indexes in a shared writable mapping of a file.
pub(crate) struct MapBackend {
    raw: RawStore,
    map: MmapMut,
    file: BackingFile,
}

impl MapBackend {
    /// Maps a fresh sparse temporary file.
    pub fn temporary(dir: Option<&Path>, pixel_count: usize, has_indexes: bool) -> Result<Self> {
        let len = byte_length(pixel_count, has_indexes)?;
        let file = BackingFile::temporary(dir, len as u64)?;
        Self::map(file, 0, pixel_count, has_indexes)
    }

    /// Maps a persisted cache at `offset` in `path`, creating or growing the file.
    pub fn persistent(path: &Path, offset: u64, pixel_count: usize, has_indexes: bool) -> Result<Self> {
        let len = byte_length(pixel_count, has_indexes)?;
        let file = BackingFile::persistent(path, offset + len as u64)?;
        Self::map(file, offset, pixel_count, has_indexes)
    }

    fn map(file: BackingFile, offset: u64, pixel_count: usize, has_indexes: bool) -> Result<Self> {
        let len = byte_length(pixel_count, has_indexes)?;
        // SAFETY: the file is owned by this backend for the life of the
        // mapping; other processes truncating it is outside our contract.
        let mut map = unsafe {
            MmapOptions::new()
                .offset(offset)
                .len(len)
                .map_mut(file.file())?
        };

        let base = map.as_mut_ptr();
        if (base as usize) % align_of::<PixelPacket>() != 0 {
            return Err(Error::invalid_argument(format!(
                "cache offset {offset} is not aligned for pixel packets"
            )));
        }
        let pixels = NonNull::new(base.cast::<PixelPacket>())
            .ok_or_else(|| Error::allocation_failed(len, "null mapping"))?;
        let indexes = if has_indexes {
            // SAFETY: the index channel starts right after the pixels, inside the mapping.
            NonNull::new(unsafe { base.add(pixel_count * PIXEL_PACKET_SIZE) }.cast::<IndexPacket>())
        } else {
            None
        };

        debug!(
            path = %file.path().display(),
            offset,
            len,
            persistent = file.is_persistent(),
            "mapped pixel cache"
        );

        // SAFETY: the mapping covers pixels and indexes and lives as long as `raw`.
        let raw = unsafe { RawStore::new(pixels, indexes, pixel_count) };
        Ok(Self { raw, map, file })
    }
}

fn byte_length(pixel_count: usize, has_indexes: bool) -> Result<usize> {
    store_length(pixel_count, has_indexes)
        .filter(|len| *len > 0)
        .ok_or_else(|| Error::invalid_argument(format!("cannot map {pixel_count} pixels")))
}

impl CacheBackend for MapBackend {
    fn storage_type(&self) -> StorageType {
        StorageType::Map
    }

    fn has_indexes(&self) -> bool {
        self.raw.has_indexes()
    }

    fn read_pixels(&self, offset: usize, dst: &mut [PixelPacket]) -> Result<()> {
        self.raw.read_pixels(offset, dst)
    }

    fn write_pixels(&self, offset: usize, src: &[PixelPacket]) -> Result<()> {
        self.raw.write_pixels(offset, src)
    }

    fn read_indexes(&self, offset: usize, dst: &mut [IndexPacket]) -> Result<()> {
        self.raw.read_indexes(offset, dst)
    }

    fn write_indexes(&self, offset: usize, src: &[IndexPacket]) -> Result<()> {
        self.raw.write_indexes(offset, src)
    }

    fn direct(&self) -> Option<DirectStore> {
        Some(self.raw.direct())
    }

    fn flush(&self) -> Result<()> {
        self.map.flush()?;
        Ok(())
    }

    fn path(&self) -> Option<&Path> {
        Some(self.file.path())
    }
}

impl Drop for MapBackend {
    fn drop(&mut self) {
        if self.file.is_persistent() {
            if let Err(err) = self.map.flush() {
                warn!(path = %self.file.path().display(), %err, "failed to flush persisted cache");
            }
        }
    }
}
