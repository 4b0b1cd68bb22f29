//! Heap backed pixel store.

use std::ptr::{self, NonNull};

use px_core::{Error, IndexPacket, PixelPacket, Result};

use super::{CacheBackend, DirectStore, StorageType, check_range};

/// Raw view of an addressable store: pixels followed by optional indexes.
///
/// Shared by the heap and memory-mapped backends. All copies go through the
/// raw pointers so disjoint ranges may be written from several threads.
#[derive(Debug)]
pub(super) struct RawStore {
    pixels: NonNull<PixelPacket>,
    indexes: Option<NonNull<IndexPacket>>,
    pixel_count: usize,
}

// SAFETY: the owning backend keeps the allocation alive for the lifetime of
// the RawStore; callers keep concurrent writes to disjoint ranges.
unsafe impl Send for RawStore {}
unsafe impl Sync for RawStore {}

impl RawStore {
    /// # Safety
    ///
    /// `pixels` must be valid for `pixel_count` reads and writes, and
    /// `indexes`, when present, for `pixel_count` index packets, for as long
    /// as the RawStore lives.
    pub(super) unsafe fn new(
        pixels: NonNull<PixelPacket>,
        indexes: Option<NonNull<IndexPacket>>,
        pixel_count: usize,
    ) -> Self {
        Self {
            pixels,
            indexes,
            pixel_count,
        }
    }

    pub(super) fn has_indexes(&self) -> bool {
        self.indexes.is_some()
    }

    pub(super) fn read_pixels(&self, offset: usize, dst: &mut [PixelPacket]) -> Result<()> {
        check_range(offset, dst.len(), self.pixel_count)?;
        // SAFETY: range checked above; dst is a distinct allocation.
        unsafe {
            ptr::copy_nonoverlapping(self.pixels.as_ptr().add(offset), dst.as_mut_ptr(), dst.len());
        }
        Ok(())
    }

    pub(super) fn write_pixels(&self, offset: usize, src: &[PixelPacket]) -> Result<()> {
        check_range(offset, src.len(), self.pixel_count)?;
        // SAFETY: range checked above; src is a distinct allocation.
        unsafe {
            ptr::copy_nonoverlapping(src.as_ptr(), self.pixels.as_ptr().add(offset), src.len());
        }
        Ok(())
    }

    pub(super) fn read_indexes(&self, offset: usize, dst: &mut [IndexPacket]) -> Result<()> {
        let indexes = self.indexes.ok_or(Error::CacheOutOfRange {
            offset,
            len: dst.len(),
            extent: 0,
        })?;
        check_range(offset, dst.len(), self.pixel_count)?;
        // SAFETY: range checked above.
        unsafe {
            ptr::copy_nonoverlapping(indexes.as_ptr().add(offset), dst.as_mut_ptr(), dst.len());
        }
        Ok(())
    }

    pub(super) fn write_indexes(&self, offset: usize, src: &[IndexPacket]) -> Result<()> {
        let indexes = self.indexes.ok_or(Error::CacheOutOfRange {
            offset,
            len: src.len(),
            extent: 0,
        })?;
        check_range(offset, src.len(), self.pixel_count)?;
        // SAFETY: range checked above.
        unsafe {
            ptr::copy_nonoverlapping(src.as_ptr(), indexes.as_ptr().add(offset), src.len());
        }
        Ok(())
    }

    pub(super) fn direct(&self) -> DirectStore {
        DirectStore {
            pixels: self.pixels,
            indexes: self.indexes,
        }
    }
}

/// Pixels and indexes in two heap vectors.
pub(crate) struct MemoryBackend {
    raw: RawStore,
    // Owned allocations behind `raw`; never touched directly after construction.
    _pixels: Vec<PixelPacket>,
    _indexes: Vec<IndexPacket>,
}

impl MemoryBackend {
    /// Allocates a zeroed store, reporting allocation failure instead of aborting.
    pub fn new(pixel_count: usize, has_indexes: bool) -> Result<Self> {
        let mut pixels = zeroed_vec::<PixelPacket>(pixel_count)?;
        let mut indexes = if has_indexes {
            zeroed_vec::<IndexPacket>(pixel_count)?
        } else {
            Vec::new()
        };

        let pixel_ptr = NonNull::new(pixels.as_mut_ptr()).ok_or_else(|| {
            Error::allocation_failed(pixel_count, "null pixel allocation")
        })?;
        let index_ptr = if has_indexes {
            NonNull::new(indexes.as_mut_ptr())
        } else {
            None
        };

        // SAFETY: both vectors hold `pixel_count` initialized elements and are
        // kept alive, unmoved on the heap, alongside the RawStore.
        let raw = unsafe { RawStore::new(pixel_ptr, index_ptr, pixel_count) };
        Ok(Self {
            raw,
            _pixels: pixels,
            _indexes: indexes,
        })
    }
}

fn zeroed_vec<T: bytemuck::Zeroable + Clone>(len: usize) -> Result<Vec<T>> {
    let mut v = Vec::new();
    v.try_reserve_exact(len).map_err(|e| {
        Error::allocation_failed(len.saturating_mul(std::mem::size_of::<T>()), e.to_string())
    })?;
    v.resize(len, T::zeroed());
    Ok(v)
}

impl CacheBackend for MemoryBackend {
    fn storage_type(&self) -> StorageType {
        StorageType::Memory
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
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_roundtrip() {
        let backend = MemoryBackend::new(16, true).unwrap();
        assert_eq!(backend.storage_type(), StorageType::Memory);
        let row = [PixelPacket::rgb(1, 2, 3); 4];
        backend.write_pixels(4, &row).unwrap();
        backend.write_indexes(4, &[7, 8, 9, 10]).unwrap();

        let mut out = [PixelPacket::default(); 6];
        backend.read_pixels(3, &mut out).unwrap();
        assert_eq!(out[0], PixelPacket::default());
        assert_eq!(out[1], PixelPacket::rgb(1, 2, 3));
        assert_eq!(out[5], PixelPacket::default());

        let mut idx = [0u16; 2];
        backend.read_indexes(6, &mut idx).unwrap();
        assert_eq!(idx, [9, 10]);
    }

    #[test]
    fn test_memory_bounds() {
        let backend = MemoryBackend::new(4, false).unwrap();
        let mut out = [PixelPacket::default(); 2];
        assert!(backend.read_pixels(3, &mut out).is_err());
        assert!(backend.read_indexes(0, &mut [0u16; 1]).is_err());
        assert!(backend.direct().unwrap().indexes.is_none());
    }
}
