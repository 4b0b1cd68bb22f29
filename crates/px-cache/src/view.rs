//! Cache views: thread-safe access to an image's pixels.
//!
//! A [`CacheView`] binds an image's cache to one [`Nexus`] slot per worker
//! of the current rayon pool. Workers lock their slot, request a region,
//! work on the returned window and, for authentic windows, sync it back.
//!
//! # Usage
//!
//! ```rust
//! use px_cache::{CacheView, Image};
//! use px_core::{PixelPacket, ResourceLimits, ResourceManager};
//! use rayon::prelude::*;
//!
//! let resources = ResourceManager::new(ResourceLimits::unlimited());
//! let mut image = Image::new(&resources, 64, 32).unwrap();
//!
//! let view = CacheView::authentic(&mut image).unwrap();
//! (0..view.rows() as i64).into_par_iter().for_each(|y| {
//!     let mut nexus = view.nexus();
//!     let mut row = view.get_authentic_pixels(&mut nexus, 0, y, 64, 1).unwrap();
//!     row.fill(PixelPacket::WHITE);
//!     drop(row);
//!     view.sync_authentic_pixels(&mut nexus).unwrap();
//! });
//! drop(view);
//!
//! assert_eq!(image.get_one_virtual_pixel(10, 10), PixelPacket::WHITE);
//! ```
//!
//! # Windows
//!
//! - A region inside the image is served straight from Memory and Map
//!   stores when it is contiguous in storage: full rows, or a single row.
//! - Everything else is staged through the nexus's scratch buffers.
//! - Authentic windows hold a write lease on their in-bounds part until the
//!   nexus syncs or makes its next request; overlapping authentic requests
//!   fail with `RegionBusy`.
//! - Reads never take leases and never fail on overlap. Reading rows another
//!   nexus has checked out for writing sees old or new values; keeping reads
//!   and writes apart is up to the caller.

use std::slice;
use std::sync::{Mutex, MutexGuard, PoisonError};

use px_core::{Error, IndexPacket, PixelPacket, Region, Result};
use tracing::{trace, warn};

use crate::backend::{CacheBackend, StorageType};
use crate::cache::Cache;
use crate::image::Image;
use crate::nexus::{NEXUS_SEED, Nexus, Pixels, PixelsMut};
use crate::virtual_pixel::{Resolved, VirtualPixelMethod, resolve};

/// Thread-safe accessor for an image's pixel cache.
pub struct CacheView<'a> {
    cache: &'a Cache,
    columns: usize,
    rows: usize,
    method: VirtualPixelMethod,
    background: PixelPacket,
    border: PixelPacket,
    authentic: bool,
    slots: Box<[Mutex<Nexus<'a>>]>,
}

impl<'a> CacheView<'a> {
    /// Read-only view; authentic requests fail with `PixelsNotAuthentic`.
    pub fn new(image: &'a Image) -> Self {
        Self::build(image, false)
    }

    /// Writable view.
    ///
    /// A cache shared with clones of the image is copied first, so writes
    /// never show through other images.
    pub fn authentic(image: &'a mut Image) -> Result<Self> {
        image.make_cache_exclusive()?;
        let image: &'a Image = image;
        Ok(Self::build(image, true))
    }

    fn build(image: &'a Image, authentic: bool) -> Self {
        let threads = rayon::current_num_threads().max(1);
        let slots = (0..threads)
            .map(|slot| Mutex::new(Nexus::new(NEXUS_SEED ^ slot as u64)))
            .collect();
        Self {
            cache: image.cache(),
            columns: image.columns(),
            rows: image.rows(),
            method: image.virtual_pixel_method,
            background: image.background_color,
            border: image.border_color,
            authentic,
            slots,
        }
    }

    /// Overrides the virtual pixel method for this view.
    pub fn with_virtual_pixel_method(mut self, method: VirtualPixelMethod) -> Self {
        self.method = method;
        self
    }

    /// Virtual pixel method of this view.
    pub fn virtual_pixel_method(&self) -> VirtualPixelMethod {
        self.method
    }

    /// Image columns.
    pub fn columns(&self) -> usize {
        self.columns
    }

    /// Image rows.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Returns `true` if the image has an index channel.
    pub fn has_indexes(&self) -> bool {
        self.cache.has_indexes()
    }

    /// Returns `true` for writable views.
    pub fn is_authentic(&self) -> bool {
        self.authentic
    }

    /// Storage class of the underlying cache.
    pub fn storage_type(&self) -> StorageType {
        self.cache.storage_type()
    }

    /// Number of nexus slots.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Locks the nexus slot of the calling rayon worker.
    ///
    /// Threads outside the pool share slot 0. Do not hold the guard across
    /// nested rayon calls that may run other tasks on this thread.
    pub fn nexus(&self) -> MutexGuard<'_, Nexus<'a>> {
        let slot = rayon::current_thread_index().unwrap_or(0) % self.slots.len();
        self.slots[slot]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// A private nexus, independent of the worker slots.
    pub fn new_nexus(&self) -> Nexus<'a> {
        Nexus::new(NEXUS_SEED ^ u64::MAX)
    }

    /// Checks out a writable window, reading the current pixels in.
    ///
    /// Parts outside the image are filled with virtual pixels and discarded
    /// on sync.
    pub fn get_authentic_pixels<'n>(
        &self,
        nexus: &'n mut Nexus<'a>,
        x: i64,
        y: i64,
        width: usize,
        height: usize,
    ) -> Result<PixelsMut<'n>> {
        self.checkout_authentic(nexus, Region::new(x, y, width, height), true)?;
        Ok(nexus.pixels_mut())
    }

    /// Checks out a writable window without reading pixels in.
    ///
    /// Use when every pixel of the window will be overwritten.
    pub fn queue_authentic_pixels<'n>(
        &self,
        nexus: &'n mut Nexus<'a>,
        x: i64,
        y: i64,
        width: usize,
        height: usize,
    ) -> Result<PixelsMut<'n>> {
        self.checkout_authentic(nexus, Region::new(x, y, width, height), false)?;
        Ok(nexus.pixels_mut())
    }

    /// Writes a staged authentic window back to the cache.
    ///
    /// Direct windows need no copy; a second call without a new request is a
    /// no-op. Either way the window's lease is released.
    pub fn sync_authentic_pixels(&self, nexus: &mut Nexus<'a>) -> Result<()> {
        if !nexus.is_pending() {
            nexus.release();
            return Ok(());
        }
        let result = self.write_back(nexus);
        nexus.release();
        result
    }

    /// Checks out a read-only window using the view's virtual pixel method.
    pub fn get_virtual_pixels<'n>(
        &self,
        nexus: &'n mut Nexus<'a>,
        x: i64,
        y: i64,
        width: usize,
        height: usize,
    ) -> Result<Pixels<'n>> {
        self.get_virtual_pixels_with(nexus, self.method, x, y, width, height)
    }

    /// Checks out a read-only window using `method` for outside pixels.
    pub fn get_virtual_pixels_with<'n>(
        &self,
        nexus: &'n mut Nexus<'a>,
        method: VirtualPixelMethod,
        x: i64,
        y: i64,
        width: usize,
        height: usize,
    ) -> Result<Pixels<'n>> {
        nexus.release();
        let region = Region::new(x, y, width, height);
        if region.is_empty() {
            return Err(Error::invalid_region(region, self.columns, self.rows));
        }
        let cache = self.cache;
        let backend = cache.backend()?;

        if let Some(offset) = self.direct_offset(backend, region) {
            if let Some(store) = backend.direct() {
                // SAFETY: region is in bounds; the store lives as long as the cache.
                unsafe { nexus.set_direct(region, store, offset) };
                trace!(%region, "direct virtual window");
                return Ok(nexus.pixels());
            }
        }

        nexus.stage(region, backend.has_indexes())?;
        self.fill(backend, nexus, method)?;
        trace!(%region, "staged virtual window");
        Ok(nexus.pixels())
    }

    /// Reads one pixel, resolving outside coordinates with the view's method.
    ///
    /// Never fails: on error the background color is returned.
    pub fn get_one_virtual_pixel(&self, x: i64, y: i64) -> PixelPacket {
        self.get_one_virtual_pixel_with(self.method, x, y)
    }

    /// Reads one pixel, resolving outside coordinates with `method`.
    pub fn get_one_virtual_pixel_with(&self, method: VirtualPixelMethod, x: i64, y: i64) -> PixelPacket {
        self.one_pixel(method, x, y).unwrap_or_else(|err| {
            warn!(x, y, %err, "virtual pixel unavailable, using background");
            self.background
        })
    }

    /// Reads one in-bounds pixel as stored.
    ///
    /// Never fails: outside coordinates and errors yield the background color.
    pub fn get_one_authentic_pixel(&self, x: i64, y: i64) -> PixelPacket {
        if !Region::full(self.columns, self.rows).contains(x, y) {
            warn!(x, y, "authentic pixel outside image, using background");
            return self.background;
        }
        self.get_one_virtual_pixel_with(VirtualPixelMethod::Edge, x, y)
    }

    fn one_pixel(&self, method: VirtualPixelMethod, x: i64, y: i64) -> Result<PixelPacket> {
        self.cache.read_one(method, x, y, self.background, self.border)
    }

    /// Store offset of `region` if it can be served without a copy.
    fn direct_offset(&self, backend: &dyn CacheBackend, region: Region) -> Option<usize> {
        if !backend.storage_type().is_addressable() || !region.is_within(self.columns, self.rows) {
            return None;
        }
        let contiguous = (region.x == 0 && region.width == self.columns) || region.height == 1;
        contiguous.then(|| region.y as usize * self.columns + region.x as usize)
    }

    fn checkout_authentic(&self, nexus: &mut Nexus<'a>, region: Region, read: bool) -> Result<()> {
        nexus.release();
        if !self.authentic {
            return Err(Error::PixelsNotAuthentic(format!(
                "region {region} requested through a read-only view"
            )));
        }
        if region.is_empty() {
            return Err(Error::invalid_region(region, self.columns, self.rows));
        }
        let inner = region
            .clip_to(self.columns, self.rows)
            .ok_or_else(|| Error::invalid_region(region, self.columns, self.rows))?;
        let cache = self.cache;
        let backend = cache.backend()?;

        if let Some(offset) = self.direct_offset(backend, region) {
            let lease = cache.leases().acquire(region)?;
            if let Some(store) = backend.direct() {
                // SAFETY: region is in bounds and write leased; the store
                // lives as long as the cache.
                unsafe { nexus.set_direct(region, store, offset) };
                nexus.set_lease(lease);
                trace!(%region, "direct authentic window");
                return Ok(());
            }
        }

        let lease = cache.leases().acquire(inner)?;
        nexus.stage(region, backend.has_indexes())?;
        if read {
            self.fill(backend, nexus, self.method)?;
        }
        nexus.set_lease(lease);
        nexus.set_pending(true);
        trace!(%region, read, "staged authentic window");
        Ok(())
    }

    /// Fills the nexus scratch buffers for its current region.
    fn fill(&self, backend: &dyn CacheBackend, nexus: &mut Nexus<'a>, method: VirtualPixelMethod) -> Result<()> {
        let region = nexus.region();
        let (pixels, mut indexes, rng) = nexus.staged_parts();
        let columns = self.columns;
        let rows = self.rows;

        for (row, y) in (region.y..region.bottom()).enumerate() {
            let start = row * region.width;
            let dst = &mut pixels[start..start + region.width];
            let mut dst_indexes = indexes
                .as_deref_mut()
                .map(|idx| &mut idx[start..start + region.width]);

            let row_inside = y >= 0 && y < rows as i64;
            let x0 = region.x.max(0);
            let x1 = region.right().min(columns as i64);
            if row_inside && x0 < x1 {
                let from = (x0 - region.x) as usize;
                let to = (x1 - region.x) as usize;
                let offset = y as usize * columns + x0 as usize;
                backend.read_pixels(offset, &mut dst[from..to])?;
                if let Some(idx) = dst_indexes.as_deref_mut() {
                    backend.read_indexes(offset, &mut idx[from..to])?;
                }
            }
            if row_inside && x0 == region.x && x1 == region.right() {
                continue;
            }

            for (col, x) in (region.x..region.right()).enumerate() {
                if row_inside && x >= x0 && x < x1 {
                    continue;
                }
                match resolve(method, x, y, columns, rows, rng) {
                    Resolved::Pixel(px, py) => {
                        let offset = py * columns + px;
                        backend.read_pixels(offset, slice::from_mut(&mut dst[col]))?;
                        if let Some(idx) = dst_indexes.as_deref_mut() {
                            backend.read_indexes(offset, slice::from_mut(&mut idx[col]))?;
                        }
                    }
                    Resolved::Constant(kind) => {
                        dst[col] = kind.color(self.background, self.border);
                        if let Some(idx) = dst_indexes.as_deref_mut() {
                            idx[col] = 0;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Copies the in-bounds part of a staged window to the cache.
    fn write_back(&self, nexus: &Nexus<'a>) -> Result<()> {
        let region = nexus.region();
        let Some(inner) = region.clip_to(self.columns, self.rows) else {
            return Ok(());
        };
        let backend = self.cache.backend()?;
        let (pixels, indexes) = nexus.staged();
        let from = (inner.x - region.x) as usize;
        for y in inner.y..inner.bottom() {
            let row = (y - region.y) as usize;
            let start = row * region.width + from;
            let offset = y as usize * self.columns + inner.x as usize;
            backend.write_pixels(offset, &pixels[start..start + inner.width])?;
            if let Some(idx) = indexes {
                write_indexes(backend, offset, &idx[start..start + inner.width])?;
            }
        }
        trace!(%inner, "synced staged window");
        Ok(())
    }
}

fn write_indexes(backend: &dyn CacheBackend, offset: usize, src: &[IndexPacket]) -> Result<()> {
    if backend.has_indexes() {
        backend.write_indexes(offset, src)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use px_core::{ResourceLimits, ResourceManager};

    fn gradient(columns: usize, rows: usize) -> Image {
        let resources = ResourceManager::new(ResourceLimits::unlimited());
        let pixels: Vec<PixelPacket> = (0..columns * rows)
            .map(|i| PixelPacket::gray(i as u16))
            .collect();
        Image::from_pixels(&resources, columns, rows, &pixels).unwrap()
    }

    #[test]
    fn test_direct_rows() {
        let image = gradient(8, 4);
        let view = CacheView::new(&image);
        let mut nexus = view.new_nexus();
        let row = view.get_virtual_pixels(&mut nexus, 0, 1, 8, 1).unwrap();
        assert_eq!(row[0], PixelPacket::gray(8));
        assert!(nexus.is_direct());

        let block = view.get_virtual_pixels(&mut nexus, 2, 1, 3, 2).unwrap();
        assert_eq!(block[3], PixelPacket::gray(18));
        assert!(!nexus.is_direct());
    }

    #[test]
    fn test_read_only_view_rejects_authentic() {
        let image = gradient(4, 4);
        let view = CacheView::new(&image);
        let mut nexus = view.new_nexus();
        let err = view.get_authentic_pixels(&mut nexus, 0, 0, 4, 1).unwrap_err();
        assert!(matches!(err, Error::PixelsNotAuthentic(_)));
    }

    #[test]
    fn test_staged_authentic_partial_outside() {
        let mut image = gradient(4, 4);
        let view = CacheView::authentic(&mut image).unwrap();
        let mut nexus = view.new_nexus();
        {
            let mut window = view.get_authentic_pixels(&mut nexus, -1, 3, 3, 2).unwrap();
            // edge virtual pixel left of (0, 3)
            assert_eq!(window[0], PixelPacket::gray(12));
            window.fill(PixelPacket::WHITE);
        }
        view.sync_authentic_pixels(&mut nexus).unwrap();
        assert_eq!(view.get_one_authentic_pixel(0, 3), PixelPacket::WHITE);
        assert_eq!(view.get_one_authentic_pixel(1, 3), PixelPacket::WHITE);
        assert_eq!(view.get_one_authentic_pixel(2, 3), PixelPacket::gray(14));
    }

    #[test]
    fn test_overlapping_authentic_windows() {
        let mut image = gradient(4, 4);
        let view = CacheView::authentic(&mut image).unwrap();
        let mut a = view.new_nexus();
        let mut b = view.new_nexus();
        let _row = view.get_authentic_pixels(&mut a, 0, 0, 4, 1).unwrap();
        let err = view.get_authentic_pixels(&mut b, 0, 0, 2, 2).unwrap_err();
        assert!(matches!(err, Error::RegionBusy { .. }));
        assert!(view.get_authentic_pixels(&mut b, 0, 1, 4, 1).is_ok());
    }

    #[test]
    fn test_reads_ignore_checked_out_rows() {
        let mut image = gradient(4, 4);
        let view = CacheView::authentic(&mut image).unwrap();
        let mut a = view.new_nexus();
        let mut b = view.new_nexus();
        let _ = view.get_authentic_pixels(&mut a, 0, 0, 4, 1).unwrap();

        assert_eq!(view.get_one_virtual_pixel(1, 0), PixelPacket::gray(1));
        let block = view.get_virtual_pixels(&mut b, 0, 0, 2, 2).unwrap();
        assert_eq!(block[3], PixelPacket::gray(5));
        let black = view
            .get_virtual_pixels_with(&mut b, VirtualPixelMethod::Black, 100, 100, 1, 1)
            .unwrap();
        assert_eq!(black[0], PixelPacket::BLACK);
        let edge = view.get_virtual_pixels(&mut b, -2, -2, 3, 3).unwrap();
        assert_eq!(edge[8], PixelPacket::gray(0));
    }

    #[test]
    fn test_finished_read_leaves_rows_writable() {
        let mut image = gradient(4, 4);
        let view = CacheView::authentic(&mut image).unwrap();
        let mut a = view.new_nexus();
        let mut b = view.new_nexus();
        {
            let row = view.get_virtual_pixels(&mut a, 0, 0, 4, 1).unwrap();
            assert_eq!(row[3], PixelPacket::gray(3));
            assert!(a.is_direct());
        }
        let mut row = view.get_authentic_pixels(&mut b, 0, 0, 4, 1).unwrap();
        row.fill(PixelPacket::WHITE);
        drop(row);
        view.sync_authentic_pixels(&mut b).unwrap();
        assert_eq!(view.get_one_virtual_pixel(2, 0), PixelPacket::WHITE);
    }

    #[test]
    fn test_one_pixel_fallback() {
        let resources = ResourceManager::new(ResourceLimits::unlimited());
        let image = Image::ping(&resources, 4, 4).unwrap();
        let view = CacheView::new(&image);
        assert_eq!(view.get_one_virtual_pixel(1, 1), image.background_color);
        assert_eq!(view.get_one_authentic_pixel(-1, 0), image.background_color);
    }
}
