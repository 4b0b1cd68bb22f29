//! Nexus: one checked-out pixel window.
//!
//! A nexus either points straight into an addressable cache store (direct
//! window) or owns scratch buffers the requested region is staged through.
//! It also holds the write lease of an authentic window and the random state
//! used by [`VirtualPixelMethod::Random`](crate::VirtualPixelMethod::Random).

use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;
use std::slice;

use px_core::{Error, IndexPacket, PixelPacket, Region, Result};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::trace;

use crate::backend::DirectStore;
use crate::lease::Lease;

/// Seed of the per-nexus random generator; slot numbers are mixed in.
pub(crate) const NEXUS_SEED: u64 = 0x7078_6361_6368_6521;

/// Pixel window owned by one worker.
///
/// Obtain one from [`CacheView::nexus`](crate::CacheView::nexus) or
/// [`CacheView::new_nexus`](crate::CacheView::new_nexus).
#[derive(Debug)]
pub struct Nexus<'c> {
    region: Region,
    direct: Option<DirectStore>,
    pixels: Vec<PixelPacket>,
    indexes: Vec<IndexPacket>,
    has_indexes: bool,
    pending: bool,
    lease: Option<Lease<'c>>,
    pub(crate) rng: StdRng,
}

impl<'c> Nexus<'c> {
    pub(crate) fn new(seed: u64) -> Self {
        Self {
            region: Region::default(),
            direct: None,
            pixels: Vec::new(),
            indexes: Vec::new(),
            has_indexes: false,
            pending: false,
            lease: None,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Region of the current window.
    pub fn region(&self) -> Region {
        self.region
    }

    /// Returns `true` if the current window points into cache storage.
    pub fn is_direct(&self) -> bool {
        self.direct.is_some()
    }

    /// Returns `true` if an authentic window awaits sync.
    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Drops the current window and its lease.
    pub(crate) fn release(&mut self) {
        if self.pending {
            trace!(region = %self.region, "discarding unsynced window");
        }
        self.pending = false;
        self.direct = None;
        self.lease = None;
    }

    pub(crate) fn set_lease(&mut self, lease: Lease<'c>) {
        self.lease = Some(lease);
    }

    pub(crate) fn set_pending(&mut self, pending: bool) {
        self.pending = pending;
    }

    /// Points the window at `len` elements of a store starting at element `offset`.
    ///
    /// # Safety
    ///
    /// `store` must be valid for `offset + len` elements for as long as the
    /// window is held. Authentic windows must hold a write lease covering
    /// the range.
    pub(crate) unsafe fn set_direct(&mut self, region: Region, store: DirectStore, offset: usize) {
        // SAFETY: forwarded from the caller.
        let direct = unsafe {
            DirectStore {
                pixels: NonNull::new_unchecked(store.pixels.as_ptr().add(offset)),
                indexes: store
                    .indexes
                    .map(|idx| NonNull::new_unchecked(idx.as_ptr().add(offset))),
            }
        };
        self.region = region;
        self.has_indexes = direct.indexes.is_some();
        self.direct = Some(direct);
    }

    /// Sizes the scratch buffers for a staged window over `region`.
    pub(crate) fn stage(&mut self, region: Region, has_indexes: bool) -> Result<()> {
        let len = region.area();
        grow(&mut self.pixels, len, PixelPacket::default())?;
        if has_indexes {
            grow(&mut self.indexes, len, 0)?;
        }
        self.region = region;
        self.has_indexes = has_indexes;
        self.direct = None;
        Ok(())
    }

    /// Scratch buffers of a staged window, plus the random generator.
    pub(crate) fn staged_parts(
        &mut self,
    ) -> (&mut [PixelPacket], Option<&mut [IndexPacket]>, &mut StdRng) {
        let len = self.region.area();
        let indexes = if self.has_indexes {
            Some(&mut self.indexes[..len])
        } else {
            None
        };
        (&mut self.pixels[..len], indexes, &mut self.rng)
    }

    /// Scratch buffers of a staged window, read-only.
    pub(crate) fn staged(&self) -> (&[PixelPacket], Option<&[IndexPacket]>) {
        let len = self.region.area();
        let indexes = if self.has_indexes {
            Some(&self.indexes[..len])
        } else {
            None
        };
        (&self.pixels[..len], indexes)
    }

    /// Writable view of the current window.
    pub(crate) fn pixels_mut(&mut self) -> PixelsMut<'_> {
        let len = self.region.area();
        match self.direct {
            Some(direct) => {
                // SAFETY: set_direct guarantees `len` valid elements covered by
                // this nexus's lease; the returned borrow keeps the nexus (and
                // thus the lease) pinned.
                let pixels = unsafe { slice::from_raw_parts_mut(direct.pixels.as_ptr(), len) };
                let indexes = direct
                    .indexes
                    .map(|idx| unsafe { slice::from_raw_parts_mut(idx.as_ptr(), len) });
                PixelsMut { pixels, indexes }
            }
            None => {
                let (pixels, indexes, _) = self.staged_parts();
                PixelsMut { pixels, indexes }
            }
        }
    }

    /// Read-only view of the current window.
    pub(crate) fn pixels(&self) -> Pixels<'_> {
        let len = self.region.area();
        match self.direct {
            Some(direct) => {
                // SAFETY: as in `pixels_mut`.
                let pixels = unsafe { slice::from_raw_parts(direct.pixels.as_ptr(), len) };
                let indexes = direct
                    .indexes
                    .map(|idx| unsafe { slice::from_raw_parts(idx.as_ptr(), len) });
                Pixels { pixels, indexes }
            }
            None => {
                let (pixels, indexes) = self.staged();
                Pixels { pixels, indexes }
            }
        }
    }
}

fn grow<T: Clone>(buffer: &mut Vec<T>, len: usize, fill: T) -> Result<()> {
    if buffer.len() < len {
        buffer
            .try_reserve(len - buffer.len())
            .map_err(|e| Error::allocation_failed(len * std::mem::size_of::<T>(), e.to_string()))?;
        buffer.resize(len, fill);
    }
    Ok(())
}

/// Read-only pixel window returned by virtual requests.
#[derive(Debug)]
pub struct Pixels<'n> {
    pixels: &'n [PixelPacket],
    indexes: Option<&'n [IndexPacket]>,
}

impl<'n> Pixels<'n> {
    /// Index channel of the window, if the image has one.
    pub fn indexes(&self) -> Option<&'n [IndexPacket]> {
        self.indexes
    }
}

impl Deref for Pixels<'_> {
    type Target = [PixelPacket];

    fn deref(&self) -> &[PixelPacket] {
        self.pixels
    }
}

/// Writable pixel window returned by authentic requests.
#[derive(Debug)]
pub struct PixelsMut<'n> {
    pixels: &'n mut [PixelPacket],
    indexes: Option<&'n mut [IndexPacket]>,
}

impl PixelsMut<'_> {
    /// Index channel of the window, if the image has one.
    pub fn indexes(&self) -> Option<&[IndexPacket]> {
        self.indexes.as_deref()
    }

    /// Writable index channel of the window.
    pub fn indexes_mut(&mut self) -> Option<&mut [IndexPacket]> {
        self.indexes.as_deref_mut()
    }

    /// Pixels and indexes at once.
    pub fn split_mut(&mut self) -> (&mut [PixelPacket], Option<&mut [IndexPacket]>) {
        (&mut *self.pixels, self.indexes.as_deref_mut())
    }
}

impl Deref for PixelsMut<'_> {
    type Target = [PixelPacket];

    fn deref(&self) -> &[PixelPacket] {
        &*self.pixels
    }
}

impl DerefMut for PixelsMut<'_> {
    fn deref_mut(&mut self) -> &mut [PixelPacket] {
        &mut *self.pixels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_grows_and_reuses() {
        let mut nexus = Nexus::new(NEXUS_SEED);
        nexus.stage(Region::new(0, 0, 4, 2), true).unwrap();
        {
            let mut window = nexus.pixels_mut();
            assert_eq!(window.len(), 8);
            window[7] = PixelPacket::WHITE;
            window.indexes_mut().unwrap()[0] = 3;
        }
        nexus.stage(Region::new(0, 0, 2, 1), false).unwrap();
        let window = nexus.pixels();
        assert_eq!(window.len(), 2);
        assert!(window.indexes().is_none());
        assert!(!nexus.is_direct());
    }

    #[test]
    fn test_release_clears_pending() {
        let mut nexus = Nexus::new(1);
        nexus.set_pending(true);
        assert!(nexus.is_pending());
        nexus.release();
        assert!(!nexus.is_pending());
        assert!(nexus.lease.is_none());
    }
}
