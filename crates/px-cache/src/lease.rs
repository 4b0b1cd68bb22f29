//! Write leases.
//!
//! Every authentic window holds a lease on the in-bounds part of its region
//! until its nexus syncs or makes its next request. Two authentic windows
//! may not overlap: the second request fails with [`Error::RegionBusy`].
//!
//! Reads take no lease. Keeping reads clear of rows another nexus is writing
//! is up to the caller.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use px_core::{Error, Region, Result};
use tracing::trace;

#[derive(Debug)]
struct ActiveLease {
    id: u64,
    region: Region,
}

/// Write leases currently held on one cache.
#[derive(Debug, Default)]
pub(crate) struct LeaseRegistry {
    next_id: AtomicU64,
    active: Mutex<Vec<ActiveLease>>,
}

impl LeaseRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes a write lease on `region`, failing if a held one overlaps it.
    pub fn acquire(&self, region: Region) -> Result<Lease<'_>> {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if active.iter().any(|held| held.region.overlaps(&region)) {
            trace!(%region, "lease conflict");
            return Err(Error::region_busy(region));
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        active.push(ActiveLease { id, region });
        Ok(Lease { registry: self, id })
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.active.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn release(&self, id: u64) {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        active.retain(|held| held.id != id);
    }
}

/// A held write lease; released on drop.
#[derive(Debug)]
pub(crate) struct Lease<'r> {
    registry: &'r LeaseRegistry,
    id: u64,
}

impl Drop for Lease<'_> {
    fn drop(&mut self) {
        self.registry.release(self.id);
    }
}
