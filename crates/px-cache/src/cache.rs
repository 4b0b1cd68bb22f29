//! The pixel cache.
//!
//! A [`Cache`] owns the pixel (and optional index) storage of one image.
//! Storage is allocated lazily on first access and picked from the cheapest
//! class that fits the remaining resource budgets:
//!
//! ```text
//! area <= area limit && bytes <= memory budget  -> Memory
//! bytes <= map budget                           -> Map  (temp file, mmap)
//! bytes <= disk budget                          -> Disk (temp file, pread/pwrite)
//! otherwise                                     -> CacheResourcesExhausted
//! ```
//!
//! Structural changes (resize, index channel, persist) never mutate a cache
//! in place: they build a new cache and the owning [`Image`](crate::Image)
//! swaps it in under `&mut` access.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use px_core::{
    Error, IndexPacket, PixelPacket, Reservation, ResourceKind, ResourceManager, Result,
    format_bytes,
};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, trace};

use crate::backend::{
    CacheBackend, DiskBackend, MapBackend, MemoryBackend, StorageType, store_length,
};
use crate::lease::LeaseRegistry;
use crate::nexus::NEXUS_SEED;
use crate::virtual_pixel::{Resolved, VirtualPixelMethod, resolve};

struct Store {
    backend: Box<dyn CacheBackend>,
    _reservation: Reservation,
}

/// Pixel storage of one image.
pub struct Cache {
    columns: usize,
    rows: usize,
    has_indexes: bool,
    ping: bool,
    resources: Arc<ResourceManager>,
    store: OnceLock<Store>,
    open_lock: Mutex<()>,
    leases: LeaseRegistry,
    rng: Mutex<StdRng>,
}

impl Cache {
    /// Creates a cache; storage is allocated on first access.
    pub fn new(
        resources: &Arc<ResourceManager>,
        columns: usize,
        rows: usize,
        has_indexes: bool,
    ) -> Result<Self> {
        validate(columns, rows, has_indexes)?;
        Ok(Self::unopened(resources, columns, rows, has_indexes, false))
    }

    /// Creates a cache that records dimensions only.
    pub fn ping(resources: &Arc<ResourceManager>, columns: usize, rows: usize) -> Result<Self> {
        validate(columns, rows, false)?;
        Ok(Self::unopened(resources, columns, rows, false, true))
    }

    fn unopened(
        resources: &Arc<ResourceManager>,
        columns: usize,
        rows: usize,
        has_indexes: bool,
        ping: bool,
    ) -> Self {
        Self {
            columns,
            rows,
            has_indexes,
            ping,
            resources: Arc::clone(resources),
            store: OnceLock::new(),
            open_lock: Mutex::new(()),
            leases: LeaseRegistry::new(),
            rng: Mutex::new(StdRng::seed_from_u64(NEXUS_SEED)),
        }
    }

    fn opened(
        resources: &Arc<ResourceManager>,
        columns: usize,
        rows: usize,
        has_indexes: bool,
        store: Store,
    ) -> Self {
        Self {
            store: OnceLock::from(store),
            ..Self::unopened(resources, columns, rows, has_indexes, false)
        }
    }

    /// Image columns.
    #[inline]
    pub fn columns(&self) -> usize {
        self.columns
    }

    /// Image rows.
    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of pixels.
    #[inline]
    pub fn pixel_count(&self) -> usize {
        self.columns * self.rows
    }

    /// Returns `true` if the cache carries an index channel.
    #[inline]
    pub fn has_indexes(&self) -> bool {
        self.has_indexes
    }

    /// Returns `true` for dimension-only caches.
    #[inline]
    pub fn is_ping(&self) -> bool {
        self.ping
    }

    /// Storage size in bytes.
    pub fn length(&self) -> u64 {
        store_length(self.pixel_count(), self.has_indexes).unwrap_or(usize::MAX) as u64
    }

    /// Current storage class; `Undefined` until first access.
    pub fn storage_type(&self) -> StorageType {
        if self.ping {
            return StorageType::Ping;
        }
        self.store
            .get()
            .map(|store| store.backend.storage_type())
            .unwrap_or(StorageType::Undefined)
    }

    /// Backing file of a Map or Disk cache.
    pub fn path(&self) -> Option<PathBuf> {
        self.store
            .get()
            .and_then(|store| store.backend.path().map(Path::to_path_buf))
    }

    /// Storage class a cache of this size would get right now.
    ///
    /// Nothing is reserved; a later [`open`](Self::open) may choose differently
    /// if budgets change in between.
    pub fn plan_storage(
        resources: &ResourceManager,
        columns: usize,
        rows: usize,
        has_indexes: bool,
    ) -> Result<StorageType> {
        let pixel_count = validate(columns, rows, has_indexes)?;
        let bytes = store_length(pixel_count, has_indexes).unwrap_or(usize::MAX) as u64;
        if resources.fits_area(pixel_count as u64)
            && resources.available(ResourceKind::Memory) >= bytes
        {
            Ok(StorageType::Memory)
        } else if resources.available(ResourceKind::Map) >= bytes {
            Ok(StorageType::Map)
        } else if resources.available(ResourceKind::Disk) >= bytes {
            Ok(StorageType::Disk)
        } else {
            Err(exhausted(resources, columns, rows, bytes))
        }
    }

    /// Allocates storage if not done yet.
    pub fn open(&self) -> Result<StorageType> {
        Ok(self.backend()?.storage_type())
    }

    /// Pushes outstanding writes of file backed caches.
    pub fn flush(&self) -> Result<()> {
        match self.store.get() {
            Some(store) => store.backend.flush(),
            None => Ok(()),
        }
    }

    pub(crate) fn leases(&self) -> &LeaseRegistry {
        &self.leases
    }

    /// Reads one pixel, resolving outside coordinates with `method`.
    pub(crate) fn read_one(
        &self,
        method: VirtualPixelMethod,
        x: i64,
        y: i64,
        background: PixelPacket,
        border: PixelPacket,
    ) -> Result<PixelPacket> {
        let backend = self.backend()?;
        let resolved = {
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            resolve(method, x, y, self.columns, self.rows, &mut *rng)
        };
        match resolved {
            Resolved::Constant(kind) => Ok(kind.color(background, border)),
            Resolved::Pixel(px, py) => {
                let mut pixel = PixelPacket::default();
                backend.read_pixels(py * self.columns + px, std::slice::from_mut(&mut pixel))?;
                Ok(pixel)
            }
        }
    }

    /// Storage backend, allocating it on first use.
    pub(crate) fn backend(&self) -> Result<&dyn CacheBackend> {
        if self.ping {
            return Err(Error::CacheNotOpen);
        }
        if let Some(store) = self.store.get() {
            return Ok(store.backend.as_ref());
        }
        let _guard = self.open_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if self.store.get().is_none() {
            let store = self.select_store()?;
            let _ = self.store.set(store);
        }
        self.store
            .get()
            .map(|store| store.backend.as_ref())
            .ok_or(Error::CacheNotOpen)
    }

    fn select_store(&self) -> Result<Store> {
        let pixel_count = self.pixel_count();
        let bytes = self.length();
        let resources = &self.resources;
        let dir = resources.limits().temporary_path.as_deref();

        if resources.fits_area(pixel_count as u64) {
            if let Some(reservation) = resources.try_acquire(ResourceKind::Memory, bytes) {
                match MemoryBackend::new(pixel_count, self.has_indexes) {
                    Ok(backend) => return Ok(self.store_opened(Box::new(backend), reservation)),
                    Err(err) => debug!(%err, "heap allocation failed, trying map"),
                }
            }
        }
        if let Some(reservation) = resources.try_acquire(ResourceKind::Map, bytes) {
            match MapBackend::temporary(dir, pixel_count, self.has_indexes) {
                Ok(backend) => return Ok(self.store_opened(Box::new(backend), reservation)),
                Err(err) => debug!(%err, "memory map failed, trying disk"),
            }
        }
        if let Some(reservation) = resources.try_acquire(ResourceKind::Disk, bytes) {
            return match DiskBackend::temporary(dir, pixel_count, self.has_indexes) {
                Ok(backend) => Ok(self.store_opened(Box::new(backend), reservation)),
                Err(err) => Err(Error::resources_exhausted(
                    self.columns,
                    self.rows,
                    bytes,
                    format!("disk cache failed: {err}"),
                )),
            };
        }
        Err(exhausted(resources, self.columns, self.rows, bytes))
    }

    fn store_opened(&self, backend: Box<dyn CacheBackend>, reservation: Reservation) -> Store {
        debug!(
            columns = self.columns,
            rows = self.rows,
            indexes = self.has_indexes,
            storage = %backend.storage_type(),
            size = %format_bytes(self.length()),
            "opened pixel cache"
        );
        Store {
            backend,
            _reservation: reservation,
        }
    }

    /// Independent copy with the same contents.
    pub(crate) fn deep_clone(&self) -> Result<Cache> {
        if self.ping {
            return Cache::ping(&self.resources, self.columns, self.rows);
        }
        let clone = Cache::new(&self.resources, self.columns, self.rows, self.has_indexes)?;
        self.copy_into(&clone)?;
        debug!(columns = self.columns, rows = self.rows, "cloned pixel cache");
        Ok(clone)
    }

    /// New cache of a different size holding the overlapping area.
    pub(crate) fn resized(&self, columns: usize, rows: usize) -> Result<Cache> {
        if self.ping {
            return Cache::ping(&self.resources, columns, rows);
        }
        let resized = Cache::new(&self.resources, columns, rows, self.has_indexes)?;
        self.copy_into(&resized)?;
        Ok(resized)
    }

    /// Copy with the index channel added or removed.
    pub(crate) fn with_index_channel(&self, has_indexes: bool) -> Result<Cache> {
        if self.ping {
            return Cache::ping(&self.resources, self.columns, self.rows);
        }
        let copy = Cache::new(&self.resources, self.columns, self.rows, has_indexes)?;
        self.copy_into(&copy)?;
        Ok(copy)
    }

    /// Writes the cache to `path` at `offset` and returns a cache bound to that file.
    pub(crate) fn persist(&self, path: &Path, offset: u64) -> Result<Cache> {
        if self.ping {
            return Err(Error::CacheNotOpen);
        }
        let store = bind_file(
            &self.resources,
            path,
            offset,
            self.columns,
            self.rows,
            self.has_indexes,
        )?;
        let persisted = Cache::opened(
            &self.resources,
            self.columns,
            self.rows,
            self.has_indexes,
            store,
        );

        let target = persisted.backend()?;
        let source = match self.store.get() {
            Some(store) => Some(store.backend.as_ref()),
            None => None,
        };
        transfer(source, self.columns, target, self.columns, self.columns, self.rows, true)?;
        target.flush()?;
        debug!(
            path = %path.display(),
            offset,
            storage = %target.storage_type(),
            "persisted pixel cache"
        );
        Ok(persisted)
    }

    /// Re-opens a cache previously written by [`persist`](Self::persist).
    pub(crate) fn attach(
        resources: &Arc<ResourceManager>,
        path: &Path,
        offset: u64,
        columns: usize,
        rows: usize,
        has_indexes: bool,
    ) -> Result<Cache> {
        let pixel_count = validate(columns, rows, has_indexes)?;
        let needed = offset + store_length(pixel_count, has_indexes).unwrap_or(usize::MAX) as u64;
        let actual = std::fs::metadata(path)?.len();
        if actual < needed {
            return Err(Error::invalid_argument(format!(
                "persisted cache {} holds {actual} bytes, {needed} required",
                path.display()
            )));
        }
        let store = bind_file(resources, path, offset, columns, rows, has_indexes)?;
        debug!(path = %path.display(), offset, columns, rows, "attached pixel cache");
        Ok(Cache::opened(resources, columns, rows, has_indexes, store))
    }

    /// Copies the overlapping area (and indexes when both carry them) into `dst`.
    fn copy_into(&self, dst: &Cache) -> Result<()> {
        let Some(store) = self.store.get() else {
            // never opened: contents are all zero, as is a fresh cache
            return Ok(());
        };
        let columns = self.columns.min(dst.columns);
        let rows = self.rows.min(dst.rows);
        transfer(
            Some(store.backend.as_ref()),
            self.columns,
            dst.backend()?,
            dst.columns,
            columns,
            rows,
            self.has_indexes && dst.has_indexes,
        )
    }
}

impl fmt::Debug for Cache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("columns", &self.columns)
            .field("rows", &self.rows)
            .field("has_indexes", &self.has_indexes)
            .field("storage", &self.storage_type())
            .finish()
    }
}

fn validate(columns: usize, rows: usize, has_indexes: bool) -> Result<usize> {
    if columns == 0 || rows == 0 {
        return Err(Error::invalid_dimensions(columns, rows, "zero extent"));
    }
    let pixel_count = columns
        .checked_mul(rows)
        .filter(|count| store_length(*count, has_indexes).is_some())
        .filter(|count| i64::try_from(*count).is_ok())
        .ok_or_else(|| Error::invalid_dimensions(columns, rows, "extent overflows address space"))?;
    Ok(pixel_count)
}

fn exhausted(resources: &ResourceManager, columns: usize, rows: usize, bytes: u64) -> Error {
    Error::resources_exhausted(
        columns,
        rows,
        bytes,
        format!(
            "memory {} / map {} / disk {} available",
            format_bytes(resources.available(ResourceKind::Memory)),
            format_bytes(resources.available(ResourceKind::Map)),
            format_bytes(resources.available(ResourceKind::Disk)),
        ),
    )
}

/// Binds a persisted cache file: mapped if the map budget allows, else disk.
fn bind_file(
    resources: &Arc<ResourceManager>,
    path: &Path,
    offset: u64,
    columns: usize,
    rows: usize,
    has_indexes: bool,
) -> Result<Store> {
    let pixel_count = validate(columns, rows, has_indexes)?;
    let bytes = store_length(pixel_count, has_indexes).unwrap_or(usize::MAX) as u64;

    if let Some(reservation) = resources.try_acquire(ResourceKind::Map, bytes) {
        match MapBackend::persistent(path, offset, pixel_count, has_indexes) {
            Ok(backend) => {
                return Ok(Store {
                    backend: Box::new(backend),
                    _reservation: reservation,
                });
            }
            Err(err) => debug!(%err, "cannot map persisted cache, using disk"),
        }
    }
    let reservation = resources
        .try_acquire(ResourceKind::Disk, bytes)
        .ok_or_else(|| exhausted(resources, columns, rows, bytes))?;
    let backend = DiskBackend::persistent(path, offset, pixel_count, has_indexes)?;
    Ok(Store {
        backend: Box::new(backend),
        _reservation: reservation,
    })
}

/// Row-by-row copy of a `columns` x `rows` area between two stores.
///
/// A missing source writes zeros.
fn transfer(
    src: Option<&dyn CacheBackend>,
    src_columns: usize,
    dst: &dyn CacheBackend,
    dst_columns: usize,
    columns: usize,
    rows: usize,
    indexes: bool,
) -> Result<()> {
    let mut pixels = vec![PixelPacket::default(); columns];
    let copy_indexes = indexes && dst.has_indexes() && src.is_none_or(|s| s.has_indexes());
    let mut index_row: Vec<IndexPacket> = if copy_indexes { vec![0; columns] } else { Vec::new() };

    for y in 0..rows {
        let src_offset = y * src_columns;
        let dst_offset = y * dst_columns;
        if let Some(src) = src {
            src.read_pixels(src_offset, &mut pixels)?;
        }
        dst.write_pixels(dst_offset, &pixels)?;
        if copy_indexes {
            if let Some(src) = src {
                src.read_indexes(src_offset, &mut index_row)?;
            }
            dst.write_indexes(dst_offset, &index_row)?;
        }
    }
    trace!(columns, rows, indexes = copy_indexes, "transferred cache rows");
    Ok(())
}
