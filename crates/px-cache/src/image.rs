//! Images: attributes plus a shared pixel cache.
//!
//! Cloning an [`Image`] shares its cache; the first authentic view opened on
//! either copy splits them ([`Image::make_cache_exclusive`]). Structural
//! changes take `&mut self`, so they can never overlap open views.
//!
//! # Usage
//!
//! ```rust
//! use px_cache::{Image, StorageType};
//! use px_core::{PixelPacket, ResourceLimits, ResourceManager};
//!
//! let resources = ResourceManager::new(ResourceLimits::unlimited());
//! let image = Image::filled(&resources, 8, 8, PixelPacket::from_rgb8(255, 0, 0)).unwrap();
//! assert_eq!(image.storage_type(), StorageType::Memory);
//!
//! let mut copy = image.clone();
//! assert_eq!(image.reference_count(), 2);
//! copy.set_extent(4, 4).unwrap();
//! assert_eq!(image.reference_count(), 1);
//! ```

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use px_core::{
    ColorspaceType, Error, IndexPacket, MAX_MAP, PIXEL_PACKET_SIZE, PixelPacket, ProgressMonitor,
    QUANTUM_RANGE, Region, ResourceManager, Result, StorageClass,
};
use tracing::{debug, warn};

use crate::backend::{StorageType, read_exact_at, store_length, write_all_at};
use crate::cache::Cache;
use crate::rows::process_rows;
use crate::view::CacheView;
use crate::virtual_pixel::VirtualPixelMethod;

/// Largest colormap a PseudoClass image may carry.
pub const MAX_COLORMAP: usize = MAX_MAP + 1;

/// Where a persisted cache lives inside its file.
///
/// ```text
/// offset -> colormap (colormap_len pixel packets)
///           pixels   (columns * rows pixel packets)
///           indexes  (columns * rows index packets, if has_indexes)
/// ```
///
/// All values are native-endian; the file has no header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistLayout {
    /// Byte offset of the colormap block
    pub offset: u64,
    /// Image columns
    pub columns: usize,
    /// Image rows
    pub rows: usize,
    /// Colormap entries stored before the pixels
    pub colormap_len: usize,
    /// Whether an index channel follows the pixels
    pub has_indexes: bool,
}

impl PersistLayout {
    /// Byte offset of the pixel data.
    pub fn pixel_offset(&self) -> u64 {
        self.offset + (self.colormap_len * PIXEL_PACKET_SIZE) as u64
    }

    /// Bytes occupied by the whole record.
    pub fn len(&self) -> u64 {
        let cache = store_length(self.columns * self.rows, self.has_indexes).unwrap_or(usize::MAX);
        (self.colormap_len * PIXEL_PACKET_SIZE) as u64 + cache as u64
    }

    /// Returns `true` if the record holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Next free offset after this record.
    pub fn end(&self) -> u64 {
        self.offset + self.len()
    }
}

/// An image: attributes and a reference-counted pixel cache.
#[derive(Debug, Clone)]
pub struct Image {
    columns: usize,
    rows: usize,
    storage_class: StorageClass,
    colorspace: ColorspaceType,
    colormap: Vec<PixelPacket>,
    /// Whether opacity is meaningful
    pub matte: bool,
    /// Bits per sample of the source data
    pub depth: u32,
    /// Color of `Background` virtual pixels and failed single-pixel reads
    pub background_color: PixelPacket,
    /// Color of `Constant` virtual pixels
    pub border_color: PixelPacket,
    /// Policy for pixels outside the image
    pub virtual_pixel_method: VirtualPixelMethod,
    /// Free-form string properties (`gamma`, `reference-black`, ...)
    pub properties: BTreeMap<String, String>,
    /// Progress callback for long operations
    pub progress_monitor: Option<ProgressMonitor>,
    resources: Arc<ResourceManager>,
    cache: Arc<Cache>,
}

impl Image {
    /// Creates a black RGB image. Pixel storage is allocated on first access.
    pub fn new(resources: &Arc<ResourceManager>, columns: usize, rows: usize) -> Result<Self> {
        let cache = Cache::new(resources, columns, rows, false)?;
        Ok(Self::with_cache(resources, cache))
    }

    /// Creates an image that records dimensions only.
    pub fn ping(resources: &Arc<ResourceManager>, columns: usize, rows: usize) -> Result<Self> {
        let cache = Cache::ping(resources, columns, rows)?;
        Ok(Self::with_cache(resources, cache))
    }

    /// Creates an image with every pixel set to `color`.
    pub fn filled(
        resources: &Arc<ResourceManager>,
        columns: usize,
        rows: usize,
        color: PixelPacket,
    ) -> Result<Self> {
        let mut image = Self::new(resources, columns, rows)?;
        image.matte = !color.is_opaque();
        process_rows(&mut image, "Fill/Image", |_, pixels, _| {
            pixels.fill(color);
            Ok(())
        })?;
        Ok(image)
    }

    /// Creates an image from row-major pixels.
    pub fn from_pixels(
        resources: &Arc<ResourceManager>,
        columns: usize,
        rows: usize,
        pixels: &[PixelPacket],
    ) -> Result<Self> {
        let mut image = Self::new(resources, columns, rows)?;
        image.import_pixels(pixels)?;
        Ok(image)
    }

    fn with_cache(resources: &Arc<ResourceManager>, cache: Cache) -> Self {
        Self {
            columns: cache.columns(),
            rows: cache.rows(),
            storage_class: StorageClass::Direct,
            colorspace: ColorspaceType::Rgb,
            colormap: Vec::new(),
            matte: false,
            depth: 16,
            background_color: PixelPacket::WHITE,
            border_color: PixelPacket::from_rgb8(223, 223, 223),
            virtual_pixel_method: VirtualPixelMethod::Undefined,
            properties: BTreeMap::new(),
            progress_monitor: None,
            resources: Arc::clone(resources),
            cache: Arc::new(cache),
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

    /// Direct or Pseudo class.
    #[inline]
    pub fn storage_class(&self) -> StorageClass {
        self.storage_class
    }

    /// Colorspace tag.
    #[inline]
    pub fn colorspace(&self) -> ColorspaceType {
        self.colorspace
    }

    /// Colormap of a PseudoClass image.
    pub fn colormap(&self) -> &[PixelPacket] {
        &self.colormap
    }

    /// Writable colormap entries; call [`sync_image`](Self::sync_image) afterwards.
    pub fn colormap_mut(&mut self) -> &mut [PixelPacket] {
        &mut self.colormap
    }

    /// The pixel cache.
    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    /// Storage class of the pixel cache.
    pub fn storage_type(&self) -> StorageType {
        self.cache.storage_type()
    }

    /// Resource context the cache is accounted against.
    pub fn resources(&self) -> &Arc<ResourceManager> {
        &self.resources
    }

    /// Images sharing this cache, including this one.
    pub fn reference_count(&self) -> usize {
        Arc::strong_count(&self.cache)
    }

    /// String property lookup.
    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(String::as_str)
    }

    /// Sets a string property.
    pub fn set_property(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.properties.insert(name.into(), value.into());
    }

    /// Installs a progress monitor.
    pub fn set_progress_monitor(&mut self, monitor: Option<ProgressMonitor>) {
        self.progress_monitor = monitor;
    }

    /// Reads one pixel, using the image's virtual pixel method outside it.
    pub fn get_one_virtual_pixel(&self, x: i64, y: i64) -> PixelPacket {
        self.one_pixel(self.virtual_pixel_method, x, y)
    }

    /// Reads one in-bounds pixel; the background color otherwise.
    pub fn get_one_authentic_pixel(&self, x: i64, y: i64) -> PixelPacket {
        if !Region::full(self.columns(), self.rows()).contains(x, y) {
            warn!(x, y, "authentic pixel outside image, using background");
            return self.background_color;
        }
        self.one_pixel(VirtualPixelMethod::Edge, x, y)
    }

    fn one_pixel(&self, method: VirtualPixelMethod, x: i64, y: i64) -> PixelPacket {
        self.cache
            .read_one(method, x, y, self.background_color, self.border_color)
            .unwrap_or_else(|err| {
                warn!(x, y, %err, "virtual pixel unavailable, using background");
                self.background_color
            })
    }

    /// Copies all pixels out in row-major order.
    pub fn export_pixels(&self) -> Result<Vec<PixelPacket>> {
        let view = CacheView::new(self);
        let mut nexus = view.new_nexus();
        let mut out = Vec::new();
        out.try_reserve_exact(self.columns * self.rows)
            .map_err(|e| Error::allocation_failed(self.columns * self.rows * PIXEL_PACKET_SIZE, e.to_string()))?;
        for y in 0..self.rows {
            let row = view.get_virtual_pixels(&mut nexus, 0, y as i64, self.columns, 1)?;
            out.extend_from_slice(&row);
        }
        Ok(out)
    }

    /// Copies the index channel out, if there is one.
    pub fn export_indexes(&self) -> Result<Option<Vec<IndexPacket>>> {
        if !self.cache.has_indexes() {
            return Ok(None);
        }
        let view = CacheView::new(self);
        let mut nexus = view.new_nexus();
        let mut out = Vec::with_capacity(self.columns * self.rows);
        for y in 0..self.rows {
            let row = view.get_virtual_pixels(&mut nexus, 0, y as i64, self.columns, 1)?;
            out.extend_from_slice(row.indexes().unwrap_or_default());
        }
        Ok(Some(out))
    }

    /// Overwrites all pixels from row-major data.
    pub fn import_pixels(&mut self, pixels: &[PixelPacket]) -> Result<()> {
        let columns = self.columns;
        if pixels.len() != columns * self.rows {
            return Err(Error::invalid_argument(format!(
                "expected {} pixels, got {}",
                columns * self.rows,
                pixels.len()
            )));
        }
        let view = CacheView::authentic(self)?;
        let mut nexus = view.new_nexus();
        for (y, src) in pixels.chunks_exact(columns).enumerate() {
            let mut row = view.queue_authentic_pixels(&mut nexus, 0, y as i64, columns, 1)?;
            row.copy_from_slice(src);
            drop(row);
            view.sync_authentic_pixels(&mut nexus)?;
        }
        Ok(())
    }

    /// Deep copy with its own cache.
    pub fn clone_mutable(&self) -> Result<Image> {
        let mut clone = self.clone();
        clone.cache = Arc::new(self.cache.deep_clone()?);
        Ok(clone)
    }

    /// Ensures no other image shares this cache, copying it if needed.
    pub fn make_cache_exclusive(&mut self) -> Result<()> {
        if Arc::get_mut(&mut self.cache).is_none() {
            debug!(references = self.reference_count(), "copy-on-write pixel cache");
            self.cache = Arc::new(self.cache.deep_clone()?);
        }
        Ok(())
    }

    /// Resizes the canvas, keeping the overlapping pixels.
    pub fn set_extent(&mut self, columns: usize, rows: usize) -> Result<()> {
        if columns == self.columns && rows == self.rows {
            return Ok(());
        }
        let cache = self.cache.resized(columns, rows)?;
        debug!(
            old_columns = self.columns,
            old_rows = self.rows,
            columns,
            rows,
            "set image extent"
        );
        self.cache = Arc::new(cache);
        self.columns = columns;
        self.rows = rows;
        Ok(())
    }

    /// Adds or drops the index channel without retagging the image.
    ///
    /// PseudoClass images keep their indexes.
    pub fn set_index_channel(&mut self, has_indexes: bool) -> Result<()> {
        if !has_indexes && self.storage_class == StorageClass::Pseudo {
            return Err(Error::invalid_argument("PseudoClass images need their index channel"));
        }
        if self.cache.has_indexes() != has_indexes {
            self.cache = Arc::new(self.cache.with_index_channel(has_indexes)?);
        }
        Ok(())
    }

    /// Switches between DirectClass and PseudoClass.
    ///
    /// Pseudo to Direct writes colormap colors into the pixels and drops the
    /// index channel (kept for CMYK). Direct to Pseudo needs a colormap; each
    /// pixel is mapped to its nearest colormap entry.
    pub fn set_storage_class(&mut self, class: StorageClass) -> Result<()> {
        if class == self.storage_class {
            return Ok(());
        }
        match class {
            StorageClass::Direct => {
                self.sync_image()?;
                self.storage_class = StorageClass::Direct;
                if !self.colorspace.uses_index_black() {
                    self.set_index_channel(false)?;
                }
                self.colormap.clear();
            }
            StorageClass::Pseudo => {
                if self.colormap.is_empty() {
                    return Err(Error::invalid_argument("PseudoClass requires a colormap"));
                }
                if self.colorspace.uses_index_black() {
                    return Err(Error::invalid_argument(
                        "CMYK images keep black in the index channel and cannot be PseudoClass",
                    ));
                }
                self.set_index_channel(true)?;
                let colormap = self.colormap.clone();
                process_rows(self, "Assign/Image", |_, pixels, indexes| {
                    let Some(indexes) = indexes else {
                        return Err(Error::CacheNotOpen);
                    };
                    for (px, index) in pixels.iter().zip(indexes.iter_mut()) {
                        *index = nearest_color(&colormap, px);
                    }
                    Ok(())
                })?;
                self.storage_class = StorageClass::Pseudo;
                self.sync_image()?;
            }
        }
        debug!(class = %self.storage_class, "set storage class");
        Ok(())
    }

    /// Allocates a linear gray ramp colormap of `colors` entries and makes
    /// the image PseudoClass.
    pub fn acquire_colormap(&mut self, colors: usize) -> Result<()> {
        if colors == 0 || colors > MAX_COLORMAP {
            return Err(Error::invalid_argument(format!(
                "colormap size {colors} outside 1..={MAX_COLORMAP}"
            )));
        }
        let mut colormap = Vec::new();
        colormap
            .try_reserve_exact(colors)
            .map_err(|e| Error::fatal_allocation(colors * PIXEL_PACKET_SIZE, e.to_string()))?;
        let step = if colors > 1 { colors - 1 } else { 1 };
        colormap.extend((0..colors).map(|i| {
            PixelPacket::gray(((i * QUANTUM_RANGE as usize) / step) as u16)
        }));
        self.set_colormap(colormap)
    }

    /// Replaces the colormap. A PseudoClass image is resynced; a DirectClass
    /// image becomes PseudoClass.
    pub fn set_colormap(&mut self, colormap: Vec<PixelPacket>) -> Result<()> {
        if colormap.is_empty() || colormap.len() > MAX_COLORMAP {
            return Err(Error::invalid_argument(format!(
                "colormap size {} outside 1..={MAX_COLORMAP}",
                colormap.len()
            )));
        }
        self.colormap = colormap;
        match self.storage_class {
            StorageClass::Pseudo => self.sync_image(),
            StorageClass::Direct => self.set_storage_class(StorageClass::Pseudo),
        }
    }

    /// Rewrites every pixel of a PseudoClass image from its colormap.
    ///
    /// Out-of-range indexes are clamped to entry 0 and reported as an
    /// [`Error::InvalidColormapIndex`] warning once the whole image is synced.
    pub fn sync_image(&mut self) -> Result<()> {
        if self.storage_class != StorageClass::Pseudo
            || !self.cache.has_indexes()
            || self.colormap.is_empty()
        {
            return Ok(());
        }
        let colormap = std::mem::take(&mut self.colormap);
        let matte = self.matte;
        let invalid = Mutex::new(None);
        let result = process_rows(self, "Sync/Image", |_, pixels, indexes| {
            let Some(indexes) = indexes else {
                return Ok(());
            };
            for (px, index) in pixels.iter_mut().zip(indexes.iter_mut()) {
                let entry = match colormap.get(*index as usize) {
                    Some(entry) => *entry,
                    None => {
                        let mut slot = invalid.lock().unwrap_or_else(PoisonError::into_inner);
                        slot.get_or_insert(*index as usize);
                        *index = 0;
                        colormap[0]
                    }
                };
                let opacity = if matte { px.opacity } else { entry.opacity };
                *px = PixelPacket { opacity, ..entry };
            }
            Ok(())
        });
        let colors = colormap.len();
        self.colormap = colormap;
        result?;
        match invalid.into_inner().unwrap_or_else(PoisonError::into_inner) {
            Some(index) => Err(Error::InvalidColormapIndex { index, colors }),
            None => Ok(()),
        }
    }

    /// Retags the colorspace, adding or dropping the CMYK black channel.
    ///
    /// Pixel values are not converted; see the transform crate for that.
    pub fn set_colorspace(&mut self, colorspace: ColorspaceType) -> Result<()> {
        if colorspace.uses_index_black() {
            self.set_index_channel(true)?;
        } else if self.colorspace.uses_index_black() && self.storage_class == StorageClass::Direct {
            self.set_index_channel(false)?;
        }
        self.colorspace = colorspace;
        if colorspace == ColorspaceType::Transparent {
            self.matte = true;
        }
        Ok(())
    }

    /// Writes the image's colormap and cache to `path` at `offset` and rebinds
    /// the cache to that file.
    pub fn persist(&mut self, path: impl AsRef<Path>, offset: u64) -> Result<PersistLayout> {
        let path = path.as_ref();
        let layout = PersistLayout {
            offset,
            columns: self.columns,
            rows: self.rows,
            colormap_len: if self.storage_class == StorageClass::Pseudo {
                self.colormap.len()
            } else {
                0
            },
            has_indexes: self.cache.has_indexes(),
        };
        if layout.colormap_len > 0 {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(path)?;
            write_all_at(&file, bytemuck::cast_slice(&self.colormap), offset)?;
        }
        let cache = self.cache.persist(path, layout.pixel_offset())?;
        self.cache = Arc::new(cache);
        debug!(path = %path.display(), offset, end = layout.end(), "persisted image");
        Ok(layout)
    }

    /// Opens an image persisted with [`persist`](Self::persist).
    pub fn attach(
        resources: &Arc<ResourceManager>,
        path: impl AsRef<Path>,
        layout: &PersistLayout,
    ) -> Result<Image> {
        let path = path.as_ref();
        let cache = Cache::attach(
            resources,
            path,
            layout.pixel_offset(),
            layout.columns,
            layout.rows,
            layout.has_indexes,
        )?;
        let mut image = Self::with_cache(resources, cache);
        if layout.colormap_len > 0 {
            let file = OpenOptions::new().read(true).open(path)?;
            let mut colormap = vec![PixelPacket::default(); layout.colormap_len];
            read_exact_at(&file, bytemuck::cast_slice_mut(&mut colormap), layout.offset)?;
            image.colormap = colormap;
            image.storage_class = StorageClass::Pseudo;
        }
        Ok(image)
    }
}

fn nearest_color(colormap: &[PixelPacket], px: &PixelPacket) -> IndexPacket {
    let mut best = 0usize;
    let mut best_distance = u64::MAX;
    for (i, entry) in colormap.iter().enumerate() {
        let distance = entry.distance_squared(px);
        if distance < best_distance {
            best = i;
            best_distance = distance;
            if distance == 0 {
                break;
            }
        }
    }
    best as IndexPacket
}
