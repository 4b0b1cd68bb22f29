//! # px-cache
//!
//! Pixel cache for 16-bit images.
//!
//! - [`Cache`] - pixel and index storage, picked lazily from memory, a
//!   memory-mapped temp file, or positional disk I/O, within the budgets of a
//!   [`ResourceManager`](px_core::ResourceManager)
//! - [`CacheView`] - per-thread [`Nexus`] windows over a cache, authentic
//!   (writable) or virtual (read-only, outside pixels resolved by a
//!   [`VirtualPixelMethod`])
//! - [`Image`] - attributes, colormap and a copy-on-write cache
//! - [`process_rows`] - parallel scanline driver with progress and cancellation
//!
//! # Architecture
//!
//! ```text
//!   Image ---Arc---> Cache ---> Memory | Map | Disk backend
//!     |                 ^
//!     |                 | write leases (authentic windows)
//!     v                 |
//!   CacheView ---> [Mutex<Nexus>; threads]
//!     |
//!     +--> resolve(VirtualPixelMethod, x, y) for outside pixels
//! ```
//!
//! # Quick Start
//!
//! ```rust
//! use px_cache::{CacheView, Image, VirtualPixelMethod};
//! use px_core::{PixelPacket, ResourceLimits, ResourceManager};
//!
//! let resources = ResourceManager::new(ResourceLimits::unlimited());
//! let mut image = Image::filled(&resources, 4, 4, PixelPacket::WHITE).unwrap();
//! image.virtual_pixel_method = VirtualPixelMethod::Black;
//!
//! let view = CacheView::new(&image);
//! let mut nexus = view.new_nexus();
//! let window = view.get_virtual_pixels(&mut nexus, -1, 0, 2, 1).unwrap();
//! assert_eq!(window[0], PixelPacket::BLACK);
//! assert_eq!(window[1], PixelPacket::WHITE);
//! ```
//!
//! # Dependencies
//!
//! - [`memmap2`] - mapped cache files
//! - [`tempfile`] - anonymous backing files
//! - [`bytemuck`] - pixel/byte casts for disk I/O
//! - [`rayon`] - worker slots and the row driver
//! - [`rand`] - `Random` virtual pixels

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

mod backend;
mod cache;
mod image;
mod lease;
mod nexus;
mod rows;
mod view;
pub mod virtual_pixel;

pub use backend::StorageType;
pub use cache::Cache;
pub use image::{Image, MAX_COLORMAP, PersistLayout};
pub use nexus::{Nexus, Pixels, PixelsMut};
pub use rows::process_rows;
pub use view::CacheView;
pub use virtual_pixel::{ConstantKind, Resolved, VirtualPixelMethod, resolve};

/// Prelude with commonly used types
pub mod prelude {
    pub use crate::{Cache, CacheView, Image, StorageType, VirtualPixelMethod, process_rows};
}
