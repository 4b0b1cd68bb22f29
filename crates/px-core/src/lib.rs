//! # px-core
//!
//! Core types for the px pixel cache and colorspace toolkit.
//!
//! - [`PixelPacket`], [`Quantum`] - 16-bit pixel model and scaling helpers
//! - [`Region`] - signed pixel regions for cache requests
//! - [`ColorspaceType`], [`StorageClass`] - image interpretation tags
//! - [`Error`], [`ErrorDomain`], [`Severity`] - error taxonomy
//! - [`ResourceLimits`], [`ResourceManager`] - resource ceilings and accounting
//! - [`ProgressMonitor`] - progress reporting and cancellation
//!
//! ## Crate Structure
//!
//! ```text
//! px-core (this crate)
//!    ^
//!    |
//!    +-- px-cache (pixel cache, views, Image)
//!    |      ^
//!    |      +-- px-color (colorspace transforms)
//!    +-- px-cli
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod colorspace;
pub mod error;
pub mod progress;
pub mod quantum;
pub mod region;
pub mod resource;

pub use colorspace::*;
pub use error::*;
pub use progress::*;
pub use quantum::*;
pub use region::*;
pub use resource::*;

/// Prelude module for convenient imports.
///
/// ```
/// use px_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::colorspace::{ColorspaceType, StorageClass};
    pub use crate::error::{Error, ErrorDomain, Result, Severity};
    pub use crate::progress::ProgressMonitor;
    pub use crate::quantum::{IndexPacket, PixelPacket, QUANTUM_RANGE, Quantum};
    pub use crate::region::Region;
    pub use crate::resource::{ResourceLimits, ResourceManager};
}
