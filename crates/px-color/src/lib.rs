//! # px-color
//!
//! Colorspace transforms for px images.
//!
//! - **Matrix spaces** - GRAY, Rec601/709 luma and YCbCr, YPbPr, OHTA, XYZ,
//!   YCC, YIQ, YUV; applied through per-channel [`LookupTables`]
//! - **Closed-form spaces** - CMY, CMYK, HSB, HSL, HWB, Lab, Log, sRGB
//! - **Tag-only** - Transparent (sets the matte flag)
//!
//! Every transform runs through one authentic cache view, rows in parallel.
//! PseudoClass images transform their colormap instead and resync.
//!
//! # Architecture
//!
//! ```text
//!   transform_colorspace(image, target)
//!        |
//!        +-- transform_to_rgb        (X -> RGB, "Transform/Image")
//!        +-- transform_to_colorspace (RGB -> X, "RGBTransform/Image")
//!                 |
//!            ColorTransform::new --> LookupTables | formulas | LogParams
//!                 |
//!            px_cache::process_rows
//! ```
//!
//! # Quick Start
//!
//! ```rust
//! use px_cache::Image;
//! use px_color::{transform_colorspace, transform_to_rgb};
//! use px_core::{ColorspaceType, PixelPacket, ResourceLimits, ResourceManager};
//!
//! let resources = ResourceManager::new(ResourceLimits::unlimited());
//! let mut image = Image::filled(&resources, 8, 8, PixelPacket::from_rgb8(200, 40, 90)).unwrap();
//! transform_colorspace(&mut image, ColorspaceType::Hsl).unwrap();
//! transform_to_rgb(&mut image).unwrap();
//! assert_eq!(image.get_one_virtual_pixel(0, 0).to_rgb8(), [200, 40, 90]);
//! ```
//!
//! # Dependencies
//!
//! - [`glam`] - `DMat3` for matrix spaces and their exact inverses
//! - [`rayon`] - parallel table construction

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod formulas;
pub mod log;
pub mod matrix;
mod tables;
mod transform;

pub use log::LogParams;
pub use matrix::{MatrixSpace, matrix_space};
pub use tables::LookupTables;
pub use transform::{
    ColorTransform, Direction, RGB_TRANSFORM_TAG, TRANSFORM_TAG, transform_colorspace,
    transform_to_colorspace, transform_to_rgb,
};

/// Prelude with commonly used items
pub mod prelude {
    pub use crate::{
        ColorTransform, Direction, transform_colorspace, transform_to_colorspace,
        transform_to_rgb,
    };
}
