//! Colorspace transforms over whole images.
//!
//! A [`ColorTransform`] is resolved once per operation (tables built, log
//! parameters read) and then applied row by row through
//! [`process_rows`]. PseudoClass images only transform their colormap and
//! resync the pixels.
//!
//! # Example
//!
//! ```rust
//! use px_cache::Image;
//! use px_color::transform_to_colorspace;
//! use px_core::{ColorspaceType, PixelPacket, ResourceLimits, ResourceManager};
//!
//! let resources = ResourceManager::new(ResourceLimits::unlimited());
//! let mut image = Image::filled(&resources, 4, 4, PixelPacket::from_rgb8(128, 64, 32)).unwrap();
//! transform_to_colorspace(&mut image, ColorspaceType::Gray).unwrap();
//! assert_eq!(image.colorspace(), ColorspaceType::Gray);
//! assert_eq!(image.get_one_virtual_pixel(0, 0).to_rgb8(), [79, 79, 79]);
//! ```

use std::fmt;

use px_cache::{Image, process_rows};
use px_core::{
    ColorspaceType, Error, IndexPacket, PixelPacket, Quantum, QUANTUM_RANGE, Result,
    StorageClass, clamp_to_quantum, quantum_scale,
};
use tracing::debug;

use crate::formulas::{
    cmy_to_rgb, cmyk_to_rgb, hsb_to_rgb, hsl_to_rgb, hwb_to_rgb, lab_to_rgb, rgb_to_cmy,
    rgb_to_cmyk, rgb_to_hsb, rgb_to_hsl, rgb_to_hwb, rgb_to_lab, srgb_decode, srgb_encode,
};
use crate::log::LogParams;
use crate::matrix::matrix_space;
use crate::tables::LookupTables;

/// Progress tag of RGB to alternate transforms.
pub const RGB_TRANSFORM_TAG: &str = "RGBTransform/Image";

/// Progress tag of alternate to RGB transforms.
pub const TRANSFORM_TAG: &str = "Transform/Image";

/// Which way a transform goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// RGB to the alternate colorspace
    ToAlternate,
    /// Alternate colorspace to RGB
    ToRgb,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ToAlternate => f.write_str("to-alternate"),
            Self::ToRgb => f.write_str("to-rgb"),
        }
    }
}

#[derive(Debug, Clone)]
enum Kind {
    Identity,
    Table(Box<LookupTables>),
    GrayToRgb,
    Cmy,
    Cmyk,
    Hsb,
    Hsl,
    Hwb,
    Lab,
    Log(LogParams),
    Srgb,
}

/// A resolved per-pixel transform between RGB and one colorspace.
#[derive(Debug, Clone)]
pub struct ColorTransform {
    colorspace: ColorspaceType,
    direction: Direction,
    kind: Kind,
}

#[inline]
fn unit(px: &PixelPacket) -> [f64; 3] {
    [quantum_scale(px.red), quantum_scale(px.green), quantum_scale(px.blue)]
}

#[inline]
fn quantum(v: f64) -> Quantum {
    clamp_to_quantum(v * QUANTUM_RANGE as f64)
}

#[inline]
fn packet(rgb: [f64; 3], opacity: Quantum) -> PixelPacket {
    PixelPacket::new(quantum(rgb[0]), quantum(rgb[1]), quantum(rgb[2]), opacity)
}

#[inline]
fn map_row(pixels: &mut [PixelPacket], f: impl Fn([f64; 3]) -> [f64; 3]) {
    for px in pixels.iter_mut() {
        *px = packet(f(unit(px)), px.opacity);
    }
}

impl ColorTransform {
    /// Resolves the transform between RGB and `colorspace`.
    ///
    /// Log parameters come from `image` properties. Lookup tables are built
    /// here; failing to allocate them is fatal.
    pub fn new(colorspace: ColorspaceType, direction: Direction, image: &Image) -> Result<Self> {
        use ColorspaceType as C;

        let kind = match colorspace {
            C::Undefined => {
                return Err(Error::unsupported_conversion(colorspace, ColorspaceType::Rgb));
            }
            C::Rgb | C::Transparent => Kind::Identity,
            C::Cmy => Kind::Cmy,
            C::Cmyk => Kind::Cmyk,
            C::Hsb => Kind::Hsb,
            C::Hsl => Kind::Hsl,
            C::Hwb => Kind::Hwb,
            C::Lab => Kind::Lab,
            C::Log => Kind::Log(LogParams::from_properties(&image.properties)?),
            C::Srgb => Kind::Srgb,
            _ => {
                let space = matrix_space(colorspace)
                    .ok_or_else(|| Error::unsupported_conversion(colorspace, ColorspaceType::Rgb))?;
                match direction {
                    Direction::ToAlternate => Kind::Table(Box::new(LookupTables::forward(&space)?)),
                    Direction::ToRgb if space.luma => Kind::GrayToRgb,
                    Direction::ToRgb => Kind::Table(Box::new(LookupTables::inverse(&space)?)),
                }
            }
        };
        Ok(Self {
            colorspace,
            direction,
            kind,
        })
    }

    /// The non-RGB side of the transform.
    pub fn colorspace(&self) -> ColorspaceType {
        self.colorspace
    }

    /// Direction of the transform.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Returns `true` if the transform reads or writes black in the index channel.
    pub fn uses_index_black(&self) -> bool {
        matches!(self.kind, Kind::Cmyk)
    }

    /// Transforms one pixel. `black` is the CMYK index sample, if any.
    ///
    /// A CMYK transform without a black sample returns the pixel unchanged.
    pub fn apply_pixel(&self, px: PixelPacket, black: Option<&mut IndexPacket>) -> PixelPacket {
        let mut one = [px];
        let black = black.map(std::slice::from_mut);
        match self.apply_row(&mut one, black) {
            Ok(()) => one[0],
            Err(_) => px,
        }
    }

    /// Transforms a row in place.
    pub fn apply_row(
        &self,
        pixels: &mut [PixelPacket],
        indexes: Option<&mut [IndexPacket]>,
    ) -> Result<()> {
        let forward = self.direction == Direction::ToAlternate;
        match &self.kind {
            Kind::Identity => {}
            Kind::Table(tables) => {
                for px in pixels.iter_mut() {
                    *px = tables.apply(px);
                }
            }
            Kind::GrayToRgb => {
                for px in pixels.iter_mut() {
                    *px = PixelPacket::new(px.red, px.red, px.red, px.opacity);
                }
            }
            Kind::Cmy => map_row(pixels, if forward { rgb_to_cmy } else { cmy_to_rgb }),
            Kind::Cmyk => {
                let indexes = indexes.ok_or_else(|| {
                    Error::invalid_argument("CMYK transform needs an index channel")
                })?;
                for (px, black) in pixels.iter_mut().zip(indexes.iter_mut()) {
                    if forward {
                        let (cmy, k) = rgb_to_cmyk(unit(px));
                        *px = packet(cmy, px.opacity);
                        *black = quantum(k);
                    } else {
                        *px = packet(cmyk_to_rgb(unit(px), quantum_scale(*black)), px.opacity);
                    }
                }
            }
            Kind::Hsb => map_row(pixels, if forward { rgb_to_hsb } else { hsb_to_rgb }),
            Kind::Hsl => map_row(pixels, if forward { rgb_to_hsl } else { hsl_to_rgb }),
            Kind::Hwb => map_row(pixels, if forward { rgb_to_hwb } else { hwb_to_rgb }),
            Kind::Lab => map_row(pixels, if forward { rgb_to_lab } else { lab_to_rgb }),
            Kind::Log(params) => map_row(pixels, |rgb| {
                rgb.map(|v| if forward { params.encode(v) } else { params.decode(v) })
            }),
            Kind::Srgb => {
                let f = if forward { srgb_encode } else { srgb_decode };
                map_row(pixels, |rgb| rgb.map(f));
            }
        }
        Ok(())
    }
}

/// Converts an RGB image to `target`.
///
/// The colorspace tag changes only when every row succeeded. Sources other
/// than RGB are rejected; use [`transform_colorspace`] to go through RGB.
pub fn transform_to_colorspace(image: &mut Image, target: ColorspaceType) -> Result<()> {
    let source = image.colorspace();
    if source == target {
        return Ok(());
    }
    if target == ColorspaceType::Rgb {
        return transform_to_rgb(image);
    }
    if !source.is_rgb_compatible() {
        return Err(Error::unsupported_conversion(source, target));
    }
    let transform = ColorTransform::new(target, Direction::ToAlternate, image)?;
    run(image, &transform, RGB_TRANSFORM_TAG)?;
    image.set_colorspace(target)
}

/// Converts an image back to RGB.
pub fn transform_to_rgb(image: &mut Image) -> Result<()> {
    let source = image.colorspace();
    if source == ColorspaceType::Rgb {
        return Ok(());
    }
    if source == ColorspaceType::Undefined {
        return image.set_colorspace(ColorspaceType::Rgb);
    }
    let transform = ColorTransform::new(source, Direction::ToRgb, image)?;
    run(image, &transform, TRANSFORM_TAG)?;
    image.set_colorspace(ColorspaceType::Rgb)
}

/// Converts between any two colorspaces, through RGB when needed.
pub fn transform_colorspace(image: &mut Image, target: ColorspaceType) -> Result<()> {
    if target == ColorspaceType::Undefined {
        return Err(Error::invalid_argument("cannot transform to an undefined colorspace"));
    }
    if image.colorspace() == target {
        return Ok(());
    }
    if !image.colorspace().is_rgb_compatible() {
        transform_to_rgb(image)?;
    }
    transform_to_colorspace(image, target)
}

fn run(image: &mut Image, transform: &ColorTransform, tag: &str) -> Result<()> {
    debug!(
        colorspace = %transform.colorspace(),
        direction = %transform.direction(),
        columns = image.columns(),
        rows = image.rows(),
        class = %image.storage_class(),
        "colorspace transform"
    );

    if image.storage_class() == StorageClass::Pseudo {
        if transform.uses_index_black() {
            // black needs the index channel the palette occupies
            image.set_storage_class(StorageClass::Direct)?;
        } else {
            for entry in image.colormap_mut() {
                *entry = transform.apply_pixel(*entry, None);
            }
            return image.sync_image();
        }
    }

    if transform.uses_index_black() && transform.direction() == Direction::ToAlternate {
        image.set_index_channel(true)?;
    }
    process_rows(image, tag, |_, pixels, indexes| {
        transform.apply_row(pixels, indexes)
    })?;
    debug!(colorspace = %transform.colorspace(), "colorspace transform done");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use px_core::{ResourceLimits, ResourceManager};

    fn image(pixels: &[PixelPacket], columns: usize) -> Image {
        let resources = ResourceManager::new(ResourceLimits::unlimited());
        Image::from_pixels(&resources, columns, pixels.len() / columns, pixels).unwrap()
    }

    #[test]
    fn test_undefined_is_rejected() {
        let mut img = image(&[PixelPacket::WHITE], 1);
        assert!(transform_colorspace(&mut img, ColorspaceType::Undefined).is_err());
        assert_eq!(img.colorspace(), ColorspaceType::Rgb);
    }

    #[test]
    fn test_non_rgb_source_needs_rgb_first() {
        let mut img = image(&[PixelPacket::from_rgb8(10, 200, 30)], 1);
        transform_to_colorspace(&mut img, ColorspaceType::Hsl).unwrap();
        let err = transform_to_colorspace(&mut img, ColorspaceType::Lab).unwrap_err();
        assert!(matches!(err, Error::UnsupportedConversion { .. }));
        transform_colorspace(&mut img, ColorspaceType::Lab).unwrap();
        assert_eq!(img.colorspace(), ColorspaceType::Lab);
    }

    #[test]
    fn test_gray_back_to_rgb_copies_red() {
        let mut img = image(&[PixelPacket::new(100, 5, 9, 0)], 1);
        img.set_colorspace(ColorspaceType::Rec709Luma).unwrap();
        transform_to_rgb(&mut img).unwrap();
        assert_eq!(img.get_one_virtual_pixel(0, 0), PixelPacket::new(100, 100, 100, 0));
    }

    #[test]
    fn test_apply_pixel_keeps_opacity() {
        let resources = ResourceManager::new(ResourceLimits::unlimited());
        let img = Image::new(&resources, 1, 1).unwrap();
        let transform = ColorTransform::new(ColorspaceType::Cmy, Direction::ToAlternate, &img).unwrap();
        let out = transform.apply_pixel(PixelPacket::new(0, QUANTUM_RANGE, 0, 99), None);
        assert_eq!(out, PixelPacket::new(QUANTUM_RANGE, 0, QUANTUM_RANGE, 99));
    }

    #[test]
    fn test_cmyk_requires_indexes_in_rows() {
        let resources = ResourceManager::new(ResourceLimits::unlimited());
        let img = Image::new(&resources, 1, 1).unwrap();
        let transform = ColorTransform::new(ColorspaceType::Cmyk, Direction::ToAlternate, &img).unwrap();
        let mut row = [PixelPacket::WHITE];
        assert!(transform.apply_row(&mut row, None).is_err());
        let mut black = [0];
        transform.apply_row(&mut row, Some(&mut black)).unwrap();
        assert_eq!(black[0], 0);
        assert_eq!(row[0], PixelPacket::BLACK);
    }
}
