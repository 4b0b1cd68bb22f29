//! Virtual pixel methods.
//!
//! Requests may address pixels outside the image. [`resolve`] maps such a
//! coordinate either to an in-bounds source pixel or to a constant color,
//! according to a [`VirtualPixelMethod`].
//!
//! ```text
//!            Edge                 Tile                 Mirror
//!   x:  -2 -1 | 0 1 2 | 3 4   -2 -1 | 0 1 2 | 3 4   -2 -1 | 0 1 2 | 3 4
//!   ->   0  0 | 0 1 2 | 2 2    1  2 | 0 1 2 | 0 1    1  0 | 0 1 2 | 2 1
//! ```
//!
//! # Usage
//!
//! ```rust
//! use px_cache::{resolve, Resolved, VirtualPixelMethod};
//! use rand::SeedableRng;
//!
//! let mut rng = rand::rngs::StdRng::seed_from_u64(0);
//! assert_eq!(
//!     resolve(VirtualPixelMethod::Tile, -1, 5, 4, 4, &mut rng),
//!     Resolved::Pixel(3, 1)
//! );
//! ```

use std::fmt;
use std::str::FromStr;

use px_core::{Error, PixelPacket, QUANTUM_RANGE, TRANSPARENT_OPACITY};
use rand::Rng;

/// Policy for pixels outside the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VirtualPixelMethod {
    /// Same as [`Edge`](Self::Edge).
    #[default]
    Undefined,
    /// Image background color.
    Background,
    /// Image border color.
    Constant,
    /// Clamped edge coordinates with an ordered-dither offset.
    Dither,
    /// Nearest edge pixel.
    Edge,
    /// Reflected image.
    Mirror,
    /// Random in-bounds pixel.
    Random,
    /// Repeated image.
    Tile,
    /// Transparent black.
    Transparent,
    /// Opaque black.
    Black,
    /// Opaque mid gray.
    Gray,
    /// Opaque white.
    White,
    /// Tiled horizontally, background above and below.
    HorizontalTile,
    /// Tiled vertically, background left and right.
    VerticalTile,
    /// Tiled horizontally, edge above and below.
    HorizontalTileEdge,
    /// Tiled vertically, edge left and right.
    VerticalTileEdge,
    /// Tiles alternating with background like a checkerboard.
    CheckerTile,
}

impl VirtualPixelMethod {
    /// Every method.
    pub const ALL: [VirtualPixelMethod; 17] = [
        Self::Undefined,
        Self::Background,
        Self::Constant,
        Self::Dither,
        Self::Edge,
        Self::Mirror,
        Self::Random,
        Self::Tile,
        Self::Transparent,
        Self::Black,
        Self::Gray,
        Self::White,
        Self::HorizontalTile,
        Self::VerticalTile,
        Self::HorizontalTileEdge,
        Self::VerticalTileEdge,
        Self::CheckerTile,
    ];

    /// Canonical name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Undefined => "Undefined",
            Self::Background => "Background",
            Self::Constant => "Constant",
            Self::Dither => "Dither",
            Self::Edge => "Edge",
            Self::Mirror => "Mirror",
            Self::Random => "Random",
            Self::Tile => "Tile",
            Self::Transparent => "Transparent",
            Self::Black => "Black",
            Self::Gray => "Gray",
            Self::White => "White",
            Self::HorizontalTile => "HorizontalTile",
            Self::VerticalTile => "VerticalTile",
            Self::HorizontalTileEdge => "HorizontalTileEdge",
            Self::VerticalTileEdge => "VerticalTileEdge",
            Self::CheckerTile => "CheckerTile",
        }
    }
}

impl fmt::Display for VirtualPixelMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for VirtualPixelMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .flat_map(char::to_lowercase)
            .collect();
        Self::ALL
            .into_iter()
            .find(|method| method.name().to_ascii_lowercase() == key)
            .ok_or_else(|| Error::invalid_argument(format!("unknown virtual pixel method '{s}'")))
    }
}

/// Constant colors a virtual pixel may resolve to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstantKind {
    /// Image background color
    Background,
    /// Image border color
    Border,
    /// Transparent black
    Transparent,
    /// Opaque black
    Black,
    /// Opaque mid gray
    Gray,
    /// Opaque white
    White,
}

impl ConstantKind {
    /// Concrete color given the image's background and border colors.
    pub fn color(&self, background: PixelPacket, border: PixelPacket) -> PixelPacket {
        match self {
            Self::Background => background,
            Self::Border => border,
            Self::Transparent => PixelPacket::new(0, 0, 0, TRANSPARENT_OPACITY),
            Self::Black => PixelPacket::BLACK,
            Self::Gray => PixelPacket::gray(QUANTUM_RANGE / 2),
            Self::White => PixelPacket::WHITE,
        }
    }
}

/// Outcome of resolving one coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolved {
    /// Read the image pixel at `(x, y)`, always in bounds.
    Pixel(usize, usize),
    /// Use a constant color.
    Constant(ConstantKind),
}

/// Ordered-dither offsets, indexed by the low three coordinate bits.
const DITHER: [i64; 8] = [0, 48, 12, 60, 3, 51, 15, 63];

#[inline]
fn edge(v: i64, extent: usize) -> usize {
    v.clamp(0, extent as i64 - 1) as usize
}

#[inline]
fn tile(v: i64, extent: usize) -> usize {
    v.rem_euclid(extent as i64) as usize
}

#[inline]
fn mirror(v: i64, extent: usize) -> usize {
    let extent = extent as i64;
    let quotient = v.div_euclid(extent);
    let remainder = v.rem_euclid(extent);
    if quotient & 1 == 1 {
        (extent - remainder - 1) as usize
    } else {
        remainder as usize
    }
}

#[inline]
fn dither(v: i64, extent: usize) -> usize {
    edge(v + DITHER[(v & 7) as usize] - 32, extent)
}

#[inline]
fn inside(v: i64, extent: usize) -> bool {
    v >= 0 && v < extent as i64
}

/// Maps `(x, y)` on a `columns` x `rows` image to a source pixel or constant.
///
/// In-bounds coordinates always resolve to themselves. `rng` is only drawn
/// from by [`VirtualPixelMethod::Random`]. An image with no pixels resolves
/// everything to the background color.
pub fn resolve<R: Rng + ?Sized>(
    method: VirtualPixelMethod,
    x: i64,
    y: i64,
    columns: usize,
    rows: usize,
    rng: &mut R,
) -> Resolved {
    use VirtualPixelMethod as M;

    if columns == 0 || rows == 0 {
        return Resolved::Constant(ConstantKind::Background);
    }
    if inside(x, columns) && inside(y, rows) {
        return Resolved::Pixel(x as usize, y as usize);
    }
    match method {
        M::Undefined | M::Edge => Resolved::Pixel(edge(x, columns), edge(y, rows)),
        M::Background => Resolved::Constant(ConstantKind::Background),
        M::Constant => Resolved::Constant(ConstantKind::Border),
        M::Transparent => Resolved::Constant(ConstantKind::Transparent),
        M::Black => Resolved::Constant(ConstantKind::Black),
        M::Gray => Resolved::Constant(ConstantKind::Gray),
        M::White => Resolved::Constant(ConstantKind::White),
        M::Mirror => Resolved::Pixel(mirror(x, columns), mirror(y, rows)),
        M::Tile => Resolved::Pixel(tile(x, columns), tile(y, rows)),
        M::Dither => Resolved::Pixel(dither(x, columns), dither(y, rows)),
        M::Random => Resolved::Pixel(rng.gen_range(0..columns), rng.gen_range(0..rows)),
        M::HorizontalTile => {
            if inside(y, rows) {
                Resolved::Pixel(tile(x, columns), y as usize)
            } else {
                Resolved::Constant(ConstantKind::Background)
            }
        }
        M::VerticalTile => {
            if inside(x, columns) {
                Resolved::Pixel(x as usize, tile(y, rows))
            } else {
                Resolved::Constant(ConstantKind::Background)
            }
        }
        M::HorizontalTileEdge => Resolved::Pixel(tile(x, columns), edge(y, rows)),
        M::VerticalTileEdge => Resolved::Pixel(edge(x, columns), tile(y, rows)),
        M::CheckerTile => {
            let quadrant = x.div_euclid(columns as i64) + y.div_euclid(rows as i64);
            if quadrant & 1 == 1 {
                Resolved::Constant(ConstantKind::Background)
            } else {
                Resolved::Pixel(tile(x, columns), tile(y, rows))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn test_in_bounds_is_identity() {
        let mut rng = rng();
        for method in VirtualPixelMethod::ALL {
            assert_eq!(resolve(method, 2, 3, 5, 5, &mut rng), Resolved::Pixel(2, 3));
        }
    }

    #[test]
    fn test_resolved_pixels_in_bounds() {
        let mut rng = rng();
        for method in VirtualPixelMethod::ALL {
            for y in -20..20 {
                for x in -20..20 {
                    if let Resolved::Pixel(px, py) = resolve(method, x, y, 7, 3, &mut rng) {
                        assert!(px < 7 && py < 3, "{method} ({x},{y}) -> ({px},{py})");
                    }
                }
            }
        }
    }

    #[test]
    fn test_empty_extent_resolves_to_background() {
        let mut rng = rng();
        for method in VirtualPixelMethod::ALL {
            for (columns, rows) in [(0, 0), (0, 4), (4, 0)] {
                assert_eq!(
                    resolve(method, -1, 2, columns, rows, &mut rng),
                    Resolved::Constant(ConstantKind::Background),
                    "{method} on {columns}x{rows}"
                );
            }
        }
    }

    #[test]
    fn test_edge() {
        let mut rng = rng();
        assert_eq!(resolve(VirtualPixelMethod::Edge, -5, 100, 10, 10, &mut rng), Resolved::Pixel(0, 9));
        assert_eq!(
            resolve(VirtualPixelMethod::Undefined, 12, -1, 10, 10, &mut rng),
            Resolved::Pixel(9, 0)
        );
    }

    #[test]
    fn test_mirror_and_tile() {
        let mut rng = rng();
        let m: Vec<usize> = (-4..7)
            .map(|x| match resolve(VirtualPixelMethod::Mirror, x, 0, 3, 1, &mut rng) {
                Resolved::Pixel(px, _) => px,
                Resolved::Constant(_) => usize::MAX,
            })
            .collect();
        assert_eq!(m, vec![2, 2, 1, 0, 0, 1, 2, 2, 1, 0, 0]);

        assert_eq!(resolve(VirtualPixelMethod::Tile, -1, -4, 3, 3, &mut rng), Resolved::Pixel(2, 2));
    }

    #[test]
    fn test_constants() {
        let mut rng = rng();
        assert_eq!(
            resolve(VirtualPixelMethod::Constant, -5, -5, 10, 10, &mut rng),
            Resolved::Constant(ConstantKind::Border)
        );
        assert_eq!(
            ConstantKind::Gray.color(PixelPacket::WHITE, PixelPacket::BLACK),
            PixelPacket::gray(32767)
        );
        assert!(!ConstantKind::Transparent
            .color(PixelPacket::WHITE, PixelPacket::WHITE)
            .is_opaque());
    }

    #[test]
    fn test_dither_deterministic() {
        let mut a = StdRng::seed_from_u64(1);
        let mut b = StdRng::seed_from_u64(2);
        for x in -16..0 {
            assert_eq!(
                resolve(VirtualPixelMethod::Dither, x, 2, 100, 4, &mut a),
                resolve(VirtualPixelMethod::Dither, x, 2, 100, 4, &mut b)
            );
        }
        // -1 & 7 == 7 -> -1 + 63 - 32 = 30
        assert_eq!(resolve(VirtualPixelMethod::Dither, -1, 0, 100, 4, &mut a), Resolved::Pixel(30, 0));
    }

    #[test]
    fn test_tile_variants() {
        let mut rng = rng();
        assert_eq!(
            resolve(VirtualPixelMethod::HorizontalTile, 5, -1, 4, 4, &mut rng),
            Resolved::Constant(ConstantKind::Background)
        );
        assert_eq!(
            resolve(VirtualPixelMethod::HorizontalTile, 5, 2, 4, 4, &mut rng),
            Resolved::Pixel(1, 2)
        );
        assert_eq!(
            resolve(VirtualPixelMethod::VerticalTileEdge, -3, 9, 4, 4, &mut rng),
            Resolved::Pixel(0, 1)
        );
        assert_eq!(
            resolve(VirtualPixelMethod::CheckerTile, 5, 1, 4, 4, &mut rng),
            Resolved::Constant(ConstantKind::Background)
        );
        assert_eq!(
            resolve(VirtualPixelMethod::CheckerTile, 5, 5, 4, 4, &mut rng),
            Resolved::Pixel(1, 1)
        );
    }

    #[test]
    fn test_parse() {
        assert_eq!("mirror".parse::<VirtualPixelMethod>().unwrap(), VirtualPixelMethod::Mirror);
        assert_eq!(
            "horizontal-tile-edge".parse::<VirtualPixelMethod>().unwrap(),
            VirtualPixelMethod::HorizontalTileEdge
        );
        assert!("wrap".parse::<VirtualPixelMethod>().is_err());
    }
}
