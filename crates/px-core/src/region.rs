//! Signed pixel regions.
//!
//! Cache requests may start left of or above the image and may extend past
//! its right and bottom edges; the part outside is served by virtual pixels.
//! [`Region`] therefore carries a signed origin and unsigned extent.
//!
//! # Coordinate System
//!
//! ```text
//! (0,0) ────────► X
//!   │
//!   │   ┌──────────┐
//!   │   │  Image   │
//!   │   │  Region  │
//!   │   └──────────┘
//!   ▼
//!   Y
//! ```
//!
//! # Usage
//!
//! ```rust
//! use px_core::Region;
//!
//! let region = Region::new(-2, 3, 10, 4);
//! assert!(!region.is_within(100, 100));
//!
//! let inside = region.clip_to(100, 100).unwrap();
//! assert_eq!(inside, Region::new(0, 3, 8, 4));
//! ```

use std::fmt;

/// A rectangle with signed origin and unsigned dimensions.
///
/// Regions with zero width or height are empty. Edges are inclusive on the
/// left/top and exclusive on the right/bottom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Region {
    /// X coordinate of the left edge (inclusive)
    pub x: i64,
    /// Y coordinate of the top edge (inclusive)
    pub y: i64,
    /// Width in pixels
    pub width: usize,
    /// Height in pixels
    pub height: usize,
}

impl Region {
    /// Creates a new region.
    #[inline]
    pub const fn new(x: i64, y: i64, width: usize, height: usize) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Region covering a whole `columns` x `rows` image.
    #[inline]
    pub const fn full(columns: usize, rows: usize) -> Self {
        Self::new(0, 0, columns, rows)
    }

    /// Region covering one row of an image.
    #[inline]
    pub const fn row(y: i64, columns: usize) -> Self {
        Self::new(0, y, columns, 1)
    }

    /// X coordinate of the right edge (exclusive).
    #[inline]
    pub const fn right(&self) -> i64 {
        self.x + self.width as i64
    }

    /// Y coordinate of the bottom edge (exclusive).
    #[inline]
    pub const fn bottom(&self) -> i64 {
        self.y + self.height as i64
    }

    /// Number of pixels in the region.
    #[inline]
    pub const fn area(&self) -> usize {
        self.width * self.height
    }

    /// Returns `true` if either dimension is zero.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Returns `true` if the point lies inside the region.
    #[inline]
    pub const fn contains(&self, px: i64, py: i64) -> bool {
        px >= self.x && px < self.right() && py >= self.y && py < self.bottom()
    }

    /// Returns `true` if the regions share at least one pixel.
    ///
    /// Empty regions never overlap.
    #[inline]
    pub const fn overlaps(&self, other: &Region) -> bool {
        if self.is_empty() || other.is_empty() {
            return false;
        }
        self.x < other.right()
            && self.right() > other.x
            && self.y < other.bottom()
            && self.bottom() > other.y
    }

    /// Intersection of two regions, `None` if they do not overlap.
    #[inline]
    pub fn intersect(&self, other: &Region) -> Option<Region> {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());

        if x < right && y < bottom {
            Some(Region::new(x, y, (right - x) as usize, (bottom - y) as usize))
        } else {
            None
        }
    }

    /// Part of the region inside a `columns` x `rows` image.
    #[inline]
    pub fn clip_to(&self, columns: usize, rows: usize) -> Option<Region> {
        self.intersect(&Region::full(columns, rows))
    }

    /// Returns `true` if the whole region lies inside the image.
    #[inline]
    pub const fn is_within(&self, columns: usize, rows: usize) -> bool {
        self.x >= 0
            && self.y >= 0
            && self.right() <= columns as i64
            && self.bottom() <= rows as i64
    }

    /// Returns this region translated by (dx, dy).
    #[inline]
    pub const fn translate(&self, dx: i64, dy: i64) -> Region {
        Region::new(self.x + dx, self.y + dy, self.width, self.height)
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}{:+}{:+}", self.width, self.height, self.x, self.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_edges() {
        let r = Region::new(-5, 10, 20, 5);
        assert_eq!(r.right(), 15);
        assert_eq!(r.bottom(), 15);
        assert_eq!(r.area(), 100);
        assert!(r.contains(-5, 10));
        assert!(!r.contains(15, 10));
    }

    #[test]
    fn test_empty() {
        assert!(Region::new(0, 0, 0, 10).is_empty());
        assert!(!Region::new(0, 0, 0, 10).overlaps(&Region::full(10, 10)));
    }

    #[test]
    fn test_intersect() {
        let a = Region::new(0, 0, 100, 100);
        let b = Region::new(50, -50, 100, 100);
        assert_eq!(a.intersect(&b), Some(Region::new(50, 0, 50, 50)));
        assert_eq!(a.intersect(&Region::new(100, 0, 5, 5)), None);
    }

    #[test]
    fn test_clip_and_within() {
        let r = Region::new(-10, -10, 5, 5);
        assert!(r.clip_to(10, 10).is_none());
        assert!(!r.is_within(10, 10));
        assert!(Region::row(9, 10).is_within(10, 10));
        assert!(!Region::row(10, 10).is_within(10, 10));
    }

    #[test]
    fn test_display() {
        assert_eq!(Region::new(-3, 4, 10, 2).to_string(), "10x2-3+4");
    }
}
