//! Quantum and pixel packet model.
//!
//! Pixels are stored as 16-bit fixed point samples ("quanta"). A pixel
//! packet holds red, green, blue and opacity; a parallel index channel holds
//! palette indices for PseudoClass images or the black channel for CMYK.
//!
//! # Scaling
//!
//! | helper                      | mapping                          |
//! |-----------------------------|----------------------------------|
//! | [`scale_char_to_quantum`]   | `0..=255` → `0..=QUANTUM_RANGE`  |
//! | [`scale_quantum_to_char`]   | `0..=QUANTUM_RANGE` → `0..=255`  |
//! | [`scale_quantum_to_map`]    | quantum → lookup table index     |
//! | [`scale_map_to_quantum`]    | table value → clamped quantum    |
//!
//! Opacity follows the packet convention: `0` is opaque and
//! [`QUANTUM_RANGE`] is fully transparent.
//!
//! # Memory Layout
//!
//! [`PixelPacket`] is `#[repr(C)]` and [`bytemuck::Pod`], so cache stores can
//! be viewed as byte slices for mapped and disk I/O without copies.

use bytemuck::{Pod, Zeroable};

/// A single 16-bit channel sample.
pub type Quantum = u16;

/// Palette index or CMYK black sample.
pub type IndexPacket = Quantum;

/// Bits per quantum.
pub const QUANTUM_DEPTH: u32 = 16;

/// Largest quantum value.
pub const QUANTUM_RANGE: Quantum = u16::MAX;

/// `1 / QUANTUM_RANGE`.
pub const QUANTUM_SCALE: f64 = 1.0 / QUANTUM_RANGE as f64;

/// Largest lookup table index. Tables hold `MAX_MAP + 1` entries.
pub const MAX_MAP: usize = 65535;

/// Opacity of a fully opaque pixel.
pub const OPAQUE_OPACITY: Quantum = 0;

/// Opacity of a fully transparent pixel.
pub const TRANSPARENT_OPACITY: Quantum = QUANTUM_RANGE;

/// Size of one pixel packet in bytes.
pub const PIXEL_PACKET_SIZE: usize = std::mem::size_of::<PixelPacket>();

/// Size of one index packet in bytes.
pub const INDEX_PACKET_SIZE: usize = std::mem::size_of::<IndexPacket>();

/// Rounds and clamps a real value into the quantum range.
///
/// NaN maps to zero.
#[inline]
pub fn clamp_to_quantum(value: f64) -> Quantum {
    if !(value > 0.0) {
        return 0;
    }
    if value >= QUANTUM_RANGE as f64 {
        return QUANTUM_RANGE;
    }
    (value + 0.5) as Quantum
}

/// Scales an 8-bit sample to a quantum.
#[inline]
pub const fn scale_char_to_quantum(value: u8) -> Quantum {
    value as Quantum * 257
}

/// Scales a quantum to an 8-bit sample, rounding to nearest.
#[inline]
pub const fn scale_quantum_to_char(value: Quantum) -> u8 {
    ((value as u32 + 128) / 257) as u8
}

/// Scales a quantum to a lookup table index in `0..=MAX_MAP`.
#[inline]
pub const fn scale_quantum_to_map(value: Quantum) -> usize {
    value as usize
}

/// Scales a lookup table value back to a quantum, clamping.
#[inline]
pub fn scale_map_to_quantum(value: f64) -> Quantum {
    clamp_to_quantum(value * (QUANTUM_RANGE as f64 / MAX_MAP as f64))
}

/// Normalizes a quantum to `[0, 1]`.
#[inline]
pub fn quantum_scale(value: Quantum) -> f64 {
    value as f64 * QUANTUM_SCALE
}

/// One pixel of the cache: red, green, blue and opacity quanta.
///
/// # Example
///
/// ```rust
/// use px_core::{PixelPacket, scale_quantum_to_char};
///
/// let px = PixelPacket::from_rgb8(128, 64, 32);
/// assert_eq!(scale_quantum_to_char(px.green), 64);
/// assert!(px.is_opaque());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Pod, Zeroable)]
#[repr(C)]
pub struct PixelPacket {
    /// Red (or first colorspace channel)
    pub red: Quantum,
    /// Green (or second colorspace channel)
    pub green: Quantum,
    /// Blue (or third colorspace channel)
    pub blue: Quantum,
    /// Opacity, `0` = opaque
    pub opacity: Quantum,
}

impl PixelPacket {
    /// Opaque black.
    pub const BLACK: Self = Self::rgb(0, 0, 0);
    /// Opaque white.
    pub const WHITE: Self = Self::rgb(QUANTUM_RANGE, QUANTUM_RANGE, QUANTUM_RANGE);
    /// Opaque mid gray.
    pub const GRAY: Self = Self::gray(QUANTUM_RANGE / 2);
    /// Fully transparent black.
    pub const TRANSPARENT: Self = Self::new(0, 0, 0, TRANSPARENT_OPACITY);

    /// Creates a packet from all four channels.
    #[inline]
    pub const fn new(red: Quantum, green: Quantum, blue: Quantum, opacity: Quantum) -> Self {
        Self {
            red,
            green,
            blue,
            opacity,
        }
    }

    /// Creates an opaque packet.
    #[inline]
    pub const fn rgb(red: Quantum, green: Quantum, blue: Quantum) -> Self {
        Self::new(red, green, blue, OPAQUE_OPACITY)
    }

    /// Creates an opaque packet from 8-bit samples.
    #[inline]
    pub const fn from_rgb8(red: u8, green: u8, blue: u8) -> Self {
        Self::rgb(
            scale_char_to_quantum(red),
            scale_char_to_quantum(green),
            scale_char_to_quantum(blue),
        )
    }

    /// Creates an opaque gray packet.
    #[inline]
    pub const fn gray(value: Quantum) -> Self {
        Self::rgb(value, value, value)
    }

    /// Returns the color channels as 8-bit samples.
    #[inline]
    pub const fn to_rgb8(&self) -> [u8; 3] {
        [
            scale_quantum_to_char(self.red),
            scale_quantum_to_char(self.green),
            scale_quantum_to_char(self.blue),
        ]
    }

    /// Returns `true` if the pixel is fully opaque.
    #[inline]
    pub const fn is_opaque(&self) -> bool {
        self.opacity == OPAQUE_OPACITY
    }

    /// Returns `true` if the three color channels are equal.
    #[inline]
    pub const fn is_gray(&self) -> bool {
        self.red == self.green && self.green == self.blue
    }

    /// Squared color distance, ignoring opacity.
    #[inline]
    pub fn distance_squared(&self, other: &Self) -> u64 {
        let dr = self.red as i64 - other.red as i64;
        let dg = self.green as i64 - other.green as i64;
        let db = self.blue as i64 - other.blue as i64;
        (dr * dr + dg * dg + db * db) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_char_scaling() {
        assert_eq!(scale_char_to_quantum(0), 0);
        assert_eq!(scale_char_to_quantum(255), QUANTUM_RANGE);
        for v in 0..=255u8 {
            assert_eq!(scale_quantum_to_char(scale_char_to_quantum(v)), v);
        }
        assert_eq!(scale_quantum_to_char(QUANTUM_RANGE), 255);
    }

    #[test]
    fn test_clamp_to_quantum() {
        assert_eq!(clamp_to_quantum(-4.0), 0);
        assert_eq!(clamp_to_quantum(f64::NAN), 0);
        assert_eq!(clamp_to_quantum(1e9), QUANTUM_RANGE);
        assert_eq!(clamp_to_quantum(10.49), 10);
        assert_eq!(clamp_to_quantum(10.5), 11);
    }

    #[test]
    fn test_quantum_scale() {
        use approx::assert_relative_eq;
        assert_relative_eq!(quantum_scale(0), 0.0);
        assert_relative_eq!(quantum_scale(QUANTUM_RANGE), 1.0);
        assert_relative_eq!(quantum_scale(32768), 0.500_007_6, epsilon = 1e-6);
    }

    #[test]
    fn test_map_scaling_identity() {
        assert_eq!(scale_quantum_to_map(1234), 1234);
        assert_eq!(scale_map_to_quantum(1234.0), 1234);
        assert_eq!(scale_map_to_quantum(MAX_MAP as f64 + 10.0), QUANTUM_RANGE);
    }

    #[test]
    fn test_packet_layout() {
        assert_eq!(PIXEL_PACKET_SIZE, 8);
        let px = [PixelPacket::new(1, 2, 3, 4)];
        let bytes: &[u8] = bytemuck::cast_slice(&px);
        assert_eq!(bytes.len(), 8);
        assert_eq!(u16::from_ne_bytes([bytes[4], bytes[5]]), 3);
    }

    #[test]
    fn test_distance() {
        let a = PixelPacket::rgb(0, 0, 0);
        let b = PixelPacket::rgb(3, 4, 0);
        assert_eq!(a.distance_squared(&b), 25);
        assert!(PixelPacket::GRAY.is_gray());
        assert!(!PixelPacket::TRANSPARENT.is_opaque());
    }
}
