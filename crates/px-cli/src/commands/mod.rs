//! CLI command implementations

pub mod info;
pub mod sample;
pub mod transform;

use anyhow::{Context, Result, bail};
use std::sync::Arc;

use px_cache::Image;
use px_core::{PixelPacket, QUANTUM_RANGE, Quantum, ResourceManager};

/// Builds a synthetic test image: red ramps left to right, green top to
/// bottom, blue along the diagonal.
pub fn gradient(resources: &Arc<ResourceManager>, columns: usize, rows: usize) -> Result<Image> {
    let ramp = |i: usize, n: usize| -> Quantum {
        if n <= 1 {
            0
        } else {
            ((i as u64 * QUANTUM_RANGE as u64) / (n as u64 - 1)) as Quantum
        }
    };
    let mut pixels = Vec::with_capacity(columns.saturating_mul(rows));
    for y in 0..rows {
        for x in 0..columns {
            pixels.push(PixelPacket::rgb(
                ramp(x, columns),
                ramp(y, rows),
                ramp(x + y, columns + rows - 1),
            ));
        }
    }
    Image::from_pixels(resources, columns, rows, &pixels)
        .with_context(|| format!("Failed to create {columns}x{rows} image"))
}

/// Parses `X,Y`.
pub fn parse_point(text: &str) -> Result<(i64, i64)> {
    let Some((x, y)) = text.split_once(',') else {
        bail!("Expected X,Y but got '{text}'");
    };
    let x = x.trim().parse().with_context(|| format!("Invalid x in '{text}'"))?;
    let y = y.trim().parse().with_context(|| format!("Invalid y in '{text}'"))?;
    Ok((x, y))
}

/// Formats a pixel as 8-bit `rgba(r, g, b, a)`, alpha being 255 when opaque.
pub fn format_pixel(px: &PixelPacket) -> String {
    let [r, g, b] = px.to_rgb8();
    let alpha = 255 - px_core::scale_quantum_to_char(px.opacity);
    format!("rgba({r}, {g}, {b}, {alpha})")
}

#[cfg(test)]
mod tests {
    use super::*;
    use px_core::ResourceLimits;

    #[test]
    fn test_parse_point() {
        assert_eq!(parse_point("3,4").unwrap(), (3, 4));
        assert_eq!(parse_point(" -5 , -7").unwrap(), (-5, -7));
        assert!(parse_point("3").is_err());
        assert!(parse_point("a,1").is_err());
    }

    #[test]
    fn test_gradient_corners() {
        let resources = ResourceManager::new(ResourceLimits::unlimited());
        let image = gradient(&resources, 5, 3).unwrap();
        assert_eq!(image.get_one_virtual_pixel(0, 0), PixelPacket::BLACK);
        assert_eq!(image.get_one_virtual_pixel(4, 2), PixelPacket::WHITE);
        assert_eq!(image.get_one_virtual_pixel(4, 0).red, QUANTUM_RANGE);
        assert_eq!(image.get_one_virtual_pixel(4, 0).green, 0);
    }

    #[test]
    fn test_format_pixel() {
        assert_eq!(format_pixel(&PixelPacket::WHITE), "rgba(255, 255, 255, 255)");
        assert_eq!(format_pixel(&PixelPacket::TRANSPARENT), "rgba(0, 0, 0, 0)");
    }
}
