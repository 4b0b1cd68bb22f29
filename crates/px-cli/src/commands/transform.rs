//! Colorspace transform command.
//!
//! Builds a gradient image, transforms it to the target colorspace and,
//! with `--round-trip`, back to RGB with per-channel error statistics.

use crate::TransformArgs;
use anyhow::{Context, Result, bail};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use px_color::{transform_colorspace, transform_to_rgb};
use px_core::{ColorspaceType, PixelPacket, ResourceManager};

/// Runs the transform command.
pub fn run(args: TransformArgs, resources: &Arc<ResourceManager>, verbose: bool) -> Result<()> {
    let target: ColorspaceType = args
        .to
        .parse()
        .with_context(|| format!("Unknown colorspace '{}'", args.to))?;

    let mut image = super::gradient(resources, args.columns, args.rows)?;
    for property in &args.properties {
        let Some((name, value)) = property.split_once('=') else {
            bail!("Expected NAME=VALUE but got '{property}'");
        };
        image.set_property(name.trim(), value.trim());
    }
    let original = if args.round_trip {
        Some(image.export_pixels()?)
    } else {
        None
    };

    if verbose {
        println!(
            "Transforming {}x{} ({}) RGB -> {}",
            args.columns,
            args.rows,
            image.storage_type(),
            target
        );
    }

    let start = Instant::now();
    transform_colorspace(&mut image, target)
        .with_context(|| format!("Transform to {target} failed"))?;
    let forward = start.elapsed();
    info!(%target, ?forward, "forward transform done");

    println!("Colorspace: {}", image.colorspace());
    println!("Storage:    {}", image.storage_type());
    println!("Indexes:    {}", if image.cache().has_indexes() { "yes" } else { "no" });
    println!("Forward:    {:.2} ms", forward.as_secs_f64() * 1000.0);
    let (cx, cy) = ((args.columns / 2) as i64, (args.rows / 2) as i64);
    println!(
        "Center:     {}",
        super::format_pixel(&image.get_one_virtual_pixel(cx, cy))
    );

    if let Some(original) = original {
        let start = Instant::now();
        transform_to_rgb(&mut image).context("Transform back to RGB failed")?;
        let inverse = start.elapsed();
        let stats = ErrorStats::compare(&original, &image.export_pixels()?);
        debug!(?stats, "round trip");
        println!("Inverse:    {:.2} ms", inverse.as_secs_f64() * 1000.0);
        println!("Max error:  {} (8-bit)", stats.max);
        println!("Mean error: {:.4} (8-bit)", stats.mean);
    }

    Ok(())
}

/// Per-channel 8-bit differences between two pixel buffers.
#[derive(Debug, Default, PartialEq)]
struct ErrorStats {
    max: u8,
    mean: f64,
}

impl ErrorStats {
    fn compare(before: &[PixelPacket], after: &[PixelPacket]) -> Self {
        let mut stats = Self::default();
        let mut sum = 0u64;
        let mut count = 0u64;
        for (a, b) in before.iter().zip(after) {
            for (x, y) in a.to_rgb8().into_iter().zip(b.to_rgb8()) {
                let d = x.abs_diff(y);
                stats.max = stats.max.max(d);
                sum += d as u64;
                count += 1;
            }
        }
        if count > 0 {
            stats.mean = sum as f64 / count as f64;
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_stats() {
        let a = [PixelPacket::from_rgb8(10, 20, 30), PixelPacket::from_rgb8(0, 0, 0)];
        let b = [PixelPacket::from_rgb8(12, 20, 30), PixelPacket::from_rgb8(0, 1, 0)];
        let stats = ErrorStats::compare(&a, &b);
        assert_eq!(stats.max, 2);
        assert!((stats.mean - 0.5).abs() < 1e-12);
        assert_eq!(ErrorStats::compare(&[], &[]), ErrorStats::default());
    }
}
