//! Resource info command.
//!
//! Prints the active resource limits and which storage class a cache of the
//! given size would land in.

use crate::InfoArgs;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::debug;

use px_cache::{Cache, Image};
use px_core::{
    INDEX_PACKET_SIZE, PIXEL_PACKET_SIZE, ResourceKind, ResourceManager, format_bytes,
};

/// Runs the info command.
pub fn run(args: InfoArgs, resources: &Arc<ResourceManager>, verbose: bool) -> Result<()> {
    let limits = resources.limits();
    println!("Resource limits");
    println!("  Area:       {}", format_area(limits.area));
    println!("  Memory:     {}", format_bytes(limits.memory));
    println!("  Map:        {}", format_bytes(limits.map));
    println!("  Disk:       {}", format_bytes(limits.disk));
    println!("  Threads:    {}", limits.threads);
    match &limits.temporary_path {
        Some(path) => println!("  Temp path:  {}", path.display()),
        None => println!("  Temp path:  {}", std::env::temp_dir().display()),
    }

    let per_pixel = PIXEL_PACKET_SIZE + if args.indexes { INDEX_PACKET_SIZE } else { 0 };
    let bytes = (args.columns as u64)
        .saturating_mul(args.rows as u64)
        .saturating_mul(per_pixel as u64);
    println!();
    println!("Cache {}x{}", args.columns, args.rows);
    println!("  Indexes:    {}", if args.indexes { "yes" } else { "no" });
    println!("  Size:       {}", format_bytes(bytes));

    let planned = Cache::plan_storage(resources, args.columns, args.rows, args.indexes)
        .context("No storage class fits")?;
    println!("  Storage:    {planned}");

    if args.open {
        let mut image = Image::new(resources, args.columns, args.rows)
            .context("Failed to create image")?;
        if args.indexes {
            image.set_index_channel(true)?;
        }
        let opened = image.cache().open().context("Failed to open cache")?;
        debug!(%planned, %opened, "cache opened");
        println!("  Opened:     {opened}");
        if let Some(path) = image.cache().path() {
            println!("  File:       {}", path.display());
        }
        if verbose {
            for kind in [ResourceKind::Memory, ResourceKind::Map, ResourceKind::Disk] {
                println!("  In use ({kind}): {}", format_bytes(resources.in_use(kind)));
            }
        }
    }

    Ok(())
}

fn format_area(pixels: u64) -> String {
    if pixels == u64::MAX {
        "unlimited".to_string()
    } else if pixels >= 1_000_000 {
        format!("{:.1} Mpx", pixels as f64 / 1_000_000.0)
    } else {
        format!("{pixels} px")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_area() {
        assert_eq!(format_area(u64::MAX), "unlimited");
        assert_eq!(format_area(2_500_000), "2.5 Mpx");
        assert_eq!(format_area(640), "640 px");
    }

    #[test]
    fn test_open_spills_to_temporary_path() {
        let dir = tempfile::tempdir().unwrap();
        let limits = px_core::ResourceLimits::unlimited()
            .with_memory(0)
            .with_map(0)
            .with_temporary_path(dir.path());
        let resources = ResourceManager::new(limits);
        let planned = Cache::plan_storage(&resources, 64, 32, false).unwrap();
        assert_eq!(planned, px_cache::StorageType::Disk);

        let args = InfoArgs {
            columns: 64,
            rows: 32,
            indexes: false,
            open: true,
        };
        run(args, &resources, true).unwrap();
        // the cache file is gone once the image is dropped
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
        assert_eq!(resources.in_use(ResourceKind::Disk), 0);
    }
}
