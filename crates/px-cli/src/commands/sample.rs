//! Virtual pixel sampling command.

use crate::SampleArgs;
use anyhow::{Context, Result};
use std::sync::Arc;

use px_cache::{CacheView, VirtualPixelMethod};
use px_core::ResourceManager;

/// Runs the sample command, printing one line per coordinate.
pub fn run(args: SampleArgs, resources: &Arc<ResourceManager>, verbose: bool) -> Result<()> {
    let method: VirtualPixelMethod = args
        .method
        .parse()
        .with_context(|| format!("Unknown virtual pixel method '{}'", args.method))?;
    let points = args
        .points
        .iter()
        .map(|p| super::parse_point(p))
        .collect::<Result<Vec<_>>>()?;

    let image = super::gradient(resources, args.columns, args.rows)?;
    let view = CacheView::new(&image).with_virtual_pixel_method(method);
    if verbose {
        println!(
            "{}x{} gradient, method {}",
            args.columns,
            args.rows,
            view.virtual_pixel_method()
        );
    }

    for (x, y) in points {
        let inside = x >= 0 && y >= 0 && (x as usize) < args.columns && (y as usize) < args.rows;
        let px = view.get_one_virtual_pixel(x, y);
        println!(
            "{x:>6},{y:<6} {} {}",
            super::format_pixel(&px),
            if inside { "" } else { "(virtual)" }
        );
    }

    Ok(())
}
