//! Parallel scanline driver.
//!
//! Runs a kernel over every row of an image through one authentic
//! [`CacheView`], one rayon task per row. The first failing row stops the
//! remaining ones; its error is returned. The image's progress monitor is
//! consulted about a hundred times and may cancel between rows.
//!
//! # Example
//!
//! ```rust
//! use px_cache::{Image, process_rows};
//! use px_core::{PixelPacket, ResourceLimits, ResourceManager};
//!
//! let resources = ResourceManager::new(ResourceLimits::unlimited());
//! let mut image = Image::new(&resources, 16, 16).unwrap();
//! process_rows(&mut image, "Fill/Image", |_y, pixels, _indexes| {
//!     pixels.fill(PixelPacket::WHITE);
//!     Ok(())
//! })
//! .unwrap();
//! assert_eq!(image.get_one_virtual_pixel(3, 3), PixelPacket::WHITE);
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use px_core::{Error, IndexPacket, PixelPacket, ProgressTracker, Result};
use rayon::prelude::*;
use tracing::debug;

use crate::image::Image;
use crate::view::CacheView;

/// Applies `kernel(y, pixels, indexes)` to every row of `image` in parallel.
pub fn process_rows<F>(image: &mut Image, tag: &str, kernel: F) -> Result<()>
where
    F: Fn(usize, &mut [PixelPacket], Option<&mut [IndexPacket]>) -> Result<()> + Sync,
{
    let monitor = image.progress_monitor.clone();
    let columns = image.columns();
    let rows = image.rows();
    let view = CacheView::authentic(image)?;
    let tracker = ProgressTracker::new(monitor.as_ref(), tag, rows as u64);
    let failed = AtomicBool::new(false);
    let first_error: Mutex<Option<Error>> = Mutex::new(None);

    (0..rows).into_par_iter().for_each(|y| {
        if failed.load(Ordering::Acquire) {
            return;
        }
        let result = process_row(&view, columns, y, &kernel).and_then(|()| {
            if tracker.advance() {
                Ok(())
            } else {
                Err(Error::cancelled(tag))
            }
        });
        if let Err(err) = result {
            if !failed.swap(true, Ordering::AcqRel) {
                *first_error.lock().unwrap_or_else(PoisonError::into_inner) = Some(err);
            }
        }
    });

    match first_error.into_inner().unwrap_or_else(PoisonError::into_inner) {
        Some(err) => {
            debug!(tag, %err, rows_done = tracker.done(), "row processing stopped");
            Err(err)
        }
        None => Ok(()),
    }
}

fn process_row<F>(view: &CacheView<'_>, columns: usize, y: usize, kernel: &F) -> Result<()>
where
    F: Fn(usize, &mut [PixelPacket], Option<&mut [IndexPacket]>) -> Result<()> + Sync,
{
    let mut nexus = view.nexus();
    let mut window = view.get_authentic_pixels(&mut nexus, 0, y as i64, columns, 1)?;
    let (pixels, indexes) = window.split_mut();
    kernel(y, pixels, indexes)?;
    drop(window);
    view.sync_authentic_pixels(&mut nexus)
}

#[cfg(test)]
mod tests {
    use super::*;
    use px_core::{ProgressMonitor, ResourceLimits, ResourceManager};

    #[test]
    fn test_rows_visit_once() {
        let resources = ResourceManager::new(ResourceLimits::unlimited());
        let mut image = Image::new(&resources, 5, 40).unwrap();
        process_rows(&mut image, "Test/Image", |y, pixels, _| {
            for px in pixels.iter_mut() {
                px.red += y as u16 + 1;
            }
            Ok(())
        })
        .unwrap();
        let pixels = image.export_pixels().unwrap();
        for (i, px) in pixels.iter().enumerate() {
            assert_eq!(px.red as usize, i / 5 + 1);
        }
    }

    #[test]
    fn test_first_error_returned() {
        let resources = ResourceManager::new(ResourceLimits::unlimited());
        let mut image = Image::new(&resources, 5, 40).unwrap();
        let err = process_rows(&mut image, "Test/Image", |y, _, _| {
            if y == 7 {
                Err(Error::invalid_argument("row 7"))
            } else {
                Ok(())
            }
        })
        .unwrap_err();
        assert!(err.to_string().contains("row 7"));
    }

    #[test]
    fn test_cancellation() {
        let resources = ResourceManager::new(ResourceLimits::unlimited());
        let mut image = Image::new(&resources, 5, 400).unwrap();
        image.progress_monitor = Some(ProgressMonitor::new(|_, done, _| done < 100));
        let err = process_rows(&mut image, "Cancel/Image", |_, _, _| Ok(())).unwrap_err();
        assert!(matches!(err, Error::Cancelled { .. }));
    }
}
