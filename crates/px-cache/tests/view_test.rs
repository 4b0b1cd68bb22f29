//! Integration tests for cache views and virtual pixels.

use std::sync::Arc;

use px_cache::{CacheView, Image, StorageType, VirtualPixelMethod};
use px_core::{Error, PixelPacket, ResourceLimits, ResourceManager};
use rayon::prelude::*;

fn resources() -> Arc<ResourceManager> {
    ResourceManager::new(ResourceLimits::unlimited())
}

/// 4x3 image whose red channel is `10 * y + x`.
fn numbered() -> Image {
    let pixels: Vec<PixelPacket> = (0..3u16)
        .flat_map(|y| (0..4u16).map(move |x| PixelPacket::rgb(10 * y + x, 0, 0)))
        .collect();
    Image::from_pixels(&resources(), 4, 3, &pixels).unwrap()
}

fn reds(pixels: &[PixelPacket]) -> Vec<u16> {
    pixels.iter().map(|px| px.red).collect()
}

#[test]
fn constant_method_returns_border_color() {
    let mut image = numbered();
    image.virtual_pixel_method = VirtualPixelMethod::Constant;
    image.border_color = PixelPacket::BLACK;
    assert_eq!(image.get_one_virtual_pixel(-5, -5), PixelPacket::BLACK);
    assert_eq!(image.get_one_virtual_pixel(1, 2).red, 21);
}

#[test]
fn edge_method_clamps_coordinates() {
    let image = numbered();
    let view = CacheView::new(&image).with_virtual_pixel_method(VirtualPixelMethod::Edge);
    let mut nexus = view.new_nexus();
    let window = view.get_virtual_pixels(&mut nexus, -2, -1, 8, 1).unwrap();
    assert_eq!(reds(&window), vec![0, 0, 0, 1, 2, 3, 3, 3]);
}

#[test]
fn tile_and_mirror_methods() {
    let image = numbered();
    let view = CacheView::new(&image);
    let mut nexus = view.new_nexus();

    let tiled = view
        .get_virtual_pixels_with(&mut nexus, VirtualPixelMethod::Tile, -1, 3, 6, 1)
        .unwrap();
    assert_eq!(reds(&tiled), vec![3, 0, 1, 2, 3, 0]);

    let mirrored = view
        .get_virtual_pixels_with(&mut nexus, VirtualPixelMethod::Mirror, -2, 0, 8, 1)
        .unwrap();
    assert_eq!(reds(&mirrored), vec![1, 0, 0, 1, 2, 3, 3, 2]);
}

#[test]
fn region_wholly_outside_is_virtual_only() {
    let mut image = numbered();
    image.virtual_pixel_method = VirtualPixelMethod::White;
    {
        let view = CacheView::new(&image);
        let mut nexus = view.new_nexus();
        let window = view.get_virtual_pixels(&mut nexus, 100, 100, 2, 2).unwrap();
        assert!(window.iter().all(|px| *px == PixelPacket::WHITE));
    }

    let view = CacheView::authentic(&mut image).unwrap();
    let mut nexus = view.new_nexus();
    let err = view.get_authentic_pixels(&mut nexus, 100, 100, 2, 2).unwrap_err();
    assert!(matches!(err, Error::InvalidRegion { .. }));
}

#[test]
fn empty_regions_are_rejected() {
    let image = numbered();
    let view = CacheView::new(&image);
    let mut nexus = view.new_nexus();
    assert!(matches!(
        view.get_virtual_pixels(&mut nexus, 0, 0, 0, 1),
        Err(Error::InvalidRegion { .. })
    ));
    assert!(matches!(
        view.get_virtual_pixels(&mut nexus, 0, 0, 4, 0),
        Err(Error::InvalidRegion { .. })
    ));
}

#[test]
fn second_sync_is_a_no_op() {
    let mut image = numbered();
    let view = CacheView::authentic(&mut image).unwrap();
    let mut nexus = view.new_nexus();
    view.get_authentic_pixels(&mut nexus, 1, 1, 2, 2)
        .unwrap()
        .fill(PixelPacket::WHITE);
    assert!(nexus.is_pending());
    view.sync_authentic_pixels(&mut nexus).unwrap();
    assert!(!nexus.is_pending());
    view.sync_authentic_pixels(&mut nexus).unwrap();
    assert_eq!(view.get_one_authentic_pixel(2, 2), PixelPacket::WHITE);
    assert_eq!(view.get_one_authentic_pixel(3, 2).red, 23);
}

#[test]
fn unsynced_staged_writes_are_discarded() {
    let mut image = numbered();
    let view = CacheView::authentic(&mut image).unwrap();
    let mut nexus = view.new_nexus();
    view.get_authentic_pixels(&mut nexus, 1, 1, 2, 2)
        .unwrap()
        .fill(PixelPacket::WHITE);
    // a new request replaces the pending window
    let _ = view.get_virtual_pixels(&mut nexus, 0, 0, 1, 1).unwrap();
    assert_eq!(view.get_one_authentic_pixel(1, 1).red, 11);
}

#[test]
fn dither_and_random_are_reproducible() {
    let mut image = numbered();
    image.virtual_pixel_method = VirtualPixelMethod::Dither;
    let read = |image: &Image| {
        let view = CacheView::new(image);
        let mut nexus = view.new_nexus();
        reds(&view.get_virtual_pixels(&mut nexus, -10, -10, 30, 30).unwrap())
    };
    assert_eq!(read(&image), read(&image));

    image.virtual_pixel_method = VirtualPixelMethod::Random;
    let first = read(&image);
    assert_eq!(first, read(&image));
    assert!(first.iter().all(|red| red % 10 < 4 && red / 10 < 3));
}

#[test]
fn parallel_rows_through_worker_slots() {
    let resources = resources();
    let mut image = Image::new(&resources, 257, 129).unwrap();
    let rows = image.rows();
    let columns = image.columns();
    {
        let view = CacheView::authentic(&mut image).unwrap();
        assert!(view.slot_count() >= 1);
        (0..rows).into_par_iter().for_each(|y| {
            let mut nexus = view.nexus();
            let mut row = view
                .queue_authentic_pixels(&mut nexus, 0, y as i64, columns, 1)
                .unwrap();
            for (x, px) in row.iter_mut().enumerate() {
                *px = PixelPacket::rgb(x as u16, y as u16, 1);
            }
            drop(row);
            view.sync_authentic_pixels(&mut nexus).unwrap();
        });
    }
    assert_eq!(image.storage_type(), StorageType::Memory);
    let pixels = image.export_pixels().unwrap();
    for (i, px) in pixels.iter().enumerate() {
        assert_eq!((px.red as usize, px.green as usize), (i % columns, i / columns));
    }
}

#[test]
fn one_pixel_reads_outside_bounds_return_background() {
    let mut image = numbered();
    image.background_color = PixelPacket::from_rgb8(1, 2, 3);
    assert_eq!(image.get_one_authentic_pixel(4, 0), image.background_color);
    assert_eq!(image.get_one_authentic_pixel(3, 2).red, 23);
}

#[test]
fn one_pixel_reads_see_rows_checked_out_elsewhere() {
    let mut image = numbered();
    image.background_color = PixelPacket::from_rgb8(1, 2, 3);
    let view = CacheView::authentic(&mut image).unwrap();
    let mut nexus = view.new_nexus();
    let window = view.get_authentic_pixels(&mut nexus, 0, 0, 4, 1).unwrap();
    drop(window);
    // row 0 is still leased by `nexus`
    assert_eq!(view.get_one_virtual_pixel(1, 0).red, 1);
    assert_eq!(view.get_one_virtual_pixel(1, 1).red, 11);
    let mut reader = view.new_nexus();
    let row = view.get_virtual_pixels(&mut reader, -1, 0, 6, 1).unwrap();
    assert_eq!(reds(&row), vec![0, 0, 1, 2, 3, 3]);
}

#[test]
fn one_pixel_reads_scale_across_many_threads() {
    let pixels: Vec<PixelPacket> = (0..256u16)
        .flat_map(|y| (0..256u16).map(move |x| PixelPacket::rgb(x, y, 0)))
        .collect();
    let mut image = Image::from_pixels(&resources(), 256, 256, &pixels).unwrap();
    image.virtual_pixel_method = VirtualPixelMethod::Tile;
    let pool = rayon::ThreadPoolBuilder::new().num_threads(64).build().unwrap();
    let mismatches: usize = pool.install(|| {
        (-64i64..320)
            .into_par_iter()
            .map(|y| {
                (-64i64..320)
                    .step_by(7)
                    .filter(|&x| {
                        let px = image.get_one_virtual_pixel(x, y);
                        px.red as i64 != x.rem_euclid(256) || px.green as i64 != y.rem_euclid(256)
                    })
                    .count()
            })
            .sum()
    });
    assert_eq!(mismatches, 0);
    let inside = pool.install(|| {
        (0..256i64)
            .into_par_iter()
            .all(|y| image.get_one_authentic_pixel(y, 255 - y) == PixelPacket::rgb(y as u16, 255 - y as u16, 0))
    });
    assert!(inside);
}
