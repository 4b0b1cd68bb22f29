//! Benchmarks for px operations.
//!
//! Run with: `cargo bench`

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use std::sync::Arc;

use px_cache::{CacheView, Image, VirtualPixelMethod, process_rows};
use px_color::{transform_to_colorspace, transform_to_rgb};
use px_core::{ColorspaceType, PixelPacket, ResourceLimits, ResourceManager};

fn resources() -> Arc<ResourceManager> {
    ResourceManager::new(ResourceLimits::unlimited())
}

fn gradient(size: usize) -> Image {
    let pixels: Vec<PixelPacket> = (0..size * size)
        .map(|i| {
            let (x, y) = (i % size, i / size);
            PixelPacket::from_rgb8((x * 255 / size) as u8, (y * 255 / size) as u8, 128)
        })
        .collect();
    Image::from_pixels(&resources(), size, size, &pixels).unwrap()
}

/// Benchmark row-parallel writes through an authentic view.
fn bench_cache_fill(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache_fill");

    for size in [256usize, 1024, 2048].iter() {
        let mut image = Image::new(&resources(), *size, *size).unwrap();
        group.throughput(Throughput::Elements((*size * *size) as u64));

        group.bench_with_input(BenchmarkId::new("process_rows", size), size, |b, _| {
            b.iter(|| {
                process_rows(&mut image, "Fill/Image", |y, pixels, _| {
                    let v = (y & 0xff) as u8;
                    pixels.fill(PixelPacket::from_rgb8(v, v, v));
                    Ok(())
                })
                .unwrap()
            })
        });
    }

    group.finish();
}

/// Benchmark virtual pixel reads straddling the image edge.
fn bench_virtual_pixels(c: &mut Criterion) {
    let mut group = c.benchmark_group("virtual_pixels");
    let image = gradient(512);

    for method in [
        VirtualPixelMethod::Edge,
        VirtualPixelMethod::Tile,
        VirtualPixelMethod::Mirror,
        VirtualPixelMethod::Constant,
        VirtualPixelMethod::Random,
    ] {
        let view = CacheView::new(&image).with_virtual_pixel_method(method);
        group.throughput(Throughput::Elements(64 * 64));

        group.bench_function(BenchmarkId::new("corner_64x64", method), |b| {
            let mut nexus = view.new_nexus();
            b.iter(|| {
                let window = view
                    .get_virtual_pixels(&mut nexus, black_box(-32), black_box(-32), 64, 64)
                    .unwrap();
                black_box(window[0])
            })
        });

        group.bench_function(BenchmarkId::new("one_pixel", method), |b| {
            b.iter(|| view.get_one_virtual_pixel(black_box(-3), black_box(600)))
        });
    }

    // in-bounds full rows take the direct path
    let view = CacheView::new(&image);
    group.throughput(Throughput::Elements(512));
    group.bench_function("direct_row", |b| {
        let mut nexus = view.new_nexus();
        b.iter(|| {
            let window = view
                .get_virtual_pixels(&mut nexus, 0, black_box(100), 512, 1)
                .unwrap();
            black_box(window[511])
        })
    });

    group.finish();
}

/// Benchmark whole-image colorspace transforms.
fn bench_transform(c: &mut Criterion) {
    let mut group = c.benchmark_group("transform");
    group.sample_size(20);
    let size = 512usize;
    group.throughput(Throughput::Elements((size * size) as u64));

    for target in [
        ColorspaceType::Gray,
        ColorspaceType::Rec709YCbCr,
        ColorspaceType::Hsl,
        ColorspaceType::Lab,
        ColorspaceType::Srgb,
        ColorspaceType::Cmyk,
    ] {
        group.bench_function(BenchmarkId::new("round_trip", target), |b| {
            b.iter_batched(
                || gradient(size),
                |mut image| {
                    transform_to_colorspace(&mut image, target).unwrap();
                    if !target.is_gray() {
                        transform_to_rgb(&mut image).unwrap();
                    }
                    image
                },
                criterion::BatchSize::LargeInput,
            )
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_cache_fill,
    bench_virtual_pixels,
    bench_transform,
);

criterion_main!(benches);
