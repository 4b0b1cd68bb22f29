//! Integration tests for cache storage selection, sharing and persistence.

use std::sync::Arc;

use px_cache::{Cache, CacheView, Image, StorageType, process_rows};
use px_core::{
    Error, ErrorDomain, PixelPacket, ResourceKind, ResourceLimits, ResourceManager, StorageClass,
};

const MIB: u64 = 1024 * 1024;

fn limited(memory: u64, map: u64, disk: u64) -> Arc<ResourceManager> {
    let dir = std::env::temp_dir();
    ResourceManager::new(
        ResourceLimits::unlimited()
            .with_memory(memory)
            .with_map(map)
            .with_disk(disk)
            .with_temporary_path(dir),
    )
}

fn stripes(columns: usize, rows: usize) -> Vec<PixelPacket> {
    (0..columns * rows)
        .map(|i| PixelPacket::rgb((i % 65536) as u16, (i / columns) as u16, 7))
        .collect()
}

#[test]
fn small_memory_budget_falls_back_to_file_storage() {
    let resources = limited(MIB, u64::MAX, u64::MAX);
    let pixels = stripes(1000, 1000);
    let image = Image::from_pixels(&resources, 1000, 1000, &pixels).unwrap();

    assert_eq!(image.storage_type(), StorageType::Map);
    assert_eq!(resources.in_use(ResourceKind::Memory), 0);
    assert_eq!(resources.in_use(ResourceKind::Map), 8_000_000);
    assert_eq!(image.get_one_virtual_pixel(999, 999), pixels[999_999]);
    assert!(image.cache().path().is_some());
}

#[test]
fn disk_used_when_map_budget_is_exhausted() {
    let resources = limited(MIB, MIB, u64::MAX);
    let pixels = stripes(600, 400);
    let image = Image::from_pixels(&resources, 600, 400, &pixels).unwrap();

    assert_eq!(image.storage_type(), StorageType::Disk);
    assert_eq!(image.export_pixels().unwrap(), pixels);
}

#[test]
fn every_budget_exhausted_is_a_resource_error() {
    let resources = limited(1024, 1024, 1024);
    let image = Image::new(&resources, 100, 100).unwrap();
    let err = image.cache().open().unwrap_err();
    assert!(matches!(err, Error::CacheResourcesExhausted { .. }));
    assert_eq!(err.domain(), ErrorDomain::ResourceLimit);
    assert_eq!(
        Cache::plan_storage(&resources, 100, 100, false).unwrap_err().domain(),
        ErrorDomain::ResourceLimit
    );
}

#[test]
fn reservations_return_when_images_drop() {
    let resources = limited(u64::MAX, u64::MAX, u64::MAX);
    let image = Image::filled(&resources, 64, 64, PixelPacket::WHITE).unwrap();
    assert_eq!(resources.in_use(ResourceKind::Memory), 64 * 64 * 8);
    let copy = image.clone();
    drop(image);
    assert_eq!(resources.in_use(ResourceKind::Memory), 64 * 64 * 8);
    drop(copy);
    assert_eq!(resources.in_use(ResourceKind::Memory), 0);
}

#[test]
fn writes_through_clone_do_not_leak_into_original() {
    let resources = limited(u64::MAX, u64::MAX, u64::MAX);
    let original = Image::filled(&resources, 16, 16, PixelPacket::BLACK).unwrap();
    let mut copy = original.clone();
    process_rows(&mut copy, "Invert/Image", |_, pixels, _| {
        pixels.fill(PixelPacket::WHITE);
        Ok(())
    })
    .unwrap();

    assert_eq!(original.get_one_virtual_pixel(5, 5), PixelPacket::BLACK);
    assert_eq!(copy.get_one_virtual_pixel(5, 5), PixelPacket::WHITE);
    assert_eq!(original.reference_count(), 1);
}

#[test]
fn persist_and_attach_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.px");
    let resources = limited(u64::MAX, u64::MAX, u64::MAX);

    let pixels = stripes(20, 10);
    let mut image = Image::from_pixels(&resources, 20, 10, &pixels).unwrap();
    let first = image.persist(&path, 0).unwrap();
    assert!(matches!(image.storage_type(), StorageType::Map | StorageType::Disk));

    let mut palette = Image::new(&resources, 3, 2).unwrap();
    palette
        .set_colormap(vec![PixelPacket::BLACK, PixelPacket::WHITE])
        .unwrap();
    let second = palette.persist(&path, first.end()).unwrap();
    assert_eq!(second.offset, first.end());
    assert_eq!(second.colormap_len, 2);

    // writes after persisting land in the file
    {
        let view = CacheView::authentic(&mut image).unwrap();
        let mut nexus = view.new_nexus();
        view.get_authentic_pixels(&mut nexus, 0, 0, 1, 1).unwrap()[0] = PixelPacket::WHITE;
        view.sync_authentic_pixels(&mut nexus).unwrap();
    }
    image.cache().flush().unwrap();
    drop(image);
    drop(palette);

    let reopened = Image::attach(&resources, &path, &first).unwrap();
    let mut expected = pixels.clone();
    expected[0] = PixelPacket::WHITE;
    assert_eq!(reopened.export_pixels().unwrap(), expected);

    let reopened = Image::attach(&resources, &path, &second).unwrap();
    assert_eq!(reopened.storage_class(), StorageClass::Pseudo);
    assert_eq!(reopened.colormap(), &[PixelPacket::BLACK, PixelPacket::WHITE]);
    assert_eq!(reopened.export_indexes().unwrap().unwrap(), vec![0; 6]);
}

#[test]
fn attach_rejects_short_files() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("short.px");
    std::fs::write(&path, [0u8; 16]).unwrap();
    let resources = limited(u64::MAX, u64::MAX, u64::MAX);
    let layout = px_cache::PersistLayout {
        offset: 0,
        columns: 10,
        rows: 10,
        colormap_len: 0,
        has_indexes: false,
    };
    assert!(Image::attach(&resources, &path, &layout).is_err());
}

#[test]
fn ping_images_have_no_pixels() {
    let resources = limited(u64::MAX, u64::MAX, u64::MAX);
    let image = Image::ping(&resources, 4000, 3000).unwrap();
    assert_eq!(image.storage_type(), StorageType::Ping);
    assert!(matches!(image.export_pixels(), Err(Error::CacheNotOpen)));
    assert_eq!(resources.in_use(ResourceKind::Memory), 0);
}
