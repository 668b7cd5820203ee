//! Benchmarks for filter matching and registry access
//!
//! Measures the paths exercised while devices churn:
//! - Match criteria evaluation against device descriptors
//! - Registry snapshots at different population sizes
//! - Device lookup by identifier

use std::sync::Arc;

use common::test_utils::create_mock_device_list;
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use hotplug::{DeviceFilter, DeviceId, GenericDevice, HotplugManager, MatchCriteria, MockBackend};

fn benchmark_criteria_matching(c: &mut Criterion) {
    let mut group = c.benchmark_group("criteria_matching");

    let devices = create_mock_device_list(100);
    let wildcard = MatchCriteria::All;
    let pair = MatchCriteria::VendorProduct {
        vendor_id: 0x1032,
        product_id: 0x2032,
    };
    let class = MatchCriteria::DeviceClass { class: 0x08 };

    group.bench_function("wildcard_100_devices", |b| {
        b.iter(|| {
            devices
                .iter()
                .filter(|info| wildcard.matches(black_box(info)))
                .count()
        })
    });

    group.bench_function("vendor_product_100_devices", |b| {
        b.iter(|| {
            devices
                .iter()
                .filter(|info| pair.matches(black_box(info)))
                .count()
        })
    });

    group.bench_function("class_100_devices", |b| {
        b.iter(|| {
            devices
                .iter()
                .filter(|info| class.matches(black_box(info)))
                .count()
        })
    });

    group.finish();
}

fn benchmark_registry_snapshot(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let _guard = rt.enter();

    let mut group = c.benchmark_group("registry_snapshot");

    for count in [10u8, 100].iter() {
        let backend = Arc::new(MockBackend::new());
        for info in create_mock_device_list(*count) {
            backend.attach_with_info(info);
        }
        let manager = HotplugManager::new(backend);
        manager
            .start_single(DeviceFilter::match_all::<GenericDevice>())
            .unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, _| {
            b.iter(|| black_box(manager.devices().len()))
        });
    }

    group.finish();
}

fn benchmark_device_lookup(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let _guard = rt.enter();

    let mut group = c.benchmark_group("device_lookup");

    let backend = Arc::new(MockBackend::new());
    for info in create_mock_device_list(100) {
        backend.attach_with_info(info);
    }
    let manager = HotplugManager::new(backend);
    manager
        .start_single(DeviceFilter::match_all::<GenericDevice>())
        .unwrap();

    let present = DeviceId::from_bus_address(1, 50);
    let absent = DeviceId::new("009.099");

    group.bench_function("hit", |b| {
        b.iter(|| manager.device(black_box(&present)).is_some())
    });

    group.bench_function("miss", |b| {
        b.iter(|| manager.device(black_box(&absent)).is_none())
    });

    group.finish();
}

criterion_group!(
    benches,
    benchmark_criteria_matching,
    benchmark_registry_snapshot,
    benchmark_device_lookup
);
criterion_main!(benches);
