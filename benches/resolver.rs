//! Resolver and lookup micro-benchmarks.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use panflow::resolver;
use panflow::xml::{find_paths, ConfigTree, XPath};
use panflow::{Context, DeviceType, ObjectKind, PanOsVersion};

fn fixture(entries: usize) -> ConfigTree {
    let mut addresses = String::new();
    for i in 0..entries {
        addresses.push_str(&format!(
            "<entry name=\"host-{i:04}\"><ip-netmask>10.0.{}.{}/32</ip-netmask></entry>",
            i / 256,
            i % 256
        ));
    }
    ConfigTree::parse(&format!(
        "<config><shared><address>{addresses}</address></shared></config>"
    ))
    .unwrap()
}

fn bench_resolver(c: &mut Criterion) {
    c.bench_function("object_xpath", |b| {
        b.iter(|| {
            resolver::object_xpath(
                black_box(ObjectKind::Address),
                DeviceType::Panorama,
                &Context::device_group("DG1"),
                PanOsVersion::new(11, 0),
                Some("host-0042"),
            )
            .unwrap()
        })
    });
}

fn bench_lookup(c: &mut Criterion) {
    let tree = fixture(1_000);
    let expr = resolver::object_xpath(
        ObjectKind::Address,
        DeviceType::Panorama,
        &Context::Shared,
        PanOsVersion::new(11, 0),
        Some("host-0999"),
    )
    .unwrap();
    let xpath = XPath::parse(&expr).unwrap();

    c.bench_function("find_entry_in_1k", |b| {
        b.iter(|| find_paths(black_box(tree.root()), &xpath))
    });
}

criterion_group!(benches, bench_resolver, bench_lookup);
criterion_main!(benches);
