//! Criterion benchmarks for Scanco I/O.
//!
//! Run with: cargo bench --bench scanco_io
//!
//! Tracks regression in the hot paths:
//! - load() for ISQ volumes (raw short payload + calibration header)
//! - load() for AIM v020 volumes (processing-log header)
//! - save() for both dialects

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use scanco::{ComponentKind, ScancoHeader, ScancoImage, AIM_V020, CT_HEADER_V1};
use tempfile::TempDir;

fn create_test_image(shape: [i32; 3], version: &str) -> ScancoImage {
    let mut header = ScancoHeader::default();
    header.version = version.to_string();
    header.pixel.dimensions = shape;
    header.pixel.spacing = [0.036, 0.036, 0.036];
    header.pixel.component = ComponentKind::Int16;
    header.mu_scaling = 1.0;
    header.mu_water = 0.0;

    let count = shape.iter().map(|&d| d as usize).product::<usize>();
    let data: Vec<u8> = (0..count)
        .flat_map(|i| ((i % 4096) as i16 - 2048).to_ne_bytes())
        .collect();
    ScancoImage::from_parts(header, data).unwrap()
}

fn bench_load(c: &mut Criterion) {
    let mut group = c.benchmark_group("load");

    for &shape in &[[64, 64, 64], [128, 128, 64], [256, 256, 64]] {
        let bytes = shape.iter().map(|&d| d as usize).product::<usize>() * 2;
        let label = format!("{}x{}x{}", shape[0], shape[1], shape[2]);
        group.throughput(Throughput::Bytes(bytes as u64));

        let dir = TempDir::new().unwrap();
        let isq_path = dir.path().join("bench.isq");
        scanco::save(&create_test_image(shape, CT_HEADER_V1), &isq_path).unwrap();
        group.bench_with_input(BenchmarkId::new("isq", &label), &isq_path, |b, path| {
            b.iter(|| black_box(scanco::load(black_box(path)).unwrap()))
        });

        let aim_path = dir.path().join("bench.aim");
        scanco::save(&create_test_image(shape, AIM_V020), &aim_path).unwrap();
        group.bench_with_input(BenchmarkId::new("aim", &label), &aim_path, |b, path| {
            b.iter(|| black_box(scanco::load(black_box(path)).unwrap()))
        });
    }

    group.finish();
}

fn bench_save(c: &mut Criterion) {
    let mut group = c.benchmark_group("save");

    for &shape in &[[64, 64, 64], [128, 128, 64]] {
        let bytes = shape.iter().map(|&d| d as usize).product::<usize>() * 2;
        let label = format!("{}x{}x{}", shape[0], shape[1], shape[2]);
        group.throughput(Throughput::Bytes(bytes as u64));

        let dir = TempDir::new().unwrap();

        let isq_image = create_test_image(shape, CT_HEADER_V1);
        let isq_path = dir.path().join("bench.isq");
        group.bench_with_input(BenchmarkId::new("isq", &label), &isq_image, |b, image| {
            b.iter(|| scanco::save(black_box(image), &isq_path).unwrap())
        });

        let aim_image = create_test_image(shape, AIM_V020);
        let aim_path = dir.path().join("bench.aim");
        group.bench_with_input(BenchmarkId::new("aim", &label), &aim_image, |b, image| {
            b.iter(|| scanco::save(black_box(image), &aim_path).unwrap())
        });
    }

    group.finish();
}

fn bench_header_only(c: &mut Criterion) {
    let mut group = c.benchmark_group("read_header");

    let dir = TempDir::new().unwrap();
    let isq_path = dir.path().join("bench.isq");
    scanco::save(&create_test_image([64, 64, 64], CT_HEADER_V1), &isq_path).unwrap();
    group.bench_function("isq", |b| {
        b.iter(|| black_box(scanco::read_header(black_box(&isq_path)).unwrap()))
    });

    let aim_path = dir.path().join("bench.aim");
    scanco::save(&create_test_image([64, 64, 64], AIM_V020), &aim_path).unwrap();
    group.bench_function("aim", |b| {
        b.iter(|| black_box(scanco::read_header(black_box(&aim_path)).unwrap()))
    });

    group.finish();
}

criterion_group!(benches, bench_load, bench_save, bench_header_only);
criterion_main!(benches);
