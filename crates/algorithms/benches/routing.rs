//! Benchmarks for the routing surfaces and rainfall alignment

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use hydrocast_algorithms::hydrology::{bin_volume, travel_time, TimeBin, TravelTimeParams};
use hydrocast_algorithms::resample::{align_to, AlignParams};
use hydrocast_algorithms::terrain::{slowness_field, VelocityParams};
use hydrocast_core::{GeoTransform, Raster, CRS};

fn create_grid(size: usize, cell: f64, f: impl Fn(usize, usize) -> f64) -> Raster<f64> {
    let mut r = Raster::new(size, size);
    r.set_transform(GeoTransform::new(500_000.0, 6_300_000.0, cell, -cell));
    r.set_crs(Some(CRS::lambert93()));
    for row in 0..size {
        for col in 0..size {
            r.set(row, col, f(row, col)).unwrap();
        }
    }
    r
}

fn bench_slowness(c: &mut Criterion) {
    let mut group = c.benchmark_group("slowness");

    for size in [256, 512, 1024].iter() {
        let slope = create_grid(*size, 25.0, |r, c| ((r * 7 + c * 13) % 300) as f64 / 10.0);
        let acc = create_grid(*size, 25.0, |r, c| if c == size / 2 { (r * 4) as f64 } else { 1.0 });

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| slowness_field(black_box(&slope), black_box(&acc), VelocityParams::default()).unwrap())
        });
    }

    group.finish();
}

fn bench_travel_time(c: &mut Criterion) {
    let mut group = c.benchmark_group("travel_time");

    for size in [128, 256, 512].iter() {
        let slowness = create_grid(*size, 25.0, |r, c| 1.0 + ((r + c) % 10) as f64);
        let params = TravelTimeParams { outlet: (size - 1, size / 2) };

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| travel_time(black_box(&slowness), params.clone()).unwrap())
        });
    }

    group.finish();
}

fn bench_align(c: &mut Criterion) {
    let mut group = c.benchmark_group("align_rainfall");

    for size in [256, 512, 1024].iter() {
        // 1 km rainfall onto a 25 m watershed grid
        let rain_cells = size * 25 / 1000 + 2;
        let rain = create_grid(rain_cells, 1000.0, |r, c| ((r + c) % 7) as f64);
        let template = create_grid(*size, 25.0, |_, _| 0.0);

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| align_to(black_box(&rain), black_box(&template), AlignParams::default()).unwrap())
        });
    }

    group.finish();
}

fn bench_bin_volume(c: &mut Criterion) {
    let size = 1024;
    let tt = create_grid(size, 25.0, |r, c| ((r + c) * 40) as f64);
    let rain = create_grid(size, 25.0, |_, _| 2.0);
    let bin = TimeBin::new(3, 6).unwrap();

    c.bench_function("bin_volume_1024", |b| {
        b.iter(|| bin_volume(black_box(&tt), black_box(&rain), bin, 625.0).unwrap())
    });
}

criterion_group!(benches, bench_slowness, bench_travel_time, bench_align, bench_bin_volume);
criterion_main!(benches);
