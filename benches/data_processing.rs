//! Benchmarks for radar clustering and buffer synchronisation
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use sensorgraph::graph::cluster::{cluster_points, representative_indices, ClusterInput, RadarScope};
use sensorgraph::memory::{Device, Stream, TypedBuffer};

struct SyntheticPoints {
    distance: Vec<f32>,
    azimuth: Vec<f32>,
    radial_speed: Vec<f32>,
    elevation: Vec<f32>,
}

impl SyntheticPoints {
    /// Points spread over `walls` distinct distances, sweeping azimuth.
    fn new(count: usize, walls: usize) -> Self {
        let walls = walls.max(1);
        let mut points = Self {
            distance: Vec::with_capacity(count),
            azimuth: Vec::with_capacity(count),
            radial_speed: Vec::with_capacity(count),
            elevation: Vec::with_capacity(count),
        };
        for i in 0..count {
            let wall = i % walls;
            points.distance.push(5.0 + wall as f32 * 10.0 + (i as f32 * 0.37).sin() * 0.1);
            points.azimuth.push((i / walls) as f32 * 0.001 - 0.5);
            points.radial_speed.push((wall as f32 * 0.5).cos());
            points.elevation.push(0.0);
        }
        points
    }

    fn input(&self) -> ClusterInput<'_> {
        ClusterInput {
            distance: &self.distance,
            azimuth: &self.azimuth,
            radial_speed: &self.radial_speed,
            elevation: &self.elevation,
        }
    }
}

fn scopes() -> Vec<RadarScope> {
    vec![
        RadarScope {
            begin_distance: 0.0,
            end_distance: 50.0,
            distance_separation_threshold: 0.5,
            radial_speed_separation_threshold: 0.2,
            azimuth_separation_threshold: 0.01,
        },
        RadarScope {
            begin_distance: 50.0,
            end_distance: 200.0,
            distance_separation_threshold: 2.0,
            radial_speed_separation_threshold: 0.5,
            azimuth_separation_threshold: 0.02,
        },
    ]
}

fn bench_clustering(c: &mut Criterion) {
    let mut group = c.benchmark_group("radar_clustering");
    let scopes = scopes();

    for size in [256, 1024, 4096].iter() {
        let points = SyntheticPoints::new(*size, 8);
        group.throughput(Throughput::Elements(*size as u64));

        group.bench_with_input(BenchmarkId::new("cluster_points", size), &points, |b, points| {
            b.iter(|| black_box(cluster_points(&points.input(), &scopes)));
        });

        let clusters = cluster_points(&points.input(), &scopes);
        group.bench_with_input(
            BenchmarkId::new("representatives", size),
            &clusters,
            |b, clusters| {
                b.iter(|| {
                    black_box(representative_indices(
                        clusters,
                        &points.azimuth,
                        &points.elevation,
                    ))
                });
            },
        );
    }

    group.finish();
}

fn bench_buffer_sync(c: &mut Criterion) {
    let mut group = c.benchmark_group("buffer_sync");
    let stream = Stream::new(Device::new(), "bench").unwrap();

    for size in [1_000, 100_000].iter() {
        let values: Vec<f32> = (0..*size).map(|i| i as f32).collect();
        let buffer = TypedBuffer::from_slice(&values, &stream).unwrap();
        group.throughput(Throughput::Bytes((*size * std::mem::size_of::<f32>()) as u64));

        // Host write invalidates the device copy; the kernel forces an upload
        group.bench_with_input(BenchmarkId::new("host_to_device", size), &buffer, |b, buffer| {
            b.iter(|| {
                buffer.host_write(|v| v[0] += 1.0).unwrap();
                let slice = buffer.device_read().unwrap();
                stream
                    .launch("sum", move |scope| {
                        let total = slice.read(scope, |v| v.iter().sum::<f32>())?;
                        black_box(total);
                        Ok(())
                    })
                    .unwrap();
                stream.synchronize().unwrap();
            });
        });

        // Device write invalidates the host copy; the read forces a download
        group.bench_with_input(BenchmarkId::new("device_to_host", size), &buffer, |b, buffer| {
            b.iter(|| {
                let slice = buffer.device_write().unwrap();
                stream
                    .launch("scale", move |scope| {
                        slice.write(scope, |v| v.iter_mut().for_each(|x| *x *= 0.5))?;
                        Ok(())
                    })
                    .unwrap();
                black_box(buffer.host_read(|v| v[v.len() - 1]).unwrap())
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_clustering, bench_buffer_sync);

criterion_main!(benches);
