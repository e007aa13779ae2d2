//! Per-frame sampling latency at common capture sizes.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use finger_presence::capture::mock::solid_frame;
use finger_presence::sampling::{sample_red_mean, FingerPresence, FrameSampler};
use finger_presence::SamplerConfig;
use std::sync::Arc;

fn bench_sampling(c: &mut Criterion) {
    let mut group = c.benchmark_group("sample_red_mean");
    for (width, height) in [(640u32, 480u32), (1280, 720), (1920, 1080)] {
        let frame = solid_frame(width, height, 180, 1);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{width}x{height}")),
            &frame,
            |b, frame| b.iter(|| sample_red_mean(black_box(frame), 8)),
        );
    }
    group.finish();
}

fn bench_on_frame(c: &mut Criterion) {
    let sampler = FrameSampler::new(SamplerConfig::default(), Arc::new(FingerPresence::new()));
    let _stream = sampler.presence().subscribe();
    let frame = solid_frame(640, 480, 180, 1);

    c.bench_function("on_frame_vga_with_subscriber", |b| {
        b.iter(|| sampler.on_frame(black_box(&frame)))
    });
}

criterion_group!(benches, bench_sampling, bench_on_frame);
criterion_main!(benches);
