//! Per-tick cost of slip analysis, mapping and encoding.

use adaptive_trigger_feedback_mapping::prelude::*;
use adaptive_trigger_telemetry_core::{GameId, TelemetryFrame};
use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

fn sliding_frame() -> TelemetryFrame {
    TelemetryFrame::builder(GameId::RichardBurnsRally)
        .throttle(80.0)
        .brake(45.0)
        .ground_speed_kmh(72.0)
        .wheel_speed_kmh([60.0, 61.0, 95.0, 97.0])
        .rpm(6100.0)
        .max_rpm(7500.0)
        .build()
}

fn bench_analyze(c: &mut Criterion) {
    let analyzer = SlipAnalyzer::default();
    let frame = sliding_frame();
    c.bench_function("slip_analyze", |b| {
        b.iter(|| analyzer.analyze(black_box(&frame)));
    });
}

fn bench_map_and_encode(c: &mut Criterion) {
    let analyzer = SlipAnalyzer::default();
    let mapper = FeedbackMapper::new();
    let config = FeedbackConfig::default();
    let frame = sliding_frame();
    let state = FeedbackState::default();

    c.bench_function("map_tick", |b| {
        b.iter(|| {
            let slip = analyzer.analyze(black_box(&frame));
            mapper.map(&frame, &slip, &config, &state)
        });
    });

    c.bench_function("map_and_encode_tick", |b| {
        b.iter(|| {
            let slip = analyzer.analyze(black_box(&frame));
            mapper.map(&frame, &slip, &config, &state).batch.encode()
        });
    });
}

criterion_group!(benches, bench_analyze, bench_map_and_encode);
criterion_main!(benches);
