use criterion::{black_box, criterion_group, criterion_main, Criterion};
use pulse_core::{Emphasis, MetricDef, MetricFormat, MetricStore};
use pulse_sim::{ActivityGenerator, Incrementer, MessageTemplate, SeededSource};

fn build_store(n_metrics: usize) -> MetricStore {
    MetricStore::from_defs((0..n_metrics).map(|i| {
        MetricDef::new(format!("m{i}"), 1_000.0, 0.0, 1_000_000.0)
            .step(-25.0, 75.0)
            .change_probability(0.6)
            .format(MetricFormat::Currency)
    }))
}

fn bench_incrementer(c: &mut Criterion) {
    let mut store = build_store(50);
    let mut rng = SeededSource::new(42);
    c.bench_function("incrementer 50 metrics", |b| {
        b.iter(|| black_box(Incrementer.tick(&mut store, &mut rng)))
    });
}

fn bench_activity(c: &mut Criterion) {
    let store = build_store(5);
    let mut gen = ActivityGenerator::new(
        vec![
            MessageTemplate::new("{pick:Lena|Jonas|Mia} bought for {m0}", Emphasis::Success),
            MessageTemplate::new("Campaign reached {m1} impressions", Emphasis::Info),
        ],
        1.0,
    );
    let mut rng = SeededSource::new(42);
    c.bench_function("activity generate", |b| {
        b.iter(|| black_box(gen.generate(&mut rng, &store)))
    });
}

criterion_group!(benches, bench_incrementer, bench_activity);
criterion_main!(benches);
