use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use tether_core::reactive::{effect, reactive, EffectOptions, Proxy};
use tether_core::{Target, TargetKind, Value};

fn record(fields: usize) -> Proxy {
    let target = Target::empty(TargetKind::Record);
    for i in 0..fields {
        target.raw_set(&format!("f{i}").as_str().into(), Value::from(i));
    }
    reactive(target).into_proxy().expect("records are wrapped")
}

fn bench_stable_rerun(c: &mut Criterion) {
    // Re-runs that read the same keys reconcile deps without churn.
    let mut group = c.benchmark_group("stable_rerun");
    for fields in [4usize, 64] {
        let state = record(fields);
        let reader = state.clone();
        let _runner = effect(
            move || {
                for i in 0..fields {
                    black_box(reader.get(format!("f{i}")));
                }
            },
            EffectOptions::default(),
        );
        let mut tick = 0usize;
        group.bench_function(format!("{fields}_fields"), |b| {
            b.iter(|| {
                tick += 1;
                state.set("f0", tick);
            })
        });
    }
    group.finish();
}

fn bench_fan_out(c: &mut Criterion) {
    let state = record(1);
    let _runners: Vec<_> = (0..100)
        .map(|_| {
            let reader = state.clone();
            effect(
                move || {
                    black_box(reader.get("f0"));
                },
                EffectOptions::default(),
            )
        })
        .collect();

    let mut tick = 0usize;
    c.bench_function("trigger_100_effects", |b| {
        b.iter(|| {
            tick += 1;
            state.set("f0", tick);
        })
    });
}

fn bench_collection_iteration(c: &mut Criterion) {
    c.bench_function("map_entries_1000", |b| {
        b.iter_batched(
            || {
                let target = Target::map((0..1000usize).map(|i| (Value::from(i), Value::from(i))));
                reactive(target).into_proxy().expect("maps are wrapped")
            },
            |map| {
                let runner = effect(
                    {
                        let map = map.clone();
                        move || map.entries().count()
                    },
                    EffectOptions::default(),
                );
                map.insert(1000usize, 0);
                black_box(runner.run())
            },
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, bench_stable_rerun, bench_fan_out, bench_collection_iteration);
criterion_main!(benches);
