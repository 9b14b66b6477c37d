use criterion::{criterion_group, criterion_main, Criterion};

mod setup;

fn bench_criterion(c: &mut Criterion) {
    for (name, bench) in setup::prolog_benches() {
        let mut run = bench.setup();
        c.bench_function(name, move |b| b.iter(&mut run));
    }
}

criterion_group!(
    name = bench_group;
    config = Criterion::default().sample_size(10);
    targets = bench_criterion
);
criterion_main!(bench_group);
