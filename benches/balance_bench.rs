use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use water_balancer::{
    Flow, FlowKind, Materializer, MonteCarloMaterializer, NodeKey, Process, ProcessBalancer, Uncertainty,
    WaterUniverse,
};

/// Process with `n` uncertain water inputs and `n` uncertain water outputs
fn wide_process(n: usize) -> (Process, WaterUniverse) {
    let key = NodeKey::new("db", "bench");
    let mut process = Process::new(key.clone(), "bench", "product", 1.0, "kilogram");
    let mut resources = Vec::new();
    let mut emissions = Vec::new();

    for i in 0..n {
        let from = NodeKey::new("biosphere", format!("from {}", i));
        let to = NodeKey::new("biosphere", format!("to {}", i));
        let amount = 1.0 + i as f64;
        process = process
            .with_flow(
                Flow::new(from.clone(), key.clone(), FlowKind::Biosphere, "kilogram", amount)
                    .with_uncertainty(Uncertainty::lognormal(amount, 0.2)),
            )
            .with_flow(
                Flow::new(to.clone(), key.clone(), FlowKind::Biosphere, "cubic meter", amount / 1000.0)
                    .with_uncertainty(Uncertainty::lognormal(amount / 1000.0, 0.2)),
            );
        resources.push(from);
        emissions.push(to);
    }

    (process, WaterUniverse::new(vec![], vec![], resources, emissions))
}

/// Classification and strategy selection only
fn bench_analyze(c: &mut Criterion) {
    let (process, universe) = wide_process(20);
    let balancer = ProcessBalancer::new(&universe);

    c.bench_function("analyze_40_flows", |b| {
        b.iter(|| {
            black_box(balancer.analyze(black_box(&process)));
        });
    });
}

/// Plan building, no sampling
fn bench_plan(c: &mut Criterion) {
    let mut group = c.benchmark_group("plan");

    for flows in [2, 10, 50].iter() {
        let (process, universe) = wide_process(*flows);
        let balancer = ProcessBalancer::new(&universe);
        group.bench_with_input(BenchmarkId::from_parameter(flows), flows, |b, _| {
            b.iter(|| {
                black_box(balancer.plan(black_box(&process)).unwrap());
            });
        });
    }
    group.finish();
}

/// Full pass: plan, sample, assemble, restore
fn bench_balance(c: &mut Criterion) {
    let (template, universe) = wide_process(10);
    let balancer = ProcessBalancer::new(&universe);
    let materializer = MonteCarloMaterializer::with_seed(42);

    let mut group = c.benchmark_group("balance");
    for iterations in [100, 1000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(iterations), iterations, |b, &iterations| {
            let mut process = template.clone();
            b.iter(|| {
                black_box(
                    balancer
                        .balance(&mut process, &materializer as &dyn Materializer, iterations)
                        .unwrap(),
                );
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_analyze, bench_plan, bench_balance);
criterion_main!(benches);
