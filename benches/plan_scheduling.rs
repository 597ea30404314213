//! Benchmarks the Planner's DAG validation, band decomposition, and
//! critical-path timeout computation (`spec.md` §4.4 / §5) over plans of
//! increasing width, since `Plan::bands` runs once per goal on the
//! orchestrator's hot path.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use pera_test_utils::{generate_task, plan, search_task};
use pera_types::plan::Plan;

fn fan_out_plan(width: usize) -> Plan {
    let mut tasks = vec![search_task("t0", "seed")];
    for i in 0..width {
        tasks.push(generate_task(&format!("t{}", i + 1), "summarize", "t0"));
    }
    plan("fan out from one search", tasks)
}

fn bench_validate_and_schedule(c: &mut Criterion) {
    let mut group = c.benchmark_group("plan_scheduling");
    for width in [4usize, 32, 256] {
        let plan = fan_out_plan(width);
        group.bench_with_input(BenchmarkId::new("validate_dag_and_bands", width), &plan, |b, plan| {
            b.iter(|| {
                let order = plan.validate_dag().expect("fan-out plan is acyclic");
                let bands = plan.bands(&order);
                let timeout = plan.critical_path_timeout(&order);
                black_box((bands.len(), timeout))
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_validate_and_schedule);
criterion_main!(benches);
