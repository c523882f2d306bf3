//! Dispatch Benchmarks
//!
//! Benchmarks for seam dispatch, stub resolution and argument matching.
//!
//! Run with: `cargo bench --bench dispatch_ops`

#![allow(missing_docs)]
#![allow(clippy::unwrap_used)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use interpose::prelude::*;
use interpose::{calls_match, default_output, Arg, MockRegistry, MockSession, SeamInterceptor};
use interpose::{SessionKey, TargetDescriptor, TargetId};
use std::sync::Arc;

fn lookup_descriptor(id: &'static str) -> TargetDescriptor {
    TargetDescriptor::new(TargetId::from_static(id))
        .with_param::<String>()
        .with_param::<u32>()
        .with_return::<Option<String>>()
}

fn bench_seam_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("seam_dispatch");
    let args = || values!["key", 7_u32];

    let idle = SeamInterceptor::new();
    group.bench_function("nothing_installed", |bench| {
        let mut real = |_: &[Value]| values![absent()];
        bench.iter(|| black_box(idle.dispatch(black_box("bench::idle"), None, args, &mut real)));
    });

    let seam = SeamInterceptor::new();
    let registry = Arc::new(MockRegistry::new(Arc::new(seam.clone())));
    let scope = MockScope::builder()
        .registry(registry)
        .config(MockConfig::builder().log_calls(false).build())
        .build();
    let target = FunctionTarget::from_fn(lookup_descriptor("bench::lookup"), |_| values![absent()]);
    let mock = scope.mock_function(&target);
    mock.with(args!["key", any()]).returns(values![Some("hit".to_string())]);

    group.bench_function("other_target_installed", |bench| {
        let mut real = |_: &[Value]| values![absent()];
        bench.iter(|| black_box(seam.dispatch(black_box("bench::other"), None, args, &mut real)));
    });
    group.bench_function("stubbed", |bench| {
        let mut real = |_: &[Value]| values![absent()];
        bench.iter(|| black_box(seam.dispatch(black_box("bench::lookup"), None, args, &mut real)));
    });

    group.finish();
}

fn bench_stub_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("stub_resolution");

    for rules in [1_usize, 8, 64] {
        let target = Arc::new(lookup_descriptor("bench::rules"));
        let defaults: Arc<[Value]> = default_output(target.returns()).into();
        let config = MockConfig::builder().log_calls(false).build();
        let session = MockSession::new(target, SessionKey::Function, defaults, &config);
        for i in 0..rules {
            session.add_rule(interpose::StubRule {
                pattern: args![format!("key{i}"), any()],
                outcome: interpose::Outcome::ReturnValues(values![Some(format!("v{i}"))]),
            });
        }
        let last = values![format!("key{}", rules - 1), 1_u32];

        group.bench_with_input(BenchmarkId::from_parameter(rules), &last, |bench, call| {
            bench.iter(|| black_box(session.intercept(black_box(call))));
        });
    }

    group.finish();
}

fn bench_calls_match(c: &mut Criterion) {
    let mut group = c.benchmark_group("calls_match");
    let actual = values!["alpha", 42_u32, Some(3.5_f64)];

    let cases: Vec<(&str, Vec<Arg>)> = vec![
        ("literals", args!["alpha", 42_u32, Some(3.5_f64)]),
        ("wildcards", args![any(), any(), any()]),
        (
            "predicate",
            args!["alpha", that::<u32, _>("even", |n| n % 2 == 0), any()],
        ),
        ("mismatch_first", args!["beta", 42_u32, any()]),
    ];

    for (name, pattern) in &cases {
        group.bench_with_input(BenchmarkId::from_parameter(name), pattern, |bench, pattern| {
            bench.iter(|| black_box(calls_match(pattern, black_box(&actual), true)));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_seam_dispatch,
    bench_stub_resolution,
    bench_calls_match
);
criterion_main!(benches);
