//! Performance benchmarks for the hot, pure reconciliation paths.
//!
//! Run with: `cargo bench --bench reconcile`
//!
//! The normalizer runs on every publish and every read, and the structural
//! diff runs on every update, so both need to stay cheap for large
//! definitions.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::collections::BTreeMap;

use jobdef_reconciler::{
    classify, diff_values, reconcile_env, render_declared, ContainerSpec, DefinitionSpec, EnvVar,
};

/// Build an environment list of the given size, every third value empty.
fn make_env(count: usize) -> Vec<EnvVar> {
    (0..count)
        .map(|i| {
            let value = if i % 3 == 0 { String::new() } else { format!("value_{i}") };
            EnvVar::new(format!("VAR_{i}"), value)
        })
        .collect()
}

/// What the registry does on echo: drop empty values.
fn echo(list: &[EnvVar]) -> Vec<EnvVar> {
    list.iter()
        .filter(|var| !var.value.is_empty())
        .cloned()
        .collect()
}

fn make_spec(env_count: usize, vcpus: i32) -> DefinitionSpec {
    let mut spec = DefinitionSpec::container(
        "bench",
        ContainerSpec {
            image: "busybox:1.36".to_string(),
            command: vec!["run".to_string(), "--fast".to_string()],
            vcpus: Some(vcpus),
            memory: Some(2048),
            environment: make_env(env_count),
            ..ContainerSpec::default()
        },
    );
    spec.tags = (0..16)
        .map(|i| (format!("tag_{i}"), format!("v{i}")))
        .collect();
    spec
}

fn bench_normalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("normalize");
    for size in [8usize, 64, 256] {
        let submitted = make_env(size);
        let echoed = echo(&submitted);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("reconcile_env", size), &size, |b, _| {
            b.iter(|| reconcile_env(black_box(&submitted), black_box(&echoed)));
        });
    }
    group.finish();
}

fn bench_diff(c: &mut Criterion) {
    let mut group = c.benchmark_group("diff");
    for size in [8usize, 64, 256] {
        let tags_all: BTreeMap<String, String> = BTreeMap::new();
        let prior = render_declared(&make_spec(size, 1), &tags_all).unwrap();
        let desired = render_declared(&make_spec(size, 2), &tags_all).unwrap();
        group.bench_with_input(BenchmarkId::new("classify", size), &size, |b, _| {
            b.iter(|| classify(black_box(&prior), black_box(&desired)));
        });
        group.bench_with_input(BenchmarkId::new("diff_values", size), &size, |b, _| {
            b.iter(|| diff_values(black_box(&prior), black_box(&desired)));
        });
    }
    group.finish();
}

fn bench_render(c: &mut Criterion) {
    let spec = make_spec(64, 1);
    let tags_all: BTreeMap<String, String> = spec.tags.clone();
    c.bench_function("render_declared", |b| {
        b.iter(|| render_declared(black_box(&spec), black_box(&tags_all)).unwrap());
    });
}

criterion_group!(benches, bench_normalize, bench_diff, bench_render);
criterion_main!(benches);
