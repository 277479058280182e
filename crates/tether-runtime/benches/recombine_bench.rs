//! Benchmarks for multi-binding activation and recombine passes.
//!
//! Run with: cargo bench -p tether-runtime --bench recombine_bench

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use tether_runtime::{
    BindableObject, BindingError, Culture, MultiBinding, PathBinding, PropertyBinding, PropertyId,
    Value, ValueKind,
};

fn sum(values: &[Value], _: ValueKind, _: Option<&Value>, _: &Culture) -> Result<Value, BindingError> {
    Ok(Value::Int(values.iter().filter_map(Value::as_int).sum()))
}

/// A model with `n` integer properties `S0..S{n-1}` and a view with one target.
fn model(n: usize) -> (BindableObject, Vec<PropertyId>, BindableObject, PropertyId) {
    let model = BindableObject::new("Model");
    let ids = (0..n)
        .map(|i| model.define(format!("S{i}"), ValueKind::Int, i as i64).unwrap())
        .collect();
    let view = BindableObject::new("View");
    let out = view.define("Out", ValueKind::Any, Value::Null).unwrap();
    (model, ids, view, out)
}

fn binding(n: usize, format: Option<&str>) -> MultiBinding {
    let mut builder = MultiBinding::builder().converter(sum);
    for i in 0..n {
        builder = builder.source(PathBinding::new(format!("S{i}").as_str()));
    }
    if let Some(format) = format {
        builder = builder.string_format(format);
    }
    builder.build().unwrap()
}

fn bench_activate(c: &mut Criterion) {
    let mut group = c.benchmark_group("multi_binding/activate");

    for n in [2, 8, 32] {
        group.throughput(Throughput::Elements(n as u64));
        let (model, _, view, out) = model(n);
        let mut mb = binding(n, None);
        group.bench_with_input(BenchmarkId::new("sources", n), &n, |b, _| {
            b.iter(|| {
                mb.activate(Some(&model), &view, out).unwrap();
                mb.deactivate();
            })
        });
    }

    group.finish();
}

fn bench_source_change(c: &mut Criterion) {
    let mut group = c.benchmark_group("multi_binding/source_change");

    for n in [2, 8, 32] {
        let (model, ids, view, out) = model(n);
        let mut mb = binding(n, Some("total={0:N0}"));
        mb.activate(Some(&model), &view, out).unwrap();
        let mut next = 0i64;
        group.bench_with_input(BenchmarkId::new("sources", n), &n, |b, _| {
            b.iter(|| {
                next += 1;
                model.set(ids[0], next).unwrap();
                black_box(view.get(out).unwrap())
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_activate, bench_source_change);
criterion_main!(benches);
