//! Property Cache Performance Benchmarks
//!
//! Measures property access across cache states: warm receiver hits,
//! prototype-chain hits, cold lookups, and invalidation churn.

use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use marten_object::{Context, ContextConfig, ContextGroup, DynObject, GcRef, SiteCache, Value};

fn test_context(cache_enabled: bool) -> GcRef<Context> {
    Context::new(
        &ContextGroup::new(),
        ContextConfig {
            property_cache_enabled: cache_enabled,
            ..ContextConfig::default()
        },
    )
}

/// Benchmark: warm receiver-owned reads (cache hits consistently).
fn bench_monomorphic_get(c: &mut Criterion) {
    let ctx = test_context(true);
    let obj = DynObject::new(&ctx, None);
    let key = ctx.intern("x");
    obj.set(&ctx, key, Value::int32(42), None).unwrap();
    obj.get(&ctx, key, None).unwrap();

    c.bench_function("get_cached_own", |b| {
        b.iter(|| black_box(obj.get(&ctx, black_box(key), None).unwrap()))
    });
}

/// Benchmark: warm reads through a call-site cache.
fn bench_site_cached_get(c: &mut Criterion) {
    let ctx = test_context(true);
    let obj = DynObject::new(&ctx, None);
    let key = ctx.intern("x");
    obj.set(&ctx, key, Value::int32(42), None).unwrap();
    let site = SiteCache::new();
    obj.get(&ctx, key, Some(&site)).unwrap();

    c.bench_function("get_site_cached", |b| {
        b.iter(|| black_box(obj.get(&ctx, black_box(key), Some(&site)).unwrap()))
    });
}

/// Benchmark: reads resolving on a prototype two links up.
fn bench_prototype_chain_get(c: &mut Criterion) {
    let ctx = test_context(true);
    let root = DynObject::new(&ctx, None);
    let key = ctx.intern("inherited");
    root.set(&ctx, key, Value::int32(7), None).unwrap();
    let middle = DynObject::new(&ctx, Some(root));
    let obj = DynObject::new(&ctx, Some(middle));
    obj.get(&ctx, key, None).unwrap();

    c.bench_function("get_cached_prototype", |b| {
        b.iter(|| black_box(obj.get(&ctx, black_box(key), None).unwrap()))
    });
}

/// Benchmark: the same reads with caching disabled (full descriptor
/// search and chain walk every time).
fn bench_uncached_get(c: &mut Criterion) {
    let ctx = test_context(false);
    let root = DynObject::new(&ctx, None);
    let key = ctx.intern("inherited");
    root.set(&ctx, key, Value::int32(7), None).unwrap();
    let obj = DynObject::new(&ctx, Some(root));

    c.bench_function("get_uncached_prototype", |b| {
        b.iter(|| black_box(obj.get(&ctx, black_box(key), None).unwrap()))
    });
}

/// Benchmark: repeated writes through the store fast path.
fn bench_monomorphic_set(c: &mut Criterion) {
    let ctx = test_context(true);
    let obj = DynObject::new(&ctx, None);
    let key = ctx.intern("y");
    obj.set(&ctx, key, Value::int32(0), None).unwrap();

    c.bench_function("set_cached_own", |b| {
        b.iter(|| black_box(obj.set(&ctx, black_box(key), Value::int32(1), None).unwrap()))
    });
}

/// Benchmark: prototype mutation churn — cache, invalidate, re-walk.
fn bench_invalidation_churn(c: &mut Criterion) {
    let ctx = test_context(true);
    let proto = DynObject::new(&ctx, None);
    let key = ctx.intern("hot");
    proto.set(&ctx, key, Value::int32(1), None).unwrap();
    let obj = DynObject::new(&ctx, Some(proto.clone()));

    c.bench_function("prototype_invalidate_rewalk", |b| {
        b.iter(|| {
            obj.get(&ctx, key, None).unwrap();
            proto.set(&ctx, ctx.intern("churn"), Value::int32(2), None)
                .unwrap();
            proto.delete(&ctx, ctx.intern("churn")).unwrap();
            black_box(obj.get(&ctx, key, None).unwrap())
        })
    });
}

criterion_group!(
    benches,
    bench_monomorphic_get,
    bench_site_cached_get,
    bench_prototype_chain_get,
    bench_uncached_get,
    bench_monomorphic_set,
    bench_invalidation_churn,
);
criterion_main!(benches);
