use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use field_cache::cache::{derive_key, FieldCache, FieldContext, InProcessStore};
use serde_json::{json, Value};
use std::hint::black_box;
use std::time::Duration;

fn context_with_vars(count: usize) -> FieldContext {
    (0..count).fold(FieldContext::new("Todo", "user"), |ctx, i| {
        ctx.variable(
            format!("arg{}", i),
            json!({"filter": {"status": "open", "page": i}, "tags": ["a", "b"]}),
        )
    })
}

fn bench_derive_key(c: &mut Criterion) {
    let todo = json!({"id": "todo-1", "text": "buy milk", "done": false});
    let mut group = c.benchmark_group("derive_key");

    for count in [0usize, 4, 16] {
        let ctx = context_with_vars(count);
        group.bench_with_input(BenchmarkId::new("by_id", count), &ctx, |b, ctx| {
            b.iter(|| black_box(derive_key(black_box(ctx), Some(&todo))));
        });
    }

    let anonymous = json!({"text": "no id here", "nested": {"a": [1, 2, 3]}});
    let ctx = context_with_vars(4);
    group.bench_function("by_content", |b| {
        b.iter(|| black_box(derive_key(black_box(&ctx), Some(&anonymous))));
    });

    group.finish();
}

fn bench_handle_hit(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().expect("build runtime");
    let cache = FieldCache::new(
        InProcessStore::new(1_000, Duration::from_secs(300)).expect("build store"),
    );
    let ctx = context_with_vars(4);
    let todo = json!({"id": "todo-1"});

    runtime.block_on(async {
        cache
            .handle(&ctx, Some(&todo), Some(300), || async {
                Ok::<_, String>(json!({"name": "ada"}))
            })
            .await
            .expect("warm cache");
    });

    c.bench_function("field_cache/handle_hit", |b| {
        b.to_async(&runtime).iter(|| async {
            let value: Result<Value, String> = cache
                .handle(&ctx, Some(&todo), Some(300), || async {
                    Ok(json!({"name": "recomputed"}))
                })
                .await;
            black_box(value)
        });
    });
}

criterion_group!(benches, bench_derive_key, bench_handle_hit);
criterion_main!(benches);
