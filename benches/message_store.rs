//! Benchmarks for applying row changes to the live message set.

use chat_realtime::{ConversationId, Message, MessageHandlers, MessageId, MessageStore, Timestamp};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn message(i: u64) -> Message {
    Message::new(
        format!("m{i}"),
        ConversationId::new("bench"),
        "alice",
        format!("message body {i}"),
    )
    .at(Timestamp(i as i64))
}

/// Benchmark appends at the tail (the common realtime case)
fn bench_in_order_inserts(c: &mut Criterion) {
    let mut group = c.benchmark_group("in_order_inserts");

    for size in [100u64, 1_000, 5_000] {
        group.bench_with_input(BenchmarkId::new("messages", size), &size, |b, &size| {
            b.iter(|| {
                let store = MessageStore::new();
                for i in 0..size {
                    store.on_insert(message(i)).unwrap();
                }
                black_box(store.len());
            });
        });
    }

    group.finish();
}

/// Benchmark snapshot replacement after a reconnect
fn bench_initial_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("initial_snapshot");
    let conversation = ConversationId::new("bench");

    for size in [100u64, 1_000, 5_000] {
        let messages: Vec<Message> = (0..size).rev().map(message).collect();
        group.bench_with_input(BenchmarkId::new("messages", size), &messages, |b, messages| {
            let store = MessageStore::new();
            b.iter(|| {
                store.on_initial(&conversation, messages.clone()).unwrap();
                black_box(store.len());
            });
        });
    }

    group.finish();
}

/// Benchmark edits and deletes against a populated store
fn bench_update_delete(c: &mut Criterion) {
    let store = MessageStore::new();
    for i in 0..1_000 {
        store.on_insert(message(i)).unwrap();
    }

    c.bench_function("update_then_delete_middle", |b| {
        b.iter(|| {
            let mut edited = message(500);
            edited.content = "edited".to_string();
            store.on_update(edited).unwrap();
            store.on_delete(&MessageId::from("m500")).unwrap();
            store.on_insert(message(500)).unwrap();
        });
    });
}

criterion_group!(
    benches,
    bench_in_order_inserts,
    bench_initial_snapshot,
    bench_update_delete
);
criterion_main!(benches);
