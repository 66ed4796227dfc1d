//! Benchmarks for state-stack result lookups.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;
use stageguard::core::{Payload, PipelineState, StageError};
use stageguard::stack::{EntryContext, StateStack};

fn build_stack(stages: usize, retries: u32) -> StateStack {
    let mut stack = StateStack::new();
    for i in 0..stages {
        let name = format!("stage-{i}");
        stack
            .push(PipelineState::StageStarted, EntryContext::for_stage(&name))
            .expect("start");
        for attempt in 0..retries {
            stack
                .push(
                    PipelineState::StageFailed,
                    EntryContext::for_stage(&name)
                        .with_error(StageError::transient("flaky"))
                        .with_retry_count(attempt),
                )
                .expect("fail");
            stack
                .push(PipelineState::Recovering, EntryContext::for_stage(&name))
                .expect("recover");
        }
        let mut payload = Payload::new();
        payload.insert("index".to_string(), json!(i));
        stack
            .push(
                PipelineState::StageCompleted,
                EntryContext::for_stage(&name)
                    .with_result(payload)
                    .with_retry_count(retries),
            )
            .expect("complete");
    }
    stack
}

fn stack_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("latest_results");
    for stages in [10, 100, 1000] {
        let stack = build_stack(stages, 3);
        group.bench_with_input(BenchmarkId::new("get_all", stages), &stack, |b, stack| {
            b.iter(|| black_box(stack.get_all_latest_results()));
        });
        group.bench_with_input(BenchmarkId::new("get_first", stages), &stack, |b, stack| {
            b.iter(|| black_box(stack.get_latest_result("stage-0")));
        });
    }
    group.finish();

    c.bench_function("push_retry_sequence", |b| {
        b.iter(|| black_box(build_stack(20, 2)));
    });
}

criterion_group!(benches, stack_benchmark);
criterion_main!(benches);
