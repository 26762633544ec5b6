//! Hot-path benchmarks for the resilience layer: backoff computation,
//! circuit breaker admission, and the full policy engine round trip on the
//! success path.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use switchboard_core::classification::ClassifiedError;
use switchboard_core::resilience::{
    exponential_backoff, CircuitBreaker, CircuitBreakerRegistry, PolicyConfig, PolicyEngine,
    ResilienceConfig,
};

fn bench_exponential_backoff(c: &mut Criterion) {
    let base = Duration::from_millis(100);
    let cap = Duration::from_millis(10_000);

    c.bench_function("exponential_backoff", |b| {
        b.iter(|| {
            for attempt in 0..10 {
                black_box(exponential_backoff(
                    black_box(base),
                    black_box(cap),
                    black_box(attempt),
                ));
            }
        })
    });
}

fn bench_circuit_breaker_admission(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let breaker = CircuitBreaker::new("bench_target".to_string(), PolicyConfig::default());

    c.bench_function("circuit_breaker_try_acquire_closed", |b| {
        b.iter(|| {
            runtime.block_on(async {
                black_box(breaker.try_acquire().await);
            })
        })
    });

    c.bench_function("circuit_breaker_record_success", |b| {
        b.iter(|| {
            runtime.block_on(async {
                breaker.record_success(Duration::from_micros(50)).await;
            })
        })
    });
}

fn bench_policy_engine_success_path(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let registry = Arc::new(CircuitBreakerRegistry::new(ResilienceConfig {
        default_policy: PolicyConfig::default(),
        targets: HashMap::new(),
    }));
    let engine = PolicyEngine::new(registry);

    c.bench_function("policy_engine_execute_success", |b| {
        b.iter(|| {
            runtime.block_on(async {
                let result: Result<u64, _> = engine
                    .execute("bench_target", || async {
                        Ok::<_, ClassifiedError>(black_box(42))
                    })
                    .await;
                black_box(result).unwrap();
            })
        })
    });
}

criterion_group!(
    benches,
    bench_exponential_backoff,
    bench_circuit_breaker_admission,
    bench_policy_engine_success_path
);
criterion_main!(benches);
