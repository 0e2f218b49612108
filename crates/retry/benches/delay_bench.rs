//! Retry engine benchmarks
//!
//! Benchmarks the delay strategies and the overhead of the retry loop itself
//! for immediate success and for a short run of zero-delay failures.
//!
//! Run with: `cargo bench --bench delay_bench -p pulsearc-retry`

use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use pulsearc_retry::{DelaySettings, DelayStrategy, OperationError, RetryConfig};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::runtime::Builder as RuntimeBuilder;

// ============================================================================
// Delay Strategy Benchmarks
// ============================================================================

fn bench_delay_strategies(c: &mut Criterion) {
    let mut group = c.benchmark_group("delay_strategies");
    let settings = DelaySettings {
        delay: Duration::from_millis(100),
        max_delay: Duration::from_secs(30),
        ..DelaySettings::default()
    };

    for strategy in [
        DelayStrategy::Fixed,
        DelayStrategy::Linear,
        DelayStrategy::Exponential,
        DelayStrategy::RandomJitter,
        DelayStrategy::FullJitter,
    ] {
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{strategy:?}")),
            &strategy,
            |b, strategy| {
                let mut rng = StdRng::seed_from_u64(17);
                let mut attempt = 0_u32;
                b.iter(|| {
                    attempt = attempt.wrapping_add(1) % 64;
                    black_box(strategy.delay_with_rng(black_box(attempt), &settings, &mut rng))
                });
            },
        );
    }

    group.finish();
}

// ============================================================================
// Retry Loop Benchmarks
// ============================================================================

fn bench_retry_loop(c: &mut Criterion) {
    let runtime = match RuntimeBuilder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => panic!("failed to build tokio runtime: {err}"),
    };
    let mut group = c.benchmark_group("retry_loop");

    let config = match RetryConfig::<&'static str>::builder()
        .attempts(5)
        .delay(Duration::ZERO)
        .delay_strategy(DelayStrategy::Fixed)
        .build()
    {
        Ok(config) => config,
        Err(err) => panic!("invalid benchmark config: {err}"),
    };

    group.bench_function("immediate_success", |b| {
        b.to_async(&runtime).iter(|| async {
            let result = config.execute(|| async { Ok::<_, OperationError<&str>>(42) }).await;
            black_box(result.is_ok())
        });
    });

    group.bench_function("five_failures", |b| {
        b.to_async(&runtime).iter(|| async {
            let result = config
                .execute(|| async { Err::<u32, _>(OperationError::from("unavailable")) })
                .await;
            black_box(result.is_err())
        });
    });

    group.finish();
}

criterion_group!(benches, bench_delay_strategies, bench_retry_loop);
criterion_main!(benches);
