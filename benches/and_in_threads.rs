use criterion::{black_box, criterion_group, criterion_main, Criterion};
use deferred::prelude::*;

fn is_prime(n: &u64) -> Result<bool> {
    let n = *n;
    Ok(n >= 2 && (2..).take_while(|d| d * d <= n).all(|d| n % d != 0))
}

fn and_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("and");
    let primes: Vec<u64> = (2..20_000).filter(|n| is_prime(n).unwrap_or(false)).take(256).collect();

    group.bench_function("sequential", |b| {
        b.iter(|| And::over(is_prime, black_box(primes.clone())).value().unwrap());
    });

    let pool = ThreadPool::new().unwrap();
    group.bench_function("borrowed_pool", |b| {
        b.iter(|| {
            AndInThreads::over(is_prime, black_box(primes.clone()), Executor::borrowed(&pool))
                .value()
                .unwrap()
        });
    });

    group.bench_function("owned_pool", |b| {
        b.iter(|| {
            AndInThreads::over(is_prime, black_box(primes.clone()), Executor::owned())
                .value()
                .unwrap()
        });
    });

    group.finish();
}

fn async_benchmark(c: &mut Criterion) {
    let pool = ThreadPool::new().unwrap();
    let square = Async::new(|n: u64| -> Result<u64> { Ok(n * n) }, Executor::borrowed(&pool));

    c.bench_function("async_apply_get", |b| {
        b.iter(|| square.apply(black_box(12)).unwrap().get().unwrap());
    });
}

criterion_group!(benches, and_benchmark, async_benchmark);
criterion_main!(benches);
