use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use surveil_query::granularity::{bucket_counts, sliding_average, DatedCount, Granularity};
use surveil_query::operators::{join_counts, MissingKeyPolicy};
use surveil_query::statistics::ConfidenceIntervalMethod;
use surveil_query::temporal::{Temporal, TemporalCache, TemporalKind};

/// `n` daily counts starting 2020-01-01, every seventh day missing.
fn daily_counts(n: i64) -> Vec<DatedCount> {
    let start = Temporal::day(2020, 1, 1).unwrap();
    (0..n)
        .filter(|offset| offset % 7 != 3)
        .map(|offset| DatedCount::new(Some(start.add_units(offset).unwrap()), (offset % 50) as u64))
        .collect()
}

fn benchmark_bucket_counts(c: &mut Criterion) {
    let mut group = c.benchmark_group("bucket_counts");

    for granularity in [Granularity::Day, Granularity::Week, Granularity::Month] {
        for days in [365, 1825].iter() {
            let rows = daily_counts(*days);
            group.throughput(Throughput::Elements(rows.len() as u64));

            group.bench_with_input(
                BenchmarkId::from_parameter(format!("{granularity}_{days}d")),
                &rows,
                |b, rows| {
                    b.iter(|| bucket_counts(std::hint::black_box(rows.clone()), granularity).unwrap());
                },
            );
        }
    }

    group.finish();
}

fn benchmark_sliding_average(c: &mut Criterion) {
    let mut group = c.benchmark_group("sliding_average");

    let values: Vec<f64> = (0..10_000).map(|i| f64::from(i % 97)).collect();
    group.throughput(Throughput::Elements(values.len() as u64));

    for window in [3, 7, 31].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(window), window, |b, &window| {
            b.iter(|| sliding_average(std::hint::black_box(&values), window).unwrap());
        });
    }

    group.finish();
}

fn benchmark_join_counts(c: &mut Criterion) {
    let mut group = c.benchmark_group("join_counts");

    for days in [365, 1825].iter() {
        let numerator = daily_counts(*days);
        let denominator: Vec<DatedCount> = numerator
            .iter()
            .map(|row| DatedCount::new(row.date, row.count * 3 + 1))
            .collect();
        group.throughput(Throughput::Elements(numerator.len() as u64));

        group.bench_with_input(BenchmarkId::from_parameter(days), days, |b, _| {
            b.iter(|| {
                join_counts(
                    std::hint::black_box(numerator.clone()),
                    denominator.clone(),
                    MissingKeyPolicy::TreatAsZero,
                    ConfidenceIntervalMethod::Wilson,
                )
            });
        });
    }

    group.finish();
}

fn benchmark_temporal_cache(c: &mut Criterion) {
    let mut group = c.benchmark_group("temporal_parse");

    let inputs: Vec<String> = daily_counts(365)
        .iter()
        .filter_map(|row| row.date.map(|date| date.to_string()))
        .collect();
    group.throughput(Throughput::Elements(inputs.len() as u64));

    group.bench_function("uncached", |b| {
        b.iter(|| {
            for input in &inputs {
                std::hint::black_box(Temporal::parse(TemporalKind::Day, input).unwrap());
            }
        });
    });

    let cache = TemporalCache::new();
    group.bench_function("cached", |b| {
        b.iter(|| {
            for input in &inputs {
                std::hint::black_box(cache.parse(TemporalKind::Day, input).unwrap());
            }
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    benchmark_bucket_counts,
    benchmark_sliding_average,
    benchmark_join_counts,
    benchmark_temporal_cache,
);

criterion_main!(benches);
