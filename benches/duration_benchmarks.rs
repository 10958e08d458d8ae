use chrono::Duration;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ts_obs::duration::{format_duration, parse_duration};

fn duration_parsing_benchmark(c: &mut Criterion) {
    let test_values = vec![
        "1m",
        "90s",
        "2h45m",
        "1.5h",
        "300ms",
        "-1.5h",
        "1h15m30.918273645s",
        "9223372036854775807ns",
    ];

    c.bench_function("parse_duration", |b| {
        b.iter(|| {
            for value in &test_values {
                let _ = black_box(parse_duration(black_box(value)));
            }
        })
    });
}

fn duration_formatting_benchmark(c: &mut Criterion) {
    let test_values = vec![
        Duration::minutes(2),
        Duration::seconds(90),
        Duration::milliseconds(1500),
        Duration::hours(36) + Duration::nanoseconds(1),
    ];

    c.bench_function("format_duration", |b| {
        b.iter(|| {
            for value in &test_values {
                black_box(format_duration(black_box(*value)));
            }
        })
    });
}

criterion_group!(benches, duration_parsing_benchmark, duration_formatting_benchmark);
criterion_main!(benches);
