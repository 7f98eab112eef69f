use std::collections::HashMap;

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use ab_core::{audience::Condition, Attributes, NoOpErrorHandler, ProjectConfig};

fn criterion_benchmark(c: &mut Criterion) {
    let datafile =
        std::fs::read_to_string("tests/data/datafiles/valid-project-config-v4.json").unwrap();

    {
        let mut group = c.benchmark_group("datafile");
        group.throughput(Throughput::Bytes(datafile.len() as u64));
        group.bench_function("from_json", |b| {
            b.iter(|| ProjectConfig::from_json(black_box(&datafile), &NoOpErrorHandler))
        });
        group.finish();
    }

    let config = ProjectConfig::from_json(&datafile, &NoOpErrorHandler).unwrap();
    let experiment = config.experiment_by_key("typed_audience_experiment").unwrap();

    {
        let mut group = c.benchmark_group("typed_audience_experiment");
        group.throughput(Throughput::Elements(1));
        let matching: Attributes = HashMap::from([("house".to_owned(), "Gryffindor".into())]);
        let numeric: Attributes = HashMap::from([("lasers".to_owned(), 46.into())]);
        let empty: Attributes = HashMap::new();
        for (name, attributes) in [("matching", &matching), ("numeric", &numeric), ("empty", &empty)]
        {
            group.bench_function(name, |b| {
                b.iter(|| config.is_user_in_experiment(black_box(experiment), black_box(attributes)))
            });
        }
        group.finish();
    }

    {
        let mut group = c.benchmark_group("condition");
        group.throughput(Throughput::Elements(1));
        let legacy = r#"["and", ["or", ["not", ["or", {"name": "browser_type", "type": "custom_attribute", "value": "firefox"}]]]]"#;
        group.bench_function("parse_legacy", |b| {
            b.iter(|| black_box(legacy).parse::<Condition>())
        });

        let condition: Condition = legacy.parse().unwrap();
        let attributes: Attributes = HashMap::from([("browser_type".to_owned(), "chrome".into())]);
        group.bench_function("evaluate", |b| {
            b.iter(|| condition.evaluate(black_box(&attributes)))
        });
        group.finish();
    }
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
