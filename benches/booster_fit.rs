use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use pop_impute::booster::{BoosterParams, CategoricalBooster};
use pop_impute::sampler::Sampler;
use pop_impute::{
    data::Value,
    predictor::{ProbabilityFrame, ProbabilityRow},
};

fn synthetic_rows(rows: usize) -> (Vec<Vec<u32>>, Vec<usize>) {
    let mut x = Vec::with_capacity(rows);
    let mut y = Vec::with_capacity(rows);
    for i in 0..rows {
        let age = (i % 18) as u32;
        let gender = (i % 2) as u32;
        let region = ((i / 7) % 12) as u32;
        x.push(vec![age, gender, region]);
        y.push(((age / 3) as usize + gender as usize * 6 + (i % 5 == 0) as usize) % 12);
    }
    (x, y)
}

fn bench_booster(c: &mut Criterion) {
    let (x, y) = synthetic_rows(20_000);
    let cardinalities = [18, 2, 12];
    let params = BoosterParams {
        rounds: 10,
        ..BoosterParams::default()
    };
    let booster = CategoricalBooster::fit(&x, &y, &cardinalities, 12, params).expect("fit");

    let mut group = c.benchmark_group("booster");
    group.sample_size(10);

    group.bench_function("fit_20k_rows_12_classes", |b| {
        b.iter_batched(
            || (),
            |_| {
                CategoricalBooster::fit(&x, &y, &cardinalities, 12, params).expect("fit");
            },
            BatchSize::SmallInput,
        );
    });

    group.bench_function("predict_20k_rows", |b| {
        b.iter(|| {
            x.iter()
                .map(|row| booster.predict_proba(row)[0])
                .sum::<f64>()
        });
    });

    let frame = ProbabilityFrame {
        feature_columns: vec!["age".to_string()],
        class_labels: (0..12).map(|c| format!("class{c}")).collect(),
        rows: x
            .iter()
            .enumerate()
            .map(|(i, row)| ProbabilityRow {
                id: i as u64,
                features: vec![Value::Number(row[0] as f64)],
                probabilities: booster.predict_proba(row),
            })
            .collect(),
    };
    let features = vec!["age".to_string()];
    let targets = vec!["class".to_string()];
    group.bench_function("sample_20k_rows", |b| {
        b.iter_batched(
            || Sampler::new(Some(7)),
            |mut sampler| {
                sampler
                    .sample(&frame, &features, &targets)
                    .expect("sample");
            },
            BatchSize::SmallInput,
        );
    });

    group.finish();
}

criterion_group!(benches, bench_booster);
criterion_main!(benches);
