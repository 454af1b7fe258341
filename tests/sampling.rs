mod common;

use common::text;
use pop_impute::{
    data::Value,
    error::{ErrorKind, ImputeError},
    labels::{LabelEncoder, compose_label, decompose_label},
    predictor::{ProbabilityFrame, ProbabilityRow},
    sampler::{Sampler, normalize},
};
use proptest::prelude::*;

fn frame(labels: &[&str], rows: Vec<Vec<f64>>) -> ProbabilityFrame {
    ProbabilityFrame {
        feature_columns: vec!["age".to_string()],
        class_labels: labels.iter().map(|l| l.to_string()).collect(),
        rows: rows
            .into_iter()
            .enumerate()
            .map(|(i, probabilities)| ProbabilityRow {
                id: i as u64 * 10,
                features: vec![Value::text("20-24")],
                probabilities,
            })
            .collect(),
    }
}

fn features() -> Vec<String> {
    vec!["age".to_string()]
}

#[test]
fn certain_class_is_always_sampled() {
    let frame = frame(&["A", "B", "C"], vec![vec![0.0, 0.0, 1.0]; 25]);
    let sampled = Sampler::new(Some(3))
        .sample(&frame, &features(), &["grade".to_string()])
        .unwrap();
    assert_eq!(sampled.len(), 25);
    assert!(
        sampled
            .column_values("grade")
            .unwrap()
            .all(|v| v == Some(&Value::text("C")))
    );
}

#[test]
fn sampling_keeps_row_identity_and_features() {
    let frame = frame(&["A", "B"], vec![vec![0.5, 0.5]; 4]);
    let sampled = Sampler::new(Some(1))
        .sample(&frame, &features(), &["grade".to_string()])
        .unwrap();
    assert_eq!(sampled.ids().collect::<Vec<_>>(), vec![0, 10, 20, 30]);
    assert_eq!(sampled.columns(), ["age".to_string(), "grade".to_string()]);
    assert_eq!(sampled.value(3, "age"), Some(&Value::text("20-24")));
}

#[test]
fn same_seed_draws_the_same_labels() {
    let rows = (0..50)
        .map(|i| vec![0.2 + (i % 5) as f64 * 0.1, 0.3, 0.5])
        .collect::<Vec<_>>();
    let frame = frame(&["A", "B", "C"], rows);
    let draw = |seed| {
        Sampler::new(Some(seed))
            .sample(&frame, &features(), &["grade".to_string()])
            .unwrap()
    };
    assert_eq!(draw(11), draw(11));
}

#[test]
fn composite_labels_split_into_their_targets() {
    let frame = frame(&["Retail_Employed", "Mining_Unemployed"], vec![vec![1.0, 0.0]]);
    let sampled = Sampler::new(Some(5))
        .sample(
            &frame,
            &features(),
            &["industry".to_string(), "work_status".to_string()],
        )
        .unwrap();
    assert_eq!(sampled.value(0, "industry"), Some(&Value::text("Retail")));
    assert_eq!(sampled.value(0, "work_status"), Some(&Value::text("Employed")));
}

#[test]
fn label_parts_are_installed_verbatim() {
    let frame = frame(&["007_30.0"], vec![vec![1.0]]);
    let sampled = Sampler::new(Some(5))
        .sample(&frame, &features(), &["band".to_string(), "hours".to_string()])
        .unwrap();
    assert_eq!(sampled.value(0, "band"), Some(&Value::text("007")));
    assert_eq!(sampled.value(0, "hours"), Some(&Value::text("30.0")));
}

#[test]
fn label_with_separator_collision_is_a_domain_mismatch() {
    let frame = frame(&["Retail_Trade_Employed"], vec![vec![1.0]]);
    let err = Sampler::new(Some(5))
        .sample(
            &frame,
            &features(),
            &["industry".to_string(), "work_status".to_string()],
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DomainMismatch);
}

#[test]
fn zero_mass_row_is_an_invalid_distribution() {
    let frame = frame(&["A", "B"], vec![vec![0.5, 0.5], vec![0.0, 0.0]]);
    let err = Sampler::new(Some(5))
        .sample(&frame, &features(), &["grade".to_string()])
        .unwrap_err();
    assert!(matches!(err, ImputeError::InvalidDistribution { row: 10, .. }));
}

#[test]
fn single_target_labels_keep_underscores() {
    assert_eq!(decompose_label("Retail_Trade", 1).unwrap(), vec!["Retail_Trade"]);
    let frame = frame(&["Retail_Trade"], vec![vec![1.0]]);
    let sampled = Sampler::new(Some(5))
        .sample(&frame, &features(), &["industry".to_string()])
        .unwrap();
    assert_eq!(sampled.value(0, "industry").cloned(), text("Retail_Trade"));
}

#[test]
fn encoder_classes_are_sorted_and_reversible() {
    let encoder = LabelEncoder::fit(["B_x", "A_y", "B_x"]);
    assert_eq!(encoder.classes(), ["A_y".to_string(), "B_x".to_string()]);
    assert_eq!(encoder.encode("B_x"), Some(1));
    assert_eq!(encoder.decode(0), Some("A_y"));
    assert_eq!(encoder.encode("C_z"), None);
}

fn label_part() -> impl Strategy<Value = String> {
    "[A-Za-z0-9 ]{1,8}"
}

proptest! {
    #[test]
    fn renormalized_rows_sum_to_one(weights in proptest::collection::vec(0.0f64..10.0, 1..8)) {
        prop_assume!(weights.iter().sum::<f64>() > 0.0);
        let normalized = normalize(&weights).unwrap();
        let total: f64 = normalized.iter().sum();
        prop_assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn composed_labels_decompose_to_their_parts(parts in proptest::collection::vec(label_part(), 1..4)) {
        let label = compose_label(&parts);
        prop_assert_eq!(decompose_label(&label, parts.len()).unwrap(), parts);
    }
}
