mod common;

use common::{TestWorkspace, table, text};
use pop_impute::{
    artifact::{ArtifactStore, ModelArtifact},
    config::StageSpec,
    error::ErrorKind,
    frame::AttributeTable,
    predictor,
    trainer::{evaluate_holdout, train_attribute},
};

fn source() -> AttributeTable {
    let mut rows = Vec::new();
    for _ in 0..10 {
        rows.push(vec![text("20-24"), text("Female"), text("Retail"), text("Employed")]);
        rows.push(vec![text("20-24"), text("Male"), text("Mining"), text("Employed")]);
        rows.push(vec![text("30-34"), text("Female"), text("Health"), text("Unemployed")]);
    }
    table(&["age", "gender", "industry", "work_status"], rows)
}

fn spec() -> StageSpec {
    let mut spec = StageSpec::new(&["age", "gender"], &["industry", "work_status"]);
    spec.random_state = Some(9);
    spec
}

fn trained() -> ModelArtifact {
    train_attribute("industry", &source(), &spec()).expect("training succeeds")
}

#[test]
fn training_builds_composite_classes_and_holdout() {
    let artifact = trained();
    assert_eq!(
        artifact.encoder.classes(),
        [
            "Health_Unemployed".to_string(),
            "Mining_Employed".to_string(),
            "Retail_Employed".to_string()
        ]
    );
    // ceil(30 * 0.2)
    assert_eq!(artifact.holdout.len(), 6);
    let metrics = evaluate_holdout(&artifact).unwrap();
    assert_eq!(metrics.rows, 6);
    assert!(metrics.accuracy > 0.8, "{metrics:?}");
}

#[test]
fn training_rejects_missing_values() {
    let mut source = source();
    source.set(3, 1, None);
    let err = train_attribute("industry", &source, &spec()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert!(err.to_string().contains("gender"));
}

#[test]
fn training_rejects_absent_columns() {
    let spec = StageSpec::new(&["age", "region"], &["industry"]);
    let err = train_attribute("industry", &source(), &spec).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert!(err.to_string().contains("region"));
}

#[test]
fn store_round_trip_keeps_predictions() {
    let ws = TestWorkspace::new();
    let store = ArtifactStore::new(ws.path().join("models"));
    let artifact = trained();
    let path = store.save(&artifact).unwrap();
    assert!(path.ends_with("model_industry.bin"));

    let loaded = store.load("industry").unwrap();
    loaded.ensure_compatible(&spec()).unwrap();
    let population = table(
        &["age", "gender"],
        vec![vec![text("20-24"), text("Male")], vec![text("30-34"), text("Female")]],
    );
    let before = predictor::predict(&artifact, &population).unwrap();
    let after = predictor::predict(&loaded, &population).unwrap();
    assert_eq!(before, after);
}

#[test]
fn changed_stage_columns_make_the_artifact_stale() {
    let artifact = trained();
    let changed = StageSpec::new(&["age"], &["industry", "work_status"]);
    let err = artifact.ensure_compatible(&changed).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ModelArtifact);
    assert!(err.to_string().contains("retrain"));
}

#[test]
fn loading_a_missing_or_mismatched_model_fails() {
    let ws = TestWorkspace::new();
    let store = ArtifactStore::new(ws.path());
    assert_eq!(store.load("industry").unwrap_err().kind(), ErrorKind::ModelArtifact);

    store.save(&trained()).unwrap();
    std::fs::copy(store.path_for("industry"), store.path_for("occupation")).unwrap();
    let err = store.load("occupation").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ModelArtifact);

    ws.write("model_garbage.bin", "not a model");
    assert_eq!(store.load("garbage").unwrap_err().kind(), ErrorKind::ModelArtifact);
}

#[test]
fn partition_separates_unseen_and_missing_feature_values() {
    let artifact = trained();
    let population = table(
        &["age", "gender", "income"],
        vec![
            vec![text("20-24"), text("Female"), None],
            vec![text("65+"), text("Female"), None],
            vec![text("30-34"), None, None],
        ],
    );
    let partition = predictor::partition(&population, &artifact).unwrap();
    assert_eq!(partition.in_range.ids().collect::<Vec<_>>(), vec![0]);
    assert_eq!(partition.out_of_range.ids().collect::<Vec<_>>(), vec![1, 2]);
    assert_eq!(partition.in_range.columns(), ["age".to_string(), "gender".to_string()]);
}

#[test]
fn partition_requires_feature_columns() {
    let population = table(&["age"], vec![vec![text("20-24")]]);
    let err = predictor::partition(&population, &trained()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MissingDependency);
}

#[test]
fn predicting_out_of_domain_rows_is_a_domain_mismatch() {
    let population = table(&["age", "gender"], vec![vec![text("65+"), text("Male")]]);
    let err = predictor::predict(&trained(), &population).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DomainMismatch);
}

#[test]
fn predicted_rows_are_distributions() {
    let population = table(
        &["age", "gender"],
        vec![vec![text("20-24"), text("Female")], vec![text("30-34"), text("Male")]],
    );
    let frame = predictor::predict(&trained(), &population).unwrap();
    assert_eq!(frame.class_labels.len(), 3);
    for row in &frame.rows {
        let total: f64 = row.probabilities.iter().sum();
        assert!((total - 1.0).abs() < 1e-9);
    }
}
