use log::{info, warn};
use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};
use serde::Serialize;

use crate::{
    artifact::{HoldoutSplit, ModelArtifact},
    booster::CategoricalBooster,
    config::StageSpec,
    data::Value,
    error::{ImputeError, Result},
    frame::AttributeTable,
    labels::{CategoryDomain, LABEL_SEPARATOR, LabelEncoder, compose_label},
};

/// Trains the classifier for one stage from its source table.
pub fn train_attribute(
    stage_name: &str,
    source: &AttributeTable,
    spec: &StageSpec,
) -> Result<ModelArtifact> {
    spec.validate(stage_name)?;
    let missing = source.missing_columns(&spec.features);
    let missing_targets = source.missing_columns(&spec.targets);
    if !missing.is_empty() || !missing_targets.is_empty() {
        return Err(ImputeError::Configuration(format!(
            "source table for stage '{stage_name}' lacks column(s) {:?}",
            missing.iter().chain(&missing_targets).collect::<Vec<_>>()
        )));
    }
    if source.is_empty() {
        return Err(ImputeError::Training(format!(
            "source table for stage '{stage_name}' has no rows"
        )));
    }

    let feature_idx = source
        .column_indices(&spec.features)
        .map_err(|e| ImputeError::Configuration(e.to_string()))?;
    let target_idx = source
        .column_indices(&spec.targets)
        .map_err(|e| ImputeError::Configuration(e.to_string()))?;

    let mut feature_rows: Vec<Vec<&Value>> = Vec::with_capacity(source.len());
    let mut labels = Vec::with_capacity(source.len());
    let mut separator_collisions = 0usize;
    for record in source.records() {
        let features = feature_idx
            .iter()
            .zip(&spec.features)
            .map(|(&i, name)| required(record.get(i), record.id, name))
            .collect::<Result<Vec<_>>>()?;
        let parts = target_idx
            .iter()
            .zip(&spec.targets)
            .map(|(&i, name)| required(record.get(i), record.id, name).map(Value::as_display))
            .collect::<Result<Vec<_>>>()?;
        if parts.len() > 1 && parts.iter().any(|p| p.contains(LABEL_SEPARATOR)) {
            separator_collisions += 1;
        }
        feature_rows.push(features);
        labels.push(compose_label(&parts));
    }
    if separator_collisions > 0 {
        warn!(
            "Stage '{stage_name}': {separator_collisions} row(s) have target values containing '{LABEL_SEPARATOR}'; \
             their composite labels cannot be split back reliably"
        );
    }

    let encoder = LabelEncoder::fit(labels.iter().cloned());
    let domains = spec
        .features
        .iter()
        .enumerate()
        .map(|(f, name)| CategoryDomain::observe(name, feature_rows.iter().map(|row| row[f])))
        .collect::<Vec<_>>();

    let mut x = Vec::with_capacity(feature_rows.len());
    let mut y = Vec::with_capacity(labels.len());
    for (row, label) in feature_rows.iter().zip(&labels) {
        let codes = row
            .iter()
            .zip(&domains)
            .map(|(value, domain)| domain.code(value))
            .collect::<Option<Vec<u32>>>()
            .ok_or_else(|| ImputeError::Training("feature value missing from its own domain".into()))?;
        let class = encoder
            .encode(label)
            .ok_or_else(|| ImputeError::Training(format!("label '{label}' missing from encoder")))?;
        x.push(codes);
        y.push(class);
    }

    let (train, test) = split_indices(x.len(), spec.test_size(), spec.random_state)?;
    let train_x = train.iter().map(|&i| x[i].clone()).collect::<Vec<_>>();
    let train_y = train.iter().map(|&i| y[i]).collect::<Vec<_>>();
    let holdout = HoldoutSplit {
        rows: test.iter().map(|&i| x[i].clone()).collect(),
        labels: test.iter().map(|&i| y[i]).collect(),
    };

    info!(
        "Training stage '{stage_name}': {} row(s) ({} held out), {} feature(s), {} class(es)",
        x.len(),
        holdout.len(),
        domains.len(),
        encoder.len()
    );
    let cardinalities = domains
        .iter()
        .map(CategoryDomain::cardinality)
        .collect::<Vec<_>>();
    let classifier =
        CategoricalBooster::fit(&train_x, &train_y, &cardinalities, encoder.len(), spec.booster)?;

    let artifact = ModelArtifact::new(
        stage_name,
        spec.features.clone(),
        spec.targets.clone(),
        domains,
        encoder,
        classifier,
        holdout,
    );
    if let Some(metrics) = evaluate_holdout(&artifact) {
        info!(
            "Stage '{stage_name}' holdout: accuracy {:.3}, log-loss {:.4} over {} row(s)",
            metrics.accuracy, metrics.log_loss, metrics.rows
        );
    }
    Ok(artifact)
}

fn required<'a>(value: Option<&'a Value>, id: u64, column: &str) -> Result<&'a Value> {
    value.ok_or_else(|| {
        ImputeError::Configuration(format!(
            "training row {id} has no value for column '{column}'"
        ))
    })
}

/// Shuffles row positions and holds back `ceil(n * test_size)` of them.
pub fn split_indices(
    n: usize,
    test_size: f64,
    random_state: Option<u64>,
) -> Result<(Vec<usize>, Vec<usize>)> {
    let held_out = (n as f64 * test_size).ceil() as usize;
    if held_out >= n {
        return Err(ImputeError::Training(format!(
            "test_size {test_size} leaves no training rows out of {n}"
        )));
    }
    let mut rng = match random_state {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    let mut order = (0..n).collect::<Vec<_>>();
    order.shuffle(&mut rng);
    let train = order.split_off(held_out);
    Ok((train, order))
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HoldoutMetrics {
    pub rows: usize,
    pub accuracy: f64,
    pub log_loss: f64,
}

/// Accuracy and mean log-loss of the classifier on the held-out rows.
pub fn evaluate_holdout(artifact: &ModelArtifact) -> Option<HoldoutMetrics> {
    let holdout = &artifact.holdout;
    if holdout.is_empty() {
        return None;
    }
    let mut correct = 0usize;
    let mut loss = 0.0;
    for (row, &label) in holdout.rows.iter().zip(&holdout.labels) {
        let probs = artifact.classifier.predict_proba(row);
        let predicted = probs
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(class, _)| class);
        if predicted == Some(label) {
            correct += 1;
        }
        loss -= probs[label].max(1e-15).ln();
    }
    let rows = holdout.len();
    Some(HoldoutMetrics {
        rows,
        accuracy: correct as f64 / rows as f64,
        log_loss: loss / rows as f64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_holds_back_ceiling_of_ratio() {
        let (train, test) = split_indices(10, 0.25, Some(3)).unwrap();
        assert_eq!(test.len(), 3);
        assert_eq!(train.len(), 7);
        let mut all = train.iter().chain(&test).copied().collect::<Vec<_>>();
        all.sort_unstable();
        assert_eq!(all, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn split_is_reproducible_with_a_seed() {
        assert_eq!(
            split_indices(50, 0.2, Some(11)).unwrap(),
            split_indices(50, 0.2, Some(11)).unwrap()
        );
    }

    #[test]
    fn split_with_zero_ratio_keeps_every_row() {
        let (train, test) = split_indices(4, 0.0, None).unwrap();
        assert_eq!(train.len(), 4);
        assert!(test.is_empty());
    }

    #[test]
    fn split_refuses_to_empty_the_training_set() {
        assert!(split_indices(1, 0.2, Some(1)).is_err());
    }
}
