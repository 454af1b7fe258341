//! Domain partitioning and class-probability prediction.

use log::debug;

use crate::{
    artifact::ModelArtifact,
    data::Value,
    error::{ImputeError, Result},
    frame::{AttributeTable, RowId},
};

/// Population records split by whether every feature value lies in the
/// trained domain. Both halves carry only the feature columns.
#[derive(Debug, Clone)]
pub struct DomainPartition {
    pub in_range: AttributeTable,
    pub out_of_range: AttributeTable,
}

pub fn partition(population: &AttributeTable, artifact: &ModelArtifact) -> Result<DomainPartition> {
    let missing = population.missing_columns(&artifact.feature_columns);
    if !missing.is_empty() {
        return Err(ImputeError::MissingDependency(format!(
            "population table has no column(s) {missing:?} required as features"
        )));
    }
    let features = population
        .select(&artifact.feature_columns)
        .map_err(|e| ImputeError::MissingDependency(e.to_string()))?;
    let (in_range, out_of_range) = features.partition(|record| {
        let values = record.values.iter().map(Option::as_ref).collect::<Vec<_>>();
        artifact.encode_features(&values).is_some()
    });
    debug!(
        "Stage '{}': {} row(s) in domain, {} out of range",
        artifact.stage,
        in_range.len(),
        out_of_range.len()
    );
    Ok(DomainPartition {
        in_range,
        out_of_range,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProbabilityRow {
    pub id: RowId,
    pub features: Vec<Value>,
    pub probabilities: Vec<f64>,
}

/// Per-record class distributions, keyed by row identity. Probability
/// columns are the class labels; every other column is a feature.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbabilityFrame {
    pub feature_columns: Vec<String>,
    pub class_labels: Vec<String>,
    pub rows: Vec<ProbabilityRow>,
}

impl ProbabilityFrame {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Probability columns: every column that is not in `feature_columns`.
    pub fn probability_columns(&self, feature_columns: &[String]) -> Vec<usize> {
        self.class_labels
            .iter()
            .enumerate()
            .filter(|(_, label)| !feature_columns.contains(label))
            .map(|(idx, _)| idx)
            .collect()
    }
}

/// Applies the artifact's classifier to in-domain feature rows.
pub fn predict(artifact: &ModelArtifact, features: &AttributeTable) -> Result<ProbabilityFrame> {
    if features.columns() != artifact.feature_columns.as_slice() {
        return Err(ImputeError::ModelArtifact(format!(
            "model for stage '{}' expects feature columns {:?}, got {:?}",
            artifact.stage,
            artifact.feature_columns,
            features.columns()
        )));
    }
    if artifact.classifier.num_classes() != artifact.encoder.len()
        || artifact.classifier.num_features() != artifact.feature_columns.len()
    {
        return Err(ImputeError::ModelArtifact(format!(
            "model for stage '{}' is inconsistent: {} class(es) over {} feature(s), \
             but its encoder knows {} class(es) and it declares {} feature(s)",
            artifact.stage,
            artifact.classifier.num_classes(),
            artifact.classifier.num_features(),
            artifact.encoder.len(),
            artifact.feature_columns.len()
        )));
    }

    let mut rows = Vec::with_capacity(features.len());
    for record in features.records() {
        let values = record.values.iter().map(Option::as_ref).collect::<Vec<_>>();
        let codes = artifact.encode_features(&values).ok_or_else(|| {
            ImputeError::DomainMismatch(format!(
                "row {} has feature values outside the trained domain",
                record.id
            ))
        })?;
        rows.push(ProbabilityRow {
            id: record.id,
            features: values.into_iter().flatten().cloned().collect(),
            probabilities: artifact.classifier.predict_proba(&codes),
        });
    }
    Ok(ProbabilityFrame {
        feature_columns: artifact.feature_columns.clone(),
        class_labels: artifact.encoder.classes().to_vec(),
        rows,
    })
}
