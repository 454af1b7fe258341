//! Stochastic sampling of one class label per row.

use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::{
    data::Value,
    error::{ImputeError, Result},
    frame::AttributeTable,
    labels::decompose_label,
    predictor::ProbabilityFrame,
};

pub struct Sampler {
    rng: StdRng,
}

impl Sampler {
    /// A seeded sampler is reproducible; without a seed it draws from OS
    /// entropy.
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self { rng }
    }

    /// Draws one class per row and splits it into the target columns. The
    /// output has the feature columns followed by the targets, one record per
    /// frame row with the same identity.
    pub fn sample(
        &mut self,
        frame: &ProbabilityFrame,
        feature_columns: &[String],
        target_columns: &[String],
    ) -> Result<AttributeTable> {
        if frame.feature_columns != feature_columns {
            return Err(ImputeError::ModelArtifact(format!(
                "probability frame carries features {:?}, sampler was given {:?}",
                frame.feature_columns, feature_columns
            )));
        }
        let prob_columns = frame.probability_columns(feature_columns);
        let columns = feature_columns
            .iter()
            .chain(target_columns)
            .cloned()
            .collect::<Vec<_>>();
        let mut sampled =
            AttributeTable::new(columns).map_err(|e| ImputeError::Configuration(e.to_string()))?;

        for row in &frame.rows {
            let weights = prob_columns
                .iter()
                .map(|&c| row.probabilities.get(c).copied().unwrap_or(0.0))
                .collect::<Vec<_>>();
            let normalized = normalize(&weights).ok_or(ImputeError::InvalidDistribution {
                row: row.id,
                mass: weights.iter().sum(),
            })?;
            let drawn = self.draw(&normalized);
            let label = &frame.class_labels[prob_columns[drawn]];
            let parts = decompose_label(label, target_columns.len())?;

            let mut values = row.features.iter().cloned().map(Some).collect::<Vec<_>>();
            values.extend(parts.iter().map(|part| target_value(part)));
            sampled
                .push(row.id, values)
                .map_err(|e| ImputeError::DomainMismatch(e.to_string()))?;
        }
        Ok(sampled)
    }

    /// Index drawn from a normalized distribution. Zero-weight entries are
    /// never chosen.
    fn draw(&mut self, probabilities: &[f64]) -> usize {
        let u: f64 = self.rng.random();
        let mut cumulative = 0.0;
        for (idx, &p) in probabilities.iter().enumerate() {
            cumulative += p;
            if p > 0.0 && u < cumulative {
                return idx;
            }
        }
        // rounding left u above the final cumulative sum
        probabilities
            .iter()
            .rposition(|&p| p > 0.0)
            .unwrap_or(probabilities.len() - 1)
    }
}

/// Rescales non-negative weights to sum to exactly one.
pub fn normalize(weights: &[f64]) -> Option<Vec<f64>> {
    if weights.is_empty() || weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
        return None;
    }
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return None;
    }
    Some(weights.iter().map(|w| w / total).collect())
}

// Label parts are installed verbatim so they match the training categories.
fn target_value(part: &str) -> Option<Value> {
    Some(Value::text(part))
}
