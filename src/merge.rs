//! Merge engine: installs sampled attribute values into the population table.
//!
//! Every column of the update is merged with "prefer existing, fall back to
//! new" semantics. A target that already held values before the merge is a
//! conflicting attribute; cells where both sides hold a value are reconciled
//! by the attribute's [`ConflictPolicy`].

use std::{
    cmp::Ordering,
    collections::{BTreeMap, HashMap},
    fmt,
    str::FromStr,
};

use itertools::Itertools;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    data::{Value, parse_number},
    error::{ImputeError, Result},
    frame::AttributeTable,
};

const RANGE_SEPARATOR: &str = "-";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    /// Numeric mean of both values.
    Average,
    /// Sorted, de-duplicated union of dash-separated tokens.
    Between,
}

impl ConflictPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            ConflictPolicy::Average => "average",
            ConflictPolicy::Between => "between",
        }
    }

    /// Combines one existing cell with one incoming cell.
    pub fn combine(
        self,
        column: &str,
        existing: Option<&Value>,
        incoming: Option<&Value>,
    ) -> Result<Option<Value>> {
        match self {
            ConflictPolicy::Average => average(column, existing, incoming).map(Some),
            ConflictPolicy::Between => Ok(between(existing, incoming)),
        }
    }
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictPolicy {
    type Err = ImputeError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "average" => Ok(ConflictPolicy::Average),
            "between" => Ok(ConflictPolicy::Between),
            other => Err(ImputeError::Configuration(format!(
                "unknown conflict policy '{other}' (expected 'average' or 'between')"
            ))),
        }
    }
}

fn average(column: &str, existing: Option<&Value>, incoming: Option<&Value>) -> Result<Value> {
    let numeric = |side: &str, value: Option<&Value>| -> Result<f64> {
        let value = value.ok_or_else(|| ImputeError::Merge {
            column: column.to_string(),
            message: format!("average policy needs a value on both sides, {side} is missing"),
        })?;
        value.as_number().ok_or_else(|| ImputeError::Merge {
            column: column.to_string(),
            message: format!("average policy cannot coerce {side} value '{value}' to a number"),
        })
    };
    let left = numeric("existing", existing)?;
    let right = numeric("incoming", incoming)?;
    Ok(Value::Number((left + right) / 2.0))
}

fn between(existing: Option<&Value>, incoming: Option<&Value>) -> Option<Value> {
    match (existing, incoming) {
        (None, None) => return None,
        (Some(value), None) | (None, Some(value)) => return Some(value.clone()),
        (Some(left), Some(right)) if left == right => return Some(left.clone()),
        _ => {}
    }
    let tokens = [existing, incoming]
        .into_iter()
        .flatten()
        .flat_map(range_tokens)
        .sorted_by(|a, b| compare_tokens(a, b))
        .dedup()
        .collect::<Vec<_>>();
    match tokens.as_slice() {
        [] => None,
        [single] => {
            let numeric = [existing, incoming]
                .into_iter()
                .flatten()
                .any(|v| matches!(v, Value::Number(_)));
            match parse_number(single) {
                Some(number) if numeric => Some(Value::Number(number)),
                _ => Some(Value::Text(single.clone())),
            }
        }
        _ => Some(Value::Text(tokens.join(RANGE_SEPARATOR))),
    }
}

// A plain number is one token even when signed; only ranges are split.
fn range_tokens(value: &Value) -> Vec<String> {
    let display = value.as_display();
    if matches!(value, Value::Number(_)) || parse_number(&display).is_some() {
        return vec![display.trim().to_string()];
    }
    display
        .split(RANGE_SEPARATOR)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

// Numbers sort numerically and ahead of words; ties fall back to text order
// so equal tokens end up adjacent.
fn compare_tokens(a: &str, b: &str) -> Ordering {
    match (parse_number(a), parse_number(b)) {
        (Some(x), Some(y)) => x.total_cmp(&y).then_with(|| a.cmp(b)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeStats {
    /// Cells that were empty and received an incoming value.
    pub filled: usize,
    /// Cells where both sides held a value and a policy combined them.
    pub reconciled: usize,
    /// Columns added to the population by this merge.
    pub installed_columns: Vec<String>,
}

/// Merges `update` (feature and target columns for one stage, keyed by row
/// identity) into `population` and returns the next population table.
pub fn merge_attribute(
    mut population: AttributeTable,
    update: &AttributeTable,
    feature_columns: &[String],
    target_columns: &[String],
    policies: &BTreeMap<String, ConflictPolicy>,
) -> Result<(AttributeTable, MergeStats)> {
    let mut conflicting = HashMap::new();
    for target in target_columns {
        if population.has_values(target) {
            let policy = policies.get(target).copied().ok_or_else(|| {
                ImputeError::Configuration(format!(
                    "column '{target}' already holds values and no conflict policy is configured for it"
                ))
            })?;
            conflicting.insert(target.as_str(), policy);
        }
    }

    let population_index = population.position_index();
    if let Some(stray) = update.ids().find(|id| !population_index.contains_key(id)) {
        return Err(ImputeError::Merge {
            column: target_columns.join(","),
            message: format!("update carries row {stray} which is not in the population"),
        });
    }

    let mut stats = MergeStats::default();
    let update_rows = update.position_index();
    for column in feature_columns.iter().chain(target_columns) {
        let source = update.column_index(column).ok_or_else(|| ImputeError::Merge {
            column: column.clone(),
            message: "update does not carry this column".into(),
        })?;
        if !population.has_column(column) {
            stats.installed_columns.push(column.clone());
        }
        let dest = population.ensure_column(column);
        let policy = conflicting.get(column.as_str()).copied();

        for pos in 0..population.len() {
            let record = &population.records()[pos];
            let incoming = update_rows
                .get(&record.id)
                .and_then(|&u| update.records()[u].get(source));
            let merged = match (record.get(dest), incoming, policy) {
                (Some(existing), Some(incoming), Some(policy)) => {
                    stats.reconciled += 1;
                    policy.combine(column, Some(existing), Some(incoming))?
                }
                (Some(_), _, _) | (None, None, _) => continue,
                (None, Some(incoming), _) => {
                    stats.filled += 1;
                    Some(incoming.clone())
                }
            };
            population.set(pos, dest, merged);
        }
        if let Some(policy) = policy {
            debug!("Column '{column}' reconciled with the '{policy}' policy");
        }
    }
    Ok((population, stats))
}
