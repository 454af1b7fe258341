//! Composite target labels, the target label encoder, and per-feature
//! categorical domains.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::{
    data::Value,
    error::{ImputeError, Result},
};

/// Joins the values of a multi-column target into one class label.
pub const LABEL_SEPARATOR: &str = "_";

pub fn compose_label<S: AsRef<str>>(parts: &[S]) -> String {
    parts
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(LABEL_SEPARATOR)
}

/// Strict inverse of [`compose_label`]. A single-column target is the label
/// itself; otherwise the label must split into exactly `target_count` parts.
pub fn decompose_label(label: &str, target_count: usize) -> Result<Vec<String>> {
    if target_count == 1 {
        return Ok(vec![label.to_string()]);
    }
    let parts = label
        .split(LABEL_SEPARATOR)
        .map(str::to_string)
        .collect::<Vec<_>>();
    if parts.len() != target_count {
        return Err(ImputeError::DomainMismatch(format!(
            "label '{label}' splits into {} part(s) on '{LABEL_SEPARATOR}', expected {target_count}",
            parts.len()
        )));
    }
    Ok(parts)
}

/// Bidirectional map between composite labels and class indices. Classes are
/// sorted so the encoding does not depend on row order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelEncoder {
    classes: Vec<String>,
}

impl LabelEncoder {
    pub fn fit<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let classes = labels
            .into_iter()
            .map(Into::into)
            .collect::<BTreeSet<String>>()
            .into_iter()
            .collect();
        Self { classes }
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn encode(&self, label: &str) -> Option<usize> {
        self.classes
            .binary_search_by(|class| class.as_str().cmp(label))
            .ok()
    }

    pub fn decode(&self, class: usize) -> Option<&str> {
        self.classes.get(class).map(String::as_str)
    }
}

/// The set of admissible values for one feature column: exactly the values
/// observed in the training table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryDomain {
    pub column: String,
    categories: Vec<String>,
    #[serde(skip)]
    lookup: HashMap<String, u32>,
}

impl CategoryDomain {
    pub fn observe<'a, I>(column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = &'a Value>,
    {
        let categories = values
            .into_iter()
            .map(Value::as_display)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect::<Vec<_>>();
        Self::from_categories(column, categories)
    }

    pub fn from_categories(column: &str, categories: Vec<String>) -> Self {
        let lookup = categories
            .iter()
            .enumerate()
            .map(|(code, c)| (c.clone(), code as u32))
            .collect();
        Self {
            column: column.to_string(),
            categories,
            lookup,
        }
    }

    /// Rebuilds the lookup table after deserialization.
    pub(crate) fn reindex(&mut self) {
        self.lookup = self
            .categories
            .iter()
            .enumerate()
            .map(|(code, c)| (c.clone(), code as u32))
            .collect();
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    pub fn cardinality(&self) -> usize {
        self.categories.len()
    }

    pub fn code(&self, value: &Value) -> Option<u32> {
        self.lookup.get(&value.as_display()).copied()
    }

    pub fn contains(&self, value: &Value) -> bool {
        self.code(value).is_some()
    }
}
