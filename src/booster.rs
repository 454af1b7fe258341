//! Histogram-based gradient boosting with native categorical splits.
//!
//! Features are category codes (`u32` indices into a feature's observed
//! domain). Each boosting round fits one regression tree per class on the
//! softmax gradients. A split sends a *set* of categories left: categories are
//! ordered by their gradient/hessian ratio and the best prefix partition is
//! chosen, so no one-hot expansion is needed.

use serde::{Deserialize, Serialize};

use crate::error::{ImputeError, Result};

const MIN_HESSIAN: f64 = 1e-6;
const MIN_GAIN: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BoosterParams {
    pub rounds: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_child_weight: f64,
    pub lambda: f64,
}

impl Default for BoosterParams {
    fn default() -> Self {
        Self {
            rounds: 30,
            learning_rate: 0.3,
            max_depth: 3,
            min_child_weight: 1.0,
            lambda: 1.0,
        }
    }
}

impl BoosterParams {
    pub fn validate(&self) -> Result<()> {
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(ImputeError::Configuration(format!(
                "booster learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if self.lambda < 0.0 || self.min_child_weight < 0.0 {
            return Err(ImputeError::Configuration(
                "booster lambda and min_child_weight cannot be negative".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
    Leaf {
        weight: f64,
    },
    Split {
        feature: usize,
        left_categories: Vec<bool>,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn predict(&self, row: &[u32]) -> f64 {
        let mut idx = 0usize;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { weight } => return *weight,
                Node::Split {
                    feature,
                    left_categories,
                    left,
                    right,
                } => {
                    let code = row[*feature] as usize;
                    idx = if left_categories.get(code).copied().unwrap_or(false) {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoricalBooster {
    params: BoosterParams,
    num_classes: usize,
    cardinalities: Vec<usize>,
    base_margin: Vec<f64>,
    rounds: Vec<Vec<Tree>>,
}

impl CategoricalBooster {
    /// Fits the ensemble. `x[i][f]` is the category code of feature `f` on
    /// row `i`; `y[i]` is the class index.
    pub fn fit(
        x: &[Vec<u32>],
        y: &[usize],
        cardinalities: &[usize],
        num_classes: usize,
        params: BoosterParams,
    ) -> Result<Self> {
        params.validate()?;
        validate_inputs(x, y, cardinalities, num_classes)?;

        let n = x.len();
        let mut counts = vec![0usize; num_classes];
        for &class in y {
            counts[class] += 1;
        }
        let base_margin = counts
            .iter()
            .map(|&c| ((c as f64 + 1.0) / (n + num_classes) as f64).ln())
            .collect::<Vec<_>>();

        let mut booster = Self {
            params,
            num_classes,
            cardinalities: cardinalities.to_vec(),
            base_margin,
            rounds: Vec::with_capacity(params.rounds),
        };
        if num_classes == 1 {
            return Ok(booster);
        }

        let mut margins = vec![booster.base_margin.clone(); n];
        let mut grad = vec![0.0; n];
        let mut hess = vec![0.0; n];
        for _ in 0..params.rounds {
            let probs = margins.iter().map(|m| softmax(m)).collect::<Vec<_>>();
            let mut round = Vec::with_capacity(num_classes);
            for class in 0..num_classes {
                for i in 0..n {
                    let p = probs[i][class];
                    let target = if y[i] == class { 1.0 } else { 0.0 };
                    grad[i] = p - target;
                    hess[i] = (p * (1.0 - p)).max(MIN_HESSIAN);
                }
                let builder = TreeBuilder {
                    x,
                    grad: &grad,
                    hess: &hess,
                    cardinalities,
                    params: &params,
                };
                round.push(builder.build());
            }
            for (row, margin) in x.iter().zip(margins.iter_mut()) {
                for (class, tree) in round.iter().enumerate() {
                    margin[class] += tree.predict(row);
                }
            }
            booster.rounds.push(round);
        }
        Ok(booster)
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn num_features(&self) -> usize {
        self.cardinalities.len()
    }

    pub fn num_trees(&self) -> usize {
        self.rounds.iter().map(Vec::len).sum()
    }

    /// Posterior class probabilities for one encoded row.
    pub fn predict_proba(&self, row: &[u32]) -> Vec<f64> {
        let mut margin = self.base_margin.clone();
        for round in &self.rounds {
            for (class, tree) in round.iter().enumerate() {
                margin[class] += tree.predict(row);
            }
        }
        softmax(&margin)
    }
}

fn validate_inputs(
    x: &[Vec<u32>],
    y: &[usize],
    cardinalities: &[usize],
    num_classes: usize,
) -> Result<()> {
    if x.is_empty() {
        return Err(ImputeError::Training("no training rows".into()));
    }
    if x.len() != y.len() {
        return Err(ImputeError::Training(format!(
            "{} feature row(s) but {} label(s)",
            x.len(),
            y.len()
        )));
    }
    if num_classes == 0 {
        return Err(ImputeError::Training("target has no classes".into()));
    }
    for (i, (row, &class)) in x.iter().zip(y).enumerate() {
        if row.len() != cardinalities.len() {
            return Err(ImputeError::Training(format!(
                "row {i} has {} feature(s), expected {}",
                row.len(),
                cardinalities.len()
            )));
        }
        if class >= num_classes {
            return Err(ImputeError::Training(format!(
                "row {i} has class {class} but only {num_classes} class(es) exist"
            )));
        }
        if let Some((f, code)) = row
            .iter()
            .enumerate()
            .find(|(f, code)| **code as usize >= cardinalities[*f])
        {
            return Err(ImputeError::Training(format!(
                "row {i} feature {f} has category code {code} outside cardinality {}",
                cardinalities[f]
            )));
        }
    }
    Ok(())
}

fn softmax(margin: &[f64]) -> Vec<f64> {
    let max = margin.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps = margin.iter().map(|m| (m - max).exp()).collect::<Vec<_>>();
    let total: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / total).collect()
}

struct SplitCandidate {
    gain: f64,
    feature: usize,
    left_categories: Vec<bool>,
}

struct TreeBuilder<'a> {
    x: &'a [Vec<u32>],
    grad: &'a [f64],
    hess: &'a [f64],
    cardinalities: &'a [usize],
    params: &'a BoosterParams,
}

impl TreeBuilder<'_> {
    fn build(&self) -> Tree {
        let mut nodes = Vec::new();
        let rows = (0..self.x.len()).collect::<Vec<_>>();
        self.grow(&mut nodes, rows, 0);
        Tree { nodes }
    }

    fn grow(&self, nodes: &mut Vec<Node>, rows: Vec<usize>, depth: usize) -> usize {
        let (g, h) = rows.iter().fold((0.0, 0.0), |(g, h), &r| {
            (g + self.grad[r], h + self.hess[r])
        });
        let slot = nodes.len();
        nodes.push(Node::Leaf {
            weight: -g / (h + self.params.lambda) * self.params.learning_rate,
        });
        if depth >= self.params.max_depth || rows.len() < 2 {
            return slot;
        }
        let Some(split) = self.best_split(&rows, g, h) else {
            return slot;
        };
        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .into_iter()
            .partition(|&r| split.left_categories[self.x[r][split.feature] as usize]);
        let left = self.grow(nodes, left_rows, depth + 1);
        let right = self.grow(nodes, right_rows, depth + 1);
        nodes[slot] = Node::Split {
            feature: split.feature,
            left_categories: split.left_categories,
            left,
            right,
        };
        slot
    }

    fn best_split(&self, rows: &[usize], g: f64, h: f64) -> Option<SplitCandidate> {
        let lambda = self.params.lambda;
        let parent_score = g * g / (h + lambda);
        let mut best: Option<SplitCandidate> = None;

        for (feature, &cardinality) in self.cardinalities.iter().enumerate() {
            if cardinality < 2 {
                continue;
            }
            // (gradient sum, hessian sum, rows) per category
            let mut histogram = vec![(0.0f64, 0.0f64, 0usize); cardinality];
            for &r in rows {
                let bin = &mut histogram[self.x[r][feature] as usize];
                bin.0 += self.grad[r];
                bin.1 += self.hess[r];
                bin.2 += 1;
            }
            let mut present = (0..cardinality)
                .filter(|&c| histogram[c].2 > 0)
                .collect::<Vec<_>>();
            if present.len() < 2 {
                continue;
            }
            let ratio = |c: usize| histogram[c].0 / (histogram[c].1 + lambda);
            present.sort_by(|&a, &b| ratio(a).total_cmp(&ratio(b)).then(a.cmp(&b)));

            let (mut gl, mut hl) = (0.0, 0.0);
            for cut in 0..present.len() - 1 {
                let bin = histogram[present[cut]];
                gl += bin.0;
                hl += bin.1;
                let (gr, hr) = (g - gl, h - hl);
                if hl < self.params.min_child_weight || hr < self.params.min_child_weight {
                    continue;
                }
                let gain = gl * gl / (hl + lambda) + gr * gr / (hr + lambda) - parent_score;
                let improves = match &best {
                    Some(current) => gain > current.gain + MIN_GAIN,
                    None => gain > MIN_GAIN,
                };
                if improves {
                    let mut left_categories = vec![false; cardinality];
                    for &c in &present[..=cut] {
                        left_categories[c] = true;
                    }
                    best = Some(SplitCandidate {
                        gain,
                        feature,
                        left_categories,
                    });
                }
            }
        }
        best
    }
}
