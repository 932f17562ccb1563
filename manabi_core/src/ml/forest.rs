//! Random forest classifier over dense tabular features.
//!
//! Each tree is a CART tree grown on a bootstrap sample with Gini impurity,
//! looking at a random subset of `⌊√n_features⌋` features per split. Class
//! probabilities are the mean of the leaf class distributions across trees,
//! so every prediction is a proper distribution over `n_classes`.

use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Hyper-parameters of a forest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_trees: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Weight classes inversely to their frequency.
    pub balanced: bool,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            balanced: false,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Node {
    Leaf {
        proba: Vec<f64>,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct DecisionTree {
    nodes: Vec<Node>,
    /// Weighted impurity decrease per feature.
    importances: Vec<f64>,
}

impl DecisionTree {
    /// Follow splits down to a leaf. `None` when a link or feature index is
    /// out of range, or a link does not point forward.
    fn leaf_proba(&self, x: &[f64]) -> Option<&[f64]> {
        let mut at = 0;
        loop {
            match self.nodes.get(at)? {
                Node::Leaf { proba } => return Some(proba),
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let next = if *x.get(*feature)? <= *threshold { *left } else { *right };
                    if next <= at {
                        return None;
                    }
                    at = next;
                }
            }
        }
    }

    fn validate(&self, n_features: usize, n_classes: usize) -> std::result::Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".to_string());
        }
        if self.importances.len() != n_features {
            return Err(format!(
                "{} importances for {n_features} features",
                self.importances.len()
            ));
        }
        for (at, node) in self.nodes.iter().enumerate() {
            match node {
                Node::Leaf { proba } => {
                    if proba.len() != n_classes {
                        return Err(format!("leaf {at} has {} classes, expected {n_classes}", proba.len()));
                    }
                    if proba.iter().any(|p| !p.is_finite() || *p < 0.0) {
                        return Err(format!("leaf {at} holds an invalid probability"));
                    }
                }
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    if *feature >= n_features {
                        return Err(format!("split {at} uses feature {feature} of {n_features}"));
                    }
                    if !threshold.is_finite() {
                        return Err(format!("split {at} has a non-finite threshold"));
                    }
                    for child in [*left, *right] {
                        if child <= at || child >= self.nodes.len() {
                            return Err(format!("split {at} links to node {child}"));
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

fn gini(counts: &[f64], total: f64) -> f64 {
    if total <= 0.0 {
        return 0.0;
    }
    1.0 - counts.iter().map(|c| (c / total).powi(2)).sum::<f64>()
}

struct TreeBuilder<'a> {
    x: &'a [Vec<f64>],
    y: &'a [usize],
    class_weights: &'a [f64],
    n_classes: usize,
    max_features: usize,
    params: &'a ForestParams,
    nodes: Vec<Node>,
    importances: Vec<f64>,
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    impurity: f64,
}

impl<'a> TreeBuilder<'a> {
    fn class_counts(&self, indices: &[usize]) -> Vec<f64> {
        let mut counts = vec![0.0; self.n_classes];
        for &i in indices {
            counts[self.y[i]] += self.class_weights[self.y[i]];
        }
        counts
    }

    fn leaf(&mut self, counts: &[f64]) -> usize {
        let total: f64 = counts.iter().sum();
        let proba = if total > 0.0 {
            counts.iter().map(|c| c / total).collect()
        } else {
            vec![1.0 / self.n_classes as f64; self.n_classes]
        };
        self.nodes.push(Node::Leaf { proba });
        self.nodes.len() - 1
    }

    fn build(&mut self, indices: &mut [usize], depth: usize, rng: &mut ChaCha8Rng) -> usize {
        let counts = self.class_counts(indices);
        let total: f64 = counts.iter().sum();
        let classes_present = counts.iter().filter(|&&c| c > 0.0).count();

        let depth_reached = self.params.max_depth.is_some_and(|max| depth >= max);
        if depth_reached
            || classes_present <= 1
            || indices.len() < self.params.min_samples_split
            || indices.len() < 2 * self.params.min_samples_leaf
        {
            return self.leaf(&counts);
        }

        let parent_impurity = gini(&counts, total);
        let Some(best) = self.best_split(indices, parent_impurity, rng) else {
            return self.leaf(&counts);
        };

        self.importances[best.feature] += total * (parent_impurity - best.impurity);

        let mut boundary = 0;
        for k in 0..indices.len() {
            if self.x[indices[k]][best.feature] <= best.threshold {
                indices.swap(boundary, k);
                boundary += 1;
            }
        }

        let at = self.nodes.len();
        self.nodes.push(Node::Leaf { proba: Vec::new() });
        let (left_idx, right_idx) = indices.split_at_mut(boundary);
        let left = self.build(left_idx, depth + 1, rng);
        let right = self.build(right_idx, depth + 1, rng);
        self.nodes[at] = Node::Split {
            feature: best.feature,
            threshold: best.threshold,
            left,
            right,
        };
        at
    }

    fn best_split(&self, indices: &[usize], parent_impurity: f64, rng: &mut ChaCha8Rng) -> Option<BestSplit> {
        let n_features = self.x[0].len();
        let min_leaf = self.params.min_samples_leaf.max(1);
        let mut best: Option<BestSplit> = None;
        let mut sorted = indices.to_vec();

        for feature in sample(rng, n_features, self.max_features).into_iter() {
            sorted.sort_by(|&a, &b| self.x[a][feature].total_cmp(&self.x[b][feature]));

            let mut left = vec![0.0; self.n_classes];
            let mut right = self.class_counts(&sorted);
            let mut left_total = 0.0;
            let mut right_total: f64 = right.iter().sum();
            let total = right_total;

            for pos in 0..sorted.len() - 1 {
                let class = self.y[sorted[pos]];
                let w = self.class_weights[class];
                left[class] += w;
                right[class] -= w;
                left_total += w;
                right_total -= w;

                let n_left = pos + 1;
                let n_right = sorted.len() - n_left;
                if n_left < min_leaf || n_right < min_leaf {
                    continue;
                }

                let here = self.x[sorted[pos]][feature];
                let next = self.x[sorted[pos + 1]][feature];
                if here >= next {
                    continue;
                }

                let impurity =
                    (left_total * gini(&left, left_total) + right_total * gini(&right, right_total)) / total;
                if best.as_ref().map_or(true, |b| impurity < b.impurity) {
                    let mut threshold = here + (next - here) / 2.0;
                    if threshold >= next {
                        threshold = here;
                    }
                    best = Some(BestSplit {
                        feature,
                        threshold,
                        impurity,
                    });
                }
            }
        }

        best.filter(|b| b.impurity < parent_impurity - 1e-12)
    }
}

/// A trained random forest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    n_features: usize,
    n_classes: usize,
    params: ForestParams,
    trees: Vec<DecisionTree>,
}

impl RandomForest {
    /// Train a forest on rows `x` with class labels `y` in `0..n_classes`.
    pub fn fit(x: &[Vec<f64>], y: &[usize], n_classes: usize, params: &ForestParams) -> Result<Self> {
        if x.is_empty() {
            return Err(Error::Validation("no training samples".to_string()));
        }
        if x.len() != y.len() {
            return Err(Error::Validation(format!(
                "{} samples but {} labels",
                x.len(),
                y.len()
            )));
        }
        if n_classes < 2 {
            return Err(Error::Validation("need at least two classes".to_string()));
        }
        if params.n_trees == 0 {
            return Err(Error::Validation("forest needs at least one tree".to_string()));
        }
        let n_features = x[0].len();
        if n_features == 0 {
            return Err(Error::Validation("samples have no features".to_string()));
        }
        for (i, row) in x.iter().enumerate() {
            if row.len() != n_features {
                return Err(Error::Validation(format!(
                    "sample {i} has {} features, expected {n_features}",
                    row.len()
                )));
            }
            if row.iter().any(|v| !v.is_finite()) {
                return Err(Error::Validation(format!("sample {i} has a non-finite feature")));
            }
        }
        if let Some(bad) = y.iter().find(|&&c| c >= n_classes) {
            return Err(Error::Validation(format!("label {bad} out of range")));
        }

        let n = x.len();
        let mut class_counts = vec![0usize; n_classes];
        for &c in y {
            class_counts[c] += 1;
        }
        let class_weights: Vec<f64> = class_counts
            .iter()
            .map(|&count| {
                if !params.balanced {
                    1.0
                } else if count == 0 {
                    0.0
                } else {
                    n as f64 / (n_classes as f64 * count as f64)
                }
            })
            .collect();
        let max_features = ((n_features as f64).sqrt() as usize).clamp(1, n_features);

        let trees = (0..params.n_trees)
            .into_par_iter()
            .map(|t| {
                let mut rng = ChaCha8Rng::seed_from_u64(params.seed.wrapping_add(t as u64));
                let mut bootstrap: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                let mut builder = TreeBuilder {
                    x,
                    y,
                    class_weights: &class_weights,
                    n_classes,
                    max_features,
                    params,
                    nodes: Vec::new(),
                    importances: vec![0.0; n_features],
                };
                builder.build(&mut bootstrap, 0, &mut rng);
                DecisionTree {
                    nodes: builder.nodes,
                    importances: builder.importances,
                }
            })
            .collect();

        Ok(Self {
            n_features,
            n_classes,
            params: params.clone(),
            trees,
        })
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn params(&self) -> &ForestParams {
        &self.params
    }

    /// Structural check for a forest read from disk: every tree is
    /// non-empty, links point forward to existing nodes, splits name known
    /// features and leaves hold `n_classes` finite probabilities.
    pub fn validate(&self) -> Result<()> {
        if self.n_features == 0 || self.n_classes < 2 {
            return Err(Error::Model(format!(
                "forest shape {} features x {} classes is unusable",
                self.n_features, self.n_classes
            )));
        }
        if self.trees.is_empty() {
            return Err(Error::Model("forest has no trees".to_string()));
        }
        for (t, tree) in self.trees.iter().enumerate() {
            tree.validate(self.n_features, self.n_classes)
                .map_err(|reason| Error::Model(format!("tree {t}: {reason}")))?;
        }
        Ok(())
    }

    fn check_input(&self, x: &[f64]) -> Result<()> {
        if x.len() != self.n_features {
            return Err(Error::Validation(format!(
                "expected {} features, got {}",
                self.n_features,
                x.len()
            )));
        }
        if let Some(i) = x.iter().position(|v| !v.is_finite()) {
            return Err(Error::Validation(format!("feature {i} is not a finite number")));
        }
        Ok(())
    }

    /// Class probabilities for one sample; always `n_classes` long, sums to 1.
    pub fn predict_proba(&self, x: &[f64]) -> Result<Vec<f64>> {
        self.check_input(x)?;
        if self.trees.is_empty() {
            return Err(Error::Model("forest has no trees".to_string()));
        }
        let mut proba = vec![0.0; self.n_classes];
        for tree in &self.trees {
            let leaf = tree
                .leaf_proba(x)
                .ok_or_else(|| Error::Model("tree structure is broken".to_string()))?;
            if leaf.len() != self.n_classes {
                return Err(Error::Model("leaf distribution has the wrong class count".to_string()));
            }
            for (p, l) in proba.iter_mut().zip(leaf) {
                *p += l;
            }
        }
        let sum: f64 = proba.iter().sum();
        if sum <= 0.0 || !sum.is_finite() {
            return Err(Error::Model("degenerate class distribution".to_string()));
        }
        proba.iter_mut().for_each(|p| *p /= sum);
        Ok(proba)
    }

    /// Most probable class for one sample.
    pub fn predict(&self, x: &[f64]) -> Result<usize> {
        Ok(argmax(&self.predict_proba(x)?))
    }

    /// Fraction of correctly classified samples.
    pub fn accuracy(&self, x: &[Vec<f64>], y: &[usize]) -> Result<f64> {
        if x.is_empty() || x.len() != y.len() {
            return Err(Error::Validation("evaluation set is empty or mismatched".to_string()));
        }
        let correct = x
            .par_iter()
            .zip(y.par_iter())
            .map(|(row, &label)| self.predict(row).map(|p| usize::from(p == label)))
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .sum::<usize>();
        Ok(correct as f64 / x.len() as f64)
    }

    /// Mean-decrease-in-impurity importance per feature, normalised to 1.
    pub fn feature_importances(&self) -> Vec<f64> {
        let mut total = vec![0.0; self.n_features];
        for tree in &self.trees {
            let tree_sum: f64 = tree.importances.iter().sum();
            if tree_sum <= 0.0 {
                continue;
            }
            for (t, v) in total.iter_mut().zip(&tree.importances) {
                *t += v / tree_sum;
            }
        }
        let sum: f64 = total.iter().sum();
        if sum > 0.0 {
            total.iter_mut().for_each(|t| *t /= sum);
        }
        total
    }
}

/// Index of the largest value; the first one wins ties.
pub fn argmax(values: &[f64]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |best, (i, &v)| if v > best.1 { (i, v) } else { best })
        .0
}
