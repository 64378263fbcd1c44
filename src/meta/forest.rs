//! Random-forest regression for covariate diagnostics.
//!
//! Bagged CART trees on weighted squared error:
//! - each tree is grown on a bootstrap sample drawn with its own seeded RNG
//! - splits minimise the weighted within-node SSE (every feature considered)
//! - importances are the weighted impurity decrease per feature, normalised
//!   per tree, averaged over trees, then normalised to sum to 1
//! - out-of-bag R² uses, for each row, the mean prediction of trees that did
//!   not see it
//!
//! Trees are grown in parallel; results do not depend on thread scheduling.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use crate::error::FitError;
use crate::fit::resample_seed;

#[derive(Debug, Clone, Copy)]
pub struct ForestOptions {
    pub n_trees: usize,
    pub max_depth: Option<usize>,
    pub min_samples_leaf: usize,
    pub seed: u64,
}

impl Default for ForestOptions {
    fn default() -> Self {
        Self {
            n_trees: 200,
            max_depth: None,
            min_samples_leaf: 1,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Leaf { value: f64 },
    Split { feature: usize, threshold: f64, left: usize, right: usize },
}

#[derive(Debug, Clone)]
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn predict(&self, row: &[f64]) -> f64 {
        let mut i = 0;
        loop {
            match &self.nodes[i] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    i = if row[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }
}

/// A fitted forest plus its diagnostics.
#[derive(Debug, Clone)]
pub struct ForestFit {
    trees: Vec<Tree>,
    /// Normalised importances in feature order.
    pub importances: Vec<f64>,
    /// None when no row was ever out of bag.
    pub oob_r_squared: Option<f64>,
}

impl ForestFit {
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn predict(&self, row: &[f64]) -> f64 {
        self.trees.iter().map(|t| t.predict(row)).sum::<f64>() / self.trees.len() as f64
    }
}

/// Fit a forest on row-major features `x` with optional sample weights.
pub fn fit_forest(
    x: &[Vec<f64>],
    y: &[f64],
    weights: Option<&[f64]>,
    opts: &ForestOptions,
) -> Result<ForestFit, FitError> {
    let n = y.len();
    if x.len() != n {
        return Err(FitError::InvalidInput("feature rows and targets differ in length".to_string()));
    }
    if n < 2 {
        return Err(FitError::InsufficientData { needed: 2, got: n });
    }
    let p = x[0].len();
    if p == 0 || x.iter().any(|row| row.len() != p) {
        return Err(FitError::InvalidInput("feature rows must share a non-zero width".to_string()));
    }
    if opts.n_trees == 0 {
        return Err(FitError::InvalidInput("forest needs at least one tree".to_string()));
    }
    let base_w: Vec<f64> = match weights {
        Some(w) if w.len() == n => w.to_vec(),
        Some(_) => return Err(FitError::InvalidInput("weights length mismatch".to_string())),
        None => vec![1.0; n],
    };

    let grown: Vec<(Tree, Vec<f64>, Vec<bool>)> = (0..opts.n_trees)
        .into_par_iter()
        .map(|t| {
            let mut rng = StdRng::seed_from_u64(resample_seed(opts.seed, t));
            let mut counts = vec![0usize; n];
            for _ in 0..n {
                counts[rng.gen_range(0..n)] += 1;
            }
            let sample_w: Vec<f64> = counts.iter().zip(&base_w).map(|(&c, &w)| c as f64 * w).collect();
            let in_bag: Vec<usize> = (0..n).filter(|&i| counts[i] > 0).collect();

            let mut builder = TreeBuilder {
                x,
                y,
                w: &sample_w,
                opts,
                nodes: Vec::new(),
                importance: vec![0.0; p],
            };
            builder.grow(in_bag, 0);
            let total: f64 = builder.importance.iter().sum();
            let importance = if total > 0.0 {
                builder.importance.iter().map(|v| v / total).collect()
            } else {
                vec![0.0; p]
            };
            let oob: Vec<bool> = counts.iter().map(|&c| c == 0).collect();
            (Tree { nodes: builder.nodes }, importance, oob)
        })
        .collect();

    let mut importances = vec![0.0; p];
    for (_, imp, _) in &grown {
        for (acc, v) in importances.iter_mut().zip(imp) {
            *acc += v;
        }
    }
    let total: f64 = importances.iter().sum();
    if total > 0.0 {
        for v in &mut importances {
            *v /= total;
        }
    }

    let oob_r_squared = oob_score(x, y, &grown);
    let trees = grown.into_iter().map(|(tree, _, _)| tree).collect();

    Ok(ForestFit {
        trees,
        importances,
        oob_r_squared,
    })
}

fn oob_score(x: &[Vec<f64>], y: &[f64], grown: &[(Tree, Vec<f64>, Vec<bool>)]) -> Option<f64> {
    let mut observed = Vec::new();
    let mut predicted = Vec::new();
    for (i, row) in x.iter().enumerate() {
        let preds: Vec<f64> = grown
            .iter()
            .filter(|(_, _, oob)| oob[i])
            .map(|(tree, _, _)| tree.predict(row))
            .collect();
        if !preds.is_empty() {
            observed.push(y[i]);
            predicted.push(preds.iter().sum::<f64>() / preds.len() as f64);
        }
    }
    if observed.len() < 2 {
        return None;
    }
    Some(crate::math::r_squared(&observed, &predicted))
}

struct TreeBuilder<'a> {
    x: &'a [Vec<f64>],
    y: &'a [f64],
    w: &'a [f64],
    opts: &'a ForestOptions,
    nodes: Vec<Node>,
    importance: Vec<f64>,
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    gain: f64,
}

impl TreeBuilder<'_> {
    /// Grow a subtree on `idx` and return its node index.
    fn grow(&mut self, idx: Vec<usize>, depth: usize) -> usize {
        let (w_sum, mean, sse) = self.node_stats(&idx);
        let node_id = self.nodes.len();
        self.nodes.push(Node::Leaf { value: mean });

        let depth_ok = self.opts.max_depth.is_none_or(|d| depth < d);
        if !depth_ok || idx.len() < 2 * self.opts.min_samples_leaf.max(1) || sse <= 1e-12 * w_sum.max(1.0) {
            return node_id;
        }
        let Some(best) = self.best_split(&idx, sse) else {
            return node_id;
        };

        self.importance[best.feature] += best.gain;
        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = idx
            .into_iter()
            .partition(|&i| self.x[i][best.feature] <= best.threshold);
        let left = self.grow(left_idx, depth + 1);
        let right = self.grow(right_idx, depth + 1);
        self.nodes[node_id] = Node::Split {
            feature: best.feature,
            threshold: best.threshold,
            left,
            right,
        };
        node_id
    }

    fn node_stats(&self, idx: &[usize]) -> (f64, f64, f64) {
        let w_sum: f64 = idx.iter().map(|&i| self.w[i]).sum();
        let mean = idx.iter().map(|&i| self.w[i] * self.y[i]).sum::<f64>() / w_sum;
        let sse = idx
            .iter()
            .map(|&i| self.w[i] * (self.y[i] - mean) * (self.y[i] - mean))
            .sum();
        (w_sum, mean, sse)
    }

    fn best_split(&self, idx: &[usize], parent_sse: f64) -> Option<BestSplit> {
        let p = self.x[0].len();
        let min_leaf = self.opts.min_samples_leaf.max(1);
        let mut best: Option<BestSplit> = None;

        for feature in 0..p {
            let mut order = idx.to_vec();
            order.sort_by(|&a, &b| self.x[a][feature].total_cmp(&self.x[b][feature]));

            let total_w: f64 = order.iter().map(|&i| self.w[i]).sum();
            let total_wy: f64 = order.iter().map(|&i| self.w[i] * self.y[i]).sum();
            let total_wyy: f64 = order.iter().map(|&i| self.w[i] * self.y[i] * self.y[i]).sum();

            let (mut lw, mut lwy, mut lwyy) = (0.0, 0.0, 0.0);
            for k in 0..order.len() - 1 {
                let i = order[k];
                lw += self.w[i];
                lwy += self.w[i] * self.y[i];
                lwyy += self.w[i] * self.y[i] * self.y[i];

                let here = self.x[i][feature];
                let next = self.x[order[k + 1]][feature];
                if next <= here || k + 1 < min_leaf || order.len() - (k + 1) < min_leaf {
                    continue;
                }
                let rw = total_w - lw;
                if lw <= 0.0 || rw <= 0.0 {
                    continue;
                }
                let left_sse = lwyy - lwy * lwy / lw;
                let right_sse = (total_wyy - lwyy) - (total_wy - lwy) * (total_wy - lwy) / rw;
                let gain = parent_sse - left_sse - right_sse;
                if gain > 1e-12 && best.as_ref().is_none_or(|b| gain > b.gain) {
                    best = Some(BestSplit {
                        feature,
                        threshold: 0.5 * (here + next),
                        gain,
                    });
                }
            }
        }
        best
    }
}

/// Names of the `k` most important features, highest first (ties keep input order).
pub fn top_features(names: &[String], importances: &[f64], k: usize) -> Vec<String> {
    let mut ranked: Vec<(usize, f64)> = importances.iter().copied().enumerate().collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    ranked.into_iter().take(k).map(|(i, _)| names[i].clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step_data() -> (Vec<Vec<f64>>, Vec<f64>) {
        // y depends on feature 0 only; feature 1 is a deterministic nuisance pattern.
        let x: Vec<Vec<f64>> = (0..60)
            .map(|i| vec![i as f64 / 60.0, ((i * 37) % 11) as f64])
            .collect();
        let y: Vec<f64> = x.iter().map(|r| if r[0] < 0.5 { 1.0 } else { 5.0 }).collect();
        (x, y)
    }

    #[test]
    fn informative_feature_dominates_importance() {
        let (x, y) = step_data();
        let opts = ForestOptions {
            n_trees: 50,
            ..ForestOptions::default()
        };
        let fit = fit_forest(&x, &y, None, &opts).unwrap();
        assert!(fit.importances[0] > 0.9, "{:?}", fit.importances);
        assert!((fit.importances.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(fit.oob_r_squared.unwrap() > 0.8);
        assert!((fit.predict(&[0.1, 3.0]) - 1.0).abs() < 0.5);
    }

    #[test]
    fn same_seed_same_forest() {
        let (x, y) = step_data();
        let opts = ForestOptions {
            n_trees: 20,
            ..ForestOptions::default()
        };
        let a = fit_forest(&x, &y, None, &opts).unwrap();
        let b = fit_forest(&x, &y, None, &opts).unwrap();
        assert_eq!(a.importances, b.importances);
        assert_eq!(a.oob_r_squared, b.oob_r_squared);
    }

    #[test]
    fn top_features_orders_by_importance() {
        let names = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        assert_eq!(top_features(&names, &[0.2, 0.5, 0.3], 2), vec!["b", "c"]);
    }

    #[test]
    fn rejects_ragged_rows() {
        let x = vec![vec![1.0, 2.0], vec![1.0]];
        assert!(fit_forest(&x, &[1.0, 2.0], None, &ForestOptions::default()).is_err());
    }
}
