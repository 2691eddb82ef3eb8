//! Bagged regression trees over a single numeric feature.

use analysis_core::{stats, AnalysisError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Targets with a standard deviation below this (relative to their scale)
/// are treated as constant and rejected.
const MIN_RELATIVE_SPREAD: f64 = 1e-9;

#[derive(Debug, Clone, Copy)]
pub struct ForestConfig {
    pub trees: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            trees: 100,
            max_depth: 32,
            min_samples_split: 2,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Leaf(f64),
    Split {
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    fn predict(&self, x: f64) -> f64 {
        match self {
            Node::Leaf(value) => *value,
            Node::Split { threshold, left, right } => {
                if x <= *threshold {
                    left.predict(x)
                } else {
                    right.predict(x)
                }
            }
        }
    }
}

/// CART regression tree with squared-error splits.
#[derive(Debug, Clone)]
pub struct RegressionTree {
    root: Node,
}

impl RegressionTree {
    /// Fit on `(x, y)` samples. The slice is reordered in place.
    fn fit(samples: &mut [(f64, f64)], config: &ForestConfig) -> Self {
        samples.sort_by(|a, b| a.0.total_cmp(&b.0));
        Self {
            root: build_node(samples, 0, config),
        }
    }

    pub fn predict(&self, x: f64) -> f64 {
        self.root.predict(x)
    }
}

fn leaf_value(samples: &[(f64, f64)]) -> f64 {
    samples.iter().map(|s| s.1).sum::<f64>() / samples.len() as f64
}

/// `samples` must be sorted by x.
fn build_node(samples: &[(f64, f64)], depth: usize, config: &ForestConfig) -> Node {
    let value = leaf_value(samples);
    if samples.len() < config.min_samples_split || depth >= config.max_depth {
        return Node::Leaf(value);
    }
    if samples.iter().all(|s| s.1 == samples[0].1) {
        return Node::Leaf(value);
    }

    match best_split(samples) {
        Some(at) => {
            let threshold = (samples[at - 1].0 + samples[at].0) / 2.0;
            Node::Split {
                threshold,
                left: Box::new(build_node(&samples[..at], depth + 1, config)),
                right: Box::new(build_node(&samples[at..], depth + 1, config)),
            }
        }
        None => Node::Leaf(value),
    }
}

/// Index splitting `samples` into `[..at]` / `[at..]` with the lowest total
/// squared error. Splits only between distinct x values.
fn best_split(samples: &[(f64, f64)]) -> Option<usize> {
    let n = samples.len();
    let total_sum: f64 = samples.iter().map(|s| s.1).sum();
    let total_sq: f64 = samples.iter().map(|s| s.1 * s.1).sum();

    let mut left_sum = 0.0;
    let mut left_sq = 0.0;
    let mut best: Option<(usize, f64)> = None;

    for at in 1..n {
        let y = samples[at - 1].1;
        left_sum += y;
        left_sq += y * y;
        if samples[at - 1].0 == samples[at].0 {
            continue;
        }

        let left_n = at as f64;
        let right_n = (n - at) as f64;
        let right_sum = total_sum - left_sum;
        let right_sq = total_sq - left_sq;
        let sse = (left_sq - left_sum * left_sum / left_n) + (right_sq - right_sum * right_sum / right_n);

        if best.map_or(true, |(_, b)| sse < b) {
            best = Some((at, sse));
        }
    }
    best.map(|(at, _)| at)
}

/// Bootstrap-aggregated regression trees with a fixed seed, so identical
/// input always produces identical predictions.
#[derive(Debug, Clone)]
pub struct BaggedForest {
    trees: Vec<RegressionTree>,
}

impl BaggedForest {
    pub fn fit(xs: &[f64], ys: &[f64], config: &ForestConfig) -> Result<Self, AnalysisError> {
        if xs.len() != ys.len() {
            return Err(AnalysisError::InvalidData("x/y length mismatch".to_string()));
        }
        if xs.len() < config.min_samples_split.max(2) {
            return Err(AnalysisError::insufficient(config.min_samples_split.max(2), xs.len()));
        }
        if config.trees == 0 {
            return Err(AnalysisError::InvalidData("forest needs at least one tree".to_string()));
        }
        if ys.iter().any(|y| !y.is_finite()) {
            return Err(AnalysisError::InvalidData("non-finite target".to_string()));
        }

        let spread = stats::std_dev(ys).unwrap_or(0.0);
        let scale = stats::mean(ys).map_or(1.0, |m| m.abs().max(1.0));
        if spread <= MIN_RELATIVE_SPREAD * scale {
            return Err(AnalysisError::InvalidData("target has no variance".to_string()));
        }

        let samples: Vec<(f64, f64)> = xs.iter().copied().zip(ys.iter().copied()).collect();
        let n = samples.len();
        let mut rng = StdRng::seed_from_u64(config.seed);

        let trees = (0..config.trees)
            .map(|_| {
                // Bootstrap: sample N points WITH REPLACEMENT
                let mut sampled: Vec<(f64, f64)> = (0..n).map(|_| samples[rng.gen_range(0..n)]).collect();
                RegressionTree::fit(&mut sampled, config)
            })
            .collect();

        Ok(Self { trees })
    }

    pub fn predict(&self, x: f64) -> f64 {
        self.trees.iter().map(|t| t.predict(x)).sum::<f64>() / self.trees.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index(n: usize) -> Vec<f64> {
        (0..n).map(|i| i as f64).collect()
    }

    #[test]
    fn test_tree_fits_step_function() {
        let mut samples: Vec<(f64, f64)> = (0..10).map(|i| (i as f64, if i < 5 { 1.0 } else { 9.0 })).collect();
        let tree = RegressionTree::fit(&mut samples, &ForestConfig::default());
        assert_eq!(tree.predict(2.0), 1.0);
        assert_eq!(tree.predict(7.0), 9.0);
        assert_eq!(tree.predict(4.5), 1.0);
    }

    #[test]
    fn test_forest_is_deterministic() {
        let xs = index(60);
        let ys: Vec<f64> = xs.iter().map(|x| 100.0 + (x * 0.3).sin() * 5.0 + x * 0.1).collect();
        let config = ForestConfig::default();

        let a = BaggedForest::fit(&xs, &ys, &config).unwrap().predict(60.0);
        let b = BaggedForest::fit(&xs, &ys, &config).unwrap().predict(60.0);
        assert_eq!(a, b);
    }

    #[test]
    fn test_forest_extrapolates_flat_from_recent_values() {
        let xs = index(60);
        let ys: Vec<f64> = xs.iter().map(|x| 2.0 * x + 10.0).collect();
        let prediction = BaggedForest::fit(&xs, &ys, &ForestConfig::default()).unwrap().predict(60.0);

        // Trees cannot extrapolate past the largest training target
        assert!(prediction <= 128.0 + 1e-9);
        assert!(prediction > 100.0);
    }

    #[test]
    fn test_forest_rejects_constant_target() {
        let xs = index(60);
        let err = BaggedForest::fit(&xs, &[250.0; 60], &ForestConfig::default()).unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidData(_)));
    }

    #[test]
    fn test_forest_rejects_too_few_samples() {
        assert!(BaggedForest::fit(&[0.0], &[1.0], &ForestConfig::default()).is_err());
    }
}
