//! Random-forest regression over bootstrap CART trees
//!
//! Trees use exact-greedy variance-reduction splits. Each tree draws its
//! bootstrap sample from its own seed (`seed + tree index`), so a forest is
//! reproducible for a given configuration.

use anyhow::{bail, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq)]
pub struct ForestConfig {
    pub n_trees: usize,
    /// `None` grows until leaves are pure or too small to split
    pub max_depth: Option<usize>,
    pub min_samples_leaf: usize,
    pub seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_trees: 200,
            max_depth: None,
            min_samples_leaf: 1,
            seed: 42,
        }
    }
}

/// Flat tree node; leaves carry a value, splits carry child indices
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub feature: usize,
    pub threshold: f64,
    pub left: u32,
    pub right: u32,
    pub value: Option<f64>,
}

impl Node {
    fn leaf(value: f64) -> Self {
        Self {
            feature: 0,
            threshold: 0.0,
            left: 0,
            right: 0,
            value: Some(value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    pub nodes: Vec<Node>,
}

impl RegressionTree {
    pub fn predict(&self, row: &[f64]) -> f64 {
        let mut idx = 0usize;
        // Bounded by node count so a malformed tree cannot loop forever
        for _ in 0..self.nodes.len() {
            let Some(node) = self.nodes.get(idx) else {
                return 0.0;
            };
            if let Some(v) = node.value {
                return v;
            }
            let x = row.get(node.feature).copied().unwrap_or(0.0);
            idx = if x <= node.threshold {
                node.left as usize
            } else {
                node.right as usize
            };
        }
        0.0
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], idx: usize) -> usize {
            match nodes.get(idx) {
                Some(n) if n.value.is_none() => {
                    1 + walk(nodes, n.left as usize).max(walk(nodes, n.right as usize))
                }
                _ => 0,
            }
        }
        walk(&self.nodes, 0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    pub trees: Vec<RegressionTree>,
}

impl RandomForest {
    pub fn fit(x: &[Vec<f64>], y: &[f64], config: &ForestConfig) -> Result<Self> {
        if x.is_empty() || x.len() != y.len() {
            bail!(
                "random forest needs matching non-empty inputs, got {} rows and {} targets",
                x.len(),
                y.len()
            );
        }
        if config.n_trees == 0 || config.min_samples_leaf == 0 {
            bail!("n_trees and min_samples_leaf must be positive");
        }

        let n = x.len();
        let trees = (0..config.n_trees)
            .map(|t| {
                let mut rng = StdRng::seed_from_u64(config.seed.wrapping_add(t as u64));
                let sample: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                TreeBuilder {
                    x,
                    y,
                    max_depth: config.max_depth,
                    min_samples_leaf: config.min_samples_leaf,
                }
                .build(sample)
            })
            .collect();

        Ok(Self { trees })
    }

    pub fn predict(&self, row: &[f64]) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        self.trees.iter().map(|t| t.predict(row)).sum::<f64>() / self.trees.len() as f64
    }
}

struct Split {
    feature: usize,
    threshold: f64,
    gain: f64,
}

struct TreeBuilder<'a> {
    x: &'a [Vec<f64>],
    y: &'a [f64],
    max_depth: Option<usize>,
    min_samples_leaf: usize,
}

impl TreeBuilder<'_> {
    fn build(&self, sample: Vec<usize>) -> RegressionTree {
        let mut nodes = Vec::new();
        self.build_node(sample, 0, &mut nodes);
        RegressionTree { nodes }
    }

    fn build_node(&self, indices: Vec<usize>, depth: usize, nodes: &mut Vec<Node>) -> u32 {
        let current = nodes.len() as u32;
        let mean = indices.iter().map(|&i| self.y[i]).sum::<f64>() / indices.len() as f64;

        let depth_reached = self.max_depth.is_some_and(|d| depth >= d);
        if depth_reached || indices.len() < 2 * self.min_samples_leaf {
            nodes.push(Node::leaf(mean));
            return current;
        }

        let Some(split) = self.find_best_split(&indices) else {
            nodes.push(Node::leaf(mean));
            return current;
        };

        let (left, right): (Vec<usize>, Vec<usize>) = indices
            .into_iter()
            .partition(|&i| self.x[i][split.feature] <= split.threshold);

        // Reserve the slot, children are patched in after recursion
        nodes.push(Node {
            feature: split.feature,
            threshold: split.threshold,
            left: 0,
            right: 0,
            value: None,
        });
        let left_idx = self.build_node(left, depth + 1, nodes);
        let right_idx = self.build_node(right, depth + 1, nodes);
        nodes[current as usize].left = left_idx;
        nodes[current as usize].right = right_idx;
        current
    }

    /// Exact-greedy search maximizing SSE reduction; the first best split found wins ties
    fn find_best_split(&self, indices: &[usize]) -> Option<Split> {
        let n = indices.len();
        let total_sum: f64 = indices.iter().map(|&i| self.y[i]).sum();
        let total_sq: f64 = indices.iter().map(|&i| self.y[i] * self.y[i]).sum();
        let parent_sse = total_sq - total_sum * total_sum / n as f64;
        if parent_sse <= 1e-12 {
            return None;
        }

        let feature_count = self.x[indices[0]].len();
        let mut best: Option<Split> = None;
        let mut sorted = indices.to_vec();

        for feature in 0..feature_count {
            sorted.sort_by(|&a, &b| self.x[a][feature].total_cmp(&self.x[b][feature]));

            let mut left_sum = 0.0;
            let mut left_sq = 0.0;
            for pos in 0..n - 1 {
                let yi = self.y[sorted[pos]];
                left_sum += yi;
                left_sq += yi * yi;

                let left_n = pos + 1;
                let right_n = n - left_n;
                if left_n < self.min_samples_leaf || right_n < self.min_samples_leaf {
                    continue;
                }
                let here = self.x[sorted[pos]][feature];
                let next = self.x[sorted[pos + 1]][feature];
                if here == next {
                    continue;
                }

                let right_sum = total_sum - left_sum;
                let right_sq = total_sq - left_sq;
                let sse = (left_sq - left_sum * left_sum / left_n as f64)
                    + (right_sq - right_sum * right_sum / right_n as f64);
                let gain = parent_sse - sse;

                if gain > 1e-12 && best.as_ref().map_or(true, |b| gain > b.gain) {
                    best = Some(Split {
                        feature,
                        threshold: (here + next) / 2.0,
                        gain,
                    });
                }
            }
        }

        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step_data() -> (Vec<Vec<f64>>, Vec<f64>) {
        let x: Vec<Vec<f64>> = (0..40).map(|i| vec![i as f64, (i % 3) as f64]).collect();
        let y = x.iter().map(|r| if r[0] < 20.0 { 5.0 } else { 15.0 }).collect();
        (x, y)
    }

    #[test]
    fn test_single_tree_learns_step() {
        let (x, y) = step_data();
        let builder = TreeBuilder {
            x: &x,
            y: &y,
            max_depth: Some(3),
            min_samples_leaf: 1,
        };
        let tree = builder.build((0..x.len()).collect());
        assert_eq!(tree.predict(&[3.0, 0.0]), 5.0);
        assert_eq!(tree.predict(&[33.0, 0.0]), 15.0);
        assert_eq!(tree.nodes[0].feature, 0);
        assert_eq!(tree.nodes[0].threshold, 19.5);
    }

    #[test]
    fn test_depth_limit() {
        let (x, y) = step_data();
        let config = ForestConfig {
            n_trees: 3,
            max_depth: Some(0),
            ..Default::default()
        };
        let forest = RandomForest::fit(&x, &y, &config).unwrap();
        assert!(forest.trees.iter().all(|t| t.nodes.len() == 1 && t.depth() == 0));
    }

    #[test]
    fn test_forest_is_reproducible() {
        let (x, y) = step_data();
        let config = ForestConfig {
            n_trees: 5,
            ..Default::default()
        };
        let a = RandomForest::fit(&x, &y, &config).unwrap();
        let b = RandomForest::fit(&x, &y, &config).unwrap();
        assert_eq!(a, b);
        let p = a.predict(&[35.0, 1.0]);
        assert!(p > 10.0, "prediction {}", p);
    }

    #[test]
    fn test_min_samples_leaf_respected() {
        let x: Vec<Vec<f64>> = (0..6).map(|i| vec![i as f64]).collect();
        let y = vec![0.0, 0.0, 0.0, 0.0, 0.0, 100.0];
        let builder = TreeBuilder {
            x: &x,
            y: &y,
            max_depth: None,
            min_samples_leaf: 3,
        };
        let tree = builder.build((0..6).collect());
        assert_eq!(tree.nodes[0].threshold, 2.5);
        assert_eq!(tree.nodes.len(), 3);
    }
}
