//! Binary decision trees in parallel-array form
//!
//! Node `i` is a leaf when `children_left[i] == -1`. Otherwise the walk goes
//! left when `x[feature[i]] <= threshold[i]`, right otherwise.

use ndarray::ArrayView1;
use serde::Deserialize;

use crate::error::ModelLoadError;

const LEAF: i64 = -1;

/// One exported tree
#[derive(Debug, Clone, Deserialize)]
pub struct DecisionTree {
    pub children_left: Vec<i64>,
    pub children_right: Vec<i64>,
    pub feature: Vec<i64>,
    pub threshold: Vec<f64>,
    /// Per-node output: class counts/weights for classifiers, `[value]` for
    /// regressors
    pub value: Vec<Vec<f64>>,
}

impl DecisionTree {
    pub fn node_count(&self) -> usize {
        self.children_left.len()
    }

    /// Check array lengths, child links and feature indices
    ///
    /// Children must point strictly forward so every walk terminates.
    /// `n_outputs` is the required length of each node's value row.
    pub fn validate(&self, n_features: usize, n_outputs: usize) -> Result<(), ModelLoadError> {
        let n = self.node_count();
        if n == 0 {
            return Err(ModelLoadError::Invalid("tree has no nodes".to_string()));
        }
        if self.children_right.len() != n
            || self.feature.len() != n
            || self.threshold.len() != n
            || self.value.len() != n
        {
            return Err(ModelLoadError::Invalid(format!(
                "tree arrays disagree on node count ({} nodes)",
                n
            )));
        }

        for i in 0..n {
            let (left, right) = (self.children_left[i], self.children_right[i]);

            if self.value[i].len() != n_outputs {
                return Err(ModelLoadError::Invalid(format!(
                    "node {} has {} outputs, expected {}",
                    i,
                    self.value[i].len(),
                    n_outputs
                )));
            }

            if left == LEAF {
                if right != LEAF {
                    return Err(ModelLoadError::Invalid(format!(
                        "node {} has only a right child",
                        i
                    )));
                }
                continue;
            }

            for child in [left, right] {
                if child <= i as i64 || child >= n as i64 {
                    return Err(ModelLoadError::Invalid(format!(
                        "node {} links to invalid child {}",
                        i, child
                    )));
                }
            }

            let feature = self.feature[i];
            if feature < 0 || feature as usize >= n_features {
                return Err(ModelLoadError::Invalid(format!(
                    "node {} splits on feature {} (model has {})",
                    i, feature, n_features
                )));
            }
        }

        Ok(())
    }

    /// Output row of the leaf `x` lands in
    ///
    /// Assumes the tree passed [`validate`](Self::validate).
    pub fn leaf_value(&self, x: ArrayView1<'_, f64>) -> &[f64] {
        let mut node = 0usize;
        while self.children_left[node] != LEAF {
            let feature = self.feature[node] as usize;
            node = if x[feature] <= self.threshold[node] {
                self.children_left[node] as usize
            } else {
                self.children_right[node] as usize
            };
        }
        &self.value[node]
    }
}
