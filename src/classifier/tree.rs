//! Data-driven binary decision tree
//!
//! Internal nodes test one input feature against a threshold (`<=` goes
//! left); leaves carry a fixed per-class score vector. Trees are stored as flat
//! node and leaf arrays so one traversal loop serves every stick.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use crate::classifier::Classifier;
use crate::error::AirdrumError;
use crate::types::ClassificationOutput;
use crate::CLASS_COUNT;

/// Reference from a split to one of its children
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "index")]
pub enum Child {
    Node(usize),
    Leaf(usize),
}

/// Internal node: `input[feature] <= threshold` selects `left`, otherwise `right`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Split {
    pub feature: usize,
    pub threshold: f64,
    pub left: Child,
    pub right: Child,
}

impl Split {
    pub const fn new(feature: usize, threshold: f64, left: Child, right: Child) -> Self {
        Split {
            feature,
            threshold,
            left,
            right,
        }
    }
}

/// A validated decision tree.
///
/// The root is `nodes[0]`, or `leaves[0]` for a tree without splits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    name: String,
    /// Width of the flattened input the tree was trained on
    input_len: usize,
    nodes: Vec<Split>,
    leaves: Vec<[f64; CLASS_COUNT]>,
}

/// Shape summary used by the CLI and doctor checks
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TreeSummary {
    pub name: String,
    pub input_len: usize,
    pub splits: usize,
    pub leaves: usize,
    pub depth: usize,
    pub features: Vec<usize>,
}

impl DecisionTree {
    /// Build and validate a tree
    pub fn new(
        name: impl Into<String>,
        input_len: usize,
        nodes: Vec<Split>,
        leaves: Vec<[f64; CLASS_COUNT]>,
    ) -> Result<Self, AirdrumError> {
        let tree = DecisionTree {
            name: name.into(),
            input_len,
            nodes,
            leaves,
        };
        tree.validate()?;
        Ok(tree)
    }

    /// Parse and validate a tree from JSON
    pub fn from_json(json: &str) -> Result<Self, AirdrumError> {
        let tree: DecisionTree = serde_json::from_str(json)?;
        tree.validate()?;
        Ok(tree)
    }

    /// Load a tree exported with `to_json`
    pub fn load(path: &Path) -> Result<Self, AirdrumError> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn to_json(&self) -> Result<String, AirdrumError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    fn root(&self) -> Child {
        if self.nodes.is_empty() {
            Child::Leaf(0)
        } else {
            Child::Node(0)
        }
    }

    /// Check that the arrays form a single tree rooted at index 0.
    ///
    /// Every split and leaf must be reached exactly once from the root, every
    /// feature must fall inside the input, and leaf scores must be finite and
    /// non-negative.
    pub fn validate(&self) -> Result<(), AirdrumError> {
        let invalid = |msg: String| AirdrumError::InvalidTree(format!("{}: {}", self.name, msg));

        if self.leaves.is_empty() {
            return Err(invalid("tree has no leaves".to_string()));
        }

        for (i, split) in self.nodes.iter().enumerate() {
            if split.feature >= self.input_len {
                return Err(invalid(format!(
                    "node {} tests feature {} but input has {} values",
                    i, split.feature, self.input_len
                )));
            }
            if !split.threshold.is_finite() {
                return Err(invalid(format!("node {} has a non-finite threshold", i)));
            }
        }

        for (i, leaf) in self.leaves.iter().enumerate() {
            if leaf.iter().any(|v| !v.is_finite() || *v < 0.0) {
                return Err(invalid(format!("leaf {} has a negative or non-finite score", i)));
            }
        }

        let mut seen_nodes = vec![false; self.nodes.len()];
        let mut seen_leaves = vec![false; self.leaves.len()];
        let mut stack = vec![self.root()];

        while let Some(child) = stack.pop() {
            match child {
                Child::Node(i) => {
                    let split = self
                        .nodes
                        .get(i)
                        .ok_or_else(|| invalid(format!("reference to missing node {}", i)))?;
                    if seen_nodes[i] {
                        return Err(invalid(format!("node {} is reached more than once", i)));
                    }
                    seen_nodes[i] = true;
                    stack.push(split.right);
                    stack.push(split.left);
                }
                Child::Leaf(i) => {
                    if i >= self.leaves.len() {
                        return Err(invalid(format!("reference to missing leaf {}", i)));
                    }
                    if seen_leaves[i] {
                        return Err(invalid(format!("leaf {} is reached more than once", i)));
                    }
                    seen_leaves[i] = true;
                }
            }
        }

        if let Some(i) = seen_nodes.iter().position(|seen| !seen) {
            return Err(invalid(format!("node {} is unreachable", i)));
        }
        if let Some(i) = seen_leaves.iter().position(|seen| !seen) {
            return Err(invalid(format!("leaf {} is unreachable", i)));
        }

        Ok(())
    }

    /// Walk the tree for one flattened window.
    ///
    /// # Panics
    /// Panics if `input` is shorter than the tree's input width.
    pub fn evaluate(&self, input: &[f64]) -> ClassificationOutput {
        assert!(
            input.len() >= self.input_len,
            "tree {} expects {} inputs, got {}",
            self.name,
            self.input_len,
            input.len()
        );

        let mut cursor = self.root();
        loop {
            match cursor {
                Child::Leaf(i) => return ClassificationOutput(self.leaves[i]),
                Child::Node(i) => {
                    let split = &self.nodes[i];
                    cursor = if input[split.feature] <= split.threshold {
                        split.left
                    } else {
                        split.right
                    };
                }
            }
        }
    }

    /// Longest root-to-leaf path counted in splits
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut stack = vec![(self.root(), 0usize)];
        while let Some((child, depth)) = stack.pop() {
            match child {
                Child::Leaf(_) => deepest = deepest.max(depth),
                Child::Node(i) => {
                    let split = &self.nodes[i];
                    stack.push((split.left, depth + 1));
                    stack.push((split.right, depth + 1));
                }
            }
        }
        deepest
    }

    pub fn summary(&self) -> TreeSummary {
        let features: BTreeSet<usize> = self.nodes.iter().map(|s| s.feature).collect();
        TreeSummary {
            name: self.name.clone(),
            input_len: self.input_len,
            splits: self.nodes.len(),
            leaves: self.leaves.len(),
            depth: self.depth(),
            features: features.into_iter().collect(),
        }
    }
}

impl Classifier for DecisionTree {
    fn name(&self) -> &str {
        &self.name
    }

    fn input_len(&self) -> usize {
        self.input_len
    }

    fn classify(&self, input: &[f64]) -> ClassificationOutput {
        self.evaluate(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn stump() -> DecisionTree {
        DecisionTree::new(
            "stump",
            4,
            vec![
                Split::new(2, 0.5, Child::Node(1), Child::Leaf(2)),
                Split::new(0, -1.0, Child::Leaf(0), Child::Leaf(1)),
            ],
            vec![[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.4, 0.6]],
        )
        .unwrap()
    }

    #[test]
    fn test_threshold_is_inclusive_left() {
        let tree = stump();
        assert_eq!(tree.evaluate(&[-1.0, 0.0, 0.5, 0.0]).0, [1.0, 0.0, 0.0]);
        assert_eq!(tree.evaluate(&[0.0, 0.0, 0.5, 0.0]).0, [0.0, 1.0, 0.0]);
        assert_eq!(tree.evaluate(&[0.0, 0.0, 0.51, 0.0]).0, [0.0, 0.4, 0.6]);
    }

    #[test]
    fn test_single_leaf_tree() {
        let tree = DecisionTree::new("constant", 1, vec![], vec![[0.2, 0.3, 0.5]]).unwrap();
        assert_eq!(tree.evaluate(&[42.0]).0, [0.2, 0.3, 0.5]);
        assert_eq!(tree.depth(), 0);
    }

    #[test]
    fn test_rejects_feature_outside_input() {
        let result = DecisionTree::new(
            "wide",
            2,
            vec![Split::new(5, 0.0, Child::Leaf(0), Child::Leaf(1))],
            vec![[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
        );
        assert!(matches!(result, Err(AirdrumError::InvalidTree(_))));
    }

    #[test]
    fn test_rejects_cycle() {
        let result = DecisionTree::new(
            "cycle",
            2,
            vec![
                Split::new(0, 0.0, Child::Node(1), Child::Leaf(0)),
                Split::new(1, 0.0, Child::Node(0), Child::Leaf(1)),
            ],
            vec![[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
        );
        assert!(matches!(result, Err(AirdrumError::InvalidTree(_))));
    }

    #[test]
    fn test_rejects_unreachable_leaf() {
        let result = DecisionTree::new(
            "orphan",
            2,
            vec![Split::new(0, 0.0, Child::Leaf(0), Child::Leaf(1))],
            vec![[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
        );
        assert!(matches!(result, Err(AirdrumError::InvalidTree(_))));
    }

    #[test]
    fn test_rejects_negative_score() {
        let result = DecisionTree::new("neg", 1, vec![], vec![[-0.1, 0.5, 0.6]]);
        assert!(matches!(result, Err(AirdrumError::InvalidTree(_))));
    }

    #[test]
    fn test_json_export_and_reload() {
        let tree = stump();
        let json = tree.to_json().unwrap();
        let loaded = DecisionTree::from_json(&json).unwrap();
        assert_eq!(loaded, tree);
    }

    #[test]
    fn test_from_json_validates() {
        let json = r#"{
            "name": "broken",
            "input_len": 3,
            "nodes": [
                { "feature": 0, "threshold": 0.0,
                  "left": { "kind": "leaf", "index": 0 },
                  "right": { "kind": "leaf", "index": 4 } }
            ],
            "leaves": [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]
        }"#;
        assert!(DecisionTree::from_json(json).is_err());
    }

    #[test]
    #[should_panic(expected = "expects 4 inputs")]
    fn test_short_input_panics() {
        stump().evaluate(&[0.0, 1.0]);
    }

    #[test]
    fn test_summary() {
        let summary = stump().summary();
        assert_eq!(summary.splits, 2);
        assert_eq!(summary.leaves, 3);
        assert_eq!(summary.depth, 2);
        assert_eq!(summary.features, vec![0, 2]);
    }
}
