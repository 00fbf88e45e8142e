//! Gesture classification
//!
//! A classifier maps one flattened window to per-class scores. The shipped
//! classifiers are static decision trees; each channel picks its own by name.

mod builtin;
mod tree;

pub use builtin::{TreeLibrary, LEFT, LEFT_STICK, RIGHT, RIGHT_2};
pub use tree::{Child, DecisionTree, Split, TreeSummary};

use crate::types::ClassificationOutput;
use std::fmt::Debug;

/// Trait for per-window gesture classifiers
pub trait Classifier: Debug + Send + Sync {
    /// Identifier used in logs and configuration
    fn name(&self) -> &str;

    /// Minimum number of flattened inputs `classify` reads
    fn input_len(&self) -> usize;

    /// Score one flattened window. Must be pure and deterministic.
    fn classify(&self, input: &[f64]) -> ClassificationOutput;
}
