//! Motion gating
//!
//! Suppresses classifier decisions while the stick is not moving hard enough.
//! The default score is the total absolute difference between neighbouring
//! features of the newest sample. It measures spread within one reading, not
//! motion over time; `GateMode::Window` offers the inter-sample variant.

use serde::{Deserialize, Serialize};

use crate::types::Sample;
use crate::window::FeatureWindow;
use crate::FEATURES_PER_SAMPLE;

/// Default motion threshold
pub const DEFAULT_VARIATION_THRESHOLD: f64 = 60.0;

/// Which motion score the gate compares against its threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateMode {
    /// Successive feature differences within the newest sample
    #[default]
    Row,
    /// Successive time differences per feature across the whole window
    Window,
}

/// Sum of |c[i] - c[i-1]| over the sample's features
pub fn variation(sample: &Sample) -> f64 {
    let values = sample.values();
    (1..FEATURES_PER_SAMPLE)
        .map(|i| (values[i] - values[i - 1]).abs())
        .sum()
}

/// Sum over features of |w[t][c] - w[t-1][c]| across the window
pub fn window_variation(window: &FeatureWindow) -> f64 {
    let mut total = 0.0;
    let mut previous: Option<&Sample> = None;
    for sample in window.iter() {
        if let Some(prev) = previous {
            for c in 0..FEATURES_PER_SAMPLE {
                total += (sample.values()[c] - prev.values()[c]).abs();
            }
        }
        previous = Some(sample);
    }
    total
}

/// True iff `variation(sample)` is strictly above `threshold`
pub fn passes(sample: &Sample, threshold: f64) -> bool {
    variation(sample) > threshold
}

/// Configured motion gate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VariationGate {
    pub threshold: f64,
    pub mode: GateMode,
}

impl Default for VariationGate {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_VARIATION_THRESHOLD,
            mode: GateMode::Row,
        }
    }
}

impl VariationGate {
    pub fn new(threshold: f64, mode: GateMode) -> Self {
        Self { threshold, mode }
    }

    /// Motion score for the current window state
    pub fn score(&self, window: &FeatureWindow) -> f64 {
        match self.mode {
            GateMode::Row => window.latest().map(variation).unwrap_or(0.0),
            GateMode::Window => window_variation(window),
        }
    }

    /// Whether the window shows enough motion to emit an event
    pub fn is_open(&self, window: &FeatureWindow) -> bool {
        self.score(window) > self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variation_sums_neighbour_differences() {
        let sample = Sample::new([0.0, 10.0, 5.0, 5.0, -20.0, 0.0]);
        // 10 + 5 + 0 + 25 + 20
        assert!((variation(&sample) - 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_threshold_is_strict() {
        let sample = Sample::new([0.0, 10.0, 5.0, 5.0, -20.0, 0.0]);
        assert!(!passes(&sample, 60.0));
        assert!(passes(&sample, 59.9));
    }

    #[test]
    fn test_flat_sample_has_no_variation() {
        let sample = Sample::new([3.0; 6]);
        assert_eq!(variation(&sample), 0.0);
    }

    #[test]
    fn test_window_variation_measures_time() {
        let mut window = FeatureWindow::new(3);
        window.push(Sample::new([0.0; 6]));
        window.push(Sample::new([1.0; 6]));
        window.push(Sample::new([3.0; 6]));
        // 6 * 1 + 6 * 2, while every row is flat
        assert!((window_variation(&window) - 18.0).abs() < 1e-9);
        assert_eq!(variation(window.latest().unwrap()), 0.0);
    }

    #[test]
    fn test_gate_modes() {
        let mut window = FeatureWindow::new(2);
        window.push(Sample::new([0.0; 6]));
        window.push(Sample::new([50.0; 6]));

        let row_gate = VariationGate::new(60.0, GateMode::Row);
        let window_gate = VariationGate::new(60.0, GateMode::Window);
        assert!(!row_gate.is_open(&window));
        assert!(window_gate.is_open(&window));
    }
}
