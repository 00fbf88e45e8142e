//! Sliding feature window
//!
//! Each channel keeps the most recent `WINDOW_SIZE` samples in arrival order.
//! Once the window is full it can be flattened into the row-major vector the
//! decision trees consume.

use std::collections::VecDeque;

use crate::types::Sample;
use crate::{FEATURES_PER_SAMPLE, WINDOW_SIZE};

/// Fixed-capacity FIFO of recent samples
#[derive(Debug, Clone)]
pub struct FeatureWindow {
    samples: VecDeque<Sample>,
    capacity: usize,
}

impl Default for FeatureWindow {
    fn default() -> Self {
        Self::new(WINDOW_SIZE)
    }
}

impl FeatureWindow {
    /// Create a window holding at most `capacity` samples
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "window capacity must be non-zero");
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a sample, evicting the oldest one when already at capacity
    pub fn push(&mut self, sample: Sample) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn is_full(&self) -> bool {
        self.samples.len() == self.capacity
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Most recently pushed sample
    pub fn latest(&self) -> Option<&Sample> {
        self.samples.back()
    }

    /// Samples from oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }

    /// Row-major projection of the window (sample-major, feature-minor).
    ///
    /// # Panics
    /// Panics if the window is not full. Callers must check `is_full()` first.
    pub fn flatten(&self) -> Vec<f64> {
        assert!(
            self.is_full(),
            "flatten called on a window holding {} of {} samples",
            self.samples.len(),
            self.capacity
        );

        let mut flat = Vec::with_capacity(self.capacity * FEATURES_PER_SAMPLE);
        for sample in &self.samples {
            flat.extend_from_slice(sample.values());
        }
        flat
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}
