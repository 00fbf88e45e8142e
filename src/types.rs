//! Core types for the Airdrum pipeline
//!
//! This module defines the values that flow through each stage of the
//! pipeline: IMU samples, classifier outputs and the discrete events that are
//! sent to the playback host.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::{CLASS_COUNT, FEATURES_PER_SAMPLE};

/// Physical input stream (one per drum stick)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Left,
    Right,
}

impl Channel {
    /// Both channels in wire-id order
    pub const ALL: [Channel; 2] = [Channel::Left, Channel::Right];

    /// Numeric id used on the wire and in sample lines
    pub fn id(&self) -> u8 {
        match self {
            Channel::Left => 0,
            Channel::Right => 1,
        }
    }

    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(Channel::Left),
            1 => Some(Channel::Right),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Left => "left",
            Channel::Right => "right",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Index of a gesture class produced by a decision tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct ClassId(u8);

impl ClassId {
    /// Every class, in index order
    pub const ALL: [ClassId; CLASS_COUNT] = [ClassId(0), ClassId(1), ClassId(2)];

    /// Returns `None` when `id` is not a valid class index
    pub const fn new(id: u8) -> Option<Self> {
        if (id as usize) < CLASS_COUNT {
            Some(ClassId(id))
        } else {
            None
        }
    }

    pub const fn id(&self) -> u8 {
        self.0
    }

    pub const fn index(&self) -> usize {
        self.0 as usize
    }
}

impl TryFrom<u8> for ClassId {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        ClassId::new(value).ok_or_else(|| format!("class id {} out of range", value))
    }
}

impl From<ClassId> for u8 {
    fn from(class: ClassId) -> Self {
        class.0
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One IMU reading: 3-axis acceleration followed by 3-axis angular rate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample([f64; FEATURES_PER_SAMPLE]);

impl Sample {
    pub fn new(values: [f64; FEATURES_PER_SAMPLE]) -> Self {
        Sample(values)
    }

    /// Build a sample from separate accelerometer and gyroscope triples
    pub fn from_axes(accel: [f64; 3], gyro: [f64; 3]) -> Self {
        Sample([accel[0], accel[1], accel[2], gyro[0], gyro[1], gyro[2]])
    }

    pub fn values(&self) -> &[f64; FEATURES_PER_SAMPLE] {
        &self.0
    }

    pub fn accel(&self) -> [f64; 3] {
        [self.0[0], self.0[1], self.0[2]]
    }

    pub fn gyro(&self) -> [f64; 3] {
        [self.0[3], self.0[4], self.0[5]]
    }
}

/// Per-class scores returned by a decision tree leaf.
///
/// Scores are non-negative but degenerate leaves need not sum to exactly 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassificationOutput(pub [f64; CLASS_COUNT]);

impl ClassificationOutput {
    pub fn scores(&self) -> &[f64; CLASS_COUNT] {
        &self.0
    }

    /// Winning class. Ties go to the lowest index.
    pub fn argmax(&self) -> ClassId {
        let mut best = 0;
        for i in 1..CLASS_COUNT {
            if self.0[i] > self.0[best] {
                best = i;
            }
        }
        ClassId(best as u8)
    }

    pub fn score(&self, class: ClassId) -> f64 {
        self.0[class.index()]
    }
}

/// A classified gesture ready to be sent to the playback host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Unique identifier (local only, never sent on the wire)
    pub id: Uuid,
    /// Stream that produced the gesture
    pub channel: Channel,
    /// Winning class
    pub class: ClassId,
    /// Score of the winning class
    pub score: f64,
    /// Wall-clock time the event was emitted
    pub timestamp: DateTime<Utc>,
}

impl Event {
    /// Create a new event with a generated id
    pub fn new(channel: Channel, class: ClassId, score: f64, timestamp: DateTime<Utc>) -> Self {
        Event {
            id: Uuid::new_v4(),
            channel,
            class,
            score,
            timestamp,
        }
    }
}
