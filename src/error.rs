//! Error types for Airdrum

use thiserror::Error;

/// Errors that can occur while configuring or running the pipeline
#[derive(Debug, Error)]
pub enum AirdrumError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid decision tree: {0}")]
    InvalidTree(String),

    #[error("Unknown decision tree: {0}")]
    UnknownTree(String),

    #[error("Invalid dispatch rule: {0}")]
    InvalidRule(String),

    #[error("Failed to load sound asset {path}: {reason}")]
    AssetLoad { path: String, reason: String },

    #[error("Audio device error: {0}")]
    Audio(String),
}

/// A sensor line that could not be turned into a sample
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SampleError {
    #[error("Expected {expected} fields, got {actual}")]
    FieldCount { expected: usize, actual: usize },

    #[error("Field {index} is not a number: {value:?}")]
    NotNumeric { index: usize, value: String },

    #[error("Unknown side: {0}")]
    UnknownSide(String),
}

/// A datagram that could not be decoded into an event
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("Payload is not valid UTF-8")]
    NotUtf8,

    #[error("Expected 2 fields, got {0}")]
    FieldCount(usize),

    #[error("Field is not a number: {0:?}")]
    NotNumeric(String),

    #[error("Unknown channel id: {0}")]
    UnknownChannel(u8),

    #[error("Class id out of range: {0}")]
    UnknownClass(u8),
}
