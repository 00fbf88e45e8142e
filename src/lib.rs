//! Airdrum - gesture-to-drum engine for IMU drumsticks
//!
//! Each stick streams six-axis IMU samples (accelerometer + gyroscope).
//! A stick's samples flow through a deterministic pipeline: sliding window
//! → decision-tree classifier → motion gate → confidence floor → cooldown
//! → event. Events travel as tiny UDP datagrams to a host that maps them
//! onto drum sounds, cutting off whichever sounds the kit says to choke.
//!
//! ## Roles
//!
//! - **Edge**: runs one stick's pipeline and sends events (`runtime::run_edge`)
//! - **Receiver**: turns event datagrams into playback (`runtime::run_receiver`)
//! - **Host**: classifies raw samples from both sticks locally (`runtime::run_host`)

pub mod classifier;
pub mod config;
pub mod debounce;
pub mod dispatch;
pub mod error;
pub mod gate;
pub mod ingest;
pub mod listener;
pub mod pipeline;
pub mod runtime;
pub mod telemetry;
pub mod transport;
pub mod types;
pub mod window;

pub use classifier::{Classifier, DecisionTree, TreeLibrary};
pub use config::AirdrumConfig;
pub use dispatch::{AudioBackend, DispatchRuleTable, Dispatcher, MemoryBackend, NullBackend};
pub use error::{AirdrumError, DecodeError, SampleError};
pub use pipeline::{ChannelPipeline, PipelineSettings, StickPair, Step};
pub use types::{Channel, ClassId, ClassificationOutput, Event, Sample};

/// Crate version, reported by the CLI and `doctor`
pub const AIRDRUM_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name used in reports
pub const PRODUCER_NAME: &str = "airdrum";

/// Samples per classification window
pub const WINDOW_SIZE: usize = 50;

/// Values per sample: ax, ay, az, gx, gy, gz
pub const FEATURES_PER_SAMPLE: usize = 6;

/// Gesture classes scored by every classifier
pub const CLASS_COUNT: usize = 3;

/// Length of a flattened full window
pub const FLATTENED_LEN: usize = WINDOW_SIZE * FEATURES_PER_SAMPLE;

/// UDP port shared by the edge sender and the host listener
pub const DEFAULT_PORT: u16 = 5005;
