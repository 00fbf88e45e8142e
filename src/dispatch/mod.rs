//! Playback dispatch: rule tables, voice state and audio backends

mod backend;
#[cfg(feature = "audio")]
mod device;
mod dispatcher;
mod rules;

pub use backend::{AudioBackend, AudioCommand, MemoryBackend, NullBackend};
#[cfg(feature = "audio")]
pub use device::RodioBackend;
pub use dispatcher::{DispatchOutcome, DispatchStats, Dispatcher, VoiceState};
pub use rules::{DispatchRule, DispatchRuleTable, KitFile};
