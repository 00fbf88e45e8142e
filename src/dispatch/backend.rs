//! Audio output abstraction
//!
//! The dispatcher talks to a backend by asset name. A real device backend
//! lives behind the `audio` feature; the null and memory backends cover
//! headless hosts and tests.

use std::collections::BTreeSet;

use tracing::info;

use crate::error::AirdrumError;

/// Sound output addressed by asset name
pub trait AudioBackend {
    /// Short identifier for logs
    fn name(&self) -> &'static str;

    /// Start `asset` from its beginning at full volume, replacing any
    /// playback of the same asset already in progress
    fn play(&mut self, asset: &str) -> Result<(), AirdrumError>;

    /// Stop `asset`. Stopping a silent asset is a no-op.
    fn stop(&mut self, asset: &str);
}

/// Logs what would be played; used when no audio device is compiled in
#[derive(Debug, Default, Clone, Copy)]
pub struct NullBackend;

impl AudioBackend for NullBackend {
    fn name(&self) -> &'static str {
        "null"
    }

    fn play(&mut self, asset: &str) -> Result<(), AirdrumError> {
        info!(asset, "play");
        Ok(())
    }

    fn stop(&mut self, _asset: &str) {}
}

/// A command observed by `MemoryBackend`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioCommand {
    Play(String),
    Stop(String),
}

/// Records every command and tracks which assets are sounding
#[derive(Debug, Default, Clone)]
pub struct MemoryBackend {
    commands: Vec<AudioCommand>,
    playing: BTreeSet<String>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> &[AudioCommand] {
        &self.commands
    }

    pub fn is_playing(&self, asset: &str) -> bool {
        self.playing.contains(asset)
    }

    pub fn playing(&self) -> impl Iterator<Item = &str> {
        self.playing.iter().map(String::as_str)
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }
}

impl AudioBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn play(&mut self, asset: &str) -> Result<(), AirdrumError> {
        self.commands.push(AudioCommand::Play(asset.to_string()));
        self.playing.insert(asset.to_string());
        Ok(())
    }

    fn stop(&mut self, asset: &str) {
        self.commands.push(AudioCommand::Stop(asset.to_string()));
        self.playing.remove(asset);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_memory_backend_tracks_voices() {
        let mut backend = MemoryBackend::new();
        backend.play("snare").unwrap();
        backend.play("hihat").unwrap();
        backend.stop("snare");
        backend.stop("snare");

        assert!(!backend.is_playing("snare"));
        assert!(backend.is_playing("hihat"));
        assert_eq!(backend.playing().collect::<Vec<_>>(), vec!["hihat"]);
        assert_eq!(backend.commands().len(), 4);
    }

    #[test]
    fn test_null_backend_accepts_anything() {
        let mut backend = NullBackend;
        assert!(backend.play("missing").is_ok());
        backend.stop("missing");
        assert_eq!(backend.name(), "null");
    }
}
