//! Event-to-playback dispatch
//!
//! Each asset is a voice that is either silent or playing since some
//! instant. A mapped event stops the rule's cut-off voices, then restarts
//! its own voice from zero. There is no timed return to silence: a voice
//! stays "playing" until something stops it.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::dispatch::backend::AudioBackend;
use crate::dispatch::rules::DispatchRuleTable;
use crate::error::AirdrumError;
use crate::transport::EventSink;
use crate::types::{Channel, ClassId, Event};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceState {
    Silent,
    Playing { started_at: Instant },
}

impl VoiceState {
    pub fn is_playing(&self) -> bool {
        matches!(self, VoiceState::Playing { .. })
    }

    /// Time since the voice last (re)started, measured at `now`
    pub fn elapsed_at(&self, now: Instant) -> Option<Duration> {
        match self {
            VoiceState::Silent => None,
            VoiceState::Playing { started_at } => Some(now.saturating_duration_since(*started_at)),
        }
    }
}

/// What a single dispatch did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// `asset` was (re)started after stopping the listed voices
    Played { asset: String, stopped: Vec<String> },
    /// The rule matched but the backend refused to play
    Failed { asset: String },
    /// No rule for this (channel, class)
    Unmapped,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    pub received: u64,
    pub played: u64,
    pub restarted: u64,
    pub unmapped: u64,
    pub failed: u64,
}

/// Applies the rule table to incoming events
pub struct Dispatcher<B: AudioBackend> {
    rules: DispatchRuleTable,
    backend: B,
    voices: BTreeMap<String, VoiceState>,
    stats: DispatchStats,
}

impl<B: AudioBackend> Dispatcher<B> {
    pub fn new(rules: DispatchRuleTable, backend: B) -> Self {
        let voices = rules
            .assets()
            .keys()
            .map(|name| (name.clone(), VoiceState::Silent))
            .collect();
        Self {
            rules,
            backend,
            voices,
            stats: DispatchStats::default(),
        }
    }

    pub fn dispatch(&mut self, channel: Channel, class: ClassId) -> DispatchOutcome {
        self.dispatch_at(channel, class, Instant::now())
    }

    /// Dispatch with an explicit clock reading
    pub fn dispatch_at(&mut self, channel: Channel, class: ClassId, now: Instant) -> DispatchOutcome {
        self.stats.received += 1;

        let Some(rule) = self.rules.lookup(channel, class) else {
            self.stats.unmapped += 1;
            debug!(%channel, %class, "no rule for event, ignoring");
            return DispatchOutcome::Unmapped;
        };
        let asset = rule.play.clone();
        let cutoffs = rule.stop.clone();

        // Cut-offs are silenced before the new voice starts
        let mut stopped = Vec::new();
        for name in cutoffs {
            self.backend.stop(&name);
            if let Some(state) = self.voices.get_mut(&name) {
                if state.is_playing() {
                    stopped.push(name.clone());
                }
                *state = VoiceState::Silent;
            }
        }

        let was_playing = self.voice(&asset).is_playing();
        if let Err(e) = self.backend.play(&asset) {
            self.stats.failed += 1;
            warn!(%channel, %class, asset = %asset, error = %e, "playback failed");
            return DispatchOutcome::Failed { asset };
        }

        self.voices
            .insert(asset.clone(), VoiceState::Playing { started_at: now });
        self.stats.played += 1;
        if was_playing {
            self.stats.restarted += 1;
        }
        debug!(%channel, %class, asset = %asset, restarted = was_playing, ?stopped, "dispatched");

        DispatchOutcome::Played { asset, stopped }
    }

    pub fn voice(&self, asset: &str) -> VoiceState {
        self.voices.get(asset).copied().unwrap_or(VoiceState::Silent)
    }

    pub fn rules(&self) -> &DispatchRuleTable {
        &self.rules
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }

    pub fn log_summary(&self) {
        let s = &self.stats;
        info!(
            backend = self.backend.name(),
            received = s.received,
            played = s.played,
            restarted = s.restarted,
            unmapped = s.unmapped,
            failed = s.failed,
            "dispatcher summary"
        );
    }
}

/// Local delivery: emitted events go straight to playback
impl<B: AudioBackend> EventSink for Dispatcher<B> {
    fn send(&mut self, event: &Event) -> Result<(), AirdrumError> {
        self.dispatch(event.channel, event.class);
        Ok(())
    }
}

impl<B: AudioBackend + std::fmt::Debug> std::fmt::Debug for Dispatcher<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("kit", &self.rules.name())
            .field("backend", &self.backend)
            .field("voices", &self.voices)
            .finish()
    }
}
