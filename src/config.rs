//! Runtime configuration
//!
//! Every field has a default, so a config file only needs the keys it
//! changes. The CLI layers its flags on top of whatever the file set.

use serde::{Deserialize, Serialize};
use std::fs;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::debounce::DEFAULT_COOLDOWN;
use crate::dispatch::DispatchRuleTable;
use crate::error::AirdrumError;
use crate::gate::{GateMode, DEFAULT_VARIATION_THRESHOLD};
use crate::pipeline::PipelineSettings;
use crate::types::Channel;
use crate::{DEFAULT_PORT, WINDOW_SIZE};

/// Classifier reference per channel: a built-in tree name or a JSON path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelTrees {
    pub left: String,
    pub right: String,
}

impl Default for ChannelTrees {
    fn default() -> Self {
        Self {
            left: "left_stick".to_string(),
            right: "left_stick".to_string(),
        }
    }
}

impl ChannelTrees {
    pub fn get(&self, channel: Channel) -> &str {
        match channel {
            Channel::Left => &self.left,
            Channel::Right => &self.right,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AirdrumConfig {
    pub variation_threshold: f64,
    pub gate_mode: GateMode,
    pub cooldown_ms: u64,
    /// Winning score required to emit; 0 disables the floor
    pub min_confidence: f64,
    pub trees: ChannelTrees,
    /// Where edge mode sends events
    pub host: String,
    /// Where receive and host modes listen
    pub bind: String,
    /// Dispatch table JSON; the built-in kit is used when absent
    pub rules: Option<PathBuf>,
    /// Asset directory for the built-in kit
    pub sound_dir: PathBuf,
}

impl Default for AirdrumConfig {
    fn default() -> Self {
        Self {
            variation_threshold: DEFAULT_VARIATION_THRESHOLD,
            gate_mode: GateMode::Row,
            cooldown_ms: DEFAULT_COOLDOWN.as_millis() as u64,
            min_confidence: 0.0,
            trees: ChannelTrees::default(),
            host: format!("127.0.0.1:{DEFAULT_PORT}"),
            bind: format!("0.0.0.0:{DEFAULT_PORT}"),
            rules: None,
            sound_dir: PathBuf::from("sound"),
        }
    }
}

impl AirdrumConfig {
    pub fn from_json(json: &str) -> Result<Self, AirdrumError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, AirdrumError> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Defaults when `path` is `None`
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, AirdrumError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), AirdrumError> {
        if !self.variation_threshold.is_finite() || self.variation_threshold < 0.0 {
            return Err(AirdrumError::Config(format!(
                "variation_threshold must be a non-negative number, got {}",
                self.variation_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(AirdrumError::Config(format!(
                "min_confidence must be within [0, 1], got {}",
                self.min_confidence
            )));
        }
        for channel in Channel::ALL {
            if self.trees.get(channel).trim().is_empty() {
                return Err(AirdrumError::Config(format!("no tree configured for {channel}")));
            }
        }
        resolve_addr("host", &self.host)?;
        resolve_addr("bind", &self.bind)?;
        Ok(())
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            window_size: WINDOW_SIZE,
            variation_threshold: self.variation_threshold,
            gate_mode: self.gate_mode,
            cooldown: self.cooldown(),
            min_confidence: self.min_confidence,
        }
    }

    pub fn host_addr(&self) -> Result<SocketAddr, AirdrumError> {
        resolve_addr("host", &self.host)
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, AirdrumError> {
        resolve_addr("bind", &self.bind)
    }

    /// The configured dispatch table, or the built-in kit under `sound_dir`
    pub fn rule_table(&self) -> Result<DispatchRuleTable, AirdrumError> {
        match &self.rules {
            Some(path) => DispatchRuleTable::load(path),
            None => Ok(DispatchRuleTable::default_kit(&self.sound_dir)),
        }
    }
}

fn resolve_addr(field: &str, value: &str) -> Result<SocketAddr, AirdrumError> {
    value
        .to_socket_addrs()
        .ok()
        .and_then(|mut addrs| addrs.next())
        .ok_or_else(|| AirdrumError::Config(format!("{field} is not a socket address: {value:?}")))
}
