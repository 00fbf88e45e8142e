//! Dispatch rule table
//!
//! A kit names its sound assets and maps every (channel, class) pair to one
//! asset to play plus the assets it cuts off. Kits are plain JSON so one
//! pipeline can drive different physical sound sets.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::AirdrumError;
use crate::types::{Channel, ClassId};

/// One (channel, class) → playback action mapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchRule {
    pub channel: Channel,
    pub class: ClassId,
    /// Asset started from the beginning at full volume
    pub play: String,
    /// Assets stopped before `play` starts
    #[serde(default)]
    pub stop: Vec<String>,
}

/// Serialized kit layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KitFile {
    #[serde(default)]
    pub name: Option<String>,
    /// Asset name → file path (relative paths resolve against the kit file)
    pub assets: BTreeMap<String, PathBuf>,
    pub rules: Vec<DispatchRule>,
}

/// Validated, read-only dispatch table
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchRuleTable {
    name: String,
    assets: BTreeMap<String, PathBuf>,
    rules: HashMap<(Channel, ClassId), DispatchRule>,
}

impl DispatchRuleTable {
    /// Build a table, rejecting unknown assets and duplicate pairs
    pub fn new(
        name: impl Into<String>,
        assets: BTreeMap<String, PathBuf>,
        rules: Vec<DispatchRule>,
    ) -> Result<Self, AirdrumError> {
        let mut by_pair = HashMap::with_capacity(rules.len());

        for rule in rules {
            for asset in std::iter::once(&rule.play).chain(rule.stop.iter()) {
                if !assets.contains_key(asset) {
                    return Err(AirdrumError::InvalidRule(format!(
                        "({}, {}) refers to unknown asset {:?}",
                        rule.channel, rule.class, asset
                    )));
                }
            }

            let key = (rule.channel, rule.class);
            if by_pair.insert(key, rule).is_some() {
                return Err(AirdrumError::InvalidRule(format!(
                    "duplicate rule for ({}, {})",
                    key.0, key.1
                )));
            }
        }

        Ok(Self {
            name: name.into(),
            assets,
            rules: by_pair,
        })
    }

    /// Four-piece kit: left stick hi-hat/snare, right stick crash/floor tom.
    ///
    /// Class 1 is left unmapped on both sticks.
    pub fn default_kit(sound_dir: &Path) -> Self {
        let assets: BTreeMap<String, PathBuf> = [
            ("snare", "snare.mpeg"),
            ("hihat", "hihat.mpeg"),
            ("crash", "crash.mp3"),
            ("floortom", "kick.mp3"),
        ]
        .into_iter()
        .map(|(name, file)| (name.to_string(), sound_dir.join(file)))
        .collect();

        let [low, _, high] = ClassId::ALL;
        let rule = |channel, class: ClassId, play: &str, stop: &str| DispatchRule {
            channel,
            class,
            play: play.to_string(),
            stop: vec![stop.to_string()],
        };

        let rules = vec![
            rule(Channel::Left, high, "snare", "hihat"),
            rule(Channel::Left, low, "hihat", "snare"),
            rule(Channel::Right, low, "crash", "floortom"),
            rule(Channel::Right, high, "floortom", "crash"),
        ];

        let rules = rules.into_iter().map(|r| ((r.channel, r.class), r)).collect();
        Self {
            name: "default".to_string(),
            assets,
            rules,
        }
    }

    /// Parse a kit from JSON; relative asset paths resolve against `base_dir`
    pub fn from_json(json: &str, base_dir: &Path) -> Result<Self, AirdrumError> {
        let file: KitFile = serde_json::from_str(json)?;
        let assets = file
            .assets
            .into_iter()
            .map(|(name, path)| {
                let path = if path.is_relative() {
                    base_dir.join(path)
                } else {
                    path
                };
                (name, path)
            })
            .collect();
        Self::new(file.name.unwrap_or_else(|| "custom".to_string()), assets, file.rules)
    }

    pub fn load(path: &Path) -> Result<Self, AirdrumError> {
        let json = fs::read_to_string(path)?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_json(&json, base_dir)
    }

    pub fn to_kit_file(&self) -> KitFile {
        let mut rules: Vec<DispatchRule> = self.rules.values().cloned().collect();
        rules.sort_by_key(|r| (r.channel, r.class));
        KitFile {
            name: Some(self.name.clone()),
            assets: self.assets.clone(),
            rules,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn lookup(&self, channel: Channel, class: ClassId) -> Option<&DispatchRule> {
        self.rules.get(&(channel, class))
    }

    pub fn assets(&self) -> &BTreeMap<String, PathBuf> {
        &self.assets
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Assets whose file is missing on disk
    pub fn missing_assets(&self) -> Vec<(&str, &Path)> {
        self.assets
            .iter()
            .filter(|(_, path)| !path.exists())
            .map(|(name, path)| (name.as_str(), path.as_path()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    fn class(id: u8) -> ClassId {
        ClassId::new(id).unwrap()
    }

    #[test]
    fn test_default_kit_mapping() {
        let kit = DispatchRuleTable::default_kit(Path::new("sound"));
        assert_eq!(kit.len(), 4);

        let rule = kit.lookup(Channel::Left, class(2)).unwrap();
        assert_eq!(rule.play, "snare");
        assert_eq!(rule.stop, vec!["hihat".to_string()]);

        let rule = kit.lookup(Channel::Right, class(2)).unwrap();
        assert_eq!(rule.play, "floortom");
        assert_eq!(kit.assets()["floortom"], PathBuf::from("sound/kick.mp3"));

        assert!(kit.lookup(Channel::Left, class(1)).is_none());
        assert!(kit.lookup(Channel::Right, class(1)).is_none());
    }

    #[test]
    fn test_from_json_resolves_relative_paths() {
        let json = r#"{
            "name": "practice pad",
            "assets": { "pad": "pad.wav", "rim": "/opt/kits/rim.wav" },
            "rules": [
                { "channel": "left", "class": 0, "play": "pad", "stop": ["rim"] },
                { "channel": "right", "class": 1, "play": "rim" }
            ]
        }"#;
        let kit = DispatchRuleTable::from_json(json, Path::new("/kits")).unwrap();
        assert_eq!(kit.name(), "practice pad");
        assert_eq!(kit.assets()["pad"], PathBuf::from("/kits/pad.wav"));
        assert_eq!(kit.assets()["rim"], PathBuf::from("/opt/kits/rim.wav"));
        assert!(kit.lookup(Channel::Right, class(1)).unwrap().stop.is_empty());
    }

    #[test]
    fn test_rejects_unknown_asset() {
        let json = r#"{
            "assets": { "pad": "pad.wav" },
            "rules": [ { "channel": "left", "class": 0, "play": "pad", "stop": ["cowbell"] } ]
        }"#;
        let result = DispatchRuleTable::from_json(json, Path::new("."));
        assert!(matches!(result, Err(AirdrumError::InvalidRule(_))));
    }

    #[test]
    fn test_rejects_duplicate_pair() {
        let json = r#"{
            "assets": { "pad": "pad.wav" },
            "rules": [
                { "channel": "left", "class": 0, "play": "pad" },
                { "channel": "left", "class": 0, "play": "pad" }
            ]
        }"#;
        let result = DispatchRuleTable::from_json(json, Path::new("."));
        assert!(matches!(result, Err(AirdrumError::InvalidRule(_))));
    }

    #[test]
    fn test_rejects_out_of_range_class() {
        let json = r#"{
            "assets": { "pad": "pad.wav" },
            "rules": [ { "channel": "left", "class": 5, "play": "pad" } ]
        }"#;
        assert!(DispatchRuleTable::from_json(json, Path::new(".")).is_err());
    }

    #[test]
    fn test_load_and_export() {
        let dir = tempfile::tempdir().unwrap();
        let kit = DispatchRuleTable::default_kit(dir.path());
        let json = serde_json::to_string_pretty(&kit.to_kit_file()).unwrap();

        let path = dir.path().join("kit.json");
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(json.as_bytes()).unwrap();

        let loaded = DispatchRuleTable::load(&path).unwrap();
        assert_eq!(loaded, kit);
        assert_eq!(loaded.missing_assets().len(), 4);
    }
}
