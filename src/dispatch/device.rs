//! rodio playback backend
//!
//! Every asset is decoded once at startup into a shared in-memory buffer.
//! Each play gets a fresh `Sink`; dropping the previous sink cuts it off,
//! which gives the restart-from-zero behaviour.

use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use rodio::source::Buffered;
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink, Source};
use tracing::{debug, info};

use crate::dispatch::backend::AudioBackend;
use crate::dispatch::rules::DispatchRuleTable;
use crate::error::AirdrumError;

type Clip = Buffered<Decoder<BufReader<File>>>;

struct Voice {
    clip: Clip,
    sink: Option<Sink>,
}

/// Plays kit assets on the default output device
pub struct RodioBackend {
    // Dropping the stream silences every sink
    _stream: OutputStream,
    handle: OutputStreamHandle,
    voices: HashMap<String, Voice>,
}

impl std::fmt::Debug for RodioBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RodioBackend")
            .field("voices", &self.voices.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl RodioBackend {
    /// Open the default device and decode every asset in the kit.
    ///
    /// Any missing or undecodable asset fails the whole open.
    pub fn open(kit: &DispatchRuleTable) -> Result<Self, AirdrumError> {
        let (stream, handle) =
            OutputStream::try_default().map_err(|e| AirdrumError::Audio(e.to_string()))?;

        let mut voices = HashMap::with_capacity(kit.assets().len());
        for (name, path) in kit.assets() {
            let clip = load_clip(path)?;
            debug!(asset = %name, path = %path.display(), "asset loaded");
            voices.insert(name.clone(), Voice { clip, sink: None });
        }
        info!(assets = voices.len(), kit = kit.name(), "audio device ready");

        Ok(Self {
            _stream: stream,
            handle,
            voices,
        })
    }
}

fn load_clip(path: &Path) -> Result<Clip, AirdrumError> {
    let asset_error = |reason: String| AirdrumError::AssetLoad {
        path: path.display().to_string(),
        reason,
    };
    let file = File::open(path).map_err(|e| asset_error(e.to_string()))?;
    let decoder = Decoder::new(BufReader::new(file)).map_err(|e| asset_error(e.to_string()))?;
    Ok(decoder.buffered())
}

impl AudioBackend for RodioBackend {
    fn name(&self) -> &'static str {
        "rodio"
    }

    fn play(&mut self, asset: &str) -> Result<(), AirdrumError> {
        let voice = self
            .voices
            .get_mut(asset)
            .ok_or_else(|| AirdrumError::Audio(format!("asset {asset:?} was not loaded")))?;

        if let Some(previous) = voice.sink.take() {
            previous.stop();
        }

        let sink = Sink::try_new(&self.handle).map_err(|e| AirdrumError::Audio(e.to_string()))?;
        sink.set_volume(1.0);
        sink.append(voice.clip.clone());
        voice.sink = Some(sink);
        Ok(())
    }

    fn stop(&mut self, asset: &str) {
        if let Some(sink) = self.voices.get_mut(asset).and_then(|v| v.sink.take()) {
            sink.stop();
        }
    }
}
