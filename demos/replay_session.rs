//! Replay a synthetic two-stick session through the built-in trees and
//! print the playback commands the default kit would issue

use std::path::Path;
use std::time::Duration;

use airdrum::dispatch::{AudioCommand, DispatchRuleTable, Dispatcher, MemoryBackend};
use airdrum::pipeline::{ChannelPipeline, PipelineSettings, StickPair};
use airdrum::{Channel, Sample, TreeLibrary};

/// A stick swinging at `hz` with the given gyro amplitude (deg/s)
fn swing(t: f64, hz: f64, amplitude: f64) -> Sample {
    let phase = 2.0 * std::f64::consts::PI * hz * t;
    Sample::from_axes(
        [0.3 * phase.sin(), -0.9 + 0.2 * phase.cos(), 0.4],
        [amplitude * phase.cos(), 0.5 * amplitude * phase.sin(), -0.3 * amplitude],
    )
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let library = TreeLibrary::builtin()?;
    let settings = PipelineSettings::default();
    let left = library.resolve("left_stick")?;
    let right = library.resolve("right_2")?;

    let mut sticks = StickPair::new(
        ChannelPipeline::new(Channel::Left, left, settings)?,
        ChannelPipeline::new(Channel::Right, right, settings)?,
    );
    let mut dispatcher = Dispatcher::new(
        DispatchRuleTable::default_kit(Path::new("sound")),
        MemoryBackend::new(),
    );

    // Four seconds at 50 Hz
    let tick = Duration::from_millis(20);
    for i in 0..200u32 {
        let now = tick * i;
        let t = now.as_secs_f64();
        sticks
            .get_mut(Channel::Left)
            .process(swing(t, 2.0, 220.0), now, &mut dispatcher);
        sticks
            .get_mut(Channel::Right)
            .process(swing(t, 1.5, 180.0), now, &mut dispatcher);
    }

    for command in dispatcher.backend().commands() {
        match command {
            AudioCommand::Play(asset) => println!("play {asset}"),
            AudioCommand::Stop(asset) => println!("stop {asset}"),
        }
    }
    for channel in Channel::ALL {
        let stats = sticks.get(channel).stats();
        println!("{channel}: {}", serde_json::to_string(&stats)?);
    }
    println!("dispatch: {}", serde_json::to_string(dispatcher.stats())?);
    Ok(())
}
