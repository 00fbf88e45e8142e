//! Per-channel classification pipeline
//!
//! Each stick runs its own pipeline. Every incoming sample is handled to
//! completion before the next one is read:
//! 1. FeatureWindow - buffer the sample, wait until the window is full
//! 2. Classifier - score the flattened window
//! 3. VariationGate - drop the decision if the stick is not moving
//! 4. Confidence floor - drop weak winners (disabled by default)
//! 5. Debouncer - enforce the per-channel cooldown
//! 6. EventSink - hand the event to the transport

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::classifier::Classifier;
use crate::debounce::{Debouncer, DEFAULT_COOLDOWN};
use crate::error::AirdrumError;
use crate::gate::{GateMode, VariationGate, DEFAULT_VARIATION_THRESHOLD};
use crate::transport::EventSink;
use crate::types::{Channel, ClassId, ClassificationOutput, Event, Sample};
use crate::window::FeatureWindow;
use crate::{FEATURES_PER_SAMPLE, WINDOW_SIZE};

/// Tunables shared by both channel pipelines
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineSettings {
    pub window_size: usize,
    pub variation_threshold: f64,
    pub gate_mode: GateMode,
    pub cooldown: Duration,
    /// Minimum winning score for an event; 0.0 accepts every argmax
    pub min_confidence: f64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            window_size: WINDOW_SIZE,
            variation_threshold: DEFAULT_VARIATION_THRESHOLD,
            gate_mode: GateMode::Row,
            cooldown: DEFAULT_COOLDOWN,
            min_confidence: 0.0,
        }
    }
}

/// Outcome of a classification that did not produce an event
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Suppressed {
    /// Motion score at or below the gate threshold
    BelowMotion { score: f64 },
    /// Winning score under the confidence floor
    LowConfidence { score: f64 },
    /// Cooldown since the last event has not elapsed
    CoolingDown,
}

/// What happened to one sample
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Window not full yet; nothing was classified
    Buffering { filled: usize },
    /// Window classified but no event emitted
    Suppressed {
        output: ClassificationOutput,
        class: ClassId,
        reason: Suppressed,
    },
    /// Window classified and an event emitted
    Emitted {
        output: ClassificationOutput,
        event: Event,
    },
}

impl Step {
    pub fn event(&self) -> Option<&Event> {
        match self {
            Step::Emitted { event, .. } => Some(event),
            _ => None,
        }
    }

    pub fn classified(&self) -> bool {
        !matches!(self, Step::Buffering { .. })
    }
}

/// Counters kept per channel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub samples: u64,
    pub classifications: u64,
    pub below_motion: u64,
    pub low_confidence: u64,
    pub debounced: u64,
    pub emitted: u64,
    pub send_failures: u64,
}

/// Window, gate, cooldown and classifier for one stick
#[derive(Debug)]
pub struct ChannelPipeline {
    channel: Channel,
    window: FeatureWindow,
    classifier: Arc<dyn Classifier>,
    gate: VariationGate,
    debouncer: Debouncer,
    min_confidence: f64,
    /// Wall-clock time matching monotonic offset zero
    epoch: DateTime<Utc>,
    stats: PipelineStats,
}

impl ChannelPipeline {
    /// Fails when the window cannot feed `classifier` a full input
    pub fn new(
        channel: Channel,
        classifier: Arc<dyn Classifier>,
        settings: PipelineSettings,
    ) -> Result<Self, AirdrumError> {
        if settings.window_size == 0 {
            return Err(AirdrumError::Config("window size must be at least one sample".to_string()));
        }
        let flattened = settings.window_size.saturating_mul(FEATURES_PER_SAMPLE);
        if classifier.input_len() > flattened {
            return Err(AirdrumError::Config(format!(
                "tree {} reads {} inputs but a {}-sample window flattens to {}",
                classifier.name(),
                classifier.input_len(),
                settings.window_size,
                flattened
            )));
        }

        Ok(Self {
            channel,
            window: FeatureWindow::new(settings.window_size),
            classifier,
            gate: VariationGate::new(settings.variation_threshold, settings.gate_mode),
            debouncer: Debouncer::new(settings.cooldown),
            min_confidence: settings.min_confidence,
            epoch: Utc::now(),
            stats: PipelineStats::default(),
        })
    }

    /// Anchor event timestamps to a fixed wall-clock instant
    pub fn with_epoch(mut self, epoch: DateTime<Utc>) -> Self {
        self.epoch = epoch;
        self
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    pub fn classifier(&self) -> &dyn Classifier {
        self.classifier.as_ref()
    }

    pub fn window(&self) -> &FeatureWindow {
        &self.window
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    /// Run one sample through the pipeline. `now` is a monotonic offset.
    pub fn push(&mut self, sample: Sample, now: Duration) -> Step {
        self.stats.samples += 1;
        self.window.push(sample);

        if !self.window.is_full() {
            return Step::Buffering {
                filled: self.window.len(),
            };
        }

        let input = self.window.flatten();
        let output = self.classifier.classify(&input);
        let class = output.argmax();
        self.stats.classifications += 1;

        let motion = self.gate.score(&self.window);
        if motion <= self.gate.threshold {
            self.stats.below_motion += 1;
            return Step::Suppressed {
                output,
                class,
                reason: Suppressed::BelowMotion { score: motion },
            };
        }

        let score = output.score(class);
        if score < self.min_confidence {
            self.stats.low_confidence += 1;
            return Step::Suppressed {
                output,
                class,
                reason: Suppressed::LowConfidence { score },
            };
        }

        if !self.debouncer.should_emit(now) {
            self.stats.debounced += 1;
            return Step::Suppressed {
                output,
                class,
                reason: Suppressed::CoolingDown,
            };
        }

        self.stats.emitted += 1;
        let event = Event::new(self.channel, class, score, self.timestamp(now));
        debug!(
            channel = %self.channel,
            class = class.id(),
            score,
            motion,
            tree = self.classifier.name(),
            "gesture event"
        );
        Step::Emitted { output, event }
    }

    /// Run one sample and hand any resulting event to `sink`.
    ///
    /// Send failures are logged and counted; the event is not retried.
    pub fn process(&mut self, sample: Sample, now: Duration, sink: &mut dyn EventSink) -> Step {
        let step = self.push(sample, now);
        if let Some(event) = step.event() {
            if let Err(e) = sink.send(event) {
                self.stats.send_failures += 1;
                warn!(channel = %self.channel, error = %e, "failed to send event");
            }
        }
        step
    }

    fn timestamp(&self, now: Duration) -> DateTime<Utc> {
        let offset = chrono::Duration::from_std(now).unwrap_or_else(|_| chrono::Duration::zero());
        self.epoch + offset
    }

    /// Log the counters gathered so far
    pub fn log_summary(&self) {
        let s = self.stats;
        info!(
            channel = %self.channel,
            tree = self.classifier.name(),
            samples = s.samples,
            classifications = s.classifications,
            below_motion = s.below_motion,
            low_confidence = s.low_confidence,
            debounced = s.debounced,
            emitted = s.emitted,
            send_failures = s.send_failures,
            "pipeline summary"
        );
    }
}

/// The two independent stick pipelines of a host
#[derive(Debug)]
pub struct StickPair {
    left: ChannelPipeline,
    right: ChannelPipeline,
}

impl StickPair {
    pub fn new(left: ChannelPipeline, right: ChannelPipeline) -> Self {
        debug_assert_eq!(left.channel(), Channel::Left);
        debug_assert_eq!(right.channel(), Channel::Right);
        Self { left, right }
    }

    pub fn get(&self, channel: Channel) -> &ChannelPipeline {
        match channel {
            Channel::Left => &self.left,
            Channel::Right => &self.right,
        }
    }

    pub fn get_mut(&mut self, channel: Channel) -> &mut ChannelPipeline {
        match channel {
            Channel::Left => &mut self.left,
            Channel::Right => &mut self.right,
        }
    }

    /// Route a side-tagged sample to its channel
    pub fn push(&mut self, channel: Channel, sample: Sample, now: Duration) -> Step {
        self.get_mut(channel).push(sample, now)
    }

    pub fn log_summary(&self) {
        self.left.log_summary();
        self.right.log_summary();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{TreeLibrary, LEFT_STICK};
    use crate::transport::EventSink;
    use pretty_assertions::assert_eq;

    /// Classifier that always returns the same scores
    #[derive(Debug)]
    struct Fixed(ClassificationOutput);

    impl Classifier for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }
        fn input_len(&self) -> usize {
            crate::FLATTENED_LEN
        }
        fn classify(&self, input: &[f64]) -> ClassificationOutput {
            assert_eq!(input.len(), crate::FLATTENED_LEN);
            self.0
        }
    }

    struct FailingSink;

    impl EventSink for FailingSink {
        fn send(&mut self, _event: &Event) -> Result<(), AirdrumError> {
            Err(AirdrumError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "network unreachable",
            )))
        }
    }

    fn fixed(scores: [f64; 3]) -> Arc<dyn Classifier> {
        Arc::new(Fixed(ClassificationOutput(scores)))
    }

    /// Row variation 5 * 20 = 100, above the default threshold
    fn moving() -> Sample {
        Sample::new([0.0, 20.0, 0.0, 20.0, 0.0, 20.0])
    }

    fn still() -> Sample {
        Sample::new([0.1, 0.1, 1.0, 0.0, 0.0, 0.0])
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_end_to_end_window_fill() {
        let mut pipeline =
            ChannelPipeline::new(Channel::Left, fixed([0.0, 0.0, 1.0]), PipelineSettings::default()).unwrap();
        let mut sink: Vec<Event> = Vec::new();

        for i in 0..49 {
            let step = pipeline.process(moving(), ms(i * 20), &mut sink);
            assert!(!step.classified());
        }
        assert_eq!(pipeline.stats().classifications, 0);
        assert!(sink.is_empty());

        let step = pipeline.process(moving(), ms(49 * 20), &mut sink);
        assert!(step.classified());
        assert_eq!(pipeline.stats().classifications, 1);
        assert_eq!(sink.len(), 1);
        assert_eq!(sink[0].channel, Channel::Left);
        assert_eq!(sink[0].class.id(), 2);

        for i in 50..60 {
            pipeline.process(still(), ms(i * 20), &mut sink);
        }
        assert_eq!(pipeline.window().len(), WINDOW_SIZE);
        assert_eq!(pipeline.stats().samples, 60);
        // Still samples never pass the gate
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn test_gate_runs_after_classification() {
        let mut pipeline =
            ChannelPipeline::new(Channel::Right, fixed([1.0, 0.0, 0.0]), PipelineSettings::default()).unwrap();
        let mut last = Step::Buffering { filled: 0 };
        for i in 0..WINDOW_SIZE as u64 {
            last = pipeline.push(still(), ms(i));
        }
        match last {
            Step::Suppressed { reason, class, .. } => {
                assert_eq!(class.id(), 0);
                assert!(matches!(reason, Suppressed::BelowMotion { .. }));
            }
            other => panic!("expected suppression, got {:?}", other),
        }
        assert_eq!(pipeline.stats().below_motion, 1);
    }

    #[test]
    fn test_cooldown_between_events() {
        let mut pipeline =
            ChannelPipeline::new(Channel::Left, fixed([0.0, 1.0, 0.0]), PipelineSettings::default()).unwrap();
        for i in 0..(WINDOW_SIZE as u64 - 1) {
            pipeline.push(moving(), ms(i));
        }

        assert!(pipeline.push(moving(), ms(1_000)).event().is_some());
        assert_eq!(
            pipeline.push(moving(), ms(1_079)),
            Step::Suppressed {
                output: ClassificationOutput([0.0, 1.0, 0.0]),
                class: ClassId::new(1).unwrap(),
                reason: Suppressed::CoolingDown,
            }
        );
        assert!(pipeline.push(moving(), ms(1_081)).event().is_some());
        assert_eq!(pipeline.stats().emitted, 2);
        assert_eq!(pipeline.stats().debounced, 1);
    }

    #[test]
    fn test_confidence_floor() {
        let settings = PipelineSettings {
            min_confidence: 1.0,
            ..PipelineSettings::default()
        };
        let mut pipeline = ChannelPipeline::new(Channel::Left, fixed([0.4, 0.6, 0.0]), settings).unwrap();
        let mut last = Step::Buffering { filled: 0 };
        for i in 0..WINDOW_SIZE as u64 {
            last = pipeline.push(moving(), ms(i * 100));
        }
        assert!(matches!(
            last,
            Step::Suppressed {
                reason: Suppressed::LowConfidence { .. },
                ..
            }
        ));
    }

    #[test]
    fn test_send_failure_is_not_fatal() {
        let mut pipeline =
            ChannelPipeline::new(Channel::Left, fixed([0.0, 0.0, 1.0]), PipelineSettings::default()).unwrap();
        let mut sink = FailingSink;
        for i in 0..(WINDOW_SIZE as u64 + 5) {
            pipeline.process(moving(), ms(i * 100), &mut sink);
        }
        let stats = pipeline.stats();
        assert_eq!(stats.emitted, 6);
        assert_eq!(stats.send_failures, 6);
    }

    #[test]
    fn test_event_timestamps_follow_epoch() {
        let epoch = "2024-03-01T12:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let mut pipeline =
            ChannelPipeline::new(Channel::Left, fixed([1.0, 0.0, 0.0]), PipelineSettings::default()).unwrap()
                .with_epoch(epoch);
        let mut event = None;
        for i in 0..WINDOW_SIZE as u64 {
            event = pipeline.push(moving(), ms(i * 20)).event().cloned();
        }
        let event = event.unwrap();
        assert_eq!(event.timestamp, epoch + chrono::Duration::milliseconds(49 * 20));
    }

    #[test]
    fn test_rejects_window_narrower_than_tree() {
        let library = TreeLibrary::builtin().unwrap();
        let tree = library.get(LEFT_STICK).unwrap();
        let settings = PipelineSettings {
            window_size: 10,
            ..PipelineSettings::default()
        };

        let err = ChannelPipeline::new(Channel::Left, tree, settings).unwrap_err();
        assert!(matches!(err, AirdrumError::Config(_)));
        assert!(err.to_string().contains("reads 300 inputs"));
    }

    #[test]
    fn test_rejects_empty_window() {
        let settings = PipelineSettings {
            window_size: 0,
            ..PipelineSettings::default()
        };
        assert!(matches!(
            ChannelPipeline::new(Channel::Right, fixed([1.0, 0.0, 0.0]), settings),
            Err(AirdrumError::Config(_))
        ));
    }

    #[test]
    fn test_pair_keeps_channels_independent() {
        let library = TreeLibrary::builtin().unwrap();
        let tree = library.get(LEFT_STICK).unwrap();
        let mut pair = StickPair::new(
            ChannelPipeline::new(Channel::Left, tree.clone(), PipelineSettings::default()).unwrap(),
            ChannelPipeline::new(Channel::Right, tree, PipelineSettings::default()).unwrap(),
        );

        for i in 0..WINDOW_SIZE as u64 {
            pair.push(Channel::Left, moving(), ms(i));
        }
        pair.push(Channel::Right, moving(), ms(0));

        assert!(pair.get(Channel::Left).window().is_full());
        assert_eq!(pair.get(Channel::Right).window().len(), 1);
        assert_eq!(pair.get(Channel::Left).stats().classifications, 1);
        assert_eq!(pair.get(Channel::Right).stats().classifications, 0);
    }
}
