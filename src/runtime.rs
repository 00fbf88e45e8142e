//! Run loops for the edge, receiver and host roles
//!
//! Each loop is single-threaded and handles one sample or packet to
//! completion before reading the next. Malformed input is logged and
//! dropped; only I/O failures on the input itself end a run early.

use std::io::{self, BufRead};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::dispatch::{AudioBackend, Dispatcher};
use crate::error::AirdrumError;
use crate::ingest::{parse_sample, parse_tagged_sample};
use crate::listener::{Datagram, Listener};
use crate::pipeline::{ChannelPipeline, StickPair};
use crate::transport::{accept_datagram, EventSink};
use crate::types::Event;

/// Scheduling tick of the sensor loop on the device
pub const DEFAULT_TICK: Duration = Duration::from_millis(20);

/// How sample timestamps are derived while replaying lines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pacing {
    /// Wall-clock time since the run started
    Realtime,
    /// One tick per sample, sleeping so samples are released on schedule
    Fixed(Duration),
    /// One tick per sample, as fast as possible
    Virtual(Duration),
}

/// Counters returned by every run loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Input lines or datagrams read
    pub received: u64,
    pub samples: u64,
    pub malformed: u64,
    pub events: u64,
}

struct SampleClock {
    started: Instant,
    pacing: Pacing,
    ticks: u32,
}

impl SampleClock {
    fn new(pacing: Pacing) -> Self {
        Self {
            started: Instant::now(),
            pacing,
            ticks: 0,
        }
    }

    /// Monotonic offset for the next sample
    fn next(&mut self) -> Duration {
        let now = match self.pacing {
            Pacing::Realtime => self.started.elapsed(),
            Pacing::Virtual(tick) => tick.saturating_mul(self.ticks),
            Pacing::Fixed(tick) => {
                let due = tick.saturating_mul(self.ticks);
                let elapsed = self.started.elapsed();
                if due > elapsed {
                    std::thread::sleep(due - elapsed);
                }
                due
            }
        };
        self.ticks = self.ticks.saturating_add(1);
        now
    }

    fn expired(&self, limit: Option<Duration>) -> bool {
        limit.is_some_and(|limit| self.started.elapsed() >= limit)
    }
}

/// Edge role: read bare sample lines, classify, send events to `sink`.
///
/// Stops at end of input or once `limit` has elapsed. With a limit, lines
/// are read on a helper thread so a stalled input cannot outlive it.
pub fn run_edge<R: BufRead + Send + 'static>(
    reader: R,
    pipeline: &mut ChannelPipeline,
    sink: &mut dyn EventSink,
    pacing: Pacing,
    limit: Option<Duration>,
) -> Result<RunReport, AirdrumError> {
    let clock = SampleClock::new(pacing);
    match limit.and_then(|limit| clock.started.checked_add(limit)) {
        None => edge_loop(reader.lines(), clock, pipeline, sink, limit),
        Some(deadline) => edge_loop(timed_lines(reader, deadline), clock, pipeline, sink, limit),
    }
}

/// Lines from `reader` until EOF or `deadline`, whichever comes first
fn timed_lines<R: BufRead + Send + 'static>(
    reader: R,
    deadline: Instant,
) -> impl Iterator<Item = io::Result<String>> {
    let (tx, rx) = mpsc::sync_channel(64);
    // Detached: a reader blocked on stdin exits with the process
    thread::spawn(move || {
        for line in reader.lines() {
            if tx.send(line).is_err() {
                break;
            }
        }
    });

    std::iter::from_fn(move || {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(remaining) {
            Ok(line) => Some(line),
            Err(mpsc::RecvTimeoutError::Timeout) => {
                debug!("edge input idle past the run limit");
                None
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => None,
        }
    })
}

fn edge_loop<I: Iterator<Item = io::Result<String>>>(
    lines: I,
    mut clock: SampleClock,
    pipeline: &mut ChannelPipeline,
    sink: &mut dyn EventSink,
    limit: Option<Duration>,
) -> Result<RunReport, AirdrumError> {
    let mut report = RunReport::default();

    for line in lines {
        if clock.expired(limit) {
            debug!("edge run limit reached");
            break;
        }

        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        report.received += 1;

        let sample = match parse_sample(line) {
            Ok(sample) => sample,
            Err(e) => {
                report.malformed += 1;
                warn!(channel = %pipeline.channel(), error = %e, "dropping malformed sample line");
                continue;
            }
        };

        report.samples += 1;
        let step = pipeline.process(sample, clock.next(), sink);
        if step.event().is_some() {
            report.events += 1;
        }
    }

    pipeline.log_summary();
    Ok(report)
}

/// Offline classification: every emitted event, with timestamps derived
/// from the pipeline epoch plus one `tick` per sample
pub fn classify_lines<R: BufRead + Send + 'static>(
    reader: R,
    pipeline: &mut ChannelPipeline,
    tick: Duration,
) -> Result<(Vec<Event>, RunReport), AirdrumError> {
    let mut events: Vec<Event> = Vec::new();
    let report = run_edge(reader, pipeline, &mut events, Pacing::Virtual(tick), None)?;
    Ok((events, report))
}

/// Receiver role: decode event datagrams and dispatch them.
///
/// Runs until the listener deadline passes or its stop handle fires.
pub fn run_receiver<B: AudioBackend>(
    listener: &mut Listener,
    dispatcher: &mut Dispatcher<B>,
) -> Result<RunReport, AirdrumError> {
    let mut report = RunReport::default();
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, kit = dispatcher.rules().name(), "receiving events");
    }

    while let Some(datagram) = listener.recv()? {
        report.received += 1;
        if reject_truncated(&datagram) {
            report.malformed += 1;
            continue;
        }
        match accept_datagram(datagram.payload, datagram.peer) {
            Some((channel, class)) => {
                report.events += 1;
                dispatcher.dispatch(channel, class);
            }
            None => report.malformed += 1,
        }
    }

    dispatcher.log_summary();
    Ok(report)
}

/// Host role: receive side-tagged sample lines from both sticks, classify
/// them locally and dispatch straight to playback
pub fn run_host<B: AudioBackend>(
    listener: &mut Listener,
    sticks: &mut StickPair,
    dispatcher: &mut Dispatcher<B>,
) -> Result<RunReport, AirdrumError> {
    let started = Instant::now();
    let mut report = RunReport::default();
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "receiving raw samples");
    }

    while let Some(datagram) = listener.recv()? {
        report.received += 1;
        if reject_truncated(&datagram) {
            report.malformed += 1;
            continue;
        }
        let peer = datagram.peer;
        let Ok(text) = std::str::from_utf8(datagram.payload) else {
            report.malformed += 1;
            debug!(%peer, "dropping non UTF-8 sample packet");
            continue;
        };

        // A datagram may carry several lines
        for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let (channel, sample) = match parse_tagged_sample(line) {
                Ok(parsed) => parsed,
                Err(e) => {
                    report.malformed += 1;
                    warn!(%peer, error = %e, "dropping malformed sample line");
                    continue;
                }
            };

            report.samples += 1;
            let step = sticks
                .get_mut(channel)
                .process(sample, started.elapsed(), &mut *dispatcher);
            if step.event().is_some() {
                report.events += 1;
            }
        }
    }

    sticks.log_summary();
    dispatcher.log_summary();
    Ok(report)
}

/// Cut datagrams are dropped whole; their tail may still parse
fn reject_truncated(datagram: &Datagram<'_>) -> bool {
    if datagram.truncated {
        warn!(
            peer = %datagram.peer,
            kept = datagram.payload.len(),
            "dropping datagram larger than the receive buffer"
        );
    }
    datagram.truncated
}
