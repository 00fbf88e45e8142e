//! Airdrum CLI - run the drumstick pipeline from the command line
//!
//! Commands:
//! - edge: classify one stick's samples and send events over UDP
//! - receive: play events arriving over UDP
//! - host: classify raw samples from both sticks and play locally
//! - classify: offline classification of a recorded session to NDJSON
//! - doctor: check trees, kit and environment
//! - trees: list or export the built-in decision trees

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::info;

use airdrum::classifier::{Classifier, TreeLibrary};
use airdrum::config::AirdrumConfig;
use airdrum::dispatch::{AudioBackend, DispatchRuleTable, Dispatcher, NullBackend};
use airdrum::gate::GateMode;
use airdrum::listener::{Listener, DEFAULT_RECV_BUFFER};
use airdrum::pipeline::{ChannelPipeline, StickPair};
use airdrum::runtime::{self, Pacing, RunReport, DEFAULT_TICK};
use airdrum::telemetry::{init_tracing, InitError};
use airdrum::transport::{UdpEventSender, EVENT_RECV_BUFFER};
use airdrum::types::Channel;
use airdrum::{AirdrumError, AIRDRUM_VERSION, PRODUCER_NAME};

/// Airdrum - turn IMU drumstick motion into drum hits
#[derive(Parser)]
#[command(name = "airdrum")]
#[command(version = AIRDRUM_VERSION)]
#[command(about = "Gesture-to-drum engine for IMU drumsticks", long_about = None)]
struct Cli {
    /// JSON config file; flags override its values
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify one stick's samples and send events over UDP
    Edge {
        /// Sample lines `ax,ay,az,gx,gy,gz` (use - for stdin)
        #[arg(short, long, default_value = "-")]
        input: PathBuf,

        /// Which stick this edge device is
        #[arg(long, value_enum)]
        channel: StickArg,

        /// Built-in tree name or tree JSON path (defaults to the config)
        #[arg(long)]
        tree: Option<String>,

        /// Event destination host:port
        #[arg(long)]
        host: Option<String>,

        /// Release one sample per tick instead of as read
        #[arg(long)]
        tick_ms: Option<u64>,

        /// Stop after this many seconds
        #[arg(long)]
        duration: Option<u64>,

        #[command(flatten)]
        tuning: TuningArgs,
    },

    /// Play events arriving over UDP
    Receive {
        /// Listen address host:port
        #[arg(long)]
        bind: Option<String>,

        #[command(flatten)]
        kit: KitArgs,

        /// Stop after this many seconds
        #[arg(long)]
        duration: Option<u64>,
    },

    /// Classify raw side-tagged samples from both sticks and play locally
    Host {
        /// Listen address host:port
        #[arg(long)]
        bind: Option<String>,

        /// Tree for the left stick
        #[arg(long)]
        left_tree: Option<String>,

        /// Tree for the right stick
        #[arg(long)]
        right_tree: Option<String>,

        #[command(flatten)]
        kit: KitArgs,

        #[command(flatten)]
        tuning: TuningArgs,

        /// Stop after this many seconds
        #[arg(long)]
        duration: Option<u64>,
    },

    /// Classify a recorded session offline and write events as NDJSON
    Classify {
        /// Sample lines `ax,ay,az,gx,gy,gz` (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        #[arg(long, value_enum, default_value = "left")]
        channel: StickArg,

        /// Built-in tree name or tree JSON path (defaults to the config)
        #[arg(long)]
        tree: Option<String>,

        /// Sampling interval used to timestamp samples
        #[arg(long, default_value_t = DEFAULT_TICK.as_millis() as u64)]
        tick_ms: u64,

        /// Wall-clock time of the first sample (RFC 3339)
        #[arg(long, default_value = "1970-01-01T00:00:00Z")]
        epoch: DateTime<Utc>,

        #[command(flatten)]
        tuning: TuningArgs,
    },

    /// Check trees, kit and environment
    Doctor {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the built-in decision trees
    Trees {
        /// Print the named tree as JSON instead of the listing
        #[arg(long)]
        export: Option<String>,

        /// Output the listing as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum StickArg {
    Left,
    Right,
}

impl From<StickArg> for Channel {
    fn from(stick: StickArg) -> Self {
        match stick {
            StickArg::Left => Channel::Left,
            StickArg::Right => Channel::Right,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum GateArg {
    /// Motion within the newest sample
    Row,
    /// Motion across the whole window
    Window,
}

/// Pipeline overrides shared by the classifying commands
#[derive(Args)]
struct TuningArgs {
    /// Motion score a window must exceed
    #[arg(long)]
    threshold: Option<f64>,

    #[arg(long, value_enum)]
    gate_mode: Option<GateArg>,

    /// Minimum time between two events of one stick
    #[arg(long)]
    cooldown_ms: Option<u64>,

    /// Minimum winning score for an event
    #[arg(long)]
    min_confidence: Option<f64>,
}

impl TuningArgs {
    fn apply(&self, config: &mut AirdrumConfig) {
        if let Some(threshold) = self.threshold {
            config.variation_threshold = threshold;
        }
        if let Some(mode) = self.gate_mode {
            config.gate_mode = match mode {
                GateArg::Row => GateMode::Row,
                GateArg::Window => GateMode::Window,
            };
        }
        if let Some(cooldown) = self.cooldown_ms {
            config.cooldown_ms = cooldown;
        }
        if let Some(floor) = self.min_confidence {
            config.min_confidence = floor;
        }
    }
}

/// Sound kit selection shared by the playing commands
#[derive(Args)]
struct KitArgs {
    /// Dispatch table JSON (defaults to the built-in kit)
    #[arg(long)]
    rules: Option<PathBuf>,

    /// Asset directory for the built-in kit
    #[arg(long)]
    sound_dir: Option<PathBuf>,

    /// Log hits instead of opening the audio device
    #[arg(long)]
    mute: bool,
}

impl KitArgs {
    fn apply(&self, config: &mut AirdrumConfig) {
        if let Some(rules) = &self.rules {
            config.rules = Some(rules.clone());
        }
        if let Some(dir) = &self.sound_dir {
            config.sound_dir = dir.clone();
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), AirdrumCliError> {
    init_tracing(&cli.log_level)?;
    let mut config = AirdrumConfig::load_or_default(cli.config.as_deref())?;

    match cli.command {
        Commands::Edge {
            input,
            channel,
            tree,
            host,
            tick_ms,
            duration,
            tuning,
        } => {
            tuning.apply(&mut config);
            if let Some(host) = host {
                config.host = host;
            }
            config.validate()?;
            cmd_edge(&config, &input, channel.into(), tree, tick_ms, duration)
        }

        Commands::Receive {
            bind,
            kit,
            duration,
        } => {
            kit.apply(&mut config);
            if let Some(bind) = bind {
                config.bind = bind;
            }
            config.validate()?;
            cmd_receive(&config, kit.mute, duration)
        }

        Commands::Host {
            bind,
            left_tree,
            right_tree,
            kit,
            tuning,
            duration,
        } => {
            kit.apply(&mut config);
            tuning.apply(&mut config);
            if let Some(bind) = bind {
                config.bind = bind;
            }
            if let Some(tree) = left_tree {
                config.trees.left = tree;
            }
            if let Some(tree) = right_tree {
                config.trees.right = tree;
            }
            config.validate()?;
            cmd_host(&config, kit.mute, duration)
        }

        Commands::Classify {
            input,
            output,
            channel,
            tree,
            tick_ms,
            epoch,
            tuning,
        } => {
            tuning.apply(&mut config);
            config.validate()?;
            cmd_classify(&config, &input, &output, channel.into(), tree, tick_ms, epoch)
        }

        Commands::Doctor { json } => cmd_doctor(&config, json),

        Commands::Trees { export, json } => cmd_trees(export.as_deref(), json),
    }
}

fn open_input(input: &Path) -> Result<Box<dyn BufRead + Send>, AirdrumCliError> {
    if input.to_string_lossy() == "-" {
        Ok(Box::new(BufReader::new(io::stdin())))
    } else {
        Ok(Box::new(BufReader::new(fs::File::open(input)?)))
    }
}

fn build_pipeline(
    config: &AirdrumConfig,
    library: &TreeLibrary,
    channel: Channel,
    tree: Option<&str>,
) -> Result<ChannelPipeline, AirdrumCliError> {
    let reference = tree.unwrap_or_else(|| config.trees.get(channel));
    let classifier = library.resolve(reference)?;
    info!(%channel, tree = classifier.name(), "classifier ready");
    ChannelPipeline::new(channel, classifier, config.pipeline_settings()).map_err(Into::into)
}

fn cmd_edge(
    config: &AirdrumConfig,
    input: &Path,
    channel: Channel,
    tree: Option<String>,
    tick_ms: Option<u64>,
    duration: Option<u64>,
) -> Result<(), AirdrumCliError> {
    let library = TreeLibrary::builtin()?;
    let mut pipeline = build_pipeline(config, &library, channel, tree.as_deref())?;
    let mut sender = UdpEventSender::new(config.host_addr()?)?;
    info!(%channel, destination = %sender.destination(), "edge running");

    let pacing = match tick_ms {
        Some(ms) => Pacing::Fixed(Duration::from_millis(ms)),
        None => Pacing::Realtime,
    };
    let reader = open_input(input)?;
    let report = runtime::run_edge(
        reader,
        &mut pipeline,
        &mut sender,
        pacing,
        duration.map(Duration::from_secs),
    )?;
    log_report("edge", &report);
    Ok(())
}

fn bind_listener(config: &AirdrumConfig, buffer: usize, duration: Option<u64>) -> Result<Listener, AirdrumCliError> {
    let listener = Listener::bind(config.bind_addr()?, buffer)?;
    Ok(listener.run_for(duration.map(Duration::from_secs)))
}

#[cfg(feature = "audio")]
fn open_backend(kit: &DispatchRuleTable) -> Result<airdrum::dispatch::RodioBackend, AirdrumCliError> {
    Ok(airdrum::dispatch::RodioBackend::open(kit)?)
}

#[cfg(not(feature = "audio"))]
fn open_backend(_kit: &DispatchRuleTable) -> Result<NullBackend, AirdrumCliError> {
    tracing::warn!("built without the audio feature, hits will only be logged");
    Ok(NullBackend)
}

fn cmd_receive(config: &AirdrumConfig, mute: bool, duration: Option<u64>) -> Result<(), AirdrumCliError> {
    let kit = config.rule_table()?;
    let mut listener = bind_listener(config, EVENT_RECV_BUFFER, duration)?;

    fn serve<B: AudioBackend>(listener: &mut Listener, kit: DispatchRuleTable, backend: B) -> Result<RunReport, AirdrumError> {
        let mut dispatcher = Dispatcher::new(kit, backend);
        runtime::run_receiver(listener, &mut dispatcher)
    }

    let report = if mute {
        serve(&mut listener, kit, NullBackend)?
    } else {
        let backend = open_backend(&kit)?;
        serve(&mut listener, kit, backend)?
    };
    log_report("receive", &report);
    Ok(())
}

fn cmd_host(config: &AirdrumConfig, mute: bool, duration: Option<u64>) -> Result<(), AirdrumCliError> {
    let library = TreeLibrary::builtin()?;
    let mut sticks = StickPair::new(
        build_pipeline(config, &library, Channel::Left, None)?,
        build_pipeline(config, &library, Channel::Right, None)?,
    );
    let kit = config.rule_table()?;
    let mut listener = bind_listener(config, DEFAULT_RECV_BUFFER, duration)?;

    fn serve<B: AudioBackend>(
        listener: &mut Listener,
        sticks: &mut StickPair,
        kit: DispatchRuleTable,
        backend: B,
    ) -> Result<RunReport, AirdrumError> {
        let mut dispatcher = Dispatcher::new(kit, backend);
        runtime::run_host(listener, sticks, &mut dispatcher)
    }

    let report = if mute {
        serve(&mut listener, &mut sticks, kit, NullBackend)?
    } else {
        let backend = open_backend(&kit)?;
        serve(&mut listener, &mut sticks, kit, backend)?
    };
    log_report("host", &report);
    Ok(())
}

fn cmd_classify(
    config: &AirdrumConfig,
    input: &Path,
    output: &Path,
    channel: Channel,
    tree: Option<String>,
    tick_ms: u64,
    epoch: DateTime<Utc>,
) -> Result<(), AirdrumCliError> {
    if tick_ms == 0 {
        return Err(AirdrumCliError::Usage("--tick-ms must be positive".to_string()));
    }
    let library = TreeLibrary::builtin()?;
    let mut pipeline = build_pipeline(config, &library, channel, tree.as_deref())?.with_epoch(epoch);

    let reader = open_input(input)?;
    let (events, report) = runtime::classify_lines(reader, &mut pipeline, Duration::from_millis(tick_ms))?;

    let mut lines = String::new();
    for event in &events {
        lines.push_str(&serde_json::to_string(event)?);
        lines.push('\n');
    }

    if output.to_string_lossy() == "-" {
        let mut stdout = io::stdout().lock();
        stdout.write_all(lines.as_bytes())?;
        stdout.flush()?;
    } else {
        fs::write(output, lines)?;
    }

    log_report("classify", &report);
    Ok(())
}

fn cmd_doctor(config: &AirdrumConfig, json: bool) -> Result<(), AirdrumCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck::ok("airdrum_version", format!("Airdrum version {}", AIRDRUM_VERSION)));

    match TreeLibrary::builtin() {
        Ok(library) => {
            checks.push(DoctorCheck::ok(
                "builtin_trees",
                format!("{} built-in trees valid", library.names().count()),
            ));
            for channel in Channel::ALL {
                let reference = config.trees.get(channel);
                let name = format!("{channel}_tree");
                checks.push(match library.resolve(reference) {
                    Ok(tree) => DoctorCheck::ok(&name, format!("{} resolves to {}", reference, tree.summary().name)),
                    Err(e) => DoctorCheck::error(&name, e.to_string()),
                });
            }
        }
        Err(e) => checks.push(DoctorCheck::error("builtin_trees", e.to_string())),
    }

    match config.rule_table() {
        Ok(kit) => {
            checks.push(DoctorCheck::ok(
                "kit",
                format!("Kit {:?} with {} rules and {} assets", kit.name(), kit.len(), kit.assets().len()),
            ));
            let missing = kit.missing_assets();
            if missing.is_empty() {
                checks.push(DoctorCheck::ok("assets", "All sound assets present".to_string()));
            } else {
                let paths: Vec<String> = missing.iter().map(|(_, path)| path.display().to_string()).collect();
                checks.push(DoctorCheck::warning("assets", format!("Missing sound assets: {}", paths.join(", "))));
            }
        }
        Err(e) => checks.push(DoctorCheck::error("kit", e.to_string())),
    }

    checks.push(if cfg!(feature = "audio") {
        DoctorCheck::ok("audio", "Audio output compiled in".to_string())
    } else {
        DoctorCheck::warning("audio", "Built without the audio feature, playback is logged only".to_string())
    });

    checks.push(if atty::is(atty::Stream::Stdin) {
        DoctorCheck::ok("stdin", "stdin is a TTY (interactive mode)".to_string())
    } else {
        DoctorCheck::ok("stdin", "stdin is a pipe (sample replay ready)".to_string())
    });

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: AIRDRUM_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Airdrum Doctor Report");
        println!("=====================");
        println!("Producer: {}", report.producer);
        println!("Version:  {}", report.version);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report.checks.iter().any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(AirdrumCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

fn cmd_trees(export: Option<&str>, json: bool) -> Result<(), AirdrumCliError> {
    let library = TreeLibrary::builtin()?;

    if let Some(name) = export {
        let tree = library
            .get(name)
            .ok_or_else(|| AirdrumError::UnknownTree(name.to_string()))?;
        println!("{}", tree.to_json()?);
        return Ok(());
    }

    let summaries: Vec<_> = library.trees().map(|tree| tree.summary()).collect();
    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
    } else {
        println!("{:<12} {:>6} {:>6} {:>6} {:>9}", "name", "splits", "leaves", "depth", "features");
        for s in &summaries {
            println!(
                "{:<12} {:>6} {:>6} {:>6} {:>9}",
                s.name,
                s.splits,
                s.leaves,
                s.depth,
                s.features.len()
            );
        }
    }
    Ok(())
}

fn log_report(mode: &str, report: &RunReport) {
    info!(
        mode,
        received = report.received,
        samples = report.samples,
        malformed = report.malformed,
        events = report.events,
        "run finished"
    );
}

// Error types

#[derive(Debug)]
enum AirdrumCliError {
    Io(io::Error),
    Engine(AirdrumError),
    Json(serde_json::Error),
    Logging(InitError),
    Usage(String),
    DoctorFailed,
}

impl From<io::Error> for AirdrumCliError {
    fn from(e: io::Error) -> Self {
        AirdrumCliError::Io(e)
    }
}

impl From<AirdrumError> for AirdrumCliError {
    fn from(e: AirdrumError) -> Self {
        AirdrumCliError::Engine(e)
    }
}

impl From<serde_json::Error> for AirdrumCliError {
    fn from(e: serde_json::Error) -> Self {
        AirdrumCliError::Json(e)
    }
}

impl From<InitError> for AirdrumCliError {
    fn from(e: InitError) -> Self {
        AirdrumCliError::Logging(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<AirdrumCliError> for CliError {
    fn from(e: AirdrumCliError) -> Self {
        match e {
            AirdrumCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths, permissions and that the port is free".to_string()),
            },
            AirdrumCliError::Engine(e) => {
                let (code, hint) = match &e {
                    AirdrumError::Config(_) => ("CONFIG_ERROR", "Check the config file and flags"),
                    AirdrumError::InvalidTree(_) | AirdrumError::UnknownTree(_) => {
                        ("TREE_ERROR", "Run 'airdrum trees' to list built-in trees")
                    }
                    AirdrumError::InvalidRule(_) => ("KIT_ERROR", "Check the dispatch rules file"),
                    AirdrumError::AssetLoad { .. } | AirdrumError::Audio(_) => {
                        ("AUDIO_ERROR", "Run 'airdrum doctor' or retry with --mute")
                    }
                    AirdrumError::Io(_) => ("IO_ERROR", "Check file paths and permissions"),
                    AirdrumError::JsonError(_) => ("JSON_ERROR", "Check JSON syntax"),
                };
                CliError {
                    code: code.to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
            AirdrumCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            AirdrumCliError::Logging(e) => CliError {
                code: "LOGGING_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check the RUST_LOG filter syntax".to_string()),
            },
            AirdrumCliError::Usage(msg) => CliError {
                code: "USAGE_ERROR".to_string(),
                message: msg,
                hint: Some("Run with --help for usage".to_string()),
            },
            AirdrumCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

impl DoctorCheck {
    fn ok(name: &str, message: String) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Ok,
            message,
        }
    }

    fn warning(name: &str, message: String) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Warning,
            message,
        }
    }

    fn error(name: &str, message: String) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Error,
            message,
        }
    }
}

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
