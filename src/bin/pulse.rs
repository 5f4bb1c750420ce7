//! Pulse CLI - Command-line interface for Synheart Pulse
//!
//! Commands:
//! - replay: Stream recorded region samples through a monitor
//! - simulate: Run a synthetic pulse through a monitor (self-check)
//! - config: Print or save the default configuration
//! - doctor: Diagnose configuration and environment

use clap::{Parser, Subcommand, ValueEnum};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::PI;
use std::fs;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, info};

use synheart_pulse::schema::{SampleRecord, SampleRecordAdapter, SCHEMA_VERSION};
use synheart_pulse::types::{PulseReport, RoiSample, REGION_COUNT};
use synheart_pulse::{PulseConfig, PulseError, PulseMonitor, SnapshotEncoder};
use synheart_pulse::{PRODUCER_NAME, PULSE_VERSION};

/// Pulse - On-device rPPG heart-rate engine
#[derive(Parser)]
#[command(name = "pulse")]
#[command(author = "Synheart AI Inc")]
#[command(version = PULSE_VERSION)]
#[command(about = "Estimate heart rate from facial skin-region samples", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Log output format (logs go to stderr)
    #[arg(long, global = true, value_enum, default_value = "compact")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream pulse.roi_sample.v1 records through a monitor
    Replay {
        /// Input NDJSON file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,

        /// Emit one report every N records (the last record always reports)
        #[arg(long, default_value = "1")]
        every: usize,

        /// Configuration JSON file
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Run a synthetic pulse through a monitor and print the final report
    Simulate {
        /// Simulated heart rate
        #[arg(long, default_value = "72")]
        bpm: f64,

        /// Duration in seconds
        #[arg(long, default_value = "20")]
        seconds: f64,

        /// Sample rate in frames per second
        #[arg(long, default_value = "30")]
        fps: f64,

        /// Noise amplitude relative to the pulse amplitude
        #[arg(long, default_value = "0.2")]
        noise: f64,

        /// Noise seed
        #[arg(long, default_value = "7")]
        seed: u64,

        /// Output format
        #[arg(long, default_value = "json-pretty")]
        output_format: OutputFormat,

        /// Configuration JSON file
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Print or save the default configuration
    Config {
        /// Output file path (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Diagnose configuration and environment
    Doctor {
        /// Configuration file to check
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one report per line)
    Ndjson,
    /// JSON array of reports
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    Pretty,
    /// Compact single-line format
    Compact,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

/// Initialize logging based on CLI options
fn init_logging(cli: &Cli) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let filter = if cli.quiet {
        EnvFilter::new("warn")
    } else {
        let default_level = match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        };
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
    };

    let fmt_layer = match cli.log_format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_writer(io::stderr)
            .boxed(),
        LogFormat::Pretty => fmt::layer().pretty().with_writer(io::stderr).boxed(),
        LogFormat::Compact => fmt::layer().compact().with_writer(io::stderr).boxed(),
    };

    // a second init (tests, embedding) keeps the first subscriber
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}

fn run(cli: Cli) -> Result<(), PulseCliError> {
    match cli.command {
        Commands::Replay {
            input,
            output_format,
            every,
            config,
        } => cmd_replay(&input, output_format, every, config.as_deref()),

        Commands::Simulate {
            bpm,
            seconds,
            fps,
            noise,
            seed,
            output_format,
            config,
        } => {
            let params = SimulationParams {
                bpm,
                seconds,
                fps,
                noise,
                seed,
            };
            cmd_simulate(&params, output_format, config.as_deref())
        }

        Commands::Config { output } => cmd_config(output.as_deref()),

        Commands::Doctor { config, json } => cmd_doctor(config.as_deref(), json),
    }
}

fn load_config(path: Option<&Path>) -> Result<PulseConfig, PulseCliError> {
    match path {
        Some(path) => Ok(PulseConfig::from_path(path)?),
        None => Ok(PulseConfig::default()),
    }
}

fn cmd_replay(
    input: &Path,
    output_format: OutputFormat,
    every: usize,
    config: Option<&Path>,
) -> Result<(), PulseCliError> {
    let config = load_config(config)?;
    let mut monitor = PulseMonitor::with_config(config)?;
    let encoder = SnapshotEncoder::new();
    let every = every.max(1);

    let reader: Box<dyn BufRead> = if input.to_string_lossy() == "-" {
        Box::new(BufReader::new(io::stdin()))
    } else {
        Box::new(BufReader::new(fs::File::open(input)?))
    };

    let mut stdout = io::stdout();
    let mut reports: Vec<PulseReport> = Vec::new();
    let mut pending: Option<PulseReport> = None;
    let mut count = 0usize;

    for (line_num, line) in reader.lines().enumerate() {
        let line = line?;
        let Some(record) = SampleRecordAdapter::parse_line(&line, line_num + 1)? else {
            continue;
        };

        let snapshot = monitor.push_samples(&record)?;
        count += 1;
        let report = encoder.encode(&snapshot);

        if count % every != 0 {
            pending = Some(report);
            continue;
        }
        pending = None;

        match output_format {
            OutputFormat::Ndjson => {
                writeln!(stdout, "{}", serde_json::to_string(&report)?)?;
                stdout.flush()?;
            }
            OutputFormat::Json | OutputFormat::JsonPretty => reports.push(report),
        }
    }

    if count == 0 {
        return Err(PulseCliError::NoRecords);
    }

    if let Some(report) = pending {
        match output_format {
            OutputFormat::Ndjson => writeln!(stdout, "{}", serde_json::to_string(&report)?)?,
            OutputFormat::Json | OutputFormat::JsonPretty => reports.push(report),
        }
    }

    match output_format {
        OutputFormat::Ndjson => {}
        OutputFormat::Json => writeln!(stdout, "{}", serde_json::to_string(&reports)?)?,
        OutputFormat::JsonPretty => {
            writeln!(stdout, "{}", serde_json::to_string_pretty(&reports)?)?
        }
    }

    info!(records = count, bpm = ?monitor.current_bpm(), "replay finished");
    Ok(())
}

struct SimulationParams {
    bpm: f64,
    seconds: f64,
    fps: f64,
    noise: f64,
    seed: u64,
}

/// Three region streams sharing one pulse, each with its own baseline and noise
fn simulate_records(params: &SimulationParams) -> Vec<SampleRecord> {
    let mut rng = StdRng::seed_from_u64(params.seed);
    let baselines = [118.0, 104.0, 106.0];
    let amplitudes = [0.8, 0.6, 0.6];
    let freq = params.bpm / 60.0;
    let frames = (params.seconds * params.fps).round() as usize;

    (0..frames)
        .map(|i| {
            let t = i as f64 / params.fps;
            let samples: [RoiSample; REGION_COUNT] = std::array::from_fn(|r| {
                let pulse = amplitudes[r] * (2.0 * PI * freq * t).sin();
                let jitter = params.noise * amplitudes[r] * rng.random_range(-1.0..1.0);
                RoiSample {
                    intensity: baselines[r] + pulse + jitter,
                    dispersion: Some(0.05),
                }
            });
            SampleRecord::from_samples(t, &samples)
        })
        .collect()
}

fn cmd_simulate(
    params: &SimulationParams,
    output_format: OutputFormat,
    config: Option<&Path>,
) -> Result<(), PulseCliError> {
    if !(params.fps > 0.0 && params.seconds > 0.0) {
        return Err(PulseCliError::InvalidArgs(
            "fps and seconds must be positive".to_string(),
        ));
    }

    let config = load_config(config)?;
    let mut monitor = PulseMonitor::with_config(config)?;
    let encoder = SnapshotEncoder::new();

    let records = simulate_records(params);
    debug!(frames = records.len(), bpm = params.bpm, "simulating");

    let mut last = monitor.snapshot();
    for record in &records {
        last = monitor.push_samples(record)?;
    }

    let report = encoder.encode(&last);
    let output = match output_format {
        OutputFormat::Ndjson => serde_json::to_string(&report)?,
        OutputFormat::Json => serde_json::to_string(&[&report])?,
        OutputFormat::JsonPretty => serde_json::to_string_pretty(&report)?,
    };
    println!("{output}");

    info!(
        target_bpm = params.bpm,
        bpm = ?last.current_bpm,
        confidence = last.confidence,
        "simulation finished"
    );
    Ok(())
}

fn cmd_config(output: Option<&Path>) -> Result<(), PulseCliError> {
    let json = PulseConfig::default().to_json()?;
    match output {
        Some(path) => {
            fs::write(path, json + "\n")?;
            info!(path = %path.display(), "default configuration written");
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn cmd_doctor(config: Option<&Path>, json: bool) -> Result<(), PulseCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "pulse_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Pulse version {PULSE_VERSION}"),
    });

    checks.push(DoctorCheck {
        name: "schema_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Input schema: {SCHEMA_VERSION}"),
    });

    if let Some(config_path) = config {
        let check = if config_path.exists() {
            match PulseConfig::from_path(config_path) {
                Ok(config) => DoctorCheck {
                    name: "config".to_string(),
                    status: CheckStatus::Ok,
                    message: format!(
                        "Config valid (window {}s, band {}-{} Hz, order {})",
                        config.window_duration_secs,
                        config.bandpass_low_hz,
                        config.bandpass_high_hz,
                        config.filter_order
                    ),
                },
                Err(e) => DoctorCheck {
                    name: "config".to_string(),
                    status: CheckStatus::Error,
                    message: e.to_string(),
                },
            }
        } else {
            DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Warning,
                message: "Config file does not exist".to_string(),
            }
        };
        checks.push(check);
    }

    // Check that the camera frame rate supports the heart-rate band
    let effective = load_config(config).unwrap_or_default();
    let nyquist = effective.camera.fps as f64 / 2.0;
    checks.push(if effective.bandpass_high_hz < nyquist {
        DoctorCheck {
            name: "sample_rate".to_string(),
            status: CheckStatus::Ok,
            message: format!(
                "{} fps covers the {} Hz band edge",
                effective.camera.fps, effective.bandpass_high_hz
            ),
        }
    } else {
        DoctorCheck {
            name: "sample_rate".to_string(),
            status: CheckStatus::Warning,
            message: format!(
                "{} fps cannot resolve {} Hz; estimates will be skipped",
                effective.camera.fps, effective.bandpass_high_hz
            ),
        }
    });

    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a TTY (interactive mode)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a pipe (replay from - ready)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: PULSE_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Pulse Doctor Report");
        println!("===================");
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

    let has_errors = report
        .checks
        .iter()
        .any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(PulseCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

// Error types

#[derive(Debug)]
enum PulseCliError {
    Io(io::Error),
    Pulse(PulseError),
    Json(serde_json::Error),
    NoRecords,
    InvalidArgs(String),
    DoctorFailed,
}

impl From<io::Error> for PulseCliError {
    fn from(e: io::Error) -> Self {
        PulseCliError::Io(e)
    }
}

impl From<PulseError> for PulseCliError {
    fn from(e: PulseError) -> Self {
        PulseCliError::Pulse(e)
    }
}

impl From<serde_json::Error> for PulseCliError {
    fn from(e: serde_json::Error) -> Self {
        PulseCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<PulseCliError> for CliError {
    fn from(e: PulseCliError) -> Self {
        match e {
            PulseCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            PulseCliError::Pulse(e @ PulseError::InvalidConfig(_)) => CliError {
                code: "CONFIG_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Run 'pulse config' for a valid starting point".to_string()),
            },
            PulseCliError::Pulse(e @ PulseError::InvalidRecord(_)) => CliError {
                code: "RECORD_ERROR".to_string(),
                message: e.to_string(),
                hint: Some(format!("Ensure input matches the {SCHEMA_VERSION} schema")),
            },
            PulseCliError::Pulse(e) => CliError {
                code: "PULSE_ERROR".to_string(),
                message: e.to_string(),
                hint: None,
            },
            PulseCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            PulseCliError::NoRecords => CliError {
                code: "NO_RECORDS".to_string(),
                message: "No records found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            PulseCliError::InvalidArgs(msg) => CliError {
                code: "INVALID_ARGS".to_string(),
                message: msg,
                hint: Some("Run 'pulse simulate --help'".to_string()),
            },
            PulseCliError::DoctorFailed => CliError {
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

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simulated_records_are_deterministic() {
        let params = SimulationParams {
            bpm: 72.0,
            seconds: 2.0,
            fps: 30.0,
            noise: 0.2,
            seed: 11,
        };
        let a = simulate_records(&params);
        let b = simulate_records(&params);

        assert_eq!(a.len(), 60);
        assert_eq!(a, b);
        assert!(a.iter().all(|r| r.validate().is_ok()));
    }

    #[test]
    fn test_simulation_recovers_heart_rate() {
        let params = SimulationParams {
            bpm: 72.0,
            seconds: 20.0,
            fps: 30.0,
            noise: 0.2,
            seed: 7,
        };
        let mut monitor = PulseMonitor::new();
        for record in simulate_records(&params) {
            monitor.push_samples(&record).unwrap();
        }

        let bpm = monitor.current_bpm().unwrap();
        assert!((bpm - 72.0).abs() <= 5.0, "bpm {bpm}");
    }

    #[test]
    fn test_cli_parses_global_flags() {
        let cli = Cli::try_parse_from(["pulse", "-vv", "simulate", "--bpm", "60"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Commands::Simulate { bpm, .. } if bpm == 60.0));
    }
}
