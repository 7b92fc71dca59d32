//! Quanto Stress CLI - offline replay and inspection of recorded sensor traces
//!
//! Usage:
//!   quanto-stress replay --input trace.ndjson [--config config.json] [--summary]
//!   quanto-stress validate --input trace.ndjson [--json]
//!   quanto-stress config [--config config.json]
//!   quanto-stress doctor [--config config.json] [--json]

use clap::{Parser, Subcommand, ValueEnum};
use quanto_stress::replay::{parse_array, parse_ndjson, replay_trace, validate_ndjson, ReplayReport};
use quanto_stress::{StressConfig, StressError, ENGINE_VERSION, PRODUCER_NAME};
use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "quanto-stress")]
#[command(author = "Quanto Engineering")]
#[command(version = ENGINE_VERSION)]
#[command(about = "Replay and inspect motion and touch traces for shake detection", long_about = None)]
struct Cli {
    /// Enable debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a recorded trace through a session on a virtual clock
    Replay {
        /// Input file path (use - for stdin)
        #[arg(short, long, default_value = "-")]
        input: PathBuf,

        /// Input format
        #[arg(long, value_enum, default_value = "ndjson")]
        input_format: InputFormat,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Output format
        #[arg(long, value_enum, default_value = "json-pretty")]
        output_format: OutputFormat,

        /// Engine configuration JSON file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Emit only the final metrics and detections
        #[arg(long)]
        summary: bool,
    },

    /// Validate trace lines without replaying them
    Validate {
        /// Input file path (use - for stdin)
        #[arg(short, long, default_value = "-")]
        input: PathBuf,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the effective engine configuration
    Config {
        /// Configuration JSON file to merge over the defaults
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Check the environment and configuration
    Doctor {
        /// Configuration JSON file to check
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum InputFormat {
    /// Newline-delimited JSON (one event per line)
    Ndjson,
    /// JSON array of events
    Json,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// One tick snapshot per line
    Ndjson,
    /// Compact JSON report
    Json,
    /// Pretty-printed JSON report
    JsonPretty,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let error_json = serde_json::to_string(&e.to_cli_error()).unwrap_or_else(|_| {
                format!(r#"{{"code":"INTERNAL","message":"{}"}}"#, e)
            });
            eprintln!("{}", error_json);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .target(env_logger::Target::Stderr)
        .init();
}

fn run(cli: Cli) -> Result<(), StressCliError> {
    match cli.command {
        Commands::Replay {
            input,
            input_format,
            output,
            output_format,
            config,
            summary,
        } => cmd_replay(
            &input,
            input_format,
            &output,
            output_format,
            config.as_ref(),
            summary,
        ),
        Commands::Validate { input, json } => cmd_validate(&input, json),
        Commands::Config { config } => cmd_config(config.as_ref()),
        Commands::Doctor { config, json } => cmd_doctor(config.as_ref(), json),
    }
}

fn read_input(input: &PathBuf) -> Result<String, StressCliError> {
    if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn write_output(output: &PathBuf, content: &str) -> Result<(), StressCliError> {
    if output.to_string_lossy() == "-" {
        let mut stdout = io::stdout().lock();
        stdout.write_all(content.as_bytes())?;
        stdout.write_all(b"\n")?;
    } else {
        fs::write(output, format!("{}\n", content))?;
    }
    Ok(())
}

fn load_config(path: Option<&PathBuf>) -> Result<StressConfig, StressCliError> {
    match path {
        Some(path) => {
            let json = fs::read_to_string(path)?;
            let config = StressConfig::from_json(&json)?;
            log::debug!("loaded config from {}", path.display());
            Ok(config)
        }
        None => Ok(StressConfig::default()),
    }
}

fn cmd_replay(
    input: &PathBuf,
    input_format: InputFormat,
    output: &PathBuf,
    output_format: OutputFormat,
    config: Option<&PathBuf>,
    summary: bool,
) -> Result<(), StressCliError> {
    let config = load_config(config)?;
    let input_data = read_input(input)?;

    let events = match input_format {
        InputFormat::Ndjson => parse_ndjson(&input_data)?,
        InputFormat::Json => parse_array(&input_data)?,
    };
    log::info!("replaying {} events", events.len());

    let report = replay_trace(&events, &config)?;
    log::info!(
        "replay finished: {} ticks, {} detections",
        report.ticks.len(),
        report.detections.len()
    );

    let content = if summary {
        format_summary(&report, output_format)?
    } else {
        format_report(&report, output_format)?
    };
    write_output(output, &content)
}

fn format_report(report: &ReplayReport, format: OutputFormat) -> Result<String, StressCliError> {
    match format {
        OutputFormat::Ndjson => {
            let lines: Result<Vec<String>, _> =
                report.ticks.iter().map(serde_json::to_string).collect();
            Ok(lines?.join("\n"))
        }
        OutputFormat::Json => Ok(serde_json::to_string(report)?),
        OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(report)?),
    }
}

fn format_summary(report: &ReplayReport, format: OutputFormat) -> Result<String, StressCliError> {
    let summary = ReplaySummary {
        producer: PRODUCER_NAME.to_string(),
        version: ENGINE_VERSION.to_string(),
        events_processed: report.events_processed,
        dropped_samples: report.dropped_samples,
        ticks: report.ticks.len(),
        shake_detected: !report.detections.is_empty(),
        detections: report
            .detections
            .iter()
            .map(|d| DetectionSummary {
                t_ms: d.t_ms,
                rule: d.trigger.rule_name().to_string(),
            })
            .collect(),
        final_metrics: report
            .final_metrics()
            .map(serde_json::to_value)
            .transpose()?,
    };

    match format {
        OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(&summary)?),
        OutputFormat::Json | OutputFormat::Ndjson => Ok(serde_json::to_string(&summary)?),
    }
}

fn cmd_validate(input: &PathBuf, json: bool) -> Result<(), StressCliError> {
    let input_data = read_input(input)?;
    let validation = validate_ndjson(&input_data);

    if json {
        println!("{}", serde_json::to_string_pretty(&validation)?);
    } else {
        println!(
            "Validated {} events: {} valid, {} invalid",
            validation.total,
            validation.valid,
            validation.issues.len()
        );
        for issue in &validation.issues {
            println!("  line {}: {}", issue.line, issue.message);
        }
    }

    if validation.is_clean() {
        Ok(())
    } else {
        Err(StressCliError::ValidationFailed(validation.issues.len()))
    }
}

fn cmd_config(config: Option<&PathBuf>) -> Result<(), StressCliError> {
    let config = load_config(config)?;
    println!("{}", config.to_json()?);
    Ok(())
}

fn cmd_doctor(config: Option<&PathBuf>, json: bool) -> Result<(), StressCliError> {
    let mut checks = Vec::new();

    checks.push(DoctorCheck {
        name: "version".to_string(),
        status: CheckStatus::Ok,
        message: format!("{} v{}", PRODUCER_NAME, ENGINE_VERSION),
    });

    let effective = match config {
        Some(path) => match fs::read_to_string(path) {
            Ok(content) => match StressConfig::from_json(&content) {
                Ok(config) => {
                    checks.push(DoctorCheck {
                        name: "config".to_string(),
                        status: CheckStatus::Ok,
                        message: format!("Config file valid ({})", path.display()),
                    });
                    Some(config)
                }
                Err(e) => {
                    checks.push(DoctorCheck {
                        name: "config".to_string(),
                        status: CheckStatus::Error,
                        message: format!("Invalid config: {}", e),
                    });
                    None
                }
            },
            Err(e) => {
                checks.push(DoctorCheck {
                    name: "config".to_string(),
                    status: CheckStatus::Error,
                    message: format!("Cannot read config file: {}", e),
                });
                None
            }
        },
        None => {
            checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Ok,
                message: "Using built-in defaults".to_string(),
            });
            Some(StressConfig::default())
        }
    };

    if let Some(config) = &effective {
        let window_fits = config.tap_burst_count <= config.touch_capacity;
        checks.push(DoctorCheck {
            name: "tap_burst".to_string(),
            status: if window_fits {
                CheckStatus::Ok
            } else {
                CheckStatus::Warning
            },
            message: if window_fits {
                format!(
                    "{} taps in {} ms fits the touch buffer",
                    config.tap_burst_count, config.tap_burst_window_ms
                )
            } else {
                format!(
                    "Tap burst of {} can never fire with a touch buffer of {}",
                    config.tap_burst_count, config.touch_capacity
                )
            },
        });

        let tremor_reachable = config.tremor_min_samples <= config.motion_capacity;
        checks.push(DoctorCheck {
            name: "tremor".to_string(),
            status: if tremor_reachable {
                CheckStatus::Ok
            } else {
                CheckStatus::Warning
            },
            message: if tremor_reachable {
                format!(
                    "Tremor needs {} of {} buffered samples",
                    config.tremor_min_samples, config.motion_capacity
                )
            } else {
                "Tremor stays at 0: minimum sample count exceeds motion buffer".to_string()
            },
        });
    }

    let stdin_is_tty = atty::is(atty::Stream::Stdin);
    checks.push(DoctorCheck {
        name: "stdin".to_string(),
        status: CheckStatus::Ok,
        message: if stdin_is_tty {
            "stdin is a terminal (pass --input for replay)".to_string()
        } else {
            "stdin is piped".to_string()
        },
    });

    let has_errors = checks
        .iter()
        .any(|c| matches!(c.status, CheckStatus::Error));

    if json {
        let report = DoctorReport {
            producer: PRODUCER_NAME.to_string(),
            version: ENGINE_VERSION.to_string(),
            checks,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{} doctor", PRODUCER_NAME);
        for check in &checks {
            let symbol = match check.status {
                CheckStatus::Ok => "ok",
                CheckStatus::Warning => "warn",
                CheckStatus::Error => "FAIL",
            };
            println!("  [{}] {}: {}", symbol, check.name, check.message);
        }
    }

    if has_errors {
        Err(StressCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

// Error handling

#[derive(Debug)]
enum StressCliError {
    Io(io::Error),
    Engine(StressError),
    Json(serde_json::Error),
    ValidationFailed(usize),
    DoctorFailed,
}

impl std::fmt::Display for StressCliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StressCliError::Io(e) => write!(f, "IO error: {}", e),
            StressCliError::Engine(e) => write!(f, "{}", e),
            StressCliError::Json(e) => write!(f, "JSON error: {}", e),
            StressCliError::ValidationFailed(n) => write!(f, "{} trace lines failed validation", n),
            StressCliError::DoctorFailed => write!(f, "Doctor checks failed"),
        }
    }
}

impl From<io::Error> for StressCliError {
    fn from(e: io::Error) -> Self {
        StressCliError::Io(e)
    }
}

impl From<StressError> for StressCliError {
    fn from(e: StressError) -> Self {
        StressCliError::Engine(e)
    }
}

impl From<serde_json::Error> for StressCliError {
    fn from(e: serde_json::Error) -> Self {
        StressCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<String>,
}

impl StressCliError {
    fn to_cli_error(&self) -> CliError {
        match self {
            StressCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            StressCliError::Engine(StressError::InvalidConfig(msg)) => CliError {
                code: "INVALID_CONFIG".to_string(),
                message: msg.clone(),
                hint: Some("Run `quanto-stress config` to see the defaults".to_string()),
            },
            StressCliError::Engine(StressError::ParseError(msg)) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: msg.clone(),
                hint: Some("Run `quanto-stress validate` on the trace".to_string()),
            },
            StressCliError::Engine(e) => CliError {
                code: "ENGINE_ERROR".to_string(),
                message: e.to_string(),
                hint: None,
            },
            StressCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Ensure input is valid JSON".to_string()),
            },
            StressCliError::ValidationFailed(n) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} trace lines failed validation", n),
                hint: Some("Fix validation errors and retry".to_string()),
            },
            StressCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct ReplaySummary {
    producer: String,
    version: String,
    events_processed: usize,
    dropped_samples: u64,
    ticks: usize,
    shake_detected: bool,
    detections: Vec<DetectionSummary>,
    final_metrics: Option<serde_json::Value>,
}

#[derive(serde::Serialize)]
struct DetectionSummary {
    t_ms: u64,
    rule: String,
}

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
