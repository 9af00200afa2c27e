//! study-features CLI - derive per-user features from study interaction logs
//!
//! Commands:
//! - extract: Load the study CSVs, compute features and write the feature table
//! - validate: Check that every user's log can be processed
//! - columns: Print the feature columns produced for a configuration

use clap::{Parser, Subcommand, ValueEnum};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use tracing::info;
use tracing_subscriber::EnvFilter;

use study_features::config::{DwellPairing, EngineConfig};
use study_features::engine::{FeatureEngine, UserError};
use study_features::table::{TableFormat, USER_ID_COLUMN};
use study_features::types::{EventKind, Part};
use study_features::{load_study, ComputeError, VERSION};

/// Derive per-user behavioral features from a two-part recommendation study
#[derive(Parser)]
#[command(name = "study-features")]
#[command(version = VERSION)]
#[command(about = "Compute per-user features from study interaction logs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Options shared by commands that build an engine
#[derive(clap::Args)]
struct EngineArgs {
    /// Engine configuration file (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Dwell interval pairing policy
    #[arg(long)]
    pairing: Option<PairingArg>,

    /// Event kind to tally per part (repeatable, replaces the configured set)
    #[arg(long = "tracked-kind")]
    tracked_kinds: Vec<String>,

    /// Worker threads used to process users
    #[arg(long)]
    workers: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute features and write the feature table
    Extract {
        /// Interaction log CSV (user_id, content_id, event, page, timestamp)
        #[arg(short, long)]
        interactions: PathBuf,

        /// Users CSV (user_id, distraction_task_timestamp)
        #[arg(short, long)]
        users: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long)]
        output: PathBuf,

        /// Output format
        #[arg(long, default_value = "csv")]
        output_format: OutputFormat,

        /// Write per-user failures to this file as NDJSON instead of stderr
        #[arg(long)]
        errors: Option<PathBuf>,

        #[command(flatten)]
        engine: EngineArgs,
    },

    /// Check that every user's event log can be processed
    Validate {
        /// Interaction log CSV
        #[arg(short, long)]
        interactions: PathBuf,

        /// Users CSV
        #[arg(short, long)]
        users: PathBuf,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the feature columns produced for a configuration
    Columns {
        #[command(flatten)]
        engine: EngineArgs,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum PairingArg {
    /// Pair every click with every later go-back on the same content
    AllForward,
    /// Pair each go-back with the most recent open click on the same content
    Nearest,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Comma-separated values with a header row
    Csv,
    /// JSON array of row objects
    Json,
    /// Pretty-printed JSON
    JsonPretty,
    /// Newline-delimited JSON (one row per line)
    Ndjson,
}

impl From<OutputFormat> for TableFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Csv => TableFormat::Csv,
            OutputFormat::Json => TableFormat::Json,
            OutputFormat::JsonPretty => TableFormat::JsonPretty,
            OutputFormat::Ndjson => TableFormat::Ndjson,
        }
    }
}

fn main() -> ExitCode {
    init_logging();
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

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<(), StudyCliError> {
    match cli.command {
        Commands::Extract {
            interactions,
            users,
            output,
            output_format,
            errors,
            engine,
        } => cmd_extract(
            &interactions,
            &users,
            &output,
            output_format.into(),
            errors.as_deref(),
            &engine,
        ),

        Commands::Validate {
            interactions,
            users,
            json,
        } => cmd_validate(&interactions, &users, json),

        Commands::Columns { engine } => cmd_columns(&engine),
    }
}

fn build_config(args: &EngineArgs) -> Result<EngineConfig, StudyCliError> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::from_path(path)?,
        None => EngineConfig::default(),
    };

    if let Some(pairing) = args.pairing {
        config.pairing = match pairing {
            PairingArg::AllForward => DwellPairing::AllForward,
            PairingArg::Nearest => DwellPairing::Nearest,
        };
    }
    if !args.tracked_kinds.is_empty() {
        config.tracked_kinds = args
            .tracked_kinds
            .iter()
            .map(|kind| EventKind::from(kind.as_str()))
            .collect();
    }
    if let Some(workers) = args.workers {
        config.workers = workers;
    }

    config.validate()?;
    Ok(config)
}

fn cmd_extract(
    interactions: &Path,
    users: &Path,
    output: &Path,
    format: TableFormat,
    errors_path: Option<&Path>,
    engine_args: &EngineArgs,
) -> Result<(), StudyCliError> {
    let config = build_config(engine_args)?;
    let engine = FeatureEngine::new(&config);
    // Fail before loading if the tracked kinds clash with other features
    engine.feature_names()?;

    let data = load_study(interactions, users)?;
    if data.logs.is_empty() {
        return Err(StudyCliError::NoUsers);
    }

    let run = engine.run(data.logs);
    report_user_errors(&run.errors, errors_path)?;

    let table = run.to_table();
    if table.is_empty() {
        return Err(StudyCliError::NoRows(run.errors.len()));
    }

    if output.to_string_lossy() == "-" {
        let stdout = io::stdout();
        table.write(stdout.lock(), format)?;
    } else {
        table.write(BufWriter::new(File::create(output)?), format)?;
    }

    info!(
        rows = table.len(),
        columns = table.header().len(),
        failed = run.errors.len(),
        output = %output.display(),
        "feature table written"
    );
    Ok(())
}

fn report_user_errors(errors: &[UserError], path: Option<&Path>) -> Result<(), StudyCliError> {
    if errors.is_empty() {
        return Ok(());
    }

    let mut lines = String::new();
    for err in errors {
        let detail = UserErrorDetail {
            user_id: err.user_id.clone(),
            code: error_code(&err.error).to_string(),
            message: err.error.to_string(),
        };
        lines.push_str(&serde_json::to_string(&detail)?);
        lines.push('\n');
    }

    match path {
        Some(path) => fs::write(path, lines)?,
        None => io::stderr().write_all(lines.as_bytes())?,
    }
    Ok(())
}

fn cmd_validate(interactions: &Path, users: &Path, json: bool) -> Result<(), StudyCliError> {
    let data = load_study(interactions, users)?;

    let mut invalid = Vec::new();
    for (user_id, log) in &data.logs {
        let empty: Vec<&str> = Part::ALL
            .iter()
            .filter(|part| log.part(**part).is_empty())
            .map(|part| part.as_str())
            .collect();
        if !empty.is_empty() {
            invalid.push(InvalidUserDetail {
                user_id: user_id.clone(),
                part_one_events: log.part_one.len(),
                part_two_events: log.part_two.len(),
                error: format!("empty {}", empty.join(" and ")),
            });
        }
    }

    let report = ValidationReport {
        total_users: data.logs.len(),
        valid_users: data.logs.len() - invalid.len(),
        invalid_users: invalid.len(),
        total_events: data.event_count(),
        skipped_events: data.skipped_events,
        unknown_users: data.unknown_users.clone(),
        errors: invalid,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Total users:    {}", report.total_users);
        println!("Valid users:    {}", report.valid_users);
        println!("Invalid users:  {}", report.invalid_users);
        println!("Total events:   {}", report.total_events);
        println!("Skipped events: {}", report.skipped_events);

        if !report.unknown_users.is_empty() {
            println!("\nUsers without a cutoff: {}", report.unknown_users.join(", "));
        }

        if !report.errors.is_empty() {
            println!("\nErrors:");
            for err in &report.errors {
                println!(
                    "  - User {} ({} / {} events): {}",
                    err.user_id, err.part_one_events, err.part_two_events, err.error
                );
            }
        }
    }

    if report.invalid_users > 0 {
        Err(StudyCliError::ValidationFailed(report.invalid_users))
    } else {
        Ok(())
    }
}

fn cmd_columns(engine_args: &EngineArgs) -> Result<(), StudyCliError> {
    let config = build_config(engine_args)?;
    let names = FeatureEngine::new(&config).feature_names()?;

    println!("{USER_ID_COLUMN}");
    for name in names {
        println!("{name}");
    }
    Ok(())
}

fn error_code(error: &ComputeError) -> &'static str {
    match error {
        ComputeError::MalformedEventLog { .. } => "MALFORMED_EVENT_LOG",
        ComputeError::FeatureCollision(_) => "FEATURE_COLLISION",
        _ => "COMPUTE_ERROR",
    }
}

// Error types

#[derive(Debug)]
enum StudyCliError {
    Io(io::Error),
    Compute(ComputeError),
    Json(serde_json::Error),
    NoUsers,
    NoRows(usize),
    ValidationFailed(usize),
}

impl From<io::Error> for StudyCliError {
    fn from(e: io::Error) -> Self {
        StudyCliError::Io(e)
    }
}

impl From<ComputeError> for StudyCliError {
    fn from(e: ComputeError) -> Self {
        StudyCliError::Compute(e)
    }
}

impl From<serde_json::Error> for StudyCliError {
    fn from(e: serde_json::Error) -> Self {
        StudyCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<StudyCliError> for CliError {
    fn from(e: StudyCliError) -> Self {
        match e {
            StudyCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            StudyCliError::Compute(e) => {
                let (code, hint) = match &e {
                    ComputeError::InvalidConfig(_) | ComputeError::FeatureCollision(_) => {
                        ("CONFIG_ERROR", "Check the engine configuration and --tracked-kind flags")
                    }
                    ComputeError::Csv(_) | ComputeError::DateParseError(_) => {
                        ("PARSE_ERROR", "Ensure the CSVs have the expected columns and timestamps")
                    }
                    _ => ("COMPUTE_ERROR", "Run 'study-features validate' for details"),
                };
                CliError {
                    code: code.to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
            StudyCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            StudyCliError::NoUsers => CliError {
                code: "NO_USERS".to_string(),
                message: "No users found in the users table".to_string(),
                hint: Some("Ensure the users CSV is not empty".to_string()),
            },
            StudyCliError::NoRows(failed) => CliError {
                code: "NO_ROWS".to_string(),
                message: format!("No user produced a feature row ({} failed)", failed),
                hint: Some("Run 'study-features validate' for details".to_string()),
            },
            StudyCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} users have an incomplete event log", count),
                hint: Some("Check the distraction task timestamps for these users".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct UserErrorDetail {
    user_id: String,
    code: String,
    message: String,
}

#[derive(serde::Serialize)]
struct ValidationReport {
    total_users: usize,
    valid_users: usize,
    invalid_users: usize,
    total_events: usize,
    skipped_events: usize,
    unknown_users: Vec<String>,
    errors: Vec<InvalidUserDetail>,
}

#[derive(serde::Serialize)]
struct InvalidUserDetail {
    user_id: String,
    part_one_events: usize,
    part_two_events: usize,
    error: String,
}
