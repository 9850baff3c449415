//! Clickstream CLI - Command-line interface for Clickstream Flux
//!
//! Commands:
//! - transform: Run the pipeline and write the curated datasets
//! - generate: Write synthetic input fixtures
//! - validate: Check raw input records against the cleaning rules
//! - schema: Print input or output schema information

use clap::{Parser, Subcommand, ValueEnum};
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clickstream_flux::cleaner::{EventCleaner, Rejection};
use clickstream_flux::config::parse_date;
use clickstream_flux::generator::{FixtureGenerator, GeneratorConfig};
use clickstream_flux::io::read_ndjson_path;
use clickstream_flux::schema::REQUIRED_FIELDS;
use clickstream_flux::telemetry::{init_tracing, TracingConfig};
use clickstream_flux::{
    EtlError, EtlPipeline, PipelineConfig, RunSummary, FLUX_VERSION, PRODUCER_NAME, SCHEMA_VERSION,
};

/// Clickstream Flux - Batch compute engine for curated clickstream datasets
#[derive(Parser)]
#[command(name = "clickstream")]
#[command(version = FLUX_VERSION)]
#[command(about = "Turn raw clickstream events into sessions and funnel metrics", long_about = None)]
struct Cli {
    /// Log filter when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline and write the four datasets
    Transform {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output base directory
        #[arg(short, long)]
        output: PathBuf,

        /// Load pipeline settings from a JSON file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Inactivity gap that starts a new session
        #[arg(long)]
        session_gap_minutes: Option<u32>,

        /// Worker threads for sessionization and aggregation
        #[arg(long)]
        workers: Option<usize>,

        /// First date to keep (YYYY-MM-DD)
        #[arg(long)]
        start_date: Option<String>,

        /// Last date to keep (YYYY-MM-DD)
        #[arg(long)]
        end_date: Option<String>,
    },

    /// Write synthetic NDJSON input
    Generate {
        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        out: PathBuf,

        /// Number of days covered
        #[arg(long, default_value = "3")]
        days: u32,

        /// Number of distinct users
        #[arg(long, default_value = "20000")]
        users: u32,

        /// Number of events
        #[arg(long, default_value = "500000")]
        events: u64,

        /// First day (YYYY-MM-DD), default is today minus --days
        #[arg(long)]
        start_date: Option<String>,

        /// Seed for reproducible output
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Validate raw records without writing anything
    Validate {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print schema information
    Schema {
        /// Schema to print (input or output)
        #[arg(value_enum)]
        schema_type: SchemaType,

        /// Output as JSON schema
        #[arg(long)]
        json_schema: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum SchemaType {
    /// Raw input events (clickstream.raw_event.v1)
    Input,
    /// Curated output datasets
    Output,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    init_tracing(
        TracingConfig::new()
            .with_filter(cli.log_level.clone())
            .with_json(cli.log_json),
    );

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

fn run(cli: Cli) -> Result<(), FluxCliError> {
    match cli.command {
        Commands::Transform {
            input,
            output,
            config,
            session_gap_minutes,
            workers,
            start_date,
            end_date,
        } => cmd_transform(
            input,
            output,
            config.as_deref(),
            session_gap_minutes,
            workers,
            start_date.as_deref(),
            end_date.as_deref(),
        ),

        Commands::Generate {
            out,
            days,
            users,
            events,
            start_date,
            seed,
        } => {
            let config = GeneratorConfig {
                out,
                days,
                users,
                events,
                start_date: start_date.as_deref().map(parse_date).transpose()?,
                seed,
            };
            cmd_generate(config)
        }

        Commands::Validate { input, json } => cmd_validate(&input, json),

        Commands::Schema {
            schema_type,
            json_schema,
        } => cmd_schema(schema_type, json_schema),
    }
}

fn cmd_transform(
    input: PathBuf,
    output: PathBuf,
    config_path: Option<&Path>,
    session_gap_minutes: Option<u32>,
    workers: Option<usize>,
    start_date: Option<&str>,
    end_date: Option<&str>,
) -> Result<(), FluxCliError> {
    // Flags override the config file
    let mut config = match config_path {
        Some(path) => PipelineConfig::from_json_file(path)?,
        None => PipelineConfig::default(),
    };
    config = config.with_input(input).with_output(output);
    if let Some(minutes) = session_gap_minutes {
        config = config.with_session_gap_minutes(minutes);
    }
    if let Some(workers) = workers {
        config = config.with_workers(workers);
    }
    let start = start_date.map(parse_date).transpose()?.or(config.start_date);
    let end = end_date.map(parse_date).transpose()?.or(config.end_date);
    config = config.with_date_range(start, end);

    let summary = EtlPipeline::new(config)?.run()?;

    println!(
        "{}",
        serde_json::to_string_pretty(&TransformReport {
            producer: PRODUCER_NAME,
            version: FLUX_VERSION,
            summary,
        })?
    );
    Ok(())
}

fn cmd_generate(config: GeneratorConfig) -> Result<(), FluxCliError> {
    let to_stdout = config.out.to_string_lossy() == "-";
    let out = config.out.clone();
    let written = FixtureGenerator::new(config)?.write_to_configured_output()?;

    // stdout carries the fixtures themselves
    if !to_stdout {
        println!(
            "{}",
            serde_json::to_string(&serde_json::json!({
                "out": out,
                "events": written,
            }))?
        );
    }
    Ok(())
}

fn cmd_validate(input: &Path, json: bool) -> Result<(), FluxCliError> {
    let outcome = read_ndjson_path(input)?;

    let mut rejected: BTreeMap<Rejection, usize> = BTreeMap::new();
    if outcome.malformed_lines > 0 {
        rejected.insert(Rejection::MalformedLine, outcome.malformed_lines);
    }

    let mut errors = Vec::new();
    for (index, record) in outcome.records.iter().enumerate() {
        if let Err(reason) = EventCleaner::clean(record) {
            *rejected.entry(reason).or_insert(0) += 1;
            errors.push(ValidationErrorDetail {
                index,
                event_id: record.text("event_id"),
                error: reason,
                missing_fields: record.missing_fields(),
            });
        }
    }

    let invalid_events = errors.len() + outcome.malformed_lines;
    let report = ValidationReport {
        total_events: outcome.records.len() + outcome.malformed_lines,
        valid_events: outcome.records.len() - errors.len(),
        invalid_events,
        rejected,
        errors,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Total events:   {}", report.total_events);
        println!("Valid events:   {}", report.valid_events);
        println!("Invalid events: {}", report.invalid_events);

        if !report.rejected.is_empty() {
            println!("\nRejected by reason:");
            for (reason, count) in &report.rejected {
                println!("  - {}: {}", reason.as_str(), count);
            }
        }

        if !report.errors.is_empty() {
            println!("\nErrors:");
            for err in &report.errors {
                println!(
                    "  - Event {} (index {}): {}",
                    err.event_id.as_deref().unwrap_or("unknown"),
                    err.index,
                    err.error.as_str()
                );
                if !err.missing_fields.is_empty() {
                    println!("      missing: {}", err.missing_fields.join(", "));
                }
            }
        }
    }

    if invalid_events > 0 {
        Err(FluxCliError::ValidationFailed(invalid_events))
    } else {
        Ok(())
    }
}

fn cmd_schema(schema_type: SchemaType, json_schema: bool) -> Result<(), FluxCliError> {
    match schema_type {
        SchemaType::Input => {
            if json_schema {
                println!("{}", input_json_schema());
            } else {
                println!("Input Schema: {}", SCHEMA_VERSION);
                println!();
                println!("One JSON object per line with the fields:");
                for field in REQUIRED_FIELDS {
                    println!("  - {}", field);
                }
                println!();
                println!("event_id, user_id, event_time and event_type are required.");
                println!("event_type is one of: view, add_to_cart, checkout, purchase");
                println!("event_time is RFC 3339; naive timestamps are read as UTC.");
            }
        }
        SchemaType::Output => {
            if json_schema {
                println!("{}", output_json_schema());
            } else {
                println!("Output datasets (partitioned by dt=YYYY-MM-DD):");
                println!();
                println!("1. events_clean - deduplicated events, one row per event_id");
                println!("2. sessions - per-user sessions split on inactivity gaps");
                println!("   - session_id, session_index, session_start, session_end");
                println!("   - events_in_session, session_duration_sec");
                println!("   - made_purchase, reached_checkout, added_to_cart");
                println!("3. daily_metrics - dau, event counts by type, checkout_rate, purchase_rate");
                println!("4. funnel_metrics - distinct users per stage and stage ratios by referrer");
            }
        }
    }

    Ok(())
}

// Helper functions

fn input_json_schema() -> String {
    serde_json::json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": SCHEMA_VERSION,
        "description": "Raw clickstream event",
        "type": "object",
        "required": ["event_id", "user_id", "event_time", "event_type"],
        "properties": {
            "event_id": { "type": "string" },
            "user_id": { "type": "string" },
            "event_time": { "type": "string", "format": "date-time" },
            "event_type": {
                "type": "string",
                "enum": ["view", "add_to_cart", "checkout", "purchase"]
            },
            "page_url": { "type": ["string", "null"] },
            "referrer": { "type": ["string", "null"] },
            "device": { "type": ["string", "null"] },
            "country": { "type": ["string", "null"] }
        }
    })
    .to_string()
}

fn output_json_schema() -> String {
    let ratio = serde_json::json!({ "type": ["number", "null"] });
    let count = serde_json::json!({ "type": "integer", "minimum": 0 });
    let date = serde_json::json!({ "type": "string", "format": "date" });
    let timestamp = serde_json::json!({ "type": "string", "format": "date-time" });

    serde_json::json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": "clickstream curated datasets",
        "type": "object",
        "properties": {
            "events_clean": {
                "type": "object",
                "required": ["event_id", "user_id", "event_time", "event_type", "dt"],
                "properties": {
                    "event_id": { "type": "string" },
                    "user_id": { "type": "string" },
                    "event_time": timestamp,
                    "event_type": { "type": "string" },
                    "page_url": { "type": ["string", "null"] },
                    "referrer": { "type": ["string", "null"] },
                    "device": { "type": ["string", "null"] },
                    "country": { "type": ["string", "null"] },
                    "dt": date
                }
            },
            "sessions": {
                "type": "object",
                "properties": {
                    "session_id": { "type": "string" },
                    "user_id": { "type": "string" },
                    "session_index": count,
                    "dt": date,
                    "session_start": timestamp,
                    "session_end": timestamp,
                    "events_in_session": count,
                    "made_purchase": { "type": "boolean" },
                    "reached_checkout": { "type": "boolean" },
                    "added_to_cart": { "type": "boolean" },
                    "session_duration_sec": count
                }
            },
            "daily_metrics": {
                "type": "object",
                "properties": {
                    "dt": date,
                    "dau": count,
                    "events": count,
                    "purchases": count,
                    "checkouts": count,
                    "add_to_carts": count,
                    "views": count,
                    "checkout_rate": ratio,
                    "purchase_rate": ratio
                }
            },
            "funnel_metrics": {
                "type": "object",
                "properties": {
                    "dt": date,
                    "referrer": { "type": ["string", "null"] },
                    "users_view": count,
                    "users_add_to_cart": count,
                    "users_checkout": count,
                    "users_purchase": count,
                    "view_to_cart": ratio,
                    "cart_to_checkout": ratio,
                    "checkout_to_purchase": ratio
                }
            }
        }
    })
    .to_string()
}

// Error types

#[derive(Debug)]
enum FluxCliError {
    Io(io::Error),
    Json(serde_json::Error),
    Config(String),
    Output(String),
    ValidationFailed(usize),
}

impl From<io::Error> for FluxCliError {
    fn from(e: io::Error) -> Self {
        FluxCliError::Io(e)
    }
}

impl From<serde_json::Error> for FluxCliError {
    fn from(e: serde_json::Error) -> Self {
        FluxCliError::Json(e)
    }
}

impl From<EtlError> for FluxCliError {
    fn from(e: EtlError) -> Self {
        match e {
            EtlError::Io(e) => FluxCliError::Io(e),
            EtlError::JsonError(e) => FluxCliError::Json(e),
            e @ (EtlError::InvalidConfig(_) | EtlError::DateParseError(_)) => {
                FluxCliError::Config(e.to_string())
            }
            e @ EtlError::OutputError { .. } => FluxCliError::Output(e.to_string()),
        }
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<FluxCliError> for CliError {
    fn from(e: FluxCliError) -> Self {
        match e {
            FluxCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            FluxCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            FluxCliError::Config(message) => CliError {
                code: "CONFIG_ERROR".to_string(),
                message,
                hint: Some("Dates are YYYY-MM-DD; gap and workers must be positive".to_string()),
            },
            FluxCliError::Output(message) => CliError {
                code: "OUTPUT_ERROR".to_string(),
                message,
                hint: Some("Check that the output directory is writable".to_string()),
            },
            FluxCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} records failed validation", count),
                hint: Some("Rejected records are dropped by 'clickstream transform'".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct TransformReport {
    producer: &'static str,
    version: &'static str,
    #[serde(flatten)]
    summary: RunSummary,
}

#[derive(serde::Serialize)]
struct ValidationReport {
    total_events: usize,
    valid_events: usize,
    invalid_events: usize,
    rejected: BTreeMap<Rejection, usize>,
    errors: Vec<ValidationErrorDetail>,
}

#[derive(serde::Serialize)]
struct ValidationErrorDetail {
    index: usize,
    event_id: Option<String>,
    error: Rejection,
    missing_fields: Vec<&'static str>,
}
