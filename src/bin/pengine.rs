//! Persona Engine CLI - Command-line interface for the adaptation engine
//!
//! Commands:
//! - score: Score a behavior snapshot against a persona set
//! - select: Run one full detection pass and print the adapted content
//! - validate: Lint a persona configuration
//! - doctor: Diagnose engine health and configuration
//! - schema: Print schema information

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use persona_engine::engine::{AdaptationEngine, DetectionOutcome, EngineDescriptor};
use persona_engine::scoring::{lint_personas, match_persona, CompiledPersona};
use persona_engine::signals::extract_signals;
use persona_engine::types::{parse_behavior, parse_personas, parse_sections};
use persona_engine::{EngineOptions, ScoringOptions};
use persona_engine::{ENGINE_VERSION, PRODUCER_NAME};

/// Persona Engine - Deterministic persona detection and content adaptation
#[derive(Parser)]
#[command(name = "pengine")]
#[command(author = "Adaptive Web Team")]
#[command(version = ENGINE_VERSION)]
#[command(about = "Detect visitor personas and select adapted content", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score a behavior snapshot against a persona set
    Score {
        /// Behavior snapshot JSON file (use - for stdin)
        #[arg(short, long)]
        behavior: PathBuf,

        /// Persona configuration JSON file
        #[arg(short, long)]
        personas: PathBuf,

        /// Minimum confidence floor for a match
        #[arg(long, default_value = "0.5")]
        min_confidence: f64,

        /// Pretty-print the output
        #[arg(long)]
        pretty: bool,
    },

    /// Run one full detection pass and print the adapted content
    Select {
        /// Behavior snapshot JSON file (use - for stdin)
        #[arg(short, long)]
        behavior: PathBuf,

        /// Persona configuration JSON file
        #[arg(short, long)]
        personas: PathBuf,

        /// Section configuration JSON file
        #[arg(short, long)]
        sections: PathBuf,

        /// Engine options JSON file (defaults used when omitted)
        #[arg(long)]
        options: Option<PathBuf>,

        /// Pretty-print the output
        #[arg(long)]
        pretty: bool,
    },

    /// Lint a persona configuration
    Validate {
        /// Persona configuration JSON file (use - for stdin)
        #[arg(short, long)]
        personas: PathBuf,

        /// Output lint report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Diagnose engine health and configuration
    Doctor {
        /// Check a persona configuration file
        #[arg(long)]
        personas: Option<PathBuf>,

        /// Check a section configuration file
        #[arg(long)]
        sections: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print schema information
    Schema {
        /// Schema to print
        #[arg(value_enum)]
        schema_type: SchemaType,
    },
}

#[derive(Clone, ValueEnum)]
enum SchemaType {
    /// Behavior snapshot input schema
    Behavior,
    /// Persona configuration schema
    Personas,
    /// Section configuration schema
    Sections,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

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

fn run(cli: Cli) -> Result<(), PengineError> {
    match cli.command {
        Commands::Score {
            behavior,
            personas,
            min_confidence,
            pretty,
        } => cmd_score(&behavior, &personas, min_confidence, pretty),

        Commands::Select {
            behavior,
            personas,
            sections,
            options,
            pretty,
        } => cmd_select(&behavior, &personas, &sections, options.as_deref(), pretty),

        Commands::Validate { personas, json } => cmd_validate(&personas, json),

        Commands::Doctor {
            personas,
            sections,
            json,
        } => cmd_doctor(personas.as_deref(), sections.as_deref(), json),

        Commands::Schema { schema_type } => cmd_schema(schema_type),
    }
}

fn read_input(path: &Path) -> Result<String, PengineError> {
    if path.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(path)?)
    }
}

fn cmd_score(
    behavior_path: &Path,
    personas_path: &Path,
    min_confidence: f64,
    pretty: bool,
) -> Result<(), PengineError> {
    let behavior = parse_behavior(&read_input(behavior_path)?)?;
    let personas = parse_personas(&read_input(personas_path)?)?;

    let compiled: Vec<CompiledPersona> = personas.iter().map(CompiledPersona::compile).collect();
    let signals = extract_signals(&behavior);
    let options = ScoringOptions {
        min_confidence,
        ..Default::default()
    };
    let result = match_persona(&compiled, &signals, &behavior, &options);

    let output = if pretty {
        serde_json::to_string_pretty(&result)?
    } else {
        serde_json::to_string(&result)?
    };
    println!("{}", output);
    Ok(())
}

fn cmd_select(
    behavior_path: &Path,
    personas_path: &Path,
    sections_path: &Path,
    options_path: Option<&Path>,
    pretty: bool,
) -> Result<(), PengineError> {
    let behavior = parse_behavior(&read_input(behavior_path)?)?;
    let personas = parse_personas(&read_input(personas_path)?)?;
    let sections = parse_sections(&read_input(sections_path)?)?;

    let mut options: EngineOptions = match options_path {
        Some(path) => serde_json::from_str(&read_input(path)?)?,
        None => EngineOptions::default(),
    };
    // A one-shot run has no renderer; never leave a window open
    options.animation.enabled = false;

    let mut engine = AdaptationEngine::new(EngineDescriptor {
        sections,
        personas,
        options,
        ..Default::default()
    });

    let result = match engine.process_detection(&behavior) {
        DetectionOutcome::Applied(result) => result,
        // Unreachable with animations disabled
        DetectionOutcome::Deferred => return Err(PengineError::Deferred),
    };

    let report = serde_json::json!({
        "selection": result,
        "state": engine.state(),
        "content": engine.content_map(),
    });

    let output = if pretty {
        serde_json::to_string_pretty(&report)?
    } else {
        serde_json::to_string(&report)?
    };
    println!("{}", output);
    Ok(())
}

fn cmd_validate(personas_path: &Path, json: bool) -> Result<(), PengineError> {
    let personas = parse_personas(&read_input(personas_path)?)?;
    let warnings = lint_personas(&personas);

    if json {
        let report = serde_json::json!({
            "personas": personas.len(),
            "warnings": warnings,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Persona Lint Report");
        println!("===================");
        println!("Personas: {}", personas.len());
        println!("Warnings: {}", warnings.len());

        if !warnings.is_empty() {
            println!();
            for warning in &warnings {
                match &warning.rule_id {
                    Some(rule_id) => println!(
                        "  - {} / {}: {}",
                        warning.persona_id, rule_id, warning.message
                    ),
                    None => println!("  - {}: {}", warning.persona_id, warning.message),
                }
            }
        }
    }

    if warnings.is_empty() {
        Ok(())
    } else {
        Err(PengineError::LintFailed(warnings.len()))
    }
}

fn cmd_doctor(
    personas: Option<&Path>,
    sections: Option<&Path>,
    json: bool,
) -> Result<(), PengineError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "engine_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Persona Engine version {}", ENGINE_VERSION),
    });

    if let Some(path) = personas {
        checks.push(check_config_file(path, "personas", |data| {
            let personas = parse_personas(data)?;
            let warnings = lint_personas(&personas);
            if warnings.is_empty() {
                Ok(format!("{} personas, no lint warnings", personas.len()))
            } else {
                Ok(format!(
                    "{} personas, {} lint warnings (run 'pengine validate')",
                    personas.len(),
                    warnings.len()
                ))
            }
        }));
    }

    if let Some(path) = sections {
        checks.push(check_config_file(path, "sections", |data| {
            let sections = parse_sections(data)?;
            Ok(format!("{} sections", sections.len()))
        }));
    }

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
            message: "stdin is a pipe (streaming mode ready)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: ENGINE_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Persona Engine Doctor Report");
        println!("============================");
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
        Err(PengineError::DoctorFailed)
    } else {
        Ok(())
    }
}

fn check_config_file<F>(path: &Path, name: &str, parse: F) -> DoctorCheck
where
    F: Fn(&str) -> Result<String, PengineError>,
{
    if !path.exists() {
        return DoctorCheck {
            name: name.to_string(),
            status: CheckStatus::Warning,
            message: format!("{} file does not exist", name),
        };
    }
    match fs::read_to_string(path) {
        Ok(data) => match parse(&data) {
            Ok(message) => DoctorCheck {
                name: name.to_string(),
                status: CheckStatus::Ok,
                message,
            },
            Err(e) => DoctorCheck {
                name: name.to_string(),
                status: CheckStatus::Error,
                message: format!("Invalid {} config: {}", name, e),
            },
        },
        Err(e) => DoctorCheck {
            name: name.to_string(),
            status: CheckStatus::Error,
            message: format!("Cannot read {} file: {}", name, e),
        },
    }
}

fn cmd_schema(schema_type: SchemaType) -> Result<(), PengineError> {
    match schema_type {
        SchemaType::Behavior => {
            println!("Behavior Snapshot Schema");
            println!();
            println!("A cumulative session snapshot, all fields optional:");
            println!();
            println!("- clicks: [{{ section_id, element, timestamp }}]");
            println!("- scrolls: [{{ max_depth (0-100), duration_sec, timestamp }}]");
            println!("- section_dwell: [{{ section_id, seconds }}]");
            println!("- referrer: full referrer URL");
            println!("- utm: {{ source, medium, campaign, term, content }}");
            println!("- form_interactions: [{{ field, completed, timestamp }}]");
            println!("- navigation_path: ordered page paths for this session");
            println!("- device_type: desktop | mobile | tablet");
            println!("- search_queries: on-site search strings");
            println!("- interacted_sections: section ids the visitor engaged with");
        }
        SchemaType::Personas => {
            println!("Persona Configuration Schema");
            println!();
            println!("A JSON array of personas:");
            println!();
            println!("- id: variant id this persona maps to");
            println!("- name: display name");
            println!("- confidence_score: prior multiplier in [0, 1] (default 1.0)");
            println!("- is_active: inactive personas are skipped (default true)");
            println!("- detection_rules: [{{ id, type, condition, value, weight }}]");
            println!();
            println!("Rule types: click_pattern, scroll_behavior, time_on_page,");
            println!("referrer, utm_parameter, content_interaction, form_field,");
            println!("page_sequence, device_type, search_query");
        }
        SchemaType::Sections => {
            println!("Section Configuration Schema");
            println!();
            println!("A JSON array of page sections:");
            println!();
            println!("- section_id: stable section identifier");
            println!("- default_content: {{ headline, subheadline, description,");
            println!("  cta_text, features, ...extra fields }}");
            println!("- persona_variants: map of persona id to content override");
            println!("- visibility: {{ hide_for_personas, show_only_for_personas }}");
        }
    }
    Ok(())
}

// Error types

#[derive(Debug)]
enum PengineError {
    Io(io::Error),
    Engine(persona_engine::EngineError),
    Json(serde_json::Error),
    LintFailed(usize),
    DoctorFailed,
    Deferred,
}

impl std::fmt::Display for PengineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PengineError::Io(e) => write!(f, "{}", e),
            PengineError::Engine(e) => write!(f, "{}", e),
            PengineError::Json(e) => write!(f, "{}", e),
            PengineError::LintFailed(count) => write!(f, "{} lint warnings", count),
            PengineError::DoctorFailed => write!(f, "one or more health checks failed"),
            PengineError::Deferred => write!(f, "detection was deferred"),
        }
    }
}

impl From<io::Error> for PengineError {
    fn from(e: io::Error) -> Self {
        PengineError::Io(e)
    }
}

impl From<persona_engine::EngineError> for PengineError {
    fn from(e: persona_engine::EngineError) -> Self {
        PengineError::Engine(e)
    }
}

impl From<serde_json::Error> for PengineError {
    fn from(e: serde_json::Error) -> Self {
        PengineError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<PengineError> for CliError {
    fn from(e: PengineError) -> Self {
        match e {
            PengineError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            PengineError::Engine(e) => CliError {
                code: "CONFIG_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Run 'pengine schema' for the expected shapes".to_string()),
            },
            PengineError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            PengineError::LintFailed(count) => CliError {
                code: "LINT_FAILED".to_string(),
                message: format!("{} persona rules raised warnings", count),
                hint: Some("Fix the reported rules and retry".to_string()),
            },
            PengineError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
            PengineError::Deferred => CliError {
                code: "DEFERRED".to_string(),
                message: "Detection was deferred by an open transition".to_string(),
                hint: None,
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
