use std::env;
use std::fs;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};

use clap::Args;
use owo_colors::OwoColorize;
use serde_json::{Value, json};
use tracing::debug;

use crate::config::{self, ProfileConfig};
use crate::logging;
use crate::ollama::{ClientConfig, DEFAULT_HOST, DEFAULT_MODEL, OllamaClient};
use crate::sentinel::{
    Assessment, DEFAULT_TARGET_LANGUAGE, EcoSentinel, RecoveryMode, TaskKind, TaskRequest, build,
};

/// Flags shared by every assessment subcommand.
#[derive(Debug, Args, Clone, Default)]
pub struct CommonArgs {
    /// Model identifier, e.g. gemma3n:4b
    #[arg(long)]
    pub model: Option<String>,
    /// Inference server base URL
    #[arg(long)]
    pub host: Option<String>,
    /// Request timeout in seconds (default: wait indefinitely)
    #[arg(long)]
    pub timeout: Option<u64>,
    /// Profile from the config file
    #[arg(long)]
    pub profile: Option<String>,
    /// JSON recovery strategy: naive or balanced
    #[arg(long)]
    pub recovery: Option<String>,
    /// Re-encode images as PNG before sending
    #[arg(long)]
    pub normalize_images: bool,
    /// Output format: text or json
    #[arg(long)]
    pub output: Option<String>,
    /// Shorthand for --output json
    #[arg(long)]
    pub json: bool,
    /// Also write the JSON result to this file
    #[arg(long, value_name = "PATH")]
    pub save: Option<PathBuf>,
    /// Print the request instead of sending it
    #[arg(long)]
    pub dry_run: bool,
    /// Log resolved settings and request details to stderr
    #[arg(long, short)]
    pub verbose: bool,
}

#[derive(Debug, Args, Clone)]
pub struct PlantArgs {
    /// Photo of the plant
    pub image: PathBuf,
    /// Extra context, e.g. growing conditions
    #[arg(long, default_value = "")]
    pub info: String,
    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Debug, Args, Clone)]
pub struct HazardArgs {
    /// Landscape photo
    pub image: PathBuf,
    /// Where the photo was taken
    #[arg(long, default_value = "")]
    pub location: String,
    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Debug, Args, Clone)]
pub struct TranslateArgs {
    /// Message to translate; read from stdin when omitted
    pub message: Option<String>,
    /// Target language
    #[arg(long, default_value = DEFAULT_TARGET_LANGUAGE)]
    pub language: String,
    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Debug, Args, Clone)]
pub struct SpeciesArgs {
    /// Photo of the organism
    pub image: PathBuf,
    /// Surrounding ecosystem, e.g. wetland
    #[arg(long, default_value = "")]
    pub ecosystem: String,
    #[command(flatten)]
    pub common: CommonArgs,
}

pub fn run_plant(args: PlantArgs) -> Result<(), String> {
    run(
        TaskRequest::plant_health(args.image, args.info),
        &args.common,
    )
}

pub fn run_hazard(args: HazardArgs) -> Result<(), String> {
    run(
        TaskRequest::environmental_hazard(args.image, args.location),
        &args.common,
    )
}

pub fn run_translate(args: TranslateArgs) -> Result<(), String> {
    let message = match args.message {
        Some(message) => message,
        None => read_stdin_message()?,
    };
    run(
        TaskRequest::emergency_translation(message, args.language),
        &args.common,
    )
}

pub fn run_species(args: SpeciesArgs) -> Result<(), String> {
    run(
        TaskRequest::species_identification(args.image, args.ecosystem),
        &args.common,
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Text,
    Json,
}

impl OutputMode {
    fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Json => "json",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "text" => Some(Self::Text),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Settings {
    client: ClientConfig,
    recovery: RecoveryMode,
    normalize_images: bool,
    output: OutputMode,
}

fn run(request: TaskRequest, common: &CommonArgs) -> Result<(), String> {
    logging::init(common.verbose);

    let settings = resolve_settings(common)?;
    debug!(
        task = %request.kind(),
        model = %settings.client.model,
        host = %settings.client.host,
        timeout_secs = ?settings.client.timeout_secs,
        recovery = settings.recovery.as_str(),
        normalize_images = settings.normalize_images,
        output = settings.output.as_str(),
        "resolved settings"
    );

    if common.dry_run {
        let plan = dry_run_plan(&request, &settings)?;
        let rendered = to_pretty_json(&plan)?;
        if let Some(path) = &common.save {
            save_output(path, &rendered)?;
        }
        println!("{rendered}");
        return Ok(());
    }

    let client = OllamaClient::new(&settings.client).map_err(|err| err.to_string())?;
    let sentinel = EcoSentinel::new(settings.client.clone(), client)
        .with_recovery(settings.recovery)
        .with_normalized_images(settings.normalize_images);

    let kind = request.kind();
    let assessment = sentinel.run(&request).map_err(|err| err.to_string())?;
    let record = to_pretty_json(&assessment.to_value())?;

    if let Some(path) = &common.save {
        save_output(path, &record)?;
    }

    report_compliance(&assessment, kind);
    match settings.output {
        OutputMode::Json => println!("{record}"),
        OutputMode::Text => print!("{}", render_text(&assessment, kind)),
    }
    Ok(())
}

fn resolve_settings(common: &CommonArgs) -> Result<Settings, String> {
    let profile = match &common.profile {
        Some(name) => config::load_profile(name)?,
        None => ProfileConfig::default(),
    };

    let model = common
        .model
        .clone()
        .or_else(|| env_value("ECO_MODEL"))
        .or(profile.model)
        .unwrap_or_else(|| DEFAULT_MODEL.to_string());
    if model.trim().is_empty() {
        return Err("Model must not be empty. Use --model or set ECO_MODEL.".to_string());
    }

    let host = common
        .host
        .clone()
        .or_else(|| env_value("ECO_HOST"))
        .or_else(|| env_value("OLLAMA_HOST"))
        .or(profile.host)
        .map(|host| normalize_host(&host))
        .unwrap_or_else(|| DEFAULT_HOST.to_string());

    let timeout_secs = match common.timeout {
        Some(timeout) => Some(timeout),
        None => match env_value("ECO_TIMEOUT") {
            Some(raw) => Some(raw.trim().parse::<u64>().map_err(|_| {
                format!("Invalid ECO_TIMEOUT '{raw}'. Expected a whole number of seconds.")
            })?),
            None => profile.timeout,
        },
    };

    let recovery = match common
        .recovery
        .clone()
        .or_else(|| env_value("ECO_RECOVERY"))
        .or(profile.recovery)
    {
        Some(raw) => RecoveryMode::parse(&raw).ok_or_else(|| {
            format!(
                "Invalid recovery '{raw}'. Supported values: {}.",
                RecoveryMode::SUPPORTED
            )
        })?,
        None => RecoveryMode::default(),
    };

    let output = if common.json {
        OutputMode::Json
    } else {
        match common
            .output
            .clone()
            .or_else(|| env_value("ECO_OUTPUT"))
            .or(profile.output)
        {
            Some(raw) => OutputMode::parse(&raw).ok_or_else(|| {
                format!("Invalid output '{raw}'. Supported values: text, json.")
            })?,
            None => OutputMode::Text,
        }
    };

    Ok(Settings {
        client: ClientConfig {
            model,
            host,
            timeout_secs,
        },
        recovery,
        normalize_images: common.normalize_images || profile.normalize_images.unwrap_or(false),
        output,
    })
}

fn env_value(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Accepts `OLLAMA_HOST`-style values such as `0.0.0.0:11434`.
fn normalize_host(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    }
}

fn read_stdin_message() -> Result<String, String> {
    let mut stdin = io::stdin();
    if stdin.is_terminal() {
        return Err("No message provided. Pass MESSAGE or pipe it on stdin.".to_string());
    }
    let mut message = String::new();
    stdin
        .read_to_string(&mut message)
        .map_err(|err| format!("Failed to read message from stdin: {err}"))?;
    let message = message.trim().to_string();
    if message.is_empty() {
        return Err("No message provided. Pass MESSAGE or pipe it on stdin.".to_string());
    }
    Ok(message)
}

fn dry_run_plan(request: &TaskRequest, settings: &Settings) -> Result<Value, String> {
    // Images are still read so that path errors surface without a server.
    let built = build(request, settings.normalize_images).map_err(|err| err.to_string())?;
    let images: Vec<Value> = built
        .image
        .iter()
        .map(|image| json!({ "base64_len": image.len() }))
        .collect();

    Ok(json!({
        "dry_run": true,
        "task": built.kind,
        "model": settings.client.model,
        "host": settings.client.host,
        "url": settings.client.generate_url(),
        "timeout_secs": settings.client.timeout_secs,
        "recovery": settings.recovery.as_str(),
        "normalize_images": settings.normalize_images,
        "output": settings.output.as_str(),
        "stream": false,
        "prompt": built.prompt,
        "images": images,
        "expected_fields": built.kind.expected_fields(),
    }))
}

fn to_pretty_json(value: &Value) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|err| format!("Failed to render JSON: {err}"))
}

fn save_output(path: &Path, contents: &str) -> Result<(), String> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|err| {
            format!(
                "Failed to create output directory '{}': {err}",
                parent.display()
            )
        })?;
    }
    fs::write(path, format!("{contents}\n"))
        .map_err(|err| format!("Failed to write output file '{}': {err}", path.display()))
}

fn report_compliance(assessment: &Assessment, kind: TaskKind) {
    if assessment.is_fallback() {
        warn_line("warning: model output contained no parsable JSON object; showing raw response");
        return;
    }
    let missing = assessment.missing_fields(kind);
    if !missing.is_empty() {
        warn_line(&format!(
            "warning: model omitted expected fields: {}",
            missing.join(", ")
        ));
    }
}

fn warn_line(message: &str) {
    if io::stderr().is_terminal() {
        eprintln!("{}", message.yellow());
    } else {
        eprintln!("{message}");
    }
}

fn render_text(assessment: &Assessment, kind: TaskKind) -> String {
    let fields = match assessment {
        Assessment::RawFallback(text) => return format!("{text}\n"),
        Assessment::Structured(fields) => fields,
    };

    let expected = kind.expected_fields();
    let ordered = expected
        .iter()
        .filter_map(|key| fields.get(*key).map(|value| (*key, value)))
        .chain(
            fields
                .iter()
                .filter(|(key, _)| !expected.contains(&key.as_str()))
                .map(|(key, value)| (key.as_str(), value)),
        );

    let mut out = String::new();
    for (key, value) in ordered {
        match value {
            Value::Array(items) => {
                out.push_str(&format!("{key}:\n"));
                for item in items {
                    out.push_str(&format!("  - {}\n", scalar_text(item)));
                }
            }
            other => out.push_str(&format!("{key}: {}\n", scalar_text(other))),
        }
    }
    out
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
