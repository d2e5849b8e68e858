//! CLI binary for edgequake-receipt.
//!
//! A thin shim over the library crate: `extract` maps flags to
//! `ExtractionConfig` and prints the result, `serve` runs the HTTP service.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use edgequake_receipt::{
    export_as, extract_file, render_with_currency, server, write_export, ExportFormat,
    ExtractionConfig, ReceiptError, ReceiptSchema,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Print a readable summary of a receipt
  receipt2json extract receipt.jpg

  # Line items as CSV, written next to the image
  receipt2json extract receipt.jpg -o receipt.csv

  # Raw JSON on stdout, legacy summary shape
  receipt2json extract --format json --schema summary receipt.png

  # Receipt hosted elsewhere
  receipt2json extract https://example.com/scans/0187.jpg --format json

  # HTTP service on port 8080
  receipt2json serve --addr 0.0.0.0:8080

HTTP ENDPOINTS (serve):
  GET  /health                 liveness and version
  POST /api/extract            multipart upload, field "file"
  POST /api/render             record JSON → display view
  POST /api/export/json|csv    record JSON → attachment

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY            Google Gemini API key (default credential)
  RECEIPT2JSON_PROVIDER     Provider name (gemini, openai, anthropic, ollama, …)
  RECEIPT2JSON_MODEL        Model ID
  RECEIPT2JSON_API_KEY_ENV  Credential variable to check instead of GEMINI_API_KEY
  RUST_LOG                  Log filter, overrides --verbose / --quiet

  A .env file in the working directory is loaded at startup.
"#;

/// Extract structured data from receipt images using Vision LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "receipt2json",
    version,
    about = "Extract structured data from receipt images using Vision LLMs",
    long_about = "Read a photo or scan of a retail receipt with a Vision Language Model and \
turn it into structured JSON: store and fiscal data, one row per purchased item, totals and \
payment breakdown. Results can be printed, exported as JSON or CSV, or served over HTTP.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "RECEIPT2JSON_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "RECEIPT2JSON_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract one receipt image (local path or HTTP/HTTPS URL).
    Extract(ExtractArgs),
    /// Run the HTTP service.
    Serve(ServeArgs),
}

#[derive(Args, Debug)]
struct ExtractArgs {
    /// Local image path or HTTP/HTTPS URL.
    input: String,

    /// Write the result to this file instead of stdout.
    #[arg(short, long, env = "RECEIPT2JSON_OUTPUT")]
    output: Option<PathBuf>,

    /// Output format. Default: view on stdout, or from the --output extension.
    #[arg(short, long, env = "RECEIPT2JSON_FORMAT", value_enum)]
    format: Option<OutputArg>,

    /// Disable the spinner.
    #[arg(long, env = "RECEIPT2JSON_NO_PROGRESS")]
    no_progress: bool,

    #[command(flatten)]
    model: ModelArgs,
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Address to listen on.
    #[arg(long, env = "RECEIPT2JSON_ADDR", default_value = "127.0.0.1:3000")]
    addr: SocketAddr,

    /// Largest accepted upload, in MiB.
    #[arg(long, env = "RECEIPT2JSON_MAX_UPLOAD_MB", default_value_t = 10,
          value_parser = clap::value_parser!(u64).range(1..=100))]
    max_upload_mb: u64,

    #[command(flatten)]
    model: ModelArgs,
}

/// Flags shared by `extract` and `serve`.
#[derive(Args, Debug)]
struct ModelArgs {
    /// Vision model ID (e.g. gemini-2.0-flash, gpt-4.1-mini).
    #[arg(long, env = "RECEIPT2JSON_MODEL")]
    model: Option<String>,

    /// LLM provider: gemini, openai, anthropic, ollama, azure.
    #[arg(long, env = "RECEIPT2JSON_PROVIDER")]
    provider: Option<String>,

    /// Environment variable that must hold the provider credential.
    #[arg(long, env = "RECEIPT2JSON_API_KEY_ENV", default_value = "GEMINI_API_KEY")]
    api_key_env: String,

    /// Record shape requested from the model.
    #[arg(long, env = "RECEIPT2JSON_SCHEMA", value_enum, default_value = "line-items")]
    schema: SchemaArg,

    /// Path to a text file containing a custom extraction prompt.
    #[arg(long, env = "RECEIPT2JSON_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Max LLM output tokens.
    #[arg(long, env = "RECEIPT2JSON_MAX_TOKENS", default_value_t = 8192)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "RECEIPT2JSON_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Retry a failed model call once (0 or 1).
    #[arg(long, env = "RECEIPT2JSON_MAX_RETRIES", default_value_t = 1,
          value_parser = clap::value_parser!(u32).range(0..=1))]
    max_retries: u32,

    /// Model call timeout in seconds.
    #[arg(long, env = "RECEIPT2JSON_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "RECEIPT2JSON_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Currency label for the text view.
    #[arg(long, env = "RECEIPT2JSON_CURRENCY", default_value = "AZN")]
    currency: String,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum OutputArg {
    View,
    Json,
    Csv,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum SchemaArg {
    LineItems,
    Summary,
}

impl From<SchemaArg> for ReceiptSchema {
    fn from(v: SchemaArg) -> Self {
        match v {
            SchemaArg::LineItems => ReceiptSchema::LineItems,
            SchemaArg::Summary => ReceiptSchema::Summary,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Credentials may live in .env; load before clap reads env fallbacks.
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner is the feedback for `extract`; library INFO logs would
    // only interleave with it.
    let show_progress = match &cli.command {
        Command::Extract(args) => !cli.quiet && !args.no_progress,
        Command::Serve(_) => false,
    };
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::Extract(args) => run_extract(args, cli.quiet, show_progress).await,
        Command::Serve(args) => run_serve(args).await,
    }
}

async fn run_extract(args: ExtractArgs, quiet: bool, show_progress: bool) -> Result<()> {
    let config = build_config(&args.model, None).await?;
    let format = resolve_format(args.format, args.output.as_deref());

    let spinner = show_progress.then(|| {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  ⏱ {elapsed}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
        );
        bar.set_prefix("Extracting");
        bar.set_message(format!("{} via {}", args.input, config.model_name()));
        bar.enable_steady_tick(Duration::from_millis(80));
        bar
    });

    let start = Instant::now();
    let outcome = extract_file(&args.input, &config).await;
    if let Some(bar) = &spinner {
        bar.finish_and_clear();
    }

    let record = match outcome {
        Ok(record) => record,
        Err(e) => {
            report_failure(&e, quiet);
            return Err(e).context("Extraction failed");
        }
    };

    let view = render_with_currency(&record, &config.currency);
    let elapsed_ms = start.elapsed().as_millis();

    // ── Emit result ──────────────────────────────────────────────────────
    match (format, &args.output) {
        (OutputArg::View, Some(path)) => {
            tokio::fs::write(path, view.to_string())
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
        }
        (OutputArg::View, None) => {
            print!("{view}");
        }
        (fmt, Some(path)) => {
            write_export(&record, export_format(fmt), path)
                .await
                .context("Export failed")?;
        }
        (fmt, None) => {
            let bytes = export_as(&record, export_format(fmt)).context("Export failed")?;
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            handle
                .write_all(&bytes)
                .context("Failed to write to stdout")?;
            // Ensure a trailing newline on stdout.
            if !bytes.ends_with(b"\n") {
                handle.write_all(b"\n").ok();
            }
        }
    }

    if !quiet {
        // The view already lists its warnings; other formats surface them here.
        if format != OutputArg::View || args.output.is_some() {
            for w in &view.warnings {
                eprintln!("  {} {}", yellow("⚠"), w);
            }
        }
        let target = args
            .output
            .as_ref()
            .map(|p| format!("  →  {}", bold(&p.display().to_string())))
            .unwrap_or_default();
        eprintln!(
            "{}  {} record(s)  {}{}",
            green("✔"),
            record.len(),
            dim(&format!("{elapsed_ms}ms")),
            target
        );
    }

    Ok(())
}

async fn run_serve(args: ServeArgs) -> Result<()> {
    let max_upload = usize::try_from(args.max_upload_mb * 1024 * 1024)
        .context("--max-upload-mb is too large for this platform")?;
    let config = build_config(&args.model, Some(max_upload)).await?;

    // Fail fast on a missing credential instead of on the first upload.
    if std::env::var(&config.api_key_env).map_or(true, |v| v.trim().is_empty()) {
        tracing::warn!(
            "{} is not set; /api/extract will answer with a configuration error",
            config.api_key_env
        );
    }

    server::serve(args.addr, config)
        .await
        .context("HTTP server failed")
}

/// Explain a failed extraction on stderr. The model's raw answer is shown
/// for parse failures, where it is the only clue to what went wrong.
fn report_failure(e: &ReceiptError, quiet: bool) {
    if quiet {
        return;
    }
    eprintln!("{} {}", red("✘"), e);
    if let Some(raw) = e.raw_text() {
        eprintln!("{}", dim("── model output ──"));
        eprintln!("{raw}");
        eprintln!("{}", dim("──────────────────"));
    }
}

/// Pick the output format: explicit flag, else the `--output` extension,
/// else the text view.
fn resolve_format(flag: Option<OutputArg>, output: Option<&Path>) -> OutputArg {
    if let Some(f) = flag {
        return f;
    }
    match output.and_then(|p| p.extension()).and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("csv") => OutputArg::Csv,
        Some(ext) if ext.eq_ignore_ascii_case("txt") => OutputArg::View,
        Some(_) => OutputArg::Json,
        None if output.is_some() => OutputArg::Json,
        None => OutputArg::View,
    }
}

fn export_format(arg: OutputArg) -> ExportFormat {
    match arg {
        OutputArg::Csv => ExportFormat::Csv,
        _ => ExportFormat::Json,
    }
}

/// Map CLI args to `ExtractionConfig`.
async fn build_config(args: &ModelArgs, max_upload_bytes: Option<usize>) -> Result<ExtractionConfig> {
    let mut builder = ExtractionConfig::builder()
        .schema(args.schema.into())
        .api_key_env(&args.api_key_env)
        .max_tokens(args.max_tokens)
        .temperature(args.temperature)
        .max_retries(args.max_retries)
        .api_timeout_secs(args.api_timeout)
        .download_timeout_secs(args.download_timeout)
        .currency(&args.currency);

    if let Some(ref model) = args.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = args.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(ref path) = args.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }
    if let Some(n) = max_upload_bytes {
        builder = builder.max_upload_bytes(n);
    }

    builder.build().context("Invalid configuration")
}
