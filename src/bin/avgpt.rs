//! CLI binary for avgpt.
//!
//! A thin shim over the library crate: `serve` runs the HTTP service,
//! `interpret` analyses PDF drawings from the command line, and `text`
//! interprets OCR text that has already been extracted.

use anyhow::{Context, Result};
use async_trait::async_trait;
use avgpt::server::{self, AppState};
use avgpt::{
    AvError, Completion, CompletionBackend, Extras, FileTaxonomyStore, InterpretRequest,
    Interpreter, InterpreterConfig, Pipeline, PipelineCallback, ProviderBackend, ServerConfig,
};
use clap::{Args, Parser, Subcommand};
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Read};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

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

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner plus one log line per finished stage. Drawings may be analysed
/// concurrently, so every line names the drawing it belongs to.
struct CliProgressCallback {
    bar: ProgressBar,
    in_flight: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Analysing");
        bar.set_message("Opening PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            in_flight: AtomicUsize::new(0),
        })
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl PipelineCallback for CliProgressCallback {
    fn on_extraction_start(&self, name: &str) {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        self.bar.set_message(format!("reading {name}"));
    }

    fn on_extraction_complete(&self, name: &str, chars: usize) {
        self.bar.println(format!(
            "  {} {:<32} {}",
            green("✓"),
            name,
            dim(&format!("{chars:>6} chars extracted"))
        ));
    }

    fn on_interpretation_start(&self, name: &str, _text_chars: usize) {
        self.bar.set_message(format!("interpreting {name}"));
    }

    fn on_interpretation_complete(&self, devices: usize) {
        self.bar
            .println(format!("  {} {}", green("✓"), dim(&format!("{devices} devices identified"))));
    }

    fn on_export_complete(&self, artifacts: usize) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.bar
            .println(format!("  {} {}", green("✓"), dim(&format!("{artifacts} files written"))));
        if self.in_flight.load(Ordering::SeqCst) == 0 {
            self.bar.set_message("waiting…");
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Run the HTTP service on :8000
  avgpt serve

  # Analyse a drawing and export summary, pull sheet and BOM
  avgpt interpret plan.pdf --pull-sheet --bom

  # Several drawings at once, JSON on stdout
  avgpt interpret --json -c 4 AV-101.pdf AV-102.pdf https://example.com/AV-103.pdf

  # Interpret OCR text that was extracted elsewhere
  avgpt text ocr.txt
  pdftotext plan.pdf - | avgpt text -

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  AVGPT_MODEL             Model ID (default gpt-4)
  AVGPT_PROVIDER          Provider name (openai, anthropic, gemini, ollama, ...)
  AVGPT_TAXONOMY          Taxonomy document (default taxonomy_db.json)
  AVGPT_OUTPUT_DIR        Directory for generated files (default generated)
  AVGPT_PDFIUM_LIB_DIR    Directory containing libpdfium
  RUST_LOG                Log filter, overrides --verbose/--quiet
"#;

/// Interpret AV system drawings with an LLM.
#[derive(Parser, Debug)]
#[command(
    name = "avgpt",
    version,
    about = "Interpret AV system drawings with an LLM",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "AVGPT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "AVGPT_QUIET")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP service.
    Serve(ServeArgs),
    /// Analyse PDF drawings (local paths or URLs) and export documents.
    Interpret(InterpretArgs),
    /// Interpret OCR text from a file, or `-` for stdin.
    Text(TextArgs),
}

#[derive(Args, Debug)]
struct LlmArgs {
    /// LLM model ID.
    #[arg(long, env = "AVGPT_MODEL")]
    model: Option<String>,

    /// LLM provider. Auto-detected from API key env vars if not set.
    #[arg(long, env = "AVGPT_PROVIDER")]
    provider: Option<String>,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "AVGPT_TEMPERATURE", default_value_t = 0.3)]
    temperature: f32,

    /// Max LLM output tokens.
    #[arg(long, env = "AVGPT_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,
}

#[derive(Args, Debug)]
struct StoreArgs {
    /// Taxonomy document shared by every interpretation.
    #[arg(long, env = "AVGPT_TAXONOMY", default_value = "taxonomy_db.json")]
    taxonomy: PathBuf,

    /// Directory generated PDF and CSV files are written to.
    #[arg(long, env = "AVGPT_OUTPUT_DIR", default_value = "generated")]
    output_dir: PathBuf,

    /// Directory containing libpdfium. Uses the system library if unset.
    #[arg(long, env = "AVGPT_PDFIUM_LIB_DIR")]
    pdfium_lib_dir: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ExtraArgs {
    /// Ask for a cable pull sheet.
    #[arg(long)]
    pull_sheet: bool,

    /// Ask for a reflected bill of materials.
    #[arg(long)]
    bom: bool,

    /// Ask for a detailed narrative summary.
    #[arg(long)]
    detailed_summary: bool,

    /// Ask for a system verification checklist.
    #[arg(long)]
    verification: bool,
}

impl ExtraArgs {
    fn extras(&self) -> Extras {
        Extras {
            pull_sheet: self.pull_sheet,
            bom: self.bom,
            detailed_summary: self.detailed_summary,
            verification: self.verification,
        }
    }
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Address to listen on.
    #[arg(long, env = "AVGPT_BIND", default_value = "0.0.0.0:8000")]
    bind: SocketAddr,

    /// Largest accepted upload, in MiB.
    #[arg(long, env = "AVGPT_MAX_UPLOAD_MB", default_value_t = 50)]
    max_upload_mb: usize,

    #[command(flatten)]
    store: StoreArgs,

    #[command(flatten)]
    llm: LlmArgs,
}

#[derive(Args, Debug)]
struct InterpretArgs {
    /// Local PDF paths or HTTP/HTTPS URLs.
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Drawings analysed at the same time.
    #[arg(short, long, env = "AVGPT_CONCURRENCY", default_value_t = 2)]
    concurrency: usize,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "AVGPT_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Print each result as JSON instead of a summary.
    #[arg(long)]
    json: bool,

    #[command(flatten)]
    extras: ExtraArgs,

    #[command(flatten)]
    store: StoreArgs,

    #[command(flatten)]
    llm: LlmArgs,
}

#[derive(Args, Debug)]
struct TextArgs {
    /// File containing OCR text, or `-` for stdin.
    input: String,

    /// Print the prompt that would be sent and exit.
    #[arg(long)]
    print_prompt: bool,

    /// Taxonomy document shared by every interpretation.
    #[arg(long, env = "AVGPT_TAXONOMY", default_value = "taxonomy_db.json")]
    taxonomy: PathBuf,

    #[command(flatten)]
    extras: ExtraArgs,

    #[command(flatten)]
    llm: LlmArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        match cli.command {
            // The spinner gives all the feedback that matters interactively.
            Command::Interpret(ref args) if !args.json => "warn",
            _ => "info",
        }
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::Serve(args) => run_serve(args).await,
        Command::Interpret(args) => run_interpret(args, cli.quiet).await,
        Command::Text(args) => run_text(args).await,
    }
}

/// Map LLM flags to an [`InterpreterConfig`] and resolve a provider.
///
/// A missing credential is fatal: nothing useful can run without one.
fn build_backend(llm: &LlmArgs) -> Result<ProviderBackend> {
    let mut builder = InterpreterConfig::builder()
        .temperature(llm.temperature)
        .max_tokens(llm.max_tokens);
    if let Some(ref model) = llm.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = llm.provider {
        builder = builder.provider_name(provider.clone());
    }
    let config = builder.build().context("Invalid configuration")?;

    ProviderBackend::from_config(&config)
        .context("No LLM credential available; set OPENAI_API_KEY or pass --provider")
}

impl StoreArgs {
    fn server_config(&self) -> ServerConfig {
        ServerConfig {
            taxonomy_path: self.taxonomy.clone(),
            output_dir: self.output_dir.clone(),
            pdfium_lib_dir: self.pdfium_lib_dir.clone(),
            ..ServerConfig::default()
        }
    }
}

async fn run_serve(args: ServeArgs) -> Result<()> {
    let config = ServerConfig {
        bind: args.bind,
        max_upload_bytes: args.max_upload_mb.saturating_mul(1024 * 1024),
        ..args.store.server_config()
    };
    tracing::info!("Starting avgpt v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Taxonomy: {}", config.taxonomy_path.display());
    tracing::info!("Output directory: {}", config.output_dir.display());

    let backend = build_backend(&args.llm)?;
    let state = AppState::from_config(config, Arc::new(backend)).context("PDF engine unavailable")?;
    server::serve(state).await.context("Server failed")?;
    Ok(())
}

async fn run_interpret(args: InterpretArgs, quiet: bool) -> Result<()> {
    let backend = build_backend(&args.llm)?;
    let mut pipeline = Pipeline::with_pdfium(&args.store.server_config(), Arc::new(backend))
        .context("PDF engine unavailable")?;

    let progress = if !quiet && !args.json {
        let cb = CliProgressCallback::new();
        pipeline = pipeline.with_callback(cb.clone());
        Some(cb)
    } else {
        None
    };

    let extras = args.extras.extras();
    let timeout = args.download_timeout;
    let results: Vec<_> = stream::iter(args.inputs.iter())
        .map(|input| {
            let pipeline = pipeline.clone();
            async move { (input, pipeline.analyze_input(input, timeout, extras).await) }
        })
        .buffer_unordered(args.concurrency.max(1))
        .collect()
        .await;

    if let Some(cb) = progress {
        cb.finish();
    }

    let mut failed = 0usize;
    for (input, result) in results {
        match result {
            Ok(output) if args.json => {
                let json =
                    serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
                println!("{json}");
            }
            Ok(output) => {
                if quiet {
                    continue;
                }
                eprintln!("{} {}", green("✔"), bold(input));
                println!("{}", output.interpretation.summary.trim());
                for name in output.filenames() {
                    eprintln!(
                        "   {}",
                        dim(&args.store.output_dir.join(name).display().to_string())
                    );
                }
                eprintln!(
                    "   {}",
                    dim(&format!(
                        "{} chars  /  {}ms total",
                        output.stats.extracted_chars, output.stats.total_ms
                    ))
                );
            }
            Err(e) => {
                failed += 1;
                eprintln!("{} {}: {}", red("✘"), bold(input), e);
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {} drawings failed", args.inputs.len());
    }
    Ok(())
}

async fn run_text(args: TextArgs) -> Result<()> {
    let ocr_text = if args.input == "-" {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read OCR text from stdin")?;
        buf
    } else {
        tokio::fs::read_to_string(&args.input)
            .await
            .with_context(|| format!("Failed to read OCR text from {:?}", args.input))?
    };
    let request = InterpretRequest::new(ocr_text).with_extras(args.extras.extras());

    let taxonomy = Arc::new(FileTaxonomyStore::new(&args.taxonomy));
    if args.print_prompt {
        let interpreter = Interpreter::new(Arc::new(DryRun), taxonomy);
        let prompt = interpreter
            .prompt_for(&request)
            .await
            .context("Failed to load taxonomy")?;
        println!("{prompt}");
        return Ok(());
    }

    let interpreter = Interpreter::new(Arc::new(build_backend(&args.llm)?), taxonomy);
    let interpretation = interpreter
        .interpret(&request)
        .await
        .context("Interpretation failed")?;
    println!(
        "{}",
        serde_json::to_string_pretty(&interpretation).context("Failed to serialise output")?
    );
    Ok(())
}

/// Backend for `--print-prompt`, which never calls the LLM.
struct DryRun;

#[async_trait]
impl CompletionBackend for DryRun {
    async fn complete(&self, _prompt: &str) -> Result<Completion, AvError> {
        Err(AvError::Internal("dry run: no LLM call is made".into()))
    }
}
