//! CLI binary for loandoc-ident.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `EngineConfig` and prints results.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use loandoc_ident::pipeline::extract::PlainTextExtractor;
use loandoc_ident::pipeline::similarity;
use loandoc_ident::resolve::MetadataMap;
use loandoc_ident::{
    annotate_report, build_clusters, inspect_file, scan_directory, seed_clusters, select_primary,
    BatchReport, DocumentRecord, EngineConfig, GroupingHint, LlmOracle, ProgressCallback,
    ResolutionOutcome, Role, ScanProgressCallback, VersionResolver,
};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
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
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a live progress bar plus one log line per
/// document. Documents complete out of order, so start times are keyed by
/// identifier.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<String, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    /// Create a callback whose bar length is set by `on_scan_start`.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);

        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Listing documents…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} documents  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Scanning");
        self.bar.reset_eta();
    }

    fn elapsed_secs(&self, identifier: &str) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(identifier))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ScanProgressCallback for CliProgressCallback {
    fn on_scan_start(&self, total_documents: usize) {
        self.activate_bar(total_documents);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Scanning {total_documents} documents…"))
        ));
    }

    fn on_document_start(&self, identifier: &str) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(identifier.to_string(), Instant::now());
        }
        self.bar.set_message(identifier.to_string());
    }

    fn on_document_complete(&self, identifier: &str, page_count: usize) {
        let secs = self.elapsed_secs(identifier);
        self.bar.println(format!(
            "  {} {:<48}  {}  {}",
            green("✓"),
            identifier,
            dim(&format!("{page_count:>3} pages")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_document_error(&self, identifier: &str, error: &str) {
        let secs = self.elapsed_secs(identifier);
        self.errors.fetch_add(1, Ordering::SeqCst);

        // Truncate very long error messages to keep output tidy.
        let msg: String = if error.chars().count() > 80 {
            let mut m: String = error.chars().take(79).collect();
            m.push('\u{2026}');
            m
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} {:<48}  {}  {}",
            red("✗"),
            identifier,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_scan_complete(&self, total_documents: usize, error_count: usize) {
        self.bar.finish_and_clear();
        if error_count == 0 {
            eprintln!(
                "{} {} documents scanned",
                green("✔"),
                bold(&total_documents.to_string())
            );
        } else {
            eprintln!(
                "{} {} documents scanned  ({} unreadable)",
                cyan("⚠"),
                bold(&total_documents.to_string()),
                red(&error_count.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Classify every PDF of a loan file
  loandoc scan loans/1042

  # Full JSON report for downstream tooling
  loandoc --json scan loans/1042 > report.json

  # Text-layer sidecars produced by an OCR step
  loandoc scan --text-sidecars loans/1042/ocr

  # Fingerprints of one document
  loandoc fingerprint loans/1042/w2-2023.pdf

  # Are two first pages visually the same form?
  loandoc compare a.pdf b.pdf

  # Candidate version clusters, merged with a classifier's grouping
  loandoc clusters loans/1042 --hints groups.json

  # Confirm clusters with an LLM and pick canonical documents
  loandoc resolve loans/1042 --hints groups.json --metadata fields.json

FILE FORMATS:
  --hints     JSON array: [{"label": "Paystubs", "members": ["a.pdf", "b.pdf"]}]
  --metadata  JSON object keyed by identifier: {"a.pdf": {"employer": "Acme"}}

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key (resolve only)
  ANTHROPIC_API_KEY       Anthropic API key (resolve only)
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to libpdfium; otherwise the working directory
                          and then the system library are tried
  RUST_LOG                Log filter, overrides -v / -q
"#;

/// Identify duplicate and superseded documents in mortgage loan files.
#[derive(Parser, Debug)]
#[command(
    name = "loandoc",
    version,
    about = "Identify duplicate and superseded documents in mortgage loan files",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Output structured JSON instead of a summary.
    #[arg(long, global = true, env = "LOANDOC_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, global = true, env = "LOANDOC_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "LOANDOC_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "LOANDOC_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Classify every document of a loan directory.
    Scan {
        dir: PathBuf,
        #[command(flatten)]
        engine: EngineArgs,
    },
    /// Print content and visual fingerprints of one document.
    Fingerprint {
        file: PathBuf,
        #[command(flatten)]
        engine: EngineArgs,
    },
    /// Compare the visual fingerprints of two documents.
    Compare {
        first: PathBuf,
        second: PathBuf,
        #[command(flatten)]
        engine: EngineArgs,
    },
    /// Print the latest date found in a document's text.
    Date {
        file: PathBuf,
        #[command(flatten)]
        engine: EngineArgs,
    },
    /// Seed candidate version clusters for a loan directory.
    Clusters {
        dir: PathBuf,
        /// JSON file with external grouping hints.
        #[arg(long, env = "LOANDOC_HINTS")]
        hints: Option<PathBuf>,
        #[command(flatten)]
        engine: EngineArgs,
    },
    /// Seed clusters, then confirm them with an LLM.
    Resolve {
        dir: PathBuf,
        /// JSON file with external grouping hints.
        #[arg(long, env = "LOANDOC_HINTS")]
        hints: Option<PathBuf>,
        /// JSON file with previously extracted fields per document.
        #[arg(long, env = "LOANDOC_METADATA")]
        metadata: Option<PathBuf>,
        #[command(flatten)]
        engine: EngineArgs,
        #[command(flatten)]
        llm: LlmArgs,
    },
}

#[derive(Args, Debug, Clone)]
struct EngineArgs {
    /// Documents processed at once (default: available parallelism).
    #[arg(short, long, env = "LOANDOC_CONCURRENCY")]
    concurrency: Option<usize>,

    /// Per-document processing budget in seconds.
    #[arg(long, env = "LOANDOC_TIMEOUT", default_value_t = 30)]
    timeout: u64,

    /// Longest edge of the first-page raster in pixels.
    #[arg(long, env = "LOANDOC_RASTER_PIXELS", default_value_t = 800)]
    raster_pixels: u32,

    /// Perceptual hash grid edge (8–64).
    #[arg(long, env = "LOANDOC_HASH_SIZE", default_value_t = 16)]
    hash_size: u32,

    /// Maximum per-kind hash distance counted as a match.
    #[arg(long, env = "LOANDOC_THRESHOLD", default_value_t = 5)]
    threshold: usize,

    /// Trimmed text must be longer than this to be hashed.
    #[arg(long, env = "LOANDOC_MIN_CHARS", default_value_t = 50)]
    min_chars: usize,

    /// Skip rasterisation and perceptual hashing.
    #[arg(long, env = "LOANDOC_NO_VISUAL")]
    no_visual: bool,

    /// Read `.txt` text-layer files instead of PDFs (implies --no-visual).
    #[arg(long, env = "LOANDOC_TEXT_SIDECARS")]
    text_sidecars: bool,

    /// Descend into subdirectories.
    #[arg(short, long, env = "LOANDOC_RECURSIVE")]
    recursive: bool,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "LOANDOC_PASSWORD")]
    password: Option<String>,

    /// Anchor year for the date plausibility window (default: current year).
    #[arg(long, env = "LOANDOC_REFERENCE_YEAR")]
    reference_year: Option<i32>,
}

#[derive(Args, Debug, Clone)]
struct LlmArgs {
    /// LLM model ID (e.g. gpt-4.1-nano, gpt-4.1, claude-sonnet-4-20250514).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "LOANDOC_TEMPERATURE", default_value_t = 0.0)]
    temperature: f32,

    /// Max LLM output tokens per confirmation.
    #[arg(long, env = "LOANDOC_MAX_TOKENS", default_value_t = 2048)]
    max_tokens: usize,

    /// Retries per cluster on LLM failure.
    #[arg(long, env = "LOANDOC_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Per-call LLM timeout in seconds.
    #[arg(long, env = "LOANDOC_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
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

    let progress = || -> Option<ProgressCallback> {
        if show_progress {
            let cb = CliProgressCallback::new_dynamic();
            Some(cb as Arc<dyn ScanProgressCallback>)
        } else {
            None
        }
    };

    match &cli.command {
        Command::Scan { dir, engine } => {
            let config = build_config(engine, None, progress())?;
            let report = scan_directory(dir, &config).await.context("Scan failed")?;
            if cli.json {
                print_json(&report)?;
            } else {
                print_report(&report, cli.quiet);
            }
        }

        Command::Fingerprint { file, engine } => {
            let config = build_config(engine, None, None)?;
            let record = inspect(file, &config).await?;
            print_json(&record)?;
        }

        Command::Compare {
            first,
            second,
            engine,
        } => {
            let config = build_config(engine, None, None)?;
            let a = inspect(first, &config).await?;
            let b = inspect(second, &config).await?;
            print_comparison(&a, &b, config.similarity_threshold, cli.json)?;
        }

        Command::Date { file, engine } => {
            let mut config = build_config(engine, None, None)?;
            config.visual_fingerprints = false;
            let record = inspect(file, &config).await?;
            if cli.json {
                print_json(&serde_json::json!({
                    "identifier": record.identifier,
                    "inferred_date": record.inferred_date,
                }))?;
            } else {
                match record.inferred_date {
                    Some(d) => println!("{d}"),
                    None => println!("{}", dim("no date found")),
                }
            }
        }

        Command::Clusters { dir, hints, engine } => {
            let config = build_config(engine, None, progress())?;
            let hints = load_hints(hints.as_deref()).await?;
            let report = scan_directory(dir, &config).await.context("Scan failed")?;
            let candidates = seed_clusters(&report, &hints, config.similarity_threshold);
            if cli.json {
                print_json(&candidates)?;
            } else {
                for (i, c) in candidates.iter().enumerate() {
                    let signals: Vec<String> = c
                        .signals
                        .iter()
                        .map(|s| format!("{s:?}").to_lowercase())
                        .collect();
                    println!(
                        "{} {}  {}",
                        cyan(&format!("#{}", i + 1)),
                        bold(c.label.as_deref().unwrap_or("(unlabelled)")),
                        dim(&signals.join("+")),
                    );
                    for m in &c.members {
                        println!("    {m}");
                    }
                }
                if !cli.quiet {
                    eprintln!("{} candidate clusters", candidates.len());
                }
            }
        }

        Command::Resolve {
            dir,
            hints,
            metadata,
            engine,
            llm,
        } => {
            let config = build_config(engine, Some(llm), progress())?;
            let hints = load_hints(hints.as_deref()).await?;
            let metadata = load_metadata(metadata.as_deref()).await?;
            let oracle = LlmOracle::from_config(&config).context("LLM provider unavailable")?;

            let mut report = scan_directory(dir, &config).await.context("Scan failed")?;
            let candidates = seed_clusters(&report, &hints, config.similarity_threshold);
            let mut clusters = build_clusters(&candidates, &report, &metadata);

            let resolver = VersionResolver::new(oracle, &config);
            let outcomes = resolver.resolve_all(&mut clusters).await;
            annotate_report(&mut report, &clusters);

            if cli.json {
                print_json(&serde_json::json!({
                    "report": report,
                    "clusters": clusters,
                    "outcomes": outcomes,
                }))?;
            } else {
                for (cluster, outcome) in clusters.iter().zip(&outcomes) {
                    match outcome {
                        ResolutionOutcome::Resolved { canonical, .. } => {
                            println!(
                                "{} {}  {}",
                                green("✓"),
                                bold(cluster.label.as_deref().unwrap_or(&cluster.id)),
                                dim(&cluster
                                    .kind
                                    .map(|k| format!("{k:?}").to_lowercase())
                                    .unwrap_or_default()),
                            );
                            for (entity, doc) in canonical {
                                println!("    {entity:<14} {doc}");
                            }
                            if let Some(primary) = select_primary(cluster) {
                                println!("    {:<14} {}", dim("primary"), primary.identifier);
                            }
                        }
                        ResolutionOutcome::NeedsRetry { reason, .. } => {
                            println!("{} {}  {}", red("✗"), bold(&cluster.id), red(&reason.to_string()));
                        }
                    }
                }
            }

            let unresolved = outcomes.iter().filter(|o| !o.is_resolved()).count();
            if unresolved > 0 && !cli.quiet {
                eprintln!(
                    "{} {}/{} clusters need another resolution attempt",
                    cyan("⚠"),
                    unresolved,
                    outcomes.len()
                );
            }
        }
    }

    Ok(())
}

/// Map CLI args to `EngineConfig`.
fn build_config(
    engine: &EngineArgs,
    llm: Option<&LlmArgs>,
    progress: Option<ProgressCallback>,
) -> Result<EngineConfig> {
    let mut builder = EngineConfig::builder()
        .document_timeout_secs(engine.timeout)
        .raster_max_pixels(engine.raster_pixels)
        .hash_size(engine.hash_size)
        .similarity_threshold(engine.threshold)
        .min_extractable_chars(engine.min_chars)
        .visual_fingerprints(!engine.no_visual && !engine.text_sidecars)
        .recursive(engine.recursive);

    if let Some(n) = engine.concurrency {
        builder = builder.concurrency(n);
    }
    if engine.text_sidecars {
        builder = builder
            .extensions(["txt"])
            .extractor(Arc::new(PlainTextExtractor));
    }
    if let Some(ref pwd) = engine.password {
        builder = builder.password(pwd.clone());
    }
    if let Some(year) = engine.reference_year {
        builder = builder.reference_year(year);
    }
    if let Some(llm) = llm {
        builder = builder
            .temperature(llm.temperature)
            .max_tokens(llm.max_tokens)
            .max_retries(llm.max_retries)
            .api_timeout_secs(llm.api_timeout);
        if let Some(ref model) = llm.model {
            builder = builder.model(model.clone());
        }
        if let Some(ref provider) = llm.provider {
            builder = builder.provider_name(provider.clone());
        }
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

async fn inspect(path: &Path, config: &EngineConfig) -> Result<DocumentRecord> {
    inspect_file(path, config)
        .await
        .with_context(|| format!("Failed to inspect {}", path.display()))
}

async fn load_hints(path: Option<&Path>) -> Result<Vec<GroupingHint>> {
    let Some(path) = path else {
        return Ok(Vec::new());
    };
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read hints from {:?}", path))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid hints file {:?}", path))
}

async fn load_metadata(path: Option<&Path>) -> Result<MetadataMap> {
    let Some(path) = path else {
        return Ok(MetadataMap::new());
    };
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read metadata from {:?}", path))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid metadata file {:?}", path))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialise output")?;
    println!("{json}");
    Ok(())
}

fn print_report(report: &BatchReport, quiet: bool) {
    for doc in &report.documents {
        let role = match doc.role {
            Role::Unique => green("unique   "),
            Role::Master => cyan("master   "),
            Role::Duplicate => dim("duplicate"),
            Role::Error => red("error    "),
        };
        let detail = match (&doc.master, &doc.error) {
            (Some(master), _) => dim(&format!("→ {master}")),
            (_, Some(err)) => red(&err.to_string()),
            _ if !doc.extractable => dim("(no text layer)"),
            _ => String::new(),
        };
        println!("{role}  {:<48}  {detail}", doc.identifier);
    }

    if !quiet {
        eprintln!(
            "{}  {} documents: {} distinct ({} unique + {} master), {} duplicate, {} error  {}ms",
            if report.error == 0 { green("✔") } else { cyan("⚠") },
            report.total,
            report.unique_total(),
            report.unique,
            report.master,
            report.duplicate,
            report.error,
            report.duration_ms,
        );
    }
}

fn print_comparison(a: &DocumentRecord, b: &DocumentRecord, threshold: usize, json: bool) -> Result<()> {
    let same_content = a.content_fingerprint.is_some() && a.content_fingerprint == b.content_fingerprint;
    let similar = similarity::are_similar(
        a.visual_fingerprint.as_ref(),
        b.visual_fingerprint.as_ref(),
        threshold,
    );
    let distances = match (&a.visual_fingerprint, &b.visual_fingerprint) {
        (Some(fa), Some(fb)) => similarity::distances(fa, fb).to_vec(),
        _ => Vec::new(),
    };

    if json {
        let per_kind: serde_json::Map<String, serde_json::Value> = distances
            .iter()
            .map(|(kind, d)| (kind.to_string(), serde_json::json!(d)))
            .collect();
        return print_json(&serde_json::json!({
            "first": a.identifier,
            "second": b.identifier,
            "same_content": same_content,
            "distances": per_kind,
            "threshold": threshold,
            "similar": similar,
        }));
    }

    if distances.is_empty() {
        println!("{}", dim("visual fingerprint unavailable for at least one document"));
    }
    for (kind, d) in &distances {
        let shown = d.map_or_else(|| "incomparable".to_string(), |d| d.to_string());
        let mark = if matches!(d, Some(d) if *d <= threshold) { green("✓") } else { red("✗") };
        println!("  {mark} {kind}  {shown}");
    }
    println!(
        "{}  {}",
        if similar { green("similar") } else { red("not similar") },
        if same_content { dim("(identical text)") } else { String::new() },
    );
    Ok(())
}
