//! CLI binary for edgequake-ocr2doc.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ConversionConfig`, picks single-file or batch mode, and prints results.

use anyhow::{bail, Context, Result};
use clap::Parser;
use edgequake_ocr2doc::{
    convert_batch, convert_file, ConversionConfig, ConversionOutput, ConversionProgressCallback, OutputFormat,
    ProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
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
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Live progress bar plus one log line per recognised page. Reused across
/// the files of a batch; each document resets the bar.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
}

impl CliProgressCallback {
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Opening input…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_position(0);
        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Recognising");
        self.bar.reset_eta();
    }

    fn page_elapsed_secs(&self, page_num: usize) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&page_num))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_conversion_start(&self, total_pages: usize) {
        self.activate_bar(total_pages);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Recognising {total_pages} page(s)…"))
        ));
    }

    fn on_page_start(&self, page_num: usize, _total: usize) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(page_num, Instant::now());
        }
        self.bar.set_message(format!("page {page_num}"));
    }

    fn on_page_complete(&self, page_num: usize, total: usize, block_count: usize) {
        let secs = self.page_elapsed_secs(page_num);
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {:<10}  {}",
            green("✓"),
            page_num,
            total,
            dim(&format!("{block_count:>4} blocks")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page_num: usize, total: usize, error: &str) {
        let secs = self.page_elapsed_secs(page_num);
        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            red("✗"),
            page_num,
            total,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_conversion_complete(&self, total_pages: usize, success_count: usize) {
        self.bar.finish_and_clear();
        if success_count == total_pages {
            eprintln!(
                "{} {} page(s) recognised",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} page(s) recognised, document abandoned",
                red("✘"),
                bold(&success_count.to_string()),
                total_pages,
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # PDF to Markdown (output/paper.md + output/images/)
  ocr2doc paper.pdf

  # Scanned page to Word
  ocr2doc -f docx scan.png -o out

  # Every PDF, image and .mmd file in a directory
  ocr2doc ./scans -o out

  # Re-render model output that was already recognised (no engine call)
  ocr2doc output/paper_raw.mmd -f docx -n paper

  # Local OCR model on the second GPU
  ocr2doc --provider ollama --model deepseek-ocr --device 1 paper.pdf

INPUTS:
  .pdf                          rasterised at --dpi, one engine call per page
  .jpg .jpeg .png .bmp .tif     one page, EXIF orientation applied
  .mmd .txt                     raw model output, parsed without the engine

OUTPUTS (under --output):
  <name>.md | <name>.docx       rendered document
  <name>_raw.mmd                engine output, pages separated by ---
  <name>.json                   block list (--json)
  images/image_<n>.jpg          cropped figures (<name>_images/ in batch mode)

ENVIRONMENT VARIABLES:
  EDGEQUAKE_LLM_PROVIDER  Provider used when --provider is not given
  EDGEQUAKE_MODEL         Model used when --model is not given
  OPENAI_API_KEY, ANTHROPIC_API_KEY, GEMINI_API_KEY, …  provider credentials
  PDFIUM_LIB_PATH         libpdfium file or directory (default: system library)
  RUST_LOG                tracing filter, overrides -v / -q
"#;

/// Turn grounded OCR output into Markdown or Word documents.
#[derive(Parser, Debug)]
#[command(
    name = "ocr2doc",
    version,
    about = "Turn grounded OCR output from vision models into Markdown and Word documents",
    long_about = "Recognise PDFs and page images with a grounding OCR model, crop the figures it \
locates, and write Markdown or Word documents. Already-recognised model output (.mmd) can be \
rendered without calling the model.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Input file (.pdf, image, .mmd/.txt) or a directory of them.
    input: PathBuf,

    /// Output format.
    #[arg(short, long, env = "OCR2DOC_FORMAT", value_enum, default_value = "md")]
    format: FormatArg,

    /// Output directory.
    #[arg(short, long, env = "OCR2DOC_OUTPUT", default_value = "output")]
    output: PathBuf,

    /// Model identifier or local model path.
    #[arg(short, long, env = "OCR2DOC_MODEL")]
    model: Option<String>,

    /// Provider name: openai, anthropic, gemini, ollama, vllm, …
    #[arg(long, env = "OCR2DOC_PROVIDER")]
    provider: Option<String>,

    /// GPU index for locally hosted engines (exported as CUDA_VISIBLE_DEVICES).
    #[arg(long, env = "OCR2DOC_DEVICE")]
    device: Option<String>,

    /// Output base name (single-file mode only).
    #[arg(short = 'n', long, env = "OCR2DOC_NAME")]
    name: Option<String>,

    /// Rendering DPI for PDF pages (72–400).
    #[arg(long, env = "OCR2DOC_DPI", default_value_t = 200,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// Also write the block list as <name>.json.
    #[arg(long, env = "OCR2DOC_JSON")]
    json: bool,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "OCR2DOC_PASSWORD")]
    password: Option<String>,

    /// Path to a text file replacing the default grounding instruction.
    #[arg(long, env = "OCR2DOC_PROMPT")]
    prompt: Option<PathBuf>,

    /// Let a paragraph's reference tag decide its kind when no other rule matches.
    #[arg(long, env = "OCR2DOC_REFERENCE_KINDS")]
    reference_kinds: bool,

    /// Prefer image objects embedded in the PDF over cropping the page raster.
    #[arg(long, env = "OCR2DOC_EMBEDDED_IMAGES")]
    embedded_images: bool,

    /// Max engine output tokens per page.
    #[arg(long, env = "OCR2DOC_MAX_TOKENS", default_value_t = 8192)]
    max_tokens: usize,

    /// Sampling temperature (0.0–2.0).
    #[arg(long, env = "OCR2DOC_TEMPERATURE", default_value_t = 0.0)]
    temperature: f32,

    /// Disable progress bar.
    #[arg(long, env = "OCR2DOC_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "OCR2DOC_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "OCR2DOC_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum FormatArg {
    #[value(alias = "markdown", alias = "mmd")]
    Md,
    #[value(alias = "word")]
    Docx,
}

impl From<FormatArg> for OutputFormat {
    fn from(v: FormatArg) -> Self {
        match v {
            FormatArg::Md => OutputFormat::Markdown,
            FormatArg::Docx => OutputFormat::Docx,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar owns the terminal; library logs drop to errors
    // while it is active.
    let show_progress = !cli.quiet && !cli.no_progress;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(io::stderr)
        .init();

    // Must happen before the engine (and any runtime it loads) starts.
    if let Some(ref device) = cli.device {
        std::env::set_var("CUDA_VISIBLE_DEVICES", device);
    }

    let is_batch = cli.input.is_dir();
    if is_batch && cli.name.is_some() {
        bail!("--name only applies to a single input file, not a directory");
    }

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new_dynamic() as Arc<dyn ConversionProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb).await?;

    // ── Run conversion ───────────────────────────────────────────────────
    if is_batch {
        let batch = convert_batch(&cli.input, &config)
            .await
            .with_context(|| format!("Cannot read input directory {}", cli.input.display()))?;

        if !cli.quiet {
            for output in &batch.outputs {
                print_summary(output);
            }
            for failure in &batch.failures {
                eprintln!("{}  {}  {}", red("✘"), failure.input.display(), red(&failure.error.to_string()));
            }
            eprintln!(
                "{}  {}/{} file(s) converted  →  {}",
                if batch.is_complete() { green("✔") } else { cyan("⚠") },
                batch.outputs.len(),
                batch.total(),
                bold(&cli.output.display().to_string()),
            );
        }
        if batch.outputs.is_empty() {
            bail!("No file in {} could be converted", cli.input.display());
        }
    } else {
        let output = convert_file(&cli.input, &config)
            .await
            .with_context(|| format!("Conversion of {} failed", cli.input.display()))?;
        if !cli.quiet {
            print_summary(&output);
        }
    }

    Ok(())
}

fn print_summary(output: &ConversionOutput) {
    let stats = &output.stats;
    let target = output
        .document_path
        .as_deref()
        .map(Path::display)
        .map(|d| d.to_string())
        .unwrap_or_default();
    eprintln!(
        "{}  {} page(s)  {} blocks  {}ms  →  {}",
        green("✔"),
        stats.total_pages,
        stats.total_blocks,
        stats.total_duration_ms,
        bold(&target),
    );
    eprintln!(
        "   {} image(s) written  /  {} unavailable",
        dim(&stats.images_written.to_string()),
        dim(&stats.images_unavailable.to_string()),
    );
}

/// Map CLI args to `ConversionConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ConversionConfig> {
    let instruction = match cli.prompt {
        Some(ref path) => Some(
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read prompt from {:?}", path))?,
        ),
        None => None,
    };

    let mut builder = ConversionConfig::builder()
        .format(cli.format.into())
        .output_dir(cli.output.clone())
        .dpi(cli.dpi)
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .write_json(cli.json)
        .use_reference_kinds(cli.reference_kinds)
        .use_embedded_images(cli.embedded_images);

    if let Some(ref name) = cli.name {
        builder = builder.output_name(name.clone());
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(ref password) = cli.password {
        builder = builder.password(password.clone());
    }
    if let Some(prompt) = instruction {
        builder = builder.instruction(prompt);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
