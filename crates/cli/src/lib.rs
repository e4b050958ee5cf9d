use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::RgbaImage;
use scrawl_core::{EngineConfig, MemoryStatus, PerformanceReport, QualityOverride, Scrawl};
use scrawl_render::{
    CompositeMode, DistortionProfile, InkColor, LayoutInput, LayoutMetrics, PaperKind,
    PaperTemplate, RenderRequest,
};
use serde::Serialize;
use std::ffi::OsString;
use std::fs;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

const BENCH_TEXT: &str = "The quick brown fox jumps over the lazy dog. \
Pack my box with five dozen liquor jugs. How vexingly quick daft zebras jump!";

#[derive(Debug, Parser)]
#[command(name = "scrawl")]
#[command(about = "Render typed text as a handwritten page")]
pub struct Cli {
    /// Engine configuration (TOML)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// More logging (-v debug, -vv trace); RUST_LOG takes precedence
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Render text onto a page and write it as PNG.
    Render(RenderArgs),
    /// Print the layout metrics for a page as JSON.
    Layout(PageArgs),
    /// Render a page repeatedly and print memory and performance JSON.
    Bench(BenchArgs),
    /// Print CLI version.
    Version,
}

#[derive(Debug, Args)]
struct PageArgs {
    #[arg(long, default_value_t = 800)]
    width: u32,
    #[arg(long, default_value_t = 1000)]
    height: u32,
    #[arg(long, default_value_t = 24.0)]
    font_size: f32,
    /// Realism level: 1 (strongest jitter) to 3 (lightest)
    #[arg(long, default_value_t = 2, value_parser = clap::value_parser!(u8).range(1..=3))]
    level: u8,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PaperStyle {
    Blank,
    Lined,
}

impl From<PaperStyle> for PaperKind {
    fn from(style: PaperStyle) -> Self {
        match style {
            PaperStyle::Blank => PaperKind::Blank,
            PaperStyle::Lined => PaperKind::Lined,
        }
    }
}

#[derive(Debug, Args)]
struct StyleArgs {
    #[command(flatten)]
    page: PageArgs,
    /// Font family to use; unregistered families use the built-in pen face
    #[arg(long, default_value = "")]
    font: String,
    /// TTF/OTF file registered under the --font family
    #[arg(long, value_name = "FILE")]
    font_file: Option<PathBuf>,
    /// Ink color as #rrggbb or #rrggbbaa
    #[arg(long, default_value = "#1b2a4a")]
    ink: InkColor,
    /// Paper texture file, relative to the assets directory
    #[arg(long, value_name = "FILE")]
    paper: Option<String>,
    /// Lines overlay drawn over the paper texture
    #[arg(long, value_name = "FILE", requires = "paper")]
    lines: Option<String>,
    #[arg(long, value_enum, default_value_t = PaperStyle::Lined)]
    style: PaperStyle,
    /// Render the "choose a paper" placeholder instead of a page
    #[arg(long, conflicts_with = "paper")]
    no_paper: bool,
    /// Skip the multiply/overlay/screen passes
    #[arg(long)]
    no_blending: bool,
    /// Device pixels per page pixel (0.5 to 2.0)
    #[arg(long)]
    render_scale: Option<f32>,
}

#[derive(Debug, Args)]
struct RenderArgs {
    /// Text to write
    #[arg(value_name = "TEXT", required_unless_present = "input")]
    text: Option<String>,
    /// Read the text from a file instead
    #[arg(long, short, value_name = "FILE", conflicts_with = "text")]
    input: Option<PathBuf>,
    #[command(flatten)]
    style: StyleArgs,
    #[arg(long, short, value_name = "FILE")]
    output: PathBuf,
}

#[derive(Debug, Args)]
struct BenchArgs {
    #[arg(long, default_value_t = 10)]
    iterations: u32,
    #[arg(long, value_name = "FILE")]
    input: Option<PathBuf>,
    #[command(flatten)]
    style: StyleArgs,
}

#[derive(Debug, Serialize)]
struct RenderOutput {
    output: String,
    width: u32,
    height: u32,
    mode: &'static str,
    lines_drawn: usize,
    overflow_lines: usize,
    glyphs_drawn: usize,
    used_texture: bool,
    blended: bool,
    fallback: bool,
}

#[derive(Debug, Serialize)]
struct BenchOutput {
    iterations: u32,
    total_ms: f64,
    fallbacks: u32,
    memory: MemoryStatus,
    performance: PerformanceReport,
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Render(args) => run_render(cli.config.as_deref(), args),
        Commands::Layout(page) => run_layout(&page),
        Commands::Bench(args) => run_bench(cli.config.as_deref(), args),
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    // A subscriber may already be installed when run() is called twice in-process
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    let config = match path {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    config.apply_env().context("invalid SCRAWL_* environment override")
}

fn build_engine(config: Option<&Path>, style: &StyleArgs) -> Result<Scrawl> {
    let engine = Scrawl::new(load_config(config)?);
    if let Some(font_file) = &style.font_file {
        engine
            .fonts()
            .load_file(&style.font, font_file)
            .with_context(|| format!("failed to load font {}", font_file.display()))?;
    }
    engine.override_settings(QualityOverride {
        render_scale: style.render_scale,
        blending: style.no_blending.then_some(false),
        ..Default::default()
    });
    Ok(engine)
}

fn build_request(text: String, style: &StyleArgs) -> RenderRequest {
    let kind = PaperKind::from(style.style);
    let paper = if style.no_paper {
        None
    } else {
        Some(match &style.paper {
            Some(filename) => {
                let template = PaperTemplate::textured(filename.as_str(), filename.as_str(), kind);
                match &style.lines {
                    Some(lines) => template.with_lines(lines.as_str()),
                    None => template,
                }
            }
            None => PaperTemplate::flat("plain", kind),
        })
    };
    let page = &style.page;
    RenderRequest::new(text, paper)
        .with_font(style.font.as_str(), page.font_size)
        .with_size(page.width, page.height)
        .with_ink(style.ink)
        .with_distortion(DistortionProfile::from_level(page.level))
}

fn read_text(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read text from {}", path.display()))
}

fn mode_name(mode: CompositeMode) -> &'static str {
    match mode {
        CompositeMode::Full => "full",
        CompositeMode::Simplified => "simplified",
        CompositeMode::Placeholder => "placeholder",
        CompositeMode::PaperOnly => "paper-only",
    }
}

fn run_render(config: Option<&Path>, args: RenderArgs) -> Result<()> {
    let text = match (&args.input, args.text) {
        (Some(path), _) => read_text(path)?,
        (None, Some(text)) => text,
        (None, None) => anyhow::bail!("no text given; pass TEXT or --input"),
    };

    let engine = build_engine(config, &args.style)?;
    let request = build_request(text, &args.style);
    let page = engine.render_page(&request).context("failed to render page")?;

    if let Some(parent) = args.output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    write_png(page.surface.image(), &args.output, page.settings.compression_level)?;
    tracing::debug!(
        output = %args.output.display(),
        compression = page.settings.compression_level,
        elapsed = ?page.elapsed,
        "page written"
    );

    let payload = RenderOutput {
        output: args.output.display().to_string(),
        width: page.surface.width(),
        height: page.surface.height(),
        mode: mode_name(page.outcome.mode),
        lines_drawn: page.outcome.lines_drawn,
        overflow_lines: page.outcome.overflow_lines,
        glyphs_drawn: page.outcome.glyphs_drawn,
        used_texture: page.outcome.used_texture,
        blended: page.outcome.blended,
        fallback: page.fallback,
    };
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

fn run_layout(page: &PageArgs) -> Result<()> {
    let profile = DistortionProfile::from_level(page.level);
    let metrics = LayoutMetrics::compute(&LayoutInput {
        canvas_width: page.width,
        canvas_height: page.height,
        font_size: page.font_size,
        baseline_jitter_range: profile.baseline_jitter_range,
        level: profile.level,
    });
    println!("{}", serde_json::to_string_pretty(&metrics)?);
    Ok(())
}

fn run_bench(config: Option<&Path>, args: BenchArgs) -> Result<()> {
    if args.iterations == 0 {
        anyhow::bail!("--iterations must be >= 1");
    }
    let text = match &args.input {
        Some(path) => read_text(path)?,
        None => BENCH_TEXT.repeat(4),
    };

    let engine = build_engine(config, &args.style)?;
    let monitor = engine
        .start_monitoring()
        .context("failed to start memory monitoring")?;
    let request = build_request(text, &args.style);

    let started = Instant::now();
    let mut fallbacks = 0;
    let mut last = Instant::now();
    for _ in 0..args.iterations {
        let page = engine.render_page(&request).context("failed to render page")?;
        if page.fallback {
            fallbacks += 1;
        }
        drop(page);
        let now = Instant::now();
        engine.record_frame(now.duration_since(last).max(Duration::from_micros(1)));
        last = now;
    }
    let total = started.elapsed();
    monitor.stop();

    let payload = BenchOutput {
        iterations: args.iterations,
        total_ms: total.as_secs_f64() * 1000.0,
        fallbacks,
        memory: engine.memory_status(),
        performance: engine.performance_report(),
    };
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

/// PNG effort follows the quality compression level (0 fastest, 9 smallest)
fn png_compression(level: u8) -> CompressionType {
    match level {
        0..=3 => CompressionType::Fast,
        4..=6 => CompressionType::Default,
        _ => CompressionType::Best,
    }
}

fn write_png(image: &RgbaImage, path: &Path, compression_level: u8) -> Result<()> {
    let file = fs::File::create(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    let encoder = PngEncoder::new_with_quality(
        BufWriter::new(file),
        png_compression(compression_level),
        FilterType::Adaptive,
    );
    image
        .write_with_encoder(encoder)
        .with_context(|| format!("failed to write image to {}", path.display()))
}
