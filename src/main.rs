use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use video_redactor::{
    config::Config,
    detections::{DetectionTable, TargetClasses},
    pipeline::{RedactionEngine, RedactionJob},
    redaction::{StyleSpec, DEFAULT_KERNEL_SIZE, DEFAULT_SCALE},
    RedactorError,
};

#[derive(Parser)]
#[command(
    name = "video-redactor",
    version,
    about = "Redact objects in a video using a per-frame detection table",
    long_about = "Video-Redactor draws outlines, overlays images, blurs or pixelates the boxes listed in a detection table, frame by frame, and re-attaches the original audio."
)]
struct Cli {
    /// Configuration file (optional)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Draw an outline around each detection
    Rect {
        #[command(flatten)]
        run: RunArgs,
    },

    /// Paste an image (with alpha) over each detection
    Image {
        /// Overlay image path
        overlay_path: PathBuf,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Gaussian-blur each detection
    Blur {
        /// Odd kernel size
        #[arg(long, default_value_t = DEFAULT_KERNEL_SIZE, value_parser = parse_kernel_size)]
        kernel_size: u32,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Pixelate each detection
    Mosaic {
        /// Down-scale factor
        #[arg(long, default_value_t = DEFAULT_SCALE, value_parser = clap::value_parser!(u32).range(1..))]
        scale: u32,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Summarize a detection table
    Inspect {
        /// Detection table path
        table: PathBuf,
    },

    /// Write a filtered, canonical copy of a detection table
    Clean {
        /// Detection table path
        table: PathBuf,

        /// Where to write the cleaned table
        #[arg(short, long)]
        output: PathBuf,

        /// Class ids to keep
        #[arg(long, default_value = "0,1,2,3")]
        targets: TargetClasses,

        /// Minimum confidence to keep
        #[arg(long, default_value_t = 0.0)]
        min_conf: f64,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Source video path
    video_path: PathBuf,

    /// Detection table path
    #[arg(long = "result_path", visible_alias = "result-path", default_value = "detections.csv")]
    result_path: PathBuf,

    /// Output video path
    #[arg(long = "output_video_path", visible_alias = "output-video-path", default_value = "redacted.mp4")]
    output_video_path: PathBuf,

    /// Class ids to redact, e.g. "0,1,2,3"
    #[arg(long, default_value = "0,1,2,3")]
    targets: TargetClasses,

    /// Save the first redacted frame as an image and stop
    #[arg(long)]
    show_once: bool,

    /// Where the preview image goes (default: next to the output)
    #[arg(long)]
    preview_path: Option<PathBuf>,

    /// Attach the source's audio track to the output
    #[arg(long, action = ArgAction::Set, default_value_t = true)]
    with_audio: bool,
}

impl RunArgs {
    fn into_job(self, style: StyleSpec) -> RedactionJob {
        let mut job = RedactionJob::new(self.video_path, self.result_path, self.output_video_path, style);
        job.targets = self.targets;
        job.show_once = self.show_once;
        job.with_audio = self.with_audio;
        job.preview_path = self.preview_path;
        job
    }
}

fn parse_kernel_size(value: &str) -> std::result::Result<u32, String> {
    let size: u32 = value.parse().map_err(|_| format!("'{}' is not a positive integer", value))?;
    if size == 0 || size % 2 == 0 {
        return Err(format!("kernel size must be a positive odd integer, got {}", size));
    }
    Ok(size)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG takes precedence over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    info!("Starting Video-Redactor v{}", env!("CARGO_PKG_VERSION"));

    let config = match &cli.config {
        Some(config_path) => {
            info!("Loading configuration from {:?}", config_path);
            Config::from_file(config_path).map_err(report)?
        }
        None => Config::default(),
    };
    config.validate().map_err(report)?;

    let (style, run) = match cli.command {
        Command::Rect { run } => (StyleSpec::Rect, run),
        Command::Image { overlay_path, run } => (StyleSpec::Image { overlay_path }, run),
        Command::Blur { kernel_size, run } => (StyleSpec::Blur { kernel_size }, run),
        Command::Mosaic { scale, run } => (StyleSpec::Mosaic { scale }, run),
        Command::Inspect { table } => return inspect(&config, table),
        Command::Clean {
            table,
            output,
            targets,
            min_conf,
        } => return clean(&config, table, output, &targets, min_conf),
    };

    let job = run.into_job(style);
    let engine = RedactionEngine::new(config);
    let summary = engine.run(&job).await.map_err(report)?;

    match (&summary.output, &summary.preview) {
        (Some(output), _) => info!("Redaction complete! Output saved to: {:?}", output),
        (None, Some(preview)) => info!("Preview saved to: {:?}", preview),
        (None, None) => {}
    }
    info!(
        "Started {}, {}",
        summary.started_at.format("%Y-%m-%d %H:%M:%S"),
        summary
    );
    Ok(())
}

/// Turn a library error into an anyhow error carrying the user-facing message
fn report(error: RedactorError) -> anyhow::Error {
    anyhow::anyhow!(error.user_message())
}

fn delimiter(config: &Config) -> Option<u8> {
    config.table.delimiter.map(|c| c as u8)
}

fn inspect(config: &Config, path: PathBuf) -> Result<()> {
    let table = DetectionTable::load(&path, delimiter(config)).map_err(report)?;
    let load = table.report();
    let summary = table.summary();

    println!("Table:        {}", path.display());
    println!("Rows read:    {}", load.rows_read);
    println!("Rows loaded:  {}", load.rows_loaded);
    println!("Rows skipped: {}", load.rows_skipped());
    for skipped in &load.skipped {
        println!("  - {}", skipped);
    }
    println!("Frames:       {}", summary.frames);
    if let (Some(first), Some(last)) = (summary.first_frame, summary.last_frame) {
        println!("Frame range:  {}..={}", first, last);
    }
    println!("Classes:");
    for (cls, class) in &summary.classes {
        println!(
            "  {:>4}: {:>8} detections, mean confidence {:.3}",
            cls, class.count, class.mean_confidence
        );
    }
    Ok(())
}

fn clean(config: &Config, path: PathBuf, output: PathBuf, targets: &TargetClasses, min_conf: f64) -> Result<()> {
    let table = DetectionTable::load(&path, delimiter(config)).map_err(report)?;
    let cleaned = table.filtered(targets, min_conf);
    cleaned
        .write_csv(&output)
        .map_err(report)
        .with_context(|| format!("cleaning {}", path.display()))?;

    info!(
        "Kept {} of {} detections (targets {}, min confidence {}) -> {:?}",
        cleaned.len(),
        table.len(),
        targets,
        min_conf,
        output
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_defaults() {
        let cli = Cli::try_parse_from(["video-redactor", "rect", "in.mp4"]).unwrap();
        let Command::Rect { run } = cli.command else {
            panic!("expected rect");
        };
        assert_eq!(run.result_path, PathBuf::from("detections.csv"));
        assert_eq!(run.output_video_path, PathBuf::from("redacted.mp4"));
        assert_eq!(run.targets, TargetClasses::default());
        assert!(run.with_audio);
        assert!(!run.show_once);
    }

    #[test]
    fn test_style_options() {
        let cli = Cli::try_parse_from([
            "video-redactor",
            "blur",
            "in.mp4",
            "--kernel-size",
            "31",
            "--result_path",
            "det.tsv",
            "--targets",
            "[2, 5]",
            "--with-audio",
            "false",
        ])
        .unwrap();
        let Command::Blur { kernel_size, run } = cli.command else {
            panic!("expected blur");
        };
        assert_eq!(kernel_size, 31);
        assert_eq!(run.result_path, PathBuf::from("det.tsv"));
        assert!(run.targets.contains(5));
        assert!(!run.with_audio);

        assert!(Cli::try_parse_from(["video-redactor", "blur", "in.mp4", "--kernel-size", "4"]).is_err());
        assert!(Cli::try_parse_from(["video-redactor", "mosaic", "in.mp4", "--scale", "0"]).is_err());
        assert!(Cli::try_parse_from(["video-redactor", "image", "in.mp4"]).is_err());
    }
}
