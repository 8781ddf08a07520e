use std::path::PathBuf;
use std::process;

use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use tiled_watermark::{Options, OutputPolicy, OverlayMode, WatermarkSettings, Watermarker};

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    /// Replace image pixels with watermark pixels
    Copy,
    /// Alpha-composite the watermark over the image
    Over,
}

#[derive(Parser)]
#[command(
    name = "tiled-watermark",
    about = "Stamp a tiled watermark over images",
    version,
    after_help = "Simple usage: tiled-watermark -w logo.png photo.jpg\n\n\
                  Pass --source instead of --watermark to derive a translucent watermark\n\
                  from an opaque logo at --opacity percent."
)]
struct Cli {
    /// Images to watermark
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Prepared (already translucent) watermark image
    #[arg(short, long, conflicts_with = "source")]
    watermark: Option<String>,

    /// Opaque watermark image to make translucent first
    #[arg(short, long)]
    source: Option<String>,

    /// Opacity percentage used with --source (clamped to 1-100)
    #[arg(long, default_value = "100", allow_negative_numbers = true)]
    opacity: i64,

    /// Root that relative references are resolved against
    #[arg(long, default_value = ".")]
    document_root: PathBuf,

    /// Output directory, relative to the document root
    #[arg(long, default_value = "upload/watermark")]
    base_dir: PathBuf,

    /// Overwrite the input images instead of writing new files
    #[arg(short, long)]
    replace: bool,

    /// How the watermark is laid onto the image
    #[arg(long, value_enum, default_value = "copy")]
    mode: Mode,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all non-error output
    #[arg(short, long)]
    quiet: bool,
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if cli.watermark.is_none() && cli.source.is_none() {
        eprintln!("Error: One of --watermark or --source is required");
        process::exit(1);
    }

    let options = Options {
        document_root: cli.document_root,
        base_dir: cli.base_dir,
        output: if cli.replace {
            OutputPolicy::Replace
        } else {
            OutputPolicy::NewFile
        },
        overlay: match cli.mode {
            Mode::Copy => OverlayMode::Copy,
            Mode::Over => OverlayMode::Over,
        },
    };

    let settings = WatermarkSettings {
        watermark: cli.watermark,
        image: cli.source,
        alpha_level: cli.opacity,
    };

    let mut engine = match Watermarker::new(options, &settings) {
        Ok(e) => e,
        Err(e) => {
            eprintln!("Fatal: Failed to initialize engine: {e}");
            process::exit(1);
        }
    };

    let Some(watermark) = engine.watermark_path().map(std::path::Path::to_path_buf) else {
        eprintln!("Error: Watermark could not be resolved");
        process::exit(1);
    };
    if !cli.quiet {
        eprintln!(
            "Watermark: {} (opacity {}%)",
            watermark.display(),
            engine.opacity().get()
        );
        eprintln!();
    }

    let outputs = engine.draw_all(&cli.inputs);

    let mut fail_count = 0usize;
    for (input, output) in cli.inputs.iter().zip(&outputs) {
        if let Some(err) = engine.error_log(input) {
            fail_count += 1;
            eprintln!("[FAIL] {input}: {err}");
        } else if !cli.quiet {
            eprintln!("[OK] {input} -> {output}");
        }
    }

    if outputs.len() > 1 && !cli.quiet {
        eprintln!();
        eprint!("[Summary] Processed: {}", outputs.len() - fail_count);
        if fail_count > 0 {
            eprint!(", Failed: {fail_count}");
        }
        eprintln!(" (Total: {})", outputs.len());
    }

    // Drawn outputs land in the temp directory; keep them past the engine's drop.
    let _ = engine.persist_outputs();

    if fail_count > 0 {
        process::exit(1);
    }
}
