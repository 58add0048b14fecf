//! ringscan CLI: detect bullseye markers in images and print marker sheets.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use ringscan::{
    synth, AssemblerConfig, FrameAssembler, FrameResult, RunSegmenterConfig, ScanlineConfig,
    ScanlineParser,
};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "ringscan")]
#[command(about = "Detect concentric-ring (bullseye) fiducial markers in greyscale images")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect markers in an image.
    Detect {
        /// Path to the input image.
        #[arg(long)]
        image: PathBuf,

        /// Path to write detection results (JSON).
        #[arg(long)]
        out: PathBuf,

        /// Ignore scanline hits below this ring order.
        #[arg(long, default_value = "2")]
        min_order: u32,

        /// Markers confirmed on fewer scanlines get the order-0 sentinel.
        #[arg(long, default_value = "3")]
        min_signal: u32,

        /// Maximum per-row x drift of a marker center in pixels.
        #[arg(long, default_value = "6")]
        center_drift: i32,

        /// Maximum total x spread of a marker center in pixels.
        #[arg(long, default_value = "12")]
        width_spread: i32,

        /// Rows without a hit before a marker candidate closes.
        #[arg(long, default_value = "3")]
        close_gap: i32,

        /// Required bright preamble length in pixels.
        #[arg(long, default_value = "30")]
        prefix_len: i32,

        /// Required brightness drop into the first ring stripe.
        #[arg(long, default_value = "50")]
        start_drop: i32,

        /// Keep order-0 (rejected) markers in the output.
        #[arg(long)]
        keep_rejected: bool,
    },

    /// Render a printable marker sheet.
    Generate {
        /// Path to write the marker image (format from the extension).
        #[arg(long)]
        out: PathBuf,

        /// Ring order of the marker.
        #[arg(long, default_value = "3")]
        order: u32,

        /// Ring width in pixels.
        #[arg(long, default_value = "10.0")]
        stripe: f32,

        /// Width and height of the square sheet in pixels.
        #[arg(long, default_value = "512")]
        size: u32,
    },
}

fn main() -> CliResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Detect {
            image,
            out,
            min_order,
            min_signal,
            center_drift,
            width_spread,
            close_gap,
            prefix_len,
            start_drop,
            keep_rejected,
        } => run_detect(
            &image,
            &out,
            AssemblerConfig {
                min_signal_count: min_signal,
                min_order,
                center_drift_max: center_drift,
                width_spread_max: width_spread,
                close_gap_y: close_gap,
            },
            ScanlineConfig {
                prefix_len_min: prefix_len,
                start_drop_min: start_drop,
                ..ScanlineConfig::default()
            },
            keep_rejected,
        ),

        Commands::Generate {
            out,
            order,
            stripe,
            size,
        } => run_generate(&out, order, stripe, size),
    }
}

// ── detect ─────────────────────────────────────────────────────────────

fn run_detect(
    image_path: &std::path::Path,
    out_path: &std::path::Path,
    assembler_config: AssemblerConfig,
    scanline_config: ScanlineConfig,
    keep_rejected: bool,
) -> CliResult<()> {
    let segmenter_config = RunSegmenterConfig::default();
    segmenter_config.validate()?;
    scanline_config.validate()?;
    assembler_config.validate()?;

    tracing::info!("Loading image: {}", image_path.display());
    let img = image::open(image_path).map_err(|e| -> CliError {
        format!("failed to open image {}: {}", image_path.display(), e).into()
    })?;
    let gray = img.to_luma8();
    let (w, h) = gray.dimensions();
    tracing::info!("Image size: {}x{}", w, h);

    let parser = ScanlineParser::new(segmenter_config, scanline_config);
    let mut assembler: FrameAssembler = FrameAssembler::new(parser, assembler_config);
    let mut result = assembler.process_frame(&gray);

    let n_accepted = result.accepted().count();
    tracing::info!(
        "Detected {} markers ({} accepted, {} rejected)",
        result.markers.len(),
        n_accepted,
        result.markers.len() - n_accepted,
    );
    for marker in result.accepted() {
        tracing::info!(
            "  marker at ({}, {}) order {} confidence {}",
            marker.x,
            marker.y,
            marker.order,
            marker.confidence,
        );
    }

    if !keep_rejected {
        result = FrameResult {
            markers: result.markers.into_iter().filter(|m| m.is_accepted()).collect(),
        };
    }

    let json = serde_json::to_string_pretty(&result)?;
    std::fs::write(out_path, &json)?;
    tracing::info!("Results written to {}", out_path.display());

    Ok(())
}

// ── generate ───────────────────────────────────────────────────────────

fn run_generate(out_path: &std::path::Path, order: u32, stripe: f32, size: u32) -> CliResult<()> {
    if order < ringscan::MIN_ORDER || order > ringscan::MAX_ORDER {
        return Err(format!(
            "order {} outside the detectable range {}..={}",
            order,
            ringscan::MIN_ORDER,
            ringscan::MAX_ORDER
        )
        .into());
    }
    let rings = 2 * (order - 1) + 1;
    let diameter = 2.0 * stripe * rings as f32;
    if diameter >= size as f32 {
        return Err(format!(
            "marker diameter {:.0}px does not fit a {}px sheet",
            diameter, size
        )
        .into());
    }

    let sheet = synth::marker_image(size, order, stripe);
    sheet.save(out_path).map_err(|e| -> CliError {
        format!("failed to write {}: {}", out_path.display(), e).into()
    })?;
    tracing::info!(
        "Marker sheet (order {}, {:.0}px rings) written to {}",
        order,
        stripe,
        out_path.display()
    );
    Ok(())
}
