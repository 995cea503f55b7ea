//! GhostScale CLI
//!
//! Runs raw frame files through the crop-and-scale stage.

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use ghostscale::{
    ImageFormat, ImageFrame, InputFrame, ScaleAlgorithm, ScaleStage, StageOptions, StreamHeader,
    StreamPorts, YuvImage,
};

/// Scaling algorithm for CLI
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Algorithm {
    /// Cubic upscaling, area downscaling
    Default,
    Linear,
    Cubic,
    Area,
    Lanczos,
    /// Never enlarge the cropped frame
    NoUpscale,
}

impl From<Algorithm> for ScaleAlgorithm {
    fn from(a: Algorithm) -> Self {
        match a {
            Algorithm::Default => ScaleAlgorithm::Default,
            Algorithm::Linear => ScaleAlgorithm::Linear,
            Algorithm::Cubic => ScaleAlgorithm::Cubic,
            Algorithm::Area => ScaleAlgorithm::Area,
            Algorithm::Lanczos => ScaleAlgorithm::Lanczos,
            Algorithm::NoUpscale => ScaleAlgorithm::DefaultWithoutUpscale,
        }
    }
}

#[derive(Parser)]
#[command(name = "ghostscale")]
#[command(about = "Crop, convert and rescale raw video frames")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version and available algorithms
    Info,

    /// Scale a file of consecutive raw frames
    Scale {
        /// Raw input frames
        #[arg(short, long)]
        input: PathBuf,

        /// Input frame width
        #[arg(long)]
        width: u32,

        /// Input frame height
        #[arg(long)]
        height: u32,

        /// Input pixel format (srgb, yuv420p)
        #[arg(short, long, default_value = "srgb")]
        format: ImageFormat,

        /// Stage options in TOML
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output width
        #[arg(long)]
        target_width: Option<u32>,

        /// Output height
        #[arg(long)]
        target_height: Option<u32>,

        /// Scaling algorithm
        #[arg(short, long, value_enum)]
        algorithm: Option<Algorithm>,

        /// Raw output frames
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("ghostscale=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Info => cmd_info(),
        Commands::Scale {
            input,
            width,
            height,
            format,
            config,
            target_width,
            target_height,
            algorithm,
            output,
        } => {
            let mut options = match config {
                Some(path) => StageOptions::load(&path)
                    .with_context(|| format!("failed to load {}", path.display()))?,
                None => StageOptions::default(),
            };
            // Flags win over the config file
            options.merge_from(&StageOptions {
                target_width,
                target_height,
                algorithm: algorithm.map(Into::into),
                ..StageOptions::default()
            });
            cmd_scale(input, width, height, format, options, output)
        }
    }
}

fn cmd_info() -> anyhow::Result<()> {
    println!("GhostScale {}", ghostscale::VERSION);
    println!("==============\n");

    println!("Input formats: SRGB, YCBCR420P");
    println!("Output formats: SRGB, YCBCR420P (from YCBCR420P only)");
    println!("Algorithms:");
    for algorithm in ScaleAlgorithm::ALL {
        println!("  - {}", algorithm.name());
    }
    println!(
        "FFmpeg resampler: {}",
        if cfg!(feature = "ffmpeg") { "Yes" } else { "No" }
    );

    Ok(())
}

fn frame_size(format: ImageFormat, width: u32, height: u32) -> anyhow::Result<usize> {
    let pixels = width as usize * height as usize;
    if format.is_planar_yuv() {
        let chroma = width.div_ceil(2) as usize * height.div_ceil(2) as usize;
        return Ok(pixels + 2 * chroma);
    }
    let bpp = format
        .bytes_per_pixel()
        .with_context(|| format!("{} frames can't be read from a raw file", format))?;
    Ok(pixels * bpp)
}

fn cmd_scale(
    input: PathBuf,
    width: u32,
    height: u32,
    format: ImageFormat,
    options: StageOptions,
    output: PathBuf,
) -> anyhow::Result<()> {
    let data = fs::read(&input).with_context(|| format!("failed to read {}", input.display()))?;
    let size = frame_size(format, width, height)?;
    anyhow::ensure!(size > 0, "frame dimensions must be positive, got {}x{}", width, height);
    let remainder = data.len() % size;
    if remainder != 0 {
        tracing::warn!("Ignoring {} trailing bytes after the last full frame", remainder);
    }

    let ports = StreamPorts::default()
        .with_header(StreamHeader::new(width, height, format))
        .with_header_output();
    let mut stage = ScaleStage::new(options, ports)?;
    let header = stage.poll_header();

    let mut writer = std::io::BufWriter::new(
        fs::File::create(&output).with_context(|| format!("failed to create {}", output.display()))?,
    );
    for chunk in data.chunks_exact(size) {
        let frame = if format.is_planar_yuv() {
            InputFrame::from(YuvImage::from_i420(width, height, chunk)?)
        } else {
            InputFrame::from(ImageFrame::from_contiguous(format, width, height, chunk.to_vec())?)
        };
        let scaled = stage.process(&frame)?;
        writer.write_all(&scaled.to_bytes())?;
    }
    writer.flush()?;

    if let Some(header) = header {
        println!("Output header:");
        println!("  Resolution: {}x{}", header.width, header.height);
        println!("  Format: {}", header.format);
    }

    let counters = stage.counters();
    println!("\nStatistics:");
    println!("  Frames in: {}", counters.inputs);
    println!("  Frames out: {}", counters.outputs());
    println!("  Cropped: {}", counters.crops);
    println!("  Downscaled: {}", counters.downscales);
    println!("  Upscaled: {}", counters.upscales);
    println!("  Passed through: {}", counters.outputs_inputs);
    println!("  Re-aligned: {}", counters.outputs_aligned);

    Ok(())
}
