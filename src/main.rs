mod capture;
mod output;

use anyhow::{Context, Result};
use bgremoval::{BackgroundRemovalFilter, FilterConfig, RenderOutput, SegmentationProvider, VideoFilter};
use capture::{CaptureSource, WebcamCapture};
use clap::Parser;
use output::{OutputSink, V4L2Output};
use std::path::PathBuf;
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input webcam device index
    #[arg(short, long, default_value_t = 0)]
    input_device: u32,

    /// Output v4l2loopback device path
    #[arg(short, long, default_value = "/dev/video10")]
    output_device: String,

    /// Capture resolution width
    #[arg(long, default_value_t = 1280)]
    capture_width: u32,

    /// Capture resolution height
    #[arg(long, default_value_t = 720)]
    capture_height: u32,

    /// Output resolution width
    #[arg(long, default_value_t = 1280)]
    output_width: u32,

    /// Output resolution height
    #[arg(long, default_value_t = 720)]
    output_height: u32,

    /// Target frames per second
    #[arg(long, default_value_t = 30)]
    fps: u32,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Path to segmentation model (ONNX file)
    /// If not provided, runs in passthrough mode without segmentation
    #[arg(long)]
    model: Option<String>,

    /// Filter settings as a JSON object (same keys as the property schema)
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Replacement background image; selects image mode
    #[arg(long)]
    background_image: Option<PathBuf>,

    /// Show matte visualization (grayscale silhouette) instead of the composite
    #[arg(long)]
    show_matte: bool,

    /// Print the filter's property schema as JSON and exit
    #[arg(long)]
    describe: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.describe {
        let schema = serde_json::to_string_pretty(&BackgroundRemovalFilter::describe_properties())?;
        println!("{}", schema);
        return Ok(());
    }

    // Initialize logging
    let log_level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    tracing::info!("bgremoval starting");
    tracing::info!("Capture: {}x{}", args.capture_width, args.capture_height);
    tracing::info!("Output: {}x{}", args.output_width, args.output_height);
    tracing::info!("Target FPS: {}", args.fps);

    let config = load_config(&args)?;

    let mut capture = WebcamCapture::new(
        args.input_device,
        args.capture_width,
        args.capture_height,
        args.fps,
    )
    .context("Failed to initialize webcam capture")?;

    let mut output = V4L2Output::new(&args.output_device, args.output_width, args.output_height)
        .context("Failed to initialize v4l2loopback output")?;

    let filter = match load_provider(&args, &config)? {
        Some(provider) => Some(BackgroundRemovalFilter::create(config, provider)),
        None => {
            tracing::info!("Running in passthrough mode (no segmentation)");
            None
        }
    };

    run_pipeline(&mut capture, &mut output, filter, args.fps)
}

fn load_config(args: &Args) -> Result<FilterConfig> {
    let mut config = match &args.settings {
        Some(path) => {
            let file = std::fs::File::open(path)
                .with_context(|| format!("Failed to open settings {}", path.display()))?;
            let value: serde_json::Value = serde_json::from_reader(std::io::BufReader::new(file))
                .with_context(|| format!("Failed to parse settings {}", path.display()))?;
            FilterConfig::from_settings(value).context("Invalid filter settings")?
        }
        None => BackgroundRemovalFilter::default_config(),
    };

    if let Some(image) = &args.background_image {
        config.background_image = Some(image.clone());
        config.background_mode = bgremoval::BackgroundMode::Image;
    }
    if args.show_matte {
        config.show_mask = true;
    }
    Ok(config.sanitize())
}

#[cfg(feature = "rvm")]
fn load_provider(args: &Args, config: &FilterConfig) -> Result<Option<Box<dyn SegmentationProvider>>> {
    let Some(model_path) = &args.model else {
        return Ok(None);
    };
    tracing::info!("Loading segmentation model from {}", model_path);
    let provider = bgremoval::segmentation::create_default_provider(model_path, config.quality)
        .context("Failed to load segmentation model")?;
    tracing::info!("Segmentation model loaded successfully");
    Ok(Some(provider))
}

#[cfg(not(feature = "rvm"))]
fn load_provider(args: &Args, _config: &FilterConfig) -> Result<Option<Box<dyn SegmentationProvider>>> {
    if args.model.is_some() {
        anyhow::bail!("Built without the `rvm` feature; cannot load --model");
    }
    Ok(None)
}

fn run_pipeline<C, O>(
    capture: &mut C,
    output: &mut O,
    mut filter: Option<BackgroundRemovalFilter>,
    target_fps: u32,
) -> Result<()>
where
    C: CaptureSource,
    O: OutputSink,
{
    let frame_duration = Duration::from_secs_f32(1.0 / target_fps.max(1) as f32);
    let mut frame_count = 0u64;
    let mut passthrough_count = 0u64;
    let mut total_capture_time = Duration::ZERO;
    let mut total_filter_time = Duration::ZERO;
    let mut total_output_time = Duration::ZERO;

    tracing::info!("Starting main pipeline loop (requested {:?})", capture.resolution());
    tracing::info!("Press Ctrl+C to stop");

    loop {
        let loop_start = Instant::now();

        // Capture frame
        let capture_start = Instant::now();
        let frame = capture
            .capture_frame()
            .context("Failed to capture frame")?;
        total_capture_time += capture_start.elapsed();

        // Tick strictly before render, as a host would
        let filter_start = Instant::now();
        let rendered = match filter.as_mut() {
            Some(filter) => {
                filter.on_tick(frame.view().width, frame.view().height);
                filter.on_render(&frame)
            }
            None => RenderOutput::Passthrough,
        };
        total_filter_time += filter_start.elapsed();

        // Output frame
        let output_start = Instant::now();
        match rendered {
            RenderOutput::Processed(texture) => output.write_frame(&texture.view()),
            RenderOutput::Passthrough => {
                passthrough_count += 1;
                output.write_frame(&frame.view())
            }
        }
        .context("Failed to write frame")?;
        total_output_time += output_start.elapsed();

        frame_count += 1;

        // Log stats every 30 frames
        if frame_count % 30 == 0 {
            let avg_capture_ms = total_capture_time.as_secs_f64() * 1000.0 / frame_count as f64;
            let avg_filter_ms = total_filter_time.as_secs_f64() * 1000.0 / frame_count as f64;
            let avg_output_ms = total_output_time.as_secs_f64() * 1000.0 / frame_count as f64;
            let total_ms = avg_capture_ms + avg_filter_ms + avg_output_ms;
            let actual_fps = 1000.0 / total_ms;

            tracing::info!(
                "Frame {}: capture={:.1}ms, filter={:.1}ms, output={:.1}ms, total={:.1}ms, fps={:.1}, passthrough={}",
                frame_count,
                avg_capture_ms,
                avg_filter_ms,
                avg_output_ms,
                total_ms,
                actual_fps,
                passthrough_count
            );
            if let Some(filter) = &filter {
                let metrics = filter.metrics();
                tracing::debug!(
                    "Segment+composite: last={:.1}ms, avg={:.1}ms over {} frames",
                    metrics.last_ms(),
                    metrics.average_ms(),
                    metrics.frame_count()
                );
            }
        }

        // Frame rate limiting
        let elapsed = loop_start.elapsed();
        if elapsed < frame_duration {
            std::thread::sleep(frame_duration - elapsed);
        }
    }
}
