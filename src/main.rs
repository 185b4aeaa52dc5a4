use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;
use whiteboard_fx::capture::{CaptureSource, ImageDirectory};
use whiteboard_fx::output::{OutputSink, PngDirectory};
use whiteboard_fx::segmentation::{self, ModelKind};
use whiteboard_fx::{FrameOutcome, PipelineConfig, PipelineError, SessionRegistry};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input webcam device index
    #[arg(short, long, default_value_t = 0)]
    input_device: u32,

    /// Replay images from this directory instead of a webcam
    #[arg(long)]
    input_dir: Option<PathBuf>,

    /// Output v4l2loopback device path
    #[arg(short, long, default_value = "/dev/video10")]
    output_device: String,

    /// Write canvases as numbered PNGs here instead of a v4l2loopback device
    #[arg(long)]
    output_dir: Option<PathBuf>,

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

    /// Target frames per second (0 = unthrottled)
    #[arg(long, default_value_t = 10)]
    fps: u32,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Path to segmentation model (ONNX file)
    /// Without one, no frame ever counts as containing the presenter
    #[arg(long)]
    model: Option<PathBuf>,

    /// Segmentation backend the model file belongs to
    #[arg(long, value_enum, default_value_t = ModelKind::Yolo)]
    model_kind: ModelKind,

    /// TOML file overriding pipeline tunables
    #[arg(long)]
    config: Option<PathBuf>,

    /// Room name used for the session
    #[arg(long, default_value = "default")]
    room: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging; RUST_LOG wins when set
    let default_level = if args.debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    tracing::info!("whiteboard-fx starting");
    tracing::info!("Capture: {}x{}", args.capture_width, args.capture_height);
    tracing::info!("Output: {}x{}", args.output_width, args.output_height);
    tracing::info!("Target FPS: {}", args.fps);

    let config = match &args.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    tracing::debug!(?config, "pipeline configuration");

    let mut capture = open_capture(&args)?;
    let mut output = open_output(&args)?;

    let model_path = args.model.clone();
    let model_kind = args.model_kind;
    if model_path.is_none() {
        tracing::warn!("No segmentation model given; frames will be reported as empty");
    }
    let registry = SessionRegistry::new(config, move || match &model_path {
        Some(path) => segmentation::create_model(model_kind, path)
            .map(Some)
            .context("Failed to load segmentation model"),
        None => Ok(None),
    });

    run_pipeline(
        capture.as_mut(),
        output.as_mut(),
        &registry,
        &args.room,
        args.fps,
    )
}

fn open_capture(args: &Args) -> Result<Box<dyn CaptureSource>> {
    match &args.input_dir {
        Some(dir) => {
            let source = ImageDirectory::open(dir).context("Failed to open input directory")?;
            Ok(Box::new(source))
        }
        None => open_webcam(args),
    }
}

fn open_output(args: &Args) -> Result<Box<dyn OutputSink>> {
    match &args.output_dir {
        Some(dir) => Ok(Box::new(PngDirectory::create(dir)?)),
        None => open_loopback(args),
    }
}

#[cfg(feature = "webcam")]
fn open_webcam(args: &Args) -> Result<Box<dyn CaptureSource>> {
    let camera = whiteboard_fx::capture::WebcamCapture::new(
        args.input_device,
        args.capture_width,
        args.capture_height,
        args.fps.max(1),
    )
    .context("Failed to initialize webcam capture")?;
    Ok(Box::new(camera))
}

#[cfg(not(feature = "webcam"))]
fn open_webcam(args: &Args) -> Result<Box<dyn CaptureSource>> {
    anyhow::bail!(
        "webcam {} requested but built without the `webcam` feature; use --input-dir",
        args.input_device
    )
}

#[cfg(feature = "webcam")]
fn open_loopback(args: &Args) -> Result<Box<dyn OutputSink>> {
    let sink = whiteboard_fx::output::V4L2Output::new(
        &args.output_device,
        args.output_width,
        args.output_height,
    )
    .context("Failed to initialize v4l2loopback output")?;
    Ok(Box::new(sink))
}

#[cfg(not(feature = "webcam"))]
fn open_loopback(args: &Args) -> Result<Box<dyn OutputSink>> {
    anyhow::bail!(
        "output device {} requested but built without the `webcam` feature; use --output-dir",
        args.output_device
    )
}

fn run_pipeline(
    capture: &mut dyn CaptureSource,
    output: &mut dyn OutputSink,
    registry: &SessionRegistry,
    room: &str,
    target_fps: u32,
) -> Result<()> {
    let frame_duration = (target_fps > 0).then(|| Duration::from_secs_f32(1.0 / target_fps as f32));
    let mut frame_count = 0u64;
    let mut published = 0u64;
    let mut total_capture_time = Duration::ZERO;
    let mut total_process_time = Duration::ZERO;
    let mut total_output_time = Duration::ZERO;

    let (width, height) = capture.resolution();
    tracing::info!("Starting main pipeline loop ({}x{} input)", width, height);

    loop {
        let loop_start = Instant::now();

        // Capture frame
        let capture_start = Instant::now();
        let frame = match capture.capture_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                tracing::info!("Input exhausted");
                break;
            }
            Err(err) => match err.downcast_ref::<PipelineError>() {
                Some(PipelineError::DecodeFailure(reason)) => {
                    tracing::warn!("Skipping undecodable frame: {}", reason);
                    continue;
                }
                _ => return Err(err.context("Failed to capture frame")),
            },
        };
        total_capture_time += capture_start.elapsed();

        // Session
        let process_start = Instant::now();
        let outcome = registry.submit(room, frame);
        total_process_time += process_start.elapsed();

        match outcome {
            Ok(FrameOutcome::ReferenceEstablished { region, keypoints }) => {
                tracing::info!("Reference established: {} ({} keypoints)", region, keypoints);
            }
            Ok(FrameOutcome::NoPerson {
                person_pixels,
                min_pixels,
            }) => {
                tracing::debug!("No presenter ({}/{} px)", person_pixels, min_pixels);
            }
            Ok(FrameOutcome::Buffering { .. }) => {}
            Ok(FrameOutcome::Processed { canvas, window_len }) => {
                let output_start = Instant::now();
                output
                    .write_frame(&canvas)
                    .context("Failed to write frame")?;
                total_output_time += output_start.elapsed();
                published += 1;
                tracing::debug!("Canvas published from {} frames", window_len);
            }
            Err(PipelineError::NoWhiteboardFound { min_area }) => {
                tracing::warn!(
                    "No whiteboard larger than {} px in frame, retrying with the next one",
                    min_area
                );
            }
            Err(err) => tracing::warn!("Frame rejected: {}", err),
        }

        frame_count += 1;

        // Log stats every 30 frames
        if frame_count % 30 == 0 {
            let avg_capture_ms = total_capture_time.as_secs_f64() * 1000.0 / frame_count as f64;
            let avg_process_ms = total_process_time.as_secs_f64() * 1000.0 / frame_count as f64;
            let avg_output_ms =
                total_output_time.as_secs_f64() * 1000.0 / published.max(1) as f64;
            tracing::info!(
                "Frame {}: capture={:.1}ms, process={:.1}ms, output={:.1}ms, canvases={}, state={:?}",
                frame_count,
                avg_capture_ms,
                avg_process_ms,
                avg_output_ms,
                published,
                registry.state(room)
            );
        }

        // Frame rate limiting
        if let Some(frame_duration) = frame_duration {
            let elapsed = loop_start.elapsed();
            if elapsed < frame_duration {
                std::thread::sleep(frame_duration - elapsed);
            }
        }
    }

    tracing::info!(
        "Processed {} frames, published {} canvases",
        frame_count,
        published
    );
    Ok(())
}
