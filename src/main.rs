use anyhow::{Context, Result};
use clap::Parser;
use framesight::cache::MaskCache;
use framesight::capture::{CaptureSource, DirectoryCapture};
use framesight::composition::CompositionTechnique;
use framesight::config::EngineConfig;
use framesight::detection::{RustfaceDetector, SubjectDetector};
use framesight::engine::CompositionEngine;
use framesight::output::{DiskOutput, OutputSink, PreviewMode, PreviewWorker};
use framesight::pressure::MemoryPressureMonitor;
use framesight::segmentation;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory of frames to replay. Without it the webcam is used.
    #[arg(long)]
    frames: Option<PathBuf>,

    /// Replay the frame directory forever
    #[arg(long = "loop")]
    looping: bool,

    /// Input webcam device index
    #[arg(short, long, default_value_t = 0)]
    input_device: u32,

    /// Composition technique: rule-of-thirds, center-framing, symmetry
    #[arg(short, long, default_value = "rule-of-thirds")]
    technique: CompositionTechnique,

    /// SeetaFace model for the face detector
    #[arg(long)]
    face_model: Option<PathBuf>,

    /// YOLO ONNX model for the person fallback
    #[arg(long)]
    person_model: Option<PathBuf>,

    /// Segmentation model (RVM ONNX file). Without it a luma keyer is used.
    #[arg(long)]
    model: Option<String>,

    /// Write blurred previews to this v4l2loopback device
    #[arg(short, long)]
    output_device: Option<String>,

    /// Write blurred previews as PNG files into this directory
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Background blur intensity, 0..1
    #[arg(long, default_value_t = 0.6)]
    blur: f32,

    /// Show matte visualization (grayscale silhouette) instead of the blurred preview
    #[arg(long)]
    show_matte: bool,

    /// Analyse one out of this many frames
    #[arg(long, default_value_t = framesight::config::DEFAULT_SAMPLE_EVERY)]
    sample_every: u64,

    /// Mask cache budget in megabytes
    #[arg(long, default_value_t = 256)]
    cache_mb: usize,

    /// Worker threads (default: 3/4 of the cores)
    #[arg(long)]
    workers: Option<usize>,

    /// Target frames per second
    #[arg(long, default_value_t = 30)]
    fps: u32,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    tracing::info!("framesight starting");

    let mut config = EngineConfig::default();
    config.scheduler.sample_every = args.sample_every.max(1);
    config.cache.budget_bytes = args.cache_mb * 1024 * 1024;
    config.workers = args.workers;

    let detector = build_detector(&args, &config)?;
    let engine = CompositionEngine::new(config.clone(), detector).context("Failed to start composition engine")?;
    engine.set_technique(args.technique);

    let model = segmentation::create_default_model(args.model.as_deref())
        .context("Failed to load segmentation model")?;
    let cache = Arc::new(MaskCache::new(config.cache.clone(), model));
    let _monitor = MemoryPressureMonitor::spawn(Arc::clone(&cache), &config.pressure)
        .context("Failed to start memory pressure monitor")?;

    let mut capture = open_capture(&args)?;
    let (width, height) = capture.resolution();
    tracing::info!("Capture: {}x{}", width, height);
    let mode = if args.show_matte {
        PreviewMode::Matte
    } else {
        PreviewMode::Blur(args.blur)
    };
    let preview = open_output(&args, width, height)?
        .map(|sink| PreviewWorker::spawn(Arc::clone(&cache), sink, mode))
        .transpose()
        .context("Failed to start preview thread")?;

    run_pipeline(capture.as_mut(), preview.as_ref(), &engine, &cache, &args)
}

fn build_detector(args: &Args, config: &EngineConfig) -> Result<SubjectDetector> {
    let mut detector = SubjectDetector::new(config.detection.clone());
    if let Some(path) = &args.face_model {
        let face = RustfaceDetector::from_file(path)
            .with_context(|| format!("Failed to load face model {}", path.display()))?;
        detector = detector.with_primary(Box::new(face));
    } else {
        tracing::warn!("No face model given, face detection disabled");
    }

    if let Some(path) = &args.person_model {
        #[cfg(feature = "onnx")]
        {
            let person = framesight::detection::OnnxPersonDetector::load(path)
                .context("Failed to load person detector")?;
            detector = detector.with_secondary(Box::new(person));
        }
        #[cfg(not(feature = "onnx"))]
        tracing::warn!("Ignoring {}: built without the onnx feature", path.display());
    }
    Ok(detector)
}

fn open_capture(args: &Args) -> Result<Box<dyn CaptureSource>> {
    if let Some(dir) = &args.frames {
        return Ok(Box::new(DirectoryCapture::open(dir, args.looping)?));
    }

    #[cfg(feature = "device")]
    {
        let webcam = framesight::capture::WebcamCapture::new(args.input_device)
            .context("Failed to initialize webcam capture")?;
        Ok(Box::new(webcam))
    }
    #[cfg(not(feature = "device"))]
    {
        anyhow::bail!(
            "no --frames directory given and webcam {} needs the device feature",
            args.input_device
        )
    }
}

fn open_output(args: &Args, width: u32, height: u32) -> Result<Option<Box<dyn OutputSink>>> {
    if let Some(device) = &args.output_device {
        #[cfg(feature = "device")]
        {
            let sink = framesight::output::V4L2Output::new(device, width, height)
                .context("Failed to initialize v4l2loopback output")?;
            return Ok(Some(Box::new(sink)));
        }
        #[cfg(not(feature = "device"))]
        anyhow::bail!("cannot write to {}: built without the device feature", device);
    }
    if let Some(dir) = &args.output_dir {
        return Ok(Some(Box::new(DiskOutput::new(dir, width, height)?)));
    }
    Ok(None)
}

fn run_pipeline(
    capture: &mut dyn CaptureSource,
    preview: Option<&PreviewWorker>,
    engine: &CompositionEngine,
    cache: &MaskCache,
    args: &Args,
) -> Result<()> {
    let frame_duration = Duration::from_secs_f32(1.0 / args.fps.max(1) as f32);
    let results = engine.subscribe();
    let mut frame_count = 0u64;
    let mut total_capture_time = Duration::ZERO;

    engine.start();
    tracing::info!("Starting main pipeline loop");
    tracing::info!("Press Ctrl+C to stop");

    loop {
        let loop_start = Instant::now();

        let capture_start = Instant::now();
        let Some(frame) = capture.next_frame().context("Failed to capture frame")? else {
            tracing::info!("Capture source exhausted after {} frames", frame_count);
            break;
        };
        total_capture_time += capture_start.elapsed();

        let image = Arc::clone(&frame.image);
        engine.submit_frame(frame);

        if let Some(preview) = preview {
            preview.offer(image);
        }

        for published in results.try_iter() {
            let result = &published.result;
            tracing::info!(
                "Frame {} [{}] score={:.2} {} ({})",
                result.frame_id.0,
                result.technique.key(),
                result.score,
                result.message,
                result.icon_key
            );
            if let Some(signals) = &result.signals {
                tracing::debug!("Signals: {:?}", signals);
            }
        }

        frame_count += 1;

        if frame_count % 30 == 0 {
            let avg_capture_ms = total_capture_time.as_secs_f64() * 1000.0 / frame_count as f64;
            let (written, dropped) = preview.map_or((0, 0), |p| (p.written(), p.dropped()));
            let stats = cache.stats();
            tracing::info!(
                "Frame {}: capture={:.1}ms, previews={} written/{} dropped, cache={} entries/{} KB, hits={}, segmentations={}",
                frame_count,
                avg_capture_ms,
                written,
                dropped,
                stats.entries,
                stats.cost / 1024,
                stats.hits + stats.derived_hits,
                stats.segmentations
            );
        }

        let elapsed = loop_start.elapsed();
        if elapsed < frame_duration {
            std::thread::sleep(frame_duration - elapsed);
        }
    }

    engine.stop();
    Ok(())
}
