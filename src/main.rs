use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use glcap::config::{CaptureConfig, InfoConfig, ScalerConfig};
use glcap::gl_backend::mock::MockBackend;
use glcap::gl_capture::GlCapture;
use glcap::info::InfoSink;
use glcap_proto::{PacketStream, PixelFormat};
use glcap_scale::Scaler;

/// Runs the capture -> scale -> info pipeline against a synthetic frame
/// source, printing a running byte/fps tally until the duration elapses.
#[derive(Parser, Debug)]
#[command(name = "glcap")]
#[command(about = "Capture, rescale and tally a synthetic video stream")]
struct Args {
    /// Source width in pixels, before any crop or scale is applied.
    #[arg(long, default_value_t = 1920)]
    width: u32,

    /// Source height in pixels.
    #[arg(long, default_value_t = 1080)]
    height: u32,

    /// Target capture frame rate.
    #[arg(long, default_value_t = 30.0)]
    fps: f64,

    /// Output scale factor: 1.0 passthrough, 0.5 box filter, anything else
    /// bilinear.
    #[arg(long, default_value_t = 1.0)]
    scale: f64,

    /// How long to run before stopping and printing the final tally.
    #[arg(long, default_value_t = 5)]
    seconds: u64,

    /// Number of scaler worker threads; defaults to available parallelism.
    #[arg(long)]
    workers: Option<usize>,

    /// Block on a full downstream buffer instead of dropping the frame, and
    /// pace emission to the configured fps instead of best-effort.
    #[arg(long, default_value_t = false)]
    lock_fps: bool,

    /// Diagnostic verbosity in 1..=6; higher levels log more of what the
    /// info sink tallies.
    #[arg(long, default_value_t = 1)]
    info_level: u8,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let args = Args::parse();

    let capture_config = CaptureConfig { fps: args.fps, lock_fps: args.lock_fps, ..CaptureConfig::default() };
    capture_config.validate().map_err(anyhow::Error::msg).context("invalid capture configuration")?;
    let scaler_config = ScalerConfig { scale: args.scale, workers: args.workers, ..ScalerConfig::default() };
    scaler_config.validate().map_err(anyhow::Error::msg).context("invalid scaler configuration")?;
    let info_config = InfoConfig { enabled: true, info_level: args.info_level };
    info_config.validate().map_err(anyhow::Error::msg).context("invalid info configuration")?;

    let capture_to_scale = PacketStream::bounded(capture_config.buffer_capacity);
    let scale_to_info = PacketStream::bounded(scaler_config.buffer_capacity);

    let scaler = Scaler::spawn(capture_to_scale.clone(), scale_to_info.clone(), scaler_config.scale, scaler_config.workers);

    let backend = MockBackend::new(args.width, args.height, PixelFormat::Bgra);
    let mut capture = GlCapture::new(1, backend, capture_config.clone(), capture_to_scale.clone())
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    capture.start();

    let period = Duration::from_secs_f64(1.0 / capture_config.fps);
    let deadline = Instant::now() + Duration::from_secs(args.seconds);
    let capture_to_scale_for_shutdown = capture_to_scale.clone();

    let capture_thread = std::thread::spawn(move || {
        while Instant::now() < deadline {
            if let Err(err) = capture.capture_frame() {
                tracing::error!(%err, "capture loop stopped");
                break;
            }
            std::thread::sleep(period);
        }
        capture.stop();
        capture_to_scale_for_shutdown.cancel();
    });

    let info_feed = scale_to_info.clone();
    let info_thread = std::thread::spawn(move || {
        let mut info = InfoSink::new(info_config);
        loop {
            match info_feed.recv() {
                Ok(message) => info.observe(&message),
                Err(_) => break,
            }
        }
        info
    });

    capture_thread.join().expect("capture thread panicked");
    scaler.join();
    scale_to_info.cancel();
    let info = info_thread.join().expect("info thread panicked");

    if let Some(report) = info.video_report(1) {
        println!("frames={} bytes={}", report.frames, glcap::info::format_bytes(report.bytes));
    }

    Ok(())
}
