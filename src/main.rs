//! codescan: scan QR and barcodes from a replayed or live feed, or preview the overlay

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use codescan::capture::{Camera, ReplayCamera};
use codescan::overlay::{compute_layout, render_overlay, CaptionConfig, OverlayStyle, Size, WindowShape};
use codescan::pipeline::{PipelineController, ScanEvent};
use codescan::scan::{BarcodeDecoder, Decoder};
use codescan::Config;

#[derive(Debug, Parser)]
#[command(name = "codescan", version, about = "QR and barcode scanning pipeline")]
struct Cli {
    /// TOML config file, layered over the defaults
    #[arg(long, global = true, env = "CODESCAN_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Replay a directory of images through the pipeline
    Scan {
        dir: PathBuf,
        #[arg(long)]
        fps: Option<u32>,
        /// Loop the images until interrupted
        #[arg(long)]
        repeat: bool,
        /// Keep scanning after the first value
        #[arg(long)]
        keep_going: bool,
    },
    /// Scan from a V4L2 camera
    #[cfg(feature = "v4l2")]
    Live {
        #[arg(long)]
        device: Option<String>,
        #[arg(long)]
        keep_going: bool,
        #[arg(long)]
        torch: bool,
    },
    /// Render the viewfinder overlay for a viewport to a PNG
    Overlay {
        #[arg(long, default_value_t = 1080)]
        width: u32,
        #[arg(long, default_value_t = 1920)]
        height: u32,
        #[arg(long)]
        out: PathBuf,
        #[arg(long)]
        square: bool,
        #[arg(long)]
        caption: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("codescan=info")),
        )
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    codescan::CONFIG.store(Arc::new(config.clone()));

    match cli.command {
        Command::Scan {
            dir,
            fps,
            repeat,
            keep_going,
        } => scan(&config, &dir, fps, repeat, keep_going).await,
        #[cfg(feature = "v4l2")]
        Command::Live {
            device,
            keep_going,
            torch,
        } => live(&config, device, keep_going, torch).await,
        Command::Overlay {
            width,
            height,
            out,
            square,
            caption,
        } => overlay(&config, width, height, &out, square, caption),
    }
}

fn decoder(config: &Config) -> BarcodeDecoder {
    BarcodeDecoder::new(&config.decoder)
}

async fn scan(config: &Config, dir: &Path, fps: Option<u32>, repeat: bool, keep_going: bool) -> Result<()> {
    let mut capture = config.capture.clone();
    if let Some(fps) = fps {
        capture.fps = fps;
    }
    capture.repeat |= repeat;

    let camera = ReplayCamera::open(dir, &capture)?;
    let done = camera.done();
    run(config, camera, decoder(config), Some(done), keep_going, false).await
}

#[cfg(feature = "v4l2")]
async fn live(config: &Config, device: Option<String>, keep_going: bool, torch: bool) -> Result<()> {
    let mut capture = config.capture.clone();
    if let Some(device) = device {
        capture.device = device;
    } else if capture.device.is_empty() {
        let found = codescan::utils::auto_detect_device()?;
        capture.device = found.path;
        capture.format = found.format;
    }
    info!("Using capture device: {}", capture.device);

    let camera = codescan::capture::V4l2Camera::new(capture);
    run(config, camera, decoder(config), None, keep_going, torch).await
}

/// Drive one pipeline until a value arrives, the feed ends or Ctrl-C.
async fn run<C: Camera, D: Decoder>(
    config: &Config,
    camera: C,
    decoder: D,
    mut done: Option<watch::Receiver<bool>>,
    keep_going: bool,
    torch: bool,
) -> Result<()> {
    let (tx, rx) = flume::bounded(config.pipeline.event_capacity.max(1));
    let mut pipeline = PipelineController::new(camera, decoder, tx, &config.pipeline);
    pipeline.start()?;
    if torch {
        pipeline.set_torch(true);
    }

    let mut found = 0usize;
    loop {
        tokio::select! {
            event = rx.recv_async() => match event {
                Ok(ScanEvent::NewValue(value)) => {
                    found += 1;
                    println!("{value}");
                    if !keep_going {
                        break;
                    }
                }
                Ok(ScanEvent::Failure(e)) => {
                    warn!("Pipeline failure: {}", e);
                    if matches!(e, codescan::pipeline::PipelineError::BindingFailed(_)) {
                        break;
                    }
                }
                Err(_) => break,
            },
            _ = feed_finished(&mut done) => {
                // Let the last frames finish decoding
                while !pipeline.stats().settled() {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
                found += drain(&rx);
                break;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    pipeline.stop().await;
    let stats = pipeline.stats();
    info!(
        accepted = stats.accepted,
        dropped = stats.dropped,
        decoded = stats.decoded,
        failures = stats.decode_failures,
        cancelled = stats.cancelled,
        emitted = stats.emitted,
        "Scan finished"
    );

    if found == 0 {
        return Err(eyre!("no code found"));
    }
    Ok(())
}

/// Print every value still queued, logging failures in between.
fn drain(rx: &flume::Receiver<ScanEvent>) -> usize {
    let mut found = 0;
    for event in rx.try_iter() {
        match event {
            ScanEvent::NewValue(value) => {
                found += 1;
                println!("{value}");
            }
            ScanEvent::Failure(e) => warn!("Pipeline failure: {}", e),
        }
    }
    found
}

async fn feed_finished(done: &mut Option<watch::Receiver<bool>>) {
    match done {
        Some(done) => {
            if done.wait_for(|finished| *finished).await.is_err() {
                std::future::pending::<()>().await;
            }
        }
        None => std::future::pending().await,
    }
}

fn overlay(
    config: &Config,
    width: u32,
    height: u32,
    out: &Path,
    square: bool,
    caption: Option<String>,
) -> Result<()> {
    let mut overlay = config.overlay.clone();
    if square {
        overlay.shape = WindowShape::Square;
    }
    if let Some(text) = caption {
        // Rough monospace metrics; the preview only needs the box
        let text_size = Size::new(text.chars().count() as f32 * 8.0, 16.0);
        overlay.caption = Some(CaptionConfig {
            text,
            text_size,
            icon: Some(Size::new(16.0, 16.0)),
            ..CaptionConfig::default()
        });
    }

    let layout = compute_layout(Size::new(width as f32, height as f32), &overlay);
    info!(scan_window = ?layout.scan_window, "Computed overlay layout");

    render_overlay(&layout, &OverlayStyle::default()).save(out)?;
    info!("Wrote {}", out.display());
    Ok(())
}
