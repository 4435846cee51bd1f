//! Replays still images from a directory as a camera feed

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use super::frame::{Frame, FrameMetadata, FrameRelease, PixelFormat, ReleaseError, Rotation};
use super::source::{Camera, CameraError, FrameSink};
use crate::{utils, CaptureConfig};

/// Camera stand-in that cycles through image files at a fixed rate.
///
/// JPEG files are delivered as MJPEG frames, anything else is decoded up
/// front and delivered as RGB24.
pub struct ReplayCamera {
    images: Arc<[ReplayImage]>,
    fps: u32,
    repeat: bool,
    rotation: Rotation,
    sequence: Arc<AtomicU64>,
    ledger: Arc<FrameLedger>,
    done: Arc<watch::Sender<bool>>,
    lane: Mutex<Option<Lane>>,
}

struct ReplayImage {
    data: Bytes,
    width: u32,
    height: u32,
    format: PixelFormat,
}

struct Lane {
    stop: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

impl ReplayCamera {
    #[instrument(skip(config))]
    pub fn open(dir: &Path, config: &CaptureConfig) -> Result<Self, CameraError> {
        let paths = utils::collect_images(dir)?;
        if paths.is_empty() {
            return Err(CameraError::Unavailable(format!(
                "no images in {}",
                dir.display()
            )));
        }

        let images = paths
            .iter()
            .map(|path| load_image(path))
            .collect::<Result<Vec<_>, _>>()?;
        info!("Loaded {} replay images from {}", images.len(), dir.display());

        Ok(Self {
            images: images.into(),
            fps: config.fps.max(1),
            repeat: config.repeat,
            rotation: config.rotation,
            sequence: Arc::new(AtomicU64::new(0)),
            ledger: Arc::new(FrameLedger::default()),
            done: Arc::new(watch::Sender::new(false)),
            lane: Mutex::new(None),
        })
    }

    /// Flips to `true` once every image was delivered and `repeat` is off.
    pub fn done(&self) -> watch::Receiver<bool> {
        self.done.subscribe()
    }

    /// Frames handed out and not yet returned.
    pub fn outstanding(&self) -> usize {
        self.ledger.outstanding()
    }

    fn lane(&self) -> MutexGuard<'_, Option<Lane>> {
        self.lane.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Camera for ReplayCamera {
    fn bind(&self, sink: FrameSink) -> Result<(), CameraError> {
        let mut lane = self.lane();
        if lane.is_some() {
            return Err(CameraError::AlreadyBound);
        }

        let stop = Arc::new(AtomicBool::new(false));
        let producer = Producer {
            images: self.images.clone(),
            interval: Duration::from_secs_f64(1.0 / self.fps as f64),
            repeat: self.repeat,
            rotation: self.rotation,
            sequence: self.sequence.clone(),
            ledger: self.ledger.clone(),
            done: self.done.clone(),
            stop: stop.clone(),
        };

        self.done.send_replace(false);
        let thread = std::thread::Builder::new()
            .name("codescan-replay".into())
            .spawn(move || producer.run(sink))?;

        *lane = Some(Lane { stop, thread });
        info!(fps = self.fps, repeat = self.repeat, "Replay camera bound");
        Ok(())
    }

    fn unbind(&self) {
        let Some(lane) = self.lane().take() else {
            return;
        };

        lane.stop.store(true, Ordering::Release);
        if lane.thread.join().is_err() {
            warn!("Replay thread panicked");
        }
        info!(outstanding = self.outstanding(), "Replay camera unbound");
    }

    fn set_torch(&self, _enabled: bool) -> Result<(), CameraError> {
        Err(CameraError::TorchUnsupported)
    }
}

impl Drop for ReplayCamera {
    fn drop(&mut self) {
        self.unbind();
    }
}

struct Producer {
    images: Arc<[ReplayImage]>,
    interval: Duration,
    repeat: bool,
    rotation: Rotation,
    sequence: Arc<AtomicU64>,
    ledger: Arc<FrameLedger>,
    done: Arc<watch::Sender<bool>>,
    stop: Arc<AtomicBool>,
}

impl Producer {
    fn run(self, sink: FrameSink) {
        loop {
            for image in self.images.iter() {
                if self.stop.load(Ordering::Acquire) || sink.is_closed() {
                    debug!("Replay producer stopping");
                    return;
                }

                let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
                self.ledger.issue(sequence);

                let meta = FrameMetadata {
                    sequence,
                    width: image.width,
                    height: image.height,
                    stride: 0,
                    format: image.format,
                    rotation: self.rotation,
                    device_timestamp: None,
                };
                sink.push(Frame::new(image.data.clone(), meta).with_release(self.ledger.clone()));

                std::thread::sleep(self.interval);
            }

            if !self.repeat {
                self.done.send_replace(true);
                return;
            }
        }
    }
}

fn load_image(path: &Path) -> Result<ReplayImage, CameraError> {
    let image_err = |e: image::ImageError| CameraError::Io(format!("{}: {}", path.display(), e));

    if utils::is_jpeg(path) {
        let (width, height) = image::image_dimensions(path).map_err(image_err)?;
        let data = std::fs::read(path)?;
        return Ok(ReplayImage {
            data: Bytes::from(data),
            width,
            height,
            format: PixelFormat::Mjpeg,
        });
    }

    let rgb = image::open(path).map_err(image_err)?.to_rgb8();
    Ok(ReplayImage {
        width: rgb.width(),
        height: rgb.height(),
        data: Bytes::from(rgb.into_raw()),
        format: PixelFormat::Rgb24,
    })
}

/// Tracks which replayed frames are still held by the pipeline.
#[derive(Default)]
struct FrameLedger {
    issued: AtomicU64,
    outstanding: Mutex<HashSet<u64>>,
}

impl FrameLedger {
    fn issue(&self, sequence: u64) {
        self.issued.fetch_max(sequence, Ordering::Relaxed);
        self.held().insert(sequence);
    }

    fn outstanding(&self) -> usize {
        self.held().len()
    }

    fn held(&self) -> MutexGuard<'_, HashSet<u64>> {
        self.outstanding
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl FrameRelease for FrameLedger {
    fn release(&self, meta: &FrameMetadata) -> Result<(), ReleaseError> {
        if self.held().remove(&meta.sequence) {
            return Ok(());
        }
        if meta.sequence > self.issued.load(Ordering::Relaxed) {
            Err(ReleaseError::Unknown(meta.sequence))
        } else {
            Err(ReleaseError::AlreadyReleased(meta.sequence))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{AnalysisThrottle, Delivery};

    fn write_png(dir: &Path, name: &str) {
        image::GrayImage::from_pixel(4, 3, image::Luma([200]))
            .save(dir.join(name))
            .unwrap();
    }

    fn config(repeat: bool) -> CaptureConfig {
        CaptureConfig {
            fps: 200,
            repeat,
            rotation: Rotation::Deg90,
            ..CaptureConfig::default()
        }
    }

    #[test]
    fn empty_directory_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            ReplayCamera::open(dir.path(), &config(false)),
            Err(CameraError::Unavailable(_))
        ));
    }

    #[test]
    fn torch_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        write_png(dir.path(), "a.png");
        let camera = ReplayCamera::open(dir.path(), &config(false)).unwrap();
        assert_eq!(camera.set_torch(true), Err(CameraError::TorchUnsupported));
    }

    #[tokio::test]
    async fn replays_every_image_and_accounts_for_each_frame() {
        let dir = tempfile::tempdir().unwrap();
        write_png(dir.path(), "a.png");
        write_png(dir.path(), "b.png");

        let camera = ReplayCamera::open(dir.path(), &config(false)).unwrap();
        let throttle = Arc::new(AnalysisThrottle::new(Arc::default()));
        let mut done = camera.done();

        camera.bind(FrameSink::new(throttle.clone())).unwrap();
        assert_eq!(
            camera.bind(FrameSink::new(throttle.clone())),
            Err(CameraError::AlreadyBound)
        );

        done.wait_for(|finished| *finished).await.unwrap();
        camera.unbind();

        let Delivery::Frame(frame) = throttle.next().await else {
            panic!("expected the last replayed frame");
        };
        assert_eq!(frame.meta.format, PixelFormat::Rgb24);
        assert_eq!((frame.meta.width, frame.meta.height), (4, 3));
        assert_eq!(frame.rotation(), Rotation::Deg90);
        assert_eq!(frame.sequence(), 2);
        assert_eq!(camera.outstanding(), 1);

        frame.release();
        assert_eq!(camera.outstanding(), 0);
    }

    #[test]
    fn ledger_rejects_double_release() {
        let ledger = FrameLedger::default();
        ledger.issue(1);
        let meta = FrameMetadata {
            sequence: 1,
            width: 1,
            height: 1,
            stride: 0,
            format: PixelFormat::Luma8,
            rotation: Rotation::Deg0,
            device_timestamp: None,
        };
        assert!(ledger.release(&meta).is_ok());
        assert!(matches!(
            ledger.release(&meta),
            Err(ReleaseError::AlreadyReleased(1))
        ));

        let unknown = FrameMetadata { sequence: 5, ..meta };
        assert!(matches!(ledger.release(&unknown), Err(ReleaseError::Unknown(5))));
    }
}
