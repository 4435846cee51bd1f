//! Live V4L2 camera source with memory-mapped streaming

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, info, instrument, warn};
use v4l::buffer::Type;
use v4l::capability::Flags as CapFlags;
use v4l::io::traits::CaptureStream;
use v4l::prelude::MmapStream;
use v4l::video::Capture;
use v4l::{Device, FourCC, Format};

use super::frame::{Frame, FrameMetadata, PixelFormat};
use super::source::{Camera, CameraError, FrameSink};
use crate::CaptureConfig;

/// V4L2 capture device bound on demand by the pipeline
pub struct V4l2Camera {
    config: CaptureConfig,
    sequence: Arc<AtomicU64>,
    lane: Mutex<Option<Lane>>,
}

struct Lane {
    stop: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

impl V4l2Camera {
    pub fn new(config: CaptureConfig) -> Self {
        Self {
            config,
            sequence: Arc::new(AtomicU64::new(0)),
            lane: Mutex::new(None),
        }
    }

    fn lane(&self) -> MutexGuard<'_, Option<Lane>> {
        self.lane.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open the device and negotiate the configured format
    #[instrument(skip(self))]
    fn open(&self) -> Result<(Device, FrameGeometry), CameraError> {
        let config = &self.config;
        info!("Opening V4L2 device: {}", config.device);

        let unavailable = |e: std::io::Error| CameraError::Unavailable(format!("{}: {}", config.device, e));
        let device = Device::with_path(&config.device).map_err(unavailable)?;

        let caps = device.query_caps().map_err(unavailable)?;
        info!("Device: {} ({})", caps.card, caps.driver);

        if !caps.capabilities.contains(CapFlags::VIDEO_CAPTURE) {
            return Err(CameraError::Unavailable(
                "device doesn't support video capture".into(),
            ));
        }

        let mut fmt = device.format().map_err(unavailable)?;
        fmt.width = config.width;
        fmt.height = config.height;
        fmt.fourcc = fourcc(config.format)?;
        // Drivers round to the nearest mode they support and may pad rows
        let applied = device.set_format(&fmt).map_err(unavailable)?;
        let geometry = FrameGeometry::negotiated(&applied, config.format)?;
        if (geometry.width, geometry.height) != (config.width, config.height) {
            info!(
                "Driver chose {}x{} instead of {}x{}",
                geometry.width, geometry.height, config.width, config.height
            );
        }

        Ok((device, geometry))
    }
}

impl Camera for V4l2Camera {
    fn bind(&self, sink: FrameSink) -> Result<(), CameraError> {
        let mut lane = self.lane();
        if lane.is_some() {
            return Err(CameraError::AlreadyBound);
        }

        let (device, geometry) = self.open()?;
        let stop = Arc::new(AtomicBool::new(false));
        let config = self.config.clone();
        let sequence = self.sequence.clone();
        let thread_stop = stop.clone();

        let thread = std::thread::Builder::new()
            .name("codescan-v4l2".into())
            .spawn(move || stream_frames(device, config, geometry, sequence, thread_stop, sink))?;

        *lane = Some(Lane { stop, thread });
        Ok(())
    }

    fn unbind(&self) {
        let Some(lane) = self.lane().take() else {
            return;
        };
        lane.stop.store(true, Ordering::Release);
        if lane.thread.join().is_err() {
            warn!("V4L2 capture thread panicked");
        }
        info!("V4L2 camera unbound");
    }

    fn set_torch(&self, _enabled: bool) -> Result<(), CameraError> {
        Err(CameraError::TorchUnsupported)
    }
}

impl Drop for V4l2Camera {
    fn drop(&mut self) {
        self.unbind();
    }
}

fn fourcc(format: PixelFormat) -> Result<FourCC, CameraError> {
    match format {
        PixelFormat::Mjpeg => Ok(FourCC::new(b"MJPG")),
        PixelFormat::Yuyv4 => Ok(FourCC::new(b"YUYV")),
        other => Err(CameraError::Unavailable(format!(
            "unsupported pixel format {:?}",
            other
        ))),
    }
}

/// Frame layout as applied by the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FrameGeometry {
    width: u32,
    height: u32,
    /// Bytes per row
    stride: u32,
}

impl FrameGeometry {
    fn negotiated(applied: &Format, requested: PixelFormat) -> Result<Self, CameraError> {
        if applied.fourcc != fourcc(requested)? {
            return Err(CameraError::Unavailable(format!(
                "driver switched pixel format to {}",
                applied.fourcc
            )));
        }
        Ok(Self {
            width: applied.width,
            height: applied.height,
            stride: applied.stride,
        })
    }
}

fn stream_frames(
    device: Device,
    config: CaptureConfig,
    geometry: FrameGeometry,
    sequence: Arc<AtomicU64>,
    stop: Arc<AtomicBool>,
    sink: FrameSink,
) {
    let mut stream = match MmapStream::with_buffers(&device, Type::VideoCapture, config.buffer_count) {
        Ok(stream) => stream,
        Err(e) => {
            sink.fail(CameraError::Io(e.to_string()));
            return;
        }
    };
    info!("Capture stream started with {} buffers", config.buffer_count);

    while !stop.load(Ordering::Acquire) && !sink.is_closed() {
        let (buf, meta) = match stream.next() {
            Ok(next) => next,
            Err(e) => {
                sink.fail(CameraError::Disconnected(e.to_string()));
                return;
            }
        };

        // The mmap'd buffer is requeued on the next dequeue, so copy out
        let used = (meta.bytesused as usize).min(buf.len());
        let data = Bytes::copy_from_slice(&buf[..used]);
        let frame_meta = FrameMetadata {
            sequence: sequence.fetch_add(1, Ordering::Relaxed) + 1,
            width: geometry.width,
            height: geometry.height,
            stride: geometry.stride,
            format: config.format,
            rotation: config.rotation,
            device_timestamp: Some(
                Duration::from_secs(meta.timestamp.sec as u64)
                    + Duration::from_micros(meta.timestamp.usec as u64),
            ),
        };
        sink.push(Frame::new(data, frame_meta));
    }
    debug!("V4L2 capture loop exited");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_carry_the_applied_geometry() {
        let mut applied = Format::new(640, 480, FourCC::new(b"YUYV"));
        applied.stride = 1344;

        let geometry = FrameGeometry::negotiated(&applied, PixelFormat::Yuyv4).unwrap();
        assert_eq!(
            geometry,
            FrameGeometry {
                width: 640,
                height: 480,
                stride: 1344
            }
        );
    }

    #[test]
    fn switched_pixel_format_is_rejected() {
        let applied = Format::new(800, 600, FourCC::new(b"YUYV"));
        assert!(matches!(
            FrameGeometry::negotiated(&applied, PixelFormat::Mjpeg),
            Err(CameraError::Unavailable(_))
        ));
    }
}
