use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// One captured camera image, exclusively owned by whichever stage holds it.
///
/// The underlying source resource is released exactly once: either through
/// [`Frame::release`] or when the frame is dropped, whichever comes first.
pub struct Frame {
    /// Immutable frame data - can be shared across threads without copying
    pub data: Bytes,

    /// Frame metadata
    pub meta: Arc<FrameMetadata>,

    /// Capture timestamp for latency tracking
    pub timestamp: Instant,

    release: Option<Arc<dyn FrameRelease>>,
}

/// Frame metadata
#[derive(Debug, Clone)]
pub struct FrameMetadata {
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    /// Bytes per row, 0 when rows are tightly packed
    pub stride: u32,
    pub format: PixelFormat,
    pub rotation: Rotation,
    pub device_timestamp: Option<Duration>, // Hardware timestamp if available
}

/// Pixel formats we support
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    Rgb24,
    Bgr24,
    Yuyv4,
    Mjpeg,
    Nv12,
    Luma8,
}

impl PixelFormat {
    /// Bytes per pixel of the first plane, `None` for compressed formats.
    pub fn bytes_per_pixel(self) -> Option<u32> {
        match self {
            PixelFormat::Rgb24 | PixelFormat::Bgr24 => Some(3),
            PixelFormat::Yuyv4 => Some(2),
            PixelFormat::Nv12 | PixelFormat::Luma8 => Some(1),
            PixelFormat::Mjpeg => None,
        }
    }
}

/// Sensor rotation reported alongside each frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    pub fn degrees(self) -> u32 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("rotation must be one of 0, 90, 180 or 270 degrees, got {0}")]
pub struct InvalidRotation(pub u32);

impl TryFrom<u32> for Rotation {
    type Error = InvalidRotation;

    fn try_from(degrees: u32) -> Result<Self, Self::Error> {
        match degrees {
            0 => Ok(Rotation::Deg0),
            90 => Ok(Rotation::Deg90),
            180 => Ok(Rotation::Deg180),
            270 => Ok(Rotation::Deg270),
            other => Err(InvalidRotation(other)),
        }
    }
}

impl From<Rotation> for u32 {
    fn from(rotation: Rotation) -> Self {
        rotation.degrees()
    }
}

/// Release path back to the source that produced a frame.
pub trait FrameRelease: Send + Sync {
    fn release(&self, meta: &FrameMetadata) -> Result<(), ReleaseError>;
}

#[derive(Debug, Error)]
pub enum ReleaseError {
    #[error("frame {0} was not issued by this source")]
    Unknown(u64),
    #[error("frame {0} was already returned to its source")]
    AlreadyReleased(u64),
    #[error("source rejected frame {sequence}: {reason}")]
    Rejected { sequence: u64, reason: String },
}

impl Frame {
    /// Frame with no source resource attached.
    pub fn new(data: Bytes, meta: FrameMetadata) -> Self {
        Self {
            data,
            meta: Arc::new(meta),
            timestamp: Instant::now(),
            release: None,
        }
    }

    /// Attach the release hook of the producing source.
    pub fn with_release(mut self, hook: Arc<dyn FrameRelease>) -> Self {
        self.release = Some(hook);
        self
    }

    pub fn sequence(&self) -> u64 {
        self.meta.sequence
    }

    pub fn rotation(&self) -> Rotation {
        self.meta.rotation
    }

    /// Hand the frame back to its source.
    pub fn release(mut self) {
        self.release_now();
    }

    fn release_now(&mut self) {
        let Some(hook) = self.release.take() else {
            return;
        };

        // A failing source must never take the analysis lane down with it.
        if let Err(e) = hook.release(&self.meta) {
            warn!(sequence = self.meta.sequence, "Frame release failed: {}", e);
            metrics::counter!("frame_release_failures").increment(1);
        }
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        self.release_now();
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("sequence", &self.meta.sequence)
            .field("size", &(self.meta.width, self.meta.height))
            .field("format", &self.meta.format)
            .field("rotation", &self.meta.rotation.degrees())
            .field("bytes", &self.data.len())
            .finish()
    }
}
