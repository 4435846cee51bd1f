//! Camera collaborator contract

use std::sync::Arc;

use thiserror::Error;

use super::Frame;
use crate::pipeline::AnalysisThrottle;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CameraError {
    #[error("camera unavailable: {0}")]
    Unavailable(String),
    #[error("camera disconnected: {0}")]
    Disconnected(String),
    #[error("camera is already bound")]
    AlreadyBound,
    #[error("torch control is not supported by this camera")]
    TorchUnsupported,
    #[error("camera i/o error: {0}")]
    Io(String),
}

impl From<std::io::Error> for CameraError {
    fn from(e: std::io::Error) -> Self {
        CameraError::Io(e.to_string())
    }
}

/// A frame producer the pipeline can bind to.
///
/// Implementations push frames into the [`FrameSink`] from their own thread
/// or callback until [`unbind`](Camera::unbind) is called, and may be bound
/// again afterwards.
pub trait Camera: Send + Sync + 'static {
    fn bind(&self, sink: FrameSink) -> Result<(), CameraError>;

    /// Stop producing. Must be safe to call when not bound.
    fn unbind(&self);

    fn set_torch(&self, enabled: bool) -> Result<(), CameraError>;
}

/// Producer-side handle into the analysis throttle.
#[derive(Clone)]
pub struct FrameSink {
    throttle: Arc<AnalysisThrottle>,
}

impl FrameSink {
    pub(crate) fn new(throttle: Arc<AnalysisThrottle>) -> Self {
        Self { throttle }
    }

    /// Hand a frame to the pipeline. Never blocks.
    pub fn push(&self, frame: Frame) {
        self.throttle.offer(frame);
    }

    /// Report that the camera binding was lost for good.
    pub fn fail(&self, err: CameraError) {
        self.throttle.lose(err);
    }

    /// True once the pipeline stopped listening; producers may exit early.
    pub fn is_closed(&self) -> bool {
        self.throttle.is_closed()
    }
}
