//! Frame-analysis pipeline: throttle, decode, dedup, emit

pub mod controller;
pub mod events;
pub mod filter;
pub mod throttle;

use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam::utils::CachePadded;

pub use controller::{PipelineController, PipelineError, PipelineState};
pub use events::{ScanEvent, ScanEvents};
pub use filter::{on_decoded, ScanSession};
pub use throttle::{AnalysisThrottle, Delivery};

/// Counters shared by the producer and the analysis lane
#[derive(Default)]
pub struct Counters {
    accepted: CachePadded<AtomicU64>,
    submitted: CachePadded<AtomicU64>,
    dropped: CachePadded<AtomicU64>,
    decoded: CachePadded<AtomicU64>,
    decode_failures: CachePadded<AtomicU64>,
    cancelled: CachePadded<AtomicU64>,
    emitted: CachePadded<AtomicU64>,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> PipelineStats {
        PipelineStats {
            accepted: self.accepted.load(Ordering::Relaxed),
            submitted: self.submitted.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            decoded: self.decoded.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            emitted: self.emitted.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of the pipeline counters
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PipelineStats {
    /// Frames offered by the camera
    pub accepted: u64,
    /// Frames handed to the decoder
    pub submitted: u64,
    /// Frames released without being decoded
    pub dropped: u64,
    pub decoded: u64,
    pub decode_failures: u64,
    /// Frames whose decode was abandoned by `stop()`
    pub cancelled: u64,
    /// New values delivered to the caller
    pub emitted: u64,
}

impl PipelineStats {
    /// Every accepted frame has been dropped, decoded or cancelled.
    pub fn settled(&self) -> bool {
        self.accepted == self.dropped + self.decoded + self.decode_failures + self.cancelled
    }
}
