//! Keep-only-latest handoff between the camera and the analysis worker

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ringbuf::traits::{Consumer, Observer, RingBuffer};
use ringbuf::HeapRb;
use tokio::sync::Notify;
use tracing::debug;

use super::Counters;
use crate::capture::{CameraError, Frame};

/// What the analysis worker receives from [`AnalysisThrottle::next`].
#[derive(Debug)]
pub enum Delivery {
    Frame(Frame),
    /// The throttle was closed, no more frames will arrive.
    Closed,
    /// The camera lost its binding while running.
    Lost(CameraError),
}

/// Single pending slot in front of the decoder.
///
/// The producer never blocks: a frame offered while another one is still
/// pending replaces it, and the replaced frame is released without being
/// decoded. The worker holds at most one submitted frame at a time.
pub struct AnalysisThrottle {
    slot: Mutex<Slot>,
    ready: Notify,
    in_flight: AtomicBool,
    counters: Arc<Counters>,
}

struct Slot {
    pending: HeapRb<Frame>,
    closed: bool,
    lost: Option<CameraError>,
}

impl AnalysisThrottle {
    pub fn new(counters: Arc<Counters>) -> Self {
        Self {
            slot: Mutex::new(Slot {
                pending: HeapRb::new(1),
                closed: false,
                lost: None,
            }),
            ready: Notify::new(),
            in_flight: AtomicBool::new(false),
            counters,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Producer: offer a frame for analysis.
    pub fn offer(&self, frame: Frame) {
        Counters::bump(&self.counters.accepted);

        let displaced = {
            let mut slot = self.lock();
            if slot.closed {
                Err(frame)
            } else {
                Ok(slot.pending.push_overwrite(frame))
            }
        };

        match displaced {
            Ok(None) => self.ready.notify_one(),
            Ok(Some(stale)) => {
                debug!(sequence = stale.sequence(), "Superseded pending frame");
                self.drop_frame(stale);
                self.ready.notify_one();
            }
            Err(late) => {
                debug!(sequence = late.sequence(), "Frame arrived after close");
                self.drop_frame(late);
            }
        }
    }

    fn drop_frame(&self, frame: Frame) {
        Counters::bump(&self.counters.dropped);
        metrics::counter!("frames_dropped").increment(1);
        frame.release();
    }

    /// Consumer: wait for the next frame to decode.
    ///
    /// Marks the returned frame as submitted until [`complete`](Self::complete).
    pub async fn next(&self) -> Delivery {
        loop {
            {
                let mut slot = self.lock();
                if let Some(err) = slot.lost.take() {
                    return Delivery::Lost(err);
                }
                if slot.closed {
                    return Delivery::Closed;
                }
                if let Some(frame) = slot.pending.try_pop() {
                    self.in_flight.store(true, Ordering::Release);
                    Counters::bump(&self.counters.submitted);
                    return Delivery::Frame(frame);
                }
            }

            // notify_one stores a permit, so an offer racing this wait is not lost
            self.ready.notified().await;
        }
    }

    /// Consumer: the submitted frame finished decoding.
    pub fn complete(&self) {
        self.in_flight.store(false, Ordering::Release);
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn has_pending(&self) -> bool {
        !self.lock().pending.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Stop accepting frames, release the pending one and wake the worker.
    pub fn close(&self) {
        let pending = {
            let mut slot = self.lock();
            slot.closed = true;
            slot.pending.try_pop()
        };
        if let Some(frame) = pending {
            self.drop_frame(frame);
        }
        self.ready.notify_one();
    }

    /// Camera binding was lost: close and hand the error to the worker.
    pub fn lose(&self, err: CameraError) {
        {
            let mut slot = self.lock();
            if slot.closed {
                return;
            }
            slot.lost = Some(err);
        }
        self.close();
    }
}
