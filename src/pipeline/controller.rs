//! Pipeline lifecycle and the analysis lane

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use super::filter::{self, ScanSession};
use super::throttle::{AnalysisThrottle, Delivery};
use super::{Counters, PipelineStats, ScanEvents};
use crate::capture::{Camera, CameraError, Frame, FrameSink};
use crate::scan::{DecodeError, DecodedSymbol, Decoder};
use crate::PipelineConfig;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PipelineError {
    /// The camera could not be bound, or lost its binding while running.
    #[error("camera binding failed: {0}")]
    BindingFailed(#[source] CameraError),
    /// A single frame failed to decode; the pipeline keeps running.
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("pipeline must be started from within a tokio runtime")]
    NoRuntime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Stopped,
    Starting,
    Running,
}

/// Owns the camera binding and the analysis worker for one scanner.
///
/// Frames flow camera → throttle → decoder → dedup filter → [`ScanEvents`].
pub struct PipelineController<C: Camera, D: Decoder> {
    camera: Arc<C>,
    decoder: Arc<D>,
    events: Arc<dyn ScanEvents>,
    slow_decode: Duration,
    state: Arc<watch::Sender<PipelineState>>,
    session: Arc<Mutex<Option<ScanSession>>>,
    counters: Arc<Counters>,
    generation: u64,
    active: Option<Active>,
}

struct Active {
    throttle: Arc<AnalysisThrottle>,
    worker: JoinHandle<()>,
}

impl<C: Camera, D: Decoder> PipelineController<C, D> {
    pub fn new(camera: C, decoder: D, events: impl ScanEvents, config: &PipelineConfig) -> Self {
        Self {
            camera: Arc::new(camera),
            decoder: Arc::new(decoder),
            events: Arc::new(events),
            slow_decode: Duration::from_millis(config.slow_decode_ms),
            state: Arc::new(watch::Sender::new(PipelineState::Stopped)),
            session: Arc::new(Mutex::new(None)),
            counters: Arc::new(Counters::default()),
            generation: 0,
            active: None,
        }
    }

    pub fn camera(&self) -> &C {
        &self.camera
    }

    pub fn state(&self) -> PipelineState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<PipelineState> {
        self.state.subscribe()
    }

    pub fn stats(&self) -> PipelineStats {
        self.counters.snapshot()
    }

    /// Bind the camera and begin analysing frames with a fresh session.
    ///
    /// A no-op while already running.
    #[instrument(skip(self))]
    pub fn start(&mut self) -> Result<(), PipelineError> {
        if self.state() == PipelineState::Running {
            debug!("Pipeline already running");
            return Ok(());
        }
        // Leftovers from a session that lost its camera; its lane has exited
        drop(self.teardown());

        let runtime = tokio::runtime::Handle::try_current().map_err(|_| PipelineError::NoRuntime)?;

        self.state.send_replace(PipelineState::Starting);
        self.generation += 1;
        let generation = self.generation;

        let throttle = Arc::new(AnalysisThrottle::new(self.counters.clone()));
        if let Err(e) = self.camera.bind(FrameSink::new(throttle.clone())) {
            warn!("Camera binding failed: {}", e);
            throttle.close();
            self.state.send_replace(PipelineState::Stopped);
            return Err(PipelineError::BindingFailed(e));
        }

        *lock(&self.session) = Some(ScanSession::new(generation));

        let lane = AnalysisLane {
            generation,
            throttle: throttle.clone(),
            decoder: self.decoder.clone(),
            events: self.events.clone(),
            session: self.session.clone(),
            state: self.state.clone(),
            counters: self.counters.clone(),
            slow_decode: self.slow_decode,
        };
        let worker = runtime.spawn(lane.run());

        self.active = Some(Active { throttle, worker });
        self.state.send_replace(PipelineState::Running);
        info!(generation, "Pipeline running");
        Ok(())
    }

    /// Stop analysing and release the camera. Idempotent.
    ///
    /// Once this returns, every queued or in-flight frame has been released
    /// and no further callback will be made for this session.
    #[instrument(skip(self))]
    pub async fn stop(&mut self) {
        if let Some(Active { throttle, worker }) = self.teardown() {
            // Cancelled is the expected outcome
            if let Err(e) = worker.await {
                if e.is_panic() {
                    warn!("Analysis worker panicked: {}", e);
                }
            }
            // The lane only awaits inside decode while a frame is submitted
            if throttle.in_flight() {
                throttle.complete();
                Counters::bump(&self.counters.cancelled);
                metrics::counter!("decodes_cancelled").increment(1);
                debug!("Abandoned an in-flight decode");
            }
            info!("Pipeline stopped");
        }
        self.state.send_replace(PipelineState::Stopped);
    }

    fn teardown(&mut self) -> Option<Active> {
        let active = self.active.take()?;

        // Late decode results are dropped from here on
        lock(&self.session).take();
        self.camera.unbind();
        active.throttle.close();
        active.worker.abort();
        Some(active)
    }

    /// Route one frame into the pipeline, or release it when not running.
    pub fn on_frame(&self, frame: Frame) {
        match &self.active {
            Some(active) if self.state() == PipelineState::Running => active.throttle.offer(frame),
            _ => {
                debug!(sequence = frame.sequence(), "Pipeline not running, releasing frame");
                frame.release();
            }
        }
    }

    /// Torch passthrough; failures are logged and otherwise ignored.
    pub fn set_torch(&self, enabled: bool) {
        if self.state() != PipelineState::Running {
            debug!(enabled, "No camera streaming, ignoring torch request");
            return;
        }
        if let Err(e) = self.camera.set_torch(enabled) {
            warn!(enabled, "Torch control failed: {}", e);
        }
    }
}

fn lock(session: &Mutex<Option<ScanSession>>) -> MutexGuard<'_, Option<ScanSession>> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The single consumer that runs decodes, one at a time.
struct AnalysisLane<D: Decoder> {
    generation: u64,
    throttle: Arc<AnalysisThrottle>,
    decoder: Arc<D>,
    events: Arc<dyn ScanEvents>,
    session: Arc<Mutex<Option<ScanSession>>>,
    state: Arc<watch::Sender<PipelineState>>,
    counters: Arc<Counters>,
    slow_decode: Duration,
}

impl<D: Decoder> AnalysisLane<D> {
    async fn run(self) {
        loop {
            let frame = match self.throttle.next().await {
                Delivery::Frame(frame) => frame,
                Delivery::Closed => break,
                Delivery::Lost(err) => {
                    self.lost(err);
                    break;
                }
            };

            let sequence = frame.sequence();
            let started = Instant::now();
            let outcome = self.decoder.decode(&frame).await;
            let elapsed = started.elapsed();

            self.throttle.complete();
            frame.release();

            metrics::histogram!("decode_time_us").record(elapsed.as_micros() as f64);
            if elapsed > self.slow_decode {
                debug!(sequence, elapsed_ms = elapsed.as_millis() as u64, "Slow decode");
            }

            match outcome {
                Ok(symbol) => {
                    Counters::bump(&self.counters.decoded);
                    metrics::counter!("frames_decoded").increment(1);
                    self.emit(sequence, symbol);
                }
                Err(err) => {
                    Counters::bump(&self.counters.decode_failures);
                    metrics::counter!("decode_failures").increment(1);
                    warn!(sequence, "Decode failed: {}", err);
                    self.report(PipelineError::Decode(err));
                }
            }
        }
        debug!(generation = self.generation, "Analysis lane finished");
    }

    fn emit(&self, sequence: u64, symbol: Option<DecodedSymbol>) {
        // The guard is held across the callback so stop() cannot return
        // while an emission for its session is still underway.
        let mut guard = lock(&self.session);
        let Some(session) = guard
            .as_mut()
            .filter(|s| s.generation() == self.generation)
        else {
            debug!(sequence, "Dropping result for a stopped session");
            return;
        };

        if let Some(value) = filter::on_decoded(symbol, session) {
            Counters::bump(&self.counters.emitted);
            metrics::counter!("values_emitted").increment(1);
            info!(sequence, value = %value, "New value scanned");
            self.events.on_new_value(value);
        }
    }

    fn report(&self, error: PipelineError) {
        let guard = lock(&self.session);
        if guard.as_ref().map(ScanSession::generation) == Some(self.generation) {
            self.events.on_failure(&error);
        }
    }

    fn lost(&self, err: CameraError) {
        warn!("Camera binding lost: {}", err);
        let error = PipelineError::BindingFailed(err);
        self.report(error);
        lock(&self.session).take();
        self.state.send_replace(PipelineState::Stopped);
    }
}
