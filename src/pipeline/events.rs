use flume::TrySendError;
use tracing::{debug, warn};

use super::PipelineError;

/// Caller-side callbacks, invoked from the analysis lane.
///
/// Implementations must return promptly; hop to your own thread or task if
/// the reaction to a value is expensive.
pub trait ScanEvents: Send + Sync + 'static {
    fn on_new_value(&self, value: String);

    fn on_failure(&self, _error: &PipelineError) {}
}

/// Owned form of a callback, for channel-based consumers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    NewValue(String),
    Failure(PipelineError),
}

impl ScanEvents for flume::Sender<ScanEvent> {
    fn on_new_value(&self, value: String) {
        forward(self, ScanEvent::NewValue(value));
    }

    fn on_failure(&self, error: &PipelineError) {
        forward(self, ScanEvent::Failure(error.clone()));
    }
}

// Never block the analysis lane on a slow consumer
fn forward(tx: &flume::Sender<ScanEvent>, event: ScanEvent) {
    match tx.try_send(event) {
        Ok(()) => {}
        Err(TrySendError::Full(event)) => warn!("Event channel full, dropping {:?}", event),
        Err(TrySendError::Disconnected(_)) => debug!("Event receiver gone"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::CameraError;

    #[test]
    fn forwards_over_flume() {
        let (tx, rx) = flume::unbounded();
        tx.on_new_value("A".into());
        tx.on_failure(&PipelineError::BindingFailed(CameraError::AlreadyBound));

        assert_eq!(rx.try_recv().unwrap(), ScanEvent::NewValue("A".into()));
        assert!(matches!(rx.try_recv().unwrap(), ScanEvent::Failure(_)));
    }

    #[test]
    fn full_channel_does_not_block() {
        let (tx, rx) = flume::bounded(1);
        tx.on_new_value("A".into());
        tx.on_new_value("B".into());

        assert_eq!(rx.len(), 1);
        assert_eq!(rx.try_recv().unwrap(), ScanEvent::NewValue("A".into()));
    }
}
