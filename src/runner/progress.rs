//! Run progress events
//!
//! Ordered per-run events for the external status transport. Events of one
//! run are emitted in step order; nothing is guaranteed across runs.

use serde::Serialize;
use tokio::sync::mpsc;

/// Status of a step as the run advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Started,
    Succeeded,
    /// Failed, side effect omitted per `skip_on_failure`
    Skipped,
    /// Failed, tolerated per `continue_on_error`
    Tolerated,
    Retrying,
    Failed,
    /// `decide_config` swapped the active step sequence
    ConfigSwitched,
}

/// One progress event of a run.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressEvent {
    pub step_index: usize,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Progress sink. Without a subscriber events are dropped; with one they are
/// delivered in emission order.
#[derive(Debug, Clone, Default)]
pub struct ProgressSink {
    sender: Option<mpsc::Sender<ProgressEvent>>,
}

impl ProgressSink {
    pub fn new(sender: mpsc::Sender<ProgressEvent>) -> Self {
        Self {
            sender: Some(sender),
        }
    }

    /// Sink that discards everything.
    pub fn disabled() -> Self {
        Self { sender: None }
    }

    pub async fn emit(&self, step_index: usize, status: StepStatus, message: Option<String>) {
        if let Some(sender) = &self.sender {
            // A gone receiver must not fail the run.
            let _ = sender
                .send(ProgressEvent {
                    step_index,
                    status,
                    message,
                })
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_arrive_in_order() {
        let (tx, mut rx) = mpsc::channel(16);
        let sink = ProgressSink::new(tx);

        sink.emit(0, StepStatus::Started, None).await;
        sink.emit(0, StepStatus::Succeeded, None).await;
        sink.emit(1, StepStatus::Started, Some("clicking".to_string()))
            .await;

        let first = rx.recv().await.unwrap();
        assert_eq!((first.step_index, first.status), (0, StepStatus::Started));
        let second = rx.recv().await.unwrap();
        assert_eq!(second.status, StepStatus::Succeeded);
        let third = rx.recv().await.unwrap();
        assert_eq!(third.step_index, 1);
    }

    #[tokio::test]
    async fn test_disabled_sink_drops_silently() {
        let sink = ProgressSink::disabled();
        sink.emit(0, StepStatus::Started, None).await;
    }
}
