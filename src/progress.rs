// src/progress.rs
// Fire-and-forget progress stream (§6, SPEC_FULL B.2). Consumers subscribe
// and may lag; the channel drops oldest events on overflow rather than
// applying back-pressure to the orchestration engine.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EventStatus {
    Started,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub task_id: String,
    pub phase: String,
    pub step: String,
    pub status: EventStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

const DEFAULT_CAPACITY: usize = 256;

/// Broadcast-backed progress stream. No back-pressure: a slow consumer
/// falls behind and silently misses the oldest events instead of stalling
/// the engine.
pub struct ProgressStream {
    sender: broadcast::Sender<ProgressEvent>,
}

impl Default for ProgressStream {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressStream {
    pub fn new() -> Self {
        let (sender, _receiver) = broadcast::channel(DEFAULT_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.sender.subscribe()
    }

    /// Fire-and-forget emit. No receivers subscribed is not an error.
    pub fn emit(&self, event: ProgressEvent) {
        let _ = self.sender.send(event);
    }

    pub fn started(&self, task_id: impl Into<String>, phase: impl Into<String>, step: impl Into<String>) {
        self.emit(ProgressEvent {
            task_id: task_id.into(),
            phase: phase.into(),
            step: step.into(),
            status: EventStatus::Started,
            payload: None,
            error: None,
        });
    }

    pub fn completed(
        &self,
        task_id: impl Into<String>,
        phase: impl Into<String>,
        step: impl Into<String>,
        payload: Option<Value>,
    ) {
        self.emit(ProgressEvent {
            task_id: task_id.into(),
            phase: phase.into(),
            step: step.into(),
            status: EventStatus::Completed,
            payload,
            error: None,
        });
    }

    pub fn failed(
        &self,
        task_id: impl Into<String>,
        phase: impl Into<String>,
        step: impl Into<String>,
        error: impl Into<String>,
    ) {
        self.emit(ProgressEvent {
            task_id: task_id.into(),
            phase: phase.into(),
            step: step.into(),
            status: EventStatus::Failed,
            payload: None,
            error: Some(error.into()),
        });
    }
}
