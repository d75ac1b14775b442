//! Stream event frames.

use serde::Serialize;

use crate::persistence::PersistenceOutcome;
use crate::pipeline::DecklistRecord;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Validating,
    Processing,
    Completed,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProgressEvent {
    pub current: usize,
    pub total: usize,
    pub filename: String,
    pub phase: Phase,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ResultEvent {
    pub index: usize,
    pub filename: String,
    pub decklist: DecklistRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persistence: Option<PersistenceOutcome>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ErrorEvent {
    pub index: usize,
    pub filename: String,
    /// `validation`, `segmentation`, `decode` or `internal`
    pub reason: String,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteEvent {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub average_accuracy: Option<f64>,
    pub elapsed_seconds: f64,
}

/// One frame of the batch stream. Serializes as `{"event": ..., "data": {...}}`.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "lowercase")]
pub enum StreamEvent {
    Progress(ProgressEvent),
    Result(ResultEvent),
    Error(ErrorEvent),
    Complete(CompleteEvent),
}

impl StreamEvent {
    pub fn name(&self) -> &'static str {
        match self {
            StreamEvent::Progress(_) => "progress",
            StreamEvent::Result(_) => "result",
            StreamEvent::Error(_) => "error",
            StreamEvent::Complete(_) => "complete",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Complete(_))
    }

    fn data_json(&self) -> serde_json::Result<String> {
        match self {
            StreamEvent::Progress(data) => serde_json::to_string(data),
            StreamEvent::Result(data) => serde_json::to_string(data),
            StreamEvent::Error(data) => serde_json::to_string(data),
            StreamEvent::Complete(data) => serde_json::to_string(data),
        }
    }

    /// Server-Sent-Events frame: `event: <name>\ndata: <json>\n\n`.
    pub fn to_sse(&self) -> serde_json::Result<String> {
        Ok(format!("event: {}\ndata: {}\n\n", self.name(), self.data_json()?))
    }

    /// One JSON object terminated by a newline.
    pub fn to_json_line(&self) -> serde_json::Result<String> {
        Ok(format!("{}\n", serde_json::to_string(self)?))
    }
}
