//! Request and response types for the Message Batches API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Batch creation
// =============================================================================

/// Body of `POST /messages/batches`.
#[derive(Debug, Clone, Serialize)]
pub struct CreateBatchRequest {
    pub requests: Vec<BatchRequest>,
}

/// One request inside a batch. `custom_id` comes back untouched on the result line.
#[derive(Debug, Clone, Serialize)]
pub struct BatchRequest {
    pub custom_id: String,
    pub params: MessageParams,
}

/// Parameters of a single Messages API call.
#[derive(Debug, Clone, Serialize)]
pub struct MessageParams {
    pub model: String,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub messages: Vec<Message>,
}

impl MessageParams {
    /// Single-turn request with a user prompt.
    pub fn single_turn(model: impl Into<String>, max_tokens: u32, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            max_tokens,
            system: None,
            messages: vec![Message::user(prompt)],
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

// =============================================================================
// Batch status
// =============================================================================

/// A message batch as returned by create/retrieve.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageBatch {
    pub id: String,
    pub processing_status: ProcessingStatus,
    #[serde(default)]
    pub request_counts: RequestCounts,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub results_url: Option<String>,
}

/// Processing status reported for a batch.
///
/// The batches endpoint reports `in_progress`, `canceling` and `ended`; the
/// remaining variants are emitted by compatible batch gateways. Anything else
/// lands in `Unrecognized` so callers can surface it instead of failing to parse.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    InProgress,
    Canceling,
    Ended,
    Completed,
    Failed,
    Expired,
    Canceled,
    #[serde(other)]
    Unrecognized,
}

/// Per-batch request tallies.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
pub struct RequestCounts {
    #[serde(default)]
    pub processing: u32,
    #[serde(default)]
    pub succeeded: u32,
    #[serde(default)]
    pub errored: u32,
    #[serde(default)]
    pub canceled: u32,
    #[serde(default)]
    pub expired: u32,
}

impl RequestCounts {
    /// Requests that did not succeed (errored + expired + canceled).
    pub fn unsuccessful(&self) -> u32 {
        self.errored + self.expired + self.canceled
    }
}

// =============================================================================
// Batch results (one JSON object per line)
// =============================================================================

/// One line of the results file.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchResultItem {
    #[serde(default)]
    pub custom_id: Option<String>,
    pub result: BatchResult,
}

/// Outcome of a single request in a batch.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BatchResult {
    Succeeded {
        message: ResultMessage,
    },
    Errored {
        #[serde(default)]
        error: Option<serde_json::Value>,
    },
    Canceled,
    Expired,
    #[serde(other)]
    Unknown,
}

impl BatchResult {
    /// Short tag used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            BatchResult::Succeeded { .. } => "succeeded",
            BatchResult::Errored { .. } => "errored",
            BatchResult::Canceled => "canceled",
            BatchResult::Expired => "expired",
            BatchResult::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResultMessage {
    #[serde(default)]
    pub content: Vec<ContentBlock>,
}

impl ResultMessage {
    /// Text of the first content block, if any.
    pub fn first_text(&self) -> Option<&str> {
        self.content.first().and_then(|block| block.text.as_deref())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}
