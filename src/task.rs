//! Dispatch payloads and results

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Well-known task keys
pub mod keys {
    /// Raw user message
    pub const USER_MESSAGE: &str = "user_message";
    /// Classified intent label
    pub const INTENT: &str = "intent";
    /// Conversation the task belongs to
    pub const CONVERSATION_ID: &str = "conversation_id";
    /// Target worker for parallel and fan-out dispatch
    pub const WORKER_NAME: &str = "worker_name";
    /// RFC 3339 creation time
    pub const TIMESTAMP: &str = "timestamp";
}

/// Ephemeral key/value request handed to a worker
///
/// Workers read the well-known keys through the accessors and are free to
/// look up anything else with [`Task::get`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Task {
    fields: Map<String, Value>,
}

impl Task {
    /// Create an empty task
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the payload for one inbound conversation message
    pub fn for_message(
        user_message: impl Into<String>,
        intent: impl Into<String>,
        conversation_id: impl Into<String>,
    ) -> Self {
        Self::new()
            .with(keys::USER_MESSAGE, user_message.into())
            .with(keys::INTENT, intent.into())
            .with(keys::CONVERSATION_ID, conversation_id.into())
            .with(keys::TIMESTAMP, Utc::now().to_rfc3339())
    }

    /// Set a field
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Set a field in place
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(key.into(), value.into());
    }

    /// Tag the task with the worker it should be dispatched to
    pub fn for_worker(self, worker_name: impl Into<String>) -> Self {
        self.with(keys::WORKER_NAME, worker_name.into())
    }

    /// Get any field
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Get a string field
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    /// The raw user message, empty when absent
    pub fn user_message(&self) -> &str {
        self.get_str(keys::USER_MESSAGE).unwrap_or_default()
    }

    /// The intent label, if any
    pub fn intent(&self) -> Option<&str> {
        self.get_str(keys::INTENT)
    }

    /// The conversation id, if any
    pub fn conversation_id(&self) -> Option<&str> {
        self.get_str(keys::CONVERSATION_ID)
    }

    /// The target worker name, if any
    pub fn worker_name(&self) -> Option<&str> {
        self.get_str(keys::WORKER_NAME)
    }

    /// All fields
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}

impl From<Map<String, Value>> for Task {
    fn from(fields: Map<String, Value>) -> Self {
        Self { fields }
    }
}

/// Outcome status of a dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// The worker produced a result
    Success,
    /// Dispatch or execution failed; `summary` explains why
    Error,
}

/// Result of one dispatch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    /// Outcome status
    pub status: TaskStatus,
    /// Human-readable summary (always present for errors)
    #[serde(default)]
    pub summary: String,
    /// Optional domain fields
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

impl TaskResult {
    /// Create a successful result
    pub fn success(summary: impl Into<String>) -> Self {
        Self {
            status: TaskStatus::Success,
            summary: summary.into(),
            data: Map::new(),
        }
    }

    /// Create an error result
    pub fn error(summary: impl Into<String>) -> Self {
        let summary = summary.into();
        Self {
            status: TaskStatus::Error,
            summary: if summary.is_empty() {
                "Unknown error".to_string()
            } else {
                summary
            },
            data: Map::new(),
        }
    }

    /// Attach a domain field
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Whether the dispatch succeeded
    pub fn is_success(&self) -> bool {
        self.status == TaskStatus::Success
    }

    /// Whether the dispatch failed
    pub fn is_error(&self) -> bool {
        self.status == TaskStatus::Error
    }

    /// The summary, or `None` when the worker left it blank
    pub fn summary(&self) -> Option<&str> {
        if self.summary.trim().is_empty() {
            None
        } else {
            Some(&self.summary)
        }
    }
}
