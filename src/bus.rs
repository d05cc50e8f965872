//! Message bus and shared context

use crate::types::MessageId;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Types of inter-worker messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    /// Work request
    Task,
    /// Work result
    Result,
    /// Information request
    Query,
    /// Sent to every registered worker
    Broadcast,
    /// Liveness signal
    Heartbeat,
}

/// Immutable message on the bus
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Generated identifier
    pub id: MessageId,
    /// Sender name
    pub sender: String,
    /// Recipient name
    pub recipient: String,
    /// Message body
    pub content: String,
    /// Message type
    #[serde(rename = "type")]
    pub msg_type: MessageType,
    /// Free-form metadata
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// Creation time
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Create a task message
    pub fn new(sender: impl Into<String>, recipient: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            sender: sender.into(),
            recipient: recipient.into(),
            content: content.into(),
            msg_type: MessageType::Task,
            metadata: Map::new(),
            timestamp: Utc::now(),
        }
    }

    /// Set the message type
    pub fn with_type(mut self, msg_type: MessageType) -> Self {
        self.msg_type = msg_type;
        self
    }

    /// Set the metadata
    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Append-only, ordered message log
#[derive(Debug, Default)]
pub struct MessageBus {
    log: RwLock<Vec<Message>>,
}

impl MessageBus {
    /// Create an empty bus
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message
    pub fn send(&self, message: Message) {
        self.log.write().push(message);
    }

    /// Append several messages, keeping their order
    pub fn send_all(&self, messages: impl IntoIterator<Item = Message>) {
        self.log.write().extend(messages);
    }

    /// All messages addressed to `recipient`, in insertion order
    pub fn messages_for(&self, recipient: &str) -> Vec<Message> {
        self.log
            .read()
            .iter()
            .filter(|m| m.recipient == recipient)
            .cloned()
            .collect()
    }

    /// Snapshot of the whole log
    pub fn all(&self) -> Vec<Message> {
        self.log.read().clone()
    }

    /// Number of messages logged
    pub fn len(&self) -> usize {
        self.log.read().len()
    }

    /// Whether the log is empty
    pub fn is_empty(&self) -> bool {
        self.log.read().is_empty()
    }
}

/// Flat key/value map visible to every worker; last write wins
#[derive(Debug, Default)]
pub struct SharedContext {
    values: DashMap<String, Value>,
}

impl SharedContext {
    /// Create an empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a value
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    /// Get a value
    pub fn get(&self, key: &str) -> Option<Value> {
        self.values.get(key).map(|v| v.value().clone())
    }

    /// Remove a value
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.values.remove(key).map(|(_, v)| v)
    }

    /// Number of keys
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the context is empty
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
