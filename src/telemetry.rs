//! Tracing and observability infrastructure

use crate::classifier::{Classification, IntentLabel};
use crate::error::{Error, Result};
use crate::types::ConversationId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// How a turn ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnOutcome {
    /// A worker or the reasoning service produced an answer
    Answered,
    /// The routed worker returned an error result
    WorkerError,
    /// The reasoning service throttled past the retry budget
    RateLimited,
    /// Any other routing failure
    Failed,
}

/// Timing record of one processed message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnTrace {
    /// Owning conversation
    pub conversation_id: ConversationId,
    /// Classified intent
    pub intent: IntentLabel,
    /// Routing target, e.g. `worker:RepoResearcher` or `reasoning`
    pub route: String,
    /// When processing began
    pub started_at: DateTime<Utc>,
    /// Wall-clock processing time
    pub elapsed_ms: u64,
    /// How the turn ended
    pub outcome: TurnOutcome,
}

impl TurnTrace {
    /// Emit the trace as a structured log line
    pub fn log(&self) {
        tracing::info!(
            conversation_id = %self.conversation_id,
            intent = %self.intent,
            route = %self.route,
            elapsed_ms = self.elapsed_ms,
            outcome = ?self.outcome,
            "turn completed"
        );
    }
}

/// Whole milliseconds in `duration`, saturating at `u64::MAX`
pub(crate) fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Observability events published by a session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    /// The classifier labelled a message
    IntentClassified {
        /// Owning conversation
        conversation_id: ConversationId,
        /// Label and deciding stage
        classification: Classification,
    },
    /// A message was fully processed
    TurnCompleted(TurnTrace),
}

/// Install a global `fmt` subscriber.
///
/// The filter comes from `RUST_LOG`, defaulting to `info`. Fails if a
/// subscriber is already installed.
pub fn init_logging(json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);

    let installed = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| Error::config(format!("Failed to install subscriber: {}", e)))
}
