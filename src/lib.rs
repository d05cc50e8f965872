//! # PulseSwarm
//!
//! Orchestration core for routing free-form requests to specialized workers.
//!
//! ## Features
//!
//! - **Intent Classification**: path override, then keyword table, then one remote call
//! - **Multi-Swarm Registry**: workers grouped into named swarms, addressable by
//!   name or capability from anywhere
//! - **Concurrent Dispatch**: single, parallel and fan-out dispatch with ordered,
//!   failure-isolated results
//! - **Rate-Limited Reasoning**: call pacing plus exponential backoff on throttling
//! - **Conversation Sessions**: per-conversation routing with traces and an LRU cache
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pulse_swarm::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let coordinator = Arc::new(Coordinator::new());
//!     coordinator.register_worker(
//!         Arc::new(FnWorker::new("RepoResearcher", ["repo_analysis"], |task: Task| async move {
//!             Ok(TaskResult::success(format!("Looked at {}", task.user_message())))
//!         })),
//!         "research",
//!     );
//!
//!     let config = RouterConfig::default();
//!     let client = Arc::new(HttpReasoningClient::from_env()?);
//!     let caller = Arc::new(RateLimitedCaller::new(client, config.retry));
//!
//!     let session = ConversationSession::new(coordinator, caller, &config);
//!     println!("{}", session.process_message("analyze the tokio repo").await);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bus;
pub mod classifier;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod rate_limit;
pub mod reasoning;
pub mod session;
pub mod swarm;
pub mod task;
pub mod telemetry;
pub mod types;
pub mod worker;

// Re-exports for convenience
pub use bus::{Message, MessageBus, MessageType, SharedContext};
pub use classifier::{Classification, ClassificationStage, IntentClassifier, IntentLabel, IntentRule};
pub use config::{DispatchConfig, ReasoningConfig, RetryPolicy, RouterConfig, SessionConfig};
pub use coordinator::{Coordinator, CoordinatorStatus, ExecutionRecord, SwarmStatus};
pub use error::{Error, Result};
pub use rate_limit::RateLimitedCaller;
pub use reasoning::{HttpReasoningClient, ReasoningClient};
pub use session::{ConversationSession, Route, SessionCache, TurnRecord};
pub use swarm::Swarm;
pub use task::{Task, TaskResult, TaskStatus};
pub use telemetry::{SessionEvent, TurnOutcome, TurnTrace};
pub use types::{ConversationId, ExecutionId, MessageId};
pub use worker::{FnWorker, Worker, WorkerHandle, WorkerStatus};

/// Prelude module for common imports
pub mod prelude {
    pub use crate::classifier::{IntentClassifier, IntentLabel};
    pub use crate::config::{RetryPolicy, RouterConfig};
    pub use crate::coordinator::Coordinator;
    pub use crate::error::{Error, Result};
    pub use crate::rate_limit::RateLimitedCaller;
    pub use crate::reasoning::{HttpReasoningClient, ReasoningClient};
    pub use crate::session::{ConversationSession, SessionCache};
    pub use crate::task::{Task, TaskResult};
    pub use crate::worker::{FnWorker, Worker};
    pub use crate::types::*;
}
