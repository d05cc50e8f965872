//! Conversation sessions
//!
//! A [`ConversationSession`] binds a classifier, the shared [`Coordinator`] and
//! the rate-limited reasoning caller to one logical conversation. Each call to
//! [`ConversationSession::process_message`] classifies the message, routes it
//! and always returns a user-facing string.

use crate::classifier::{IntentClassifier, IntentLabel};
use crate::config::RouterConfig;
use crate::coordinator::Coordinator;
use crate::error::{Error, Result};
use crate::rate_limit::RateLimitedCaller;
use crate::task::{Task, TaskResult};
use crate::telemetry::{duration_millis, SessionEvent, TurnOutcome, TurnTrace};
use crate::types::ConversationId;
use chrono::{DateTime, Utc};
use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;

const RATE_LIMIT_MESSAGE: &str = "**Rate limit reached**: the reasoning service is temporarily throttled.\n\n\
Please wait ~15 seconds and try again, or try queries that use local workers instead:\n\
- `Read README.md` reads local files\n\
- `Analyze owner/repo` runs a repository analysis\n\
- `Find papers on <topic>` searches for papers";

const UNROUTED_MESSAGE: &str = "I'm not sure how to help with that yet.";

/// Where a classified intent is sent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "via", rename_all = "snake_case")]
pub enum Route {
    /// Dispatch to a worker by name
    Worker {
        /// Registered worker name
        name: String,
    },
    /// Dispatch to the first worker declaring a capability
    Capability {
        /// Capability tag
        tag: String,
    },
    /// Ask the reasoning service directly
    Reasoning,
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Route::Worker { name } => write!(f, "worker:{}", name),
            Route::Capability { tag } => write!(f, "capability:{}", tag),
            Route::Reasoning => write!(f, "reasoning"),
        }
    }
}

/// Built-in routing table
pub fn default_routes() -> HashMap<IntentLabel, Route> {
    let worker = |name: &str| Route::Worker { name: name.to_string() };
    HashMap::from([
        (IntentLabel::repo_analysis(), worker("RepoResearcher")),
        (IntentLabel::paper_search(), worker("PaperAnalyst")),
        (IntentLabel::project_context(), worker("ProjectExplorer")),
        (IntentLabel::general_qa(), Route::Reasoning),
    ])
}

/// Answer used when a worker result carries no summary
fn fallback_summary(intent: &IntentLabel) -> &'static str {
    match intent.as_str() {
        "paper_search" => "No papers found.",
        "project_context" => "Could not read project context.",
        _ => "No summary available.",
    }
}

/// One processed message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnRecord {
    /// User message
    pub input: String,
    /// Classified intent
    pub intent: IntentLabel,
    /// Returned answer
    pub response: String,
    /// When the turn completed
    pub timestamp: DateTime<Utc>,
}

/// One logical conversation
pub struct ConversationSession {
    id: ConversationId,
    coordinator: Arc<Coordinator>,
    classifier: IntentClassifier,
    caller: Arc<RateLimitedCaller>,
    routes: HashMap<IntentLabel, Route>,
    events: broadcast::Sender<SessionEvent>,
    history: Mutex<Vec<TurnRecord>>,
}

impl ConversationSession {
    /// Start a session with a generated id
    pub fn new(coordinator: Arc<Coordinator>, caller: Arc<RateLimitedCaller>, config: &RouterConfig) -> Self {
        Self::with_id(ConversationId::new(), coordinator, caller, config)
    }

    /// Start a session with a caller-supplied id
    pub fn with_id(
        id: ConversationId,
        coordinator: Arc<Coordinator>,
        caller: Arc<RateLimitedCaller>,
        config: &RouterConfig,
    ) -> Self {
        let classifier = IntentClassifier::from_config(config).with_caller(caller.clone());
        let (events, _) = broadcast::channel(config.session.event_capacity.max(1));
        tracing::debug!(conversation_id = %id, "session started");
        Self {
            id,
            coordinator,
            classifier,
            caller,
            routes: config.routes.clone(),
            events,
            history: Mutex::new(Vec::new()),
        }
    }

    /// Conversation id
    pub fn id(&self) -> &ConversationId {
        &self.id
    }

    /// The bound coordinator
    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    /// The bound classifier
    pub fn classifier(&self) -> &IntentClassifier {
        &self.classifier
    }

    /// When the reasoning service was last called
    pub fn last_call(&self) -> Option<DateTime<Utc>> {
        self.caller.last_call()
    }

    /// Subscribe to classification and turn events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Processed turns in order
    pub fn history(&self) -> Vec<TurnRecord> {
        self.history.lock().clone()
    }

    /// Classify, route and answer one user message. Never fails.
    pub async fn process_message(&self, user_message: &str) -> String {
        let started_at = Utc::now();
        let timer = Instant::now();

        let classification = self.classifier.classify_detailed(user_message).await;
        let intent = classification.label.clone();
        tracing::debug!(conversation_id = %self.id, intent = %intent, stage = ?classification.stage, "intent classified");
        self.publish(SessionEvent::IntentClassified {
            conversation_id: self.id.clone(),
            classification,
        });

        let (response, route, outcome) = match self.routes.get(&intent) {
            Some(route) => {
                let (response, outcome) = self.follow(route, user_message, &intent).await;
                (response, route.to_string(), outcome)
            }
            None => {
                tracing::warn!(conversation_id = %self.id, intent = %intent, "no route for intent");
                (UNROUTED_MESSAGE.to_string(), "none".to_string(), TurnOutcome::Failed)
            }
        };

        let trace = TurnTrace {
            conversation_id: self.id.clone(),
            intent: intent.clone(),
            route,
            started_at,
            elapsed_ms: duration_millis(timer.elapsed()),
            outcome,
        };
        trace.log();

        self.history.lock().push(TurnRecord {
            input: user_message.to_string(),
            intent,
            response: response.clone(),
            timestamp: Utc::now(),
        });
        self.publish(SessionEvent::TurnCompleted(trace));

        response
    }

    async fn follow(&self, route: &Route, user_message: &str, intent: &IntentLabel) -> (String, TurnOutcome) {
        match route {
            Route::Worker { name } => self.dispatch_to(name, user_message, intent).await,
            Route::Capability { tag } => match self.coordinator.find_worker_for_capability(tag) {
                Some(handle) => self.dispatch_to(handle.name(), user_message, intent).await,
                None => (
                    format!("Sorry, I encountered an error: no worker offers capability '{}'", tag),
                    TurnOutcome::WorkerError,
                ),
            },
            Route::Reasoning => match self.caller.call(user_message).await {
                Ok(text) => (text, TurnOutcome::Answered),
                Err(e) => render_reasoning_error(&e),
            },
        }
    }

    async fn dispatch_to(&self, worker_name: &str, user_message: &str, intent: &IntentLabel) -> (String, TurnOutcome) {
        let task = Task::for_message(user_message, intent.as_str(), self.id.as_str());
        let result = self.coordinator.dispatch(worker_name, &task).await;
        render_worker_result(&result, intent)
    }

    fn publish(&self, event: SessionEvent) {
        // send only fails when nobody is subscribed
        let _ = self.events.send(event);
    }
}

fn render_worker_result(result: &TaskResult, intent: &IntentLabel) -> (String, TurnOutcome) {
    if result.is_error() {
        let text = result.summary().unwrap_or("worker reported an error");
        return (format!("Sorry, I encountered an error: {}", text), TurnOutcome::WorkerError);
    }
    let text = result.summary().unwrap_or_else(|| fallback_summary(intent));
    (text.to_string(), TurnOutcome::Answered)
}

fn render_reasoning_error(error: &Error) -> (String, TurnOutcome) {
    if error.is_rate_limit_exceeded() || error.is_throttling() {
        (RATE_LIMIT_MESSAGE.to_string(), TurnOutcome::RateLimited)
    } else {
        (format!("Sorry, I encountered an error: {}", error), TurnOutcome::Failed)
    }
}

impl fmt::Debug for ConversationSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversationSession")
            .field("id", &self.id)
            .field("turns", &self.history.lock().len())
            .finish()
    }
}

/// Bounded LRU cache of sessions keyed by conversation id
pub struct SessionCache {
    sessions: Mutex<LruCache<String, Arc<ConversationSession>>>,
    coordinator: Arc<Coordinator>,
    caller: Arc<RateLimitedCaller>,
    config: RouterConfig,
}

impl SessionCache {
    /// Create a cache sized by `config.session.cache_capacity`
    pub fn new(coordinator: Arc<Coordinator>, caller: Arc<RateLimitedCaller>, config: RouterConfig) -> Result<Self> {
        let capacity = NonZeroUsize::new(config.session.cache_capacity)
            .ok_or_else(|| Error::config("session.cache_capacity must be at least 1"))?;
        Ok(Self {
            sessions: Mutex::new(LruCache::new(capacity)),
            coordinator,
            caller,
            config,
        })
    }

    /// Reuse the session for `id`, or start one.
    ///
    /// A new session adopts the supplied id; without one a fresh id is
    /// generated. Inserting beyond capacity evicts the least recently used
    /// session.
    pub fn get_or_create(&self, id: Option<&str>) -> Arc<ConversationSession> {
        let mut sessions = self.sessions.lock();
        if let Some(existing) = id.and_then(|id| sessions.get(id)) {
            return existing.clone();
        }

        let conversation_id = id.map(ConversationId::from).unwrap_or_default();
        let session = Arc::new(ConversationSession::with_id(
            conversation_id.clone(),
            self.coordinator.clone(),
            self.caller.clone(),
            &self.config,
        ));
        if let Some((evicted, _)) = sessions.push(conversation_id.as_str().to_string(), session.clone()) {
            if evicted != conversation_id.as_str() {
                tracing::debug!(conversation_id = %evicted, "session evicted");
            }
        }
        session
    }

    /// Look a cached session up without creating one
    pub fn get(&self, id: &str) -> Option<Arc<ConversationSession>> {
        self.sessions.lock().get(id).cloned()
    }

    /// Drop a session
    pub fn remove(&self, id: &str) -> Option<Arc<ConversationSession>> {
        self.sessions.lock().pop(id)
    }

    /// Whether a session is cached
    pub fn contains(&self, id: &str) -> bool {
        self.sessions.lock().contains(id)
    }

    /// Cached sessions
    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }
}

impl fmt::Debug for SessionCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCache")
            .field("len", &self.len())
            .field("capacity", &self.config.session.cache_capacity)
            .finish()
    }
}
