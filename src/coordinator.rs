//! Coordinator: swarm registry, dispatcher, message bus and shared context
//!
//! The coordinator owns every [`Swarm`] and keeps a flat worker-name index so
//! callers can address any worker without knowing which swarm it lives in.
//!
//! # Example
//!
//! ```rust,ignore
//! let coordinator = Coordinator::new();
//! coordinator.create_swarm("research", "Code & repository analysis")?;
//! coordinator.register_worker(Arc::new(RepoResearcher::new()), "research");
//!
//! let result = coordinator.dispatch("RepoResearcher", &task).await;
//! let results = coordinator.fan_out(&task, &["RepoResearcher", "Critic"]).await;
//! ```

use crate::bus::{Message, MessageBus, MessageType, SharedContext};
use crate::config::DispatchConfig;
use crate::error::{Error, Result};
use crate::swarm::Swarm;
use crate::task::{Task, TaskResult};
use crate::worker::{Worker, WorkerHandle};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// One diagnostic entry per resolved dispatch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// When the dispatch started
    pub timestamp: DateTime<Utc>,
    /// Target worker
    pub worker: String,
    /// Swarm owning the worker
    pub swarm: String,
    /// Task intent label, `unknown` when absent
    pub task_type: String,
}

/// Per-swarm entry in [`CoordinatorStatus`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwarmStatus {
    /// Swarm description
    pub description: String,
    /// Worker names in registration order
    pub workers: Vec<String>,
    /// Number of workers
    pub worker_count: usize,
}

/// Snapshot of the whole registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorStatus {
    /// Swarms keyed by name
    pub swarms: HashMap<String, SwarmStatus>,
    /// Workers in the flat index
    pub total_workers: usize,
    /// Messages on the bus
    pub message_queue_size: usize,
    /// Execution records logged
    pub executions: usize,
}

#[derive(Debug, Default)]
struct Registry {
    swarms: Vec<Swarm>,
    // worker name -> owning swarm name
    index: HashMap<String, String>,
}

impl Registry {
    fn swarm(&self, name: &str) -> Option<&Swarm> {
        self.swarms.iter().find(|s| s.name() == name)
    }

    fn swarm_mut(&mut self, name: &str) -> Option<&mut Swarm> {
        self.swarms.iter_mut().find(|s| s.name() == name)
    }

    fn resolve(&self, worker_name: &str) -> Option<(Arc<WorkerHandle>, String)> {
        let swarm_name = self.index.get(worker_name)?;
        let handle = self.swarm(swarm_name)?.get_worker(worker_name)?;
        Some((handle, swarm_name.clone()))
    }
}

/// Central orchestrator for the multi-swarm system
///
/// All registry state sits behind one lock so the swarm maps and the flat
/// index never disagree. Locks are released before any worker is awaited.
#[derive(Debug, Default)]
pub struct Coordinator {
    registry: RwLock<Registry>,
    bus: MessageBus,
    context: SharedContext,
    execution_log: Mutex<Vec<ExecutionRecord>>,
    dispatch_config: DispatchConfig,
}

impl Coordinator {
    /// Create an empty coordinator
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a coordinator with explicit dispatch settings
    pub fn with_dispatch_config(dispatch_config: DispatchConfig) -> Self {
        Self {
            dispatch_config,
            ..Self::default()
        }
    }

    // ── Swarm management ───────────────────────────

    /// Create and register a new swarm.
    ///
    /// Fails with [`Error::DuplicateSwarm`] if the name is taken.
    pub fn create_swarm(&self, name: impl Into<String>, description: impl Into<String>) -> Result<()> {
        let name = name.into();
        let mut registry = self.registry.write();
        if registry.swarm(&name).is_some() {
            return Err(Error::DuplicateSwarm(name));
        }
        tracing::debug!(swarm = %name, "swarm created");
        registry.swarms.push(Swarm::new(name, description));
        Ok(())
    }

    /// Whether a swarm exists
    pub fn has_swarm(&self, name: &str) -> bool {
        self.registry.read().swarm(name).is_some()
    }

    /// Swarm names mapped to their worker names, in registration order
    pub fn list_swarms(&self) -> Vec<(String, Vec<String>)> {
        self.registry
            .read()
            .swarms
            .iter()
            .map(|s| (s.name().to_string(), s.list_workers()))
            .collect()
    }

    /// Workers of one swarm
    pub fn swarm_workers(&self, name: &str) -> Result<Vec<String>> {
        self.registry
            .read()
            .swarm(name)
            .map(Swarm::list_workers)
            .ok_or_else(|| Error::SwarmNotFound(name.to_string()))
    }

    // ── Worker management ──────────────────────────

    /// Register a worker into a swarm, creating the swarm if needed.
    ///
    /// A name that is already registered is overwritten (last write wins),
    /// even across swarms; the stale entry is dropped from its old swarm.
    pub fn register_worker(&self, worker: Arc<dyn Worker>, swarm_name: &str) -> Arc<WorkerHandle> {
        let mut handle = WorkerHandle::new(worker);
        if self.dispatch_config.exclusive_workers {
            handle = handle.exclusive();
        }
        let handle = Arc::new(handle);
        let name = handle.name().to_string();

        let mut registry = self.registry.write();
        if let Some(previous) = registry.index.get(&name).cloned() {
            tracing::warn!(
                worker = %name,
                previous_swarm = %previous,
                swarm = %swarm_name,
                "worker name already registered, replacing"
            );
            if previous != swarm_name {
                if let Some(old) = registry.swarm_mut(&previous) {
                    old.remove_worker(&name);
                }
            }
        }

        if registry.swarm(swarm_name).is_none() {
            registry
                .swarms
                .push(Swarm::new(swarm_name, format!("Auto-created swarm for {}", swarm_name)));
        }
        if let Some(swarm) = registry.swarm_mut(swarm_name) {
            swarm.add_worker(handle.clone());
        }
        registry.index.insert(name.clone(), swarm_name.to_string());
        tracing::info!(worker = %name, swarm = %swarm_name, "worker registered");

        handle
    }

    /// Look a worker up by name, regardless of swarm
    pub fn get_worker(&self, name: &str) -> Option<Arc<WorkerHandle>> {
        self.registry.read().resolve(name).map(|(handle, _)| handle)
    }

    /// Name of the swarm owning a worker
    pub fn swarm_of(&self, worker_name: &str) -> Option<String> {
        self.registry.read().index.get(worker_name).cloned()
    }

    /// First worker, scanning swarms in registration order, declaring `capability`
    pub fn find_worker_for_capability(&self, capability: &str) -> Option<Arc<WorkerHandle>> {
        self.registry
            .read()
            .swarms
            .iter()
            .find_map(|swarm| swarm.find_capable_worker(capability))
    }

    /// Number of workers in the flat index
    pub fn worker_count(&self) -> usize {
        self.registry.read().index.len()
    }

    // ── Task dispatch ──────────────────────────────

    /// Execute one task against a named worker.
    ///
    /// Never fails: unknown workers and execution failures come back as
    /// error results.
    pub async fn dispatch(&self, worker_name: &str, task: &Task) -> TaskResult {
        let resolved = self.registry.read().resolve(worker_name);
        let Some((handle, swarm_name)) = resolved else {
            tracing::warn!(worker = %worker_name, "dispatch to unregistered worker");
            return TaskResult::error(Error::WorkerNotFound(worker_name.to_string()).to_string());
        };

        self.execution_log.lock().push(ExecutionRecord {
            timestamp: Utc::now(),
            worker: worker_name.to_string(),
            swarm: swarm_name.clone(),
            task_type: task.intent().unwrap_or("unknown").to_string(),
        });

        match handle.run(task).await {
            Ok(mut result) => {
                if result.is_error() && result.summary().is_none() {
                    result.summary = format!("Worker '{}' reported an error without a summary", worker_name);
                }
                tracing::info!(worker = %worker_name, swarm = %swarm_name, status = ?result.status, "dispatch completed");
                result
            }
            Err(e) => {
                tracing::warn!(worker = %worker_name, swarm = %swarm_name, error = %e, "dispatch failed");
                TaskResult::error(e.to_string())
            }
        }
    }

    /// Execute many tasks concurrently, each routed by its `worker_name`.
    ///
    /// All dispatches are started before any is awaited; the result list has
    /// the same length and order as `tasks`.
    pub async fn dispatch_parallel(&self, tasks: &[Task]) -> Vec<TaskResult> {
        let futures = tasks.iter().map(|task| async move {
            match task.worker_name() {
                Some(worker_name) => self.dispatch(worker_name, task).await,
                None => TaskResult::error(
                    Error::InvalidInput("task has no worker_name".to_string()).to_string(),
                ),
            }
        });

        let results = join_all(futures).await;
        let failed = results.iter().filter(|r| r.is_error()).count();
        if failed > 0 {
            tracing::warn!(total = results.len(), failed, "parallel dispatch had failures");
        }
        results
    }

    /// Send one task to several workers concurrently.
    ///
    /// Results are ordered like `worker_names`.
    pub async fn fan_out<S: AsRef<str>>(&self, task: &Task, worker_names: &[S]) -> Vec<TaskResult> {
        let tasks: Vec<Task> = worker_names
            .iter()
            .map(|name| task.clone().for_worker(name.as_ref()))
            .collect();
        self.dispatch_parallel(&tasks).await
    }

    /// Snapshot of the execution log
    pub fn execution_log(&self) -> Vec<ExecutionRecord> {
        self.execution_log.lock().clone()
    }

    // ── Message bus ────────────────────────────────

    /// The message bus
    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }

    /// Send a message on the bus
    pub fn send_message(&self, message: Message) {
        self.bus.send(message);
    }

    /// All messages for a worker, in insertion order
    pub fn get_messages(&self, recipient: &str) -> Vec<Message> {
        self.bus.messages_for(recipient)
    }

    /// Send one message to every registered worker across all swarms.
    ///
    /// Returns the number of messages enqueued.
    pub fn broadcast(&self, sender: &str, content: &str, metadata: Option<Map<String, Value>>) -> usize {
        let recipients: Vec<String> = self
            .registry
            .read()
            .swarms
            .iter()
            .flat_map(|s| s.list_workers())
            .collect();

        let metadata = metadata.unwrap_or_default();
        let messages: Vec<Message> = recipients
            .iter()
            .map(|recipient| {
                Message::new(sender, recipient, content)
                    .with_type(MessageType::Broadcast)
                    .with_metadata(metadata.clone())
            })
            .collect();
        let count = messages.len();
        self.bus.send_all(messages);
        count
    }

    // ── Shared context ─────────────────────────────

    /// Shared context visible to all workers
    pub fn context(&self) -> &SharedContext {
        &self.context
    }

    /// Set a shared context value
    pub fn set_context(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.context.set(key, value);
    }

    /// Get a shared context value
    pub fn get_context(&self, key: &str) -> Option<Value> {
        self.context.get(key)
    }

    // ── Diagnostics ────────────────────────────────

    /// Full system status
    pub fn status(&self) -> CoordinatorStatus {
        let registry = self.registry.read();
        CoordinatorStatus {
            swarms: registry
                .swarms
                .iter()
                .map(|s| {
                    (
                        s.name().to_string(),
                        SwarmStatus {
                            description: s.description().to_string(),
                            workers: s.list_workers(),
                            worker_count: s.len(),
                        },
                    )
                })
                .collect(),
            total_workers: registry.index.len(),
            message_queue_size: self.bus.len(),
            executions: self.execution_log.lock().len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskStatus;
    use crate::worker::{FnWorker, WorkerStatus};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    fn worker(name: &str, caps: &[&str], reply: &'static str) -> Arc<dyn Worker> {
        let caps: Vec<String> = caps.iter().map(|c| c.to_string()).collect();
        Arc::new(FnWorker::new(name, caps, move |task: Task| async move {
            Ok(TaskResult::success(format!("{}: {}", reply, task.user_message())))
        }))
    }

    fn failing(name: &str) -> Arc<dyn Worker> {
        Arc::new(FnWorker::new(name, Vec::<String>::new(), |_task: Task| async {
            Err(Error::other("upstream unavailable"))
        }))
    }

    fn silent_failure(name: &str) -> Arc<dyn Worker> {
        Arc::new(FnWorker::new(name, Vec::<String>::new(), |_task: Task| async {
            Ok(TaskResult {
                status: TaskStatus::Error,
                summary: String::new(),
                data: Map::new(),
            })
        }))
    }

    fn sleeper(name: &str, delay: Duration) -> Arc<dyn Worker> {
        Arc::new(FnWorker::new(name, Vec::<String>::new(), move |_task: Task| async move {
            tokio::time::sleep(delay).await;
            Ok(TaskResult::success("slept"))
        }))
    }

    fn seeded() -> Coordinator {
        let coordinator = Coordinator::new();
        coordinator.create_swarm("research", "Code & repo analysis").unwrap();
        coordinator.create_swarm("analysis", "Paper & data analysis").unwrap();
        coordinator.register_worker(worker("MockResearcher", &["repo_analysis"], "Analyzed repo"), "research");
        coordinator.register_worker(worker("MockAnalyst", &["paper_search"], "Found papers"), "analysis");
        coordinator.register_worker(worker("MockCritic", &["validation"], "Validation passed"), "research");
        coordinator
    }

    #[tokio::test]
    async fn test_error_result_without_summary_gets_one() {
        let coordinator = seeded();
        coordinator.register_worker(silent_failure("Quiet"), "research");

        let result = coordinator.dispatch("Quiet", &Task::new()).await;
        assert_eq!(result.status, TaskStatus::Error);
        assert_eq!(
            result.summary(),
            Some("Worker 'Quiet' reported an error without a summary")
        );
    }

    #[test]
    fn test_registration_and_lookup_across_swarms() {
        let coordinator = seeded();
        assert_eq!(coordinator.worker_count(), 3);
        assert_eq!(coordinator.get_worker("MockAnalyst").unwrap().name(), "MockAnalyst");
        assert_eq!(coordinator.swarm_of("MockCritic").as_deref(), Some("research"));
        assert!(coordinator.get_worker("NonExistent").is_none());
        assert_eq!(
            coordinator.list_swarms(),
            vec![
                ("research".to_string(), vec!["MockResearcher".to_string(), "MockCritic".to_string()]),
                ("analysis".to_string(), vec!["MockAnalyst".to_string()]),
            ]
        );
    }

    #[test]
    fn test_create_swarm_rejects_duplicates() {
        let coordinator = seeded();
        assert!(matches!(
            coordinator.create_swarm("research", "again"),
            Err(Error::DuplicateSwarm(name)) if name == "research"
        ));
        assert_eq!(coordinator.swarm_workers("research").unwrap().len(), 2);
    }

    #[test]
    fn test_register_auto_creates_swarm() {
        let coordinator = Coordinator::new();
        coordinator.register_worker(worker("Explorer", &["file_read"], "read"), "local");
        assert!(coordinator.has_swarm("local"));
        assert_eq!(
            coordinator.status().swarms["local"].description,
            "Auto-created swarm for local"
        );
    }

    #[test]
    fn test_duplicate_worker_name_last_write_wins() {
        let coordinator = Coordinator::new();
        coordinator.register_worker(worker("Shared", &["first"], "first"), "alpha");
        coordinator.register_worker(worker("Shared", &["second"], "second"), "beta");

        let handle = coordinator.get_worker("Shared").unwrap();
        assert!(handle.can_handle("second"));
        assert_eq!(coordinator.swarm_of("Shared").as_deref(), Some("beta"));
        assert!(coordinator.swarm_workers("alpha").unwrap().is_empty());
        assert_eq!(coordinator.worker_count(), 1);
    }

    #[test]
    fn test_find_worker_for_capability_scans_swarms_in_order() {
        let coordinator = Coordinator::new();
        coordinator.register_worker(worker("Late", &["summarize"], "late"), "zeta");
        coordinator.register_worker(worker("Early", &["summarize"], "early"), "alpha");

        assert_eq!(coordinator.find_worker_for_capability("summarize").unwrap().name(), "Late");
        assert!(coordinator.find_worker_for_capability("translate").is_none());
    }

    #[tokio::test]
    async fn test_dispatch_success_and_log() {
        let coordinator = seeded();
        let task = Task::new()
            .with("user_message", "analyze tiangolo/fastapi")
            .with("intent", "repo_analysis");
        let result = coordinator.dispatch("MockResearcher", &task).await;

        assert_eq!(result.status, TaskStatus::Success);
        assert!(result.summary.contains("Analyzed repo"));

        let log = coordinator.execution_log();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].worker, "MockResearcher");
        assert_eq!(log[0].swarm, "research");
        assert_eq!(log[0].task_type, "repo_analysis");
    }

    #[tokio::test]
    async fn test_dispatch_unknown_worker_is_error_result() {
        let coordinator = seeded();
        let result = coordinator.dispatch("Ghost", &Task::new()).await;
        assert!(result.is_error());
        assert!(result.summary.contains("Ghost"));
        assert!(coordinator.execution_log().is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_failure_sets_error_status_and_still_logs() {
        let coordinator = seeded();
        coordinator.register_worker(failing("Flaky"), "research");

        let result = coordinator.dispatch("Flaky", &Task::new()).await;
        assert!(result.is_error());
        assert!(result.summary.contains("upstream unavailable"));
        assert_eq!(coordinator.get_worker("Flaky").unwrap().status(), WorkerStatus::Error);
        assert_eq!(coordinator.execution_log()[0].task_type, "unknown");
    }

    #[tokio::test]
    async fn test_dispatch_parallel_isolates_failures_and_keeps_order() {
        let coordinator = seeded();
        coordinator.register_worker(failing("Flaky"), "analysis");

        let tasks = vec![
            Task::new().with("user_message", "langchain").for_worker("MockResearcher"),
            Task::new().with("user_message", "boom").for_worker("Flaky"),
            Task::new().with("user_message", "RAG").for_worker("MockAnalyst"),
        ];
        let results = coordinator.dispatch_parallel(&tasks).await;

        assert_eq!(results.len(), 3);
        assert!(results[0].is_success());
        assert!(results[0].summary.starts_with("Analyzed repo"));
        assert!(results[1].is_error());
        assert!(results[2].is_success());
        assert!(results[2].summary.starts_with("Found papers"));
    }

    #[tokio::test]
    async fn test_dispatch_parallel_reports_missing_worker_name_in_place() {
        let coordinator = seeded();
        let tasks = vec![Task::new(), Task::new().for_worker("MockCritic")];
        let results = coordinator.dispatch_parallel(&tasks).await;
        assert_eq!(results.len(), 2);
        assert!(results[0].is_error());
        assert!(results[1].is_success());
    }

    #[tokio::test]
    async fn test_dispatch_parallel_order_ignores_completion_order() {
        let coordinator = Coordinator::new();
        coordinator.register_worker(sleeper("Slow", Duration::from_millis(80)), "timing");
        coordinator.register_worker(worker("Fast", &[], "fast"), "timing");

        let tasks = vec![Task::new().for_worker("Slow"), Task::new().for_worker("Fast")];
        let results = coordinator.dispatch_parallel(&tasks).await;
        assert_eq!(results[0].summary, "slept");
        assert!(results[1].summary.starts_with("fast"));
    }

    #[tokio::test]
    async fn test_dispatch_parallel_runs_concurrently() {
        let coordinator = Coordinator::new();
        for i in 0..4 {
            coordinator.register_worker(sleeper(&format!("Sleeper{i}"), Duration::from_millis(100)), "timing");
        }
        let tasks: Vec<Task> = (0..4).map(|i| Task::new().for_worker(format!("Sleeper{i}"))).collect();

        let start = Instant::now();
        let results = coordinator.dispatch_parallel(&tasks).await;
        assert!(results.iter().all(TaskResult::is_success));
        assert!(start.elapsed() < Duration::from_millis(350));
    }

    #[tokio::test]
    async fn test_fan_out_clones_task_per_worker() {
        let coordinator = Coordinator::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for name in ["W1", "W2"] {
            let seen = seen.clone();
            coordinator.register_worker(
                Arc::new(FnWorker::new(name, Vec::<String>::new(), move |task: Task| {
                    let seen = seen.clone();
                    async move {
                        seen.lock().push(task.clone());
                        Ok(TaskResult::success(task.worker_name().unwrap_or_default().to_string()))
                    }
                })),
                "perspectives",
            );
        }

        let task = Task::new().with("user_message", "review this design");
        let results = coordinator.fan_out(&task, &["W1", "W2"]).await;

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].summary, "W1");
        assert_eq!(results[1].summary, "W2");

        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert!(seen.iter().all(|t| t.user_message() == "review this design"));
    }

    #[tokio::test]
    async fn test_exclusive_workers_serialize_dispatches() {
        let coordinator = Coordinator::with_dispatch_config(DispatchConfig { exclusive_workers: true });
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        {
            let (active, peak) = (active.clone(), peak.clone());
            coordinator.register_worker(
                Arc::new(FnWorker::new("Solo", Vec::<String>::new(), move |_task: Task| {
                    let (active, peak) = (active.clone(), peak.clone());
                    async move {
                        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        active.fetch_sub(1, Ordering::SeqCst);
                        Ok(TaskResult::success("done"))
                    }
                })),
                "solo",
            );
        }

        let task = Task::new();
        let results = coordinator.fan_out(&task, &["Solo", "Solo", "Solo"]).await;
        assert!(results.iter().all(TaskResult::is_success));
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_broadcast_reaches_every_worker_once() {
        let coordinator = seeded();
        let sent = coordinator.broadcast("Coordinator", "refresh caches", None);
        assert_eq!(sent, 3);

        for name in ["MockResearcher", "MockAnalyst", "MockCritic"] {
            let inbox = coordinator.get_messages(name);
            assert_eq!(inbox.len(), 1);
            assert_eq!(inbox[0].msg_type, MessageType::Broadcast);
            assert_eq!(inbox[0].content, "refresh caches");
        }
        assert_eq!(coordinator.status().message_queue_size, 3);
    }

    #[test]
    fn test_shared_context_and_status() {
        let coordinator = seeded();
        coordinator.set_context("project_stack", "python");
        assert_eq!(coordinator.get_context("project_stack"), Some(Value::from("python")));
        assert!(coordinator.get_context("missing").is_none());

        let status = coordinator.status();
        assert_eq!(status.total_workers, 3);
        assert_eq!(status.swarms["research"].worker_count, 2);
        assert_eq!(status.executions, 0);
    }
}
