//! Worker trait and the registry's per-worker handle

use crate::error::{Error, Result};
use crate::task::{Task, TaskResult};
use crate::types::ExecutionId;
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// A unit of execution exposing one capability
#[async_trait]
pub trait Worker: Send + Sync {
    /// Stable, registry-wide unique name
    fn name(&self) -> &str;

    /// Capability tags this worker declares
    fn capabilities(&self) -> Vec<String> {
        Vec::new()
    }

    /// Execute one task
    async fn execute(&self, task: &Task) -> Result<TaskResult>;
}

/// Advisory worker status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    /// Not currently executing
    Idle,
    /// Executing a task
    Busy,
    /// The last execution failed
    Error,
}

#[derive(Debug)]
struct WorkerState {
    status: WorkerStatus,
    execution_id: Option<ExecutionId>,
}

/// Registered worker together with its dispatch state
///
/// Status is advisory: concurrent dispatches to the same handle are allowed
/// unless the handle was created [exclusive](WorkerHandle::exclusive).
pub struct WorkerHandle {
    worker: Arc<dyn Worker>,
    name: String,
    capabilities: HashSet<String>,
    state: RwLock<WorkerState>,
    gate: Option<tokio::sync::Mutex<()>>,
}

impl WorkerHandle {
    /// Wrap a worker; capabilities are captured once
    pub fn new(worker: Arc<dyn Worker>) -> Self {
        let name = worker.name().to_string();
        let capabilities = worker.capabilities().into_iter().collect();
        Self {
            worker,
            name,
            capabilities,
            state: RwLock::new(WorkerState {
                status: WorkerStatus::Idle,
                execution_id: None,
            }),
            gate: None,
        }
    }

    /// Serialize dispatches to this worker
    pub fn exclusive(mut self) -> Self {
        self.gate = Some(tokio::sync::Mutex::new(()));
        self
    }

    /// Worker name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared capability tags
    pub fn capabilities(&self) -> &HashSet<String> {
        &self.capabilities
    }

    /// Whether the worker declares the given capability
    pub fn can_handle(&self, capability: &str) -> bool {
        self.capabilities.contains(capability)
    }

    /// Current status
    pub fn status(&self) -> WorkerStatus {
        self.state.read().status
    }

    /// Execution id of the most recent dispatch
    pub fn execution_id(&self) -> Option<ExecutionId> {
        self.state.read().execution_id
    }

    /// The wrapped worker
    pub fn worker(&self) -> &Arc<dyn Worker> {
        &self.worker
    }

    /// Run one task through the `idle -> busy -> idle | error` cycle.
    ///
    /// Errors and panics raised by the worker are returned as
    /// [`Error::Execution`]; the status transition happens after the
    /// execute call has finished either way.
    pub async fn run(&self, task: &Task) -> Result<TaskResult> {
        let _guard = match &self.gate {
            Some(gate) => Some(gate.lock().await),
            None => None,
        };

        let execution_id = ExecutionId::new();
        {
            let mut state = self.state.write();
            state.status = WorkerStatus::Busy;
            state.execution_id = Some(execution_id);
        }
        tracing::debug!(worker = %self.name, %execution_id, "worker busy");

        let outcome = AssertUnwindSafe(self.worker.execute(task))
            .catch_unwind()
            .await;

        let result = match outcome {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(Error::Execution { worker, message })) => Err(Error::Execution { worker, message }),
            Ok(Err(e)) => Err(Error::execution(&self.name, e.to_string())),
            Err(panic) => Err(Error::execution(&self.name, panic_message(panic.as_ref()))),
        };

        self.state.write().status = if result.is_ok() {
            WorkerStatus::Idle
        } else {
            WorkerStatus::Error
        };

        result
    }
}

impl std::fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("name", &self.name)
            .field("capabilities", &self.capabilities)
            .field("status", &self.status())
            .field("exclusive", &self.gate.is_some())
            .finish()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("worker panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("worker panicked: {s}")
    } else {
        "worker panicked".to_string()
    }
}

type TaskFn = dyn Fn(Task) -> BoxFuture<'static, Result<TaskResult>> + Send + Sync;

/// Worker backed by a closure
///
/// ```rust,ignore
/// let echo = FnWorker::new("Echo", ["echo"], |task| async move {
///     Ok(TaskResult::success(task.user_message()))
/// });
/// ```
pub struct FnWorker {
    name: String,
    capabilities: Vec<String>,
    handler: Box<TaskFn>,
}

impl FnWorker {
    /// Create a closure-backed worker
    pub fn new<I, S, F, Fut>(name: impl Into<String>, capabilities: I, handler: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(Task) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<TaskResult>> + Send + 'static,
    {
        Self {
            name: name.into(),
            capabilities: capabilities.into_iter().map(Into::into).collect(),
            handler: Box::new(move |task| handler(task).boxed()),
        }
    }
}

#[async_trait]
impl Worker for FnWorker {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> Vec<String> {
        self.capabilities.clone()
    }

    async fn execute(&self, task: &Task) -> Result<TaskResult> {
        (self.handler)(task.clone()).await
    }
}
