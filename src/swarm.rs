//! Swarms: named groups of workers sharing a domain

use crate::worker::WorkerHandle;
use std::collections::HashMap;
use std::sync::Arc;

/// A logical group of related workers
#[derive(Debug)]
pub struct Swarm {
    name: String,
    description: String,
    workers: HashMap<String, Arc<WorkerHandle>>,
    // registration order, for deterministic capability scans
    order: Vec<String>,
}

impl Swarm {
    /// Create an empty swarm
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            workers: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Swarm name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Human-readable description
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Add a worker, replacing any worker of the same name.
    ///
    /// Returns the replaced handle, if any.
    pub fn add_worker(&mut self, handle: Arc<WorkerHandle>) -> Option<Arc<WorkerHandle>> {
        let name = handle.name().to_string();
        let previous = self.workers.insert(name.clone(), handle);
        if previous.is_none() {
            self.order.push(name);
        }
        previous
    }

    /// Remove a worker by name
    pub fn remove_worker(&mut self, name: &str) -> Option<Arc<WorkerHandle>> {
        let removed = self.workers.remove(name);
        if removed.is_some() {
            self.order.retain(|n| n != name);
        }
        removed
    }

    /// Get a specific worker by name
    pub fn get_worker(&self, name: &str) -> Option<Arc<WorkerHandle>> {
        self.workers.get(name).cloned()
    }

    /// Worker names in registration order
    pub fn list_workers(&self) -> Vec<String> {
        self.order.clone()
    }

    /// Number of workers
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    /// Whether the swarm has no workers
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// First worker, in registration order, declaring the capability
    pub fn find_capable_worker(&self, capability: &str) -> Option<Arc<WorkerHandle>> {
        self.order
            .iter()
            .filter_map(|name| self.workers.get(name))
            .find(|handle| handle.can_handle(capability))
            .cloned()
    }
}
