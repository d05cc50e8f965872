//! Route a few messages through a session backed by stub workers
//!
//! Set `REASONING_API_KEY` (and optionally `REASONING_BASE_URL`,
//! `REASONING_MODEL`) to send general questions to a real endpoint.
//! Pass messages as arguments to route your own.

use async_trait::async_trait;
use pulse_swarm::prelude::*;
use pulse_swarm::telemetry::{init_logging, SessionEvent};
use std::sync::Arc;

struct RepoResearcher;

#[async_trait]
impl Worker for RepoResearcher {
    fn name(&self) -> &str {
        "RepoResearcher"
    }

    fn capabilities(&self) -> Vec<String> {
        vec!["repo_analysis".to_string()]
    }

    async fn execute(&self, task: &Task) -> Result<TaskResult> {
        Ok(TaskResult::success(format!(
            "Repository analysis queued for: {}",
            task.user_message()
        )))
    }
}

struct PaperAnalyst;

#[async_trait]
impl Worker for PaperAnalyst {
    fn name(&self) -> &str {
        "PaperAnalyst"
    }

    fn capabilities(&self) -> Vec<String> {
        vec!["paper_search".to_string()]
    }

    async fn execute(&self, _task: &Task) -> Result<TaskResult> {
        // no search backend here, so the session answers with its fallback
        Ok(TaskResult::success("").with_data("papers", serde_json::json!([])))
    }
}

/// Answers every prompt locally when no API key is configured
struct OfflineReasoning;

#[async_trait]
impl ReasoningClient for OfflineReasoning {
    async fn generate(&self, prompt: &str) -> Result<String> {
        if prompt.contains("Respond with ONLY the intent name") {
            return Ok("general_qa".to_string());
        }
        Ok(format!("(offline) you asked: {}", prompt))
    }

    fn client_type(&self) -> &str {
        "offline"
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging(false)?;

    println!("=== PulseSwarm Routing Example ===\n");

    let config = RouterConfig::default();

    let coordinator = Arc::new(Coordinator::with_dispatch_config(config.dispatch));
    coordinator.create_swarm("research", "Code & repository analysis")?;
    coordinator.create_swarm("local-ops", "Local filesystem access")?;
    coordinator.register_worker(Arc::new(RepoResearcher), "research");
    coordinator.register_worker(Arc::new(PaperAnalyst), "research");
    coordinator.register_worker(
        Arc::new(FnWorker::new("ProjectExplorer", ["project_context"], |task: Task| async move {
            Ok(TaskResult::success(format!(
                "Would read local paths mentioned in: {}",
                task.user_message()
            )))
        })),
        "local-ops",
    );
    println!("✓ {} workers registered", coordinator.worker_count());

    let client: Arc<dyn ReasoningClient> = match HttpReasoningClient::from_env() {
        Ok(client) => {
            println!("✓ Reasoning client initialized ({})", client.config().model);
            Arc::new(client)
        }
        Err(e) => {
            println!("! {} - using offline reasoning", e);
            Arc::new(OfflineReasoning)
        }
    };
    let caller = Arc::new(RateLimitedCaller::new(client, config.retry));
    let sessions = SessionCache::new(coordinator.clone(), caller, config)?;

    let session = sessions.get_or_create(Some("demo"));
    let mut events = session.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if let SessionEvent::TurnCompleted(trace) = event {
                println!("   [{} via {} in {}ms]", trace.intent, trace.route, trace.elapsed_ms);
            }
        }
    });

    let mut messages: Vec<String> = std::env::args().skip(1).collect();
    if messages.is_empty() {
        messages = vec![
            "Analyze the tokio-rs/tokio repository".to_string(),
            "Find papers on retrieval augmented generation".to_string(),
            "Read README.md at D:/projects/pulse/".to_string(),
            "What's a good name for a cat?".to_string(),
        ];
    }

    for message in &messages {
        println!("\n> {}", message);
        let answer = session.process_message(message).await;
        println!("{}", answer);
    }

    let fan_out = coordinator
        .fan_out(&Task::for_message("compare perspectives", "repo_analysis", session.id().as_str()), &[
            "RepoResearcher",
            "PaperAnalyst",
        ])
        .await;
    println!("\nFan-out returned {} results", fan_out.len());

    let status = coordinator.status();
    println!("\n{}", serde_json::to_string_pretty(&status)?);

    Ok(())
}
