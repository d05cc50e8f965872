//! End-to-end routing through a cached session

use async_trait::async_trait;
use pulse_swarm::prelude::*;
use pulse_swarm::{SessionEvent, TurnOutcome};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Classifies everything as `general_qa` and echoes anything else
struct EchoReasoning {
    calls: AtomicUsize,
}

#[async_trait]
impl ReasoningClient for EchoReasoning {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if prompt.contains("Available intents") {
            Ok("general_qa".to_string())
        } else {
            Ok(format!("echo: {}", prompt))
        }
    }

    fn client_type(&self) -> &str {
        "echo"
    }
}

fn build() -> (Arc<Coordinator>, Arc<EchoReasoning>, SessionCache) {
    let coordinator = Arc::new(Coordinator::new());
    coordinator.register_worker(
        Arc::new(FnWorker::new("RepoResearcher", ["repo_analysis"], |task: Task| async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(TaskResult::success(format!("repo: {}", task.user_message())))
        })),
        "research",
    );
    coordinator.register_worker(
        Arc::new(FnWorker::new("PaperAnalyst", ["paper_search"], |_task: Task| async move {
            Ok(TaskResult::success("3 papers found"))
        })),
        "research",
    );
    coordinator.register_worker(
        Arc::new(FnWorker::new("ProjectExplorer", ["project_context"], |_task: Task| async move {
            Ok(TaskResult::success("README: hello"))
        })),
        "local-ops",
    );

    let client = Arc::new(EchoReasoning {
        calls: AtomicUsize::new(0),
    });
    let policy = RetryPolicy::default().with_min_gap(Duration::ZERO);
    let caller = Arc::new(RateLimitedCaller::new(client.clone(), policy));
    let cache = SessionCache::new(coordinator.clone(), caller, RouterConfig::default()).unwrap();
    (coordinator, client, cache)
}

#[tokio::test]
async fn routes_each_intent_to_its_target() {
    let (coordinator, client, cache) = build();
    let session = cache.get_or_create(Some("conv-1"));

    assert_eq!(session.process_message("Analyze github.com/a/b").await, "repo: Analyze github.com/a/b");
    assert_eq!(session.process_message("any papers on LLM routing?").await, "3 papers found");
    assert_eq!(session.process_message("Read README.md at /home/me/proj").await, "README: hello");
    assert_eq!(client.calls.load(Ordering::SeqCst), 0);

    let answer = session.process_message("tell me a joke").await;
    assert_eq!(answer, "echo: tell me a joke");
    // one classification call plus one answer call
    assert_eq!(client.calls.load(Ordering::SeqCst), 2);

    let workers: Vec<String> = coordinator.execution_log().into_iter().map(|r| r.worker).collect();
    assert_eq!(workers, ["RepoResearcher", "PaperAnalyst", "ProjectExplorer"]);

    let intents: Vec<IntentLabel> = session.history().into_iter().map(|t| t.intent).collect();
    assert_eq!(
        intents,
        [
            IntentLabel::repo_analysis(),
            IntentLabel::paper_search(),
            IntentLabel::project_context(),
            IntentLabel::general_qa(),
        ]
    );
}

#[tokio::test]
async fn cached_session_keeps_history_across_lookups() {
    let (_, _, cache) = build();

    cache.get_or_create(Some("conv-2")).process_message("arxiv survey please").await;
    let again = cache.get_or_create(Some("conv-2"));
    assert_eq!(again.history().len(), 1);
    assert_eq!(again.id().as_str(), "conv-2");
}

#[tokio::test]
async fn concurrent_sessions_share_one_registry() {
    let (coordinator, _, cache) = build();
    let a = cache.get_or_create(Some("a"));
    let b = cache.get_or_create(Some("b"));

    let (ra, rb) = tokio::join!(
        a.process_message("show the repo layout"),
        b.process_message("show the repository layout"),
    );
    assert!(ra.starts_with("repo:"));
    assert!(rb.starts_with("repo:"));
    assert_eq!(coordinator.execution_log().len(), 2);
}

#[tokio::test]
async fn turn_events_reach_subscribers() {
    let (_, _, cache) = build();
    let session = cache.get_or_create(None);
    let mut events = session.subscribe();

    session.process_message("find papers").await;

    let mut completed = None;
    while let Ok(event) = events.try_recv() {
        if let SessionEvent::TurnCompleted(trace) = event {
            completed = Some(trace);
        }
    }
    let trace = completed.expect("turn event");
    assert_eq!(trace.outcome, TurnOutcome::Answered);
    assert_eq!(trace.route, "worker:PaperAnalyst");
}
