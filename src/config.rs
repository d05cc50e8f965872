//! Configuration types for the orchestration core

use crate::classifier::{default_intent_rules, IntentLabel, IntentRule};
use crate::error::{Error, Result};
use crate::session::{default_routes, Route};
use dotenvy::dotenv;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use url::Url;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";
const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Pacing and retry policy for the reasoning service
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Minimum gap between consecutive outbound calls
    #[serde(with = "secs_f64", default = "default_min_gap")]
    pub min_gap: Duration,
    /// Backoff base; attempt `i` waits `base_delay * 2^i`
    #[serde(with = "secs_f64", default = "default_base_delay")]
    pub base_delay: Duration,
    /// Retries after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_min_gap() -> Duration {
    Duration::from_millis(1500)
}

fn default_base_delay() -> Duration {
    Duration::from_secs(3)
}

fn default_max_retries() -> u32 {
    3
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            min_gap: default_min_gap(),
            base_delay: default_base_delay(),
            max_retries: default_max_retries(),
        }
    }
}

impl RetryPolicy {
    /// Set the minimum inter-call gap
    pub fn with_min_gap(mut self, min_gap: Duration) -> Self {
        self.min_gap = min_gap;
        self
    }

    /// Set the backoff base
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Set the retry budget
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Delay before retry number `attempt` (0-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Reasoning service client configuration
#[derive(Clone)]
pub struct ReasoningConfig {
    /// API key (loaded from environment variable)
    pub api_key: SecretString,
    /// Base URL of the OpenAI-compatible endpoint
    pub base_url: Url,
    /// Model identifier
    pub model: String,
    /// Request timeout
    pub timeout: Duration,
    /// App name sent in the `X-Title` header
    pub app_name: String,
}

impl ReasoningConfig {
    /// Create a configuration from environment variables.
    ///
    /// Reads `REASONING_API_KEY` (required), `REASONING_BASE_URL` and
    /// `REASONING_MODEL` (optional).
    pub fn from_env() -> Result<Self> {
        // Load .env if present so local development picks up the key
        let _ = dotenv();

        let api_key = std::env::var("REASONING_API_KEY")
            .map_err(|_| Error::config("REASONING_API_KEY environment variable not set"))?;

        let mut config = Self::new(api_key)?;
        if let Ok(base_url) = std::env::var("REASONING_BASE_URL") {
            let url = Url::parse(&base_url)
                .map_err(|e| Error::config(format!("Invalid REASONING_BASE_URL: {}", e)))?;
            config = config.with_base_url(url);
        }
        if let Ok(model) = std::env::var("REASONING_MODEL") {
            config = config.with_model(model);
        }
        Ok(config)
    }

    /// Create a configuration with a specific API key
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let base_url = Url::parse(DEFAULT_BASE_URL)
            .map_err(|e| Error::config(format!("Invalid default base URL: {}", e)))?;
        Ok(Self {
            api_key: SecretString::from(api_key.into()),
            base_url,
            model: DEFAULT_MODEL.to_string(),
            timeout: Duration::from_secs(60),
            app_name: "PulseSwarm".to_string(),
        })
    }

    /// Set the base URL
    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = base_url;
        self
    }

    /// Set the model
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the app name
    pub fn with_app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = app_name.into();
        self
    }

    /// Get the API key as a string
    pub fn api_key(&self) -> &str {
        self.api_key.expose_secret()
    }
}

impl std::fmt::Debug for ReasoningConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReasoningConfig")
            .field("api_key", &"***REDACTED***")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .field("app_name", &self.app_name)
            .finish()
    }
}

/// Session and session-cache settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Maximum number of cached sessions
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
    /// Buffer size of each session's event channel
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_cache_capacity() -> usize {
    50
}

fn default_event_capacity() -> usize {
    64
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cache_capacity: default_cache_capacity(),
            event_capacity: default_event_capacity(),
        }
    }
}

/// Dispatcher settings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Serialize concurrent dispatches to the same worker name
    #[serde(default)]
    pub exclusive_workers: bool,
}

/// Top-level router configuration, usually loaded from YAML
///
/// ```yaml
/// default_intent: general_qa
/// path_intent: project_context
/// intents:
///   - label: repo_analysis
///     description: analyze a GitHub repository
///     keywords: [repo, github]
/// routes:
///   repo_analysis: { via: worker, name: RepoResearcher }
///   project_context: { via: worker, name: ProjectExplorer }
///   general_qa: { via: reasoning }
/// retry:
///   min_gap: 1.5
///   base_delay: 3
///   max_retries: 3
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Keyword rules, checked in order
    #[serde(default = "default_intent_rules")]
    pub intents: Vec<IntentRule>,
    /// Label used when nothing else matches
    #[serde(default = "default_intent_label")]
    pub default_intent: IntentLabel,
    /// Label forced for local-path messages
    #[serde(default = "default_path_label")]
    pub path_intent: IntentLabel,
    /// Routing target per label
    #[serde(default = "default_routes")]
    pub routes: HashMap<IntentLabel, Route>,
    /// Reasoning service pacing and retries
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Session settings
    #[serde(default)]
    pub session: SessionConfig,
    /// Dispatcher settings
    #[serde(default)]
    pub dispatch: DispatchConfig,
}

fn default_intent_label() -> IntentLabel {
    IntentLabel::general_qa()
}

fn default_path_label() -> IntentLabel {
    IntentLabel::project_context()
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            intents: default_intent_rules(),
            default_intent: default_intent_label(),
            path_intent: default_path_label(),
            routes: default_routes(),
            retry: RetryPolicy::default(),
            session: SessionConfig::default(),
            dispatch: DispatchConfig::default(),
        }
    }
}

impl RouterConfig {
    /// Load configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)
            .map_err(|e| Error::Config(format!("Failed to parse YAML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::Config(format!("Failed to read file: {}", e)))?;
        Self::from_yaml(&content)
    }

    /// Check that the rules and routes are consistent.
    ///
    /// Every rule label, the path intent and the default intent need a route.
    pub fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for rule in &self.intents {
            if rule.label.as_str().trim().is_empty() {
                return Err(Error::config("intent label must not be empty"));
            }
            if !seen.insert(rule.label.clone()) {
                return Err(Error::config(format!("duplicate intent label '{}'", rule.label)));
            }
        }
        if self.session.cache_capacity == 0 {
            return Err(Error::config("session.cache_capacity must be at least 1"));
        }
        if self.session.event_capacity == 0 {
            return Err(Error::config("session.event_capacity must be at least 1"));
        }
        if !self.routes.contains_key(&self.default_intent) {
            return Err(Error::config(format!(
                "no route for default intent '{}'",
                self.default_intent
            )));
        }
        if !self.routes.contains_key(&self.path_intent) {
            return Err(Error::config(format!("no route for path intent '{}'", self.path_intent)));
        }
        if let Some(rule) = self.intents.iter().find(|r| !self.routes.contains_key(&r.label)) {
            return Err(Error::config(format!("no route for intent '{}'", rule.label)));
        }
        Ok(())
    }

    /// Every label the classifier can produce
    pub fn labels(&self) -> Vec<IntentLabel> {
        let mut labels: Vec<IntentLabel> = self.intents.iter().map(|r| r.label.clone()).collect();
        for extra in [&self.path_intent, &self.default_intent] {
            if !labels.contains(extra) {
                labels.push(extra.clone());
            }
        }
        labels
    }
}

/// Serialize durations as fractional seconds
mod secs_f64 {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(0), Duration::from_secs(3));
        assert_eq!(policy.backoff(1), Duration::from_secs(6));
        assert_eq!(policy.backoff(2), Duration::from_secs(12));
    }

    #[test]
    fn test_default_router_config_is_valid() {
        let config = RouterConfig::default();
        config.validate().unwrap();
        assert_eq!(config.default_intent, IntentLabel::general_qa());
        assert_eq!(config.session.cache_capacity, 50);
        assert!(config.labels().contains(&IntentLabel::project_context()));
    }

    #[test]
    fn test_parse_router_yaml() {
        let yaml = r#"
default_intent: general_qa
intents:
  - label: repo_analysis
    keywords: [repo, github]
  - label: changelog
    description: release notes questions
    keywords: [changelog, release notes]
routes:
  repo_analysis: { via: worker, name: RepoResearcher }
  changelog: { via: capability, tag: release_notes }
  project_context: { via: worker, name: ProjectExplorer }
  general_qa: { via: reasoning }
retry:
  min_gap: 0.5
  base_delay: 2
  max_retries: 2
"#;
        let config = RouterConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.intents.len(), 2);
        assert_eq!(config.intents[1].label.as_str(), "changelog");
        assert_eq!(config.retry.min_gap, Duration::from_millis(500));
        assert_eq!(config.retry.max_retries, 2);
        assert_eq!(
            config.routes.get(&IntentLabel::new("changelog")),
            Some(&Route::Capability { tag: "release_notes".into() })
        );
        // unspecified sections fall back to defaults
        assert_eq!(config.path_intent, IntentLabel::project_context());
        assert!(!config.dispatch.exclusive_workers);
    }

    #[test]
    fn test_rejects_duplicate_labels() {
        let yaml = r#"
intents:
  - label: repo_analysis
    keywords: [repo]
  - label: repo_analysis
    keywords: [github]
"#;
        assert!(matches!(RouterConfig::from_yaml(yaml), Err(Error::Config(_))));
    }

    #[test]
    fn test_rejects_missing_default_route() {
        let yaml = r#"
default_intent: chit_chat
routes:
  general_qa: { via: reasoning }
"#;
        let err = RouterConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("chit_chat"));
    }

    #[test]
    fn test_rejects_unrouted_intent_rule() {
        let yaml = r#"
intents:
  - label: changelog
    keywords: [changelog]
"#;
        let err = RouterConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("no route for intent 'changelog'"), "{err}");
    }

    #[test]
    fn test_rejects_unrouted_path_intent() {
        let yaml = r#"
path_intent: local_files
"#;
        let err = RouterConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("local_files"), "{err}");
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "dispatch:\n  exclusive_workers: true").unwrap();
        let config = RouterConfig::from_file(file.path()).unwrap();
        assert!(config.dispatch.exclusive_workers);
        assert_eq!(config.intents.len(), default_intent_rules().len());
    }

    #[test]
    fn test_reasoning_config_redacts_key() {
        let config = ReasoningConfig::new("super-secret").unwrap().with_model("test-model");
        let debug = format!("{:?}", config);
        assert!(!debug.contains("super-secret"));
        assert_eq!(config.api_key(), "super-secret");
        assert_eq!(config.model, "test-model");
    }
}
