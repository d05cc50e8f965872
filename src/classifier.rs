//! Intent classification
//!
//! A three-stage cascade that stops at the first confident answer:
//!
//! 1. **Path override** - messages naming a local filesystem path (and no
//!    remote URL) always get the path intent.
//! 2. **Keyword table** - the first rule with a keyword contained in the
//!    lower-cased message wins. Rule order is significant.
//! 3. **Remote fallback** - one call through the
//!    [`RateLimitedCaller`] asking for a single label; the reply is mapped back
//!    by substring containment. Any failure yields the default intent.

use crate::config::RouterConfig;
use crate::error::{Error, Result};
use crate::rate_limit::RateLimitedCaller;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, LazyLock};

static WINDOWS_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[a-z]:[/\\]").expect("valid windows path regex"));

static URL_SCHEME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[a-z][a-z0-9+.-]*://").expect("valid url scheme regex"));

static UNIX_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:^|[\s"'(\[])/[\w.-]+/[\w./-]*"#).expect("valid unix path regex")
});

/// Classified category of an inbound request
///
/// The vocabulary is configuration: any label named by an [`IntentRule`] is
/// valid. The built-in labels have constructors.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IntentLabel(String);

impl IntentLabel {
    /// Create a label
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    /// Analyze a GitHub repository
    pub fn repo_analysis() -> Self {
        Self::new("repo_analysis")
    }

    /// Find or summarize research papers
    pub fn paper_search() -> Self {
        Self::new("paper_search")
    }

    /// Local files, project setup or directory contents
    pub fn project_context() -> Self {
        Self::new("project_context")
    }

    /// General questions or chitchat
    pub fn general_qa() -> Self {
        Self::new("general_qa")
    }

    /// Get the inner string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Leading word of the label (`repo` for `repo_analysis`)
    pub fn stem(&self) -> &str {
        self.0.split(['_', '-', ' ']).next().unwrap_or(&self.0)
    }
}

impl fmt::Display for IntentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Keyword rule for one intent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentRule {
    /// Label produced when the rule matches
    pub label: IntentLabel,
    /// Description shown to the remote classifier
    #[serde(default)]
    pub description: String,
    /// Substrings matched against the lower-cased message
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl IntentRule {
    /// Create a rule
    pub fn new<I, S>(label: IntentLabel, description: impl Into<String>, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            label,
            description: description.into(),
            keywords: keywords.into_iter().map(Into::into).collect(),
        }
    }

    fn matches(&self, message_lower: &str) -> bool {
        self.keywords
            .iter()
            .any(|kw| !kw.is_empty() && message_lower.contains(&kw.to_lowercase()))
    }
}

/// Built-in keyword table
pub fn default_intent_rules() -> Vec<IntentRule> {
    vec![
        IntentRule::new(
            IntentLabel::repo_analysis(),
            "User wants to analyze a GitHub repository",
            [
                "repo", "repository", "github", "analyze repo", "codebase",
                "code structure", "architecture of", "clone",
                "pull request", "commit history", "branch",
            ],
        ),
        IntentRule::new(
            IntentLabel::paper_search(),
            "User wants to find or summarize research papers",
            [
                "paper", "papers", "arxiv", "research paper", "study",
                "journal", "publication", "academic", "thesis", "survey",
            ],
        ),
        IntentRule::new(
            IntentLabel::project_context(),
            "Questions about local files, project setup, or directory contents",
            [
                "read the content", "read file", "show file", "open file",
                "readme", "list directory", "list files", "show me",
                "project structure", "my project", "my stack", "my setup",
                "my code", "my dependencies", "my repo",
                "requirements.txt", "package.json", "cargo.toml",
                ".env", ".py file", ".rs file", ".md file",
            ],
        ),
    ]
}

/// Which cascade stage produced a label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationStage {
    /// Local path detected
    PathOverride,
    /// Keyword table match
    Keyword,
    /// Remote classifier reply
    Remote,
    /// Nothing matched or the remote call failed
    Fallback,
}

/// Label plus the stage that produced it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    /// Chosen label
    pub label: IntentLabel,
    /// Producing stage
    pub stage: ClassificationStage,
}

/// Three-stage intent classifier
#[derive(Debug)]
pub struct IntentClassifier {
    rules: Vec<IntentRule>,
    default_intent: IntentLabel,
    path_intent: IntentLabel,
    caller: Option<Arc<RateLimitedCaller>>,
}

impl IntentClassifier {
    /// Create a classifier without a remote fallback
    pub fn new(rules: Vec<IntentRule>, default_intent: IntentLabel, path_intent: IntentLabel) -> Self {
        Self {
            rules,
            default_intent,
            path_intent,
            caller: None,
        }
    }

    /// Build from router configuration
    pub fn from_config(config: &RouterConfig) -> Self {
        Self::new(
            config.intents.clone(),
            config.default_intent.clone(),
            config.path_intent.clone(),
        )
    }

    /// Enable the remote classifier stage
    pub fn with_caller(mut self, caller: Arc<RateLimitedCaller>) -> Self {
        self.caller = Some(caller);
        self
    }

    /// Label used when nothing matches
    pub fn default_intent(&self) -> &IntentLabel {
        &self.default_intent
    }

    /// Whether the message names a local path and no remote URL
    pub fn is_local_path(message: &str) -> bool {
        let lower = message.to_lowercase();
        let has_url = lower.contains("github.com") || URL_SCHEME.is_match(&lower);
        if has_url {
            return false;
        }
        WINDOWS_PATH.is_match(&lower) || UNIX_PATH.is_match(&lower)
    }

    /// First keyword rule matching the message
    pub fn match_keywords(&self, message: &str) -> Option<IntentLabel> {
        let lower = message.to_lowercase();
        self.rules
            .iter()
            .find(|rule| rule.matches(&lower))
            .map(|rule| rule.label.clone())
    }

    /// Classify a message. Never fails.
    pub async fn classify(&self, message: &str) -> IntentLabel {
        self.classify_detailed(message).await.label
    }

    /// Classify a message, reporting which stage decided
    pub async fn classify_detailed(&self, message: &str) -> Classification {
        if Self::is_local_path(message) {
            tracing::debug!(intent = %self.path_intent, "local path detected");
            return Classification {
                label: self.path_intent.clone(),
                stage: ClassificationStage::PathOverride,
            };
        }

        if let Some(label) = self.match_keywords(message) {
            tracing::debug!(intent = %label, "matched by keyword");
            return Classification {
                label,
                stage: ClassificationStage::Keyword,
            };
        }

        match self.classify_remote(message).await {
            Ok(label) => Classification {
                label,
                stage: ClassificationStage::Remote,
            },
            Err(e) => {
                tracing::warn!(error = %e, fallback = %self.default_intent, "intent detection fell back to default");
                Classification {
                    label: self.default_intent.clone(),
                    stage: ClassificationStage::Fallback,
                }
            }
        }
    }

    async fn classify_remote(&self, message: &str) -> Result<IntentLabel> {
        let caller = self
            .caller
            .as_ref()
            .ok_or_else(|| Error::classification("no remote classifier configured"))?;

        let reply = caller.call(&self.build_prompt(message)).await?;
        self.parse_label(&reply)
            .ok_or_else(|| Error::classification(format!("unmappable label '{}'", reply.trim())))
    }

    /// Map a free-text classifier reply onto a known label
    pub fn parse_label(&self, reply: &str) -> Option<IntentLabel> {
        let reply = reply.trim().to_lowercase();
        if reply.is_empty() {
            return None;
        }
        self.candidates()
            .into_iter()
            .find(|label| reply.contains(label.as_str()) || reply.contains(label.stem()))
    }

    fn candidates(&self) -> Vec<IntentLabel> {
        let mut labels: Vec<IntentLabel> = self.rules.iter().map(|r| r.label.clone()).collect();
        for extra in [&self.path_intent, &self.default_intent] {
            if !labels.contains(extra) {
                labels.push(extra.clone());
            }
        }
        labels
    }

    fn build_prompt(&self, message: &str) -> String {
        let mut listing = String::new();
        for rule in &self.rules {
            listing.push_str(&format!("- {}: {}\n", rule.label, rule.description));
        }
        if !self.rules.iter().any(|r| r.label == self.default_intent) {
            listing.push_str(&format!("- {}: General questions or chitchat\n", self.default_intent));
        }

        format!(
            "Classify the user's intent based on their message.\n\n\
             Available intents:\n{}\n\
             User message: \"{}\"\n\n\
             Respond with ONLY the intent name, no explanation.",
            listing, message
        )
    }
}

impl Default for IntentClassifier {
    fn default() -> Self {
        Self::from_config(&RouterConfig::default())
    }
}
