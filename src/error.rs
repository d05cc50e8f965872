//! Error types for the swarm orchestration core

use thiserror::Error;

/// Result type alias for orchestration operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the orchestration core
#[derive(Debug, Error)]
pub enum Error {
    /// No worker is registered under the requested name
    #[error("Worker '{0}' not registered")]
    WorkerNotFound(String),

    /// No swarm exists under the requested name
    #[error("Swarm '{0}' not found")]
    SwarmNotFound(String),

    /// A swarm with this name already exists
    #[error("Swarm '{0}' already exists")]
    DuplicateSwarm(String),

    /// A worker's execute operation failed
    #[error("Worker execution failed: {worker}: {message}")]
    Execution {
        /// Worker name
        worker: String,
        /// Failure description
        message: String,
    },

    /// The reasoning service signalled "too many requests"
    #[error("Throttled by reasoning service: {0}")]
    Throttled(String),

    /// Throttling persisted past the retry budget
    #[error("Rate limit exceeded after {attempts} attempts: {message}")]
    RateLimitExceeded {
        /// Requests issued, first attempt included
        attempts: u32,
        /// Last throttling error
        message: String,
    },

    /// Error reported by the reasoning service
    #[error("Reasoning service error: {0}")]
    Reasoning(String),

    /// Remote intent classification failed or returned an unusable label
    #[error("Classification error: {0}")]
    Classification(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a worker execution error
    pub fn execution(worker: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Execution {
            worker: worker.into(),
            message: message.into(),
        }
    }

    /// Create a reasoning service error
    pub fn reasoning(msg: impl Into<String>) -> Self {
        Self::Reasoning(msg.into())
    }

    /// Create a classification error
    pub fn classification(msg: impl Into<String>) -> Self {
        Self::Classification(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an other error
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Whether this error is the reasoning service asking us to slow down.
    ///
    /// Besides the explicit [`Error::Throttled`] variant, service and transport
    /// errors are inspected for the usual HTTP 429 / "resource exhausted" text.
    pub fn is_throttling(&self) -> bool {
        match self {
            Self::Throttled(_) => true,
            Self::Http(e) => {
                e.status() == Some(reqwest::StatusCode::TOO_MANY_REQUESTS)
                    || looks_throttled(&e.to_string())
            }
            Self::Reasoning(msg) | Self::Other(msg) => looks_throttled(msg),
            _ => false,
        }
    }

    /// Whether this error means the retry budget was spent on throttling
    pub fn is_rate_limit_exceeded(&self) -> bool {
        matches!(self, Self::RateLimitExceeded { .. })
    }
}

fn looks_throttled(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower.contains("429") || lower.contains("too many requests") || lower.contains("resource exhausted")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_throttling_detection() {
        assert!(Error::Throttled("slow down".into()).is_throttling());
        assert!(Error::reasoning("status 429: quota").is_throttling());
        assert!(Error::reasoning("Resource exhausted (quota)").is_throttling());
        assert!(!Error::reasoning("status 500: boom").is_throttling());
        assert!(!Error::execution("RepoResearcher", "429 files scanned").is_throttling());
    }

    #[test]
    fn test_rate_limit_exceeded_message_names_attempts() {
        let err = Error::RateLimitExceeded {
            attempts: 4,
            message: "quota".into(),
        };
        assert!(err.is_rate_limit_exceeded());
        assert_eq!(err.to_string(), "Rate limit exceeded after 4 attempts: quota");
    }
}
