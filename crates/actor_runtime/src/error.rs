//! Error types for the actor runtime

use crate::address::Address;
use std::time::Duration;
use thiserror::Error;

/// Result type for actor operations
pub type ActorResult<T> = Result<T, ActorError>;

/// Actor runtime error types
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ActorError {
    /// An actor declared itself unable to continue
    #[error("Fatal error in actor {actor}: {reason}")]
    Fatal { actor: String, reason: String },

    /// A behavior panicked while handling a message
    #[error("Actor panicked: {reason}")]
    Panicked { reason: String },

    /// A path segment could not be resolved
    #[error("Name not found: segment {segment:?} of {path}")]
    NameNotFound { path: String, segment: String },

    /// Malformed path
    #[error("Invalid path: {path:?}")]
    InvalidPath { path: String },

    /// Timeout occurred
    #[error("Operation timed out: {operation} after {timeout:?}")]
    Timeout { operation: String, timeout: Duration },

    /// A reply did not have the expected shape
    #[error("Unexpected reply: expected {expected}, received {received}")]
    UnexpectedReply { expected: String, received: String },

    /// The callee stopped before replying
    #[error("Callee {target} stopped before replying")]
    CalleeDied { target: Address },

    /// Receive on a closed port
    #[error("Port {port} is closed")]
    PortClosed { port: Address },

    /// Invalid state transition
    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    /// Two children declared with the same id
    #[error("Duplicate child id: {id}")]
    DuplicateChild { id: String },

    /// Supervisor restarted more often than its policy allows
    #[error("Restart intensity exceeded: {restarts} restarts within {window:?}")]
    RestartIntensityExceeded { restarts: usize, window: Duration },

    /// Configuration error
    #[error("Configuration error: {parameter} - {reason}")]
    ConfigurationError { parameter: String, reason: String },

    /// Custom error with context
    #[error("Custom error: {message}")]
    Custom { message: String },
}

/// Soft delivery failures. These are logged and the message is dropped;
/// they never reach the sender as an error.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("no such target {0}")]
    NoSuchTarget(Address),

    #[error("mailbox of {target} is full ({capacity} messages)")]
    MailboxFull { target: Address, capacity: usize },

    #[error("target {0} is closed")]
    Closed(Address),

    #[error("target {0} is a port, not an actor")]
    NotAnActor(Address),
}

/// Error severity levels for escalation decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorSeverity {
    /// Low impact, system continues normally
    Minor,
    /// Medium impact, the caller should notice
    Moderate,
    /// The actor involved stops
    Major,
    /// A supervision subtree gives up
    Critical,
}

impl ActorError {
    /// Create a custom error from any displayable value
    pub fn custom(message: impl Into<String>) -> Self {
        ActorError::Custom {
            message: message.into(),
        }
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            ActorError::RestartIntensityExceeded { .. } => ErrorSeverity::Critical,
            ActorError::Fatal { .. } => ErrorSeverity::Major,
            ActorError::Panicked { .. } => ErrorSeverity::Major,
            ActorError::DuplicateChild { .. } => ErrorSeverity::Major,
            ActorError::InvalidStateTransition { .. } => ErrorSeverity::Major,
            ActorError::ConfigurationError { .. } => ErrorSeverity::Major,
            ActorError::Timeout { .. } => ErrorSeverity::Moderate,
            ActorError::UnexpectedReply { .. } => ErrorSeverity::Moderate,
            ActorError::CalleeDied { .. } => ErrorSeverity::Moderate,
            ActorError::NameNotFound { .. } => ErrorSeverity::Moderate,
            ActorError::InvalidPath { .. } => ErrorSeverity::Moderate,
            ActorError::Custom { .. } => ErrorSeverity::Moderate,
            ActorError::PortClosed { .. } => ErrorSeverity::Minor,
        }
    }

    /// Check if error is recoverable
    pub fn is_recoverable(&self) -> bool {
        self.severity() < ErrorSeverity::Major
    }

    /// Get error category for metrics
    pub fn category(&self) -> &'static str {
        match self {
            ActorError::Fatal { .. } | ActorError::Panicked { .. } => "actor_lifecycle",
            ActorError::InvalidStateTransition { .. } => "actor_lifecycle",
            ActorError::NameNotFound { .. } | ActorError::InvalidPath { .. } => "naming",
            ActorError::Timeout { .. } => "timing",
            ActorError::UnexpectedReply { .. } | ActorError::CalleeDied { .. } => "call",
            ActorError::PortClosed { .. } => "messaging",
            ActorError::DuplicateChild { .. } => "supervision",
            ActorError::RestartIntensityExceeded { .. } => "supervision",
            ActorError::ConfigurationError { .. } => "configuration",
            ActorError::Custom { .. } => "custom",
        }
    }
}

impl From<crate::config::ConfigError> for ActorError {
    fn from(err: crate::config::ConfigError) -> Self {
        ActorError::ConfigurationError {
            parameter: "system".to_string(),
            reason: err.to_string(),
        }
    }
}

/// Per-category error counter shared by every execution unit
#[derive(Debug)]
pub struct ErrorReporter {
    error_counts: dashmap::DashMap<&'static str, std::sync::atomic::AtomicU64>,
}

impl ErrorReporter {
    /// Create new error reporter
    pub fn new() -> Self {
        Self {
            error_counts: dashmap::DashMap::new(),
        }
    }

    /// Count an error and log it at a level matching its severity
    pub fn report_error(&self, error: &ActorError, actor: Address) {
        let category = error.category();

        self.error_counts
            .entry(category)
            .or_insert_with(|| std::sync::atomic::AtomicU64::new(0))
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);

        match error.severity() {
            ErrorSeverity::Critical | ErrorSeverity::Major => {
                tracing::error!(error = %error, category, %actor, "Actor error");
            }
            ErrorSeverity::Moderate => {
                tracing::warn!(error = %error, category, %actor, "Actor error");
            }
            ErrorSeverity::Minor => {
                tracing::debug!(error = %error, category, %actor, "Actor error");
            }
        }
    }

    /// Get error counts by category
    pub fn get_error_counts(&self) -> std::collections::HashMap<String, u64> {
        self.error_counts
            .iter()
            .map(|entry| {
                (
                    entry.key().to_string(),
                    entry.value().load(std::sync::atomic::Ordering::Relaxed),
                )
            })
            .collect()
    }

    /// Reset error counts
    pub fn reset_counts(&self) {
        for entry in self.error_counts.iter() {
            entry.value().store(0, std::sync::atomic::Ordering::Relaxed);
        }
    }
}

impl Default for ErrorReporter {
    fn default() -> Self {
        Self::new()
    }
}

static ERROR_REPORTER: once_cell::sync::Lazy<ErrorReporter> =
    once_cell::sync::Lazy::new(ErrorReporter::new);

/// Report error globally
pub fn report_error(error: &ActorError, actor: Address) {
    ERROR_REPORTER.report_error(error, actor);
}

/// Get global error counts
pub fn get_global_error_counts() -> std::collections::HashMap<String, u64> {
    ERROR_REPORTER.get_error_counts()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_severity() {
        let fatal = ActorError::Fatal {
            actor: "<0.1>".to_string(),
            reason: "boom".to_string(),
        };
        assert_eq!(fatal.severity(), ErrorSeverity::Major);
        assert!(!fatal.is_recoverable());

        let timeout = ActorError::Timeout {
            operation: "call".to_string(),
            timeout: Duration::from_millis(100),
        };
        assert!(timeout.is_recoverable());
        assert_eq!(timeout.category(), "timing");
    }

    #[test]
    fn test_error_reporter() {
        let reporter = ErrorReporter::new();
        let error = ActorError::NameNotFound {
            path: "/a/b".to_string(),
            segment: "b".to_string(),
        };

        reporter.report_error(&error, Address::new(0, 1));
        reporter.report_error(&error, Address::new(0, 2));
        let counts = reporter.get_error_counts();
        assert_eq!(counts.get("naming"), Some(&2));

        reporter.reset_counts();
        assert_eq!(reporter.get_error_counts().get("naming"), Some(&0));
    }
}
