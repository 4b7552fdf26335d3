//! Logging and trace context
//!
//! Every envelope carries a [`TraceContext`]; every invocation of a behavior
//! gets an [`Invocation`] holding the correlation id it inherited and a
//! cancellation token tied to system shutdown.

use crate::{address::Address, config::LoggingConfig, error::ActorError};
use once_cell::sync::OnceCell;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Level;
use tracing_subscriber::{prelude::*, EnvFilter};
use uuid::Uuid;

/// Install the global tracing subscriber
pub fn init_tracing(config: &LoggingConfig) {
    let filter = EnvFilter::builder().parse_lossy(config.level.as_str());
    let verbose = matches!(
        config.level.parse::<Level>(),
        Ok(Level::DEBUG) | Ok(Level::TRACE)
    );

    let main_layer = tracing_subscriber::fmt::layer().with_target(config.with_target);

    let layers = if verbose || config.with_file_and_line {
        vec![main_layer
            .with_file(true)
            .with_line_number(true)
            .with_filter(filter)
            .boxed()]
    } else {
        vec![main_layer.with_filter(filter).boxed()]
    };

    if tracing_subscriber::registry().with(layers).try_init().is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}

/// Delivery metadata attached to every envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceContext {
    pub correlation_id: Uuid,
    pub sender: Option<Address>,
}

impl TraceContext {
    /// Start a new trace, used for messages sent from outside any actor
    pub fn new_root(sender: Option<Address>) -> Self {
        Self {
            correlation_id: Uuid::new_v4(),
            sender,
        }
    }

    /// Continue an existing trace on behalf of `sender`
    pub fn child_of(correlation_id: Uuid, sender: Address) -> Self {
        Self {
            correlation_id,
            sender: Some(sender),
        }
    }
}

/// Context of a single behavior invocation
#[derive(Debug)]
pub struct Invocation {
    pub correlation_id: Uuid,
    pub sender: Option<Address>,
    pub started: Instant,
    token: CancellationToken,
}

impl Invocation {
    pub(crate) fn new(trace: TraceContext, token: CancellationToken) -> Self {
        Self {
            correlation_id: trace.correlation_id,
            sender: trace.sender,
            started: Instant::now(),
            token,
        }
    }

    /// Cancelled when the invocation ends or the system shuts down
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub(crate) fn finish(&self) {
        self.token.cancel();
    }
}

/// Logger scoped to one actor or port.
///
/// `fatal` logs at error level and marks the current invocation as failed:
/// the actor stops with a `DiedAbnormally` notice once the invocation
/// returns, even if the returned error is swallowed.
pub struct ActorLogger<'a> {
    actor: Address,
    path: String,
    fatal: Option<&'a OnceCell<String>>,
}

impl<'a> ActorLogger<'a> {
    pub(crate) fn new(actor: Address, path: String, fatal: Option<&'a OnceCell<String>>) -> Self {
        Self { actor, path, fatal }
    }

    pub fn debug(&self, msg: impl std::fmt::Display) {
        tracing::debug!(actor = %self.actor, path = %self.path, "{}", msg);
    }

    pub fn info(&self, msg: impl std::fmt::Display) {
        tracing::info!(actor = %self.actor, path = %self.path, "{}", msg);
    }

    pub fn warn(&self, msg: impl std::fmt::Display) {
        tracing::warn!(actor = %self.actor, path = %self.path, "{}", msg);
    }

    pub fn error(&self, msg: impl std::fmt::Display) {
        tracing::error!(actor = %self.actor, path = %self.path, "{}", msg);
    }

    /// Log at error level and fail the current invocation
    pub fn fatal(&self, reason: impl Into<String>) -> ActorError {
        let reason = reason.into();
        tracing::error!(actor = %self.actor, path = %self.path, fatal = true, "{}", reason);
        if let Some(slot) = self.fatal {
            // First fatal wins; later ones are already logged above.
            let _ = slot.set(reason.clone());
        }
        ActorError::Fatal {
            actor: self.path.clone(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_marks_invocation() {
        let slot = OnceCell::new();
        let logger = ActorLogger::new(Address::new(0, 1), "/worker".to_string(), Some(&slot));

        let err = logger.fatal("first");
        let _ = logger.fatal("second");

        assert_eq!(slot.get().map(String::as_str), Some("first"));
        assert!(matches!(err, ActorError::Fatal { ref actor, .. } if actor == "/worker"));
    }

    #[test]
    fn test_invocation_token() {
        let parent = CancellationToken::new();
        let invocation = Invocation::new(TraceContext::new_root(None), parent.child_token());
        assert!(!invocation.token().is_cancelled());

        invocation.finish();
        assert!(invocation.token().is_cancelled());
        assert!(!parent.is_cancelled());
    }
}
