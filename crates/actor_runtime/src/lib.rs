//! Single-node actor runtime
//!
//! Actors are isolated units of state that communicate only by message
//! passing. Each one runs a serialized processing loop on the Tokio runtime,
//! is identified by a never-reused [`Address`], and can be monitored,
//! named, called synchronously and supervised with a one-for-all restart
//! policy.

pub mod actor;
pub mod address;
pub mod call;
pub mod config;
pub mod context;
pub mod directory;
pub mod dispatcher;
pub mod error;
pub mod mailbox;
pub mod message;
pub mod metrics;
pub mod naming;
pub mod port;
pub mod prelude;
mod registry;
mod runtime;
pub mod routing;
pub mod supervisor;
pub mod system;
pub mod telemetry;
pub mod testing;

#[cfg(test)]
mod supervision_tests;

// Re-exports for convenience
pub use actor::{from_fn, Behavior, FnBehavior};
pub use address::Address;
pub use call::{call, call_with_timeout, Call, CallAction};
pub use config::{ConfigError, LoggingConfig, SystemConfig, Validate};
pub use context::Context;
pub use dispatcher::{LifecycleDispatcher, Subscription};
pub use error::{ActorError, ActorResult, DeliveryError, ErrorSeverity};
pub use mailbox::{ExecutionState, MailboxConfig};
pub use message::{
    ActorMessage, DiedAbnormally, ExitValue, ExitedNormally, LifecycleEvent, Message, Momento, Opaque, Ready,
    Start, Unmonitored, WatchState,
};
pub use metrics::{MetricsSnapshot, RuntimeMetrics};
pub use port::Port;
pub use supervisor::{ChildSpec, Spec, SupervisionPolicy, Supervisor, SupervisorBehavior};
pub use system::{MonitorAtSpawn, RegisterUnderParentAs, SpawnOptions, System};
pub use telemetry::init_tracing;
