//! Testing utilities
//!
//! Small behaviors and helpers shared by the unit, supervision and
//! integration tests, and usable by embedding code testing its own actors.

use crate::{
    actor::Behavior,
    address::Address,
    call::{Call, CallAction},
    config::LoggingConfig,
    context::Context,
    error::{ActorError, ActorResult},
    message::{ActorMessage, Message, Start},
    port::Port,
    system::SpawnOptions,
};
use async_trait::async_trait;
use std::time::{Duration, Instant};

/// Install a test-friendly tracing subscriber once per process. Honors
/// `RUST_LOG`, defaulting to warnings only.
pub fn init_test_tracing() {
    let level = std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".to_string());
    crate::telemetry::init_tracing(&LoggingConfig {
        level,
        with_target: true,
        with_file_and_line: false,
    });
}

/// Receive until a `T` arrives, skipping anything else, or time out
pub async fn await_message<T: ActorMessage>(port: &mut Port, timeout: Duration) -> ActorResult<T> {
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(ActorError::Timeout {
                operation: format!("waiting for {}", std::any::type_name::<T>()),
                timeout,
            });
        }
        match port.receive_timeout(remaining).await {
            Ok(msg) => match msg.downcast::<T>() {
                Ok(value) => return Ok(value),
                Err(other) => tracing::trace!(skipped = other.message_type(), "Skipping message"),
            },
            Err(ActorError::Timeout { .. }) => {
                return Err(ActorError::Timeout {
                    operation: format!("waiting for {}", std::any::type_name::<T>()),
                    timeout,
                })
            }
            Err(err) => return Err(err),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Increment;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetCount {
    pub reply_to: Address,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountIs(pub u64);

/// Makes the receiving test behavior panic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Crash;

/// Call action reading a [`Counter`]
#[derive(Debug, Clone, Copy)]
pub struct ReadCount;

impl CallAction for ReadCount {
    type State = Counter;
    type Output = CountIs;

    fn invoke(self, _ctx: &Context<'_>, state: &mut Counter) -> CountIs {
        CountIs(state.count)
    }
}

/// Counts `Increment`s; answers `GetCount` and `Call<ReadCount>`; panics
/// on `Crash`
#[derive(Debug, Default)]
pub struct Counter {
    count: u64,
}

#[async_trait]
impl Behavior for Counter {
    async fn receive(&mut self, ctx: &mut Context<'_>, msg: Message) -> ActorResult<()> {
        if msg.is::<Increment>() {
            self.count += 1;
        } else if let Some(get) = msg.downcast_ref::<GetCount>() {
            ctx.tell(get.reply_to, CountIs(self.count));
        } else if msg.is::<Crash>() {
            panic!("counter asked to crash at {}", self.count);
        } else if let Ok(call) = msg.downcast::<Call<ReadCount>>() {
            call.perform(ctx, self);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "counter"
    }
}

/// Forwards every message it receives, `Start` excluded, to `target`
pub struct Forwarder {
    pub target: Address,
}

#[async_trait]
impl Behavior for Forwarder {
    async fn receive(&mut self, ctx: &mut Context<'_>, msg: Message) -> ActorResult<()> {
        if !msg.is::<Start>() {
            ctx.tell(self.target, msg);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "forwarder"
    }
}

/// On start, spawns a chain of children registered under `chain[0]`,
/// `chain[1]`, ... each one the parent of the next
pub struct NameChain {
    pub chain: Vec<String>,
}

impl NameChain {
    pub fn new(chain: &[&str]) -> Self {
        Self {
            chain: chain.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[async_trait]
impl Behavior for NameChain {
    async fn receive(&mut self, ctx: &mut Context<'_>, msg: Message) -> ActorResult<()> {
        if msg.is::<Start>() {
            if let Some((first, rest)) = self.chain.split_first() {
                let child = NameChain {
                    chain: rest.to_vec(),
                };
                ctx.spawn_with(child, SpawnOptions::new().register_as(first.clone()));
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "name-chain"
    }
}

/// Ignores everything
pub struct Silent;

#[async_trait]
impl Behavior for Silent {
    async fn receive(&mut self, _ctx: &mut Context<'_>, _msg: Message) -> ActorResult<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        "silent"
    }
}
