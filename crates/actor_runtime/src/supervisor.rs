//! One-for-all supervision
//!
//! A [`Supervisor`] spawns the children declared by its
//! [`SupervisorBehavior`], monitors each one with its id as momento and
//! registers it under that id. When any child stops, every sibling is
//! terminated and, once all of them are gone, the whole set is started
//! again with fresh addresses. Observers registered with
//! [`WatchState`] receive [`Ready`] after every completed start.

use crate::{
    actor::Behavior,
    address::Address,
    context::Context,
    error::{ActorError, ActorResult},
    message::{DiedAbnormally, ExitedNormally, Message, Momento, Ready, Start, WatchState},
    system::SpawnOptions,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{
    collections::{HashMap, VecDeque},
    fmt,
    time::{Duration, Instant},
};

/// How a child is (re)created
pub struct ChildSpec {
    pub id: String,
    start: Box<dyn Fn() -> Box<dyn Behavior> + Send + Sync>,
}

impl ChildSpec {
    pub fn new<F, B>(id: impl Into<String>, start: F) -> Self
    where
        F: Fn() -> B + Send + Sync + 'static,
        B: Behavior,
    {
        Self {
            id: id.into(),
            start: Box::new(move || Box::new(start()) as Box<dyn Behavior>),
        }
    }

    fn start(&self) -> Box<dyn Behavior> {
        (self.start)()
    }
}

impl fmt::Debug for ChildSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChildSpec").field("id", &self.id).finish()
    }
}

/// The set of children a supervisor keeps alive
#[derive(Debug, Default)]
pub struct Spec {
    pub children: Vec<ChildSpec>,
}

impl Spec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn child<F, B>(mut self, id: impl Into<String>, start: F) -> Self
    where
        F: Fn() -> B + Send + Sync + 'static,
        B: Behavior,
    {
        self.children.push(ChildSpec::new(id, start));
        self
    }
}

/// Restart intensity limit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupervisionPolicy {
    /// Maximum restarts within time window
    pub max_restarts: usize,
    /// Time window for restart counting
    pub restart_window: Duration,
}

impl Default for SupervisionPolicy {
    fn default() -> Self {
        Self {
            max_restarts: 5,
            restart_window: Duration::from_secs(60),
        }
    }
}

/// Builder for supervision policies
#[derive(Debug, Default)]
pub struct SupervisionPolicyBuilder {
    policy: SupervisionPolicy,
}

impl SupervisionPolicyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_restarts(mut self, max_restarts: usize) -> Self {
        self.policy.max_restarts = max_restarts;
        self
    }

    pub fn restart_window(mut self, window: Duration) -> Self {
        self.policy.restart_window = window;
        self
    }

    pub fn build(self) -> SupervisionPolicy {
        self.policy
    }
}

/// The user-supplied part of a supervisor
pub trait SupervisorBehavior: Send + 'static {
    /// Declare the children. Called on every (re)start.
    fn init(&mut self, ctx: &mut Context<'_>) -> Spec;

    fn policy(&self) -> SupervisionPolicy {
        SupervisionPolicy::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorStatus {
    Init,
    Alive,
    TerminatingForRestart,
}

pub struct Supervisor<S> {
    controller: S,
    status: SupervisorStatus,
    children: HashMap<String, Address>,
    observers: Vec<Address>,
    policy: SupervisionPolicy,
    restarts: VecDeque<Instant>,
}

impl<S: SupervisorBehavior> Supervisor<S> {
    pub fn new(controller: S) -> Self {
        let policy = controller.policy();
        Self {
            controller,
            status: SupervisorStatus::Init,
            children: HashMap::new(),
            observers: Vec::new(),
            policy,
            restarts: VecDeque::new(),
        }
    }

    pub fn status(&self) -> SupervisorStatus {
        self.status
    }

    fn start(&mut self, ctx: &mut Context<'_>) -> ActorResult<()> {
        let spec = self.controller.init(ctx);
        let me = ctx.myself();

        for child in &spec.children {
            if self.children.contains_key(&child.id) {
                for (_, address) in self.children.drain() {
                    ctx.terminate(address);
                }
                let err = ActorError::DuplicateChild {
                    id: child.id.clone(),
                };
                return Err(ctx.log().fatal(err.to_string()));
            }

            let address = ctx.spawn_with(
                child.start(),
                SpawnOptions::new().monitored_by(me, Momento::new(child.id.clone())),
            );
            ctx.register(child.id.clone(), address);
            self.children.insert(child.id.clone(), address);
        }

        self.status = SupervisorStatus::Alive;
        ctx.log().debug(format!("Started {} children", self.children.len()));
        for observer in &self.observers {
            ctx.tell(*observer, Ready);
        }
        Ok(())
    }

    fn on_child_stopped(&mut self, ctx: &mut Context<'_>, who: Address, momento: &Momento) -> ActorResult<()> {
        let Some(id) = momento.downcast_ref::<String>() else {
            ctx.log().warn(format!("Stop notice from {} without a child id", who));
            return Ok(());
        };
        if self.children.get(id) != Some(&who) {
            ctx.log().warn(format!("Stop notice for unknown child {} ({})", id, who));
            return Ok(());
        }

        self.children.remove(id);
        ctx.unregister(id);

        match self.status {
            SupervisorStatus::Alive => self.terminate_for_restart(ctx),
            SupervisorStatus::TerminatingForRestart if self.children.is_empty() => self.start(ctx),
            SupervisorStatus::TerminatingForRestart => Ok(()),
            SupervisorStatus::Init => Err(ctx.log().fatal(format!("Child {} stopped before start completed", id))),
        }
    }

    fn terminate_for_restart(&mut self, ctx: &mut Context<'_>) -> ActorResult<()> {
        let now = Instant::now();
        while let Some(first) = self.restarts.front() {
            if now.duration_since(*first) > self.policy.restart_window {
                self.restarts.pop_front();
            } else {
                break;
            }
        }
        if self.restarts.len() >= self.policy.max_restarts {
            for (_, address) in self.children.drain() {
                ctx.terminate(address);
            }
            let err = ActorError::RestartIntensityExceeded {
                restarts: self.restarts.len(),
                window: self.policy.restart_window,
            };
            return Err(ctx.log().fatal(err.to_string()));
        }
        self.restarts.push_back(now);
        ctx.system().metrics().record_restart();

        self.status = SupervisorStatus::TerminatingForRestart;
        if self.children.is_empty() {
            return self.start(ctx);
        }
        ctx.log().info(format!("Restarting: terminating {} children", self.children.len()));
        for address in self.children.values() {
            ctx.terminate(*address);
        }
        Ok(())
    }
}

#[async_trait]
impl<S: SupervisorBehavior> Behavior for Supervisor<S> {
    async fn receive(&mut self, ctx: &mut Context<'_>, msg: Message) -> ActorResult<()> {
        if msg.is::<Start>() {
            return self.start(ctx);
        }
        if let Some(died) = msg.downcast_ref::<DiedAbnormally>() {
            ctx.log().warn(format!("Child {} died: {}", died.who, died.reason));
            return self.on_child_stopped(ctx, died.who, &died.momento);
        }
        if let Some(exited) = msg.downcast_ref::<ExitedNormally>() {
            return self.on_child_stopped(ctx, exited.who, &exited.momento);
        }
        if let Some(watch) = msg.downcast_ref::<WatchState>() {
            self.observers.push(watch.observer);
            if self.status == SupervisorStatus::Alive {
                ctx.tell(watch.observer, Ready);
            }
            return Ok(());
        }

        ctx.log().warn(format!("Unexpected message {}", msg.message_type()));
        Ok(())
    }

    fn name(&self) -> &str {
        "supervisor"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supervision_policy_builder() {
        let policy = SupervisionPolicyBuilder::new()
            .max_restarts(10)
            .restart_window(Duration::from_secs(300))
            .build();

        assert_eq!(policy.max_restarts, 10);
        assert_eq!(policy.restart_window, Duration::from_secs(300));
        assert_eq!(SupervisionPolicy::default().max_restarts, 5);
    }

    #[test]
    fn test_spec_builder() {
        let spec = Spec::new()
            .child("a", || crate::testing::Counter::default())
            .child("b", || crate::testing::Counter::default());
        let ids: Vec<&str> = spec.children.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["a", "b"]);
    }
}
