//! Actor system: spawning, delivery and system-wide services

use crate::{
    actor::Behavior,
    address::Address,
    config::{ConfigError, SystemConfig, Validate},
    dispatcher::{LifecycleDispatcher, Subscription},
    error::{ActorError, ActorResult, DeliveryError},
    mailbox::{self, MailboxConfig, MonitorRegistration, Signal},
    message::{ActorMessage, Envelope, LifecycleEvent, Momento, Start},
    metrics::RuntimeMetrics,
    naming,
    port::Port,
    registry::{ActorCell, AddressRegistry, Target},
    runtime::{ExecutionUnit, UnitState},
    telemetry::TraceContext,
};
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Monitor installed atomically with the spawn
#[derive(Debug, Clone)]
pub struct MonitorAtSpawn {
    pub listener: Address,
    pub momento: Momento,
}

/// Name under which the spawning parent registers the new actor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterUnderParentAs {
    pub name: String,
}

/// Options for [`System::spawn_with`] and [`Context::spawn_with`](crate::Context::spawn_with)
#[derive(Debug, Clone, Default)]
pub struct SpawnOptions {
    monitors: Vec<MonitorAtSpawn>,
    register_as: Option<RegisterUnderParentAs>,
    parent: Option<Address>,
}

impl SpawnOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Have `listener` receive the death notice of the new actor, with no
    /// window in which the notice could be missed
    pub fn monitored_by(mut self, listener: Address, momento: Momento) -> Self {
        self.monitors.push(MonitorAtSpawn { listener, momento });
        self
    }

    /// Register the new actor in its parent's naming table. Ignored for
    /// actors spawned without a parent.
    pub fn register_as(mut self, name: impl Into<String>) -> Self {
        self.register_as = Some(RegisterUnderParentAs { name: name.into() });
        self
    }

    pub(crate) fn with_parent(mut self, parent: Address) -> Self {
        self.parent = Some(parent);
        self
    }

    pub(crate) fn registered_name(&self) -> Option<&str> {
        self.register_as.as_ref().map(|r| r.name.as_str())
    }
}

struct SystemInner {
    id: Uuid,
    config: SystemConfig,
    mailbox: Arc<MailboxConfig>,
    registry: AddressRegistry,
    root: OnceCell<Address>,
    metrics: RuntimeMetrics,
    shutdown: CancellationToken,
}

/// Handle to an actor system. Cheap to clone; all clones share state.
///
/// Spawning requires a running Tokio runtime.
#[derive(Clone)]
pub struct System {
    inner: Arc<SystemInner>,
}

impl System {
    pub fn new() -> Self {
        Self::build(SystemConfig::default())
    }

    pub fn with_config(config: SystemConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: SystemConfig) -> Self {
        let id = Uuid::new_v4();
        info!(system = %id, node = config.node, "Actor system created");
        Self {
            inner: Arc::new(SystemInner {
                id,
                mailbox: Arc::new(config.mailbox.clone()),
                registry: AddressRegistry::new(config.node),
                root: OnceCell::new(),
                metrics: RuntimeMetrics::new(),
                shutdown: CancellationToken::new(),
                config,
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn config(&self) -> &SystemConfig {
        &self.inner.config
    }

    pub fn metrics(&self) -> &RuntimeMetrics {
        &self.inner.metrics
    }

    /// The first actor spawned without a parent
    pub fn root(&self) -> Option<Address> {
        self.inner.root.get().copied()
    }

    pub fn spawn<B: Behavior>(&self, behavior: B) -> Address {
        self.spawn_with(behavior, SpawnOptions::new())
    }

    pub fn spawn_with<B: Behavior>(&self, behavior: B, options: SpawnOptions) -> Address {
        self.spawn_boxed(Box::new(behavior), options)
    }

    pub(crate) fn spawn_boxed(&self, behavior: Box<dyn Behavior>, options: SpawnOptions) -> Address {
        let address = self.inner.registry.next_address();
        let (sender, receiver, exec) = mailbox::channel(address, self.inner.mailbox.clone());
        let lifecycle = LifecycleDispatcher::new();
        let kind: Arc<str> = Arc::from(behavior.name());

        let label = match (&options.parent, &options.register_as) {
            (Some(_), Some(register)) => Some(register.name.clone()),
            (None, Some(register)) => {
                debug!(actor = %address, name = %register.name, "Ignoring register_as without a parent");
                None
            }
            _ => None,
        };

        // Start goes first on the control lane, ahead of anything a third
        // party can send once the address is registered.
        let start = Envelope::new(Start, TraceContext::new_root(options.parent));
        if let Err(err) = sender.signal(Signal::Deliver(start)) {
            warn!(actor = %address, error = %err, "Failed to queue Start");
        }

        let cell = ActorCell {
            mailbox: sender,
            parent: options.parent,
            label: Arc::new(RwLock::new(label)),
            lifecycle: lifecycle.clone(),
            behavior: kind.clone(),
        };

        let state = UnitState {
            address,
            system: self.clone(),
            parent: options.parent,
            names: HashMap::new(),
            monitors: options
                .monitors
                .into_iter()
                .map(|m| MonitorRegistration {
                    listener: m.listener,
                    momento: m.momento,
                })
                .collect(),
            exit: None,
            fatal: OnceCell::new(),
        };

        self.inner.registry.insert(address, Target::Actor(cell));
        if options.parent.is_none() && self.inner.root.set(address).is_ok() {
            debug!(actor = %address, "Root actor spawned");
        }
        self.inner.metrics.record_spawn();
        debug!(actor = %address, behavior = %kind, parent = ?options.parent, "Actor spawned");

        let unit = ExecutionUnit::new(state, behavior, receiver, exec, lifecycle, kind);
        tokio::spawn(unit.run());
        address
    }

    /// Send a message from outside any actor
    pub fn tell(&self, to: Address, msg: impl ActorMessage) {
        self.send(to, Envelope::new(msg, TraceContext::new_root(None)));
    }

    pub(crate) fn send(&self, to: Address, envelope: Envelope) {
        let message_type = envelope.message.message_type();
        if let Err(err) = self.inner.registry.deliver(to, envelope) {
            self.record_delivery_failure(err, message_type);
        }
    }

    pub(crate) fn send_control(&self, to: Address, envelope: Envelope) {
        let message_type = envelope.message.message_type();
        if let Err(err) = self.inner.registry.deliver_control(to, envelope) {
            self.record_delivery_failure(err, message_type);
        }
    }

    pub(crate) fn signal(&self, to: Address, signal: Signal) -> Result<(), DeliveryError> {
        self.inner.registry.signal(to, signal).map_err(|err| {
            debug!(error = %err, "Dropping runtime signal");
            self.inner.metrics.record_dropped(1);
            err
        })
    }

    fn record_delivery_failure(&self, err: DeliveryError, message_type: &'static str) {
        match err {
            DeliveryError::MailboxFull { .. } => {
                warn!(error = %err, message = message_type, "Rejecting message");
                self.inner.metrics.record_rejected();
            }
            _ => {
                debug!(error = %err, message = message_type, "Dropping message");
                self.inner.metrics.record_dropped(1);
            }
        }
    }

    /// Open a port: an address not bound to any behavior
    pub fn new_port(&self) -> Port {
        Port::open(self)
    }

    /// Resolve an absolute path such as `/a/b/c`, starting at the root
    pub async fn lookup(&self, path: &str) -> ActorResult<Address> {
        let (absolute, segments) = naming::split_path(path)?;
        if !absolute {
            return Err(ActorError::InvalidPath {
                path: path.to_string(),
            });
        }
        let root = self.root().ok_or_else(|| ActorError::NameNotFound {
            path: path.to_string(),
            segment: "/".to_string(),
        })?;
        naming::resolve(self, root, &segments, path, None).await
    }

    /// Have `watcher` receive the death notice of `watched`, carrying
    /// `momento`. A monitor on an actor that is already gone is dropped.
    pub fn monitor(&self, watched: Address, watcher: Address, momento: Momento) {
        let registration = MonitorRegistration {
            listener: watcher,
            momento,
        };
        let _ = self.signal(watched, Signal::StartMonitoring(registration));
    }

    pub fn unmonitor(&self, watched: Address, watcher: Address) {
        let _ = self.signal(
            watched,
            Signal::StopMonitoring {
                listener: watcher,
                ack: None,
            },
        );
    }

    /// Remove a monitor and have `ack` receive `Unmonitored` once it is
    /// gone. When the watched actor is already gone no ack is sent.
    pub fn unmonitor_with_ack(&self, watched: Address, watcher: Address, ack: Address) {
        let _ = self.signal(
            watched,
            Signal::StopMonitoring {
                listener: watcher,
                ack: Some(ack),
            },
        );
    }

    /// Stop an actor normally after the message it is currently handling
    pub fn terminate(&self, target: Address) {
        let _ = self.signal(target, Signal::Terminate);
    }

    /// Subscribe to the lifecycle events of a live actor
    pub fn subscribe(&self, address: Address) -> Option<Subscription<LifecycleEvent>> {
        self.inner
            .registry
            .actor(address)
            .map(|cell| cell.lifecycle.listen())
    }

    pub fn is_alive(&self, address: Address) -> bool {
        self.inner.registry.contains(address)
    }

    pub fn actor_count(&self) -> usize {
        self.inner.registry.actor_count()
    }

    /// Path of an actor built from the names its ancestors registered it
    /// under
    pub fn path_of(&self, address: Address) -> String {
        naming::path_of(self, address)
    }

    /// Stop every actor and wait, up to the configured timeout, for all of
    /// them to finish
    pub async fn shutdown(&self) -> ActorResult<()> {
        let timeout = self.inner.config.shutdown_timeout();
        info!(system = %self.inner.id, actors = self.actor_count(), "Shutting down actor system");
        self.inner.shutdown.cancel();

        let drained = tokio::time::timeout(timeout, async {
            while self.actor_count() > 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;

        match drained {
            Ok(()) => Ok(()),
            Err(_) => Err(ActorError::Timeout {
                operation: format!("shutdown with {} actors left", self.actor_count()),
                timeout,
            }),
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    pub(crate) fn shutdown_token(&self) -> &CancellationToken {
        &self.inner.shutdown
    }

    pub(crate) fn registry(&self) -> &AddressRegistry {
        &self.inner.registry
    }
}

impl Default for System {
    fn default() -> Self {
        Self::new()
    }
}
