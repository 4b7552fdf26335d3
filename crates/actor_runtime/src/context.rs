//! Per-invocation view of an actor's runtime state

use crate::{
    actor::Behavior,
    address::Address,
    error::{ActorError, ActorResult},
    message::{ActorMessage, Envelope, ExitValue, Momento},
    naming,
    port::Port,
    runtime::UnitState,
    system::{SpawnOptions, System},
    telemetry::{ActorLogger, Invocation, TraceContext},
};
use tracing::debug;

/// Handed to [`Behavior::receive`] for the duration of one message.
///
/// Everything an actor does to the outside world goes through here: sends
/// carry the current correlation id, spawns record this actor as parent,
/// and the naming table is this actor's own.
pub struct Context<'a> {
    unit: &'a mut UnitState,
    invocation: &'a Invocation,
}

impl<'a> Context<'a> {
    pub(crate) fn new(unit: &'a mut UnitState, invocation: &'a Invocation) -> Self {
        Self { unit, invocation }
    }

    pub fn myself(&self) -> Address {
        self.unit.address
    }

    pub fn parent(&self) -> Option<Address> {
        self.unit.parent
    }

    pub fn system(&self) -> &System {
        &self.unit.system
    }

    pub fn invocation(&self) -> &Invocation {
        self.invocation
    }

    /// Send a message. Never fails; undeliverable messages are logged and
    /// dropped.
    pub fn tell(&self, to: Address, msg: impl ActorMessage) {
        let trace = TraceContext::child_of(self.invocation.correlation_id, self.myself());
        self.unit.system.send(to, Envelope::new(msg, trace));
    }

    pub fn spawn<B: Behavior>(&mut self, behavior: B) -> Address {
        self.spawn_with(behavior, SpawnOptions::new())
    }

    /// Spawn a child of this actor. A `register_as` option enters the child
    /// into this actor's naming table.
    pub fn spawn_with<B: Behavior>(&mut self, behavior: B, options: SpawnOptions) -> Address {
        let name = options.registered_name().map(str::to_owned);
        let child = self
            .unit
            .system
            .spawn_boxed(Box::new(behavior), options.with_parent(self.myself()));
        if let Some(name) = name {
            self.unit.names.insert(name, child);
        }
        child
    }

    /// Spawn a child monitored by this actor
    pub fn spawn_monitor<B: Behavior>(&mut self, behavior: B, momento: Momento) -> Address {
        let me = self.myself();
        self.spawn_with(behavior, SpawnOptions::new().monitored_by(me, momento))
    }

    pub fn spawn_port(&self) -> Port {
        self.unit.system.new_port()
    }

    pub fn log(&self) -> ActorLogger<'_> {
        ActorLogger::new(self.myself(), self.self_named_ref(), Some(&self.unit.fatal))
    }

    /// Enter `who` into this actor's naming table. When `who` is a child of
    /// this actor its path becomes `self_named_ref()/name`.
    pub fn register(&mut self, name: impl Into<String>, who: Address) {
        let name = name.into();
        if let Some(cell) = self.unit.system.registry().actor(who) {
            if cell.parent == Some(self.myself()) {
                *cell.label.write() = Some(name.clone());
            }
        }
        if let Some(previous) = self.unit.names.insert(name.clone(), who) {
            if previous != who {
                debug!(actor = %self.myself(), name = %name, %previous, %who, "Replaced registered name");
            }
        }
    }

    pub fn unregister(&mut self, name: &str) -> Option<Address> {
        let who = self.unit.names.remove(name)?;
        if let Some(cell) = self.unit.system.registry().actor(who) {
            let mut label = cell.label.write();
            if label.as_deref() == Some(name) {
                *label = None;
            }
        }
        Some(who)
    }

    /// Look up a name in this actor's own table
    pub fn named(&self, name: &str) -> Option<Address> {
        self.unit.names.get(name).copied()
    }

    pub fn monitor(&self, watched: Address, watcher: Address, momento: Momento) {
        self.unit.system.monitor(watched, watcher, momento);
    }

    pub fn unmonitor(&self, watched: Address, watcher: Address) {
        self.unit.system.unmonitor(watched, watcher);
    }

    /// Remove a monitor; `ack` receives `Unmonitored` once it is gone and
    /// no notice for the pair follows it.
    pub fn unmonitor_with_ack(&self, watched: Address, watcher: Address, ack: Address) {
        self.unit.system.unmonitor_with_ack(watched, watcher, ack);
    }

    pub fn terminate(&self, target: Address) {
        self.unit.system.terminate(target);
    }

    /// Stop this actor normally once the current message is handled
    pub fn exit(&mut self, result: ExitValue) {
        self.unit.exit = Some(result);
    }

    /// Path a child registered under `name` would have
    pub fn named_ref(&self, name: &str) -> String {
        let base = self.self_named_ref();
        if base == "/" {
            format!("/{}", name)
        } else {
            format!("{}/{}", base, name)
        }
    }

    pub fn self_named_ref(&self) -> String {
        naming::path_of(&self.unit.system, self.myself())
    }

    /// Resolve a path, absolute from the root or relative to this actor.
    /// A miss is fatal to this actor.
    pub async fn lookup_path(&self, path: &str) -> ActorResult<Address> {
        match self.resolve(path).await {
            Ok(address) => Ok(address),
            Err(err) => Err(self.log().fatal(format!("Lookup of {} failed: {}", path, err))),
        }
    }

    async fn resolve(&self, path: &str) -> ActorResult<Address> {
        let (absolute, segments) = naming::split_path(path)?;
        let start = if absolute {
            self.unit
                .system
                .root()
                .ok_or_else(|| ActorError::NameNotFound {
                    path: path.to_string(),
                    segment: "/".to_string(),
                })?
        } else {
            self.myself()
        };

        naming::resolve(
            &self.unit.system,
            start,
            &segments,
            path,
            Some(naming::LocalNames {
                owner: self.myself(),
                names: &self.unit.names,
            }),
        )
        .await
    }
}
