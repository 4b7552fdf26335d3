//! Address registry
//!
//! The only structure mutated from many execution units at once. Lock
//! discipline: insertion and removal take the write guard; lookup and
//! delivery take the read guard and never block while holding it, since
//! every send under the guard is a non-blocking `try_send`/unbounded send.

use crate::{
    address::Address,
    dispatcher::LifecycleDispatcher,
    error::DeliveryError,
    mailbox::{MailboxSender, Signal},
    message::{Envelope, LifecycleEvent},
};
use parking_lot::RwLock;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
};
use tokio::sync::mpsc;

/// Registry entry of a spawned actor
#[derive(Clone)]
pub(crate) struct ActorCell {
    pub mailbox: MailboxSender,
    pub parent: Option<Address>,
    /// Name under which the parent registered this actor, for paths
    pub label: Arc<RwLock<Option<String>>>,
    pub lifecycle: LifecycleDispatcher<LifecycleEvent>,
    pub behavior: Arc<str>,
}

/// Registry entry of a port
#[derive(Clone)]
pub(crate) struct PortSender {
    pub tx: mpsc::UnboundedSender<Envelope>,
    pub open: Arc<AtomicBool>,
}

impl PortSender {
    fn send(&self, owner: Address, envelope: Envelope) -> Result<(), DeliveryError> {
        if !self.open.load(Ordering::Acquire) {
            return Err(DeliveryError::Closed(owner));
        }
        self.tx
            .send(envelope)
            .map_err(|_| DeliveryError::Closed(owner))
    }
}

#[derive(Clone)]
pub(crate) enum Target {
    Actor(ActorCell),
    Port(PortSender),
}

pub(crate) struct AddressRegistry {
    node: u32,
    next: AtomicU64,
    targets: RwLock<HashMap<Address, Target>>,
}

impl AddressRegistry {
    pub(crate) fn new(node: u32) -> Self {
        Self {
            node,
            next: AtomicU64::new(1),
            targets: RwLock::new(HashMap::new()),
        }
    }

    /// Issue a fresh address. Addresses are never reused.
    pub(crate) fn next_address(&self) -> Address {
        Address::new(self.node, self.next.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn insert(&self, address: Address, target: Target) {
        self.targets.write().insert(address, target);
    }

    pub(crate) fn remove(&self, address: Address) -> Option<Target> {
        self.targets.write().remove(&address)
    }

    pub(crate) fn contains(&self, address: Address) -> bool {
        self.targets.read().contains_key(&address)
    }

    pub(crate) fn actor(&self, address: Address) -> Option<ActorCell> {
        match self.targets.read().get(&address) {
            Some(Target::Actor(cell)) => Some(cell.clone()),
            _ => None,
        }
    }

    pub(crate) fn actor_count(&self) -> usize {
        self.targets
            .read()
            .values()
            .filter(|t| matches!(t, Target::Actor(_)))
            .count()
    }

    /// Deliver a user message: an actor's user lane or a port's queue
    pub(crate) fn deliver(&self, address: Address, envelope: Envelope) -> Result<(), DeliveryError> {
        match self.targets.read().get(&address) {
            Some(Target::Actor(cell)) => cell.mailbox.submit(envelope),
            Some(Target::Port(port)) => port.send(address, envelope),
            None => Err(DeliveryError::NoSuchTarget(address)),
        }
    }

    /// Deliver a runtime-produced message: an actor's control lane or a
    /// port's queue
    pub(crate) fn deliver_control(
        &self,
        address: Address,
        envelope: Envelope,
    ) -> Result<(), DeliveryError> {
        match self.targets.read().get(&address) {
            Some(Target::Actor(cell)) => cell.mailbox.signal(Signal::Deliver(envelope)),
            Some(Target::Port(port)) => port.send(address, envelope),
            None => Err(DeliveryError::NoSuchTarget(address)),
        }
    }

    /// Send a runtime instruction. Ports do not accept instructions.
    pub(crate) fn signal(&self, address: Address, signal: Signal) -> Result<(), DeliveryError> {
        match self.targets.read().get(&address) {
            Some(Target::Actor(cell)) => cell.mailbox.signal(signal),
            Some(Target::Port(_)) => Err(DeliveryError::NotAnActor(address)),
            None => Err(DeliveryError::NoSuchTarget(address)),
        }
    }
}
