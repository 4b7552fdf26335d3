//! Mailbox with a prioritized control lane and a bounded user lane
//!
//! Runtime traffic (the initial `Start`, death notices, monitor requests,
//! name lookups, termination) travels on an unbounded control lane that the
//! loop always drains first. Messages sent with `tell` travel on a bounded
//! user lane; when it is full the new message is rejected and counted,
//! `tell` never blocks.

use crate::{
    address::Address,
    config::{ConfigError, Validate},
    error::{ActorError, ActorResult, DeliveryError},
    message::{Envelope, Momento},
};
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    sync::{
        atomic::{AtomicU8, Ordering},
        Arc,
    },
};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{trace, warn};

/// Mailbox configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MailboxConfig {
    /// Maximum number of queued user messages
    pub capacity: usize,
    /// Fraction of capacity at which queue depth is logged
    pub warn_threshold: f64,
}

impl Default for MailboxConfig {
    fn default() -> Self {
        Self {
            capacity: 1024,
            warn_threshold: 0.8,
        }
    }
}

impl Validate for MailboxConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::ValidationError {
                field: "mailbox.capacity".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if !(self.warn_threshold > 0.0 && self.warn_threshold <= 1.0) {
            return Err(ConfigError::ValidationError {
                field: "mailbox.warn_threshold".to_string(),
                reason: format!("must be in (0, 1], got {}", self.warn_threshold),
            });
        }
        Ok(())
    }
}

/// Backpressure state of a user lane
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackpressureState {
    /// Normal operation
    Normal,
    /// Queue depth at or above the warning threshold
    Warning,
    /// At capacity, new messages are rejected
    Blocked,
}

impl BackpressureState {
    pub fn from_depth(depth: usize, config: &MailboxConfig) -> Self {
        if depth >= config.capacity {
            BackpressureState::Blocked
        } else if depth as f64 >= config.capacity as f64 * config.warn_threshold {
            BackpressureState::Warning
        } else {
            BackpressureState::Normal
        }
    }
}

/// State of an execution unit. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum ExecutionState {
    Init = 0,
    Starting = 1,
    Running = 2,
    Done = 3,
}

impl ExecutionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ExecutionState::Init,
            1 => ExecutionState::Starting,
            2 => ExecutionState::Running,
            _ => ExecutionState::Done,
        }
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Atomic holder of an [`ExecutionState`], shared by the loop and every
/// sender so that submission can observe `Done` without locking.
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(ExecutionState::Init as u8))
    }

    pub(crate) fn load(&self) -> ExecutionState {
        ExecutionState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Move to the next state. `Done` is reachable from anywhere; any
    /// other target must be the immediate successor.
    pub(crate) fn advance(&self, to: ExecutionState) -> ActorResult<ExecutionState> {
        self.0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                let ok = current != ExecutionState::Done as u8
                    && (to == ExecutionState::Done || to as u8 == current + 1);
                ok.then_some(to as u8)
            })
            .map(ExecutionState::from_u8)
            .map_err(|current| ActorError::InvalidStateTransition {
                from: ExecutionState::from_u8(current).to_string(),
                to: to.to_string(),
            })
    }

    /// Enter `Done`. Returns true only for the caller that made the move.
    pub(crate) fn finish(&self) -> bool {
        self.0.swap(ExecutionState::Done as u8, Ordering::AcqRel) != ExecutionState::Done as u8
    }
}

/// A monitor attached to a watched actor
#[derive(Debug, Clone)]
pub(crate) struct MonitorRegistration {
    pub listener: Address,
    pub momento: Momento,
}

/// Runtime instructions carried on the control lane
#[derive(Debug)]
pub(crate) enum Signal {
    Deliver(Envelope),
    StartMonitoring(MonitorRegistration),
    StopMonitoring {
        listener: Address,
        ack: Option<Address>,
    },
    LookupName {
        name: String,
        reply_to: Address,
    },
    Terminate,
}

/// Sending half of a mailbox, held by the registry
#[derive(Clone)]
pub(crate) struct MailboxSender {
    owner: Address,
    user: mpsc::Sender<Envelope>,
    control: mpsc::UnboundedSender<Signal>,
    state: Arc<StateCell>,
    config: Arc<MailboxConfig>,
}

impl MailboxSender {
    /// Enqueue a user message unless the unit is done or the lane is full
    pub(crate) fn submit(&self, envelope: Envelope) -> Result<(), DeliveryError> {
        if self.state.load() == ExecutionState::Done {
            return Err(DeliveryError::Closed(self.owner));
        }

        match self.user.try_send(envelope) {
            Ok(()) => {
                let depth = self.config.capacity - self.user.capacity();
                if BackpressureState::from_depth(depth, &self.config) == BackpressureState::Warning {
                    warn!(
                        actor = %self.owner,
                        depth,
                        capacity = self.config.capacity,
                        "Mailbox approaching capacity"
                    );
                }
                Ok(())
            }
            Err(TrySendError::Full(_)) => Err(DeliveryError::MailboxFull {
                target: self.owner,
                capacity: self.config.capacity,
            }),
            Err(TrySendError::Closed(_)) => Err(DeliveryError::Closed(self.owner)),
        }
    }

    /// Enqueue a runtime instruction on the control lane
    pub(crate) fn signal(&self, signal: Signal) -> Result<(), DeliveryError> {
        if self.state.load() == ExecutionState::Done {
            return Err(DeliveryError::Closed(self.owner));
        }
        self.control
            .send(signal)
            .map_err(|_| DeliveryError::Closed(self.owner))
    }
}

/// Receiving half of a mailbox, owned by the execution unit
pub(crate) struct MailboxReceiver {
    user: mpsc::Receiver<Envelope>,
    control: mpsc::UnboundedReceiver<Signal>,
}

impl MailboxReceiver {
    /// Next item, control lane first. `None` once both lanes are closed.
    pub(crate) async fn next(&mut self) -> Option<Signal> {
        tokio::select! {
            biased;
            Some(signal) = self.control.recv() => Some(signal),
            Some(envelope) = self.user.recv() => Some(Signal::Deliver(envelope)),
            else => None,
        }
    }

    /// Close both lanes and discard whatever is still queued. Returns the
    /// number of discarded items.
    pub(crate) fn close_and_drain(&mut self) -> usize {
        self.user.close();
        self.control.close();

        let mut dropped = 0;
        while let Ok(envelope) = self.user.try_recv() {
            trace!(message = envelope.message.message_type(), "Discarding queued message");
            dropped += 1;
        }
        while self.control.try_recv().is_ok() {
            dropped += 1;
        }
        dropped
    }
}

/// Create a mailbox for `owner`
pub(crate) fn channel(
    owner: Address,
    config: Arc<MailboxConfig>,
) -> (MailboxSender, MailboxReceiver, Arc<StateCell>) {
    let (user_tx, user_rx) = mpsc::channel(config.capacity);
    let (control_tx, control_rx) = mpsc::unbounded_channel();
    let state = Arc::new(StateCell::new());

    let sender = MailboxSender {
        owner,
        user: user_tx,
        control: control_tx,
        state: state.clone(),
        config,
    };
    let receiver = MailboxReceiver {
        user: user_rx,
        control: control_rx,
    };
    (sender, receiver, state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{message::Start, telemetry::TraceContext};

    fn envelope(n: u32) -> Envelope {
        Envelope::new(n, TraceContext::new_root(None))
    }

    #[test]
    fn test_state_transitions_move_forward() {
        let cell = StateCell::new();
        assert_eq!(cell.load(), ExecutionState::Init);

        assert!(cell.advance(ExecutionState::Running).is_err());
        assert!(cell.advance(ExecutionState::Starting).is_ok());
        assert!(cell.advance(ExecutionState::Starting).is_err());
        assert!(cell.advance(ExecutionState::Running).is_ok());

        assert!(cell.finish());
        assert!(!cell.finish());
        assert_eq!(cell.load(), ExecutionState::Done);
        assert!(matches!(
            cell.advance(ExecutionState::Done),
            Err(ActorError::InvalidStateTransition { .. })
        ));
    }

    #[test]
    fn test_backpressure_state() {
        let config = MailboxConfig {
            capacity: 10,
            warn_threshold: 0.8,
        };
        assert_eq!(BackpressureState::from_depth(3, &config), BackpressureState::Normal);
        assert_eq!(BackpressureState::from_depth(8, &config), BackpressureState::Warning);
        assert_eq!(BackpressureState::from_depth(10, &config), BackpressureState::Blocked);
    }

    #[tokio::test]
    async fn test_control_lane_first() {
        let (sender, mut receiver, _) = channel(Address::new(0, 1), Arc::new(MailboxConfig::default()));
        sender.submit(envelope(1)).unwrap();
        sender
            .signal(Signal::Deliver(Envelope::new(Start, TraceContext::new_root(None))))
            .unwrap();

        match receiver.next().await {
            Some(Signal::Deliver(env)) => assert!(env.message.is::<Start>()),
            other => panic!("expected Start first, got {:?}", other),
        }
        match receiver.next().await {
            Some(Signal::Deliver(env)) => assert_eq!(env.message.downcast_ref::<u32>(), Some(&1)),
            other => panic!("expected user message, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_full_mailbox_rejects_new_messages() {
        let config = Arc::new(MailboxConfig {
            capacity: 2,
            warn_threshold: 1.0,
        });
        let (sender, mut receiver, _) = channel(Address::new(0, 1), config);

        sender.submit(envelope(1)).unwrap();
        sender.submit(envelope(2)).unwrap();
        assert!(matches!(
            sender.submit(envelope(3)),
            Err(DeliveryError::MailboxFull { capacity: 2, .. })
        ));

        // The oldest messages are kept.
        for expected in [1u32, 2] {
            match receiver.next().await {
                Some(Signal::Deliver(env)) => assert_eq!(env.message.downcast_ref::<u32>(), Some(&expected)),
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_submit_after_done_is_rejected() {
        let (sender, mut receiver, state) = channel(Address::new(0, 1), Arc::new(MailboxConfig::default()));
        sender.submit(envelope(1)).unwrap();

        assert!(state.finish());
        assert!(matches!(sender.submit(envelope(2)), Err(DeliveryError::Closed(_))));
        assert!(matches!(sender.signal(Signal::Terminate), Err(DeliveryError::Closed(_))));
        assert_eq!(receiver.close_and_drain(), 1);
    }
}
