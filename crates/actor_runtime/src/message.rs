//! Message types and the runtime protocol
//!
//! Any `Send + Debug + 'static` value can be sent to an actor. Behaviors
//! receive a type-erased [`Message`] and dispatch by downcasting, so the
//! protocol stays open: new message types need no registration.

use crate::{address::Address, telemetry::TraceContext};
use std::{
    any::Any,
    fmt,
    sync::Arc,
};

/// Marker trait for values that can travel through a mailbox
pub trait ActorMessage: Any + Send + fmt::Debug {
    /// Type name used in logs and error messages
    fn message_type(&self) -> &'static str;

    fn as_any(&self) -> &dyn Any;

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send>;
}

impl<T: Any + Send + fmt::Debug> ActorMessage for T {
    fn message_type(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
        self
    }
}

/// A type-erased message as seen by a behavior
#[derive(Debug)]
pub struct Message(Box<dyn ActorMessage>);

impl Message {
    /// Wrap a value. Wrapping a `Message` again returns it unchanged.
    pub fn new<M: ActorMessage>(msg: M) -> Self {
        let mut slot = Some(msg);
        if let Some(inner) = (&mut slot as &mut dyn Any).downcast_mut::<Option<Message>>() {
            if let Some(message) = inner.take() {
                return message;
            }
        }
        match slot {
            Some(msg) => Message(Box::new(msg)),
            None => unreachable!("slot is only emptied when M is Message"),
        }
    }

    pub fn is<T: Any>(&self) -> bool {
        (*self.0).as_any().is::<T>()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        (*self.0).as_any().downcast_ref::<T>()
    }

    /// Take the concrete value out, or get the message back untouched
    pub fn downcast<T: Any>(self) -> Result<T, Message> {
        if !self.is::<T>() {
            return Err(self);
        }
        match self.0.into_any().downcast::<T>() {
            Ok(value) => Ok(*value),
            Err(_) => unreachable!("type id checked above"),
        }
    }

    pub fn message_type(&self) -> &'static str {
        (*self.0).message_type()
    }
}

/// A message together with its delivery metadata
#[derive(Debug)]
pub struct Envelope {
    pub message: Message,
    pub trace: TraceContext,
}

impl Envelope {
    pub fn new(message: impl ActorMessage, trace: TraceContext) -> Self {
        Self {
            message: Message::new(message),
            trace,
        }
    }
}

/// Opaque, cloneable value carried through lifecycle notifications
#[derive(Clone)]
pub struct Opaque {
    value: Option<Arc<dyn Any + Send + Sync>>,
    type_name: &'static str,
}

/// Value attached to a monitor and echoed back in the death notice
pub type Momento = Opaque;

/// Result value of an actor that exited normally
pub type ExitValue = Opaque;

impl Opaque {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            value: Some(Arc::new(value)),
            type_name: std::any::type_name::<T>(),
        }
    }

    pub fn empty() -> Self {
        Self {
            value: None,
            type_name: "()",
        }
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_none()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.as_deref().and_then(|v| v.downcast_ref::<T>())
    }
}

impl Default for Opaque {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for Opaque {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(s) = self.downcast_ref::<String>() {
            return write!(f, "Opaque({:?})", s);
        }
        if let Some(s) = self.downcast_ref::<&'static str>() {
            return write!(f, "Opaque({:?})", s);
        }
        write!(f, "Opaque<{}>", self.type_name)
    }
}

/// First message every actor receives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Start;

/// Sent by a supervisor to its observers after each completed start
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ready;

/// Death notice for an actor that failed
#[derive(Debug, Clone)]
pub struct DiedAbnormally {
    pub who: Address,
    pub reason: String,
    pub momento: Momento,
}

/// Death notice for an actor that stopped on purpose
#[derive(Debug, Clone)]
pub struct ExitedNormally {
    pub who: Address,
    pub result: ExitValue,
    pub momento: Momento,
}

/// Ask a supervisor to send [`Ready`] to `observer`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchState {
    pub observer: Address,
}

/// Acknowledges that a monitor on `watched` was removed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unmonitored {
    pub watched: Address,
}

/// Events broadcast by an execution unit's lifecycle dispatcher
#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    Running { who: Address },
    DiedAbnormally { who: Address, reason: String },
    ExitedNormally { who: Address, result: ExitValue },
}

impl LifecycleEvent {
    pub fn who(&self) -> Address {
        match self {
            LifecycleEvent::Running { who }
            | LifecycleEvent::DiedAbnormally { who, .. }
            | LifecycleEvent::ExitedNormally { who, .. } => *who,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, LifecycleEvent::Running { .. })
    }
}
