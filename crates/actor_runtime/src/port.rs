//! Ports: mailboxes without a behavior
//!
//! A port has an address like any actor, so actors can reply to it and it
//! can monitor them, but its messages are read by whoever owns the `Port`
//! value. Tests and embedding code use ports to talk to the system.

use crate::{
    address::Address,
    call::{self, CallAction},
    error::{ActorError, ActorResult},
    message::{ActorMessage, Envelope, Message},
    registry::{PortSender, Target},
    system::System,
    telemetry::TraceContext,
};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::mpsc;
use tracing::trace;

pub struct Port {
    address: Address,
    system: System,
    rx: mpsc::UnboundedReceiver<Envelope>,
    open: Arc<AtomicBool>,
}

impl Port {
    pub(crate) fn open(system: &System) -> Self {
        let address = system.registry().next_address();
        let (tx, rx) = mpsc::unbounded_channel();
        let open = Arc::new(AtomicBool::new(true));
        system.registry().insert(
            address,
            Target::Port(PortSender {
                tx,
                open: open.clone(),
            }),
        );
        trace!(port = %address, "Port opened");

        Self {
            address,
            system: system.clone(),
            rx,
            open,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Send a message with this port as sender
    pub fn tell(&self, to: Address, msg: impl ActorMessage) {
        self.system
            .send(to, Envelope::new(msg, TraceContext::new_root(Some(self.address))));
    }

    /// Wait for the next message. `None` once the port is closed and empty.
    pub async fn receive(&mut self) -> Option<Message> {
        self.rx.recv().await.map(|envelope| envelope.message)
    }

    pub fn try_receive(&mut self) -> Option<Message> {
        self.rx.try_recv().ok().map(|envelope| envelope.message)
    }

    pub async fn receive_timeout(&mut self, timeout: Duration) -> ActorResult<Message> {
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Ok(Some(envelope)) => Ok(envelope.message),
            Ok(None) => Err(ActorError::PortClosed { port: self.address }),
            Err(_) => Err(ActorError::Timeout {
                operation: format!("receive on port {}", self.address),
                timeout,
            }),
        }
    }

    /// Receive the next message and require it to be a `T`
    pub async fn receive_as<T: ActorMessage>(&mut self, timeout: Duration) -> ActorResult<T> {
        let msg = self.receive_timeout(timeout).await?;
        msg.downcast::<T>().map_err(|other| ActorError::UnexpectedReply {
            expected: std::any::type_name::<T>().to_string(),
            received: other.message_type().to_string(),
        })
    }

    /// Synchronous call from outside any actor, through a reply port of
    /// its own. Failures are returned, not fatal to anything.
    pub async fn call<A: CallAction>(&self, target: Address, action: A) -> ActorResult<A::Output> {
        self.call_with_timeout(target, action, self.system.config().call_timeout())
            .await
    }

    pub async fn call_with_timeout<A: CallAction>(
        &self,
        target: Address,
        action: A,
        timeout: Duration,
    ) -> ActorResult<A::Output> {
        let mut reply = self.system.new_port();
        let result = call::request(&self.system, &mut reply, target, action, timeout).await;
        reply.close();
        result
    }

    /// Stop accepting messages and remove the port from the registry.
    /// Messages already queued can still be received.
    pub fn close(&mut self) {
        if self.open.swap(false, Ordering::AcqRel) {
            self.system.registry().remove(self.address);
            self.rx.close();
            trace!(port = %self.address, "Port closed");
        }
    }
}

impl Drop for Port {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CountIs, Counter, Increment, ReadCount};

    #[tokio::test]
    async fn test_port_round_trip() {
        let system = System::new();
        let mut a = system.new_port();
        let b = system.new_port();

        b.tell(a.address(), "hello");
        let msg = a.receive_timeout(Duration::from_millis(100)).await.unwrap();
        assert_eq!(msg.downcast_ref::<&str>(), Some(&"hello"));
    }

    #[tokio::test]
    async fn test_receive_timeout() {
        let system = System::new();
        let mut port = system.new_port();

        let err = port.receive_timeout(Duration::from_millis(10)).await.unwrap_err();
        assert!(matches!(err, ActorError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_closed_port_drops_messages() {
        let system = System::new();
        let mut port = system.new_port();
        let address = port.address();

        system.tell(address, 1u32);
        port.close();
        system.tell(address, 2u32);

        assert!(!system.is_alive(address));
        assert_eq!(port.receive().await.unwrap().downcast_ref::<u32>(), Some(&1));
        assert!(port.receive().await.is_none());
        assert!(matches!(
            port.receive_timeout(Duration::from_millis(10)).await,
            Err(ActorError::PortClosed { .. })
        ));
    }

    #[tokio::test]
    async fn test_call_ignores_queued_messages() {
        let system = System::new();
        let counter = system.spawn(Counter::default());
        let mut port = system.new_port();

        system.tell(port.address(), 99u32);
        system.tell(counter, Increment);
        assert_eq!(port.call(counter, ReadCount).await.unwrap(), CountIs(1));

        // The queued message is still there and nothing else arrived.
        assert_eq!(port.receive_as::<u32>(Duration::from_millis(100)).await.unwrap(), 99);
        assert!(port.try_receive().is_none());
    }

    #[tokio::test]
    async fn test_receive_as_rejects_other_types() {
        let system = System::new();
        let mut port = system.new_port();
        system.tell(port.address(), 5u64);

        let err = port.receive_as::<String>(Duration::from_millis(100)).await.unwrap_err();
        assert!(matches!(err, ActorError::UnexpectedReply { .. }));
    }
}
