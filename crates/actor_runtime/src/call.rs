//! Synchronous calls over asynchronous messaging
//!
//! A call opens a temporary port, monitors the target from it, sends a
//! [`Call`] and waits for the reply with a fixed timeout. Inside an actor
//! every failure is fatal to the caller; from a [`Port`] the error is
//! returned.

use crate::{
    address::Address,
    context::Context,
    error::{ActorError, ActorResult, DeliveryError},
    mailbox::{MonitorRegistration, Signal},
    message::{ActorMessage, DiedAbnormally, ExitedNormally, Momento},
    port::Port,
    system::System,
};
use std::{fmt, time::Duration};

/// Work performed by the callee against its own state
pub trait CallAction: Send + fmt::Debug + 'static {
    /// State of the callee the action runs against
    type State: ?Sized;
    /// Reply sent back to the caller
    type Output: ActorMessage;

    /// Runs inside the callee; `ctx` is the callee's context
    fn invoke(self, ctx: &Context<'_>, state: &mut Self::State) -> Self::Output;
}

/// Request message delivered to the callee
#[derive(Debug)]
pub struct Call<A: CallAction> {
    pub reply_to: Address,
    pub action: A,
}

impl<A: CallAction> Call<A> {
    /// Run the action and send its output to the caller
    pub fn perform(self, ctx: &Context<'_>, state: &mut A::State) {
        let output = self.action.invoke(ctx, state);
        ctx.tell(self.reply_to, output);
    }
}

/// Call `target` with the configured timeout
pub async fn call<A: CallAction>(ctx: &Context<'_>, target: Address, action: A) -> ActorResult<A::Output> {
    let timeout = ctx.system().config().call_timeout();
    call_with_timeout(ctx, target, action, timeout).await
}

pub async fn call_with_timeout<A: CallAction>(
    ctx: &Context<'_>,
    target: Address,
    action: A,
    timeout: Duration,
) -> ActorResult<A::Output> {
    let mut port = ctx.spawn_port();
    let result = request(ctx.system(), &mut port, target, action, timeout).await;
    port.close();

    match result {
        Ok(output) => Ok(output),
        Err(err) => Err(ctx.log().fatal(format!("Call to {} failed: {}", target, err))),
    }
}

pub(crate) async fn request<A: CallAction>(
    system: &System,
    port: &mut Port,
    target: Address,
    action: A,
    timeout: Duration,
) -> ActorResult<A::Output> {
    let registration = MonitorRegistration {
        listener: port.address(),
        momento: Momento::empty(),
    };
    match system.signal(target, Signal::StartMonitoring(registration)) {
        Err(DeliveryError::NoSuchTarget(_)) | Err(DeliveryError::Closed(_)) => {
            return Err(ActorError::CalleeDied { target })
        }
        _ => {}
    }
    port.tell(
        target,
        Call {
            reply_to: port.address(),
            action,
        },
    );

    let reply = port.receive_timeout(timeout).await;
    system.unmonitor(target, port.address());

    let reply = match reply?.downcast::<A::Output>() {
        Ok(output) => return Ok(output),
        Err(reply) => reply,
    };

    let died = reply
        .downcast_ref::<DiedAbnormally>()
        .map(|d| d.who)
        .or_else(|| reply.downcast_ref::<ExitedNormally>().map(|e| e.who));
    match died {
        Some(who) if who == target => Err(ActorError::CalleeDied { target }),
        _ => Err(ActorError::UnexpectedReply {
            expected: std::any::type_name::<A::Output>().to_string(),
            received: reply.message_type().to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{actor::Behavior, message::Message, testing::Counter};
    use async_trait::async_trait;

    /// Answers with the callee's own address
    #[derive(Debug)]
    struct WhoAreYou;

    impl CallAction for WhoAreYou {
        type State = Responder;
        type Output = Address;

        fn invoke(self, ctx: &Context<'_>, _state: &mut Responder) -> Address {
            ctx.myself()
        }
    }

    struct Responder;

    #[async_trait]
    impl Behavior for Responder {
        async fn receive(&mut self, ctx: &mut Context<'_>, msg: Message) -> ActorResult<()> {
            if let Ok(call) = msg.downcast::<Call<WhoAreYou>>() {
                call.perform(ctx, self);
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_action_sees_callee_context() {
        let system = System::new();
        let responder = system.spawn(Responder);
        let port = system.new_port();

        assert_eq!(port.call(responder, WhoAreYou).await.unwrap(), responder);
    }

    #[tokio::test]
    async fn test_call_to_stopped_actor_fails_fast() {
        let system = System::new();
        let counter = system.spawn(Counter::default());
        let mut events = system.subscribe(counter).unwrap();
        system.terminate(counter);
        while events.recv().await.is_some() {}

        let port = system.new_port();
        let err = port
            .call_with_timeout(counter, crate::testing::ReadCount, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert_eq!(err, ActorError::CalleeDied { target: counter });
    }
}
