//! Execution unit: the serialized processing loop of one actor
//!
//! Faults are caught here and nowhere else. A panic, an `Err` returned by
//! the behavior, or a fatal log call ends the loop with `DiedAbnormally`;
//! `exit`, `terminate` and system shutdown end it with `ExitedNormally`.

use crate::{
    actor::Behavior,
    address::Address,
    context::Context,
    dispatcher::LifecycleDispatcher,
    error::{self, ActorError},
    mailbox::{ExecutionState, MailboxReceiver, MonitorRegistration, Signal, StateCell},
    message::{DiedAbnormally, Envelope, ExitValue, ExitedNormally, LifecycleEvent, Message, Momento, Unmonitored},
    naming::{self, FoundName, NoSuchName},
    system::System,
    telemetry::{Invocation, TraceContext},
};
use futures::FutureExt;
use once_cell::sync::OnceCell;
use std::{any::Any, collections::HashMap, panic::AssertUnwindSafe, sync::Arc};
use tracing::{debug, error, info, trace, warn, Instrument};

/// Runtime state owned by the loop and lent to the behavior via [`Context`]
pub(crate) struct UnitState {
    pub address: Address,
    pub system: System,
    pub parent: Option<Address>,
    pub names: HashMap<String, Address>,
    pub monitors: Vec<MonitorRegistration>,
    pub exit: Option<ExitValue>,
    pub fatal: OnceCell<String>,
}

enum Outcome {
    Died(String),
    Exited(ExitValue),
}

pub(crate) struct ExecutionUnit {
    state: UnitState,
    behavior: Box<dyn Behavior>,
    receiver: MailboxReceiver,
    exec: Arc<StateCell>,
    lifecycle: LifecycleDispatcher<LifecycleEvent>,
    kind: Arc<str>,
}

impl ExecutionUnit {
    pub(crate) fn new(
        state: UnitState,
        behavior: Box<dyn Behavior>,
        receiver: MailboxReceiver,
        exec: Arc<StateCell>,
        lifecycle: LifecycleDispatcher<LifecycleEvent>,
        kind: Arc<str>,
    ) -> Self {
        Self {
            state,
            behavior,
            receiver,
            exec,
            lifecycle,
            kind,
        }
    }

    pub(crate) async fn run(mut self) {
        let address = self.state.address;
        for next in [ExecutionState::Starting, ExecutionState::Running] {
            if let Err(err) = self.exec.advance(next) {
                warn!(actor = %address, error = %err, "Execution unit cannot start");
                self.done(Outcome::Exited(ExitValue::empty()));
                return;
            }
        }

        let system = self.state.system.clone();
        system.metrics().record_running();
        self.lifecycle.broadcast(LifecycleEvent::Running { who: address });
        trace!(actor = %address, behavior = %self.kind, "Actor running");

        let shutdown = system.shutdown_token().clone();
        let outcome = loop {
            let next = tokio::select! {
                biased;
                _ = shutdown.cancelled() => None,
                signal = self.receiver.next() => signal,
            };

            match next {
                None | Some(Signal::Terminate) => break Outcome::Exited(ExitValue::empty()),
                Some(Signal::Deliver(envelope)) => {
                    if let Some(outcome) = self.invoke(envelope).await {
                        break outcome;
                    }
                }
                Some(Signal::StartMonitoring(registration)) => {
                    self.state.monitors.push(registration);
                }
                Some(Signal::StopMonitoring { listener, ack }) => {
                    self.state.monitors.retain(|m| m.listener != listener);
                    if let Some(ack) = ack {
                        let trace = TraceContext::new_root(Some(address));
                        system.send_control(ack, Envelope::new(Unmonitored { watched: address }, trace));
                    }
                }
                Some(Signal::LookupName { name, reply_to }) => {
                    let trace = TraceContext::new_root(Some(address));
                    let reply = match self.state.names.get(&name) {
                        Some(&who) => Envelope::new(FoundName { name, who }, trace),
                        None => Envelope::new(NoSuchName { name }, trace),
                    };
                    system.send_control(reply_to, reply);
                }
            }
        };

        self.done(outcome);
    }

    /// Run the behavior on one message. Returns an outcome when the actor
    /// must stop.
    async fn invoke(&mut self, envelope: Envelope) -> Option<Outcome> {
        let system = self.state.system.clone();
        let address = self.state.address;
        let invocation = Invocation::new(envelope.trace, system.shutdown_token().child_token());
        let span = tracing::debug_span!(
            "actor.receive",
            actor = %address,
            behavior = %self.kind,
            message = envelope.message.message_type(),
            correlation_id = %invocation.correlation_id,
        );

        let result = {
            let mut ctx = Context::new(&mut self.state, &invocation);
            AssertUnwindSafe(self.behavior.receive(&mut ctx, envelope.message))
                .catch_unwind()
                .instrument(span)
                .await
        };
        invocation.finish();
        system.metrics().record_message(invocation.started.elapsed());

        match result {
            Err(payload) => {
                let err = ActorError::Panicked {
                    reason: panic_reason(&*payload),
                };
                error::report_error(&err, address);
                Some(Outcome::Died(err.to_string()))
            }
            Ok(result) => {
                if let Some(reason) = self.state.fatal.take() {
                    return Some(Outcome::Died(reason));
                }
                if let Err(err) = result {
                    error::report_error(&err, address);
                    return Some(Outcome::Died(err.to_string()));
                }
                self.state.exit.take().map(Outcome::Exited)
            }
        }
    }

    /// Stop the unit. Only the first call has any effect.
    fn done(&mut self, outcome: Outcome) {
        if !self.exec.finish() {
            return;
        }

        let system = self.state.system.clone();
        let address = self.state.address;
        let path = naming::path_of(&system, address);

        system.registry().remove(address);
        let leftovers = self.receiver.close_and_drain();
        if leftovers > 0 {
            system.metrics().record_dropped(leftovers as u64);
        }

        let event = match &outcome {
            Outcome::Died(reason) => {
                error!(actor = %address, path = %path, behavior = %self.kind, reason = %reason, leftovers, "Actor died abnormally");
                system.metrics().record_stopped(true);
                LifecycleEvent::DiedAbnormally {
                    who: address,
                    reason: reason.clone(),
                }
            }
            Outcome::Exited(result) => {
                info!(actor = %address, path = %path, behavior = %self.kind, leftovers, "Actor exited");
                system.metrics().record_stopped(false);
                LifecycleEvent::ExitedNormally {
                    who: address,
                    result: result.clone(),
                }
            }
        };

        let trace = TraceContext::new_root(Some(address));
        for MonitorRegistration { listener, momento } in self.state.monitors.drain(..) {
            let notice = death_notice(address, &outcome, momento);
            system.send_control(listener, Envelope { message: notice, trace });
        }

        self.lifecycle.broadcast(event);
        self.lifecycle.close();
        debug!(actor = %address, "Execution unit done");
    }
}

fn death_notice(who: Address, outcome: &Outcome, momento: Momento) -> Message {
    match outcome {
        Outcome::Died(reason) => Message::new(DiedAbnormally {
            who,
            reason: reason.clone(),
            momento,
        }),
        Outcome::Exited(result) => Message::new(ExitedNormally {
            who,
            result: result.clone(),
            momento,
        }),
    }
}

fn panic_reason(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
