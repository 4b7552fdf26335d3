//! Key-affine message routing

use crate::{
    actor::Behavior,
    address::Address,
    context::Context,
    error::ActorResult,
    message::{ActorMessage, DiedAbnormally, ExitedNormally, Message, Start},
};
use async_trait::async_trait;
use std::{collections::HashMap, fmt, hash::Hash};

/// Decides which routee a message belongs to and how routees are created
pub trait Bridge: Send + 'static {
    type Message: ActorMessage;
    type Key: Eq + Hash + Clone + Send + fmt::Debug + 'static;

    fn extract(&self, msg: &Self::Message) -> Self::Key;

    /// Create the routee for `key`. Spawning it with
    /// [`Context::spawn_monitor`] lets the router forget it when it stops.
    fn spawn_routee(&mut self, ctx: &mut Context<'_>, key: &Self::Key, msg: &Self::Message) -> Address;
}

/// Sends every message with the same key to the same routee, spawning
/// routees on first use
pub struct Router<B: Bridge> {
    bridge: B,
    routees: HashMap<B::Key, Address>,
}

impl<B: Bridge> Router<B> {
    pub fn new(bridge: B) -> Self {
        Self {
            bridge,
            routees: HashMap::new(),
        }
    }

    fn forget(&mut self, who: Address) {
        self.routees.retain(|_, routee| *routee != who);
    }
}

#[async_trait]
impl<B: Bridge> Behavior for Router<B> {
    async fn receive(&mut self, ctx: &mut Context<'_>, msg: Message) -> ActorResult<()> {
        let msg = match msg.downcast::<B::Message>() {
            Ok(msg) => {
                let key = self.bridge.extract(&msg);
                let routee = match self.routees.get(&key) {
                    Some(routee) => *routee,
                    None => {
                        let routee = self.bridge.spawn_routee(ctx, &key, &msg);
                        ctx.log().debug(format!("Routee {} spawned for {:?}", routee, key));
                        self.routees.insert(key, routee);
                        routee
                    }
                };
                ctx.tell(routee, msg);
                return Ok(());
            }
            Err(msg) => msg,
        };

        if let Some(died) = msg.downcast_ref::<DiedAbnormally>() {
            self.forget(died.who);
        } else if let Some(exited) = msg.downcast_ref::<ExitedNormally>() {
            self.forget(exited.who);
        } else if !msg.is::<Start>() {
            ctx.log().warn(format!("Unexpected message {}", msg.message_type()));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "router"
    }
}
