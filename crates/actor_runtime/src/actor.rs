//! Behavior trait and closure-backed behaviors

use crate::{context::Context, error::ActorResult, message::Message};
use async_trait::async_trait;

/// The logic of an actor.
///
/// `receive` is called once per message, never concurrently. Returning an
/// error, panicking or calling `ctx.log().fatal(..)` stops the actor and
/// sends `DiedAbnormally` to everything monitoring it.
#[async_trait]
pub trait Behavior: Send + 'static {
    async fn receive(&mut self, ctx: &mut Context<'_>, msg: Message) -> ActorResult<()>;

    /// Name used in logs and spans
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

#[async_trait]
impl Behavior for Box<dyn Behavior> {
    async fn receive(&mut self, ctx: &mut Context<'_>, msg: Message) -> ActorResult<()> {
        (**self).receive(ctx, msg).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Behavior backed by a closure
pub struct FnBehavior<F> {
    name: String,
    handler: F,
}

/// Turn a closure into a behavior
pub fn from_fn<F>(name: impl Into<String>, handler: F) -> FnBehavior<F>
where
    F: FnMut(&mut Context<'_>, Message) -> ActorResult<()> + Send + 'static,
{
    FnBehavior {
        name: name.into(),
        handler,
    }
}

#[async_trait]
impl<F> Behavior for FnBehavior<F>
where
    F: FnMut(&mut Context<'_>, Message) -> ActorResult<()> + Send + 'static,
{
    async fn receive(&mut self, ctx: &mut Context<'_>, msg: Message) -> ActorResult<()> {
        (self.handler)(ctx, msg)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
