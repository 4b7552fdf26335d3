//! Prelude module for convenient imports

pub use crate::{
    actor::{from_fn, Behavior},
    address::Address,
    call::{call, Call, CallAction},
    context::Context,
    error::{ActorError, ActorResult},
    message::{
        ActorMessage, DiedAbnormally, ExitValue, ExitedNormally, Message, Momento, Ready, Start, WatchState,
    },
    port::Port,
    supervisor::{Spec, SupervisionPolicy, Supervisor, SupervisorBehavior},
    system::{SpawnOptions, System},
};

pub use async_trait::async_trait;
pub use std::time::Duration;
pub use tracing::{debug, error, info, trace, warn};
