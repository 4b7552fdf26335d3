//! Flat name directory actor
//!
//! Unlike the per-actor naming tables, the directory is an ordinary actor
//! any part of the system can register with and query. [`spawn_directory`]
//! starts it together with a read-only proxy so that query rights can be
//! handed out without control rights.

use crate::{
    actor::Behavior,
    address::Address,
    call::{self, Call, CallAction},
    context::Context,
    error::ActorResult,
    message::{Message, Start},
    port::Port,
    system::SpawnOptions,
};
use async_trait::async_trait;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Register {
    pub name: String,
    pub who: Address,
}

/// Remove `name`, only if it still points at `who`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unregister {
    pub name: String,
    pub who: Address,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lookup {
    pub name: String,
    pub reply_to: Address,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupResult {
    pub found: bool,
    pub name: String,
    pub who: Option<Address>,
}

/// Call action answering a lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FindName {
    pub name: String,
}

impl CallAction for FindName {
    type State = NameDirectory;
    type Output = LookupResult;

    fn invoke(self, _ctx: &Context<'_>, state: &mut NameDirectory) -> LookupResult {
        state.lookup(self.name)
    }
}

#[derive(Debug, Default)]
pub struct NameDirectory {
    names: HashMap<String, Address>,
}

impl NameDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    fn lookup(&self, name: String) -> LookupResult {
        let who = self.names.get(&name).copied();
        LookupResult {
            found: who.is_some(),
            name,
            who,
        }
    }
}

#[async_trait]
impl Behavior for NameDirectory {
    async fn receive(&mut self, ctx: &mut Context<'_>, msg: Message) -> ActorResult<()> {
        let msg = match msg.downcast::<Register>() {
            Ok(Register { name, who }) => {
                if let Some(previous) = self.names.insert(name.clone(), who) {
                    ctx.log().warn(format!("Replacing {} -> {} with {}", name, previous, who));
                }
                return Ok(());
            }
            Err(msg) => msg,
        };
        let msg = match msg.downcast::<Unregister>() {
            Ok(Unregister { name, who }) => {
                match self.names.get(&name) {
                    Some(current) if *current == who => {
                        self.names.remove(&name);
                    }
                    Some(current) => ctx.log().warn(format!(
                        "Refusing to unregister {}: held by {}, not {}",
                        name, current, who
                    )),
                    None => ctx.log().warn(format!("Unregister of unknown name {}", name)),
                }
                return Ok(());
            }
            Err(msg) => msg,
        };
        let msg = match msg.downcast::<Lookup>() {
            Ok(Lookup { name, reply_to }) => {
                ctx.tell(reply_to, self.lookup(name));
                return Ok(());
            }
            Err(msg) => msg,
        };
        let msg = match msg.downcast::<Call<FindName>>() {
            Ok(call) => {
                call.perform(ctx, self);
                return Ok(());
            }
            Err(msg) => msg,
        };

        if !msg.is::<Start>() {
            ctx.log().warn(format!("Unexpected message {}", msg.message_type()));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "directory"
    }
}

/// Forwards queries to the directory and refuses changes
struct LookupProxy {
    directory: Address,
}

#[async_trait]
impl Behavior for LookupProxy {
    async fn receive(&mut self, ctx: &mut Context<'_>, msg: Message) -> ActorResult<()> {
        let msg = match msg.downcast::<Lookup>() {
            Ok(lookup) => {
                ctx.tell(self.directory, lookup);
                return Ok(());
            }
            Err(msg) => msg,
        };
        let msg = match msg.downcast::<Call<FindName>>() {
            Ok(call) => {
                ctx.tell(self.directory, call);
                return Ok(());
            }
            Err(msg) => msg,
        };

        if !msg.is::<Start>() {
            ctx.log().warn(format!("Query proxy ignoring {}", msg.message_type()));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "directory-proxy"
    }
}

/// Addresses of a running directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectoryHandles {
    /// Accepts registrations and queries
    pub control: Address,
    /// Accepts queries only
    pub query: Address,
}

/// Spawn a directory and its query proxy as children of the calling actor,
/// registered as `directory` and `directory-query`
pub fn spawn_directory(ctx: &mut Context<'_>) -> DirectoryHandles {
    let control = ctx.spawn_with(NameDirectory::new(), SpawnOptions::new().register_as("directory"));
    let query = ctx.spawn_with(
        LookupProxy { directory: control },
        SpawnOptions::new().register_as("directory-query"),
    );
    DirectoryHandles { control, query }
}

/// Client holding registration rights
#[derive(Debug, Clone, Copy)]
pub struct ControllingClient {
    pub control: Address,
}

impl ControllingClient {
    pub fn register(&self, ctx: &Context<'_>, name: impl Into<String>, who: Address) {
        ctx.tell(
            self.control,
            Register {
                name: name.into(),
                who,
            },
        );
    }

    pub fn unregister(&self, ctx: &Context<'_>, name: impl Into<String>, who: Address) {
        ctx.tell(
            self.control,
            Unregister {
                name: name.into(),
                who,
            },
        );
    }

    pub fn query(&self) -> DirectoryClient {
        DirectoryClient {
            query: self.control,
        }
    }

    pub fn named_ref(&self, name: impl Into<String>) -> NamedRef {
        self.query().named_ref(name)
    }
}

/// Client holding query rights only
#[derive(Debug, Clone, Copy)]
pub struct DirectoryClient {
    pub query: Address,
}

impl DirectoryClient {
    /// Resolve `name`. A missing name is fatal to the calling actor.
    pub async fn find(&self, ctx: &Context<'_>, name: &str) -> ActorResult<Address> {
        let result = call::call(
            ctx,
            self.query,
            FindName {
                name: name.to_string(),
            },
        )
        .await?;

        match result.who {
            Some(who) if result.found => Ok(who),
            _ => Err(ctx.log().fatal(format!("Name {} is not registered", name))),
        }
    }

    pub fn named_ref(&self, name: impl Into<String>) -> NamedRef {
        NamedRef {
            directory: self.query,
            name: name.into(),
        }
    }
}

/// A directory name resolved at the time of use, so it follows
/// re-registrations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedRef {
    pub directory: Address,
    pub name: String,
}

impl NamedRef {
    /// Resolve from inside an actor. A missing name is fatal to it.
    pub async fn resolve(&self, ctx: &Context<'_>) -> ActorResult<Address> {
        DirectoryClient {
            query: self.directory,
        }
        .find(ctx, &self.name)
        .await
    }

    /// Resolve from a port; `None` when the name is not registered
    pub async fn resolve_from(&self, port: &Port) -> ActorResult<Option<Address>> {
        let result = port
            .call(
                self.directory,
                FindName {
                    name: self.name.clone(),
                },
            )
            .await?;
        Ok(result.who)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        message::{DiedAbnormally, Momento},
        system::System,
    };
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(2);

    /// Starts a directory, reports its handles and stays idle
    struct Host {
        report_to: Address,
    }

    #[async_trait]
    impl Behavior for Host {
        async fn receive(&mut self, ctx: &mut Context<'_>, msg: Message) -> ActorResult<()> {
            if msg.is::<Start>() {
                let handles = spawn_directory(ctx);
                ctx.tell(self.report_to, handles);
            }
            Ok(())
        }
    }

    /// Registers itself, resolves the name twice, unregisters and resolves
    /// once more
    struct Tenant {
        report_to: Address,
    }

    #[async_trait]
    impl Behavior for Tenant {
        async fn receive(&mut self, ctx: &mut Context<'_>, msg: Message) -> ActorResult<()> {
            if !msg.is::<Start>() {
                return Ok(());
            }
            let handles = spawn_directory(ctx);
            ctx.tell(self.report_to, handles);

            let control = ControllingClient {
                control: handles.control,
            };
            let query = DirectoryClient { query: handles.query };
            let me = ctx.myself();

            control.register(ctx, "tenant", me);
            let found = query.find(ctx, "tenant").await?;
            ctx.tell(self.report_to, found);
            let resolved = control.named_ref("tenant").resolve(ctx).await?;
            ctx.tell(self.report_to, resolved);

            control.unregister(ctx, "tenant", me);
            query.find(ctx, "tenant").await?;
            ctx.tell(self.report_to, "unreachable");
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_clients_and_fatal_miss() {
        let system = System::new();
        let mut port = system.new_port();
        let tenant = system.spawn_with(
            Tenant {
                report_to: port.address(),
            },
            SpawnOptions::new().monitored_by(port.address(), Momento::empty()),
        );

        let handles = port.receive_as::<DirectoryHandles>(WAIT).await.unwrap();
        assert_eq!(port.receive_as::<Address>(WAIT).await.unwrap(), tenant);
        assert_eq!(port.receive_as::<Address>(WAIT).await.unwrap(), tenant);

        let notice = port.receive_as::<DiedAbnormally>(WAIT).await.unwrap();
        assert_eq!(notice.who, tenant);
        assert!(notice.reason.contains("tenant is not registered"), "reason: {}", notice.reason);

        // The directory outlives the actor that started it.
        assert_eq!(system.path_of(handles.control), "/directory");
        assert_eq!(system.path_of(handles.query), "/directory-query");
        assert!(system.is_alive(handles.control));
    }

    #[tokio::test]
    async fn test_query_proxy_forwards_queries_only() {
        let system = System::new();
        let mut port = system.new_port();
        system.spawn(Host {
            report_to: port.address(),
        });
        let handles = port.receive_as::<DirectoryHandles>(WAIT).await.unwrap();
        assert_eq!(system.lookup("/directory-query").await.unwrap(), handles.query);

        let worker = system.new_port();
        port.tell(
            handles.control,
            Register {
                name: "worker".to_string(),
                who: worker.address(),
            },
        );
        port.tell(
            handles.query,
            Register {
                name: "intruder".to_string(),
                who: port.address(),
            },
        );
        port.tell(
            handles.query,
            Unregister {
                name: "worker".to_string(),
                who: worker.address(),
            },
        );

        // Both changes sent to the proxy were refused.
        let worker_ref = DirectoryClient { query: handles.query }.named_ref("worker");
        assert_eq!(worker_ref.resolve_from(&port).await.unwrap(), Some(worker.address()));
        let intruder = port
            .call(handles.query, FindName { name: "intruder".to_string() })
            .await
            .unwrap();
        assert!(!intruder.found);

        port.tell(
            handles.query,
            Lookup {
                name: "worker".to_string(),
                reply_to: port.address(),
            },
        );
        let result = port.receive_as::<LookupResult>(WAIT).await.unwrap();
        assert_eq!(result.who, Some(worker.address()));
    }

    #[tokio::test]
    async fn test_register_lookup_unregister() {
        let system = System::new();
        let directory = system.spawn(NameDirectory::new());
        let mut port = system.new_port();
        let worker = system.new_port();
        let timeout = Duration::from_millis(500);

        port.tell(
            directory,
            Register {
                name: "worker".to_string(),
                who: worker.address(),
            },
        );
        port.tell(
            directory,
            Lookup {
                name: "worker".to_string(),
                reply_to: port.address(),
            },
        );
        let result = port.receive_as::<LookupResult>(timeout).await.unwrap();
        assert!(result.found);
        assert_eq!(result.who, Some(worker.address()));

        // Unregister by someone else is refused.
        port.tell(
            directory,
            Unregister {
                name: "worker".to_string(),
                who: port.address(),
            },
        );
        let result = port.call(directory, FindName { name: "worker".to_string() }).await.unwrap();
        assert_eq!(result.who, Some(worker.address()));

        port.tell(
            directory,
            Unregister {
                name: "worker".to_string(),
                who: worker.address(),
            },
        );
        let result = port.call(directory, FindName { name: "worker".to_string() }).await.unwrap();
        assert!(!result.found);
        assert_eq!(result.who, None);
    }
}
