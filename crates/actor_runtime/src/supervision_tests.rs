//! Supervision scenarios: one-for-all restarts, readiness, escalation

use crate::{
    actor::from_fn,
    address::Address,
    context::Context,
    error::ActorError,
    message::{DiedAbnormally, ExitValue, LifecycleEvent, Message, Momento, Ready, WatchState},
    port::Port,
    supervisor::{Spec, SupervisionPolicy, SupervisionPolicyBuilder, Supervisor, SupervisorBehavior},
    system::{SpawnOptions, System},
    testing::{await_message, init_test_tracing, CountIs, Counter, Crash, Increment, ReadCount},
};
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(2);

/// Supervises counters under the given ids
struct Counters {
    ids: Vec<&'static str>,
    policy: SupervisionPolicy,
}

impl Counters {
    fn new(ids: &[&'static str]) -> Self {
        Self {
            ids: ids.to_vec(),
            policy: SupervisionPolicy::default(),
        }
    }

    fn with_policy(mut self, policy: SupervisionPolicy) -> Self {
        self.policy = policy;
        self
    }
}

impl SupervisorBehavior for Counters {
    fn init(&mut self, _ctx: &mut Context<'_>) -> Spec {
        self.ids
            .iter()
            .fold(Spec::new(), |spec, id| spec.child(*id, Counter::default))
    }

    fn policy(&self) -> SupervisionPolicy {
        self.policy.clone()
    }
}

async fn watch_ready(port: &mut Port, supervisor: Address) {
    port.tell(
        supervisor,
        WatchState {
            observer: port.address(),
        },
    );
    await_message::<Ready>(port, WAIT).await.unwrap();
}

async fn lookup_all(system: &System, paths: &[&str]) -> Vec<Address> {
    let mut found = Vec::new();
    for path in paths {
        found.push(system.lookup(path).await.unwrap());
    }
    found
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_one_for_all_restart() {
    init_test_tracing();
    let system = System::new();
    let mut port = system.new_port();
    let supervisor = system.spawn(Supervisor::new(Counters::new(&["a", "b", "c"])));
    watch_ready(&mut port, supervisor).await;

    let before = lookup_all(&system, &["/a", "/b", "/c"]).await;
    assert_eq!(system.path_of(before[1]), "/b");
    let mut sibling = system.subscribe(before[0]).unwrap();

    system.tell(before[1], Crash);
    await_message::<Ready>(&mut port, WAIT).await.unwrap();

    let after = lookup_all(&system, &["/a", "/b", "/c"]).await;
    for (old, new) in before.iter().zip(&after) {
        assert_ne!(old, new);
        assert!(!system.is_alive(*old));
        assert!(system.is_alive(*new));
    }

    // Siblings are terminated, not crashed.
    let mut terminal = None;
    while let Some(event) = sibling.recv().await {
        if event.is_terminal() {
            terminal = Some(event);
        }
    }
    assert!(matches!(terminal, Some(LifecycleEvent::ExitedNormally { .. })));
    assert_eq!(system.metrics().snapshot().restarts, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_restarted_child_starts_from_scratch() {
    init_test_tracing();
    let system = System::new();
    let mut port = system.new_port();
    let supervisor = system.spawn(Supervisor::new(Counters::new(&["target"])));
    watch_ready(&mut port, supervisor).await;

    let target = system.lookup("/target").await.unwrap();
    system.tell(target, Increment);
    system.tell(target, Increment);
    assert_eq!(port.call(target, ReadCount).await.unwrap(), CountIs(2));

    system.tell(target, Crash);
    await_message::<Ready>(&mut port, WAIT).await.unwrap();

    let restarted = system.lookup("/target").await.unwrap();
    assert_ne!(restarted, target);
    assert_eq!(port.call(restarted, ReadCount).await.unwrap(), CountIs(0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_normal_child_exit_also_restarts() {
    struct Quitters;

    impl SupervisorBehavior for Quitters {
        fn init(&mut self, _ctx: &mut Context<'_>) -> Spec {
            Spec::new().child("q", || {
                from_fn("quitter", |ctx: &mut Context<'_>, msg: Message| {
                    if msg.is::<&str>() {
                        ctx.exit(ExitValue::empty());
                    }
                    Ok(())
                })
            })
        }
    }

    init_test_tracing();
    let system = System::new();
    let mut port = system.new_port();
    let supervisor = system.spawn(Supervisor::new(Quitters));
    watch_ready(&mut port, supervisor).await;

    let first = system.lookup("/q").await.unwrap();
    system.tell(first, "quit");
    await_message::<Ready>(&mut port, WAIT).await.unwrap();

    let second = system.lookup("/q").await.unwrap();
    assert_ne!(first, second);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_restart_intensity_escalates() {
    init_test_tracing();
    let system = System::new();
    let mut port = system.new_port();
    let policy = SupervisionPolicyBuilder::new()
        .max_restarts(1)
        .restart_window(Duration::from_secs(60))
        .build();
    let supervisor = system.spawn_with(
        Supervisor::new(Counters::new(&["a", "b"]).with_policy(policy)),
        SpawnOptions::new().monitored_by(port.address(), Momento::new("supervisor".to_string())),
    );
    watch_ready(&mut port, supervisor).await;

    let a = system.lookup("/a").await.unwrap();
    system.tell(a, Crash);
    await_message::<Ready>(&mut port, WAIT).await.unwrap();

    let a = system.lookup("/a").await.unwrap();
    let b = system.lookup("/b").await.unwrap();
    let mut b_events = system.subscribe(b).unwrap();
    system.tell(a, Crash);

    let notice = await_message::<DiedAbnormally>(&mut port, WAIT).await.unwrap();
    assert_eq!(notice.who, supervisor);
    assert!(notice.reason.contains("Restart intensity"), "reason: {}", notice.reason);
    assert_eq!(notice.momento.downcast_ref::<String>().map(String::as_str), Some("supervisor"));

    // The surviving sibling is taken down with the supervisor.
    while b_events.recv().await.is_some() {}
    assert!(!system.is_alive(b));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_duplicate_child_id_is_fatal() {
    init_test_tracing();
    let system = System::new();
    let mut port = system.new_port();
    let supervisor = system.spawn_with(
        Supervisor::new(Counters::new(&["twin", "twin"])),
        SpawnOptions::new().monitored_by(port.address(), Momento::empty()),
    );

    let notice = port.receive_as::<DiedAbnormally>(WAIT).await.unwrap();
    assert_eq!(notice.who, supervisor);
    assert!(notice.reason.contains("Duplicate child id"), "reason: {}", notice.reason);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_unexpected_message_is_ignored() {
    init_test_tracing();
    let system = System::new();
    let mut port = system.new_port();
    let supervisor = system.spawn(Supervisor::new(Counters::new(&["only"])));

    system.tell(supervisor, 5u32);
    watch_ready(&mut port, supervisor).await;
    assert!(system.is_alive(supervisor));
    assert!(matches!(
        system.lookup("/missing").await,
        Err(ActorError::NameNotFound { .. })
    ));
}
