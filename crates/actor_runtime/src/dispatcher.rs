//! Lifecycle dispatcher
//!
//! A small publish/subscribe broadcaster. Listeners may come and go while a
//! broadcast is in flight: `broadcast` clones the listener list under the
//! read lock and sends outside it, so registration never waits on delivery.

use parking_lot::RwLock;
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc, Weak,
};
use tokio::sync::mpsc;

struct DispatcherInner<T> {
    next_id: AtomicU64,
    closed: AtomicBool,
    listeners: RwLock<Vec<(u64, mpsc::UnboundedSender<T>)>>,
}

/// Broadcaster of cloneable events to any number of subscriptions
pub struct LifecycleDispatcher<T> {
    inner: Arc<DispatcherInner<T>>,
}

impl<T> Clone for LifecycleDispatcher<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> LifecycleDispatcher<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                next_id: AtomicU64::new(0),
                closed: AtomicBool::new(false),
                listeners: RwLock::new(Vec::new()),
            }),
        }
    }

    /// Register a listener. Subscribing to a closed dispatcher yields a
    /// subscription that is already finished.
    pub fn listen(&self) -> Subscription<T> {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();

        let mut listeners = self.inner.listeners.write();
        if !self.inner.closed.load(Ordering::Acquire) {
            listeners.push((id, tx));
        }
        drop(listeners);

        Subscription {
            id,
            rx,
            dispatcher: Arc::downgrade(&self.inner),
        }
    }

    /// Send `event` to every listener active at call time. Returns the
    /// number of listeners reached.
    pub fn broadcast(&self, event: T) -> usize {
        let snapshot: Vec<mpsc::UnboundedSender<T>> = self
            .inner
            .listeners
            .read()
            .iter()
            .map(|(_, tx)| tx.clone())
            .collect();

        snapshot
            .into_iter()
            .filter(|tx| tx.send(event.clone()).is_ok())
            .count()
    }

    /// Drop every listener. Pending events stay readable, then each
    /// subscription ends.
    pub fn close(&self) {
        let mut listeners = self.inner.listeners.write();
        self.inner.closed.store(true, Ordering::Release);
        listeners.clear();
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.read().len()
    }
}

impl<T: Clone + Send + 'static> Default for LifecycleDispatcher<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A registered listener. Dropping it deregisters.
pub struct Subscription<T> {
    id: u64,
    rx: mpsc::UnboundedReceiver<T>,
    dispatcher: Weak<DispatcherInner<T>>,
}

impl<T> Subscription<T> {
    /// Next event, or `None` once the dispatcher is closed and drained
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if let Some(inner) = self.dispatcher.upgrade() {
            inner.listeners.write().retain(|(id, _)| *id != self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_broadcast_reaches_all_listeners() {
        let dispatcher = LifecycleDispatcher::<u32>::new();
        let mut a = dispatcher.listen();
        let mut b = dispatcher.listen();

        assert_eq!(dispatcher.broadcast(7), 2);
        assert_eq!(a.recv().await, Some(7));
        assert_eq!(b.recv().await, Some(7));
    }

    #[tokio::test]
    async fn test_dropped_subscription_deregisters() {
        let dispatcher = LifecycleDispatcher::<u32>::new();
        let a = dispatcher.listen();
        let mut b = dispatcher.listen();
        assert_eq!(dispatcher.listener_count(), 2);

        drop(a);
        assert_eq!(dispatcher.listener_count(), 1);
        assert_eq!(dispatcher.broadcast(1), 1);
        assert_eq!(b.recv().await, Some(1));
    }

    #[tokio::test]
    async fn test_close_ends_subscriptions() {
        let dispatcher = LifecycleDispatcher::<&'static str>::new();
        let mut sub = dispatcher.listen();

        dispatcher.broadcast("last");
        dispatcher.close();

        assert_eq!(sub.recv().await, Some("last"));
        assert_eq!(sub.recv().await, None);

        let mut late = dispatcher.listen();
        assert_eq!(late.recv().await, None);
        assert_eq!(dispatcher.broadcast("ignored"), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_listen_during_broadcast() {
        let dispatcher = LifecycleDispatcher::<u64>::new();
        let publisher = {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move {
                for i in 0..1_000 {
                    dispatcher.broadcast(i);
                    tokio::task::yield_now().await;
                }
            })
        };

        let mut subs = Vec::new();
        for _ in 0..50 {
            subs.push(dispatcher.listen());
            tokio::task::yield_now().await;
        }
        publisher.await.unwrap();

        // Each subscription sees a gap-free suffix of the event stream.
        for mut sub in subs {
            let mut last: Option<u64> = None;
            while let Some(event) = sub.try_recv() {
                if let Some(prev) = last {
                    assert_eq!(event, prev + 1);
                }
                last = Some(event);
            }
        }
    }
}
