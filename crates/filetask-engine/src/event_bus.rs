//! In-process publish/subscribe keyed by task id.
//!
//! Every subscription owns an unbounded channel drained by its own delivery
//! task, so [`EventBus::publish`] never waits on a handler. A handler that
//! returns an error or panics is logged and keeps receiving later events.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use filetask_store::TaskId;
use futures::FutureExt;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::event::TaskEvent;

/// Receives events for the tasks it is subscribed to.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &TaskEvent) -> anyhow::Result<()>;
}

/// Handle returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscriber {
    id: SubscriptionId,
    tx: mpsc::UnboundedSender<TaskEvent>,
}

/// Explicitly owned event bus, shared by reference with the execution queue.
#[derive(Default)]
pub struct EventBus {
    subscribers: DashMap<TaskId, Vec<Subscriber>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for events of `task_id`.
    ///
    /// Must be called from within a tokio runtime; the delivery task is
    /// spawned immediately.
    pub fn subscribe(&self, task_id: TaskId, handler: Arc<dyn EventHandler>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(deliver(task_id, id, rx, handler));

        self.subscribers
            .entry(task_id)
            .or_default()
            .push(Subscriber { id, tx });
        debug!(task_id, subscription = id.0, "Subscribed to task events");
        id
    }

    /// Remove a subscription. Returns false if it was not registered.
    ///
    /// Events already queued for the handler are still delivered.
    pub fn unsubscribe(&self, task_id: TaskId, id: SubscriptionId) -> bool {
        let mut removed = false;
        if let Some(mut subs) = self.subscribers.get_mut(&task_id) {
            let before = subs.len();
            subs.retain(|s| s.id != id);
            removed = subs.len() != before;
        }
        self.subscribers.remove_if(&task_id, |_, subs| subs.is_empty());
        if removed {
            debug!(task_id, subscription = id.0, "Unsubscribed from task events");
        }
        removed
    }

    /// Queue `event` for every subscriber of its task. Never blocks.
    pub fn publish(&self, event: TaskEvent) {
        let task_id = event.task_id();
        let Some(subs) = self.subscribers.get(&task_id) else {
            return;
        };
        for sub in subs.iter() {
            // Closed channels belong to handlers that are being torn down.
            let _ = sub.tx.send(event.clone());
        }
    }

    pub fn subscriber_count(&self, task_id: TaskId) -> usize {
        self.subscribers
            .get(&task_id)
            .map(|subs| subs.len())
            .unwrap_or(0)
    }

    /// Drop every subscription.
    pub fn clear(&self) {
        let count: usize = self.subscribers.iter().map(|e| e.value().len()).sum();
        self.subscribers.clear();
        debug!(count, "Cleared event subscriptions");
    }
}

async fn deliver(
    task_id: TaskId,
    id: SubscriptionId,
    mut rx: mpsc::UnboundedReceiver<TaskEvent>,
    handler: Arc<dyn EventHandler>,
) {
    while let Some(event) = rx.recv().await {
        match AssertUnwindSafe(handler.handle(&event)).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(task_id, subscription = id.0, error = %e, "Event handler failed");
            }
            Err(_) => {
                warn!(task_id, subscription = id.0, "Event handler panicked");
            }
        }
    }
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(TaskEvent) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    async fn handle(&self, event: &TaskEvent) -> anyhow::Result<()> {
        (self.0)(event.clone()).await
    }
}

/// Adapt an async closure into an [`EventHandler`].
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn EventHandler>
where
    F: Fn(TaskEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

/// Forwards events into an mpsc channel for streaming consumers.
pub struct ChannelHandler {
    tx: mpsc::UnboundedSender<TaskEvent>,
}

impl ChannelHandler {
    /// Create a handler and the receiver it feeds.
    pub fn channel() -> (Arc<Self>, mpsc::UnboundedReceiver<TaskEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

#[async_trait]
impl EventHandler for ChannelHandler {
    async fn handle(&self, event: &TaskEvent) -> anyhow::Result<()> {
        self.tx
            .send(event.clone())
            .map_err(|_| anyhow::anyhow!("event receiver dropped"))
    }
}

#[cfg(test)]
#[path = "event_bus_tests.rs"]
mod tests;
