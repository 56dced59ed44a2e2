// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Best-effort fan-out of named events to a changing set of subscribers.
//!
//! One dispatcher task owns the subscriber set. Subscribing, leaving and
//! publishing are all commands on a single channel, so they take effect in
//! the order they were issued. Each subscriber has a bounded queue; when it
//! is full the event is dropped for that subscriber only and the publisher
//! never waits.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::{debug, info};
use tokio::sync::{mpsc, oneshot};

/// A named event as delivered to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub struct Event<T> {
    pub name: String,
    pub value: T,
}

impl<T> Event<T> {
    /// Create a new event.
    pub fn new(name: impl Into<String>, value: T) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// Configuration for a broadcaster.
#[derive(Debug, Clone)]
pub struct BroadcastConfig {
    /// Events buffered per subscriber before new ones are dropped.
    pub queue_size: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self { queue_size: 16 }
    }
}

/// The new subscriber, as seen by a connect hook.
#[derive(Debug)]
pub struct Subscriber<'a, T> {
    id: u64,
    tx: &'a mpsc::Sender<Event<T>>,
}

impl<T> Subscriber<'_, T> {
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Queue an event for this subscriber only. Returns `false` if it was dropped.
    pub fn send(&self, name: impl Into<String>, value: T) -> bool {
        self.tx.try_send(Event::new(name, value)).is_ok()
    }
}

type ConnectHook<T> = Box<dyn Fn(&Subscriber<'_, T>) + Send + Sync>;

enum Command<T> {
    Join {
        id: u64,
        tx: mpsc::Sender<Event<T>>,
        dropped: Arc<AtomicU64>,
    },
    Leave(u64),
    Publish(Event<T>),
    Count(oneshot::Sender<usize>),
}

/// Handle for publishing events and adding subscribers.
///
/// Cloning is cheap; all clones feed the same dispatcher. Once every handle
/// is gone the dispatcher exits and every subscription's queue closes.
pub struct Broadcaster<T> {
    commands: mpsc::UnboundedSender<Command<T>>,
    next_id: Arc<AtomicU64>,
    queue_size: usize,
}

impl<T> Clone for Broadcaster<T> {
    fn clone(&self) -> Self {
        Self {
            commands: self.commands.clone(),
            next_id: Arc::clone(&self.next_id),
            queue_size: self.queue_size,
        }
    }
}

impl<T> std::fmt::Debug for Broadcaster<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broadcaster")
            .field("queue_size", &self.queue_size)
            .finish_non_exhaustive()
    }
}

impl<T: Clone + Send + 'static> Broadcaster<T> {
    /// Spawn a new dispatcher on the current tokio runtime.
    #[must_use]
    pub fn spawn(config: BroadcastConfig) -> Self {
        Self::start(config, None)
    }

    /// Like [`spawn`](Self::spawn), running `hook` against every new
    /// subscriber before any published event reaches it.
    #[must_use]
    pub fn with_connect_hook<F>(config: BroadcastConfig, hook: F) -> Self
    where
        F: Fn(&Subscriber<'_, T>) + Send + Sync + 'static,
    {
        Self::start(config, Some(Box::new(hook)))
    }

    fn start(config: BroadcastConfig, hook: Option<ConnectHook<T>>) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        tokio::spawn(dispatch(command_rx, hook));

        Self {
            commands,
            next_id: Arc::new(AtomicU64::new(1)),
            queue_size: config.queue_size.max(1),
        }
    }

    /// Register a new subscriber.
    #[must_use]
    pub fn subscribe(&self) -> Subscription<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.queue_size);
        let dropped = Arc::new(AtomicU64::new(0));

        let _ = self.commands.send(Command::Join {
            id,
            tx,
            dropped: Arc::clone(&dropped),
        });

        Subscription {
            id,
            rx,
            dropped,
            commands: self.commands.downgrade(),
        }
    }

    /// Remove a subscriber, close its queue and discard what it had buffered.
    pub fn unsubscribe(&self, subscription: Subscription<T>) {
        drop(subscription);
    }

    /// Offer an event to every current subscriber without waiting.
    pub fn publish(&self, name: impl Into<String>, value: T) {
        let _ = self.commands.send(Command::Publish(Event::new(name, value)));
    }

    /// Number of subscribers once every earlier command has been handled.
    pub async fn subscriber_count(&self) -> usize {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Count(tx)).is_err() {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

struct Entry<T> {
    tx: mpsc::Sender<Event<T>>,
    dropped: Arc<AtomicU64>,
}

async fn dispatch<T: Clone>(
    mut commands: mpsc::UnboundedReceiver<Command<T>>,
    hook: Option<ConnectHook<T>>,
) {
    let mut subscribers: HashMap<u64, Entry<T>> = HashMap::new();

    while let Some(command) = commands.recv().await {
        match command {
            Command::Join { id, tx, dropped } => {
                if let Some(hook) = &hook {
                    hook(&Subscriber { id, tx: &tx });
                }
                subscribers.insert(id, Entry { tx, dropped });
                info!("Subscriber {} joined, {} registered", id, subscribers.len());
            }
            Command::Leave(id) => {
                if let Some(entry) = subscribers.remove(&id) {
                    info!(
                        "Subscriber {} left after {} dropped events, {} registered",
                        id,
                        entry.dropped.load(Ordering::Relaxed),
                        subscribers.len()
                    );
                }
            }
            Command::Publish(event) => {
                subscribers.retain(|id, entry| match entry.tx.try_send(event.clone()) {
                    Ok(()) => true,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        entry.dropped.fetch_add(1, Ordering::Relaxed);
                        true
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        debug!("Subscriber {} closed its queue", id);
                        false
                    }
                });
            }
            Command::Count(reply) => {
                let _ = reply.send(subscribers.len());
            }
        }
    }

    debug!("Broadcaster dispatcher finished");
}

/// One subscriber's queue. Dropping it unsubscribes.
pub struct Subscription<T> {
    id: u64,
    rx: mpsc::Receiver<Event<T>>,
    dropped: Arc<AtomicU64>,
    commands: mpsc::WeakUnboundedSender<Command<T>>,
}

impl<T> std::fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("dropped", &self.dropped())
            .finish_non_exhaustive()
    }
}

impl<T> Subscription<T> {
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Events this subscriber missed because its queue was full.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Wait for the next event. `None` once every [`Broadcaster`] handle is
    /// gone and the buffered events have been read.
    pub async fn recv(&mut self) -> Option<Event<T>> {
        self.rx.recv().await
    }

    /// Next buffered event, if any.
    pub fn try_recv(&mut self) -> Option<Event<T>> {
        self.rx.try_recv().ok()
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if let Some(commands) = self.commands.upgrade() {
            let _ = commands.send(Command::Leave(self.id));
        }
        self.rx.close();
        while self.rx.try_recv().is_ok() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(queue_size: usize) -> BroadcastConfig {
        BroadcastConfig { queue_size }
    }

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let broadcaster = Broadcaster::<u32>::spawn(BroadcastConfig::default());

        broadcaster.publish("scan", 1);
        broadcaster.publish("scan", 2);

        assert_eq!(broadcaster.subscriber_count().await, 0);
    }

    #[tokio::test]
    async fn test_every_subscriber_receives() {
        let broadcaster = Broadcaster::spawn(config(4));
        let mut first = broadcaster.subscribe();
        let mut second = broadcaster.subscribe();

        broadcaster.publish("scan", 7);

        assert_eq!(first.recv().await, Some(Event::new("scan", 7)));
        assert_eq!(second.recv().await, Some(Event::new("scan", 7)));
        assert_eq!(broadcaster.subscriber_count().await, 2);
    }

    #[tokio::test]
    async fn test_slow_subscriber_only_hurts_itself() {
        let broadcaster = Broadcaster::spawn(config(2));
        let mut slow = broadcaster.subscribe();
        let mut fast = broadcaster.subscribe();

        for i in 0..5 {
            broadcaster.publish("scan", i);
            assert_eq!(fast.recv().await.map(|e| e.value), Some(i));
        }
        broadcaster.subscriber_count().await;

        assert_eq!(slow.try_recv().map(|e| e.value), Some(0));
        assert_eq!(slow.try_recv().map(|e| e.value), Some(1));
        assert!(slow.try_recv().is_none());
        assert_eq!(slow.dropped(), 3);
        assert_eq!(fast.dropped(), 0);
    }

    #[tokio::test]
    async fn test_subscription_ends_with_broadcaster() {
        let broadcaster = Broadcaster::spawn(config(4));
        let mut subscription = broadcaster.subscribe();
        broadcaster.publish("scan", 1);
        drop(broadcaster);

        assert_eq!(subscription.recv().await, Some(Event::new("scan", 1)));
        assert_eq!(subscription.recv().await, None);
    }

    #[tokio::test]
    async fn test_connect_hook_sends_initial_snapshot() {
        let broadcaster = Broadcaster::with_connect_hook(config(4), |subscriber| {
            subscriber.send("init", vec![1, 2, 3]);
        });

        let mut subscription = broadcaster.subscribe();
        broadcaster.publish("scan", vec![4]);

        assert_eq!(subscription.recv().await, Some(Event::new("init", vec![1, 2, 3])));
        assert_eq!(subscription.recv().await, Some(Event::new("scan", vec![4])));
    }

    #[tokio::test]
    async fn test_unsubscribe_removes_subscriber() {
        let broadcaster = Broadcaster::spawn(config(4));
        let first = broadcaster.subscribe();
        let mut second = broadcaster.subscribe();
        assert_eq!(broadcaster.subscriber_count().await, 2);

        broadcaster.publish("scan", 1);
        broadcaster.unsubscribe(first);
        assert_eq!(broadcaster.subscriber_count().await, 1);

        broadcaster.publish("scan", 2);
        assert_eq!(second.recv().await.map(|e| e.value), Some(1));
        assert_eq!(second.recv().await.map(|e| e.value), Some(2));
    }

    #[tokio::test]
    async fn test_dropping_subscription_unsubscribes() {
        let broadcaster = Broadcaster::<()>::spawn(config(1));
        {
            let _subscription = broadcaster.subscribe();
            assert_eq!(broadcaster.subscriber_count().await, 1);
        }
        assert_eq!(broadcaster.subscriber_count().await, 0);
    }
}
