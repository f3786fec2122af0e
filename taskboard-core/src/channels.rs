use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;

use crate::events::BoardEvent;

pub type SubscriberId = u64;

struct Subscriber {
    user: String,
    tx: mpsc::UnboundedSender<BoardEvent>,
    channels: HashSet<String>,
}

#[derive(Default)]
struct Registry {
    subscribers: HashMap<SubscriberId, Subscriber>,
    /// channel (board id) -> joined subscribers
    channels: HashMap<String, HashSet<SubscriberId>>,
    next_id: SubscriberId,
}

/// Live board channels and their subscribers.
///
/// Owned by the server state. A subscriber exists from `connect` until its
/// `Connection` is dropped; membership is never persisted. Publishing happens
/// under the registry lock into per-subscriber FIFO queues, so every
/// subscriber of a channel sees that channel's events in publish order.
#[derive(Default)]
pub struct ChannelRegistry {
    inner: Mutex<Registry>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new subscriber acting as `user`. It receives nothing until
    /// it joins a channel.
    pub fn connect(self: &Arc<Self>, user: &str) -> Connection {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = {
            let mut registry = self.registry();
            registry.next_id += 1;
            let id = registry.next_id;
            registry.subscribers.insert(
                id,
                Subscriber {
                    user: user.to_string(),
                    tx,
                    channels: HashSet::new(),
                },
            );
            id
        };
        log::debug!(target: "taskboard.channels", "Subscriber {} connected as {}", id, user);
        Connection {
            id,
            registry: Arc::clone(self),
            rx,
        }
    }

    /// Join `channel`. Returns false when already joined or the subscriber is gone.
    pub fn join(&self, channel: &str, subscriber: SubscriberId) -> bool {
        let mut registry = self.registry();
        let Some(sub) = registry.subscribers.get_mut(&subscriber) else {
            return false;
        };
        if !sub.channels.insert(channel.to_string()) {
            return false;
        }
        registry
            .channels
            .entry(channel.to_string())
            .or_default()
            .insert(subscriber);
        log::info!(
            target: "taskboard.channels",
            "Subscriber {} joined board {}",
            subscriber,
            channel
        );
        true
    }

    /// Leave `channel`. Returns false when the subscriber was not joined.
    pub fn leave(&self, channel: &str, subscriber: SubscriberId) -> bool {
        let mut registry = self.registry();
        let was_joined = registry
            .subscribers
            .get_mut(&subscriber)
            .is_some_and(|sub| sub.channels.remove(channel));
        if was_joined {
            Self::detach(&mut registry, channel, subscriber);
            log::info!(
                target: "taskboard.channels",
                "Subscriber {} left board {}",
                subscriber,
                channel
            );
        }
        was_joined
    }

    /// Deliver `event` to every subscriber joined to `channel`, including the
    /// one whose request caused it. Returns how many queues accepted it.
    pub fn publish(&self, channel: &str, event: &BoardEvent) -> usize {
        let registry = self.registry();
        let Some(members) = registry.channels.get(channel) else {
            return 0;
        };
        let delivered = members
            .iter()
            .filter_map(|id| registry.subscribers.get(id))
            .filter(|sub| sub.tx.send(event.clone()).is_ok())
            .count();
        log::debug!(
            target: "taskboard.channels",
            "Published {} to board {} ({} subscribers)",
            event.kind(),
            channel,
            delivered
        );
        delivered
    }

    /// Detach every subscriber of `user` from `channel`. Their connections
    /// stay open but receive nothing more from it. Returns how many were
    /// detached.
    pub fn evict(&self, channel: &str, user: &str) -> usize {
        let mut registry = self.registry();
        let Some(members) = registry.channels.get(channel) else {
            return 0;
        };
        let evicted: Vec<SubscriberId> = members
            .iter()
            .copied()
            .filter(|id| registry.subscribers.get(id).is_some_and(|sub| sub.user == user))
            .collect();
        for id in &evicted {
            if let Some(sub) = registry.subscribers.get_mut(id) {
                sub.channels.remove(channel);
            }
            Self::detach(&mut registry, channel, *id);
        }
        if !evicted.is_empty() {
            log::info!(
                target: "taskboard.channels",
                "Evicted {} from board {} ({} subscribers)",
                user,
                channel,
                evicted.len()
            );
        }
        evicted.len()
    }

    /// Detach everyone from `channel`. Returns how many were joined.
    pub fn close_channel(&self, channel: &str) -> usize {
        let mut registry = self.registry();
        let Some(members) = registry.channels.remove(channel) else {
            return 0;
        };
        for id in &members {
            if let Some(sub) = registry.subscribers.get_mut(id) {
                sub.channels.remove(channel);
            }
        }
        log::info!(
            target: "taskboard.channels",
            "Closed board {} ({} subscribers)",
            channel,
            members.len()
        );
        members.len()
    }

    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.registry().channels.get(channel).map_or(0, HashSet::len)
    }

    pub fn is_joined(&self, channel: &str, subscriber: SubscriberId) -> bool {
        self.registry()
            .channels
            .get(channel)
            .is_some_and(|members| members.contains(&subscriber))
    }

    fn disconnect(&self, subscriber: SubscriberId) {
        let mut registry = self.registry();
        let Some(sub) = registry.subscribers.remove(&subscriber) else {
            return;
        };
        for channel in &sub.channels {
            Self::detach(&mut registry, channel, subscriber);
        }
        log::debug!(target: "taskboard.channels", "Subscriber {} disconnected", subscriber);
    }

    fn detach(registry: &mut Registry, channel: &str, subscriber: SubscriberId) {
        if let Some(members) = registry.channels.get_mut(channel) {
            members.remove(&subscriber);
            if members.is_empty() {
                registry.channels.remove(channel);
            }
        }
    }
}

/// A connected subscriber. Dropping it leaves every joined channel.
pub struct Connection {
    id: SubscriberId,
    registry: Arc<ChannelRegistry>,
    rx: mpsc::UnboundedReceiver<BoardEvent>,
}

impl Connection {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn join(&self, channel: &str) -> bool {
        self.registry.join(channel, self.id)
    }

    pub fn leave(&self, channel: &str) -> bool {
        self.registry.leave(channel, self.id)
    }

    /// Next event from any joined channel.
    pub async fn recv(&mut self) -> Option<BoardEvent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<BoardEvent> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.registry.disconnect(self.id);
    }
}
