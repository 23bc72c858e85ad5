use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Weak;

use bytes::Bytes;
use crossbeam_channel::unbounded;
use crossbeam_channel::Receiver;
use crossbeam_channel::Sender;
use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::debug;
use tracing::trace;

use super::KeyspaceOp;
use super::StoreEvent;
use super::Topic;

#[derive(Debug)]
struct Subscriber {
    id: u64,
    conn: u64,
    sender: Sender<StoreEvent>,
}

#[derive(Debug)]
struct KeyspaceSubscriber {
    prefix: String,
    inner: Subscriber,
}

/// In-process fan-out of channel messages and keyspace notifications.
///
/// Receivers are unbounded so a publisher never blocks on a slow reader.
#[derive(Debug, Default)]
pub struct PubSubHub {
    /// Subscribers grouped by channel name
    channels: DashMap<String, Vec<Subscriber>>,
    /// Prefix subscribers, matched linearly per notification
    keyspace: RwLock<Vec<KeyspaceSubscriber>>,
    next_id: AtomicU64,
    next_conn: AtomicU64,
}

impl PubSubHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Allocates an id that groups the subscriptions of one store handle.
    pub fn register_connection(&self) -> u64 {
        self.next_conn.fetch_add(1, Ordering::Relaxed)
    }

    pub fn subscribe(
        self: &Arc<Self>,
        conn: u64,
        topic: Topic,
    ) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = unbounded();
        let inner = Subscriber { id, conn, sender };

        match &topic {
            Topic::Channel(name) => {
                self.channels.entry(name.clone()).or_default().push(inner);
            }
            Topic::Keyspace(prefix) => {
                self.keyspace.write().push(KeyspaceSubscriber {
                    prefix: prefix.clone(),
                    inner,
                });
            }
        }
        debug!(subscription_id = id, conn, ?topic, "Subscribed");

        Subscription {
            id,
            topic,
            receiver,
            hub: Arc::downgrade(self),
        }
    }

    /// Returns the number of subscribers the message reached.
    pub fn publish(
        &self,
        channel: &str,
        payload: Bytes,
    ) -> usize {
        let Some(mut subscribers) = self.channels.get_mut(channel) else {
            trace!(channel, "Published with no subscribers");
            return 0;
        };

        let mut delivered = 0;
        subscribers.retain(|s| {
            let event = StoreEvent::Message {
                channel: channel.to_string(),
                payload: payload.clone(),
            };
            let alive = s.sender.send(event).is_ok();
            delivered += usize::from(alive);
            alive
        });
        trace!(channel, delivered, "Published");
        delivered
    }

    pub fn notify_keyspace(
        &self,
        key: &str,
        op: KeyspaceOp,
    ) {
        let subscribers = self.keyspace.read();
        for s in subscribers.iter().filter(|s| key.starts_with(&s.prefix)) {
            let _ = s.inner.sender.send(StoreEvent::Keyspace {
                key: key.to_string(),
                op,
            });
        }
    }

    /// Drops every subscriber opened through `conn`; their receivers observe
    /// a disconnect.
    pub fn drop_connection(
        &self,
        conn: u64,
    ) {
        self.channels.retain(|_, subscribers| {
            subscribers.retain(|s| s.conn != conn);
            !subscribers.is_empty()
        });
        self.keyspace.write().retain(|s| s.inner.conn != conn);
        debug!(conn, "Connection subscriptions dropped");
    }

    fn unsubscribe(
        &self,
        id: u64,
        topic: &Topic,
    ) {
        match topic {
            Topic::Channel(name) => {
                self.channels.remove_if_mut(name, |_, subscribers| {
                    subscribers.retain(|s| s.id != id);
                    subscribers.is_empty()
                });
            }
            Topic::Keyspace(_) => {
                self.keyspace.write().retain(|s| s.inner.id != id);
            }
        }
    }
}

/// Receiving end of a subscription. Unsubscribes when dropped.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    topic: Topic,
    receiver: Receiver<StoreEvent>,
    hub: Weak<PubSubHub>,
}

impl Subscription {
    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    pub fn receiver(&self) -> &Receiver<StoreEvent> {
        &self.receiver
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.unsubscribe(self.id, &self.topic);
            trace!(subscription_id = self.id, "Unsubscribed");
        }
    }
}
