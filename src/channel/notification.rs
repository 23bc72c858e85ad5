use std::collections::VecDeque;

use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use tracing::error;
use tracing::trace;

use crate::codec::decode_notification;
use crate::codec::encode_notification;
use crate::select::drain_notifications;
use crate::DbConnector;
use crate::NotificationMessage;
use crate::Result;
use crate::Selectable;
use crate::StoreEvent;
use crate::Subscription;
use crate::Topic;

/// Publishes ephemeral messages on a named channel. Nothing is stored.
#[derive(Debug, Clone)]
pub struct NotificationProducer {
    db: DbConnector,
    channel: String,
}

impl NotificationProducer {
    pub fn new(
        db: &DbConnector,
        channel: &str,
    ) -> Self {
        Self {
            db: db.clone(),
            channel: channel.to_string(),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Returns how many consumers the message reached.
    pub fn send(
        &self,
        operation: &str,
        data: &str,
        field_values: &[(String, String)],
    ) -> Result<usize> {
        let payload = encode_notification(operation, data, field_values)?;
        let receivers = self.db.publish(&self.channel, payload)?;
        trace!(channel = %self.channel, operation, receivers, "Notification sent");
        Ok(receivers)
    }
}

/// Receives every message published on its channel after construction.
#[derive(Debug)]
pub struct NotificationConsumer {
    channel: String,
    subscription: Subscription,
    queue: Mutex<VecDeque<NotificationMessage>>,
    priority: i32,
}

impl NotificationConsumer {
    pub fn new(
        db: &DbConnector,
        channel: &str,
    ) -> Result<Self> {
        let subscription = db.subscribe(Topic::Channel(channel.to_string()))?;
        Ok(Self {
            channel: channel.to_string(),
            subscription,
            queue: Mutex::new(VecDeque::new()),
            priority: 0,
        })
    }

    pub fn with_priority(
        mut self,
        priority: i32,
    ) -> Self {
        self.priority = priority;
        self
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn pop(&self) -> Result<Option<NotificationMessage>> {
        self.read_data()?;
        Ok(self.queue.lock().pop_front())
    }

    pub fn pops(&self) -> Result<Vec<NotificationMessage>> {
        self.read_data()?;
        Ok(self.queue.lock().drain(..).collect())
    }

    /// Whether a message is waiting.
    pub fn peek(&self) -> Result<bool> {
        self.read_data()?;
        Ok(!self.queue.lock().is_empty())
    }
}

impl Selectable for NotificationConsumer {
    fn notifications(&self) -> &Receiver<StoreEvent> {
        self.subscription.receiver()
    }

    fn read_data(&self) -> Result<()> {
        let mut decoded = Vec::new();
        drain_notifications(self.subscription.receiver(), &self.channel, |event| {
            let StoreEvent::Message { channel, payload } = event else {
                return;
            };
            match decode_notification(&channel, &payload) {
                Ok(message) => decoded.push(message),
                Err(e) => error!(%channel, "Dropping malformed notification: {}", e),
            }
        })?;
        if !decoded.is_empty() {
            self.queue.lock().extend(decoded);
        }
        Ok(())
    }

    fn has_data(&self) -> Result<bool> {
        Ok(!self.queue.lock().is_empty())
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}
