//! Producer and consumer channels layered on the direct table.
//!
//! - compacting: [`ProducerStateTable`] / [`ConsumerStateTable`]
//! - ordered: [`ProducerTable`] / [`ConsumerTable`]
//! - keyspace driven: [`SubscriberStateTable`]
//! - one-shot: [`NotificationProducer`] / [`NotificationConsumer`]
//!
//! Every consumer is [`Selectable`](crate::Selectable) and subscribes when
//! it is built, so a write made after construction always wakes a
//! [`Select`](crate::Select) waiting on it.

mod consumer_state_table;
mod consumer_table;
mod notification;
mod producer_state_table;
mod producer_table;
mod subscriber_state_table;

pub use consumer_state_table::*;
pub use consumer_table::*;
pub use notification::*;
pub use producer_state_table::*;
pub use producer_table::*;
pub use subscriber_state_table::*;

#[cfg(test)]
mod producer_state_table_test;

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::KeyOpFieldValues;

/// Puts already drained events back ahead of anything buffered since.
pub(crate) fn requeue_front(
    buffer: &Mutex<VecDeque<KeyOpFieldValues>>,
    events: Vec<KeyOpFieldValues>,
) {
    let mut buffer = buffer.lock();
    for event in events.into_iter().rev() {
        buffer.push_front(event);
    }
}
