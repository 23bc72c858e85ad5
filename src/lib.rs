//! # statebus
//!
//! State-table change notifications between co-located processes that share
//! one key-value store.
//!
//! Producers turn writes into `{key, operation, fields}` events, either
//! compacted per key ([`ProducerStateTable`] / [`ConsumerStateTable`]) or
//! queued one per write ([`ProducerTable`] / [`ConsumerTable`]). Readers can
//! also follow raw row changes ([`SubscriberStateTable`]) or ephemeral
//! messages ([`NotificationConsumer`]). A [`Select`] waits on any mix of
//! them with a timeout and is interrupted by registered signals.
//!
//! ```ignore
//! let db = DbConnector::new(Arc::new(MemoryStore::new()));
//! let producer = ProducerStateTable::new(&db, "PORT_TABLE");
//! let consumer = Arc::new(ConsumerStateTable::new(&db, "PORT_TABLE")?);
//!
//! producer.set("Ethernet0", &[("mtu".into(), "9100".into())])?;
//!
//! let mut select = Select::new();
//! select.add_selectable(consumer.clone());
//! if let SelectOutcome::Object(_) = select.select(Some(Duration::from_secs(1)))? {
//!     for event in consumer.pops()? {
//!         println!("{} {} {:?}", event.key, event.operation, event.field_values);
//!     }
//! }
//! ```

mod channel;
mod config;
mod db;
mod errors;
mod select;
mod signal;
mod store;
mod table;
mod types;
mod waiter;

pub mod codec;
pub(crate) mod constants;

pub use channel::*;
pub use self::config::*;
pub use db::*;
pub use errors::*;
pub use select::*;
pub use signal::*;
pub use store::*;
pub use table::*;
pub use types::*;
pub use waiter::*;

#[cfg(test)]
mod errors_test;
#[cfg(test)]
mod waiter_test;
