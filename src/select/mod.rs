//! Blocking multiplexer over channels and one-shot notifications.
//!
//! ```ignore
//! let consumer = Arc::new(ConsumerStateTable::new(&db, "PORT_TABLE")?);
//! let mut select = Select::new();
//! let id = select.add_selectable(consumer.clone());
//! loop {
//!     match select.select(Some(Duration::from_secs(1)))? {
//!         SelectOutcome::Object(ready) if ready == id => handle(consumer.pops()?),
//!         SelectOutcome::Signal(_) => break,
//!         _ => {}
//!     }
//! }
//! ```

mod multiplexer;
mod selectable;

pub use multiplexer::*;
pub use selectable::*;
