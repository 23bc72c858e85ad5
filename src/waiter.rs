//! Blocking waits for a table entry to reach a wanted state.

use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use tracing::debug;
use tracing::info;

use crate::DbConnector;
use crate::Error;
use crate::KeyOpFieldValues;
use crate::KeyOperation;
use crate::Result;
use crate::Select;
use crate::SelectOutcome;
use crate::SubscriberStateTable;
use crate::Table;

/// Waits on the keyspace events of one table until a check passes.
///
/// Every wait returns `Ok(true)` once the condition holds, `Ok(false)` on
/// timeout or when an interrupting signal arrives.
#[derive(Debug)]
pub struct TableWaiter;

impl TableWaiter {
    /// Waits until `check` accepts one change event of `table_name`.
    pub fn wait_until<F>(
        db: &DbConnector,
        table_name: &str,
        max_wait: Duration,
        check: F,
    ) -> Result<bool>
    where
        F: FnMut(&KeyOpFieldValues) -> bool,
    {
        Self::wait_with_precheck(db, table_name, max_wait, || Ok(false), check)
    }

    /// Waits until `field` of `key` holds a value accepted by `cond`.
    pub fn wait_until_field_set<C>(
        db: &DbConnector,
        table_name: &str,
        key: &str,
        field: &str,
        max_wait: Duration,
        cond: C,
    ) -> Result<bool>
    where
        C: Fn(&str) -> bool,
    {
        let table = Table::new(db, table_name);
        Self::wait_with_precheck(
            db,
            table_name,
            max_wait,
            || Ok(table.hget(key, field)?.is_some_and(|value| cond(&value))),
            |event| {
                event.operation == KeyOperation::Set
                    && event.key == key
                    && event.field(field).is_some_and(&cond)
            },
        )
    }

    /// Waits until `key` exists.
    pub fn wait_until_key_set(
        db: &DbConnector,
        table_name: &str,
        key: &str,
        max_wait: Duration,
    ) -> Result<bool> {
        let table = Table::new(db, table_name);
        Self::wait_with_precheck(
            db,
            table_name,
            max_wait,
            || table.exists(key),
            |event| event.operation == KeyOperation::Set && event.key == key,
        )
    }

    /// Waits until `key` no longer exists.
    pub fn wait_until_key_del(
        db: &DbConnector,
        table_name: &str,
        key: &str,
        max_wait: Duration,
    ) -> Result<bool> {
        let table = Table::new(db, table_name);
        Self::wait_with_precheck(
            db,
            table_name,
            max_wait,
            || Ok(!table.exists(key)?),
            |event| event.operation == KeyOperation::Del && event.key == key,
        )
    }

    /// Subscribes first, then runs `precheck`, so a change landing between
    /// the two is still delivered as an event.
    fn wait_with_precheck<P, F>(
        db: &DbConnector,
        table_name: &str,
        max_wait: Duration,
        mut precheck: P,
        mut check: F,
    ) -> Result<bool>
    where
        P: FnMut() -> Result<bool>,
        F: FnMut(&KeyOpFieldValues) -> bool,
    {
        if max_wait.is_zero() {
            return Err(Error::InvalidArgument(
                "max wait must be larger than zero".to_string(),
            ));
        }

        let subscriber = Arc::new(SubscriberStateTable::new(db, table_name)?);
        if precheck()? {
            return Ok(true);
        }

        let mut select = Select::new();
        select.add_selectable(subscriber.clone());
        let deadline = Instant::now().checked_add(max_wait);

        loop {
            let remaining = deadline.map(|d| d.saturating_duration_since(Instant::now()));
            if remaining.is_some_and(|r| r.is_zero()) {
                return Ok(false);
            }
            match select.select(remaining)? {
                SelectOutcome::Object(_) => {
                    for event in subscriber.pops()? {
                        if check(&event) {
                            return Ok(true);
                        }
                    }
                }
                SelectOutcome::Timeout => {
                    info!(table = table_name, "Wait on table timed out");
                }
                SelectOutcome::Signal(signum) => {
                    debug!(table = table_name, signum, "Wait on table interrupted");
                    return Ok(false);
                }
            }
        }
    }
}
