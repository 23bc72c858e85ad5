#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use statebus::DbConnector;
use statebus::FieldValues;
use statebus::MemoryStore;
use statebus::Select;
use statebus::SelectOutcome;
use statebus::SledConfig;
use statebus::SledStore;

pub const WAIT_TIMEOUT: Duration = Duration::from_secs(5);

pub fn fv(pairs: &[(&str, &str)]) -> FieldValues {
    pairs.iter().map(|(f, v)| (f.to_string(), v.to_string())).collect()
}

pub fn memory_db() -> DbConnector {
    DbConnector::new(Arc::new(MemoryStore::new()))
}

pub fn sled_config(dir: &Path) -> SledConfig {
    SledConfig {
        path: dir.join("statebus"),
        cache_capacity: 8 * 1024 * 1024,
        flush_every_ms: 0,
    }
}

pub fn sled_db(dir: &Path) -> (DbConnector, Arc<SledStore>) {
    let store = Arc::new(SledStore::open(&sled_config(dir)).expect("open sled store"));
    (DbConnector::new(store.clone()), store)
}

/// Runs `select` until `done` reports true or the deadline passes; returns
/// whether `done` was satisfied.
pub fn select_until(
    select: &mut Select,
    timeout: Duration,
    mut done: impl FnMut() -> bool,
) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return done();
        }
        match select.select(Some(remaining)).expect("select") {
            SelectOutcome::Object(_) => {
                if done() {
                    return true;
                }
            }
            SelectOutcome::Timeout => return done(),
            SelectOutcome::Signal(signum) => panic!("unexpected signal {signum}"),
        }
    }
}
