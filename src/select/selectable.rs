use crossbeam_channel::Receiver;
use crossbeam_channel::TryRecvError;
#[cfg(test)]
use mockall::automock;

use crate::Result;
use crate::StoreError;
use crate::StoreEvent;

/// A source [`Select`](crate::Select) can wait on.
///
/// Readiness is always answered from real state (`has_data`); the
/// notification receiver only tells the multiplexer when to look again, so
/// extra or coalesced notifications are harmless.
#[cfg_attr(test, automock)]
pub trait Selectable: Send + Sync {
    /// Receiver that gets an item whenever this source may have new data.
    fn notifications(&self) -> &Receiver<StoreEvent>;

    /// Drains pending notifications without blocking, buffering whatever
    /// they carry.
    fn read_data(&self) -> Result<()>;

    /// Whether a `pop` would return something right now.
    fn has_data(&self) -> Result<bool>;

    /// Higher wins when several sources are ready at once.
    fn priority(&self) -> i32 {
        0
    }
}

/// Calls `f` for each queued notification. A dropped sender means the store
/// handle went away.
pub(crate) fn drain_notifications(
    receiver: &Receiver<StoreEvent>,
    origin: &str,
    mut f: impl FnMut(StoreEvent),
) -> Result<usize> {
    let mut drained = 0;
    loop {
        match receiver.try_recv() {
            Ok(event) => {
                drained += 1;
                f(event);
            }
            Err(TryRecvError::Empty) => return Ok(drained),
            Err(TryRecvError::Disconnected) => {
                return Err(StoreError::Connection(format!("{origin}: subscription disconnected")).into());
            }
        }
    }
}
