use std::cmp::Reverse;
use std::fmt;
use std::sync::Arc;
use std::thread::sleep;
use std::time::Duration;
use std::time::Instant;

use crossbeam_channel::TryRecvError;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use super::Selectable;
use crate::Error;
use crate::Result;
use crate::SelectConfig;
use crate::SignalListener;
use crate::SignalRegistry;

/// Handle returned by [`Select::add_selectable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SelectableId(u64);

/// Result of one [`Select::select`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectOutcome {
    /// This source has data. May be spurious if another reader drained it first.
    Object(SelectableId),
    /// Nothing became ready before the timeout.
    Timeout,
    /// A signal registered with the `Interrupt` disposition arrived.
    Signal(i32),
}

struct Entry {
    id: SelectableId,
    source: Arc<dyn Selectable>,
    last_selected: u64,
}

impl Entry {
    fn rank(&self) -> (i32, Reverse<u64>) {
        (self.source.priority(), Reverse(self.last_selected))
    }
}

/// Blocking wait across any mixture of channels.
///
/// Each call first drains notifications and asks every source whether it
/// has data, and only then blocks. A write that lands between two calls is
/// either seen by the readiness check or leaves a notification that wakes
/// the wait, so no wakeup is lost.
pub struct Select {
    entries: Vec<Entry>,
    next_id: u64,
    tick: u64,
    signals: Option<SignalListener>,
}

impl fmt::Debug for Select {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Select")
            .field("selectables", &self.entries.len())
            .field("interruptible", &self.signals.is_some())
            .finish()
    }
}

impl Default for Select {
    fn default() -> Self {
        Self::new()
    }
}

impl Select {
    /// Interrupted by signals registered on the process-wide registry.
    pub fn new() -> Self {
        Self::with_registry(SignalRegistry::global())
    }

    /// Interrupted by signals registered on `registry`. Signals delivered
    /// between two `select` calls are reported by the next one.
    pub fn with_registry(registry: &SignalRegistry) -> Self {
        Self::build(Some(registry.listen()))
    }

    /// Never reports signals.
    pub fn without_interrupts() -> Self {
        Self::build(None)
    }

    pub fn from_config(config: &SelectConfig) -> Self {
        if config.interrupt_on_signal {
            Self::new()
        } else {
            Self::without_interrupts()
        }
    }

    fn build(signals: Option<SignalListener>) -> Self {
        Self {
            entries: Vec::new(),
            next_id: 0,
            tick: 0,
            signals,
        }
    }

    /// Adds a source. Adding the same source twice returns its existing id.
    pub fn add_selectable(
        &mut self,
        source: Arc<dyn Selectable>,
    ) -> SelectableId {
        if let Some(existing) = self.entries.iter().find(|e| same_source(&e.source, &source)) {
            warn!(id = ?existing.id, "Selectable already added, ignoring");
            return existing.id;
        }

        let id = SelectableId(self.next_id);
        self.next_id += 1;
        self.entries.push(Entry {
            id,
            source,
            last_selected: 0,
        });
        debug!(?id, total = self.entries.len(), "Selectable added");
        id
    }

    pub fn add_selectables(
        &mut self,
        sources: impl IntoIterator<Item = Arc<dyn Selectable>>,
    ) -> Vec<SelectableId> {
        sources.into_iter().map(|s| self.add_selectable(s)).collect()
    }

    pub fn remove_selectable(
        &mut self,
        id: SelectableId,
    ) -> Option<Arc<dyn Selectable>> {
        let pos = self.entries.iter().position(|e| e.id == id)?;
        debug!(?id, "Selectable removed");
        Some(self.entries.remove(pos).source)
    }

    pub fn selectable(
        &self,
        id: SelectableId,
    ) -> Option<&Arc<dyn Selectable>> {
        self.entries.iter().find(|e| e.id == id).map(|e| &e.source)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Waits until a source has data, `timeout` elapses, or an interrupting
    /// signal arrives. `None` waits indefinitely.
    pub fn select(
        &mut self,
        timeout: Option<Duration>,
    ) -> Result<SelectOutcome> {
        // a timeout too large to represent waits indefinitely
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));

        loop {
            if let Some(signum) = self.take_signal() {
                debug!(signum, "Select interrupted by signal");
                return Ok(SelectOutcome::Signal(signum));
            }

            for entry in &self.entries {
                entry.source.read_data()?;
            }

            if let Some(id) = self.pick_ready()? {
                trace!(?id, "Select ready");
                return Ok(SelectOutcome::Object(id));
            }

            if !self.wait_for_wakeup(deadline)? {
                trace!("Select timed out");
                return Ok(SelectOutcome::Timeout);
            }
        }
    }

    fn take_signal(&mut self) -> Option<i32> {
        let listener = self.signals.as_ref()?;
        match listener.receiver().try_recv() {
            Ok(signum) => Some(signum),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                warn!("Signal registry gone, select no longer interruptible");
                self.signals = None;
                None
            }
        }
    }

    /// Highest priority first, then the source selected least recently.
    fn pick_ready(&mut self) -> Result<Option<SelectableId>> {
        let mut best: Option<usize> = None;
        for (i, entry) in self.entries.iter().enumerate() {
            if !entry.source.has_data()? {
                continue;
            }
            match best {
                Some(b) if entry.rank() <= self.entries[b].rank() => {}
                _ => best = Some(i),
            }
        }

        Ok(best.map(|i| {
            self.tick += 1;
            let entry = &mut self.entries[i];
            entry.last_selected = self.tick;
            entry.id
        }))
    }

    /// Blocks until some receiver has an item. Returns false on timeout.
    fn wait_for_wakeup(
        &self,
        deadline: Option<Instant>,
    ) -> Result<bool> {
        let mut sel = crossbeam_channel::Select::new();
        for entry in &self.entries {
            sel.recv(entry.source.notifications());
        }
        if let Some(listener) = &self.signals {
            sel.recv(listener.receiver());
        }

        if self.entries.is_empty() && self.signals.is_none() {
            return match deadline {
                Some(d) => {
                    sleep(d.saturating_duration_since(Instant::now()));
                    Ok(false)
                }
                None => Err(Error::InvalidState(
                    "select without sources, interrupts or timeout would block forever".to_string(),
                )),
            };
        }

        match deadline {
            Some(d) => Ok(sel.ready_deadline(d).is_ok()),
            None => {
                sel.ready();
                Ok(true)
            }
        }
    }
}

fn same_source(
    a: &Arc<dyn Selectable>,
    b: &Arc<dyn Selectable>,
) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

/// Waits on a single source, the way a caller polls one table.
pub fn select_one(
    source: Arc<dyn Selectable>,
    timeout: Option<Duration>,
    interrupt_on_signal: bool,
) -> Result<SelectOutcome> {
    let mut select = if interrupt_on_signal {
        Select::new()
    } else {
        Select::without_interrupts()
    };
    select.add_selectable(source);
    select.select(timeout)
}
