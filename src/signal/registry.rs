use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Weak;

use crossbeam_channel::unbounded;
use crossbeam_channel::Receiver;
use crossbeam_channel::Sender;
use dashmap::DashMap;
use lazy_static::lazy_static;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::runtime::Runtime;
use tokio::signal::unix::signal;
use tokio::signal::unix::Signal;
use tokio::signal::unix::SignalKind;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::trace;

use super::action;
use crate::Result;
use crate::SignalError;

lazy_static! {
    static ref GLOBAL_SIGNALS: SignalRegistry = SignalRegistry::new();
}

/// Runs on the signal runtime thread each time the signal arrives.
pub type SignalCallback = Arc<dyn Fn(i32) + Send + Sync>;

/// What an arriving signal does to blocked [`Select`](crate::Select) calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalDisposition {
    /// Waits return `SelectOutcome::Signal`
    Interrupt,
    /// Only the raised flag and callback; waits continue
    Resume,
}

struct SignalSlot {
    raised: Arc<AtomicBool>,
    disposition: SignalDisposition,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct RegistryInner {
    listeners: DashMap<u64, Sender<i32>>,
    next_listener: AtomicU64,
}

impl RegistryInner {
    fn notify(
        &self,
        signum: i32,
    ) {
        self.listeners.retain(|_, sender| sender.send(signum).is_ok());
    }
}

/// Process-scoped signal state: a raised flag per registered signal, its
/// disposition, and the listeners owned by interruptible selects.
///
/// Handlers are driven by a small tokio runtime started on first
/// registration. [`restore`](SignalRegistry::restore), or dropping the
/// registry, puts back the action the signal had before it was registered
/// once no other registry still holds it.
pub struct SignalRegistry {
    inner: Arc<RegistryInner>,
    slots: Mutex<HashMap<i32, SignalSlot>>,
    runtime: Mutex<Option<Runtime>>,
}

impl fmt::Debug for SignalRegistry {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let registered: Vec<i32> = self.slots.lock().keys().copied().collect();
        f.debug_struct("SignalRegistry")
            .field("registered", &registered)
            .field("listeners", &self.inner.listeners.len())
            .finish()
    }
}

impl Default for SignalRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RegistryInner::default()),
            slots: Mutex::new(HashMap::new()),
            runtime: Mutex::new(None),
        }
    }

    /// Registry shared by the whole process; used by [`Select::new`](crate::Select::new).
    pub fn global() -> &'static SignalRegistry {
        &GLOBAL_SIGNALS
    }

    pub fn register(
        &self,
        signum: i32,
        disposition: SignalDisposition,
    ) -> Result<()> {
        self.install(signum, disposition, None)
    }

    pub fn register_with_callback(
        &self,
        signum: i32,
        disposition: SignalDisposition,
        callback: SignalCallback,
    ) -> Result<()> {
        self.install(signum, disposition, Some(callback))
    }

    /// Whether `signum` arrived since registration or the last reset.
    pub fn check(
        &self,
        signum: i32,
    ) -> bool {
        self.slots
            .lock()
            .get(&signum)
            .is_some_and(|slot| slot.raised.load(Ordering::Acquire))
    }

    pub fn reset(
        &self,
        signum: i32,
    ) {
        if let Some(slot) = self.slots.lock().get(&signum) {
            slot.raised.store(false, Ordering::Release);
        }
    }

    pub fn disposition(
        &self,
        signum: i32,
    ) -> Option<SignalDisposition> {
        self.slots.lock().get(&signum).map(|slot| slot.disposition)
    }

    /// Stops tracking `signum` and reinstates its previous action. Returns
    /// false if it was not registered.
    pub fn restore(
        &self,
        signum: i32,
    ) -> bool {
        let Some(slot) = self.slots.lock().remove(&signum) else {
            return false;
        };
        release_slot(signum, slot);
        info!(signum, "Signal handler restored");
        true
    }

    /// New listener receiving every `Interrupt` signal from now on.
    pub fn listen(&self) -> SignalListener {
        let id = self.inner.next_listener.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = unbounded();
        self.inner.listeners.insert(id, sender);
        trace!(listener_id = id, "Signal listener added");
        SignalListener {
            id,
            receiver,
            inner: self.inner.clone(),
        }
    }

    fn install(
        &self,
        signum: i32,
        disposition: SignalDisposition,
        callback: Option<SignalCallback>,
    ) -> Result<()> {
        let handle = self.runtime_handle()?;
        let open_stream = || -> Result<Signal> {
            let _guard = handle.enter();
            let stream = signal(SignalKind::from_raw(signum))
                .map_err(|source| SignalError::Register { signum, source })?;
            Ok(stream)
        };
        let stream = if self.slots.lock().contains_key(&signum) {
            open_stream()?
        } else {
            action::acquire(signum, open_stream)?
        };

        let raised = Arc::new(AtomicBool::new(false));
        let task = handle.spawn(forward_signals(
            signum,
            stream,
            raised.clone(),
            disposition,
            callback,
            Arc::downgrade(&self.inner),
        ));

        let previous = self.slots.lock().insert(
            signum,
            SignalSlot {
                raised,
                disposition,
                task,
            },
        );
        if let Some(old) = previous {
            old.task.abort();
        }
        info!(signum, ?disposition, "Signal handler registered");
        Ok(())
    }

    fn runtime_handle(&self) -> Result<Handle> {
        let mut runtime = self.runtime.lock();
        match runtime.as_ref() {
            Some(rt) => Ok(rt.handle().clone()),
            None => {
                let rt = tokio::runtime::Builder::new_multi_thread()
                    .worker_threads(1)
                    .thread_name("statebus-signal")
                    .enable_all()
                    .build()
                    .map_err(SignalError::Runtime)?;
                let handle = rt.handle().clone();
                *runtime = Some(rt);
                debug!("Signal runtime started");
                Ok(handle)
            }
        }
    }
}

impl Drop for SignalRegistry {
    fn drop(&mut self) {
        for (signum, slot) in self.slots.get_mut().drain() {
            release_slot(signum, slot);
        }
    }
}

fn release_slot(
    signum: i32,
    slot: SignalSlot,
) {
    slot.task.abort();
    if let Err(e) = action::release(signum) {
        error!(signum, "{}", e);
    }
}

async fn forward_signals(
    signum: i32,
    mut stream: Signal,
    raised: Arc<AtomicBool>,
    disposition: SignalDisposition,
    callback: Option<SignalCallback>,
    inner: Weak<RegistryInner>,
) {
    while stream.recv().await.is_some() {
        raised.store(true, Ordering::Release);
        debug!(signum, ?disposition, "Signal received");

        if let Some(cb) = &callback {
            cb(signum);
        }
        if disposition == SignalDisposition::Interrupt {
            match inner.upgrade() {
                Some(inner) => inner.notify(signum),
                None => break,
            }
        }
    }
}

/// Receives interrupting signals for one select. Unregisters when dropped.
pub struct SignalListener {
    id: u64,
    receiver: Receiver<i32>,
    inner: Arc<RegistryInner>,
}

impl SignalListener {
    pub fn receiver(&self) -> &Receiver<i32> {
        &self.receiver
    }
}

impl fmt::Debug for SignalListener {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("SignalListener").field("id", &self.id).finish()
    }
}

impl Drop for SignalListener {
    fn drop(&mut self) {
        self.inner.listeners.remove(&self.id);
        trace!(listener_id = self.id, "Signal listener removed");
    }
}
