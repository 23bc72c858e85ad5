use std::collections::HashMap;
use std::io;
use std::mem;
use std::ptr;

use lazy_static::lazy_static;
use parking_lot::Mutex;
use tracing::debug;

use crate::Result;
use crate::SignalError;

lazy_static! {
    static ref ACTIONS: Mutex<HashMap<i32, SavedActions>> = Mutex::new(HashMap::new());
}

/// OS dispositions of one signal, shared by every registry in the process.
struct SavedActions {
    /// What the signal did before the first registration took it over
    previous: Option<libc::sigaction>,
    /// Handler installed by the signal runtime, reinstated after a restore
    installed: Option<libc::sigaction>,
    holders: usize,
}

fn current_action(signum: i32) -> io::Result<libc::sigaction> {
    // SAFETY: a null new action only queries; the out pointer is valid.
    unsafe {
        let mut action: libc::sigaction = mem::zeroed();
        if libc::sigaction(signum, ptr::null(), &mut action) != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(action)
    }
}

fn set_action(
    signum: i32,
    action: &libc::sigaction,
) -> io::Result<()> {
    // SAFETY: `action` was read back from the kernel for this signal.
    unsafe {
        if libc::sigaction(signum, action, ptr::null_mut()) != 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

/// Runs `install` with the signal taken over from its previous disposition.
///
/// The first holder saves the previous action. The runtime only installs
/// its handler once per process, so later takeovers put that handler back
/// themselves.
pub(crate) fn acquire<T>(
    signum: i32,
    install: impl FnOnce() -> Result<T>,
) -> Result<T> {
    let register_error = |source: io::Error| SignalError::Register { signum, source };

    let mut actions = ACTIONS.lock();
    let saved = actions.entry(signum).or_insert(SavedActions {
        previous: None,
        installed: None,
        holders: 0,
    });
    if saved.holders > 0 {
        let out = install()?;
        saved.holders += 1;
        return Ok(out);
    }

    let previous = current_action(signum).map_err(register_error)?;
    let out = install()?;
    if let Some(installed) = saved.installed {
        set_action(signum, &installed).map_err(register_error)?;
    } else {
        saved.installed = Some(current_action(signum).map_err(register_error)?);
    }
    saved.previous = Some(previous);
    saved.holders = 1;
    debug!(signum, "Signal action taken over");
    Ok(out)
}

/// Drops one hold; the last one puts the previous action back.
pub(crate) fn release(signum: i32) -> Result<()> {
    let mut actions = ACTIONS.lock();
    let Some(saved) = actions.get_mut(&signum) else {
        return Ok(());
    };
    if saved.holders == 0 {
        return Ok(());
    }
    saved.holders -= 1;
    if saved.holders > 0 {
        return Ok(());
    }
    if let Some(previous) = saved.previous.take() {
        set_action(signum, &previous).map_err(|source| SignalError::Restore { signum, source })?;
        debug!(signum, "Previous signal action restored");
    }
    Ok(())
}
