use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::sleep;
use std::time::Duration;
use std::time::Instant;

use serial_test::serial;
use tracing_test::traced_test;

use super::*;
use crate::Error;
use crate::SignalError;

fn raise(signum: i32) {
    unsafe {
        libc::kill(libc::getpid(), signum);
    }
}

fn handler_of(signum: i32) -> libc::sighandler_t {
    unsafe {
        let mut action: libc::sigaction = std::mem::zeroed();
        assert_eq!(libc::sigaction(signum, std::ptr::null(), &mut action), 0);
        action.sa_sigaction
    }
}

fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(3);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(5));
    }
    condition()
}

#[test]
#[serial]
fn register_check_reset_restore_sequence() {
    let before = handler_of(libc::SIGUSR2);
    let registry = SignalRegistry::new();
    registry.register(libc::SIGUSR2, SignalDisposition::Interrupt).unwrap();
    assert_ne!(handler_of(libc::SIGUSR2), before);
    assert!(!registry.check(libc::SIGUSR2));

    raise(libc::SIGUSR2);
    assert!(wait_for(|| registry.check(libc::SIGUSR2)));

    registry.reset(libc::SIGUSR2);
    assert!(!registry.check(libc::SIGUSR2));

    assert!(registry.restore(libc::SIGUSR2));
    assert_eq!(handler_of(libc::SIGUSR2), before);
    assert!(!registry.check(libc::SIGUSR2));
    assert!(!registry.restore(libc::SIGUSR2));
}

#[test]
#[serial]
fn restore_reinstates_an_ignored_signal() {
    unsafe {
        libc::signal(libc::SIGUSR2, libc::SIG_IGN);
    }
    let registry = SignalRegistry::new();
    registry.register(libc::SIGUSR2, SignalDisposition::Interrupt).unwrap();
    assert_ne!(handler_of(libc::SIGUSR2), libc::SIG_IGN);

    assert!(registry.restore(libc::SIGUSR2));
    assert_eq!(handler_of(libc::SIGUSR2), libc::SIG_IGN);
    raise(libc::SIGUSR2);
    sleep(Duration::from_millis(50));
    assert!(!registry.check(libc::SIGUSR2));

    // caught again after a second registration
    registry.register(libc::SIGUSR2, SignalDisposition::Interrupt).unwrap();
    raise(libc::SIGUSR2);
    assert!(wait_for(|| registry.check(libc::SIGUSR2)));

    assert!(registry.restore(libc::SIGUSR2));
    unsafe {
        libc::signal(libc::SIGUSR2, libc::SIG_DFL);
    }
}

#[test]
#[serial]
fn previous_action_returns_after_the_last_holder() {
    let before = handler_of(libc::SIGUSR2);
    let first = SignalRegistry::new();
    let second = SignalRegistry::new();
    first.register(libc::SIGUSR2, SignalDisposition::Interrupt).unwrap();
    second.register(libc::SIGUSR2, SignalDisposition::Resume).unwrap();
    let caught = handler_of(libc::SIGUSR2);
    assert_ne!(caught, before);

    assert!(first.restore(libc::SIGUSR2));
    assert_eq!(handler_of(libc::SIGUSR2), caught);

    drop(second);
    assert_eq!(handler_of(libc::SIGUSR2), before);
}

#[test]
#[serial]
fn registering_twice_needs_one_restore() {
    let before = handler_of(libc::SIGUSR2);
    let registry = SignalRegistry::new();
    registry.register(libc::SIGUSR2, SignalDisposition::Resume).unwrap();
    registry.register(libc::SIGUSR2, SignalDisposition::Interrupt).unwrap();
    assert_eq!(registry.disposition(libc::SIGUSR2), Some(SignalDisposition::Interrupt));

    assert!(registry.restore(libc::SIGUSR2));
    assert_eq!(handler_of(libc::SIGUSR2), before);
}

#[test]
#[serial]
fn interrupt_signals_reach_listeners() {
    let registry = SignalRegistry::new();
    let listener = registry.listen();
    registry.register(libc::SIGUSR2, SignalDisposition::Interrupt).unwrap();

    raise(libc::SIGUSR2);

    assert_eq!(
        listener.receiver().recv_timeout(Duration::from_secs(3)),
        Ok(libc::SIGUSR2)
    );
    registry.restore(libc::SIGUSR2);
}

#[test]
#[serial]
fn resume_signals_raise_the_flag_without_notifying_listeners() {
    let registry = SignalRegistry::new();
    let listener = registry.listen();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    registry
        .register_with_callback(
            libc::SIGUSR2,
            SignalDisposition::Resume,
            Arc::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .unwrap();
    assert_eq!(registry.disposition(libc::SIGUSR2), Some(SignalDisposition::Resume));

    raise(libc::SIGUSR2);

    assert!(wait_for(|| registry.check(libc::SIGUSR2)));
    assert!(wait_for(|| calls.load(Ordering::SeqCst) == 1));
    assert!(listener.receiver().try_recv().is_err());
    registry.restore(libc::SIGUSR2);
}

#[test]
#[serial]
#[traced_test]
fn uncatchable_signal_is_rejected() {
    let registry = SignalRegistry::new();

    let result = registry.register(libc::SIGKILL, SignalDisposition::Interrupt);

    assert!(matches!(
        result,
        Err(Error::Signal(SignalError::Register { signum, .. })) if signum == libc::SIGKILL
    ));
    assert!(!registry.check(libc::SIGKILL));
}

#[test]
fn dropped_listener_is_unregistered() {
    let registry = SignalRegistry::new();
    let listener = registry.listen();
    assert!(format!("{registry:?}").contains("listeners: 1"));

    drop(listener);
    assert!(format!("{registry:?}").contains("listeners: 0"));
}
