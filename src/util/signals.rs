use anyhow::{Context, Result};
use nix::libc::c_int;
use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, sigaction};
use nix::unistd::{getpgrp, tcgetpgrp};
use std::sync::atomic::{AtomicI32, Ordering};

/// Signals that end a session. Each one triggers the same teardown as a
/// normal exit.
pub const TERMINATING_SIGNALS: [Signal; 4] = [
    Signal::SIGINT,
    Signal::SIGTERM,
    Signal::SIGHUP,
    Signal::SIGQUIT,
];

static PENDING: AtomicI32 = AtomicI32::new(0);

extern "C" fn record_signal(signum: c_int) {
    PENDING.store(signum, Ordering::SeqCst);
}

/**
 * Replaces the default "die immediately" disposition of the terminating
 * signals with a handler that only records the signal. Blocking calls return
 * EINTR (no SA_RESTART) so the session can notice and unwind through its
 * teardown guard.
 */
pub fn install_handlers() -> Result<()> {
    let action = SigAction::new(
        SigHandler::Handler(record_signal),
        SaFlags::empty(),
        SigSet::empty(),
    );
    for signal in TERMINATING_SIGNALS {
        unsafe { sigaction(signal, &action) }
            .context(format!("failed to install handler for {}", signal))?;
    }
    Ok(())
}

/// The most recent terminating signal received, if any.
pub fn pending_signal() -> Option<Signal> {
    Signal::try_from(PENDING.load(Ordering::SeqCst)).ok()
}

/// Like `pending_signal`, but clears it.
pub fn take_signal() -> Option<Signal> {
    Signal::try_from(PENDING.swap(0, Ordering::SeqCst)).ok()
}

/**
 * Whether `signal` still has to be passed on to a guest that shares our
 * process group. Keyboard signals from a terminal go to the whole foreground
 * group, so the guest has already received them.
 */
pub fn needs_forwarding(signal: Signal) -> bool {
    let in_foreground =
        tcgetpgrp(std::io::stdin()).is_ok_and(|group| group == getpgrp());
    forwarded(signal, in_foreground)
}

fn forwarded(signal: Signal, in_foreground: bool) -> bool {
    !(in_foreground && matches!(signal, Signal::SIGINT | Signal::SIGQUIT))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyboard_signals_are_not_forwarded_twice() {
        assert!(!forwarded(Signal::SIGINT, true));
        assert!(!forwarded(Signal::SIGQUIT, true));
        assert!(forwarded(Signal::SIGTERM, true));
        assert!(forwarded(Signal::SIGHUP, true));

        for signal in TERMINATING_SIGNALS {
            assert!(forwarded(signal, false));
        }
    }

    #[test]
    fn test_handlers_record_instead_of_terminating() {
        install_handlers().unwrap();
        nix::sys::signal::raise(Signal::SIGHUP).unwrap();
        assert_eq!(take_signal(), Some(Signal::SIGHUP));
        assert_eq!(take_signal(), None);
    }

    #[test]
    fn test_signals_sent_to_us_alone_are_forwarded() {
        assert!(needs_forwarding(Signal::SIGTERM));
        assert!(needs_forwarding(Signal::SIGHUP));
    }
}
