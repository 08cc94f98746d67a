// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::emitters::{emit_crash_notice, emit_stack_trace_echo};
use crate::crash_info::{CrashInfo, SignalNames};
use crate::finalizer::ExitReason;
use crate::platform;
use crate::session::registry;
use libc::{c_void, siginfo_t};
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler};
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::sync::atomic::Ordering::SeqCst;
use std::sync::atomic::{AtomicI32, AtomicPtr, AtomicU8};

// Note that the handling path makes use of the following async-signal safe functions.
// <https://man7.org/linux/man-pages/man7/signal-safety.7.html>
// - _exit
// - clock_gettime
// - dup2
// - nanosleep
// - pthread_self
// - raise
// - read
// - sigaction
// - write
// Symbol resolution, the crash snapshot and the reporter itself are not signal safe.

/// Receives the crash snapshot, synchronously, on the thread that took the
/// fatal signal. It may block (e.g. on user interaction) and may call
/// [`restart`](crate::restart) or [`terminate`](crate::terminate); if it
/// returns, the process exits with `128 + signum`.
pub trait CrashReporter: Send + Sync {
    fn on_crash(&self, info: &CrashInfo);
}

impl<F> CrashReporter for F
where
    F: Fn(&CrashInfo) + Send + Sync,
{
    fn on_crash(&self, info: &CrashInfo) {
        self(info)
    }
}

type Reporter = Box<dyn CrashReporter>;

// Either null or `Box::into_raw()`. The handler swaps it out and leaks it, so
// the reporter runs at most once per process.
static CRASH_REPORTER: AtomicPtr<Reporter> = AtomicPtr::new(ptr::null_mut());

/// Process-wide crash handling state.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerState {
    /// No logger, or the logger was torn down. Signals get their default behavior.
    Disarmed = 0,
    Armed = 1,
    /// A fatal signal is being handled. Terminal for ordinary program logic.
    Handling = 2,
    Terminated = 3,
}

impl From<u8> for HandlerState {
    fn from(value: u8) -> Self {
        match value {
            1 => HandlerState::Armed,
            2 => HandlerState::Handling,
            3 => HandlerState::Terminated,
            _ => HandlerState::Disarmed,
        }
    }
}

static STATE: AtomicU8 = AtomicU8::new(HandlerState::Disarmed as u8);
// The signal that first entered Handling. A recursive fault exits with it.
static ORIGINAL_SIGNUM: AtomicI32 = AtomicI32::new(0);

pub fn handler_state() -> HandlerState {
    HandlerState::from(STATE.load(SeqCst))
}

pub(crate) fn arm() -> bool {
    STATE
        .compare_exchange(
            HandlerState::Disarmed as u8,
            HandlerState::Armed as u8,
            SeqCst,
            SeqCst,
        )
        .is_ok()
}

pub(crate) fn disarm() -> bool {
    STATE
        .compare_exchange(
            HandlerState::Armed as u8,
            HandlerState::Disarmed as u8,
            SeqCst,
            SeqCst,
        )
        .is_ok()
}

/// Registers the reporter invoked on the next fatal signal, replacing any
/// previous one.
///
/// PRECONDITIONS:
///     None
/// SAFETY:
///     The previous reporter is dropped here, so this must not race with a
///     fatal signal that is already running it. The handler takes ownership
///     before calling it, which makes the swap below observe null in that case.
/// ATOMICITY:
///     This function uses a swap on an atomic pointer.
pub fn set_crash_callback(reporter: impl CrashReporter + 'static) {
    let box_ptr = Box::into_raw(Box::new(Box::new(reporter) as Reporter));
    let old = CRASH_REPORTER.swap(box_ptr, SeqCst);
    if !old.is_null() {
        // Safety: This can only come from a box above.
        unsafe {
            std::mem::drop(Box::from_raw(old));
        }
    }
}

pub fn clear_crash_callback() {
    let old = CRASH_REPORTER.swap(ptr::null_mut(), SeqCst);
    if !old.is_null() {
        // Safety: This can only come from a box in `set_crash_callback`.
        unsafe {
            std::mem::drop(Box::from_raw(old));
        }
    }
}

pub(crate) extern "C" fn handle_posix_sigaction(
    signum: i32,
    _sig_info: *mut siginfo_t,
    ucontext: *mut c_void,
) {
    // The first signal to arrive is the one reported, even if a second one
    // races it into the state transition below.
    let _ = ORIGINAL_SIGNUM.compare_exchange(0, signum, SeqCst, SeqCst);

    match HandlerState::from(
        STATE
            .compare_exchange(
                HandlerState::Armed as u8,
                HandlerState::Handling as u8,
                SeqCst,
                SeqCst,
            )
            .unwrap_or_else(|current| current),
    ) {
        // Won the transition, the value returned is the previous state.
        HandlerState::Armed => handle_fatal_signal(signum, ucontext),
        // Recursive crash: bypass everything.
        HandlerState::Handling | HandlerState::Terminated => {
            hard_exit(ORIGINAL_SIGNUM.load(SeqCst))
        }
        HandlerState::Disarmed => {
            let _ = ORIGINAL_SIGNUM.compare_exchange(signum, 0, SeqCst, SeqCst);
            raise_with_default_disposition(signum)
        }
    }
}

fn handle_fatal_signal(signum: i32, ucontext: *mut c_void) -> ! {
    let signal = SignalNames::from(signum);
    // Safety: the state is Handling, which keeps the registered instance
    // alive until the process exits.
    let logger = unsafe { registry::current() };
    let console_fd = logger.map_or(libc::STDOUT_FILENO, |logger| logger.console_fd());

    let _ = emit_crash_notice(console_fd, signal.as_str());

    if let Some(logger) = logger {
        // Safety: `ucontext` was handed to us by the kernel.
        let fault_ip = unsafe { platform::fault_ip(ucontext) };
        let trace = logger.record_stack_trace(fault_ip);
        let _ = emit_stack_trace_echo(console_fd, trace);
        logger.finalize(ExitReason::Crashed(signal));

        let reporter = CRASH_REPORTER.swap(ptr::null_mut(), SeqCst);
        if !reporter.is_null() {
            let info = logger.crash_info(signum, signal);
            // Safety: This can only come from a box in `set_crash_callback`. It is
            // deliberately leaked: dropping user code during a crash is not worth the risk.
            let reporter = unsafe { &*reporter };
            // A panic must never unwind into the signal frame.
            if panic::catch_unwind(AssertUnwindSafe(|| reporter.on_crash(&info))).is_err() {
                hard_exit(signum);
            }
        }
    }

    STATE.store(HandlerState::Terminated as u8, SeqCst);
    hard_exit(signum)
}

/// Exits with the shell convention for death by signal, without running
/// `atexit` handlers or destructors.
fn hard_exit(signum: i32) -> ! {
    let signum = if signum > 0 { signum } else { libc::SIGABRT };
    // Safety: No preconditions.
    unsafe { libc::_exit(128 + signum) }
}

/// Lets the platform default act on a signal that arrived while no session was
/// active. Signals are only delivered once, so it has to be raised again.
fn raise_with_default_disposition(signum: i32) {
    let Ok(signal) = crate::signal_from_signum(signum) else {
        hard_exit(signum)
    };
    let default = SigAction::new(SigHandler::SigDfl, SaFlags::empty(), signal::SigSet::empty());
    // Safety: installing SIG_DFL has no preconditions.
    if unsafe { signal::sigaction(signal, &default) }.is_err() {
        hard_exit(signum);
    }
    // Safety: No preconditions.
    unsafe { libc::raise(signum) };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn test_handler_state_from_u8() {
        assert_eq!(HandlerState::from(0), HandlerState::Disarmed);
        assert_eq!(HandlerState::from(1), HandlerState::Armed);
        assert_eq!(HandlerState::from(2), HandlerState::Handling);
        assert_eq!(HandlerState::from(3), HandlerState::Terminated);
        assert_eq!(HandlerState::from(200), HandlerState::Disarmed);
    }

    #[test]
    fn test_reporter_replacement_drops_previous() {
        struct Counted(Arc<AtomicUsize>);
        impl CrashReporter for Counted {
            fn on_crash(&self, _info: &CrashInfo) {}
        }
        impl Drop for Counted {
            fn drop(&mut self) {
                self.0.fetch_add(1, SeqCst);
            }
        }

        let drops = Arc::new(AtomicUsize::new(0));
        set_crash_callback(Counted(drops.clone()));
        set_crash_callback(|_info: &CrashInfo| {});
        assert_eq!(drops.load(SeqCst), 1);
        assert!(!CRASH_REPORTER.load(SeqCst).is_null());
        clear_crash_callback();
        assert!(CRASH_REPORTER.load(SeqCst).is_null());
    }
}
