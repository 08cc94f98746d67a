// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0
use super::crash_handler::handle_posix_sigaction;
use crate::shared::configuration::SessionLogConfig;
use crate::signal_from_signum;
use libc::{
    mmap, sigaltstack, MAP_ANON, MAP_FAILED, MAP_PRIVATE, PROT_NONE, PROT_READ, PROT_WRITE,
    SIGSTKSZ,
};
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler};
use std::ptr;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering::SeqCst;

// Linux seems to have the most, supporting up to 64 inclusive
// https://man7.org/linux/man-pages/man7/signal.7.html
pub(crate) const MAX_SIGNALS: usize = 65;

static ALT_STACK_CREATED: AtomicBool = AtomicBool::new(false);

/// Installs the crash handler for every configured signal.
/// Registration is attempted for each signal even if an earlier one fails; the
/// errors are reported together.
/// PRECONDITIONS:
///     The logger state must be registered before a signal can be usefully handled.
/// ATOMICITY:
///     Installing the handlers is not atomic. A signal delivered halfway through
///     is either handled by the session handler or by whatever was installed before.
pub(crate) fn register_session_handlers(config: &SessionLogConfig) -> anyhow::Result<()> {
    // Validate signal numbers will fit in the array.
    for signum in config.signals() {
        anyhow::ensure!(*signum > 0 && *signum < MAX_SIGNALS as i32);
    }

    // The altstack is mapped once per process and never unmapped.
    if config.create_alt_stack()
        && ALT_STACK_CREATED
            .compare_exchange(false, true, SeqCst, SeqCst)
            .is_ok()
    {
        // Safety: This function has no documented preconditions.
        if let Err(e) = unsafe { create_alt_stack() } {
            ALT_STACK_CREATED.store(false, SeqCst);
            return Err(e);
        }
    }

    let mut errors = vec![];
    for signum in config.signals() {
        // Safety: This function has no documented preconditions.
        if let Err(e) = unsafe { register_signal_handler(*signum, config.use_alt_stack()) } {
            errors.push(format!("Unable to register signal for {signum}: {e:?}"));
        }
    }
    anyhow::ensure!(
        errors.is_empty(),
        "Errors registering signal handlers {errors:?}"
    );
    Ok(())
}

/// Resets `signals` to their platform default disposition, so that a later
/// fault is no longer captured. Only calls `sigaction`.
pub(crate) fn restore_default_dispositions(signals: &[i32]) {
    let default = SigAction::new(SigHandler::SigDfl, SaFlags::empty(), signal::SigSet::empty());
    for signum in signals {
        if let Ok(signal) = signal_from_signum(*signum) {
            // Safety: installing SIG_DFL has no preconditions.
            let _ = unsafe { signal::sigaction(signal, &default) };
        }
    }
}

/// Allocates a signal altstack, and puts a guard page at the end.
/// Inspired by https://github.com/rust-lang/rust/pull/69969/files
unsafe fn create_alt_stack() -> anyhow::Result<()> {
    // Symbol resolution and formatting the trailer need far more than the
    // default SIGSTKSZ of 8KB: use the greater of 16 pages or SIGSTKSZ.
    let page_size = page_size::get();
    let sigalstack_base_size = std::cmp::max(SIGSTKSZ, 16 * page_size);
    let stackp = mmap(
        ptr::null_mut(),
        sigalstack_base_size + page_size,
        PROT_READ | PROT_WRITE,
        MAP_PRIVATE | MAP_ANON,
        -1,
        0,
    );
    anyhow::ensure!(
        stackp != MAP_FAILED,
        "failed to allocate an alternative stack"
    );
    let guard_result = libc::mprotect(stackp, page_size, PROT_NONE);
    anyhow::ensure!(
        guard_result == 0,
        "failed to set up alternative stack guard page"
    );
    let stackp = stackp.add(page_size);

    let stack = libc::stack_t {
        ss_sp: stackp,
        ss_flags: 0,
        ss_size: sigalstack_base_size,
    };
    let rval = sigaltstack(&stack, ptr::null_mut());
    anyhow::ensure!(rval == 0, "sigaltstack failed {rval}");
    Ok(())
}

unsafe fn register_signal_handler(signum: i32, use_alt_stack: bool) -> anyhow::Result<()> {
    let signal_type = signal_from_signum(signum)?;

    // A stack overflow is delivered as SIGSEGV and can only be handled on the altstack.
    let extra_saflags = if use_alt_stack {
        SaFlags::SA_ONSTACK
    } else {
        SaFlags::empty()
    };

    // SA_NODEFER lets a fault inside the handler re-enter it immediately, where
    // the recursive crash guard turns it into a hard exit.
    let sig_action = SigAction::new(
        SigHandler::SigAction(handle_posix_sigaction),
        SaFlags::SA_NODEFER | extra_saflags,
        signal::SigSet::empty(),
    );

    signal::sigaction(signal_type, &sig_action)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(target_os = "linux")]
    #[test]
    fn test_max_signals() {
        assert!(MAX_SIGNALS as libc::c_int > libc::SIGRTMAX());
    }

    #[test]
    fn test_register_and_restore() {
        // SIGUSR2 is not used anywhere else in this crate's tests.
        let mut config = SessionLogConfig::default();
        config.set_create_alt_stack(false).unwrap();
        config.set_signals(vec![libc::SIGUSR2]).unwrap();
        register_session_handlers(&config).unwrap();

        let current = unsafe {
            signal::sigaction(
                signal::Signal::SIGUSR2,
                &SigAction::new(SigHandler::SigDfl, SaFlags::empty(), signal::SigSet::empty()),
            )
        }
        .unwrap();
        assert!(matches!(current.handler(), SigHandler::SigAction(_)));
        assert!(current.flags().contains(SaFlags::SA_NODEFER));
        assert!(current.flags().contains(SaFlags::SA_ONSTACK));

        register_session_handlers(&config).unwrap();
        restore_default_dispositions(config.signals());
        let current = unsafe {
            signal::sigaction(
                signal::Signal::SIGUSR2,
                &SigAction::new(SigHandler::SigDfl, SaFlags::empty(), signal::SigSet::empty()),
            )
        }
        .unwrap();
        assert!(matches!(current.handler(), SigHandler::SigDfl));
    }
}
