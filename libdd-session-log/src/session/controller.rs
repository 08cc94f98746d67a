// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Control points for a crash reporter. Both are safe to call from inside the
//! reporter, i.e. while the fatal signal is being handled, and neither returns.

use super::execve::PreparedExecve;
use super::registry;
use crate::collector::{self, handler_state, restore_default_dispositions, HandlerState};
use crate::crash_info::default_signals;
use crate::finalizer::ExitReason;
use crate::platform;
use std::io::{self, Write};

fn handling() -> bool {
    handler_state() == HandlerState::Handling
}

/// `exit` runs `atexit` handlers, which is not an option from a signal frame.
fn exit_success() -> ! {
    if handling() {
        // Safety: No preconditions.
        unsafe { libc::_exit(0) }
    }
    std::process::exit(0)
}

/// Finalizes the log with "Application restart initiated" and replaces the
/// process image with a fresh launch of the same executable, same arguments
/// and environment. Only the standard descriptors are inherited. If the
/// relaunch fails, exits with status 0.
///
/// Outside of a crash, this must not race with the logger being dropped.
pub fn restart() -> ! {
    if !handling() {
        let _ = io::stdout().flush();
        let _ = io::stderr().flush();
    }

    // Safety: in Handling, teardown parks instead of freeing. Otherwise see above.
    let logger = unsafe { registry::current() };
    let fallback;
    let execve = match logger {
        Some(logger) => {
            logger.finalize(ExitReason::Restart);
            logger.restart_execve()
        }
        None => {
            fallback = PreparedExecve::for_current_process().ok();
            fallback.as_ref()
        }
    };

    if let Some(execve) = execve {
        close_inherited_descriptors();
        // Only returns on failure, and nothing can be reported with the descriptors gone.
        let _ = execve.exec();
    }
    exit_success()
}

/// Stops capturing fatal signals, tears down the registered logger and exits
/// with status 0. The log is finalized with "Normal exit" unless a crash or a
/// restart already finalized it.
pub fn terminate() -> ! {
    if !handling() {
        let _ = io::stdout().flush();
        let _ = io::stderr().flush();
    }

    match registry::take() {
        Some(logger) => {
            restore_default_dispositions(logger.config().signals());
            collector::disarm();
            logger.finalize(ExitReason::Normal);
            // The instance itself is left to the OS: the owning handle may still
            // be on another thread's stack.
            logger.shutdown();
        }
        None => {
            restore_default_dispositions(&default_signals());
            collector::disarm();
        }
    }
    exit_success()
}

/// Closes every descriptor above the standard three. Only calls `close`.
fn close_inherited_descriptors() {
    for fd in 3..platform::current().max_fd() {
        // Safety: No preconditions. EBADF is expected and ignored.
        unsafe { libc::close(fd) };
    }
}
