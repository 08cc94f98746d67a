// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Crash-safe session logging.
//!
//! A [`SessionLogger`] owns one logging session for the lifetime of the process:
//! 1. At construction it resolves the executable name, opens
//!    `<log_dir>/<executable>_<timestamp>.log`, writes the header block, and
//!    redirects the standard output and error descriptors into a pipe. A
//!    single relay thread drains that pipe and forwards every chunk, in order,
//!    to the original standard output, to the log file, and to an in-memory
//!    capture buffer.
//! 2. It installs handlers for a fixed set of fatal signals. A signal moves a
//!    small process-wide state machine from `Armed` to `Handling`; the handler
//!    writes a crash notice, captures a backtrace, finalizes the log with a
//!    `Crashed: <SIGNAL>` reason and hands a [`CrashInfo`] snapshot to the
//!    registered [`CrashReporter`], if any. The process then exits with
//!    `128 + signum`. A fault raised while `Handling` bypasses everything and
//!    exits immediately.
//! 3. Dropping the logger finalizes the log with `Normal exit`, restores the
//!    original descriptors and signal dispositions, and deregisters it.
//!
//! The log is finalized at most once per session, whichever of these paths
//! gets there first. [`restart`] and [`terminate`] are the control points a
//! crash reporter calls back into.
//!
//! The signal path runs in a constrained environment:
//! <https://man7.org/linux/man-pages/man7/signal-safety.7.html>
//! It only touches lock-free state and raw descriptors, with the exception of
//! symbol resolution and the snapshot handed to the reporter, both of which
//! allocate.
#![cfg(unix)]
#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

mod collector;
mod crash_info;
mod finalizer;
mod identity;
mod interceptor;
mod platform;
mod session;
mod shared;

pub use collector::{
    clear_crash_callback, handler_state, set_crash_callback, CrashReporter, HandlerState,
};
pub use crash_info::{default_signals, signal_from_signum, CrashInfo, SignalNames};
pub use finalizer::ExitReason;
pub use identity::{
    elapsed_ms, format_duration, resolve_executable_name, timestamp_for_filename,
    timestamp_for_log, ExecutableIdentity, FormattedDuration, SessionClock,
};
pub use session::{restart, terminate, PreparedExecve, PreparedExecveError, SessionLogError};
pub use session::SessionLogger;
pub use shared::configuration::{SessionLogConfig, StacktraceCollection};
pub use shared::constants;
