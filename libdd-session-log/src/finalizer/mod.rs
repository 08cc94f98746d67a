// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Writes the session log. The header is written when the file is created, the
//! relay streams the body, and [`Finalizer::finalize`] appends the optional
//! stack trace section and the footer exactly once.

mod latch;
mod log_file;

pub(crate) use latch::FinalizeLatch;
pub(crate) use log_file::{log_path, LogFile};

use crate::crash_info::SignalNames;
use crate::identity::{FormattedDuration, SessionClock, LOG_TIMESTAMP_FORMAT};
use crate::interceptor::fd::FdWriter;
use crate::interceptor::OutputInterceptor;
use crate::shared::constants::*;
use chrono::Local;
use std::fmt;
use std::io::{self, Write};
use std::time::Duration;

/// Why the session ended, as written to the footer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    Normal,
    Crashed(SignalNames),
    Restart,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::Normal => f.write_str(EXIT_REASON_NORMAL),
            ExitReason::Crashed(signal) => write!(f, "{EXIT_REASON_CRASH_PREFIX}{signal}"),
            ExitReason::Restart => f.write_str(EXIT_REASON_RESTART),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FinalizeOutcome {
    Written { relay_drained: bool },
    AlreadyFinalized,
}

pub(crate) fn write_header(w: &mut impl Write, app: &str, start: &str) -> io::Result<()> {
    writeln!(w, "{SESSION_LOG_BEGIN_HEADER}")?;
    writeln!(w, "App: {app}")?;
    writeln!(w, "Start: {start}")?;
    writeln!(w, "{SESSION_LOG_BEGIN_BODY}")?;
    w.flush()
}

pub(crate) fn write_stack_trace(w: &mut impl Write, trace: &str) -> io::Result<()> {
    writeln!(w)?;
    writeln!(w, "{SESSION_LOG_BEGIN_STACKTRACE}")?;
    w.write_all(trace.as_bytes())?;
    if !trace.ends_with('\n') {
        writeln!(w)?;
    }
    w.flush()
}

pub(crate) fn write_footer(
    w: &mut impl Write,
    reason: ExitReason,
    end: &impl fmt::Display,
    elapsed_ms: u64,
) -> io::Result<()> {
    writeln!(w)?;
    writeln!(w, "{SESSION_LOG_BEGIN_FOOTER}")?;
    writeln!(w, "Exit: {reason} at {end}")?;
    writeln!(w, "Duration: {} (HH:MM:SS:CS)", FormattedDuration(elapsed_ms))?;
    w.flush()
}

pub(crate) struct Finalizer {
    latch: FinalizeLatch,
    log: LogFile,
    drain_timeout: Duration,
}

impl Finalizer {
    pub fn new(log: LogFile, drain_timeout: Duration) -> Self {
        Self {
            latch: FinalizeLatch::default(),
            log,
            drain_timeout,
        }
    }

    pub fn log(&self) -> &LogFile {
        &self.log
    }

    pub fn is_finalized(&self) -> bool {
        self.latch.is_finalized()
    }

    /// Ends the session. Idempotent: only the first call writes.
    ///
    /// SIGNAL SAFETY:
    ///     Reachable from the signal handler. Descriptors are restored with
    ///     `dup2`, waiting uses `nanosleep`, and the trailer is written with
    ///     `write` through a non-allocating adapter. Formatting the local end
    ///     time goes through chrono, which is not guaranteed to be signal safe.
    pub fn finalize(
        &self,
        reason: ExitReason,
        interceptor: Option<&OutputInterceptor>,
        clock: &SessionClock,
        stack_trace: Option<&str>,
    ) -> FinalizeOutcome {
        if !self.latch.try_begin() {
            self.latch.wait_done(self.drain_timeout);
            return FinalizeOutcome::AlreadyFinalized;
        }

        let mut relay_drained = true;
        let console_fd = match interceptor {
            Some(interceptor) => {
                interceptor.restore();
                relay_drained = interceptor.drain(self.drain_timeout);
                interceptor.console_fd()
            }
            None => libc::STDOUT_FILENO,
        };

        let elapsed_ms = clock.elapsed_ms();
        let end = Local::now().format(LOG_TIMESTAMP_FORMAT);
        if let Some(fd) = self.log.fd() {
            let mut w = FdWriter(fd);
            if let Some(trace) = stack_trace {
                let _ = write_stack_trace(&mut w, trace);
            }
            let _ = write_footer(&mut w, reason, &end, elapsed_ms);
        }
        let _ = write_footer(&mut FdWriter(console_fd), reason, &end, elapsed_ms);

        self.latch.complete();
        FinalizeOutcome::Written { relay_drained }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_reasons() {
        assert_eq!(ExitReason::Normal.to_string(), "Normal exit");
        assert_eq!(
            ExitReason::Crashed(SignalNames::SIGSEGV).to_string(),
            "Crashed: SIGSEGV"
        );
        assert_eq!(
            ExitReason::Restart.to_string(),
            "Application restart initiated"
        );
    }

    #[test]
    fn test_log_layout() {
        let mut out = Vec::new();
        write_header(&mut out, "server", "2025/01/02 03:04:05").unwrap();
        out.extend_from_slice(b"AB");
        write_stack_trace(&mut out, "#0  0x0000000000001234").unwrap();
        write_footer(
            &mut out,
            ExitReason::Crashed(SignalNames::SIGABRT),
            &"2025/01/02 04:06:08",
            3_723_456,
        )
        .unwrap();

        let expected = format!(
            "{SESSION_LOG_BEGIN_HEADER}\nApp: server\nStart: 2025/01/02 03:04:05\n\
             {SESSION_LOG_BEGIN_BODY}\nAB\n{SESSION_LOG_BEGIN_STACKTRACE}\n\
             #0  0x0000000000001234\n\n{SESSION_LOG_BEGIN_FOOTER}\n\
             Exit: Crashed: SIGABRT at 2025/01/02 04:06:08\n\
             Duration: 01:02:03:45 (HH:MM:SS:CS)\n"
        );
        assert_eq!(String::from_utf8(out).unwrap(), expected);
    }

    #[test]
    fn test_finalize_writes_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        let log = LogFile::create(path.clone());
        write_header(&mut FdWriter(log.fd().unwrap()), "app", "start").unwrap();
        let finalizer = Finalizer::new(log, Duration::from_millis(10));
        let clock = SessionClock::start();

        assert!(!finalizer.is_finalized());
        assert_eq!(
            finalizer.finalize(ExitReason::Normal, None, &clock, None),
            FinalizeOutcome::Written {
                relay_drained: true
            }
        );
        assert_eq!(
            finalizer.finalize(
                ExitReason::Crashed(SignalNames::SIGSEGV),
                None,
                &clock,
                Some("trace")
            ),
            FinalizeOutcome::AlreadyFinalized
        );
        assert!(finalizer.is_finalized());

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.matches(SESSION_LOG_BEGIN_HEADER).count(), 1);
        assert_eq!(contents.matches(SESSION_LOG_BEGIN_FOOTER).count(), 1);
        assert!(contents.contains("Exit: Normal exit at "));
        assert!(!contents.contains("SIGSEGV"));
        assert!(!contents.contains(SESSION_LOG_BEGIN_STACKTRACE));
    }
}
