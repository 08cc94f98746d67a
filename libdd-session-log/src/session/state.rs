// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::execve::PreparedExecve;
use crate::collector::emitters::collect_stack_trace;
use crate::crash_info::{CrashInfo, SignalNames};
use crate::finalizer::{log_path, write_header, ExitReason, FinalizeOutcome, Finalizer, LogFile};
use crate::identity::{timestamp_for_log, ExecutableIdentity, SessionClock};
use crate::interceptor::fd::FdWriter;
use crate::interceptor::OutputInterceptor;
use crate::shared::configuration::SessionLogConfig;
use std::os::fd::RawFd;
use std::path::Path;
use std::sync::OnceLock;

/// Everything a session owns. Lives on the heap at a stable address so the
/// signal handler can reach it through the registry.
pub(crate) struct LoggerState {
    config: SessionLogConfig,
    identity: ExecutableIdentity,
    clock: SessionClock,
    finalizer: Finalizer,
    interceptor: Option<OutputInterceptor>,
    restart_execve: Option<PreparedExecve>,
    stack_trace: OnceLock<String>,
}

impl LoggerState {
    /// Opens the log, writes its header and installs the interceptor. Every
    /// failure here degrades the session instead of failing it.
    pub fn open(config: SessionLogConfig) -> Self {
        let identity = ExecutableIdentity::resolve();
        let clock = SessionClock::start();
        let log = LogFile::create(log_path(
            &config.log_dir(),
            identity.name(),
            &clock.filename_timestamp(),
        ));

        if let Some(fd) = log.fd() {
            if let Err(e) = write_header(&mut FdWriter(fd), identity.name(), &clock.start_display())
            {
                tracing::warn!(path = %log.path().display(), error = %e, "Unable to write the session log header");
            }
        }

        let interceptor = if config.intercept_output() {
            match OutputInterceptor::install(log.fd()) {
                Ok(interceptor) => Some(interceptor),
                Err(e) => {
                    tracing::warn!(error = %e, "Output capture disabled for this session");
                    None
                }
            }
        } else {
            None
        };

        let restart_execve = match PreparedExecve::for_current_process() {
            Ok(execve) => Some(execve),
            Err(e) => {
                tracing::warn!(error = %e, "Restart will fall back to a plain exit");
                None
            }
        };

        Self {
            finalizer: Finalizer::new(log, config.drain_timeout()),
            config,
            identity,
            clock,
            interceptor,
            restart_execve,
            stack_trace: OnceLock::new(),
        }
    }

    pub fn config(&self) -> &SessionLogConfig {
        &self.config
    }

    pub fn executable_name(&self) -> &str {
        self.identity.name()
    }

    pub fn log_path(&self) -> &Path {
        self.finalizer.log().path()
    }

    pub fn clock(&self) -> &SessionClock {
        &self.clock
    }

    pub fn restart_execve(&self) -> Option<&PreparedExecve> {
        self.restart_execve.as_ref()
    }

    pub fn is_finalized(&self) -> bool {
        self.finalizer.is_finalized()
    }

    /// The original standard output while output is intercepted, otherwise descriptor 1.
    pub fn console_fd(&self) -> RawFd {
        self.interceptor
            .as_ref()
            .map_or(libc::STDOUT_FILENO, OutputInterceptor::console_fd)
    }

    pub fn stack_trace(&self) -> Option<&str> {
        self.stack_trace.get().map(String::as_str)
    }

    /// Collects the trace of the calling thread the first time it is called.
    /// Later calls return the first trace.
    pub fn record_stack_trace(&self, fault_ip: Option<usize>) -> &str {
        self.stack_trace.get_or_init(|| {
            // Safety: only called from the signal handler, on the faulting thread.
            unsafe { collect_stack_trace(self.config.resolve_frames(), fault_ip) }
        })
    }

    pub fn finalize(&self, reason: ExitReason) -> FinalizeOutcome {
        self.finalizer.finalize(
            reason,
            self.interceptor.as_ref(),
            &self.clock,
            self.stack_trace(),
        )
    }

    /// Everything captured so far, lossily decoded.
    pub fn log_content(&self) -> Option<String> {
        self.interceptor
            .as_ref()
            .map(|interceptor| String::from_utf8_lossy(&interceptor.captured()).into_owned())
    }

    /// Builds the snapshot handed to the crash reporter. The captured body is
    /// left out if the relay holds the capture lock, since the relay may be
    /// the thread that crashed.
    pub fn crash_info(&self, signum: i32, signal: SignalNames) -> CrashInfo {
        let log_content = if self.config.include_log_content() {
            self.interceptor
                .as_ref()
                .and_then(OutputInterceptor::try_captured)
                .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        } else {
            None
        };
        CrashInfo {
            signal_name: signal.as_str().to_owned(),
            signal_number: signum,
            stack_trace: self.stack_trace().unwrap_or_default().to_owned(),
            timestamp: timestamp_for_log(),
            log_path: self.log_path().to_path_buf(),
            log_content,
            executable_name: self.executable_name().to_owned(),
            start_time: self.clock.start_display(),
            session_duration_ms: self.clock.elapsed_ms(),
        }
    }

    /// Restores the original descriptors and closes everything the session
    /// opened. Descriptors the relay may still use are leaked instead.
    pub fn shutdown(&self) {
        let close_log = match &self.interceptor {
            Some(interceptor) => {
                interceptor.restore();
                interceptor.drain(self.config.drain_timeout());
                interceptor.shutdown()
            }
            None => true,
        };
        if !close_log {
            tracing::warn!("Relay thread still running, leaking its descriptors");
        }
        self.finalizer.log().release(close_log);
    }
}
