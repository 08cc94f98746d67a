// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

mod controller;
mod execve;
pub(crate) mod registry;
mod state;

pub use controller::{restart, terminate};
pub use execve::{PreparedExecve, PreparedExecveError};

use crate::collector::{
    self, handler_state, register_session_handlers, restore_default_dispositions, HandlerState,
};
use crate::finalizer::{ExitReason, FinalizeOutcome};
use crate::interceptor::fd::FdWriter;
use crate::shared::configuration::SessionLogConfig;
use chrono::{DateTime, Local};
use state::LoggerState;
use std::io::{self, Write};
use std::path::Path;
use std::ptr::NonNull;

#[derive(Debug, thiserror::Error)]
pub enum SessionLogError {
    #[error("A session logger is already registered in this process")]
    AlreadyRegistered,
    #[error("Failed to register the crash signal handlers: {0}")]
    SignalRegistration(anyhow::Error),
    #[error("Invalid session log configuration: {0}")]
    Configuration(#[from] anyhow::Error),
}

/// The single logging session of this process. Keep it alive for as long as
/// output should be captured, typically by binding it at the top of `main`.
///
/// Dropping it finalizes the log with "Normal exit", restores the original
/// output descriptors and signal dispositions, and deregisters it.
pub struct SessionLogger {
    // Owned, from `Box::leak`. The registry holds a non-owning copy.
    state: NonNull<LoggerState>,
}

// Safety: `LoggerState` only holds atomics, a mutex-guarded capture buffer and
// immutable data, and is never handed out mutably.
unsafe impl Send for SessionLogger {}
unsafe impl Sync for SessionLogger {}

impl SessionLogger {
    /// Starts the session: opens the log, captures the standard descriptors
    /// and arms the crash handler. A log file or capture that cannot be set up
    /// degrades the session; only a second logger or a failure to install the
    /// signal handlers is an error.
    pub fn new(config: SessionLogConfig) -> Result<Self, SessionLogError> {
        if registry::is_registered() {
            return Err(SessionLogError::AlreadyRegistered);
        }

        let state = NonNull::from(Box::leak(Box::new(LoggerState::open(config))));
        if !registry::register(state.as_ptr()) {
            // Safety: never published, so this is the only reference.
            unsafe { discard(state) };
            return Err(SessionLogError::AlreadyRegistered);
        }

        // Safety: owned by us and registered.
        let logger = unsafe { state.as_ref() };
        if let Err(e) = register_session_handlers(logger.config()) {
            restore_default_dispositions(logger.config().signals());
            registry::deregister(state.as_ptr());
            // Safety: nothing can reach the instance with the handlers gone and
            // the registry cleared.
            unsafe { discard(state) };
            return Err(SessionLogError::SignalRegistration(e));
        }
        collector::arm();

        let _ = writeln!(
            FdWriter(logger.console_fd()),
            "Outputs of {} in this session are saved in: {}",
            logger.executable_name(),
            logger.log_path().display()
        );
        tracing::debug!(path = %logger.log_path().display(), "Session logger registered");
        Ok(Self { state })
    }

    /// A session configured from the `DD_SESSION_LOG_*` environment variables.
    pub fn from_env() -> Result<Self, SessionLogError> {
        Self::new(SessionLogConfig::from_env()?)
    }

    fn state(&self) -> &LoggerState {
        // Safety: the instance lives until `drop`.
        unsafe { self.state.as_ref() }
    }

    pub fn config(&self) -> &SessionLogConfig {
        self.state().config()
    }

    pub fn executable_name(&self) -> &str {
        self.state().executable_name()
    }

    pub fn log_path(&self) -> &Path {
        self.state().log_path()
    }

    pub fn start_time(&self) -> DateTime<Local> {
        self.state().clock().start_time()
    }

    /// The trace captured by the crash handler, if a crash was handled.
    pub fn stack_trace(&self) -> Option<&str> {
        self.state().stack_trace()
    }

    /// Everything written to standard output and error so far. `None` when
    /// output is not being captured.
    pub fn log_content(&self) -> Option<String> {
        self.state().log_content()
    }

    pub fn is_finalized(&self) -> bool {
        self.state().is_finalized()
    }

    /// Finalizes the log now. Returns false if it was already finalized, in
    /// which case nothing is written.
    pub fn finalize(&self, reason: ExitReason) -> bool {
        let _ = io::stdout().flush();
        let _ = io::stderr().flush();
        match self.state().finalize(reason) {
            FinalizeOutcome::Written { relay_drained } => {
                if !relay_drained {
                    tracing::warn!("Session log finalized before the relay drained");
                }
                tracing::debug!(%reason, "Session log finalized");
                true
            }
            FinalizeOutcome::AlreadyFinalized => false,
        }
    }
}

impl Drop for SessionLogger {
    fn drop(&mut self) {
        self.finalize(ExitReason::Normal);
        restore_default_dispositions(self.config().signals());
        collector::disarm();
        registry::deregister(self.state.as_ptr());

        // A fatal signal on another thread got in first and is using the
        // instance. The process is about to exit.
        if matches!(
            handler_state(),
            HandlerState::Handling | HandlerState::Terminated
        ) {
            loop {
                std::thread::park();
            }
        }

        // Safety: deregistered, disarmed, and no handler is running.
        unsafe { discard(self.state) };
        tracing::debug!("Session logger deregistered");
    }
}

/// # Safety
/// `state` must come from `Box::leak` and nothing else may reference it.
unsafe fn discard(state: NonNull<LoggerState>) {
    let state = Box::from_raw(state.as_ptr());
    state.shutdown();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::constants::*;

    #[test]
    #[cfg_attr(miri, ignore)]
    fn test_session_lifecycle_without_capture() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = SessionLogConfig::default();
        config.set_log_dir(Some(dir.path().to_path_buf()));
        config.set_intercept_output(false);
        config.set_create_alt_stack(false).unwrap();
        // Not used by any other test in this crate.
        config.set_signals(vec![libc::SIGUSR1]).unwrap();

        let logger = SessionLogger::new(config.clone()).unwrap();
        assert_eq!(handler_state(), HandlerState::Armed);
        assert!(matches!(
            SessionLogger::new(config),
            Err(SessionLogError::AlreadyRegistered)
        ));
        assert!(!logger.is_finalized());
        assert_eq!(logger.stack_trace(), None);
        assert_eq!(logger.log_content(), None);
        let path = logger.log_path().to_path_buf();
        assert!(path.starts_with(dir.path()));

        drop(logger);
        assert_eq!(handler_state(), HandlerState::Disarmed);
        assert!(!registry::is_registered());

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.matches(SESSION_LOG_BEGIN_HEADER).count(), 1);
        assert_eq!(contents.matches(SESSION_LOG_BEGIN_FOOTER).count(), 1);
        assert!(contents.contains("Exit: Normal exit at "));
    }
}
