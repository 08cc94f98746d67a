// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// The scenarios the session_log_bin_test binary can run.
/// Each mode corresponds to one way a session can end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TestMode {
    /// Writes "A" to stdout then "B" to stderr and returns from main.
    Normal,
    /// Finalizes explicitly twice, then returns from main.
    FinalizeTwice,
    RaiseSigterm,
    RaiseSigint,
    RaiseSigabrt,
    RaiseSigfpe,
    RaiseSigill,
    RaiseSigsegv,
    RaiseSigbus,
    RaiseSigquit,
    RaiseSigtrap,
    /// Write to an unmapped, non-null address (SIGSEGV with a real faulting frame)
    InvalidDeref,
    /// Raises SIGABRT with a reporter that dumps the CrashInfo as JSON.
    Callback,
    /// Raises SIGABRT with a reporter that faults.
    RecursiveCrash,
    /// Raises SIGABRT with a reporter that panics.
    CallbackPanic,
    /// Calls restart directly; the second run exits normally.
    Restart,
    /// Raises SIGSEGV with a reporter that restarts; the second run exits normally.
    RestartFromCallback,
    /// Raises SIGABRT with a reporter that terminates.
    Terminate,
    /// Calls terminate directly, outside any signal handling.
    TerminateDirect,
    /// Calls terminate directly, with an exit hook that raises SIGSEGV.
    TerminateThenFault,
}

impl TestMode {
    /// Returns the string representation used in command-line arguments.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::FinalizeTwice => "finalize_twice",
            Self::RaiseSigterm => "raise_sigterm",
            Self::RaiseSigint => "raise_sigint",
            Self::RaiseSigabrt => "raise_sigabrt",
            Self::RaiseSigfpe => "raise_sigfpe",
            Self::RaiseSigill => "raise_sigill",
            Self::RaiseSigsegv => "raise_sigsegv",
            Self::RaiseSigbus => "raise_sigbus",
            Self::RaiseSigquit => "raise_sigquit",
            Self::RaiseSigtrap => "raise_sigtrap",
            Self::InvalidDeref => "invalid_deref",
            Self::Callback => "callback",
            Self::RecursiveCrash => "recursive_crash",
            Self::CallbackPanic => "callback_panic",
            Self::Restart => "restart",
            Self::RestartFromCallback => "restart_from_callback",
            Self::Terminate => "terminate",
            Self::TerminateDirect => "terminate_direct",
            Self::TerminateThenFault => "terminate_then_fault",
        }
    }

    /// Returns all available test modes.
    pub const fn all() -> &'static [Self] {
        &[
            Self::Normal,
            Self::FinalizeTwice,
            Self::RaiseSigterm,
            Self::RaiseSigint,
            Self::RaiseSigabrt,
            Self::RaiseSigfpe,
            Self::RaiseSigill,
            Self::RaiseSigsegv,
            Self::RaiseSigbus,
            Self::RaiseSigquit,
            Self::RaiseSigtrap,
            Self::InvalidDeref,
            Self::Callback,
            Self::RecursiveCrash,
            Self::CallbackPanic,
            Self::Restart,
            Self::RestartFromCallback,
            Self::Terminate,
            Self::TerminateDirect,
            Self::TerminateThenFault,
        ]
    }

    pub const fn restarts(self) -> bool {
        matches!(self, Self::Restart | Self::RestartFromCallback)
    }

    /// The modes that raise one of the default signals and nothing else.
    pub const fn raising() -> &'static [Self] {
        &[
            Self::RaiseSigterm,
            Self::RaiseSigint,
            Self::RaiseSigabrt,
            Self::RaiseSigfpe,
            Self::RaiseSigill,
            Self::RaiseSigsegv,
            Self::RaiseSigbus,
            Self::RaiseSigquit,
            Self::RaiseSigtrap,
        ]
    }

    /// The signal this mode delivers to the process, if any.
    pub const fn signal(self) -> Option<libc::c_int> {
        match self {
            Self::RaiseSigterm => Some(libc::SIGTERM),
            Self::RaiseSigint => Some(libc::SIGINT),
            Self::RaiseSigabrt | Self::Callback | Self::RecursiveCrash => Some(libc::SIGABRT),
            Self::CallbackPanic | Self::Terminate => Some(libc::SIGABRT),
            Self::RaiseSigfpe => Some(libc::SIGFPE),
            Self::RaiseSigill => Some(libc::SIGILL),
            Self::RaiseSigsegv | Self::InvalidDeref | Self::RestartFromCallback => {
                Some(libc::SIGSEGV)
            }
            Self::RaiseSigbus => Some(libc::SIGBUS),
            Self::RaiseSigquit => Some(libc::SIGQUIT),
            Self::RaiseSigtrap => Some(libc::SIGTRAP),
            Self::Normal
            | Self::FinalizeTwice
            | Self::Restart
            | Self::TerminateDirect
            | Self::TerminateThenFault => None,
        }
    }
}

impl std::fmt::Display for TestMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TestMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| format!("Unknown test mode: {}", s))
    }
}
