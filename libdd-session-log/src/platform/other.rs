// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::Platform;
use libc::ucontext_t;
use std::io;
use std::path::PathBuf;

/// Fallback for unix targets without a dedicated implementation. Stack traces
/// are reported as unavailable.
pub(crate) struct GenericUnix;

impl Platform for GenericUnix {
    fn executable_path(&self) -> io::Result<PathBuf> {
        std::env::current_exe()
    }

    fn relaunch_path(&self) -> io::Result<PathBuf> {
        std::env::current_exe()
    }

    fn supports_backtrace(&self) -> bool {
        false
    }

    unsafe fn fault_ip(&self, _ucontext: *const ucontext_t) -> Option<usize> {
        None
    }
}
