// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::Platform;
use libc::ucontext_t;
use std::io;
use std::path::PathBuf;

pub(crate) struct MacOs;

impl Platform for MacOs {
    fn executable_path(&self) -> io::Result<PathBuf> {
        std::env::current_exe()
    }

    fn relaunch_path(&self) -> io::Result<PathBuf> {
        std::env::current_exe()
    }

    fn supports_backtrace(&self) -> bool {
        true
    }

    #[allow(unreachable_code)]
    unsafe fn fault_ip(&self, ucontext: *const ucontext_t) -> Option<usize> {
        if ucontext.is_null() || (*ucontext).uc_mcontext.is_null() {
            return None;
        }
        #[cfg(target_arch = "x86_64")]
        return Some((*(*ucontext).uc_mcontext).__ss.__rip as usize);
        #[cfg(target_arch = "aarch64")]
        return Some((*(*ucontext).uc_mcontext).__ss.__pc as usize);
        None
    }
}
