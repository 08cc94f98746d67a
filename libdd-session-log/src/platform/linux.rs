// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::Platform;
use libc::ucontext_t;
use std::io;
use std::path::PathBuf;

const PROC_SELF_EXE: &str = "/proc/self/exe";

pub(crate) struct Linux;

impl Platform for Linux {
    fn executable_path(&self) -> io::Result<PathBuf> {
        std::fs::read_link(PROC_SELF_EXE)
    }

    // Still valid if the binary was replaced on disk since launch.
    fn relaunch_path(&self) -> io::Result<PathBuf> {
        Ok(PathBuf::from(PROC_SELF_EXE))
    }

    fn supports_backtrace(&self) -> bool {
        true
    }

    #[allow(unreachable_code)]
    unsafe fn fault_ip(&self, ucontext: *const ucontext_t) -> Option<usize> {
        if ucontext.is_null() {
            return None;
        }
        #[cfg(target_arch = "x86_64")]
        return Some((*ucontext).uc_mcontext.gregs[libc::REG_RIP as usize] as usize);
        #[cfg(target_arch = "aarch64")]
        return Some((*ucontext).uc_mcontext.pc as usize);
        None
    }
}
