// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Platform capabilities: executable lookup, relaunch target, descriptor ceiling and
//! backtrace support. Each target OS provides one implementation of [`Platform`].

use libc::{c_void, ucontext_t};
use std::io;
use std::os::fd::RawFd;
use std::path::PathBuf;

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "macos")]
mod macos;
#[cfg(not(any(target_os = "linux", target_os = "macos")))]
mod other;

/// Maximum number of frames to collect in a backtrace.
///
/// This limit prevents runaway frame walking in case of stack corruption.
pub const MAX_BACKTRACE_FRAMES: usize = 64;

// Closing every descriptor up to a huge RLIMIT_NOFILE would stall a restart.
const DESCRIPTOR_CEILING: RawFd = 65536;

pub(crate) trait Platform: Sync {
    /// Path of the running binary, used to name the session.
    fn executable_path(&self) -> io::Result<PathBuf>;

    /// Path handed to `execve` when relaunching the current process.
    fn relaunch_path(&self) -> io::Result<PathBuf>;

    /// Whether `backtrace::trace_unsynchronized` yields frames on this target.
    fn supports_backtrace(&self) -> bool;

    /// Instruction pointer of the faulting frame, if the context exposes it.
    ///
    /// # Safety
    /// `ucontext` must be null or point to the context passed to a `SA_SIGINFO` handler.
    unsafe fn fault_ip(&self, ucontext: *const ucontext_t) -> Option<usize>;

    /// One past the highest descriptor number that may be open.
    fn max_fd(&self) -> RawFd {
        // Safety: No preconditions.
        let max = unsafe { libc::sysconf(libc::_SC_OPEN_MAX) };
        if max <= 0 {
            return 1024;
        }
        RawFd::try_from(max)
            .unwrap_or(DESCRIPTOR_CEILING)
            .min(DESCRIPTOR_CEILING)
    }
}

#[cfg(target_os = "linux")]
static PLATFORM: linux::Linux = linux::Linux;
#[cfg(target_os = "macos")]
static PLATFORM: macos::MacOs = macos::MacOs;
#[cfg(not(any(target_os = "linux", target_os = "macos")))]
static PLATFORM: other::GenericUnix = other::GenericUnix;

pub(crate) fn current() -> &'static dyn Platform {
    &PLATFORM
}

/// Opaque, non-zero identifier of the calling thread. `pthread_self` is
/// async-signal-safe, unlike `std::thread::current`.
pub(crate) fn current_thread_token() -> usize {
    // Safety: No preconditions.
    unsafe { libc::pthread_self() as usize }
}

/// # Safety
/// Same as [`Platform::fault_ip`].
pub(crate) unsafe fn fault_ip(ucontext: *const c_void) -> Option<usize> {
    current().fault_ip(ucontext as *const ucontext_t)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_executable_path_points_at_test_binary() {
        let path = current().executable_path().unwrap();
        assert!(path.is_absolute());
        assert_eq!(path, std::env::current_exe().unwrap());
    }

    #[test]
    fn test_max_fd_is_bounded() {
        let max = current().max_fd();
        assert!(max > 2);
        assert!(max <= DESCRIPTOR_CEILING);
    }

    #[test]
    fn test_thread_tokens_differ_between_threads() {
        let here = current_thread_token();
        assert_ne!(here, 0);
        assert_eq!(here, current_thread_token());
        let there = std::thread::spawn(current_thread_token).join().unwrap();
        assert_ne!(here, there);
    }

    #[test]
    fn test_null_context_has_no_ip() {
        assert_eq!(unsafe { fault_ip(std::ptr::null()) }, None);
    }
}
