// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::platform;
use nix::errno::Errno;
use std::ffi::{CString, NulError, OsString};
use std::os::unix::ffi::OsStringExt;
use std::path::Path;

/// A fully built `execve` argument block. Everything is allocated up front so
/// that relaunching from a crash reporter does not touch the allocator.
// The cstring fields are just storage: the pointer arrays point into them.
#[allow(dead_code)]
#[derive(Debug)]
pub struct PreparedExecve {
    binary_path: CString,
    args_cstrings: Vec<CString>,
    args_ptrs: Vec<*const libc::c_char>,
    env_vars_cstrings: Vec<CString>,
    env_vars_ptrs: Vec<*const libc::c_char>,
}

// Safety: the raw pointers only ever point into the `CString`s owned by the
// same value, which are never mutated after construction.
unsafe impl Send for PreparedExecve {}
unsafe impl Sync for PreparedExecve {}

#[derive(Debug, thiserror::Error)]
pub enum PreparedExecveError {
    #[error("Failed to resolve the relaunch path: {0}")]
    RelaunchPath(std::io::Error),
    #[error("Failed to convert binary path to CString: {0}")]
    BinaryPathError(NulError),
    #[error("Failed to convert argument to CString: {0}")]
    ArgumentError(NulError),
    #[error("Failed to convert environment variable to CString: {0}")]
    EnvironmentError(NulError),
}

impl PreparedExecve {
    pub fn new(
        binary_path: &Path,
        args: impl IntoIterator<Item = OsString>,
        env: impl IntoIterator<Item = (OsString, OsString)>,
    ) -> Result<Self, PreparedExecveError> {
        let binary_path = CString::new(binary_path.as_os_str().to_owned().into_vec())
            .map_err(PreparedExecveError::BinaryPathError)?;

        let args_cstrings = args
            .into_iter()
            .map(|arg| CString::new(arg.into_vec()))
            .collect::<Result<Vec<CString>, NulError>>()
            .map_err(PreparedExecveError::ArgumentError)?;
        let args_ptrs = null_terminated(&args_cstrings);

        let env_vars_cstrings = env
            .into_iter()
            .map(|(key, value)| {
                let mut entry = key.into_vec();
                entry.push(b'=');
                entry.extend(value.into_vec());
                CString::new(entry)
            })
            .collect::<Result<Vec<CString>, NulError>>()
            .map_err(PreparedExecveError::EnvironmentError)?;
        let env_vars_ptrs = null_terminated(&env_vars_cstrings);

        Ok(Self {
            binary_path,
            args_cstrings,
            args_ptrs,
            env_vars_cstrings,
            env_vars_ptrs,
        })
    }

    /// Relaunches the running binary with the current argv and environment.
    pub fn for_current_process() -> Result<Self, PreparedExecveError> {
        let binary_path = platform::current()
            .relaunch_path()
            .map_err(PreparedExecveError::RelaunchPath)?;
        Self::new(&binary_path, std::env::args_os(), std::env::vars_os())
    }

    /// Calls `execve` on the prepared arguments. Only returns on failure.
    pub fn exec(&self) -> Result<(), Errno> {
        // Safety: the only way to make one of these is through `new`, which ensures that everything
        // is well-formed and null terminated.
        unsafe {
            if libc::execve(
                self.binary_path.as_ptr(),
                self.args_ptrs.as_ptr(),
                self.env_vars_ptrs.as_ptr(),
            ) == -1
            {
                Err(Errno::last())
            } else {
                Ok(())
            }
        }
    }
}

fn null_terminated(strings: &[CString]) -> Vec<*const libc::c_char> {
    strings
        .iter()
        .map(|s| s.as_ptr())
        .chain(std::iter::once(std::ptr::null()))
        .collect()
}

#[cfg(test)]
mod tests {
    // None of these tests call exec(), which would replace the test runner. Relaunching is
    // covered by the restart scenario in bin_tests.
    use super::*;

    fn os(s: &str) -> OsString {
        OsString::from(s)
    }

    #[test]
    fn test_prepared_execve_layout() {
        let prepared = PreparedExecve::new(
            Path::new("/bin/echo"),
            vec![os("echo"), os("with 🦀 emoji")],
            vec![(os("PATH"), os("/bin:/usr/bin"))],
        )
        .unwrap();

        assert_eq!(prepared.args_ptrs.len(), 3);
        assert!(prepared.args_ptrs[2].is_null());
        assert_eq!(prepared.env_vars_ptrs.len(), 2);
        assert!(prepared.env_vars_ptrs[1].is_null());
        assert_eq!(
            prepared.env_vars_cstrings[0].to_str().unwrap(),
            "PATH=/bin:/usr/bin"
        );
    }

    #[test]
    fn test_prepared_execve_empty() {
        let prepared = PreparedExecve::new(Path::new("/bin/true"), vec![], vec![]).unwrap();
        assert_eq!(prepared.args_ptrs, vec![std::ptr::null()]);
        assert_eq!(prepared.env_vars_ptrs, vec![std::ptr::null()]);
    }

    #[test]
    fn test_prepared_execve_null_bytes() {
        assert!(matches!(
            PreparedExecve::new(Path::new("/bin/test\0nul"), vec![], vec![]),
            Err(PreparedExecveError::BinaryPathError(_))
        ));
        assert!(matches!(
            PreparedExecve::new(Path::new("/bin/echo"), vec![os("a\0b")], vec![]),
            Err(PreparedExecveError::ArgumentError(_))
        ));
        assert!(matches!(
            PreparedExecve::new(Path::new("/bin/echo"), vec![], vec![(os("K"), os("v\0"))]),
            Err(PreparedExecveError::EnvironmentError(_))
        ));
    }

    #[test]
    fn test_for_current_process() {
        let prepared = PreparedExecve::for_current_process().unwrap();
        assert!(!prepared.binary_path.as_bytes().is_empty());
        assert_eq!(prepared.args_cstrings.len(), std::env::args_os().count());
    }
}
