// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::interceptor::fd::close_fd;
use crate::shared::constants::SESSION_LOG_FILE_EXTENSION;
use std::fs::OpenOptions;
use std::os::fd::{IntoRawFd, RawFd};
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicI32;
use std::sync::atomic::Ordering::SeqCst;

/// `<dir>/<executable>_<timestamp>.log`
pub(crate) fn log_path(dir: &Path, executable_name: &str, timestamp: &str) -> PathBuf {
    dir.join(format!(
        "{executable_name}_{timestamp}.{SESSION_LOG_FILE_EXTENSION}"
    ))
}

/// The durable sink. Held as a bare descriptor so that the relay, the
/// finalizer and the signal handler can all write to it without locking.
#[derive(Debug)]
pub(crate) struct LogFile {
    path: PathBuf,
    fd: AtomicI32,
}

impl LogFile {
    /// Creates or truncates the file. A file that cannot be opened leaves the
    /// session without a durable sink; console output is unaffected.
    pub fn create(path: PathBuf) -> Self {
        let fd = match OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
        {
            Ok(file) => file.into_raw_fd(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Unable to open session log");
                -1
            }
        };
        Self {
            path,
            fd: AtomicI32::new(fd),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn fd(&self) -> Option<RawFd> {
        Some(self.fd.load(SeqCst)).filter(|fd| *fd >= 0)
    }

    /// Gives up the descriptor. `close` is false while the relay may still
    /// write to it, in which case the descriptor is leaked.
    pub fn release(&self, close: bool) {
        let fd = self.fd.swap(-1, SeqCst);
        if close {
            close_fd(fd);
        }
    }
}

impl Drop for LogFile {
    fn drop(&mut self) {
        self.release(true);
    }
}
