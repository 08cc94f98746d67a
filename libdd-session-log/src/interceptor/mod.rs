// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Descriptor-level tee of standard output and standard error.
//!
//! Descriptors 1 and 2 each get their own pipe. One relay thread waits on both
//! read ends and sends every chunk back to the stream it came from, so a
//! `2>file` redirection keeps working, while the log and capture receive both
//! streams in the order the relay reads them. Anything writing to descriptors 1
//! and 2 is captured, including C libraries and child processes, not just
//! `std::io::stdout()`.

mod capture;
pub(crate) mod fd;
mod relay;

use capture::CaptureBuffer;
use fd::{close_fd, cloexec_pipe, dup2_fd, dup_fd};
use nix::errno::Errno;
use relay::{Relay, RelayStatus, RelayStream};
use std::io::{self, Write};
use std::os::fd::RawFd;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering::SeqCst;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum InterceptError {
    #[error("Failed to duplicate {stream}: {source}")]
    Duplicate { stream: &'static str, source: Errno },
    #[error("Failed to create the relay pipe for {stream}: {source}")]
    Pipe { stream: &'static str, source: Errno },
    #[error("Failed to redirect {stream} into the relay pipe: {source}")]
    Redirect { stream: &'static str, source: Errno },
    #[error("Failed to spawn the relay thread: {0}")]
    Spawn(io::Error),
}

pub(crate) struct OutputInterceptor {
    // Duplicates of the original descriptors 1 and 2.
    console_fd: RawFd,
    saved_stderr: RawFd,
    // Read ends of the stdout and stderr pipes.
    read_fds: [RawFd; 2],
    redirected: AtomicBool,
    released: AtomicBool,
    capture: Arc<CaptureBuffer>,
    status: Arc<RelayStatus>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl OutputInterceptor {
    /// Redirects descriptors 1 and 2 into the relay pipe. On error nothing is
    /// left redirected and every descriptor opened here is closed.
    pub fn install(log_fd: Option<RawFd>) -> Result<Self, InterceptError> {
        // Whatever std buffered so far belongs to the original destination.
        let _ = io::stdout().flush();
        let _ = io::stderr().flush();

        let console_fd = dup_fd(libc::STDOUT_FILENO).map_err(|source| {
            InterceptError::Duplicate {
                stream: "stdout",
                source,
            }
        })?;
        let saved_stderr = match dup_fd(libc::STDERR_FILENO) {
            Ok(fd) => fd,
            Err(source) => {
                close_fd(console_fd);
                return Err(InterceptError::Duplicate {
                    stream: "stderr",
                    source,
                });
            }
        };
        let (out_read, out_write) = match cloexec_pipe() {
            Ok(fds) => fds,
            Err(source) => {
                close_all(&[console_fd, saved_stderr]);
                return Err(InterceptError::Pipe {
                    stream: "stdout",
                    source,
                });
            }
        };
        let (err_read, err_write) = match cloexec_pipe() {
            Ok(fds) => fds,
            Err(source) => {
                close_all(&[console_fd, saved_stderr, out_read, out_write]);
                return Err(InterceptError::Pipe {
                    stream: "stderr",
                    source,
                });
            }
        };
        let opened = [console_fd, saved_stderr, out_read, out_write, err_read, err_write];

        if let Err(source) = dup2_fd(out_write, libc::STDOUT_FILENO) {
            close_all(&opened);
            return Err(InterceptError::Redirect {
                stream: "stdout",
                source,
            });
        }
        if let Err(source) = dup2_fd(err_write, libc::STDERR_FILENO) {
            let _ = dup2_fd(console_fd, libc::STDOUT_FILENO);
            close_all(&opened);
            return Err(InterceptError::Redirect {
                stream: "stderr",
                source,
            });
        }
        // Descriptors 1 and 2 are now the only writers.
        close_all(&[out_write, err_write]);

        let capture = Arc::new(CaptureBuffer::default());
        let status = Arc::new(RelayStatus::new());
        let relay = Relay {
            streams: vec![
                RelayStream {
                    read_fd: out_read,
                    console_fd,
                },
                RelayStream {
                    read_fd: err_read,
                    console_fd: saved_stderr,
                },
            ],
            log_fd,
            capture: capture.clone(),
            status: status.clone(),
        };
        let handle = match relay.spawn() {
            Ok(handle) => handle,
            Err(e) => {
                let _ = dup2_fd(console_fd, libc::STDOUT_FILENO);
                let _ = dup2_fd(saved_stderr, libc::STDERR_FILENO);
                close_all(&[console_fd, saved_stderr, out_read, err_read]);
                return Err(InterceptError::Spawn(e));
            }
        };

        Ok(Self {
            console_fd,
            saved_stderr,
            read_fds: [out_read, err_read],
            redirected: AtomicBool::new(true),
            released: AtomicBool::new(false),
            capture,
            status,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// The original standard output, bypassing the pipe.
    pub fn console_fd(&self) -> RawFd {
        if self.released.load(SeqCst) {
            libc::STDOUT_FILENO
        } else {
            self.console_fd
        }
    }

    /// Points descriptors 1 and 2 back at their original destinations. Once
    /// every other holder of the write ends is gone the relay sees end of
    /// stream on both pipes. Only calls `dup2`.
    pub fn restore(&self) -> bool {
        if !self.redirected.swap(false, SeqCst) {
            return false;
        }
        let _ = dup2_fd(self.console_fd, libc::STDOUT_FILENO);
        let _ = dup2_fd(self.saved_stderr, libc::STDERR_FILENO);
        true
    }

    /// Waits up to `timeout` for the relay to drain both pipes. On timeout the
    /// relay is told to stop forwarding, so nothing lands after the footer
    /// except a chunk that was already in flight.
    pub fn drain(&self, timeout: Duration) -> bool {
        let drained = self.status.wait_finished(timeout);
        if !drained {
            self.status.stop();
        }
        drained
    }

    pub fn captured(&self) -> Vec<u8> {
        self.capture.contents()
    }

    pub fn try_captured(&self) -> Option<Vec<u8>> {
        self.capture.try_contents()
    }

    /// Restores the descriptors and releases the relay's resources. Returns
    /// false, leaking the descriptors, while the relay is still running: it may
    /// still write to them, and a closed number could be reused underneath it.
    pub fn shutdown(&self) -> bool {
        self.restore();
        if !self.status.is_finished() {
            self.status.stop();
            return false;
        }
        if self.released.swap(true, SeqCst) {
            return true;
        }
        if let Ok(mut handle) = self.handle.try_lock() {
            if let Some(handle) = handle.take() {
                let _ = handle.join();
            }
        }
        close_all(&self.read_fds);
        close_all(&[self.console_fd, self.saved_stderr]);
        true
    }
}

fn close_all(fds: &[RawFd]) {
    fds.iter().for_each(|fd| close_fd(*fd));
}
