// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::capture::CaptureBuffer;
use super::fd::{read_fd, write_all_fd};
use crate::platform::current_thread_token;
use crate::shared::constants::{RELAY_BUFFER_SIZE, RELAY_THREAD_NAME, RELAY_THREAD_STACK_SIZE};
use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use std::io;
use std::os::fd::{BorrowedFd, RawFd};
use std::sync::atomic::Ordering::SeqCst;
use std::sync::atomic::{AtomicBool, AtomicUsize};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// State shared between the relay thread and whoever finalizes the session.
#[derive(Debug)]
pub(crate) struct RelayStatus {
    running: AtomicBool,
    finished: AtomicBool,
    thread: AtomicUsize,
}

impl RelayStatus {
    pub fn new() -> Self {
        Self {
            running: AtomicBool::new(true),
            finished: AtomicBool::new(false),
            thread: AtomicUsize::new(0),
        }
    }

    /// Once cleared, the relay forwards nothing more and exits on its next wake-up.
    pub fn stop(&self) {
        self.running.store(false, SeqCst);
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(SeqCst)
    }

    pub fn is_relay_thread(&self) -> bool {
        let token = self.thread.load(SeqCst);
        token != 0 && token == current_thread_token()
    }

    /// Polls for end of stream. Returns immediately when called from the relay
    /// thread, which cannot wait on itself. Only uses `clock_gettime` and
    /// `nanosleep`, so it is usable from a signal handler.
    pub fn wait_finished(&self, timeout: Duration) -> bool {
        if self.is_relay_thread() {
            return self.is_finished();
        }
        let start = Instant::now();
        while !self.is_finished() {
            if start.elapsed() >= timeout {
                return false;
            }
            thread::sleep(Duration::from_millis(1));
        }
        true
    }
}

/// One intercepted stream: the read end of the pipe the program now writes
/// into, and the preserved descriptor its bytes originally went to.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RelayStream {
    pub read_fd: RawFd,
    pub console_fd: RawFd,
}

/// Drains every stream into its own console descriptor, and into the shared
/// log file and capture buffer in the order the chunks are read.
pub(crate) struct Relay {
    pub streams: Vec<RelayStream>,
    pub log_fd: Option<RawFd>,
    pub capture: Arc<CaptureBuffer>,
    pub status: Arc<RelayStatus>,
}

impl Relay {
    pub fn spawn(self) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name(RELAY_THREAD_NAME.to_owned())
            .stack_size(RELAY_THREAD_STACK_SIZE)
            .spawn(move || self.run())
    }

    fn run(self) {
        self.status.thread.store(current_thread_token(), SeqCst);
        let mut buf = [0u8; RELAY_BUFFER_SIZE];
        let mut open = vec![true; self.streams.len()];
        'relay: while open.contains(&true) {
            let ready = match self.wait_readable(&open) {
                Ok(ready) => ready,
                Err(_) => break,
            };
            // Streams ready together are read in declaration order, stdout first.
            for (stream, index) in self.streams.iter().zip(0..) {
                if !ready[index] {
                    continue;
                }
                let n = match read_fd(stream.read_fd, &mut buf) {
                    Ok(0) | Err(_) => {
                        open[index] = false;
                        continue;
                    }
                    Ok(n) => n,
                };
                if !self.status.running.load(SeqCst) {
                    break 'relay;
                }
                self.forward(stream.console_fd, &buf[..n]);
            }
        }
        self.status.finished.store(true, SeqCst);
    }

    /// Blocks until at least one open stream is readable or hung up.
    fn wait_readable(&self, open: &[bool]) -> Result<Vec<bool>, Errno> {
        let watched: Vec<usize> = (0..open.len()).filter(|i| open[*i]).collect();
        let mut fds: Vec<PollFd> = watched
            .iter()
            .map(|i| {
                // Safety: the read ends stay open until the relay has finished.
                let fd = unsafe { BorrowedFd::borrow_raw(self.streams[*i].read_fd) };
                PollFd::new(fd, PollFlags::POLLIN)
            })
            .collect();
        loop {
            match poll(&mut fds, PollTimeout::NONE) {
                Ok(_) => break,
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(e),
            }
        }
        let wake =
            PollFlags::POLLIN | PollFlags::POLLHUP | PollFlags::POLLERR | PollFlags::POLLNVAL;
        let mut ready = vec![false; open.len()];
        for (index, pollfd) in watched.into_iter().zip(fds) {
            ready[index] = pollfd.revents().is_some_and(|events| events.intersects(wake));
        }
        Ok(ready)
    }

    fn forward(&self, console_fd: RawFd, chunk: &[u8]) {
        // A failing sink must not starve the others.
        let _ = write_all_fd(console_fd, chunk);
        if let Some(log_fd) = self.log_fd {
            let _ = write_all_fd(log_fd, chunk);
        }
        self.capture.append(chunk);
    }
}
