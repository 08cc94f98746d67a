// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Raw descriptor I/O. The read and write loops only call `read`, `write` and `close`, all of
//! which are async-signal-safe. Descriptor setup goes through `nix`.

use nix::errno::Errno;
use nix::fcntl::{fcntl, FcntlArg, FdFlag};
#[cfg(not(target_vendor = "apple"))]
use nix::fcntl::OFlag;
use nix::unistd;
use std::io;
#[cfg(target_vendor = "apple")]
use std::os::fd::AsRawFd;
use std::os::fd::{IntoRawFd, RawFd};

/// Writes the whole buffer, looping on partial writes. `EINTR` is retried,
/// any other error abandons the write.
pub(crate) fn write_all_fd(fd: RawFd, mut buf: &[u8]) -> Result<(), Errno> {
    while !buf.is_empty() {
        // Safety: `buf` is a valid slice for the duration of the call.
        let rval = unsafe { libc::write(fd, buf.as_ptr().cast(), buf.len()) };
        match Errno::result(rval) {
            Ok(0) => return Err(Errno::EIO),
            Ok(written) => buf = &buf[written as usize..],
            Err(Errno::EINTR) => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Reads at most `buf.len()` bytes, retrying on `EINTR`. `Ok(0)` is end of stream.
pub(crate) fn read_fd(fd: RawFd, buf: &mut [u8]) -> Result<usize, Errno> {
    loop {
        // Safety: `buf` is a valid, writable slice for the duration of the call.
        let rval = unsafe { libc::read(fd, buf.as_mut_ptr().cast(), buf.len()) };
        match Errno::result(rval) {
            Ok(read) => return Ok(read as usize),
            Err(Errno::EINTR) => continue,
            Err(e) => return Err(e),
        }
    }
}

/// Setup only, never called from a signal handler.
pub(crate) fn dup_fd(fd: RawFd) -> Result<RawFd, Errno> {
    let new_fd = unistd::dup(fd)?;
    if let Err(e) = set_cloexec(new_fd) {
        close_fd(new_fd);
        return Err(e);
    }
    Ok(new_fd)
}

pub(crate) fn dup2_fd(src: RawFd, dst: RawFd) -> Result<(), Errno> {
    loop {
        match unistd::dup2(src, dst) {
            Ok(_) => return Ok(()),
            Err(Errno::EINTR) => continue,
            Err(e) => return Err(e),
        }
    }
}

/// Returns `(read_end, write_end)`, both close-on-exec.
#[cfg(not(target_vendor = "apple"))]
pub(crate) fn cloexec_pipe() -> Result<(RawFd, RawFd), Errno> {
    let (read_end, write_end) = unistd::pipe2(OFlag::O_CLOEXEC)?;
    Ok((read_end.into_raw_fd(), write_end.into_raw_fd()))
}

/// Returns `(read_end, write_end)`, both close-on-exec.
#[cfg(target_vendor = "apple")]
pub(crate) fn cloexec_pipe() -> Result<(RawFd, RawFd), Errno> {
    // No pipe2 here. The ends are closed on drop if either flag cannot be set.
    let (read_end, write_end) = unistd::pipe()?;
    set_cloexec(read_end.as_raw_fd())?;
    set_cloexec(write_end.as_raw_fd())?;
    Ok((read_end.into_raw_fd(), write_end.into_raw_fd()))
}

fn set_cloexec(fd: RawFd) -> Result<(), Errno> {
    fcntl(fd, FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC)).map(drop)
}

/// Closes `fd`, ignoring errors. Never retries: the descriptor state after an
/// interrupted `close` is unspecified.
pub(crate) fn close_fd(fd: RawFd) {
    if fd >= 0 {
        // Safety: No preconditions.
        unsafe { libc::close(fd) };
    }
}

#[cfg(test)]
pub(crate) fn is_open(fd: RawFd) -> bool {
    // Safety: No preconditions.
    unsafe { libc::fcntl(fd, libc::F_GETFD) != -1 }
}

/// `io::Write` over a descriptor the writer does not own. Formatting through
/// `write!` does not allocate.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FdWriter(pub RawFd);

impl io::Write for FdWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        loop {
            // Safety: `buf` is a valid slice for the duration of the call.
            let rval = unsafe { libc::write(self.0, buf.as_ptr().cast(), buf.len()) };
            match Errno::result(rval) {
                Ok(written) => return Ok(written as usize),
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(io::Error::from(e)),
            }
        }
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        write_all_fd(self.0, buf).map_err(io::Error::from)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
