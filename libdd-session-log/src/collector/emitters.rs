// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0
use crate::interceptor::fd::FdWriter;
use crate::platform::{self, MAX_BACKTRACE_FRAMES};
use crate::shared::configuration::StacktraceCollection;
use crate::shared::constants::{
    SESSION_LOG_SEPARATOR, STACKTRACE_DISABLED, STACKTRACE_UNAVAILABLE,
};
use backtrace::Frame;
use std::fmt::Write as _;
use std::io::{self, Write};
use std::os::fd::RawFd;

/// Collects the stack of the current thread, one frame per line.
/// Frames above `fault_ip` belong to the handler itself and are skipped; if
/// the faulting frame is never found, every frame is kept.
///
/// Never fails: a platform without unwinding support, a disabled collection,
/// or an empty walk all produce a placeholder.
///
/// SIGNAL SAFETY:
///     Getting a backtrace on rust is not guaranteed to be signal safe.
///     https://github.com/rust-lang/backtrace-rs/issues/414
///     Calculating the `ip` of the frames seems safe, but resolving the frames
///     sometimes crashes, in which case the recursive crash guard exits.
pub(crate) unsafe fn collect_stack_trace(
    resolve_frames: StacktraceCollection,
    fault_ip: Option<usize>,
) -> String {
    if resolve_frames == StacktraceCollection::Disabled {
        return STACKTRACE_DISABLED.to_owned();
    }
    if !platform::current().supports_backtrace() {
        return STACKTRACE_UNAVAILABLE.to_owned();
    }

    let mut trace = String::new();
    let mut ip_found = fault_ip.is_none();
    loop {
        let mut index = 0;
        backtrace::trace_unsynchronized(|frame| {
            let ip = frame.ip() as usize;
            if Some(ip) == fault_ip {
                ip_found = true;
            }
            if !ip_found {
                return true;
            }
            emit_frame(&mut trace, index, frame, resolve_frames);
            index += 1;
            index < MAX_BACKTRACE_FRAMES
        });
        if ip_found {
            break;
        }
        // emit anything at all, if the crashing frame is not found for some reason
        ip_found = true;
    }

    if trace.is_empty() {
        STACKTRACE_UNAVAILABLE.to_owned()
    } else {
        trace
    }
}

unsafe fn emit_frame(
    w: &mut String,
    index: usize,
    frame: &Frame,
    resolve_frames: StacktraceCollection,
) {
    let ip = frame.ip() as usize;
    if resolve_frames != StacktraceCollection::EnabledWithInprocessSymbols {
        let _ = writeln!(w, "#{index:<3} {ip:#018x}");
        return;
    }
    let mut resolved = false;
    backtrace::resolve_frame_unsynchronized(frame, |symbol| {
        resolved = true;
        let _ = write!(w, "#{index:<3} {ip:#018x}");
        if let Some(function) = symbol.name() {
            let _ = write!(w, " in {function:#}");
        }
        if let Some(file) = symbol.filename() {
            let _ = write!(w, " at {}", file.display());
            if let Some(line) = symbol.lineno() {
                let _ = write!(w, ":{line}");
            }
        }
        let _ = writeln!(w);
    });
    if !resolved {
        let _ = writeln!(w, "#{index:<3} {ip:#018x}");
    }
}

/// `!!! A SIGSEGV SIGNAL FAILURE CAUGHT !!!`, straight to the console.
pub(crate) fn emit_crash_notice(console_fd: RawFd, signal_name: &str) -> io::Result<()> {
    let mut w = FdWriter(console_fd);
    writeln!(w)?;
    writeln!(w, "!!! A {signal_name} SIGNAL FAILURE CAUGHT !!!")
}

pub(crate) fn emit_stack_trace_echo(console_fd: RawFd, trace: &str) -> io::Result<()> {
    let mut w = FdWriter(console_fd);
    writeln!(w, "{SESSION_LOG_SEPARATOR}")?;
    w.write_all(trace.as_bytes())?;
    if !trace.ends_with('\n') {
        writeln!(w)?;
    }
    writeln!(w, "{SESSION_LOG_SEPARATOR}")
}
