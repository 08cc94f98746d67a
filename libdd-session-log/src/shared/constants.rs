// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

// Log file layout. Each marker sits on its own line.
pub const SESSION_LOG_BEGIN_HEADER: &str =
    "------------------------------------ DATA ------------------------------------";
pub const SESSION_LOG_BEGIN_BODY: &str =
    "-------------------------------- CAPTURED LOGS -------------------------------";
pub const SESSION_LOG_BEGIN_STACKTRACE: &str =
    "-------------------------- SIGNAL FAULT STACK TRACE --------------------------";
pub const SESSION_LOG_BEGIN_FOOTER: &str =
    "------------------------------------ Q/E/T -----------------------------------";
pub const SESSION_LOG_SEPARATOR: &str =
    "==============================================================================";

pub const SESSION_LOG_FILE_EXTENSION: &str = "log";
pub const FALLBACK_EXECUTABLE_NAME: &str = "app";

pub const EXIT_REASON_NORMAL: &str = "Normal exit";
pub const EXIT_REASON_CRASH_PREFIX: &str = "Crashed: ";
pub const EXIT_REASON_RESTART: &str = "Application restart initiated";

pub const STACKTRACE_UNAVAILABLE: &str = "<stack trace unavailable on this platform>";
pub const STACKTRACE_DISABLED: &str = "<stack trace collection disabled>";
pub const UNKNOWN_SIGNAL_NAME: &str = "UNKNOWN_SIGNAL";

pub const RELAY_BUFFER_SIZE: usize = 1024;
pub const RELAY_THREAD_NAME: &str = "dd-session-log-relay";
pub const RELAY_THREAD_STACK_SIZE: usize = 64 * 1024;
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

pub const ENV_LOG_DIR: &str = "DD_SESSION_LOG_DIR";
pub const ENV_INTERCEPT: &str = "DD_SESSION_LOG_INTERCEPT";
pub const ENV_RESOLVE_FRAMES: &str = "DD_SESSION_LOG_RESOLVE_FRAMES";
pub const ENV_DRAIN_TIMEOUT_MS: &str = "DD_SESSION_LOG_DRAIN_TIMEOUT_MS";
