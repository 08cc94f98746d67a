// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Executable identity and the session clock.

use crate::platform;
use crate::shared::constants::FALLBACK_EXECUTABLE_NAME;
use chrono::{DateTime, Local};
use std::fmt;
use std::path::Path;
use std::time::Instant;

/// Sortable and free of colons, so it can be embedded in a file name. Milliseconds keep two
/// runs started within the same second apart.
pub const FILENAME_TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S-%3f";
pub const LOG_TIMESTAMP_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

/// Name of the running binary, without directory or extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutableIdentity {
    name: String,
}

impl ExecutableIdentity {
    /// Asks the platform for the running binary. Never fails: an unresolvable
    /// path yields the `"app"` placeholder.
    pub fn resolve() -> Self {
        match platform::current().executable_path() {
            Ok(path) => Self::from_path(&path),
            Err(e) => {
                tracing::warn!(error = %e, "Unable to resolve the executable path");
                Self::fallback()
            }
        }
    }

    pub fn from_path(path: &Path) -> Self {
        path.file_stem()
            .and_then(|stem| stem.to_str())
            .filter(|stem| !stem.is_empty())
            .map(|stem| Self {
                name: stem.to_owned(),
            })
            .unwrap_or_else(Self::fallback)
    }

    fn fallback() -> Self {
        Self {
            name: FALLBACK_EXECUTABLE_NAME.to_owned(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for ExecutableIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

pub fn resolve_executable_name() -> String {
    ExecutableIdentity::resolve().name
}

pub fn timestamp_for_filename() -> String {
    Local::now().format(FILENAME_TIMESTAMP_FORMAT).to_string()
}

pub fn timestamp_for_log() -> String {
    Local::now().format(LOG_TIMESTAMP_FORMAT).to_string()
}

/// Milliseconds since `start`, floored at zero.
pub fn elapsed_ms(start: Instant) -> u64 {
    let elapsed = Instant::now().saturating_duration_since(start);
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

/// Start of the session. The monotonic instant drives durations, the wall-clock
/// time is only displayed.
#[derive(Debug, Clone)]
pub struct SessionClock {
    start: Instant,
    start_time: DateTime<Local>,
}

impl SessionClock {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
            start_time: Local::now(),
        }
    }

    pub fn start_time(&self) -> DateTime<Local> {
        self.start_time
    }

    pub fn start_display(&self) -> String {
        self.start_time.format(LOG_TIMESTAMP_FORMAT).to_string()
    }

    pub fn filename_timestamp(&self) -> String {
        self.start_time.format(FILENAME_TIMESTAMP_FORMAT).to_string()
    }

    pub fn elapsed_ms(&self) -> u64 {
        elapsed_ms(self.start)
    }
}

/// Renders milliseconds as `HH:MM:SS:CS` without allocating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormattedDuration(pub u64);

impl fmt::Display for FormattedDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ms = self.0;
        write!(
            f,
            "{:02}:{:02}:{:02}:{:02}",
            ms / 3_600_000,
            (ms / 60_000) % 60,
            (ms / 1000) % 60,
            (ms / 10) % 100
        )
    }
}

pub fn format_duration(ms: u64) -> String {
    FormattedDuration(ms).to_string()
}
