// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

mod sig_info;

pub use sig_info::*;

use crate::identity::format_duration;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::{Path, PathBuf};

/// Snapshot of a fatal signal, handed once to the registered
/// [`CrashReporter`](crate::CrashReporter).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrashInfo {
    pub signal_name: String,
    pub signal_number: i32,
    /// One frame per line, or a placeholder when no trace could be collected.
    pub stack_trace: String,
    pub timestamp: String,
    pub log_path: PathBuf,
    /// Everything captured during the session, when enabled and not contended.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_content: Option<String>,
    pub executable_name: String,
    pub start_time: String,
    pub session_duration_ms: u64,
}

impl CrashInfo {
    /// Session duration as `HH:MM:SS:CS`.
    pub fn formatted_duration(&self) -> String {
        format_duration(self.session_duration_ms)
    }

    /// Writes the snapshot as pretty-printed JSON, creating `path` if needed.
    pub fn to_file(&self, path: &Path) -> anyhow::Result<()> {
        let file = File::options()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        serde_json::to_writer_pretty(file, self)
            .with_context(|| format!("Failed to write json to {}", path.display()))?;
        Ok(())
    }
}
