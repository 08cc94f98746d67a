// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Runs one scenario of the session_log_bin_test binary and collects what it left behind.

use crate::{artifacts, build_artifacts, test_types::TestMode, BuildProfile};
use anyhow::{Context, Result};
use libdd_session_log::constants::*;
use std::{
    fs,
    path::{Path, PathBuf},
    process::{self, ExitStatus},
};

/// Set by the restart scenario before the logger is created, so the relaunched
/// process inherits it and knows it is the second generation.
pub const GENERATION_ENV: &str = "SESSION_LOG_TEST_GENERATION";

/// Written by the callback scenarios next to the session logs.
pub const CRASH_INFO_FILE: &str = "crash_info.json";
pub const CALLBACK_MARKER_FILE: &str = "callback_invocations";

pub struct SessionRun {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub logs: Vec<SessionLog>,
}

impl SessionRun {
    pub fn single_log(&self) -> Result<&SessionLog> {
        anyhow::ensure!(
            self.logs.len() == 1,
            "expected exactly one session log, found {:?}",
            self.logs.iter().map(|l| &l.path).collect::<Vec<_>>()
        );
        Ok(&self.logs[0])
    }
}

pub struct SessionLog {
    pub path: PathBuf,
    pub text: String,
}

impl SessionLog {
    pub fn read(path: PathBuf) -> Result<Self> {
        let text = fs::read_to_string(&path)
            .with_context(|| format!("reading session log {}", path.display()))?;
        Ok(Self { path, text })
    }

    pub fn count(&self, marker: &str) -> usize {
        self.text.matches(marker).count()
    }

    /// The captured output, exactly as submitted.
    pub fn body(&self) -> Result<&str> {
        let start_marker = format!("{SESSION_LOG_BEGIN_BODY}\n");
        let start = self
            .text
            .find(&start_marker)
            .context("body marker missing")?
            + start_marker.len();
        let rest = &self.text[start..];
        let end = [SESSION_LOG_BEGIN_STACKTRACE, SESSION_LOG_BEGIN_FOOTER]
            .iter()
            .filter_map(|marker| rest.find(&format!("\n{marker}")))
            .min()
            .unwrap_or(rest.len());
        Ok(&rest[..end])
    }

    pub fn exit_line(&self) -> Option<&str> {
        self.text.lines().find(|line| line.starts_with("Exit: "))
    }

    pub fn is_finalized(&self) -> bool {
        self.count(SESSION_LOG_BEGIN_FOOTER) == 1
    }
}

/// Every `*.log` in `dir`, oldest first.
pub fn session_logs(dir: &Path) -> Result<Vec<SessionLog>> {
    let mut paths = fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()?;
    paths.retain(|p| p.extension().is_some_and(|ext| ext == SESSION_LOG_FILE_EXTENSION));
    paths.sort();
    paths.into_iter().map(SessionLog::read).collect()
}

pub fn run_session_bin(
    profile: BuildProfile,
    mode: TestMode,
    log_dir: &Path,
    env_vars: &[(&str, &str)],
) -> Result<SessionRun> {
    let artifact = artifacts::session_log_bin_test(profile);
    let artifacts = build_artifacts(&[&artifact])?;

    let output = process::Command::new(&artifacts[&artifact])
        .arg(mode.as_str())
        .env(ENV_LOG_DIR, log_dir)
        .env_remove(GENERATION_ENV)
        .env_remove("RUST_LOG")
        .envs(env_vars.iter().copied())
        .output()
        .with_context(|| format!("running mode {mode}"))?;

    Ok(SessionRun {
        status: output.status,
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        logs: session_logs(log_dir)?,
    })
}
