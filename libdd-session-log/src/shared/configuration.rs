// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0
use crate::collector::MAX_SIGNALS;
use crate::shared::constants;
use crate::{default_signals, signal_from_signum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Stacktrace collection occurs in the context of a crashing process.
/// If the stack is sufficiently corrupted, it is possible (but unlikely),
/// for stack trace collection itself to crash, in which case the recursive
/// crash guard exits the process with the original signal.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StacktraceCollection {
    Disabled,
    /// Raw instruction pointers only.
    WithoutSymbols,
    /// This option uses `backtrace::resolve_frame_unsynchronized()` to gather symbol information
    /// and also unwind inlined functions.
    EnabledWithInprocessSymbols,
}

impl FromStr for StacktraceCollection {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "disabled" | "none" => Ok(Self::Disabled),
            "without_symbols" | "addresses" => Ok(Self::WithoutSymbols),
            "in_process" | "enabled" | "symbols" => Ok(Self::EnabledWithInprocessSymbols),
            other => anyhow::bail!("Unknown stacktrace collection mode {other:?}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionLogConfig {
    create_alt_stack: bool,
    drain_timeout: Duration,
    // Whether the captured body is copied into the crash snapshot
    include_log_content: bool,
    intercept_output: bool,
    log_dir: Option<PathBuf>,
    resolve_frames: StacktraceCollection,
    signals: Vec<i32>,
    use_alt_stack: bool,
}

impl Default for SessionLogConfig {
    fn default() -> Self {
        Self {
            create_alt_stack: true,
            drain_timeout: constants::DEFAULT_DRAIN_TIMEOUT,
            include_log_content: true,
            intercept_output: true,
            log_dir: None,
            resolve_frames: StacktraceCollection::EnabledWithInprocessSymbols,
            signals: default_signals(),
            use_alt_stack: true,
        }
    }
}

impl SessionLogConfig {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        log_dir: Option<PathBuf>,
        signals: Vec<i32>,
        intercept_output: bool,
        create_alt_stack: bool,
        use_alt_stack: bool,
        resolve_frames: StacktraceCollection,
        drain_timeout: Option<Duration>,
        include_log_content: bool,
    ) -> anyhow::Result<Self> {
        // Requesting to create, but not use, the altstack is considered paradoxical.
        anyhow::ensure!(
            !create_alt_stack || use_alt_stack,
            "Cannot create an altstack without using it"
        );
        let signals = validate_signals(signals)?;
        Ok(Self {
            create_alt_stack,
            drain_timeout: drain_timeout.unwrap_or(constants::DEFAULT_DRAIN_TIMEOUT),
            include_log_content,
            intercept_output,
            log_dir,
            resolve_frames,
            signals,
            use_alt_stack,
        })
    }

    /// Default configuration, overridden by the `DD_SESSION_LOG_*` environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let mut config = Self::default();
        if let Some(dir) = lookup(constants::ENV_LOG_DIR).filter(|d| !d.is_empty()) {
            config.set_log_dir(Some(PathBuf::from(dir)));
        }
        if let Some(value) = lookup(constants::ENV_INTERCEPT) {
            config.set_intercept_output(parse_bool(constants::ENV_INTERCEPT, &value)?);
        }
        if let Some(value) = lookup(constants::ENV_RESOLVE_FRAMES) {
            config.set_resolve_frames(value.parse()?);
        }
        if let Some(value) = lookup(constants::ENV_DRAIN_TIMEOUT_MS) {
            let millis: u64 = value.trim().parse().map_err(|e| {
                anyhow::anyhow!("Invalid {}={value:?}: {e}", constants::ENV_DRAIN_TIMEOUT_MS)
            })?;
            config.set_drain_timeout(Duration::from_millis(millis));
        }
        Ok(config)
    }

    pub fn create_alt_stack(&self) -> bool {
        self.create_alt_stack
    }

    pub fn use_alt_stack(&self) -> bool {
        self.use_alt_stack
    }

    pub fn drain_timeout(&self) -> Duration {
        self.drain_timeout
    }

    pub fn include_log_content(&self) -> bool {
        self.include_log_content
    }

    pub fn intercept_output(&self) -> bool {
        self.intercept_output
    }

    /// The directory holding the log file: the configured one, or the system temp directory.
    pub fn log_dir(&self) -> PathBuf {
        self.log_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    pub fn resolve_frames(&self) -> StacktraceCollection {
        self.resolve_frames
    }

    pub fn signals(&self) -> &Vec<i32> {
        &self.signals
    }

    pub fn set_create_alt_stack(&mut self, create_alt_stack: bool) -> anyhow::Result<()> {
        anyhow::ensure!(
            !create_alt_stack || self.use_alt_stack,
            "Cannot create an altstack without using it"
        );
        self.create_alt_stack = create_alt_stack;
        Ok(())
    }

    pub fn set_use_alt_stack(&mut self, use_alt_stack: bool) -> anyhow::Result<()> {
        anyhow::ensure!(
            !self.create_alt_stack || use_alt_stack,
            "Cannot create an altstack without using it"
        );
        self.use_alt_stack = use_alt_stack;
        Ok(())
    }

    pub fn set_drain_timeout(&mut self, drain_timeout: Duration) {
        self.drain_timeout = drain_timeout;
    }

    pub fn set_include_log_content(&mut self, include_log_content: bool) {
        self.include_log_content = include_log_content;
    }

    pub fn set_intercept_output(&mut self, intercept_output: bool) {
        self.intercept_output = intercept_output;
    }

    pub fn set_log_dir(&mut self, log_dir: Option<PathBuf>) {
        self.log_dir = log_dir;
    }

    pub fn set_resolve_frames(&mut self, resolve_frames: StacktraceCollection) {
        self.resolve_frames = resolve_frames;
    }

    pub fn set_signals(&mut self, signals: Vec<i32>) -> anyhow::Result<()> {
        self.signals = validate_signals(signals)?;
        Ok(())
    }
}

fn validate_signals(mut signals: Vec<i32>) -> anyhow::Result<Vec<i32>> {
    if signals.is_empty() {
        return Ok(default_signals());
    }
    // Ensure we don't have double elements in the signals list.
    let before_len = signals.len();
    signals.sort();
    signals.dedup();
    anyhow::ensure!(
        before_len == signals.len(),
        "Signals contained duplicate elements"
    );
    for signum in &signals {
        anyhow::ensure!(
            *signum > 0 && *signum < MAX_SIGNALS as i32,
            "Signal number {signum} out of range"
        );
        // Ensure that all signal values translate to a valid signum
        signal_from_signum(*signum)?;
        anyhow::ensure!(
            *signum != libc::SIGKILL && *signum != libc::SIGSTOP,
            "Signal {signum} cannot be caught"
        );
    }
    Ok(signals)
}

fn parse_bool(key: &str, value: &str) -> anyhow::Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => anyhow::bail!("Invalid boolean {key}={value:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = SessionLogConfig::default();
        assert!(config.intercept_output());
        assert!(config.create_alt_stack());
        assert!(config.use_alt_stack());
        assert_eq!(config.signals(), &default_signals());
        assert_eq!(config.log_dir(), std::env::temp_dir());
        assert_eq!(config.drain_timeout(), constants::DEFAULT_DRAIN_TIMEOUT);
    }

    #[test]
    fn test_alt_stack_paradox() {
        let result = SessionLogConfig::new(
            None,
            vec![],
            true,
            true,
            false,
            StacktraceCollection::Disabled,
            None,
            false,
        );
        assert!(result.is_err());

        let mut config = SessionLogConfig::default();
        assert!(config.set_use_alt_stack(false).is_err());
        config.set_create_alt_stack(false).unwrap();
        config.set_use_alt_stack(false).unwrap();
        assert!(config.set_create_alt_stack(true).is_err());
    }

    #[test]
    fn test_signals_are_sorted_and_validated() {
        let config = SessionLogConfig::new(
            None,
            vec![libc::SIGSEGV, libc::SIGABRT],
            true,
            false,
            false,
            StacktraceCollection::WithoutSymbols,
            None,
            true,
        )
        .unwrap();
        assert_eq!(config.signals(), &vec![libc::SIGABRT, libc::SIGSEGV]);

        let mut config = SessionLogConfig::default();
        assert!(config.set_signals(vec![libc::SIGSEGV, libc::SIGSEGV]).is_err());
        assert!(config.set_signals(vec![libc::SIGKILL]).is_err());
        assert!(config.set_signals(vec![-3]).is_err());
        assert!(config.set_signals(vec![MAX_SIGNALS as i32]).is_err());
        config.set_signals(vec![]).unwrap();
        assert_eq!(config.signals(), &default_signals());
    }

    #[test]
    fn test_from_lookup() -> anyhow::Result<()> {
        let config = SessionLogConfig::from_lookup(lookup_from(&[
            (constants::ENV_LOG_DIR, "/var/tmp/sessions"),
            (constants::ENV_INTERCEPT, "false"),
            (constants::ENV_RESOLVE_FRAMES, "without_symbols"),
            (constants::ENV_DRAIN_TIMEOUT_MS, "25"),
        ]))?;
        assert_eq!(config.log_dir(), PathBuf::from("/var/tmp/sessions"));
        assert!(!config.intercept_output());
        assert_eq!(config.resolve_frames(), StacktraceCollection::WithoutSymbols);
        assert_eq!(config.drain_timeout(), Duration::from_millis(25));

        let config = SessionLogConfig::from_lookup(lookup_from(&[]))?;
        assert_eq!(config, SessionLogConfig::default());
        Ok(())
    }

    #[test]
    fn test_from_lookup_rejects_garbage() {
        assert!(SessionLogConfig::from_lookup(lookup_from(&[(
            constants::ENV_INTERCEPT,
            "maybe"
        )]))
        .is_err());
        assert!(SessionLogConfig::from_lookup(lookup_from(&[(
            constants::ENV_RESOLVE_FRAMES,
            "remote"
        )]))
        .is_err());
        assert!(SessionLogConfig::from_lookup(lookup_from(&[(
            constants::ENV_DRAIN_TIMEOUT_MS,
            "-1"
        )]))
        .is_err());
    }

    #[test]
    fn test_config_serializes() -> anyhow::Result<()> {
        let config = SessionLogConfig::default();
        let json = serde_json::to_string(&config)?;
        let back: SessionLogConfig = serde_json::from_str(&json)?;
        assert_eq!(config, back);
        Ok(())
    }
}
