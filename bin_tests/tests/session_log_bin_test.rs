// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg(unix)]

use std::fs;
use std::os::unix::process::ExitStatusExt;

use bin_tests::test_runner::{
    run_session_bin, SessionRun, CALLBACK_MARKER_FILE, CRASH_INFO_FILE,
};
use bin_tests::test_types::TestMode;
use bin_tests::BuildProfile;
use libdd_session_log::constants::*;
use libdd_session_log::{CrashInfo, SignalNames};

fn run(mode: TestMode, dir: &tempfile::TempDir) -> SessionRun {
    run_with_env(mode, dir, &[])
}

fn run_with_env(mode: TestMode, dir: &tempfile::TempDir, env: &[(&str, &str)]) -> SessionRun {
    bin_tests::timeit!("session run", {
        run_session_bin(BuildProfile::Debug, mode, dir.path(), env).unwrap()
    })
}

fn callback_invocations(dir: &tempfile::TempDir) -> usize {
    fs::read_to_string(dir.path().join(CALLBACK_MARKER_FILE))
        .map(|s| s.lines().count())
        .unwrap_or(0)
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_normal_exit() {
    let dir = tempfile::tempdir().unwrap();
    let run = run(TestMode::Normal, &dir);
    assert!(run.status.success(), "{}", run.stderr);

    let log = run.single_log().unwrap();
    assert_eq!(log.count(SESSION_LOG_BEGIN_HEADER), 1);
    assert!(log.is_finalized(), "{}", log.text);
    assert_eq!(log.body().unwrap(), "AB");
    assert!(log.exit_line().unwrap().starts_with("Exit: Normal exit at "));
    assert!(log.text.contains("Duration: "));
    assert_eq!(log.count(SESSION_LOG_BEGIN_STACKTRACE), 0);

    // Each stream still reaches its own destination: the banner, "A" and the
    // footer on stdout, "B" alone on stderr.
    assert!(
        run.stdout.contains(&format!(
            "in this session are saved in: {}\nA\n{SESSION_LOG_BEGIN_FOOTER}",
            log.path.display()
        )),
        "{}",
        run.stdout
    );
    assert!(!run.stdout.contains("AB"), "{}", run.stdout);
    assert!(run.stdout.contains("Exit: Normal exit at "));
    assert_eq!(run.stderr, "B");
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_file_names_are_distinct() {
    let dir = tempfile::tempdir().unwrap();
    run(TestMode::Normal, &dir);
    let second = run(TestMode::Normal, &dir);
    assert_eq!(second.logs.len(), 2);
    assert_ne!(second.logs[0].path, second.logs[1].path);
    let name = second.logs[0].path.file_name().unwrap().to_str().unwrap();
    assert!(name.starts_with("session_log_bin_test_"), "{name}");
    assert!(!name.contains(':'), "{name}");
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_finalize_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let run = run(TestMode::FinalizeTwice, &dir);
    assert!(run.status.success(), "{}", run.stderr);
    assert!(run.stdout.contains("finalized: true false"), "{}", run.stdout);

    let log = run.single_log().unwrap();
    assert_eq!(log.count(SESSION_LOG_BEGIN_HEADER), 1);
    assert_eq!(log.count(SESSION_LOG_BEGIN_BODY), 1);
    assert_eq!(log.count(SESSION_LOG_BEGIN_FOOTER), 1);
    assert!(log.exit_line().unwrap().starts_with("Exit: Normal exit at "));
    assert!(!log.text.contains("finalized:"));
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_without_capture() {
    let dir = tempfile::tempdir().unwrap();
    let run = run_with_env(TestMode::Normal, &dir, &[(ENV_INTERCEPT, "false")]);
    assert!(run.status.success(), "{}", run.stderr);
    assert_eq!(run.stderr, "B");

    let log = run.single_log().unwrap();
    assert!(log.is_finalized());
    assert_eq!(log.body().unwrap(), "");
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_tracing_lands_in_the_capture() {
    let dir = tempfile::tempdir().unwrap();
    let run = run_with_env(TestMode::Normal, &dir, &[("RUST_LOG", "debug")]);
    assert!(run.status.success(), "{}", run.stderr);
    let log = run.single_log().unwrap();
    assert!(
        log.body().unwrap().contains("Session logger registered"),
        "{}",
        log.text
    );
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_every_default_signal() {
    for mode in TestMode::raising() {
        let signum = mode.signal().unwrap();
        let name = SignalNames::from(signum).to_string();
        let dir = tempfile::tempdir().unwrap();
        let run = run(*mode, &dir);

        assert_eq!(run.status.code(), Some(128 + signum), "{mode}: {}", run.stdout);
        assert!(
            run.stdout
                .contains(&format!("!!! A {name} SIGNAL FAILURE CAUGHT !!!")),
            "{mode}: {}",
            run.stdout
        );

        let log = run.single_log().unwrap();
        assert_eq!(log.count(SESSION_LOG_BEGIN_FOOTER), 1, "{mode}: {}", log.text);
        assert_eq!(log.count(SESSION_LOG_BEGIN_STACKTRACE), 1, "{mode}");
        let exit = log.exit_line().unwrap();
        assert!(
            exit.starts_with(&format!("Exit: Crashed: {name} at ")),
            "{mode}: {exit}"
        );
        assert_eq!(log.body().unwrap(), "AB", "{mode}");
    }
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_invalid_deref_stack_trace() {
    let dir = tempfile::tempdir().unwrap();
    let run = run(TestMode::InvalidDeref, &dir);
    assert_eq!(run.status.code(), Some(128 + libc::SIGSEGV));

    let log = run.single_log().unwrap();
    assert!(log
        .exit_line()
        .unwrap()
        .starts_with("Exit: Crashed: SIGSEGV at "));
    let trace_start = log.text.find(SESSION_LOG_BEGIN_STACKTRACE).unwrap();
    let trace = &log.text[trace_start..];
    assert!(trace.contains("#0 "), "{trace}");
    assert!(trace.contains("deref_ptr"), "{trace}");
    // The trace is echoed to the console between separators.
    assert!(run.stdout.contains(SESSION_LOG_SEPARATOR));
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_callback_receives_snapshot_once() {
    let dir = tempfile::tempdir().unwrap();
    let run = run(TestMode::Callback, &dir);
    assert_eq!(run.status.code(), Some(128 + libc::SIGABRT));
    assert_eq!(callback_invocations(&dir), 1);

    let log = run.single_log().unwrap();
    let info: CrashInfo =
        serde_json::from_slice(&fs::read(dir.path().join(CRASH_INFO_FILE)).unwrap()).unwrap();
    assert_eq!(info.signal_name, "SIGABRT");
    assert_eq!(info.signal_number, libc::SIGABRT);
    assert_eq!(info.log_path, log.path);
    assert_eq!(info.executable_name, "session_log_bin_test");
    assert_eq!(info.log_content.as_deref(), Some("AB"));
    assert!(!info.stack_trace.is_empty());
    assert!(log.text.contains(&format!("Start: {}", info.start_time)));
    // The log was already finalized when the reporter ran.
    assert!(log.is_finalized());
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_recursive_crash() {
    let dir = tempfile::tempdir().unwrap();
    let run = run(TestMode::RecursiveCrash, &dir);
    // The second fault exits with the original signal, not SIGSEGV.
    assert_eq!(run.status.code(), Some(128 + libc::SIGABRT));
    assert_eq!(run.status.signal(), None);
    assert_eq!(callback_invocations(&dir), 1);

    let log = run.single_log().unwrap();
    assert_eq!(log.count(SESSION_LOG_BEGIN_FOOTER), 1);
    assert!(log
        .exit_line()
        .unwrap()
        .starts_with("Exit: Crashed: SIGABRT at "));
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_callback_panic() {
    let dir = tempfile::tempdir().unwrap();
    let run = run(TestMode::CallbackPanic, &dir);
    assert_eq!(run.status.code(), Some(128 + libc::SIGABRT));
    assert_eq!(callback_invocations(&dir), 1);
    assert!(run.single_log().unwrap().is_finalized());
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_terminate_from_callback() {
    let dir = tempfile::tempdir().unwrap();
    let run = run(TestMode::Terminate, &dir);
    assert_eq!(run.status.code(), Some(0));
    assert_eq!(callback_invocations(&dir), 1);

    let log = run.single_log().unwrap();
    assert_eq!(log.count(SESSION_LOG_BEGIN_FOOTER), 1);
    assert!(log
        .exit_line()
        .unwrap()
        .starts_with("Exit: Crashed: SIGABRT at "));
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_terminate_direct() {
    let dir = tempfile::tempdir().unwrap();
    let run = run(TestMode::TerminateDirect, &dir);
    assert_eq!(run.status.code(), Some(0), "{}", run.stderr);
    assert!(!run.stdout.contains("!!!"), "{}", run.stdout);
    assert_eq!(run.stderr, "B");

    let log = run.single_log().unwrap();
    assert_eq!(log.count(SESSION_LOG_BEGIN_FOOTER), 1);
    assert!(log.exit_line().unwrap().starts_with("Exit: Normal exit at "));
    assert_eq!(log.body().unwrap(), "AB");
    assert_eq!(log.count(SESSION_LOG_BEGIN_STACKTRACE), 0);
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_fault_after_terminate_is_not_captured() {
    let dir = tempfile::tempdir().unwrap();
    let run = run(TestMode::TerminateThenFault, &dir);
    // The exit hook's SIGSEGV hits the default disposition.
    assert_eq!(run.status.signal(), Some(libc::SIGSEGV), "{:?}", run.status);
    assert!(!run.stdout.contains("!!!"), "{}", run.stdout);

    let log = run.single_log().unwrap();
    assert_eq!(log.count(SESSION_LOG_BEGIN_FOOTER), 1);
    assert!(log.exit_line().unwrap().starts_with("Exit: Normal exit at "));
    assert_eq!(log.count(SESSION_LOG_BEGIN_STACKTRACE), 0);
}

fn check_restart(run: &SessionRun, first_exit: &str) {
    assert!(run.status.success(), "{}\n{}", run.stdout, run.stderr);
    assert!(
        run.stdout
            .contains("generation 1, inherited descriptors: []"),
        "{}",
        run.stdout
    );

    assert_eq!(run.logs.len(), 2);
    let (first, second) = (&run.logs[0], &run.logs[1]);
    assert_eq!(first.count(SESSION_LOG_BEGIN_FOOTER), 1);
    assert!(
        first.exit_line().unwrap().starts_with(first_exit),
        "{}",
        first.text
    );
    assert_eq!(first.body().unwrap(), "AB");

    assert!(run
        .stdout
        .contains(&format!("log: {}", second.path.display())));
    assert_eq!(second.count(SESSION_LOG_BEGIN_HEADER), 1);
    assert_eq!(second.count(SESSION_LOG_BEGIN_FOOTER), 1);
    assert!(second
        .exit_line()
        .unwrap()
        .starts_with("Exit: Normal exit at "));
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_restart() {
    let dir = tempfile::tempdir().unwrap();
    let run = run(TestMode::Restart, &dir);
    check_restart(&run, "Exit: Application restart initiated at ");
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_restart_from_callback() {
    let dir = tempfile::tempdir().unwrap();
    let run = run(TestMode::RestartFromCallback, &dir);
    // Finalized by the crash before the reporter asked for the restart.
    check_restart(&run, "Exit: Crashed: SIGSEGV at ");
    assert_eq!(callback_invocations(&dir), 1);
}
