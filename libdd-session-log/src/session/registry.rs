// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The process-wide registry naming the active logger. It never owns the
//! instance: the `SessionLogger` handle does.

use super::state::LoggerState;
use std::ptr;
use std::sync::atomic::AtomicPtr;
use std::sync::atomic::Ordering::SeqCst;

static LOGGER: AtomicPtr<LoggerState> = AtomicPtr::new(ptr::null_mut());

pub(crate) fn is_registered() -> bool {
    !LOGGER.load(SeqCst).is_null()
}

/// Publishes `state`. Fails if another logger is already registered.
pub(crate) fn register(state: *mut LoggerState) -> bool {
    LOGGER
        .compare_exchange(ptr::null_mut(), state, SeqCst, SeqCst)
        .is_ok()
}

/// Clears the registry if it still names `state`.
pub(crate) fn deregister(state: *mut LoggerState) -> bool {
    LOGGER
        .compare_exchange(state, ptr::null_mut(), SeqCst, SeqCst)
        .is_ok()
}

/// Clears the registry, returning whatever it named.
pub(crate) fn take() -> Option<&'static LoggerState> {
    let state = LOGGER.swap(ptr::null_mut(), SeqCst);
    // Safety: the pointer comes from `Box::into_raw` in `SessionLogger::new`,
    // and the instance is only freed after it was removed from the registry.
    unsafe { state.as_ref() }
}

/// The registered logger, if any.
///
/// # Safety
/// The caller must keep the instance from being freed while the reference is
/// held. The signal handler does so by entering Handling first, which makes
/// teardown park instead of freeing.
pub(crate) unsafe fn current() -> Option<&'static LoggerState> {
    LOGGER.load(SeqCst).as_ref()
}
