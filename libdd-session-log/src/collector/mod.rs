// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Fatal signal handling: registration, the `Armed -> Handling -> Terminated`
//! state machine, and what is emitted while handling.

mod crash_handler;
pub(crate) mod emitters;
mod signal_handler_manager;

pub use crash_handler::{
    clear_crash_callback, handler_state, set_crash_callback, CrashReporter, HandlerState,
};
pub(crate) use crash_handler::{arm, disarm};
pub(crate) use signal_handler_manager::{
    register_session_handlers, restore_default_dispositions, MAX_SIGNALS,
};
