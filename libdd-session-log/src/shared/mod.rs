// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Configuration and constants shared by the interceptor, the finalizer and the signal handler.

pub(crate) mod configuration;
pub mod constants;
