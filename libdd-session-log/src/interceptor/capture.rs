// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::{Mutex, PoisonError, TryLockError};

/// Append-only record of every byte relayed during the session.
#[derive(Debug, Default)]
pub(crate) struct CaptureBuffer {
    bytes: Mutex<Vec<u8>>,
}

impl CaptureBuffer {
    pub fn append(&self, chunk: &[u8]) {
        self.bytes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(chunk);
    }

    pub fn contents(&self) -> Vec<u8> {
        self.bytes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Non-blocking variant for the signal path: the faulting thread may be the
    /// relay itself, halfway through an append.
    pub fn try_contents(&self) -> Option<Vec<u8>> {
        match self.bytes.try_lock() {
            Ok(bytes) => Some(bytes.clone()),
            Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner().clone()),
            Err(TryLockError::WouldBlock) => None,
        }
    }
}
