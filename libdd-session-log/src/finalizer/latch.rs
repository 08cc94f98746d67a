// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::platform::current_thread_token;
use std::sync::atomic::Ordering::SeqCst;
use std::sync::atomic::{AtomicU8, AtomicUsize};
use std::thread;
use std::time::{Duration, Instant};

const PENDING: u8 = 0;
const WRITING: u8 = 1;
const DONE: u8 = 2;

/// One-way latch guarding finalization: `Pending -> Writing -> Done`.
///
/// Only the caller that wins `Pending -> Writing` writes the footer. Losers
/// may wait for `Done`, so that a fatal signal racing a normal exit still
/// sees a complete log before the process goes away.
#[derive(Debug, Default)]
pub(crate) struct FinalizeLatch {
    state: AtomicU8,
    writer: AtomicUsize,
}

impl FinalizeLatch {
    pub fn try_begin(&self) -> bool {
        let won = self
            .state
            .compare_exchange(PENDING, WRITING, SeqCst, SeqCst)
            .is_ok();
        if won {
            self.writer.store(current_thread_token(), SeqCst);
        }
        won
    }

    pub fn complete(&self) {
        self.state.store(DONE, SeqCst);
    }

    pub fn is_finalized(&self) -> bool {
        self.state.load(SeqCst) != PENDING
    }

    pub fn is_done(&self) -> bool {
        self.state.load(SeqCst) == DONE
    }

    /// Waits up to `timeout` for the writer to finish. A signal handler
    /// interrupting the writer on its own thread would wait forever, so that
    /// case returns immediately.
    pub fn wait_done(&self, timeout: Duration) -> bool {
        if self.writer.load(SeqCst) == current_thread_token() {
            return self.is_done();
        }
        let start = Instant::now();
        while !self.is_done() {
            if start.elapsed() >= timeout {
                return false;
            }
            thread::sleep(Duration::from_millis(1));
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_latch_is_one_way() {
        let latch = FinalizeLatch::default();
        assert!(!latch.is_finalized());
        assert!(latch.try_begin());
        assert!(latch.is_finalized());
        assert!(!latch.is_done());
        assert!(!latch.try_begin());
        latch.complete();
        assert!(latch.is_done());
        assert!(!latch.try_begin());
    }

    #[test]
    fn test_exactly_one_winner_across_threads() {
        let latch = Arc::new(FinalizeLatch::default());
        let winners: usize = (0..8)
            .map(|_| {
                let latch = latch.clone();
                thread::spawn(move || latch.try_begin())
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|h| h.join().unwrap() as usize)
            .sum();
        assert_eq!(winners, 1);
    }

    #[test]
    fn test_loser_waits_for_writer() {
        let latch = Arc::new(FinalizeLatch::default());
        assert!(latch.try_begin());
        // Same thread as the writer: no waiting.
        assert!(!latch.wait_done(Duration::from_secs(5)));

        let waiter = {
            let latch = latch.clone();
            thread::spawn(move || latch.wait_done(Duration::from_secs(5)))
        };
        thread::sleep(Duration::from_millis(10));
        latch.complete();
        assert!(waiter.join().unwrap());
    }
}
