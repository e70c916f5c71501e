// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded approximation-compile probe.
//!
//! Reducing a pattern to required literal factors can be expensive for
//! pathological inputs, so feasibility is tried on a watchdog thread and
//! polled with a bounded retry budget. A probe that does not answer
//! within the budget counts as "not approximable" and the pattern stays
//! with the accurate engine; the worker is abandoned and exits on its
//! own. The probe never touches cache state and must not be handed any.

use std::time::Duration;

use crossbeam_channel::RecvTimeoutError;

use crate::prefilter::{self, FLAG_APPROXIMATE, ScanMode};

const MAX_TRIES: u32 = 10;

/// Try the approximation compile of a pattern within `max_time`.
///
/// Returns true only when the compile finished in time and succeeded;
/// a timeout, a failed compile, or a worker that could not be spawned
/// all count as infeasible.
pub fn approximation_feasible(
    pattern: &str,
    flags: u32,
    mode: ScanMode,
    max_time: Duration,
) -> bool {
    let owned = pattern.to_string();
    let feasible = bounded(
        move || prefilter::compile(&owned, flags | FLAG_APPROXIMATE, mode).is_ok(),
        max_time,
    );
    if !feasible {
        tracing::error!(
            pattern,
            max_time_ms = max_time.as_millis() as u64,
            "cannot approximate pattern"
        );
    }
    feasible
}

/// Run `work` on a watchdog thread, polling for completion in quanta of
/// `max_time / MAX_TRIES`. Returns false on timeout.
fn bounded<F>(work: F, max_time: Duration) -> bool
where
    F: FnOnce() -> bool + Send + 'static,
{
    let (tx, rx) = crossbeam_channel::bounded(1);
    let spawned = std::thread::Builder::new()
        .name("prefilter-probe".into())
        .spawn(move || {
            let _ = tx.send(work());
        });
    if let Err(e) = spawned {
        tracing::warn!(error = %e, "cannot spawn probe thread");
        return false;
    }

    let quantum = max_time / MAX_TRIES;
    let mut tries = 0;
    loop {
        match rx.recv_timeout(quantum) {
            Ok(result) => return result,
            Err(RecvTimeoutError::Timeout) => {
                tries += 1;
                if tries >= MAX_TRIES {
                    return false;
                }
            }
            Err(RecvTimeoutError::Disconnected) => return false,
        }
    }
}

#[cfg(test)]
#[path = "probe_tests.rs"]
mod tests;
