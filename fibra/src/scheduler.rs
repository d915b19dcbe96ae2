// Copyright 2025 The Fibra Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Round-Robin Scheduler
//!
//! This module implements `yield`: the only place spec.md's round-
//! robin candidate scan happens. The scan itself is factored out as a
//! pure function ([`scan_next_active`]) over a snapshot of thread
//! states, so its fairness and tie-break behavior (spec.md §4.4, §8)
//! can be unit-tested without a live context switch.

use log::trace;

use crate::context;
use crate::runtime::{self, Runtime};
use crate::tcb::{ThreadId, ThreadState, MAX_THREADS};

/// Starting from `(current + 1) mod states.len()`, find the first
/// index whose state is `Active`, stopping before wrapping back to
/// `current` itself. This is spec.md §4.4 step 2 and its tie-break
/// rule ("lowest id after `current` in modular order"), isolated from
/// the TCB table so it can be exercised directly.
pub(crate) fn scan_next_active(states: &[ThreadState], current: usize) -> Option<usize> {
    let len = states.len();
    for offset in 1..len {
        let idx = (current + offset) % len;
        if states[idx] == ThreadState::Active {
            return Some(idx);
        }
    }
    None
}

/// Voluntarily (or, from the preemption handler, involuntarily) give
/// up the CPU to the next runnable thread.
///
/// Disables the preemption timer on entry; the resume path (whichever
/// thread next calls `restore_context` into this thread) re-arms it.
/// If no other thread is runnable, this simply returns with the timer
/// re-armed and the caller still running. spec.md §4.4 step 4.
///
/// Deliberately snapshots states into a fixed-size array rather than a
/// `Vec`: `exit` may call this after releasing the current thread's
/// stack, and a heap allocation standing on just-freed stack memory is
/// exactly the hazard spec.md's source material tolerates only because
/// it never allocates in that window.
pub fn yield_now() {
    let rt = Runtime::get();
    runtime::disable_timer();

    let current = rt.current();
    let states: [ThreadState; MAX_THREADS] =
        std::array::from_fn(|i| unsafe { rt.tcb(ThreadId::new(i)) }.state());

    let candidate = match scan_next_active(&states, current.index()) {
        Some(idx) => ThreadId::new(idx),
        None => {
            trace!("thread {current} yields with no other runnable thread");
            runtime::rearm_timer(rt);
            return;
        }
    };

    trace!("thread {current} yields to thread {candidate}");

    // SAFETY: single-executor invariant (see runtime module docs); the
    // current thread's slot is only touched by the current thread, and
    // the candidate's slot was populated by a prior save_context (or
    // the bootstrap handler) and is not being touched concurrently.
    let current_ctx = unsafe { rt.tcb(current) }.context_mut();
    let mark = unsafe { context::save_context(current_ctx) };
    if mark == 0 {
        rt.set_current(candidate);
        let candidate_ctx = unsafe { rt.tcb(candidate) }.context();
        unsafe { context::restore_context(candidate_ctx, 1) };
    } else {
        // We have just been resumed.
        runtime::rearm_timer(rt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn states(pattern: &[ThreadState]) -> Vec<ThreadState> {
        pattern.to_vec()
    }

    #[test]
    fn finds_next_active_wrapping() {
        use ThreadState::*;
        let s = states(&[Active, Invalid, Invalid, Active]);
        assert_eq!(scan_next_active(&s, 0), Some(3));
        assert_eq!(scan_next_active(&s, 3), Some(0));
    }

    #[test]
    fn skips_blocked_and_finished() {
        use ThreadState::*;
        let s = states(&[Active, Blocked, Finished, Active]);
        assert_eq!(scan_next_active(&s, 0), Some(3));
    }

    #[test]
    fn none_when_no_other_runnable() {
        use ThreadState::*;
        let s = states(&[Active, Invalid, Blocked, Finished]);
        assert_eq!(scan_next_active(&s, 0), None);
    }

    #[test]
    fn tie_break_is_lowest_id_after_current() {
        use ThreadState::*;
        let s = states(&[Active, Active, Active, Active]);
        assert_eq!(scan_next_active(&s, 1), Some(2));
    }
}
