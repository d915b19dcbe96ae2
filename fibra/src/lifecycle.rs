// Copyright 2025 The Fibra Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Thread Lifecycle
//!
//! `create`, `exit`, and `join`: the three operations that move a
//! thread between slots of the TCB table and across stacks. spec.md
//! §4.3 and §4.5.

use log::{debug, info, trace};

use crate::context;
use crate::error::{Error, Result};
use crate::runtime::{self, Runtime};
use crate::tcb::{Payload, ThreadId, ThreadState};

/// Create a new thread running `entry(argument)` on its own stack.
///
/// Allocates a TCB slot and a fresh stack, bootstraps a resumable
/// context onto it via the alt-stack/`SIGUSR1` trick (spec.md §4.3),
/// and returns once that context is captured. The new thread does not
/// actually run until a future `yield` (or `join`) schedules it.
///
/// # Errors
///
/// Returns [`Error::CapacityExhausted`] if every TCB slot is in use.
pub fn create<F, A, R>(entry: F, argument: A) -> Result<ThreadId>
where
    F: FnOnce(A) -> R + Send + 'static,
    A: Send + 'static,
    R: Send + 'static,
{
    let rt = Runtime::get();

    let id = rt.find_invalid_slot().ok_or(Error::CapacityExhausted)?;

    let boxed_entry = Box::new(move |argument: Payload| -> Payload {
        let argument = *argument
            .downcast::<A>()
            .unwrap_or_else(|_| panic!("fibra: thread argument type mismatch"));
        Box::new(entry(argument)) as Payload
    });
    let boxed_argument: Payload = Box::new(argument);

    // Mask preemption for the whole handoff: the bootstrap signal and
    // the timer signal must not interleave (spec.md §4.8).
    runtime::disable_timer();

    // SAFETY: `id` was just found `Invalid`; single-executor invariant
    // means nothing else can observe or touch this slot concurrently.
    unsafe { rt.tcb(id) }.activate(boxed_entry, boxed_argument);
    let (stack_base, stack_len) = unsafe { rt.tcb(id) }.stack_region();

    // SAFETY: `stack_base`/`stack_len` describe the stack just
    // allocated above; it outlives this call (owned by the TCB).
    let previous_alt_stack = unsafe { context::install_alt_stack(stack_base, stack_len) }
        .unwrap_or_else(|e| runtime::fatal(&format!("sigaltstack: {e}")));

    rt.set_bootstrap_id(id);
    rt.set_bootstrapped(false);

    // Raising SIGUSR1 here, with SA_ONSTACK, runs `bootstrap_handler`
    // on the new thread's own stack. Its direct-return path flips
    // `bootstrapped` and unwinds straight back to this `raise` call on
    // *our* stack; spin until that has happened. spec.md §4.3 steps
    // 5-7.
    //
    // SAFETY: SIGUSR1 is reserved for this runtime's exclusive use.
    unsafe {
        if libc::raise(runtime::BOOTSTRAP_SIGNAL) != 0 {
            runtime::fatal("raise(SIGUSR1) failed during thread creation");
        }
    }
    while !rt.is_bootstrapped() {
        std::hint::spin_loop();
    }
    rt.set_bootstrapped(false);

    // SAFETY: `previous_alt_stack` was returned by the matching
    // `install_alt_stack` call above and has not been reused since.
    unsafe { context::restore_alt_stack(previous_alt_stack) }
        .unwrap_or_else(|e| runtime::fatal(&format!("sigaltstack restore: {e}")));

    runtime::rearm_timer(rt);

    debug!("thread {id} created");
    Ok(id)
}

/// Terminate the calling thread with `return_value`, never returning.
///
/// Available to a thread's own body for an early exit; the runtime
/// also calls the type-erased form ([`exit_raw`]) when a thread's
/// entry point returns normally.
pub fn exit<R: Send + 'static>(return_value: R) -> ! {
    exit_raw(Box::new(return_value))
}

/// The type-erased core of `exit`. spec.md §4.5.
pub(crate) fn exit_raw(return_value: Payload) -> ! {
    let rt = Runtime::get();
    let current = rt.current();

    // SAFETY: single-executor invariant; `current` is only ever
    // touched by the thread that is currently running, which is us.
    let joiner_id = unsafe { rt.tcb(current) }.joiner_id();
    unsafe { rt.tcb(current) }.finish(return_value);

    debug!("thread {current} exiting");

    match joiner_id {
        Some(joiner) => {
            trace!("thread {current} hands off directly to its joiner {joiner}");
            // SAFETY: `joiner` was BLOCKED waiting on us; its slot is
            // not touched by anything else.
            unsafe { rt.tcb(joiner) }.set_state(ThreadState::Active);
            rt.set_current(joiner);
            let joiner_ctx = unsafe { rt.tcb(joiner) }.context();
            // SAFETY: `joiner_ctx` was populated by `join`'s
            // `save_context` call, whose stack frame is still live
            // (it has been BLOCKED, never resumed, since). This
            // thread never resumes past this point, so it never
            // observes the freed `argument`/`entry` fields above.
            unsafe { context::restore_context(joiner_ctx, 1) };
        }
        None => {
            // No one is waiting; fall back to the scheduler. Because
            // this slot is now FINISHED it will never be selected
            // again, so the `mark != 0` resumed branch of `yield_now`
            // is simply never reached for this call.
            crate::scheduler::yield_now();
            // Only reachable if no other thread was runnable either:
            // spec.md §9 recommends detecting this and terminating
            // cleanly rather than leaving the behavior unspecified.
            info!("thread {current} was the last runnable thread; process exiting");
            std::process::exit(0);
        }
    }
}

/// Block until `target` exits, returning its return value.
///
/// # Panics
///
/// Panics if `R` does not match the type `target`'s entry point
/// actually returned (a programmer error, not a runtime condition).
///
/// # Undefined behavior (spec.md §4.5)
///
/// `target` must have been returned by a prior `create` call and must
/// not already have a joiner. Violating either is not checked.
pub fn join<R: Send + 'static>(target: ThreadId) -> R {
    let payload = join_raw(target);
    *payload
        .downcast::<R>()
        .unwrap_or_else(|_| panic!("fibra: join return type mismatch"))
}

fn join_raw(target: ThreadId) -> Payload {
    let rt = Runtime::get();

    // A target that has already finished (and nobody has joined it
    // yet) can be read back immediately without blocking.
    // SAFETY: single-executor invariant.
    if unsafe { rt.tcb(target) }.state() == ThreadState::Finished {
        return unsafe { rt.tcb(target) }.take_return_value();
    }

    let caller = rt.current();
    trace!("thread {caller} joins thread {target}");

    runtime::disable_timer();

    unsafe { rt.tcb(caller) }.set_state(ThreadState::Blocked);
    unsafe { rt.tcb(target) }.set_joiner_id(Some(caller));

    let caller_ctx = unsafe { rt.tcb(caller) }.context_mut();
    let mark = unsafe { context::save_context(caller_ctx) };
    if mark == 0 {
        rt.set_current(target);
        let target_ctx = unsafe { rt.tcb(target) }.context();
        // SAFETY: `target` was created and is either running or
        // blocked waiting its own turn; its context is live.
        unsafe { context::restore_context(target_ctx, 1) };
    }

    // Resumed: `target` exited directly into us (see `exit_raw`).
    runtime::rearm_timer(rt);
    unsafe { rt.tcb(caller) }.set_state(ThreadState::Active);

    // SAFETY: single-executor invariant; `target` transitioned to
    // `Finished` right before resuming us.
    unsafe { rt.tcb(target) }.take_return_value()
}
