// Copyright 2025 The Fibra Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Runtime Singleton
//!
//! This module owns the process-wide mutable state spec.md's design
//! notes call out explicitly: the TCB table, the current-thread index,
//! and the thread-creation handoff variables. It is modeled as a
//! single `Runtime` struct behind a process-wide `OnceLock`, following
//! the teacher's `GLOBAL_SCHEDULER` + init-guard pattern
//! (`kernel/sched/mod.rs`) but using `std::sync::OnceLock` in place of
//! a hand-rolled spin-on-`AtomicBool` guard, since this is a hosted
//! (`std`) runtime rather than a `no_std` kernel.
//!
//! Every field here is read or written only from the single logical
//! executor (the one OS thread running the runtime) or from a signal
//! handler running on that same OS thread; the single-CPU invariant in
//! spec.md §5 is what makes the `UnsafeCell`/`Ordering::Relaxed`
//! accesses below sound, not anything this module enforces itself.

use std::cell::UnsafeCell;
use std::os::raw::c_int;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::OnceLock;

use log::{debug, error, info};

use crate::context::{self, Context};
use crate::tcb::{Entry, Payload, Tcb, ThreadId, ThreadState, MAX_THREADS};

/// The bootstrap-signal used to hand a freshly allocated stack to
/// [`crate::create`]. Chosen to match the original design's choice of
/// `SIGUSR1`, reserved for this runtime's exclusive use.
pub(crate) const BOOTSTRAP_SIGNAL: c_int = libc::SIGUSR1;

/// The preemption-tick signal. spec.md §4.8.
pub(crate) const PREEMPT_SIGNAL: c_int = libc::SIGALRM;

/// Sentinel meaning "no thread is bootstrapping right now".
const NO_BOOTSTRAP: u32 = u32::MAX;

pub(crate) struct Runtime {
    table: Box<[UnsafeCell<Tcb>]>,
    current: AtomicU32,
    bootstrap_id: AtomicU32,
    bootstrapped: AtomicBool,
    preemption_enabled: bool,
}

// SAFETY: every field is either atomic, or a `Tcb` slot that is only
// ever touched by the single logical executor (see module docs).
unsafe impl Sync for Runtime {}

static RUNTIME: OnceLock<Runtime> = OnceLock::new();

impl Runtime {
    fn new(preemption_enabled: bool) -> Self {
        let mut slots = Vec::with_capacity(MAX_THREADS);
        slots.push(UnsafeCell::new(Tcb::bootstrap()));
        for _ in 1..MAX_THREADS {
            slots.push(UnsafeCell::new(Tcb::invalid()));
        }
        Runtime {
            table: slots.into_boxed_slice(),
            current: AtomicU32::new(0),
            bootstrap_id: AtomicU32::new(NO_BOOTSTRAP),
            bootstrapped: AtomicBool::new(false),
            preemption_enabled,
        }
    }

    /// Fetch the runtime singleton. Panics (with a message, not a
    /// silent default-init) if `runtime_init` has not run yet. Every
    /// other entry point in this crate requires it, per spec.md §4.2.
    pub(crate) fn get() -> &'static Runtime {
        RUNTIME
            .get()
            .expect("fibra::runtime_init must be called before any other fibra API")
    }

    pub(crate) fn preemption_enabled(&self) -> bool {
        self.preemption_enabled
    }

    /// # Safety
    ///
    /// The returned reference must not outlive the critical section
    /// that obtained it, and callers must uphold the single-executor
    /// invariant (no two live `&mut Tcb` borrows of the same slot).
    pub(crate) unsafe fn tcb(&self, id: ThreadId) -> &mut Tcb {
        &mut *self.table[id.index()].get()
    }

    pub(crate) fn current(&self) -> ThreadId {
        ThreadId::new(self.current.load(Ordering::Relaxed) as usize)
    }

    pub(crate) fn set_current(&self, id: ThreadId) {
        self.current.store(id.index() as u32, Ordering::Relaxed);
    }

    /// Find the lowest-index `Invalid` slot, or `None` if the table is
    /// full. spec.md §4.3 step 1.
    pub(crate) fn find_invalid_slot(&self) -> Option<ThreadId> {
        for i in 1..MAX_THREADS {
            let id = ThreadId::new(i);
            // SAFETY: single-executor invariant; this scan only reads state.
            if unsafe { self.tcb(id) }.state() == ThreadState::Invalid {
                return Some(id);
            }
        }
        None
    }

    pub(crate) fn set_bootstrap_id(&self, id: ThreadId) {
        self.bootstrap_id.store(id.index() as u32, Ordering::Release);
    }

    pub(crate) fn bootstrap_id(&self) -> ThreadId {
        ThreadId::new(self.bootstrap_id.load(Ordering::Acquire) as usize)
    }

    pub(crate) fn set_bootstrapped(&self, value: bool) {
        self.bootstrapped.store(value, Ordering::Release);
    }

    pub(crate) fn is_bootstrapped(&self) -> bool {
        self.bootstrapped.load(Ordering::Acquire)
    }
}

/// Initialize the Fibra runtime.
///
/// Installs the bootstrap-signal handler and the preemption-timer
/// signal handler, and resets the TCB table to its initial state
/// (slot 0 `Active` as the bootstrap thread, the rest `Invalid`).
///
/// Must be called exactly once, by the bootstrap thread, before any
/// other API in this crate. Calling it twice panics; spec.md leaves
/// that precondition's violation undefined, and a panic is the
/// loudest available diagnostic for a precondition a caller controls.
///
/// A failure to install either signal handler is a host-primitive
/// failure (spec.md §7): fatal, diagnosed, and terminates the process.
pub fn runtime_init(preemption_enabled: bool) {
    // SAFETY: both handlers are simple signal-number-only handlers
    // (no SA_SIGINFO), safe to invoke asynchronously at any point.
    unsafe {
        if let Err(e) =
            context::install_signal_handler(BOOTSTRAP_SIGNAL, bootstrap_handler, libc::SA_ONSTACK)
        {
            fatal(&format!("installing bootstrap signal handler: {e}"));
        }
        if let Err(e) = context::install_signal_handler(PREEMPT_SIGNAL, preempt_handler, 0) {
            fatal(&format!("installing preemption signal handler: {e}"));
        }
    }

    RUNTIME
        .set(Runtime::new(preemption_enabled))
        .unwrap_or_else(|_| panic!("fibra::runtime_init called more than once"));

    info!(
        "fibra runtime initialized: max_threads={} preemption_enabled={}",
        MAX_THREADS, preemption_enabled
    );
}

/// Terminate the process after a host-primitive failure. spec.md §7.
pub(crate) fn fatal(message: &str) -> ! {
    error!("fatal host-primitive failure: {message}");
    std::process::exit(1);
}

/// The preemption timer's period. spec.md §6.
pub const TIMER_VAL_MICROS: i64 = 10_000;

fn itimerval(micros: i64) -> libc::itimerval {
    libc::itimerval {
        it_interval: libc::timeval {
            tv_sec: 0,
            tv_usec: micros,
        },
        it_value: libc::timeval {
            tv_sec: 0,
            tv_usec: micros,
        },
    }
}

/// Disable the preemption timer. Called at the start of every
/// suspension point (spec.md §4.8).
pub(crate) fn disable_timer() {
    let disabled = itimerval(0);
    unsafe {
        libc::setitimer(libc::ITIMER_REAL, &disabled, std::ptr::null_mut());
    }
}

/// Re-arm the preemption timer, if the runtime was started with
/// preemption enabled.
pub(crate) fn rearm_timer(rt: &Runtime) {
    if !rt.preemption_enabled() {
        return;
    }
    let armed = itimerval(TIMER_VAL_MICROS);
    unsafe {
        libc::setitimer(libc::ITIMER_REAL, &armed, std::ptr::null_mut());
    }
}

/// The preemption signal handler: a direct call to `yield`. spec.md §4.8.
extern "C" fn preempt_handler(_signal: c_int) {
    crate::scheduler::yield_now();
}

/// The bootstrap signal handler. spec.md §4.3 steps 6 and 8.
extern "C" fn bootstrap_handler(_signal: c_int) {
    let rt = Runtime::get();
    let new_id = rt.bootstrap_id();
    // SAFETY: single-executor invariant; `new_id`'s slot was just
    // allocated by `create` and is not touched by anyone else yet.
    let ctx_ptr: *mut Context = unsafe { rt.tcb(new_id) }.context_mut();

    let mark = unsafe { context::save_context(ctx_ptr) };
    if mark == 0 {
        // Direct path: record that the jmp buffer is ready and return
        // normally, unwinding back to `create`'s `raise` call on the
        // *original* stack.
        rt.set_bootstrapped(true);
    } else {
        // Resumed path: some later `restore_context` jumped back into
        // this function as if `save_context` just returned `mark`.
        // `current` has already been set by whoever resumed us.
        rearm_timer(rt);
        let current = rt.current();
        debug!("thread {current} entering its entry point");
        let (entry, argument): (Entry, Payload) = unsafe { rt.tcb(current) }.take_entry();
        let return_value = entry(argument);
        crate::lifecycle::exit_raw(return_value);
    }
}
