// Copyright 2025 The Fibra Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Fibra: a preemptive, signal-based user-space thread runtime.
//!
//! Fibra multiplexes many logical threads onto a single OS thread.
//! Switching between them is cooperative (a thread calls [`yield_now`],
//! [`join`], or [`exit`]) or, if the runtime is started with preemption
//! enabled, involuntary (a periodic timer signal forces a yield).
//! There is never more than one thread actually executing at a time;
//! the scheduling unit this crate provides is concurrency, not
//! parallelism.
//!
//! # Getting started
//!
//! ```no_run
//! fibra::runtime_init(true);
//!
//! let worker = fibra::create(|n: u32| n * 2, 21).unwrap();
//! let result: u32 = fibra::join(worker);
//! assert_eq!(result, 42);
//! ```
//!
//! # Safety model
//!
//! Almost everything below [`runtime_init`] is built on `unsafe`
//! non-local control transfer: saving and restoring raw CPU registers,
//! running signal handlers on alternate stacks, and reading/writing a
//! process-wide table of thread control blocks with no locking beyond
//! the single-executor invariant itself. That invariant (at most one
//! logical thread is ever actually running, whether on the main flow
//! of control or inside a signal handler) is what makes the unsafety
//! contained; see the `runtime` and `context` module docs for the
//! specifics each `unsafe` block relies on.

mod context;
mod error;
mod lifecycle;
mod runtime;
mod scheduler;
mod sync;
mod tcb;

pub use error::{Error, Result};
pub use lifecycle::{create, exit, join};
pub use runtime::runtime_init;
pub use runtime::TIMER_VAL_MICROS as TIMER_VAL;
pub use scheduler::yield_now;
pub use sync::{CondVar, SpinMutex};
pub use tcb::{ThreadId, MAX_THREADS, STACK_SIZE};
