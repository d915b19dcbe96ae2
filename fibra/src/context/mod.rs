// Copyright 2025 The Fibra Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Context Primitives
//!
//! This module provides the only unsafe, host-specific primitives the
//! rest of the runtime depends on: saving and restoring a thread's
//! execution context, and installing an alternate signal stack.
//!
//! # Design
//!
//! `save_context`/`restore_context` implement the "may return twice"
//! contract of setjmp/longjmp, hand-written for the x86_64 System V
//! ABI rather than bound via libc FFI (see DESIGN.md for why). Only
//! the six callee-saved general-purpose registers and the stack
//! pointer need saving: everything else is either caller-saved (and
//! therefore already spilled across the call by the compiler, per the
//! ABI) or irrelevant to control transfer.

#![allow(clippy::missing_safety_doc)]

use std::io;
use std::mem::MaybeUninit;
use std::os::raw::c_int;

#[cfg(target_arch = "x86_64")]
mod arch {
    core::arch::global_asm!(include_str!("switch_x86_64.s"), options(att_syntax));

    extern "sysv64" {
        pub fn fibra_save_context(ctx: *mut super::Context) -> i32;
        pub fn fibra_restore_context(ctx: *const super::Context, mark: i32) -> !;
    }
}

#[cfg(not(target_arch = "x86_64"))]
mod arch {
    compile_error!("fibra's context switch is only implemented for x86_64");
}

/// An opaque saved-execution-context buffer.
///
/// Large enough to capture the callee-saved integer registers and the
/// stack pointer; see `switch_x86_64.s` for the exact layout this
/// struct's field order must match.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Context {
    rsp: u64,
    rbx: u64,
    rbp: u64,
    r12: u64,
    r13: u64,
    r14: u64,
    r15: u64,
}

impl Context {
    /// An empty context. Only ever handed to `save_context`, never to
    /// `restore_context`, so its all-zero field values never matter.
    pub const fn zeroed() -> Self {
        Context {
            rsp: 0,
            rbx: 0,
            rbp: 0,
            r12: 0,
            r13: 0,
            r14: 0,
            r15: 0,
        }
    }
}

/// Capture the current execution context into `ctx`.
///
/// Returns 0 when `save_context` is reached by direct, ordinary call.
/// Returns the `mark` value passed to a later `restore_context(ctx,
/// mark)` call when execution resumes here instead.
///
/// # Safety
///
/// `ctx` must be valid for writes for the lifetime of the TCB slot
/// that owns it, since a later `restore_context` reads it back.
pub unsafe fn save_context(ctx: *mut Context) -> i32 {
    arch::fibra_save_context(ctx)
}

/// Transfer control to the point that called `save_context(ctx)`,
/// which observes `restore_context`'s `mark` as `save_context`'s
/// return value. Never returns.
///
/// # Safety
///
/// `ctx` must have been populated by a prior `save_context` call whose
/// stack frame (or signal-handler frame, for a freshly bootstrapped
/// thread) is still live, i.e. the thread owning it has not since
/// been resumed through completion.
pub unsafe fn restore_context(ctx: *const Context, mark: i32) -> ! {
    arch::fibra_restore_context(ctx, mark)
}

/// Install `(base, len)` as the alternate signal stack for the calling
/// thread, returning the previously installed alt-stack (if any) so it
/// can be restored afterwards.
///
/// # Safety
///
/// `base` must point to a writable region of at least `len` bytes,
/// valid until the alt-stack is next replaced.
pub unsafe fn install_alt_stack(base: *mut u8, len: usize) -> io::Result<libc::stack_t> {
    let new_stack = libc::stack_t {
        ss_sp: base as *mut _,
        ss_flags: 0,
        ss_size: len,
    };
    let mut old_stack = MaybeUninit::<libc::stack_t>::uninit();
    if libc::sigaltstack(&new_stack, old_stack.as_mut_ptr()) == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(old_stack.assume_init())
}

/// Restore a previously displaced alternate signal stack.
///
/// # Safety
///
/// `old` must be a value previously returned by `install_alt_stack`.
pub unsafe fn restore_alt_stack(old: libc::stack_t) -> io::Result<()> {
    if libc::sigaltstack(&old, std::ptr::null_mut()) == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Install `handler` as the simple (non-siginfo) handler for `signal`,
/// masking no additional signals and using the flags given.
///
/// # Safety
///
/// `handler` must be safe to invoke asynchronously on whatever stack
/// is current (the main stack, or an installed alt-stack if `flags`
/// includes `SA_ONSTACK`) at arbitrary points in the program.
pub unsafe fn install_signal_handler(
    signal: c_int,
    handler: extern "C" fn(c_int),
    flags: c_int,
) -> io::Result<()> {
    let mut action: libc::sigaction = std::mem::zeroed();
    action.sa_sigaction = handler as usize;
    action.sa_flags = flags;
    libc::sigemptyset(&mut action.sa_mask);
    if libc::sigaction(signal, &action, std::ptr::null_mut()) == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
