// Copyright 2025 The Fibra Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Spin Mutex
//!
//! spec.md §4.6. Unlike [`crate::sync::CondVar`]'s internal lock, this
//! type wraps no data and hands back no guard: it is a direct
//! transliteration of the two-phase wait-then-CAS lock/unlock pair,
//! with no ownership tracking. Holding no data means there is nothing
//! for a guard to dereference, and spec.md is explicit that
//! `mutex_unlock` performs no ownership check: any thread may unlock
//! it, including one that never locked it.

use std::sync::atomic::{AtomicBool, Ordering};

/// A raw spin mutex: just a lock bit, no payload.
///
/// `lock`/`unlock` map directly onto spec.md's `mutex_lock`/
/// `mutex_unlock`. There is no RAII guard on purpose, see the module
/// docs.
pub struct SpinMutex {
    locked: AtomicBool,
}

impl SpinMutex {
    /// `mutex_init`: the lock starts free.
    pub const fn new() -> Self {
        SpinMutex {
            locked: AtomicBool::new(false),
        }
    }

    /// `mutex_lock`: wait (read-only) while held, then race a CAS from
    /// free to held; repeat until the CAS wins. The read-only spin
    /// phase avoids bouncing the cache line with failed CAS attempts
    /// while another thread holds the lock.
    pub fn lock(&self) {
        loop {
            while self.locked.load(Ordering::Relaxed) {
                std::hint::spin_loop();
            }
            if self
                .locked
                .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                return;
            }
        }
    }

    /// `mutex_unlock`: unconditionally release. No ownership check.
    pub fn unlock(&self) {
        self.locked.store(false, Ordering::Release);
    }
}

impl Default for SpinMutex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locks_and_unlocks() {
        let m = SpinMutex::new();
        m.lock();
        m.unlock();
        m.lock();
        m.unlock();
    }

    #[test]
    fn unlock_without_lock_does_not_panic() {
        // spec.md §4.6: "No ownership check."
        let m = SpinMutex::new();
        m.unlock();
    }
}
