// Copyright 2025 The Fibra Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Synchronization Primitives
//!
//! A spin mutex and a condition variable, layered on top of the
//! scheduler rather than the host OS. spec.md §4.6, §4.7. These are
//! deliberately not `std::sync`-compatible: no RAII guards, no
//! ownership tracking, no poisoning. They exist to coordinate Fibra
//! threads with each other, not to wrap arbitrary host synchronization.

mod condvar;
mod mutex;

pub use condvar::CondVar;
pub use mutex::SpinMutex;
