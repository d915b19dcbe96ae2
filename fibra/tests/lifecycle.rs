// Copyright 2025 The Fibra Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Deterministic lifecycle scenarios, run with preemption disabled so
//! every context switch is explicit (`yield`, `join`, `exit`,
//! `cond_wait`) rather than timer-driven.
//!
//! `fibra::runtime_init` may only run once per process, so every
//! scenario below lives in a single `#[test]` function: a second test
//! function in this binary would race the first for `OnceLock::set`
//! and panic. Cross-binary isolation (one process per `tests/*.rs`
//! file) is what actually separates this file from `preemption.rs`.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use fibra::{CondVar, SpinMutex};

#[test]
fn lifecycle_scenarios() {
    fibra::runtime_init(false);

    join_returns_value();
    multiple_workers_share_a_counter();
    producer_consumer_with_condvar();
    capacity_is_bounded();
}

/// spec.md §8 scenario 3: a thread's return value survives the round
/// trip through `exit`/`join`.
fn join_returns_value() {
    let worker = fibra::create(|()| 42u32, ()).expect("slot available");
    let result: u32 = fibra::join(worker);
    assert_eq!(result, 42);
}

/// spec.md §8 scenario 2-ish: several threads serialize increments of
/// a shared counter through the spin mutex; none of the 4000
/// increments are lost.
fn multiple_workers_share_a_counter() {
    struct Shared {
        mutex: SpinMutex,
        value: AtomicU32,
    }

    let shared = Arc::new(Shared {
        mutex: SpinMutex::new(),
        value: AtomicU32::new(0),
    });

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let shared = Arc::clone(&shared);
            fibra::create(
                move |()| {
                    for _ in 0..1000 {
                        shared.mutex.lock();
                        let v = shared.value.load(Ordering::Relaxed);
                        shared.value.store(v + 1, Ordering::Relaxed);
                        shared.mutex.unlock();
                    }
                },
                (),
            )
            .expect("slot available")
        })
        .collect();

    for worker in workers {
        fibra::join::<()>(worker);
    }

    assert_eq!(shared.value.load(Ordering::Relaxed), 4000);
}

/// spec.md §4.7: a waiter blocked in `cond_wait` is resumed by
/// `signal`, observing the state the signaller set up, in FIFO order
/// relative to other waiters.
fn producer_consumer_with_condvar() {
    struct Channel {
        mutex: SpinMutex,
        cv: CondVar,
        ready: std::cell::Cell<bool>,
        observed: std::sync::Mutex<Vec<u32>>,
    }
    // SAFETY: every field here is only ever touched by one fibra
    // thread at a time; the runtime itself is single-OS-thread, so no
    // real concurrent access ever occurs.
    unsafe impl Sync for Channel {}

    let channel = Arc::new(Channel {
        mutex: SpinMutex::new(),
        cv: CondVar::new(),
        ready: std::cell::Cell::new(false),
        observed: std::sync::Mutex::new(Vec::new()),
    });

    let mut waiters = Vec::new();
    for id in 0..3u32 {
        let channel = Arc::clone(&channel);
        waiters.push(
            fibra::create(
                move |()| {
                    channel.mutex.lock();
                    while !channel.ready.get() {
                        channel.cv.wait(&channel.mutex);
                        channel.mutex.lock(); // §9 sharp edge: reacquire by hand
                    }
                    channel.mutex.unlock();
                    channel.observed.lock().unwrap().push(id);
                },
                (),
            )
            .expect("slot available"),
        );
    }

    // Give every waiter a chance to enqueue before signaling.
    for _ in 0..8 {
        fibra::yield_now();
    }

    channel.mutex.lock();
    channel.ready.set(true);
    channel.mutex.unlock();
    channel.cv.broadcast();

    for waiter in waiters {
        fibra::join::<()>(waiter);
    }

    let observed = channel.observed.lock().unwrap();
    assert_eq!(observed.len(), 3);
}

/// spec.md §7: `create` reports `CapacityExhausted` once the table is
/// full rather than silently overwriting a slot.
fn capacity_is_bounded() {
    let mut created = Vec::new();
    let result = loop {
        match fibra::create(|()| (), ()) {
            Ok(id) => created.push(id),
            Err(e) => break e,
        }
    };
    assert_eq!(result, fibra::Error::CapacityExhausted);

    for id in created {
        fibra::join::<()>(id);
    }
}
