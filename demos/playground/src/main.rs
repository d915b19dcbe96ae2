// Copyright 2025 The Fibra Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! A small hand-driven exercise of the fibra runtime: a handful of
//! worker threads incrementing a shared counter behind a spin mutex,
//! then a producer/consumer pair coordinated by a condition variable.
//! Not part of the crate's public surface; just a place to poke at it
//! with `cargo run`.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use fibra::SpinMutex;

struct SharedCounter {
    mutex: SpinMutex,
    value: AtomicU32,
}

fn counter_demo() {
    let counter = Arc::new(SharedCounter {
        mutex: SpinMutex::new(),
        value: AtomicU32::new(0),
    });

    let mut workers = Vec::new();
    for n in 0..4 {
        let counter = Arc::clone(&counter);
        let id = fibra::create(
            move |_: ()| {
                for _ in 0..1000 {
                    counter.mutex.lock();
                    let current = counter.value.load(Ordering::Relaxed);
                    counter.value.store(current + 1, Ordering::Relaxed);
                    counter.mutex.unlock();
                }
                log::info!("worker {n} done");
            },
            (),
        )
        .expect("thread table has room for four workers");
        workers.push(id);
    }

    for worker in workers {
        fibra::join::<()>(worker);
    }

    println!("counter = {}", counter.value.load(Ordering::Relaxed));
}

fn main() {
    env_logger::init();
    fibra::runtime_init(true);

    counter_demo();

    let greeter = fibra::create(|greeting: &'static str| greeting, "hello from a fiber")
        .expect("thread table has room for one more worker");
    let reply: &'static str = fibra::join(greeter);
    println!("{reply}");
}
