//! Exhaustive interleaving checks under `loom`.
//!
//! Run with `RUSTFLAGS="--cfg loom" cargo test --test loom --release`.
//! Everything here is skipped on an ordinary `cargo test` run.

#![cfg(loom)]

use hadron_linkset::{join, lock_one, split, Locker, Reference};

#[test]
fn two_threads_lock_one_the_same_reference() {
    loom::model(|| {
        let r = loom::sync::Arc::new(Reference::new().unwrap());

        let r2 = r.clone();
        let t = loom::thread::spawn(move || {
            let _guard = lock_one(&r2);
        });

        let _guard = lock_one(&r);
        drop(_guard);
        t.join().unwrap();
    });
}

/// Mirrors the two-reference scenario named directly in the design notes:
/// one thread runs `LockMany([A,B]) + Join(A,B) + UnlockMany` while a
/// second thread concurrently runs `LockOne(A)`.
#[test]
fn lock_many_join_races_concurrent_lock_one() {
    loom::model(|| {
        let a = Reference::new().unwrap();
        let b = Reference::new().unwrap();
        let a2 = a.clone();

        let t = loom::thread::spawn(move || {
            let _guard = lock_one(&a2);
        });

        let mut locker = Locker::new(&[a.clone(), b.clone()]).unwrap();
        locker.lock_many();
        join(&mut locker, &a, &b).unwrap();
        locker.unlock_many();

        t.join().unwrap();
    });
}

#[test]
fn join_and_lock_many_race() {
    loom::model(|| {
        let a = Reference::new().unwrap();
        let b = Reference::new().unwrap();
        let a2 = a.clone();
        let b2 = b.clone();

        let t = loom::thread::spawn(move || {
            let mut locker = Locker::new(&[a2, b2]).unwrap();
            locker.lock_many();
            locker.unlock_many();
        });

        let mut locker = Locker::new(&[a.clone(), b.clone()]).unwrap();
        locker.lock_many();
        let link = join(&mut locker, &a, &b).unwrap();
        split(&mut locker, &link).unwrap();
        locker.unlock_many();

        t.join().unwrap();
    });
}
