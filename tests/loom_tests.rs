//! Loom-based concurrency tests
//!
//! These tests use the `loom` library to exhaustively check all possible
//! thread interleavings of the counter protocol: last-release destruction,
//! the CAS-based weak-to-strong upgrade, and the lazy control block
//! publication race.
//!
//! Run with: `cargo test --features loom --test loom_tests --release`

#![cfg(feature = "loom")]

use loom::thread;
use pooled_handle::{BoxPayload, Strong};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Payload content that counts its own destructions. Uses std atomics on
/// purpose: the counter is bookkeeping, not part of the modeled protocol.
#[derive(Clone)]
struct Counter {
    drops: Arc<AtomicUsize>,
}

impl Drop for Counter {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

fn counted() -> (Counter, Arc<AtomicUsize>) {
    let drops = Arc::new(AtomicUsize::new(0));
    (
        Counter {
            drops: drops.clone(),
        },
        drops,
    )
}

/// Test: Concurrent clone and drop destroy the payload exactly once
#[test]
fn loom_clone_drop_destroys_once() {
    loom::model(|| {
        let (value, drops) = counted();
        let s: Strong<BoxPayload<Counter>> = Strong::make(value);

        let c = s.clone();
        let t = thread::spawn(move || {
            drop(c);
        });

        drop(s);
        t.join().unwrap();

        assert_eq!(drops.load(Ordering::SeqCst), 1);
    });
}

/// Test: Upgrade racing the last strong release either succeeds with a live
/// payload or fails cleanly; the payload is destroyed exactly once either way
#[test]
fn loom_upgrade_races_last_release() {
    loom::model(|| {
        let (value, drops) = counted();
        let s: Strong<BoxPayload<Counter>> = Strong::make(value);
        let w = s.share_weak();

        let t = thread::spawn(move || {
            let locked = w.lock();
            if locked.has_value() {
                // While we hold the locked handle the payload must be intact.
                assert!(locked.strong_count() >= 1);
            }
            drop(locked);
        });

        drop(s);
        t.join().unwrap();

        assert_eq!(drops.load(Ordering::SeqCst), 1);
    });
}

/// Test: Two threads performing the first share of one handle agree on a
/// single control block and the counts reconcile afterwards
#[test]
fn loom_concurrent_first_share() {
    loom::model(|| {
        let (value, drops) = counted();
        let s = loom::sync::Arc::new(Strong::<BoxPayload<Counter>>::make(value));

        let shared = loom::sync::Arc::clone(&s);
        let t = thread::spawn(move || {
            drop((*shared).clone());
        });

        let c = (*s).clone();
        assert!(c.has_value());
        drop(c);
        t.join().unwrap();

        assert_eq!(s.strong_count(), 1);
        assert_eq!(drops.load(Ordering::SeqCst), 0);

        drop(s);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    });
}

/// Test: The last strong and the last weak handle racing their releases free
/// the payload and the control block exactly once
#[test]
fn loom_strong_weak_drop_race() {
    loom::model(|| {
        let (value, drops) = counted();
        let s: Strong<BoxPayload<Counter>> = Strong::make(value);
        let w = s.share_weak();

        let t = thread::spawn(move || {
            drop(w);
        });

        drop(s);
        t.join().unwrap();

        assert_eq!(drops.load(Ordering::SeqCst), 1);
    });
}

/// Test: A weak handle cloned to another thread can upgrade there while the
/// origin thread keeps its strong handle
#[test]
fn loom_weak_lock_cross_thread() {
    loom::model(|| {
        let (value, drops) = counted();
        let s: Strong<BoxPayload<Counter>> = Strong::make(value);
        let w = s.share_weak();

        let t = thread::spawn(move || {
            let locked = w.lock();
            assert!(locked.has_value());
            drop(locked);
        });

        t.join().unwrap();
        assert_eq!(drops.load(Ordering::SeqCst), 0);

        drop(s);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    });
}
