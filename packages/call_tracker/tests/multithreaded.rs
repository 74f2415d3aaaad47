//! End-to-end tests for concurrent recording: overlap collapsing in the
//! active metrics, per-thread isolation and terminated-thread hand-off.

#![cfg(not(miri))] // Miri cannot use the real platform clock.

use std::sync::{Barrier, Mutex};
use std::thread;
use std::time::Duration;

use call_tracker::{DetailRow, Report};

static DRAIN_LOCK: Mutex<()> = Mutex::new(());

fn exclusive_session() -> std::sync::MutexGuard<'static, ()> {
    let guard = DRAIN_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    let _ = call_tracker::drain();
    guard
}

fn row<'r>(report: &'r Report, label: &str) -> &'r DetailRow {
    report
        .detail_rows()
        .iter()
        .find(|row| row.site().label() == label)
        .unwrap_or_else(|| panic!("no row labelled {label}"))
}

#[test]
fn fully_overlapped_threads_count_wall_clock_once() {
    let _session = exclusive_session();

    let barrier = Barrier::new(4);
    thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                barrier.wait();
                call_tracker::track!("overlapped sleep");
                thread::sleep(Duration::from_millis(20));
            });
        }
    });

    let report = call_tracker::drain();
    let overlapped = row(&report, "overlapped sleep");

    assert_eq!(overlapped.calls(), 4);
    assert_eq!(overlapped.threads(), 4);

    // Four barrier-synced 20ms sleeps: the inclusive sum quadruple-counts,
    // the active union does not.
    assert!(overlapped.time_accumulated() >= Duration::from_millis(80));
    assert!(overlapped.time_active() >= Duration::from_millis(20));
    assert!(
        overlapped.time_active() < Duration::from_millis(60),
        "active time should collapse the overlap, got {:?}",
        overlapped.time_active()
    );
    assert!(overlapped.time_active() * 2 < overlapped.time_accumulated());

    // All four threads sit on top of their own stacks the whole time.
    assert_eq!(overlapped.time_active_exclusive(), overlapped.time_active());
}

#[test]
fn terminated_threads_are_still_reported() {
    let _session = exclusive_session();

    let handle = thread::spawn(|| {
        call_tracker::track!("short lived thread");
        thread::sleep(Duration::from_millis(5));
    });
    handle.join().expect("worker thread must not panic");

    // The thread is gone; its buffer was handed off and must still drain.
    let report = call_tracker::drain();
    let short_lived = row(&report, "short lived thread");

    assert_eq!(short_lived.calls(), 1);
    assert_eq!(short_lived.threads(), 1);
    assert!(short_lived.time_accumulated() >= Duration::from_millis(5));
}

#[test]
fn live_and_terminated_threads_combine() {
    let _session = exclusive_session();

    let worker = thread::spawn(|| {
        call_tracker::track!("mixed workload");
        thread::sleep(Duration::from_millis(5));
    });
    worker.join().expect("worker thread must not panic");

    {
        call_tracker::track!("mixed workload");
        thread::sleep(Duration::from_millis(5));
    }

    let report = call_tracker::drain();

    // Same label, two lines, so two sites with one call each; between them
    // they saw two distinct threads.
    let total_calls: u64 = report.summary_rows().iter().map(|row| row.calls()).sum();
    assert_eq!(total_calls, 2);
}

#[test]
fn disjoint_executions_sum_their_active_time() {
    let _session = exclusive_session();

    // Two threads run the same site strictly one after the other.
    let first = thread::spawn(|| {
        call_tracker::track!("serial across threads");
        thread::sleep(Duration::from_millis(10));
    });
    first.join().expect("worker thread must not panic");

    let second = thread::spawn(|| {
        call_tracker::track!("serial across threads");
        thread::sleep(Duration::from_millis(10));
    });
    second.join().expect("worker thread must not panic");

    let report = call_tracker::drain();
    let serial = row(&report, "serial across threads");

    assert_eq!(serial.calls(), 2);
    assert_eq!(serial.threads(), 2);
    // No overlap: the active union is the sum of both executions.
    assert!(serial.time_active() >= Duration::from_millis(20));
}

#[test]
fn many_threads_with_nested_scopes_reconstruct_cleanly() {
    let _session = exclusive_session();

    fn inner() {
        call_tracker::track!("many inner");
        thread::sleep(Duration::from_millis(1));
    }

    fn outer() {
        call_tracker::track!("many outer");
        for _ in 0..3 {
            inner();
        }
    }

    thread::scope(|scope| {
        for _ in 0..8 {
            scope.spawn(outer);
        }
    });

    let report = call_tracker::drain();

    assert!(report.errors().is_empty());
    let outer_row = row(&report, "many outer");
    let inner_row = row(&report, "many inner");

    assert_eq!(outer_row.calls(), 8);
    assert_eq!(outer_row.threads(), 8);
    assert_eq!(inner_row.calls(), 24);
    assert_eq!(inner_row.threads(), 8);

    // The inner site dominates the outer's exclusive time.
    assert!(outer_row.time_active_exclusive() < outer_row.time_accumulated());
}

#[test]
fn draining_from_a_worker_thread_works() {
    let _session = exclusive_session();

    {
        call_tracker::track!("drained elsewhere");
        thread::sleep(Duration::from_millis(2));
    }

    let report = thread::spawn(call_tracker::drain)
        .join()
        .expect("draining thread must not panic");

    assert_eq!(row(&report, "drained elsewhere").calls(), 1);
}
