//! Multithreaded example: several workers hammer the same call-sites while
//! the report separates honest wall-clock cost (active-exclusive) from the
//! quadruple-counted inclusive sums.
//!
//! Run with: `cargo run --example call_tracker_threaded`.

#![expect(
    clippy::arithmetic_side_effects,
    clippy::cast_possible_truncation,
    reason = "this is example code that does not need production-level safety"
)]

use std::hint::black_box;
use std::thread;

const WORKERS: u32 = 4;
const CANDIDATES_PER_WORKER: u32 = 40_000;

fn is_prime(candidate: u32) -> bool {
    call_tracker::track!();

    if candidate < 2 {
        return false;
    }
    let mut divisor: u32 = 2;
    while divisor.saturating_mul(divisor) <= candidate {
        if candidate % divisor == 0 {
            return false;
        }
        divisor += 1;
    }
    true
}

fn count_primes(range: std::ops::Range<u32>) -> u32 {
    call_tracker::track!();

    range.filter(|candidate| is_prime(*candidate)).count() as u32
}

fn main() {
    println!("counting primes on {WORKERS} threads...");

    let total: u32 = thread::scope(|scope| {
        let handles: Vec<_> = (0..WORKERS)
            .map(|worker| {
                scope.spawn(move || {
                    let start = worker * CANDIDATES_PER_WORKER;
                    count_primes(start..start + CANDIDATES_PER_WORKER)
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|handle| handle.join().expect("worker must not panic"))
            .sum()
    });
    black_box(total);

    println!("found {total} primes");
    println!();

    let report = call_tracker::drain();

    // With all workers busy simultaneously, the inclusive sum approaches
    // WORKERS times the active time.
    for row in report.summary_rows() {
        println!(
            "{}: {} calls on up to {WORKERS} threads, active-exclusive {:?}",
            row.site().label(),
            row.calls(),
            row.time_active_exclusive()
        );
    }
    println!();

    report.print_to_stdout();
}
