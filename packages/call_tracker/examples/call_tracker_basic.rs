//! Simplified example demonstrating the key `call_tracker` pieces working
//! together on one thread: markers, nesting and the drained report.
//!
//! Run with: `cargo run --example call_tracker_basic`.

#![expect(
    clippy::arithmetic_side_effects,
    reason = "this is example code that does not need production-level safety"
)]

use std::hint::black_box;
use std::thread;
use std::time::Duration;

fn prepare_input(size: usize) -> Vec<u64> {
    call_tracker::track!();

    (0..size as u64).map(|value| value * 2_654_435_761 % 1_000_003).collect()
}

fn checksum(data: &[u64]) -> u64 {
    call_tracker::track!();

    data.iter().fold(0_u64, |sum, value| sum.wrapping_add(*value))
}

fn simulate_io() {
    call_tracker::track!("simulated io");

    thread::sleep(Duration::from_millis(8));
}

fn run_once(size: usize) -> u64 {
    call_tracker::track!();

    let data = prepare_input(size);
    simulate_io();
    checksum(&data)
}

fn main() {
    println!("=== Scoped Call Timing Example ===");
    println!();

    for round in 0..10 {
        let result = run_once(10_000 + round * 1_000);
        black_box(result);
    }

    // Aggregate everything recorded so far and reset the buffers. The
    // summary is printed last so it ends up at the bottom of the console.
    let report = call_tracker::drain();
    println!(
        "captured {} call-sites over {:?} of wall clock",
        report.summary_rows().len(),
        report.time_total()
    );
    println!();

    report.print_to_stdout();
}
