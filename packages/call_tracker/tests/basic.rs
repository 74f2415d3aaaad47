//! End-to-end tests of the recording-to-report pipeline for simple,
//! single-threaded workloads against the real clock.

#![cfg(not(miri))] // Miri cannot use the real platform clock.

use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use call_tracker::{DetailRow, Report, ResultSettings};

/// Drains go through the process-wide registry, so tests that record and
/// drain must not interleave. Each test holds this lock and starts from a
/// clean drain.
static DRAIN_LOCK: Mutex<()> = Mutex::new(());

fn exclusive_session() -> std::sync::MutexGuard<'static, ()> {
    let guard = DRAIN_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    // Discard residue from other tests in this binary.
    let _ = call_tracker::drain();
    guard
}

fn sleep_tracked(duration: Duration) {
    call_tracker::track!();
    thread::sleep(duration);
}

fn single_row(report: &Report) -> &DetailRow {
    assert_eq!(report.detail_rows().len(), 1, "expected exactly one site");
    &report.detail_rows()[0]
}

#[test]
fn single_call_is_fully_accounted() {
    let _session = exclusive_session();

    sleep_tracked(Duration::from_millis(10));
    let report = call_tracker::drain();

    let row = single_row(&report);
    assert_eq!(row.calls(), 1);
    assert_eq!(row.threads(), 1);

    let inclusive = row.time_accumulated();
    assert!(
        inclusive >= Duration::from_millis(10) && inclusive < Duration::from_millis(500),
        "inclusive time out of range: {inclusive:?}"
    );

    // One serial call: active and active-exclusive equal the inclusive time.
    assert_eq!(row.time_active(), inclusive);
    assert_eq!(row.time_active_exclusive(), inclusive);

    // A single sample has no spread.
    assert_eq!(row.standard_deviation_nanos(), 0.0);
    assert_eq!(row.coefficient_of_variation(), 0.0);

    // With one call the tails round to empty and the center holds the call.
    assert!(row.fastest().is_none());
    assert!(row.slowest().is_none());
    let center = row.center().expect("center window must exist");
    assert_eq!(center.window().min(), inclusive);
    assert_eq!(center.window().max(), inclusive);
    assert_eq!(center.median(), inclusive);
}

#[test]
fn marker_records_on_early_return() {
    let _session = exclusive_session();

    fn bails_out(early: bool) -> u32 {
        call_tracker::track!();
        if early {
            return 1;
        }
        2
    }

    assert_eq!(bails_out(true), 1);
    assert_eq!(bails_out(false), 2);

    let report = call_tracker::drain();
    assert_eq!(single_row(&report).calls(), 2);
}

#[test]
fn named_markers_are_separate_sites() {
    let _session = exclusive_session();

    fn two_stages() {
        {
            call_tracker::track!("first stage");
            thread::sleep(Duration::from_millis(2));
        }
        {
            call_tracker::track!("second stage");
            thread::sleep(Duration::from_millis(2));
        }
    }

    two_stages();
    let report = call_tracker::drain();

    assert_eq!(report.summary_rows().len(), 2);
    let labels: Vec<&str> = report
        .summary_rows()
        .iter()
        .map(|row| row.site().label())
        .collect();
    assert!(labels.contains(&"first stage"));
    assert!(labels.contains(&"second stage"));
}

#[test]
fn same_name_at_different_locations_is_kept_apart() {
    let _session = exclusive_session();

    {
        call_tracker::track!("shared name");
        thread::sleep(Duration::from_millis(1));
    }
    {
        call_tracker::track!("shared name");
        thread::sleep(Duration::from_millis(1));
    }

    let report = call_tracker::drain();

    // Same label, two source lines: two sites, each with one call.
    assert_eq!(report.summary_rows().len(), 2);
    for row in report.summary_rows() {
        assert_eq!(row.calls(), 1);
        assert_eq!(row.site().label(), "shared name");
    }
}

#[test]
fn drain_after_drain_is_empty() {
    let _session = exclusive_session();

    sleep_tracked(Duration::from_millis(2));
    let first = call_tracker::drain();
    assert!(!first.is_empty());

    let second = call_tracker::drain();
    assert!(second.is_empty());
    assert_eq!(second.summary_rows().len(), 0);
    assert_eq!(second.time_total(), Duration::ZERO);
    assert_eq!(second.time_tracked(), Duration::ZERO);
}

#[test]
fn empty_drain_is_a_report_not_an_error() {
    let _session = exclusive_session();

    let report = call_tracker::drain_with(ResultSettings::new());

    assert!(report.is_empty());
    assert!(report.errors().is_empty());
    assert_eq!(report.time_total(), Duration::ZERO);
    assert!(report.to_string().contains("No timing statistics captured"));
}

#[test]
fn events_recorded_between_drains_land_in_the_second() {
    let _session = exclusive_session();

    sleep_tracked(Duration::from_millis(1));
    let first = call_tracker::drain();
    assert_eq!(single_row(&first).calls(), 1);

    sleep_tracked(Duration::from_millis(1));
    sleep_tracked(Duration::from_millis(1));
    let second = call_tracker::drain();
    assert_eq!(single_row(&second).calls(), 2);
}

#[test]
fn call_site_reports_its_source_location() {
    let _session = exclusive_session();

    sleep_tracked(Duration::from_millis(1));
    let report = call_tracker::drain();

    let site = single_row(&report).site();
    assert!(site.file().ends_with("basic.rs"), "file was {}", site.file());
    assert!(
        site.function().ends_with("sleep_tracked"),
        "function was {}",
        site.function()
    );
    assert!(site.line().get() > 1);
    assert!(site.name_override().is_none());
}

#[test]
fn scope_spanning_a_drain_does_not_poison_later_drains() {
    let _session = exclusive_session();

    static SITE: call_tracker::SiteSlot =
        call_tracker::SiteSlot::new("tests/basic.rs", 1, Some("spanning scope"));

    let spanning = call_tracker::Scope::enter(&SITE, || "manual");

    // The begin event is in this snapshot without its end; it counts nowhere.
    let mid = call_tracker::drain();
    assert!(mid.is_empty());

    drop(spanning);
    sleep_tracked(Duration::from_millis(1));

    // The dangling end must not be treated as a malformed stream.
    let after = call_tracker::drain();
    assert!(after.errors().is_empty());
    assert_eq!(single_row(&after).calls(), 1);
}

#[test]
fn meta_times_are_consistent() {
    let _session = exclusive_session();

    sleep_tracked(Duration::from_millis(5));
    sleep_tracked(Duration::from_millis(5));
    let report = call_tracker::drain();

    assert!(report.time_tracked() <= report.time_total());
    assert!(report.time_total() >= Duration::from_millis(10));
    assert!(report.end_time() >= report.start_time());
}
