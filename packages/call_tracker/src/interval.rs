//! Union arithmetic over wall-clock intervals.
//!
//! The active and active-exclusive metrics are measures of interval unions:
//! overlapping executions of one call-site on different threads must count
//! the covered wall-clock time once, and recursive executions on one thread
//! collapse into their outermost interval. Everything funnels through the
//! sort-and-sweep merge in this module.

use crate::clock::Timestamp;

/// A half-open-agnostic wall-clock interval with `start <= end`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct Interval {
    pub(crate) start: Timestamp,
    pub(crate) end: Timestamp,
}

impl Interval {
    pub(crate) fn new(start: Timestamp, end: Timestamp) -> Self {
        debug_assert!(start <= end);
        Self { start, end }
    }

    pub(crate) fn length(self) -> u64 {
        self.end.saturating_nanos_since(self.start)
    }
}

/// Merges intervals into a minimal set of disjoint intervals covering the
/// same points. Touching intervals (one ends exactly where the next starts)
/// merge into one.
pub(crate) fn merge(mut intervals: Vec<Interval>) -> Vec<Interval> {
    if intervals.is_empty() {
        return intervals;
    }

    intervals.sort_unstable_by_key(|interval| interval.start);

    let mut merged: Vec<Interval> = Vec::with_capacity(intervals.len());
    for interval in intervals {
        match merged.last_mut() {
            Some(last) if last.end >= interval.start => {
                last.end = last.end.max(interval.end);
            }
            _ => merged.push(interval),
        }
    }

    merged
}

/// Total length of a set of disjoint intervals.
pub(crate) fn total_length(intervals: &[Interval]) -> u64 {
    intervals
        .iter()
        .fold(0_u64, |sum, interval| sum.saturating_add(interval.length()))
}

/// Length of the union of arbitrary (possibly overlapping) intervals.
pub(crate) fn merged_length(intervals: Vec<Interval>) -> u64 {
    total_length(&merge(intervals))
}
