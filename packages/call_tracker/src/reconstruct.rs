//! Per-thread reconstruction: pairing begin/end events back into call trees.
//!
//! Each thread's event sequence is a balanced nest, so one forward pass with
//! an explicit stack recovers every scope execution together with the facts
//! the statistics need: recursion depth, the inclusive duration, the
//! exclusive duration (inclusive minus direct tracked children), the
//! sub-intervals the scope spent on top of the stack, and the per-call-site
//! maximal active intervals.

use foldhash::{HashMap, HashMapExt};
use thiserror::Error;

use crate::clock::Timestamp;
use crate::event::{Event, EventKind, ThreadId};
use crate::interval::Interval;
use crate::recorded::ThreadEvents;
use crate::site::CallSiteId;

/// A defect found while reconstructing one thread's event stream.
///
/// Reconstruction never fails the drain as a whole; errors accumulate in the
/// report's side channel and the affected events are excluded.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum ReconstructionError {
    /// An end event did not match the innermost open scope. The whole
    /// thread's events are excluded; other threads are unaffected.
    #[error(
        "thread {thread} recorded an end for call-site {site} that does not match its innermost \
         open scope; the thread's events were excluded"
    )]
    UnmatchedEnd { thread: u32, site: u32 },

    /// A scope's end timestamp preceded its begin timestamp. The pair is
    /// discarded; the rest of the thread's events are kept.
    #[error(
        "thread {thread} recorded a scope at call-site {site} whose end precedes its begin; the \
         pair was discarded"
    )]
    NonMonotonicPair { thread: u32, site: u32 },
}

/// One completed scope execution, recovered from a matched begin/end.
#[derive(Clone, Debug)]
pub(crate) struct Pair {
    pub(crate) site: CallSiteId,
    pub(crate) thread: ThreadId,
    pub(crate) begin: Timestamp,
    pub(crate) end: Timestamp,
    /// How many scopes for the same call-site were already open on this
    /// thread at the moment of begin; 0 means outermost.
    pub(crate) depth: u32,
    /// Inclusive duration minus the inclusive durations of direct tracked
    /// children.
    pub(crate) exclusive: u64,
    /// The maximal sub-intervals during which this execution sat on top of
    /// its thread's stack. Feeds the active-exclusive metric.
    pub(crate) self_intervals: Vec<Interval>,
}

impl Pair {
    pub(crate) fn inclusive(&self) -> u64 {
        self.end.saturating_nanos_since(self.begin)
    }
}

/// Everything reconstruction recovered from one thread's events.
#[derive(Debug, Default)]
pub(crate) struct ThreadTimeline {
    pub(crate) pairs: Vec<Pair>,
    /// Per call-site, the maximal intervals during which at least one scope
    /// for that site was open on this thread. Recursive re-entries collapse
    /// into their outermost interval here.
    pub(crate) active: HashMap<CallSiteId, Vec<Interval>>,
    pub(crate) errors: Vec<ReconstructionError>,
}

/// An open scope on the reconstruction stack.
#[derive(Debug)]
struct Frame {
    site: CallSiteId,
    begin: Timestamp,
    depth: u32,
    child_inclusive: u64,
    self_intervals: Vec<Interval>,
    /// Start of the currently accumulating top-of-stack segment; meaningful
    /// only while this frame is on top.
    segment_open: Timestamp,
}

impl Frame {
    fn close_segment(&mut self, at: Timestamp) {
        if at > self.segment_open {
            self.self_intervals
                .push(Interval::new(self.segment_open, at));
        }
    }
}

/// Reconstructs every thread of a drained snapshot.
pub(crate) fn reconstruct_all(threads: &[ThreadEvents]) -> Vec<ThreadTimeline> {
    threads
        .iter()
        .map(|thread| reconstruct_thread(thread.thread(), thread.events()))
        .collect()
}

/// One pass over one thread's events.
pub(crate) fn reconstruct_thread(thread: ThreadId, events: &[Event]) -> ThreadTimeline {
    let mut timeline = ThreadTimeline::default();
    let mut stack: Vec<Frame> = Vec::new();
    let mut open_depth: HashMap<CallSiteId, u32> = HashMap::new();
    let mut active_open: HashMap<CallSiteId, Timestamp> = HashMap::new();

    for event in events {
        match event.kind {
            EventKind::Begin => {
                // The previous top is no longer on top of the stack.
                if let Some(top) = stack.last_mut() {
                    top.close_segment(event.timestamp);
                }

                let depth = open_depth.entry(event.site).or_insert(0);
                if *depth == 0 {
                    active_open.insert(event.site, event.timestamp);
                }
                let pair_depth = *depth;
                *depth = depth.saturating_add(1);

                stack.push(Frame {
                    site: event.site,
                    begin: event.timestamp,
                    depth: pair_depth,
                    child_inclusive: 0,
                    self_intervals: Vec::new(),
                    segment_open: event.timestamp,
                });
            }
            EventKind::End => {
                let Some(mut frame) = stack.pop() else {
                    // Per-thread streams are balanced by construction, so an
                    // end with nothing open can only be the tail of a scope
                    // whose begin went into an earlier drain. The pair is
                    // split across two snapshots and counts in neither.
                    continue;
                };
                if frame.site != event.site {
                    return excluded(thread, event.site);
                }

                frame.close_segment(event.timestamp);

                let depth = open_depth
                    .get_mut(&event.site)
                    .expect("every popped frame incremented its site's open depth");
                *depth = depth.saturating_sub(1);
                if *depth == 0 {
                    if let Some(opened) = active_open.remove(&event.site) {
                        if event.timestamp >= opened {
                            timeline
                                .active
                                .entry(event.site)
                                .or_default()
                                .push(Interval::new(opened, event.timestamp));
                        }
                    }
                }

                // The parent is back on top of the stack.
                if let Some(parent) = stack.last_mut() {
                    parent.segment_open = event.timestamp;
                }

                if event.timestamp < frame.begin {
                    timeline.errors.push(ReconstructionError::NonMonotonicPair {
                        thread: thread.as_u32(),
                        site: event.site.as_u32(),
                    });
                    continue;
                }

                let inclusive = event.timestamp.saturating_nanos_since(frame.begin);
                if let Some(parent) = stack.last_mut() {
                    parent.child_inclusive = parent.child_inclusive.saturating_add(inclusive);
                }

                timeline.pairs.push(Pair {
                    site: frame.site,
                    thread,
                    begin: frame.begin,
                    end: event.timestamp,
                    depth: frame.depth,
                    exclusive: inclusive.saturating_sub(frame.child_inclusive),
                    self_intervals: frame.self_intervals,
                });
            }
        }
    }

    // Scopes still open at drain time (or at process exit) leave only their
    // begin events behind. They produce no pair and no error; the partial
    // record is discarded here.
    timeline
}

fn excluded(thread: ThreadId, site: CallSiteId) -> ThreadTimeline {
    ThreadTimeline {
        pairs: Vec::new(),
        active: HashMap::new(),
        errors: vec![ReconstructionError::UnmatchedEnd {
            thread: thread.as_u32(),
            site: site.as_u32(),
        }],
    }
}
