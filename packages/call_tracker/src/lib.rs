#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Low-overhead scoped call timing with per-call-site statistics.
//!
//! Annotate a region of code with a scoped marker; every entry and exit is
//! recorded as a timestamped event on a per-thread buffer. On demand, a
//! drain pairs the events back into call trees and computes per-call-site
//! statistics, then renders them as summary and detail tables.
//!
//! The core functionality includes:
//! - [`track!`], [`track_dev!`], [`track_prod!`] - Scoped markers in three
//!   compile-time enablement groups
//! - [`drain`] / [`drain_with`] - Snapshot, aggregate and reset in one step
//! - [`drain_raw`] + [`RecordedEvents`] - The raw snapshot, for persistence
//!   and deterministic processing
//! - [`Report`] - The aggregated tables, printable or renderable to a string
//!
//! # Key properties
//!
//! - **Cheap recording**: a marker costs one clock reading, one atomic load
//!   and one append to a buffer only its own thread touches; there is no
//!   cross-thread synchronization on the recording path.
//! - **Honest multithreaded accounting**: besides inclusive sums, every
//!   call-site gets an *active* time (wall-clock during which at least one
//!   call was open anywhere, overlaps counted once) and an
//!   *active-exclusive* time (wall-clock on top of some thread's stack).
//!   A bottleneck is a call-site with high active-exclusive time, regardless
//!   of how its cost is spread over calls and threads.
//! - **Percentile windows**: per-call statistics are reported for the
//!   fastest tail, the center band and the slowest tail of the sorted
//!   durations, so outliers are visible without drowning the middle.
//! - **Compile-time off switches**: each marker group compiles to nothing
//!   when its cargo feature is disabled.
//!
//! # Simple usage
//!
//! ```
//! fn load(items: u32) -> u64 {
//!     call_tracker::track!();
//!
//!     (0..u64::from(items)).map(|i| i * 31).sum()
//! }
//!
//! for _ in 0..100 {
//!     load(1000);
//! }
//!
//! // Aggregate everything recorded so far and reset the buffers.
//! let report = call_tracker::drain();
//! assert_eq!(report.summary_rows().len(), 1);
//! assert_eq!(report.summary_rows()[0].calls(), 100);
//!
//! // Console rendering; prints nothing when the report is empty.
//! report.print_to_stdout();
//! ```
//!
//! # Named markers
//!
//! A marker can carry an explicit name, which replaces the function-name
//! part of the call-site identity and produces a separate row:
//!
//! ```
//! fn pipeline() {
//!     {
//!         call_tracker::track!("parse");
//!         // ... parsing ...
//!     }
//!     {
//!         call_tracker::track!("execute");
//!         // ... execution ...
//!     }
//! }
//!
//! pipeline();
//! let report = call_tracker::drain();
//! assert_eq!(report.summary_rows().len(), 2);
//! ```
//!
//! # Threading
//!
//! Markers may run on any number of threads concurrently; each thread
//! records to its own buffer and terminated threads hand their buffers off
//! for the next drain to collect. Draining may happen from any thread and
//! atomically covers all of them.
//!
//! # Feature flags
//!
//! - `track` - master switch for all recording (default on)
//! - `track-dev` - the development marker group (default on)
//! - `track-prod` - the production marker group and `track!` (default on)
//! - `parallel` - aggregate call-sites on a worker pool during drains
//!   (default on); results are identical either way

mod buffer;
mod clock;
mod event;
mod interval;
mod reconstruct;
mod recorded;
mod registry;
mod render;
mod report;
mod scope;
mod site;
mod stats;

pub use clock::{Clock, Timestamp};
pub use reconstruct::ReconstructionError;
pub use recorded::{DumpError, RecordedEvents};
pub use report::{DetailRow, Report, ResultSettings, SummaryRow};
pub use scope::Scope;
pub use site::{CallSite, SiteSlot};
pub use stats::{AggregationMode, CenterStats, WindowStats};

/// Takes every event recorded so far, clears all buffers, and aggregates
/// with default settings.
///
/// Equivalent to `drain_with(ResultSettings::default())`. A drain
/// immediately after another drain returns an empty report.
#[must_use]
pub fn drain() -> Report {
    drain_with(ResultSettings::default())
}

/// Takes every event recorded so far, clears all buffers, and aggregates
/// with the given settings.
///
/// Events from live threads and from threads that have since terminated are
/// both covered. Any scope exit that completed before this call is either in
/// the returned report or in the next drain's, never both and never neither.
#[must_use]
pub fn drain_with(settings: ResultSettings) -> Report {
    drain_raw().aggregate_with(settings, AggregationMode::default())
}

/// Takes every event recorded so far and clears all buffers, without
/// aggregating.
///
/// The returned snapshot can be aggregated any number of times, written to
/// disk with [`RecordedEvents::write_to`], or discarded.
#[must_use]
pub fn drain_raw() -> RecordedEvents {
    registry::global().drain()
}
