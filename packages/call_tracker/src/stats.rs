//! Per-call-site statistics: accumulators, percentile windows, interval
//! metrics.

use std::time::Duration;

use itertools::Itertools;

use crate::clock::Timestamp;
use crate::interval::{self, Interval};
use crate::reconstruct::{Pair, ReconstructionError, ThreadTimeline};
use crate::site::CallSiteId;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Whether a drain aggregates call-sites on the calling thread or on a worker
/// pool.
///
/// A hint only: per-call-site computations are independent and re-ordered
/// deterministically afterwards, so the numbers and their ordering are
/// identical either way. Without the `parallel` feature both variants run
/// sequentially.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum AggregationMode {
    Sequential,
    #[default]
    Parallel,
}

/// Min/mean/max of the inclusive durations inside one percentile window.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WindowStats {
    pub(crate) min: u64,
    pub(crate) mean: f64,
    pub(crate) max: u64,
}

impl WindowStats {
    /// Shortest inclusive duration in the window.
    #[must_use]
    pub fn min(&self) -> Duration {
        Duration::from_nanos(self.min)
    }

    /// Mean inclusive duration of the window, in nanoseconds.
    #[must_use]
    pub fn mean_nanos(&self) -> f64 {
        self.mean
    }

    /// Longest inclusive duration in the window.
    #[must_use]
    pub fn max(&self) -> Duration {
        Duration::from_nanos(self.max)
    }
}

/// The center window carries more than the tails: a median and the interval
/// metrics recomputed over only the center pairs.
#[derive(Clone, Debug, PartialEq)]
pub struct CenterStats {
    pub(crate) window: WindowStats,
    pub(crate) median: u64,
    pub(crate) time_active: u64,
    pub(crate) time_active_exclusive: u64,
}

impl CenterStats {
    /// Min/mean/max of the center window.
    #[must_use]
    pub fn window(&self) -> &WindowStats {
        &self.window
    }

    /// Median inclusive duration of the center window.
    #[must_use]
    pub fn median(&self) -> Duration {
        Duration::from_nanos(self.median)
    }

    /// Active time restricted to the center pairs.
    #[must_use]
    pub fn time_active(&self) -> Duration {
        Duration::from_nanos(self.time_active)
    }

    /// Active-exclusive time restricted to the center pairs.
    #[must_use]
    pub fn time_active_exclusive(&self) -> Duration {
        Duration::from_nanos(self.time_active_exclusive)
    }
}

/// Everything aggregation computed about one call-site.
#[derive(Clone, Debug)]
pub(crate) struct SiteStats {
    pub(crate) site: CallSiteId,
    pub(crate) calls: u64,
    pub(crate) threads: u32,
    /// Sum of inclusive durations over all pairs.
    pub(crate) time_acc: u64,
    /// Population standard deviation of inclusive durations, in nanoseconds.
    pub(crate) sd: f64,
    /// Coefficient of variation: sd / mean, zero when the mean is zero.
    pub(crate) cv: f64,
    pub(crate) fastest: Option<WindowStats>,
    pub(crate) center: Option<CenterStats>,
    pub(crate) slowest: Option<WindowStats>,
    /// Measure of the union, over threads, of the intervals in which this
    /// site had at least one open scope.
    pub(crate) time_active: u64,
    /// Like `time_active`, but counting only time on top of a stack.
    pub(crate) time_active_exclusive: u64,
    /// Center active-exclusive after dropping the fastest slice of the
    /// site's own pairs; feeds the bracket column of the summary table.
    pub(crate) display_active_exclusive: u64,
    /// The merged per-site active intervals, kept for the global
    /// time-tracked union.
    pub(crate) active_intervals: Vec<Interval>,
    pub(crate) first_begin: Timestamp,
    pub(crate) last_end: Timestamp,
}

/// Pairs and per-thread active intervals gathered for one call-site.
#[derive(Debug)]
struct SiteData {
    site: CallSiteId,
    pairs: Vec<Pair>,
    thread_active: Vec<Interval>,
}

/// Regroups per-thread reconstruction output by call-site and collects the
/// reconstruction errors.
fn collect_sites(timelines: Vec<ThreadTimeline>) -> (Vec<SiteData>, Vec<ReconstructionError>) {
    let mut errors = Vec::new();
    let mut by_site: foldhash::HashMap<CallSiteId, SiteData> = foldhash::HashMap::default();

    for mut timeline in timelines {
        errors.append(&mut timeline.errors);

        for pair in timeline.pairs {
            by_site
                .entry(pair.site)
                .or_insert_with(|| SiteData {
                    site: pair.site,
                    pairs: Vec::new(),
                    thread_active: Vec::new(),
                })
                .pairs
                .push(pair);
        }

        for (site, intervals) in timeline.active {
            // Only sites with at least one completed pair get stats; an
            // active interval without pairs (possible when all of a site's
            // pairs were discarded as non-monotonic) is dropped with them.
            if let Some(data) = by_site.get_mut(&site) {
                data.thread_active.extend(intervals);
            }
        }
    }

    let mut sites: Vec<SiteData> = by_site.into_values().collect();
    sites.sort_unstable_by_key(|data| data.site);
    (sites, errors)
}

/// Aggregates reconstruction output into per-site statistics.
///
/// The returned vector is ordered by call-site id; the result assembler
/// applies its own presentation ordering.
pub(crate) fn compute_all(
    timelines: Vec<ThreadTimeline>,
    non_center_percent: u32,
    exclude_fastest_percent: f64,
    mode: AggregationMode,
) -> (Vec<SiteStats>, Vec<ReconstructionError>) {
    let (sites, errors) = collect_sites(timelines);

    let stats = match mode {
        AggregationMode::Parallel => {
            compute_parallel(sites, non_center_percent, exclude_fastest_percent)
        }
        AggregationMode::Sequential => sites
            .into_iter()
            .map(|data| compute_site(data, non_center_percent, exclude_fastest_percent))
            .collect(),
    };

    (stats, errors)
}

#[cfg(feature = "parallel")]
fn compute_parallel(
    sites: Vec<SiteData>,
    non_center_percent: u32,
    exclude_fastest_percent: f64,
) -> Vec<SiteStats> {
    sites
        .into_par_iter()
        .map(|data| compute_site(data, non_center_percent, exclude_fastest_percent))
        .collect()
}

#[cfg(not(feature = "parallel"))]
fn compute_parallel(
    sites: Vec<SiteData>,
    non_center_percent: u32,
    exclude_fastest_percent: f64,
) -> Vec<SiteStats> {
    sites
        .into_iter()
        .map(|data| compute_site(data, non_center_percent, exclude_fastest_percent))
        .collect()
}

#[expect(
    clippy::cast_precision_loss,
    reason = "nanosecond magnitudes fit f64 mantissas for any realistic run"
)]
fn compute_site(
    mut data: SiteData,
    non_center_percent: u32,
    exclude_fastest_percent: f64,
) -> SiteStats {
    // Everything below slices windows out of this ordering.
    data.pairs.sort_by_key(Pair::inclusive);
    let pairs = data.pairs;

    let calls = pairs.len() as u64;
    let threads = u32::try_from(pairs.iter().map(|pair| pair.thread).unique().count())
        .expect("thread ids are u32, so their distinct count fits u32");

    let time_acc = pairs
        .iter()
        .fold(0_u64, |sum, pair| sum.saturating_add(pair.inclusive()));

    let mean = time_acc as f64 / calls as f64;
    let sd = standard_deviation(&pairs, mean);
    let cv = if mean > 0.0 { sd / mean } else { 0.0 };

    let first_begin = pairs
        .iter()
        .map(|pair| pair.begin)
        .min()
        .expect("compute_site is only called for sites with at least one pair");
    let last_end = pairs
        .iter()
        .map(|pair| pair.end)
        .max()
        .expect("compute_site is only called for sites with at least one pair");

    // Window arithmetic: the tails take `calls * p / 100` entries each
    // (integer division), the center takes the rest.
    let tail_len = usize::try_from(calls.saturating_mul(u64::from(non_center_percent)) / 100)
        .expect("tail length cannot exceed the call count");
    let center_range = tail_len..pairs.len().saturating_sub(tail_len);

    let fastest = (tail_len > 0).then(|| window_stats(&pairs[..tail_len]));
    let slowest = (tail_len > 0).then(|| window_stats(&pairs[pairs.len() - tail_len..]));

    let center_pairs = if center_range.start < center_range.end {
        &pairs[center_range]
    } else {
        &[]
    };
    let center = (!center_pairs.is_empty()).then(|| center_stats(center_pairs));

    let display_active_exclusive = display_active_exclusive(center_pairs, exclude_fastest_percent);

    let time_active_exclusive = interval::merged_length(self_intervals(pairs.iter()));
    let active_intervals = interval::merge(data.thread_active);
    let time_active = interval::total_length(&active_intervals);

    SiteStats {
        site: data.site,
        calls,
        threads,
        time_acc,
        sd,
        cv,
        fastest,
        center,
        slowest,
        time_active,
        time_active_exclusive,
        display_active_exclusive,
        active_intervals,
        first_begin,
        last_end,
    }
}

#[expect(
    clippy::cast_precision_loss,
    reason = "nanosecond magnitudes fit f64 mantissas for any realistic run"
)]
fn standard_deviation(pairs: &[Pair], mean: f64) -> f64 {
    if pairs.len() < 2 {
        return 0.0;
    }

    let sum_of_squares: f64 = pairs
        .iter()
        .map(|pair| {
            let deviation = pair.inclusive() as f64 - mean;
            deviation * deviation
        })
        .sum();

    (sum_of_squares / pairs.len() as f64).sqrt()
}

#[expect(
    clippy::cast_precision_loss,
    reason = "nanosecond magnitudes fit f64 mantissas for any realistic run"
)]
fn window_stats(pairs: &[Pair]) -> WindowStats {
    let sum = pairs
        .iter()
        .fold(0_u64, |sum, pair| sum.saturating_add(pair.inclusive()));

    WindowStats {
        min: pairs.first().map_or(0, Pair::inclusive),
        mean: sum as f64 / pairs.len() as f64,
        max: pairs.last().map_or(0, Pair::inclusive),
    }
}

fn center_stats(center: &[Pair]) -> CenterStats {
    let median = {
        let mid = center.len() / 2;
        if center.len() % 2 == 1 {
            center[mid].inclusive()
        } else {
            center[mid]
                .inclusive()
                .midpoint(center[mid.saturating_sub(1)].inclusive())
        }
    };

    let own_intervals = center
        .iter()
        .map(|pair| Interval::new(pair.begin, pair.end))
        .collect();

    CenterStats {
        window: window_stats(center),
        median,
        time_active: interval::merged_length(own_intervals),
        time_active_exclusive: interval::merged_length(self_intervals(center.iter())),
    }
}

/// Center active-exclusive with the fastest `percent` of the pairs removed,
/// suppressing chronic-cheap-call noise in the summary bracket column.
#[expect(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    reason = "percent is clamped to [0, 100] so the product stays within the pair count"
)]
fn display_active_exclusive(center: &[Pair], exclude_fastest_percent: f64) -> u64 {
    let drop_count = (center.len() as f64 * exclude_fastest_percent / 100.0).floor() as usize;
    let kept = center.get(drop_count.min(center.len())..).unwrap_or(&[]);
    interval::merged_length(self_intervals(kept.iter()))
}

fn self_intervals<'p>(pairs: impl Iterator<Item = &'p Pair>) -> Vec<Interval> {
    pairs
        .flat_map(|pair| pair.self_intervals.iter().copied())
        .collect()
}
