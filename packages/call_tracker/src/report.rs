//! Result assembly: filtering, ordering and the rendered tables.

use std::fmt;
use std::time::Duration;

use crate::clock::Timestamp;
use crate::interval;
use crate::reconstruct::ReconstructionError;
use crate::render::{self, TextTable};
use crate::site::CallSite;
use crate::stats::{CenterStats, SiteStats, WindowStats};

/// Filtering and windowing knobs for a drain.
///
/// All percentages are clamped to `[0, 100]` at aggregation time.
///
/// # Examples
///
/// ```
/// use call_tracker::ResultSettings;
///
/// let settings = ResultSettings::new()
///     .with_non_center_percent(5)
///     .with_min_percent_active_exclusive(1.0);
///
/// let report = call_tracker::drain_with(settings);
/// # let _ = report;
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ResultSettings {
    non_center_percent: u32,
    min_percent_active_exclusive: f64,
    percent_exclude_fastest_active_exclusive: f64,
}

impl ResultSettings {
    /// The default settings: 1% tails, no filtering.
    #[must_use]
    pub fn new() -> Self {
        Self {
            non_center_percent: 1,
            min_percent_active_exclusive: 0.0,
            percent_exclude_fastest_active_exclusive: 0.0,
        }
    }

    /// Sets the percentage of calls in each of the fastest and slowest tail
    /// windows; the center window keeps the rest.
    #[must_use]
    pub fn with_non_center_percent(mut self, percent: u32) -> Self {
        self.non_center_percent = percent;
        self
    }

    /// Drops call-sites whose center active-exclusive time is below this
    /// percentage of the total tracked (active-exclusive) time.
    #[must_use]
    pub fn with_min_percent_active_exclusive(mut self, percent: f64) -> Self {
        self.min_percent_active_exclusive = percent;
        self
    }

    /// Excludes each site's fastest calls from the bracket column of the
    /// summary, suppressing chronic-cheap-call noise.
    #[must_use]
    pub fn with_percent_exclude_fastest_active_exclusive(mut self, percent: f64) -> Self {
        self.percent_exclude_fastest_active_exclusive = percent;
        self
    }

    /// The percentage of calls in each tail window.
    #[must_use]
    pub fn non_center_percent(&self) -> u32 {
        self.non_center_percent
    }

    /// The minimum share of total tracked time a site must reach.
    #[must_use]
    pub fn min_percent_active_exclusive(&self) -> f64 {
        self.min_percent_active_exclusive
    }

    /// The share of each site's fastest calls excluded from the bracket
    /// column.
    #[must_use]
    pub fn percent_exclude_fastest_active_exclusive(&self) -> f64 {
        self.percent_exclude_fastest_active_exclusive
    }

    pub(crate) fn clamped(self) -> Self {
        Self {
            non_center_percent: self.non_center_percent.min(100),
            min_percent_active_exclusive: self.min_percent_active_exclusive.clamp(0.0, 100.0),
            percent_exclude_fastest_active_exclusive: self
                .percent_exclude_fastest_active_exclusive
                .clamp(0.0, 100.0),
        }
    }
}

impl Default for ResultSettings {
    fn default() -> Self {
        Self::new()
    }
}

/// One line of the summary table.
#[derive(Clone, Debug)]
pub struct SummaryRow {
    site: CallSite,
    calls: u64,
    display_active_exclusive: u64,
    time_active_exclusive: u64,
    time_active: u64,
}

impl SummaryRow {
    /// The call-site this row describes.
    #[must_use]
    pub fn site(&self) -> &CallSite {
        &self.site
    }

    /// Number of completed calls across all threads.
    #[must_use]
    pub fn calls(&self) -> u64 {
        self.calls
    }

    /// Active-exclusive time across all windows.
    #[must_use]
    pub fn time_active_exclusive(&self) -> Duration {
        Duration::from_nanos(self.time_active_exclusive)
    }

    /// Active time across all windows.
    #[must_use]
    pub fn time_active(&self) -> Duration {
        Duration::from_nanos(self.time_active)
    }

    /// Center-bracket active-exclusive time after the fastest-call
    /// exclusion, the value behind the bracket percentage column.
    #[must_use]
    pub fn display_active_exclusive(&self) -> Duration {
        Duration::from_nanos(self.display_active_exclusive)
    }
}

/// One call-site's full statistics in the detail tables.
#[derive(Clone, Debug)]
pub struct DetailRow {
    site: CallSite,
    calls: u64,
    threads: u32,
    time_acc: u64,
    sd: f64,
    cv: f64,
    fastest: Option<WindowStats>,
    center: Option<CenterStats>,
    slowest: Option<WindowStats>,
    time_active: u64,
    time_active_exclusive: u64,
}

impl DetailRow {
    /// The call-site this row describes.
    #[must_use]
    pub fn site(&self) -> &CallSite {
        &self.site
    }

    /// Number of completed calls across all threads.
    #[must_use]
    pub fn calls(&self) -> u64 {
        self.calls
    }

    /// Number of distinct threads that completed a call.
    #[must_use]
    pub fn threads(&self) -> u32 {
        self.threads
    }

    /// Sum of inclusive durations over all calls.
    #[must_use]
    pub fn time_accumulated(&self) -> Duration {
        Duration::from_nanos(self.time_acc)
    }

    /// Population standard deviation of inclusive durations, in nanoseconds.
    #[must_use]
    pub fn standard_deviation_nanos(&self) -> f64 {
        self.sd
    }

    /// Coefficient of variation of inclusive durations.
    #[must_use]
    pub fn coefficient_of_variation(&self) -> f64 {
        self.cv
    }

    /// The fastest tail window, absent when the tail rounds to zero calls.
    #[must_use]
    pub fn fastest(&self) -> Option<&WindowStats> {
        self.fastest.as_ref()
    }

    /// The center window, absent when the tails swallow every call.
    #[must_use]
    pub fn center(&self) -> Option<&CenterStats> {
        self.center.as_ref()
    }

    /// The slowest tail window, absent when the tail rounds to zero calls.
    #[must_use]
    pub fn slowest(&self) -> Option<&WindowStats> {
        self.slowest.as_ref()
    }

    /// Active time: wall-clock with at least one open call, union across
    /// threads.
    #[must_use]
    pub fn time_active(&self) -> Duration {
        Duration::from_nanos(self.time_active)
    }

    /// Active-exclusive time: wall-clock on top of some thread's stack.
    #[must_use]
    pub fn time_active_exclusive(&self) -> Duration {
        Duration::from_nanos(self.time_active_exclusive)
    }
}

/// The aggregated outcome of one drain.
///
/// Holds the summary and detail rows (same sites, same order, descending by
/// active-exclusive time), the run-level meta values, and any reconstruction
/// errors encountered.
///
/// The `Display` rendering puts the summary first and the details after it,
/// slowest site first. [`Report::print_to_stdout`] reverses the order so the
/// summary is the last thing on screen.
///
/// # Examples
///
/// ```
/// fn timed() {
///     call_tracker::track!();
/// }
///
/// timed();
/// let report = call_tracker::drain();
///
/// assert_eq!(report.summary_rows().len(), 1);
/// assert!(report.errors().is_empty());
/// let rendered = report.to_string();
/// assert!(rendered.contains("timed"));
/// ```
#[derive(Clone, Debug)]
pub struct Report {
    settings: ResultSettings,
    summary: Vec<SummaryRow>,
    details: Vec<DetailRow>,
    /// Denominator for the summary percentage columns: total active-exclusive
    /// time across every call-site, before filtering.
    total_active_exclusive: u64,
    start_time: Timestamp,
    end_time: Timestamp,
    time_total: u64,
    time_tracked: u64,
    errors: Vec<ReconstructionError>,
}

impl Report {
    /// The summary rows, descending by active-exclusive time.
    #[must_use]
    pub fn summary_rows(&self) -> &[SummaryRow] {
        &self.summary
    }

    /// The detail rows; same sites and order as [`Report::summary_rows`].
    #[must_use]
    pub fn detail_rows(&self) -> &[DetailRow] {
        &self.details
    }

    /// Defects found while reconstructing per-thread event streams. The
    /// affected events were excluded from the tables.
    #[must_use]
    pub fn errors(&self) -> &[ReconstructionError] {
        &self.errors
    }

    /// The settings the report was assembled with, after clamping.
    #[must_use]
    pub fn settings(&self) -> ResultSettings {
        self.settings
    }

    /// Timestamp of the earliest recorded begin.
    #[must_use]
    pub fn start_time(&self) -> Timestamp {
        self.start_time
    }

    /// Timestamp of the latest recorded end.
    #[must_use]
    pub fn end_time(&self) -> Timestamp {
        self.end_time
    }

    /// Wall-clock span from the earliest begin to the latest end.
    #[must_use]
    pub fn time_total(&self) -> Duration {
        Duration::from_nanos(self.time_total)
    }

    /// Measure of the union of all sites' active intervals: wall-clock time
    /// with at least one tracked call open anywhere.
    #[must_use]
    pub fn time_tracked(&self) -> Duration {
        Duration::from_nanos(self.time_tracked)
    }

    /// Whether the drain found any completed calls.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.summary.is_empty()
    }

    /// Prints the tables to stdout in console order: detail tables fastest
    /// site first, then the summary, so the summary is the last thing on
    /// screen. Prints nothing at all when the report is empty, which keeps
    /// benchmark harness output protocols intact.
    #[cfg_attr(test, mutants::skip)] // Too difficult to test stdout output reliably - manually tested.
    pub fn print_to_stdout(&self) {
        if self.is_empty() {
            return;
        }

        let mut out = String::new();
        out.push_str("Details\n");
        self.write_details(&mut out, Order::Ascending)
            .expect("writing to a String cannot fail");
        out.push_str("Summary\n");
        self.write_summary(&mut out)
            .expect("writing to a String cannot fail");

        print!("{out}");
    }

    fn center_bracket(&self) -> String {
        let p = self.settings.non_center_percent;
        format!("[{p}-{}]", 100 - p)
    }

    fn write_summary(&self, out: &mut impl fmt::Write) -> fmt::Result {
        let mut meta = TextTable::new([
            "Start",
            "End",
            "time total",
            "time tracked",
            "time tracked %",
        ]);
        meta.add_row([
            render::format_time_nanos(self.start_time.as_nanos()),
            render::format_time_nanos(self.end_time.as_nanos()),
            render::format_time_nanos(self.time_total),
            render::format_time_nanos(self.time_tracked),
            render::format_percentage(self.time_tracked, self.time_total),
        ]);
        meta.write_to(out)?;

        let bracket = self.center_bracket();
        let mut table = TextTable::new([
            "file".to_string(),
            "function".to_string(),
            "line".to_string(),
            "calls".to_string(),
            format!("ae{bracket}%"),
            "ae[0-100]%".to_string(),
            "time ae[0-100]".to_string(),
            "time a[0-100]".to_string(),
        ]);

        for row in &self.summary {
            table.add_row([
                render::shorten_path(row.site.file()),
                row.site.label().to_string(),
                row.site.line().to_string(),
                row.calls.to_string(),
                render::format_percentage(
                    row.display_active_exclusive,
                    self.total_active_exclusive,
                ),
                render::format_percentage(
                    row.time_active_exclusive,
                    self.total_active_exclusive,
                ),
                render::format_time_nanos(row.time_active_exclusive),
                render::format_time_nanos(row.time_active),
            ]);
        }

        table.write_to(out)
    }

    fn write_details(&self, out: &mut impl fmt::Write, order: Order) -> fmt::Result {
        let rows: Vec<&DetailRow> = match order {
            Order::Descending => self.details.iter().collect(),
            Order::Ascending => self.details.iter().rev().collect(),
        };

        for row in rows {
            self.write_detail(out, row)?;
            out.write_char('\n')?;
        }

        Ok(())
    }

    fn write_detail(&self, out: &mut impl fmt::Write, row: &DetailRow) -> fmt::Result {
        let mut info = TextTable::new([
            "file", "function", "line", "time acc", "sd", "cv", "calls", "threads",
        ]);
        info.add_row([
            render::shorten_path(row.site.file()),
            row.site.label().to_string(),
            row.site.line().to_string(),
            render::format_time_nanos(row.time_acc),
            render::format_time(row.sd),
            format!("{:.2}", row.cv),
            row.calls.to_string(),
            row.threads.to_string(),
        ]);
        info.write_to(out)?;

        let p = self.settings.non_center_percent;
        let mut windows = TextTable::with_top_header(
            [
                "min", "mean", "min", "mean", "med", "time a", "time ae", "max", "mean", "max",
            ]
            .map(String::from),
            [
                (format!("fastest[0-{p}]%"), 2_usize),
                (format!("center{}%", self.center_bracket()), 6_usize),
                (format!("slowest[{}-100]%", 100 - p), 2_usize),
            ],
        );

        let blank = String::new;
        let mut cells: Vec<String> = Vec::with_capacity(10);
        match &row.fastest {
            Some(fastest) => {
                cells.push(render::format_time_nanos(fastest.min));
                cells.push(render::format_time(fastest.mean));
            }
            None => {
                cells.push(blank());
                cells.push(blank());
            }
        }
        match &row.center {
            Some(center) => {
                cells.push(render::format_time_nanos(center.window.min));
                cells.push(render::format_time(center.window.mean));
                cells.push(render::format_time_nanos(center.median));
                cells.push(render::format_time_nanos(center.time_active));
                cells.push(render::format_time_nanos(center.time_active_exclusive));
                cells.push(render::format_time_nanos(center.window.max));
            }
            None => cells.extend(std::iter::repeat_with(blank).take(6)),
        }
        match &row.slowest {
            Some(slowest) => {
                cells.push(render::format_time(slowest.mean));
                cells.push(render::format_time_nanos(slowest.max));
            }
            None => {
                cells.push(blank());
                cells.push(blank());
            }
        }
        windows.add_row(cells);

        windows.write_to(out)
    }
}

#[derive(Clone, Copy, Debug)]
enum Order {
    Ascending,
    Descending,
}

// No API contract to test - output format is not guaranteed.
#[cfg_attr(coverage_nightly, coverage(off))]
impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return writeln!(f, "No timing statistics captured.");
        }

        writeln!(f, "Summary")?;
        self.write_summary(f)?;
        writeln!(f, "Details")?;
        self.write_details(f, Order::Descending)
    }
}

/// Builds the report from per-site statistics.
pub(crate) fn assemble(
    sites: &[CallSite],
    stats: Vec<SiteStats>,
    errors: Vec<ReconstructionError>,
    settings: ResultSettings,
) -> Report {
    let total_active_exclusive = stats
        .iter()
        .fold(0_u64, |sum, site| sum.saturating_add(site.time_active_exclusive));

    let time_tracked = interval::merged_length(
        stats
            .iter()
            .flat_map(|site| site.active_intervals.iter().copied())
            .collect(),
    );

    let start_time = stats.iter().map(|site| site.first_begin).min();
    let end_time = stats.iter().map(|site| site.last_end).max();
    let time_total = match (start_time, end_time) {
        (Some(start), Some(end)) => end.saturating_nanos_since(start),
        _ => 0,
    };

    // Sites below the minimum share of the tracked time are dropped.
    #[expect(
        clippy::cast_precision_loss,
        reason = "nanosecond magnitudes fit f64 mantissas for any realistic run"
    )]
    let threshold = total_active_exclusive as f64 * settings.min_percent_active_exclusive / 100.0;

    let mut kept: Vec<SiteStats> = stats
        .into_iter()
        .filter(|site| {
            let center_active_exclusive = site
                .center
                .as_ref()
                .map_or(0, |center| center.time_active_exclusive);
            #[expect(
                clippy::cast_precision_loss,
                reason = "nanosecond magnitudes fit f64 mantissas for any realistic run"
            )]
            let center_active_exclusive = center_active_exclusive as f64;
            center_active_exclusive >= threshold
        })
        .collect();

    // Heaviest sites first; site id breaks ties so parallel and sequential
    // aggregation render identically.
    kept.sort_by(|a, b| {
        b.time_active_exclusive
            .cmp(&a.time_active_exclusive)
            .then_with(|| a.site.cmp(&b.site))
    });

    let mut summary = Vec::with_capacity(kept.len());
    let mut details = Vec::with_capacity(kept.len());

    for site_stats in kept {
        let site = sites
            .get(site_stats.site.index())
            .expect("every recorded event refers to a registered call-site")
            .clone();

        summary.push(SummaryRow {
            site: site.clone(),
            calls: site_stats.calls,
            display_active_exclusive: site_stats.display_active_exclusive,
            time_active_exclusive: site_stats.time_active_exclusive,
            time_active: site_stats.time_active,
        });

        details.push(DetailRow {
            site,
            calls: site_stats.calls,
            threads: site_stats.threads,
            time_acc: site_stats.time_acc,
            sd: site_stats.sd,
            cv: site_stats.cv,
            fastest: site_stats.fastest,
            center: site_stats.center,
            slowest: site_stats.slowest,
            time_active: site_stats.time_active,
            time_active_exclusive: site_stats.time_active_exclusive,
        });
    }

    Report {
        settings,
        summary,
        details,
        total_active_exclusive,
        start_time: start_time.unwrap_or(Timestamp::ZERO),
        end_time: end_time.unwrap_or(Timestamp::ZERO),
        time_total,
        time_tracked,
        errors,
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn settings_clamp_to_valid_ranges() {
        let settings = ResultSettings::new()
            .with_non_center_percent(250)
            .with_min_percent_active_exclusive(-5.0)
            .with_percent_exclude_fastest_active_exclusive(120.0)
            .clamped();

        assert_eq!(settings.non_center_percent(), 100);
        assert_eq!(settings.min_percent_active_exclusive(), 0.0);
        assert_eq!(settings.percent_exclude_fastest_active_exclusive(), 100.0);
    }

    #[test]
    fn default_settings_use_one_percent_tails() {
        assert_eq!(ResultSettings::default().non_center_percent(), 1);
    }

    #[test]
    fn empty_report_has_zeroed_meta() {
        let report = assemble(&[], Vec::new(), Vec::new(), ResultSettings::new());

        assert!(report.is_empty());
        assert_eq!(report.time_total(), Duration::ZERO);
        assert_eq!(report.time_tracked(), Duration::ZERO);
        assert_eq!(report.start_time(), Timestamp::ZERO);
        assert!(report.errors().is_empty());
        assert_eq!(report.to_string(), "No timing statistics captured.\n");
    }

    static_assertions::assert_impl_all!(Report: Send, Sync);
    static_assertions::assert_impl_all!(ResultSettings: Send, Sync, Copy);
}
