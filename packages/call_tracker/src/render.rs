//! Plain-text table rendering for reports.
//!
//! Deliberately free of color and terminal handling; the output is the same
//! whether it lands on a console, in a string or in a log file.

use std::fmt::{self, Write};

/// Longest file name rendered before truncation kicks in.
const MAX_PATH_LENGTH: usize = 35;

/// A bordered text table with optional spanning group headers.
#[derive(Debug)]
pub(crate) struct TextTable {
    /// Group labels spanning several columns, rendered above the header.
    top_header: Vec<(String, usize)>,
    header: Vec<String>,
    rows: Vec<Vec<String>>,
    widths: Vec<usize>,
}

impl TextTable {
    pub(crate) fn new<S: Into<String>>(header: impl IntoIterator<Item = S>) -> Self {
        let header: Vec<String> = header.into_iter().map(Into::into).collect();
        let widths = header.iter().map(String::len).collect();

        Self {
            top_header: Vec::new(),
            header,
            rows: Vec::new(),
            widths,
        }
    }

    pub(crate) fn with_top_header<S: Into<String>>(
        header: impl IntoIterator<Item = S>,
        top_header: impl IntoIterator<Item = (S, usize)>,
    ) -> Self {
        let mut table = Self::new(header);
        table.top_header = top_header
            .into_iter()
            .map(|(label, span)| (label.into(), span))
            .collect();
        table
    }

    pub(crate) fn add_row<S: Into<String>>(&mut self, row: impl IntoIterator<Item = S>) {
        let row: Vec<String> = row.into_iter().map(Into::into).collect();
        debug_assert_eq!(row.len(), self.header.len());

        for (width, cell) in self.widths.iter_mut().zip(&row) {
            *width = (*width).max(cell.len());
        }
        self.rows.push(row);
    }

    pub(crate) fn write_to(&self, out: &mut impl Write) -> fmt::Result {
        if !self.top_header.is_empty() {
            self.write_rule(out)?;
            self.write_top_header(out)?;
        }

        self.write_rule(out)?;
        self.write_cells(out, &self.header, Alignment::Center)?;
        self.write_rule(out)?;

        for row in &self.rows {
            self.write_cells(out, row, Alignment::Right)?;
            self.write_rule(out)?;
        }

        Ok(())
    }

    fn write_rule(&self, out: &mut impl Write) -> fmt::Result {
        out.write_char('+')?;
        for &width in &self.widths {
            for _ in 0..(width + 2) {
                out.write_char('-')?;
            }
            out.write_char('+')?;
        }
        out.write_char('\n')
    }

    fn write_cells(&self, out: &mut impl Write, cells: &[String], align: Alignment) -> fmt::Result {
        out.write_char('|')?;
        for (cell, &width) in cells.iter().zip(&self.widths) {
            match align {
                Alignment::Right => write!(out, " {cell:>width$} ")?,
                Alignment::Center => write!(out, " {cell:^width$} ")?,
            }
            out.write_char('|')?;
        }
        out.write_char('\n')
    }

    fn write_top_header(&self, out: &mut impl Write) -> fmt::Result {
        out.write_char('|')?;
        let mut column = 0_usize;
        for (label, span) in &self.top_header {
            // The spanned width covers the cells plus the interior borders.
            let inner: usize = self.widths[column..column + span]
                .iter()
                .map(|width| width + 2)
                .sum::<usize>()
                + (span - 1);
            column += span;

            write!(out, "{label:^inner$}")?;
            out.write_char('|')?;
        }
        out.write_char('\n')
    }
}

#[derive(Clone, Copy, Debug)]
enum Alignment {
    Right,
    Center,
}

/// Renders a nanosecond quantity with an auto-scaled unit, keeping the
/// leading number between 1 and 999 whenever possible.
pub(crate) fn format_time(nanos: f64) -> String {
    const UNITS: [&str; 4] = ["ns", "mcs", "ms", "s"];

    let mut value = nanos;
    let mut unit = 0;
    while value >= 1000.0 && unit < UNITS.len() - 1 {
        value /= 1000.0;
        unit += 1;
    }

    format!("{value:.2} {}", UNITS[unit])
}

#[expect(
    clippy::cast_precision_loss,
    reason = "nanosecond magnitudes fit f64 mantissas for any realistic run"
)]
pub(crate) fn format_time_nanos(nanos: u64) -> String {
    format_time(nanos as f64)
}

/// Renders `value / total` as a percentage with two decimals, or `nan%` when
/// the total is zero.
#[expect(
    clippy::cast_precision_loss,
    reason = "nanosecond magnitudes fit f64 mantissas for any realistic run"
)]
pub(crate) fn format_percentage(value: u64, total: u64) -> String {
    if total == 0 {
        return "nan%".to_string();
    }

    format!("{:.2}%", value as f64 / total as f64 * 100.0)
}

/// Reduces a source path to its final component, truncated with `...` if it
/// is still unreasonably long.
pub(crate) fn shorten_path(path: &str) -> String {
    let file_name = path
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(path);

    if file_name.len() <= MAX_PATH_LENGTH {
        file_name.to_string()
    } else {
        let truncated: String = file_name.chars().take(MAX_PATH_LENGTH - 3).collect();
        format!("{truncated}...")
    }
}
