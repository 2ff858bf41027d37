//! Export of resident records.
//!
//! Two shapes are produced from a label selection and an index range:
//!
//! - [`export_records`]: one label-keyed map per record, NaN values omitted
//! - [`export_csv`]: a CSV table whose rows average groups of consecutive
//!   records, with a group size (decimation factor) chosen per section
//!
//! # Decimation
//!
//! Sections are given as `position => factor` pairs, with positions resolved
//! against the exported range like any other [`Position`]. Grouping starts at
//! the range start with factor 1. At every group start the factor of the
//! last section starting at or before that record applies, so a factor never
//! changes inside a group. A trailing group with fewer records than its
//! factor is not emitted.
//!
//! Keeping the newest 10% at full resolution, decimating the 10% before by 3
//! and everything older by 8:
//!
//! ```rust
//! use logdb::export::DecimationSections;
//! use logdb::query::Position;
//!
//! let sections = DecimationSections::new()
//!     .with(Position::Fraction(0.0), 8)
//!     .with(Position::Fraction(0.8), 3)
//!     .with(Position::Fraction(0.9), 1);
//! # let _ = sections;
//! ```

use std::collections::BTreeMap;

use chrono::{Local, TimeZone};
use serde::{Deserialize, Serialize};

use crate::columns::ColumnStore;
use crate::error::{QueryError, Result};
use crate::query::{IndexRange, Position, resolve_index};

/// Format of the time column in CSV exports.
pub const CSV_TIME_FORMAT: &str = "%Y/%m/%d %H:%M";

/// One exported record: label to value, NaN values omitted.
pub type ExportRecord = BTreeMap<String, f64>;

/// Decimation factors per section start.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DecimationSections(Vec<(Position, usize)>);

impl DecimationSections {
    /// Creates sections without decimation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a section starting at `position` with `factor` records per row.
    #[must_use]
    pub fn with(mut self, position: impl Into<Position>, factor: usize) -> Self {
        self.0.push((position.into(), factor));
        self
    }

    /// Returns `true` if no section is defined.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Resolves the sections against `range`, sorted by start index.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::InvalidDecimationFactor`] for a factor of zero.
    pub fn resolve(&self, range: IndexRange) -> Result<Vec<(usize, usize)>> {
        let mut sections = Vec::with_capacity(self.0.len());
        for &(position, factor) in &self.0 {
            if factor == 0 {
                return Err(QueryError::InvalidDecimationFactor { factor }.into());
            }
            sections.push((resolve_index(position, range.start, range.end), factor));
        }
        sections.sort_by_key(|&(start, _)| start);
        Ok(sections)
    }
}

impl<P: Into<Position>> FromIterator<(P, usize)> for DecimationSections {
    fn from_iter<I: IntoIterator<Item = (P, usize)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(p, f)| (p.into(), f)).collect())
    }
}

/// Materializes the records in `range` for `labels`, oldest first.
///
/// Labels unknown to `columns` are skipped.
pub fn export_records(columns: &ColumnStore, labels: &[String], range: IndexRange) -> Vec<ExportRecord> {
    let selected: Vec<(&String, &[f64])> = labels
        .iter()
        .filter_map(|label| columns.column(label).map(|values| (label, values)))
        .collect();

    range
        .rows()
        .map(|row| {
            selected
                .iter()
                .filter_map(|(label, values)| {
                    let value = *values.get(row)?;
                    (!value.is_nan()).then(|| ((*label).clone(), value))
                })
                .collect()
        })
        .collect()
}

/// Renders `range` as decimated CSV.
///
/// The first line lists `labels`. Every following line holds the time of
/// the first record of a group and the mean of the valid values of every
/// other label, or an empty field if the group has none. `labels[0]` is
/// taken as the time label.
///
/// # Errors
///
/// Returns [`QueryError::InvalidDecimationFactor`] for a factor of zero.
pub fn export_csv(
    columns: &ColumnStore,
    labels: &[String],
    range: IndexRange,
    sections: &DecimationSections,
) -> Result<String> {
    let sections = sections.resolve(range)?;
    let Some((time_label, value_labels)) = labels.split_first() else {
        return Ok(String::new());
    };
    let times = columns.column(time_label).unwrap_or_default();
    let value_columns: Vec<&[f64]> = value_labels
        .iter()
        .map(|label| columns.column(label).unwrap_or_default())
        .collect();

    let mut lines = vec![labels.join(",")];
    let mut factor = 1;
    let mut next_section = sections.iter().peekable();
    let mut pos = range.start;

    while pos < range.end {
        while let Some(&&(start, section_factor)) = next_section.peek()
            && start <= pos
        {
            factor = section_factor;
            next_section.next();
        }

        let group_end = pos + factor;
        if group_end > range.end {
            break;
        }

        let mut fields = Vec::with_capacity(labels.len());
        fields.push(times.get(pos).copied().map(format_time).unwrap_or_default());
        for values in &value_columns {
            let group = values.get(pos..group_end).unwrap_or_default();
            fields.push(format_mean(group));
        }
        lines.push(fields.join(","));

        pos = group_end;
    }

    Ok(lines.join("\n"))
}

/// Formats the mean of the non-NaN `values`, or an empty string if there
/// are none.
///
/// The mean is rounded to two decimals; trailing zeros and a trailing
/// decimal point are stripped.
pub fn format_mean(values: &[f64]) -> String {
    let (sum, count) = values
        .iter()
        .filter(|value| !value.is_nan())
        .fold((0.0, 0u32), |(sum, count), value| (sum + value, count + 1));
    if count == 0 {
        return String::new();
    }

    let mean = sum / f64::from(count);
    if mean.is_nan() {
        return String::new();
    }

    format!("{mean:.2}")
        .trim_end_matches('0')
        .trim_end_matches('.')
        .to_string()
}

/// Formats a record time (seconds since the epoch) as local date and time.
pub fn format_time(time: f64) -> String {
    if !time.is_finite() {
        return String::new();
    }

    #[allow(clippy::cast_possible_truncation)] // out-of-range times saturate and fail below
    let seconds = time.floor() as i64;
    Local
        .timestamp_opt(seconds, 0)
        .single()
        .map(|datetime| datetime.format(CSV_TIME_FORMAT).to_string())
        .unwrap_or_default()
}
