//! Query interface over the resident records of a store.
//!
//! Queries address records by [`Position`] relative to the resident window
//! and select labels with full-match regular expressions.
//!
//! # Positions
//!
//! A position is either an index offset or a fraction of the window span.
//! Non-negative positions count from the window start, negative ones from
//! the window end. For the window `[100, 200)` all of `30`, `-70`, `0.3` and
//! `-0.7` resolve to `130`.
//!
//! # Label selectors
//!
//! - a single pattern, e.g. `".*:temperature"`
//! - a list of patterns, e.g. `[".*:temperature", ".*:humidity"]`
//! - groups of patterns, e.g. `{"living": ["temp.*", "hum.*"], "office": "co2"}`,
//!   each matched against `"group:sub"` labels
//!
//! The time label always comes first in a selection; the remaining labels
//! follow in declaration order.
//!
//! # Example Usage
//!
//! ```rust
//! use logdb::query::{IndexRange, LabelSelector, Position, resolve_index, select_labels};
//!
//! assert_eq!(resolve_index(Position::Fraction(-0.7), 100, 200), 130);
//! let range = IndexRange::resolve(Position::Fraction(0.25), Position::Fraction(-0.25), 0, 1000);
//! assert_eq!(range.len(), 500);
//!
//! let labels: Vec<String> = ["Time", "living:temperature", "living:humidity", "office:temperature"]
//!     .iter()
//!     .map(|s| s.to_string())
//!     .collect();
//! let selected = select_labels(&LabelSelector::from(".*:temperature"), &labels).unwrap();
//! assert_eq!(selected, vec!["Time", "living:temperature", "office:temperature"]);
//! ```

use std::fmt;
use std::ops::Range;
use std::str::FromStr;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{LogDbError, QueryError, Result};
use crate::schema::{GROUP_SEPARATOR, ordered_pairs};

/// A record position relative to an index window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Position {
    /// Absolute offset from the window start (`>= 0`) or end (`< 0`).
    Index(i64),
    /// Offset scaled by the window span, from the start (`>= 0`) or end (`< 0`).
    Fraction(f64),
}

impl Position {
    /// The window start.
    pub const START: Self = Self::Fraction(0.0);

    /// The window end.
    pub const END: Self = Self::Fraction(1.0);

    fn is_negative(self) -> bool {
        match self {
            Self::Index(index) => index < 0,
            Self::Fraction(fraction) => fraction < 0.0,
        }
    }
}

impl From<i64> for Position {
    fn from(index: i64) -> Self {
        Self::Index(index)
    }
}

impl From<i32> for Position {
    fn from(index: i32) -> Self {
        Self::Index(i64::from(index))
    }
}

impl From<f64> for Position {
    fn from(fraction: f64) -> Self {
        Self::Fraction(fraction)
    }
}

impl FromStr for Position {
    type Err = std::num::ParseFloatError;

    /// Parses `"30"` or `"-70"` as an index and `"0.3"` or `"-7e-1"` as a fraction.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(index) = s.parse::<i64>() {
            return Ok(Self::Index(index));
        }
        s.parse::<f64>().map(Self::Fraction)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(index) => write!(f, "{index}"),
            Self::Fraction(fraction) => write!(f, "{fraction:?}"),
        }
    }
}

/// Resolves `position` to an absolute index within `[lo, hi]`.
///
/// Fractional positions are truncated toward zero. Results outside the
/// window are clamped to its bounds.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)] // indexes stay far below 2^52
pub fn resolve_index(position: Position, lo: usize, hi: usize) -> usize {
    let anchor = if position.is_negative() { hi } else { lo };

    match position {
        Position::Index(offset) => {
            let anchor = i64::try_from(anchor).unwrap_or(i64::MAX);
            let lo_i = i64::try_from(lo).unwrap_or(i64::MAX);
            let hi_i = i64::try_from(hi).unwrap_or(i64::MAX);
            let index = anchor.saturating_add(offset).clamp(lo_i, hi_i);
            usize::try_from(index).unwrap_or(lo)
        }
        Position::Fraction(fraction) => {
            let (anchor, lo_f, hi_f) = (anchor as f64, lo as f64, hi as f64);
            let index = (anchor + fraction * (hi_f - lo_f)).trunc();
            if index.is_nan() {
                return lo;
            }
            index.clamp(lo_f, hi_f) as usize
        }
    }
}

/// Half-open range of absolute record indexes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexRange {
    /// First index in the range.
    pub start: usize,
    /// One past the last index.
    pub end: usize,
}

impl IndexRange {
    /// Resolves `start` and `end` against the window `[lo, hi)`.
    ///
    /// An end before the start yields an empty range.
    pub fn resolve(start: Position, end: Position, lo: usize, hi: usize) -> Self {
        let start = resolve_index(start, lo, hi);
        let end = resolve_index(end, lo, hi).max(start);
        Self { start, end }
    }

    /// Number of records in the range.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Returns `true` if the range holds no record.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// The range as a `Range<usize>`.
    pub fn rows(&self) -> Range<usize> {
        self.start..self.end
    }
}

/// Returns the resident window `[lo, hi)` for `len` resident records.
///
/// With a count cap, only the newest `max_records` records are addressed
/// even while eviction lets more stay resident.
pub fn resident_window(len: usize, max_records: Option<usize>) -> (usize, usize) {
    let lo = match max_records {
        Some(max) if len >= max => len - max,
        _ => 0,
    };
    (lo, len)
}

/// Pattern or patterns for one label group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GroupPatterns {
    /// A single sub label pattern.
    One(String),
    /// Several sub label patterns.
    Many(Vec<String>),
}

/// Selection of labels by full-match regular expressions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LabelSelector {
    /// A single pattern.
    Pattern(String),
    /// Any of several patterns.
    Patterns(Vec<String>),
    /// Sub label patterns per group.
    Grouped(#[serde(with = "ordered_pairs")] Vec<(String, GroupPatterns)>),
}

impl Default for LabelSelector {
    /// Selects every label.
    fn default() -> Self {
        Self::Pattern(".*".to_string())
    }
}

impl From<&str> for LabelSelector {
    fn from(pattern: &str) -> Self {
        Self::Pattern(pattern.to_string())
    }
}

impl From<String> for LabelSelector {
    fn from(pattern: String) -> Self {
        Self::Pattern(pattern)
    }
}

impl From<Vec<String>> for LabelSelector {
    fn from(patterns: Vec<String>) -> Self {
        Self::Patterns(patterns)
    }
}

impl From<&[&str]> for LabelSelector {
    fn from(patterns: &[&str]) -> Self {
        Self::Patterns(patterns.iter().map(|p| (*p).to_string()).collect())
    }
}

impl LabelSelector {
    /// Creates a grouped selector, keeping group order.
    pub fn grouped<I, G, P, S>(groups: I) -> Self
    where
        I: IntoIterator<Item = (G, P)>,
        G: Into<String>,
        P: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Grouped(
            groups
                .into_iter()
                .map(|(group, patterns)| {
                    let patterns = patterns.into_iter().map(Into::into).collect();
                    (group.into(), GroupPatterns::Many(patterns))
                })
                .collect(),
        )
    }

    /// Returns the label patterns, group prefixes applied.
    pub fn patterns(&self) -> Vec<String> {
        match self {
            Self::Pattern(pattern) => vec![pattern.clone()],
            Self::Patterns(patterns) => patterns.clone(),
            Self::Grouped(groups) => {
                let mut patterns = Vec::new();
                for (group, subs) in groups {
                    let prefix = format!("{}{GROUP_SEPARATOR}", regex::escape(group));
                    match subs {
                        GroupPatterns::One(sub) => patterns.push(format!("{prefix}{sub}")),
                        GroupPatterns::Many(subs) => {
                            patterns.extend(subs.iter().map(|sub| format!("{prefix}{sub}")));
                        }
                    }
                }
                patterns
            }
        }
    }

    /// Compiles the patterns into anchored regular expressions.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::InvalidPattern`] for the first invalid pattern.
    pub fn compile(&self) -> Result<Vec<Regex>> {
        self.patterns()
            .into_iter()
            .map(|pattern| {
                Regex::new(&format!("^(?:{pattern})$")).map_err(|e| {
                    LogDbError::from(QueryError::InvalidPattern {
                        pattern,
                        source: e,
                    })
                })
            })
            .collect()
    }
}

/// Selects the labels matching `selector`.
///
/// `labels[0]` is the time label and always selected; the other labels are
/// returned in declaration order if any pattern fully matches them.
///
/// # Errors
///
/// Returns [`QueryError::InvalidPattern`] if a pattern does not compile.
pub fn select_labels(selector: &LabelSelector, labels: &[String]) -> Result<Vec<String>> {
    let patterns = selector.compile()?;
    let Some((time, values)) = labels.split_first() else {
        return Ok(Vec::new());
    };

    let mut selected = vec![time.clone()];
    selected.extend(
        values
            .iter()
            .filter(|label| patterns.iter().any(|pattern| pattern.is_match(label)))
            .cloned(),
    );
    Ok(selected)
}
