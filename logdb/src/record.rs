//! Insert-side record shapes.
//!
//! A record is either positional (one value per non-time label, in label
//! order) or a mapping of label to value. Mapping entries may also be groups
//! of sub labels, which address `"group:sub"` labels; flat and grouped
//! entries can be mixed in one record.
//!
//! Records deserialize from JSON:
//!
//! ```rust
//! use logdb::record::Record;
//!
//! let positional: Record = serde_json::from_str("[23.1, 57.1]").unwrap();
//! let mapping: Record =
//!     serde_json::from_str(r#"{"outdoor": 12.5, "living": {"temperature": 23.1}}"#).unwrap();
//! # let _ = (positional, mapping);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{RecordError, Result};
use crate::schema::{TIME_LABEL, group_label, ordered_pairs};

/// Value of one mapping entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Explicitly missing value (`null` in JSON).
    Missing,
    /// A value for a flat label.
    Value(f64),
    /// Values for sub labels of a group.
    Group(#[serde(with = "ordered_pairs")] Vec<(String, f64)>),
}

/// One record to insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Record {
    /// One value per non-time label, in label order.
    Positional(Vec<f64>),
    /// Label to value entries; labels not named are missing.
    Mapping(#[serde(with = "ordered_pairs")] Vec<(String, FieldValue)>),
}

impl Default for Record {
    fn default() -> Self {
        Self::Mapping(Vec::new())
    }
}

impl From<Vec<f64>> for Record {
    fn from(values: Vec<f64>) -> Self {
        Self::Positional(values)
    }
}

impl<S: Into<String>> FromIterator<(S, f64)> for Record {
    fn from_iter<I: IntoIterator<Item = (S, f64)>>(iter: I) -> Self {
        Self::Mapping(
            iter.into_iter()
                .map(|(label, value)| (label.into(), FieldValue::Value(value)))
                .collect(),
        )
    }
}

impl Record {
    /// Creates an empty mapping record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a positional record.
    pub fn positional(values: Vec<f64>) -> Self {
        Self::Positional(values)
    }

    /// Adds a flat `label = value` entry.
    ///
    /// A positional record is turned into an empty mapping first.
    #[must_use]
    pub fn with(self, label: impl Into<String>, value: f64) -> Self {
        self.push(label.into(), FieldValue::Value(value))
    }

    /// Adds a group entry addressing `"group:sub"` labels.
    #[must_use]
    pub fn with_group<I, S>(self, group: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let values = values.into_iter().map(|(sub, value)| (sub.into(), value)).collect();
        self.push(group.into(), FieldValue::Group(values))
    }

    fn push(self, key: String, field: FieldValue) -> Self {
        let mut entries = match self {
            Self::Mapping(entries) => entries,
            Self::Positional(_) => Vec::new(),
        };
        entries.push((key, field));
        Self::Mapping(entries)
    }

    /// Parses a record from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::Shape`] if the text is neither a number list
    /// nor an object of numbers and groups.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| {
            RecordError::Shape {
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// Normalizes the record into a full row aligned to `labels`.
    ///
    /// `labels[0]` must be the time label; it receives `time` unless a
    /// mapping sets the time label itself. Labels without a value are NaN.
    ///
    /// # Errors
    ///
    /// - [`RecordError::PositionalLength`] if a positional record does not
    ///   hold exactly one value per non-time label
    /// - [`RecordError::UnknownLabel`] if a mapping names a label not in `labels`
    pub fn normalize(&self, labels: &[String], time: f64) -> Result<Vec<f64>> {
        let mut row = vec![f64::NAN; labels.len()];
        if let Some(first) = row.first_mut() {
            *first = time;
        }

        match self {
            Self::Positional(values) => {
                let expected = labels.len().saturating_sub(1);
                if values.len() != expected {
                    return Err(RecordError::PositionalLength {
                        got: values.len(),
                        expected,
                    }
                    .into());
                }
                if let Some(rest) = row.get_mut(1..) {
                    rest.copy_from_slice(values);
                }
            }
            Self::Mapping(entries) => {
                for (key, field) in entries {
                    match field {
                        FieldValue::Missing => set(&mut row, labels, key, f64::NAN)?,
                        FieldValue::Value(value) => set(&mut row, labels, key, *value)?,
                        FieldValue::Group(values) => {
                            for (sub, value) in values {
                                set(&mut row, labels, &group_label(key, sub), *value)?;
                            }
                        }
                    }
                }
            }
        }

        Ok(row)
    }
}

fn set(row: &mut [f64], labels: &[String], label: &str, value: f64) -> Result<()> {
    let index = labels
        .iter()
        .position(|known| known == label)
        .ok_or_else(|| RecordError::UnknownLabel {
            label: label.to_string(),
        })?;

    // A missing time keeps the insert time.
    if label == TIME_LABEL && value.is_nan() {
        return Ok(());
    }
    row[index] = value;
    Ok(())
}
