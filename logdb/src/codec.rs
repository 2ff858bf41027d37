//! Field encoding and decoding for logdb data lines.
//!
//! A data line is a comma-joined list of fields aligned to the label line.
//! In absolute mode an empty field is NaN. In delta mode an empty field
//! repeats the previous value of the column and the literal `n` marks a
//! value that became NaN.

use std::collections::HashMap;

/// Field written in delta mode when a value became NaN.
pub const NAN_MARKER: &str = "n";

/// A decoded field before delta resolution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Cell {
    /// A concrete value (possibly NaN).
    Value(f64),
    /// Same value as the previous record of this column.
    Repeat,
}

impl Cell {
    /// Resolves the cell against the carried value of its column.
    pub fn resolve(self, carry: f64) -> f64 {
        match self {
            Self::Value(value) => value,
            Self::Repeat => carry,
        }
    }
}

/// Formats a value as plain decimal text. NaN is not handled here.
pub fn format_value(value: f64) -> String {
    value.to_string()
}

/// Encodes a field in absolute mode.
pub fn encode_absolute(value: f64) -> String {
    if value.is_nan() {
        String::new()
    } else {
        format_value(value)
    }
}

/// Decodes one field.
///
/// Whitespace around a field is ignored. Unparsable text decodes to NaN.
pub fn decode_field(field: &str, delta: bool) -> Cell {
    let field = field.trim();
    if field.is_empty() {
        return if delta { Cell::Repeat } else { Cell::Value(f64::NAN) };
    }
    if field == NAN_MARKER {
        return Cell::Value(f64::NAN);
    }
    Cell::Value(field.parse().unwrap_or(f64::NAN))
}

/// Delta encoder holding the last value written per label.
#[derive(Debug, Default, Clone)]
pub struct DeltaEncoder {
    last_values: HashMap<String, f64>,
}

impl DeltaEncoder {
    /// Creates an encoder with no history; the next field of every label is
    /// written in full.
    pub fn new() -> Self {
        Self::default()
    }

    /// Encodes `value` for `label` and remembers it as the last value.
    pub fn encode(&mut self, label: &str, value: f64) -> String {
        let field = match self.last_values.get(label) {
            None if value.is_nan() => NAN_MARKER.to_string(),
            None => format_value(value),
            Some(&last) if value.is_nan() => {
                if last.is_nan() {
                    String::new()
                } else {
                    NAN_MARKER.to_string()
                }
            }
            Some(&last) if value == last => String::new(),
            Some(_) => format_value(value),
        };

        self.last_values.insert(label.to_string(), value);
        field
    }
}

/// Forward-resolves repeat cells of one column in chronological order.
///
/// The carried value starts as NaN, so a leading repeat decodes to NaN.
pub fn resolve_column(cells: &[Cell]) -> Vec<f64> {
    let mut carry = f64::NAN;
    cells
        .iter()
        .map(|cell| {
            carry = cell.resolve(carry);
            carry
        })
        .collect()
}
