//! In-memory column storage.
//!
//! One `Vec<f64>` per label, all of equal length. Row `i` of every column
//! belongs to the same record; NaN marks a missing value.

use std::collections::HashMap;

use crate::error::{RecordError, Result};

/// Parallel columns indexed by label.
#[derive(Debug, Clone, Default)]
pub struct ColumnStore {
    labels: Vec<String>,
    index: HashMap<String, usize>,
    columns: Vec<Vec<f64>>,
}

impl ColumnStore {
    /// Creates empty columns for `labels`.
    pub fn new(labels: Vec<String>) -> Self {
        let index = labels
            .iter()
            .enumerate()
            .map(|(i, label)| (label.clone(), i))
            .collect();
        let columns = vec![Vec::new(); labels.len()];
        Self { labels, index, columns }
    }

    /// Returns the labels in column order.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Returns the number of rows.
    pub fn len(&self) -> usize {
        self.columns.first().map_or(0, Vec::len)
    }

    /// Returns `true` if no rows are held.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the column position of `label`.
    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.index.get(label).copied()
    }

    /// Returns the values of `label`, oldest first.
    pub fn column(&self, label: &str) -> Option<&[f64]> {
        self.index_of(label).map(|i| self.columns[i].as_slice())
    }

    /// Returns the value of `label` in row `row`.
    pub fn value(&self, label: &str, row: usize) -> Option<f64> {
        self.column(label).and_then(|column| column.get(row).copied())
    }

    /// Appends one row aligned to [`labels`](Self::labels).
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::RowWidth`] if the row width does not match.
    pub fn push_row(&mut self, row: &[f64]) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(RecordError::RowWidth {
                got: row.len(),
                expected: self.columns.len(),
            }
            .into());
        }
        for (column, &value) in self.columns.iter_mut().zip(row) {
            column.push(value);
        }
        Ok(())
    }

    /// Appends whole columns named by `source_labels`.
    ///
    /// Labels of this store missing from `source_labels` are filled with NaN;
    /// source columns without a matching label are dropped.
    pub fn append_columns(&mut self, source_labels: &[String], values: Vec<Vec<f64>>) {
        let rows = values.first().map_or(0, Vec::len);
        let mut by_label: HashMap<&str, Vec<f64>> = source_labels
            .iter()
            .map(String::as_str)
            .zip(values)
            .collect();

        for (label, column) in self.labels.iter().zip(self.columns.iter_mut()) {
            match by_label.remove(label.as_str()) {
                Some(source) => column.extend(source),
                None => column.resize(column.len() + rows, f64::NAN),
            }
        }
    }

    /// Drops the `count` oldest rows.
    pub fn drain_front(&mut self, count: usize) {
        let count = count.min(self.len());
        if count == 0 {
            return;
        }
        for column in &mut self.columns {
            column.drain(..count);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_push_and_read() {
        let mut store = ColumnStore::new(labels(&["Time", "a"]));
        assert!(store.is_empty());

        store.push_row(&[1.0, 10.0]).unwrap();
        store.push_row(&[2.0, f64::NAN]).unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(store.column("Time").unwrap(), &[1.0, 2.0]);
        assert_eq!(store.value("a", 0), Some(10.0));
        assert!(store.value("a", 1).unwrap().is_nan());
        assert_eq!(store.value("a", 2), None);
        assert!(store.column("b").is_none());
    }

    #[test]
    fn test_push_rejects_wrong_width() {
        let mut store = ColumnStore::new(labels(&["Time", "a"]));
        assert!(store.push_row(&[1.0]).is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn test_append_columns_by_label() {
        let mut store = ColumnStore::new(labels(&["Time", "a", "b"]));
        store.append_columns(
            &labels(&["Time", "b", "extra"]),
            vec![vec![1.0, 2.0], vec![5.0, 6.0], vec![9.0, 9.0]],
        );

        assert_eq!(store.len(), 2);
        assert_eq!(store.column("Time").unwrap(), &[1.0, 2.0]);
        assert_eq!(store.column("b").unwrap(), &[5.0, 6.0]);
        assert!(store.column("a").unwrap().iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_drain_front() {
        let mut store = ColumnStore::new(labels(&["Time"]));
        for i in 0u32..5 {
            store.push_row(&[f64::from(i)]).unwrap();
        }

        store.drain_front(2);
        assert_eq!(store.column("Time").unwrap(), &[2.0, 3.0, 4.0]);

        store.drain_front(10);
        assert!(store.is_empty());
    }
}
