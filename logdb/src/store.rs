//! Store module for the logdb time-series log.
//!
//! This module provides the top-level API that ties all components together.
//! A [`Store`] keeps a bounded in-memory mirror of a CSV log and answers
//! queries over it.
//!
//! # Design
//!
//! The Store acts as the central coordinator:
//! - Opens the [`CsvLog`] (if a path is configured) and restores its newest
//!   records, capped by the retention record count
//! - Normalizes inserted records, appends them to the log first and to the
//!   in-memory columns second
//! - Evicts the oldest resident records in batches per the retention bounds
//! - Resolves label selections and index ranges for exports
//! - Handles the store lifecycle (open, close)
//!
//! # Lifecycle
//!
//! ```text
//! open() ──> Open ──insert()*──> close() ──> Closed
//! ```
//!
//! Every operation on a closed store fails with [`StoreError::Closed`].
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use logdb::record::Record;
//! use logdb::schema::{LabelSpec, StoreConfig};
//! use logdb::store::Store;
//! use logdb::query::{LabelSelector, Position};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = StoreConfig::new(LabelSpec::grouped([
//!     ("living", vec!["temperature", "humidity"]),
//!     ("office", vec!["temperature"]),
//! ]))
//! .with_path("sensors.csv")
//! .with_max_records(10_000)
//! .with_delta(true);
//!
//! let mut store = Store::open(config)?;
//!
//! store.insert(&Record::new().with_group("living", [("temperature", 21.5), ("humidity", 48.0)]))?;
//!
//! // Newest 20% of all temperatures
//! let records = store.export_records(
//!     &LabelSelector::from(".*:temperature"),
//!     Position::Fraction(-0.2),
//!     Position::END,
//! )?;
//! println!("{} records", records.len());
//!
//! store.close()?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, info};

use crate::columns::ColumnStore;
use crate::error::{Result, StoreError};
use crate::export::{self, DecimationSections, ExportRecord};
use crate::log::{CsvLog, LogOptions};
use crate::query::{self, IndexRange, LabelSelector, Position};
use crate::record::Record;
use crate::retention;
use crate::schema::{RetentionConfig, StoreConfig, TIME_LABEL};

/// Lifecycle state of a [`Store`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreState {
    /// Accepting inserts and queries.
    Open,
    /// Closed; every operation fails.
    Closed,
}

/// Top-level store handle for a logdb time series.
///
/// # Thread Safety
///
/// The Store is designed for single-writer access. Use [`SharedStore`] to
/// share one store between threads.
#[derive(Debug)]
pub struct Store {
    /// All labels in column order, time label first.
    labels: Vec<String>,
    /// Resident records.
    columns: ColumnStore,
    /// Backing file, if any.
    log: Option<CsvLog>,
    /// Eviction bounds.
    retention: RetentionConfig,
    /// Requested encoding, used when there is no backing file.
    delta: bool,
    /// Lifecycle state.
    state: StoreState,
}

impl Store {
    /// Opens a store, restoring the newest records from its backing file.
    ///
    /// Without a path the store lives in memory only. With a path, the
    /// labels of the store are all labels of the file: the configured
    /// labels not yet in the file are added to its header, and labels only
    /// known to the file stay addressable.
    ///
    /// # Errors
    ///
    /// - [`StoreError::InvalidConfig`] if the configuration is invalid
    /// - [`HeaderError::MissingTimeLabel`](crate::error::HeaderError::MissingTimeLabel)
    ///   if the file's first label is not the time label; the file is left
    ///   untouched
    /// - any [`CsvLog::open`] or [`CsvLog::restore`] error
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// # use logdb::schema::{LabelSpec, StoreConfig};
    /// # use logdb::store::Store;
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let config = StoreConfig::new(LabelSpec::flat(["sens0", "sens1"])).with_path("sensors.csv");
    /// let store = Store::open(config)?;
    /// println!("{} records restored", store.resident_count());
    /// # Ok(())
    /// # }
    /// ```
    pub fn open(config: StoreConfig) -> Result<Self> {
        config.validate()?;
        let requested = config.labels.flatten();

        let Some(path) = &config.path else {
            info!(labels = requested.len(), "opened in-memory store");
            return Ok(Self {
                columns: ColumnStore::new(requested.clone()),
                labels: requested,
                log: None,
                retention: config.retention,
                delta: config.delta,
                state: StoreState::Open,
            });
        };

        let options = LogOptions {
            delta: config.delta,
            header_reserve: config.header_reserve,
            restore_chunk_size: config.restore_chunk_size,
            first_label: Some(TIME_LABEL.to_string()),
        };
        let mut log = CsvLog::open(path, &requested, &options)?;
        let labels = log.labels().to_vec();

        let mut columns = ColumnStore::new(labels.clone());
        let restored = log.restore(&mut columns, config.retention.max_records)?;

        info!(
            path = %path.display(),
            labels = labels.len(),
            restored,
            delta = log.is_delta(),
            "opened store"
        );

        Ok(Self {
            labels,
            columns,
            log: Some(log),
            retention: config.retention,
            delta: config.delta,
            state: StoreState::Open,
        })
    }

    fn ensure_open(&self) -> Result<()> {
        match self.state {
            StoreState::Open => Ok(()),
            StoreState::Closed => Err(StoreError::Closed.into()),
        }
    }

    /// Inserts a record stamped with the current time (whole seconds).
    ///
    /// # Errors
    ///
    /// See [`Store::insert_at`].
    pub fn insert(&mut self, record: &Record) -> Result<()> {
        self.insert_at(record, now_seconds())
    }

    /// Inserts a record stamped with `time` (seconds since the epoch).
    ///
    /// A mapping record that sets the time label overrides `time`. The
    /// record is appended to the backing file before the resident columns
    /// are updated; retention is applied relative to the record's time.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Closed`] if the store was closed
    /// - [`RecordError`](crate::error::RecordError) if the record does not
    ///   fit the labels
    /// - [`FileError::Write`](crate::error::FileError::Write) if appending fails
    pub fn insert_at(&mut self, record: &Record, time: f64) -> Result<()> {
        self.ensure_open()?;

        let row = record.normalize(&self.labels, time)?;
        if let Some(log) = &mut self.log {
            log.append(&row)?;
        }
        self.columns.push_row(&row)?;

        let now = row[0];
        let evict = self
            .columns
            .column(TIME_LABEL)
            .map_or(0, |times| retention::eviction_count(times, now, &self.retention));
        if evict > 0 {
            self.columns.drain_front(evict);
            debug!(evicted = evict, resident = self.columns.len(), "applied retention");
        }

        Ok(())
    }

    /// Returns the number of resident records (0 once closed).
    pub fn resident_count(&self) -> usize {
        self.columns.len()
    }

    /// Returns all labels in column order, time label first.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Returns the time label.
    pub fn time_label(&self) -> &str {
        TIME_LABEL
    }

    /// Returns whether the backing file is delta encoded.
    ///
    /// The file's mode wins over the requested one.
    pub fn is_delta(&self) -> bool {
        self.log.as_ref().map_or(self.delta, CsvLog::is_delta)
    }

    /// Returns the path of the backing file.
    pub fn path(&self) -> Option<&Path> {
        self.log.as_ref().map(CsvLog::path)
    }

    /// Returns the retention bounds.
    pub fn retention(&self) -> &RetentionConfig {
        &self.retention
    }

    /// Returns the lifecycle state.
    pub fn state(&self) -> StoreState {
        self.state
    }

    /// Returns the resident columns.
    pub fn columns(&self) -> &ColumnStore {
        &self.columns
    }

    /// Resolves `start` and `end` against the resident window.
    ///
    /// With a record count bound, the window covers the newest
    /// `max_records` resident records only.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Closed`] if the store was closed.
    pub fn index_range(&self, start: Position, end: Position) -> Result<IndexRange> {
        self.ensure_open()?;
        let (lo, hi) = query::resident_window(self.columns.len(), self.retention.max_records);
        Ok(IndexRange::resolve(start, end, lo, hi))
    }

    /// Returns the time label followed by all labels matching `selector`.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Closed`] if the store was closed
    /// - [`QueryError::InvalidPattern`](crate::error::QueryError::InvalidPattern)
    ///   if a pattern does not compile
    pub fn select_labels(&self, selector: &LabelSelector) -> Result<Vec<String>> {
        self.ensure_open()?;
        query::select_labels(selector, &self.labels)
    }

    /// Returns one label-keyed map per record in range, oldest first.
    ///
    /// NaN values are omitted.
    ///
    /// # Errors
    ///
    /// See [`Store::select_labels`].
    pub fn export_records(
        &self,
        selector: &LabelSelector,
        start: Position,
        end: Position,
    ) -> Result<Vec<ExportRecord>> {
        let labels = self.select_labels(selector)?;
        let range = self.index_range(start, end)?;
        Ok(export::export_records(&self.columns, &labels, range))
    }

    /// Renders the records in range as decimated CSV.
    ///
    /// # Errors
    ///
    /// - see [`Store::select_labels`]
    /// - [`QueryError::InvalidDecimationFactor`](crate::error::QueryError::InvalidDecimationFactor)
    ///   for a factor of zero
    pub fn export_csv(
        &self,
        selector: &LabelSelector,
        start: Position,
        end: Position,
        sections: &DecimationSections,
    ) -> Result<String> {
        let labels = self.select_labels(selector)?;
        let range = self.index_range(start, end)?;
        export::export_csv(&self.columns, &labels, range, sections)
    }

    /// Flushes and releases the backing file and drops resident records.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Closed`] if the store was already closed
    /// - [`FileError::Write`](crate::error::FileError::Write) if syncing fails
    pub fn close(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.state = StoreState::Closed;
        self.columns = ColumnStore::new(self.labels.clone());

        if let Some(log) = self.log.take() {
            log.sync()?;
            debug!(path = %log.path().display(), "closed store");
        }
        Ok(())
    }
}

/// Current time in whole seconds since the epoch.
#[allow(clippy::cast_precision_loss)] // epoch seconds fit in 52 bits
fn now_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs()) as f64
}

/// A [`Store`] shared between threads.
///
/// Inserts take the write lock, queries the read lock, so readers never see
/// a partially applied insert or eviction.
#[derive(Debug, Clone)]
pub struct SharedStore {
    inner: Arc<RwLock<Store>>,
}

impl SharedStore {
    /// Wraps an open store.
    pub fn new(store: Store) -> Self {
        Self {
            inner: Arc::new(RwLock::new(store)),
        }
    }

    /// Opens a store and wraps it.
    ///
    /// # Errors
    ///
    /// See [`Store::open`].
    pub fn open(config: StoreConfig) -> Result<Self> {
        Store::open(config).map(Self::new)
    }

    /// Acquires the read lock.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Poisoned`] if a writer panicked.
    pub fn read(&self) -> Result<RwLockReadGuard<'_, Store>> {
        self.inner.read().map_err(|_| StoreError::Poisoned.into())
    }

    /// Acquires the write lock.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Poisoned`] if a writer panicked.
    pub fn write(&self) -> Result<RwLockWriteGuard<'_, Store>> {
        self.inner.write().map_err(|_| StoreError::Poisoned.into())
    }

    /// Inserts a record stamped with the current time.
    ///
    /// # Errors
    ///
    /// See [`Store::insert`].
    pub fn insert(&self, record: &Record) -> Result<()> {
        self.write()?.insert(record)
    }

    /// Inserts a record stamped with `time`.
    ///
    /// # Errors
    ///
    /// See [`Store::insert_at`].
    pub fn insert_at(&self, record: &Record, time: f64) -> Result<()> {
        self.write()?.insert_at(record, time)
    }

    /// Returns the number of resident records.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Poisoned`] if a writer panicked.
    pub fn resident_count(&self) -> Result<usize> {
        Ok(self.read()?.resident_count())
    }

    /// Closes the shared store for every handle.
    ///
    /// # Errors
    ///
    /// See [`Store::close`].
    pub fn close(&self) -> Result<()> {
        self.write()?.close()
    }
}
