//! Error types for the logdb time-series log.

use std::path::PathBuf;

use thiserror::Error;

/// The main error type for all logdb operations.
///
/// Conditions that the log recovers from on its own (an unrecognized info
/// line, a delta/absolute mode mismatch, an unparsable numeric field) never
/// show up here; they are logged and handled in place.
#[derive(Error, Debug)]
pub enum LogDbError {
    /// Error reading or writing the backing file.
    #[error("file error: {0}")]
    File(#[from] FileError),

    /// Error building or rewriting the file header.
    #[error("header error: {0}")]
    Header(#[from] HeaderError),

    /// Error while restoring records from the file.
    #[error("restore error: {0}")]
    Restore(#[from] RestoreError),

    /// Error normalizing a record on insert.
    #[error("record error: {0}")]
    Record(#[from] RecordError),

    /// Error resolving a query (label patterns, decimation sections).
    #[error("query error: {0}")]
    Query(#[from] QueryError),

    /// Error in the store lifecycle or its configuration.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Error loading a configuration file.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

/// Errors that can occur while accessing the backing CSV file.
#[derive(Error, Debug)]
pub enum FileError {
    /// The file could not be opened or created.
    #[error("failed to open '{}': {source}", path.display())]
    Open {
        /// The path that could not be opened.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Reading from the file failed.
    #[error("failed to read '{}' at offset {offset}: {source}", path.display())]
    Read {
        /// The file path.
        path: PathBuf,
        /// The byte offset where the read started.
        offset: u64,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Writing to the file failed.
    #[error("failed to write '{}' at offset {offset}: {source}", path.display())]
    Write {
        /// The file path.
        path: PathBuf,
        /// The byte offset where the write started.
        offset: u64,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A file with an unrecognized header could not be moved aside.
    #[error("failed to back up '{}' to '{}': {source}", path.display(), backup.display())]
    Backup {
        /// The original file path.
        path: PathBuf,
        /// The backup path that was attempted.
        backup: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Errors that can occur while rendering the two-line file header.
#[derive(Error, Debug)]
pub enum HeaderError {
    /// The combined label line no longer fits into the reserved header width.
    #[error("header needs {required} bytes but only {reserved} are reserved")]
    Overflow {
        /// Bytes the rendered header needs (info and label line, without newlines).
        required: usize,
        /// Bytes reserved by the existing header.
        reserved: usize,
    },

    /// The existing label line does not start with the time label.
    #[error("label line starts with '{found}' instead of the time label '{expected}'")]
    MissingTimeLabel {
        /// The reserved time label.
        expected: String,
        /// The first label found in the file.
        found: String,
    },
}

/// Errors that can occur while restoring records from the file.
#[derive(Error, Debug)]
pub enum RestoreError {
    /// A data line carries more fields than the header declares labels.
    #[error("line with {fields} values for {labels} labels: {line:?}")]
    TooManyFields {
        /// Number of comma-separated fields found.
        fields: usize,
        /// Number of labels in the header.
        labels: usize,
        /// The offending line.
        line: String,
    },
}

/// Errors that can occur while normalizing an inserted record.
#[derive(Error, Debug)]
pub enum RecordError {
    /// A positional record does not have one value per non-time label.
    #[error("got {got} values for {expected} labels")]
    PositionalLength {
        /// Number of values supplied.
        got: usize,
        /// Number of non-time labels.
        expected: usize,
    },

    /// A mapping record names a label the store does not know.
    #[error("unknown label '{label}'")]
    UnknownLabel {
        /// The unknown label.
        label: String,
    },

    /// The appended row does not match the width of the label set.
    #[error("row has {got} values but the log has {expected} labels")]
    RowWidth {
        /// Width of the supplied row.
        got: usize,
        /// Number of labels in the log.
        expected: usize,
    },

    /// The record could not be decoded into a known shape.
    #[error("unsupported record shape: {reason}")]
    Shape {
        /// Why the record was rejected.
        reason: String,
    },
}

/// Errors that can occur while resolving a query.
#[derive(Error, Debug)]
pub enum QueryError {
    /// A label pattern is not a valid regular expression.
    #[error("invalid label pattern '{pattern}': {source}")]
    InvalidPattern {
        /// The pattern as supplied.
        pattern: String,
        /// The underlying regex error.
        #[source]
        source: regex::Error,
    },

    /// A decimation factor of zero was requested.
    #[error("invalid decimation factor {factor} (must be > 0)")]
    InvalidDecimationFactor {
        /// The rejected factor.
        factor: usize,
    },
}

/// Errors that can occur in the store lifecycle.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The store was closed and no longer accepts operations.
    #[error("store is closed")]
    Closed,

    /// The store configuration is invalid.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of what is invalid.
        reason: String,
    },

    /// The shared store lock was poisoned by a panicking writer.
    #[error("store lock poisoned")]
    Poisoned,
}

/// Errors that can occur while loading a configuration file.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config '{}': {source}", path.display())]
    Read {
        /// The config file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid JSON for a store configuration.
    #[error("failed to parse config '{}': {source}", path.display())]
    Parse {
        /// The config file path.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}

/// Type alias for `Result<T, LogDbError>`.
pub type Result<T> = std::result::Result<T, LogDbError>;
