//! # logdb
//!
//! Append-only, retention-bounded time-series log.
//!
//! logdb persists periodic multi-sensor readings to a self-describing CSV
//! file, one record per line, optionally delta encoded, and keeps a bounded
//! in-memory mirror of the newest records that can be queried by label
//! pattern and relative position and exported as records or decimated CSV.
//!
//! ## Key Properties
//!
//! - Every insert is appended and flushed before it becomes visible in memory
//! - Labels can be added over the lifetime of a file without rewriting data
//! - Delta encoding writes only values that changed since the previous line
//! - Reopening restores only the newest records, reading the file backwards
//! - Resident records are bounded by count and/or age, evicted in batches
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use logdb::{DecimationSections, LabelSelector, LabelSpec, Position, Record, Store, StoreConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = StoreConfig::new(LabelSpec::flat(["sens0", "sens1", "sens2"]))
//!     .with_path("sensors.csv")
//!     .with_max_records(31 * 24 * 12)
//!     .with_delta(true);
//!
//! // Open or create the log, restoring the newest records
//! let mut store = Store::open(config)?;
//!
//! // Insert a reading stamped with the current time
//! store.insert(&Record::new().with("sens0", 5.8).with("sens2", 6.8))?;
//!
//! // Export the newest half, averaging pairs of records
//! let csv = store.export_csv(
//!     &LabelSelector::default(),
//!     Position::Fraction(-0.5),
//!     Position::END,
//!     &DecimationSections::new().with(Position::START, 2),
//! )?;
//! println!("{csv}");
//!
//! store.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`Store`] — Top-level handle; in-memory mirror, retention, queries
//! - [`CsvLog`] — The persistent CSV log backing a store
//! - [`StoreConfig`] — Labels, backing file, retention and encoding
//! - [`Record`] — Positional or label-keyed record to insert
//! - [`LabelSelector`] / [`Position`] — What and which records to export
//!
//! ## Modules
//!
//! For lower-level access, the individual modules are also public:
//!
//! - [`store`] — Store lifecycle, insert, export
//! - [`schema`] — Label, retention and store configuration
//! - [`log`] — Persistent log: open, append, restore
//! - [`header`] — Fixed-width header record of the file format
//! - [`codec`] — Absolute and delta field encoding
//! - [`chunk`] — Reverse, line-aligned chunk reading
//! - [`columns`] — In-memory column storage
//! - [`record`] — Insert-side record shapes
//! - [`retention`] — Eviction of the oldest resident records
//! - [`query`] — Positions, index ranges and label selection
//! - [`export`] — Record and decimated CSV export
//! - [`error`] — Error types

pub mod chunk;
pub mod codec;
pub mod columns;
pub mod error;
pub mod export;
pub mod header;
pub mod log;
pub mod query;
pub mod record;
pub mod retention;
pub mod schema;
pub mod store;

pub use error::{LogDbError, Result};
pub use export::{DecimationSections, ExportRecord};
pub use log::CsvLog;
pub use query::{IndexRange, LabelSelector, Position};
pub use record::Record;
pub use schema::{LabelSpec, RetentionConfig, StoreConfig, TIME_LABEL};
pub use store::{SharedStore, Store};
