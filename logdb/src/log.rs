//! Persistent, append-only CSV log.
//!
//! [`CsvLog`] owns the on-disk representation of a store: a two-line header
//! ([`HeaderBlock`]) followed by one line per record. Labels can be added
//! over the lifetime of a file by rewriting the fixed-width header in place;
//! data lines written before the extension simply end early and restore as
//! NaN for the new columns.
//!
//! # Recovery
//!
//! - An unrecognized info line is logged as an error; the file is renamed to
//!   `<path><YYYYmmdd_HHMMSS>` and a fresh one is created.
//! - A requested delta mode that differs from the file's mode is logged as a
//!   warning; the file's mode wins.
//! - Unparsable numeric fields restore as NaN.
//!
//! # Example
//!
//! ```rust,no_run
//! use logdb::log::{CsvLog, LogOptions};
//! use logdb::columns::ColumnStore;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let labels = vec!["sens0".to_string(), "sens1".to_string()];
//! let mut log = CsvLog::open("sensors.csv", &labels, &LogOptions::default())?;
//! log.append(&[5.8, f64::NAN])?;
//!
//! let mut columns = ColumnStore::new(log.labels().to_vec());
//! log.restore(&mut columns, Some(1000))?;
//! # Ok(())
//! # }
//! ```

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, error, warn};

use crate::chunk::ReverseChunkReader;
use crate::codec::{self, Cell, DeltaEncoder};
use crate::columns::ColumnStore;
use crate::error::{FileError, HeaderError, RecordError, Result, RestoreError};
use crate::header::HeaderBlock;
use crate::schema::{DEFAULT_HEADER_RESERVE, DEFAULT_RESTORE_CHUNK_SIZE};

/// Options applied when opening a [`CsvLog`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogOptions {
    /// Requested encoding for a new file.
    pub delta: bool,
    /// Header width of a new file (info and label line, newlines excluded).
    pub header_reserve: usize,
    /// Size of the first chunk read on restore.
    pub restore_chunk_size: usize,
    /// Label an existing file must list first; checked before the header
    /// is touched.
    pub first_label: Option<String>,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            delta: false,
            header_reserve: DEFAULT_HEADER_RESERVE,
            restore_chunk_size: DEFAULT_RESTORE_CHUNK_SIZE,
            first_label: None,
        }
    }
}

/// Append-only CSV log file.
#[derive(Debug)]
pub struct CsvLog {
    /// Path of the log file.
    path: PathBuf,
    /// Open handle, read/write.
    file: File,
    /// Current header (mode and combined labels).
    header: HeaderBlock,
    /// Width available to header rewrites.
    header_width: usize,
    /// Offset of the first data line.
    data_offset: u64,
    /// Whether the file was created by this open (nothing to restore).
    created: bool,
    /// Last written values, delta mode only.
    encoder: DeltaEncoder,
    /// Initial restore chunk size.
    restore_chunk_size: usize,
}

impl CsvLog {
    /// Opens the log at `path`, creating it if absent.
    ///
    /// Labels not yet present in an existing file are appended to its label
    /// line in the order given.
    ///
    /// # Errors
    ///
    /// - [`FileError`] if the file cannot be opened, created, backed up or written
    /// - [`HeaderError::MissingTimeLabel`] if an existing file does not start
    ///   with [`LogOptions::first_label`]; the file is left untouched
    /// - [`HeaderError::Overflow`] if the extended label line no longer fits
    ///   into the existing header
    pub fn open<P: AsRef<Path>>(path: P, labels: &[String], options: &LogOptions) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        debug!(path = %path.display(), ?labels, "opening log");

        if path.exists() {
            if let Some(log) = Self::open_existing(&path, labels, options)? {
                return Ok(log);
            }
        }

        Self::create_new(path, labels, options)
    }

    /// Opens an existing file. Returns `Ok(None)` after backing up a file
    /// whose header is not recognized.
    fn open_existing(path: &Path, labels: &[String], options: &LogOptions) -> Result<Option<Self>> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| FileError::Open {
                path: path.to_path_buf(),
                source: e,
            })?;

        let parsed = HeaderBlock::read_from(&mut BufReader::new(&file)).map_err(|e| FileError::Read {
            path: path.to_path_buf(),
            offset: 0,
            source: e,
        })?;

        let Some(parsed) = parsed else {
            drop(file);
            let backup = backup_path(path);
            error!(
                path = %path.display(),
                backup = %backup.display(),
                "unrecognized header line, backing up file and creating a new one"
            );
            fs::rename(path, &backup).map_err(|e| FileError::Backup {
                path: path.to_path_buf(),
                backup: backup.clone(),
                source: e,
            })?;
            return Ok(None);
        };

        if options.delta != parsed.block.delta {
            warn!(
                path = %path.display(),
                requested = options.delta,
                existing = parsed.block.delta,
                "requested delta mode does not match the file, using the file's mode"
            );
        }

        if let Some(expected) = &options.first_label
            && parsed.block.labels.first() != Some(expected)
        {
            return Err(HeaderError::MissingTimeLabel {
                expected: expected.clone(),
                found: parsed.block.labels.first().cloned().unwrap_or_default(),
            }
            .into());
        }

        let header_width = parsed.width();
        let mut header = parsed.block;
        let new_labels: Vec<String> = labels
            .iter()
            .filter(|label| !header.labels.contains(label))
            .cloned()
            .collect();

        debug!(
            header_width,
            existing = ?header.labels,
            new = ?new_labels,
            "read existing header"
        );

        if !new_labels.is_empty() {
            header.labels.extend(new_labels);
            let bytes = header.render(header_width)?;
            file.seek(SeekFrom::Start(0))
                .and_then(|_| file.write_all(&bytes))
                .and_then(|()| file.flush())
                .map_err(|e| FileError::Write {
                    path: path.to_path_buf(),
                    offset: 0,
                    source: e,
                })?;
        }

        Ok(Some(Self {
            path: path.to_path_buf(),
            file,
            header,
            header_width,
            data_offset: parsed.data_offset,
            created: false,
            encoder: DeltaEncoder::new(),
            restore_chunk_size: options.restore_chunk_size,
        }))
    }

    /// Creates a new file holding only the header.
    fn create_new(path: PathBuf, labels: &[String], options: &LogOptions) -> Result<Self> {
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| FileError::Open {
                path: path.clone(),
                source: e,
            })?;

        let mut header = HeaderBlock::new(Vec::with_capacity(labels.len()), options.delta);
        for label in labels {
            if !header.labels.contains(label) {
                header.labels.push(label.clone());
            }
        }

        // The reserve is a minimum; a header that does not fit is written unpadded.
        let header_width = options.header_reserve.max(header.natural_width());
        let bytes = header.render(header_width)?;
        file.write_all(&bytes)
            .and_then(|()| file.flush())
            .map_err(|e| FileError::Write {
                path: path.clone(),
                offset: 0,
                source: e,
            })?;

        debug!(path = %path.display(), header_width, "created new log");

        Ok(Self {
            path,
            file,
            header,
            header_width,
            data_offset: bytes.len() as u64,
            created: true,
            encoder: DeltaEncoder::new(),
            restore_chunk_size: options.restore_chunk_size,
        })
    }

    /// Returns all labels of the file in column order.
    pub fn labels(&self) -> &[String] {
        &self.header.labels
    }

    /// Returns whether data lines are delta encoded.
    pub fn is_delta(&self) -> bool {
        self.header.delta
    }

    /// Returns the path of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the width reserved for the header lines.
    pub fn header_width(&self) -> usize {
        self.header_width
    }

    /// Returns the offset of the first data line.
    pub fn data_offset(&self) -> u64 {
        self.data_offset
    }

    /// Overrides the initial restore chunk size.
    pub fn set_restore_chunk_size(&mut self, size: usize) {
        self.restore_chunk_size = size.max(1);
    }

    /// Encodes one row aligned to [`labels`](Self::labels) into a data line.
    fn encode_row(&mut self, row: &[f64]) -> String {
        let mut line = String::with_capacity(row.len() * 8);
        for (index, (label, &value)) in self.header.labels.iter().zip(row).enumerate() {
            if index > 0 {
                line.push(',');
            }
            let field = if self.header.delta {
                self.encoder.encode(label, value)
            } else {
                codec::encode_absolute(value)
            };
            line.push_str(&field);
        }
        line.push('\n');
        line
    }

    /// Appends one record and flushes it to the OS.
    ///
    /// `row` holds one value per label in [`labels`](Self::labels) order;
    /// NaN marks a missing value.
    ///
    /// # Errors
    ///
    /// - [`RecordError::RowWidth`] if `row` does not match the label count
    /// - [`FileError::Write`] if writing fails
    pub fn append(&mut self, row: &[f64]) -> Result<()> {
        if row.len() != self.header.labels.len() {
            return Err(RecordError::RowWidth {
                got: row.len(),
                expected: self.header.labels.len(),
            }
            .into());
        }

        let line = self.encode_row(row);
        let path = &self.path;
        let file = &mut self.file;
        let offset = file.seek(SeekFrom::End(0)).map_err(|e| FileError::Write {
            path: path.clone(),
            offset: 0,
            source: e,
        })?;
        file.write_all(line.as_bytes())
            .and_then(|()| file.flush())
            .map_err(|e| FileError::Write {
                path: path.clone(),
                offset,
                source: e,
            })?;

        // Anything after this append is no longer a fresh file.
        self.created = false;
        Ok(())
    }

    /// Restores the newest records into `columns`.
    ///
    /// The file is read backwards in chunks that start at the configured
    /// restore chunk size and double on every read, stopping once
    /// `max_records` records were collected. Records are appended to
    /// `columns` in chronological order; store labels missing in the file
    /// are filled with NaN and file labels missing in the store are skipped.
    ///
    /// Returns the number of restored records.
    ///
    /// # Errors
    ///
    /// - [`FileError::Read`] if reading fails
    /// - [`RestoreError::TooManyFields`] for a line with more fields than labels
    pub fn restore(&mut self, columns: &mut ColumnStore, max_records: Option<usize>) -> Result<usize> {
        if self.created {
            debug!(path = %self.path.display(), "new log, nothing to restore");
            return Ok(0);
        }

        let limit = max_records.unwrap_or(usize::MAX);
        let label_count = self.header.labels.len();
        let delta = self.header.delta;
        let mut cells: Vec<Vec<Cell>> = vec![Vec::new(); label_count];
        let mut restored = 0usize;

        let file_size = self
            .file
            .metadata()
            .map_err(|e| FileError::Read {
                path: self.path.clone(),
                offset: 0,
                source: e,
            })?
            .len();
        debug!(file_size, data_offset = self.data_offset, "restoring log");

        let mut reader = ReverseChunkReader::new(&self.file, self.data_offset, file_size, self.restore_chunk_size);

        'chunks: while restored < limit {
            let offset = reader.position();
            let Some(chunk) = reader.next_chunk().map_err(|e| FileError::Read {
                path: self.path.clone(),
                offset,
                source: e,
            })?
            else {
                break;
            };

            for raw_line in chunk.split(|&b| b == b'\n').rev() {
                let line = String::from_utf8_lossy(raw_line);
                let line = line.trim();
                let fields: Vec<&str> = line.split(',').collect();

                if fields.len() < 2 {
                    continue;
                }
                if fields.len() > label_count {
                    return Err(RestoreError::TooManyFields {
                        fields: fields.len(),
                        labels: label_count,
                        line: line.to_string(),
                    }
                    .into());
                }

                for (index, column) in cells.iter_mut().enumerate() {
                    let cell = fields
                        .get(index)
                        .map_or(Cell::Value(f64::NAN), |field| codec::decode_field(field, delta));
                    column.push(cell);
                }

                restored += 1;
                if restored >= limit {
                    break 'chunks;
                }
            }
        }

        let values: Vec<Vec<f64>> = cells
            .into_iter()
            .map(|mut column| {
                column.reverse();
                codec::resolve_column(&column)
            })
            .collect();

        columns.append_columns(&self.header.labels, values);
        debug!(restored, "restored records");
        Ok(restored)
    }

    /// Flushes file contents and metadata to disk.
    ///
    /// # Errors
    ///
    /// Returns [`FileError::Write`] if syncing fails.
    pub fn sync(&self) -> Result<()> {
        self.file.sync_all().map_err(|e| FileError::Write {
            path: self.path.clone(),
            offset: 0,
            source: e,
        })?;
        Ok(())
    }
}

/// Path a file with an unrecognized header is renamed to.
///
/// `<path><YYYYmmdd_HHMMSS>`, followed by `_<n>` if an earlier backup in the
/// same second already took that name.
fn backup_path(path: &Path) -> PathBuf {
    let mut stamped: OsString = path.as_os_str().to_owned();
    stamped.push(chrono::Local::now().format("%Y%m%d_%H%M%S").to_string());

    let mut backup = PathBuf::from(&stamped);
    let mut n = 1u32;
    while backup.exists() {
        let mut numbered = stamped.clone();
        numbered.push(format!("_{n}"));
        backup = PathBuf::from(numbered);
        n += 1;
    }
    backup
}
