//! Fixed-width header record of a logdb CSV file.
//!
//! # File Format
//!
//! ```text
//! logdbcsv,version=1.0,delta=<0|1>\n                  <- info line
//! <label0>,<label1>,...,<labelN><padding spaces>\n    <- label line
//! <v0>,<v1>,...,<vN>\n                                <- data lines
//! ```
//!
//! The info line and the padded label line together occupy a fixed number
//! of bytes (the header width, newlines excluded). New labels can therefore
//! be written over the old label line without moving a single data byte, as
//! long as the combined line still fits.

use std::io::BufRead;

use crate::error::{HeaderError, Result};

/// Format tag of the info line.
pub const FORMAT_TAG: &str = "logdbcsv";

/// Format version written to new files.
pub const FORMAT_VERSION: &str = "1.0";

/// The two header lines of a log file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderBlock {
    /// Whether data lines are delta encoded.
    pub delta: bool,
    /// All labels in column order.
    pub labels: Vec<String>,
}

/// A header read back from an existing file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedHeader {
    /// The decoded header.
    pub block: HeaderBlock,
    /// Version string found in the info line.
    pub version: String,
    /// Bytes occupied by both header lines, newlines included. Data starts here.
    pub data_offset: u64,
}

impl ParsedHeader {
    /// The header width available for a rewrite (newlines excluded).
    pub fn width(&self) -> usize {
        // Two line terminators; the parser only accepts `\n`-terminated lines.
        usize::try_from(self.data_offset).unwrap_or(usize::MAX).saturating_sub(2)
    }
}

impl HeaderBlock {
    /// Creates a header block.
    pub fn new(labels: Vec<String>, delta: bool) -> Self {
        Self { delta, labels }
    }

    /// Formats the info line (without newline).
    pub fn info_line(&self) -> String {
        format!(
            "{FORMAT_TAG},version={FORMAT_VERSION},delta={}",
            u8::from(self.delta)
        )
    }

    /// Formats the unpadded label line (without newline).
    pub fn label_line(&self) -> String {
        self.labels.join(",")
    }

    /// Bytes the header needs without padding and newlines.
    pub fn natural_width(&self) -> usize {
        self.info_line().len() + self.label_line().len()
    }

    /// Returns whether the header fits into `width` bytes.
    pub fn fits(&self, width: usize) -> bool {
        self.natural_width() <= width
    }

    /// Renders both lines, padding the label line with spaces so that the
    /// two lines occupy exactly `width` bytes plus their newlines.
    ///
    /// # Errors
    ///
    /// Returns [`HeaderError::Overflow`] if the labels do not fit.
    pub fn render(&self, width: usize) -> Result<Vec<u8>> {
        if !self.fits(width) {
            return Err(HeaderError::Overflow {
                required: self.natural_width(),
                reserved: width,
            }
            .into());
        }

        let info = self.info_line();
        let labels = self.label_line();
        let padding = width - info.len() - labels.len();

        let mut bytes = Vec::with_capacity(width + 2);
        bytes.extend_from_slice(info.as_bytes());
        bytes.push(b'\n');
        bytes.extend_from_slice(labels.as_bytes());
        bytes.resize(bytes.len() + padding, b' ');
        bytes.push(b'\n');
        Ok(bytes)
    }

    /// Reads the two header lines from the start of a file.
    ///
    /// Returns `Ok(None)` when the info line is not a recognized
    /// `logdbcsv,version=<v>,delta=<0|1>` line or the label line is missing;
    /// the caller treats such a file as corrupt.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if reading fails.
    pub fn read_from<R: BufRead>(reader: &mut R) -> std::io::Result<Option<ParsedHeader>> {
        let mut info = Vec::new();
        let info_len = reader.read_until(b'\n', &mut info)?;
        if info.last() != Some(&b'\n') {
            return Ok(None);
        }

        let mut label_line = Vec::new();
        let label_len = reader.read_until(b'\n', &mut label_line)?;
        if label_line.last() != Some(&b'\n') {
            return Ok(None);
        }

        let info = String::from_utf8_lossy(&info);
        let Some((version, delta)) = parse_info_line(&info) else {
            return Ok(None);
        };

        let labels = String::from_utf8_lossy(&label_line)
            .split(',')
            .map(|label| label.trim().to_string())
            .collect();

        Ok(Some(ParsedHeader {
            block: HeaderBlock { delta, labels },
            version,
            data_offset: (info_len + label_len) as u64,
        }))
    }
}

/// Parses `logdbcsv,version=<v>,delta=<0|1>` into the version and delta flag.
pub fn parse_info_line(line: &str) -> Option<(String, bool)> {
    let parts: Vec<&str> = line.trim().split(',').collect();
    let [tag, version, delta] = parts.as_slice() else {
        return None;
    };

    if *tag != FORMAT_TAG {
        return None;
    }

    let version = version.strip_prefix("version=")?;
    let delta = match *delta {
        "delta=0" => false,
        "delta=1" => true,
        _ => return None,
    };

    Some((version.to_string(), delta))
}
