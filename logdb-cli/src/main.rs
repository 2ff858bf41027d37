//! CLI for the logdb CSV time-series log.
//!
//! Provides commands for inspecting, exporting, appending to and
//! benchmarking logdb files.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{Parser, Subcommand, ValueEnum};
use logdb::columns::ColumnStore;
use logdb::export::format_time;
use logdb::header::{HeaderBlock, ParsedHeader};
use logdb::log::{CsvLog, LogOptions};
use logdb::{DecimationSections, LabelSelector, LabelSpec, Position, Record, Store, StoreConfig, TIME_LABEL};
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// logdb — Append-only CSV time-series log CLI.
#[derive(Parser)]
#[command(name = "logdb", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Display the header, labels and record count of a log file.
    Info {
        /// Path to the log file.
        file: PathBuf,
    },

    /// Export records from a log file.
    Export {
        /// Path to the log file.
        file: PathBuf,

        /// Label patterns (full-match regular expressions).
        #[arg(long = "select", default_value = ".*")]
        select: Vec<String>,

        /// Range start: an index ("30", "-70") or a fraction ("0.3", "-0.7").
        #[arg(long, default_value = "0", allow_negative_numbers = true)]
        start: Position,

        /// Range end, same syntax as --start.
        #[arg(long, default_value = "1.0", allow_negative_numbers = true)]
        end: Position,

        /// Decimation section as POSITION=FACTOR; may be repeated (CSV only).
        #[arg(long = "decimate", value_parser = parse_section, allow_hyphen_values = true)]
        decimate: Vec<(Position, usize)>,

        /// Restore and resolve positions over the newest N records only.
        #[arg(long)]
        max_records: Option<usize>,

        /// Output format.
        #[arg(long, default_value = "csv")]
        format: OutputFormat,
    },

    /// Append one record to a log file, creating it if needed.
    Insert {
        /// Path to the log file.
        file: PathBuf,

        /// Comma-separated value labels; labels new to the file are added.
        #[arg(long, value_delimiter = ',')]
        labels: Vec<String>,

        /// Record as JSON: a list of values or an object keyed by label.
        #[arg(long)]
        record: String,

        /// Record time in seconds since the epoch (default: now).
        #[arg(long)]
        time: Option<f64>,

        /// Use delta encoding when creating the file.
        #[arg(long)]
        delta: bool,
    },

    /// Run an insert and restore microbenchmark.
    Bench {
        /// Number of records to write.
        #[arg(long, default_value = "100000")]
        records: u32,

        /// Number of value labels per record.
        #[arg(long, default_value = "30")]
        labels: u32,

        /// Use delta encoding.
        #[arg(long)]
        delta: bool,
    },
}

/// Output format for exported records.
#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Decimated comma-separated values.
    Csv,
    /// JSON array of objects.
    Json,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Info { file } => cmd_info(&file),
        Commands::Export {
            file,
            select,
            start,
            end,
            decimate,
            max_records,
            format,
        } => cmd_export(&file, select, start, end, decimate, max_records, &format),
        Commands::Insert {
            file,
            labels,
            record,
            time,
            delta,
        } => cmd_insert(&file, labels, &record, time, delta),
        Commands::Bench { records, labels, delta } => cmd_bench(records, labels, delta),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

/// Parses a `POSITION=FACTOR` decimation section.
fn parse_section(s: &str) -> Result<(Position, usize), String> {
    let (position, factor) = s
        .split_once('=')
        .ok_or_else(|| format!("expected POSITION=FACTOR, got '{s}'"))?;
    let position = position
        .parse()
        .map_err(|e| format!("invalid position '{position}': {e}"))?;
    let factor = factor
        .trim()
        .parse()
        .map_err(|e| format!("invalid factor '{factor}': {e}"))?;
    Ok((position, factor))
}

/// Reads the header of an existing log file without modifying it.
fn read_header(path: &Path) -> Result<ParsedHeader, Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(format!("No log file found at '{}'", path.display()).into());
    }

    let file = File::open(path)?;
    HeaderBlock::read_from(&mut BufReader::new(file))?
        .ok_or_else(|| format!("'{}' is not a logdbcsv file", path.display()).into())
}

/// Implements `logdb info <file>`.
fn cmd_info(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let parsed = read_header(path)?;

    println!("File: {}", path.display());
    println!("  Format version: {}", parsed.version);
    println!(
        "  Encoding: {}",
        if parsed.block.delta { "delta" } else { "absolute" }
    );
    println!("  Header width: {} bytes", parsed.width());
    println!();

    println!("Labels: {}", parsed.block.labels.len());
    for (i, label) in parsed.block.labels.iter().enumerate() {
        println!("  {i:>3}: {label}");
    }
    println!();

    let options = LogOptions {
        delta: parsed.block.delta,
        ..LogOptions::default()
    };
    let mut log = CsvLog::open(path, &[], &options)?;
    let mut columns = ColumnStore::new(log.labels().to_vec());
    let restored = log.restore(&mut columns, None)?;
    println!("Records: {restored}");

    if let Some(times) = columns.column(TIME_LABEL)
        && let (Some(&first), Some(&last)) = (times.first(), times.last())
    {
        println!("  First: {}", format_time(first));
        println!("  Last:  {}", format_time(last));
    }

    let size = std::fs::metadata(path)?.len();
    println!();
    println!("Disk usage: {} ({size} bytes)", format_bytes(size));

    Ok(())
}

/// Implements `logdb export <file>`.
fn cmd_export(
    path: &Path,
    select: Vec<String>,
    start: Position,
    end: Position,
    decimate: Vec<(Position, usize)>,
    max_records: Option<usize>,
    format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let parsed = read_header(path)?;
    debug!(labels = parsed.block.labels.len(), "exporting");

    let mut config = StoreConfig::new(LabelSpec::flat(Vec::<String>::new()))
        .with_path(path)
        .with_delta(parsed.block.delta);
    if let Some(max_records) = max_records {
        config = config.with_max_records(max_records);
    }

    let mut store = Store::open(config)?;
    let selector = LabelSelector::from(select);

    match format {
        OutputFormat::Csv => {
            let sections: DecimationSections = decimate.into_iter().collect();
            println!("{}", store.export_csv(&selector, start, end, &sections)?);
        }
        OutputFormat::Json => {
            let records = store.export_records(&selector, start, end)?;
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
    }

    store.close()?;
    Ok(())
}

/// Implements `logdb insert <file>`.
fn cmd_insert(
    path: &Path,
    labels: Vec<String>,
    record: &str,
    time: Option<f64>,
    delta: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = StoreConfig::new(LabelSpec::flat(labels))
        .with_path(path)
        .with_max_records(1)
        .with_delta(delta);
    let mut store = Store::open(config)?;
    let record = Record::from_json(record)?;

    match time {
        Some(time) => store.insert_at(&record, time)?,
        None => store.insert(&record)?,
    }

    println!(
        "Inserted 1 record into {} ({} labels, {})",
        path.display(),
        store.labels().len(),
        if store.is_delta() { "delta" } else { "absolute" }
    );

    store.close()?;
    Ok(())
}

/// Implements `logdb bench`.
#[allow(clippy::cast_precision_loss)] // Benchmark stats are fine with f64 precision
fn cmd_bench(records: u32, label_count: u32, delta: bool) -> Result<(), Box<dyn std::error::Error>> {
    println!("logdb insert benchmark");
    println!("  Records: {records}");
    println!("  Labels: {label_count}");
    println!("  Encoding: {}", if delta { "delta" } else { "absolute" });
    println!();

    let temp_dir = std::env::temp_dir().join("logdb_bench");
    let _ = std::fs::remove_dir_all(&temp_dir);
    std::fs::create_dir_all(&temp_dir)?;
    let path = temp_dir.join("bench.csv");

    let config = StoreConfig::new(LabelSpec::flat((0..label_count).map(|i| format!("sens{i}"))))
        .with_path(&path)
        .with_max_records(10_000)
        .with_delta(delta);
    let mut store = Store::open(config.clone())?;

    println!("Inserting {records} records...");

    let base_time = 1_700_000_000.0;
    let start = Instant::now();

    for n in 0..records {
        // Slowly changing values so delta encoding has repeats to elide
        let values = (0..label_count)
            .map(|i| f64::from((n / (i + 1)) % 50) * 0.5)
            .collect();
        store.insert_at(&Record::positional(values), base_time + f64::from(n))?;
    }
    store.close()?;

    let elapsed = start.elapsed();
    let ns_per_insert = elapsed.as_nanos() as f64 / f64::from(records.max(1));
    let inserts_per_sec = f64::from(records) / elapsed.as_secs_f64();
    let size = std::fs::metadata(&path)?.len();

    let start = Instant::now();
    let store = Store::open(config)?;
    let restore_elapsed = start.elapsed();
    let restored = store.resident_count();

    println!();
    println!("Results:");
    println!("  Elapsed: {elapsed:.3?}");
    println!("  Avg latency: {ns_per_insert:.1} ns/insert");
    println!("  Throughput: {inserts_per_sec:.0} inserts/sec");
    println!("  File size: {} ({size} bytes)", format_bytes(size));
    println!("  Restore: {restored} records in {restore_elapsed:.3?}");
    println!();

    // Clean up
    drop(store);
    let _ = std::fs::remove_dir_all(&temp_dir);

    Ok(())
}

/// Formats a byte count as a human-readable string.
#[allow(clippy::cast_precision_loss)] // Byte counts are display-only
fn format_bytes(bytes: u64) -> String {
    if bytes >= 1_048_576 {
        format!("{:.1} MB", bytes as f64 / 1_048_576.0)
    } else if bytes >= 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{bytes} B")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_section() {
        assert_eq!(parse_section("0=8").unwrap(), (Position::Index(0), 8));
        assert_eq!(parse_section("-0.1=1").unwrap(), (Position::Fraction(-0.1), 1));
        assert!(parse_section("0.5").is_err());
        assert!(parse_section("0.5=x").is_err());
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1_048_576), "3.0 MB");
    }
}
