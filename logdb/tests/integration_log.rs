//! Integration tests for the CSV log file format.
//!
//! These tests pin the exact bytes written for both encodings, the label
//! extension protocol on reopen, and restoring hand-written files.

use std::fs;
use std::path::Path;

use logdb::columns::ColumnStore;
use logdb::error::{LogDbError, RestoreError};
use logdb::log::{CsvLog, LogOptions};
use tempfile::tempdir;

/// Reference values, one row per record. Empty fields are missing values.
const REF_DATA: [&str; 15] = [
    "5.8, nan, 6.8,    ,    ",
    "   ,    , 7.8, nan,    ",
    "6.8, 0.8, 7.8,    ,    ",
    "8.3, 0.8, 6.8, 1.3, 1.8",
    "8.3, 5.8, nan, 1.3,    ",
    "8.3, 5.8, nan, 1.3,    ",
    "0.3, 5.8, 5.8, 9.8, 9.3",
    "   ,    , 4.3,    , nan",
    "   , 8.3, 4.3,    , 7.8",
    "nan, 5.8,    , 4.3, 7.8",
    "0.3, 5.8, nan, 4.3, 7.8",
    "nan, nan,    , 4.3, 5.8",
    "nan, 6.8,    ,    ,    ",
    "   , 7.8, nan,    , 6.8",
    "0.8, 7.8,    ,    , 8.3",
];

const THREE: [&str; 3] = ["sens0", "sens1", "sens2"];
const FIVE: [&str; 5] = ["sens0", "sens1", "sens2", "sens3", "sens4"];

fn labels(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| (*s).to_string()).collect()
}

fn open(path: &Path, names: &[&str], delta: bool) -> CsvLog {
    let options = LogOptions {
        delta,
        ..LogOptions::default()
    };
    CsvLog::open(path, &labels(names), &options).unwrap()
}

/// Appends the first `rows` reference rows, column `i` going to `names[i]`.
fn append_ref(log: &mut CsvLog, names: &[&str], rows: usize) {
    for line in REF_DATA.iter().take(rows) {
        let values: Vec<f64> = line
            .split(',')
            .map(|field| field.trim().parse().unwrap_or(f64::NAN))
            .collect();
        let row: Vec<f64> = log
            .labels()
            .iter()
            .map(|label| {
                names
                    .iter()
                    .position(|name| name == label)
                    .map_or(f64::NAN, |i| values[i])
            })
            .collect();
        log.append(&row).unwrap();
    }
}

/// File lines with the padding of the label line removed.
fn file_lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .enumerate()
        .map(|(i, line)| if i == 1 { line.trim_end() } else { line }.to_string())
        .collect()
}

fn restore(path: &Path, names: &[&str], delta: bool) -> ColumnStore {
    let mut log = open(path, names, delta);
    let mut columns = ColumnStore::new(log.labels().to_vec());
    log.restore(&mut columns, None).unwrap();
    columns
}

/// Renders rows of `columns` as `"a, b, c"` with `nan` for missing values.
fn rows(columns: &ColumnStore) -> Vec<String> {
    (0..columns.len())
        .map(|row| {
            columns
                .labels()
                .iter()
                .map(|label| {
                    let value = columns.value(label, row).unwrap();
                    if value.is_nan() { "nan".to_string() } else { value.to_string() }
                })
                .collect::<Vec<_>>()
                .join(", ")
        })
        .collect()
}

#[test]
fn test_restore_absolute_with_whitespace() {
    let temp_dir = tempdir().unwrap();
    let path = temp_dir.path().join("reload.csv");
    fs::write(
        &path,
        [
            "logdbcsv,version=1.0,delta=0",
            "sens0,sens1,sens2",
            "1.3,3.3,0.3",
            "2.5,,2.3",
            "2.5, ,2.3",
            "3.6,5.3,",
            "3.6,5.3, \r",
            "4.7, n , 8.8",
            " 5.8 , 7.8 , 4.8 \r\n",
        ]
        .join("\n"),
    )
    .unwrap();

    let columns = restore(&path, &THREE, false);
    assert_eq!(
        rows(&columns),
        vec![
            "1.3, 3.3, 0.3",
            "2.5, nan, 2.3",
            "2.5, nan, 2.3",
            "3.6, 5.3, nan",
            "3.6, 5.3, nan",
            "4.7, nan, 8.8",
            "5.8, 7.8, 4.8",
        ]
    );
}

#[test]
fn test_restore_delta_with_whitespace() {
    let temp_dir = tempdir().unwrap();
    let path = temp_dir.path().join("reload_delta.csv");
    fs::write(
        &path,
        [
            "logdbcsv,version=1.0,delta=1",
            " sens0 , sens1,sens2 ",
            "1.3,3.3,0.3",
            "2.5,,2.3",
            ", ,",
            ", n ,",
            "3.6,5.3,",
            ",, \r",
            "4.7,2.8 , 8.8",
            " 5.8 , 7.8 , 4.8 \r\n",
        ]
        .join("\n"),
    )
    .unwrap();

    let columns = restore(&path, &THREE, true);
    assert_eq!(
        rows(&columns),
        vec![
            "1.3, 3.3, 0.3",
            "2.5, 3.3, 2.3",
            "2.5, 3.3, 2.3",
            "2.5, nan, 2.3",
            "3.6, 5.3, 2.3",
            "3.6, 5.3, 2.3",
            "4.7, 2.8, 8.8",
            "5.8, 7.8, 4.8",
        ]
    );
}

#[test]
fn test_create_writes_header_only() {
    let temp_dir = tempdir().unwrap();

    for (delta, info) in [(false, "delta=0"), (true, "delta=1")] {
        let path = temp_dir.path().join(format!("create_{delta}.csv"));
        let log = open(&path, &FIVE, delta);
        assert_eq!(log.labels(), labels(&FIVE).as_slice());
        drop(log);

        assert_eq!(
            file_lines(&path),
            vec![format!("logdbcsv,version=1.0,{info}"), FIVE.join(",")]
        );
    }
}

#[test]
fn test_append_three_labels() {
    let temp_dir = tempdir().unwrap();

    let path = temp_dir.path().join("abs.csv");
    let mut log = open(&path, &THREE, false);
    append_ref(&mut log, &THREE, 7);
    drop(log);
    assert_eq!(
        file_lines(&path)[2..],
        ["5.8,,6.8", ",,7.8", "6.8,0.8,7.8", "8.3,0.8,6.8", "8.3,5.8,", "8.3,5.8,", "0.3,5.8,5.8"]
    );

    let path = temp_dir.path().join("delta.csv");
    let mut log = open(&path, &THREE, true);
    append_ref(&mut log, &THREE, 7);
    drop(log);
    assert_eq!(
        file_lines(&path)[2..],
        ["5.8,n,6.8", "n,,7.8", "6.8,0.8,", "8.3,,6.8", ",5.8,n", ",,", "0.3,,5.8"]
    );
}

#[test]
fn test_append_five_labels() {
    let temp_dir = tempdir().unwrap();

    let path = temp_dir.path().join("abs.csv");
    let mut log = open(&path, &FIVE, false);
    append_ref(&mut log, &FIVE, 7);
    drop(log);
    assert_eq!(
        file_lines(&path)[2..],
        [
            "5.8,,6.8,,",
            ",,7.8,,",
            "6.8,0.8,7.8,,",
            "8.3,0.8,6.8,1.3,1.8",
            "8.3,5.8,,1.3,",
            "8.3,5.8,,1.3,",
            "0.3,5.8,5.8,9.8,9.3",
        ]
    );

    let path = temp_dir.path().join("delta.csv");
    let mut log = open(&path, &FIVE, true);
    append_ref(&mut log, &FIVE, 7);
    drop(log);
    assert_eq!(
        file_lines(&path)[2..],
        [
            "5.8,n,6.8,n,n",
            "n,,7.8,,",
            "6.8,0.8,,,",
            "8.3,,6.8,1.3,1.8",
            ",5.8,n,,n",
            ",,,,",
            "0.3,,5.8,9.8,9.3",
        ]
    );
}

#[test]
fn test_reopen_delta_restarts_encoding() {
    let temp_dir = tempdir().unwrap();
    let path = temp_dir.path().join("reopen.csv");

    let mut log = open(&path, &FIVE, true);
    append_ref(&mut log, &FIVE, 7);
    drop(log);

    let mut log = open(&path, &FIVE, true);
    append_ref(&mut log, &FIVE, 5);
    drop(log);

    let lines = file_lines(&path);
    assert_eq!(lines.len(), 2 + 12);
    assert_eq!(
        lines[9..],
        ["5.8,n,6.8,n,n", "n,,7.8,,", "6.8,0.8,,,", "8.3,,6.8,1.3,1.8", ",5.8,n,,n"]
    );
}

#[test]
fn test_reopen_with_label_subset() {
    let temp_dir = tempdir().unwrap();

    let path = temp_dir.path().join("abs.csv");
    let mut log = open(&path, &FIVE, false);
    append_ref(&mut log, &FIVE, 7);
    drop(log);

    let subset = ["sens1", "sens3"];
    let mut log = open(&path, &subset, false);
    assert_eq!(log.labels(), labels(&FIVE).as_slice());
    append_ref(&mut log, &subset, 5);
    drop(log);

    let lines = file_lines(&path);
    assert_eq!(lines[1], FIVE.join(","));
    assert_eq!(lines[9..], [",5.8,,,", ",,,,", ",6.8,,0.8,", ",8.3,,0.8,", ",8.3,,5.8,"]);

    let path = temp_dir.path().join("delta.csv");
    let mut log = open(&path, &FIVE, true);
    append_ref(&mut log, &FIVE, 7);
    drop(log);

    let mut log = open(&path, &subset, true);
    append_ref(&mut log, &subset, 5);
    drop(log);

    assert_eq!(
        file_lines(&path)[9..],
        ["n,5.8,n,n,n", ",n,,,", ",6.8,,0.8,", ",8.3,,,", ",,,5.8,"]
    );
}

#[test]
fn test_reopen_with_label_extension() {
    let temp_dir = tempdir().unwrap();
    let path = temp_dir.path().join("extend.csv");

    let mut log = open(&path, &THREE, true);
    append_ref(&mut log, &THREE, 7);
    let data_offset = log.data_offset();
    drop(log);

    let mut log = open(&path, &FIVE, true);
    assert_eq!(log.labels(), labels(&FIVE).as_slice());
    assert_eq!(log.data_offset(), data_offset);
    append_ref(&mut log, &FIVE, 5);
    drop(log);

    let lines = file_lines(&path);
    assert_eq!(lines[0], "logdbcsv,version=1.0,delta=1");
    assert_eq!(lines[1], FIVE.join(","));
    assert_eq!(
        lines[2..],
        [
            "5.8,n,6.8",
            "n,,7.8",
            "6.8,0.8,",
            "8.3,,6.8",
            ",5.8,n",
            ",,",
            "0.3,,5.8",
            "5.8,n,6.8,n,n",
            "n,,7.8,,",
            "6.8,0.8,,,",
            "8.3,,6.8,1.3,1.8",
            ",5.8,n,,n",
        ]
    );

    // Old records restore with NaN for the labels added later
    let columns = restore(&path, &FIVE, true);
    assert_eq!(columns.len(), 12);
    assert_eq!(rows(&columns)[6], "0.3, 5.8, 5.8, nan, nan");
    assert_eq!(rows(&columns)[10], "8.3, 0.8, 6.8, 1.3, 1.8");
}

#[test]
fn test_missing_value_line() {
    let temp_dir = tempdir().unwrap();
    let path = temp_dir.path().join("missing.csv");
    fs::write(
        &path,
        "logdbcsv,version=1.0,delta=0\nTime,sens0,sens1,sens2\n1590994498,,1.4,\n",
    )
    .unwrap();

    let columns = restore(&path, &["Time", "sens0", "sens1", "sens2"], false);
    assert_eq!(columns.len(), 1);
    assert_eq!(columns.value("Time", 0), Some(1_590_994_498.0));
    assert!(columns.value("sens0", 0).unwrap().is_nan());
    assert_eq!(columns.value("sens1", 0), Some(1.4));
    assert!(columns.value("sens2", 0).unwrap().is_nan());
}

#[test]
fn test_short_lines_and_degenerate_lines() {
    let temp_dir = tempdir().unwrap();
    let path = temp_dir.path().join("short.csv");
    fs::write(
        &path,
        "logdbcsv,version=1.0,delta=0\nsens0,sens1,sens2\n1,2\n\n7\n3,4,5\n",
    )
    .unwrap();

    // "7" has a single field and is skipped; "1,2" lacks its last field
    let columns = restore(&path, &THREE, false);
    assert_eq!(rows(&columns), vec!["1, 2, nan", "3, 4, 5"]);
}

#[test]
fn test_too_many_fields_is_fatal() {
    let temp_dir = tempdir().unwrap();
    let path = temp_dir.path().join("wide.csv");
    fs::write(&path, "logdbcsv,version=1.0,delta=0\nsens0,sens1\n1,2\n1,2,3\n4,5\n").unwrap();

    let mut log = open(&path, &["sens0", "sens1"], false);
    let mut columns = ColumnStore::new(log.labels().to_vec());
    let err = log.restore(&mut columns, None).unwrap_err();
    assert!(matches!(
        err,
        LogDbError::Restore(RestoreError::TooManyFields { fields: 3, labels: 2, .. })
    ));
}

#[test]
fn test_corrupt_file_is_renamed_not_deleted() {
    let temp_dir = tempdir().unwrap();
    let path = temp_dir.path().join("corrupt.csv");
    let original = "logdbcsv,version=1.0\nsens0\n1\n2\n";
    fs::write(&path, original).unwrap();

    let mut log = open(&path, &THREE, false);
    append_ref(&mut log, &THREE, 1);
    drop(log);

    assert_eq!(
        file_lines(&path),
        vec!["logdbcsv,version=1.0,delta=0", "sens0,sens1,sens2", "5.8,,6.8"]
    );

    let backups: Vec<String> = fs::read_dir(temp_dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().to_string())
        .filter(|name| name.starts_with("corrupt.csv") && name != "corrupt.csv")
        .collect();
    assert_eq!(backups.len(), 1);

    // Suffix is a local timestamp: YYYYmmdd_HHMMSS
    let suffix = &backups[0]["corrupt.csv".len()..];
    assert_eq!(suffix.len(), 15);
    assert_eq!(&suffix[8..9], "_");
    assert_eq!(fs::read_to_string(temp_dir.path().join(&backups[0])).unwrap(), original);
}

#[test]
fn test_restore_chunk_size_invariance() {
    let temp_dir = tempdir().unwrap();
    let path = temp_dir.path().join("chunks.csv");

    let mut log = open(&path, &FIVE, true);
    for _ in 0..20 {
        append_ref(&mut log, &FIVE, REF_DATA.len());
    }
    drop(log);

    let mut reference: Option<Vec<Vec<u64>>> = None;
    for chunk_size in [1, 10, 1_000, 100_000] {
        for max_records in [None, Some(1), Some(17), Some(250)] {
            let mut log = open(&path, &FIVE, true);
            log.set_restore_chunk_size(chunk_size);
            let mut columns = ColumnStore::new(log.labels().to_vec());
            let restored = log.restore(&mut columns, max_records).unwrap();
            assert_eq!(restored, max_records.unwrap_or(300).min(300));

            let bits: Vec<Vec<u64>> = FIVE
                .iter()
                .map(|label| columns.column(label).unwrap().iter().map(|v| v.to_bits()).collect())
                .collect();

            if max_records.is_none() {
                match &reference {
                    Some(reference) => assert_eq!(&bits, reference, "chunk size {chunk_size}"),
                    None => reference = Some(bits),
                }
            }
        }
    }
}
