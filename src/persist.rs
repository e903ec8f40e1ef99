//! Persistence adapter: timestamped dataset files and saved-dataset lookup.
//!
//! Saved files follow `<dataset-name>_<YYYYMMDD_HHMMSS>.<ext>`. Downstream
//! tooling picks up `trade_performance_dataset_cleaned_*.xlsx` and
//! `trade_performance_dataset_sorted_*.csv`, so the names are part of the
//! external contract. Timestamps come from an injected [`Clock`].

use std::{
    fs,
    path::{Path, PathBuf},
    sync::LazyLock,
};

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime};
use encoding_rs::Encoding;
use log::{debug, info};
use regex::Regex;
use rust_xlsxwriter::{Format, Workbook};

use crate::{data::Value, dataset::Table, io_utils};

pub const CLEANED_DATASET: &str = "trade_performance_dataset_cleaned";
pub const SORTED_DATASET: &str = "trade_performance_dataset_sorted";
pub const PREPARATION_LOG: &str = "trade_data_preparation_log";
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

const MILLIS_PER_DAY: f64 = 86_400_000.0;
const XLSX_DATETIME_FORMAT: &str = "yyyy-mm-dd hh:mm:ss";

static SAVED_DATASET_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^trade_performance_dataset_cleaned_(\d{8}_\d{6})\.xlsx$")
        .unwrap_or_else(|err| panic!("invalid saved dataset pattern: {err}"))
});

pub trait Clock {
    fn now(&self) -> NaiveDateTime;
}

/// Local wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

pub fn timestamped_name(dataset: &str, at: &NaiveDateTime, extension: &str) -> String {
    format!("{dataset}_{}.{extension}", at.format(TIMESTAMP_FORMAT))
}

#[derive(Debug, Clone, Copy)]
pub struct CsvOutput {
    pub delimiter: u8,
    pub encoding: &'static Encoding,
}

pub fn write_csv(table: &Table, path: &Path, output: &CsvOutput) -> Result<()> {
    let mut writer = io_utils::open_csv_writer(path, output.delimiter, output.encoding)?;
    writer
        .write_record(table.labels())
        .with_context(|| format!("Writing headers to {path:?}"))?;
    for (idx, row) in table.display_rows().into_iter().enumerate() {
        writer
            .write_record(&row)
            .with_context(|| format!("Writing row {} to {path:?}", idx + 2))?;
    }
    writer
        .flush()
        .with_context(|| format!("Flushing {path:?}"))?;
    debug!("Wrote {} row(s) to {:?}", table.row_count(), path);
    Ok(())
}

pub fn write_xlsx(table: &Table, path: &Path) -> Result<()> {
    let mut workbook = Workbook::new();
    let header_format = Format::new().set_bold();
    let datetime_format = Format::new().set_num_format(XLSX_DATETIME_FORMAT);
    {
        let worksheet = workbook.add_worksheet();
        for (col_idx, column) in table.columns().iter().enumerate() {
            let col = u16::try_from(col_idx)
                .with_context(|| format!("Column {} exceeds the worksheet width", col_idx + 1))?;
            worksheet
                .write_string_with_format(0, col, column.label.as_str(), &header_format)
                .with_context(|| format!("Writing header '{}'", column.label))?;
            for (row_idx, value) in column.values.iter().enumerate() {
                let row = u32::try_from(row_idx + 1)
                    .with_context(|| format!("Row {} exceeds the worksheet height", row_idx + 1))?;
                let written = match value {
                    Value::Missing => continue,
                    Value::Integer(i) => worksheet.write_number(row, col, *i as f64),
                    Value::Float(f) if !f.is_finite() => continue,
                    Value::Float(f) => worksheet.write_number(row, col, *f),
                    Value::Boolean(b) => worksheet.write_boolean(row, col, *b),
                    Value::Text(s) => worksheet.write_string(row, col, s.as_str()),
                    Value::DateTime(dt) => match excel_serial(dt) {
                        Some(serial) => {
                            worksheet.write_number_with_format(row, col, serial, &datetime_format)
                        }
                        None => continue,
                    },
                };
                written.with_context(|| {
                    format!("Writing row {} of column '{}'", row_idx + 2, column.label)
                })?;
            }
        }
    }
    workbook
        .save(path)
        .with_context(|| format!("Writing spreadsheet {path:?}"))?;
    debug!("Wrote {} row(s) to {:?}", table.row_count(), path);
    Ok(())
}

fn excel_serial(value: &NaiveDateTime) -> Option<f64> {
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_time(NaiveTime::MIN);
    Some((*value - epoch).num_milliseconds() as f64 / MILLIS_PER_DAY)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedPair {
    pub csv: PathBuf,
    pub xlsx: PathBuf,
}

/// Writes the cleaned CSV and XLSX pair under one timestamp.
pub fn save_cleaned(
    table: &Table,
    dir: &Path,
    clock: &dyn Clock,
    output: &CsvOutput,
) -> Result<SavedPair> {
    ensure_dir(dir)?;
    let at = clock.now();
    let pair = SavedPair {
        csv: dir.join(timestamped_name(CLEANED_DATASET, &at, "csv")),
        xlsx: dir.join(timestamped_name(CLEANED_DATASET, &at, "xlsx")),
    };
    write_csv(table, &pair.csv, output)?;
    write_xlsx(table, &pair.xlsx)?;
    info!(
        "Successfully saved cleaned dataset to {:?} and {:?}",
        pair.csv, pair.xlsx
    );
    Ok(pair)
}

pub fn save_sorted(
    table: &Table,
    dir: &Path,
    clock: &dyn Clock,
    output: &CsvOutput,
) -> Result<PathBuf> {
    ensure_dir(dir)?;
    let path = dir.join(timestamped_name(SORTED_DATASET, &clock.now(), "csv"));
    write_csv(table, &path, output)?;
    info!("Successfully saved sorted dataset to {:?}", path);
    Ok(path)
}

fn ensure_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("Creating output directory {dir:?}"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedDataset {
    pub path: PathBuf,
    pub saved_at: NaiveDateTime,
}

/// Cleaned spreadsheets in `dir`, oldest first.
pub fn find_saved_datasets(dir: &Path) -> Result<Vec<SavedDataset>> {
    let mut found = Vec::new();
    let entries = fs::read_dir(dir).with_context(|| format!("Listing directory {dir:?}"))?;
    for entry in entries {
        let entry = entry.with_context(|| format!("Listing directory {dir:?}"))?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        let Some(captures) = SAVED_DATASET_PATTERN.captures(name) else {
            continue;
        };
        let Ok(saved_at) = NaiveDateTime::parse_from_str(&captures[1], TIMESTAMP_FORMAT) else {
            debug!("Skipping {name}: timestamp is not a valid date");
            continue;
        };
        found.push(SavedDataset {
            path: entry.path(),
            saved_at,
        });
    }
    found.sort_by(|a, b| a.saved_at.cmp(&b.saved_at).then_with(|| a.path.cmp(&b.path)));
    Ok(found)
}

pub fn latest_saved_dataset(dir: &Path) -> Result<Option<SavedDataset>> {
    Ok(find_saved_datasets(dir)?.pop())
}

#[cfg(test)]
mod tests {
    use encoding_rs::UTF_8;
    use tempfile::tempdir;

    use super::*;
    use crate::{
        dataset::Column,
        ingest::{IngestOptions, load_path},
    };

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, s)
            .unwrap()
    }

    fn csv_output() -> CsvOutput {
        CsvOutput {
            delimiter: b',',
            encoding: UTF_8,
        }
    }

    fn sample() -> Table {
        Table::new(vec![
            Column::new(
                "Opened",
                vec![
                    Value::DateTime(at(2024, 1, 5, 9, 30, 0)),
                    Value::DateTime(at(2024, 1, 6, 0, 0, 0)),
                ],
            ),
            Column::new("Qty", vec![Value::Integer(10), Value::Missing]),
            Column::new("Profit_Loss", vec![Value::Float(12.5), Value::Float(-3.25)]),
            Column::new(
                "Symbol",
                vec![Value::Text("MSFT".into()), Value::Text("AAPL".into())],
            ),
        ])
        .unwrap()
    }

    #[test]
    fn timestamped_name_follows_contract() {
        assert_eq!(
            timestamped_name(CLEANED_DATASET, &at(2024, 3, 9, 7, 5, 1), "xlsx"),
            "trade_performance_dataset_cleaned_20240309_070501.xlsx"
        );
    }

    #[test]
    fn save_cleaned_writes_pair_with_shared_timestamp() {
        let dir = tempdir().expect("temp dir");
        let clock = FixedClock(at(2024, 3, 9, 7, 5, 1));
        let pair = save_cleaned(&sample(), dir.path(), &clock, &csv_output()).unwrap();
        assert_eq!(
            pair.csv.file_name().unwrap(),
            "trade_performance_dataset_cleaned_20240309_070501.csv"
        );
        assert!(pair.xlsx.exists());
        let contents = fs::read_to_string(&pair.csv).unwrap();
        assert_eq!(
            contents.lines().collect::<Vec<_>>(),
            vec![
                "Opened,Qty,Profit_Loss,Symbol",
                "2024-01-05 09:30:00,10,12.5,MSFT",
                "2024-01-06,,-3.25,AAPL",
            ]
        );
    }

    #[test]
    fn xlsx_round_trips_through_ingestion() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("roundtrip.xlsx");
        write_xlsx(&sample(), &path).unwrap();
        let table = load_path(&path, &IngestOptions::default()).unwrap();
        assert_eq!(table, sample());
    }

    #[test]
    fn find_saved_datasets_orders_by_timestamp() {
        let dir = tempdir().expect("temp dir");
        for name in [
            "trade_performance_dataset_cleaned_20240310_120000.xlsx",
            "trade_performance_dataset_cleaned_20240309_070501.xlsx",
            "trade_performance_dataset_cleaned_20240311_000000.csv",
            "trade_performance_dataset_sorted_20240312_000000.csv",
            "trade_performance_dataset_cleaned_20241399_000000.xlsx",
            "notes.txt",
        ] {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        let found = find_saved_datasets(dir.path()).unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].saved_at, at(2024, 3, 9, 7, 5, 1));
        let latest = latest_saved_dataset(dir.path()).unwrap().unwrap();
        assert_eq!(latest.saved_at, at(2024, 3, 10, 12, 0, 0));
    }

    #[test]
    fn latest_saved_dataset_is_none_for_empty_dir() {
        let dir = tempdir().expect("temp dir");
        assert!(latest_saved_dataset(dir.path()).unwrap().is_none());
    }
}
