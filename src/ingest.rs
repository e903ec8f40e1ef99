//! Ingestion adapter: turns uploaded CSV or spreadsheet bytes into a
//! [`Table`] holding native values.
//!
//! Delimited text is typed per column (integer, then float, then
//! date/date-time, otherwise text). Spreadsheets keep their native cell
//! types; whole-number float columns become integers and text columns that
//! hold only dates are parsed, so both formats hand the normalizer the same
//! shapes. [`IngestCache`] memoizes results by the SHA-256 of the input
//! bytes.

use std::{
    collections::HashMap,
    fs,
    io::Cursor,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow, bail};
use calamine::{Data, Reader, open_workbook_auto_from_rs};
use encoding_rs::{Encoding, UTF_8};
use log::{debug, info, warn};
use sha2::{Digest, Sha256};

use crate::{
    data::{Value, parse_temporal},
    dataset::{Column, Table},
    io_utils,
};

const SPREADSHEET_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xlsb", "xls", "ods"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Delimited,
    Spreadsheet,
}

impl SourceFormat {
    pub fn detect(path: &Path) -> Self {
        match io_utils::extension(path) {
            Some(ext) if SPREADSHEET_EXTENSIONS.contains(&ext.as_str()) => {
                SourceFormat::Spreadsheet
            }
            _ => SourceFormat::Delimited,
        }
    }

    fn tag(&self) -> &'static str {
        match self {
            SourceFormat::Delimited => "delimited",
            SourceFormat::Spreadsheet => "spreadsheet",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct IngestOptions {
    pub delimiter: Option<u8>,
    pub encoding: &'static Encoding,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            delimiter: None,
            encoding: UTF_8,
        }
    }
}

pub fn read_table(source: &Path, bytes: &[u8], options: &IngestOptions) -> Result<Table> {
    let table = match SourceFormat::detect(source) {
        SourceFormat::Delimited => {
            let delimiter = io_utils::resolve_input_delimiter(source, options.delimiter);
            debug!(
                "Reading {:?} as delimited text (delimiter '{}', encoding {})",
                source,
                io_utils::printable_delimiter(delimiter),
                options.encoding.name()
            );
            read_delimited(bytes, delimiter, options.encoding)
        }
        SourceFormat::Spreadsheet => {
            debug!("Reading {:?} as a spreadsheet", source);
            read_spreadsheet(bytes)
        }
    }
    .with_context(|| format!("Reading {source:?}"))?;
    info!(
        "Ingested {} row(s) across {} column(s) from {:?}",
        table.row_count(),
        table.column_count(),
        source
    );
    Ok(table)
}

pub fn load_path(path: &Path, options: &IngestOptions) -> Result<Table> {
    let bytes = fs::read(path).with_context(|| format!("Opening input file {path:?}"))?;
    read_table(path, &bytes, options)
}

fn read_delimited(bytes: &[u8], delimiter: u8, encoding: &'static Encoding) -> Result<Table> {
    let mut reader = io_utils::open_csv_reader(bytes, delimiter);
    let headers = io_utils::reader_headers(&mut reader, encoding)?;
    if headers.iter().all(|h| h.trim().is_empty()) {
        bail!("Input contains no header row");
    }
    let headers = fill_blank_headers(headers);
    let width = headers.len();

    let mut cells: Vec<Vec<Option<String>>> = vec![Vec::new(); width];
    for (idx, record) in reader.byte_records().enumerate() {
        let record = record.with_context(|| format!("Reading row {}", idx + 2))?;
        let decoded = io_utils::decode_record(&record, encoding)
            .with_context(|| format!("Decoding row {}", idx + 2))?;
        if decoded.len() > width {
            bail!(
                "Row {} has {} field(s) but the header defines {}",
                idx + 2,
                decoded.len(),
                width
            );
        }
        let mut fields = decoded.into_iter();
        for column in cells.iter_mut() {
            let field = fields.next().filter(|f| !f.trim().is_empty());
            column.push(field);
        }
    }

    let columns = headers
        .into_iter()
        .zip(cells)
        .map(|(label, column)| Column::new(label, type_text_column(column)))
        .collect();
    Table::new(columns)
}

/// Types a column of raw text cells. Every present cell must agree for a
/// column to leave text.
fn type_text_column(cells: Vec<Option<String>>) -> Vec<Value> {
    let present = || cells.iter().flatten().map(|s| s.trim());
    if present().next().is_none() {
        return vec![Value::Missing; cells.len()];
    }
    if present().all(|s| s.parse::<i64>().is_ok()) {
        return map_present(cells, |s| s.trim().parse().map(Value::Integer).ok());
    }
    if present().all(|s| s.parse::<f64>().is_ok()) {
        return map_present(cells, |s| s.trim().parse().map(Value::Float).ok());
    }
    if present().all(|s| parse_temporal(s).is_some()) {
        return map_present(cells, |s| parse_temporal(s).map(Value::DateTime));
    }
    cells
        .into_iter()
        .map(|cell| cell.map(Value::Text).unwrap_or(Value::Missing))
        .collect()
}

fn map_present<F>(cells: Vec<Option<String>>, parse: F) -> Vec<Value>
where
    F: Fn(&str) -> Option<Value>,
{
    cells
        .into_iter()
        .map(|cell| cell.and_then(|s| parse(&s)).unwrap_or(Value::Missing))
        .collect()
}

fn fill_blank_headers(headers: Vec<String>) -> Vec<String> {
    headers
        .into_iter()
        .enumerate()
        .map(|(idx, header)| {
            if header.trim().is_empty() {
                format!("Unnamed: {idx}")
            } else {
                header
            }
        })
        .collect()
}

fn read_spreadsheet(bytes: &[u8]) -> Result<Table> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
        .context("Opening spreadsheet")?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| anyhow!("Spreadsheet contains no worksheet"))?
        .context("Reading first worksheet")?;

    let mut rows = range.rows();
    let header_row = rows
        .next()
        .ok_or_else(|| anyhow!("Worksheet is empty"))?;
    let headers = fill_blank_headers(header_row.iter().map(header_text).collect());
    if headers.iter().all(|h| h.starts_with("Unnamed: ")) {
        bail!("Worksheet contains no header row");
    }

    let body = rows
        .map(|row| row.iter().map(spreadsheet_value).collect::<Vec<_>>())
        .collect::<Vec<_>>();
    let table = Table::from_rows(headers, body)?;
    let columns = table
        .columns()
        .iter()
        .map(|c| Column::new(c.label.clone(), refine_spreadsheet_column(&c.values)))
        .collect();
    Table::new(columns)
}

fn header_text(cell: &Data) -> String {
    match cell {
        Data::String(s) => s.trim().to_string(),
        Data::Empty => String::new(),
        other => other.to_string(),
    }
}

fn spreadsheet_value(cell: &Data) -> Value {
    match cell {
        Data::Int(i) => Value::Integer(*i),
        Data::Float(f) => Value::Float(*f),
        Data::Bool(b) => Value::Boolean(*b),
        Data::String(s) if s.trim().is_empty() => Value::Missing,
        Data::String(s) => Value::Text(s.clone()),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(Value::DateTime)
            .unwrap_or(Value::Missing),
        Data::DateTimeIso(s) => parse_temporal(s)
            .map(Value::DateTime)
            .unwrap_or_else(|| Value::Text(s.clone())),
        Data::DurationIso(s) => Value::Text(s.clone()),
        Data::Error(_) | Data::Empty => Value::Missing,
    }
}

/// Spreadsheets store every number as a float; columns of whole numbers
/// are narrowed to integers, and text columns holding only dates are
/// parsed.
fn refine_spreadsheet_column(values: &[Value]) -> Vec<Value> {
    let present = || values.iter().filter(|v| !v.is_missing());
    if present().next().is_none() {
        return values.to_vec();
    }
    let whole_numbers = present().all(|v| match v {
        Value::Integer(_) => true,
        Value::Float(f) => f.is_finite() && f.fract() == 0.0 && f.abs() < 9.0e15,
        _ => false,
    });
    if whole_numbers {
        return values
            .iter()
            .map(|v| match v {
                Value::Float(f) => Value::Integer(*f as i64),
                other => other.clone(),
            })
            .collect();
    }
    let all_dates = present().all(|v| match v {
        Value::Text(s) => parse_temporal(s).is_some(),
        Value::DateTime(_) => true,
        _ => false,
    });
    if all_dates {
        return values
            .iter()
            .map(|v| match v {
                Value::Text(s) => parse_temporal(s)
                    .map(Value::DateTime)
                    .unwrap_or(Value::Missing),
                other => other.clone(),
            })
            .collect();
    }
    values.to_vec()
}

/// Content-addressed memo of ingested tables.
///
/// Keys are the hex SHA-256 of the source format, ingestion options, and
/// input bytes. Entries live in memory and, when a directory is configured,
/// as `<key>.json` files that survive between runs.
#[derive(Debug, Default)]
pub struct IngestCache {
    memory: HashMap<String, Table>,
    dir: Option<PathBuf>,
    hits: usize,
    misses: usize,
}

impl IngestCache {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn with_dir(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir).with_context(|| format!("Creating cache directory {dir:?}"))?;
        Ok(Self {
            dir: Some(dir.to_path_buf()),
            ..Self::default()
        })
    }

    pub fn key(format: SourceFormat, bytes: &[u8], options: &IngestOptions) -> String {
        let mut hasher = Sha256::new();
        hasher.update(format.tag().as_bytes());
        hasher.update([options.delimiter.unwrap_or(0)]);
        hasher.update(options.encoding.name().as_bytes());
        hasher.update(bytes);
        format!("{:x}", hasher.finalize())
    }

    pub fn hits(&self) -> usize {
        self.hits
    }

    pub fn misses(&self) -> usize {
        self.misses
    }

    pub fn load(&mut self, path: &Path, options: &IngestOptions) -> Result<Table> {
        let bytes = fs::read(path).with_context(|| format!("Opening input file {path:?}"))?;
        self.get_or_ingest(path, &bytes, options)
    }

    pub fn get_or_ingest(
        &mut self,
        source: &Path,
        bytes: &[u8],
        options: &IngestOptions,
    ) -> Result<Table> {
        let delimiter = match SourceFormat::detect(source) {
            SourceFormat::Delimited => {
                Some(io_utils::resolve_input_delimiter(source, options.delimiter))
            }
            SourceFormat::Spreadsheet => None,
        };
        let keyed_options = IngestOptions {
            delimiter,
            encoding: options.encoding,
        };
        let key = Self::key(SourceFormat::detect(source), bytes, &keyed_options);

        if let Some(table) = self.memory.get(&key) {
            self.hits += 1;
            debug!("Ingest cache hit for {:?} ({key})", source);
            return Ok(table.clone());
        }
        if let Some(table) = self.read_entry(&key) {
            self.hits += 1;
            debug!("Ingest cache file hit for {:?} ({key})", source);
            self.memory.insert(key, table.clone());
            return Ok(table);
        }

        self.misses += 1;
        let table = read_table(source, bytes, options)?;
        self.write_entry(&key, &table);
        self.memory.insert(key, table.clone());
        Ok(table)
    }

    fn entry_path(&self, key: &str) -> Option<PathBuf> {
        self.dir.as_ref().map(|dir| dir.join(format!("{key}.json")))
    }

    fn read_entry(&self, key: &str) -> Option<Table> {
        let path = self.entry_path(key)?;
        let contents = fs::read(&path).ok()?;
        match serde_json::from_slice(&contents) {
            Ok(table) => Some(table),
            Err(err) => {
                warn!("Ignoring unreadable cache entry {:?}: {err}", path);
                None
            }
        }
    }

    fn write_entry(&self, key: &str, table: &Table) {
        let Some(path) = self.entry_path(key) else {
            return;
        };
        let result = serde_json::to_vec(table)
            .map_err(anyhow::Error::from)
            .and_then(|bytes| fs::write(&path, bytes).map_err(anyhow::Error::from));
        if let Err(err) = result {
            warn!("Failed to write cache entry {:?}: {err}", path);
        }
    }
}
