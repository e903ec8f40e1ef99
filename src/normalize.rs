//! Tabular normalizer: column label cleanup, column classification, retype
//! option sets, and retype application.
//!
//! Everything here is pure. A retype pass never fails as a whole: date-time
//! targets turn unparseable cells into [`Value::Missing`], and any other
//! target either converts a column completely or leaves it untouched and
//! records a [`ConversionFailure`].

use std::{fmt, str::FromStr};

use anyhow::anyhow;
use log::{error, info};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    data::{Value, parse_temporal},
    dataset::Table,
    retype_map::RetypeMap,
};

/// Runtime classification of a column's stored values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Integer,
    Float,
    DateTime,
    #[serde(rename = "string")]
    Text,
}

const TEXT_OPTIONS: &[ColumnKind] = &[
    ColumnKind::Integer,
    ColumnKind::Float,
    ColumnKind::DateTime,
    ColumnKind::Text,
];
const NUMERIC_OPTIONS: &[ColumnKind] = &[ColumnKind::Integer, ColumnKind::Float, ColumnKind::Text];
const DATETIME_OPTIONS: &[ColumnKind] = &[ColumnKind::DateTime, ColumnKind::Text];
const FALLBACK_OPTIONS: &[ColumnKind] = &[ColumnKind::Text];

impl ColumnKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnKind::Integer => "integer",
            ColumnKind::Float => "float",
            ColumnKind::DateTime => "datetime",
            ColumnKind::Text => "string",
        }
    }

    pub fn variants() -> &'static [&'static str] {
        &["integer", "float", "datetime", "string"]
    }
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ColumnKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "integer" | "int" | "int64" => Ok(ColumnKind::Integer),
            "float" | "double" | "float64" => Ok(ColumnKind::Float),
            "datetime" | "date-time" | "date" | "timestamp" => Ok(ColumnKind::DateTime),
            "string" | "str" | "text" | "object" => Ok(ColumnKind::Text),
            other if other.starts_with("datetime64") => Ok(ColumnKind::DateTime),
            _ => Err(anyhow!(
                "Unknown column type '{value}'. Supported types: {}",
                ColumnKind::variants().join(", ")
            )),
        }
    }
}

/// Replaces spaces and slashes with `_` and deletes parentheses.
pub fn normalize_label(label: &str) -> String {
    label
        .chars()
        .filter_map(|c| match c {
            ' ' | '/' => Some('_'),
            '(' | ')' => None,
            other => Some(other),
        })
        .collect()
}

/// Returns a copy of `table` with every label passed through
/// [`normalize_label`]. Collisions are left as they are.
pub fn normalize_labels(table: &Table) -> Table {
    table.relabel(normalize_label)
}

pub fn classify_column(values: &[Value]) -> ColumnKind {
    let mut integers = 0usize;
    let mut floats = 0usize;
    let mut datetimes = 0usize;
    for value in values {
        match value {
            Value::Missing => {}
            Value::Integer(_) => integers += 1,
            Value::Float(_) => floats += 1,
            Value::DateTime(_) => datetimes += 1,
            Value::Boolean(_) | Value::Text(_) => return ColumnKind::Text,
        }
    }
    match (integers, floats, datetimes) {
        (0, 0, 0) => ColumnKind::Text,
        (_, 0, 0) => ColumnKind::Integer,
        (_, _, 0) => ColumnKind::Float,
        (0, 0, _) => ColumnKind::DateTime,
        _ => ColumnKind::Text,
    }
}

/// Legal retype targets for a column currently classified as `kind`, in
/// presentation order.
pub fn options_for(kind: ColumnKind) -> &'static [ColumnKind] {
    match kind {
        ColumnKind::Text => TEXT_OPTIONS,
        ColumnKind::Integer | ColumnKind::Float => NUMERIC_OPTIONS,
        ColumnKind::DateTime => DATETIME_OPTIONS,
    }
}

/// Option set for a free-form dtype token such as `int64` or `bool`.
/// Tokens that do not name one of the four kinds only allow text.
pub fn options_for_token(token: &str) -> &'static [ColumnKind] {
    match ColumnKind::from_str(token) {
        Ok(kind) => options_for(kind),
        Err(_) => FALLBACK_OPTIONS,
    }
}

/// Index of `current` within `options`, the entry a selector starts on.
pub fn default_selection(current: ColumnKind, options: &[ColumnKind]) -> Option<usize> {
    options.iter().position(|option| *option == current)
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoercionError {
    #[error("column not found in table")]
    UnknownColumn,
    #[error("row {row}: cannot parse '{value}' as {target}")]
    Unparseable {
        row: usize,
        value: String,
        target: ColumnKind,
    },
    #[error("row {row}: value {value} is out of range for {target}")]
    OutOfRange {
        row: usize,
        value: String,
        target: ColumnKind,
    },
    #[error("row {row}: cannot convert {from} value '{value}' to {target}")]
    Unsupported {
        row: usize,
        from: &'static str,
        value: String,
        target: ColumnKind,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConversionFailure {
    pub column: String,
    pub target: ColumnKind,
    pub reason: CoercionError,
}

impl fmt::Display for ConversionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Error converting column {} to {}: {}",
            self.column, self.target, self.reason
        )
    }
}

#[derive(Debug, Clone)]
pub struct RetypeOutcome {
    pub table: Table,
    pub failures: Vec<ConversionFailure>,
}

impl RetypeOutcome {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

pub fn apply_retype(table: &Table, retype_map: &RetypeMap) -> RetypeOutcome {
    let mut output = table.clone();
    let mut failures = Vec::new();

    for (label, target) in retype_map.iter() {
        // Colliding labels name several columns; each converts on its own.
        let indices = output
            .columns()
            .iter()
            .enumerate()
            .filter(|(_, column)| column.label == label)
            .map(|(idx, _)| idx)
            .collect::<Vec<_>>();
        if indices.is_empty() {
            let failure = ConversionFailure {
                column: label.to_string(),
                target,
                reason: CoercionError::UnknownColumn,
            };
            error!("{failure}");
            failures.push(failure);
            continue;
        }
        for index in indices {
            let current = &output.columns()[index].values;
            match coerce_column(current, target) {
                Ok(values) => {
                    output.replace_values(index, values);
                    info!("Converted column {label} to {target}");
                }
                Err(reason) => {
                    let failure = ConversionFailure {
                        column: label.to_string(),
                        target,
                        reason,
                    };
                    error!("{failure}");
                    failures.push(failure);
                }
            }
        }
    }

    RetypeOutcome {
        table: output,
        failures,
    }
}

fn coerce_column(values: &[Value], target: ColumnKind) -> Result<Vec<Value>, CoercionError> {
    match target {
        ColumnKind::DateTime => Ok(values.iter().map(coerce_datetime).collect()),
        _ => values
            .iter()
            .enumerate()
            .map(|(idx, value)| coerce_value(value, target, idx + 1))
            .collect(),
    }
}

fn coerce_datetime(value: &Value) -> Value {
    match value {
        Value::DateTime(dt) => Value::DateTime(*dt),
        Value::Text(text) => parse_temporal(text)
            .map(Value::DateTime)
            .unwrap_or(Value::Missing),
        _ => Value::Missing,
    }
}

fn coerce_value(value: &Value, target: ColumnKind, row: usize) -> Result<Value, CoercionError> {
    let unparseable = |raw: &str| CoercionError::Unparseable {
        row,
        value: raw.to_string(),
        target,
    };
    match (value, target) {
        (Value::Missing, _) => Ok(Value::Missing),
        (_, ColumnKind::Text) => Ok(Value::Text(value.as_display())),
        (Value::Integer(i), ColumnKind::Integer) => Ok(Value::Integer(*i)),
        (Value::Integer(i), ColumnKind::Float) => Ok(Value::Float(*i as f64)),
        (Value::Float(f), ColumnKind::Float) => Ok(Value::Float(*f)),
        (Value::Float(f), ColumnKind::Integer) => float_to_integer(*f).ok_or_else(|| {
            CoercionError::OutOfRange {
                row,
                value: f.to_string(),
                target,
            }
        }),
        (Value::Boolean(b), ColumnKind::Integer) => Ok(Value::Integer(i64::from(*b))),
        (Value::Boolean(b), ColumnKind::Float) => Ok(Value::Float(if *b { 1.0 } else { 0.0 })),
        (Value::Text(text), ColumnKind::Integer) => text
            .trim()
            .parse::<i64>()
            .map(Value::Integer)
            .map_err(|_| unparseable(text)),
        (Value::Text(text), ColumnKind::Float) => text
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| unparseable(text)),
        (_, ColumnKind::DateTime) => Ok(coerce_datetime(value)),
        (Value::DateTime(_), _) => Err(CoercionError::Unsupported {
            row,
            from: "datetime",
            value: value.as_display(),
            target,
        }),
    }
}

fn float_to_integer(value: f64) -> Option<Value> {
    // i64::MAX as f64 rounds up to 2^63, so the upper bound is exclusive.
    if value.is_finite() && value >= i64::MIN as f64 && value < i64::MAX as f64 {
        Some(Value::Integer(value.trunc() as i64))
    } else {
        None
    }
}
