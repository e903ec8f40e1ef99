//! Column-ordered in-memory table.
//!
//! A [`Table`] is an ordered list of labeled columns that all share one row
//! count. Ingestion builds it, the normalizer derives new tables from it,
//! and persistence writes it back out. Operations return new tables rather
//! than mutating the caller's copy.

use std::cmp::Ordering;

use anyhow::{Result, anyhow, ensure};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::data::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub label: String,
    pub values: Vec<Value>,
}

impl Column {
    pub fn new(label: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            label: label.into(),
            values,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    columns: Vec<Column>,
    row_count: usize,
}

impl Table {
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        let row_count = columns.first().map(|c| c.values.len()).unwrap_or(0);
        for column in &columns {
            ensure!(
                column.values.len() == row_count,
                "Column '{}' holds {} value(s) but the table has {} row(s)",
                column.label,
                column.values.len(),
                row_count
            );
        }
        Ok(Self { columns, row_count })
    }

    /// Builds a table from a header row and row-major cells. Short rows are
    /// padded with [`Value::Missing`]; long rows are rejected.
    pub fn from_rows(headers: Vec<String>, rows: Vec<Vec<Value>>) -> Result<Self> {
        let width = headers.len();
        let mut columns: Vec<Vec<Value>> = vec![Vec::with_capacity(rows.len()); width];
        for (row_idx, row) in rows.into_iter().enumerate() {
            ensure!(
                row.len() <= width,
                "Row {} has {} field(s) but the header defines {}",
                row_idx + 1,
                row.len(),
                width
            );
            let filled = row.len();
            for (idx, value) in row.into_iter().enumerate() {
                columns[idx].push(value);
            }
            for column in columns.iter_mut().skip(filled) {
                column.push(Value::Missing);
            }
        }
        let columns = headers
            .into_iter()
            .zip(columns)
            .map(|(label, values)| Column::new(label, values))
            .collect();
        Table::new(columns)
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn labels(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.label.clone()).collect()
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column_index(&self, label: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.label == label)
    }

    pub fn column(&self, label: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.label == label)
    }

    pub fn require_column(&self, label: &str) -> Result<&Column> {
        self.column(label).ok_or_else(|| {
            anyhow!(
                "Column '{label}' not found. Available columns: {}",
                self.columns.iter().map(|c| c.label.as_str()).join(", ")
            )
        })
    }

    pub fn relabel<F>(&self, mut f: F) -> Table
    where
        F: FnMut(&str) -> String,
    {
        let columns = self
            .columns
            .iter()
            .map(|c| Column::new(f(&c.label), c.values.clone()))
            .collect();
        Table {
            columns,
            row_count: self.row_count,
        }
    }

    pub(crate) fn replace_values(&mut self, index: usize, values: Vec<Value>) {
        debug_assert_eq!(values.len(), self.row_count);
        self.columns[index].values = values;
    }

    /// Replaces the column with the same label, or appends a new one.
    pub fn upsert_column(&mut self, column: Column) -> Result<()> {
        ensure!(
            self.columns.is_empty() || column.values.len() == self.row_count,
            "Column '{}' holds {} value(s) but the table has {} row(s)",
            column.label,
            column.values.len(),
            self.row_count
        );
        if self.columns.is_empty() {
            self.row_count = column.values.len();
        }
        match self.column_index(&column.label) {
            Some(idx) => self.columns[idx] = column,
            None => self.columns.push(column),
        }
        Ok(())
    }

    pub fn select_rows(&self, indices: &[usize]) -> Table {
        let columns = self
            .columns
            .iter()
            .map(|c| {
                Column::new(
                    c.label.clone(),
                    indices.iter().map(|&i| c.values[i].clone()).collect(),
                )
            })
            .collect();
        Table {
            columns,
            row_count: indices.len(),
        }
    }

    pub fn head(&self, rows: usize) -> Table {
        let indices = (0..self.row_count.min(rows)).collect::<Vec<_>>();
        self.select_rows(&indices)
    }

    pub fn project(&self, labels: &[&str]) -> Result<Table> {
        let columns = labels
            .iter()
            .map(|label| self.require_column(label).cloned())
            .collect::<Result<Vec<_>>>()?;
        Ok(Table {
            columns,
            row_count: self.row_count,
        })
    }

    pub fn sorted(&self, directives: &[SortDirective]) -> Result<Table> {
        if directives.is_empty() {
            return Ok(self.clone());
        }
        let keys = directives
            .iter()
            .map(|d| {
                self.column_index(&d.column)
                    .map(|idx| (idx, d.ascending))
                    .ok_or_else(|| anyhow!("Sort column '{}' not found", d.column))
            })
            .collect::<Result<Vec<_>>>()?;
        let order = (0..self.row_count)
            .sorted_by(|&a, &b| {
                keys.iter()
                    .map(|&(col, ascending)| {
                        let values = &self.columns[col].values;
                        let ordering = values[a].sort_cmp(&values[b]);
                        if ascending {
                            ordering
                        } else {
                            ordering.reverse()
                        }
                    })
                    .find(|o| *o != Ordering::Equal)
                    .unwrap_or(Ordering::Equal)
            })
            .collect::<Vec<_>>();
        Ok(self.select_rows(&order))
    }

    pub fn display_rows(&self) -> Vec<Vec<String>> {
        (0..self.row_count)
            .map(|row| {
                self.columns
                    .iter()
                    .map(|c| c.values[row].as_display())
                    .collect()
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortDirective {
    pub column: String,
    pub ascending: bool,
}

impl SortDirective {
    /// Parses `column[:asc|desc]`. A trailing `:<word>` that is not a
    /// direction stays part of the column label.
    pub fn parse(spec: &str) -> Result<Self> {
        let (column, ascending) = match spec.rsplit_once(':') {
            Some((column, direction)) => match direction.trim().to_ascii_lowercase().as_str() {
                "asc" => (column, true),
                "desc" => (column, false),
                _ => (spec, true),
            },
            None => (spec, true),
        };
        let column = Some(column.trim())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| anyhow!("Sort directive is missing a column"))?;
        Ok(SortDirective {
            column: column.to_string(),
            ascending,
        })
    }
}
