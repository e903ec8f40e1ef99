use anyhow::{Context, Result};
use log::info;
use serde::Serialize;

use crate::{
    cli::InspectArgs,
    data::Value,
    dataset::Table,
    normalize::{ColumnKind, classify_column, default_selection, options_for_token},
    prepare, table,
};

/// Per-column classification and the retype choices offered for it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnReport {
    pub index: usize,
    pub column: String,
    pub dtype: &'static str,
    pub datatype: ColumnKind,
    pub options: Vec<ColumnKind>,
    pub selected: Option<usize>,
    pub missing: usize,
}

impl ColumnReport {
    /// Options joined with the pre-selected entry in brackets.
    pub fn options_display(&self) -> String {
        self.options
            .iter()
            .enumerate()
            .map(|(idx, kind)| {
                if Some(idx) == self.selected {
                    format!("[{kind}]")
                } else {
                    kind.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

pub fn column_report(table: &Table) -> Vec<ColumnReport> {
    table
        .columns()
        .iter()
        .enumerate()
        .map(|(index, column)| {
            let datatype = classify_column(&column.values);
            let dtype = dtype_token(&column.values, datatype);
            let options = options_for_token(dtype);
            ColumnReport {
                index: index + 1,
                column: column.label.clone(),
                dtype,
                datatype,
                options: options.to_vec(),
                selected: default_selection(datatype, options),
                missing: column.values.iter().filter(|v| v.is_missing()).count(),
            }
        })
        .collect()
}

/// Storage token for a column. Boolean-only columns report `bool`, which
/// only offers text; everything else reports its classification.
fn dtype_token(values: &[Value], datatype: ColumnKind) -> &'static str {
    let mut present = values.iter().filter(|v| !v.is_missing()).peekable();
    if present.peek().is_some() && present.all(|v| matches!(v, Value::Boolean(_))) {
        "bool"
    } else {
        datatype.as_str()
    }
}

pub fn execute(args: &InspectArgs) -> Result<()> {
    let loaded = prepare::load_normalized(&args.source)?;
    let report = column_report(&loaded);

    if args.json {
        let json =
            serde_json::to_string_pretty(&report).context("Serializing column report")?;
        println!("{json}");
        return Ok(());
    }

    let head = loaded.head(args.rows);
    table::print_table(&head.labels(), &head.display_rows());
    println!();
    let headers = ["#", "column", "datatype", "missing", "options"]
        .into_iter()
        .map(String::from)
        .collect::<Vec<_>>();
    let rows = report
        .iter()
        .map(|entry| {
            vec![
                entry.index.to_string(),
                entry.column.clone(),
                entry.datatype.to_string(),
                entry.missing.to_string(),
                entry.options_display(),
            ]
        })
        .collect::<Vec<_>>();
    table::print_table(&headers, &rows);
    info!(
        "Inspected {} column(s) over {} row(s)",
        report.len(),
        loaded.row_count()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::dataset::Column;

    #[test]
    fn column_report_marks_current_kind() {
        let opened = NaiveDate::from_ymd_opt(2024, 1, 5)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let table = Table::new(vec![
            Column::new("Opened", vec![Value::DateTime(opened), Value::Missing]),
            Column::new("Profit_Loss", vec![Value::Float(1.5), Value::Float(-2.0)]),
        ])
        .unwrap();
        let report = column_report(&table);
        assert_eq!(report[0].datatype, ColumnKind::DateTime);
        assert_eq!(report[0].missing, 1);
        assert_eq!(report[0].options_display(), "[datetime], string");
        assert_eq!(report[1].index, 2);
        assert_eq!(report[1].options_display(), "integer, [float], string");
    }

    #[test]
    fn boolean_columns_only_offer_text() {
        let table = Table::new(vec![Column::new(
            "Closed",
            vec![Value::Boolean(true), Value::Missing, Value::Boolean(false)],
        )])
        .unwrap();
        let report = column_report(&table);
        assert_eq!(report[0].dtype, "bool");
        assert_eq!(report[0].datatype, ColumnKind::Text);
        assert_eq!(report[0].options, vec![ColumnKind::Text]);
        assert_eq!(report[0].options_display(), "[string]");
    }
}
