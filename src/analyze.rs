//! Cumulative profit/loss series over a date range.

use std::path::PathBuf;

use anyhow::{Context, Result, anyhow, bail, ensure};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use log::info;

use crate::{
    cli::{AnalyzeArgs, DatasetsArgs},
    data::{Value, parse_naive_date},
    dataset::{Column, Table},
    io_utils,
    normalize::{ColumnKind, classify_column, normalize_label, normalize_labels},
    persist::{self, CsvOutput},
    prepare, table,
};

pub const DEFAULT_PROFIT_COLUMN: &str = "Profit_Loss";
pub const DEFAULT_DATE_COLUMN: &str = "Opened";
pub const CUMULATIVE_COLUMN: &str = "Cumulative_Profit_Loss";

/// Adds `target` as the running total of `source`. Missing cells stay
/// missing and do not reset the total.
pub fn cumulative_sum(table: &Table, source: &str, target: &str) -> Result<Table> {
    let column = table.require_column(source)?;
    match classify_column(&column.values) {
        ColumnKind::Integer | ColumnKind::Float => {}
        other => bail!("Column '{source}' must be numeric to accumulate, found {other}"),
    }
    let mut running = 0.0;
    let values = column
        .values
        .iter()
        .map(|value| match value.as_f64() {
            Some(v) => {
                running += v;
                Value::Float(running)
            }
            None => Value::Missing,
        })
        .collect();
    let mut output = table.clone();
    output.upsert_column(Column::new(target, values))?;
    Ok(output)
}

/// Earliest and latest date present in a date-time column.
pub fn date_bounds(table: &Table, column: &str) -> Result<Option<(NaiveDate, NaiveDate)>> {
    let values = &require_datetime_column(table, column)?.values;
    let mut dates = values.iter().filter_map(Value::as_datetime).map(|dt| dt.date());
    let Some(first) = dates.next() else {
        return Ok(None);
    };
    let bounds = dates.fold((first, first), |(lo, hi), d| (lo.min(d), hi.max(d)));
    Ok(Some(bounds))
}

/// Keeps rows dated within `[start, end]`, inclusive of both whole days.
pub fn filter_date_range(
    table: &Table,
    column: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Table> {
    ensure!(
        start <= end,
        "Start date {start} is after end date {end}"
    );
    let values = &require_datetime_column(table, column)?.values;
    let lower = start.and_time(NaiveTime::MIN);
    let upper = end
        .succ_opt()
        .map(|next| next.and_time(NaiveTime::MIN))
        .unwrap_or(NaiveDateTime::MAX);
    let keep = values
        .iter()
        .enumerate()
        .filter_map(|(idx, value)| {
            value
                .as_datetime()
                .filter(|dt| *dt >= lower && *dt < upper)
                .map(|_| idx)
        })
        .collect::<Vec<_>>();
    Ok(table.select_rows(&keep))
}

fn require_datetime_column<'a>(table: &'a Table, label: &str) -> Result<&'a Column> {
    let column = table.require_column(label)?;
    match classify_column(&column.values) {
        ColumnKind::DateTime => Ok(column),
        other => Err(anyhow!(
            "Column '{label}' must hold date-times, found {other}. Retype it to datetime first"
        )),
    }
}

#[derive(Debug, Clone)]
pub struct SeriesRequest<'a> {
    pub profit_column: &'a str,
    pub date_column: &'a str,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

#[derive(Debug, Clone)]
pub struct Series {
    pub table: Table,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Accumulates over the full table, then narrows to the requested range.
/// Missing bounds default to the column's earliest and latest dates.
pub fn cumulative_series(table: &Table, request: &SeriesRequest<'_>) -> Result<Option<Series>> {
    let accumulated = cumulative_sum(table, request.profit_column, CUMULATIVE_COLUMN)?;
    let Some((first, last)) = date_bounds(&accumulated, request.date_column)? else {
        return Ok(None);
    };
    let start = request.start.unwrap_or(first);
    let end = request.end.unwrap_or(last);
    let filtered = filter_date_range(&accumulated, request.date_column, start, end)?;
    let table = filtered.project(&[request.date_column, CUMULATIVE_COLUMN])?;
    Ok(Some(Series { table, start, end }))
}

pub fn execute(args: &AnalyzeArgs) -> Result<()> {
    let input = resolve_input(args)?;
    let options = prepare::ingest_options(args.delimiter, args.input_encoding.as_deref())?;
    let mut cache = prepare::open_cache(args.cache_dir.as_deref())?;
    let loaded = cache
        .load(&input, &options)
        .with_context(|| format!("Loading dataset {input:?}"))?;
    let loaded = normalize_labels(&loaded);
    info!("Loaded saved dataset from {:?}", input);

    let start = parse_optional_date(args.start.as_deref(), "--start")?;
    let end = parse_optional_date(args.end.as_deref(), "--end")?;
    let profit_column = normalize_label(&args.profit_column);
    let date_column = normalize_label(&args.date_column);
    let request = SeriesRequest {
        profit_column: &profit_column,
        date_column: &date_column,
        start,
        end,
    };
    let Some(series) = cumulative_series(&loaded, &request)? else {
        info!("Column '{date_column}' holds no dates; nothing to chart");
        return Ok(());
    };

    println!(
        "Cumulative Profit/Loss from {} to {}",
        series.start, series.end
    );
    table::print_table(&series.table.labels(), &series.table.display_rows());
    if let Some(output) = &args.output {
        let csv_output = CsvOutput {
            delimiter: io_utils::resolve_output_delimiter(output, None),
            encoding: encoding_rs::UTF_8,
        };
        persist::write_csv(&series.table, output, &csv_output)?;
        info!("Wrote cumulative series to {:?}", output);
    }
    info!(
        "Charted {} of {} trade(s)",
        series.table.row_count(),
        loaded.row_count()
    );
    Ok(())
}

fn resolve_input(args: &AnalyzeArgs) -> Result<PathBuf> {
    if let Some(input) = &args.input {
        return Ok(input.clone());
    }
    let dir = args.dir.clone().unwrap_or_else(|| PathBuf::from("."));
    persist::latest_saved_dataset(&dir)?
        .map(|saved| saved.path)
        .ok_or_else(|| anyhow!("No saved datasets found in {dir:?}"))
}

fn parse_optional_date(value: Option<&str>, flag: &str) -> Result<Option<NaiveDate>> {
    value
        .map(|raw| parse_naive_date(raw.trim()).with_context(|| format!("Parsing {flag}")))
        .transpose()
}

pub fn list_datasets(args: &DatasetsArgs) -> Result<()> {
    let saved = persist::find_saved_datasets(&args.dir)?;
    if saved.is_empty() {
        println!("No saved datasets found.");
        return Ok(());
    }
    let rows = saved
        .iter()
        .map(|entry| {
            vec![
                entry.saved_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                entry.path.display().to_string(),
            ]
        })
        .collect::<Vec<_>>();
    table::print_table(&["saved_at".to_string(), "path".to_string()], &rows);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32, h: u32) -> Value {
        Value::DateTime(
            NaiveDate::from_ymd_opt(2024, 1, d)
                .unwrap()
                .and_hms_opt(h, 0, 0)
                .unwrap(),
        )
    }

    fn trades() -> Table {
        Table::new(vec![
            Column::new("Opened", vec![day(5, 9), day(6, 15), day(7, 10), Value::Missing]),
            Column::new(
                "Profit_Loss",
                vec![
                    Value::Float(10.0),
                    Value::Missing,
                    Value::Float(-2.5),
                    Value::Integer(1),
                ],
            ),
        ])
        .unwrap()
    }

    #[test]
    fn cumulative_sum_skips_missing_without_resetting() {
        let table = cumulative_sum(&trades(), "Profit_Loss", CUMULATIVE_COLUMN).unwrap();
        assert_eq!(
            table.column(CUMULATIVE_COLUMN).unwrap().values,
            vec![
                Value::Float(10.0),
                Value::Missing,
                Value::Float(7.5),
                Value::Float(8.5)
            ]
        );
    }

    #[test]
    fn cumulative_sum_rejects_text_columns() {
        let table = Table::new(vec![Column::new("Profit_Loss", vec![Value::Text("x".into())])])
            .unwrap();
        assert!(cumulative_sum(&table, "Profit_Loss", CUMULATIVE_COLUMN).is_err());
        assert!(cumulative_sum(&table, "Nope", CUMULATIVE_COLUMN).is_err());
    }

    #[test]
    fn filter_includes_whole_end_day() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 6).unwrap();
        let filtered = filter_date_range(&trades(), "Opened", start, start).unwrap();
        assert_eq!(filtered.row_count(), 1);
        assert_eq!(filtered.column("Opened").unwrap().values, vec![day(6, 15)]);
    }

    #[test]
    fn filter_rejects_inverted_range_and_text_dates() {
        let early = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let late = NaiveDate::from_ymd_opt(2024, 1, 9).unwrap();
        assert!(filter_date_range(&trades(), "Opened", late, early).is_err());
        let text = Table::new(vec![Column::new("Opened", vec![Value::Text("x".into())])])
            .unwrap();
        assert!(filter_date_range(&text, "Opened", early, late).is_err());
    }

    #[test]
    fn cumulative_series_keeps_full_history_totals() {
        let request = SeriesRequest {
            profit_column: "Profit_Loss",
            date_column: "Opened",
            start: NaiveDate::from_ymd_opt(2024, 1, 7),
            end: None,
        };
        let series = cumulative_series(&trades(), &request).unwrap().unwrap();
        assert_eq!(series.table.labels(), vec!["Opened", CUMULATIVE_COLUMN]);
        assert_eq!(
            series.table.column(CUMULATIVE_COLUMN).unwrap().values,
            vec![Value::Float(7.5)]
        );
        assert_eq!(series.end, NaiveDate::from_ymd_opt(2024, 1, 7).unwrap());
    }

    #[test]
    fn date_bounds_spans_earliest_and_latest_day() {
        let (first, last) = date_bounds(&trades(), "Opened").unwrap().unwrap();
        assert_eq!(first, NaiveDate::from_ymd_opt(2024, 1, 5).unwrap());
        assert_eq!(last, NaiveDate::from_ymd_opt(2024, 1, 7).unwrap());
    }

    #[test]
    fn date_bounds_requires_a_datetime_column() {
        let table = Table::new(vec![Column::new("Opened", vec![Value::Missing])]).unwrap();
        assert!(date_bounds(&table, "Opened").is_err());
    }
}
