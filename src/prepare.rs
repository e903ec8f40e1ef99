//! Steps shared by the commands that load and retype a trade file.

use std::path::Path;

use anyhow::{Context, Result};
use log::{debug, info};

use crate::{
    cli::{RetypeArgs, SourceArgs},
    dataset::Table,
    ingest::{IngestCache, IngestOptions, SourceFormat},
    io_utils,
    normalize::{ConversionFailure, RetypeOutcome, apply_retype, normalize_labels},
    persist::CsvOutput,
    retype_map::RetypeMap,
};

pub fn open_cache(dir: Option<&Path>) -> Result<IngestCache> {
    match dir {
        Some(dir) => IngestCache::with_dir(dir),
        None => Ok(IngestCache::in_memory()),
    }
}

pub fn ingest_options(delimiter: Option<u8>, encoding: Option<&str>) -> Result<IngestOptions> {
    Ok(IngestOptions {
        delimiter,
        encoding: io_utils::resolve_encoding(encoding)?,
    })
}

/// Ingests `source.input` and normalizes its labels.
pub fn load_normalized(source: &SourceArgs) -> Result<Table> {
    let options = ingest_options(source.delimiter, source.input_encoding.as_deref())?;
    match SourceFormat::detect(&source.input) {
        SourceFormat::Delimited => info!(
            "Loading '{}' with delimiter '{}'",
            source.input.display(),
            io_utils::printable_delimiter(io_utils::resolve_input_delimiter(
                &source.input,
                options.delimiter
            ))
        ),
        SourceFormat::Spreadsheet => info!("Loading spreadsheet '{}'", source.input.display()),
    }
    let mut cache = open_cache(source.cache_dir.as_deref())?;
    let table = cache
        .load(&source.input, &options)
        .with_context(|| format!("Loading dataset {:?}", source.input))?;
    debug!(
        "Ingest cache: {} hit(s), {} miss(es)",
        cache.hits(),
        cache.misses()
    );
    let table = normalize_labels(&table);
    info!(
        "Loaded {} row(s) across {} column(s)",
        table.row_count(),
        table.column_count()
    );
    Ok(table)
}

/// Every column pre-selected at its current kind, overlaid with the map
/// file and `--type` assignments.
pub fn retype_map(table: &Table, args: &RetypeArgs) -> Result<RetypeMap> {
    let explicit = RetypeMap::resolve(args.map.as_deref(), &args.types)?;
    debug!("Retype map has {} explicit assignment(s)", explicit.len());
    let mut map = RetypeMap::with_current_kinds(table);
    map.merge(&explicit);
    Ok(map)
}

/// Retypes `table`, echoing every failure to stderr.
pub fn retype(table: &Table, args: &RetypeArgs) -> Result<RetypeOutcome> {
    let map = retype_map(table, args)?;
    let outcome = apply_retype(table, &map);
    report_failures(&outcome.failures);
    Ok(outcome)
}

pub fn report_failures(failures: &[ConversionFailure]) {
    for failure in failures {
        eprintln!("{failure}");
    }
    if !failures.is_empty() {
        eprintln!(
            "{} column(s) kept their previous datatype.",
            failures.len()
        );
    }
}

pub fn csv_output(delimiter: Option<u8>, encoding: Option<&str>) -> Result<CsvOutput> {
    Ok(CsvOutput {
        delimiter: delimiter.unwrap_or(io_utils::DEFAULT_CSV_DELIMITER),
        encoding: io_utils::resolve_encoding(encoding)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        data::Value,
        dataset::Column,
        normalize::{ColumnKind, classify_column},
    };

    #[test]
    fn explicit_assignments_override_preselected_kinds() {
        let table = Table::new(vec![
            Column::new("Qty", vec![Value::Text("10".into()), Value::Missing]),
            Column::new("Open", vec![Value::Boolean(true), Value::Boolean(false)]),
        ])
        .unwrap();
        let args = RetypeArgs {
            types: vec!["Qty=integer".to_string()],
            map: None,
        };
        let map = retype_map(&table, &args).unwrap();
        assert_eq!(map.get("Qty"), Some(ColumnKind::Integer));
        assert_eq!(map.get("Open"), Some(ColumnKind::Text));

        let outcome = retype(&table, &args).unwrap();
        assert!(outcome.is_clean());
        let columns = outcome.table.columns();
        assert_eq!(columns[0].values, vec![Value::Integer(10), Value::Missing]);
        assert_eq!(columns[1].values[0], Value::Text("True".into()));
        assert_eq!(classify_column(&columns[1].values), ColumnKind::Text);
    }

    #[test]
    fn csv_output_defaults_to_comma_utf8() {
        let output = csv_output(None, None).unwrap();
        assert_eq!(output.delimiter, b',');
        assert_eq!(output.encoding, encoding_rs::UTF_8);
        assert!(csv_output(None, Some("nope")).is_err());
    }

    #[test]
    fn colliding_labels_keep_their_own_kinds() {
        for (first, second) in [
            (
                Column::new("a b", vec![Value::Integer(1), Value::Integer(2)]),
                Column::new("a/b", vec![Value::Text("x".into()), Value::Text("y".into())]),
            ),
            (
                Column::new("a/b", vec![Value::Text("x".into()), Value::Text("y".into())]),
                Column::new("a b", vec![Value::Integer(1), Value::Integer(2)]),
            ),
        ] {
            let table = normalize_labels(&Table::new(vec![first, second]).unwrap());
            let args = RetypeArgs {
                types: Vec::new(),
                map: None,
            };
            let outcome = retype(&table, &args).unwrap();
            assert!(outcome.is_clean(), "{:?}", outcome.failures);
            assert_eq!(outcome.table, table);
        }
    }

    #[test]
    fn explicit_assignment_reaches_every_colliding_column() {
        let table = normalize_labels(
            &Table::new(vec![
                Column::new("a b", vec![Value::Integer(1)]),
                Column::new("a/b", vec![Value::Text("x".into())]),
            ])
            .unwrap(),
        );
        let args = RetypeArgs {
            types: vec!["a_b=integer".to_string()],
            map: None,
        };
        let outcome = retype(&table, &args).unwrap();
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].column, "a_b");
        assert_eq!(outcome.table.columns()[0].values, vec![Value::Integer(1)]);
        assert_eq!(
            outcome.table.columns()[1].values,
            vec![Value::Text("x".into())]
        );
    }
}
