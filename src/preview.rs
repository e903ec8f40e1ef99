use anyhow::Result;
use log::info;

use crate::{
    cli::PreviewArgs,
    dataset::{SortDirective, Table},
    normalize::{classify_column, normalize_label},
    persist::{self, SystemClock},
    prepare, table,
};

pub fn execute(args: &PreviewArgs) -> Result<()> {
    let loaded = prepare::load_normalized(&args.source)?;
    let outcome = prepare::retype(&loaded, &args.retype)?;
    let directives = sort_directives(&args.sort)?;
    let sorted = outcome.table.sorted(&directives)?;

    let shown = if args.rows == 0 {
        sorted.clone()
    } else {
        sorted.head(args.rows)
    };
    table::print_table(&shown.labels(), &shown.display_rows());
    println!();
    print_datatypes(&sorted);

    if args.save_sorted {
        let output = prepare::csv_output(args.output_delimiter, args.output_encoding.as_deref())?;
        let path = persist::save_sorted(&sorted, &args.output_dir, &SystemClock, &output)?;
        println!("Saved sorted dataset to {}", path.display());
    }
    info!(
        "Previewed {} of {} row(s) with {} conversion failure(s)",
        shown.row_count(),
        sorted.row_count(),
        outcome.failures.len()
    );
    Ok(())
}

/// Parses `column[:asc|desc]` directives; column labels are normalized the
/// same way table labels are.
pub fn sort_directives(specs: &[String]) -> Result<Vec<SortDirective>> {
    specs
        .iter()
        .map(|spec| {
            let mut directive = SortDirective::parse(spec)?;
            directive.column = normalize_label(&directive.column);
            Ok(directive)
        })
        .collect()
}

fn print_datatypes(table: &Table) {
    let headers = vec!["column".to_string(), "datatype".to_string()];
    let rows = table
        .columns()
        .iter()
        .map(|column| {
            vec![
                column.label.clone(),
                classify_column(&column.values).to_string(),
            ]
        })
        .collect::<Vec<_>>();
    table::print_table(&headers, &rows);
}
