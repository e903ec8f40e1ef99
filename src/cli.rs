use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::analyze::{DEFAULT_DATE_COLUMN, DEFAULT_PROFIT_COLUMN};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Normalize, retype and analyze trade-history spreadsheets",
    long_about = None
)]
pub struct Cli {
    /// Also write log records to a timestamped file in this directory
    #[arg(long = "log-dir", global = true)]
    pub log_dir: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show the first rows and the detected datatype of every column
    Inspect(InspectArgs),
    /// Retype and sort a copy of the dataset and print the result
    Preview(PreviewArgs),
    /// Retype the dataset and save the cleaned CSV and XLSX pair
    Save(SaveArgs),
    /// Chart cumulative profit/loss over a date range
    Analyze(AnalyzeArgs),
    /// List saved cleaned datasets
    Datasets(DatasetsArgs),
}

/// Options shared by every command that reads a trade file.
#[derive(Debug, Args)]
pub struct SourceArgs {
    /// Input trade file (.csv, .tsv, .xlsx, .xls, .ods, ...)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Delimiter for text input (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of text input (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
    /// Directory for cached ingestion results
    #[arg(long = "cache-dir")]
    pub cache_dir: Option<PathBuf>,
}

/// Retype assignments shared by `preview` and `save`.
#[derive(Debug, Args)]
pub struct RetypeArgs {
    /// Column retype of the form `Label=kind` (integer, float, datetime, string)
    #[arg(long = "type", action = clap::ArgAction::Append)]
    pub types: Vec<String>,
    /// YAML file with a `columns:` map of label to kind
    #[arg(long = "map")]
    pub map: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct InspectArgs {
    #[command(flatten)]
    pub source: SourceArgs,
    /// Number of leading rows to show
    #[arg(long, default_value_t = 5)]
    pub rows: usize,
    /// Emit the column report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct PreviewArgs {
    #[command(flatten)]
    pub source: SourceArgs,
    #[command(flatten)]
    pub retype: RetypeArgs,
    /// Sort directives of the form `column[:asc|desc]`
    #[arg(long = "sort", action = clap::ArgAction::Append)]
    pub sort: Vec<String>,
    /// Number of rows to show (0 shows all)
    #[arg(long, default_value_t = 10)]
    pub rows: usize,
    /// Save the sorted result as a timestamped CSV
    #[arg(long = "save-sorted")]
    pub save_sorted: bool,
    /// Directory for saved files
    #[arg(long = "output-dir", default_value = ".")]
    pub output_dir: PathBuf,
    /// Delimiter for saved CSV files (defaults to ',')
    #[arg(long = "output-delimiter", value_parser = parse_delimiter)]
    pub output_delimiter: Option<u8>,
    /// Character encoding for saved CSV files (defaults to utf-8)
    #[arg(long = "output-encoding")]
    pub output_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct SaveArgs {
    #[command(flatten)]
    pub source: SourceArgs,
    #[command(flatten)]
    pub retype: RetypeArgs,
    /// Directory for saved files
    #[arg(long = "output-dir", default_value = ".")]
    pub output_dir: PathBuf,
    /// Delimiter for the saved CSV file (defaults to ',')
    #[arg(long = "output-delimiter", value_parser = parse_delimiter)]
    pub output_delimiter: Option<u8>,
    /// Character encoding for the saved CSV file (defaults to utf-8)
    #[arg(long = "output-encoding")]
    pub output_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct AnalyzeArgs {
    /// Dataset to analyze (defaults to the newest saved cleaned dataset)
    #[arg(short = 'i', long = "input", conflicts_with = "dir")]
    pub input: Option<PathBuf>,
    /// Directory searched for saved cleaned datasets
    #[arg(long)]
    pub dir: Option<PathBuf>,
    /// Delimiter for text input (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of text input (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
    /// Directory for cached ingestion results
    #[arg(long = "cache-dir")]
    pub cache_dir: Option<PathBuf>,
    /// First day to include (YYYY-MM-DD); defaults to the earliest trade
    #[arg(long)]
    pub start: Option<String>,
    /// Last day to include (YYYY-MM-DD); defaults to the latest trade
    #[arg(long)]
    pub end: Option<String>,
    /// Column holding per-trade profit/loss
    #[arg(long = "profit-column", default_value = DEFAULT_PROFIT_COLUMN)]
    pub profit_column: String,
    /// Column holding the trade date
    #[arg(long = "date-column", default_value = DEFAULT_DATE_COLUMN)]
    pub date_column: String,
    /// Write the cumulative series to this CSV file
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct DatasetsArgs {
    /// Directory searched for saved cleaned datasets
    #[arg(long, default_value = ".")]
    pub dir: PathBuf,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_delimiter_accepts_names_and_single_characters() {
        assert_eq!(parse_delimiter("tab"), Ok(b'\t'));
        assert_eq!(parse_delimiter("semicolon"), Ok(b';'));
        assert_eq!(parse_delimiter("#"), Ok(b'#'));
        assert!(parse_delimiter("").is_err());
        assert!(parse_delimiter("ab").is_err());
        assert!(parse_delimiter("é").is_err());
    }

    #[test]
    fn preview_collects_repeated_types_and_sorts() {
        let cli = Cli::try_parse_from([
            "trade-prep",
            "preview",
            "-i",
            "trades.csv",
            "--type",
            "Qty=integer",
            "--type",
            "Opened=datetime",
            "--sort",
            "Opened:desc",
        ])
        .unwrap();
        let Commands::Preview(args) = cli.command else {
            panic!("expected preview");
        };
        assert_eq!(args.retype.types, vec!["Qty=integer", "Opened=datetime"]);
        assert_eq!(args.sort, vec!["Opened:desc"]);
        assert_eq!(args.rows, 10);
    }

    #[test]
    fn analyze_rejects_input_together_with_dir() {
        let result = Cli::try_parse_from([
            "trade-prep",
            "analyze",
            "-i",
            "a.xlsx",
            "--dir",
            "saved",
        ]);
        assert!(result.is_err());
    }
}
