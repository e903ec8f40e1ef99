use anyhow::Result;
use log::info;

use crate::{
    cli::SaveArgs,
    persist::{self, SystemClock},
    prepare,
};

pub fn execute(args: &SaveArgs) -> Result<()> {
    let loaded = prepare::load_normalized(&args.source)?;
    let outcome = prepare::retype(&loaded, &args.retype)?;
    let output = prepare::csv_output(args.output_delimiter, args.output_encoding.as_deref())?;
    let pair = persist::save_cleaned(&outcome.table, &args.output_dir, &SystemClock, &output)?;
    println!("Saved cleaned dataset to {}", pair.csv.display());
    println!("Saved cleaned dataset to {}", pair.xlsx.display());
    if !outcome.is_clean() {
        info!(
            "Saved with {} column(s) left in their previous datatype",
            outcome.failures.len()
        );
    }
    Ok(())
}
