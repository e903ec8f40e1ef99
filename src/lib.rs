pub mod analyze;
pub mod cli;
pub mod data;
pub mod dataset;
pub mod ingest;
pub mod inspect;
pub mod io_utils;
pub mod normalize;
pub mod persist;
pub mod prepare;
pub mod preview;
pub mod retype_map;
pub mod save;
pub mod table;

use std::{
    env,
    fs::{self, File},
    io::{self, Write},
    path::{Path, PathBuf},
    sync::OnceLock,
};

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Target;
use log::{LevelFilter, info};

use crate::{
    cli::{Cli, Commands},
    persist::{Clock, PREPARATION_LOG, SystemClock},
};

static LOGGER: OnceLock<()> = OnceLock::new();

/// Copies every log record to stderr and a log file.
struct LogTee {
    file: File,
}

impl Write for LogTee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stderr().write_all(buf)?;
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()?;
        self.file.flush()
    }
}

/// Installs the global logger once. With `log_dir`, records also go to a
/// timestamped file there, whose path is returned.
pub fn init_logging(log_dir: Option<&Path>) -> Result<Option<PathBuf>> {
    if LOGGER.get().is_some() {
        return Ok(None);
    }
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
    if env::var("RUST_LOG").is_err() {
        builder.filter_module("trade_prep", LevelFilter::Info);
    }
    let log_file = match log_dir {
        Some(dir) => {
            fs::create_dir_all(dir).with_context(|| format!("Creating log directory {dir:?}"))?;
            let path = dir.join(persist::timestamped_name(
                PREPARATION_LOG,
                &SystemClock.now(),
                "log",
            ));
            let file =
                File::create(&path).with_context(|| format!("Creating log file {path:?}"))?;
            builder.target(Target::Pipe(Box::new(LogTee { file })));
            Some(path)
        }
        None => None,
    };
    LOGGER.get_or_init(|| {
        let _ = builder.format_timestamp_millis().try_init();
    });
    Ok(log_file)
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    if let Some(path) = init_logging(cli.log_dir.as_deref())? {
        info!("Logging to {:?}", path);
    }
    match cli.command {
        Commands::Inspect(args) => inspect::execute(&args),
        Commands::Preview(args) => preview::execute(&args),
        Commands::Save(args) => save::execute(&args),
        Commands::Analyze(args) => analyze::execute(&args),
        Commands::Datasets(args) => analyze::list_datasets(&args),
    }
}
