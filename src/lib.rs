pub mod check_cmd;
pub mod cli;
pub mod dedup;
pub mod engine;
pub mod error;
pub mod extract;
pub mod fingerprint;
pub mod io_utils;
pub mod materialize;
pub mod normalize_cmd;
pub mod schema;
pub mod sink;
pub mod split;
pub mod table;
pub mod value;

use std::{env, sync::OnceLock};

use anyhow::Result;
use clap::Parser;
use log::LevelFilter;

use crate::cli::{Cli, Commands};

pub use crate::{
    engine::{NormalizeOptions, NormalizedTable, NormalizedTables, Normalizer},
    error::{NormalizeError, NormalizeResult},
    fingerprint::Fingerprint,
    schema::{ColumnSpec, Schema, TableSpec},
    value::{FieldValue, FlatRecord},
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("relsplit", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Normalize(args) => normalize_cmd::execute(&args),
        Commands::Check(args) => check_cmd::execute(&args),
    }
}

pub(crate) fn printable_delimiter(delimiter: u8) -> String {
    match delimiter {
        b',' => ",".to_string(),
        b'\t' => "\\t".to_string(),
        other => (other as char).to_string(),
    }
}
