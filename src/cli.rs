use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

use crate::extract::InputFormat;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Split flat records into a normalized relational table set",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Normalize a flat file into deduplicated, related tables
    Normalize(NormalizeArgs),
    /// Validate a schema file and list its tables
    Check(CheckArgs),
}

#[derive(Debug, Args)]
pub struct NormalizeArgs {
    /// Input file of flat records (`-` for stdin)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Schema YAML describing the target tables
    #[arg(short = 's', long = "schema")]
    pub schema: PathBuf,
    /// Directory that receives one delimited file per table
    #[arg(short = 'o', long = "output-dir")]
    pub output_dir: Option<PathBuf>,
    /// Write a PostgreSQL load script to this path (`-` for stdout)
    #[arg(long = "sql")]
    pub sql: Option<PathBuf>,
    /// Use generated `<table>_id` columns as primary keys instead of declared ones
    #[arg(long = "assign-keys", action = ArgAction::Set, default_value_t = true)]
    pub assign_keys: bool,
    /// Input format (detected from the file extension when omitted)
    #[arg(long, value_enum)]
    pub format: Option<InputFormat>,
    /// Comma-separated field names; the first input line is then treated as data
    #[arg(long = "header", value_delimiter = ',')]
    pub header: Vec<String>,
    /// Lowercase headers and replace spaces and '#' characters
    #[arg(long = "clean-headers")]
    pub clean_headers: bool,
    /// CSV delimiter character for reading input
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Delimiter for per-table output files (defaults to comma)
    #[arg(long = "output-delimiter", value_parser = parse_delimiter)]
    pub output_delimiter: Option<u8>,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
    /// Character encoding for per-table output files (defaults to utf-8)
    #[arg(long = "output-encoding")]
    pub output_encoding: Option<String>,
    /// Print every normalized table as an elastic table to stdout
    #[arg(long = "table")]
    pub table: bool,
}

#[derive(Debug, Args)]
pub struct CheckArgs {
    /// Schema YAML to validate
    #[arg(short = 's', long = "schema")]
    pub schema: PathBuf,
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
    use super::*;

    #[test]
    fn named_delimiters_resolve() {
        assert_eq!(parse_delimiter("tab"), Ok(b'\t'));
        assert_eq!(parse_delimiter("semicolon"), Ok(b';'));
        assert_eq!(parse_delimiter("~"), Ok(b'~'));
        assert!(parse_delimiter("").is_err());
        assert!(parse_delimiter("ab").is_err());
    }

    #[test]
    fn assign_keys_defaults_on_and_accepts_false() {
        let cli = Cli::parse_from(["relsplit", "normalize", "-i", "in.csv", "-s", "s.yaml"]);
        let Commands::Normalize(args) = cli.command else {
            panic!("expected normalize");
        };
        assert!(args.assign_keys);

        let cli = Cli::parse_from([
            "relsplit",
            "normalize",
            "-i",
            "in.csv",
            "-s",
            "s.yaml",
            "--assign-keys",
            "false",
            "--header",
            "a,b",
        ]);
        let Commands::Normalize(args) = cli.command else {
            panic!("expected normalize");
        };
        assert!(!args.assign_keys);
        assert_eq!(args.header, vec!["a", "b"]);
    }
}
