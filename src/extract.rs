//! Record extraction from delimited text and JSON Lines.
//!
//! Delimited cells arrive as strings; an empty cell becomes
//! [`FieldValue::Null`]. JSON Lines objects keep their scalar types. Nested
//! arrays or objects are rejected.

use std::{
    collections::BTreeMap,
    io::{BufRead, BufReader, Read},
    path::Path,
};

use anyhow::{Context, Result, anyhow, bail, ensure};
use clap::ValueEnum;
use encoding_rs::Encoding;
use log::debug;
use serde_json::value::RawValue;

use crate::{
    io_utils,
    value::{FieldValue, FlatRecord},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "kebab-case")]
pub enum InputFormat {
    Csv,
    Jsonl,
}

impl InputFormat {
    /// `.jsonl`/`.ndjson` read as JSON Lines; everything else as delimited text.
    pub fn detect(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("jsonl") || ext.eq_ignore_ascii_case("ndjson") => {
                InputFormat::Jsonl
            }
            _ => InputFormat::Csv,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DelimitedOptions {
    pub delimiter: u8,
    pub encoding: &'static Encoding,
    /// Explicit field names; when set the first line is data, not a header.
    pub header: Option<Vec<String>>,
    pub clean_headers: bool,
}

impl Default for DelimitedOptions {
    fn default() -> Self {
        Self {
            delimiter: io_utils::DEFAULT_CSV_DELIMITER,
            encoding: encoding_rs::UTF_8,
            header: None,
            clean_headers: false,
        }
    }
}

/// Lowercases a header, replaces spaces with `_` and `#` with `number`.
pub fn clean_header(field: &str) -> String {
    field
        .trim()
        .to_lowercase()
        .replace(' ', "_")
        .replace('#', "number")
}

pub fn read_delimited<R: Read>(reader: R, options: &DelimitedOptions) -> Result<Vec<FlatRecord>> {
    let has_headers = options.header.is_none();
    let mut csv_reader = io_utils::open_csv_reader(reader, options.delimiter, has_headers);
    let mut headers = match &options.header {
        Some(header) => header.clone(),
        None => io_utils::reader_headers(&mut csv_reader, options.encoding)?,
    };
    if let Some(first) = headers.first_mut() {
        // drop a UTF-8 byte order mark left on the first header
        *first = first.trim_start_matches('\u{feff}').to_string();
    }
    if options.clean_headers {
        headers = headers.iter().map(|h| clean_header(h)).collect();
    }
    ensure_unique_headers(&headers)?;

    let mut records = Vec::new();
    for (idx, result) in csv_reader.byte_records().enumerate() {
        let line = idx + if has_headers { 2 } else { 1 };
        let record = result.with_context(|| format!("Reading row {line}"))?;
        let decoded = io_utils::decode_record(&record, options.encoding)
            .with_context(|| format!("Decoding row {line}"))?;
        ensure!(
            decoded.len() == headers.len(),
            "Row {line} has {} field(s) but the header declares {}",
            decoded.len(),
            headers.len()
        );
        let flat = headers
            .iter()
            .cloned()
            .zip(decoded)
            .map(|(name, value)| {
                let cell = if value.is_empty() {
                    FieldValue::Null
                } else {
                    FieldValue::String(value)
                };
                (name, cell)
            })
            .collect();
        records.push(flat);
    }
    debug!("Read {} delimited record(s)", records.len());
    Ok(records)
}

pub fn read_json_lines<R: Read>(reader: R) -> Result<Vec<FlatRecord>> {
    let mut records = Vec::new();
    for (idx, line) in BufReader::new(reader).lines().enumerate() {
        let line_no = idx + 1;
        let line = line.with_context(|| format!("Reading line {line_no}"))?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if !trimmed.starts_with('{') {
            bail!("Line {line_no} is not a JSON object");
        }
        let object: BTreeMap<String, &RawValue> = serde_json::from_str(trimmed)
            .with_context(|| format!("Parsing JSON on line {line_no}"))?;
        let mut record = FlatRecord::new();
        for (key, raw) in object {
            let cell = scalar_from_json(raw.get())
                .with_context(|| format!("Field '{key}' on line {line_no}"))?;
            record.insert(key, cell);
        }
        records.push(record);
    }
    debug!("Read {} JSON record(s)", records.len());
    Ok(records)
}

/// Integer literals must fit `i64` or `u64`; anything wider would be rounded
/// through `f64` and could merge distinct values.
fn scalar_from_json(text: &str) -> Result<FieldValue> {
    match text.as_bytes().first() {
        Some(b'[' | b'{') => bail!("not a scalar value"),
        Some(b'-' | b'0'..=b'9') if !text.contains(['.', 'e', 'E']) => text
            .parse::<i64>()
            .map(FieldValue::Integer)
            .or_else(|_| text.parse::<u64>().map(FieldValue::Unsigned))
            .map_err(|_| anyhow!("integer {text} does not fit in 64 bits; quote it as a string")),
        _ => serde_json::from_str::<FieldValue>(text).context("Unsupported JSON value"),
    }
}

pub fn read_records(
    path: &Path,
    format: Option<InputFormat>,
    options: &DelimitedOptions,
) -> Result<Vec<FlatRecord>> {
    let format = format.unwrap_or_else(|| InputFormat::detect(path));
    let input = io_utils::open_input(path)?;
    match format {
        InputFormat::Csv => {
            read_delimited(input, options).with_context(|| format!("Reading records from {path:?}"))
        }
        InputFormat::Jsonl => {
            read_json_lines(input).with_context(|| format!("Reading records from {path:?}"))
        }
    }
}

fn ensure_unique_headers(headers: &[String]) -> Result<()> {
    for (idx, header) in headers.iter().enumerate() {
        if headers[..idx].contains(header) {
            bail!("Header '{header}' appears more than once");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delimited_rows_become_records_with_nulls() {
        let input = "\u{feff}Company Name,Contract #\nAcme,\n";
        let options = DelimitedOptions {
            clean_headers: true,
            ..DelimitedOptions::default()
        };
        let records = read_delimited(input.as_bytes(), &options).expect("read");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["company_name"], FieldValue::from("Acme"));
        assert_eq!(records[0]["contract_number"], FieldValue::Null);
    }

    #[test]
    fn explicit_header_treats_first_line_as_data() {
        let options = DelimitedOptions {
            delimiter: b'\t',
            header: Some(vec!["a".into(), "b".into()]),
            ..DelimitedOptions::default()
        };
        let records = read_delimited("1\t2\n".as_bytes(), &options).expect("read");
        assert_eq!(records[0]["b"], FieldValue::from("2"));
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let options = DelimitedOptions {
            header: Some(vec!["a".into()]),
            ..DelimitedOptions::default()
        };
        assert!(read_delimited("1,2\n".as_bytes(), &options).is_err());
    }

    #[test]
    fn json_lines_keep_scalar_types() {
        let input = "{\"a\": 1, \"b\": null}\n\n{\"a\": 2.5, \"b\": true}\n";
        let records = read_json_lines(input.as_bytes()).expect("read");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["a"], FieldValue::Integer(1));
        assert_eq!(records[0]["b"], FieldValue::Null);
        assert_eq!(records[1]["b"], FieldValue::Boolean(true));
    }

    #[test]
    fn json_lines_keep_wide_integers_distinct() {
        let input = "{\"n\": 9007199254740993}\n{\"n\": 9007199254740992}\n{\"n\": 18446744073709551615}\n{\"n\": 18446744073709551614}\n";
        let records = read_json_lines(input.as_bytes()).expect("read");
        assert_eq!(records[0]["n"], FieldValue::Integer(9_007_199_254_740_993));
        assert_eq!(records[2]["n"], FieldValue::Unsigned(u64::MAX));
        assert_eq!(records[3]["n"], FieldValue::Unsigned(u64::MAX - 1));
        let texts = records
            .iter()
            .map(|r| r["n"].canonical())
            .collect::<std::collections::HashSet<_>>();
        assert_eq!(texts.len(), 4);
    }

    #[test]
    fn json_lines_reject_integers_wider_than_64_bits() {
        let err = read_json_lines("{\"n\": 18446744073709551616}\n".as_bytes()).unwrap_err();
        assert!(format!("{err:#}").contains("does not fit in 64 bits"));
        let floats = read_json_lines("{\"n\": 1e15}\n{\"n\": -2.5}\n".as_bytes()).expect("floats");
        assert_eq!(floats[0]["n"], FieldValue::Float(1e15));
        assert_eq!(floats[1]["n"].canonical().as_deref(), Some("-2.5"));
    }

    #[test]
    fn json_lines_reject_nested_values() {
        assert!(read_json_lines("{\"a\": [1]}\n".as_bytes()).is_err());
        assert!(read_json_lines("[1, 2]\n".as_bytes()).is_err());
    }

    #[test]
    fn format_detection_uses_extension() {
        assert_eq!(InputFormat::detect(Path::new("x.ndjson")), InputFormat::Jsonl);
        assert_eq!(InputFormat::detect(Path::new("x.tsv")), InputFormat::Csv);
    }
}
