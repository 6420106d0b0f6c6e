//! Concrete [`TableSink`]s: a PostgreSQL load script and a directory of
//! delimited files.

use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use encoding_rs::Encoding;
use log::{debug, info};

use crate::{
    io_utils,
    materialize::{TableBatch, TableLayout, TableSink},
    schema::identifier_column_for,
};

/// Marker PostgreSQL's text `COPY` format reads as NULL.
pub const COPY_NULL: &str = "\\N";

/// Double-quotes an identifier so reserved words and mixed case survive.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Escapes a value for PostgreSQL's text `COPY` format.
pub fn escape_copy_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out
}

/// Writes a single-transaction SQL script: DROP/CREATE, `COPY ... FROM stdin`
/// blocks, then foreign-key constraints.
pub struct PostgresScriptSink<W: Write> {
    out: W,
    started: bool,
}

impl<W: Write> PostgresScriptSink<W> {
    pub fn new(out: W) -> Self {
        Self { out, started: false }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn begin(&mut self) -> Result<()> {
        if !self.started {
            writeln!(self.out, "BEGIN;")?;
            self.started = true;
        }
        Ok(())
    }
}

impl<W: Write> TableSink for PostgresScriptSink<W> {
    fn drop_and_create(&mut self, layout: &TableLayout) -> Result<()> {
        self.begin()?;
        let table = quote_ident(&layout.table);
        writeln!(self.out, "DROP TABLE IF EXISTS {table} CASCADE;")?;
        let coldefs = layout
            .columns
            .iter()
            .map(|column| format!("{} {}", quote_ident(&column.name), column.datatype))
            .collect::<Vec<_>>()
            .join(", ");
        writeln!(
            self.out,
            "CREATE TABLE {table} ({coldefs}, PRIMARY KEY ({}));",
            quote_ident(&layout.primary_key)
        )?;
        Ok(())
    }

    fn bulk_insert(&mut self, batch: &TableBatch) -> Result<()> {
        self.begin()?;
        let columns = batch
            .columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        writeln!(
            self.out,
            "COPY {} ({columns}) FROM stdin;",
            quote_ident(&batch.table)
        )?;
        for (idx, row) in batch.rows.iter().enumerate() {
            let line = row
                .iter()
                .map(|value| match value {
                    Some(text) => escape_copy_value(text),
                    None => COPY_NULL.to_string(),
                })
                .collect::<Vec<_>>()
                .join("\t");
            writeln!(self.out, "{line}")?;
            if (idx + 1) % 10_000 == 0 {
                debug!("Wrote {} line(s) for '{}'", idx + 1, batch.table);
            }
        }
        writeln!(self.out, "\\.")?;
        Ok(())
    }

    fn add_foreign_key_constraint(
        &mut self,
        table: &str,
        foreign_key_column: &str,
        referenced_table: &str,
    ) -> Result<()> {
        self.begin()?;
        writeln!(
            self.out,
            "ALTER TABLE {} ADD FOREIGN KEY ({}) REFERENCES {} ({});",
            quote_ident(table),
            quote_ident(foreign_key_column),
            quote_ident(referenced_table),
            quote_ident(&identifier_column_for(referenced_table))
        )?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.begin()?;
        writeln!(self.out, "COMMIT;")?;
        self.out.flush().context("Flushing SQL script")
    }
}

/// Writes one delimited file per table into a directory. Empty unquoted
/// fields are NULL; foreign-key constraints cannot be expressed and are only
/// logged.
pub struct DelimitedDirSink {
    dir: PathBuf,
    delimiter: u8,
    encoding: &'static Encoding,
    written: Vec<PathBuf>,
}

impl DelimitedDirSink {
    pub fn new(dir: &Path, delimiter: u8, encoding: &'static Encoding) -> Self {
        Self {
            dir: dir.to_path_buf(),
            delimiter,
            encoding,
            written: Vec::new(),
        }
    }

    pub fn table_path(&self, table: &str) -> PathBuf {
        let extension = if self.delimiter == io_utils::DEFAULT_TSV_DELIMITER {
            "tsv"
        } else {
            "csv"
        };
        self.dir.join(format!("{table}.{extension}"))
    }

    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }
}

impl TableSink for DelimitedDirSink {
    fn drop_and_create(&mut self, layout: &TableLayout) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Creating output directory {:?}", self.dir))?;
        let path = self.table_path(&layout.table);
        if path.exists() {
            fs::remove_file(&path).with_context(|| format!("Removing stale file {path:?}"))?;
        }
        Ok(())
    }

    fn bulk_insert(&mut self, batch: &TableBatch) -> Result<()> {
        let path = self.table_path(&batch.table);
        let mut writer = io_utils::open_csv_writer(Some(path.as_path()), self.delimiter, self.encoding)?;
        writer
            .write_record(&batch.columns)
            .with_context(|| format!("Writing header to {path:?}"))?;
        for row in &batch.rows {
            writer.write_record(row.iter().map(|value| value.as_deref().unwrap_or_default()))?;
        }
        writer
            .flush()
            .with_context(|| format!("Flushing {path:?}"))?;
        info!("Wrote {} row(s) to {:?}", batch.len(), path);
        self.written.push(path);
        Ok(())
    }

    fn add_foreign_key_constraint(
        &mut self,
        table: &str,
        foreign_key_column: &str,
        referenced_table: &str,
    ) -> Result<()> {
        debug!("{table}.{foreign_key_column} references {referenced_table} (not enforced in flat files)");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_are_always_quoted() {
        assert_eq!(quote_ident("company_id"), "\"company_id\"");
        assert_eq!(quote_ident("user"), "\"user\"");
        assert_eq!(quote_ident("Company"), "\"Company\"");
        assert_eq!(quote_ident("1st"), "\"1st\"");
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn copy_values_escape_control_characters() {
        assert_eq!(escape_copy_value("a\tb\nc\\d"), "a\\tb\\nc\\\\d");
    }
}
