//! Batch normalization entry point.
//!
//! [`Normalizer`] ties the pipeline together: split every record into
//! per-table candidates, deduplicate them, and hand back a
//! [`NormalizedTables`] set. A batch either resolves completely or fails with
//! a [`NormalizeError`]; partial output is never returned.

use std::collections::HashMap;

use log::{debug, info};

use crate::{
    dedup::{Deduplicator, FinalRow},
    error::NormalizeResult,
    fingerprint::Fingerprint,
    schema::{Schema, TableSpec},
    split::RowSplitter,
    value::{CanonicalValue, FlatRecord},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizeOptions {
    /// Use each table's generated identifier column as its primary key,
    /// overriding any declared `primary_key`.
    pub assign_keys: bool,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self { assign_keys: true }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedTable {
    pub spec: TableSpec,
    pub primary_key: String,
    pub rows: Vec<FinalRow>,
    pub record_identifiers: Vec<Fingerprint>,
}

impl NormalizedTable {
    pub fn name(&self) -> &str {
        &self.spec.name
    }

    /// Value of `column` in `row`: identifier, declared column, or foreign key.
    pub fn value(&self, row: &FinalRow, column: &str) -> Option<CanonicalValue> {
        if column == self.spec.identifier_column() {
            return Some(Some(row.identifier.to_hex()));
        }
        if let Some(idx) = self.spec.columns.iter().position(|c| c.name == column) {
            return row.content.get(idx).cloned();
        }
        self.spec
            .foreign_key_columns()
            .iter()
            .position(|fk| fk == column)
            .and_then(|idx| row.foreign_keys.get(idx))
            .map(|fp| Some(fp.to_hex()))
    }
}

/// Deduplicated output of one batch, in schema order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedTables {
    tables: Vec<NormalizedTable>,
    index: HashMap<String, usize>,
}

impl NormalizedTables {
    pub fn tables(&self) -> &[NormalizedTable] {
        &self.tables
    }

    pub fn get(&self, name: &str) -> Option<&NormalizedTable> {
        self.index.get(name).map(|&idx| &self.tables[idx])
    }

    pub fn rows(&self, name: &str) -> Option<&[FinalRow]> {
        self.get(name).map(|table| table.rows.as_slice())
    }

    pub fn total_rows(&self) -> usize {
        self.tables.iter().map(|t| t.rows.len()).sum()
    }

    pub fn into_map(self) -> HashMap<String, Vec<FinalRow>> {
        self.tables
            .into_iter()
            .map(|table| (table.spec.name, table.rows))
            .collect()
    }
}

pub struct Normalizer {
    schema: Schema,
    options: NormalizeOptions,
}

impl Normalizer {
    pub fn new(schema: Schema, options: NormalizeOptions) -> Self {
        Self { schema, options }
    }

    pub fn normalize(&self, records: &[FlatRecord]) -> NormalizeResult<NormalizedTables> {
        debug!(
            "Normalizing {} record(s) against {} table(s)",
            records.len(),
            self.schema.len()
        );
        let candidates = RowSplitter::new(&self.schema).split(records)?;
        let resolved = Deduplicator::new(&self.schema).resolve(candidates)?;

        let mut tables = Vec::with_capacity(resolved.len());
        let mut index = HashMap::with_capacity(resolved.len());
        for (spec, table) in self.schema.tables().iter().zip(resolved) {
            index.insert(spec.name.clone(), tables.len());
            tables.push(NormalizedTable {
                primary_key: spec.effective_primary_key(self.options.assign_keys),
                spec: spec.clone(),
                rows: table.rows,
                record_identifiers: table.record_identifiers,
            });
        }
        let normalized = NormalizedTables { tables, index };
        info!(
            "Normalized {} record(s) into {} row(s) across {} table(s)",
            records.len(),
            normalized.total_rows(),
            normalized.tables().len()
        );
        Ok(normalized)
    }
}
