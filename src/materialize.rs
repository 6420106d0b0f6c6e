//! Hand-off of normalized tables to a bulk-load collaborator.
//!
//! [`TableBatch`] fixes the column order of a table's rows (identifier first,
//! then declared and foreign-key columns sorted by name). [`TableLayout`]
//! carries what a sink needs to create the table. [`load_into()`] drives a
//! [`TableSink`] in the only safe order: every table is created and filled
//! before any foreign-key constraint is added.

use anyhow::{Context, Result, ensure};
use log::{debug, info};

use crate::{
    engine::{NormalizedTable, NormalizedTables},
    fingerprint::FINGERPRINT_HEX_LEN,
    value::CanonicalValue,
};

/// SQL type of generated identifier and foreign-key columns.
pub fn key_column_type() -> String {
    format!("VARCHAR({FINGERPRINT_HEX_LEN})")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDefinition {
    pub name: String,
    pub datatype: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyDefinition {
    pub column: String,
    pub referenced_table: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableLayout {
    pub table: String,
    /// Identifier column, declared columns in declared order, then foreign keys.
    pub columns: Vec<ColumnDefinition>,
    pub primary_key: String,
    pub foreign_keys: Vec<ForeignKeyDefinition>,
}

impl TableLayout {
    pub fn from_table(table: &NormalizedTable) -> Self {
        let spec = &table.spec;
        let mut columns = Vec::with_capacity(spec.columns.len() + spec.references.len() + 1);
        columns.push(ColumnDefinition {
            name: spec.identifier_column(),
            datatype: key_column_type(),
        });
        columns.extend(spec.columns.iter().map(|column| ColumnDefinition {
            name: column.name.clone(),
            datatype: column.datatype().to_string(),
        }));
        let foreign_keys = spec
            .references
            .iter()
            .zip(spec.foreign_key_columns())
            .map(|(referenced, column)| ForeignKeyDefinition {
                column,
                referenced_table: referenced.clone(),
            })
            .collect::<Vec<_>>();
        columns.extend(foreign_keys.iter().map(|fk| ColumnDefinition {
            name: fk.column.clone(),
            datatype: key_column_type(),
        }));
        Self {
            table: spec.name.clone(),
            columns,
            primary_key: table.primary_key.clone(),
            foreign_keys,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableBatch {
    pub table: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CanonicalValue>>,
}

impl TableBatch {
    pub fn from_table(table: &NormalizedTable) -> Result<Self> {
        let spec = &table.spec;
        let identifier = spec.identifier_column();
        let mut rest = spec
            .columns
            .iter()
            .map(|c| c.name.clone())
            .chain(spec.foreign_key_columns())
            .collect::<Vec<_>>();
        rest.sort();
        let mut columns = Vec::with_capacity(rest.len() + 1);
        columns.push(identifier);
        columns.extend(rest);

        let mut rows = Vec::with_capacity(table.rows.len());
        for row in &table.rows {
            let values = columns
                .iter()
                .map(|column| {
                    table.value(row, column).with_context(|| {
                        format!("Column '{column}' missing from table '{}'", spec.name)
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            ensure!(
                values[0].is_some(),
                "Table '{}' has a row without an identifier",
                spec.name
            );
            rows.push(values);
        }
        Ok(Self {
            table: spec.name.clone(),
            columns,
            rows,
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Destination store for a normalized table set.
pub trait TableSink {
    fn drop_and_create(&mut self, layout: &TableLayout) -> Result<()>;

    fn bulk_insert(&mut self, batch: &TableBatch) -> Result<()>;

    /// Called only after every table has been bulk inserted.
    fn add_foreign_key_constraint(
        &mut self,
        table: &str,
        foreign_key_column: &str,
        referenced_table: &str,
    ) -> Result<()>;

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Creates, fills, and constrains every table of `tables` through `sink`.
pub fn load_into(sink: &mut dyn TableSink, tables: &NormalizedTables) -> Result<()> {
    let mut layouts = Vec::with_capacity(tables.tables().len());
    for table in tables.tables() {
        let layout = TableLayout::from_table(table);
        let batch = TableBatch::from_table(table)?;
        sink.drop_and_create(&layout)
            .with_context(|| format!("Creating table '{}'", layout.table))?;
        sink.bulk_insert(&batch)
            .with_context(|| format!("Loading table '{}'", batch.table))?;
        debug!("Loaded {} row(s) into '{}'", batch.len(), batch.table);
        layouts.push(layout);
    }
    for layout in &layouts {
        for fk in &layout.foreign_keys {
            sink.add_foreign_key_constraint(&layout.table, &fk.column, &fk.referenced_table)
                .with_context(|| {
                    format!(
                        "Adding foreign key {}.{} -> {}",
                        layout.table, fk.column, fk.referenced_table
                    )
                })?;
        }
    }
    sink.finish()?;
    info!(
        "Loaded {} row(s) across {} table(s)",
        tables.total_rows(),
        layouts.len()
    );
    Ok(())
}
