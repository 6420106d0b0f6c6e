//! Row splitting: project flat records onto every table of the schema.
//!
//! Splitting runs in two phases over an arena addressed by
//! `(table index, record index)`:
//!
//! 1. every record is projected onto every table independently, holding only
//!    declared content and its content fingerprint;
//! 2. `referenced_by` edges are walked and each referenced row's fingerprint
//!    is written into the foreign-key slot of the referencing row built from
//!    the same record.
//!
//! The ordering invariant (a table precedes every table that embeds its
//! identifier) is checked explicitly in phase 2.

use log::debug;

use crate::{
    error::{NormalizeError, NormalizeResult},
    fingerprint::Fingerprint,
    schema::Schema,
    value::{CanonicalValue, FlatRecord},
};

/// One projected row for a `(record, table)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateRow {
    pub record: usize,
    /// Canonical values in declared column order.
    pub content: Vec<CanonicalValue>,
    /// Fingerprint of `content` alone.
    pub identifier: Fingerprint,
    /// One slot per entry of the table's `references`, in declared order.
    pub foreign_keys: Vec<Option<Fingerprint>>,
}

/// Candidate rows per table; `tables[t][r]` is table `t`'s row for record `r`.
#[derive(Debug, Clone, Default)]
pub struct CandidateTables {
    pub tables: Vec<Vec<CandidateRow>>,
}

impl CandidateTables {
    pub fn record_count(&self) -> usize {
        self.tables.first().map(Vec::len).unwrap_or(0)
    }

    pub fn rows(&self, table: usize) -> &[CandidateRow] {
        &self.tables[table]
    }
}

pub struct RowSplitter<'a> {
    schema: &'a Schema,
    columns: Vec<Vec<String>>,
}

impl<'a> RowSplitter<'a> {
    pub fn new(schema: &'a Schema) -> Self {
        let columns = schema
            .tables()
            .iter()
            .map(|table| table.columns.iter().map(|c| c.name.clone()).collect())
            .collect();
        Self { schema, columns }
    }

    pub fn split(&self, records: &[FlatRecord]) -> NormalizeResult<CandidateTables> {
        let mut arena = self.project_all(records);
        self.propagate_foreign_keys(&mut arena)?;
        debug!(
            "Split {} record(s) into {} table(s)",
            records.len(),
            self.schema.len()
        );
        Ok(arena)
    }

    /// Phase 1: declared content and content fingerprints only.
    fn project_all(&self, records: &[FlatRecord]) -> CandidateTables {
        let mut tables: Vec<Vec<CandidateRow>> = (0..self.schema.len())
            .map(|_| Vec::with_capacity(records.len()))
            .collect();
        for (record_idx, record) in records.iter().enumerate() {
            for (table_idx, rows) in tables.iter_mut().enumerate() {
                rows.push(self.project(table_idx, record_idx, record));
            }
        }
        CandidateTables { tables }
    }

    fn project(&self, table_idx: usize, record_idx: usize, record: &FlatRecord) -> CandidateRow {
        let columns = &self.columns[table_idx];
        let content: Vec<CanonicalValue> = columns
            .iter()
            .map(|name| record.get(name).and_then(|value| value.canonical()))
            .collect();
        let identifier = Fingerprint::of_row(columns, &content);
        CandidateRow {
            record: record_idx,
            content,
            identifier,
            foreign_keys: vec![None; self.schema.references_of(table_idx).len()],
        }
    }

    /// Phase 2: write each referenced row's identifier into its siblings.
    fn propagate_foreign_keys(&self, arena: &mut CandidateTables) -> NormalizeResult<()> {
        let record_count = arena.record_count();
        if record_count == 0 {
            return Ok(());
        }
        let tables = self.schema.tables();
        for (source, target) in self.schema.relations() {
            if source > target {
                return Err(NormalizeError::SchemaOrder {
                    table: tables[source].name.clone(),
                    sibling: tables[target].name.clone(),
                    record: 0,
                });
            }
            let slot = self
                .schema
                .references_of(target)
                .iter()
                .position(|&idx| idx == source)
                .ok_or_else(|| NormalizeError::SchemaOrder {
                    table: tables[source].name.clone(),
                    sibling: tables[target].name.clone(),
                    record: 0,
                })?;
            for record in 0..record_count {
                let identifier = arena.tables[source][record].identifier;
                arena.tables[target][record].foreign_keys[slot] = Some(identifier);
            }
        }

        for (table_idx, rows) in arena.tables.iter().enumerate() {
            for row in rows {
                if let Some(slot) = row.foreign_keys.iter().position(Option::is_none) {
                    let source = self.schema.references_of(table_idx)[slot];
                    return Err(NormalizeError::SchemaOrder {
                        table: tables[source].name.clone(),
                        sibling: tables[table_idx].name.clone(),
                        record: row.record,
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{schema::TableSpec, value::record};

    fn parent_child(parent_first: bool) -> Schema {
        let parent = TableSpec::new("parent")
            .column("p", "TEXT")
            .referenced_by(["child"]);
        let child = TableSpec::new("child")
            .column("c", "TEXT")
            .column("note", "TEXT")
            .references(["parent"]);
        let tables = if parent_first {
            vec![parent, child]
        } else {
            vec![child, parent]
        };
        Schema::new(tables).expect("valid schema")
    }

    #[test]
    fn one_candidate_per_record_and_table() {
        let schema = parent_child(true);
        let records = vec![
            record([("p", "x"), ("c", "a"), ("ignored", "z")]),
            record([("p", "x"), ("c", "b")]),
        ];
        let split = RowSplitter::new(&schema).split(&records).expect("split");
        assert_eq!(split.tables.len(), 2);
        assert_eq!(split.rows(0).len(), 2);
        assert_eq!(split.rows(1).len(), 2);
        assert_eq!(split.rows(1)[0].content, vec![Some("a".into()), None]);
        assert_eq!(split.rows(0)[0].identifier, split.rows(0)[1].identifier);
    }

    #[test]
    fn foreign_keys_point_at_same_record() {
        let schema = parent_child(true);
        let records = vec![
            record([("p", "x"), ("c", "a")]),
            record([("p", "y"), ("c", "a")]),
        ];
        let split = RowSplitter::new(&schema).split(&records).expect("split");
        for idx in 0..2 {
            assert_eq!(
                split.rows(1)[idx].foreign_keys,
                vec![Some(split.rows(0)[idx].identifier)]
            );
        }
    }

    #[test]
    fn empty_and_missing_values_hash_alike() {
        let schema = parent_child(true);
        let records = vec![
            record([("p", "x"), ("c", "a"), ("note", "")]),
            record([("p", "x"), ("c", "a")]),
        ];
        let split = RowSplitter::new(&schema).split(&records).expect("split");
        assert_eq!(split.rows(1)[0].identifier, split.rows(1)[1].identifier);
    }

    #[test]
    fn referenced_table_declared_late_is_an_order_error() {
        let schema = parent_child(false);
        let records = vec![record([("p", "x"), ("c", "a")])];
        let err = RowSplitter::new(&schema).split(&records).unwrap_err();
        assert_eq!(
            err,
            NormalizeError::SchemaOrder {
                table: "parent".into(),
                sibling: "child".into(),
                record: 0,
            }
        );
    }

    #[test]
    fn empty_batch_is_not_exercised() {
        let schema = parent_child(false);
        let split = RowSplitter::new(&schema).split(&[]).expect("nothing to split");
        assert_eq!(split.record_count(), 0);
    }
}
