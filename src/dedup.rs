//! Deduplication of candidate rows into final table rows.
//!
//! Each table is resolved in two passes. The first pass builds a partition
//! map keyed by declared content only, recording for every partition the
//! distinct foreign-key tuples it was seen with and the context-qualified
//! identifier of each tuple. The second pass applies the resolution policy:
//!
//! | partition shape                                   | output                                   |
//! |---------------------------------------------------|------------------------------------------|
//! | table has no references                           | one row, content identifier              |
//! | one distinct foreign-key tuple                    | one row, content identifier + tuple      |
//! | N tuples, N distinct context-qualified identifiers| N rows, `fingerprint(content, tuple)`    |
//! | anything else                                     | [`NormalizeError::DeduplicationConflict`]|
//!
//! Tables are resolved in schema order. Before a table is partitioned its
//! foreign keys are rebound to the *resolved* identifiers of the referenced
//! tables, so a context split higher up a relationship chain never leaves a
//! dangling key below it.

use std::collections::{HashMap, HashSet, hash_map::Entry};

use log::debug;

use crate::{
    error::{NormalizeError, NormalizeResult},
    fingerprint::Fingerprint,
    schema::Schema,
    split::{CandidateRow, CandidateTables},
    value::CanonicalValue,
};

/// One row of a table's deduplicated output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalRow {
    pub identifier: Fingerprint,
    /// Declared column values in declared order.
    pub content: Vec<CanonicalValue>,
    /// Resolved identifiers of the referenced tables, in `references` order.
    pub foreign_keys: Vec<Fingerprint>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedTable {
    pub rows: Vec<FinalRow>,
    /// Final identifier of the row each input record maps to, by record index.
    pub record_identifiers: Vec<Fingerprint>,
    /// Partitions that were split by relational context.
    pub context_splits: usize,
}

struct Partition {
    content: Vec<CanonicalValue>,
    identifier: Fingerprint,
    contexts: Vec<Vec<Fingerprint>>,
    context_identifiers: Vec<Fingerprint>,
    distinct_identifiers: HashSet<Fingerprint>,
    context_lookup: HashMap<Vec<Fingerprint>, usize>,
    /// `(record, context index)` for every occurrence.
    occurrences: Vec<(usize, usize)>,
}

impl Partition {
    fn new(row: &CandidateRow) -> Self {
        Self {
            content: row.content.clone(),
            identifier: row.identifier,
            contexts: Vec::new(),
            context_identifiers: Vec::new(),
            distinct_identifiers: HashSet::new(),
            context_lookup: HashMap::new(),
            occurrences: Vec::new(),
        }
    }
}

pub struct Deduplicator<'a> {
    schema: &'a Schema,
    columns: Vec<Vec<String>>,
    fk_columns: Vec<Vec<String>>,
}

impl<'a> Deduplicator<'a> {
    pub fn new(schema: &'a Schema) -> Self {
        let columns = schema
            .tables()
            .iter()
            .map(|table| table.columns.iter().map(|c| c.name.clone()).collect())
            .collect();
        let fk_columns = schema
            .tables()
            .iter()
            .map(|table| table.foreign_key_columns())
            .collect();
        Self {
            schema,
            columns,
            fk_columns,
        }
    }

    pub fn resolve(&self, candidates: CandidateTables) -> NormalizeResult<Vec<ResolvedTable>> {
        let mut resolved: Vec<ResolvedTable> = Vec::with_capacity(candidates.tables.len());
        for (table_idx, rows) in candidates.tables.into_iter().enumerate() {
            let rows = self.rebind_foreign_keys(table_idx, rows, &resolved)?;
            let table = self.resolve_table(table_idx, &rows)?;
            debug!(
                "Table '{}': {} candidate(s) -> {} row(s), {} context split(s)",
                self.schema.tables()[table_idx].name,
                rows.len(),
                table.rows.len(),
                table.context_splits
            );
            resolved.push(table);
        }
        Ok(resolved)
    }

    fn rebind_foreign_keys(
        &self,
        table_idx: usize,
        mut rows: Vec<CandidateRow>,
        resolved: &[ResolvedTable],
    ) -> NormalizeResult<Vec<CandidateRow>> {
        let references = self.schema.references_of(table_idx);
        if references.is_empty() {
            return Ok(rows);
        }
        let tables = self.schema.tables();
        for row in &mut rows {
            for (slot, &source) in references.iter().enumerate() {
                let identifier = resolved
                    .get(source)
                    .and_then(|table| table.record_identifiers.get(row.record))
                    .ok_or_else(|| NormalizeError::SchemaOrder {
                        table: tables[source].name.clone(),
                        sibling: tables[table_idx].name.clone(),
                        record: row.record,
                    })?;
                row.foreign_keys[slot] = Some(*identifier);
            }
        }
        Ok(rows)
    }

    /// Applies the resolution policy to every partition of one table.
    ///
    /// Context-qualified identifiers are computed once per distinct tuple, so
    /// the conflict branch is reached only when two tuples hash alike.
    fn resolve_table(&self, table_idx: usize, rows: &[CandidateRow]) -> NormalizeResult<ResolvedTable> {
        let partitions = self.partition(table_idx, rows)?;
        let has_references = !self.schema.references_of(table_idx).is_empty();

        let record_count = rows.iter().map(|row| row.record + 1).max().unwrap_or(0);
        let mut record_identifiers: Vec<Option<Fingerprint>> = vec![None; record_count];
        let mut output = Vec::with_capacity(partitions.len());
        let mut context_splits = 0usize;

        for partition in partitions {
            self.check_partition(table_idx, &partition)?;
            if !has_references || partition.contexts.len() <= 1 {
                for &(record, _) in &partition.occurrences {
                    record_identifiers[record] = Some(partition.identifier);
                }
                output.push(FinalRow {
                    identifier: partition.identifier,
                    foreign_keys: partition.contexts.into_iter().next().unwrap_or_default(),
                    content: partition.content,
                });
            } else {
                context_splits += 1;
                for &(record, context) in &partition.occurrences {
                    record_identifiers[record] = Some(partition.context_identifiers[context]);
                }
                for (context, identifier) in partition
                    .contexts
                    .into_iter()
                    .zip(partition.context_identifiers)
                {
                    output.push(FinalRow {
                        identifier,
                        content: partition.content.clone(),
                        foreign_keys: context,
                    });
                }
            }
        }

        ensure_unique_identifiers(&self.schema.tables()[table_idx].name, &output)?;

        Ok(ResolvedTable {
            rows: output,
            record_identifiers: record_identifiers.into_iter().flatten().collect(),
            context_splits,
        })
    }

    /// Rejects a partition whose FK tuples and qualified identifiers disagree.
    fn check_partition(&self, table_idx: usize, partition: &Partition) -> NormalizeResult<()> {
        let has_references = !self.schema.references_of(table_idx).is_empty();
        if !has_references
            || partition.contexts.len() <= 1
            || partition.distinct_identifiers.len() == partition.contexts.len()
        {
            return Ok(());
        }
        Err(NormalizeError::DeduplicationConflict {
            table: self.schema.tables()[table_idx].name.clone(),
            content: self.describe_content(table_idx, &partition.content),
            identifiers: partition.distinct_identifiers.len(),
            contexts: partition.contexts.len(),
        })
    }

    /// First pass: content-keyed partitions in first-seen order.
    fn partition(&self, table_idx: usize, rows: &[CandidateRow]) -> NormalizeResult<Vec<Partition>> {
        let columns = &self.columns[table_idx];
        let fk_columns = &self.fk_columns[table_idx];
        let mut lookup: HashMap<&[CanonicalValue], usize> = HashMap::new();
        let mut partitions: Vec<Partition> = Vec::new();

        for row in rows {
            let idx = *lookup.entry(row.content.as_slice()).or_insert_with(|| {
                partitions.push(Partition::new(row));
                partitions.len() - 1
            });
            let partition = &mut partitions[idx];
            if fk_columns.is_empty() {
                partition.occurrences.push((row.record, 0));
                continue;
            }

            let context = row
                .foreign_keys
                .iter()
                .copied()
                .collect::<Option<Vec<Fingerprint>>>()
                .ok_or_else(|| {
                    let tables = self.schema.tables();
                    let slot = row
                        .foreign_keys
                        .iter()
                        .position(Option::is_none)
                        .unwrap_or_default();
                    NormalizeError::SchemaOrder {
                        table: tables[self.schema.references_of(table_idx)[slot]].name.clone(),
                        sibling: tables[table_idx].name.clone(),
                        record: row.record,
                    }
                })?;
            let context_idx = match partition.context_lookup.entry(context) {
                Entry::Occupied(existing) => *existing.get(),
                Entry::Vacant(vacant) => {
                    let identifier = Fingerprint::of_row_with_context(
                        columns,
                        &partition.content,
                        fk_columns,
                        vacant.key(),
                    );
                    partition.contexts.push(vacant.key().clone());
                    partition.context_identifiers.push(identifier);
                    partition.distinct_identifiers.insert(identifier);
                    *vacant.insert(partition.contexts.len() - 1)
                }
            };
            partition.occurrences.push((row.record, context_idx));
        }
        Ok(partitions)
    }

    fn describe_content(&self, table_idx: usize, content: &[CanonicalValue]) -> String {
        let pairs = self.columns[table_idx]
            .iter()
            .zip(content)
            .map(|(column, value)| format!("{column}={}", value.as_deref().unwrap_or("NULL")))
            .collect::<Vec<_>>();
        format!("{{{}}}", pairs.join(", "))
    }
}

/// Rejects two different rows carrying the same identifier.
pub(crate) fn ensure_unique_identifiers(table: &str, rows: &[FinalRow]) -> NormalizeResult<()> {
    let mut seen: HashMap<Fingerprint, usize> = HashMap::with_capacity(rows.len());
    for (idx, row) in rows.iter().enumerate() {
        if let Some(&previous) = seen.get(&row.identifier) {
            if rows[previous] != *row {
                return Err(NormalizeError::FingerprintCollision {
                    table: table.to_string(),
                    identifier: row.identifier.to_hex(),
                });
            }
            continue;
        }
        seen.insert(row.identifier, idx);
    }
    Ok(())
}
