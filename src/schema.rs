//! Declarative target schema: tables, typed columns, and relationships.
//!
//! A [`Schema`] is an ordered list of [`TableSpec`]s. Construction through
//! [`Schema::new()`] validates every table up front so that malformed
//! configuration fails before a single record is processed.
//!
//! ## YAML layout
//!
//! ```yaml
//! tables:
//!   - name: company
//!     columns:
//!       - [company_name, TEXT]
//!     to: [contract]
//!   - name: contract
//!     columns:
//!       - { name: amount, type: NUMERIC }
//!     from: [company]
//! ```
//!
//! Columns may be written as `[name, TYPE]` pairs or `{name, type}` mappings.
//! `from`/`references` lists tables whose identifier this table embeds;
//! `to`/`referenced_by` lists tables that embed this table's identifier.

use std::{
    collections::{HashMap, HashSet},
    fs::File,
    io::BufReader,
    path::Path,
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::{NormalizeError, NormalizeResult};

pub const IDENTIFIER_SUFFIX: &str = "_id";

/// Column name used for a table's identifier, and for foreign keys to it.
pub fn identifier_column_for(table: &str) -> String {
    format!("{table}{IDENTIFIER_SUFFIX}")
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(from = "RawColumn")]
pub struct ColumnSpec {
    pub name: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub datatype: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawColumn {
    Pair(Vec<String>),
    Named {
        name: String,
        #[serde(default, rename = "type", alias = "datatype")]
        datatype: Option<String>,
    },
    Bare(String),
}

impl From<RawColumn> for ColumnSpec {
    fn from(raw: RawColumn) -> Self {
        match raw {
            RawColumn::Pair(mut parts) => {
                let datatype = if parts.len() > 1 {
                    Some(parts.remove(1))
                } else {
                    None
                };
                let name = parts.into_iter().next().unwrap_or_default();
                ColumnSpec { name, datatype }
            }
            RawColumn::Named { name, datatype } => ColumnSpec { name, datatype },
            RawColumn::Bare(name) => ColumnSpec {
                name,
                datatype: None,
            },
        }
    }
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, datatype: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            datatype: Some(datatype.into()),
        }
    }

    pub fn untyped(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            datatype: None,
        }
    }

    /// Declared type; validated schemas always carry one.
    pub fn datatype(&self) -> &str {
        self.datatype.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TableSpec {
    #[serde(alias = "table_name")]
    pub name: String,
    #[serde(default)]
    pub columns: Vec<ColumnSpec>,
    #[serde(
        default,
        alias = "pkey",
        skip_serializing_if = "Option::is_none"
    )]
    pub primary_key: Option<String>,
    #[serde(
        default,
        alias = "from",
        alias = "from_relations",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub references: Vec<String>,
    #[serde(
        default,
        alias = "to",
        alias = "to_relations",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub referenced_by: Vec<String>,
}

impl TableSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            primary_key: None,
            references: Vec::new(),
            referenced_by: Vec::new(),
        }
    }

    pub fn column(mut self, name: impl Into<String>, datatype: impl Into<String>) -> Self {
        self.columns.push(ColumnSpec::new(name, datatype));
        self
    }

    pub fn primary_key(mut self, column: impl Into<String>) -> Self {
        self.primary_key = Some(column.into());
        self
    }

    pub fn references<I, S>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.references.extend(tables.into_iter().map(Into::into));
        self
    }

    pub fn referenced_by<I, S>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.referenced_by.extend(tables.into_iter().map(Into::into));
        self
    }

    pub fn identifier_column(&self) -> String {
        identifier_column_for(&self.name)
    }

    pub fn foreign_key_columns(&self) -> Vec<String> {
        self.references
            .iter()
            .map(|table| identifier_column_for(table))
            .collect()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Primary key column under the given key policy.
    pub fn effective_primary_key(&self, assign_keys: bool) -> String {
        match (&self.primary_key, assign_keys) {
            (Some(column), false) => column.clone(),
            _ => self.identifier_column(),
        }
    }

    fn validate(&self) -> NormalizeResult<()> {
        if self.name.trim().is_empty() {
            return Err(NormalizeError::config("Table name must not be empty"));
        }
        if self.columns.is_empty() {
            return Err(NormalizeError::config(format!(
                "Table '{}' does not declare any columns",
                self.name
            )));
        }
        let identifier = self.identifier_column();
        let foreign_keys = self.foreign_key_columns();
        let mut seen = HashSet::new();
        for column in &self.columns {
            if column.name.trim().is_empty() {
                return Err(NormalizeError::config(format!(
                    "Table '{}' declares a column without a name",
                    self.name
                )));
            }
            if column
                .datatype
                .as_deref()
                .is_none_or(|ty| ty.trim().is_empty())
            {
                return Err(NormalizeError::config(format!(
                    "Column '{}' in table '{}' does not specify a type",
                    column.name, self.name
                )));
            }
            if !seen.insert(column.name.as_str()) {
                return Err(NormalizeError::config(format!(
                    "Column '{}' is declared more than once in table '{}'",
                    column.name, self.name
                )));
            }
            if column.name == identifier || foreign_keys.contains(&column.name) {
                return Err(NormalizeError::config(format!(
                    "Column '{}' in table '{}' collides with a generated key column",
                    column.name, self.name
                )));
            }
        }
        if let Some(pkey) = &self.primary_key
            && *pkey != identifier
            && !seen.contains(pkey.as_str())
        {
            return Err(NormalizeError::config(format!(
                "Primary key '{}' of table '{}' is not a declared column",
                pkey, self.name
            )));
        }
        Ok(())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SchemaDocument {
    Wrapped { tables: Vec<TableSpec> },
    Bare(Vec<TableSpec>),
}

#[derive(Debug, Clone)]
pub struct Schema {
    tables: Vec<TableSpec>,
    index: HashMap<String, usize>,
    references: Vec<Vec<usize>>,
    referenced_by: Vec<Vec<usize>>,
}

impl Schema {
    pub fn new(tables: Vec<TableSpec>) -> NormalizeResult<Self> {
        if tables.is_empty() {
            return Err(NormalizeError::config("Schema does not declare any tables"));
        }
        let mut index = HashMap::with_capacity(tables.len());
        for (idx, table) in tables.iter().enumerate() {
            table.validate()?;
            if index.insert(table.name.clone(), idx).is_some() {
                return Err(NormalizeError::config(format!(
                    "Table '{}' is declared more than once",
                    table.name
                )));
            }
        }

        let resolve = |owner: &TableSpec, names: &[String]| -> NormalizeResult<Vec<usize>> {
            let mut resolved = Vec::with_capacity(names.len());
            for name in names {
                let idx = *index.get(name).ok_or_else(|| {
                    NormalizeError::config(format!(
                        "Table '{}' relates to unknown table '{}'",
                        owner.name, name
                    ))
                })?;
                if name == &owner.name {
                    return Err(NormalizeError::config(format!(
                        "Table '{}' cannot relate to itself",
                        owner.name
                    )));
                }
                if resolved.contains(&idx) {
                    return Err(NormalizeError::config(format!(
                        "Table '{}' lists relation '{}' more than once",
                        owner.name, name
                    )));
                }
                resolved.push(idx);
            }
            Ok(resolved)
        };

        let mut references = Vec::with_capacity(tables.len());
        let mut referenced_by = Vec::with_capacity(tables.len());
        for table in &tables {
            references.push(resolve(table, &table.references)?);
            referenced_by.push(resolve(table, &table.referenced_by)?);
        }

        for (idx, table) in tables.iter().enumerate() {
            for &target in &referenced_by[idx] {
                if !references[target].contains(&idx) {
                    return Err(NormalizeError::config(format!(
                        "Table '{}' is referenced by '{}' but '{}' does not list '{}' in its references",
                        table.name, tables[target].name, tables[target].name, table.name
                    )));
                }
            }
            for &source in &references[idx] {
                if !referenced_by[source].contains(&idx) {
                    return Err(NormalizeError::config(format!(
                        "Table '{}' references '{}' but '{}' does not list '{}' in its referenced_by",
                        table.name, tables[source].name, tables[source].name, table.name
                    )));
                }
            }
        }

        Ok(Schema {
            tables,
            index,
            references,
            referenced_by,
        })
    }

    pub fn from_yaml_str(input: &str) -> Result<Self> {
        let document: SchemaDocument =
            serde_yaml::from_str(input).context("Parsing schema YAML")?;
        let tables = match document {
            SchemaDocument::Wrapped { tables } | SchemaDocument::Bare(tables) => tables,
        };
        Ok(Schema::new(tables)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening schema file {path:?}"))?;
        let document: SchemaDocument = serde_yaml::from_reader(BufReader::new(file))
            .with_context(|| format!("Parsing schema YAML {path:?}"))?;
        let tables = match document {
            SchemaDocument::Wrapped { tables } | SchemaDocument::Bare(tables) => tables,
        };
        Schema::new(tables).with_context(|| format!("Validating schema {path:?}"))
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        #[derive(Serialize)]
        struct Document<'a> {
            tables: &'a [TableSpec],
        }
        serde_yaml::to_string(&Document {
            tables: &self.tables,
        })
        .context("Serializing schema to YAML string")
    }

    pub fn tables(&self) -> &[TableSpec] {
        &self.tables
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn table(&self, name: &str) -> Option<&TableSpec> {
        self.index_of(name).map(|idx| &self.tables[idx])
    }

    /// Indices of the tables whose identifier table `idx` embeds, in declared order.
    pub fn references_of(&self, idx: usize) -> &[usize] {
        &self.references[idx]
    }

    /// Indices of the tables that embed table `idx`'s identifier.
    pub fn referenced_by_of(&self, idx: usize) -> &[usize] {
        &self.referenced_by[idx]
    }

    /// Every `(referenced, referencing)` edge, walking `referenced_by` in declaration order.
    pub fn relations(&self) -> Vec<(usize, usize)> {
        self.referenced_by
            .iter()
            .enumerate()
            .flat_map(|(source, targets)| targets.iter().map(move |&target| (source, target)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parent_child() -> Vec<TableSpec> {
        vec![
            TableSpec::new("parent")
                .column("p", "TEXT")
                .referenced_by(["child"]),
            TableSpec::new("child").column("c", "TEXT").references(["parent"]),
        ]
    }

    #[test]
    fn lookup_by_name_and_relations() {
        let schema = Schema::new(parent_child()).expect("valid schema");
        assert_eq!(schema.index_of("child"), Some(1));
        assert_eq!(schema.table("parent").unwrap().identifier_column(), "parent_id");
        assert_eq!(schema.relations(), vec![(0, 1)]);
        assert_eq!(schema.references_of(1), &[0]);
        assert!(schema.index_of("missing").is_none());
    }

    #[test]
    fn rejects_table_without_columns() {
        let err = Schema::new(vec![TableSpec::new("empty")]).unwrap_err();
        assert!(matches!(err, NormalizeError::Configuration(_)));
    }

    #[test]
    fn rejects_untyped_column() {
        let mut table = TableSpec::new("t");
        table.columns.push(ColumnSpec::untyped("a"));
        let err = Schema::new(vec![table]).unwrap_err();
        assert!(err.to_string().contains("does not specify a type"));
    }

    #[test]
    fn rejects_asymmetric_relations() {
        let tables = vec![
            TableSpec::new("parent")
                .column("p", "TEXT")
                .referenced_by(["child"]),
            TableSpec::new("child").column("c", "TEXT"),
        ];
        let err = Schema::new(tables).unwrap_err();
        assert!(err.to_string().contains("does not list 'parent'"));
    }

    #[test]
    fn rejects_generated_column_collision() {
        let tables = vec![TableSpec::new("item").column("item_id", "TEXT")];
        assert!(Schema::new(tables).is_err());
    }

    #[test]
    fn yaml_accepts_pairs_mappings_and_legacy_keys() {
        let yaml = r#"
- table_name: foo
  pkey: foo
  columns:
    - [foo, INTEGER]
    - { name: bar, type: INTEGER }
  from_relations: [baz]
- table_name: baz
  columns:
    - [baz, VARCHAR]
  to_relations: [foo]
"#;
        let schema = Schema::from_yaml_str(yaml).expect("parse legacy layout");
        let foo = schema.table("foo").unwrap();
        assert_eq!(foo.column_names(), vec!["foo", "bar"]);
        assert_eq!(foo.foreign_key_columns(), vec!["baz_id".to_string()]);
        assert_eq!(foo.effective_primary_key(false), "foo");
        assert_eq!(foo.effective_primary_key(true), "foo_id");
    }

    #[test]
    fn yaml_single_element_column_is_missing_type() {
        let yaml = "tables:\n  - name: t\n    columns:\n      - [a]\n";
        let err = Schema::from_yaml_str(yaml).unwrap_err();
        assert!(format!("{err:#}").contains("does not specify a type"));
    }
}
