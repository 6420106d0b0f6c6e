//! Schema validation and listing.
//!
//! Loads a schema YAML file (which runs the full construction-time
//! validation) and renders its tables, key columns, and relationships as an
//! ASCII table.

use anyhow::{Context, Result};
use itertools::Itertools;
use log::{info, warn};

use crate::{cli::CheckArgs, schema::Schema, table};

pub fn execute(args: &CheckArgs) -> Result<()> {
    let schema = Schema::load(&args.schema)
        .with_context(|| format!("Loading schema from {:?}", args.schema))?;

    let headers = ["#", "table", "columns", "key", "references", "referenced_by"]
        .iter()
        .map(|h| h.to_string())
        .collect_vec();
    let rows = schema
        .tables()
        .iter()
        .enumerate()
        .map(|(idx, spec)| {
            let columns = spec
                .columns
                .iter()
                .map(|c| format!("{}:{}", c.name, c.datatype()))
                .join(", ");
            vec![
                (idx + 1).to_string(),
                spec.name.clone(),
                columns,
                spec.identifier_column(),
                spec.references.join(", "),
                spec.referenced_by.join(", "),
            ]
        })
        .collect_vec();
    print!("{}", table::render_table(&headers, &rows));

    let relations = schema.relations();
    for (source, target) in relations.iter().filter(|(source, target)| source > target) {
        warn!(
            "Table '{}' is declared after '{}', which embeds its identifier; normalization will fail",
            schema.tables()[*source].name,
            schema.tables()[*target].name
        );
    }
    info!(
        "Schema {:?} defines {} table(s) and {} relationship(s)",
        args.schema,
        schema.len(),
        relations.len()
    );
    Ok(())
}
