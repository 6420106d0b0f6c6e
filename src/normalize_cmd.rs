use anyhow::{Context, Result, bail};
use log::info;

use crate::{
    cli::NormalizeArgs,
    engine::{NormalizeOptions, Normalizer},
    extract::{self, DelimitedOptions, InputFormat},
    io_utils,
    materialize::{self, TableBatch},
    schema::Schema,
    sink::{DelimitedDirSink, PostgresScriptSink},
    table,
};

pub fn execute(args: &NormalizeArgs) -> Result<()> {
    if args.output_dir.is_none() && args.sql.is_none() && !args.table {
        bail!("Nothing to write: pass --output-dir, --sql, or --table");
    }
    if args.table && args.sql.as_deref().is_some_and(io_utils::is_dash) {
        bail!("--table cannot be combined with --sql -");
    }

    let schema = Schema::load(&args.schema)
        .with_context(|| format!("Loading schema from {:?}", args.schema))?;
    let format = args.format.unwrap_or_else(|| InputFormat::detect(&args.input));
    let options = DelimitedOptions {
        delimiter: io_utils::resolve_input_delimiter(&args.input, args.delimiter),
        encoding: io_utils::resolve_encoding(args.input_encoding.as_deref())?,
        header: (!args.header.is_empty()).then(|| args.header.clone()),
        clean_headers: args.clean_headers,
    };
    info!(
        "Normalizing '{}' ({:?}, delimiter '{}') with schema {:?}",
        args.input.display(),
        format,
        crate::printable_delimiter(options.delimiter),
        args.schema
    );
    let records = extract::read_records(&args.input, Some(format), &options)?;
    info!("Read {} record(s)", records.len());

    let normalizer = Normalizer::new(
        schema,
        NormalizeOptions {
            assign_keys: args.assign_keys,
        },
    );
    let normalized = normalizer
        .normalize(&records)
        .with_context(|| format!("Normalizing records from {:?}", args.input))?;

    if let Some(dir) = &args.output_dir {
        let delimiter = io_utils::resolve_output_delimiter(None, args.output_delimiter, b',');
        let encoding = io_utils::resolve_encoding(args.output_encoding.as_deref())?;
        let mut sink = DelimitedDirSink::new(dir, delimiter, encoding);
        materialize::load_into(&mut sink, &normalized)
            .with_context(|| format!("Writing tables to {dir:?}"))?;
        info!("Wrote {} table file(s) to {:?}", sink.written().len(), dir);
    }

    if let Some(path) = &args.sql {
        let out = io_utils::open_output(Some(path.as_path()))?;
        let mut sink = PostgresScriptSink::new(out);
        materialize::load_into(&mut sink, &normalized)
            .with_context(|| format!("Writing SQL script to {path:?}"))?;
        if !io_utils::is_dash(path) {
            info!("Wrote load script to {:?}", path);
        }
    }

    if args.table {
        for normalized_table in normalized.tables() {
            let batch = TableBatch::from_table(normalized_table)?;
            table::print_batch(&batch);
        }
    }
    Ok(())
}
