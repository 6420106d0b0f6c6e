//! Elastic plain-text tables for terminal previews.

use std::fmt::Write as _;

use crate::{fingerprint::FINGERPRINT_HEX_LEN, materialize::TableBatch};

const KEY_PREVIEW_LEN: usize = 12;
const NULL_DISPLAY: &str = "NULL";

pub fn render_table(headers: &[String], rows: &[Vec<String>]) -> String {
    let mut widths = headers.iter().map(|h| h.chars().count()).collect::<Vec<_>>();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(flatten(cell).chars().count());
        }
    }

    let mut output = String::new();
    let _ = writeln!(output, "{}", format_row(headers.iter().map(String::as_str), &widths));
    let rule = widths.iter().map(|w| "-".repeat((*w).max(3))).collect::<Vec<_>>();
    let _ = writeln!(output, "{}", format_row(rule.iter().map(String::as_str), &widths));
    for row in rows {
        let cells = row.iter().map(|cell| flatten(cell)).collect::<Vec<_>>();
        let _ = writeln!(output, "{}", format_row(cells.iter().map(String::as_str), &widths));
    }
    output
}

/// Renders a batch with NULLs spelled out and fingerprint keys shortened.
pub fn render_batch(batch: &TableBatch) -> String {
    let rows = batch
        .rows
        .iter()
        .map(|row| {
            row.iter()
                .map(|value| match value.as_deref() {
                    None => NULL_DISPLAY.to_string(),
                    Some(text) if looks_like_key(text) => format!("{}…", &text[..KEY_PREVIEW_LEN]),
                    Some(text) => text.to_string(),
                })
                .collect()
        })
        .collect::<Vec<Vec<String>>>();
    render_table(&batch.columns, &rows)
}

pub fn print_batch(batch: &TableBatch) {
    println!("{} ({} row(s))", batch.table, batch.len());
    print!("{}", render_batch(batch));
    println!();
}

fn looks_like_key(text: &str) -> bool {
    text.len() == FINGERPRINT_HEX_LEN && text.bytes().all(|b| b.is_ascii_hexdigit())
}

fn flatten(cell: &str) -> String {
    cell.replace(['\n', '\r', '\t'], " ")
}

fn format_row<'a>(cells: impl Iterator<Item = &'a str>, widths: &[usize]) -> String {
    let mut line = cells
        .zip(widths)
        .map(|(cell, width)| {
            let pad = width.saturating_sub(cell.chars().count());
            format!("{cell}{}", " ".repeat(pad))
        })
        .collect::<Vec<_>>()
        .join("  ");
    line.truncate(line.trim_end().len());
    line
}
