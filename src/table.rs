//! Aligned plain-text rendering of population previews.

use std::fmt::Write as _;

use crate::{frame::AttributeTable, snapshot::PopulationSnapshot};

const ID_HEADER: &str = "row";
const MISSING: &str = "-";

/// Renders up to `limit` rows of `table`, prefixed with the row identity.
pub fn render_population(table: &AttributeTable, limit: usize) -> String {
    let mut headers = vec![ID_HEADER.to_string()];
    headers.extend(table.columns().iter().cloned());
    let rows = table
        .records()
        .iter()
        .zip(table.display_rows(Some(limit)))
        .map(|(record, cells)| {
            let mut row = vec![record.id.to_string()];
            row.extend(
                cells
                    .into_iter()
                    .map(|c| if c.is_empty() { MISSING.to_string() } else { c }),
            );
            row
        })
        .collect::<Vec<_>>();
    render_table(&headers, &rows)
}

/// Per-column category and missing counts of a snapshot.
pub fn render_snapshot_summary(snapshot: &PopulationSnapshot) -> String {
    let headers = ["column", "categories", "missing"].map(String::from);
    let rows = snapshot
        .columns
        .iter()
        .map(|c| {
            vec![
                c.name.clone(),
                c.categories.len().to_string(),
                c.missing().to_string(),
            ]
        })
        .collect::<Vec<_>>();
    render_table(&headers, &rows)
}

pub fn render_table(headers: &[String], rows: &[Vec<String>]) -> String {
    let mut widths = headers.iter().map(|h| cell_width(h)).collect::<Vec<_>>();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell_width(cell));
        }
    }
    let rule = widths.iter().map(|w| "-".repeat((*w).max(3))).collect::<Vec<_>>();
    let rule_widths = widths.iter().map(|w| (*w).max(3)).collect::<Vec<_>>();

    let mut output = String::new();
    let _ = writeln!(output, "{}", format_row(headers, &widths));
    let _ = writeln!(output, "{}", format_row(&rule, &rule_widths));
    for row in rows {
        let _ = writeln!(output, "{}", format_row(row, &widths));
    }
    output
}

pub fn print_table(headers: &[String], rows: &[Vec<String>]) {
    print!("{}", render_table(headers, rows));
}

fn format_row(cells: &[String], widths: &[usize]) -> String {
    let line = cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| {
            let flat = cell.replace(['\n', '\r', '\t'], " ");
            let pad = width.saturating_sub(cell_width(&flat));
            format!("{flat}{}", " ".repeat(pad))
        })
        .collect::<Vec<_>>()
        .join("  ");
    line.trim_end().to_string()
}

fn cell_width(value: &str) -> usize {
    value.chars().count()
}
