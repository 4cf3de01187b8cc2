//! Plain renderings of finalized tables (JSON, aligned text, CSV) and a
//! JSON export of parsed records

use crate::config::Report;
use crate::data::Record;
use crate::error::{Error, Result, SyntaxError};
use crate::stats::{Comparison, Summary, Verdict};
use crate::tables::{Table, Tables};
use serde::Serialize;
use std::io::Write;

/// Pretty-printed JSON of a full report
pub fn to_json(report: &Report) -> Result<String> {
    Ok(serde_json::to_string_pretty(report)?)
}

#[derive(Serialize)]
struct RecordExport<'a> {
    records: &'a [Record],
    syntax_errors: &'a [SyntaxError],
}

/// Pretty-printed JSON of parsed records, before any filtering or grouping,
/// together with the lines that failed to parse.
pub fn records_to_json(records: &[Record], syntax_errors: &[SyntaxError]) -> Result<String> {
    Ok(serde_json::to_string_pretty(&RecordExport {
        records,
        syntax_errors,
    })?)
}

/// Aligned text tables, one block per table.
pub fn to_text(tables: &Tables) -> String {
    let blocks: Vec<String> = tables.tables.iter().map(table_text).collect();
    blocks.join("\n")
}

fn table_text(table: &Table) -> String {
    let mut header = vec![table.key.label()];
    for (c, col) in table.columns.iter().enumerate() {
        header.push(col.label());
        if c != table.baseline {
            header.push(format!("vs {}", base_label(table)));
        }
    }

    let mut lines: Vec<Vec<String>> = vec![header];
    for row in &table.rows {
        let mut line = vec![row.key.label()];
        for (c, cell) in row.cells.iter().enumerate() {
            line.push(cell.as_ref().map(summary_text).unwrap_or_else(|| "-".into()));
            if c != table.baseline {
                line.push(
                    row.comparisons[c]
                        .as_ref()
                        .map(comparison_text)
                        .unwrap_or_default(),
                );
            }
        }
        lines.push(line);
    }

    if let Some(g) = &table.geomean {
        let mut line = vec!["geomean".to_string()];
        for c in 0..table.columns.len() {
            line.push(g.centers[c].map(format_number).unwrap_or_else(|| "-".into()));
            if c != table.baseline {
                line.push(g.deltas[c].map(format_delta).unwrap_or_default());
            }
        }
        lines.push(line);
    }

    let mut out = align(&lines);

    let mut notes: Vec<String> = table.notes.clone();
    for row in &table.rows {
        for note in &row.notes {
            notes.push(format!("{}: {}", row.key.label(), note));
        }
    }
    for note in notes {
        out.push_str("note: ");
        out.push_str(&note);
        out.push('\n');
    }
    out
}

fn base_label(table: &Table) -> String {
    table
        .columns
        .get(table.baseline)
        .map(|k| k.label())
        .unwrap_or_default()
}

/// Left-align the first column, right-align the rest.
fn align(lines: &[Vec<String>]) -> String {
    let ncols = lines.iter().map(Vec::len).max().unwrap_or(0);
    let mut widths = vec![0; ncols];
    for line in lines {
        for (i, cell) in line.iter().enumerate() {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }

    let mut out = String::new();
    for line in lines {
        let mut cells = Vec::with_capacity(line.len());
        for (i, cell) in line.iter().enumerate() {
            if i == 0 {
                cells.push(format!("{:<width$}", cell, width = widths[i]));
            } else {
                cells.push(format!("{:>width$}", cell, width = widths[i]));
            }
        }
        out.push_str(cells.join("  ").trim_end());
        out.push('\n');
    }
    out
}

fn summary_text(s: &Summary) -> String {
    let spread = match (s.lo, s.hi) {
        (Some(lo), Some(hi)) if s.center != 0.0 => {
            let pct = (s.center - lo).max(hi - s.center) / s.center.abs() * 100.0;
            format!("{:.0}%", pct)
        }
        (Some(_), Some(_)) => "0%".to_string(),
        _ => "∞".to_string(),
    };
    format!("{} ± {}", format_number(s.center), spread)
}

fn comparison_text(c: &Comparison) -> String {
    let change = match c.verdict {
        Verdict::Improved | Verdict::Regressed | Verdict::Changed => {
            c.delta.map(format_delta).unwrap_or_else(|| "changed".into())
        }
        Verdict::NoSignificantChange => "~".to_string(),
        Verdict::InsufficientData => "?".to_string(),
    };
    match c.p_value {
        Some(p) => format!(
            "{} (p={:.3} n={}+{})",
            change, p, c.n_baseline, c.n_candidate
        ),
        None => format!("{} (n={}+{})", change, c.n_baseline, c.n_candidate),
    }
}

fn format_delta(delta: f64) -> String {
    format!("{:+.2}%", delta * 100.0)
}

/// Four significant digits, no exponent for typical magnitudes
fn format_number(v: f64) -> String {
    if v == 0.0 || !v.is_finite() {
        return format!("{}", v);
    }
    let magnitude = v.abs().log10().floor() as i32;
    let decimals = (3 - magnitude).max(0) as usize;
    format!("{:.*}", decimals, v)
}

/// Long-format CSV: one line per (table, row, column) cell.
pub fn to_csv(tables: &Tables) -> Result<String> {
    let mut buffer = Vec::new();
    write_csv(tables, &mut buffer)?;
    String::from_utf8(buffer)
        .map_err(|e| Error::IoError(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))
}

/// Long-format CSV written to `writer`
pub fn write_csv<W: Write>(tables: &Tables, writer: W) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);
    wtr.write_record([
        "table", "row", "column", "unit", "center", "lo", "hi", "n", "delta", "p_value", "verdict",
    ])?;

    let opt = |v: Option<f64>| v.map(|v| v.to_string()).unwrap_or_default();

    for table in &tables.tables {
        let table_label = table.key.label();
        for row in &table.rows {
            let row_label = row.key.label();
            for (c, col) in table.columns.iter().enumerate() {
                let Some(summary) = &row.cells[c] else {
                    continue;
                };
                let comparison = row.comparisons[c].as_ref();
                wtr.write_record([
                    table_label.clone(),
                    row_label.clone(),
                    col.label(),
                    table.unit.clone(),
                    summary.center.to_string(),
                    opt(summary.lo),
                    opt(summary.hi),
                    summary.n.to_string(),
                    opt(comparison.and_then(|cmp| cmp.delta)),
                    opt(comparison.and_then(|cmp| cmp.p_value)),
                    comparison
                        .map(|cmp| cmp.verdict.as_str().to_string())
                        .unwrap_or_default(),
                ])?;
            }
        }
    }

    wtr.flush()?;
    Ok(())
}
