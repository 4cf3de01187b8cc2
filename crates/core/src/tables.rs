//! Finalized comparison tables

use crate::builder::{OrderedKeys, TableCells};
use crate::projection::Key;
use crate::stats::{self, Comparison, Summary, Thresholds, DEFAULT_CONFIDENCE};
use crate::units::{Assumption, Better, UnitRegistry};
use serde::Serialize;
use tracing::{debug, warn};

/// Options for finalizing tables
#[derive(Debug, Clone, Copy)]
pub struct TableOpts<'a> {
    /// Confidence level of cell intervals
    pub confidence: f64,
    pub thresholds: Thresholds,
    /// Unit metadata collected while parsing
    pub units: &'a UnitRegistry,
    /// Label of the column to compare against; the first column if unset
    pub baseline: Option<&'a str>,
}

impl<'a> TableOpts<'a> {
    pub fn new(units: &'a UnitRegistry) -> Self {
        Self {
            confidence: DEFAULT_CONFIDENCE,
            thresholds: Thresholds::default(),
            units,
            baseline: None,
        }
    }
}

/// All tables of a report, in first-seen order
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Tables {
    pub tables: Vec<Table>,
}

impl Tables {
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Find a table by its label, e.g. `"ns/op"` or `"goos=linux ns/op"`
    pub fn get(&self, label: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.key.label() == label)
    }
}

/// One table: a single unit, rows by columns
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Table {
    pub key: Key,
    /// Canonical unit of every cell
    pub unit: String,
    pub better: Better,
    pub assume: Assumption,
    pub columns: Vec<Key>,
    /// Index into `columns` of the baseline column
    pub baseline: usize,
    pub rows: Vec<Row>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geomean: Option<Geomean>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

impl Table {
    /// Find a row by its label
    pub fn row(&self, label: &str) -> Option<&Row> {
        self.rows.iter().find(|r| r.key.label() == label)
    }

    /// Index of the column with the given label
    pub fn column(&self, label: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.label() == label)
    }
}

/// One row of a table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Row {
    pub key: Key,
    /// One entry per column; `None` when no samples reached the cell
    pub cells: Vec<Option<Summary>>,
    /// One entry per column; `None` for the baseline and for missing cells
    pub comparisons: Vec<Option<Comparison>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

/// Geometric mean of row centers per column
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Geomean {
    /// One entry per column
    pub centers: Vec<Option<f64>>,
    /// Change against the baseline column's geomean
    pub deltas: Vec<Option<f64>>,
    /// Number of rows that contributed
    pub rows: usize,
}

pub(crate) fn finalize(keys: &[Key], cells: &[TableCells], opts: &TableOpts<'_>) -> Tables {
    let tables = keys
        .iter()
        .zip(cells)
        .map(|(key, cells)| finalize_table(key, cells, opts))
        .collect();
    Tables { tables }
}

fn finalize_table(key: &Key, cells: &TableCells, opts: &TableOpts<'_>) -> Table {
    let meta = opts.units.get(&cells.unit);
    let columns = cells.cols.keys().to_vec();
    let mut notes = Vec::new();

    let baseline = match opts.baseline {
        Some(label) => match find_column(&cells.cols, label) {
            Some(i) => i,
            None => {
                notes.push(format!(
                    "baseline {:?} not found, comparing against {}",
                    label,
                    columns.first().map(Key::label).unwrap_or_default()
                ));
                0
            }
        },
        None => 0,
    };

    let mut rows = Vec::with_capacity(cells.rows.len());
    for (r, row_key) in cells.rows.keys().iter().enumerate() {
        let mut row = Row {
            key: row_key.clone(),
            cells: Vec::with_capacity(columns.len()),
            comparisons: Vec::with_capacity(columns.len()),
            notes: Vec::new(),
        };

        for (c, col_key) in columns.iter().enumerate() {
            let cell = cells.cell(r, c);
            row.cells.push(cell.map(|cell| {
                stats::summarize_as(&cell.samples, opts.confidence, meta.assume)
            }));

            if let Some(cell) = cell.filter(|cell| cell.is_confounded()) {
                let note = format!(
                    "{}: mixes records with different {}",
                    col_key.label(),
                    cell.varying_fields().join(", ")
                );
                warn!("{} {}: {}", key.label(), row_key.label(), note);
                row.notes.push(note);
            }

            let comparison = match (cells.cell(r, baseline), cell) {
                (Some(base), Some(cand)) if c != baseline => Some(stats::compare_as(
                    &base.samples,
                    &cand.samples,
                    &opts.thresholds,
                    meta.better,
                    meta.assume,
                )),
                _ => None,
            };
            row.comparisons.push(comparison);
        }
        rows.push(row);
    }

    let geomean = if rows.len() > 1 {
        geomean(&rows, columns.len(), baseline)
    } else {
        None
    };

    debug!(
        "Table {:?}: {} rows x {} columns",
        key.label(),
        rows.len(),
        columns.len()
    );

    Table {
        key: key.clone(),
        unit: cells.unit.clone(),
        better: meta.better,
        assume: meta.assume,
        columns,
        baseline,
        rows,
        geomean,
        notes,
    }
}

/// Column whose label, or any field value, equals `label`
fn find_column(cols: &OrderedKeys<Key>, label: &str) -> Option<usize> {
    let keys = cols.keys();
    keys.iter().position(|k| k.label() == label).or_else(|| {
        keys.iter()
            .position(|k| k.fields.iter().any(|f| f.value == label))
    })
}

/// Geomean over rows where every column has a positive center
fn geomean(rows: &[Row], ncols: usize, baseline: usize) -> Option<Geomean> {
    let complete: Vec<Vec<f64>> = rows
        .iter()
        .filter_map(|row| {
            row.cells
                .iter()
                .map(|cell| cell.as_ref().map(|s| s.center).filter(|&c| c > 0.0))
                .collect::<Option<Vec<f64>>>()
        })
        .collect();
    if complete.is_empty() {
        return None;
    }

    let centers: Vec<Option<f64>> = (0..ncols)
        .map(|c| {
            let column: Vec<f64> = complete.iter().map(|row| row[c]).collect();
            stats::geomean(&column)
        })
        .collect();

    let base = centers.get(baseline).copied().flatten();
    let deltas = centers
        .iter()
        .enumerate()
        .map(|(c, center)| match (base, center) {
            (Some(b), Some(x)) if c != baseline => Some(x / b - 1.0),
            _ => None,
        })
        .collect();

    Some(Geomean {
        centers,
        deltas,
        rows: complete.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::Builder;
    use crate::parser::{parse_inputs, Input};
    use crate::projection::ProjectionParser;
    use crate::stats::Verdict;

    const OLD: &str = "\
BenchmarkA 1 10 ns/op
BenchmarkA 1 11 ns/op
BenchmarkA 1 10 ns/op
BenchmarkA 1 12 ns/op
BenchmarkA 1 11 ns/op
BenchmarkB 1 100 ns/op
BenchmarkB 1 100 ns/op
";

    const NEW: &str = "\
BenchmarkA 1 5 ns/op
BenchmarkA 1 6 ns/op
BenchmarkA 1 5 ns/op
BenchmarkA 1 6 ns/op
BenchmarkA 1 5 ns/op
BenchmarkB 1 50 ns/op
BenchmarkB 1 50 ns/op
BenchmarkC 1 7 ns/op
";

    fn build(inputs: Vec<Input>, baseline: Option<&str>) -> Tables {
        let outcome = parse_inputs(inputs).unwrap();
        let mut parser = ProjectionParser::new();
        let (table, _) = parser.parse_with_unit("").unwrap();
        let row = parser.parse_required(".fullname").unwrap();
        let col = parser.parse(".file").unwrap();
        let residue = parser.residue();
        let mut builder = Builder::new(table, row, col, residue);
        for record in &outcome.records {
            builder.add(record);
        }
        let mut opts = TableOpts::new(&outcome.units);
        opts.baseline = baseline;
        builder.finish(&opts)
    }

    #[test]
    fn test_rows_columns_and_missing_cells() {
        let tables = build(
            vec![Input::text("old", OLD), Input::text("new", NEW)],
            None,
        );
        assert_eq!(tables.len(), 1);
        let table = tables.get("ns/op").unwrap();
        assert_eq!(table.baseline, 0);
        assert_eq!(table.column("old"), Some(0));
        assert_eq!(table.column("new"), Some(1));

        let c = table.row("BenchmarkC").unwrap();
        assert!(c.cells[0].is_none());
        assert_eq!(c.cells[1].as_ref().unwrap().n, 1);
        assert!(c.comparisons.iter().all(Option::is_none));

        let a = table.row("BenchmarkA").unwrap();
        assert!(a.comparisons[0].is_none());
        assert_eq!(
            a.comparisons[1].as_ref().unwrap().verdict,
            Verdict::Improved
        );

        // Two samples a side are too few to call
        let b = table.row("BenchmarkB").unwrap();
        assert_eq!(
            b.comparisons[1].as_ref().unwrap().verdict,
            Verdict::InsufficientData
        );
    }

    #[test]
    fn test_explicit_baseline() {
        let tables = build(
            vec![Input::text("old", OLD), Input::text("new", NEW)],
            Some("new"),
        );
        let table = &tables.tables[0];
        assert_eq!(table.baseline, 1);
        assert!(table.notes.is_empty());
        let a = table.row("BenchmarkA").unwrap();
        assert_eq!(
            a.comparisons[0].as_ref().unwrap().verdict,
            Verdict::Regressed
        );
        assert!(a.comparisons[1].is_none());
    }

    #[test]
    fn test_missing_baseline_noted() {
        let tables = build(
            vec![Input::text("old", OLD), Input::text("new", NEW)],
            Some("nope"),
        );
        let table = &tables.tables[0];
        assert_eq!(table.baseline, 0);
        assert_eq!(table.notes.len(), 1);
    }

    #[test]
    fn test_geomean_skips_incomplete_rows() {
        let tables = build(
            vec![Input::text("old", OLD), Input::text("new", NEW)],
            None,
        );
        let g = tables.tables[0].geomean.as_ref().unwrap();
        // BenchmarkC has no old cell
        assert_eq!(g.rows, 2);
        let old = g.centers[0].unwrap();
        let new = g.centers[1].unwrap();
        assert!((old - (11.0f64 * 100.0).sqrt()).abs() < 1e-9);
        assert!((new - (5.0f64 * 50.0).sqrt()).abs() < 1e-9);
        assert!(g.deltas[0].is_none());
        assert!((g.deltas[1].unwrap() - (new / old - 1.0)).abs() < 1e-12);
    }

    #[test]
    fn test_single_row_has_no_geomean() {
        let tables = build(vec![Input::text("only", "BenchmarkA 1 5 ns/op\n")], None);
        assert!(tables.tables[0].geomean.is_none());
    }
}
