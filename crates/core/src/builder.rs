//! Streaming aggregation of records into (table, row, column) cells

use crate::data::Record;
use crate::projection::{Key, Projection};
use crate::tables::{self, TableOpts, Tables};
use std::collections::HashMap;
use std::hash::Hash;
use tracing::debug;

/// Keys in first-seen order with an index for lookups
#[derive(Debug, Clone)]
pub(crate) struct OrderedKeys<K> {
    keys: Vec<K>,
    index: HashMap<K, usize>,
}

impl<K: Clone + Eq + Hash> OrderedKeys<K> {
    fn new() -> Self {
        Self {
            keys: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Position of `key`, appending it if new
    fn insert(&mut self, key: K) -> usize {
        if let Some(&i) = self.index.get(&key) {
            return i;
        }
        let i = self.keys.len();
        self.index.insert(key.clone(), i);
        self.keys.push(key);
        i
    }

    pub(crate) fn keys(&self) -> &[K] {
        &self.keys
    }

    pub(crate) fn len(&self) -> usize {
        self.keys.len()
    }
}

/// Samples routed to one (table, row, column) combination
#[derive(Debug, Clone, Default)]
pub struct Cell {
    /// Canonical values in insertion order
    pub samples: Vec<f64>,
    /// Distinct residue keys of the contributing records
    pub residues: Vec<Key>,
}

impl Cell {
    fn push(&mut self, value: f64, residue: Key) {
        self.samples.push(value);
        if !self.residues.contains(&residue) {
            self.residues.push(residue);
        }
    }

    /// Whether records that disagree on a residue field were mixed
    pub fn is_confounded(&self) -> bool {
        self.residues.len() > 1
    }

    /// Names of residue fields whose values differ across the cell,
    /// sorted. A field missing from a key counts as empty.
    pub fn varying_fields(&self) -> Vec<String> {
        let mut names: Vec<&str> = Vec::new();
        for key in &self.residues {
            for field in &key.fields {
                if !names.contains(&field.name.as_str()) {
                    names.push(&field.name);
                }
            }
        }

        let mut varying: Vec<String> = names
            .into_iter()
            .filter(|name| {
                let mut values = self.residues.iter().map(|k| k.get(name).unwrap_or(""));
                let first = values.next().unwrap_or("");
                values.any(|v| v != first)
            })
            .map(str::to_string)
            .collect();
        varying.sort();
        varying
    }
}

/// Cells of one table
#[derive(Debug, Clone)]
pub(crate) struct TableCells {
    pub(crate) unit: String,
    pub(crate) rows: OrderedKeys<Key>,
    pub(crate) cols: OrderedKeys<Key>,
    pub(crate) cells: HashMap<(usize, usize), Cell>,
}

impl TableCells {
    fn new(unit: &str) -> Self {
        Self {
            unit: unit.to_string(),
            rows: OrderedKeys::new(),
            cols: OrderedKeys::new(),
            cells: HashMap::new(),
        }
    }

    pub(crate) fn cell(&self, row: usize, col: usize) -> Option<&Cell> {
        self.cells.get(&(row, col))
    }
}

/// Accumulates filtered records into cells.
///
/// The table projection should come from
/// [`ProjectionParser::parse_with_unit`](crate::projection::ProjectionParser::parse_with_unit)
/// so that every table holds a single unit.
#[derive(Debug)]
pub struct Builder {
    table: Projection,
    row: Projection,
    col: Projection,
    residue: Projection,
    tables: OrderedKeys<Key>,
    cells: Vec<TableCells>,
    samples: usize,
}

impl Builder {
    pub fn new(table: Projection, row: Projection, col: Projection, residue: Projection) -> Self {
        Self {
            table,
            row,
            col,
            residue,
            tables: OrderedKeys::new(),
            cells: Vec::new(),
            samples: 0,
        }
    }

    /// Route every value of `record` to its cell.
    pub fn add(&mut self, record: &Record) {
        let row = self.row.project(record, None);
        let col = self.col.project(record, None);
        let residue = self.residue.project(record, None);

        for value in &record.values {
            let table_key = self.table.project(record, Some(&value.unit));
            let t = self.tables.insert(table_key);
            if t == self.cells.len() {
                self.cells.push(TableCells::new(&value.unit));
            }

            let table = &mut self.cells[t];
            let r = table.rows.insert(row.clone());
            let c = table.cols.insert(col.clone());
            table
                .cells
                .entry((r, c))
                .or_default()
                .push(value.value, residue.clone());
            self.samples += 1;
        }
    }

    /// Number of tables so far
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.keys().is_empty()
    }

    /// Total number of samples added
    pub fn samples(&self) -> usize {
        self.samples
    }

    /// Cell at the given keys, if any samples reached it
    pub fn cell(&self, table: &Key, row: &Key, col: &Key) -> Option<&Cell> {
        let t = *self.tables.index.get(table)?;
        let cells = &self.cells[t];
        let r = *cells.rows.index.get(row)?;
        let c = *cells.cols.index.get(col)?;
        cells.cell(r, c)
    }

    /// Compute summaries and comparisons for every cell.
    pub fn to_tables(&self, opts: &TableOpts<'_>) -> Tables {
        debug!(
            "Finalizing {} tables from {} samples",
            self.tables.len(),
            self.samples
        );
        tables::finalize(self.tables.keys(), &self.cells, opts)
    }

    /// Consume the builder and finalize.
    pub fn finish(self, opts: &TableOpts<'_>) -> Tables {
        self.to_tables(opts)
    }
}
