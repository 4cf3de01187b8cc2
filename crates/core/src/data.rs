//! Data structures for parsed benchmark records

use serde::{Deserialize, Serialize};

/// Key under which a trailing `-N` name suffix is recorded
pub const GOMAXPROCS_KEY: &str = "/gomaxprocs";

/// One parsed benchmark measurement line
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Record {
    /// Full benchmark name as written (e.g. `BenchmarkX/size=100-8`)
    pub name: String,
    /// Label of the input this record was read from
    pub source: String,
    /// File configuration followed by name-derived configuration
    pub config: Vec<ConfigEntry>,
    /// Iteration count the measurements represent
    #[serde(rename = "iters")]
    pub iterations: u64,
    /// Measurements, at least one
    pub values: Vec<Value>,
}

/// A configuration key/value attached to a record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfigEntry {
    pub key: String,
    pub value: String,
    /// Set by a file configuration line rather than parsed from the name
    pub file: bool,
}

/// A single measurement
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Value {
    /// Canonicalized value
    pub value: f64,
    /// Canonical unit
    pub unit: String,
    /// Value as written
    pub orig_value: f64,
    /// Unit as written
    pub orig_unit: String,
}

impl Record {
    /// Look up a configuration value by exact key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.config
            .iter()
            .find(|c| c.key == key)
            .map(|c| c.value.as_str())
    }

    /// Base name: the full name up to the first `/`, without a `-N` suffix.
    pub fn base_name(&self) -> &str {
        split_name(&self.name).0
    }
}

/// Split a full benchmark name into its base name and name-derived config.
///
/// `BenchmarkX/size=100/fast-8` yields `BenchmarkX` and
/// `[("/size", "100"), ("/2", "fast"), ("/gomaxprocs", "8")]`. Parts without
/// `=` are keyed by their 1-based position.
pub fn split_name(full: &str) -> (&str, Vec<(String, String)>) {
    let (rest, procs) = match full.rsplit_once('-') {
        Some((head, digits))
            if !head.is_empty()
                && !digits.is_empty()
                && digits.bytes().all(|b| b.is_ascii_digit()) =>
        {
            (head, Some(digits))
        }
        _ => (full, None),
    };

    let mut parts = rest.split('/');
    let base = parts.next().unwrap_or(rest);

    let mut keys: Vec<(String, String)> = parts
        .enumerate()
        .map(|(i, part)| match part.split_once('=') {
            Some((k, v)) => (format!("/{}", k), v.to_string()),
            None => (format!("/{}", i + 1), part.to_string()),
        })
        .collect();

    if let Some(procs) = procs {
        keys.push((GOMAXPROCS_KEY.to_string(), procs.to_string()));
    }

    (base, keys)
}
