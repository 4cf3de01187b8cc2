//! Unit metadata: canonical conversion and comparison direction
//!
//! Units are declared in benchmark logs with lines such as:
//! ```text
//! Unit ns/op better=lower assume=nothing
//! Unit frames canonical=kframes factor=0.001 better=higher
//! ```
//!
//! Units that are never declared fall back to built-in rules: time per
//! operation canonicalizes to `ns/op`, byte rates to `B/s`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tracing::warn;

use crate::data::Value;

/// Which direction of change is an improvement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Better {
    Lower,
    Higher,
    Unordered,
}

/// Distributional assumption used when summarizing and comparing samples
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Assumption {
    /// Nonparametric: no assumption about the distribution
    #[default]
    Nothing,
    /// Every sample is expected to be exactly the same
    Exact,
}

/// Metadata for one unit token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitMetadata {
    /// The unit as written in the log
    pub unit: String,
    /// Unit values are converted to
    pub canonical: String,
    /// Canonical value = written value * factor
    pub factor: f64,
    pub better: Better,
    pub assume: Assumption,
}

/// A unit declaration that disagreed with an earlier one
#[derive(Error, Debug, Clone, PartialEq)]
#[error("unit {unit}: conflicting {field}={ignored}, keeping earlier {field}={kept}")]
pub struct UnitWarning {
    pub unit: String,
    pub field: &'static str,
    pub kept: String,
    pub ignored: String,
}

const TIME_PER_OP: &[(&str, f64)] = &[
    ("ps/op", 1e-3),
    ("ns/op", 1.0),
    ("us/op", 1e3),
    ("µs/op", 1e3),
    ("μs/op", 1e3),
    ("ms/op", 1e6),
    ("s/op", 1e9),
    ("sec/op", 1e9),
];

const BYTE_RATE: &[(&str, f64)] = &[
    ("B/s", 1.0),
    ("kB/s", 1e3),
    ("KB/s", 1e3),
    ("MB/s", 1e6),
    ("GB/s", 1e9),
];

impl UnitMetadata {
    /// Metadata for a unit that was never declared.
    pub fn builtin(unit: &str) -> Self {
        let (canonical, factor) = if let Some((_, f)) = TIME_PER_OP.iter().find(|(u, _)| *u == unit)
        {
            ("ns/op", *f)
        } else if let Some((_, f)) = BYTE_RATE.iter().find(|(u, _)| *u == unit) {
            ("B/s", *f)
        } else {
            (unit, 1.0)
        };

        let better = if canonical.ends_with("/s") {
            Better::Higher
        } else {
            Better::Lower
        };

        Self {
            unit: unit.to_string(),
            canonical: canonical.to_string(),
            factor,
            better,
            assume: Assumption::Nothing,
        }
    }
}

/// Unit metadata accumulated while scanning inputs.
///
/// The first explicit declaration of a field wins; later conflicting
/// declarations produce a [`UnitWarning`]. An explicit declaration may refine
/// a unit that so far was only seen implicitly. Values already canonicalized
/// are not revisited when metadata changes.
#[derive(Debug, Clone, Default)]
pub struct UnitRegistry {
    units: HashMap<String, UnitMetadata>,
    /// (unit, field) -> value string of the first explicit declaration
    declared: HashMap<(String, &'static str), String>,
}

impl UnitRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Metadata for `unit`, recording built-in defaults on first use.
    pub fn resolve(&mut self, unit: &str) -> &UnitMetadata {
        self.units
            .entry(unit.to_string())
            .or_insert_with(|| UnitMetadata::builtin(unit))
    }

    /// Convert a written measurement to its canonical form.
    pub fn canonicalize(&mut self, orig_value: f64, orig_unit: &str) -> Value {
        let meta = self.resolve(orig_unit);
        Value {
            value: orig_value * meta.factor,
            unit: meta.canonical.clone(),
            orig_value,
            orig_unit: orig_unit.to_string(),
        }
    }

    /// Apply a `Unit` declaration.
    ///
    /// Returns an error message for malformed pairs; conflicts with earlier
    /// declarations are returned as warnings and otherwise ignored.
    pub fn declare(
        &mut self,
        unit: &str,
        pairs: &[(&str, &str)],
    ) -> std::result::Result<Vec<UnitWarning>, String> {
        // Validate everything before touching the registry
        let mut updates: Vec<(&'static str, &str)> = Vec::with_capacity(pairs.len());
        for &(key, value) in pairs {
            let field = match key {
                "better" => {
                    parse_better(value)?;
                    "better"
                }
                "assume" => {
                    parse_assume(value)?;
                    "assume"
                }
                "canonical" => {
                    if value.is_empty() {
                        return Err("empty canonical unit".to_string());
                    }
                    "canonical"
                }
                "factor" => {
                    parse_factor(value)?;
                    "factor"
                }
                other => return Err(format!("unknown unit metadata key {:?}", other)),
            };
            updates.push((field, value));
        }

        let mut warnings = Vec::new();
        let mut meta = self.resolve(unit).clone();

        for (field, value) in updates {
            let slot = (unit.to_string(), field);
            if let Some(kept) = self.declared.get(&slot) {
                if kept != value {
                    let warning = UnitWarning {
                        unit: unit.to_string(),
                        field,
                        kept: kept.clone(),
                        ignored: value.to_string(),
                    };
                    warn!("{}", warning);
                    warnings.push(warning);
                }
                continue;
            }

            // Checked above, the parses cannot fail here
            match field {
                "better" => meta.better = parse_better(value)?,
                "assume" => meta.assume = parse_assume(value)?,
                "canonical" => meta.canonical = value.to_string(),
                _ => meta.factor = parse_factor(value)?,
            }
            self.declared.insert(slot, value.to_string());
        }

        self.units.insert(unit.to_string(), meta);
        Ok(warnings)
    }

    /// Metadata for a canonical unit as used by tables.
    ///
    /// Looks for the unit itself, then for any declared unit converting to
    /// it, and finally falls back to built-in defaults.
    pub fn get(&self, unit: &str) -> UnitMetadata {
        if let Some(meta) = self.units.get(unit) {
            return meta.clone();
        }
        let mut via: Vec<&UnitMetadata> = self
            .units
            .values()
            .filter(|m| m.canonical == unit)
            .collect();
        // HashMap order is arbitrary; pick deterministically
        via.sort_by(|a, b| a.unit.cmp(&b.unit));
        match via.first() {
            Some(meta) => UnitMetadata {
                unit: unit.to_string(),
                canonical: unit.to_string(),
                factor: 1.0,
                better: meta.better,
                assume: meta.assume,
            },
            None => UnitMetadata::builtin(unit),
        }
    }

    /// Number of distinct unit tokens seen.
    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

fn parse_better(value: &str) -> std::result::Result<Better, String> {
    match value {
        "lower" => Ok(Better::Lower),
        "higher" => Ok(Better::Higher),
        "unordered" => Ok(Better::Unordered),
        _ => Err(format!(
            "better must be lower, higher or unordered, not {:?}",
            value
        )),
    }
}

fn parse_assume(value: &str) -> std::result::Result<Assumption, String> {
    match value {
        "nothing" => Ok(Assumption::Nothing),
        "exact" => Ok(Assumption::Exact),
        _ => Err(format!("assume must be nothing or exact, not {:?}", value)),
    }
}

fn parse_factor(value: &str) -> std::result::Result<f64, String> {
    match value.parse::<f64>() {
        Ok(f) if f.is_finite() && f > 0.0 => Ok(f),
        _ => Err(format!("factor must be a positive number, not {:?}", value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_time_units() {
        let mut units = UnitRegistry::new();
        let v = units.canonicalize(1.5, "us/op");
        assert_eq!(v.unit, "ns/op");
        assert!((v.value - 1500.0).abs() < 1e-9);
        assert_eq!(v.orig_value, 1.5);
        assert_eq!(v.orig_unit, "us/op");

        let v = units.canonicalize(2.0, "sec/op");
        assert!((v.value - 2e9).abs() < 1e-3);
    }

    #[test]
    fn test_canonical_unit_round_trip() {
        let mut units = UnitRegistry::new();
        for (value, unit) in [(12.5, "ns/op"), (64.0, "B/op"), (3.0, "allocs/op")] {
            let v = units.canonicalize(value, unit);
            assert_eq!(v.value, v.orig_value);
            assert_eq!(v.unit, v.orig_unit);
        }
    }

    #[test]
    fn test_default_direction() {
        assert_eq!(UnitMetadata::builtin("ns/op").better, Better::Lower);
        assert_eq!(UnitMetadata::builtin("MB/s").better, Better::Higher);
        assert_eq!(UnitMetadata::builtin("MB/s").canonical, "B/s");
        assert_eq!(UnitMetadata::builtin("widgets").better, Better::Lower);
    }

    #[test]
    fn test_declare_first_wins() {
        let mut units = UnitRegistry::new();
        let warnings = units
            .declare("frames", &[("better", "higher")])
            .unwrap();
        assert!(warnings.is_empty());

        let warnings = units
            .declare("frames", &[("better", "lower"), ("assume", "exact")])
            .unwrap();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].field, "better");
        assert_eq!(warnings[0].kept, "higher");
        assert_eq!(warnings[0].ignored, "lower");

        let meta = units.get("frames");
        assert_eq!(meta.better, Better::Higher);
        // Non-conflicting fields still apply
        assert_eq!(meta.assume, Assumption::Exact);
    }

    #[test]
    fn test_declare_same_value_is_not_a_conflict() {
        let mut units = UnitRegistry::new();
        units.declare("B/op", &[("better", "lower")]).unwrap();
        let warnings = units.declare("B/op", &[("better", "lower")]).unwrap();
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_declare_overrides_implicit() {
        let mut units = UnitRegistry::new();
        let before = units.canonicalize(10.0, "widgets");
        assert_eq!(before.value, 10.0);

        units
            .declare("widgets", &[("canonical", "kwidgets"), ("factor", "0.001")])
            .unwrap();
        let after = units.canonicalize(10.0, "widgets");
        assert_eq!(after.unit, "kwidgets");
        assert!((after.value - 0.01).abs() < 1e-12);

        // Earlier values are not converted retroactively
        assert_eq!(before.unit, "widgets");
    }

    #[test]
    fn test_get_via_canonical() {
        let mut units = UnitRegistry::new();
        units
            .declare(
                "frames",
                &[("canonical", "kframes"), ("factor", "0.001"), ("better", "higher")],
            )
            .unwrap();
        assert_eq!(units.get("kframes").better, Better::Higher);
    }

    #[test]
    fn test_declare_rejects_bad_pairs() {
        let mut units = UnitRegistry::new();
        assert!(units.declare("x", &[("better", "sideways")]).is_err());
        assert!(units.declare("x", &[("factor", "-1")]).is_err());
        assert!(units.declare("x", &[("color", "red")]).is_err());
        assert!(units.is_empty());
    }
}
