//! Report configuration and the one-call pipeline
//!
//! ```json
//! { "filter": ".unit:ns/op", "row": ".name", "col": ".file", "compareAlpha": 0.01 }
//! ```

use crate::builder::Builder;
use crate::data::Record;
use crate::error::{Error, FilterError, Result};
use crate::filter::Filter;
use crate::projection::ProjectionParser;
use crate::stats::{Thresholds, DEFAULT_COMPARE_ALPHA, DEFAULT_CONFIDENCE};
use crate::tables::{TableOpts, Tables};
use crate::units::UnitRegistry;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

pub const DEFAULT_FILTER: &str = "*";
pub const DEFAULT_ROW: &str = ".fullname";
pub const DEFAULT_COL: &str = ".file";
pub const DEFAULT_IGNORE: &str = "";
pub const DEFAULT_TABLE: &str = ".config";

/// Report configuration. Unset fields take their defaults in
/// [`Config::resolve`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(alias = "Filter", skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    #[serde(alias = "Row", skip_serializing_if = "Option::is_none")]
    pub row: Option<String>,
    #[serde(alias = "Col", skip_serializing_if = "Option::is_none")]
    pub col: Option<String>,
    #[serde(alias = "Ignore", skip_serializing_if = "Option::is_none")]
    pub ignore: Option<String>,
    #[serde(alias = "Table", skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(alias = "Confidence", skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(
        alias = "compareAlpha",
        alias = "CompareAlpha",
        skip_serializing_if = "Option::is_none"
    )]
    pub compare_alpha: Option<f64>,
    #[serde(alias = "Baseline", skip_serializing_if = "Option::is_none")]
    pub baseline: Option<String>,
}

/// Configuration with every default applied
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    pub filter: String,
    pub row: String,
    pub col: String,
    pub ignore: String,
    pub table: String,
    pub confidence: f64,
    pub thresholds: Thresholds,
    pub baseline: Option<String>,
}

impl Config {
    /// Load configuration from a JSON file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::FileReadError {
            path: path.display().to_string(),
            source: e,
        })?;

        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Overlay `other` on top of `self`; set fields of `other` win.
    pub fn merge(self, other: Config) -> Config {
        Config {
            filter: other.filter.or(self.filter),
            row: other.row.or(self.row),
            col: other.col.or(self.col),
            ignore: other.ignore.or(self.ignore),
            table: other.table.or(self.table),
            confidence: other.confidence.or(self.confidence),
            compare_alpha: other.compare_alpha.or(self.compare_alpha),
            baseline: other.baseline.or(self.baseline),
        }
    }

    /// Apply defaults and validate numeric settings.
    pub fn resolve(&self) -> Result<ResolvedConfig> {
        let confidence = self.confidence.unwrap_or(DEFAULT_CONFIDENCE);
        if !(confidence > 0.0 && confidence < 1.0) {
            return Err(Error::ConfigError(format!(
                "confidence must be between 0 and 1, got {}",
                confidence
            )));
        }

        let compare_alpha = self.compare_alpha.unwrap_or(DEFAULT_COMPARE_ALPHA);
        if !(compare_alpha > 0.0 && compare_alpha < 1.0) {
            return Err(Error::ConfigError(format!(
                "compare alpha must be between 0 and 1, got {}",
                compare_alpha
            )));
        }

        let text = |value: &Option<String>, default: &str| {
            value.clone().unwrap_or_else(|| default.to_string())
        };

        Ok(ResolvedConfig {
            filter: text(&self.filter, DEFAULT_FILTER),
            row: text(&self.row, DEFAULT_ROW),
            col: text(&self.col, DEFAULT_COL),
            ignore: text(&self.ignore, DEFAULT_IGNORE),
            table: text(&self.table, DEFAULT_TABLE),
            confidence,
            thresholds: Thresholds { compare_alpha },
            baseline: self.baseline.clone().filter(|b| !b.is_empty()),
        })
    }
}

/// Tables plus what the filter had to say along the way
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Report {
    pub tables: Tables,
    /// Records the filter kept
    pub kept: usize,
    /// Records the filter dropped
    pub dropped: usize,
    /// Records that matched except that none of their units did
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rejected: Vec<FilterError>,
}

/// Compile the configuration, then filter, group and summarize `records`.
///
/// Projections are compiled in table, row, column, ignore order so that
/// `.config` in the table projection excludes keys the others claim.
pub fn build_tables<I>(config: &Config, records: I, units: &UnitRegistry) -> Result<Report>
where
    I: IntoIterator<Item = Record>,
{
    let resolved = config.resolve()?;

    let mut parser = ProjectionParser::new();
    let (table, _) = parser
        .parse_with_unit(&resolved.table)
        .map_err(|source| Error::Spec {
            what: "-table",
            source,
        })?;
    let row = parser
        .parse_required(&resolved.row)
        .map_err(|source| Error::Spec {
            what: "-row",
            source,
        })?;
    let col = parser.parse(&resolved.col).map_err(|source| Error::Spec {
        what: "-col",
        source,
    })?;
    parser
        .parse(&resolved.ignore)
        .map_err(|source| Error::Spec {
            what: "-ignore",
            source,
        })?;
    let residue = parser.residue();

    let filter = Filter::new(&resolved.filter)?;
    debug!("Compiled filter {}", filter);

    let mut builder = Builder::new(table, row, col, residue);
    let mut report = Report::default();
    for mut record in records {
        match filter.apply(&mut record) {
            Ok(true) => {
                builder.add(&record);
                report.kept += 1;
            }
            Ok(false) => report.dropped += 1,
            Err(e) => {
                debug!("Filter rejected record: {}", e);
                report.dropped += 1;
                report.rejected.push(e);
            }
        }
    }

    info!(
        "Kept {} records ({} dropped) in {} tables",
        report.kept,
        report.dropped,
        builder.len()
    );

    let opts = TableOpts {
        confidence: resolved.confidence,
        thresholds: resolved.thresholds,
        units,
        baseline: resolved.baseline.as_deref(),
    };
    report.tables = builder.finish(&opts);
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProjectionError;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let resolved = Config::default().resolve().unwrap();
        assert_eq!(resolved.filter, "*");
        assert_eq!(resolved.row, ".fullname");
        assert_eq!(resolved.col, ".file");
        assert_eq!(resolved.ignore, "");
        assert_eq!(resolved.table, ".config");
        assert_eq!(resolved.confidence, 0.95);
        assert_eq!(resolved.thresholds.compare_alpha, 0.05);
        assert_eq!(resolved.baseline, None);
    }

    #[test]
    fn test_resolve_rejects_bad_levels() {
        let config = Config {
            confidence: Some(1.5),
            ..Default::default()
        };
        assert!(matches!(config.resolve(), Err(Error::ConfigError(_))));

        let config = Config {
            compare_alpha: Some(0.0),
            ..Default::default()
        };
        assert!(matches!(config.resolve(), Err(Error::ConfigError(_))));
    }

    #[test]
    fn test_load_from_file_accepts_both_cases() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"Row": ".name", "compareAlpha": 0.01, "confidence": 0.9}}"#
        )
        .unwrap();

        let config = Config::load_from_file(file.path()).unwrap();
        assert_eq!(config.row.as_deref(), Some(".name"));
        assert_eq!(config.compare_alpha, Some(0.01));
        assert_eq!(config.confidence, Some(0.9));
        assert_eq!(config.filter, None);
    }

    #[test]
    fn test_merge_prefers_overrides() {
        let base = Config {
            row: Some(".name".into()),
            col: Some("goos".into()),
            ..Default::default()
        };
        let flags = Config {
            col: Some(".file".into()),
            ..Default::default()
        };
        let merged = base.merge(flags);
        assert_eq!(merged.row.as_deref(), Some(".name"));
        assert_eq!(merged.col.as_deref(), Some(".file"));
    }

    #[test]
    fn test_bad_row_names_the_flag() {
        let config = Config {
            row: Some(".bogus".into()),
            ..Default::default()
        };
        let err = build_tables(&config, Vec::new(), &UnitRegistry::new()).unwrap_err();
        match err {
            Error::Spec { what, source } => {
                assert_eq!(what, "-row");
                assert_eq!(source, ProjectionError::UnknownField(".bogus".into()));
            }
            other => panic!("unexpected error {other:?}"),
        }

        let config = Config {
            row: Some(" ".into()),
            ..Default::default()
        };
        assert!(matches!(
            build_tables(&config, Vec::new(), &UnitRegistry::new()),
            Err(Error::Spec { what: "-row", .. })
        ));
    }

    #[test]
    fn test_bad_filter() {
        let config = Config {
            filter: Some("(a:b".into()),
            ..Default::default()
        };
        assert!(matches!(
            build_tables(&config, Vec::new(), &UnitRegistry::new()),
            Err(Error::Filter(_))
        ));
    }
}
