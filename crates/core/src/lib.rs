//! benchtab-core - Statistical comparison tables for Go-format benchmark logs
//!
//! This crate contains the engine behind the `benchtab` CLI. It has no
//! process or terminal concerns and can be embedded in other hosts.
//!
//! # Features
//!
//! - Parse benchmark logs (`Benchmark...` result lines, `key: value`
//!   configuration, `Unit` metadata) into records
//! - Group records into tables, rows and columns with projection specs
//!   such as `.fullname`, `/size` or `goos`
//! - Select records with filter expressions (`.unit:ns/op -/size:1*`)
//! - Summarize cells with median confidence intervals and compare columns
//!   with the Mann-Whitney U test
//! - Render tables as text, CSV or JSON
//!
//! # Example
//!
//! ```no_run
//! use benchtab_core::{build_tables, parse_inputs, render, Config, Input};
//!
//! let outcome = parse_inputs(vec![
//!     Input::path("old", "old.txt"),
//!     Input::path("new", "new.txt"),
//! ])
//! .unwrap();
//! let report = build_tables(&Config::default(), outcome.records, &outcome.units).unwrap();
//! println!("{}", render::to_text(&report.tables));
//! ```

pub mod builder;
pub mod config;
pub mod data;
pub mod error;
pub mod filter;
pub mod parser;
pub mod projection;
pub mod render;
pub mod stats;
pub mod tables;
pub mod units;

pub use builder::{Builder, Cell};
pub use config::{build_tables, Config, Report, ResolvedConfig};
pub use data::{ConfigEntry, Record, Value};
pub use error::{Error, FilterError, ProjectionError, Result, SyntaxError};
pub use filter::Filter;
pub use parser::{parse_inputs, parse_str, Input, ParseOutcome, Parsed, Scanner, Source};
pub use projection::{Key, KeyField, Projection, ProjectionParser};
pub use stats::{compare, summarize, Comparison, Summary, Thresholds, Verdict};
pub use tables::{Geomean, Row, Table, TableOpts, Tables};
pub use units::{Assumption, Better, UnitMetadata, UnitRegistry, UnitWarning};
