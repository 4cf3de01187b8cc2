//! benchtab CLI - Statistical comparison tables for benchmark logs
//!
//! Reads Go-format benchmark output from one or more files and prints one
//! table per unit, comparing every column against a baseline.

mod error;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::{debug, error, info, warn};

use benchtab_core::{build_tables, parse_inputs as scan_inputs, render, Config, Input, ParseOutcome};
use error::InputError;

/// benchtab: compare benchmark runs with confidence intervals and rank tests
#[derive(Parser, Debug)]
#[command(name = "benchtab")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Benchmark logs, as `label=path` or just `path`
    #[arg(required = true, value_name = "INPUT")]
    inputs: Vec<String>,

    /// Only use results matching this expression, e.g. `.unit:ns/op goos:linux`
    #[arg(long, value_name = "EXPR")]
    filter: Option<String>,

    /// Fields that name table rows [default: .fullname]
    #[arg(long, value_name = "FIELDS")]
    row: Option<String>,

    /// Fields that name table columns [default: .file]
    #[arg(long, value_name = "FIELDS")]
    col: Option<String>,

    /// Fields that split results into separate tables [default: .config]
    #[arg(long, value_name = "FIELDS")]
    table: Option<String>,

    /// Fields to leave out of grouping and confound checks
    #[arg(long, value_name = "FIELDS")]
    ignore: Option<String>,

    /// Confidence level for intervals [default: 0.95]
    #[arg(long)]
    confidence: Option<f64>,

    /// Significance level for comparisons [default: 0.05]
    #[arg(long)]
    alpha: Option<f64>,

    /// Column to compare the others against [default: first column]
    #[arg(long)]
    baseline: Option<String>,

    /// Output format
    #[arg(long, value_enum, default_value_t = Format::Text)]
    format: Format,

    /// JSON configuration file; flags override its settings
    #[arg(long, value_name = "FILE", env = "BENCHTAB_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
    Csv,
    /// Parsed records as JSON, without grouping or statistics
    Records,
}

impl Cli {
    /// Settings given as flags
    fn flag_config(&self) -> Config {
        Config {
            filter: self.filter.clone(),
            row: self.row.clone(),
            col: self.col.clone(),
            ignore: self.ignore.clone(),
            table: self.table.clone(),
            confidence: self.confidence,
            compare_alpha: self.alpha,
            baseline: self.baseline.clone(),
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = match &cli.config {
        Some(path) => Config::load_from_file(path)
            .with_context(|| format!("Failed to load configuration from {:?}", path))?,
        None => Config::default(),
    };
    let config = config.merge(cli.flag_config());
    debug!("Configuration: {:?}", config);

    let inputs = parse_input_args(&cli.inputs)?;
    let outcome = read_records(inputs)?;

    let (output, read_error) = render_outcome(cli.format, &config, outcome)?;
    print!("{}", output);

    if let Some(err) = read_error {
        return Err(anyhow::Error::new(err).context("Failed to read benchmark input"));
    }
    Ok(())
}

/// Scan all inputs and log what could not be read.
///
/// A failure to open or read an input does not discard the records read
/// before it; the error is left in the outcome.
fn read_records(inputs: Vec<Input>) -> Result<ParseOutcome> {
    let outcome = scan_inputs(inputs)?;
    for err in &outcome.syntax_errors {
        warn!("{}", err);
    }
    info!(
        "Parsed {} benchmark results ({} malformed lines)",
        outcome.records.len(),
        outcome.syntax_errors.len()
    );
    if let Some(err) = &outcome.error {
        error!("Stopped reading input early: {}", err);
    }
    Ok(outcome)
}

/// Render the records that were read. A read error is handed back next to
/// the output.
fn render_outcome(
    format: Format,
    config: &Config,
    mut outcome: ParseOutcome,
) -> Result<(String, Option<benchtab_core::Error>)> {
    let read_error = outcome.error.take();

    let output = match format {
        Format::Records => render::records_to_json(&outcome.records, &outcome.syntax_errors)?,
        Format::Text | Format::Json | Format::Csv => {
            let report = build_tables(config, outcome.records, &outcome.units)
                .context("Failed to build tables")?;
            for rejected in &report.rejected {
                debug!("{}", rejected);
            }
            if report.tables.is_empty() {
                warn!("No benchmark results matched");
            }
            match format {
                Format::Json => render::to_json(&report)?,
                Format::Csv => render::to_csv(&report.tables)?,
                _ => render::to_text(&report.tables),
            }
        }
    };

    Ok((output, read_error))
}

/// Turn `label=path` or `path` arguments into inputs with unique labels.
fn parse_input_args(args: &[String]) -> Result<Vec<Input>, InputError> {
    let mut seen = HashSet::new();
    let mut inputs = Vec::with_capacity(args.len());
    for arg in args {
        let input = parse_input(arg)?;
        if !seen.insert(input.label.clone()) {
            return Err(InputError::DuplicateLabel(input.label));
        }
        inputs.push(input);
    }
    Ok(inputs)
}

fn parse_input(arg: &str) -> Result<Input, InputError> {
    match arg.split_once('=') {
        Some(("", _)) => Err(InputError::EmptyLabel(arg.to_string())),
        Some((_, "")) => Err(InputError::EmptyPath(arg.to_string())),
        Some((label, path)) => Ok(Input::path(label, path)),
        None if arg.is_empty() => Err(InputError::EmptyPath(arg.to_string())),
        None => Ok(Input::path(arg, arg)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use benchtab_core::Source;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_input_forms() {
        let input = parse_input("old=runs/old.txt").unwrap();
        assert_eq!(input.label, "old");
        assert!(matches!(input.source, Source::Path(ref p) if p == &PathBuf::from("runs/old.txt")));

        let input = parse_input("new.txt").unwrap();
        assert_eq!(input.label, "new.txt");

        assert_eq!(
            parse_input("=x").unwrap_err(),
            InputError::EmptyLabel("=x".into())
        );
        assert_eq!(
            parse_input("x=").unwrap_err(),
            InputError::EmptyPath("x=".into())
        );
    }

    #[test]
    fn test_duplicate_labels_rejected() {
        let args = vec!["a=1.txt".to_string(), "a=2.txt".to_string()];
        assert_eq!(
            parse_input_args(&args).unwrap_err(),
            InputError::DuplicateLabel("a".into())
        );
    }

    #[test]
    fn test_flags_become_config() {
        let cli = Cli::try_parse_from([
            "benchtab",
            "--row",
            ".name",
            "--alpha",
            "0.01",
            "--format",
            "csv",
            "old.txt",
            "new.txt",
        ])
        .unwrap();
        assert_eq!(cli.format, Format::Csv);
        assert_eq!(cli.inputs, vec!["old.txt", "new.txt"]);

        let config = cli.flag_config();
        assert_eq!(config.row.as_deref(), Some(".name"));
        assert_eq!(config.compare_alpha, Some(0.01));
        assert_eq!(config.col, None);
    }

    #[test]
    fn test_inputs_required() {
        assert!(Cli::try_parse_from(["benchtab"]).is_err());
    }

    #[test]
    fn test_read_records_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "BenchmarkA 10 5 ns/op").unwrap();
        writeln!(file, "BenchmarkB oops").unwrap();
        writeln!(file, "BenchmarkC 10 7 ns/op").unwrap();

        let outcome = read_records(vec![Input::path("f", file.path())]).unwrap();
        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.syntax_errors.len(), 1);
        assert!(!outcome.units.is_empty());
        assert!(outcome.error.is_none());
    }

    #[test]
    fn test_unreadable_input_keeps_earlier_results() {
        let outcome = read_records(vec![
            Input::text("ok", "BenchmarkA 1 5 ns/op\nBenchmarkA 1 6 ns/op\n"),
            Input::path("gone", "/nonexistent/benchtab.txt"),
        ])
        .unwrap();
        assert_eq!(outcome.records.len(), 2);
        assert!(outcome.error.is_some());

        let (output, read_error) =
            render_outcome(Format::Csv, &Config::default(), outcome).unwrap();
        let rows: Vec<&str> = output.lines().skip(1).collect();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].starts_with("ns/op,BenchmarkA,ok,ns/op,"));

        let err = anyhow::Error::new(read_error.unwrap()).context("Failed to read benchmark input");
        assert!(err.to_string().contains("Failed to read benchmark input"));
        assert!(format!("{:#}", err).contains("/nonexistent/benchtab.txt"));
    }

    #[test]
    fn test_records_format() {
        let cli = Cli::try_parse_from(["benchtab", "--format", "records", "old.txt"]).unwrap();
        assert_eq!(cli.format, Format::Records);

        let outcome = read_records(vec![Input::text(
            "old",
            "goos: linux\nBenchmarkA 1 5 ns/op\nBenchmarkB oops\n",
        )])
        .unwrap();
        // Filters do not apply to the record export
        let config = Config {
            filter: Some("goos:darwin".to_string()),
            ..Config::default()
        };
        let (output, read_error) = render_outcome(Format::Records, &config, outcome).unwrap();
        assert!(read_error.is_none());

        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["records"][0]["name"], "BenchmarkA");
        assert_eq!(value["records"][0]["config"][0]["value"], "linux");
        assert_eq!(value["syntax_errors"][0]["line"], 3);
    }
}
