//! Parser for Go-style benchmark logs
//!
//! Result lines:
//! ```text
//! BenchmarkCrc/size=15-8     1000000     101.5 ns/op     147.8 MB/s
//! ```
//!
//! Configuration lines apply to every following result in the same input:
//! ```text
//! goos: linux
//! pkg: hash/crc32
//! ```
//!
//! Unit lines declare metadata (see [`crate::units`]):
//! ```text
//! Unit ns/op better=lower
//! ```
//!
//! Every other line is ignored. Malformed result and unit lines are yielded
//! as [`SyntaxError`]s and scanning continues.

use crate::data::{split_name, ConfigEntry, Record};
use crate::error::{Error, Result, SyntaxError};
use crate::units::{UnitRegistry, UnitWarning};
use regex::Regex;
use std::fs::File;
use std::io::{BufRead, BufReader, Cursor};
use std::path::PathBuf;
use tracing::debug;

/// Where an input's text comes from
#[derive(Debug, Clone)]
pub enum Source {
    Path(PathBuf),
    Text(String),
}

/// A labelled input to scan
#[derive(Debug, Clone)]
pub struct Input {
    /// Label used in diagnostics and as the `.file` dimension
    pub label: String,
    pub source: Source,
}

impl Input {
    /// An input read from a file
    pub fn path(label: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            label: label.into(),
            source: Source::Path(path.into()),
        }
    }

    /// An in-memory input
    pub fn text(label: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            source: Source::Text(text.into()),
        }
    }

    fn open(self) -> Result<OpenInput> {
        let reader: Box<dyn BufRead> = match self.source {
            Source::Path(path) => {
                let file = File::open(&path).map_err(|e| Error::FileReadError {
                    path: path.display().to_string(),
                    source: e,
                })?;
                Box::new(BufReader::new(file))
            }
            Source::Text(text) => Box::new(Cursor::new(text.into_bytes())),
        };
        Ok(OpenInput {
            label: self.label,
            reader,
            line_no: 0,
            config: Vec::new(),
        })
    }
}

/// One item produced by a [`Scanner`]
#[derive(Debug, Clone, PartialEq)]
pub enum Parsed {
    Record(Record),
    SyntaxError(SyntaxError),
}

/// An input currently being read
struct OpenInput {
    label: String,
    reader: Box<dyn BufRead>,
    line_no: usize,
    /// File configuration in first-set order
    config: Vec<(String, String)>,
}

impl OpenInput {
    fn set_config(&mut self, key: &str, value: &str) {
        let existing = self.config.iter().position(|(k, _)| k == key);
        match (existing, value.is_empty()) {
            (Some(i), true) => {
                self.config.remove(i);
            }
            (Some(i), false) => self.config[i].1 = value.to_string(),
            (None, true) => {}
            (None, false) => self.config.push((key.to_string(), value.to_string())),
        }
    }

    fn error(&self, message: impl Into<String>) -> Parsed {
        Parsed::SyntaxError(SyntaxError {
            label: self.label.clone(),
            line: self.line_no,
            message: message.into(),
        })
    }
}

/// Line classifier for benchmark logs
pub struct LineParser {
    /// Regex for `key: value` configuration lines
    config_regex: Regex,
}

impl LineParser {
    /// Create a new line parser
    pub fn new() -> Result<Self> {
        // Key starts lowercase and has no spaces, uppercase or colons
        let config_regex = Regex::new(r"^(\p{Ll}[^\s\p{Lu}:]*):(?:\s+(.*?))?\s*$")?;
        Ok(Self { config_regex })
    }

    /// Classify and parse one line. `None` means the line carries nothing.
    fn parse_line(
        &self,
        line: &str,
        input: &mut OpenInput,
        units: &mut UnitRegistry,
        warnings: &mut Vec<UnitWarning>,
    ) -> Option<Parsed> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        if is_benchmark_line(line) {
            return Some(self.parse_result_line(line, input, units));
        }

        let mut fields = line.split_whitespace();
        if fields.next() == Some("Unit") {
            return self.parse_unit_line(fields, input, units, warnings);
        }

        if let Some(captures) = self.config_regex.captures(line) {
            let key = captures.get(1)?.as_str();
            let value = captures.get(2).map_or("", |m| m.as_str());
            input.set_config(key, value);
        }
        None
    }

    fn parse_result_line(
        &self,
        line: &str,
        input: &OpenInput,
        units: &mut UnitRegistry,
    ) -> Parsed {
        let mut fields = line.split_whitespace();
        let name = fields.next().unwrap_or_default();

        let iterations = match fields.next() {
            None => return input.error("missing iteration count"),
            Some(iters) => match iters.parse::<u64>() {
                Ok(n) if n > 0 => n,
                _ => return input.error(format!("invalid iteration count {:?}", iters)),
            },
        };

        let rest: Vec<&str> = fields.collect();
        if rest.is_empty() {
            return input.error("missing measurements");
        }

        // Validate every pair before touching the unit registry
        let mut measurements = Vec::with_capacity(rest.len() / 2);
        for pair in rest.chunks(2) {
            let value = match pair[0].parse::<f64>() {
                Ok(v) if v.is_finite() => v,
                _ => return input.error(format!("invalid measurement {:?}", pair[0])),
            };
            let Some(unit) = pair.get(1) else {
                return input.error(format!("missing unit after {:?}", pair[0]));
            };
            measurements.push((value, *unit));
        }

        let mut config: Vec<ConfigEntry> = input
            .config
            .iter()
            .map(|(key, value)| ConfigEntry {
                key: key.clone(),
                value: value.clone(),
                file: true,
            })
            .collect();
        let (_, name_keys) = split_name(name);
        config.extend(name_keys.into_iter().map(|(key, value)| ConfigEntry {
            key,
            value,
            file: false,
        }));

        let values = measurements
            .into_iter()
            .map(|(value, unit)| units.canonicalize(value, unit))
            .collect();

        Parsed::Record(Record {
            name: name.to_string(),
            source: input.label.clone(),
            config,
            iterations,
            values,
        })
    }

    fn parse_unit_line<'a>(
        &self,
        mut fields: impl Iterator<Item = &'a str>,
        input: &OpenInput,
        units: &mut UnitRegistry,
        warnings: &mut Vec<UnitWarning>,
    ) -> Option<Parsed> {
        let Some(unit) = fields.next() else {
            return Some(input.error("missing unit name"));
        };

        let mut pairs = Vec::new();
        for field in fields {
            match field.split_once('=') {
                Some((key, value)) if !key.is_empty() => pairs.push((key, value)),
                _ => return Some(input.error(format!("expected key=value, got {:?}", field))),
            }
        }

        match units.declare(unit, &pairs) {
            Ok(mut conflicts) => {
                warnings.append(&mut conflicts);
                None
            }
            Err(message) => Some(input.error(message)),
        }
    }
}

impl Default for LineParser {
    fn default() -> Self {
        Self::new().expect("Failed to create parser - regex compilation failed")
    }
}

/// `Benchmark` followed by the end of the name or a non-lowercase character
fn is_benchmark_line(line: &str) -> bool {
    match line.strip_prefix("Benchmark") {
        Some(rest) => rest
            .chars()
            .next()
            .map_or(true, |c| !c.is_lowercase()),
        None => false,
    }
}

/// Lazy scanner over a sequence of inputs.
///
/// Yields records and syntax errors in input-then-line order. Bytes that are
/// not valid UTF-8 are replaced with U+FFFD. A failure to open or read an
/// input ends the scan; it is available from [`Scanner::err`] afterwards, and
/// everything yielded before it stays valid.
pub struct Scanner {
    parser: LineParser,
    inputs: std::vec::IntoIter<Input>,
    current: Option<OpenInput>,
    units: UnitRegistry,
    warnings: Vec<UnitWarning>,
    err: Option<Error>,
    done: bool,
    buf: Vec<u8>,
}

impl Scanner {
    pub fn new(inputs: Vec<Input>) -> Result<Self> {
        Ok(Self {
            parser: LineParser::new()?,
            inputs: inputs.into_iter(),
            current: None,
            units: UnitRegistry::new(),
            warnings: Vec::new(),
            err: None,
            done: false,
            buf: Vec::new(),
        })
    }

    /// Unit metadata seen so far
    pub fn units(&self) -> &UnitRegistry {
        &self.units
    }

    /// Conflicting unit declarations seen so far
    pub fn warnings(&self) -> &[UnitWarning] {
        &self.warnings
    }

    /// The error that ended the scan, if any
    pub fn err(&self) -> Option<&Error> {
        self.err.as_ref()
    }

    /// Consume the scanner, returning unit metadata and warnings, or the
    /// terminal error.
    pub fn finish(self) -> Result<(UnitRegistry, Vec<UnitWarning>)> {
        match self.err {
            Some(err) => Err(err),
            None => Ok((self.units, self.warnings)),
        }
    }
}

impl Iterator for Scanner {
    type Item = Parsed;

    fn next(&mut self) -> Option<Parsed> {
        while !self.done {
            if self.current.is_none() {
                match self.inputs.next() {
                    None => {
                        self.done = true;
                        break;
                    }
                    Some(next) => {
                        debug!("Scanning input {}", next.label);
                        match next.open() {
                            Ok(open) => self.current = Some(open),
                            Err(e) => {
                                self.err = Some(e);
                                self.done = true;
                                break;
                            }
                        }
                    }
                }
            }
            let Some(input) = self.current.as_mut() else {
                continue;
            };

            self.buf.clear();
            match input.reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => {
                    self.current = None;
                }
                Ok(_) => {
                    input.line_no += 1;
                    let line = String::from_utf8_lossy(&self.buf);
                    let parsed = self.parser.parse_line(
                        &line,
                        input,
                        &mut self.units,
                        &mut self.warnings,
                    );
                    if parsed.is_some() {
                        return parsed;
                    }
                }
                Err(e) => {
                    self.err = Some(Error::FileReadError {
                        path: input.label.clone(),
                        source: e,
                    });
                    self.done = true;
                }
            }
        }
        None
    }
}

/// Everything a complete scan produced
#[derive(Debug, Default)]
pub struct ParseOutcome {
    pub records: Vec<Record>,
    pub syntax_errors: Vec<SyntaxError>,
    pub units: UnitRegistry,
    pub warnings: Vec<UnitWarning>,
    /// Terminal error that cut the scan short
    pub error: Option<Error>,
}

/// Scan all inputs, collecting records and diagnostics.
pub fn parse_inputs(inputs: Vec<Input>) -> Result<ParseOutcome> {
    let mut scanner = Scanner::new(inputs)?;
    let mut outcome = ParseOutcome::default();

    for parsed in scanner.by_ref() {
        match parsed {
            Parsed::Record(record) => outcome.records.push(record),
            Parsed::SyntaxError(err) => outcome.syntax_errors.push(err),
        }
    }

    outcome.error = scanner.err.take();
    outcome.units = std::mem::take(&mut scanner.units);
    outcome.warnings = std::mem::take(&mut scanner.warnings);

    debug!(
        "Parsed {} records, {} syntax errors",
        outcome.records.len(),
        outcome.syntax_errors.len()
    );
    Ok(outcome)
}

/// Parse benchmark output from a string
pub fn parse_str(label: &str, text: &str) -> Result<ParseOutcome> {
    parse_inputs(vec![Input::text(label, text)])
}
