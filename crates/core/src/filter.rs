//! Filter expressions over records
//!
//! ```text
//! *                               every record
//! .name:BenchmarkCrc*             glob match on a field
//! /size=100 goos:linux            juxtaposition is AND
//! /size:(15 OR 40) OR .file:old   alternatives
//! -goos:darwin   NOT /size:""     negation; "" matches a missing key
//! .unit:ns/op                     keep only values in ns/op
//! ```
//!
//! Fields are those of projections (see [`crate::projection`]) except
//! `.config`. Both `:` and `=` separate a field from its pattern. Quoted
//! patterns are literal; unquoted ones are globs.

use crate::data::Record;
use crate::error::{FilterError, ProjectionError};
use crate::projection::Field;
use glob::Pattern;
use std::fmt;

#[derive(Debug, Clone)]
enum Node {
    All,
    Not(Box<Node>),
    And(Box<Node>, Box<Node>),
    Or(Box<Node>, Box<Node>),
    Match { field: Field, patterns: Vec<Pattern> },
}

/// How `.unit` clauses are evaluated
#[derive(Clone, Copy)]
enum UnitMode<'a> {
    /// Against one value's unit
    Value(&'a str),
    /// As if they matched
    Any,
}

impl Node {
    fn eval(&self, record: &Record, unit: UnitMode<'_>) -> bool {
        match self {
            Node::All => true,
            Node::Not(inner) => !inner.eval(record, unit),
            Node::And(a, b) => a.eval(record, unit) && b.eval(record, unit),
            Node::Or(a, b) => a.eval(record, unit) || b.eval(record, unit),
            Node::Match { field, patterns } => {
                let value = match (field, unit) {
                    (Field::Unit, UnitMode::Any) => return true,
                    (Field::Unit, UnitMode::Value(u)) => u,
                    _ => field.value(record, None),
                };
                patterns.iter().any(|p| p.matches(value))
            }
        }
    }

    fn uses_unit(&self) -> bool {
        match self {
            Node::All => false,
            Node::Not(inner) => inner.uses_unit(),
            Node::And(a, b) | Node::Or(a, b) => a.uses_unit() || b.uses_unit(),
            Node::Match { field, .. } => *field == Field::Unit,
        }
    }
}

/// A compiled filter expression
#[derive(Debug, Clone)]
pub struct Filter {
    spec: String,
    root: Node,
    uses_unit: bool,
}

impl Filter {
    /// Compile a filter expression.
    pub fn new(spec: &str) -> Result<Self, FilterError> {
        let mut parser = ExprParser { src: spec, pos: 0 };
        parser.skip_ws();
        let root = if parser.at_end() {
            Node::All
        } else {
            parser.parse_or()?
        };
        parser.skip_ws();
        if !parser.at_end() {
            return Err(parser.error("unexpected input"));
        }

        let uses_unit = root.uses_unit();
        Ok(Self {
            spec: spec.to_string(),
            root,
            uses_unit,
        })
    }

    /// A filter that admits every record
    pub fn match_all() -> Self {
        Self {
            spec: "*".to_string(),
            root: Node::All,
            uses_unit: false,
        }
    }

    /// Test `record`, dropping values whose unit the filter rejects.
    ///
    /// Returns `Ok(false)` for an ordinary non-match. Returns
    /// [`FilterError::NoMatchingUnits`] when the record would match but
    /// none of its units do; the record must then be skipped too.
    pub fn apply(&self, record: &mut Record) -> Result<bool, FilterError> {
        if !self.uses_unit {
            return Ok(self.root.eval(record, UnitMode::Any));
        }

        let keep: Vec<bool> = record
            .values
            .iter()
            .map(|v| self.root.eval(record, UnitMode::Value(&v.unit)))
            .collect();

        if keep.iter().any(|k| *k) {
            let mut keep = keep.into_iter();
            record.values.retain(|_| keep.next().unwrap_or(false));
            return Ok(true);
        }

        if self.root.eval(record, UnitMode::Any) {
            return Err(FilterError::NoMatchingUnits {
                name: record.name.clone(),
            });
        }
        Ok(false)
    }

    pub fn spec(&self) -> &str {
        &self.spec
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.spec)
    }
}

/// Recursive-descent parser over the expression text
struct ExprParser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> ExprParser<'a> {
    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn bump(&mut self, c: char) {
        self.pos += c.len_utf8();
    }

    fn skip_ws(&mut self) {
        while let Some(c) = self.peek() {
            if !c.is_whitespace() {
                break;
            }
            self.bump(c);
        }
    }

    fn error(&self, message: impl Into<String>) -> FilterError {
        FilterError::Syntax {
            pos: self.pos,
            message: message.into(),
        }
    }

    /// Consume `word` if it is the next token as a whole.
    fn eat_keyword(&mut self, word: &str) -> bool {
        let rest = self.rest();
        if let Some(after) = rest.strip_prefix(word) {
            let boundary = after
                .chars()
                .next()
                .map_or(true, |c| c.is_whitespace() || c == '(' || c == ')');
            if boundary {
                self.pos += word.len();
                return true;
            }
        }
        false
    }

    fn parse_or(&mut self) -> Result<Node, FilterError> {
        let mut lhs = self.parse_and()?;
        loop {
            self.skip_ws();
            if !self.eat_keyword("OR") {
                return Ok(lhs);
            }
            let rhs = self.parse_and()?;
            lhs = Node::Or(Box::new(lhs), Box::new(rhs));
        }
    }

    fn parse_and(&mut self) -> Result<Node, FilterError> {
        let mut lhs = self.parse_unary()?;
        loop {
            self.skip_ws();
            match self.peek() {
                None | Some(')') => return Ok(lhs),
                _ => {}
            }
            let save = self.pos;
            if self.eat_keyword("OR") {
                self.pos = save;
                return Ok(lhs);
            }
            self.eat_keyword("AND");
            let rhs = self.parse_unary()?;
            lhs = Node::And(Box::new(lhs), Box::new(rhs));
        }
    }

    fn parse_unary(&mut self) -> Result<Node, FilterError> {
        self.skip_ws();
        match self.peek() {
            None => Err(self.error("expected expression")),
            Some('-') => {
                self.bump('-');
                Ok(Node::Not(Box::new(self.parse_unary()?)))
            }
            Some('(') => {
                self.bump('(');
                let inner = self.parse_or()?;
                self.skip_ws();
                if self.peek() != Some(')') {
                    return Err(self.error("missing )"));
                }
                self.bump(')');
                Ok(inner)
            }
            Some(')') => Err(self.error("unexpected )")),
            Some(_) => {
                if self.eat_keyword("NOT") {
                    return Ok(Node::Not(Box::new(self.parse_unary()?)));
                }
                if self.eat_keyword("*") {
                    return Ok(Node::All);
                }
                if self.eat_keyword("AND") || self.eat_keyword("OR") {
                    return Err(self.error("operator without operand"));
                }
                self.parse_match()
            }
        }
    }

    fn parse_match(&mut self) -> Result<Node, FilterError> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c == ':' || c == '=' || c.is_whitespace() || c == '(' || c == ')' {
                break;
            }
            self.bump(c);
        }
        let key = &self.src[start..self.pos];

        match self.peek() {
            Some(c @ (':' | '=')) if !key.is_empty() => self.bump(c),
            _ => return Err(self.error(format!("expected key:pattern, got {:?}", key))),
        }

        let field = match Field::parse(key) {
            Ok(field) => field,
            Err(ProjectionError::UnknownField(name)) => return Err(FilterError::UnknownField(name)),
            Err(e) => return Err(self.error(e.to_string())),
        };

        let patterns = if self.peek() == Some('(') {
            self.bump('(');
            self.parse_pattern_list()?
        } else {
            vec![self.parse_pattern()?]
        };

        Ok(Node::Match { field, patterns })
    }

    fn parse_pattern_list(&mut self) -> Result<Vec<Pattern>, FilterError> {
        let mut patterns = Vec::new();
        loop {
            self.skip_ws();
            patterns.push(self.parse_pattern()?);
            self.skip_ws();
            if self.peek() == Some(')') {
                self.bump(')');
                return Ok(patterns);
            }
            if !self.eat_keyword("OR") {
                return Err(self.error("expected OR or ) in pattern list"));
            }
        }
    }

    fn parse_pattern(&mut self) -> Result<Pattern, FilterError> {
        if self.peek() == Some('"') {
            let literal = self.parse_quoted()?;
            return compile_glob(&Pattern::escape(&literal));
        }

        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_whitespace() || c == ')' {
                break;
            }
            self.bump(c);
        }
        compile_glob(&self.src[start..self.pos])
    }

    fn parse_quoted(&mut self) -> Result<String, FilterError> {
        self.bump('"');
        let mut out = String::new();
        let mut escaped = false;
        while let Some(c) = self.peek() {
            self.bump(c);
            match (escaped, c) {
                (true, _) => {
                    out.push(c);
                    escaped = false;
                }
                (false, '\\') => escaped = true,
                (false, '"') => return Ok(out),
                (false, _) => out.push(c),
            }
        }
        Err(self.error("unterminated string"))
    }
}

fn compile_glob(text: &str) -> Result<Pattern, FilterError> {
    Pattern::new(text).map_err(|e| FilterError::BadPattern {
        pattern: text.to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_str;

    fn records(text: &str) -> Vec<Record> {
        parse_str("old", text).unwrap().records
    }

    fn matching(filter: &str, text: &str) -> Vec<String> {
        let filter = Filter::new(filter).unwrap();
        records(text)
            .into_iter()
            .filter_map(|mut r| match filter.apply(&mut r) {
                Ok(true) => Some(r.name),
                _ => None,
            })
            .collect()
    }

    const LOG: &str = "\
goos: linux
BenchmarkX/size=100 1 10 ns/op
BenchmarkX/size=200 1 20 ns/op
BenchmarkY 1 30 ns/op
BenchmarkZ/size=100/align=8 1 40 ns/op
";

    #[test]
    fn test_match_all() {
        assert_eq!(matching("*", LOG).len(), 4);
        assert_eq!(matching("", LOG).len(), 4);
    }

    #[test]
    fn test_equality_requires_presence() {
        // BenchmarkY has no size at all and is excluded too
        assert_eq!(
            matching("size=100", LOG),
            vec!["BenchmarkX/size=100", "BenchmarkZ/size=100/align=8"]
        );
        assert_eq!(
            matching("/size:100", LOG),
            vec!["BenchmarkX/size=100", "BenchmarkZ/size=100/align=8"]
        );
    }

    #[test]
    fn test_absence() {
        assert_eq!(matching("/size:\"\"", LOG), vec!["BenchmarkY"]);
        assert_eq!(
            matching("/size:100 OR /size:\"\"", LOG),
            vec!["BenchmarkX/size=100", "BenchmarkY", "BenchmarkZ/size=100/align=8"]
        );
    }

    #[test]
    fn test_boolean_operators() {
        assert_eq!(
            matching("/size:100 -/align:8", LOG),
            vec!["BenchmarkX/size=100"]
        );
        assert_eq!(
            matching("/size:100 AND NOT .name:BenchmarkZ", LOG),
            vec!["BenchmarkX/size=100"]
        );
        assert_eq!(
            matching("(.name:BenchmarkY OR /size:200) goos:linux", LOG),
            vec!["BenchmarkX/size=200", "BenchmarkY"]
        );
        assert_eq!(
            matching("/size:(100 OR 200) -/align:?*", LOG),
            vec!["BenchmarkX/size=100", "BenchmarkX/size=200"]
        );
    }

    #[test]
    fn test_globs() {
        assert_eq!(matching(".fullname:*align*", LOG), vec!["BenchmarkZ/size=100/align=8"]);
        assert_eq!(matching("/size:?00", LOG).len(), 3);
        assert_eq!(matching(".file:old", LOG).len(), 4);
    }

    #[test]
    fn test_unit_filter_drops_values() {
        let filter = Filter::new(".unit:ns/op").unwrap();
        let mut rec = records("BenchmarkX 1 10 ns/op 5 B/op\n").remove(0);
        assert_eq!(filter.apply(&mut rec), Ok(true));
        assert_eq!(rec.values.len(), 1);
        assert_eq!(rec.values[0].unit, "ns/op");

        let filter = Filter::new(".name:BenchmarkX .unit:allocs/op").unwrap();
        let mut rec = records("BenchmarkX 1 10 ns/op 5 B/op\n").remove(0);
        assert!(matches!(
            filter.apply(&mut rec),
            Err(FilterError::NoMatchingUnits { .. })
        ));

        let mut other = records("BenchmarkY 1 10 ns/op\n").remove(0);
        assert_eq!(filter.apply(&mut other), Ok(false));
    }

    #[test]
    fn test_compile_errors() {
        assert!(matches!(Filter::new("(a:b"), Err(FilterError::Syntax { .. })));
        assert!(matches!(Filter::new("a:b)"), Err(FilterError::Syntax { .. })));
        assert!(matches!(Filter::new("a:b OR"), Err(FilterError::Syntax { .. })));
        assert!(matches!(Filter::new("justaword"), Err(FilterError::Syntax { .. })));
        assert!(matches!(
            Filter::new(".bogus:x"),
            Err(FilterError::UnknownField(_))
        ));
        assert!(matches!(
            Filter::new(".name:[abc"),
            Err(FilterError::BadPattern { .. })
        ));
        assert!(matches!(Filter::new("a:\"open"), Err(FilterError::Syntax { .. })));
    }
}
