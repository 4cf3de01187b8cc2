//! Projections: grouping keys extracted from records
//!
//! A projection spec is a list of fields separated by commas or spaces:
//!
//! | field       | value                                                   |
//! |-------------|---------------------------------------------------------|
//! | `.fullname` | full benchmark name                                     |
//! | `.name`     | base name, without sub-benchmark parts                  |
//! | `.file`     | label of the input the record came from                 |
//! | `.config`   | every configuration key no other projection claims      |
//! | `.unit`     | unit of the value (table projections only)              |
//! | `/key`      | sub-benchmark name parameter, e.g. `/size`              |
//! | `key`       | file configuration key, falling back to `/key`          |
//!
//! All projections of one grouping are parsed through a single
//! [`ProjectionParser`]. It records which keys each projection claims, so
//! `.config` and the residue only cover what nobody asked for.

use crate::data::Record;
use crate::error::ProjectionError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// One field of a composite key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyField {
    pub name: String,
    pub value: String,
}

/// Composite key produced by applying a projection to a record
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Key {
    pub fields: Vec<KeyField>,
}

impl Key {
    /// Value of the named field, if the key has one
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.fields.iter().all(|f| f.value.is_empty())
    }

    /// Display label: pseudo-fields show their value, configuration keys
    /// show `key=value`. Empty fields are left out.
    pub fn label(&self) -> String {
        self.fields
            .iter()
            .filter(|f| !f.value.is_empty())
            .map(|f| {
                if f.name.starts_with('.') {
                    f.value.clone()
                } else {
                    format!("{}={}", f.name.trim_start_matches('/'), f.value)
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// A reference to one piece of a record
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Field {
    FullName,
    Name,
    File,
    Unit,
    /// Exact configuration key (`/size` or a file key)
    Key(String),
    /// File key that falls back to the name key of the same name
    Bare { key: String, name_key: String },
}

impl Field {
    /// Parse a single field token. `.config` is not a field.
    pub(crate) fn parse(token: &str) -> Result<Field, ProjectionError> {
        if let Some(pseudo) = token.strip_prefix('.') {
            return match pseudo {
                "fullname" => Ok(Field::FullName),
                "name" => Ok(Field::Name),
                "file" => Ok(Field::File),
                "unit" => Ok(Field::Unit),
                _ => Err(ProjectionError::UnknownField(token.to_string())),
            };
        }
        if token.starts_with('/') {
            if token.len() == 1 {
                return Err(ProjectionError::EmptyKey(token.to_string()));
            }
            return Ok(Field::Key(token.to_string()));
        }
        if token.is_empty() {
            return Err(ProjectionError::EmptyKey(token.to_string()));
        }
        Ok(Field::Bare {
            key: token.to_string(),
            name_key: format!("/{}", token),
        })
    }

    pub(crate) fn name(&self) -> &str {
        match self {
            Field::FullName => ".fullname",
            Field::Name => ".name",
            Field::File => ".file",
            Field::Unit => ".unit",
            Field::Key(key) | Field::Bare { key, .. } => key,
        }
    }

    /// The field's value in `record`, or `""` when the record lacks it.
    pub(crate) fn value<'a>(&'a self, record: &'a Record, unit: Option<&'a str>) -> &'a str {
        match self {
            Field::FullName => &record.name,
            Field::Name => record.base_name(),
            Field::File => &record.source,
            Field::Unit => unit.unwrap_or(""),
            Field::Key(key) => record.get(key).unwrap_or(""),
            Field::Bare { key, name_key } => record
                .get(key)
                .or_else(|| record.get(name_key))
                .unwrap_or(""),
        }
    }
}

/// Keys claimed by the projections of one parsing session
#[derive(Debug, Clone, Default)]
struct Claims {
    keys: HashSet<String>,
    /// `.fullname` covers every name-derived key
    name_keys: bool,
    /// `.config` was used, so every configuration key is spoken for
    config: bool,
}

impl Claims {
    fn claim(&mut self, field: &Field) {
        match field {
            Field::FullName => {
                self.keys.insert(".fullname".to_string());
                self.keys.insert(".name".to_string());
                self.name_keys = true;
            }
            Field::Name => {
                self.keys.insert(".name".to_string());
            }
            Field::File => {
                self.keys.insert(".file".to_string());
            }
            Field::Unit => {}
            Field::Key(key) => {
                self.keys.insert(key.clone());
            }
            Field::Bare { key, name_key } => {
                self.keys.insert(key.clone());
                self.keys.insert(name_key.clone());
            }
        }
    }

    fn is_claimed(&self, key: &str) -> bool {
        self.keys.contains(key) || (self.name_keys && key.starts_with('/'))
    }
}

#[derive(Debug, Clone)]
enum Selector {
    Field(Field),
    /// Every unclaimed configuration key, resolved per record
    Config,
}

/// A compiled projection
#[derive(Debug, Clone)]
pub struct Projection {
    selectors: Vec<Selector>,
    /// Claim set of the session, available once the session is sealed
    claims: Arc<OnceLock<Claims>>,
}

impl Projection {
    /// Compute the composite key of `record`. `unit` feeds a `.unit` field.
    pub fn project(&self, record: &Record, unit: Option<&str>) -> Key {
        let mut fields = Vec::with_capacity(self.selectors.len());
        for selector in &self.selectors {
            match selector {
                Selector::Field(field) => fields.push(KeyField {
                    name: field.name().to_string(),
                    value: field.value(record, unit).to_string(),
                }),
                Selector::Config => self.project_config(record, &mut fields),
            }
        }
        Key { fields }
    }

    fn project_config(&self, record: &Record, fields: &mut Vec<KeyField>) {
        let claims = self.claims.get();
        let mut seen: HashSet<&str> = HashSet::new();
        for entry in &record.config {
            if entry.value.is_empty()
                || claims.is_some_and(|c| c.is_claimed(&entry.key))
                || !seen.insert(entry.key.as_str())
            {
                continue;
            }
            fields.push(KeyField {
                name: entry.key.clone(),
                value: entry.value.clone(),
            });
        }
    }

    /// Number of selectors (`.config` counts once)
    pub fn len(&self) -> usize {
        self.selectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selectors.is_empty()
    }
}

/// Parsing session for the projections of one grouping.
///
/// Every key referenced by a successfully parsed projection is claimed.
/// [`ProjectionParser::residue`] ends the session: it seals the claim set
/// that `.config` fields resolve against and returns the residue projection.
/// Until then `.config` treats every key as unclaimed.
#[derive(Debug, Default)]
pub struct ProjectionParser {
    claims: Claims,
    sealed: Arc<OnceLock<Claims>>,
}

impl ProjectionParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a projection. A blank spec gives an empty projection.
    pub fn parse(&mut self, spec: &str) -> Result<Projection, ProjectionError> {
        let selectors = self.compile(spec, false)?;
        Ok(self.commit(selectors))
    }

    /// Parse a projection that must name at least one field.
    pub fn parse_required(&mut self, spec: &str) -> Result<Projection, ProjectionError> {
        let selectors = self.compile(spec, false)?;
        if selectors.is_empty() {
            return Err(ProjectionError::Empty);
        }
        Ok(self.commit(selectors))
    }

    /// Parse a projection that also partitions by unit.
    ///
    /// If the spec does not mention `.unit`, it is appended as the last
    /// field. Returns the projection and the index of the unit field.
    pub fn parse_with_unit(&mut self, spec: &str) -> Result<(Projection, usize), ProjectionError> {
        let mut selectors = self.compile(spec, true)?;
        let unit_index = match selectors
            .iter()
            .position(|s| matches!(s, Selector::Field(Field::Unit)))
        {
            Some(i) => i,
            None => {
                selectors.push(Selector::Field(Field::Unit));
                selectors.len() - 1
            }
        };
        Ok((self.commit(selectors), unit_index))
    }

    /// End the session and return the projection of everything unclaimed.
    pub fn residue(self) -> Projection {
        let mut selectors = Vec::new();
        if !self.claims.keys.contains(".name") {
            selectors.push(Selector::Field(Field::Name));
        }
        if !self.claims.keys.contains(".file") {
            selectors.push(Selector::Field(Field::File));
        }
        if !self.claims.config {
            selectors.push(Selector::Config);
        }

        // A second seal cannot happen: residue consumes the session
        let _ = self.sealed.set(self.claims);
        Projection {
            selectors,
            claims: self.sealed,
        }
    }

    fn compile(&self, spec: &str, allow_unit: bool) -> Result<Vec<Selector>, ProjectionError> {
        spec.split(|c: char| c == ',' || c.is_whitespace())
            .filter(|token| !token.is_empty())
            .map(|token| {
                if token == ".config" {
                    return Ok(Selector::Config);
                }
                match Field::parse(token)? {
                    Field::Unit if !allow_unit => Err(ProjectionError::UnitNotAllowed),
                    field => Ok(Selector::Field(field)),
                }
            })
            .collect()
    }

    fn commit(&mut self, selectors: Vec<Selector>) -> Projection {
        for selector in &selectors {
            match selector {
                Selector::Field(field) => self.claims.claim(field),
                Selector::Config => self.claims.config = true,
            }
        }
        Projection {
            selectors,
            claims: Arc::clone(&self.sealed),
        }
    }
}
