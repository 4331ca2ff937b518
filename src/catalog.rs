//! Simulated galaxy catalogs.
//!
//! The simulator writes one text table per requested output (typically one per
//! snapshot/redshift). Each table starts with a `#`-prefixed header naming the
//! columns, followed by one whitespace-separated row per galaxy:
//!
//! ```text
//! # StellarMass BulgeMass BlackHoleMass Type
//! 0.52  0.11  0.0003  0
//! 1.73  0.90  0.0021  0
//! ```
//!
//! Tables are stored column-major since every constraint reads whole columns.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use thiserror::Error;

use crate::utils::text::{complete, number_row};

/// Errors raised while reading a catalog file
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CatalogError {
    #[error("missing '#' header line naming the columns")]
    MissingHeader,

    #[error("duplicate column '{0}' in header")]
    DuplicateColumn(String),

    #[error("line {line}: {message}")]
    MalformedRow { line: usize, message: String },

    #[error("line {line}: expected {expected} values, found {found}")]
    ColumnCount { line: usize, expected: usize, found: usize },

    #[error("column '{column}' has {found} values, expected {expected}")]
    ColumnLength { column: String, expected: usize, found: usize },

    #[error("catalog is not valid UTF-8 text: {0}")]
    Encoding(String),

    #[error("cannot read catalog: {0}")]
    Io(String),
}

/// One simulated output table
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Catalog {
    names: Vec<String>,
    columns: Vec<Vec<f64>>,
}

impl Catalog {
    /// Create a catalog from column names and column-major data
    ///
    /// Columns must all have the same length.
    pub fn from_columns(columns: Vec<(String, Vec<f64>)>) -> Result<Self, CatalogError> {
        let expected = columns.first().map(|(_, c)| c.len()).unwrap_or(0);
        let mut names = Vec::with_capacity(columns.len());
        let mut data = Vec::with_capacity(columns.len());

        for (name, values) in columns {
            if names.contains(&name) {
                return Err(CatalogError::DuplicateColumn(name));
            }
            if values.len() != expected {
                return Err(CatalogError::ColumnLength {
                    column: name,
                    expected,
                    found: values.len(),
                });
            }
            names.push(name);
            data.push(values);
        }

        Ok(Self { names, columns: data })
    }

    /// Parse a catalog from its text representation
    ///
    /// Errors name the physical line number, header and comments included.
    pub fn parse(text: &str) -> Result<Self, CatalogError> {
        let mut lines = text
            .lines()
            .enumerate()
            .map(|(idx, l)| (idx + 1, l.trim()))
            .filter(|(_, l)| !l.is_empty());

        let header = lines
            .next()
            .and_then(|(_, l)| l.strip_prefix('#'))
            .ok_or(CatalogError::MissingHeader)?;
        let names: Vec<String> = header.split_whitespace().map(str::to_string).collect();
        if names.is_empty() {
            return Err(CatalogError::MissingHeader);
        }

        let mut columns: Vec<Vec<f64>> = vec![Vec::new(); names.len()];
        for (line_no, line) in lines {
            if line.starts_with('#') {
                continue;
            }
            let values = complete(number_row(line))
                .map_err(|message| CatalogError::MalformedRow { line: line_no, message })?;
            if values.len() != names.len() {
                return Err(CatalogError::ColumnCount {
                    line: line_no,
                    expected: names.len(),
                    found: values.len(),
                });
            }
            for (column, value) in columns.iter_mut().zip(values) {
                column.push(value);
            }
        }

        Self::from_columns(names.into_iter().zip(columns).collect())
    }

    /// Read and parse a catalog file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, CatalogError> {
        let text = fs::read_to_string(path.as_ref()).map_err(|e| match e.kind() {
            ErrorKind::InvalidData => CatalogError::Encoding(e.to_string()),
            _ => CatalogError::Io(e.to_string()),
        })?;
        Self::parse(&text)
    }

    /// Number of galaxies (rows)
    pub fn len(&self) -> usize {
        self.columns.first().map(Vec::len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    /// Look up a column by name
    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|idx| self.columns[idx].as_slice())
    }
}

/// All catalogs produced by one simulation run, keyed by output label
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CatalogData {
    catalogs: BTreeMap<String, Catalog>,
}

impl CatalogData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, label: impl Into<String>, catalog: Catalog) {
        self.catalogs.insert(label.into(), catalog);
    }

    pub fn with_catalog(mut self, label: impl Into<String>, catalog: Catalog) -> Self {
        self.insert(label, catalog);
        self
    }

    pub fn get(&self, label: &str) -> Option<&Catalog> {
        self.catalogs.get(label)
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.catalogs.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.catalogs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.catalogs.is_empty()
    }
}
