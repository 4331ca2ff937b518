//! Simulator parameter files.
//!
//! SAGE-style parameter files hold one `Key value` pair per line, with `%`
//! (and `#`) starting comments. Keys keep the order they were first seen in so
//! a rendered file reads like its template.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use crate::error::{CalibError, Result};
use crate::utils::text::{complete, key_value, strip_comment};

const COMMENT_MARKERS: [char; 2] = ['%', '#'];

/// Ordered key/value settings of one simulator run
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SimulatorParameters {
    entries: Vec<(String, String)>,
}

impl SimulatorParameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a parameter file; later duplicates of a key replace earlier ones
    pub fn parse(text: &str) -> Result<Self> {
        let mut params = Self::new();
        for (idx, raw) in text.lines().enumerate() {
            let line = strip_comment(raw, &COMMENT_MARKERS);
            if line.is_empty() {
                continue;
            }
            let (key, value) = complete(key_value(line))
                .map_err(|msg| CalibError::config(format!("line {}: {}", idx + 1, msg)))?;
            params.set(key, value.trim());
        }
        Ok(params)
    }

    /// Read a template parameter file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            CalibError::config(format!("Cannot read parameter template {}: {}", path.display(), e))
        })?;
        Self::parse(&text).map_err(|e| match e {
            CalibError::Config(msg) => CalibError::config(format!("{}: {}", path.display(), msg)),
            other => other,
        })
    }

    /// Set a key, keeping its position if it already exists
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render as an aligned `Key  value` file
    pub fn render(&self) -> String {
        let width = self.entries.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
        let mut out = String::new();
        for (key, value) in &self.entries {
            // Writing to a String cannot fail
            let _ = writeln!(out, "{:<width$}  {}", key, value, width = width);
        }
        out
    }
}
