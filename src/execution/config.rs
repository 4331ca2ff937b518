//! Configuration of the subprocess execution handler.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{CalibError, Result};

/// What happens to a run directory once its run has finished
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionPolicy {
    /// Always remove the run directory
    #[default]
    Never,
    /// Keep directories of failed runs for inspection
    FailedRuns,
    /// Keep every run directory
    Always,
}

impl RetentionPolicy {
    /// Whether a run with the given outcome keeps its directory
    pub fn keeps(self, success: bool) -> bool {
        match self {
            RetentionPolicy::Never => false,
            RetentionPolicy::FailedRuns => !success,
            RetentionPolicy::Always => true,
        }
    }
}

/// A catalog file the simulator is expected to write
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogFile {
    /// Label the constraints refer to, e.g. `z0`
    pub label: String,
    /// Path relative to the run's output directory
    pub path: PathBuf,
}

fn default_parameter_file() -> String {
    "run.par".to_string()
}

fn default_output_key() -> String {
    "OutputDir".to_string()
}

fn default_timeout_secs() -> f64 {
    3600.0
}

fn default_poll_interval_ms() -> u64 {
    100
}

/// How to run the simulator for one parameter vector.
///
/// The simulator is started as `executable args... <parameter file>` inside a
/// fresh run directory. The parameter file is the template (if any) with
/// `overrides` applied, one line per free parameter and the output directory
/// key pointing at `<run dir>/output`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    pub executable: PathBuf,

    #[serde(default)]
    pub args: Vec<String>,

    /// Simulator parameter file holding every fixed setting
    #[serde(default)]
    pub template: Option<PathBuf>,

    /// Fixed settings replacing or extending the template's
    #[serde(default)]
    pub overrides: BTreeMap<String, String>,

    /// Directory under which run directories are created
    pub work_root: PathBuf,

    #[serde(default = "default_parameter_file")]
    pub parameter_file: String,

    #[serde(default = "default_output_key")]
    pub output_dir_key: String,

    pub catalogs: Vec<CatalogFile>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: f64,

    #[serde(default)]
    pub retention: RetentionPolicy,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl ExecutionConfig {
    /// Create a configuration with default settings and no catalogs
    pub fn new(executable: impl Into<PathBuf>, work_root: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            args: Vec::new(),
            template: None,
            overrides: BTreeMap::new(),
            work_root: work_root.into(),
            parameter_file: default_parameter_file(),
            output_dir_key: default_output_key(),
            catalogs: Vec::new(),
            timeout_secs: default_timeout_secs(),
            retention: RetentionPolicy::default(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_template(mut self, template: impl Into<PathBuf>) -> Self {
        self.template = Some(template.into());
        self
    }

    pub fn with_override(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.overrides.insert(key.into(), value.into());
        self
    }

    pub fn with_catalog(mut self, label: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.catalogs.push(CatalogFile {
            label: label.into(),
            path: path.into(),
        });
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs_f64();
        self
    }

    pub fn with_retention(mut self, retention: RetentionPolicy) -> Self {
        self.retention = retention;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = interval.as_millis().max(1) as u64;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Check the configuration before any run is attempted
    pub fn validate(&self) -> Result<()> {
        if self.executable.as_os_str().is_empty() {
            return Err(CalibError::config("Simulator executable must be set"));
        }
        if !(self.timeout_secs.is_finite() && self.timeout_secs > 0.0) {
            return Err(CalibError::config(format!(
                "Simulator timeout must be positive, got {}",
                self.timeout_secs
            )));
        }
        if self.parameter_file.trim().is_empty() || self.parameter_file.contains(['/', '\\']) {
            return Err(CalibError::config(format!(
                "Invalid parameter file name '{}'",
                self.parameter_file
            )));
        }
        if self.output_dir_key.trim().is_empty() || self.output_dir_key.contains(char::is_whitespace) {
            return Err(CalibError::config(format!(
                "Invalid output directory key '{}'",
                self.output_dir_key
            )));
        }
        if self.catalogs.is_empty() {
            return Err(CalibError::config("At least one simulator catalog must be listed"));
        }

        let mut labels = BTreeSet::new();
        for catalog in &self.catalogs {
            if !labels.insert(catalog.label.as_str()) {
                return Err(CalibError::config(format!("Duplicate catalog label '{}'", catalog.label)));
            }
            if catalog.path.is_absolute() {
                return Err(CalibError::config(format!(
                    "Catalog '{}' must be relative to the output directory",
                    catalog.label
                )));
            }
        }
        Ok(())
    }

    /// Resolve relative paths against `base_dir`.
    ///
    /// A bare executable name such as `sage` is left alone so it is looked up
    /// on `PATH`.
    pub fn resolve_paths(&mut self, base_dir: &Path) {
        if self.executable.is_relative() && self.executable.components().count() > 1 {
            self.executable = base_dir.join(&self.executable);
        }
        if self.work_root.is_relative() {
            self.work_root = base_dir.join(&self.work_root);
        }
        if let Some(template) = self.template.as_mut() {
            if template.is_relative() {
                *template = base_dir.join(&*template);
            }
        }
    }
}
