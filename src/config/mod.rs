//! Run configuration.
//!
//! Everything that differs between geographies or feeds lives here rather than
//! in code: which file, which columns, which rows to keep, whether the feed is
//! cumulative. The file is TOML; CLI flags override the `[engine]` section.
//!
//! Relative paths are resolved against the directory of the config file.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{EngineConfig, RatioMethod};
use crate::error::AppError;

/// A full run as described by `epi.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    /// Optional start of the shared chart range (the end always follows the data).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_start: Option<NaiveDate>,
    #[serde(default)]
    pub engine: EngineConfig,
    /// Headline metric: reconciled against `reference`.
    pub primary: SourceSpec,
    pub reference: SourceSpec,
    /// Additional metrics that are smoothed but not reconciled.
    #[serde(default)]
    pub metrics: Vec<SourceSpec>,
    /// Derived date-joined ratio metrics.
    #[serde(default)]
    pub ratios: Vec<RatioSpec>,
    #[serde(default)]
    pub output: OutputSpec,
}

/// Where one series comes from and how to read it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceSpec {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub path: PathBuf,
    pub date_column: String,
    pub value_column: String,
    /// Values are running totals; difference them into daily counts.
    #[serde(default)]
    pub cumulative: bool,
    /// Overrides the default date formats (chrono `strftime` syntax).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub date_formats: Vec<String>,
    /// Overrides `engine.tail_lag_days` for this series.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tail_lag_days: Option<u32>,
    /// Keep only rows whose column equals the value (case-insensitive).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub filters: BTreeMap<String, String>,
}

impl SourceSpec {
    pub fn display_label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RatioSpec {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Key of the primary source or one of `metrics`.
    pub numerator: String,
    pub denominator: String,
}

impl RatioSpec {
    pub fn display_label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub csv: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundle: Option<PathBuf>,
}

/// Engine parameters given on the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineOverrides {
    pub window: Option<usize>,
    pub tail_lag_days: Option<u32>,
    pub min_overlap_days: Option<u32>,
    pub ratio_method: Option<RatioMethod>,
}

impl RunConfig {
    /// Read, resolve and validate a config file.
    pub fn load(path: &Path) -> Result<Self, AppError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| AppError::new(2, format!("Failed to read config '{}': {e}", path.display())))?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new(""));
        let config = Self::from_toml_str(&text, base_dir)?;
        debug!(path = %path.display(), metrics = config.metrics.len(), "loaded run config");
        Ok(config)
    }

    pub fn from_toml_str(text: &str, base_dir: &Path) -> Result<Self, AppError> {
        let mut config: RunConfig =
            toml::from_str(text).map_err(|e| AppError::new(2, format!("Invalid config: {e}")))?;
        config.resolve_paths(base_dir);
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, AppError> {
        toml::to_string_pretty(self).map_err(|e| AppError::new(4, format!("Failed to serialize config: {e}")))
    }

    fn resolve_paths(&mut self, base_dir: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base_dir.join(&*p);
            }
        };

        resolve(&mut self.primary.path);
        resolve(&mut self.reference.path);
        for metric in &mut self.metrics {
            resolve(&mut metric.path);
        }
        if let Some(p) = self.output.csv.as_mut() {
            resolve(p);
        }
        if let Some(p) = self.output.bundle.as_mut() {
            resolve(p);
        }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        self.engine.validate()?;

        let mut keys = HashSet::new();
        for spec in std::iter::once(&self.primary).chain(&self.metrics) {
            if !keys.insert(spec.key.as_str()) {
                return Err(AppError::new(2, format!("Duplicate series key `{}`.", spec.key)));
            }
        }

        for ratio in &self.ratios {
            if keys.contains(ratio.key.as_str()) {
                return Err(AppError::new(2, format!("Ratio key `{}` clashes with a series key.", ratio.key)));
            }
            for side in [&ratio.numerator, &ratio.denominator] {
                if !keys.contains(side.as_str()) {
                    return Err(AppError::new(
                        2,
                        format!("Ratio `{}` refers to unknown series `{side}`.", ratio.key),
                    ));
                }
            }
        }

        Ok(())
    }

    /// Apply CLI overrides and re-validate.
    pub fn apply_overrides(&mut self, overrides: EngineOverrides) -> Result<(), AppError> {
        if let Some(window) = overrides.window {
            self.engine.window = window;
        }
        if let Some(lag) = overrides.tail_lag_days {
            self.engine.tail_lag_days = lag;
        }
        if let Some(days) = overrides.min_overlap_days {
            self.engine.min_overlap_days = days;
        }
        if let Some(method) = overrides.ratio_method {
            self.engine.ratio_method = method;
        }
        self.engine.validate()?;
        Ok(())
    }

    /// Tail lag for a source: its own override, else the engine default.
    pub fn tail_lag_for(&self, spec: &SourceSpec) -> u32 {
        spec.tail_lag_days.unwrap_or(self.engine.tail_lag_days)
    }
}
