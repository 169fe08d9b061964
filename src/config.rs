//! Tool configuration.
//!
//! Handles loading, validating, and merging `imgfit.toml`. Stock defaults are
//! the base layer; a user file overrides any subset of keys; command-line
//! flags override both.
//!
//! ## Config File Location
//!
//! `imgfit.toml` in the working directory, or any file passed with
//! `--config`. A missing default file is not an error; a missing `--config`
//! file is.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [compress]
//! quality = 85              # 1-100
//! # format = "webp"         # Omit to keep the source format
//!
//! [fit]
//! target_kb = 200           # Size budget in KiB
//! tolerance = 5.0           # Percent around the budget
//! # scale = 0.5             # Pre-scale factor, 0.1-1.0
//!
//! [processing]
//! max_processes = 4         # Max parallel workers (omit for auto = CPU cores)
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::fit::MIN_SCALE_FACTOR;
use crate::formats::Format;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Largest `fit.target_kb` whose byte count fits in a `u64`.
pub const MAX_TARGET_KB: u64 = u64::MAX / 1024;

/// File picked up from the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "imgfit.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Configuration loaded from `imgfit.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolConfig {
    /// Defaults for quality mode.
    pub compress: CompressConfig,
    /// Defaults for size mode.
    pub fit: FitConfig,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
}

impl ToolConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=100).contains(&self.compress.quality) {
            return Err(ConfigError::Validation(
                "compress.quality must be 1-100".into(),
            ));
        }
        if let Some(ref name) = self.compress.format {
            name.parse::<Format>()
                .map_err(|e| ConfigError::Validation(format!("compress.format: {e}")))?;
        }
        if self.fit.target_kb == 0 {
            return Err(ConfigError::Validation(
                "fit.target_kb must be greater than 0".into(),
            ));
        }
        if self.fit.target_kb > MAX_TARGET_KB {
            return Err(ConfigError::Validation(format!(
                "fit.target_kb must be at most {MAX_TARGET_KB}"
            )));
        }
        if !(self.fit.tolerance.is_finite() && self.fit.tolerance > 0.0) {
            return Err(ConfigError::Validation(
                "fit.tolerance must be a positive percentage".into(),
            ));
        }
        if let Some(scale) = self.fit.scale {
            if !(MIN_SCALE_FACTOR..=1.0).contains(&scale) {
                return Err(ConfigError::Validation(
                    "fit.scale must be 0.1-1.0".into(),
                ));
            }
        }
        if self.processing.max_processes == Some(0) {
            return Err(ConfigError::Validation(
                "processing.max_processes must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Quality-mode defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompressConfig {
    pub quality: u8,
    /// Output format name (`"webp"`, `"JPG"`, ...). Absent keeps the source format.
    pub format: Option<String>,
}

impl Default for CompressConfig {
    fn default() -> Self {
        Self {
            quality: 85,
            format: None,
        }
    }
}

impl CompressConfig {
    /// Parsed [`format`](Self::format). Call after [`ToolConfig::validate`].
    pub fn format(&self) -> Result<Option<Format>, ConfigError> {
        self.format
            .as_deref()
            .map(str::parse::<Format>)
            .transpose()
            .map_err(|e| ConfigError::Validation(format!("compress.format: {e}")))
    }
}

/// Size-mode defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FitConfig {
    /// Budget in KiB.
    pub target_kb: u64,
    /// Percent around the budget.
    pub tolerance: f64,
    pub scale: Option<f64>,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            target_kb: 200,
            tolerance: 5.0,
            scale: None,
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel image processing workers.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_processes.map(|n| n.min(cores)).unwrap_or(cores)
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the base layer user overrides are merged on top of.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(ToolConfig::default())?)
}

/// Deep-merge two TOML values. Tables merge key by key; anything else in
/// `overlay` replaces `base`.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Read a config file as an untyped value. `Ok(None)` if it does not exist.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge `overlay` onto `base`, deserialize, and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<ToolConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: ToolConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load configuration.
///
/// `explicit` is a `--config` path and must exist. Without it,
/// [`DEFAULT_CONFIG_FILE`] in `dir` is used if present.
pub fn load_config(dir: &Path, explicit: Option<&Path>) -> Result<ToolConfig, ConfigError> {
    let overlay = match explicit {
        Some(path) => Some(toml::from_str(&fs::read_to_string(path)?)?),
        None => load_raw_config(&dir.join(DEFAULT_CONFIG_FILE))?,
    };
    resolve_config(stock_defaults_value()?, overlay)
}

/// Returns a fully-commented stock `imgfit.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# imgfit configuration
# ====================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# imgfit reads ./imgfit.toml, or the file given with --config.
# Command-line flags override anything set here.
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Quality mode (imgfit compress)
# ---------------------------------------------------------------------------
[compress]
# Encoder quality, 1 (smallest) to 100 (best).
quality = 85

# Output format: JPEG, PNG, WEBP, GIF, BMP, TIFF or AVIF (case-insensitive,
# JPG and TIF accepted). Omit to keep each source's own format.
# format = "webp"

# ---------------------------------------------------------------------------
# Size mode (imgfit fit)
# ---------------------------------------------------------------------------
[fit]
# Size budget in KiB (1 KiB = 1024 bytes).
target_kb = 200

# Accepted deviation from the budget, in percent.
tolerance = 5.0

# Resize by this factor (0.1-1.0) before searching. Omit to keep dimensions.
# scale = 0.5

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel workers for directory inputs.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4
"##
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_values() {
        let config = ToolConfig::default();
        assert_eq!(config.compress.quality, 85);
        assert_eq!(config.compress.format, None);
        assert_eq!(config.fit.target_kb, 200);
        assert_eq!(config.fit.tolerance, 5.0);
        assert_eq!(config.fit.scale, None);
        assert_eq!(config.processing.max_processes, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parse_partial_config() {
        let toml = r#"
[fit]
target_kb = 50
"#;
        let config: ToolConfig = toml::from_str(toml).unwrap();
        // Overridden value
        assert_eq!(config.fit.target_kb, 50);
        // Default values preserved
        assert_eq!(config.fit.tolerance, 5.0);
        assert_eq!(config.compress.quality, 85);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let result: Result<ToolConfig, _> = toml::from_str("[fit]\ntarget = 10\n");
        assert!(result.is_err());
        let result: Result<ToolConfig, _> = toml::from_str("[images]\nquality = 10\n");
        assert!(result.is_err());
    }

    #[test]
    fn compress_format_parses_aliases() {
        let config: ToolConfig = toml::from_str("[compress]\nformat = \"jpg\"\n").unwrap();
        assert_eq!(config.compress.format().unwrap(), Some(Format::Jpeg));
    }

    // =========================================================================
    // Validation
    // =========================================================================

    #[test]
    fn validate_rejects_quality_zero() {
        let mut config = ToolConfig::default();
        config.compress.quality = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn validate_rejects_quality_over_100() {
        let mut config = ToolConfig::default();
        config.compress.quality = 101;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_unknown_format() {
        let mut config = ToolConfig::default();
        config.compress.format = Some("heic".into());
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("compress.format"));
        assert!(err.contains("heic"));
    }

    #[test]
    fn validate_rejects_bad_fit_values() {
        let mut config = ToolConfig::default();
        config.fit.target_kb = 0;
        assert!(config.validate().is_err());

        let mut config = ToolConfig::default();
        config.fit.tolerance = 0.0;
        assert!(config.validate().is_err());

        let mut config = ToolConfig::default();
        config.fit.scale = Some(0.05);
        assert!(config.validate().is_err());

        let mut config = ToolConfig::default();
        config.fit.scale = Some(0.1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_workers() {
        let mut config = ToolConfig::default();
        config.processing.max_processes = Some(0);
        assert!(config.validate().is_err());
    }

    // =========================================================================
    // merge_toml
    // =========================================================================

    #[test]
    fn merge_toml_overlays_nested_keys() {
        let base: toml::Value = toml::from_str("[fit]\ntarget_kb = 200\ntolerance = 5.0\n").unwrap();
        let overlay: toml::Value = toml::from_str("[fit]\ntarget_kb = 20\n").unwrap();
        let merged = merge_toml(base, overlay);
        assert_eq!(merged["fit"]["target_kb"].as_integer(), Some(20));
        assert_eq!(merged["fit"]["tolerance"].as_float(), Some(5.0));
    }

    #[test]
    fn merge_toml_adds_new_keys() {
        let base: toml::Value = toml::from_str("[fit]\ntarget_kb = 200\n").unwrap();
        let overlay: toml::Value = toml::from_str("[fit]\nscale = 0.5\n").unwrap();
        let merged = merge_toml(base, overlay);
        assert_eq!(merged["fit"]["scale"].as_float(), Some(0.5));
        assert_eq!(merged["fit"]["target_kb"].as_integer(), Some(200));
    }

    #[test]
    fn stock_defaults_value_has_all_sections() {
        let val = stock_defaults_value().unwrap();
        assert!(val.is_table());
        assert!(val.get("compress").is_some());
        assert!(val.get("fit").is_some());
        assert!(val.get("processing").is_some());
    }

    // =========================================================================
    // load_config
    // =========================================================================

    #[test]
    fn load_config_returns_default_when_no_file() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(tmp.path(), None).unwrap();
        assert_eq!(config, ToolConfig::default());
    }

    #[test]
    fn load_config_reads_default_file() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join(DEFAULT_CONFIG_FILE),
            "[compress]\nquality = 60\n\n[processing]\nmax_processes = 2\n",
        )
        .unwrap();

        let config = load_config(tmp.path(), None).unwrap();
        assert_eq!(config.compress.quality, 60);
        assert_eq!(config.processing.max_processes, Some(2));
        // Unspecified values should be defaults
        assert_eq!(config.fit.target_kb, 200);
    }

    #[test]
    fn load_config_explicit_path() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("custom.toml");
        fs::write(&path, "[fit]\ntolerance = 10.0\n").unwrap();
        let config = load_config(Path::new("/nonexistent"), Some(&path)).unwrap();
        assert_eq!(config.fit.tolerance, 10.0);
    }

    #[test]
    fn load_config_missing_explicit_path_is_error() {
        let tmp = TempDir::new().unwrap();
        let result = load_config(tmp.path(), Some(&tmp.path().join("missing.toml")));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn load_config_invalid_toml_is_error() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(DEFAULT_CONFIG_FILE), "this is not valid toml [[[").unwrap();
        let result = load_config(tmp.path(), None);
        assert!(matches!(result, Err(ConfigError::Toml(_))));
    }

    #[test]
    fn load_config_invalid_value_is_validation_error() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(DEFAULT_CONFIG_FILE), "[fit]\ntolerance = -1.0\n").unwrap();
        let result = load_config(tmp.path(), None);
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn target_kb_over_byte_range_is_rejected() {
        let mut config = ToolConfig::default();
        config.fit.target_kb = MAX_TARGET_KB;
        assert!(config.validate().is_ok());
        assert!(MAX_TARGET_KB.checked_mul(1024).is_some());

        config.fit.target_kb = MAX_TARGET_KB + 1;
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn load_config_huge_target_kb_is_validation_error() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join(DEFAULT_CONFIG_FILE),
            "[fit]\ntarget_kb = 18014398509481985\n",
        )
        .unwrap();
        let result = load_config(tmp.path(), None);
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    // =========================================================================
    // stock_config_toml
    // =========================================================================

    #[test]
    fn stock_config_toml_parses_to_defaults() {
        let config: ToolConfig = toml::from_str(stock_config_toml()).unwrap();
        assert_eq!(config, ToolConfig::default());
    }

    #[test]
    fn effective_threads_caps_at_cores() {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let config = ProcessingConfig {
            max_processes: Some(100_000),
        };
        assert_eq!(effective_threads(&config), cores);
        let config = ProcessingConfig {
            max_processes: Some(1),
        };
        assert_eq!(effective_threads(&config), 1);
        assert_eq!(effective_threads(&ProcessingConfig::default()), cores);
    }
}
