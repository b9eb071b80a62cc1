//! Configuration management for herakles-sampler.
//!
//! This module handles loading, merging, and validating configuration from files
//! and CLI arguments. It supports YAML, JSON, and TOML formats.

use crate::cli::{Args, ConfigFormat, LogLevel};
use clap::ValueEnum;
use herakles_sampler::process::{SortKey, SortSpec};
use herakles_sampler::sampler::DEFAULT_FRAMEWORK_INTERVAL;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

// Default configuration constants
pub const DEFAULT_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_TOP_N: usize = 10;
pub const DEFAULT_PROC_ROOT: &str = "/proc";

/// Effective sampler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplerConfig {
    // Collection
    #[serde(alias = "collect-regions")]
    pub collect_regions: Option<bool>,
    #[serde(alias = "collect-frameworks")]
    pub collect_frameworks: Option<bool>,
    /// Passes between framework refreshes
    #[serde(alias = "framework-interval")]
    pub framework_interval: Option<u32>,

    // Loop
    #[serde(alias = "interval-ms")]
    pub interval_ms: Option<u64>,
    /// 0 runs until killed
    pub iterations: Option<u64>,
    #[serde(alias = "proc-root")]
    pub proc_root: Option<PathBuf>,

    // Output
    #[serde(alias = "top-n")]
    pub top_n: Option<usize>,
    #[serde(alias = "sort-primary")]
    pub sort_primary: Option<String>,
    #[serde(alias = "sort-secondary")]
    pub sort_secondary: Option<String>,

    // Logging
    #[serde(alias = "log-level")]
    pub log_level: Option<String>,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            collect_regions: Some(false),
            collect_frameworks: Some(false),
            framework_interval: Some(DEFAULT_FRAMEWORK_INTERVAL),
            interval_ms: Some(DEFAULT_INTERVAL_MS),
            iterations: Some(0),
            proc_root: Some(PathBuf::from(DEFAULT_PROC_ROOT)),
            top_n: Some(DEFAULT_TOP_N),
            sort_primary: Some("-cpu".into()),
            sort_secondary: Some("+pid".into()),
            log_level: Some("info".into()),
        }
    }
}

impl SamplerConfig {
    /// Sort key built from the configured primary and secondary fields.
    pub fn sort_key(&self) -> Result<SortKey, String> {
        let fallback = SortKey::default();
        let primary = match self.sort_primary.as_deref() {
            Some(s) => s.parse::<SortSpec>()?,
            None => fallback.primary,
        };
        let secondary = match self.sort_secondary.as_deref() {
            Some(s) => s.parse::<SortSpec>()?,
            None => fallback.secondary,
        };
        Ok(SortKey::new(primary, secondary))
    }

    /// Configured log level, if it names a known level.
    pub fn log_level(&self) -> Option<LogLevel> {
        self.log_level
            .as_deref()
            .and_then(|s| LogLevel::from_str(s, true).ok())
    }
}

/// Validate effective config (used by --check-config and at startup)
pub fn validate_effective_config(cfg: &SamplerConfig) -> Result<(), Box<dyn std::error::Error>> {
    if cfg.interval_ms == Some(0) {
        return Err("interval_ms must be greater than 0".into());
    }
    if cfg.framework_interval == Some(0) {
        return Err("framework_interval must be greater than 0".into());
    }

    cfg.sort_key()?;

    if let Some(level) = cfg.log_level.as_deref() {
        if LogLevel::from_str(level, true).is_err() {
            return Err(format!(
                "Invalid log_level '{}', expected off, error, warn, info, debug or trace",
                level
            )
            .into());
        }
    }

    if let Some(root) = cfg.proc_root.as_deref() {
        if !root.is_dir() {
            return Err(format!("proc_root is not a directory: {}", root.display()).into());
        }
    }

    Ok(())
}

/// Resolves configuration from CLI args, config file, and defaults.
/// This enforces precedence: CLI (if provided) > config file > default.
pub fn resolve_config(args: &Args) -> Result<SamplerConfig, Box<dyn std::error::Error>> {
    let mut config = if args.no_config {
        SamplerConfig::default()
    } else {
        load_config(args.config.as_deref())?
    };

    if args.collect_regions {
        config.collect_regions = Some(true);
    }
    if args.collect_frameworks {
        config.collect_frameworks = Some(true);
    }
    if let Some(n) = args.framework_interval {
        config.framework_interval = Some(n);
    }
    if let Some(ms) = args.interval_ms {
        config.interval_ms = Some(ms);
    }
    if let Some(n) = args.iterations {
        config.iterations = Some(n);
    }
    if let Some(root) = &args.proc_root {
        config.proc_root = Some(root.clone());
    }
    if let Some(n) = args.top_n {
        config.top_n = Some(n);
    }
    if let Some(key) = &args.sort_primary {
        config.sort_primary = Some(key.clone());
    }
    if let Some(key) = &args.sort_secondary {
        config.sort_secondary = Some(key.clone());
    }
    if let Some(level) = args.log_level {
        if let Some(value) = level.to_possible_value() {
            config.log_level = Some(value.get_name().to_string());
        }
    }

    Ok(config)
}

/// Loads a config file, falling back to the default locations and then to
/// built-in defaults
pub fn load_config(path: Option<&Path>) -> Result<SamplerConfig, Box<dyn std::error::Error>> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let defaults = [
                "/etc/herakles/sampler.yaml",
                "/etc/herakles/sampler.yml",
                "/etc/herakles/sampler.json",
                "./herakles-sampler.yaml",
                "./herakles-sampler.yml",
                "./herakles-sampler.json",
            ];

            match defaults.iter().find(|p| Path::new(p).exists()) {
                Some(p) => PathBuf::from(p),
                None => return Ok(SamplerConfig::default()),
            }
        }
    };

    let content = fs::read_to_string(&path)?;

    match path.extension().and_then(|s| s.to_str()) {
        Some("json") => {
            let config: SamplerConfig = serde_json::from_str(&content)?;
            info!("Loaded JSON configuration from: {}", path.display());
            Ok(config)
        }
        Some("toml") => {
            let config: SamplerConfig = toml::from_str(&content)?;
            info!("Loaded TOML configuration from: {}", path.display());
            Ok(config)
        }
        _ => {
            // Default to YAML
            let config: SamplerConfig = serde_yaml::from_str(&content)?;
            info!("Loaded YAML configuration from: {}", path.display());
            Ok(config)
        }
    }
}

/// Shows configuration in requested format
pub fn show_config(
    config: &SamplerConfig,
    format: ConfigFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let output = match format {
        ConfigFormat::Json => serde_json::to_string_pretty(config)?,
        ConfigFormat::Toml => toml::to_string_pretty(config)?,
        ConfigFormat::Yaml => serde_yaml::to_string(config)?,
    };

    println!("{output}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use herakles_sampler::process::{Order, SortField};
    use tempfile::tempdir;

    // -------------------------------------------------------------------------
    // Tests for load_config
    // -------------------------------------------------------------------------

    #[test]
    fn test_load_yaml_with_dashed_keys() {
        let dir = tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("sampler.yaml");
        fs::write(
            &path,
            "collect-regions: true\ninterval-ms: 250\nsort-primary: \"-rsize\"\n",
        )
        .unwrap();

        let cfg = load_config(Some(&path)).unwrap();
        assert_eq!(cfg.collect_regions, Some(true));
        assert_eq!(cfg.interval_ms, Some(250));
        assert_eq!(cfg.top_n, None);
        assert_eq!(
            cfg.sort_key().unwrap().primary,
            SortSpec::new(SortField::Resident, Order::Descending)
        );
    }

    #[test]
    fn test_load_json_and_toml() {
        let dir = tempdir().expect("Failed to create temp dir");
        let json = dir.path().join("sampler.json");
        fs::write(&json, r#"{"top_n": 3, "framework_interval": 5}"#).unwrap();
        let cfg = load_config(Some(&json)).unwrap();
        assert_eq!(cfg.top_n, Some(3));
        assert_eq!(cfg.framework_interval, Some(5));

        let toml_path = dir.path().join("sampler.toml");
        fs::write(&toml_path, "iterations = 2\nlog_level = \"debug\"\n").unwrap();
        let cfg = load_config(Some(&toml_path)).unwrap();
        assert_eq!(cfg.iterations, Some(2));
        assert_eq!(cfg.log_level(), Some(LogLevel::Debug));
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let dir = tempdir().expect("Failed to create temp dir");
        assert!(load_config(Some(&dir.path().join("absent.yaml"))).is_err());
    }

    // -------------------------------------------------------------------------
    // Tests for validation and precedence
    // -------------------------------------------------------------------------

    #[test]
    fn test_validate_rejects_zero_intervals() {
        let dir = tempdir().expect("Failed to create temp dir");
        let base = SamplerConfig {
            proc_root: Some(dir.path().to_path_buf()),
            ..SamplerConfig::default()
        };
        assert!(validate_effective_config(&base).is_ok());

        let cfg = SamplerConfig {
            interval_ms: Some(0),
            ..base.clone()
        };
        assert!(validate_effective_config(&cfg).is_err());

        let cfg = SamplerConfig {
            framework_interval: Some(0),
            ..base
        };
        assert!(validate_effective_config(&cfg).is_err());
    }

    #[test]
    fn test_validate_rejects_unknown_names() {
        let cfg = SamplerConfig {
            sort_primary: Some("-bogus".into()),
            proc_root: None,
            ..SamplerConfig::default()
        };
        assert!(validate_effective_config(&cfg).is_err());

        let cfg = SamplerConfig {
            log_level: Some("loud".into()),
            proc_root: None,
            ..SamplerConfig::default()
        };
        assert!(validate_effective_config(&cfg).is_err());
    }

    #[test]
    fn test_cli_overrides_config() {
        let args = Args::parse_from([
            "herakles-sampler",
            "--no-config",
            "-r",
            "--interval-ms",
            "50",
            "-o",
            "+pid",
            "--log-level",
            "warn",
        ]);
        let cfg = resolve_config(&args).unwrap();
        assert_eq!(cfg.collect_regions, Some(true));
        assert_eq!(cfg.collect_frameworks, Some(false));
        assert_eq!(cfg.interval_ms, Some(50));
        assert_eq!(cfg.sort_primary.as_deref(), Some("+pid"));
        assert_eq!(cfg.log_level(), Some(LogLevel::Warn));
    }
}
