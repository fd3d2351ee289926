#[cfg(feature = "cli")]
pub mod cli;
pub mod toml_config;

use crate::domain::model::SplitTarget;
use crate::utils::error::Result;
use crate::utils::validation::{
    validate_compat_date, validate_non_empty_string, validate_path, validate_positive_number,
    validate_required_field, Validate,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub use toml_config::TomlConfig;

pub const DEFAULT_OUTPUT: &str = ".overwork";
pub const DEFAULT_THRESHOLD: u64 = 512_000;
pub const DEFAULT_WORKER_NAME: &str = "main-worker";
pub const DEFAULT_CONFIG_FILE: &str = "overwork.toml";

/// Settings for one analyze / plan / build / deploy run, after merging the
/// config file and command line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitConfig {
    pub entry: Option<String>,
    pub split: SplitTarget,
    pub output: String,
    pub threshold: u64,
    pub worker_name: String,
    pub compat_date: String,
    pub esbuild: String,
    pub node: String,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            entry: None,
            split: SplitTarget::Auto,
            output: DEFAULT_OUTPUT.to_string(),
            threshold: DEFAULT_THRESHOLD,
            worker_name: DEFAULT_WORKER_NAME.to_string(),
            compat_date: today(),
            esbuild: "esbuild".to_string(),
            node: "node".to_string(),
        }
    }
}

impl SplitConfig {
    /// Defaults overlaid with whatever the file sets.
    pub fn from_toml(file: &TomlConfig) -> Self {
        let mut config = Self::default();
        file.apply(&mut config);
        config
    }

    pub fn entry_path(&self) -> Result<&Path> {
        validate_required_field("entry", &self.entry).map(Path::new)
    }

    /// Directory bare package specifiers resolve from.
    pub fn resolve_dir(&self) -> Result<PathBuf> {
        let entry = self.entry_path()?;
        let dir = match entry.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        Ok(std::fs::canonicalize(&dir).unwrap_or(dir))
    }

    /// Checks everything except `entry`, which only some commands need.
    pub fn validate_common(&self) -> Result<()> {
        validate_path("output", &self.output)?;
        validate_positive_number("threshold", self.threshold, 1)?;
        validate_non_empty_string("name", &self.worker_name)?;
        validate_compat_date("compat_date", &self.compat_date)?;
        validate_non_empty_string("esbuild", &self.esbuild)?;
        validate_non_empty_string("node", &self.node)?;
        if let SplitTarget::Explicit(names) = &self.split {
            for name in names {
                validate_non_empty_string("split", name)?;
            }
        }
        Ok(())
    }
}

impl Validate for SplitConfig {
    fn validate(&self) -> Result<()> {
        let entry = validate_required_field("entry", &self.entry)?;
        validate_path("entry", entry)?;
        self.validate_common()
    }
}

pub fn today() -> String {
    chrono::Utc::now().format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::error::SplitError;

    #[test]
    fn test_defaults_need_an_entry() {
        let config = SplitConfig::default();
        assert!(config.validate_common().is_ok());
        assert!(matches!(
            config.validate(),
            Err(SplitError::MissingConfigError { ref field }) if field == "entry"
        ));
    }

    #[test]
    fn test_zero_threshold_is_rejected() {
        let config = SplitConfig {
            entry: Some("src/index.ts".to_string()),
            threshold: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(SplitError::InvalidConfigValueError { ref field, .. }) if field == "threshold"
        ));
    }

    #[test]
    fn test_bad_compat_date_is_rejected() {
        let config = SplitConfig {
            entry: Some("src/index.ts".to_string()),
            compat_date: "12/02/2026".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_resolve_dir_of_bare_file_name() {
        let config = SplitConfig {
            entry: Some("index.ts".to_string()),
            ..Default::default()
        };
        let dir = config.resolve_dir().unwrap();
        assert!(dir.is_absolute() || dir == Path::new("."));
    }
}
