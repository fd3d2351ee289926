use crate::config::SplitConfig;
use crate::domain::model::SplitTarget;
use crate::utils::error::{Result, SplitError};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

static ENV_VAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([^}]+)\}").expect("valid env var pattern"));

/// `overwork.toml`. Every key is optional; command line flags win.
///
/// ```toml
/// entry = "src/index.ts"
/// output = ".overwork"
///
/// [split]
/// packages = ["sql-formatter", "@faker-js/faker"]
/// threshold = 512000
///
/// [worker]
/// name = "${WORKER_NAME}"
/// compat_date = "2026-02-12"
///
/// [tools]
/// esbuild = "./node_modules/.bin/esbuild"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TomlConfig {
    pub entry: Option<String>,
    pub output: Option<String>,
    #[serde(default)]
    pub split: SplitSection,
    #[serde(default)]
    pub worker: WorkerSection,
    #[serde(default)]
    pub tools: ToolsSection,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SplitSection {
    /// Absent or empty means automatic selection.
    pub packages: Option<Vec<String>>,
    pub threshold: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkerSection {
    pub name: Option<String>,
    pub compat_date: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolsSection {
    pub esbuild: Option<String>,
    pub node: Option<String>,
}

impl TomlConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&content)
    }

    /// Loads `path` if it exists. A missing file is only an error when the
    /// caller named it explicitly.
    pub fn load(path: &Path, explicit: bool) -> Result<Option<Self>> {
        if !explicit && !path.exists() {
            tracing::debug!("No {} found, using defaults", path.display());
            return Ok(None);
        }
        Self::from_file(path).map(Some)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed = Self::substitute_env_vars(content);

        toml::from_str(&processed).map_err(|e| SplitError::ConfigError {
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// Replaces `${VAR}` with the variable's value; unknown variables stay as written.
    fn substitute_env_vars(content: &str) -> String {
        ENV_VAR
            .replace_all(content, |caps: &regex::Captures| {
                let var_name = &caps[1];
                std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
            })
            .into_owned()
    }

    /// Copies every key this file sets onto `config`.
    pub fn apply(&self, config: &mut SplitConfig) {
        if let Some(entry) = &self.entry {
            config.entry = Some(entry.clone());
        }
        if let Some(output) = &self.output {
            config.output = output.clone();
        }
        if let Some(packages) = &self.split.packages {
            config.split = if packages.is_empty() {
                SplitTarget::Auto
            } else {
                SplitTarget::Explicit(packages.clone())
            };
        }
        if let Some(threshold) = self.split.threshold {
            config.threshold = threshold;
        }
        if let Some(name) = &self.worker.name {
            config.worker_name = name.clone();
        }
        if let Some(date) = &self.worker.compat_date {
            config.compat_date = date.clone();
        }
        if let Some(esbuild) = &self.tools.esbuild {
            config.esbuild = esbuild.clone();
        }
        if let Some(node) = &self.tools.node {
            config.node = node.clone();
        }
    }
}
