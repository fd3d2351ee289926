use crate::domain::ports::ModuleLoader;
use crate::utils::error::{Result, SplitError};
use async_trait::async_trait;
use std::path::Path;
use tokio::process::Command;

const LIST_KEYS: &str =
    "const m = require(process.argv[1]); console.log(JSON.stringify(Object.keys(m)));";

/// Loads packages with `node` to read their export keys.
#[derive(Debug, Clone)]
pub struct NodeLoader {
    program: String,
}

impl NodeLoader {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn keys_from(&self, package: &str, dir: &Path) -> Result<Vec<String>> {
        let output = Command::new(&self.program)
            .args(["-e", LIST_KEYS, package])
            .current_dir(dir)
            .output()
            .await?;
        if !output.status.success() {
            return Err(SplitError::ToolError {
                tool: self.program.clone(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(serde_json::from_slice(&output.stdout)?)
    }
}

impl Default for NodeLoader {
    fn default() -> Self {
        Self::new("node")
    }
}

#[async_trait]
impl ModuleLoader for NodeLoader {
    /// Tries `resolve_dir` first, then each ancestor, and reports the last failure.
    async fn own_keys(&self, package: &str, resolve_dir: &Path) -> Result<Vec<String>> {
        let mut last_error = None;
        for dir in resolve_dir.ancestors() {
            if dir.as_os_str().is_empty() {
                continue;
            }
            match self.keys_from(package, dir).await {
                Ok(keys) => return Ok(keys),
                Err(e) => {
                    tracing::debug!("Loading {} from {} failed: {}", package, dir.display(), e);
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| SplitError::ToolError {
            tool: self.program.clone(),
            reason: format!("no directory to resolve {} from", package),
        }))
    }
}
