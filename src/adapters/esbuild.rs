use crate::domain::model::{BundleRequest, Metafile};
use crate::domain::ports::Bundler;
use crate::utils::error::{Result, SplitError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use uuid::Uuid;

/// Flags shared by every invocation: an ESM bundle targeting a worker runtime.
const BASE_FLAGS: [&str; 6] = [
    "--bundle",
    "--format=esm",
    "--platform=neutral",
    "--main-fields=module,main",
    "--conditions=worker,browser",
    "--log-level=error",
];

/// Left as imports in deployable bundles; the worker runtime provides them.
const RUNTIME_EXTERNALS: [&str; 16] = [
    "cloudflare:workers",
    "cloudflare:*",
    "node:*",
    "module",
    "url",
    "path",
    "fs",
    "fs/promises",
    "process",
    "assert",
    "util",
    "v8",
    "os",
    "crypto",
    "stream",
    "events",
];

/// The `esbuild` executable driven through its command line.
#[derive(Debug, Clone)]
pub struct EsbuildCli {
    program: String,
}

impl EsbuildCli {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn failure(&self, reason: impl Into<String>) -> SplitError {
        SplitError::ToolError {
            tool: self.program.clone(),
            reason: reason.into(),
        }
    }

    fn scratch_dir() -> PathBuf {
        std::env::temp_dir().join(format!("overwork-{}", Uuid::new_v4()))
    }
}

impl Default for EsbuildCli {
    fn default() -> Self {
        Self::new("esbuild")
    }
}

#[async_trait]
impl Bundler for EsbuildCli {
    async fn metafile(&self, entry: &Path) -> Result<Metafile> {
        let scratch = Self::scratch_dir();
        tokio::fs::create_dir_all(&scratch).await?;
        let meta_path = scratch.join("meta.json");

        let output = Command::new(&self.program)
            .arg(entry)
            .args(BASE_FLAGS)
            .arg(format!("--metafile={}", meta_path.display()))
            .arg(format!("--outfile={}", scratch.join("out.js").display()))
            .stdin(Stdio::null())
            .output()
            .await;

        let result = match output {
            Ok(output) if output.status.success() => tokio::fs::read(&meta_path)
                .await
                .map_err(SplitError::from)
                .and_then(|data| Ok(serde_json::from_slice(&data)?)),
            Ok(output) => Err(self.failure(String::from_utf8_lossy(&output.stderr).trim())),
            Err(e) => Err(self.failure(e.to_string())),
        };

        if let Err(e) = tokio::fs::remove_dir_all(&scratch).await {
            tracing::debug!("Could not remove {}: {}", scratch.display(), e);
        }
        result
    }

    async fn bundle_source(&self, contents: &str, resolve_dir: &Path) -> Result<String> {
        let mut child = Command::new(&self.program)
            .args(BASE_FLAGS)
            .arg("--loader=js")
            .current_dir(resolve_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.failure(e.to_string()))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(contents.as_bytes()).await?;
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(self.failure(String::from_utf8_lossy(&output.stderr).trim()));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn bundle_unit(&self, request: &BundleRequest) -> Result<u64> {
        let mut command = Command::new(&self.program);
        command
            .arg(&request.entry)
            .args(BASE_FLAGS)
            .arg("--target=es2022")
            .arg(format!("--outfile={}", request.outfile.display()))
            .args(RUNTIME_EXTERNALS.iter().map(|name| format!("--external:{}", name)))
            .args(
                request
                    .aliases
                    .iter()
                    .map(|(package, file)| format!("--alias:{}={}", package, file.display())),
            )
            .stdin(Stdio::null());
        if !request.node_paths.is_empty() {
            let joined = std::env::join_paths(&request.node_paths)
                .map_err(|e| self.failure(format!("invalid node path: {}", e)))?;
            command.env("NODE_PATH", joined);
        }

        let output = command
            .output()
            .await
            .map_err(|e| self.failure(e.to_string()))?;
        if !output.status.success() {
            return Err(self.failure(String::from_utf8_lossy(&output.stderr).trim()));
        }

        let bytes = tokio::fs::metadata(&request.outfile).await?.len();
        tracing::debug!("Bundled {} ({} bytes)", request.outfile.display(), bytes);
        Ok(bytes)
    }
}
