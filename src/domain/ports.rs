use crate::domain::model::{BundleRequest, Metafile};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::path::Path;

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
    fn exists(&self, path: &str) -> impl std::future::Future<Output = bool> + Send;
}

/// The external bundler. Treated as a black box that yields byte attribution
/// and partially evaluated source.
#[async_trait]
pub trait Bundler: Send + Sync {
    /// Bundles `entry` without writing output and returns its metafile.
    async fn metafile(&self, entry: &Path) -> Result<Metafile>;

    /// Bundles an in-memory module resolved from `resolve_dir` and returns the output text.
    async fn bundle_source(&self, contents: &str, resolve_dir: &Path) -> Result<String>;

    /// Writes the bundle described by `request` and returns its size in bytes.
    async fn bundle_unit(&self, request: &BundleRequest) -> Result<u64>;
}

/// Loads a package at runtime and lists the keys of its module object.
#[async_trait]
pub trait ModuleLoader: Send + Sync {
    async fn own_keys(&self, package: &str, resolve_dir: &Path) -> Result<Vec<String>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    pub success: bool,
    pub status: Option<i32>,
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[&str], cwd: &Path) -> Result<CommandOutcome>;
}
