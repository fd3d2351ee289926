use crate::core::codegen::{self, BUNDLE_FILE, ENTRY_SHIM, ENV_MODULE, SERVICE_SOURCE, STUBS_DIR};
use crate::core::manifest::WorkerManifest;
use crate::domain::model::{BundleRequest, SplitPlan};
use crate::domain::ports::{Bundler, Storage};
use crate::utils::error::Result;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const PLANS_FILE: &str = ".plans.json";
pub const MANIFEST_FILE: &str = "wrangler.jsonc";
pub const MAIN_UNIT: &str = "main";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltUnit {
    pub name: String,
    pub bundle_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSummary {
    /// Units in deploy order: siblings first, main last.
    pub units: Vec<BuiltUnit>,
    pub written: Vec<String>,
}

impl BuildSummary {
    pub fn unit_names(&self) -> Vec<&str> {
        self.units.iter().map(|u| u.name.as_str()).collect()
    }

    pub fn main_bytes(&self) -> u64 {
        self.units
            .iter()
            .find(|u| u.name == MAIN_UNIT)
            .map_or(0, |u| u.bundle_bytes)
    }

    pub fn siblings(&self) -> impl Iterator<Item = &BuiltUnit> {
        self.units.iter().filter(|u| u.name != MAIN_UNIT)
    }

    pub fn total_bytes(&self) -> u64 {
        self.units.iter().map(|u| u.bundle_bytes).sum()
    }
}

/// Generates every unit's sources and manifest, bundles them, and records the
/// plans for `deploy`.
///
/// `storage` and `output_dir` must point at the same directory: sources go
/// through storage, the bundler needs real paths.
pub struct SplitBuilder<S: Storage> {
    storage: S,
    output_dir: PathBuf,
}

impl<S: Storage> SplitBuilder<S> {
    pub fn new(storage: S, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            storage,
            output_dir: output_dir.into(),
        }
    }

    pub async fn build<B: Bundler + ?Sized>(
        &self,
        bundler: &B,
        entry: &Path,
        worker_name: &str,
        compatibility_date: &str,
        plans: &[SplitPlan],
    ) -> Result<BuildSummary> {
        let mut written = Vec::new();

        let env_path = format!("{}/{}/{}", MAIN_UNIT, STUBS_DIR, ENV_MODULE);
        self.write(&env_path, codegen::env_module(), &mut written).await?;

        let root = tokio::fs::canonicalize(&self.output_dir).await?;
        let entry = tokio::fs::canonicalize(entry).await?;
        let node_paths = node_paths(&entry);

        let mut aliases = BTreeMap::new();
        for plan in plans {
            let stub_name = codegen::stub_file_name(&plan.package_name);
            let stub_path = format!("{}/{}/{}", MAIN_UNIT, STUBS_DIR, stub_name);
            self.write(&stub_path, &codegen::client_stub(plan)?, &mut written)
                .await?;
            let types_path = format!("{}.d.ts", stub_path.strip_suffix(".js").unwrap_or(&stub_path));
            self.write(&types_path, &codegen::stub_types(plan), &mut written)
                .await?;
            aliases.insert(plan.package_name.clone(), root.join(&stub_path));
        }

        let shim_path = format!("{}/{}", MAIN_UNIT, ENTRY_SHIM);
        self.write(&shim_path, &codegen::entry_shim(&entry)?, &mut written)
            .await?;

        let mut units = Vec::with_capacity(plans.len() + 1);
        for plan in plans {
            let unit = &plan.service_name;
            let source_path = format!("{}/{}", unit, SERVICE_SOURCE);
            self.write(&source_path, &codegen::service_worker(plan)?, &mut written)
                .await?;
            let manifest = WorkerManifest::sibling(plan, compatibility_date);
            self.write(&manifest_path(unit), &manifest.to_jsonc()?, &mut written)
                .await?;

            let request = BundleRequest {
                entry: root.join(&source_path),
                outfile: root.join(bundle_path(unit)),
                aliases: BTreeMap::new(),
                node_paths: node_paths.clone(),
            };
            units.push(self.bundle(bundler, unit, request, &mut written).await?);
        }

        let main = WorkerManifest::main(worker_name, compatibility_date, plans);
        self.write(&manifest_path(MAIN_UNIT), &main.to_jsonc()?, &mut written)
            .await?;
        let request = BundleRequest {
            entry: root.join(&shim_path),
            outfile: root.join(bundle_path(MAIN_UNIT)),
            aliases,
            node_paths,
        };
        units.push(self.bundle(bundler, MAIN_UNIT, request, &mut written).await?);

        let plans_json = serde_json::to_string_pretty(plans)?;
        self.write(PLANS_FILE, &plans_json, &mut written).await?;

        tracing::info!("Built {} unit(s)", units.len());
        Ok(BuildSummary { units, written })
    }

    async fn write(&self, path: &str, contents: &str, written: &mut Vec<String>) -> Result<()> {
        self.storage.write_file(path, contents.as_bytes()).await?;
        tracing::debug!("Wrote {}", path);
        written.push(path.to_string());
        Ok(())
    }

    async fn bundle<B: Bundler + ?Sized>(
        &self,
        bundler: &B,
        unit: &str,
        request: BundleRequest,
        written: &mut Vec<String>,
    ) -> Result<BuiltUnit> {
        tracing::info!("Bundling {}...", unit);
        let bundle_bytes = bundler.bundle_unit(&request).await?;
        written.push(bundle_path(unit));
        Ok(BuiltUnit {
            name: unit.to_string(),
            bundle_bytes,
        })
    }
}

/// The entry's own `node_modules`, then the working directory's.
fn node_paths(entry: &Path) -> Vec<PathBuf> {
    let mut paths = Vec::with_capacity(2);
    if let Some(dir) = entry.parent() {
        paths.push(dir.join("node_modules"));
    }
    if let Ok(cwd) = std::env::current_dir() {
        let local = cwd.join("node_modules");
        if !paths.contains(&local) {
            paths.push(local);
        }
    }
    paths
}

pub fn manifest_path(unit: &str) -> String {
    format!("{}/{}", unit, MANIFEST_FILE)
}

pub fn bundle_path(unit: &str) -> String {
    format!("{}/{}", unit, BUNDLE_FILE)
}

pub async fn load_plans<S: Storage>(storage: &S) -> Result<Vec<SplitPlan>> {
    let data = storage.read_file(PLANS_FILE).await?;
    Ok(serde_json::from_slice(&data)?)
}
