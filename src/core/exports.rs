use crate::domain::ports::{Bundler, ModuleLoader};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use std::path::Path;

static EXPORT_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)export\s*\{([^}]+)\}").expect("valid export block pattern"));
static EXPORT_ALIAS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+as\s+(\S+)$").expect("valid alias pattern"));
static EXPORT_FUNCTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"export\s+(?:async\s+)?function\s+(\w+)").expect("valid function pattern")
});
static EXPORT_BINDING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"export\s+(?:var|let|const)\s+(\w+)").expect("valid binding pattern")
});
static IDENTIFIER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\w+$").expect("valid identifier pattern"));

/// Statically named exports of `package`, sorted.
///
/// Never fails: an empty list means the caller should expose only the
/// dynamic root handle.
pub async fn discover_exports<B, L>(
    bundler: &B,
    loader: &L,
    package: &str,
    resolve_dir: &Path,
) -> Vec<String>
where
    B: Bundler + ?Sized,
    L: ModuleLoader + ?Sized,
{
    let source = reexport_source(package);
    match bundler.bundle_source(&source, resolve_dir).await {
        Ok(code) => {
            let names = parse_export_names(&code);
            if !names.is_empty() {
                return names.into_iter().collect();
            }
            tracing::debug!("No static exports found for {}, loading the module instead", package);
        }
        Err(e) => {
            tracing::warn!("Bundling {} for export discovery failed: {}", package, e);
        }
    }

    match loader.own_keys(package, resolve_dir).await {
        Ok(keys) => {
            let names: BTreeSet<String> = keys
                .into_iter()
                .filter(|k| k != "default" && k != "__esModule")
                .collect();
            names.into_iter().collect()
        }
        Err(e) => {
            tracing::warn!("Could not load {} to list its exports: {}", package, e);
            Vec::new()
        }
    }
}

pub fn reexport_source(package: &str) -> String {
    format!("export * from \"{}\";", package)
}

/// Export names found in bundled ESM output, excluding `default`.
pub fn parse_export_names(code: &str) -> BTreeSet<String> {
    let mut names = BTreeSet::new();

    for block in EXPORT_BLOCK.captures_iter(code) {
        for part in block[1].split(',') {
            let trimmed = part.trim();
            if trimmed.is_empty() {
                continue;
            }
            let name = match EXPORT_ALIAS.captures(trimmed) {
                Some(alias) => alias[1].to_string(),
                None => trimmed.to_string(),
            };
            if name != "default" && IDENTIFIER.is_match(&name) {
                names.insert(name);
            }
        }
    }

    for declared in EXPORT_FUNCTION
        .captures_iter(code)
        .chain(EXPORT_BINDING.captures_iter(code))
    {
        if &declared[1] != "default" {
            names.insert(declared[1].to_string());
        }
    }

    names
}
