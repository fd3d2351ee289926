use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// One bundled input file attributed to a package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputFile {
    pub path: String,
    pub bytes: u64,
}

/// Byte attribution for a single package in one analysis run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageSizeReport {
    pub name: String,
    pub bytes: u64,
    pub percentage: u64,
    pub files: Vec<InputFile>,
}

/// Result of analysing an entry module: packages ordered by size, largest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleReport {
    pub packages: Vec<PackageSizeReport>,
    pub total_bytes: u64,
}

impl BundleReport {
    pub fn find(&self, name: &str) -> Option<&PackageSizeReport> {
        self.packages.iter().find(|p| p.name == name)
    }

    pub fn package_names(&self) -> Vec<String> {
        self.packages.iter().map(|p| p.name.clone()).collect()
    }
}

/// Which packages to relocate.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitTarget {
    /// Every package at or above the byte threshold.
    #[default]
    Auto,
    /// Exactly these packages, in this order.
    Explicit(Vec<String>),
}

impl SplitTarget {
    /// Parses a `--split` value: comma separated names, empty or `auto` meaning automatic.
    pub fn parse(value: &str) -> Self {
        let names: Vec<String> = value
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        if names.is_empty() || (names.len() == 1 && names[0] == "auto") {
            SplitTarget::Auto
        } else {
            SplitTarget::Explicit(names)
        }
    }
}

/// Deployment plan for one relocated package. A list of plans is in deploy order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitPlan {
    pub package_name: String,
    pub service_name: String,
    pub binding_name: String,
    pub entrypoint_identifier: String,
    /// Empty means only the dynamic root handle is exposed.
    pub export_names: Vec<String>,
}

/// One deployable unit to bundle to disk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BundleRequest {
    pub entry: PathBuf,
    pub outfile: PathBuf,
    /// Imports of a package name resolve to the mapped file instead.
    pub aliases: BTreeMap<String, PathBuf>,
    /// Extra directories searched for packages.
    pub node_paths: Vec<PathBuf>,
}

/// The subset of an esbuild metafile the analyzer reads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metafile {
    pub outputs: BTreeMap<String, MetafileOutput>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetafileOutput {
    pub bytes: u64,
    #[serde(default)]
    pub inputs: BTreeMap<String, MetafileInput>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetafileInput {
    pub bytes_in_output: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_target_parse() {
        assert_eq!(SplitTarget::parse(""), SplitTarget::Auto);
        assert_eq!(SplitTarget::parse("auto"), SplitTarget::Auto);
        assert_eq!(
            SplitTarget::parse("sql-formatter, @faker-js/faker"),
            SplitTarget::Explicit(vec![
                "sql-formatter".to_string(),
                "@faker-js/faker".to_string()
            ])
        );
    }

    #[test]
    fn test_plan_serializes_camel_case() {
        let plan = SplitPlan {
            package_name: "sql-formatter".to_string(),
            service_name: "sql-formatter-service".to_string(),
            binding_name: "SQL_FORMATTER".to_string(),
            entrypoint_identifier: "SqlFormatterEntrypoint".to_string(),
            export_names: vec![],
        };
        let json = serde_json::to_value(&plan).unwrap();
        assert_eq!(json["packageName"], "sql-formatter");
        assert_eq!(json["entrypointIdentifier"], "SqlFormatterEntrypoint");
        assert!(json["exportNames"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_metafile_parses_esbuild_shape() {
        let raw = r#"{
            "inputs": {},
            "outputs": {
                "out.js": {
                    "bytes": 2048,
                    "inputs": {
                        "node_modules/tiny-lib/index.js": { "bytesInOutput": 120 }
                    }
                }
            }
        }"#;
        let metafile: Metafile = serde_json::from_str(raw).unwrap();
        let output = &metafile.outputs["out.js"];
        assert_eq!(output.bytes, 2048);
        assert_eq!(output.inputs["node_modules/tiny-lib/index.js"].bytes_in_output, 120);
    }
}
