use crate::domain::model::{BundleReport, InputFile, Metafile, PackageSizeReport};
use crate::domain::ports::Bundler;
use crate::utils::error::{Result, SplitError};
use std::collections::BTreeMap;
use std::path::Path;

const DEPENDENCY_ROOT: &str = "node_modules/";
const REPORT_ROWS: usize = 15;

/// Bundles `entry` and attributes output bytes to the packages they came from.
pub async fn analyze_bundle<B: Bundler + ?Sized>(bundler: &B, entry: &Path) -> Result<BundleReport> {
    let is_file = tokio::fs::metadata(entry)
        .await
        .map(|meta| meta.is_file())
        .unwrap_or(false);
    if !is_file {
        return Err(SplitError::AnalysisError {
            entry: entry.display().to_string(),
            reason: "entry file does not exist".to_string(),
        });
    }

    tracing::debug!("Bundling {} for size analysis", entry.display());
    let metafile = bundler
        .metafile(entry)
        .await
        .map_err(|e| match e {
            err @ SplitError::AnalysisError { .. } => err,
            other => SplitError::AnalysisError {
                entry: entry.display().to_string(),
                reason: other.to_string(),
            },
        })?;

    report_from_metafile(&metafile).ok_or_else(|| SplitError::AnalysisError {
        entry: entry.display().to_string(),
        reason: "bundler produced no output".to_string(),
    })
}

/// Builds the size report from the first output of a metafile.
pub fn report_from_metafile(metafile: &Metafile) -> Option<BundleReport> {
    let output = metafile.outputs.values().next()?;
    let total_bytes = output.bytes;

    let mut by_package: BTreeMap<String, (u64, Vec<InputFile>)> = BTreeMap::new();
    for (path, input) in &output.inputs {
        let Some(name) = extract_package_name(path) else {
            continue;
        };
        let entry = by_package.entry(name).or_default();
        entry.0 += input.bytes_in_output;
        entry.1.push(InputFile {
            path: path.clone(),
            bytes: input.bytes_in_output,
        });
    }

    let mut packages: Vec<PackageSizeReport> = by_package
        .into_iter()
        .map(|(name, (bytes, files))| PackageSizeReport {
            name,
            bytes,
            percentage: percentage(bytes, total_bytes),
            files,
        })
        .collect();
    // BTreeMap order already sorts by name, so ties stay alphabetical
    packages.sort_by(|a, b| b.bytes.cmp(&a.bytes));

    Some(BundleReport {
        packages,
        total_bytes,
    })
}

fn percentage(bytes: u64, total: u64) -> u64 {
    if total == 0 {
        return 0;
    }
    (bytes as f64 / total as f64 * 100.0).round() as u64
}

/// Package owning a bundled input path, if the path lies under a dependency root.
///
/// Scoped packages take two segments (`@scope/name`), others one.
pub fn extract_package_name(input_path: &str) -> Option<String> {
    let normalized = input_path.replace('\\', "/");
    let start = normalized.find(DEPENDENCY_ROOT)? + DEPENDENCY_ROOT.len();
    let rest = &normalized[start..];

    let mut parts = rest.split('/');
    let first = parts.next().filter(|s| !s.is_empty())?;
    if first.starts_with('@') {
        let second = parts.next().filter(|s| !s.is_empty())?;
        Some(format!("{}/{}", first, second))
    } else {
        Some(first.to_string())
    }
}

pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * 1024;

    if bytes < KB {
        format!("{} B", bytes)
    } else if bytes < MB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    }
}

/// Human readable size table of the largest packages.
pub fn format_report(report: &BundleReport) -> String {
    let mut lines = vec![
        format!("Bundle size: {}", format_bytes(report.total_bytes)),
        String::new(),
        "Dependencies by size:".to_string(),
        "─".repeat(60),
    ];

    for package in report.packages.iter().take(REPORT_ROWS) {
        let bar = "█".repeat(((package.percentage as f64 / 2.0).round() as usize).max(1));
        lines.push(format!(
            "  {:<30} {:>10} {:>3}% {}",
            package.name,
            format_bytes(package.bytes),
            package.percentage,
            bar
        ));
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{BundleRequest, MetafileInput, MetafileOutput};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    fn metafile(total: u64, inputs: &[(&str, u64)]) -> Metafile {
        let mut outputs = BTreeMap::new();
        outputs.insert(
            "out.js".to_string(),
            MetafileOutput {
                bytes: total,
                inputs: inputs
                    .iter()
                    .map(|(path, bytes)| {
                        (
                            path.to_string(),
                            MetafileInput {
                                bytes_in_output: *bytes,
                            },
                        )
                    })
                    .collect(),
            },
        );
        Metafile { outputs }
    }

    #[test]
    fn test_extract_package_name() {
        assert_eq!(
            extract_package_name("node_modules/sql-formatter/dist/index.js"),
            Some("sql-formatter".to_string())
        );
        assert_eq!(
            extract_package_name("../node_modules/@faker-js/faker/dist/esm/index.mjs"),
            Some("@faker-js/faker".to_string())
        );
        assert_eq!(
            extract_package_name("C:\\app\\node_modules\\lodash-es\\chunk.js"),
            Some("lodash-es".to_string())
        );
        assert_eq!(extract_package_name("src/index.ts"), None);
        assert_eq!(extract_package_name("node_modules/@scope"), None);
    }

    #[test]
    fn test_format_bytes_boundaries() {
        assert_eq!(format_bytes(500), "500 B");
        assert_eq!(format_bytes(1023), "1023 B");
        assert_eq!(format_bytes(1024), "1.0 KB");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(1024 * 1024), "1.00 MB");
        assert_eq!(format_bytes(4 * 1024 * 1024 + 512 * 1024), "4.50 MB");
    }

    #[test]
    fn test_report_attributes_and_sorts() {
        let report = report_from_metafile(&metafile(
            1000,
            &[
                ("src/index.ts", 50),
                ("node_modules/tiny-lib/index.js", 100),
                ("node_modules/@faker-js/faker/a.js", 300),
                ("node_modules/@faker-js/faker/b.js", 200),
                ("node_modules/sql-formatter/index.js", 350),
            ],
        ))
        .unwrap();

        assert_eq!(report.total_bytes, 1000);
        assert_eq!(
            report.package_names(),
            vec!["@faker-js/faker", "sql-formatter", "tiny-lib"]
        );
        let faker = report.find("@faker-js/faker").unwrap();
        assert_eq!(faker.bytes, 500);
        assert_eq!(faker.percentage, 50);
        assert_eq!(faker.files.len(), 2);
        assert_eq!(report.find("sql-formatter").unwrap().percentage, 35);
    }

    #[test]
    fn test_empty_metafile_has_no_report() {
        assert!(report_from_metafile(&Metafile::default()).is_none());
    }

    #[test]
    fn test_format_report_lists_packages() {
        let report = report_from_metafile(&metafile(
            2048,
            &[("node_modules/sql-formatter/index.js", 1024)],
        ))
        .unwrap();
        let text = format_report(&report);
        assert!(text.starts_with("Bundle size: 2.0 KB"));
        assert!(text.contains("sql-formatter"));
        assert!(text.contains("1.0 KB"));
        assert!(text.contains(" 50% "));
    }

    struct FailingBundler;

    #[async_trait]
    impl Bundler for FailingBundler {
        async fn metafile(&self, _entry: &Path) -> Result<Metafile> {
            Err(SplitError::ConfigError {
                message: "esbuild exited with status 1".to_string(),
            })
        }

        async fn bundle_source(&self, _contents: &str, _resolve_dir: &Path) -> Result<String> {
            Ok(String::new())
        }

        async fn bundle_unit(&self, _request: &BundleRequest) -> Result<u64> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn test_missing_entry_is_an_analysis_error() {
        let err = analyze_bundle(&FailingBundler, Path::new("does/not/exist.ts"))
            .await
            .unwrap_err();
        assert!(matches!(err, SplitError::AnalysisError { .. }));
    }

    #[tokio::test]
    async fn test_directory_entry_is_rejected_before_bundling() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = analyze_bundle(&FailingBundler, dir.path()).await.unwrap_err();
        match err {
            SplitError::AnalysisError { reason, .. } => {
                assert_eq!(reason, "entry file does not exist")
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_bundler_failure_is_an_analysis_error() {
        let entry = tempfile::NamedTempFile::new().unwrap();
        let err = analyze_bundle(&FailingBundler, entry.path()).await.unwrap_err();
        match err {
            SplitError::AnalysisError { reason, .. } => assert!(reason.contains("esbuild")),
            other => panic!("unexpected error: {other}"),
        }
    }
}
