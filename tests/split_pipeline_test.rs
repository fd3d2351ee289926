use async_trait::async_trait;
use overwork::core::build::{load_plans, PLANS_FILE};
use overwork::domain::model::{BundleRequest, Metafile, SplitTarget};
use overwork::domain::ports::{Bundler, CommandOutcome, CommandRunner, ModuleLoader};
use overwork::{Deployer, LocalStorage, Result, SplitConfig, SplitEngine, SplitError};
use pretty_assertions::assert_eq;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::TempDir;

/// Bundler fake: a fixed metafile, export blocks for the packages it knows,
/// and unit bundles that are copies of their entry.
struct FakeBundler;

#[async_trait]
impl Bundler for FakeBundler {
    async fn metafile(&self, _entry: &Path) -> Result<Metafile> {
        let raw = serde_json::json!({
            "outputs": {
                "out.js": {
                    "bytes": 2_000_000,
                    "inputs": {
                        "src/index.ts": { "bytesInOutput": 50_000 },
                        "node_modules/sql-formatter/lib/index.js": { "bytesInOutput": 600_000 },
                        "node_modules/sql-formatter/lib/dialects.js": { "bytesInOutput": 100_000 },
                        "node_modules/@faker-js/faker/dist/index.js": { "bytesInOutput": 1_200_000 },
                        "node_modules/tiny-lib/index.js": { "bytesInOutput": 50_000 }
                    }
                }
            }
        });
        Ok(serde_json::from_value(raw)?)
    }

    async fn bundle_source(&self, contents: &str, _resolve_dir: &Path) -> Result<String> {
        if contents.contains("sql-formatter") {
            Ok("var x = 1;\nexport {\n  format,\n  supportedDialects\n};\n".to_string())
        } else {
            Ok("module.exports = require_faker();\n".to_string())
        }
    }

    async fn bundle_unit(&self, request: &BundleRequest) -> Result<u64> {
        let code = tokio::fs::read(&request.entry).await?;
        tokio::fs::create_dir_all(request.outfile.parent().unwrap()).await?;
        tokio::fs::write(&request.outfile, &code).await?;
        Ok(code.len() as u64)
    }
}

/// Loader fake that cannot load anything, so discovery ends empty.
struct BrokenLoader;

#[async_trait]
impl ModuleLoader for BrokenLoader {
    async fn own_keys(&self, package: &str, _resolve_dir: &Path) -> Result<Vec<String>> {
        Err(SplitError::ToolError {
            tool: "node".to_string(),
            reason: format!("Cannot find module '{}'", package),
        })
    }
}

#[derive(Default)]
struct RecordingRunner {
    dirs: Mutex<Vec<PathBuf>>,
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn run(&self, _program: &str, args: &[&str], cwd: &Path) -> Result<CommandOutcome> {
        if args.contains(&"deploy") {
            self.dirs.lock().unwrap().push(cwd.to_path_buf());
        }
        Ok(CommandOutcome {
            success: true,
            status: Some(0),
        })
    }
}

fn config_for(workspace: &TempDir, split: SplitTarget) -> SplitConfig {
    let entry = workspace.path().join("src/index.ts");
    std::fs::create_dir_all(entry.parent().unwrap()).unwrap();
    std::fs::write(&entry, "import { format } from \"sql-formatter\";\n").unwrap();

    SplitConfig {
        entry: Some(entry.to_str().unwrap().to_string()),
        split,
        output: workspace.path().join(".overwork").to_str().unwrap().to_string(),
        compat_date: "2026-02-12".to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_auto_split_end_to_end() {
    let workspace = TempDir::new().unwrap();
    let config = config_for(&workspace, SplitTarget::Auto);
    let engine = SplitEngine::new(FakeBundler, BrokenLoader);

    let (outcome, summary) = engine
        .build(&config, LocalStorage::new(&config.output))
        .await
        .unwrap();

    let names: Vec<&str> = outcome.report.packages.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["@faker-js/faker", "sql-formatter", "tiny-lib"]);
    assert_eq!(outcome.report.packages[1].bytes, 700_000);
    assert_eq!(outcome.report.packages[1].percentage, 35);

    let planned: Vec<&str> = outcome.plans.iter().map(|p| p.package_name.as_str()).collect();
    assert_eq!(planned, vec!["@faker-js/faker", "sql-formatter"]);
    assert!(outcome.plans[0].export_names.is_empty());
    assert_eq!(outcome.plans[1].export_names, vec!["format", "supportedDialects"]);
    assert_eq!(outcome.relocated_bytes(), 1_900_000);
    assert_eq!(outcome.remaining_bytes(), 100_000);

    let summary = summary.expect("plans were produced");
    assert_eq!(
        summary.unit_names(),
        vec!["faker-js-faker-service", "sql-formatter-service", "main"]
    );

    let output = Path::new(&config.output);
    let main_bundle = std::fs::metadata(output.join("main/dist/index.js")).unwrap();
    assert_eq!(summary.main_bytes(), main_bundle.len());
    for unit in summary.siblings() {
        let bundle = std::fs::metadata(output.join(&unit.name).join("dist/index.js")).unwrap();
        assert_eq!(unit.bundle_bytes, bundle.len());
    }

    let stub = std::fs::read_to_string(output.join("main/src/__stubs/sql-formatter.stub.js")).unwrap();
    assert!(stub.contains(r#"getBinding("SQL_FORMATTER")"#));
    assert!(stub.contains("export { e0 as format };"));
    assert!(stub.contains("export { e1 as supportedDialects };"));
    let service =
        std::fs::read_to_string(output.join("sql-formatter-service/src/index.js")).unwrap();
    assert!(service.contains(r#"import * as sdk from "sql-formatter";"#));
    assert!(service.contains("export class SqlFormatterEntrypoint extends WorkerEntrypoint"));

    let main: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(output.join("main/wrangler.jsonc")).unwrap())
            .unwrap();
    assert_eq!(main["name"], "main-worker");
    assert_eq!(main["compatibility_date"], "2026-02-12");
    assert_eq!(main["services"][0]["binding"], "FAKER_JS_FAKER");
    assert_eq!(main["services"][1]["entrypoint"], "SqlFormatterEntrypoint");

    let reloaded = load_plans(&LocalStorage::new(&config.output)).await.unwrap();
    assert_eq!(reloaded, outcome.plans);
}

#[tokio::test]
async fn test_nothing_above_threshold_writes_nothing() {
    let workspace = TempDir::new().unwrap();
    let config = SplitConfig {
        threshold: 5_000_000,
        ..config_for(&workspace, SplitTarget::Auto)
    };
    let engine = SplitEngine::new(FakeBundler, BrokenLoader);

    let (outcome, summary) = engine
        .build(&config, LocalStorage::new(&config.output))
        .await
        .unwrap();

    assert!(outcome.plans.is_empty());
    assert!(summary.is_none());
    assert!(!Path::new(&config.output).join(PLANS_FILE).exists());
}

#[tokio::test]
async fn test_unknown_explicit_package_aborts_without_output() {
    let workspace = TempDir::new().unwrap();
    let config = config_for(
        &workspace,
        SplitTarget::Explicit(vec!["tiny-lib".to_string(), "nonexistent".to_string()]),
    );
    let engine = SplitEngine::new(FakeBundler, BrokenLoader);

    let err = engine
        .build(&config, LocalStorage::new(&config.output))
        .await
        .unwrap_err();

    assert_eq!(
        err.to_string(),
        "Package \"nonexistent\" not found in bundle. Available: @faker-js/faker, sql-formatter, tiny-lib"
    );
    assert!(!Path::new(&config.output).exists());
}

#[tokio::test]
async fn test_build_then_deploy_in_plan_order() {
    let workspace = TempDir::new().unwrap();
    let config = config_for(
        &workspace,
        SplitTarget::Explicit(vec!["sql-formatter".to_string(), "tiny-lib".to_string()]),
    );
    SplitEngine::new(FakeBundler, BrokenLoader)
        .build(&config, LocalStorage::new(&config.output))
        .await
        .unwrap();

    let deployer = Deployer::new(
        LocalStorage::new(&config.output),
        RecordingRunner::default(),
        &config.output,
    );
    let units = deployer.deploy().await.unwrap();
    assert_eq!(units, vec!["sql-formatter-service", "tiny-lib-service", "main"]);
}

#[tokio::test]
async fn test_analyze_missing_entry() {
    let workspace = TempDir::new().unwrap();
    let config = SplitConfig {
        entry: Some(workspace.path().join("nope.ts").to_str().unwrap().to_string()),
        ..Default::default()
    };
    let err = SplitEngine::new(FakeBundler, BrokenLoader)
        .analyze(&config)
        .await
        .unwrap_err();
    assert!(matches!(err, SplitError::AnalysisError { .. }));
}
