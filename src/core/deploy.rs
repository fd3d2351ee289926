use crate::core::build::{bundle_path, load_plans, manifest_path, MAIN_UNIT, PLANS_FILE};
use crate::domain::ports::{CommandRunner, Storage};
use crate::utils::error::{Result, SplitError};
use std::path::PathBuf;

const NPX: &str = "npx";

/// Deploys every sibling unit in plan order, then the main unit.
///
/// Siblings must be reachable before main goes live, so the first failure
/// stops the run.
pub struct Deployer<S: Storage, R: CommandRunner> {
    storage: S,
    runner: R,
    output_dir: PathBuf,
}

impl<S: Storage, R: CommandRunner> Deployer<S, R> {
    pub fn new(storage: S, runner: R, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            storage,
            runner,
            output_dir: output_dir.into(),
        }
    }

    pub async fn deploy(&self) -> Result<Vec<String>> {
        let plans = match load_plans(&self.storage).await {
            Ok(plans) => plans,
            Err(SplitError::IoError(_)) => {
                return Err(SplitError::DeployError {
                    unit: PLANS_FILE.to_string(),
                    reason: format!(
                        "{} not found. Run 'build' first.",
                        self.output_dir.join(PLANS_FILE).display()
                    ),
                })
            }
            Err(e) => return Err(e),
        };

        let mut units: Vec<String> = plans.iter().map(|p| p.service_name.clone()).collect();
        units.push(MAIN_UNIT.to_string());

        for unit in &units {
            for required in [manifest_path(unit), bundle_path(unit)] {
                if !self.storage.exists(&required).await {
                    return Err(SplitError::DeployError {
                        unit: unit.clone(),
                        reason: format!(
                            "{} not found. Run 'build' first.",
                            self.output_dir.join(&required).display()
                        ),
                    });
                }
            }
        }

        let version = self
            .runner
            .run(NPX, &["wrangler", "--version"], &self.output_dir)
            .await;
        if !matches!(version, Ok(outcome) if outcome.success) {
            return Err(SplitError::DeployError {
                unit: "wrangler".to_string(),
                reason: "wrangler not found. Install it with: npm install -D wrangler".to_string(),
            });
        }

        for unit in &units {
            self.deploy_unit(unit).await?;
        }

        tracing::info!("All {} unit(s) deployed", units.len());
        Ok(units)
    }

    async fn deploy_unit(&self, unit: &str) -> Result<()> {
        tracing::info!("Deploying {}...", unit);
        let outcome = self
            .runner
            .run(NPX, &["wrangler", "deploy"], &self.output_dir.join(unit))
            .await?;
        if !outcome.success {
            return Err(SplitError::DeployError {
                unit: unit.to_string(),
                reason: match outcome.status {
                    Some(code) => format!("wrangler exited with status {}", code),
                    None => "wrangler was terminated by a signal".to_string(),
                },
            });
        }

        tracing::info!("{} deployed", unit);
        Ok(())
    }
}
