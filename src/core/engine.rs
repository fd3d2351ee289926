use crate::config::SplitConfig;
use crate::core::analyzer::analyze_bundle;
use crate::core::build::{BuildSummary, SplitBuilder};
use crate::core::exports::discover_exports;
use crate::core::planner::create_split_plans;
use crate::domain::model::{BundleReport, SplitPlan};
use crate::domain::ports::{Bundler, ModuleLoader, Storage};
use crate::utils::error::Result;

/// Report and plans from one planning run. `plans` is in deploy order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitOutcome {
    pub report: BundleReport,
    pub plans: Vec<SplitPlan>,
}

impl SplitOutcome {
    /// Bytes the analysis attributed to the packages being relocated. The
    /// built bundles are measured separately in [`BuildSummary`].
    pub fn relocated_bytes(&self) -> u64 {
        self.plans
            .iter()
            .filter_map(|plan| self.report.find(&plan.package_name))
            .map(|p| p.bytes)
            .sum()
    }

    pub fn remaining_bytes(&self) -> u64 {
        self.report.total_bytes.saturating_sub(self.relocated_bytes())
    }
}

/// Runs analyze, plan, discover and build against the injected ports.
pub struct SplitEngine<B: Bundler, L: ModuleLoader> {
    bundler: B,
    loader: L,
}

impl<B: Bundler, L: ModuleLoader> SplitEngine<B, L> {
    pub fn new(bundler: B, loader: L) -> Self {
        Self { bundler, loader }
    }

    pub async fn analyze(&self, config: &SplitConfig) -> Result<BundleReport> {
        let entry = config.entry_path()?;
        tracing::info!("Analyzing {}...", entry.display());
        let report = analyze_bundle(&self.bundler, entry).await?;
        tracing::info!(
            "Found {} package(s) in a {} byte bundle",
            report.packages.len(),
            report.total_bytes
        );
        Ok(report)
    }

    /// Analysis plus plans with their export names filled in.
    pub async fn plan(&self, config: &SplitConfig) -> Result<SplitOutcome> {
        let report = self.analyze(config).await?;
        let mut plans = create_split_plans(&config.split, &report, config.threshold)?;
        if plans.is_empty() {
            tracing::info!("No package reaches the {} byte threshold", config.threshold);
            return Ok(SplitOutcome { report, plans });
        }

        let resolve_dir = config.resolve_dir()?;
        for plan in &mut plans {
            tracing::info!("Discovering exports for {}...", plan.package_name);
            plan.export_names =
                discover_exports(&self.bundler, &self.loader, &plan.package_name, &resolve_dir)
                    .await;
            if plan.export_names.is_empty() {
                tracing::warn!(
                    "No exports found for {}, only the dynamic root handle will be exposed",
                    plan.package_name
                );
            } else {
                tracing::debug!("{}: {}", plan.package_name, plan.export_names.join(", "));
            }
        }

        Ok(SplitOutcome { report, plans })
    }

    /// Plans and writes the output layout. Nothing is written when there is
    /// nothing to split.
    pub async fn build<S: Storage>(
        &self,
        config: &SplitConfig,
        storage: S,
    ) -> Result<(SplitOutcome, Option<BuildSummary>)> {
        let outcome = self.plan(config).await?;
        if outcome.plans.is_empty() {
            return Ok((outcome, None));
        }

        tracing::info!("Writing {} split(s) to {}", outcome.plans.len(), config.output);
        let summary = SplitBuilder::new(storage, &config.output)
            .build(
                &self.bundler,
                config.entry_path()?,
                &config.worker_name,
                &config.compat_date,
                &outcome.plans,
            )
            .await?;
        Ok((outcome, Some(summary)))
    }
}
