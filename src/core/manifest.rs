use crate::domain::model::SplitPlan;
use crate::utils::error::Result;
use serde::{Deserialize, Serialize};

const SCHEMA: &str = "./node_modules/wrangler/config-schema.json";
const MAIN_SCRIPT: &str = "./dist/index.js";
const COMPATIBILITY_FLAGS: [&str; 1] = ["nodejs_compat"];

/// Deployment descriptor for one unit (`wrangler.jsonc`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerManifest {
    #[serde(rename = "$schema")]
    pub schema: String,
    pub name: String,
    pub main: String,
    pub compatibility_date: String,
    pub compatibility_flags: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<ServiceBinding>,
}

/// Channel from the main unit to one sibling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceBinding {
    pub binding: String,
    pub service: String,
    pub entrypoint: String,
}

impl WorkerManifest {
    fn unit(name: &str, compatibility_date: &str) -> Self {
        Self {
            schema: SCHEMA.to_string(),
            name: name.to_string(),
            main: MAIN_SCRIPT.to_string(),
            compatibility_date: compatibility_date.to_string(),
            compatibility_flags: COMPATIBILITY_FLAGS.iter().map(|f| f.to_string()).collect(),
            services: Vec::new(),
        }
    }

    /// The main unit, bound to every sibling.
    pub fn main(worker_name: &str, compatibility_date: &str, plans: &[SplitPlan]) -> Self {
        let mut manifest = Self::unit(worker_name, compatibility_date);
        manifest.services = plans
            .iter()
            .map(|plan| ServiceBinding {
                binding: plan.binding_name.clone(),
                service: plan.service_name.clone(),
                entrypoint: plan.entrypoint_identifier.clone(),
            })
            .collect();
        manifest
    }

    pub fn sibling(plan: &SplitPlan, compatibility_date: &str) -> Self {
        Self::unit(&plan.service_name, compatibility_date)
    }

    pub fn to_jsonc(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)? + "\n")
    }
}
