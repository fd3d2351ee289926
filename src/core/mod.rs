pub mod analyzer;
pub mod build;
pub mod codegen;
pub mod deploy;
pub mod engine;
pub mod exports;
pub mod manifest;
pub mod planner;

pub use analyzer::{analyze_bundle, format_bytes, format_report};
pub use build::{BuildSummary, BuiltUnit, SplitBuilder};
pub use deploy::Deployer;
pub use engine::{SplitEngine, SplitOutcome};
pub use planner::create_split_plans;
