pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod protocol;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::cli::CliConfig;

pub use adapters::{EsbuildCli, LocalStorage, NodeLoader, ShellRunner};
pub use config::SplitConfig;
pub use core::{Deployer, SplitEngine, SplitOutcome};
pub use utils::error::{Result, SplitError};
