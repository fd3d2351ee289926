use crate::domain::ports::{CommandOutcome, CommandRunner};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::path::Path;
use tokio::process::Command;

/// Runs commands with inherited stdio so tool output reaches the terminal.
#[derive(Debug, Clone, Default)]
pub struct ShellRunner;

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(&self, program: &str, args: &[&str], cwd: &Path) -> Result<CommandOutcome> {
        tracing::debug!("Running {} {} in {}", program, args.join(" "), cwd.display());
        let status = Command::new(program)
            .args(args)
            .current_dir(cwd)
            .status()
            .await?;
        Ok(CommandOutcome {
            success: status.success(),
            status: status.code(),
        })
    }
}
