use crate::config::{SplitConfig, TomlConfig, DEFAULT_CONFIG_FILE};
use crate::domain::model::SplitTarget;
use crate::utils::error::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "overwork")]
#[command(version)]
#[command(about = "Split an oversized worker into a main unit plus one sibling per heavy dependency")]
pub struct CliConfig {
    #[command(subcommand)]
    pub command: Command,

    #[arg(long, global = true, help = "Config file (default: ./overwork.toml if present)")]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, global = true, help = "Emit logs as JSON lines on stderr")]
    pub log_json: bool,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Print the per-package size report
    Analyze(SplitArgs),
    /// Print the split plans without writing anything
    Plan(SplitArgs),
    /// Write unit manifests and the plan file
    Build(SplitArgs),
    /// Deploy siblings in plan order, then main
    Deploy(DeployArgs),
}

#[derive(Debug, Clone, Default, Args)]
pub struct SplitArgs {
    #[arg(long, help = "Main worker entry point")]
    pub entry: Option<String>,

    #[arg(long, help = "Packages to extract, comma-separated (default: auto-detect)")]
    pub split: Option<String>,

    #[command(flatten)]
    pub output: OutputArgs,

    #[arg(long, help = "Auto-detect threshold in bytes (default: 512000)")]
    pub threshold: Option<u64>,

    #[arg(long, help = "Main worker name (default: main-worker)")]
    pub name: Option<String>,

    #[arg(long, help = "Compatibility date, YYYY-MM-DD (default: today)")]
    pub compat_date: Option<String>,

    #[arg(long, help = "Bundler executable (default: esbuild)")]
    pub esbuild: Option<String>,

    #[arg(long, help = "Node executable used for export discovery (default: node)")]
    pub node: Option<String>,
}

#[derive(Debug, Clone, Default, Args)]
pub struct DeployArgs {
    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Debug, Clone, Default, Args)]
pub struct OutputArgs {
    #[arg(long = "output", help = "Output directory (default: .overwork)")]
    pub dir: Option<String>,
}

impl SplitArgs {
    fn apply(&self, config: &mut SplitConfig) {
        if let Some(entry) = &self.entry {
            config.entry = Some(entry.clone());
        }
        if let Some(split) = &self.split {
            config.split = SplitTarget::parse(split);
        }
        self.output.apply(config);
        if let Some(threshold) = self.threshold {
            config.threshold = threshold;
        }
        if let Some(name) = &self.name {
            config.worker_name = name.clone();
        }
        if let Some(date) = &self.compat_date {
            config.compat_date = date.clone();
        }
        if let Some(esbuild) = &self.esbuild {
            config.esbuild = esbuild.clone();
        }
        if let Some(node) = &self.node {
            config.node = node.clone();
        }
    }
}

impl OutputArgs {
    fn apply(&self, config: &mut SplitConfig) {
        if let Some(dir) = &self.dir {
            config.output = dir.clone();
        }
    }
}

impl CliConfig {
    /// Defaults, then the config file, then flags.
    pub fn resolve(&self) -> Result<SplitConfig> {
        let (path, explicit) = match &self.config {
            Some(path) => (path.clone(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };

        let mut config = match TomlConfig::load(&path, explicit)? {
            Some(file) => {
                tracing::debug!("Loaded {}", path.display());
                SplitConfig::from_toml(&file)
            }
            None => SplitConfig::default(),
        };

        match &self.command {
            Command::Analyze(args) | Command::Plan(args) | Command::Build(args) => {
                args.apply(&mut config)
            }
            Command::Deploy(args) => args.output.apply(&mut config),
        }
        Ok(config)
    }
}
