use clap::Parser;
use overwork::config::cli::Command;
use overwork::core::{format_bytes, format_report, BuildSummary};
use overwork::domain::model::SplitPlan;
use overwork::utils::{logger, validation::Validate};
use overwork::{
    CliConfig, Deployer, EsbuildCli, LocalStorage, NodeLoader, Result, ShellRunner, SplitConfig,
    SplitEngine, SplitOutcome,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = CliConfig::parse();

    if cli.log_json {
        logger::init_json_logger();
    } else {
        logger::init_cli_logger(cli.verbose);
    }
    tracing::debug!("CLI args: {:?}", cli);

    if let Err(e) = run(&cli).await {
        tracing::error!("overwork failed: {} (severity: {:?})", e, e.severity());
        eprintln!("Error: {}", e);
        eprintln!("Suggestion: {}", e.recovery_suggestion());
        std::process::exit(e.exit_code());
    }

    Ok(())
}

async fn run(cli: &CliConfig) -> Result<()> {
    let config = cli.resolve()?;
    let engine = SplitEngine::new(
        EsbuildCli::new(config.esbuild.clone()),
        NodeLoader::new(config.node.clone()),
    );

    match &cli.command {
        Command::Analyze(_) => {
            config.validate()?;
            let report = engine.analyze(&config).await?;
            println!("{}\n", format_report(&report));
        }
        Command::Plan(_) => {
            config.validate()?;
            let outcome = engine.plan(&config).await?;
            println!("{}\n", format_report(&outcome.report));
            print_plans(&config, &outcome);
        }
        Command::Build(_) => {
            config.validate()?;
            let storage = LocalStorage::new(&config.output);
            let (outcome, summary) = engine.build(&config, storage).await?;
            println!("{}\n", format_report(&outcome.report));
            print_plans(&config, &outcome);
            if let Some(summary) = summary {
                print_build(&config, &outcome, &summary);
            }
        }
        Command::Deploy(_) => {
            config.validate_common()?;
            let deployer = Deployer::new(
                LocalStorage::new(&config.output),
                ShellRunner,
                &config.output,
            );
            let units = deployer.deploy().await?;
            println!("Deployed {} unit(s): {}", units.len(), units.join(", "));
        }
    }

    Ok(())
}

fn print_plans(config: &SplitConfig, outcome: &SplitOutcome) {
    if outcome.plans.is_empty() {
        println!(
            "No dependencies exceed the {} threshold.",
            format_bytes(config.threshold)
        );
        println!("Nothing to split.\n");
        return;
    }

    println!("Splitting {} package(s):\n", outcome.plans.len());
    for plan in &outcome.plans {
        println!("  {}", plan.package_name);
        println!("    Service:     {}", plan.service_name);
        println!("    Binding:     {}", plan.binding_name);
        println!("    Entrypoint:  {}", plan.entrypoint_identifier);
        println!("    Exports:     {}", describe_exports(plan));
    }
    println!();
    println!(
        "Attributed to split packages: {}, left in main: {}\n",
        format_bytes(outcome.relocated_bytes()),
        format_bytes(outcome.remaining_bytes())
    );
}

fn describe_exports(plan: &SplitPlan) -> String {
    const SHOWN: usize = 8;
    if plan.export_names.is_empty() {
        return "default handle only".to_string();
    }
    let mut shown = plan
        .export_names
        .iter()
        .take(SHOWN)
        .cloned()
        .collect::<Vec<_>>()
        .join(", ");
    if plan.export_names.len() > SHOWN {
        shown.push_str(", ...");
    }
    format!("{} named + default ({})", plan.export_names.len(), shown)
}

fn print_build(config: &SplitConfig, outcome: &SplitOutcome, summary: &BuildSummary) {
    let original = outcome.report.total_bytes;
    let main_bytes = summary.main_bytes();

    println!("Build complete!\n");
    println!("Size comparison:");
    println!("  {:<24} {}", "Original bundle:", format_bytes(original));
    println!("  {:<24} {}", "Main worker:", format_bytes(main_bytes));
    for unit in summary.siblings() {
        println!("  {:<24} {}", unit.name, format_bytes(unit.bundle_bytes));
    }
    println!("  {:<24} {}", "Combined:", format_bytes(summary.total_bytes()));
    if original > 0 {
        let reduction = 1.0 - main_bytes as f64 / original as f64;
        println!("  {:<24} {}%", "Main reduction:", (reduction * 100.0).round() as i64);
    }
    println!();

    println!("Output:");
    for path in &summary.written {
        println!("  {}/{}", config.output, path);
    }
    println!();

    println!("Deploy:");
    println!("  overwork deploy --output {}", config.output);
    println!();
    println!("Or manually (order matters):");
    for (i, unit) in summary.unit_names().iter().enumerate() {
        println!("  {}. cd {}/{} && npx wrangler deploy", i + 1, config.output, unit);
    }
    println!();
}
