//! lanewise CLI: list and run SIMD equivalence scenarios.

mod colors;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use lanewise_codegen::{LoweringMode, Tier};
use lanewise_harness::{Driver, LanewiseConfig, Registry, ReportFormat};
use tracing::info;
use tracing_subscriber::EnvFilter;

use colors::{bold, gray, green, red};

#[derive(Parser)]
#[command(
    name = "lanewise",
    version,
    about = "Check that native and scalar-lowered SIMD codegen agree"
)]
struct Cli {
    /// Config file (default: nearest lanewise.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the registered scenarios
    List,
    /// Run scenarios and report the outcome of each
    Run {
        /// Only scenarios whose name contains this string
        #[arg(long)]
        filter: Option<String>,

        /// Lowering mode to run (repeatable: native, scalar-lowered)
        #[arg(long = "mode")]
        modes: Vec<LoweringMode>,

        /// Tier to run (repeatable: baseline, optimizing)
        #[arg(long = "tier")]
        tiers: Vec<Tier>,

        /// Report format (text or json)
        #[arg(long)]
        format: Option<ReportFormat>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("LANEWISE_LOG")
                .unwrap_or_else(|_| EnvFilter::new("lanewise=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref());

    match cli.command {
        Commands::List => cmd_list(),
        Commands::Run {
            filter,
            modes,
            tiers,
            format,
        } => {
            let mut config = config;
            if filter.is_some() {
                config.run.filter = filter;
            }
            if !modes.is_empty() {
                config.run.modes = modes;
            }
            if !tiers.is_empty() {
                config.run.tiers = tiers;
            }
            if let Some(format) = format {
                config.run.report = format;
            }
            cmd_run(&config)
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> LanewiseConfig {
    let loaded = match path {
        Some(path) => LanewiseConfig::load_from(path),
        None => LanewiseConfig::load(),
    };
    loaded.unwrap_or_else(|e| {
        eprintln!("{} {}", red("error:"), e);
        std::process::exit(1);
    })
}

fn cmd_list() {
    let registry = Registry::builtin();
    let width = registry.iter().map(|s| s.name.len()).max().unwrap_or(0);
    for scenario in registry.iter() {
        println!(
            "{:<width$}  {:<15}  {}",
            scenario.name,
            scenario.coverage.to_string(),
            gray(scenario.description)
        );
    }
}

fn cmd_run(config: &LanewiseConfig) {
    let driver = Driver::new(Registry::builtin(), config.matrix());
    let filter = config.run.filter.as_deref();
    if driver.registry().matching(filter).next().is_none() {
        eprintln!(
            "{} no scenario matches '{}'",
            red("error:"),
            filter.unwrap_or_default()
        );
        std::process::exit(1);
    }

    info!(configs = driver.matrix().len(), filter = ?filter, "starting run");
    let report = driver.run_matching(filter);
    match config.run.report {
        ReportFormat::Json => match report.to_json() {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("{} {}", red("error:"), e);
                std::process::exit(1);
            }
        },
        ReportFormat::Text => {
            print!("{}", report.render_text());
            if report.is_success() {
                println!("{}", green("all configurations agree"));
            } else {
                for failure in report.failures() {
                    eprintln!("{} {}", red("failed:"), bold(&failure.name));
                }
            }
        }
    }

    if !report.is_success() {
        std::process::exit(1);
    }
}
