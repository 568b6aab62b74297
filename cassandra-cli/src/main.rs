//! Cassandra - coupled model coordination
//! Command-line interface for running component configurations

use anyhow::{Context, Result};
use cassandra_core::error::{
    EXIT_COMPONENT_ERROR, EXIT_DEPENDENCY_FAILED, EXIT_FETCH_TIMEOUT, EXIT_PANIC,
    EXIT_PROTOCOL_ERROR, EXIT_UNPUBLISHED,
};
use cassandra_orchestration::{
    ComponentFactory, ComponentState, EntryStatus, Orchestrator, RunConfig, RunReport,
};
use clap::{Parser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "cassandra")]
#[command(author = "Cassandra Contributors")]
#[command(version = "2026.1.16")]
#[command(about = "Cassandra - coordination kernel for coupled models", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every component of a configuration
    Run {
        /// Configuration file (.toml, anything else is read as INI)
        #[arg(value_name = "CONFIG")]
        config: PathBuf,

        /// Rank of this process in a distributed run
        #[arg(short, long, default_value_t = 0)]
        rank: usize,

        /// Give up on a capability fetch after this many milliseconds
        #[arg(long, value_name = "MS")]
        fetch_timeout_ms: Option<u64>,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Parse a configuration and its component parameters without running
    Check {
        /// Configuration file (.toml, anything else is read as INI)
        #[arg(value_name = "CONFIG")]
        config: PathBuf,
    },

    /// Show information about Cassandra
    Info,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let outcome = match cli.command {
        Commands::Run {
            config,
            rank,
            fetch_timeout_ms,
            json,
        } => run_command(&config, rank, fetch_timeout_ms, json),

        Commands::Check { config } => check_command(&config),

        Commands::Info => {
            print_info();
            Ok(0)
        }
    };

    match outcome {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            std::process::exit(1);
        }
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "cassandra_cli=info,cassandra_orchestration=info",
        1 => "cassandra_cli=debug,cassandra_orchestration=debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load(path: &Path) -> Result<RunConfig> {
    let config = RunConfig::load(path).with_context(|| format!("loading {}", path.display()))?;
    tracing::debug!(
        config = %path.display(),
        components = config.components.len(),
        ranks = config.rank_count(),
        "configuration loaded"
    );
    Ok(config)
}

// ============================================================================
// Commands
// ============================================================================

fn run_command(path: &Path, rank: usize, fetch_timeout_ms: Option<u64>, json: bool) -> Result<i32> {
    let mut config = load(path)?;
    if let Some(ms) = fetch_timeout_ms {
        config.scheduler = config.scheduler.with_fetch_timeout(Duration::from_millis(ms));
    }

    println!(
        "{} {} ({} component(s), rank {}/{})",
        "Running".green().bold(),
        path.display().to_string().cyan(),
        config.components.len(),
        rank,
        config.rank_count()
    );

    let orchestrator = Orchestrator::new(config, ComponentFactory::with_builtins())?;
    let report = orchestrator.run(rank)?;
    tracing::info!(rank, success = report.success, exit_code = report.exit_code, "run complete");

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    Ok(report.exit_code)
}

fn check_command(path: &Path) -> Result<i32> {
    println!(
        "{} {}",
        "Checking".green().bold(),
        path.display().to_string().cyan()
    );

    let orchestrator = Orchestrator::new(load(path)?, ComponentFactory::with_builtins())?;
    let report = orchestrator.check()?;
    tracing::info!(success = report.success, capabilities = report.capabilities.len(), "check complete");

    for component in &report.components {
        match &component.error {
            Some(error) => println!("  {} {}: {}", "✗".red(), component.name.bold(), error),
            None => println!("  {} {} ({})", "✓".green(), component.name.bold(), component.kind),
        }
    }
    for capability in &report.capabilities {
        println!("  {} {} ← {}", "•".cyan(), capability.name, capability.owner);
    }

    if report.success {
        println!("{} No errors found", "    Finished".green().bold());
    } else {
        println!("{} configuration has errors", "      Failed".red().bold());
    }
    Ok(report.exit_code)
}

fn print_report(report: &RunReport) {
    println!();
    println!("{}", "Components:".bold());
    for c in &report.components {
        let state = match c.state {
            ComponentState::Finished => c.state.as_str().green(),
            ComponentState::Failed => c.state.as_str().red(),
            _ => c.state.as_str().yellow(),
        };
        println!("  [{}] {:<24} {:<10} code {}", c.rank, c.name, state, c.code);
        if let Some(error) = &c.error {
            println!("      {}", error.dimmed());
        }
    }

    println!();
    println!("{}", "Capabilities:".bold());
    for cap in &report.capabilities {
        let status = match cap.status {
            EntryStatus::Published => cap.status.to_string().green(),
            EntryStatus::Failed => cap.status.to_string().red(),
            EntryStatus::Pending => cap.status.to_string().yellow(),
        };
        println!("  {:<24} {:<10} owner {}", cap.name, status, cap.owner);
    }

    println!();
    if report.success {
        println!("{} all components finished", "    Finished".green().bold());
    } else {
        let chain: Vec<&str> = report.failure_chain().iter().map(|c| c.name.as_str()).collect();
        println!(
            "{} exit code {} (failure chain: {})",
            "      Failed".red().bold(),
            report.exit_code,
            chain.join(" → ")
        );
    }
}

fn print_info() {
    println!("{}", "Cassandra - coordination kernel for coupled models".bold());
    println!();
    println!("Components run concurrently and exchange data through named capabilities:");
    println!("each capability has one owner, is published once, and fetchers block until");
    println!("it exists or its owner fails.");
    println!();
    println!("{}", "Built-in components:".bold());
    println!("  • {} publishes the [global] section as 'general'", "GlobalParamsComponent".cyan());
    println!("  • {} runs an external command as a model", "ExecComponent".cyan());
    println!();
    println!("{}", "Commands:".bold());
    println!("  cassandra run run.toml                  # Run locally");
    println!("  cassandra run run.toml --rank 1         # Run rank 1 of a cluster");
    println!("  cassandra run run.cfg --fetch-timeout-ms 60000");
    println!("  cassandra check run.cfg                 # Parse without running");
    println!("  cassandra info                          # Show this info");
    println!();
    println!("{}", "Exit status:".bold());
    println!("  0 on success, otherwise the code of the first failed component");
    for (code, meaning) in [
        (EXIT_COMPONENT_ERROR, "component error"),
        (EXIT_PROTOCOL_ERROR, "capability protocol violation"),
        (EXIT_DEPENDENCY_FAILED, "a fetched capability's owner failed"),
        (EXIT_UNPUBLISHED, "declared capability never published"),
        (EXIT_FETCH_TIMEOUT, "fetch timed out"),
        (EXIT_PANIC, "component panicked"),
    ] {
        println!("  {:>3}  {}", code.to_string().yellow(), meaning);
    }
    println!("  any other nonzero status is the component's own");
}
