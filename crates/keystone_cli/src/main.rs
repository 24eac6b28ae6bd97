//! KEYSTONE CLI
//!
//! Plans stacks, checks them without emitting, and compares emitted plans.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod commands;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "keystone")]
#[command(version, about = "KEYSTONE - dependency-ordered provisioning planner", long_about = None)]
struct Cli {
    /// Log as JSON lines instead of text
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Emit a provisioning plan
    Plan {
        /// Stack definition
        #[arg(short, long)]
        stack: PathBuf,
        /// Capability table
        #[arg(short, long)]
        capabilities: PathBuf,
        /// Planner configuration
        #[arg(long)]
        config: Option<PathBuf>,
        /// Output file, stdout when absent
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate, schedule and audit a stack without emitting
    Check {
        /// Stack definition
        #[arg(short, long)]
        stack: PathBuf,
        /// Capability table
        #[arg(short, long)]
        capabilities: PathBuf,
        /// Planner configuration
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Diff two emitted plans
    Diff {
        /// Earlier plan
        #[arg(long)]
        left: PathBuf,
        /// Later plan
        #[arg(long)]
        right: PathBuf,
    },
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("keystone=info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Commands::Plan {
            stack,
            capabilities,
            config,
            output,
        } => {
            let planner = commands::load_planner(&capabilities, config.as_deref())?;
            let stack = commands::load_stack(&stack)?;
            if let Some(json) = commands::plan(&planner, stack, output.as_deref())? {
                println!("{json}");
            }
        }
        Commands::Check {
            stack,
            capabilities,
            config,
        } => {
            let planner = commands::load_planner(&capabilities, config.as_deref())?;
            let stack = commands::load_stack(&stack)?;
            print!("{}", commands::check(&planner, stack)?);
        }
        Commands::Diff { left, right } => {
            print!("{}", commands::diff(&left, &right)?);
        }
    }

    Ok(())
}
