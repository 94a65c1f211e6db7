//! StepForge CLI: the main entry point.
//!
//! Commands:
//! - `run`      Parse and execute a plan file
//! - `inspect`  Show steps, dependencies and waves without executing
//! - `tools`    List built-in tools
//! - `config`   Show or initialize configuration

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "stepforge",
    about = "StepForge: plan-and-execute step engine",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse and execute a plan
    Run(RunArgs),

    /// Show how a plan parses, without executing it
    Inspect {
        /// Plan file (`-` reads stdin)
        plan: PathBuf,
    },

    /// List built-in tools
    Tools,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Args)]
pub struct RunArgs {
    /// Plan file (`-` reads stdin)
    pub plan: PathBuf,

    /// Run independent steps concurrently
    #[arg(long)]
    pub parallel: bool,

    /// Upper bound on concurrent steps (implies --parallel)
    #[arg(long, value_name = "N")]
    pub max_concurrency: Option<usize>,

    /// Reject malformed lines and unresolvable back-references
    #[arg(long)]
    pub strict: bool,

    /// Keep running after a step fails
    #[arg(long)]
    pub continue_on_error: bool,

    /// Per-step timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Print the execution log as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Write the default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the configuration file path
    Path,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run(args) => commands::run::run(args).await?,
        Commands::Inspect { plan } => commands::inspect::run(&plan)?,
        Commands::Tools => commands::tools::run(),
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show()?,
            ConfigAction::Init { force } => commands::config_cmd::init(force)?,
            ConfigAction::Path => commands::config_cmd::path(),
        },
    }

    Ok(())
}
