//! Sibyl CLI - answers questions about esoteric languages with a local model.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

/// Sibyl - a wiki-grounded question answering server
#[derive(Parser)]
#[command(name = "sibyl")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve {
        /// Server configuration (TOML)
        config: PathBuf,
    },

    /// Answer a single question and exit
    Ask {
        /// Server configuration (TOML)
        config: PathBuf,
        /// The question
        question: String,
        /// Also print the request log entry
        #[arg(long)]
        log: bool,
    },

    /// Test-drive a model host binary with raw prompts
    Generate {
        /// Model host executable
        #[arg(long)]
        bin: PathBuf,
        /// Directory holding the model files
        #[arg(long)]
        model: PathBuf,
        /// Number of generations per prompt
        #[arg(short, default_value_t = 1)]
        n: usize,
        /// Prompts, each wrapped in a user turn
        #[arg(required = true)]
        prompts: Vec<String>,
    },

    /// Print request log files in human-readable form
    Logcat {
        /// One line per request
        #[arg(long)]
        short: bool,
        /// Log files
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

fn main() -> miette::Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let default_level = match (&cli.command, cli.verbose) {
        (_, true) => "debug",
        (Commands::Serve { .. }, false) => "info",
        _ => "warn",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| miette::miette!("Failed to start async runtime: {}", e))?;

    match cli.command {
        Commands::Serve { config } => runtime.block_on(commands::serve::run(&config)),
        Commands::Ask {
            config,
            question,
            log,
        } => runtime.block_on(commands::ask::run(&config, &question, log)),
        Commands::Generate {
            bin,
            model,
            n,
            prompts,
        } => runtime.block_on(commands::generate::run(bin, model, n, &prompts)),
        Commands::Logcat { short, files } => runtime.block_on(commands::logcat::run(&files, short)),
    }
}
