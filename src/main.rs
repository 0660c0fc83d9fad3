// src/main.rs

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use commands::AgentContext;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing subscriber for logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    let ctx = AgentContext::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Hook { event } => commands::cmd_hook(&ctx, event),
        Commands::Status => commands::cmd_status(&ctx),
        Commands::InstallPackages { packages } => commands::cmd_install_packages(&ctx, &packages),
        Commands::UninstallRecorded => commands::cmd_uninstall_recorded(&ctx),
        Commands::Policy { names } => commands::cmd_policy(&ctx, &names),
        Commands::Files { name } => commands::cmd_files(&ctx, &name),
        Commands::Check => commands::cmd_check(&ctx),
    }
}
