// src/commands/hook.rs
//! Lifecycle hook and state commands

use super::AgentContext;
use anyhow::{Context, Result};
use storpool_repo_add::packages::PackageInstaller;
use storpool_repo_add::state::{handle_event, LifecycleEvent, ProvisioningState, StateMachine};
use storpool_repo_add::status::LogStatus;
use tracing::info;

/// Apply a lifecycle event and converge
///
/// The flag bag is saved even when a step fails, so the next hook
/// invocation resumes from the last completed step.
pub fn cmd_hook(ctx: &AgentContext, event: LifecycleEvent) -> Result<()> {
    info!("Handling the {} hook", event);
    let store = ctx.flag_store();
    let flags = store.load().context("Failed to load the saved state")?;
    let mut flags = handle_event(flags, event);

    let ledger = ctx.ledger();
    let repo = ctx.provisioner();
    let installer = PackageInstaller::new(&ctx.runner, &ledger);
    let status = LogStatus;
    let machine = StateMachine::new(&ctx.config, &repo, &installer, &status);

    let outcome = machine.converge(&mut flags);
    store.save(&flags).context("Failed to save the state")?;

    let state = outcome.with_context(|| format!("The {} hook failed", event))?;
    println!("{}", state);
    Ok(())
}

/// Show the saved state and flags
pub fn cmd_status(ctx: &AgentContext) -> Result<()> {
    let store = ctx.flag_store();
    let flags = store.load().context("Failed to load the saved state")?;

    println!("State: {}", ProvisioningState::from_flags(&flags));
    match ctx.config.repo_url() {
        Some(url) => println!("Repository: {}", url),
        None => println!("Repository: (not configured)"),
    }
    if flags.is_empty() {
        println!("Flags: (none)");
    } else {
        println!("Flags:");
        for flag in flags.iter() {
            println!("  {:?}", flag);
        }
    }
    Ok(())
}
