// src/commands/packages.rs
//! Package installation and query commands

use super::AgentContext;
use anyhow::{Context, Result};
use std::collections::BTreeSet;
use storpool_repo_add::packages::dpkg_query::package_files;
use storpool_repo_add::packages::planner::{requested_from_constraints, requested_from_map};
use storpool_repo_add::packages::policy::query_policy;
use storpool_repo_add::packages::{PackageConstraint, PackageInstaller};
use tracing::info;

/// Install the given constraints, or the configured ones if none are given
pub fn cmd_install_packages(ctx: &AgentContext, packages: &[String]) -> Result<()> {
    let requested = if packages.is_empty() {
        requested_from_map(&ctx.config.packages)
    } else {
        let constraints = packages
            .iter()
            .map(|spec| spec.parse::<PackageConstraint>())
            .collect::<Result<Vec<_>, _>>()?;
        requested_from_constraints(constraints)
    };

    if requested.is_empty() {
        println!("No packages requested");
        return Ok(());
    }

    info!("Installing requested packages: {:?}", requested);
    let ledger = ctx.ledger();
    let installer = PackageInstaller::new(&ctx.runner, &ledger);
    let installed = installer.install_requested(&requested)?;

    if installed.is_empty() {
        println!("All requested packages are already installed");
    } else {
        println!("Installed {} package(s):", installed.len());
        for name in &installed {
            println!("  {}", name);
        }
    }
    Ok(())
}

/// Remove the recorded packages
pub fn cmd_uninstall_recorded(ctx: &AgentContext) -> Result<()> {
    let ledger = ctx.ledger();
    let installer = PackageInstaller::new(&ctx.runner, &ledger);
    installer
        .uninstall_recorded()
        .context("Failed to uninstall the recorded packages")?;
    println!("Recorded packages removed");
    Ok(())
}

/// Show installed and candidate versions
pub fn cmd_policy(ctx: &AgentContext, names: &[String]) -> Result<()> {
    let names: BTreeSet<String> = names.iter().cloned().collect();
    let policy = query_policy(&ctx.runner, &names)?;

    for (name, entry) in &policy {
        match entry {
            Some(pol) => println!(
                "{}: installed {}, candidate {}",
                name,
                pol.installed.as_deref().unwrap_or("(none)"),
                pol.candidate.as_deref().unwrap_or("(none)")
            ),
            None => println!("{}: unknown", name),
        }
    }
    Ok(())
}

/// List a package's files
pub fn cmd_files(ctx: &AgentContext, name: &str) -> Result<()> {
    let files = package_files(&ctx.runner, name)
        .with_context(|| format!("Failed to list the files of {}", name))?;
    for file in files {
        println!("{}", file);
    }
    Ok(())
}
