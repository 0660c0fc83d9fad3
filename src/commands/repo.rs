// src/commands/repo.rs
//! Repository inspection commands

use super::AgentContext;
use anyhow::Result;
use storpool_repo_add::repository::RepoDescriptor;
use tracing::info;

/// Report whether the signing key and the repository are in place
pub fn cmd_check(ctx: &AgentContext) -> Result<()> {
    info!("Checking the APT key and repository");
    let repo = ctx.provisioner();

    let has_key = repo.has_key()?;
    println!("APT key: {}", if has_key { "present" } else { "missing" });

    match ctx.config.repo_url() {
        Some(url) => {
            let has_repo = repo.has_repo(&RepoDescriptor::new(url))?;
            println!("APT repository: {}", if has_repo { "present" } else { "missing" });
            println!("  {}", repo.layout().sources_list().display());
        }
        None => println!("APT repository: not configured"),
    }
    Ok(())
}
