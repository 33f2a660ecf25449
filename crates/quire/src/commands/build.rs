//! One-shot task commands: `build`, the compilers, and `default`.

use anyhow::Result;

use crate::config::Config;
use crate::tasks::{self, ASSETS};

/// Run one task (and its prerequisites) once.
pub async fn run(config: &Config, task: &str) -> Result<()> {
    let registry = tasks::registry(config)?;
    tasks::run(&registry, &[task]).await?;
    tracing::info!(task, "done");
    Ok(())
}

/// Compile every asset, then keep watching.
pub async fn run_default(config: &Config) -> Result<()> {
    run(config, ASSETS).await?;
    super::watch::run(config).await
}
