//! Watch loop: initial build, dev server and orchestrator.

use std::sync::Arc;

use anyhow::{Context, Result};
use quire_pipeline::Orchestrator;
use quire_server::{DevServer, DevServerConfig, FileWatcher, ReloadHub};

use crate::config::Config;
use crate::tasks::{self, BUILD};

/// Directories whose changes never trigger a rebuild.
const IGNORED: &[&str] = &[".git", ".jekyll-cache", ".sass-cache", "node_modules", "target"];

pub async fn run(config: &Config) -> Result<()> {
    let registry = Arc::new(tasks::registry(config)?);
    let root = config.paths.root.clone();

    if let Err(e) = tasks::run(&registry, &[BUILD]).await {
        tracing::warn!("initial build failed: {:#}", e);
    }

    let hub = ReloadHub::new();
    let mut orchestrator =
        Orchestrator::new(root.clone(), Arc::clone(&registry), &config.watch, Arc::new(hub.clone()))
            .context("Invalid [[watch]] configuration")?;
    for dir in tasks::site_builder(config).output_dirs() {
        orchestrator = orchestrator.ignore(dir);
    }
    for dir in IGNORED {
        orchestrator = orchestrator.ignore(root.join(dir));
    }

    let (watcher, events) =
        FileWatcher::new(&[root.clone()]).context("Failed to watch project directory")?;
    let watch_loop = tokio::spawn(orchestrator.run(events));

    let server = DevServer::new(
        DevServerConfig {
            root: config.paths.build_dir(),
            host: config.server.host.clone(),
            port: config.server.port,
            open: config.server.open,
        },
        hub,
    );

    tracing::info!(bindings = config.watch.len(), "watching {}", root.display());
    tokio::select! {
        result = server.start() => result?,
        _ = tokio::signal::ctrl_c() => tracing::info!("shutting down"),
    }

    drop(watcher);
    watch_loop.abort();
    Ok(())
}
