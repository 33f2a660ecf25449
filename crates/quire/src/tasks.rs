//! The standard task set wired from configuration.

use std::path::Path;

use anyhow::{Context, Result};
use quire_assets::{ImageCompiler, PreviewCompiler, ScriptCompiler, StyleCompiler};
use quire_pipeline::{BuildTask, ReloadScope, SiteBuilder, TaskRegistry};

use crate::config::Config;

pub const STYLE: &str = "style";
pub const SCRIPT: &str = "script";
pub const IMAGES: &str = "images";
pub const PREVIEW_IMAGES: &str = "preview-images";
pub const BUILD: &str = "build";
pub const ASSETS: &str = "assets";

/// Source glob of a directory, relative to the project root when possible.
fn glob(config: &Config, dir: &Path, pattern: &str) -> String {
    let dir = dir.strip_prefix(&config.paths.root).unwrap_or(dir);
    format!("{}/{}", dir.display(), pattern)
}

pub fn site_builder(config: &Config) -> SiteBuilder {
    SiteBuilder::new(
        config.paths.root.clone(),
        config.paths.build_dir(),
        config.site.command(),
    )
    .with_staging(config.site.staging)
}

/// Register the compilers, the site build and the `assets` group, then check
/// the watch bindings against them.
pub fn registry(config: &Config) -> Result<TaskRegistry> {
    let paths = &config.paths;
    let destinations = paths.destinations();
    let roots = destinations.roots().to_vec();
    let styles = paths.resolve(&paths.styles);
    let scripts = paths.resolve(&paths.scripts);
    let images = paths.resolve(&paths.images);

    let style = StyleCompiler::new(styles.clone(), destinations.clone(), config.style.clone())
        .context("Invalid [style] configuration")?;
    let script = ScriptCompiler::new(scripts.clone(), destinations.clone(), config.script.clone());
    let image = ImageCompiler::new(
        images.clone(),
        destinations.clone(),
        config.image.clone(),
        config.preview.suffix.clone(),
    );
    let preview = PreviewCompiler::new(images.clone(), destinations, config.preview.clone());

    let mut registry = TaskRegistry::new();
    registry.register(
        BuildTask::new(STYLE, style)
            .with_source(glob(config, &styles, "**/*.css"))
            .with_destinations(roots.iter().map(|r| r.join("css")))
            .with_reload(ReloadScope::Styles),
    )?;
    registry.register(
        BuildTask::new(SCRIPT, script)
            .with_source(glob(config, &scripts, "*.js"))
            .with_destinations(roots.iter().map(|r| r.join("js")))
            .with_reload(ReloadScope::Full),
    )?;
    registry.register(
        BuildTask::new(IMAGES, image)
            .with_source(glob(config, &images, "**"))
            .with_destinations(roots.iter().map(|r| r.join("img")))
            .with_reload(ReloadScope::Full),
    )?;
    registry.register(
        BuildTask::new(PREVIEW_IMAGES, preview)
            .with_source(glob(config, &images, &format!("**/*{}.*", config.preview.suffix)))
            .with_destinations(roots.iter().map(|r| r.join("img")))
            .with_reload(ReloadScope::Full),
    )?;
    registry.register(
        BuildTask::new(BUILD, site_builder(config))
            .with_destinations([paths.build_dir()])
            .with_reload(ReloadScope::Full),
    )?;
    registry.register(BuildTask::group(
        ASSETS,
        [STYLE, SCRIPT, IMAGES, PREVIEW_IMAGES],
    ))?;

    registry.validate()?;
    for binding in &config.watch {
        binding
            .validate(&registry)
            .context("Invalid [[watch]] configuration")?;
    }
    Ok(registry)
}

/// Plan and run `tasks`, failing on the first task that fails.
pub async fn run(registry: &TaskRegistry, tasks: &[&str]) -> Result<()> {
    let plan = registry.plan(tasks)?;
    registry.run_plan(&plan).await?;
    Ok(())
}
