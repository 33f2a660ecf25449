//! Project configuration (`quire.toml`).

use std::fs;
use std::path::{Path, PathBuf};

use quire_assets::{Destinations, ImageConfig, PreviewConfig, ScriptConfig, StyleConfig};
use quire_markdown::ConverterOptions;
use quire_pipeline::{SiteCommand, WatchBinding};
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
}

/// Everything `quire.toml` can set. Every field has a default.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub markdown: ConverterOptions,

    #[serde(default)]
    pub style: StyleConfig,

    #[serde(default)]
    pub script: ScriptConfig,

    #[serde(default)]
    pub image: ImageConfig,

    #[serde(default)]
    pub preview: PreviewConfig,

    #[serde(default)]
    pub site: SiteConfig,

    #[serde(default = "default_watch")]
    pub watch: Vec<WatchBinding>,
}

/// Directories, relative to `root` unless absolute.
#[derive(Debug, Clone, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Site generator output, served by the dev server
    #[serde(default = "default_build")]
    pub build: PathBuf,

    /// Committed copy of compiled assets
    #[serde(default = "default_assets")]
    pub assets: PathBuf,

    #[serde(default = "default_styles")]
    pub styles: PathBuf,

    #[serde(default = "default_scripts")]
    pub scripts: PathBuf,

    #[serde(default = "default_images")]
    pub images: PathBuf,
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}
fn default_build() -> PathBuf {
    PathBuf::from("_site")
}
fn default_assets() -> PathBuf {
    PathBuf::from("assets")
}
fn default_styles() -> PathBuf {
    PathBuf::from("styles")
}
fn default_scripts() -> PathBuf {
    PathBuf::from("scripts")
}
fn default_images() -> PathBuf {
    PathBuf::from("images")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            build: default_build(),
            assets: default_assets(),
            styles: default_styles(),
            scripts: default_scripts(),
            images: default_images(),
        }
    }
}

impl PathsConfig {
    pub fn resolve(&self, path: &Path) -> PathBuf {
        self.root.join(path)
    }

    pub fn build_dir(&self) -> PathBuf {
        self.resolve(&self.build)
    }

    /// Compiled assets go to the served build and the committed tree.
    pub fn destinations(&self) -> Destinations {
        Destinations::new([self.build_dir().join("assets"), self.resolve(&self.assets)])
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Open a browser once the server is up
    #[serde(default)]
    pub open: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    4000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            open: false,
        }
    }
}

/// How to run the site generator.
#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Overrides the platform default program
    pub program: Option<String>,

    /// Overrides the default arguments; `{destination}` is substituted
    pub args: Option<Vec<String>>,

    /// Build into a staging directory and swap on success
    #[serde(default = "default_staging")]
    pub staging: bool,
}

fn default_staging() -> bool {
    true
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            program: None,
            args: None,
            staging: true,
        }
    }
}

impl SiteConfig {
    pub fn command(&self) -> SiteCommand {
        let host = SiteCommand::for_host();
        match (&self.program, &self.args) {
            (None, None) => host,
            (program, args) => SiteCommand {
                program: program.clone().unwrap_or(host.program),
                args: args.clone().unwrap_or(host.args),
            },
        }
    }
}

fn default_watch() -> Vec<WatchBinding> {
    let mut bindings = vec![
        WatchBinding::new("styles/**/*.css", ["style"]),
        WatchBinding::new("scripts/*.js", ["script"]),
        WatchBinding::new("images/**", ["images", "preview-images"]),
    ];
    for content in [
        "_posts/**",
        "_layouts/**",
        "_includes/**",
        "_data/**",
        "*.html",
        "*.md",
        "_config.yml",
    ] {
        bindings.push(WatchBinding::new(content, ["build"]));
    }
    bindings
}

impl Default for Config {
    fn default() -> Self {
        Self {
            paths: PathsConfig::default(),
            server: ServerConfig::default(),
            markdown: ConverterOptions::default(),
            style: StyleConfig::default(),
            script: ScriptConfig::default(),
            image: ImageConfig::default(),
            preview: PreviewConfig::default(),
            site: SiteConfig::default(),
            watch: default_watch(),
        }
    }
}

impl Config {
    /// Load `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::parse(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;

        tracing::debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn empty_file_uses_defaults() {
        let config = Config::parse("").unwrap();

        assert_eq!(config.paths.build, PathBuf::from("_site"));
        assert_eq!(config.server.port, 4000);
        assert_eq!(config.preview.width, 1200);
        assert_eq!(config.preview.height, 630);
        assert_eq!(config.watch.len(), 10);
        assert_eq!(config.watch[0], WatchBinding::new("styles/**/*.css", ["style"]));
        assert_eq!(config.watch[1], WatchBinding::new("scripts/*.js", ["script"]));
        assert!(config.site.staging);
    }

    #[test]
    fn missing_file_uses_defaults() {
        let temp = tempdir().unwrap();

        let config = Config::load(&temp.path().join("quire.toml")).unwrap();

        assert_eq!(config.watch, default_watch());
    }

    #[test]
    fn parses_sections() {
        let config = Config::parse(
            r#"
            [paths]
            root = "blog"
            build = "public"

            [server]
            port = 8080

            [markdown]
            input = "GFM"
            highlighter = "rouge"

            [preview]
            suffix = "-social"

            [site]
            program = "jekyll"
            args = ["build", "-d", "{destination}"]

            [[watch]]
            pattern = "css/*.css"
            tasks = ["style"]
            "#,
        )
        .unwrap();

        assert_eq!(config.paths.build_dir(), PathBuf::from("blog/public"));
        assert_eq!(
            config.paths.destinations().roots(),
            &[PathBuf::from("blog/public/assets"), PathBuf::from("blog/assets")]
        );
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.preview.suffix, "-social");
        assert_eq!(config.preview.width, 1200);
        assert_eq!(config.site.command().program, "jekyll");
        assert_eq!(config.watch, vec![WatchBinding::new("css/*.css", ["style"])]);
    }

    #[test]
    fn args_override_keeps_host_program() {
        let site = SiteConfig {
            program: None,
            args: Some(vec!["build".to_string()]),
            staging: true,
        };

        let command = site.command();

        assert_eq!(command.program, SiteCommand::for_host().program);
        assert_eq!(command.args, vec!["build"]);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("quire.toml");
        fs::write(&path, "[server]\nport = \"not a number\"\n").unwrap();

        let err = Config::load(&path).unwrap_err();

        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
