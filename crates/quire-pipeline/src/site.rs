//! Invocation of the external site generator.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

/// Environment variable carrying the path of the running executable, so the
/// generator's converter hook can call back into `quire render`.
pub const RENDERER_ENV: &str = "QUIRE_RENDERER";

/// Placeholder in the argument list replaced with the output directory.
pub const DESTINATION_PLACEHOLDER: &str = "{destination}";

#[derive(Debug, thiserror::Error)]
pub enum SiteError {
    #[error("Failed to start '{program}': {source}")]
    Spawn { program: String, source: io::Error },

    #[error("Failed waiting for '{program}': {source}")]
    Wait { program: String, source: io::Error },

    #[error("Failed to publish {path}: {source}")]
    Publish { path: String, source: io::Error },
}

/// Program and arguments used to run the generator.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SiteCommand {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl SiteCommand {
    /// The invocation for the platform this process runs on.
    pub fn for_host() -> Self {
        if cfg!(windows) {
            Self::wrapped()
        } else {
            Self::bundled()
        }
    }

    /// Windows installs ship a batch wrapper that needs `cmd`.
    pub fn wrapped() -> Self {
        Self {
            program: "cmd".to_string(),
            args: ["/C", "jekyll.bat", "build", "--destination", DESTINATION_PLACEHOLDER]
                .map(String::from)
                .into(),
        }
    }

    pub fn bundled() -> Self {
        Self {
            program: "bundle".to_string(),
            args: ["exec", "jekyll", "build", "--destination", DESTINATION_PLACEHOLDER]
                .map(String::from)
                .into(),
        }
    }

    fn args_for(&self, destination: &Path) -> Vec<String> {
        let destination = destination.display().to_string();
        self.args
            .iter()
            .map(|arg| arg.replace(DESTINATION_PLACEHOLDER, &destination))
            .collect()
    }
}

/// Result of one generator run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SiteOutcome {
    pub success: bool,
    pub code: Option<i32>,
}

/// Runs the generator and publishes its output.
#[derive(Debug, Clone)]
pub struct SiteBuilder {
    root: PathBuf,
    build_dir: PathBuf,
    command: SiteCommand,
    staging: bool,
}

impl SiteBuilder {
    pub fn new(root: PathBuf, build_dir: PathBuf, command: SiteCommand) -> Self {
        Self {
            root,
            build_dir,
            command,
            staging: true,
        }
    }

    /// Build straight into the build directory instead of a staging tree.
    pub fn with_staging(mut self, staging: bool) -> Self {
        self.staging = staging;
        self
    }

    pub fn build_dir(&self) -> &Path {
        &self.build_dir
    }

    /// Where the generator writes while a staged build is in progress.
    pub fn staging_dir(&self) -> PathBuf {
        sibling(&self.build_dir, "staging")
    }

    /// Every directory this builder writes to.
    pub fn output_dirs(&self) -> Vec<PathBuf> {
        vec![
            self.build_dir.clone(),
            self.staging_dir(),
            sibling(&self.build_dir, "old"),
        ]
    }

    /// Run the generator once.
    ///
    /// A non-zero exit is reported through [`SiteOutcome`]; only failing to
    /// start or wait for the process is an error. With staging enabled the
    /// previous build is replaced only after a successful run.
    pub async fn run(&self) -> Result<SiteOutcome, SiteError> {
        let destination = if self.staging {
            let staging = self.staging_dir();
            remove_dir(&staging).await?;
            staging
        } else {
            self.build_dir.clone()
        };

        let args = self.command.args_for(&destination);
        info!(program = %self.command.program, ?args, "building site");

        let mut command = Command::new(&self.command.program);
        command
            .args(&args)
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Ok(exe) = std::env::current_exe() {
            command.env(RENDERER_ENV, exe);
        }

        let mut child = command.spawn().map_err(|source| SiteError::Spawn {
            program: self.command.program.clone(),
            source,
        })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let (status, _, _) = tokio::join!(
            child.wait(),
            forward_lines(stdout, "stdout"),
            forward_lines(stderr, "stderr"),
        );
        let status = status.map_err(|source| SiteError::Wait {
            program: self.command.program.clone(),
            source,
        })?;

        let outcome = SiteOutcome {
            success: status.success(),
            code: status.code(),
        };

        if self.staging {
            if outcome.success {
                self.publish(&destination).await?;
            } else {
                remove_dir(&destination).await?;
            }
        }

        if outcome.success {
            info!("site build complete");
        } else {
            tracing::warn!(code = ?outcome.code, "site build failed, keeping previous build");
        }
        Ok(outcome)
    }

    /// Swap a finished staging tree into place.
    async fn publish(&self, staging: &Path) -> Result<(), SiteError> {
        let previous = sibling(&self.build_dir, "old");
        remove_dir(&previous).await?;

        let exists = tokio::fs::try_exists(&self.build_dir).await.unwrap_or(false);
        if exists {
            rename(&self.build_dir, &previous).await?;
        }
        if tokio::fs::try_exists(staging).await.unwrap_or(false) {
            rename(staging, &self.build_dir).await?;
        } else {
            // The generator produced nothing; publish an empty tree.
            tokio::fs::create_dir_all(&self.build_dir)
                .await
                .map_err(|source| publish_error(&self.build_dir, source))?;
        }
        if exists {
            remove_dir(&previous).await?;
        }

        debug!(build_dir = %self.build_dir.display(), "published staged build");
        Ok(())
    }
}

/// `_site` -> `_site.<suffix>`
fn sibling(dir: &Path, suffix: &str) -> PathBuf {
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "_site".to_string());
    dir.with_file_name(format!("{}.{}", name, suffix))
}

async fn forward_lines<R: AsyncRead + Unpin>(reader: Option<R>, stream: &'static str) {
    let Some(reader) = reader else {
        return;
    };
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        info!(stream, "{}", line);
    }
}

async fn remove_dir(path: &Path) -> Result<(), SiteError> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(publish_error(path, source)),
    }
}

async fn rename(from: &Path, to: &Path) -> Result<(), SiteError> {
    tokio::fs::rename(from, to)
        .await
        .map_err(|source| publish_error(to, source))
}

fn publish_error(path: &Path, source: io::Error) -> SiteError {
    SiteError::Publish {
        path: path.display().to_string(),
        source,
    }
}
