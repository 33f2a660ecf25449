//! Build tasks and the runners behind them.

use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use quire_assets::{
    AssetError, CompileReport, ImageCompiler, PreviewCompiler, ScriptCompiler, StyleCompiler,
};

use crate::site::{SiteBuilder, SiteError};

/// How connected browsers should refresh after a task succeeds.
///
/// Ordered so the widest scope of a plan is its maximum.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReloadScope {
    #[default]
    None,
    Styles,
    Full,
}

/// Summary of a finished task.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TaskReport {
    pub written: usize,
    pub unchanged: usize,
    pub skipped: usize,
}

impl From<CompileReport> for TaskReport {
    fn from(report: CompileReport) -> Self {
        Self {
            written: report.written,
            unchanged: report.unchanged,
            skipped: report.skipped.len(),
        }
    }
}

/// Why a task did not complete.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error(transparent)]
    Asset(#[from] AssetError),

    #[error(transparent)]
    Site(#[from] SiteError),

    #[error("site build exited with status {}", .code.map_or_else(|| "unknown".to_string(), |c| c.to_string()))]
    SiteFailed { code: Option<i32> },

    #[error("task aborted: {0}")]
    Aborted(#[from] tokio::task::JoinError),

    #[error("{0}")]
    Other(String),
}

pub type TaskFuture<'a> = Pin<Box<dyn Future<Output = Result<TaskReport, TaskError>> + Send + 'a>>;

/// Executes the work behind a [`BuildTask`].
pub trait TaskRunner: Send + Sync {
    fn run(&self) -> TaskFuture<'_>;
}

// Compilers are CPU and file bound, keep them off the event loop.
macro_rules! blocking_runner {
    ($($compiler:ty),* $(,)?) => {
        $(
            impl TaskRunner for $compiler {
                fn run(&self) -> TaskFuture<'_> {
                    let compiler = self.clone();
                    Box::pin(async move {
                        let report = tokio::task::spawn_blocking(move || compiler.compile()).await??;
                        Ok(report.into())
                    })
                }
            }
        )*
    };
}

blocking_runner!(StyleCompiler, ScriptCompiler, ImageCompiler, PreviewCompiler);

impl TaskRunner for SiteBuilder {
    fn run(&self) -> TaskFuture<'_> {
        Box::pin(async move {
            let outcome = SiteBuilder::run(self).await?;
            if outcome.success {
                Ok(TaskReport::default())
            } else {
                Err(TaskError::SiteFailed { code: outcome.code })
            }
        })
    }
}

/// A named unit of work in the task graph.
///
/// A task without a runner only groups its prerequisites.
#[derive(Clone)]
pub struct BuildTask {
    pub name: String,
    pub source: Option<String>,
    pub destinations: Vec<PathBuf>,
    pub prerequisites: Vec<String>,
    pub reload: ReloadScope,
    runner: Option<Arc<dyn TaskRunner>>,
}

impl BuildTask {
    pub fn new(name: impl Into<String>, runner: impl TaskRunner + 'static) -> Self {
        Self {
            name: name.into(),
            source: None,
            destinations: Vec::new(),
            prerequisites: Vec::new(),
            reload: ReloadScope::None,
            runner: Some(Arc::new(runner)),
        }
    }

    pub fn group<I, S>(name: impl Into<String>, prerequisites: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            source: None,
            destinations: Vec::new(),
            prerequisites: prerequisites.into_iter().map(Into::into).collect(),
            reload: ReloadScope::None,
            runner: None,
        }
    }

    pub fn with_source(mut self, glob: impl Into<String>) -> Self {
        self.source = Some(glob.into());
        self
    }

    pub fn with_destinations(mut self, destinations: impl IntoIterator<Item = PathBuf>) -> Self {
        self.destinations = destinations.into_iter().collect();
        self
    }

    pub fn with_prerequisites<I, S>(mut self, prerequisites: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.prerequisites = prerequisites.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_reload(mut self, reload: ReloadScope) -> Self {
        self.reload = reload;
        self
    }

    pub fn runner(&self) -> Option<&Arc<dyn TaskRunner>> {
        self.runner.as_ref()
    }

    pub fn is_group(&self) -> bool {
        self.runner.is_none()
    }
}

impl fmt::Debug for BuildTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildTask")
            .field("name", &self.name)
            .field("source", &self.source)
            .field("destinations", &self.destinations)
            .field("prerequisites", &self.prerequisites)
            .field("reload", &self.reload)
            .field("group", &self.is_group())
            .finish()
    }
}
