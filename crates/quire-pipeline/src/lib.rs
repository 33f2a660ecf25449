//! Build pipeline for the blog.
//!
//! Holds the task graph ([`TaskRegistry`]), the site generator invoker
//! ([`SiteBuilder`]) and the [`Orchestrator`] that reruns tasks when watched
//! files change.

pub mod graph;
pub mod orchestrator;
pub mod site;
pub mod task;

pub use graph::{GraphError, TaskFailure, TaskRegistry};
pub use orchestrator::{Orchestrator, ReloadEvent, ReloadSink, WatchBinding};
pub use site::{SiteBuilder, SiteCommand, SiteError, SiteOutcome, RENDERER_ENV};
pub use task::{BuildTask, ReloadScope, TaskError, TaskFuture, TaskReport, TaskRunner};
