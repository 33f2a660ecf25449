//! Watch orchestration.
//!
//! Maps changed paths to watch bindings, runs each binding's task plan one at
//! a time and reports the result to a [`ReloadSink`]. Changes that arrive
//! while a binding is already queued or running are coalesced.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use globset::{GlobBuilder, GlobMatcher};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::graph::{GraphError, TaskFailure, TaskRegistry};
use crate::task::{ReloadScope, TaskReport};

/// A glob, relative to the project root, and the tasks it triggers.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WatchBinding {
    pub pattern: String,
    pub tasks: Vec<String>,
}

impl WatchBinding {
    pub fn new<I, S>(pattern: impl Into<String>, tasks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            pattern: pattern.into(),
            tasks: tasks.into_iter().map(Into::into).collect(),
        }
    }

    /// Check the glob and the task references against `registry`.
    pub fn validate(&self, registry: &TaskRegistry) -> Result<(), GraphError> {
        self.resolve(registry).map(|_| ())
    }

    fn resolve(&self, registry: &TaskRegistry) -> Result<(GlobMatcher, Vec<String>), GraphError> {
        if self.tasks.is_empty() {
            return Err(GraphError::EmptyBinding(self.pattern.clone()));
        }
        let matcher = compile_pattern(&self.pattern).map_err(|source| GraphError::InvalidPattern {
            pattern: self.pattern.clone(),
            source,
        })?;
        let plan = registry.plan(&self.tasks)?;
        Ok((matcher, plan))
    }
}

/// Notification for connected browsers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadEvent {
    /// Rebuild completed, reload the page
    Full,
    /// Only stylesheets changed, swap them in place
    Styles,
    /// A task failed; the previous build is still being served
    BuildFailed { task: String, message: String },
}

/// Receives reload events from the orchestrator.
pub trait ReloadSink: Send + Sync {
    fn notify(&self, event: ReloadEvent);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BindingState {
    Idle,
    Triggered,
    Running { rerun: bool },
}

#[derive(Debug)]
struct Binding {
    pattern: String,
    matcher: GlobMatcher,
    plan: Vec<String>,
    reload: ReloadScope,
    state: BindingState,
}

/// Binding states and the run queue, without any I/O.
#[derive(Debug, Default)]
struct Scheduler {
    bindings: Vec<Binding>,
    queue: VecDeque<usize>,
    running: Option<usize>,
}

impl Scheduler {
    /// Record a change to `relative`. Returns the number of bindings it matched.
    fn on_change(&mut self, relative: &Path) -> usize {
        let mut matched = 0;
        for (index, binding) in self.bindings.iter_mut().enumerate() {
            if !binding.matcher.is_match(relative) {
                continue;
            }
            matched += 1;
            match binding.state {
                BindingState::Idle => {
                    binding.state = BindingState::Triggered;
                    self.queue.push_back(index);
                }
                BindingState::Triggered => {}
                BindingState::Running { .. } => {
                    binding.state = BindingState::Running { rerun: true };
                }
            }
        }
        matched
    }

    /// Take the next queued binding if nothing is running.
    fn start_next(&mut self) -> Option<usize> {
        if self.running.is_some() {
            return None;
        }
        let index = self.queue.pop_front()?;
        self.bindings[index].state = BindingState::Running { rerun: false };
        self.running = Some(index);
        Some(index)
    }

    fn finish(&mut self, index: usize) {
        let binding = &mut self.bindings[index];
        binding.state = match binding.state {
            BindingState::Running { rerun: true } => {
                self.queue.push_back(index);
                BindingState::Triggered
            }
            _ => BindingState::Idle,
        };
        if self.running == Some(index) {
            self.running = None;
        }
    }

    fn is_busy(&self) -> bool {
        self.running.is_some() || !self.queue.is_empty()
    }
}

/// `*` stays within one path segment; `**` crosses directories.
fn compile_pattern(pattern: &str) -> Result<GlobMatcher, globset::Error> {
    Ok(GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()?
        .compile_matcher())
}

type PlanResult = Result<Vec<(String, TaskReport)>, TaskFailure>;

/// Runs task plans in response to file changes.
pub struct Orchestrator {
    root: PathBuf,
    ignored: Vec<PathBuf>,
    registry: Arc<TaskRegistry>,
    scheduler: Scheduler,
    sink: Arc<dyn ReloadSink>,
}

impl Orchestrator {
    /// Validate the bindings against the registry.
    ///
    /// Unknown tasks, dependency cycles and malformed globs are errors.
    pub fn new(
        root: PathBuf,
        registry: Arc<TaskRegistry>,
        bindings: &[WatchBinding],
        sink: Arc<dyn ReloadSink>,
    ) -> Result<Self, GraphError> {
        let mut scheduler = Scheduler::default();

        for binding in bindings {
            let (matcher, plan) = binding.resolve(&registry)?;
            let reload = registry.reload_scope(&plan);

            scheduler.bindings.push(Binding {
                pattern: binding.pattern.clone(),
                matcher,
                plan,
                reload,
                state: BindingState::Idle,
            });
        }

        Ok(Self {
            root,
            ignored: Vec::new(),
            registry,
            scheduler,
            sink,
        })
    }

    /// Ignore changes under `dir`, such as the build output.
    pub fn ignore(mut self, dir: impl Into<PathBuf>) -> Self {
        self.ignored.push(dir.into());
        self
    }

    /// Process change events until the channel closes and queued work drains.
    pub async fn run(mut self, mut events: mpsc::Receiver<PathBuf>) {
        let (done_tx, mut done_rx) = mpsc::channel::<(usize, PlanResult)>(1);
        let mut open = true;

        loop {
            if let Some(index) = self.scheduler.start_next() {
                self.spawn_plan(index, done_tx.clone());
            }
            if !open && !self.scheduler.is_busy() {
                break;
            }

            tokio::select! {
                event = events.recv(), if open => match event {
                    Some(path) => self.on_change(&path),
                    None => open = false,
                },
                Some((index, result)) = done_rx.recv() => self.complete(index, result),
            }
        }

        debug!("orchestrator stopped");
    }

    fn on_change(&mut self, path: &Path) {
        if self.ignored.iter().any(|dir| path.starts_with(dir)) {
            return;
        }
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        if relative.is_absolute() {
            return;
        }

        if self.scheduler.on_change(relative) > 0 {
            debug!(path = %relative.display(), "change detected");
        }
    }

    fn spawn_plan(&self, index: usize, done: mpsc::Sender<(usize, PlanResult)>) {
        let binding = &self.scheduler.bindings[index];
        info!(pattern = %binding.pattern, tasks = ?binding.plan, "running");

        let registry = Arc::clone(&self.registry);
        let plan = binding.plan.clone();
        tokio::spawn(async move {
            let result = registry.run_plan(&plan).await;
            let _ = done.send((index, result)).await;
        });
    }

    fn complete(&mut self, index: usize, result: PlanResult) {
        let reload = self.scheduler.bindings[index].reload;
        self.scheduler.finish(index);

        match result {
            Ok(_) => match reload {
                ReloadScope::Full => self.sink.notify(ReloadEvent::Full),
                ReloadScope::Styles => self.sink.notify(ReloadEvent::Styles),
                ReloadScope::None => {}
            },
            Err(failure) => {
                warn!(task = %failure.task, "watch build failed, waiting for the next change");
                self.sink.notify(ReloadEvent::BuildFailed {
                    task: failure.task,
                    message: failure.source.to_string(),
                });
            }
        }
    }
}
