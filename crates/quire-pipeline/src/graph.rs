//! Task registry and topological planning.

use std::collections::HashSet;

use crate::task::{BuildTask, ReloadScope, TaskError, TaskReport};

/// Invalid task graph or watch configuration. Fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("Task '{0}' is registered twice")]
    Duplicate(String),

    #[error("Unknown task '{name}'{}", .referenced_by.as_ref().map(|r| format!(" (required by '{}')", r)).unwrap_or_default())]
    UnknownTask {
        name: String,
        referenced_by: Option<String>,
    },

    #[error("Task dependency cycle: {}", .0.join(" -> "))]
    Cycle(Vec<String>),

    #[error("Invalid watch pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        source: globset::Error,
    },

    #[error("Watch pattern '{0}' has no tasks")]
    EmptyBinding(String),
}

/// A task that stopped a plan.
#[derive(Debug, thiserror::Error)]
#[error("task '{task}' failed")]
pub struct TaskFailure {
    pub task: String,
    #[source]
    pub source: TaskError,
}

/// All tasks known to the process, in registration order.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: Vec<BuildTask>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, task: BuildTask) -> Result<(), GraphError> {
        if self.get(&task.name).is_some() {
            return Err(GraphError::Duplicate(task.name));
        }
        self.tasks.push(task);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&BuildTask> {
        self.tasks.iter().find(|t| t.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tasks.iter().map(|t| t.name.as_str())
    }

    /// Check that every prerequisite exists and the graph is acyclic.
    pub fn validate(&self) -> Result<(), GraphError> {
        let names: Vec<&str> = self.names().collect();
        self.plan(&names).map(|_| ())
    }

    /// Resolve the requested tasks and their prerequisites into run order.
    ///
    /// Prerequisites come before their dependents, every task appears once and
    /// independent tasks keep the order they were requested in.
    pub fn plan<S: AsRef<str>>(&self, requested: &[S]) -> Result<Vec<String>, GraphError> {
        let mut order = Vec::new();
        let mut done = HashSet::new();
        let mut path = Vec::new();

        for name in requested {
            self.visit(name.as_ref(), None, &mut path, &mut done, &mut order)?;
        }
        Ok(order)
    }

    fn visit(
        &self,
        name: &str,
        referenced_by: Option<&str>,
        path: &mut Vec<String>,
        done: &mut HashSet<String>,
        order: &mut Vec<String>,
    ) -> Result<(), GraphError> {
        if done.contains(name) {
            return Ok(());
        }
        if let Some(start) = path.iter().position(|p| p == name) {
            let mut cycle = path[start..].to_vec();
            cycle.push(name.to_string());
            return Err(GraphError::Cycle(cycle));
        }

        let task = self.get(name).ok_or_else(|| GraphError::UnknownTask {
            name: name.to_string(),
            referenced_by: referenced_by.map(str::to_string),
        })?;

        path.push(name.to_string());
        for prerequisite in &task.prerequisites {
            self.visit(prerequisite, Some(name), path, done, order)?;
        }
        path.pop();

        done.insert(name.to_string());
        order.push(name.to_string());
        Ok(())
    }

    /// Widest reload scope among the tasks of a plan.
    pub fn reload_scope<S: AsRef<str>>(&self, plan: &[S]) -> ReloadScope {
        plan.iter()
            .filter_map(|name| self.get(name.as_ref()))
            .map(|task| task.reload)
            .max()
            .unwrap_or_default()
    }

    /// Run a plan in order, stopping at the first failing task.
    pub async fn run_plan<S: AsRef<str>>(
        &self,
        plan: &[S],
    ) -> Result<Vec<(String, TaskReport)>, TaskFailure> {
        let mut reports = Vec::new();

        for name in plan {
            let name = name.as_ref();
            let Some(task) = self.get(name) else {
                return Err(TaskFailure {
                    task: name.to_string(),
                    source: TaskError::Other("task is not registered".to_string()),
                });
            };
            let Some(runner) = task.runner() else {
                continue;
            };

            tracing::info!(task = name, "starting");
            match runner.run().await {
                Ok(report) => {
                    tracing::info!(
                        task = name,
                        written = report.written,
                        unchanged = report.unchanged,
                        skipped = report.skipped,
                        "finished"
                    );
                    reports.push((name.to_string(), report));
                }
                Err(source) => {
                    tracing::error!(task = name, "failed: {}", source);
                    return Err(TaskFailure {
                        task: name.to_string(),
                        source,
                    });
                }
            }
        }

        Ok(reports)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::task::{TaskFuture, TaskRunner};
    use std::sync::{Arc, Mutex};

    /// Appends its name to a shared log when run.
    pub(crate) struct Recorder {
        pub name: &'static str,
        pub log: Arc<Mutex<Vec<String>>>,
        pub fail: bool,
    }

    impl TaskRunner for Recorder {
        fn run(&self) -> TaskFuture<'_> {
            Box::pin(async move {
                self.log.lock().unwrap().push(self.name.to_string());
                if self.fail {
                    Err(TaskError::Other(format!("{} broke", self.name)))
                } else {
                    Ok(TaskReport::default())
                }
            })
        }
    }

    fn task(name: &'static str, log: &Arc<Mutex<Vec<String>>>) -> BuildTask {
        BuildTask::new(
            name,
            Recorder {
                name,
                log: Arc::clone(log),
                fail: false,
            },
        )
    }

    fn registry(log: &Arc<Mutex<Vec<String>>>) -> TaskRegistry {
        let mut registry = TaskRegistry::new();
        registry.register(task("style", log)).unwrap();
        registry.register(task("script", log)).unwrap();
        registry
            .register(BuildTask::group("assets", ["style", "script"]))
            .unwrap();
        registry
            .register(task("build", log).with_prerequisites(["assets"]))
            .unwrap();
        registry
    }

    #[test]
    fn plans_prerequisites_first_once() {
        let log = Arc::default();
        let registry = registry(&log);

        let plan = registry.plan(&["build", "style"]).unwrap();

        assert_eq!(plan, vec!["style", "script", "assets", "build"]);
    }

    #[test]
    fn preserves_requested_order() {
        let log = Arc::default();
        let registry = registry(&log);

        assert_eq!(registry.plan(&["script", "style"]).unwrap(), vec!["script", "style"]);
    }

    #[test]
    fn rejects_unknown_prerequisite() {
        let mut registry = TaskRegistry::new();
        registry
            .register(BuildTask::group("all", ["missing"]))
            .unwrap();

        let err = registry.validate().unwrap_err();

        assert!(matches!(
            err,
            GraphError::UnknownTask { ref name, ref referenced_by }
                if name == "missing" && referenced_by.as_deref() == Some("all")
        ));
    }

    #[test]
    fn rejects_cycles() {
        let mut registry = TaskRegistry::new();
        registry.register(BuildTask::group("a", ["b"])).unwrap();
        registry.register(BuildTask::group("b", ["a"])).unwrap();

        let err = registry.plan(&["a"]).unwrap_err();

        match err {
            GraphError::Cycle(path) => assert_eq!(path, vec!["a", "b", "a"]),
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn rejects_duplicates() {
        let mut registry = TaskRegistry::new();
        registry.register(BuildTask::group("a", Vec::<String>::new())).unwrap();

        let err = registry.register(BuildTask::group("a", Vec::<String>::new()));

        assert!(matches!(err, Err(GraphError::Duplicate(_))));
    }

    #[test]
    fn reload_scope_is_widest() {
        let log = Arc::default();
        let mut registry = TaskRegistry::new();
        registry
            .register(task("style", &log).with_reload(ReloadScope::Styles))
            .unwrap();
        registry
            .register(task("build", &log).with_reload(ReloadScope::Full))
            .unwrap();

        assert_eq!(registry.reload_scope(&["style"]), ReloadScope::Styles);
        assert_eq!(registry.reload_scope(&["style", "build"]), ReloadScope::Full);
        assert_eq!(registry.reload_scope::<&str>(&[]), ReloadScope::None);
    }

    #[tokio::test]
    async fn runs_plan_in_order_skipping_groups() {
        let log = Arc::default();
        let registry = registry(&log);
        let plan = registry.plan(&["build"]).unwrap();

        let reports = registry.run_plan(&plan).await.unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["style", "script", "build"]);
        assert_eq!(reports.len(), 3);
    }

    #[tokio::test]
    async fn stops_at_first_failure() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = TaskRegistry::new();
        registry
            .register(BuildTask::new(
                "style",
                Recorder {
                    name: "style",
                    log: Arc::clone(&log),
                    fail: true,
                },
            ))
            .unwrap();
        registry.register(task("build", &log)).unwrap();

        let err = registry.run_plan(&["style", "build"]).await.unwrap_err();

        assert_eq!(err.task, "style");
        assert_eq!(*log.lock().unwrap(), vec!["style"]);
    }

    #[tokio::test]
    async fn failure_names_the_cause_once() {
        use std::error::Error;

        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = TaskRegistry::new();
        registry
            .register(BuildTask::new(
                "script",
                Recorder {
                    name: "script",
                    log: Arc::clone(&log),
                    fail: true,
                },
            ))
            .unwrap();

        let err = registry.run_plan(&["script"]).await.unwrap_err();

        assert_eq!(err.to_string(), "task 'script' failed");
        assert_eq!(err.source().unwrap().to_string(), "script broke");
    }
}
