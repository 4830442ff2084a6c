//! Background command execution for the HTTP surface.
//!
//! The task list lock only guards insertion into and iteration over the list.
//! Each task record has its own lock so a worker appending output never
//! blocks readers of other tasks.

use crate::error::{Result, UglError};
use crate::service::Launcher;
use crate::sink::OutputSink;
use chrono::Utc;
use serde::Serialize;
use std::io;
use std::sync::{Arc, Mutex};
use std::thread;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Not produced by [`TaskManager::start`], which registers tasks as
    /// already running.
    Queued,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CommandTask {
    pub id: String,
    pub environment: String,
    pub command: String,
    pub status: TaskStatus,
    pub output: Vec<String>,
    pub error: Option<String>,
    pub exit_code: Option<i32>,
    pub created_at: String,
}

type SharedTask = Arc<Mutex<CommandTask>>;

struct TaskSink {
    task: SharedTask,
}

impl OutputSink for TaskSink {
    fn line(&mut self, line: &str) {
        if let Ok(mut task) = self.task.lock() {
            task.output.push(line.to_string());
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TaskManager {
    tasks: Arc<Mutex<Vec<SharedTask>>>,
}

impl TaskManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a running task and hands it to a dedicated worker thread.
    /// Returns the task as it was when registered. If the worker cannot be
    /// spawned the task stays listed as failed and the error is returned.
    pub fn start(&self, launcher: Launcher, environment: &str, command: &str) -> Result<CommandTask> {
        let shared = self.register(environment, command)?;
        let snapshot = snapshot(&shared)?;

        info!(task = %snapshot.id, environment, command, "task started");
        let worker = Arc::clone(&shared);
        let spawned = thread::Builder::new()
            .name(format!("task-{}", snapshot.id))
            .spawn(move || run_task(launcher, worker));
        match spawned {
            Ok(_) => Ok(snapshot),
            Err(err) => Err(abandon(&shared, err)),
        }
    }

    fn register(&self, environment: &str, command: &str) -> Result<SharedTask> {
        let shared = Arc::new(Mutex::new(CommandTask {
            id: Uuid::new_v4().simple().to_string(),
            environment: environment.to_string(),
            command: command.to_string(),
            status: TaskStatus::Running,
            output: Vec::new(),
            error: None,
            exit_code: None,
            created_at: Utc::now().to_rfc3339(),
        }));
        self.tasks
            .lock()
            .map_err(|_| UglError::Process("task list lock poisoned".to_string()))?
            .push(Arc::clone(&shared));
        Ok(shared)
    }

    /// Snapshot of every task, oldest first.
    pub fn list_tasks(&self) -> Result<Vec<CommandTask>> {
        let tasks = self
            .tasks
            .lock()
            .map_err(|_| UglError::Process("task list lock poisoned".to_string()))?;
        tasks.iter().map(snapshot).collect()
    }

    pub fn get(&self, id: &str) -> Result<Option<CommandTask>> {
        let tasks = self
            .tasks
            .lock()
            .map_err(|_| UglError::Process("task list lock poisoned".to_string()))?;
        for task in tasks.iter() {
            let current = snapshot(task)?;
            if current.id == id {
                return Ok(Some(current));
            }
        }
        Ok(None)
    }
}

fn snapshot(task: &SharedTask) -> Result<CommandTask> {
    task.lock()
        .map(|task| task.clone())
        .map_err(|_| UglError::Process("task lock poisoned".to_string()))
}

/// Marks a registered task whose worker never started as failed.
fn abandon(task: &SharedTask, err: io::Error) -> UglError {
    let message = format!("failed to start task worker: {err}");
    if let Ok(mut record) = task.lock() {
        record.status = TaskStatus::Failed;
        record.error = Some(message.clone());
        warn!(task = %record.id, error = %err, "task worker not started");
    }
    UglError::Process(message)
}

fn run_task(launcher: Launcher, task: SharedTask) {
    let Ok((id, environment, command)) = task
        .lock()
        .map(|t| (t.id.clone(), t.environment.clone(), t.command.clone()))
    else {
        return;
    };

    let mut sink = TaskSink {
        task: Arc::clone(&task),
    };
    let outcome = launcher
        .find_environment(&environment)
        .and_then(|env| launcher.prepare_session(&env))
        .and_then(|session| launcher.run_command(&session, &command, &mut sink));

    let Ok(mut record) = task.lock() else {
        return;
    };
    match outcome {
        Ok(code) => {
            record.status = TaskStatus::Completed;
            record.exit_code = Some(code);
            info!(task = %id, code, "task completed");
        }
        Err(err) => {
            record.status = TaskStatus::Failed;
            record.error = Some(err.to_string());
            warn!(task = %id, error = %err, "task failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LauncherConfig;
    use std::time::{Duration, Instant};
    use tempfile::tempdir;

    fn wait_for(manager: &TaskManager, id: &str) -> CommandTask {
        let deadline = Instant::now() + Duration::from_secs(20);
        loop {
            let task = manager.get(id).unwrap().unwrap();
            if task.status.is_terminal() {
                return task;
            }
            assert!(Instant::now() < deadline, "task {id} did not finish");
            thread::sleep(Duration::from_millis(20));
        }
    }

    #[test]
    fn status_serialises_lowercase() {
        assert_eq!(
            serde_json::to_value(TaskStatus::Completed).unwrap(),
            serde_json::json!("completed")
        );
    }

    #[test]
    fn unknown_environment_fails_task() {
        let dir = tempdir().unwrap();
        let launcher = Launcher::new(LauncherConfig::default_for(dir.path())).unwrap();
        let manager = TaskManager::new();
        let started = manager.start(launcher, "missing", "echo hi").unwrap();
        assert_eq!(started.status, TaskStatus::Running);
        assert_eq!(started.id.len(), 32);

        let done = wait_for(&manager, &started.id);
        assert_eq!(done.status, TaskStatus::Failed);
        assert!(done.error.unwrap().contains("missing"));
        assert!(done.exit_code.is_none());
    }

    #[test]
    fn list_keeps_start_order() {
        let dir = tempdir().unwrap();
        let launcher = Launcher::new(LauncherConfig::default_for(dir.path())).unwrap();
        let manager = TaskManager::new();
        let first = manager.start(launcher.clone(), "a", "x").unwrap();
        let second = manager.start(launcher, "b", "y").unwrap();
        let ids: Vec<String> = manager
            .list_tasks()
            .unwrap()
            .into_iter()
            .map(|task| task.id)
            .collect();
        assert_eq!(ids, vec![first.id, second.id]);
        assert!(manager.get("nope").unwrap().is_none());
    }

    #[test]
    fn worker_spawn_failure_leaves_task_failed() {
        let manager = TaskManager::new();
        let shared = manager.register("env", "info domain").unwrap();
        let err = abandon(&shared, io::Error::new(io::ErrorKind::Other, "no threads"));
        assert!(matches!(err, UglError::Process(_)));

        let tasks = manager.list_tasks().unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].status, TaskStatus::Failed);
        assert!(tasks[0].status.is_terminal());
        assert!(tasks[0].error.as_deref().unwrap().contains("no threads"));
        assert!(tasks[0].exit_code.is_none());
    }

    #[cfg(unix)]
    #[test]
    fn shell_command_output_and_exit_code_are_recorded() {
        let dir = tempdir().unwrap();
        let launcher = Launcher::new(LauncherConfig::default_for(dir.path())).unwrap();
        launcher.create_environment("Worker", None, None).unwrap();
        let manager = TaskManager::new();

        let ok = manager
            .start(launcher.clone(), "worker", "echo one; echo two")
            .unwrap();
        let done = wait_for(&manager, &ok.id);
        assert_eq!(done.status, TaskStatus::Completed);
        assert_eq!(done.exit_code, Some(0));
        assert_eq!(done.output, vec!["one", "two"]);

        let failing = manager.start(launcher, "Worker", "exit 3").unwrap();
        let done = wait_for(&manager, &failing.id);
        assert_eq!(done.status, TaskStatus::Completed);
        assert_eq!(done.exit_code, Some(3));
        assert!(done.error.is_none());
    }
}
