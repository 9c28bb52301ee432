//! In-memory stand-in for the scheduler, used when its binary is missing,
//! dies right after launch, or simulation is forced by configuration.

use std::collections::BTreeMap;

use chrono::Local;
use tracing::debug;

use crate::core::commands::mask_secret;
use crate::core::error::{BridgeError, BridgeResult};
use crate::core::model::{
    AiGeneration, DependencyPolicy, Execution, GeneratedKind, NewTask, Schedule, Task, TaskId,
    TaskUpdate, UpdateOutcome,
};
use crate::parse::ai::{DEFAULT_INTERVAL_MINUTES, synthesize_name};
use crate::parse::answers::ApiKeyStatus;

/// Synthetic task table.
#[derive(Debug)]
pub struct Simulation {
    tasks: BTreeMap<TaskId, Task>,
    next_id: TaskId,
    api_key: Option<String>,
}

impl Default for Simulation {
    fn default() -> Self {
        Self::seeded()
    }
}

impl Simulation {
    /// Table holding two sample tasks.
    #[must_use]
    pub fn seeded() -> Self {
        let now = now();
        let mut sim = Self {
            tasks: BTreeMap::new(),
            next_id: 1,
            api_key: None,
        };

        let mut backup = Task::new(0, "Sample backup");
        backup.execution = Execution::Command {
            command: "tar czf /tmp/sample-backup.tgz /etc".to_string(),
        };
        backup.schedule = Schedule::every_minutes(60);
        sim.insert(backup, now);

        let mut report = Task::new(0, "Sample disk report");
        report.execution = Execution::Script {
            body: "#!/bin/bash\ndf -h > /tmp/disk-report.txt".to_string(),
        };
        report.schedule = Schedule::Cron {
            expression: "0 9 * * 1-5".to_string(),
        };
        report.enabled = false;
        sim.insert(report, now);

        sim
    }

    fn insert(&mut self, mut task: Task, now: i64) -> TaskId {
        let id = self.next_id;
        self.next_id += 1;
        task.id = id;
        task.created_at = now;
        task.next_run_at = next_run(&task, now);
        self.tasks.insert(id, task);
        id
    }

    fn task_mut(&mut self, id: TaskId) -> BridgeResult<&mut Task> {
        self.tasks.get_mut(&id).ok_or(BridgeError::NotFound { id })
    }

    #[must_use]
    pub fn list(&self) -> Vec<Task> {
        self.tasks.values().cloned().collect()
    }

    /// # Errors
    ///
    /// [`BridgeError::NotFound`] for unknown ids.
    pub fn get(&self, id: TaskId) -> BridgeResult<Task> {
        self.tasks.get(&id).cloned().ok_or(BridgeError::NotFound { id })
    }

    /// Adds a task under the next sequential id.
    ///
    /// # Errors
    ///
    /// Never fails; the signature matches the live path.
    pub fn create(&mut self, new: &NewTask) -> BridgeResult<TaskId> {
        let mut task = Task::new(0, new.name.clone());
        task.execution = new.execution.clone();
        task.working_dir = new.working_dir.clone().filter(|dir| !dir.trim().is_empty());
        task.schedule = new.schedule.clone();
        task.enabled = new.enabled;
        task.max_runtime_secs = new.max_runtime_secs;
        let id = self.insert(task, now());
        debug!(id, "simulated task created");
        Ok(id)
    }

    /// Applies every set field in place.
    ///
    /// # Errors
    ///
    /// [`BridgeError::NotFound`] for unknown ids.
    pub fn update(&mut self, id: TaskId, update: &TaskUpdate) -> BridgeResult<UpdateOutcome> {
        let task = self.task_mut(id)?;
        if let Some(name) = &update.name {
            task.name.clone_from(name);
        }
        if let Some(execution) = &update.execution {
            task.execution = execution.clone();
        }
        if let Some(dir) = &update.working_dir {
            task.working_dir = Some(dir.clone()).filter(|dir| !dir.trim().is_empty());
        }
        if let Some(schedule) = &update.schedule {
            task.schedule = schedule.clone();
        }
        if let Some(enabled) = update.enabled {
            task.enabled = enabled;
        }
        if let Some(max_runtime) = update.max_runtime_secs {
            task.max_runtime_secs = max_runtime;
        }
        if let Some(policy) = update.dependency_policy {
            task.dependency_policy = policy;
        }
        task.next_run_at = next_run(task, now());
        Ok(UpdateOutcome::Updated(id))
    }

    /// Removes a task and any dependency on it. Unknown ids count as removed.
    ///
    /// # Errors
    ///
    /// Never fails.
    pub fn delete(&mut self, id: TaskId) -> BridgeResult<()> {
        self.tasks.remove(&id);
        for task in self.tasks.values_mut() {
            task.dependencies.retain(|dep| *dep != id);
        }
        Ok(())
    }

    /// Records an immediate successful run.
    ///
    /// # Errors
    ///
    /// [`BridgeError::NotFound`] for unknown ids.
    pub fn run(&mut self, id: TaskId) -> BridgeResult<Task> {
        let now = now();
        let task = self.task_mut(id)?;
        task.last_run_at = now;
        task.exit_code = 0;
        task.next_run_at = next_run(task, now);
        Ok(task.clone())
    }

    /// # Errors
    ///
    /// [`BridgeError::NotFound`] if either task is unknown.
    pub fn add_dependency(&mut self, id: TaskId, dependency: TaskId) -> BridgeResult<()> {
        if !self.tasks.contains_key(&dependency) {
            return Err(BridgeError::NotFound { id: dependency });
        }
        let task = self.task_mut(id)?;
        if !task.dependencies.contains(&dependency) {
            task.dependencies.push(dependency);
        }
        Ok(())
    }

    /// # Errors
    ///
    /// [`BridgeError::NotFound`] for unknown ids, [`BridgeError::Rejected`] if
    /// the dependency was not there.
    pub fn remove_dependency(&mut self, id: TaskId, dependency: TaskId) -> BridgeResult<()> {
        let task = self.task_mut(id)?;
        let before = task.dependencies.len();
        task.dependencies.retain(|dep| *dep != dependency);
        if task.dependencies.len() == before {
            return Err(BridgeError::Rejected("Failed to remove dependency".to_string()));
        }
        Ok(())
    }

    /// # Errors
    ///
    /// [`BridgeError::NotFound`] for unknown ids.
    pub fn set_dependency_policy(&mut self, id: TaskId, policy: DependencyPolicy) -> BridgeResult<()> {
        self.task_mut(id)?.dependency_policy = policy;
        Ok(())
    }

    pub fn set_api_key(&mut self, key: &str) {
        self.api_key = Some(key.to_string());
    }

    #[must_use]
    pub fn api_key_status(&self) -> ApiKeyStatus {
        match &self.api_key {
            Some(key) => ApiKeyStatus::Configured {
                masked: Some(mask_secret(key)),
            },
            None => ApiKeyStatus::Missing,
        }
    }

    /// Canned proposal echoing the request.
    #[must_use]
    pub fn generate_task(&self, description: &str) -> AiGeneration {
        let content = format!("echo \"{}\"", description.replace('"', "'"));
        AiGeneration {
            success: true,
            content: content.clone(),
            kind: GeneratedKind::Command,
            schedule_description: format!("Runs every {DEFAULT_INTERVAL_MINUTES} minutes"),
            cron: None,
            interval_minutes: Some(DEFAULT_INTERVAL_MINUTES),
            suggested_name: synthesize_name(description),
            raw: content,
        }
    }

    #[must_use]
    pub fn generate_command(&self, goal: &str) -> String {
        format!("echo \"{}\"", goal.replace('"', "'"))
    }

    /// Switches a task to AI-dynamic mode and enables it.
    ///
    /// # Errors
    ///
    /// [`BridgeError::NotFound`] for unknown ids.
    pub fn convert_to_ai(&mut self, id: TaskId, prompt: &str, metrics: &[String]) -> BridgeResult<()> {
        let task = self.task_mut(id)?;
        task.execution = Execution::AiDynamic {
            prompt: prompt.to_string(),
            metrics: metrics.to_vec(),
        };
        task.enabled = true;
        Ok(())
    }

    /// # Errors
    ///
    /// [`BridgeError::NotFound`] for unknown ids, [`BridgeError::InvalidInput`]
    /// for non-script tasks.
    pub fn script_content(&self, id: TaskId) -> BridgeResult<String> {
        match self.get(id)?.execution {
            Execution::Script { body } => Ok(body),
            _ => Err(BridgeError::InvalidInput(format!("task {id} is not a script task"))),
        }
    }
}

fn now() -> i64 {
    Local::now().timestamp()
}

/// Interval tasks fire `seconds` after `from`; nothing else is predicted.
fn next_run(task: &Task, from: i64) -> i64 {
    match (&task.schedule, task.enabled) {
        (Schedule::Interval { seconds }, true) => {
            from.saturating_add(i64::try_from(*seconds).unwrap_or(i64::MAX))
        }
        _ => 0,
    }
}
