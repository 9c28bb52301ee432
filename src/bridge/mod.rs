//! Upstream call surface over the scheduler console.
//!
//! [`TaskBridge`] turns each operation into one or more console commands,
//! parses the replies and keeps the record cache coherent. When the scheduler
//! cannot be started every call is served by [`Simulation`] instead.

pub mod simulation;

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::cache::RecordCache;
use crate::core::channel::looks_stuck;
use crate::core::{
    AiGeneration, BridgeError, BridgeResult, ChannelTimings, Clock, CommandChannel, CommandLine,
    CommandOutcome, DependencyPolicy, Execution, ExecutionKind, NewTask, OutcomeStatus,
    PtyLauncher, RetryPolicy, SYSTEM_METRICS, Schedule, SessionSupervisor, SystemClock,
    SystemMetric, Task, TaskId, TaskUpdate, UpdateOutcome, mask_secret,
};
use crate::fs::{BridgePaths, BridgeSettings, stage_script};
use crate::parse::answers::{
    is_absent, is_api_key_saved, is_dependency_added, is_dependency_removed, is_policy_updated,
    is_removed, is_run_started, is_task_changed,
};
use crate::parse::listing::is_empty_listing;
use crate::parse::{
    ApiKeyStatus, ListingStrategy, extract_generation, extract_ids, extract_script,
    is_generation_failure, parse_added_id, parse_api_key_status, parse_blocks,
    parse_generated_command, parse_record,
};

pub use simulation::Simulation;

/// Command used to create an AI-dynamic task before `to-ai` converts it.
const AI_PLACEHOLDER_COMMAND: &str = "echo AI dynamic task placeholder";

/// Printed when the scheduler's confirmation was declined.
const CREATION_CANCELLED: &str = "Task creation cancelled";

/// Metric list sent when none is given; the console drops empty arguments.
const DEFAULT_METRICS: &str = "cpu_load";

/// Task operations against the scheduler, or its simulation.
#[derive(Debug)]
pub struct TaskBridge {
    channel: CommandChannel,
    cache: Mutex<RecordCache>,
    simulation: Mutex<Simulation>,
    scripts_dir: PathBuf,
    listing: ListingStrategy,
}

impl TaskBridge {
    #[must_use]
    pub fn new(channel: CommandChannel, scripts_dir: PathBuf, listing: ListingStrategy) -> Self {
        Self {
            channel,
            cache: Mutex::new(RecordCache::new()),
            simulation: Mutex::new(Simulation::seeded()),
            scripts_dir,
            listing,
        }
    }

    /// Builds a bridge over the real scheduler binary described by `settings`.
    ///
    /// Nothing is launched until the first call.
    pub async fn open(paths: &BridgePaths, settings: &BridgeSettings) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let timings: ChannelTimings = settings.timings;
        let launcher = PtyLauncher::new(
            settings.binary_or(paths.binary()),
            paths.bin_dir(),
            paths.data_dir(),
        )
        .with_args(settings.args.clone());
        let supervisor = SessionSupervisor::new(Box::new(launcher), Arc::clone(&clock), timings);
        let channel = CommandChannel::new(supervisor, clock, timings, RetryPolicy::default());

        if settings.force_simulation {
            channel.force_degraded("simulation forced by configuration").await;
        }
        Self::new(channel, paths.scripts_dir(), settings.listing)
    }

    /// Returns true while calls are served by the simulation.
    pub async fn is_degraded(&self) -> bool {
        self.channel.is_degraded().await
    }

    /// Stops the scheduler process.
    pub async fn shutdown(&self) {
        info!("shutting down scheduler session");
        self.channel.shutdown().await;
    }

    /// Lists every task.
    ///
    /// # Errors
    ///
    /// Channel failures and scheduler rejections of `list`.
    pub async fn list_tasks(&self) -> BridgeResult<Vec<Task>> {
        if let Some(sim) = self.simulated().await {
            return Ok(sim.list());
        }

        let since = self.cache.lock().await.epoch();
        let body = self.expect_ok(&CommandLine::new("list")).await?;
        if is_empty_listing(&body) {
            return Ok(Vec::new());
        }

        match self.listing {
            ListingStrategy::Blocks => {
                let tasks = parse_blocks(&body);
                let mut cache = self.cache.lock().await;
                for task in &tasks {
                    cache.put_since(task.clone(), since);
                }
                Ok(tasks)
            }
            ListingStrategy::IdScan => {
                let mut tasks = Vec::new();
                for id in extract_ids(&body) {
                    match self.fetch(id).await {
                        Ok(task) => tasks.push(task),
                        Err(BridgeError::NotFound { id }) => {
                            warn!(id, "listed task could not be viewed; skipping");
                        }
                        Err(err) => return Err(err),
                    }
                }
                Ok(tasks)
            }
        }
    }

    /// Returns one task, from cache unless `force_refresh` is set.
    ///
    /// # Errors
    ///
    /// [`BridgeError::NotFound`] when the scheduler does not know the id or
    /// its reply lacks an id or name.
    pub async fn get_task(&self, id: TaskId, force_refresh: bool) -> BridgeResult<Task> {
        if let Some(sim) = self.simulated().await {
            return sim.get(id);
        }
        if !force_refresh {
            if let Some(task) = self.cache.lock().await.get(id) {
                return Ok(task.clone());
            }
        }
        self.fetch(id).await
    }

    /// Creates a task and returns the id the scheduler assigned.
    ///
    /// # Errors
    ///
    /// [`BridgeError::InvalidInput`] for empty names or payloads,
    /// [`BridgeError::Rejected`] when the scheduler refuses or the creation is
    /// cancelled, [`BridgeError::UnparsableOutput`] when no id can be found.
    pub async fn create_task(&self, new: &NewTask) -> BridgeResult<TaskId> {
        validate_new_task(new)?;
        if let Some(mut sim) = self.simulated().await {
            return sim.create(new);
        }

        let before = self.task_ids().await?;
        let command = self.add_command(new)?;
        let body = self.expect_ok(&command).await?;

        let id = match parse_added_id(&body) {
            Some(id) => id,
            None if body.contains(CREATION_CANCELLED) => {
                return Err(BridgeError::Rejected(CREATION_CANCELLED.to_string()));
            }
            None => {
                debug!(name = %new.name, "no id in add reply; diffing the listing");
                let after = self.task_ids().await?;
                after
                    .into_iter()
                    .filter(|id| !before.contains(id))
                    .max()
                    .ok_or_else(|| {
                        BridgeError::UnparsableOutput(format!(
                            "no id found for new task `{}`",
                            new.name
                        ))
                    })?
            }
        };
        info!(id, name = %new.name, kind = new.execution.kind().label(), "task created");

        if let Err(err) = self.finish_create(id, new).await {
            warn!(id, error = %err, "follow-up to add failed; removing the new task");
            if let Err(cleanup) = self.delete_remote(id).await {
                warn!(id, error = %cleanup, "could not remove partially created task");
            }
            return Err(err);
        }
        self.cache.lock().await.invalidate(id);
        Ok(id)
    }

    /// Applies a partial update.
    ///
    /// Changing a task into a script or AI-dynamic task, or clearing its
    /// schedule, cannot be done in place: the task is deleted and recreated
    /// with its dependencies, policy and enabled state restored.
    ///
    /// # Errors
    ///
    /// [`BridgeError::NotFound`] for unknown ids and the errors of every
    /// command issued on the way.
    pub async fn update_task(&self, id: TaskId, update: &TaskUpdate) -> BridgeResult<UpdateOutcome> {
        if let Some(mut sim) = self.simulated().await {
            return sim.update(id, update);
        }

        if let (true, Some(enabled)) = (update.is_enabled_only(), update.enabled) {
            self.set_enabled_remote(id, enabled).await?;
            return Ok(UpdateOutcome::Updated(id));
        }

        let current = self.fetch(id).await?;
        if needs_recreate(&current, update) {
            return self.recreate(&current, update).await;
        }

        let result = self.edit_in_place(&current, update).await;
        self.cache.lock().await.invalidate(id);
        result.map(|()| UpdateOutcome::Updated(id))
    }

    /// Deletes a task. A task that is already gone counts as deleted.
    ///
    /// # Errors
    ///
    /// Channel failures, or [`BridgeError::Rejected`] when the scheduler
    /// refuses.
    pub async fn delete_task(&self, id: TaskId) -> BridgeResult<()> {
        if let Some(mut sim) = self.simulated().await {
            return sim.delete(id);
        }
        self.delete_remote(id).await
    }

    /// Starts a task now and returns its refreshed record when available.
    ///
    /// # Errors
    ///
    /// [`BridgeError::Rejected`] when the scheduler neither acknowledged the
    /// run nor can show the task afterwards.
    pub async fn run_task(&self, id: TaskId) -> BridgeResult<Option<Task>> {
        if let Some(mut sim) = self.simulated().await {
            return sim.run(id).map(Some);
        }

        let body = self.expect_ok(&CommandLine::new("run").id(id)).await?;
        self.cache.lock().await.invalidate(id);
        let started = is_run_started(&body);

        match self.fetch(id).await {
            Ok(task) => Ok(Some(task)),
            Err(err) if started => {
                debug!(id, error = %err, "run started but record refresh failed");
                Ok(None)
            }
            Err(_) => Err(BridgeError::Rejected(summarize(&body))),
        }
    }

    /// Makes `id` depend on `dependency`.
    ///
    /// # Errors
    ///
    /// [`BridgeError::InvalidInput`] for self-dependencies,
    /// [`BridgeError::Rejected`] when the scheduler refuses.
    pub async fn add_dependency(&self, id: TaskId, dependency: TaskId) -> BridgeResult<()> {
        if id == dependency {
            return Err(BridgeError::InvalidInput(format!(
                "task {id} cannot depend on itself"
            )));
        }
        if let Some(mut sim) = self.simulated().await {
            return sim.add_dependency(id, dependency);
        }
        let command = CommandLine::new("add-dep").id(id).id(dependency);
        self.apply(id, &command, is_dependency_added).await
    }

    /// # Errors
    ///
    /// [`BridgeError::Rejected`] when the scheduler refuses.
    pub async fn remove_dependency(&self, id: TaskId, dependency: TaskId) -> BridgeResult<()> {
        if let Some(mut sim) = self.simulated().await {
            return sim.remove_dependency(id, dependency);
        }
        let command = CommandLine::new("remove-dep").id(id).id(dependency);
        self.apply(id, &command, is_dependency_removed).await
    }

    /// # Errors
    ///
    /// [`BridgeError::Rejected`] when the scheduler refuses.
    pub async fn set_dependency_policy(&self, id: TaskId, policy: DependencyPolicy) -> BridgeResult<()> {
        if let Some(mut sim) = self.simulated().await {
            return sim.set_dependency_policy(id, policy);
        }
        let command = CommandLine::new("set-dep-behavior")
            .id(id)
            .verbatim(policy.code().to_string());
        self.apply(id, &command, is_policy_updated).await
    }

    /// Stores the key used by the AI generator. The key is passed verbatim.
    ///
    /// # Errors
    ///
    /// [`BridgeError::InvalidInput`] for an empty key,
    /// [`BridgeError::Rejected`] when the scheduler does not confirm.
    pub async fn set_api_key(&self, key: &str) -> BridgeResult<()> {
        let key = key.trim();
        if key.is_empty() {
            return Err(BridgeError::InvalidInput("API key must not be empty".to_string()));
        }
        if let Some(mut sim) = self.simulated().await {
            sim.set_api_key(key);
            return Ok(());
        }

        let body = self
            .expect_ok(&CommandLine::new("set-api-key").secret(key))
            .await?;
        if is_api_key_saved(&body) {
            info!(key = %mask_secret(key), "API key saved");
            Ok(())
        } else {
            Err(BridgeError::Rejected(summarize(&body)))
        }
    }

    /// # Errors
    ///
    /// Channel failures.
    pub async fn get_api_key(&self) -> BridgeResult<ApiKeyStatus> {
        if let Some(sim) = self.simulated().await {
            return Ok(sim.api_key_status());
        }
        let body = self.expect_ok(&CommandLine::new("view-api-key")).await?;
        Ok(parse_api_key_status(&body))
    }

    /// Asks the scheduler's generator for a task matching `description`.
    ///
    /// The generator's confirmation is answered, so the scheduler also stores
    /// the proposed task.
    ///
    /// # Errors
    ///
    /// [`BridgeError::Rejected`] when the generator reports a failure,
    /// [`BridgeError::UnparsableOutput`] when no content can be extracted.
    pub async fn ai_generate_task(&self, description: &str) -> BridgeResult<AiGeneration> {
        let description = description.trim();
        if description.is_empty() {
            return Err(BridgeError::InvalidInput("description must not be empty".to_string()));
        }
        if let Some(sim) = self.simulated().await {
            return Ok(sim.generate_task(description));
        }

        let body = self
            .expect_ok(&CommandLine::new("ai-create").quoted(description)?)
            .await?;
        if is_generation_failure(&body) {
            return Err(BridgeError::Rejected(summarize(&body)));
        }

        let generation = extract_generation(&body, description);
        if !generation.success {
            return Err(BridgeError::UnparsableOutput(
                "generator output carried no task content".to_string(),
            ));
        }
        if let Some(id) = parse_added_id(&body) {
            info!(id, name = %generation.suggested_name, "generated task stored");
        }
        Ok(generation)
    }

    /// Asks the generator for a single command serving `goal`.
    ///
    /// # Errors
    ///
    /// [`BridgeError::UnparsableOutput`] when the reply holds no command.
    pub async fn ai_generate_command(&self, goal: &str, metrics: &[String]) -> BridgeResult<String> {
        let goal = goal.trim();
        if goal.is_empty() {
            return Err(BridgeError::InvalidInput("goal must not be empty".to_string()));
        }
        if let Some(sim) = self.simulated().await {
            return Ok(sim.generate_command(goal));
        }

        let command = CommandLine::new("ai-generate")
            .quoted(goal)?
            .quoted(metrics_arg(metrics))?;
        let body = self.expect_ok(&command).await?;
        parse_generated_command(&body).ok_or_else(|| {
            BridgeError::UnparsableOutput("no command in generator output".to_string())
        })
    }

    /// Converts a task to AI-dynamic mode and enables it.
    ///
    /// # Errors
    ///
    /// [`BridgeError::InvalidInput`] for an empty prompt,
    /// [`BridgeError::Rejected`] when the scheduler refuses.
    pub async fn convert_to_ai(&self, id: TaskId, prompt: &str, metrics: &[String]) -> BridgeResult<()> {
        if prompt.trim().is_empty() {
            return Err(BridgeError::InvalidInput("AI prompt must not be empty".to_string()));
        }
        if let Some(mut sim) = self.simulated().await {
            return sim.convert_to_ai(id, prompt, metrics);
        }
        self.convert_remote(id, prompt, metrics).await
    }

    /// Returns a script task's body: cached record first, then the last
    /// `view` text captured for it, then a fresh `view`.
    ///
    /// # Errors
    ///
    /// [`BridgeError::InvalidInput`] for tasks that are not scripts,
    /// [`BridgeError::NotFound`] for unknown ids.
    pub async fn script_content(&self, id: TaskId) -> BridgeResult<String> {
        if let Some(sim) = self.simulated().await {
            return sim.script_content(id);
        }

        {
            let cache = self.cache.lock().await;
            if let Some(task) = cache.get(id) {
                return script_body(task);
            }
            if let Some(body) = cache.last_view(id).and_then(extract_script) {
                return Ok(body);
            }
        }

        let task = self.fetch(id).await?;
        script_body(&task)
    }

    /// Metrics an AI-dynamic task may observe.
    #[must_use]
    pub fn system_metrics(&self) -> &'static [SystemMetric] {
        SYSTEM_METRICS
    }

    /// Returns the simulation when the scheduler is unavailable.
    ///
    /// Launches the scheduler on first use; a failed launch degrades the
    /// channel for good.
    async fn simulated(&self) -> Option<MutexGuard<'_, Simulation>> {
        if self.channel.warm_up().await {
            None
        } else {
            Some(self.simulation.lock().await)
        }
    }

    /// Sends a command and drops cached records if the session was replaced.
    async fn send(&self, command: &CommandLine) -> CommandOutcome {
        let outcome = self.channel.send(command).await;
        let generation = self.channel.generation().await;
        self.cache.lock().await.sync_generation(generation);
        outcome
    }

    /// Sends a command and returns the reply without the echoed line.
    async fn expect_ok(&self, command: &CommandLine) -> BridgeResult<String> {
        let outcome = self.send(command).await;
        reply_body(outcome, command)
    }

    /// Sends a mutating command for `id`, checks the acknowledgement and
    /// invalidates the cached record.
    async fn apply(&self, id: TaskId, command: &CommandLine, accepted: fn(&str) -> bool) -> BridgeResult<()> {
        let result = self.expect_ok(command).await;
        self.cache.lock().await.invalidate(id);
        let body = result?;
        if accepted(&body) {
            Ok(())
        } else {
            Err(BridgeError::Rejected(summarize(&body)))
        }
    }

    async fn fetch(&self, id: TaskId) -> BridgeResult<Task> {
        let command = CommandLine::new("view").id(id);
        let since = self.cache.lock().await.epoch();
        let mut outcome = self.send(&command).await;
        let record = outcome.record.take();
        let body = reply_body(outcome, &command)?;
        match record.map_or_else(|| parse_record(&body), Ok) {
            Ok(task) if task.id == id => {
                let mut cache = self.cache.lock().await;
                if cache.put_since(task.clone(), since) {
                    cache.remember_view_since(id, body, since);
                }
                Ok(task)
            }
            Ok(task) => {
                warn!(id, got = task.id, "view answered for another task");
                Err(BridgeError::NotFound { id })
            }
            Err(err) => {
                debug!(id, error = %err, "view yielded no record");
                Err(BridgeError::NotFound { id })
            }
        }
    }

    async fn task_ids(&self) -> BridgeResult<Vec<TaskId>> {
        let body = self.expect_ok(&CommandLine::new("list")).await?;
        Ok(extract_ids(&body))
    }

    fn add_command(&self, new: &NewTask) -> BridgeResult<CommandLine> {
        let mut command = CommandLine::new("add").quoted(&new.name)?;
        command = match &new.execution {
            Execution::Command { command: line } => command.quoted(line)?,
            Execution::Script { body } => {
                let path = self.stage(body)?;
                command.verbatim("-f").quoted(path.display().to_string())?
            }
            Execution::AiDynamic { .. } => command.quoted(AI_PLACEHOLDER_COMMAND)?,
        };
        command = match &new.schedule {
            Schedule::Manual => command,
            Schedule::Interval { seconds } => command
                .verbatim("-t")
                .verbatim(interval_minutes(*seconds).to_string()),
            Schedule::Cron { expression } => command.verbatim("-s").quoted(expression)?,
        };
        if let Some(dir) = new.working_dir.as_deref().filter(|dir| !dir.trim().is_empty()) {
            command = command.verbatim("-d").quoted(dir)?;
        }
        if new.max_runtime_secs > 0 {
            command = command
                .verbatim("-m")
                .verbatim(new.max_runtime_secs.to_string());
        }
        Ok(command)
    }

    fn stage(&self, body: &str) -> BridgeResult<PathBuf> {
        stage_script(&self.scripts_dir, body)
            .map_err(|err| BridgeError::Io(std::io::Error::other(format!("{err:#}"))))
    }

    async fn edit_in_place(&self, current: &Task, update: &TaskUpdate) -> BridgeResult<()> {
        let id = current.id;

        if let Some(name) = update.name.as_ref().filter(|name| **name != current.name) {
            self.edit(id, "name", Some(name.as_str())).await?;
        }

        match (&update.execution, &current.execution) {
            (Some(Execution::Command { command }), Execution::Command { command: old }) => {
                if command != old {
                    self.edit(id, "command", Some(command.as_str())).await?;
                }
            }
            (Some(Execution::Command { command }), _) => {
                let line = CommandLine::new("to-command").id(id).quoted(command)?;
                self.apply(id, &line, is_task_changed).await?;
            }
            (Some(Execution::Script { body }), Execution::Script { body: old }) => {
                if body != old {
                    let path = self.stage(body)?.display().to_string();
                    self.edit(id, "script", Some(path.as_str())).await?;
                }
            }
            (
                Some(Execution::AiDynamic { prompt, metrics }),
                Execution::AiDynamic {
                    prompt: old_prompt,
                    metrics: old_metrics,
                },
            ) => {
                if prompt != old_prompt || metrics != old_metrics {
                    self.convert_remote(id, prompt, metrics).await?;
                }
            }
            _ => {}
        }

        if let Some(schedule) = update.schedule.as_ref().filter(|s| **s != current.schedule) {
            match schedule {
                Schedule::Interval { seconds } => {
                    self.edit_number(id, "interval", interval_minutes(*seconds)).await?;
                }
                Schedule::Cron { expression } => {
                    self.edit(id, "cron", Some(expression.as_str())).await?;
                }
                Schedule::Manual => {}
            }
        }

        if let Some(runtime) = update
            .max_runtime_secs
            .filter(|runtime| *runtime != current.max_runtime_secs)
        {
            self.edit_number(id, "runtime", runtime.into()).await?;
        }

        if let Some(dir) = &update.working_dir {
            let wanted = Some(dir.trim()).filter(|dir| !dir.is_empty());
            if wanted != current.working_dir.as_deref() {
                // A bare `edit <id> dir` resets the directory to the default.
                self.edit(id, "dir", wanted).await?;
            }
        }

        if let Some(policy) = update
            .dependency_policy
            .filter(|policy| *policy != current.dependency_policy)
        {
            self.edit_number(id, "dep_behavior", policy.code().into()).await?;
        }

        if let Some(enabled) = update.enabled.filter(|enabled| *enabled != current.enabled) {
            self.set_enabled_remote(id, enabled).await?;
        }
        Ok(())
    }

    /// Sends `edit <id> <field> [value]`; `None` sends no value at all.
    async fn edit(&self, id: TaskId, field: &str, value: Option<&str>) -> BridgeResult<()> {
        let command = CommandLine::new("edit").id(id).verbatim(field);
        let command = match value {
            Some(value) => command.quoted(value)?,
            None => command,
        };
        self.apply(id, &command, is_task_changed).await
    }

    async fn edit_number(&self, id: TaskId, field: &str, value: u64) -> BridgeResult<()> {
        let command = CommandLine::new("edit")
            .id(id)
            .verbatim(field)
            .verbatim(value.to_string());
        self.apply(id, &command, is_task_changed).await
    }

    async fn recreate(&self, current: &Task, update: &TaskUpdate) -> BridgeResult<UpdateOutcome> {
        let replacement = merge(current, update);
        info!(
            id = current.id,
            from = current.execution.kind().label(),
            to = replacement.execution.kind().label(),
            "change not possible in place; recreating task"
        );

        let new_id = self.create_task(&replacement).await?;
        if let Err(err) = self.delete_remote(current.id).await {
            warn!(old = current.id, new = new_id, error = %err, "could not delete replaced task; rolling back");
            if let Err(cleanup) = self.delete_remote(new_id).await {
                warn!(id = new_id, error = %cleanup, "could not remove replacement task");
            }
            return Err(err);
        }

        for dependency in &current.dependencies {
            if let Err(err) = self.add_dependency(new_id, *dependency).await {
                warn!(id = new_id, dependency, error = %err, "could not restore dependency");
            }
        }
        let policy = update.dependency_policy.unwrap_or(current.dependency_policy);
        if policy != DependencyPolicy::default() {
            if let Err(err) = self.set_dependency_policy(new_id, policy).await {
                warn!(id = new_id, error = %err, "could not restore dependency policy");
            }
        }

        Ok(UpdateOutcome::Recreated {
            old: current.id,
            new: new_id,
        })
    }

    async fn delete_remote(&self, id: TaskId) -> BridgeResult<()> {
        let command = CommandLine::new("remove").id(id);
        let outcome = self.send(&command).await;
        self.cache.lock().await.invalidate(id);
        if outcome.status == OutcomeStatus::ChannelFailure {
            return Err(BridgeError::ChannelFailure(outcome.raw));
        }

        let body = strip_echo(&outcome.raw, command.as_str());
        if is_absent(body) {
            debug!(id, "task already gone");
        }
        if is_removed(body) {
            info!(id, "task deleted");
            Ok(())
        } else {
            Err(BridgeError::Rejected(summarize(body)))
        }
    }

    async fn set_enabled_remote(&self, id: TaskId, enabled: bool) -> BridgeResult<()> {
        let verb = if enabled { "enable" } else { "disable" };
        self.apply(id, &CommandLine::new(verb).id(id), is_task_changed)
            .await
    }

    async fn convert_remote(&self, id: TaskId, prompt: &str, metrics: &[String]) -> BridgeResult<()> {
        let command = CommandLine::new("to-ai")
            .id(id)
            .quoted(prompt)?
            .quoted(metrics_arg(metrics))?;
        self.apply(id, &command, is_task_changed).await?;
        self.set_enabled_remote(id, true).await
    }

    /// Steps that complete a task after `add` assigned its id.
    async fn finish_create(&self, id: TaskId, new: &NewTask) -> BridgeResult<()> {
        if let Execution::AiDynamic { prompt, metrics } = &new.execution {
            self.convert_remote(id, prompt, metrics).await?;
        }
        if !new.enabled {
            self.set_enabled_remote(id, false).await?;
        }
        Ok(())
    }
}

/// Rejects creations the scheduler would accept with an empty payload.
fn validate_new_task(new: &NewTask) -> BridgeResult<()> {
    if new.name.trim().is_empty() {
        return Err(BridgeError::InvalidInput("task name must not be empty".to_string()));
    }
    let empty_payload = match &new.execution {
        Execution::Command { command } => command.trim().is_empty(),
        Execution::Script { body } => body.trim().is_empty(),
        Execution::AiDynamic { prompt, .. } => prompt.trim().is_empty(),
    };
    if empty_payload {
        return Err(BridgeError::InvalidInput(format!(
            "{} task `{}` has nothing to run",
            new.execution.kind().label(),
            new.name
        )));
    }
    Ok(())
}

fn needs_recreate(current: &Task, update: &TaskUpdate) -> bool {
    let kind_change = update.execution.as_ref().is_some_and(|execution| {
        let target = execution.kind();
        target != current.execution.kind()
            && matches!(target, ExecutionKind::Script | ExecutionKind::AiDynamic)
    });
    let schedule_cleared = matches!(update.schedule, Some(Schedule::Manual))
        && current.schedule != Schedule::Manual;
    kind_change || schedule_cleared
}

/// The current record with the update laid over it.
fn merge(current: &Task, update: &TaskUpdate) -> NewTask {
    NewTask {
        name: update.name.clone().unwrap_or_else(|| current.name.clone()),
        execution: update
            .execution
            .clone()
            .unwrap_or_else(|| current.execution.clone()),
        working_dir: update
            .working_dir
            .clone()
            .or_else(|| current.working_dir.clone())
            .filter(|dir| !dir.trim().is_empty()),
        schedule: update
            .schedule
            .clone()
            .unwrap_or_else(|| current.schedule.clone()),
        enabled: update.enabled.unwrap_or(current.enabled),
        max_runtime_secs: update.max_runtime_secs.unwrap_or(current.max_runtime_secs),
    }
}

fn script_body(task: &Task) -> BridgeResult<String> {
    match &task.execution {
        Execution::Script { body } if !body.is_empty() => Ok(body.clone()),
        Execution::Script { .. } => Err(BridgeError::UnparsableOutput(format!(
            "no script body in view of task {}",
            task.id
        ))),
        _ => Err(BridgeError::InvalidInput(format!(
            "task {} is not a script task",
            task.id
        ))),
    }
}

/// Comma-joined metric ids, or [`DEFAULT_METRICS`] when none are usable.
fn metrics_arg(metrics: &[String]) -> String {
    let ids: Vec<&str> = metrics
        .iter()
        .map(|metric| metric.trim())
        .filter(|metric| !metric.is_empty())
        .collect();
    if ids.is_empty() {
        DEFAULT_METRICS.to_string()
    } else {
        ids.join(",")
    }
}

/// Whole minutes for `-t`/`edit interval`, never below one.
fn interval_minutes(seconds: u64) -> u64 {
    (seconds / 60).max(1)
}

/// Maps a channel outcome onto the bridge's error taxonomy.
fn reply_body(outcome: CommandOutcome, command: &CommandLine) -> BridgeResult<String> {
    match outcome.status {
        OutcomeStatus::ChannelFailure => Err(BridgeError::ChannelFailure(outcome.raw)),
        OutcomeStatus::Rejected => Err(BridgeError::Rejected(summarize(strip_echo(
            &outcome.raw,
            command.as_str(),
        )))),
        OutcomeStatus::Ok if outcome.timed_out && looks_stuck(&outcome.raw, command.as_str()) => {
            Err(BridgeError::Timeout {
                command: command.redacted().to_string(),
            })
        }
        OutcomeStatus::Ok => {
            if outcome.timed_out {
                warn!(command = %command, "deadline reached; using partial output");
            }
            Ok(strip_echo(&outcome.raw, command.as_str()).to_string())
        }
    }
}

/// Drops everything up to and including the echoed command line.
fn strip_echo<'a>(raw: &'a str, line: &str) -> &'a str {
    raw.find(line)
        .and_then(|at| raw.get(at + line.len()..))
        .unwrap_or(raw)
}

/// Reply text without surrounding blanks and the trailing prompt.
fn summarize(body: &str) -> String {
    body.trim().trim_end_matches('>').trim().to_string()
}

#[cfg(test)]
mod tests;
