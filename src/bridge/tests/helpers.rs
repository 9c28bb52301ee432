//! Shared test utilities for the bridge module.
//!
//! - `FakeScheduler` - stateful stand-in for the scheduler console
//! - `Harness` - a [`TaskBridge`] wired to a fake over a scripted transport
//! - `command_task`, `script_task` - [`NewTask`] builders

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use tempfile::TempDir;

use crate::bridge::TaskBridge;
use crate::core::commands::{CONFIRMATION_PROMPT, mask_secret};
use crate::core::testing::{ManualClock, Responder, ScriptedLauncher, Step, split_console_args};
use crate::core::{
    ChannelTimings, CommandChannel, DependencyPolicy, Execution, NewTask, RetryPolicy, Schedule,
    SessionSupervisor, Task, TaskId,
};
use crate::parse::ListingStrategy;

/// Console state behind [`FakeScheduler`].
#[derive(Debug, Default)]
struct FakeState {
    tasks: BTreeMap<TaskId, Task>,
    next_id: TaskId,
    pending: Option<Task>,
    api_key: Option<String>,
    refused: BTreeSet<String>,
}

/// Answers console lines the way the scheduler's interactive mode does.
#[derive(Debug, Clone, Default)]
pub struct FakeScheduler {
    state: Arc<Mutex<FakeState>>,
}

impl FakeScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn responder(&self) -> Responder {
        let state = Arc::clone(&self.state);
        Arc::new(move |line| {
            state
                .lock()
                .map(|mut state| state.respond(line))
                .unwrap_or_default()
        })
    }

    /// Current server-side copy of a task.
    pub fn task(&self, id: TaskId) -> Option<Task> {
        self.state.lock().ok()?.tasks.get(&id).cloned()
    }

    pub fn task_count(&self) -> usize {
        self.state.lock().map(|s| s.tasks.len()).unwrap_or_default()
    }

    /// Makes every later `verb` command fail with an error line.
    pub fn refuse(&self, verb: &str) {
        if let Ok(mut state) = self.state.lock() {
            state.refused.insert(verb.to_string());
        }
    }
}

impl FakeState {
    fn respond(&mut self, line: &str) -> Vec<Step> {
        if line == "y" {
            return match self.pending.take() {
                Some(task) => {
                    let id = self.insert(task);
                    prompt(format!("Task added with ID: {id}"))
                }
                None => prompt("Unknown command: y"),
            };
        }

        let args = split_console_args(line);
        let Some(verb) = args.first() else {
            return vec![Step::data("> ")];
        };
        if self.refused.contains(verb) {
            return prompt(format!("Error: {verb} refused"));
        }
        let id: Option<TaskId> = args.get(1).and_then(|a| a.parse().ok());

        match (verb.as_str(), id) {
            ("list", _) => prompt(self.listing()),
            ("view", Some(id)) => match self.tasks.get(&id) {
                Some(task) => prompt(format!("Task Details:\r\n{}", render(task))),
                None => not_found(id),
            },
            ("add", _) => self.add(&args),
            ("enable" | "disable", Some(id)) => match self.tasks.get_mut(&id) {
                Some(task) => {
                    task.enabled = verb == "enable";
                    prompt(format!("Task {id} {verb}d"))
                }
                None => not_found(id),
            },
            ("remove", Some(id)) => match self.tasks.remove(&id) {
                Some(_) => {
                    for task in self.tasks.values_mut() {
                        task.dependencies.retain(|dep| *dep != id);
                    }
                    prompt(format!("Task {id} removed"))
                }
                None => not_found(id),
            },
            ("edit", Some(id)) => self.edit(id, &args),
            ("run", Some(id)) => match self.tasks.get_mut(&id) {
                Some(task) => {
                    task.last_run_at = 1;
                    task.exit_code = 0;
                    vec![
                        Step::data(format!("Running task {id}...\r\n")),
                        Step::data(format!("Executing task {id}\r\n")),
                        Step::data("> "),
                    ]
                }
                None => not_found(id),
            },
            ("add-dep" | "remove-dep", Some(id)) => self.dependency(verb, id, &args),
            ("set-dep-behavior", Some(id)) => {
                let policy = args
                    .get(2)
                    .and_then(|code| code.parse().ok())
                    .and_then(DependencyPolicy::from_code);
                match (self.tasks.get_mut(&id), policy) {
                    (Some(task), Some(policy)) => {
                        task.dependency_policy = policy;
                        prompt(format!("Task {id} dependency behavior updated"))
                    }
                    (None, _) => not_found(id),
                    (_, None) => prompt("Error: invalid dependency behavior"),
                }
            }
            ("to-ai", _) if args.len() < 4 => {
                prompt("Usage: to-ai <task_id> <ai_prompt> <system_metrics>")
            }
            ("to-ai", Some(id)) => match self.tasks.get_mut(&id) {
                Some(task) => {
                    task.execution = Execution::AiDynamic {
                        prompt: args.get(2).cloned().unwrap_or_default(),
                        metrics: args
                            .get(3)
                            .map(|m| m.split(',').map(str::to_string).collect())
                            .unwrap_or_default(),
                    };
                    prompt(format!("Task {id} converted to AI-Dynamic mode"))
                }
                None => not_found(id),
            },
            ("to-command", Some(id)) => match self.tasks.get_mut(&id) {
                Some(task) => {
                    let command = args.get(2).cloned().unwrap_or_default();
                    let reply =
                        format!("Task {id} converted to command mode with command: {command}");
                    task.execution = Execution::Command { command };
                    prompt(reply)
                }
                None => not_found(id),
            },
            ("set-api-key", _) => {
                self.api_key = args.get(1).cloned();
                prompt("API key updated successfully in config file.")
            }
            ("view-api-key", _) => match &self.api_key {
                Some(key) => prompt(format!("Current API key: {}", mask_secret(key))),
                None => prompt("No API key configured"),
            },
            ("ai-create", _) => {
                let mut task = Task::new(0, "disk_check");
                task.execution = Execution::Command {
                    command: "df -h".to_string(),
                };
                self.pending = Some(task);
                let rule = "-".repeat(40);
                vec![Step::data(format!(
                    "AI has generated a command based on your description:\r\n{rule}\r\ndf -h\r\n\
                     {rule}\r\nSchedule: Every hour\r\nSuggested Name: disk_check\r\n{CONFIRMATION_PROMPT} "
                ))]
            }
            ("ai-generate", _) => vec![
                Step::data("Generated:\r\nCommand: `df -h /`\r\n"),
                Step::data("> "),
            ],
            (other, _) => prompt(format!("Unknown command: {other}")),
        }
    }

    fn insert(&mut self, mut task: Task) -> TaskId {
        self.next_id += 1;
        task.id = self.next_id;
        self.tasks.insert(task.id, task);
        self.next_id
    }

    fn listing(&self) -> String {
        if self.tasks.is_empty() {
            return "No tasks found.".to_string();
        }
        let mut out = String::from("Task List:\r\n----------\r\n");
        for task in self.tasks.values() {
            out.push_str(&render(task));
            out.push_str("----------\r\n");
        }
        out
    }

    fn add(&mut self, args: &[String]) -> Vec<Step> {
        let Some(name) = args.get(1) else {
            return prompt("Usage: add <name> <command> [options]");
        };
        let mut task = Task::new(0, name.clone());
        let mut rest = args.iter().skip(2);

        while let Some(arg) = rest.next() {
            let value = rest.clone().next().cloned().unwrap_or_default();
            match arg.as_str() {
                "-f" => {
                    let body = std::fs::read_to_string(&value).unwrap_or_default();
                    task.execution = Execution::Script { body };
                }
                "-t" => task.schedule = Schedule::every_minutes(value.parse().unwrap_or(1)),
                "-s" => task.schedule = Schedule::Cron { expression: value },
                "-d" => task.working_dir = Some(value),
                "-m" => task.max_runtime_secs = value.parse().unwrap_or_default(),
                command => {
                    task.execution = Execution::Command {
                        command: command.to_string(),
                    };
                    continue;
                }
            }
            rest.next();
        }

        let summary = format!("Task: {}\r\n", task.name);
        self.pending = Some(task);
        vec![Step::data(format!("{summary}{CONFIRMATION_PROMPT} "))]
    }

    fn edit(&mut self, id: TaskId, args: &[String]) -> Vec<Step> {
        let Some(task) = self.tasks.get_mut(&id) else {
            return not_found(id);
        };
        let field = args.get(2).map(String::as_str).unwrap_or_default();
        let value = args.get(3).cloned().unwrap_or_default();

        match field {
            "name" => task.name = value,
            "command" => {
                if !matches!(task.execution, Execution::Command { .. }) {
                    return prompt("Cannot set command for script-mode task. Use 'script' field.");
                }
                task.execution = Execution::Command { command: value };
            }
            "script" => {
                let body = std::fs::read_to_string(&value).unwrap_or_default();
                task.execution = Execution::Script { body };
            }
            "interval" => task.schedule = Schedule::every_minutes(value.parse().unwrap_or(1)),
            "cron" => task.schedule = Schedule::Cron { expression: value },
            "dir" => task.working_dir = Some(value).filter(|dir| !dir.is_empty()),
            "runtime" => task.max_runtime_secs = value.parse().unwrap_or_default(),
            "dep_behavior" => {
                if let Some(policy) = value.parse().ok().and_then(DependencyPolicy::from_code) {
                    task.dependency_policy = policy;
                }
            }
            other => return prompt(format!("Unknown field: {other}")),
        }
        prompt(format!("Task {id} updated"))
    }

    fn dependency(&mut self, verb: &str, id: TaskId, args: &[String]) -> Vec<Step> {
        let Some(dep) = args.get(2).and_then(|a| a.parse::<TaskId>().ok()) else {
            return prompt(format!("Usage: {verb} <task_id> <dependency_id>"));
        };
        if !self.tasks.contains_key(&dep) {
            return prompt(format!("Error: dependency task {dep} not found"));
        }
        let Some(task) = self.tasks.get_mut(&id) else {
            return not_found(id);
        };

        if verb == "add-dep" {
            if !task.dependencies.contains(&dep) {
                task.dependencies.push(dep);
            }
            prompt(format!("Added dependency: Task {id} now depends on Task {dep}"))
        } else if task.dependencies.contains(&dep) {
            task.dependencies.retain(|d| *d != dep);
            prompt(format!("Removed dependency: Task {id} no longer depends on Task {dep}"))
        } else {
            prompt("Failed to remove dependency")
        }
    }
}

/// Detail block as `view` prints it.
fn render(task: &Task) -> String {
    let mut out = String::new();
    let _ = write!(out, "ID: {}\r\nName: {}\r\n", task.id, task.name);
    let _ = write!(
        out,
        "Enabled: {}\r\nType: {}\r\n",
        if task.enabled { "Yes" } else { "No" },
        task.execution.kind().label()
    );
    match &task.execution {
        Execution::Command { command } => {
            let _ = write!(out, "Command: {command}\r\n");
        }
        Execution::Script { body } => {
            let _ = write!(out, "Script:\r\n{}\r\n", body.replace('\n', "\r\n"));
        }
        Execution::AiDynamic { prompt, metrics } => {
            let _ = write!(
                out,
                "AI Prompt: {prompt}\r\nSystem Metrics: {}\r\n",
                metrics.join(",")
            );
        }
    }
    let schedule = match &task.schedule {
        Schedule::Manual => "Manual".to_string(),
        Schedule::Interval { seconds } => format!("Every {} minutes", seconds / 60),
        Schedule::Cron { expression } => format!("Cron: {expression}"),
    };
    let _ = write!(out, "Schedule: {schedule}\r\n");
    let _ = write!(
        out,
        "Working Directory: {}\r\n",
        task.working_dir.as_deref().unwrap_or("(default)")
    );
    let _ = write!(
        out,
        "Max Runtime: {} seconds (0 = unlimited)\r\n",
        task.max_runtime_secs
    );
    if task.last_run_at > 0 {
        let _ = write!(out, "Last Run: 2026-10-15 09:30:00\r\nExit Code: {}\r\n", task.exit_code);
    } else {
        out.push_str("Last Run: Never\r\n");
    }
    if !task.dependencies.is_empty() {
        let ids: Vec<String> = task.dependencies.iter().map(ToString::to_string).collect();
        let _ = write!(out, "Dependencies: {} \r\n", ids.join(" "));
    }
    let _ = write!(
        out,
        "Dependency Behavior: {}\r\n",
        task.dependency_policy.label()
    );
    out
}

fn prompt(text: impl AsRef<str>) -> Vec<Step> {
    vec![Step::data(format!("{}\r\n> ", text.as_ref()))]
}

fn not_found(id: TaskId) -> Vec<Step> {
    prompt(format!("Task {id} not found"))
}

/// A bridge talking to a [`FakeScheduler`].
pub struct Harness {
    pub bridge: TaskBridge,
    pub launcher: ScriptedLauncher,
    pub fake: FakeScheduler,
    pub scripts: TempDir,
}

impl Harness {
    pub fn new(listing: ListingStrategy) -> Result<Self> {
        let fake = FakeScheduler::new();
        let clock = ManualClock::new();
        let launcher = ScriptedLauncher::new(clock.clone(), fake.responder());
        Self::with_launcher(launcher, fake, clock, listing)
    }

    /// Harness whose console answers through `responder` instead of a fake.
    pub fn scripted(responder: Responder) -> Result<Self> {
        let clock = ManualClock::new();
        let launcher = ScriptedLauncher::new(clock.clone(), responder);
        Self::with_launcher(launcher, FakeScheduler::new(), clock, ListingStrategy::IdScan)
    }

    /// Harness whose scheduler binary is missing.
    pub fn unavailable() -> Result<Self> {
        let clock = ManualClock::new();
        let launcher = ScriptedLauncher::unavailable(clock.clone());
        Self::with_launcher(launcher, FakeScheduler::new(), clock, ListingStrategy::IdScan)
    }

    fn with_launcher(
        launcher: ScriptedLauncher,
        fake: FakeScheduler,
        clock: ManualClock,
        listing: ListingStrategy,
    ) -> Result<Self> {
        let timings = ChannelTimings::default();
        let supervisor = SessionSupervisor::new(
            Box::new(launcher.clone()),
            Arc::new(clock.clone()),
            timings,
        );
        let channel = CommandChannel::new(supervisor, Arc::new(clock), timings, RetryPolicy::default());
        let scripts = TempDir::new()?;
        let bridge = TaskBridge::new(channel, scripts.path().to_path_buf(), listing);
        Ok(Self {
            bridge,
            launcher,
            fake,
            scripts,
        })
    }

    /// Number of written lines starting with `prefix`.
    pub fn sent(&self, prefix: &str) -> usize {
        self.launcher
            .written()
            .iter()
            .filter(|line| line.starts_with(prefix))
            .count()
    }

    pub fn wrote(&self, line: &str) -> bool {
        self.launcher.written().iter().any(|written| written == line)
    }
}

pub fn command_task(name: &str, command: &str) -> NewTask {
    NewTask {
        name: name.to_string(),
        execution: Execution::Command {
            command: command.to_string(),
        },
        schedule: Schedule::every_minutes(30),
        enabled: true,
        ..NewTask::default()
    }
}

pub fn script_task(name: &str, body: &str) -> NewTask {
    NewTask {
        name: name.to_string(),
        execution: Execution::Script {
            body: body.to_string(),
        },
        enabled: true,
        ..NewTask::default()
    }
}
