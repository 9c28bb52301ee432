//! CLI argument parsing using clap.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{ArgGroup, Args as ClapArgs, Parser, Subcommand, ValueEnum};

use crate::core::{DependencyPolicy, Execution, NewTask, Schedule, TaskId, TaskUpdate};

/// `taskbridge` - request/response access to the task scheduler console
///
/// Every subcommand prints its result as JSON on stdout.
#[derive(Parser, Debug)]
#[command(name = "taskbridge", version, about, long_about = None)]
pub struct Args {
    /// Directory holding `bin/taskscheduler` (defaults to the current directory)
    #[arg(long, global = true, value_name = "DIR")]
    pub base_dir: Option<PathBuf>,

    /// Serve every call from the in-memory simulation
    #[arg(long, global = true)]
    pub simulate: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List every task
    List,
    /// Show one task
    Show {
        id: TaskId,
        /// Bypass the record cache
        #[arg(long)]
        refresh: bool,
    },
    /// Create a task
    Add(AddArgs),
    /// Change fields of a task
    Edit {
        id: TaskId,
        #[command(flatten)]
        changes: EditArgs,
    },
    Enable { id: TaskId },
    Disable { id: TaskId },
    Remove { id: TaskId },
    /// Start a task now
    Run { id: TaskId },
    /// Manage dependencies
    Dep {
        #[command(subcommand)]
        action: DepAction,
    },
    /// Manage the AI generator's API key
    ApiKey {
        #[command(subcommand)]
        action: ApiKeyAction,
    },
    /// Ask the AI generator for a task
    Generate { description: String },
    /// Ask the AI generator for a single command
    GenerateCommand {
        goal: String,
        #[arg(long, value_delimiter = ',')]
        metrics: Vec<String>,
    },
    /// Convert a task to AI-dynamic mode
    ToAi {
        id: TaskId,
        prompt: String,
        #[arg(long, value_delimiter = ',')]
        metrics: Vec<String>,
    },
    /// Print a script task's body
    Script { id: TaskId },
    /// List the metrics AI-dynamic tasks can observe
    Metrics,
    /// Print the effective settings
    Config {
        /// Also write them to `.taskbridge/settings.json`
        #[arg(long)]
        save: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum DepAction {
    Add { id: TaskId, dependency: TaskId },
    Remove { id: TaskId, dependency: TaskId },
    /// Set how dependency outcomes gate the task
    Policy {
        id: TaskId,
        #[arg(value_enum)]
        policy: PolicyArg,
    },
}

#[derive(Subcommand, Debug)]
pub enum ApiKeyAction {
    Set { key: String },
    Show,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PolicyArg {
    AnySuccess,
    AllSuccess,
    AnyComplete,
    AllComplete,
}

impl From<PolicyArg> for DependencyPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::AnySuccess => Self::AnySuccess,
            PolicyArg::AllSuccess => Self::AllSuccess,
            PolicyArg::AnyComplete => Self::AnyComplete,
            PolicyArg::AllComplete => Self::AllComplete,
        }
    }
}

/// What a task runs. At most one may be given.
#[derive(ClapArgs, Debug, Default)]
#[command(group(ArgGroup::new("payload").args(["command", "script_file", "ai_prompt"])))]
pub struct PayloadArgs {
    /// Shell command line
    #[arg(long)]
    pub command: Option<String>,

    /// File holding a script body
    #[arg(long, value_name = "FILE")]
    pub script_file: Option<PathBuf>,

    /// Goal prompt for an AI-dynamic task
    #[arg(long)]
    pub ai_prompt: Option<String>,

    /// Metrics observed by an AI-dynamic task
    #[arg(long, value_delimiter = ',', requires = "ai_prompt")]
    pub metrics: Vec<String>,
}

impl PayloadArgs {
    /// Reads the payload, loading script files from disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the script file cannot be read.
    pub fn execution(self) -> Result<Option<Execution>> {
        if let Some(command) = self.command {
            return Ok(Some(Execution::Command { command }));
        }
        if let Some(path) = self.script_file {
            return Ok(Some(Execution::Script {
                body: read_script(&path)?,
            }));
        }
        Ok(self.ai_prompt.map(|prompt| Execution::AiDynamic {
            prompt,
            metrics: self.metrics,
        }))
    }
}

/// When a task fires. At most one may be given.
#[derive(ClapArgs, Debug, Default)]
#[command(group(ArgGroup::new("schedule").args(["every", "cron", "manual"])))]
pub struct ScheduleArgs {
    /// Interval in minutes
    #[arg(long, value_name = "MINUTES")]
    pub every: Option<u64>,

    /// Five-field cron expression
    #[arg(long)]
    pub cron: Option<String>,

    /// Run only when started explicitly
    #[arg(long)]
    pub manual: bool,
}

impl ScheduleArgs {
    #[must_use]
    pub fn schedule(self) -> Option<Schedule> {
        match (self.every, self.cron, self.manual) {
            (Some(minutes), _, _) => Some(Schedule::every_minutes(minutes)),
            (_, Some(expression), _) => Some(Schedule::Cron { expression }),
            (_, _, true) => Some(Schedule::Manual),
            _ => None,
        }
    }
}

#[derive(ClapArgs, Debug)]
pub struct AddArgs {
    pub name: String,

    #[command(flatten)]
    pub payload: PayloadArgs,

    #[command(flatten)]
    pub schedule: ScheduleArgs,

    /// Working directory for the task
    #[arg(long)]
    pub dir: Option<String>,

    /// Maximum runtime in seconds (0 = unlimited)
    #[arg(long, default_value_t = 0)]
    pub max_runtime: u32,

    /// Create the task disabled
    #[arg(long)]
    pub disabled: bool,
}

impl AddArgs {
    /// # Errors
    ///
    /// Returns an error if no payload was given or a script file is unreadable.
    pub fn into_new_task(self) -> Result<NewTask> {
        let Some(execution) = self.payload.execution()? else {
            bail!("one of --command, --script-file or --ai-prompt is required");
        };
        Ok(NewTask {
            name: self.name,
            execution,
            working_dir: self.dir,
            schedule: self.schedule.schedule().unwrap_or_default(),
            enabled: !self.disabled,
            max_runtime_secs: self.max_runtime,
        })
    }
}

#[derive(ClapArgs, Debug, Default)]
pub struct EditArgs {
    #[arg(long)]
    pub name: Option<String>,

    #[command(flatten)]
    pub payload: PayloadArgs,

    #[command(flatten)]
    pub schedule: ScheduleArgs,

    #[arg(long)]
    pub dir: Option<String>,

    #[arg(long)]
    pub max_runtime: Option<u32>,

    #[arg(long, value_enum)]
    pub policy: Option<PolicyArg>,
}

impl EditArgs {
    /// # Errors
    ///
    /// Returns an error if nothing would change or a script file is unreadable.
    pub fn into_update(self) -> Result<TaskUpdate> {
        let update = TaskUpdate {
            name: self.name,
            execution: self.payload.execution()?,
            working_dir: self.dir,
            schedule: self.schedule.schedule(),
            enabled: None,
            max_runtime_secs: self.max_runtime,
            dependency_policy: self.policy.map(DependencyPolicy::from),
        };
        if update == TaskUpdate::default() {
            bail!("nothing to change");
        }
        Ok(update)
    }
}

fn read_script(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read script file: {}", path.display()))
}
