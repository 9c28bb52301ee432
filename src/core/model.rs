//! Data shapes exchanged with callers: task records, command outcomes and
//! AI-generation results.

use serde::{Deserialize, Serialize};

/// Identifier assigned by the scheduler process.
pub type TaskId = u32;

/// What a task runs when it fires.
///
/// Only the payload of the active variant is authoritative; switching kinds
/// replaces the payload entirely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Execution {
    /// A single shell command line.
    Command { command: String },
    /// A script body, staged to a file when sent to the scheduler.
    Script { body: String },
    /// A goal prompt evaluated against live system metrics.
    AiDynamic { prompt: String, metrics: Vec<String> },
}

impl Execution {
    /// Returns the kind tag of this execution.
    #[must_use]
    pub const fn kind(&self) -> ExecutionKind {
        match self {
            Self::Command { .. } => ExecutionKind::Command,
            Self::Script { .. } => ExecutionKind::Script,
            Self::AiDynamic { .. } => ExecutionKind::AiDynamic,
        }
    }
}

impl Default for Execution {
    fn default() -> Self {
        Self::Command {
            command: String::new(),
        }
    }
}

/// Payload-free execution tag, as printed in `Type:` lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionKind {
    #[default]
    Command,
    Script,
    AiDynamic,
}

impl ExecutionKind {
    /// Returns the label the scheduler prints for this kind.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Command => "Command",
            Self::Script => "Script",
            Self::AiDynamic => "AI Dynamic",
        }
    }
}

/// When a task fires on its own.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Schedule {
    /// Only runs when triggered explicitly.
    #[default]
    Manual,
    /// Fixed period, in seconds.
    Interval { seconds: u64 },
    /// Five-field cron expression.
    Cron { expression: String },
}

impl Schedule {
    /// Builds an interval schedule from whole minutes, saturating at
    /// `u64::MAX` seconds.
    #[must_use]
    pub const fn every_minutes(minutes: u64) -> Self {
        Self::Interval {
            seconds: minutes.saturating_mul(60),
        }
    }
}

/// How the outcomes of a task's dependencies gate its execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyPolicy {
    #[default]
    AnySuccess,
    AllSuccess,
    AnyComplete,
    AllComplete,
}

impl DependencyPolicy {
    /// Numeric code used by `set-dep-behavior` and `edit <id> dep_behavior`.
    #[must_use]
    pub const fn code(&self) -> u8 {
        match self {
            Self::AnySuccess => 0,
            Self::AllSuccess => 1,
            Self::AnyComplete => 2,
            Self::AllComplete => 3,
        }
    }

    /// Maps a numeric code back to a policy.
    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::AnySuccess),
            1 => Some(Self::AllSuccess),
            2 => Some(Self::AnyComplete),
            3 => Some(Self::AllComplete),
            _ => None,
        }
    }

    /// Returns the label the scheduler prints for this policy.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::AnySuccess => "Any Success",
            Self::AllSuccess => "All Success",
            Self::AnyComplete => "Any Completion",
            Self::AllComplete => "All Completion",
        }
    }
}

/// A schedulable unit as reported by the scheduler.
///
/// Timestamps are epoch seconds with `0` meaning unset/never.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub name: String,
    pub execution: Execution,
    /// `None` runs in the scheduler's default directory.
    pub working_dir: Option<String>,
    pub schedule: Schedule,
    pub enabled: bool,
    pub created_at: i64,
    pub last_run_at: i64,
    pub next_run_at: i64,
    /// `-1` when the task never ran or the code is unknown.
    pub exit_code: i32,
    /// `0` means unlimited.
    pub max_runtime_secs: u32,
    pub dependencies: Vec<TaskId>,
    pub dependency_policy: DependencyPolicy,
}

impl Task {
    /// Creates a record with every optional field at its documented default.
    #[must_use]
    pub fn new(id: TaskId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            execution: Execution::default(),
            working_dir: None,
            schedule: Schedule::Manual,
            enabled: true,
            created_at: 0,
            last_run_at: 0,
            next_run_at: 0,
            exit_code: -1,
            max_runtime_secs: 0,
            dependencies: Vec::new(),
            dependency_policy: DependencyPolicy::AnySuccess,
        }
    }
}

/// Caller-supplied description of a task to create.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NewTask {
    pub name: String,
    pub execution: Execution,
    pub working_dir: Option<String>,
    pub schedule: Schedule,
    pub enabled: bool,
    pub max_runtime_secs: u32,
}

/// Partial update; `None` fields are left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TaskUpdate {
    pub name: Option<String>,
    pub execution: Option<Execution>,
    pub working_dir: Option<String>,
    pub schedule: Option<Schedule>,
    pub enabled: Option<bool>,
    pub max_runtime_secs: Option<u32>,
    pub dependency_policy: Option<DependencyPolicy>,
}

impl TaskUpdate {
    /// An update that only toggles the enabled flag.
    #[must_use]
    pub fn enabled_only(enabled: bool) -> Self {
        Self {
            enabled: Some(enabled),
            ..Self::default()
        }
    }

    /// Returns true if nothing but `enabled` is set.
    #[must_use]
    pub const fn is_enabled_only(&self) -> bool {
        self.enabled.is_some()
            && self.name.is_none()
            && self.execution.is_none()
            && self.working_dir.is_none()
            && self.schedule.is_none()
            && self.max_runtime_secs.is_none()
            && self.dependency_policy.is_none()
    }
}

/// Result of an update round trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateOutcome {
    /// Edited in place.
    Updated(TaskId),
    /// The scheduler could not change the task in place; it was deleted and
    /// recreated under a new id.
    Recreated { old: TaskId, new: TaskId },
}

impl UpdateOutcome {
    /// The id the task lives under after the update.
    #[must_use]
    pub const fn id(&self) -> TaskId {
        match self {
            Self::Updated(id) => *id,
            Self::Recreated { new, .. } => *new,
        }
    }
}

/// Classification of a single command round trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutcomeStatus {
    /// The scheduler answered without an error marker.
    Ok,
    /// The scheduler printed its own error or usage text.
    Rejected,
    /// No live process could be reached.
    ChannelFailure,
}

/// Raw result of one command, with an optional parsed record attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    pub status: OutcomeStatus,
    pub raw: String,
    /// The read loop gave up at its deadline; `raw` may be partial.
    pub timed_out: bool,
    pub record: Option<Task>,
}

impl CommandOutcome {
    /// Outcome for a command that never reached the scheduler.
    #[must_use]
    pub fn channel_failure(reason: impl Into<String>) -> Self {
        Self {
            status: OutcomeStatus::ChannelFailure,
            raw: reason.into(),
            timed_out: false,
            record: None,
        }
    }

    /// Attaches a parsed record.
    #[must_use]
    pub fn with_record(mut self, record: Task) -> Self {
        self.record = Some(record);
        self
    }

    /// Returns true for [`OutcomeStatus::Ok`].
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status == OutcomeStatus::Ok
    }
}

/// What the AI generator produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeneratedKind {
    #[default]
    Command,
    Script,
}

/// Task proposal extracted from `ai-create` output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiGeneration {
    pub success: bool,
    pub content: String,
    pub kind: GeneratedKind,
    pub schedule_description: String,
    pub cron: Option<String>,
    pub interval_minutes: Option<u32>,
    pub suggested_name: String,
    /// Full captured text, kept for diagnostics.
    pub raw: String,
}

/// Entry in the catalogue of metrics an AI-dynamic task may observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SystemMetric {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
}

/// Metrics the scheduler knows how to sample.
pub const SYSTEM_METRICS: &[SystemMetric] = &[
    SystemMetric {
        id: "cpu_load",
        name: "CPU load",
        description: "CPU utilisation percentage",
    },
    SystemMetric {
        id: "mem_free",
        name: "Free memory",
        description: "Amount of free RAM",
    },
    SystemMetric {
        id: "mem_used",
        name: "Used memory",
        description: "Amount of RAM in use",
    },
    SystemMetric {
        id: "disk:/",
        name: "Disk / (root)",
        description: "Usage of the root filesystem",
    },
    SystemMetric {
        id: "disk:/home",
        name: "Disk /home",
        description: "Usage of the /home filesystem",
    },
    SystemMetric {
        id: "disk:/var",
        name: "Disk /var",
        description: "Usage of the /var filesystem",
    },
    SystemMetric {
        id: "load_avg",
        name: "Load average",
        description: "System load average",
    },
    SystemMetric {
        id: "processes",
        name: "Processes",
        description: "Running process information",
    },
];
