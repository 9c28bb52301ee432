//! Single-record parser for `view` output and listing blocks.

use tracing::trace;

use crate::core::model::{Execution, ExecutionKind, Schedule, Task, TaskId};
use crate::parse::ParseError;
use crate::parse::fields::{
    parse_bool, parse_execution_kind, parse_id, parse_id_list, parse_inline_exit_code,
    parse_max_runtime, parse_metrics, parse_policy, parse_schedule, parse_timestamp,
    parse_working_dir, split_field,
};
use crate::parse::script::{extract_script, is_following_label};

/// Fields collected while scanning, before the execution variant is settled.
#[derive(Debug, Default)]
struct Draft {
    id: Option<TaskId>,
    name: Option<String>,
    kind: Option<ExecutionKind>,
    command: Option<String>,
    prompt: Option<String>,
    metrics: Vec<String>,
    cron_expression: Option<String>,
}

/// Parses the detail block for one task.
///
/// Missing optional fields keep their defaults. The block must carry an id
/// and a non-empty name, otherwise the task is reported as not found.
///
/// # Errors
///
/// Returns [`ParseError::NotFound`] for the scheduler's own "not found" answer
/// and [`ParseError::MissingField`] when id or name are absent.
pub fn parse_record(text: &str) -> Result<Task, ParseError> {
    if let Some(id) = not_found_id(text) {
        return Err(ParseError::NotFound { id: Some(id) });
    }

    let mut draft = Draft::default();
    let mut task = Task::new(0, String::new());
    let mut in_script = false;

    for line in text.lines() {
        if in_script {
            if is_following_label(line) {
                in_script = false;
            } else {
                continue;
            }
        }
        let Some((key, value)) = split_field(line) else {
            continue;
        };

        match key.as_str() {
            "id" | "task_id" => {
                if draft.id.is_none() {
                    draft.id = parse_id(value);
                }
            }
            "name" => {
                if draft.name.is_none() && !value.is_empty() {
                    draft.name = Some(value.to_string());
                }
            }
            "enabled" => {
                if let Some(enabled) = parse_bool(value) {
                    task.enabled = enabled;
                }
            }
            "type" | "execution_mode" => draft.kind = parse_execution_kind(value),
            "command" => draft.command = Some(value.to_string()),
            "script" => {
                draft.kind.get_or_insert(ExecutionKind::Script);
                in_script = true;
            }
            "ai_prompt" => draft.prompt = Some(value.to_string()),
            "system_metrics" => draft.metrics = parse_metrics(value),
            "schedule" => task.schedule = parse_schedule(value),
            "cron_expression" => draft.cron_expression = Some(value.to_string()),
            "working_directory" | "working_dir" => task.working_dir = parse_working_dir(value),
            "max_runtime" => task.max_runtime_secs = parse_max_runtime(value),
            "created" => task.created_at = parse_timestamp(value),
            "last_run" => {
                task.last_run_at = parse_timestamp(value);
                if let Some(code) = parse_inline_exit_code(value) {
                    task.exit_code = code;
                }
            }
            "next_run" => task.next_run_at = parse_timestamp(value),
            "exit_code" => {
                if let Ok(code) = value.parse() {
                    task.exit_code = code;
                }
            }
            "dependencies" => task.dependencies = parse_id_list(value),
            "dependency_behavior" => {
                if let Some(policy) = parse_policy(value) {
                    task.dependency_policy = policy;
                }
            }
            other => trace!(key = other, "ignoring field"),
        }
    }

    finish(draft, task, text)
}

fn finish(draft: Draft, mut task: Task, text: &str) -> Result<Task, ParseError> {
    let Some(id) = draft.id else {
        return Err(if text.trim().is_empty() {
            ParseError::Empty
        } else {
            ParseError::MissingField("id")
        });
    };
    let Some(name) = draft.name else {
        return Err(ParseError::MissingField("name"));
    };
    task.id = id;
    task.name = name;

    if let (Schedule::Manual, Some(expression)) =
        (&task.schedule, draft.cron_expression.filter(|e| !e.is_empty()))
    {
        task.schedule = Schedule::Cron { expression };
    }

    let kind = draft.kind.unwrap_or(if draft.prompt.is_some() {
        ExecutionKind::AiDynamic
    } else {
        ExecutionKind::Command
    });
    task.execution = match kind {
        ExecutionKind::Command => Execution::Command {
            command: draft.command.unwrap_or_default(),
        },
        ExecutionKind::Script => Execution::Script {
            body: extract_script(text).unwrap_or_default(),
        },
        ExecutionKind::AiDynamic => Execution::AiDynamic {
            prompt: draft.prompt.unwrap_or_default(),
            metrics: draft.metrics,
        },
    };
    Ok(task)
}

/// Recognizes `Task N not found`.
fn not_found_id(text: &str) -> Option<TaskId> {
    text.lines().find_map(|line| {
        let rest = line.trim().trim_start_matches('>').trim().strip_prefix("Task ")?;
        let (id, tail) = rest.split_once(' ')?;
        tail.trim().eq_ignore_ascii_case("not found").then(|| id.parse().ok())?
    })
}
