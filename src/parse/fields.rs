//! Typed extraction of individual `Key: Value` fields.

use std::sync::LazyLock;

use chrono::{Local, NaiveDateTime, TimeZone};
use regex::Regex;

use crate::core::model::{DependencyPolicy, ExecutionKind, Schedule, TaskId};

/// Timestamp layout printed by the scheduler, in local time.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Values that mean "no timestamp".
const TIMESTAMP_SENTINELS: &[&str] = &[
    "Never",
    "Never run before",
    "Not scheduled",
    "N/A",
    "Unknown",
    "None",
];

static INTERVAL_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)every\s+(\d+)\s+minutes?").ok());
static SECONDS_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(\d+)\s*seconds?").ok());
static EXIT_CODE_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\(Exit Code:\s*(-?\d+)\)").ok());

/// Splits a line into a normalized key and a trimmed value.
///
/// Keys are lower-cased with spaces replaced by underscores, so
/// `Working Directory` becomes `working_directory`. Lines without a colon, or
/// whose would-be key is empty or overly long, are not fields.
#[must_use]
pub fn split_field(line: &str) -> Option<(String, &str)> {
    let line = line.trim().trim_start_matches('>').trim_start();
    let (key, value) = line.split_once(':')?;
    let key = key.trim();
    if key.is_empty() || key.len() > 40 {
        return None;
    }
    Some((normalize_key(key), value.trim()))
}

/// Lower-cases a label and replaces spaces with underscores.
#[must_use]
pub fn normalize_key(key: &str) -> String {
    key.trim().to_lowercase().replace(' ', "_")
}

/// Parses a yes/no style flag.
#[must_use]
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "yes" | "true" | "1" | "enabled" => Some(true),
        "no" | "false" | "0" | "disabled" => Some(false),
        _ => None,
    }
}

/// Parses a task id, ignoring trailing text.
#[must_use]
pub fn parse_id(value: &str) -> Option<TaskId> {
    value.split_whitespace().next()?.parse().ok()
}

/// Converts a printed local timestamp to epoch seconds.
///
/// Sentinels and anything unparsable map to `0`.
#[must_use]
pub fn parse_timestamp(value: &str) -> i64 {
    let value = value.trim();
    if value.is_empty() || TIMESTAMP_SENTINELS.contains(&value) {
        return 0;
    }
    // `Last Run` may carry a trailing "(Exit Code: n)".
    let stamp = value.get(..19).unwrap_or(value);
    NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT)
        .ok()
        .and_then(|naive| Local.from_local_datetime(&naive).earliest())
        .map_or(0, |dt| dt.timestamp())
}

/// Renders epoch seconds the way the scheduler prints them.
#[cfg(test)]
#[must_use]
pub fn format_timestamp(epoch: i64) -> Option<String> {
    if epoch <= 0 {
        return None;
    }
    Local
        .timestamp_opt(epoch, 0)
        .single()
        .map(|dt| dt.format(TIMESTAMP_FORMAT).to_string())
}

/// Pulls an exit code out of `... (Exit Code: n)`.
#[must_use]
pub fn parse_inline_exit_code(value: &str) -> Option<i32> {
    EXIT_CODE_RE
        .as_ref()?
        .captures(value)?
        .get(1)?
        .as_str()
        .parse()
        .ok()
}

/// Parses a schedule value.
///
/// Cron is checked first: `Cron: 0 */2 * * *` would otherwise be open to
/// misreading by the looser interval pattern.
#[must_use]
pub fn parse_schedule(value: &str) -> Schedule {
    let value = value.trim();
    if let Some(expression) = value.strip_prefix("Cron:") {
        let expression = expression.trim();
        if !expression.is_empty() {
            return Schedule::Cron {
                expression: expression.to_string(),
            };
        }
    }
    if let Some(minutes) = INTERVAL_RE
        .as_ref()
        .and_then(|re| re.captures(value))
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<u64>().ok())
    {
        return Schedule::every_minutes(minutes);
    }
    Schedule::Manual
}

/// Parses a `Type:` / `Execution Mode:` label.
#[must_use]
pub fn parse_execution_kind(value: &str) -> Option<ExecutionKind> {
    let lower = value.trim().to_ascii_lowercase();
    if lower.starts_with("ai") {
        Some(ExecutionKind::AiDynamic)
    } else if lower.starts_with("script") {
        Some(ExecutionKind::Script)
    } else if lower.starts_with("command") {
        Some(ExecutionKind::Command)
    } else {
        None
    }
}

/// Parses a dependency policy label.
#[must_use]
pub fn parse_policy(value: &str) -> Option<DependencyPolicy> {
    let lower = value.trim().to_ascii_lowercase();
    let all = lower.starts_with("all");
    let any = lower.starts_with("any");
    let success = lower.contains("success");
    let complete = lower.contains("complet");
    match (any, all, success, complete) {
        (true, _, true, _) => Some(DependencyPolicy::AnySuccess),
        (_, true, true, _) => Some(DependencyPolicy::AllSuccess),
        (true, _, _, true) => Some(DependencyPolicy::AnyComplete),
        (_, true, _, true) => Some(DependencyPolicy::AllComplete),
        _ => value.trim().parse().ok().and_then(DependencyPolicy::from_code),
    }
}

/// Parses a comma or space separated id list, skipping junk entries.
#[must_use]
pub fn parse_id_list(value: &str) -> Vec<TaskId> {
    value
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter_map(|part| part.trim().parse().ok())
        .collect()
}

/// Parses a working directory; the default placeholders map to `None`.
#[must_use]
pub fn parse_working_dir(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() || value.eq_ignore_ascii_case("(default)") || value.eq_ignore_ascii_case("default") {
        None
    } else {
        Some(value.to_string())
    }
}

/// Parses `N seconds (...)`; anything else is `0`.
#[must_use]
pub fn parse_max_runtime(value: &str) -> u32 {
    SECONDS_RE
        .as_ref()
        .and_then(|re| re.captures(value))
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .or_else(|| value.trim().parse().ok())
        .unwrap_or(0)
}

/// Splits a metrics list.
#[must_use]
pub fn parse_metrics(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
        .collect()
}
