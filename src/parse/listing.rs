//! `list` output parsing and id discovery.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::model::{Task, TaskId};
use crate::parse::record::parse_record;

/// Separator line closing a listing block.
pub const BLOCK_SEPARATOR: &str = "----------";

static ID_LINE_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*>?\s*ID:\s*(\d+)").ok());
static ADDED_ID_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"Task added with ID:\s*(\d+)").ok());

/// How `list_tasks` turns a listing into records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingStrategy {
    /// Collect ids from the listing, then `view` each one.
    #[default]
    IdScan,
    /// Parse the listing's own blocks in a single round trip.
    Blocks,
}

/// Extracts every task id mentioned on an `ID:` line, in order, without
/// duplicates.
#[must_use]
pub fn extract_ids(text: &str) -> Vec<TaskId> {
    let Some(re) = ID_LINE_RE.as_ref() else {
        return Vec::new();
    };
    let mut ids: Vec<TaskId> = Vec::new();
    for caps in re.captures_iter(text) {
        if let Some(id) = caps.get(1).and_then(|m| m.as_str().parse().ok()) {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
    }
    ids
}

/// Parses listing blocks: `ID:` opens a record, the separator closes it.
///
/// Blocks that fail to parse are skipped.
#[must_use]
pub fn parse_blocks(text: &str) -> Vec<Task> {
    let mut tasks = Vec::new();
    let mut current: Option<String> = None;

    for line in text.lines() {
        let trimmed = line.trim().trim_start_matches('>').trim();
        if trimmed.starts_with("ID:") {
            flush(&mut current, &mut tasks);
            current = Some(String::new());
        } else if trimmed == BLOCK_SEPARATOR {
            flush(&mut current, &mut tasks);
            continue;
        }
        if let Some(block) = current.as_mut() {
            if !trimmed.is_empty() {
                block.push_str(line.trim_end());
                block.push('\n');
            }
        }
    }
    flush(&mut current, &mut tasks);
    tasks
}

fn flush(current: &mut Option<String>, tasks: &mut Vec<Task>) {
    if let Some(block) = current.take() {
        match parse_record(&block) {
            Ok(task) => tasks.push(task),
            Err(err) => debug!(error = %err, "skipping unparsable listing block"),
        }
    }
}

/// Reads the id from `Task added with ID: N`.
#[must_use]
pub fn parse_added_id(text: &str) -> Option<TaskId> {
    ADDED_ID_RE
        .as_ref()?
        .captures(text)?
        .get(1)?
        .as_str()
        .parse()
        .ok()
}

/// Returns true if the scheduler reported an empty task table.
#[must_use]
pub fn is_empty_listing(text: &str) -> bool {
    text.contains("No tasks found")
}
