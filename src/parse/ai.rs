//! Extraction of task proposals from free-form AI generator output.
//!
//! The generator's text varies between runs. Content is located by the first
//! strategy that yields anything: a delimiter-bracketed block, a known lead-in
//! sentence, then a bare shebang scan. Metadata fields are searched for
//! independently.

use std::sync::LazyLock;

use regex::Regex;

use crate::core::commands::CONFIRMATION_PROMPT;
use crate::core::model::{AiGeneration, GeneratedKind};

/// Minimum length of the rule line bracketing generated content.
const MIN_DELIMITER_LEN: usize = 20;

const SCRIPT_LEAD_IN: &str = "AI has generated a script based on your description:";
const COMMAND_LEAD_IN: &str = "AI has generated a command based on your description:";
const SUMMARY_MARKER: &str = "AI generated task:";

/// Texts the generator prints when it could not produce a task.
pub const FAILURE_MARKERS: &[&str] = &[
    "Failed to parse complete task JSON",
    "Could not generate task from description.",
];

/// Interval assumed when no cron expression is proposed.
pub const DEFAULT_INTERVAL_MINUTES: u32 = 60;

const DEFAULT_SCHEDULE_DESCRIPTION: &str = "Runs on the default schedule";

static SUMMARY_CRON_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"Schedule:\s*([0-9*/,\- ]+?)\s*(?:,|$)").ok());
static SUMMARY_NAME_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"Name:\s*([\w-]+)").ok());
static DAILY_CRON_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^\d+\s+\d+\s+\*\s+\*\s+\*$").ok());
static GENERATED_COMMAND_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"Command:\s*`(.+?)`").ok());

/// Returns true if the output carries one of the generator's failure texts.
#[must_use]
pub fn is_generation_failure(text: &str) -> bool {
    FAILURE_MARKERS.iter().any(|marker| text.contains(marker))
}

/// Builds an [`AiGeneration`] from `ai-create` output.
///
/// `description` is the natural-language request, used to synthesize a name
/// when the output proposes none. `success` is false when no content could
/// be found or the generator reported a failure.
#[must_use]
pub fn extract_generation(text: &str, description: &str) -> AiGeneration {
    let raw = text.to_string();
    let normalized = text.replace("\r\n", "\n");
    let output = normalized
        .split(CONFIRMATION_PROMPT)
        .next()
        .unwrap_or_default()
        .trim();

    let mut kind = if output.contains(SCRIPT_LEAD_IN) {
        GeneratedKind::Script
    } else {
        GeneratedKind::Command
    };
    let mut cron = None;
    let mut name = None;

    if let Some(summary) = output.lines().find(|line| line.contains(SUMMARY_MARKER)) {
        let summary = summary.split(SUMMARY_MARKER).nth(1).unwrap_or_default();
        if summary.contains("Script") {
            kind = GeneratedKind::Script;
        }
        cron = capture(&SUMMARY_CRON_RE, summary).filter(|c| !c.is_empty());
        name = capture(&SUMMARY_NAME_RE, summary);
    }

    let content = if is_generation_failure(output) {
        None
    } else {
        between_delimiters(output)
            .or_else(|| after_lead_in(output, kind))
            .or_else(|| from_shebang(output))
    };

    let mut schedule_description = labelled(output, "Schedule:")
        .unwrap_or_else(|| DEFAULT_SCHEDULE_DESCRIPTION.to_string());
    if cron.is_none() {
        cron = labelled(output, "Cron Expression:").filter(|c| !c.is_empty());
    }
    if let Some(hour) = cron.as_deref().and_then(daily_hour) {
        schedule_description = format!("Runs daily at hour {hour}");
    }

    let suggested_name = name
        .or_else(|| labelled(output, "Suggested Name:"))
        .or_else(|| loose_name(output))
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| synthesize_name(description));

    let interval_minutes = cron.is_none().then_some(DEFAULT_INTERVAL_MINUTES);
    let content = content.unwrap_or_default();

    AiGeneration {
        success: !content.is_empty(),
        content,
        kind,
        schedule_description,
        cron,
        interval_minutes,
        suggested_name,
        raw,
    }
}

/// Reads the command proposed by `ai-generate`.
#[must_use]
pub fn parse_generated_command(text: &str) -> Option<String> {
    capture(&GENERATED_COMMAND_RE, text).filter(|c| !c.is_empty())
}

/// Deterministic fallback name: `task_` plus the first three words.
#[must_use]
pub fn synthesize_name(description: &str) -> String {
    let joined = description
        .split_whitespace()
        .take(3)
        .collect::<Vec<_>>()
        .join("_")
        .to_lowercase();
    let safe: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .take(30)
        .collect();
    format!("task_{safe}")
}

fn capture(re: &LazyLock<Option<Regex>>, text: &str) -> Option<String> {
    let caps = re.as_ref()?.captures(text)?;
    Some(caps.get(1)?.as_str().trim().to_string())
}

fn is_delimiter(line: &str) -> bool {
    let line = line.trim();
    line.len() >= MIN_DELIMITER_LEN && line.chars().all(|c| c == '-')
}

/// Strategy 1: text between exactly two rule lines.
fn between_delimiters(output: &str) -> Option<String> {
    let lines: Vec<&str> = output.lines().collect();
    let positions: Vec<usize> = lines
        .iter()
        .enumerate()
        .filter(|(_, line)| is_delimiter(line))
        .map(|(i, _)| i)
        .collect();
    let [open, close] = positions.as_slice() else {
        return None;
    };
    let content = lines.get(open + 1..*close)?.join("\n");
    non_empty(content.trim())
}

/// Strategy 2: text after the lead-in sentence up to the next field label.
fn after_lead_in(output: &str, kind: GeneratedKind) -> Option<String> {
    let lead_in = match kind {
        GeneratedKind::Script => SCRIPT_LEAD_IN,
        GeneratedKind::Command => COMMAND_LEAD_IN,
    };
    let section = output.split_once(lead_in)?.1.trim();
    let section = ["Schedule:", "Cron Expression:"]
        .iter()
        .find_map(|label| section.split_once(label).map(|(head, _)| head))
        .or_else(|| section.split_once("\n\n").map(|(head, _)| head))
        .unwrap_or(section);
    let cleaned: Vec<&str> = section.lines().filter(|line| !is_delimiter(line)).collect();
    non_empty(cleaned.join("\n").trim())
}

/// Strategy 3: from a shebang line to a blank pair, rule line or label.
fn from_shebang(output: &str) -> Option<String> {
    let lines: Vec<&str> = output.lines().collect();
    let start = lines.iter().position(|line| {
        let line = line.trim();
        line.starts_with("#!/bin/bash") || line.starts_with("#!/usr/bin/env")
    })?;

    let mut end = lines.len();
    for i in start + 1..lines.len() {
        let blank_pair = lines[i].trim().is_empty()
            && lines.get(i + 1).is_some_and(|next| next.trim().is_empty());
        let label = is_delimiter(lines[i])
            || lines[i].contains("Schedule:")
            || lines[i].contains("Cron Expression:");
        if blank_pair || label {
            end = i;
            break;
        }
    }
    non_empty(lines[start..end].join("\n").trim())
}

/// Value of the first line starting with `label`.
fn labelled(output: &str, label: &str) -> Option<String> {
    output.lines().find_map(|line| {
        line.trim()
            .strip_prefix(label)
            .map(|value| value.trim().to_string())
    })
}

/// First word after a `Name:` on a line that is not a lead-in.
fn loose_name(output: &str) -> Option<String> {
    output
        .lines()
        .filter(|line| !line.contains("AI has generated"))
        .find_map(|line| line.split_once("Name:"))
        .and_then(|(_, rest)| rest.split_whitespace().next())
        .map(str::to_string)
}

/// Hour of a `M H * * *` cron expression.
fn daily_hour(cron: &str) -> Option<u32> {
    if !DAILY_CRON_RE.as_ref()?.is_match(cron.trim()) {
        return None;
    }
    cron.split_whitespace().nth(1)?.parse().ok()
}

fn non_empty(text: &str) -> Option<String> {
    (!text.is_empty()).then(|| text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const RULE: &str = "-----------------------------------------------------------";

    mod content {
        use super::*;

        /// Tests the delimiter-bracketed block.
        #[test]
        fn takes_text_between_delimiters() {
            let text = format!(
                "ai-create \"disk check\"\r\nAI has generated a command based on your description:\r\n{RULE}\r\n\
                 df -h | grep -v tmpfs\r\n{RULE}\r\nSchedule: Every hour\r\nSuggested Name: disk_check\r\n\
                 {CONFIRMATION_PROMPT} "
            );

            let generation = extract_generation(&text, "disk check");

            assert!(generation.success);
            assert_eq!(generation.content, "df -h | grep -v tmpfs");
            assert_eq!(generation.kind, GeneratedKind::Command);
            assert_eq!(generation.schedule_description, "Every hour");
            assert_eq!(generation.suggested_name, "disk_check");
            assert_eq!(generation.interval_minutes, Some(DEFAULT_INTERVAL_MINUTES));
            assert_eq!(generation.cron, None);
        }

        /// Tests the lead-in fallback when there is no rule pair.
        #[test]
        fn falls_back_to_lead_in() {
            let text = "AI has generated a script based on your description:\n#!/bin/bash\nrsync -a /home /backup\n\
                        Cron Expression: 0 3 * * *\n";

            let generation = extract_generation(text, "backup home");

            assert!(generation.success);
            assert_eq!(generation.kind, GeneratedKind::Script);
            assert_eq!(generation.content, "#!/bin/bash\nrsync -a /home /backup");
            assert_eq!(generation.cron.as_deref(), Some("0 3 * * *"));
            assert_eq!(generation.schedule_description, "Runs daily at hour 3");
            assert_eq!(generation.interval_minutes, None);
        }

        /// Tests the shebang scan as last resort.
        #[test]
        fn falls_back_to_shebang() {
            let text = "thinking...\n#!/usr/bin/env bash\necho hi\n\n\ntrailing noise\n";

            let generation = extract_generation(text, "say hi");

            assert_eq!(generation.content, "#!/usr/bin/env bash\necho hi");
        }

        /// Tests that a single rule line does not count as a pair.
        #[test]
        fn single_delimiter_is_not_a_block() {
            assert_eq!(between_delimiters(&format!("{RULE}\nls\n")), None);
        }

        /// Tests that nothing usable means failure.
        #[test]
        fn no_content_is_failure() {
            let generation = extract_generation("Thinking...\n", "anything");
            assert!(!generation.success);
            assert!(generation.content.is_empty());
        }

        /// Tests the generator's own failure texts.
        #[test]
        fn failure_markers_are_failures() {
            let text = format!("[ERROR] Failed to parse complete task JSON\n{RULE}\nls\n{RULE}\n");
            assert!(is_generation_failure(&text));
            assert!(!extract_generation(&text, "x").success);
        }
    }

    mod metadata {
        use super::*;

        /// Tests the one-line summary.
        #[test]
        fn reads_summary_line() {
            let text = format!(
                "AI generated task: Script, Schedule: 0 2 * * *, Name: daily_www_backup\n{RULE}\n\
                 #!/bin/bash\ntar czf /backup/www.tgz /var/www\n{RULE}\n"
            );

            let generation = extract_generation(&text, "backup www");

            assert_eq!(generation.kind, GeneratedKind::Script);
            assert_eq!(generation.cron.as_deref(), Some("0 2 * * *"));
            assert_eq!(generation.suggested_name, "daily_www_backup");
            assert_eq!(generation.schedule_description, "Runs daily at hour 2");
        }

        /// Tests name synthesis from the request.
        #[test]
        fn synthesizes_name_from_description() {
            assert_eq!(synthesize_name("Check Disk usage every hour"), "task_check_disk_usage");
            assert_eq!(synthesize_name("ping!"), "task_ping");
            assert_eq!(synthesize_name(&"a".repeat(50)).len(), "task_".len() + 30);
        }

        /// Tests that non-daily cron keeps the printed description.
        #[test]
        fn weekly_cron_is_not_daily() {
            assert_eq!(daily_hour("0 9 * * 1"), None);
            assert_eq!(daily_hour("15 7 * * *"), Some(7));
        }

        /// Tests `ai-generate` output.
        #[test]
        fn reads_generated_command() {
            assert_eq!(
                parse_generated_command("Command: `find /tmp -mtime +7 -delete`\n").as_deref(),
                Some("find /tmp -mtime +7 -delete")
            );
            assert_eq!(parse_generated_command("Command: none\n"), None);
        }
    }
}
