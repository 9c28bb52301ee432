//! Script body extraction from `view` output.
//!
//! The body is printed raw after a `Script:` line, so it can contain anything,
//! including lines that look like fields. It ends at the first label the
//! scheduler prints after it.

use crate::parse::fields::split_field;

/// Marker line opening a script body.
pub const SCRIPT_MARKER: &str = "Script:";

/// Labels that may follow a script body, in print order.
pub const FOLLOWING_LABELS: &[&str] = &[
    "Schedule:",
    "Working Directory:",
    "Max Runtime:",
    "Created:",
    "Last Run:",
    "Next Run:",
    "Exit Code:",
    "Dependencies:",
    "Dependency Behavior:",
];

/// Bodies shorter than this are treated as a failed substring search.
const MIN_PLAUSIBLE_LEN: usize = 5;

/// Extracts the script body from detail output, if there is one.
#[must_use]
pub fn extract_script(text: &str) -> Option<String> {
    let text = text.replace("\r\n", "\n");
    let body = extract_by_labels(&text).filter(|body| body.len() >= MIN_PLAUSIBLE_LEN);
    body.or_else(|| extract_by_lines(&text))
}

/// Substring strategy: from the marker to the earliest following label.
fn extract_by_labels(text: &str) -> Option<String> {
    let start = find_marker(text)? + SCRIPT_MARKER.len();
    let rest = text.get(start..)?;
    let end = FOLLOWING_LABELS
        .iter()
        .filter_map(|label| rest.find(&format!("\n{label}")))
        .min()
        .unwrap_or(rest.len());

    let body = rest.get(..end)?.trim_start_matches([' ', '\t']);
    let body = body.strip_prefix('\n').unwrap_or(body);
    let body = skip_blank_lines(body).trim_end();
    Some(body.to_string())
}

/// Line-scanning fallback: take lines after a marker line until a label.
fn extract_by_lines(text: &str) -> Option<String> {
    let mut lines = text.lines().skip_while(|line| line.trim() != SCRIPT_MARKER);
    lines.next()?;

    let collected: Vec<&str> = lines
        .skip_while(|line| line.trim().is_empty())
        .take_while(|line| !is_following_label(line))
        .collect();
    let body = collected.join("\n");
    let body = body.trim_end();
    if body.is_empty() {
        None
    } else {
        Some(body.to_string())
    }
}

/// Finds `Script:` at the start of a line, not `Script size:` or `Type: Script`.
fn find_marker(text: &str) -> Option<usize> {
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        let trimmed = line.trim_start();
        if trimmed.starts_with(SCRIPT_MARKER) {
            return Some(offset + (line.len() - trimmed.len()));
        }
        offset += line.len();
    }
    None
}

fn skip_blank_lines(body: &str) -> &str {
    let mut rest = body;
    while let Some((first, tail)) = rest.split_once('\n') {
        if first.trim().is_empty() {
            rest = tail;
        } else {
            break;
        }
    }
    rest
}

/// Returns true if `line` begins with one of the labels that close a body.
#[must_use]
pub fn is_following_label(line: &str) -> bool {
    let trimmed = line.trim_start();
    FOLLOWING_LABELS.iter().any(|label| trimmed.starts_with(label))
        && split_field(trimmed).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    const VIEW: &str = "Task Details:\nID: 4\nName: cleanup\nEnabled: Yes\nType: Script\nScript:\n\n#!/bin/bash\nfind /tmp -mtime +7 -delete\necho \"Name: done\"\nSchedule: Every 60 minutes\nWorking Directory: (default)\nMax Runtime: 0 seconds\n";

    /// Tests the main substring strategy.
    #[test]
    fn extracts_body_up_to_next_label() {
        assert_eq!(
            extract_script(VIEW).as_deref(),
            Some("#!/bin/bash\nfind /tmp -mtime +7 -delete\necho \"Name: done\"")
        );
    }

    /// Tests that the earliest label ends the body even when out of order.
    #[test]
    fn earliest_label_wins() {
        let text = "Script:\necho hi there\nCreated: 2024-01-01 00:00:00\nSchedule: Manual\n";
        assert_eq!(extract_script(text).as_deref(), Some("echo hi there"));
    }

    /// Tests that a body running to the end of the text is kept whole.
    #[test]
    fn body_may_run_to_end() {
        let text = "Script:\n#!/bin/sh\nuptime\n";
        assert_eq!(extract_script(text).as_deref(), Some("#!/bin/sh\nuptime"));
    }

    /// Tests CRLF output from the pseudo-terminal.
    #[test]
    fn handles_crlf() {
        let text = "Script:\r\n#!/bin/sh\r\nuptime\r\nSchedule: Manual\r\n";
        assert_eq!(extract_script(text).as_deref(), Some("#!/bin/sh\nuptime"));
    }

    /// Tests that `Script size:` in listings is not taken for a body.
    #[test]
    fn ignores_script_size_lines() {
        assert_eq!(extract_script("Type: Script\nScript size: 120 bytes\n"), None);
        assert_eq!(extract_script("Type: Command\nCommand: ls\n"), None);
    }

    /// Tests the line-scanning fallback on a very short first match.
    #[test]
    fn falls_back_to_line_scan() {
        let text = "Script:\nls\nSchedule: Manual\n";
        assert_eq!(extract_script(text).as_deref(), Some("ls"));
    }
}
