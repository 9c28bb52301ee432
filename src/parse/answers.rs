//! Acknowledgements printed by mutating and informational commands.

use serde::{Deserialize, Serialize};

/// What `view-api-key` reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ApiKeyStatus {
    /// A key is set; the scheduler prints it masked.
    Configured { masked: Option<String> },
    /// No key is set.
    Missing,
}

/// Returns true if `remove` deleted the task or it was already gone.
#[must_use]
pub fn is_removed(text: &str) -> bool {
    text.contains("removed")
        || text.contains("Task successfully removed")
        || is_absent(text)
}

/// Returns true if the scheduler says the task does not exist.
#[must_use]
pub fn is_absent(text: &str) -> bool {
    text.contains("does not exist") || text.contains("not found")
}

/// Returns true once `run` has started the task.
#[must_use]
pub fn is_run_started(text: &str) -> bool {
    (text.contains("Running task") || text.contains("Executing task"))
        && !text.contains("Failed to execute")
}

#[must_use]
pub fn is_dependency_added(text: &str) -> bool {
    text.contains("Added dependency")
}

#[must_use]
pub fn is_dependency_removed(text: &str) -> bool {
    text.contains("Removed dependency")
}

#[must_use]
pub fn is_policy_updated(text: &str) -> bool {
    text.contains("dependency behavior updated")
}

/// Returns true if `edit`, `enable`, `disable` or a conversion took effect.
#[must_use]
pub fn is_task_changed(text: &str) -> bool {
    !text.contains("Failed to")
        && !text.contains("Cannot ")
        && !text.contains("Invalid ")
        && !is_absent(text)
}

#[must_use]
pub fn is_api_key_saved(text: &str) -> bool {
    text.contains("updated successfully") || text.contains("saved successfully")
}

/// Parses `view-api-key` output.
#[must_use]
pub fn parse_api_key_status(text: &str) -> ApiKeyStatus {
    if let Some(masked) = text
        .lines()
        .find_map(|line| line.trim().split_once("Current API key:"))
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
    {
        return ApiKeyStatus::Configured {
            masked: Some(masked),
        };
    }
    if text.contains("API key is configured and ready") {
        return ApiKeyStatus::Configured { masked: None };
    }
    ApiKeyStatus::Missing
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Tests removal acknowledgements, including already-gone tasks.
    #[test]
    fn removal_markers() {
        assert!(is_removed("Task 3 removed\r\n> "));
        assert!(is_removed("Task 3 does not exist\r\n"));
        assert!(!is_removed("Failed to remove task 3\r\n"));
    }

    /// Tests run acknowledgements.
    #[test]
    fn run_markers() {
        assert!(is_run_started("Running task 2...\r\n"));
        assert!(is_run_started("Executing task 2\r\n"));
        assert!(!is_run_started("Running task 2...\r\nFailed to execute task 2\r\n"));
    }

    /// Tests mutation acknowledgements.
    #[test]
    fn change_markers() {
        assert!(is_task_changed("Task 4 updated\r\n> "));
        assert!(!is_task_changed("Cannot set command for script-mode task.\r\n"));
        assert!(!is_task_changed("Task 4 not found\r\n"));
        assert!(is_dependency_added("Added dependency: Task 2 now depends on Task 1"));
        assert!(is_dependency_removed("Removed dependency: Task 2 no longer depends on Task 1"));
        assert!(is_policy_updated("Task 2 dependency behavior updated"));
    }

    /// Tests the three API key answers.
    #[test]
    fn api_key_status() {
        assert_eq!(
            parse_api_key_status("Current API key: sk-1...abcd\r\n> "),
            ApiKeyStatus::Configured {
                masked: Some("sk-1...abcd".to_string())
            }
        );
        assert_eq!(
            parse_api_key_status("API key is configured and ready to use.\r\n"),
            ApiKeyStatus::Configured { masked: None }
        );
        assert_eq!(parse_api_key_status("No API key configured\r\n"), ApiKeyStatus::Missing);
        assert!(is_api_key_saved("API key updated successfully"));
    }
}
