//! Scheduler console vocabulary.
//!
//! Builds command lines the way the scheduler's own argument splitter expects
//! them (`"` or `'` quoting, no escapes, empty tokens dropped) and classifies each line into a [`CommandKind`] that selects deadline,
//! completion markers and confirmation handling in the channel.

use std::fmt;
use std::time::Duration;

use crate::core::channel::ChannelTimings;
use crate::core::error::{BridgeError, BridgeResult};
use crate::core::model::TaskId;

/// Interactive confirmation printed before a task is created.
pub const CONFIRMATION_PROMPT: &str = "Do you want to create this task? (y/n):";

/// Affirmative answer to [`CONFIRMATION_PROMPT`].
pub const CONFIRMATION_ANSWER: &str = "y";

/// Family of a command, used as the read loop's hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommandKind {
    /// Short mutating or informational command.
    #[default]
    Generic,
    /// `list`.
    List,
    /// `view <id>`.
    View,
    /// `run <id>`; acknowledged before the task finishes.
    Run,
    /// `add ...`; may ask for confirmation.
    Add,
    /// `ai-create <description>`; slow, may ask for confirmation.
    AiCreate,
    /// `ai-generate <goal> <metrics>`; slow.
    AiGenerate,
}

impl CommandKind {
    /// Infers the kind from the verb of a raw command line.
    #[must_use]
    pub fn infer(line: &str) -> Self {
        match line.split_whitespace().next().unwrap_or_default() {
            "list" => Self::List,
            "view" => Self::View,
            "run" => Self::Run,
            "add" => Self::Add,
            "ai-create" => Self::AiCreate,
            "ai-generate" => Self::AiGenerate,
            _ => Self::Generic,
        }
    }

    /// Overall read deadline for this kind.
    #[must_use]
    pub fn deadline(&self, timings: &ChannelTimings) -> Duration {
        let ms = match self {
            Self::Generic | Self::List | Self::Add => timings.baseline_deadline_ms,
            Self::View => timings.view_deadline_ms,
            Self::Run => timings.run_deadline_ms,
            Self::AiCreate | Self::AiGenerate => timings.ai_deadline_ms,
        };
        Duration::from_millis(ms)
    }

    /// Kind-specific markers that end the read loop early.
    ///
    /// Matched case-insensitively.
    #[must_use]
    pub const fn completion_markers(&self) -> &'static [&'static str] {
        match self {
            Self::Run => &["executing task"],
            Self::AiCreate => &["suggested name:", "task created", "task added with id:", "done"],
            Self::AiGenerate => &["command: `", "suggested name:", "done"],
            Self::Generic | Self::List | Self::View | Self::Add => &[],
        }
    }

    /// Returns true if the scheduler may stop to ask for a yes/no answer.
    #[must_use]
    pub const fn expects_confirmation(&self) -> bool {
        matches!(self, Self::Add | Self::AiCreate)
    }
}

/// A command line plus its kind hint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    line: String,
    kind: CommandKind,
    /// Rendering with secrets masked, present once a secret was appended.
    redacted: Option<String>,
}

impl CommandLine {
    /// Starts a command with the given verb.
    #[must_use]
    pub fn new(verb: &str) -> Self {
        Self {
            line: verb.to_string(),
            kind: CommandKind::infer(verb),
            redacted: None,
        }
    }

    /// Appends a user-supplied value as exactly one console argument.
    ///
    /// The value is wrapped in `"`, or in `'` when it contains `"`.
    ///
    /// # Errors
    ///
    /// [`BridgeError::InvalidInput`] for values the console cannot receive
    /// intact: empty, multi-line, or holding both quote characters.
    pub fn quoted(mut self, value: impl AsRef<str>) -> BridgeResult<Self> {
        let rendered = quote_arg(value.as_ref())?;
        self.push(&rendered);
        Ok(self)
    }

    /// Appends an argument exactly as given.
    #[must_use]
    pub fn verbatim(mut self, value: impl AsRef<str>) -> Self {
        self.push(value.as_ref());
        self
    }

    /// Appends a secret verbatim; logs only ever see it masked.
    #[must_use]
    pub fn secret(mut self, value: impl AsRef<str>) -> Self {
        let value = value.as_ref();
        let mut redacted = self.redacted.take().unwrap_or_else(|| self.line.clone());
        redacted.push(' ');
        redacted.push_str(&mask_secret(value));
        self.line.push(' ');
        self.line.push_str(value);
        self.redacted = Some(redacted);
        self
    }

    fn push(&mut self, rendered: &str) {
        self.line.push(' ');
        self.line.push_str(rendered);
        if let Some(redacted) = self.redacted.as_mut() {
            redacted.push(' ');
            redacted.push_str(rendered);
        }
    }

    /// Appends a task id.
    #[must_use]
    pub fn id(self, id: TaskId) -> Self {
        self.verbatim(id.to_string())
    }

    /// Returns the rendered line without terminator.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.line
    }

    /// Returns the line as it may appear in logs.
    #[must_use]
    pub fn redacted(&self) -> &str {
        self.redacted.as_deref().unwrap_or(&self.line)
    }

    /// Returns the kind hint.
    #[must_use]
    pub const fn kind(&self) -> CommandKind {
        self.kind
    }
}

/// Displays the redacted form.
impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.redacted())
    }
}

fn quote_arg(value: &str) -> BridgeResult<String> {
    if value.is_empty() {
        return Err(BridgeError::InvalidInput(
            "console arguments must not be empty".to_string(),
        ));
    }
    if value.contains(['\n', '\r']) {
        return Err(BridgeError::InvalidInput(format!(
            "`{}` spans several lines",
            value.lines().next().unwrap_or_default()
        )));
    }
    match (value.contains('"'), value.contains('\'')) {
        (false, _) => Ok(format!("\"{value}\"")),
        (true, false) => Ok(format!("'{value}'")),
        (true, true) => Err(BridgeError::InvalidInput(format!(
            "`{value}` holds both quote characters"
        ))),
    }
}

/// Masks a secret for logs, keeping only its first and last four characters.
#[must_use]
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}
