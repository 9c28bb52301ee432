//! Serialized request/response exchange over the scheduler console.
//!
//! The console has no response terminator, so each command is framed
//! heuristically: a kind-specific marker, the trailing `>` prompt, or a quiet
//! period after some output ends the read. A command that produces nothing
//! beyond its own echo triggers one session restart and a single resend.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};

use crate::core::clock::Clock;
use crate::core::commands::{CONFIRMATION_ANSWER, CONFIRMATION_PROMPT, CommandKind, CommandLine};
use crate::core::model::{CommandOutcome, OutcomeStatus};
use crate::core::retry::RetryPolicy;
use crate::core::supervisor::SessionSupervisor;
use crate::core::transport::{ReadEvent, Transport};
use crate::parse::parse_record;
use crate::parse::script::{SCRIPT_MARKER, is_following_label};

/// Timing knobs for the read loop, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelTimings {
    /// Upper bound of a single read wait.
    pub poll_slice_ms: u64,
    /// Silence after output that counts as completion.
    pub quiescence_ms: u64,
    pub baseline_deadline_ms: u64,
    pub view_deadline_ms: u64,
    pub run_deadline_ms: u64,
    pub ai_deadline_ms: u64,
    /// One last read after the loop, to catch trailing bytes.
    pub final_read_ms: u64,
    /// Minimum time a fresh process must stay up to count as started.
    pub startup_grace_ms: u64,
    /// Maximum time spent discarding the startup banner.
    pub startup_drain_ms: u64,
    /// Deadline extension granted after answering a confirmation prompt.
    pub confirmation_extension_ms: u64,
}

impl Default for ChannelTimings {
    fn default() -> Self {
        Self {
            poll_slice_ms: 100,
            quiescence_ms: 3_000,
            baseline_deadline_ms: 5_000,
            view_deadline_ms: 15_000,
            run_deadline_ms: 20_000,
            ai_deadline_ms: 45_000,
            final_read_ms: 500,
            startup_grace_ms: 1_000,
            startup_drain_ms: 2_000,
            confirmation_extension_ms: 5_000,
        }
    }
}

impl ChannelTimings {
    #[must_use]
    pub const fn poll_slice(&self) -> Duration {
        Duration::from_millis(self.poll_slice_ms)
    }

    #[must_use]
    pub const fn quiescence(&self) -> Duration {
        Duration::from_millis(self.quiescence_ms)
    }

    #[must_use]
    pub const fn final_read(&self) -> Duration {
        Duration::from_millis(self.final_read_ms)
    }

    #[must_use]
    pub const fn startup_grace(&self) -> Duration {
        Duration::from_millis(self.startup_grace_ms)
    }

    #[must_use]
    pub const fn startup_drain(&self) -> Duration {
        Duration::from_millis(self.startup_drain_ms)
    }

    #[must_use]
    pub const fn confirmation_extension(&self) -> Duration {
        Duration::from_millis(self.confirmation_extension_ms)
    }
}

/// Why a read loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Marker(&'static str),
    Prompt,
    Quiescent,
    Deadline,
    Closed,
}

/// Text captured for one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    pub text: String,
    pub completion: Completion,
}

/// Single-flight command channel over a supervised session.
///
/// The lock is held for the whole write-read cycle, including any restart.
#[derive(Debug)]
pub struct CommandChannel {
    supervisor: Mutex<SessionSupervisor>,
    clock: Arc<dyn Clock>,
    timings: ChannelTimings,
    retry: RetryPolicy,
}

impl CommandChannel {
    #[must_use]
    pub fn new(
        supervisor: SessionSupervisor,
        clock: Arc<dyn Clock>,
        timings: ChannelTimings,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            supervisor: Mutex::new(supervisor),
            clock,
            timings,
            retry,
        }
    }

    /// Sends a built command line. Logs carry its redacted form.
    pub async fn send(&self, command: &CommandLine) -> CommandOutcome {
        self.dispatch(command.as_str(), command.redacted(), command.kind())
            .await
    }

    /// Sends `line` and returns whatever the scheduler printed in reply.
    ///
    /// Never returns an error: a dead channel is reported as
    /// [`OutcomeStatus::ChannelFailure`] without writing anything.
    #[cfg(test)]
    pub async fn send_raw(&self, line: &str, kind: CommandKind) -> CommandOutcome {
        self.dispatch(line, line, kind).await
    }

    async fn dispatch(&self, line: &str, label: &str, kind: CommandKind) -> CommandOutcome {
        let mut supervisor = self.supervisor.lock().await;
        let mut restarts = 0;

        loop {
            let transport = match supervisor.ensure_live().await {
                Ok(transport) => transport,
                Err(err) => return CommandOutcome::channel_failure(err.to_string()),
            };

            let failure = match exchange(transport, &*self.clock, &self.timings, line, kind).await {
                Ok(captured) if !looks_stuck(&captured.text, line) || !self.retry.allows(restarts) => {
                    debug!(command = %label, completion = ?captured.completion, bytes = captured.text.len(), "command finished");
                    return classify(captured, line, kind);
                }
                Ok(_) => format!("no reply beyond echo for `{label}`"),
                Err(err) if self.retry.allows(restarts) => format!("stream error: {err}"),
                Err(err) => return CommandOutcome::channel_failure(format!("stream error: {err}")),
            };

            restarts += 1;
            warn!(command = %label, reason = %failure, "restarting scheduler session and resending");
            if let Err(err) = supervisor.restart().await {
                return CommandOutcome::channel_failure(err.to_string());
            }
        }
    }

    /// True once the scheduler has been declared unavailable.
    pub async fn is_degraded(&self) -> bool {
        self.supervisor.lock().await.is_degraded()
    }

    /// Launch counter of the underlying supervisor.
    pub async fn generation(&self) -> u64 {
        self.supervisor.lock().await.generation()
    }

    /// Starts the session eagerly; returns false if the scheduler is unavailable.
    pub async fn warm_up(&self) -> bool {
        self.supervisor.lock().await.ensure_live().await.is_ok()
    }

    /// Puts the channel into degraded mode without launching anything.
    pub async fn force_degraded(&self, reason: &str) {
        self.supervisor.lock().await.mark_degraded(reason);
    }

    /// Stops the scheduler process, waiting for any in-flight command.
    pub async fn shutdown(&self) {
        self.supervisor.lock().await.teardown();
    }
}

/// Writes `line` and reads until a completion heuristic fires.
///
/// # Errors
///
/// Returns the I/O error of a failed write.
pub async fn exchange(
    transport: &mut dyn Transport,
    clock: &dyn Clock,
    timings: &ChannelTimings,
    line: &str,
    kind: CommandKind,
) -> std::io::Result<Exchange> {
    transport.write_line(line).await?;

    let started = clock.now();
    let mut deadline = started + kind.deadline(timings);
    let mut last_data = started;
    let mut buf: Vec<u8> = Vec::new();
    // Markers are only honoured in output that follows the confirmation answer.
    let mut marker_from: Option<usize> = (!kind.expects_confirmation()).then_some(0);

    let completion = loop {
        let now = clock.now();
        if now >= deadline {
            break Completion::Deadline;
        }
        let wait = timings.poll_slice().min(deadline - now);

        match transport.read_chunk(wait).await {
            ReadEvent::Data(bytes) => {
                buf.extend_from_slice(&bytes);
                last_data = clock.now();
                let text = String::from_utf8_lossy(&buf);

                if marker_from.is_none() && text.contains(CONFIRMATION_PROMPT) {
                    trace!("answering confirmation prompt");
                    transport.write_line(CONFIRMATION_ANSWER).await?;
                    marker_from = Some(text.len());
                    deadline += timings.confirmation_extension();
                    continue;
                }
                if let Some(completion) = check_completion(&text, kind, marker_from) {
                    break completion;
                }
            }
            ReadEvent::Idle => {
                // The echo alone is not a reply; only the deadline ends that wait.
                if clock.now().duration_since(last_data) >= timings.quiescence()
                    && !looks_stuck(&String::from_utf8_lossy(&buf), line)
                {
                    break Completion::Quiescent;
                }
            }
            ReadEvent::Closed => break Completion::Closed,
        }
    };

    if completion != Completion::Closed {
        if let ReadEvent::Data(bytes) = transport.read_chunk(timings.final_read()).await {
            buf.extend_from_slice(&bytes);
        }
    }

    Ok(Exchange {
        text: String::from_utf8_lossy(&buf).into_owned(),
        completion,
    })
}

/// Evaluates the completion heuristics in precedence order.
///
/// `marker_from` is the byte offset from which kind-specific markers count;
/// `None` means they are not honoured yet.
#[must_use]
pub fn check_completion(text: &str, kind: CommandKind, marker_from: Option<usize>) -> Option<Completion> {
    if let Some(offset) = marker_from {
        let tail = text.get(offset..).unwrap_or_default().to_ascii_lowercase();
        if let Some(marker) = kind
            .completion_markers()
            .iter()
            .find(|marker| tail.contains(*marker))
        {
            return Some(Completion::Marker(*marker));
        }
    }
    if text.trim_end().ends_with('>') {
        return Some(Completion::Prompt);
    }
    None
}

/// Returns true if `output` carries nothing beyond the echoed command.
#[must_use]
pub fn looks_stuck(output: &str, line: &str) -> bool {
    let trimmed = output.trim();
    trimmed.is_empty() || (trimmed.len() <= line.len() + 2 && trimmed.contains(line.trim()))
}

/// Returns true if the scheduler printed its own error or usage text.
///
/// Lines of a script body printed by `view` are user content and never count.
#[must_use]
pub fn is_rejection(output: &str) -> bool {
    let mut in_script = false;
    output.lines().any(|line| {
        let line = line.trim().trim_start_matches('>').trim_start();
        if line == SCRIPT_MARKER {
            in_script = true;
            return false;
        }
        if in_script {
            if !is_following_label(line) {
                return false;
            }
            in_script = false;
        }
        let lower = line.to_ascii_lowercase();
        lower.starts_with("error")
            || lower.starts_with("[error]")
            || line.starts_with("Usage:")
            || line.contains("Unknown command")
    })
}

/// Classifies captured text; successful `view` replies also carry the parsed
/// record. A stream that closed before answering is a channel failure.
fn classify(captured: Exchange, line: &str, kind: CommandKind) -> CommandOutcome {
    let status = if captured.completion == Completion::Closed && looks_stuck(&captured.text, line) {
        OutcomeStatus::ChannelFailure
    } else if is_rejection(&captured.text) {
        OutcomeStatus::Rejected
    } else {
        OutcomeStatus::Ok
    };
    let record = (status == OutcomeStatus::Ok && kind == CommandKind::View)
        .then(|| parse_record(&captured.text).ok())
        .flatten();
    let outcome = CommandOutcome {
        status,
        raw: captured.text,
        timed_out: captured.completion == Completion::Deadline,
        record: None,
    };
    match record {
        Some(task) => outcome.with_record(task),
        None => outcome,
    }
}
