//! In-process doubles for the scheduler console.
//!
//! [`ScriptedTransport`] replays responses produced by a responder function,
//! advancing a [`ManualClock`] whenever a read waits, so deadline and
//! quiescence behaviour can be asserted without sleeping.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::core::clock::Clock;
use crate::core::error::{BridgeError, BridgeResult};
use crate::core::transport::{Launcher, ReadEvent, Transport};

/// Clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct ManualClock {
    origin: Instant,
    offset: Arc<Mutex<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut offset) = self.offset.lock() {
            *offset += by;
        }
    }

    /// Total simulated time since creation.
    pub fn elapsed(&self) -> Duration {
        self.offset.lock().map(|o| *o).unwrap_or_default()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }
}

/// One scripted piece of console behaviour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Output text, delivered as a single chunk.
    Data(String),
    /// A pause with no output.
    Silence(Duration),
    /// The process exits.
    Exit,
}

impl Step {
    pub fn data(text: impl Into<String>) -> Self {
        Self::Data(text.into())
    }

    pub const fn silence_ms(ms: u64) -> Self {
        Self::Silence(Duration::from_millis(ms))
    }
}

/// Maps a written line to the steps the fake console produces in reply.
pub type Responder = Arc<dyn Fn(&str) -> Vec<Step> + Send + Sync>;

/// Lines written across every session of a launcher.
pub type WriteLog = Arc<Mutex<Vec<String>>>;

/// Scripted [`Transport`] driven by a [`Responder`].
pub struct ScriptedTransport {
    responder: Responder,
    pending: VecDeque<Step>,
    alive: bool,
    clock: ManualClock,
    written: WriteLog,
    echo: bool,
}

impl ScriptedTransport {
    pub fn new(responder: Responder, banner: Vec<Step>, clock: ManualClock, written: WriteLog) -> Self {
        Self {
            responder,
            pending: banner.into(),
            alive: true,
            clock,
            written,
            echo: true,
        }
    }
}

impl fmt::Debug for ScriptedTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptedTransport")
            .field("pending", &self.pending)
            .field("alive", &self.alive)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn write_line(&mut self, line: &str) -> std::io::Result<()> {
        if !self.alive {
            return Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "scripted process exited",
            ));
        }
        if let Ok(mut written) = self.written.lock() {
            written.push(line.to_string());
        }
        if self.echo {
            self.pending.push_back(Step::Data(format!("{line}\r\n")));
        }
        self.pending.extend((self.responder)(line));
        Ok(())
    }

    async fn read_chunk(&mut self, wait: Duration) -> ReadEvent {
        match self.pending.front_mut() {
            None => {
                self.clock.advance(wait);
                if self.alive {
                    ReadEvent::Idle
                } else {
                    ReadEvent::Closed
                }
            }
            Some(Step::Data(_)) => {
                let Some(Step::Data(text)) = self.pending.pop_front() else {
                    return ReadEvent::Idle;
                };
                self.clock.advance(Duration::from_millis(1));
                ReadEvent::Data(text.into_bytes())
            }
            Some(Step::Silence(remaining)) => {
                if *remaining <= wait {
                    let pause = *remaining;
                    self.pending.pop_front();
                    self.clock.advance(pause);
                } else {
                    *remaining -= wait;
                    self.clock.advance(wait);
                }
                ReadEvent::Idle
            }
            Some(Step::Exit) => {
                self.pending.clear();
                self.alive = false;
                ReadEvent::Closed
            }
        }
    }

    fn is_alive(&mut self) -> bool {
        if matches!(self.pending.front(), Some(Step::Exit)) {
            self.pending.clear();
            self.alive = false;
        }
        self.alive
    }

    fn terminate(&mut self) {
        self.alive = false;
        self.pending.clear();
    }
}

/// [`Launcher`] handing out [`ScriptedTransport`]s.
#[derive(Clone)]
pub struct ScriptedLauncher {
    responder: Responder,
    banner: Vec<Step>,
    clock: ManualClock,
    launches: Arc<AtomicU32>,
    written: WriteLog,
    unavailable: bool,
}

impl ScriptedLauncher {
    /// Launcher whose sessions print a prompt on start and reply via `responder`.
    pub fn new(clock: ManualClock, responder: Responder) -> Self {
        Self {
            responder,
            banner: vec![Step::data("Task Scheduler interactive mode\r\n> ")],
            clock,
            launches: Arc::new(AtomicU32::new(0)),
            written: Arc::new(Mutex::new(Vec::new())),
            unavailable: false,
        }
    }

    /// Launcher that behaves like a missing binary.
    pub fn unavailable(clock: ManualClock) -> Self {
        let mut launcher = Self::new(clock, Arc::new(|_| Vec::new()));
        launcher.unavailable = true;
        launcher
    }

    /// Replaces the startup output.
    pub fn with_banner(mut self, banner: Vec<Step>) -> Self {
        self.banner = banner;
        self
    }

    /// Number of sessions started so far.
    pub fn launch_count(&self) -> u32 {
        self.launches.load(Ordering::SeqCst)
    }

    /// Every line written to any session, in order.
    pub fn written(&self) -> Vec<String> {
        self.written.lock().map(|w| w.clone()).unwrap_or_default()
    }
}

impl fmt::Debug for ScriptedLauncher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptedLauncher")
            .field("launches", &self.launch_count())
            .field("unavailable", &self.unavailable)
            .finish_non_exhaustive()
    }
}

impl Launcher for ScriptedLauncher {
    fn launch(&self) -> BridgeResult<Box<dyn Transport>> {
        if self.unavailable {
            return Err(BridgeError::ProcessUnavailable(
                "scheduler binary not found".to_string(),
            ));
        }
        self.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedTransport::new(
            Arc::clone(&self.responder),
            self.banner.clone(),
            self.clock.clone(),
            Arc::clone(&self.written),
        )))
    }
}

/// Responder that answers every line with `reply` followed by a prompt.
pub fn reply_with(reply: &'static str) -> Responder {
    Arc::new(move |_| vec![Step::data(reply), Step::data("\r\n> ")])
}

/// Splits a console line the way the scheduler's interactive mode does.
///
/// `"` and `'` open a quoted run closed only by the same character; closing
/// it ends the token. There are no escapes and empty tokens are dropped.
pub fn split_console_args(line: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut token = String::new();
    let mut quote: Option<char> = None;

    for c in line.chars() {
        match quote {
            None if c == '"' || c == '\'' => quote = Some(c),
            Some(open) if c == open => {
                quote = None;
                if !token.is_empty() {
                    args.push(std::mem::take(&mut token));
                }
            }
            None if c.is_ascii_whitespace() => {
                if !token.is_empty() {
                    args.push(std::mem::take(&mut token));
                }
            }
            _ => token.push(c),
        }
    }
    if !token.is_empty() {
        args.push(token);
    }
    args
}
