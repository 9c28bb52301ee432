//! Byte-stream transport to the scheduler's interactive console.
//!
//! [`Transport`] is the seam between the read loop and the process: the
//! production implementation drives a pseudo-terminal, tests substitute a
//! scripted one. [`Launcher`] produces fresh transports for the supervisor.

use std::fmt;
use std::io::{ErrorKind, Read, Write};
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use portable_pty::{Child, ChildKiller, CommandBuilder, MasterPty, PtySize, native_pty_system};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::core::binary::ensure_executable;
use crate::core::error::{BridgeError, BridgeResult};

/// Result of a single bounded read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadEvent {
    /// Bytes became available.
    Data(Vec<u8>),
    /// Nothing arrived within the wait.
    Idle,
    /// The stream reached end-of-file.
    Closed,
}

/// A line-oriented, bidirectional stream to a live scheduler process.
#[async_trait]
pub trait Transport: Send + fmt::Debug {
    /// Writes `line` followed by a newline and flushes.
    async fn write_line(&mut self, line: &str) -> std::io::Result<()>;

    /// Waits up to `wait` for output and returns everything available.
    async fn read_chunk(&mut self, wait: Duration) -> ReadEvent;

    /// Returns true while the process has not exited.
    fn is_alive(&mut self) -> bool;

    /// Stops the process. Safe to call more than once.
    fn terminate(&mut self);
}

/// Factory for fresh scheduler sessions.
pub trait Launcher: Send + Sync + fmt::Debug {
    /// Starts a new scheduler process.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::ProcessUnavailable`] if the binary is missing or
    /// not executable, or [`BridgeError::Io`] if the process cannot be spawned.
    fn launch(&self) -> BridgeResult<Box<dyn Transport>>;
}

/// Terminal width handed to the scheduler. Wide enough that long command
/// lines are not wrapped by the line discipline.
const PTY_COLS: u16 = 512;
const PTY_ROWS: u16 = 24;

/// Launches the scheduler binary in interactive mode under a pseudo-terminal.
#[derive(Debug, Clone)]
pub struct PtyLauncher {
    binary: PathBuf,
    args: Vec<String>,
    working_dir: PathBuf,
    data_dir: PathBuf,
}

impl PtyLauncher {
    /// Creates a launcher for `binary`, run with `-i` from `working_dir`.
    #[must_use]
    pub fn new(binary: PathBuf, working_dir: PathBuf, data_dir: PathBuf) -> Self {
        Self {
            binary,
            args: vec!["-i".to_string()],
            working_dir,
            data_dir,
        }
    }

    /// Replaces the default `-i` arguments.
    #[must_use]
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }
}

impl Launcher for PtyLauncher {
    fn launch(&self) -> BridgeResult<Box<dyn Transport>> {
        ensure_executable(&self.binary)?;
        std::fs::create_dir_all(&self.data_dir)?;

        let pair = native_pty_system()
            .openpty(PtySize {
                rows: PTY_ROWS,
                cols: PTY_COLS,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|err| BridgeError::ProcessUnavailable(format!("openpty failed: {err}")))?;

        let mut command = CommandBuilder::new(&self.binary);
        command.args(&self.args);
        command.cwd(&self.working_dir);

        let child = pair
            .slave
            .spawn_command(command)
            .map_err(|err| BridgeError::ProcessUnavailable(format!("spawn failed: {err}")))?;
        // The child holds its own copy; keeping ours would mask EOF on exit.
        drop(pair.slave);

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|err| BridgeError::ChannelFailure(format!("pty reader: {err}")))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|err| BridgeError::ChannelFailure(format!("pty writer: {err}")))?;

        debug!(binary = %self.binary.display(), pid = ?child.process_id(), "spawned scheduler");
        Ok(Box::new(PtyTransport::new(pair.master, child, reader, writer)))
    }
}

/// [`Transport`] over a pseudo-terminal master.
///
/// A dedicated thread pumps the blocking reader into a channel so reads can be
/// bounded with a timeout.
pub struct PtyTransport {
    _master: Box<dyn MasterPty + Send>,
    child: Box<dyn Child + Send + Sync>,
    writer: Box<dyn Write + Send>,
    output_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    terminated: bool,
}

impl PtyTransport {
    fn new(
        master: Box<dyn MasterPty + Send>,
        child: Box<dyn Child + Send + Sync>,
        mut reader: Box<dyn Read + Send>,
        writer: Box<dyn Write + Send>,
    ) -> Self {
        let (output_tx, output_rx) = mpsc::unbounded_channel();
        std::thread::spawn(move || {
            let mut buf = [0u8; 8192];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if output_tx.send(buf[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                    Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(ref e) if e.kind() == ErrorKind::WouldBlock => {
                        std::thread::sleep(Duration::from_millis(5));
                    }
                    Err(_) => break,
                }
            }
        });

        Self {
            _master: master,
            child,
            writer,
            output_rx,
            terminated: false,
        }
    }
}

impl fmt::Debug for PtyTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PtyTransport")
            .field("pid", &self.child.process_id())
            .field("terminated", &self.terminated)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Transport for PtyTransport {
    async fn write_line(&mut self, line: &str) -> std::io::Result<()> {
        if !self.is_alive() {
            return Err(std::io::Error::new(
                ErrorKind::BrokenPipe,
                "scheduler process has exited",
            ));
        }
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()
    }

    async fn read_chunk(&mut self, wait: Duration) -> ReadEvent {
        let first = match tokio::time::timeout(wait, self.output_rx.recv()).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return ReadEvent::Closed,
            Err(_) => return ReadEvent::Idle,
        };

        let mut bytes = first;
        while let Ok(more) = self.output_rx.try_recv() {
            bytes.extend_from_slice(&more);
        }
        ReadEvent::Data(bytes)
    }

    fn is_alive(&mut self) -> bool {
        if self.terminated {
            return false;
        }
        matches!(self.child.try_wait(), Ok(None))
    }

    fn terminate(&mut self) {
        if self.terminated {
            return;
        }
        self.terminated = true;
        if matches!(self.child.try_wait(), Ok(None)) {
            if let Err(err) = self.child.kill() {
                warn!(error = %err, "failed to kill scheduler process");
            }
        }
        let _ = self.child.try_wait();
    }
}

impl Drop for PtyTransport {
    fn drop(&mut self) {
        self.terminate();
    }
}
