//! Scheduler process lifecycle.
//!
//! The supervisor owns at most one live session. It launches lazily, discards
//! the startup banner, notices dead processes, and flips into a permanent
//! degraded state when the scheduler cannot be started at all.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::core::channel::ChannelTimings;
use crate::core::clock::Clock;
use crate::core::error::{BridgeError, BridgeResult};
use crate::core::transport::{Launcher, ReadEvent, Transport};

/// A running scheduler process plus its stream.
#[derive(Debug)]
struct Session {
    transport: Box<dyn Transport>,
    launched_at: Instant,
}

/// Owns the scheduler process and its byte stream.
#[derive(Debug)]
pub struct SessionSupervisor {
    launcher: Box<dyn Launcher>,
    clock: Arc<dyn Clock>,
    timings: ChannelTimings,
    session: Option<Session>,
    degraded: Option<String>,
    generation: u64,
}

impl SessionSupervisor {
    #[must_use]
    pub fn new(launcher: Box<dyn Launcher>, clock: Arc<dyn Clock>, timings: ChannelTimings) -> Self {
        Self {
            launcher,
            clock,
            timings,
            session: None,
            degraded: None,
            generation: 0,
        }
    }

    /// Returns true once the scheduler has been declared unavailable.
    #[must_use]
    pub const fn is_degraded(&self) -> bool {
        self.degraded.is_some()
    }

    /// Why the supervisor is degraded, if it is.
    #[cfg(test)]
    #[must_use]
    pub fn degraded_reason(&self) -> Option<&str> {
        self.degraded.as_deref()
    }

    /// Forces degraded mode without trying to launch.
    pub fn mark_degraded(&mut self, reason: impl Into<String>) {
        self.teardown();
        self.degraded = Some(reason.into());
    }

    /// Increments on every successful launch.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns true if a session exists and its process is running.
    pub fn is_live(&mut self) -> bool {
        self.session
            .as_mut()
            .is_some_and(|session| session.transport.is_alive())
    }

    /// Returns a live transport, launching or relaunching the scheduler first
    /// if needed.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::ProcessUnavailable`] when degraded or when the
    /// launch fails; that failure also makes the supervisor degraded.
    pub async fn ensure_live(&mut self) -> BridgeResult<&mut (dyn Transport + 'static)> {
        if let Some(reason) = &self.degraded {
            return Err(BridgeError::ProcessUnavailable(reason.clone()));
        }

        if !self.is_live() {
            if let Some(session) = &self.session {
                warn!(
                    uptime = ?self.clock.now().duration_since(session.launched_at),
                    "scheduler process is gone; relaunching"
                );
                self.teardown();
            }
            self.start().await?;
        }

        self.session
            .as_mut()
            .map(|session| session.transport.as_mut())
            .ok_or_else(|| BridgeError::ChannelFailure("no session after launch".to_string()))
    }

    /// Tears the current session down and starts a fresh one.
    ///
    /// # Errors
    ///
    /// Same as [`SessionSupervisor::ensure_live`].
    pub async fn restart(&mut self) -> BridgeResult<()> {
        self.teardown();
        self.ensure_live().await.map(|_| ())
    }

    /// Stops the process if one is running. Idempotent.
    pub fn teardown(&mut self) {
        if let Some(mut session) = self.session.take() {
            debug!(generation = self.generation, "tearing down scheduler session");
            session.transport.terminate();
        }
    }

    async fn start(&mut self) -> BridgeResult<()> {
        let launched_at = self.clock.now();
        let mut transport = match self.launcher.launch() {
            Ok(transport) => transport,
            Err(err) => return Err(self.degrade(err)),
        };

        let banner = self.drain_startup(transport.as_mut(), launched_at).await;
        debug!(bytes = banner.len(), "discarded startup output");

        if !transport.is_alive() {
            transport.terminate();
            let err = BridgeError::ProcessUnavailable(format!(
                "scheduler exited right after launch: {}",
                banner.trim()
            ));
            return Err(self.degrade(err));
        }

        self.generation += 1;
        info!(generation = self.generation, "scheduler session started");
        self.session = Some(Session {
            transport,
            launched_at,
        });
        Ok(())
    }

    /// Reads startup output until the first prompt, bounded by the drain
    /// timeout, and never returns before the startup grace period.
    async fn drain_startup(&self, transport: &mut dyn Transport, launched_at: Instant) -> String {
        let grace_until = launched_at + self.timings.startup_grace();
        let drain_until = launched_at + self.timings.startup_drain();
        let mut banner = String::new();

        loop {
            let now = self.clock.now();
            let prompt_seen = banner.trim_end().ends_with('>');
            if now >= drain_until || (prompt_seen && now >= grace_until) {
                break;
            }
            let wait = self.timings.poll_slice().min(drain_until - now);
            match transport.read_chunk(wait).await {
                ReadEvent::Data(bytes) => banner.push_str(&String::from_utf8_lossy(&bytes)),
                ReadEvent::Idle => {}
                ReadEvent::Closed => break,
            }
        }
        banner
    }

    fn degrade(&mut self, err: BridgeError) -> BridgeError {
        warn!(error = %err, "scheduler unavailable; switching to simulation");
        self.degraded = Some(err.to_string());
        err
    }
}

impl Drop for SessionSupervisor {
    fn drop(&mut self) {
        self.teardown();
    }
}
