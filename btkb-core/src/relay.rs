//! The relay loop.
//!
//! Drives a [`PeripheralSession`] from the command backlog, gated by the
//! lifecycle state:
//!
//! 1. `Pending`: poll the lifecycle channel until the session owner
//!    reports in.
//! 2. `Disconnected`: poll at a slow pace until a peer attaches.
//! 3. Entering `Connected`: discard everything queued while no peer was
//!    attached, then relay one line at a time while watching the lifecycle
//!    channel.
//! 4. `Shutdown`: stop the reader, remove the FIFO, return.
//!
//! Every wait has a deadline, so a shutdown is seen within one timeout.

use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::command::parse_line;
use crate::error::RelayError;
use crate::fifo::{Backlog, CommandStreamReader, LineRead};
use crate::interpreter::Interpreter;
use crate::session::PeripheralSession;
use crate::state::{LifecycleCoordinator, SessionState};

// ── RelayTiming ──────────────────────────────────────────────────

/// Poll intervals for each phase of the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayTiming {
    /// Lifecycle poll deadline while `Pending`.
    pub pending_poll: Duration,
    /// Lifecycle poll deadline while `Disconnected`.
    pub disconnected_poll: Duration,
    /// Pause between polls while `Disconnected`.
    pub idle_interval: Duration,
    /// Backlog wait while `Connected`; an empty wait doubles as a
    /// lifecycle probe.
    pub line_timeout: Duration,
}

impl Default for RelayTiming {
    fn default() -> Self {
        Self {
            pending_poll: Duration::from_millis(100),
            disconnected_poll: Duration::from_millis(500),
            idle_interval: Duration::from_millis(500),
            line_timeout: Duration::from_millis(100),
        }
    }
}

// ── RelayStats ───────────────────────────────────────────────────

/// Counters reported when the relay returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Lines taken from the backlog and dispatched.
    pub lines_relayed: u64,
    /// Lines thrown away on (re)connect.
    pub lines_discarded: u64,
    /// Transient session errors that were recovered from.
    pub transient_errors: u64,
}

// ── Relay ────────────────────────────────────────────────────────

pub struct Relay<S> {
    session: S,
    lifecycle: LifecycleCoordinator,
    backlog: Backlog,
    reader: Option<CommandStreamReader>,
    interpreter: Interpreter,
    timing: RelayTiming,
    stats: RelayStats,
}

impl<S: PeripheralSession> Relay<S> {
    pub fn new(session: S, lifecycle: LifecycleCoordinator, backlog: Backlog) -> Self {
        Self {
            session,
            lifecycle,
            backlog,
            reader: None,
            interpreter: Interpreter::new(),
            timing: RelayTiming::default(),
            stats: RelayStats::default(),
        }
    }

    /// Hand the FIFO reader to the relay so it is shut down with it.
    pub fn with_reader(mut self, reader: CommandStreamReader) -> Self {
        self.reader = Some(reader);
        self
    }

    pub fn with_interpreter(mut self, interpreter: Interpreter) -> Self {
        self.interpreter = interpreter;
        self
    }

    pub fn with_timing(mut self, timing: RelayTiming) -> Self {
        self.timing = timing;
        self
    }

    /// Run until `Shutdown` or a permanent failure.
    ///
    /// The reader is shut down (and the FIFO removed) on both paths.
    pub async fn run(mut self) -> Result<RelayStats, RelayError> {
        let result = self.drive().await;
        if let Err(e) = &result {
            error!("relay failed: {e}");
            self.lifecycle.force_shutdown();
        }

        if let Some(mut reader) = self.reader.take() {
            let stopped = tokio::task::spawn_blocking(move || reader.shutdown())
                .await
                .unwrap_or_else(|e| Err(RelayError::Other(format!("reader shutdown panicked: {e}"))));
            if let Err(e) = stopped {
                warn!("reader shutdown failed: {e}");
                if result.is_ok() {
                    return Err(e);
                }
            }
        }

        let stats = self.stats;
        info!(
            relayed = stats.lines_relayed,
            discarded = stats.lines_discarded,
            transient_errors = stats.transient_errors,
            "relay stopped"
        );
        result.map(|()| stats)
    }

    async fn drive(&mut self) -> Result<(), RelayError> {
        self.wait_until_ready().await;

        while !self.lifecycle.state().is_shutdown() {
            self.wait_for_peer().await;

            if self.lifecycle.state().is_connected() {
                self.discard_backlog();
                self.relay_while_connected().await?;
            }
        }
        Ok(())
    }

    async fn wait_until_ready(&mut self) {
        debug!("waiting for session owner");
        while self.lifecycle.state() == SessionState::Pending {
            self.lifecycle.poll(self.timing.pending_poll).await;
        }
    }

    /// Also covers a session owner that falls back to `Pending`.
    async fn wait_for_peer(&mut self) {
        while self.lifecycle.state().is_waiting() {
            let state = self.lifecycle.poll(self.timing.disconnected_poll).await;
            if state.is_waiting() {
                tokio::time::sleep(self.timing.idle_interval).await;
            }
        }
    }

    fn discard_backlog(&mut self) {
        let dropped = self.backlog.flush();
        if dropped > 0 {
            info!("discarded {dropped} command line(s) queued while disconnected");
        }
        self.stats.lines_discarded += dropped as u64;
    }

    async fn relay_while_connected(&mut self) -> Result<(), RelayError> {
        while self.lifecycle.state().is_connected() {
            tokio::select! {
                biased;

                _ = self.lifecycle.changed() => {}

                read = self.backlog.get_line(self.timing.line_timeout) => match read? {
                    LineRead::Line(line) => self.dispatch(&line).await?,
                    LineRead::NoData => {
                        self.lifecycle.try_poll();
                    }
                },
            }
        }
        Ok(())
    }

    /// Execute one command line.
    ///
    /// A transient session error re-checks the lifecycle; if the peer is
    /// still there the rest of the line runs, otherwise it is dropped.
    async fn dispatch(&mut self, line: &str) -> Result<(), RelayError> {
        debug!("relaying {line:?}");
        self.stats.lines_relayed += 1;

        for op in parse_line(line) {
            match self.interpreter.apply(&op, &self.session).await {
                Ok(()) => {}
                Err(e) if e.is_transient() => {
                    self.stats.transient_errors += 1;
                    warn!("{op} failed: {e}; re-checking session state");
                    if !self.lifecycle.try_poll().is_connected() {
                        debug!("peer no longer connected; dropping rest of line");
                        break;
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────
