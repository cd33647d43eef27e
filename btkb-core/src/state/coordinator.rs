//! Lifecycle coordinator: the single consumer of lifecycle messages and
//! the owner of the relay's [`SessionState`].

use std::time::Duration;

use tokio::sync::mpsc::{self, error::TryRecvError};
use tracing::{info, warn};

use crate::error::RelayError;
use crate::state::session::{LifecycleMessage, SessionState};

/// Create a connected sender/coordinator pair. The coordinator starts in
/// [`SessionState::Pending`].
pub fn lifecycle_channel() -> (LifecycleSender, LifecycleCoordinator) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        LifecycleSender { tx },
        LifecycleCoordinator {
            state: SessionState::Pending,
            rx,
        },
    )
}

// ── LifecycleSender ──────────────────────────────────────────────

/// Producer half, held by the session owner and signal handlers.
/// Cloneable; sending never blocks.
#[derive(Debug, Clone)]
pub struct LifecycleSender {
    tx: mpsc::UnboundedSender<LifecycleMessage>,
}

impl LifecycleSender {
    pub fn send(&self, msg: LifecycleMessage) -> Result<(), RelayError> {
        self.tx.send(msg)?;
        Ok(())
    }

    pub fn update_state(&self, state: SessionState) -> Result<(), RelayError> {
        self.send(LifecycleMessage::UpdateState(state))
    }

    pub fn shutdown(&self) -> Result<(), RelayError> {
        self.send(LifecycleMessage::Shutdown)
    }

    /// `true` once the coordinator has been dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

// ── LifecycleCoordinator ─────────────────────────────────────────

/// Applies lifecycle messages in arrival order.
///
/// If every [`LifecycleSender`] is dropped nobody can report a connection
/// any more, so the coordinator moves to `Shutdown`.
#[derive(Debug)]
pub struct LifecycleCoordinator {
    state: SessionState,
    rx: mpsc::UnboundedReceiver<LifecycleMessage>,
}

impl LifecycleCoordinator {
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Apply one message and return the resulting state.
    pub fn apply(&mut self, msg: LifecycleMessage) -> SessionState {
        let next = self.state.next(&msg);
        if next != self.state {
            info!("session {} -> {next} ({msg})", self.state);
            self.state = next;
        }
        self.state
    }

    /// Force `Shutdown` from the relay side.
    pub fn force_shutdown(&mut self) -> SessionState {
        self.apply(LifecycleMessage::Shutdown)
    }

    /// Wait up to `timeout` for a message, then take whatever else is
    /// already queued. Returns the (possibly unchanged) state.
    ///
    /// Draining stops at the first message that ends a connection, so a
    /// disconnect is always observed even if a reconnect is queued behind
    /// it.
    pub async fn poll(&mut self, timeout: Duration) -> SessionState {
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Ok(Some(msg)) => {
                if self.apply_step(msg) {
                    self.state
                } else {
                    self.try_poll()
                }
            }
            Ok(None) => self.on_closed(),
            Err(_elapsed) => self.state,
        }
    }

    /// Take messages already queued without waiting, stopping early like
    /// [`poll`](Self::poll) when a connection ends.
    pub fn try_poll(&mut self) -> SessionState {
        loop {
            match self.rx.try_recv() {
                Ok(msg) => {
                    if self.apply_step(msg) {
                        return self.state;
                    }
                }
                Err(TryRecvError::Empty) => return self.state,
                Err(TryRecvError::Disconnected) => return self.on_closed(),
            }
        }
    }

    /// Wait for the next message with no deadline and apply it.
    ///
    /// Cancel safe: a message is either fully applied or left in the
    /// channel, so this can sit in a `select!` beside other work.
    pub async fn changed(&mut self) -> SessionState {
        match self.rx.recv().await {
            Some(msg) => self.apply(msg),
            None => self.on_closed(),
        }
    }

    /// Apply `msg`; `true` if it took the state out of `Connected`.
    fn apply_step(&mut self, msg: LifecycleMessage) -> bool {
        let was_connected = self.state.is_connected();
        was_connected && !self.apply(msg).is_connected()
    }

    fn on_closed(&mut self) -> SessionState {
        if !self.state.is_shutdown() {
            warn!("lifecycle channel closed; shutting down");
        }
        self.force_shutdown()
    }
}

// ── Tests ────────────────────────────────────────────────────────
