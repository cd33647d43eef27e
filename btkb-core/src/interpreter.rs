//! Executes parsed ops against a peripheral session.
//!
//! The interpreter owns the sticky modifier register. Modifier ops only
//! change that register; press and release ops produce reports; hold ops
//! sleep.

use tracing::{debug, trace};

use crate::command::Op;
use crate::error::SessionError;
use crate::modifier::ModifierState;
use crate::report::Report;
use crate::session::PeripheralSession;

/// Per-relay command interpreter.
#[derive(Debug, Default)]
pub struct Interpreter {
    modifiers: ModifierState,
    auto_release: bool,
}

impl Interpreter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Follow every key press with a release report.
    pub fn with_auto_release(mut self, auto_release: bool) -> Self {
        self.auto_release = auto_release;
        self
    }

    pub fn modifiers(&self) -> &ModifierState {
        &self.modifiers
    }

    /// Execute one op.
    ///
    /// Session errors are returned unchanged; the caller decides whether
    /// the rest of the line still runs.
    pub async fn apply<S>(&mut self, op: &Op, session: &S) -> Result<(), SessionError>
    where
        S: PeripheralSession + ?Sized,
    {
        match op {
            Op::Press(keys) => {
                let report = Report::encode(&self.modifiers, keys.as_slice());
                trace!(?report, "press");
                session.send_report(&report).await?;
                if self.auto_release {
                    session.release_keys().await?;
                }
            }
            Op::Release => session.release_keys().await?,
            Op::Hold(duration) => {
                if !duration.is_zero() {
                    trace!("holding for {duration:?}");
                    tokio::time::sleep(*duration).await;
                }
            }
            Op::Toggle(modifier) => {
                self.modifiers.toggle(*modifier);
                debug!("modifiers now {}", self.modifiers);
            }
            Op::ResetModifiers => {
                if self.modifiers.reset() {
                    debug!("modifiers reset");
                }
            }
        }
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────
