//! # btkb-core
//!
//! Command relay for a Bluetooth HID keyboard.
//!
//! Text command lines arrive on a named pipe, are interpreted against the
//! held-modifier state and sent to the attached host as HID input reports,
//! but only while a peer is connected.
//!
//! This crate contains:
//! - **Keymap / Modifier**: `KEY_*` scancodes and the eight modifier bits
//! - **Report**: `Report`, the `A1 01 <mods> 00 <keys..>` input report
//! - **Command**: `Op` and the line tokenizer
//! - **Interpreter**: applies ops to a `PeripheralSession`
//! - **Fifo**: `CommandStreamReader` and the `Backlog` it fills
//! - **State**: `SessionState` and the lifecycle coordinator
//! - **Relay**: the loop that ties them together
//! - **Error**: `RelayError` and `SessionError`, `thiserror`-based

pub mod command;
pub mod error;
pub mod fifo;
pub mod interpreter;
pub mod keymap;
pub mod modifier;
pub mod relay;
pub mod report;
pub mod session;
pub mod state;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use command::{Op, parse_line};
pub use error::{RelayError, SessionError};
pub use fifo::{Backlog, BacklogSender, CommandStreamReader, FifoOptions, LineRead, backlog};
pub use interpreter::Interpreter;
pub use modifier::{Modifier, ModifierState};
pub use relay::{Relay, RelayStats, RelayTiming};
pub use report::Report;
pub use session::PeripheralSession;
pub use state::{
    LifecycleCoordinator, LifecycleMessage, LifecycleSender, SessionState, lifecycle_channel,
};
