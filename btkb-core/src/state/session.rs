//! Session lifecycle states and the messages that move between them.
//!
//! The session owner (whatever holds the HID connection) is the only
//! source of truth about connectivity. It announces changes as
//! [`LifecycleMessage`]s; the relay never decides connectivity itself.

use std::fmt;

use serde::{Deserialize, Serialize};

// ── SessionState ─────────────────────────────────────────────────

/// Connection lifecycle of the peripheral session, as seen by the relay.
///
/// ```text
///  Pending ──► Disconnected ◄──► Connected
///     │             │                │
///     └─────────────┴──► Shutdown ◄──┘
/// ```
///
/// Any state may follow any other, except that nothing leaves `Shutdown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    /// The session owner has not reported in yet. Initial state.
    #[default]
    Pending,

    /// Session owner is ready but no peer is attached.
    Disconnected,

    /// A peer is attached; reports are forwarded.
    Connected,

    /// Terminal. The relay stops.
    Shutdown,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Disconnected => write!(f, "DISCONNECTED"),
            Self::Connected => write!(f, "CONNECTED"),
            Self::Shutdown => write!(f, "SHUTDOWN"),
        }
    }
}

impl SessionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// `Pending` and `Disconnected`: the relay has nothing to do but wait.
    pub fn is_waiting(&self) -> bool {
        matches!(self, Self::Pending | Self::Disconnected)
    }

    pub fn is_shutdown(&self) -> bool {
        matches!(self, Self::Shutdown)
    }

    // ── Transitions ──────────────────────────────────────────────

    /// The state after applying `msg`.
    ///
    /// `update_state` is taken at face value; `shutdown` always wins and is
    /// permanent.
    pub fn next(self, msg: &LifecycleMessage) -> Self {
        match (self, msg) {
            (Self::Shutdown, _) => Self::Shutdown,
            (_, LifecycleMessage::Shutdown) => Self::Shutdown,
            (_, LifecycleMessage::UpdateState(to)) => *to,
        }
    }
}

// ── LifecycleMessage ─────────────────────────────────────────────

/// A notification from the session owner.
///
/// Wire shape: `{"topic": "update_state", "value": "CONNECTED"}` or
/// `{"topic": "shutdown"}`. A `value` on a shutdown message is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawMessage", into = "RawMessage")]
pub enum LifecycleMessage {
    UpdateState(SessionState),
    Shutdown,
}

impl fmt::Display for LifecycleMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UpdateState(s) => write!(f, "update_state({s})"),
            Self::Shutdown => write!(f, "shutdown"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Topic {
    UpdateState,
    Shutdown,
}

#[derive(Serialize, Deserialize)]
struct RawMessage {
    topic: Topic,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<SessionState>,
}

impl TryFrom<RawMessage> for LifecycleMessage {
    type Error = &'static str;

    fn try_from(raw: RawMessage) -> Result<Self, Self::Error> {
        match (raw.topic, raw.value) {
            (Topic::Shutdown, _) => Ok(Self::Shutdown),
            (Topic::UpdateState, Some(state)) => Ok(Self::UpdateState(state)),
            (Topic::UpdateState, None) => Err("update_state message without a value"),
        }
    }
}

impl From<LifecycleMessage> for RawMessage {
    fn from(msg: LifecycleMessage) -> Self {
        match msg {
            LifecycleMessage::UpdateState(state) => Self {
                topic: Topic::UpdateState,
                value: Some(state),
            },
            LifecycleMessage::Shutdown => Self {
                topic: Topic::Shutdown,
                value: None,
            },
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
