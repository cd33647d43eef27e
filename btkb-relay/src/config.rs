//! Configuration for the relay daemon.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use btkb_core::{FifoOptions, RelayTiming};

use crate::session::SocketOptions;

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Command FIFO.
    pub fifo: FifoConfig,
    /// Peer socket and report behaviour.
    pub session: SessionConfig,
    /// Relay loop timing.
    pub relay: TimingConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FifoConfig {
    pub path: PathBuf,
    /// Owner applied with chown after creation. Unset keeps the creator.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_uid: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_gid: Option<u32>,
    /// Permission bits, e.g. `0o660`.
    pub mode: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Unix socket the HID bridge connects to.
    pub socket_path: PathBuf,
    /// Deadline for one report write, in milliseconds.
    pub write_timeout_ms: u64,
    /// Send a release report after every key press.
    pub auto_release: bool,
}

/// All values in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub pending_poll_ms: u64,
    pub disconnected_poll_ms: u64,
    pub idle_interval_ms: u64,
    pub line_timeout_ms: u64,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level or filter directive; `RUST_LOG` wins when set.
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for FifoConfig {
    fn default() -> Self {
        let fifo = FifoOptions::default();
        Self {
            path: fifo.path,
            owner_uid: fifo.owner_uid,
            owner_gid: fifo.owner_gid,
            mode: fifo.mode,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        let socket = SocketOptions::default();
        Self {
            socket_path: socket.path,
            write_timeout_ms: socket.write_timeout.as_millis() as u64,
            auto_release: false,
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        let timing = RelayTiming::default();
        Self {
            pending_poll_ms: timing.pending_poll.as_millis() as u64,
            disconnected_poll_ms: timing.disconnected_poll.as_millis() as u64,
            idle_interval_ms: timing.idle_interval.as_millis() as u64,
            line_timeout_ms: timing.line_timeout.as_millis() as u64,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl RelayConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => Self::parse(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Write the default configuration to a file (for bootstrapping).
    pub fn write_default(path: &Path) -> std::io::Result<()> {
        let text = toml::to_string_pretty(&Self::default()).map_err(std::io::Error::other)?;
        std::fs::write(path, text)
    }

    pub fn to_fifo_options(&self) -> FifoOptions {
        FifoOptions {
            path: self.fifo.path.clone(),
            owner_uid: self.fifo.owner_uid,
            owner_gid: self.fifo.owner_gid,
            mode: self.fifo.mode & 0o7777,
        }
    }

    pub fn to_socket_options(&self) -> SocketOptions {
        SocketOptions {
            path: self.session.socket_path.clone(),
            write_timeout: Duration::from_millis(self.session.write_timeout_ms.max(1)),
        }
    }

    /// Zero intervals are raised to 1 ms so no phase spins.
    pub fn to_relay_timing(&self) -> RelayTiming {
        let ms = |v: u64| Duration::from_millis(v.max(1));
        RelayTiming {
            pending_poll: ms(self.relay.pending_poll_ms),
            disconnected_poll: ms(self.relay.disconnected_poll_ms),
            idle_interval: ms(self.relay.idle_interval_ms),
            line_timeout: ms(self.relay.line_timeout_ms),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
