//! # btkb-relay: keyboard command relay daemon
//!
//! Reads text commands from a named pipe and forwards them as HID
//! keyboard reports to a bridge process attached on a Unix socket. The
//! bridge owns the Bluetooth side; the daemon only sees it come and go.
//!
//! ## Modes
//!
//! - **Run**: foreground daemon, stopped by Ctrl-C or SIGTERM.
//! - **Gen-config**: print the default configuration and exit.

pub mod config;
pub mod service;
pub mod session;
