//! The peripheral session boundary.
//!
//! Whatever owns the connection to the HID host (a Bluetooth interrupt
//! channel, a bridge socket, a test double) implements
//! [`PeripheralSession`]. The relay only ever invokes it; it never opens or
//! closes the connection itself. Connection changes flow back through the
//! lifecycle channel (see [`crate::state`]).

use async_trait::async_trait;

use crate::error::SessionError;
use crate::report::Report;

#[async_trait]
pub trait PeripheralSession: Send + Sync {
    /// Deliver one report to the connected peer.
    ///
    /// Implementations classify failures: [`SessionError::is_transient`]
    /// errors make the relay re-check the lifecycle and carry on, anything
    /// else stops it.
    async fn send_report(&self, report: &Report) -> Result<(), SessionError>;

    /// Release every key on the peer.
    async fn release_keys(&self) -> Result<(), SessionError> {
        self.send_report(&Report::release()).await
    }
}

#[async_trait]
impl<S: PeripheralSession + ?Sized> PeripheralSession for std::sync::Arc<S> {
    async fn send_report(&self, report: &Report) -> Result<(), SessionError> {
        (**self).send_report(report).await
    }

    async fn release_keys(&self) -> Result<(), SessionError> {
        (**self).release_keys().await
    }
}
