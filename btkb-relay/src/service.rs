//! Relay service: wires the FIFO reader, the socket session and the relay
//! loop together and runs them until shutdown.

use std::future::Future;
use std::sync::Arc;

use tokio::signal::unix::{SignalKind, signal};
use tracing::{debug, info, warn};

use btkb_core::{
    CommandStreamReader, Interpreter, LifecycleSender, Relay, RelayError, RelayStats,
    lifecycle_channel,
};

use crate::config::RelayConfig;
use crate::session::SocketSession;

// ── RelayService ─────────────────────────────────────────────────

pub struct RelayService {
    config: RelayConfig,
}

impl RelayService {
    pub fn new(config: RelayConfig) -> Self {
        Self { config }
    }

    /// Run until Ctrl-C, SIGTERM or a permanent session failure.
    pub async fn run(&self) -> Result<RelayStats, RelayError> {
        self.run_until(wait_for_signal()).await
    }

    /// Run until `stop` resolves or a permanent session failure.
    ///
    /// 1. Creates the FIFO and starts the reader thread.
    /// 2. Binds the session socket, which reports `DISCONNECTED`.
    /// 3. Relays while a peer is attached.
    /// 4. On shutdown removes both the FIFO and the socket.
    pub async fn run_until<F>(&self, stop: F) -> Result<RelayStats, RelayError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let (reader, backlog) = CommandStreamReader::start(&self.config.to_fifo_options())?;
        let (lifecycle, coordinator) = lifecycle_channel();
        let session = Arc::new(SocketSession::bind(
            &self.config.to_socket_options(),
            lifecycle.clone(),
        )?);

        let stopper = tokio::spawn(publish_shutdown_on(stop, lifecycle));

        let interpreter = Interpreter::new().with_auto_release(self.config.session.auto_release);
        let result = Relay::new(Arc::clone(&session), coordinator, backlog)
            .with_reader(reader)
            .with_interpreter(interpreter)
            .with_timing(self.config.to_relay_timing())
            .run()
            .await;

        stopper.abort();
        if let Err(e) = session.close().await {
            warn!("failed to close session socket: {e}");
        }
        info!("relay service stopped");
        result
    }
}

// ── Internal ─────────────────────────────────────────────────────

async fn publish_shutdown_on<F: Future<Output = ()>>(stop: F, lifecycle: LifecycleSender) {
    stop.await;
    if let Err(e) = lifecycle.shutdown() {
        debug!("relay already gone: {e}");
    }
}

async fn wait_for_signal() {
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("cannot listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => match result {
            Ok(()) => info!("Ctrl-C received; shutting down"),
            Err(e) => {
                warn!("cannot listen for Ctrl-C: {e}");
                std::future::pending::<()>().await;
            }
        },
        _ = terminate => info!("SIGTERM received; shutting down"),
    }
}
