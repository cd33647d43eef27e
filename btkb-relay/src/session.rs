//! Unix-socket peripheral session.
//!
//! A bridge process (the one holding the Bluetooth interrupt channel)
//! connects to the socket and receives every report as a length-prefixed
//! frame: one length byte, then the report. One bridge at a time; when it
//! goes away the session publishes `DISCONNECTED` and waits for the next.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use btkb_core::{LifecycleSender, PeripheralSession, RelayError, Report, SessionError, SessionState};

type ReportSink = SplitSink<Framed<UnixStream, LengthDelimitedCodec>, Bytes>;

/// Frame codec shared by the session and its peers.
pub fn report_codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .length_field_length(1)
        .new_codec()
}

#[derive(Debug, Clone)]
pub struct SocketOptions {
    pub path: PathBuf,
    /// Deadline for one report write.
    pub write_timeout: Duration,
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/tmp/btkb.sock"),
            write_timeout: Duration::from_secs(1),
        }
    }
}

struct Peer {
    sink: ReportSink,
    lost: CancellationToken,
}

// ── SocketSession ────────────────────────────────────────────────

pub struct SocketSession {
    path: PathBuf,
    write_timeout: Duration,
    peer: Arc<Mutex<Option<Peer>>>,
    lifecycle: LifecycleSender,
    accept_task: JoinHandle<()>,
}

impl SocketSession {
    /// Bind the socket, report `DISCONNECTED` and start accepting peers.
    ///
    /// A stale socket file at the path is replaced.
    pub fn bind(options: &SocketOptions, lifecycle: LifecycleSender) -> Result<Self, RelayError> {
        remove_socket(&options.path)?;
        let listener = UnixListener::bind(&options.path)?;
        info!("session socket at {}", options.path.display());

        lifecycle.update_state(SessionState::Disconnected)?;

        let peer = Arc::new(Mutex::new(None));
        let accept_task = tokio::spawn(accept_loop(listener, Arc::clone(&peer), lifecycle.clone()));

        Ok(Self {
            path: options.path.clone(),
            write_timeout: options.write_timeout,
            peer,
            lifecycle,
            accept_task,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn is_attached(&self) -> bool {
        self.peer.lock().await.is_some()
    }

    /// Stop accepting, drop the current peer and remove the socket file.
    pub async fn close(&self) -> Result<(), RelayError> {
        self.accept_task.abort();
        if let Some(peer) = self.peer.lock().await.take() {
            peer.lost.cancel();
        }
        remove_socket(&self.path)?;
        debug!("session socket closed");
        Ok(())
    }
}

#[async_trait]
impl PeripheralSession for SocketSession {
    async fn send_report(&self, report: &Report) -> Result<(), SessionError> {
        let mut slot = self.peer.lock().await;
        let Some(peer) = slot.as_mut() else {
            return Err(SessionError::PeerUnavailable("no peer attached".into()));
        };

        trace!(?report, "send");
        let sent = tokio::time::timeout(self.write_timeout, peer.sink.send(report.to_bytes())).await;
        match sent {
            Ok(Ok(())) => Ok(()),
            Err(_elapsed) => {
                // The frame may be half written; drop the peer rather than
                // let it arrive late in front of the next report.
                warn!("peer write timed out after {:?}; dropping peer", self.write_timeout);
                if let Some(peer) = slot.take() {
                    peer.lost.cancel();
                }
                Err(SessionError::Timeout(self.write_timeout))
            }
            Ok(Err(e)) if is_peer_gone(&e) => {
                warn!("peer lost during write: {e}");
                if let Some(peer) = slot.take() {
                    peer.lost.cancel();
                }
                Err(SessionError::PeerUnavailable(e.to_string()))
            }
            Ok(Err(e)) => {
                error!("session socket failed: {e}");
                if let Err(e) = self.lifecycle.shutdown() {
                    debug!("could not publish shutdown: {e}");
                }
                Err(SessionError::Permanent(e.to_string()))
            }
        }
    }
}

// ── Internal ─────────────────────────────────────────────────────

/// Accept one peer at a time until the lifecycle channel goes away.
async fn accept_loop(listener: UnixListener, slot: Arc<Mutex<Option<Peer>>>, lifecycle: LifecycleSender) {
    loop {
        let stream = match listener.accept().await {
            Ok((stream, _)) => stream,
            Err(e) => {
                error!("accept failed: {e}");
                if let Err(e) = lifecycle.shutdown() {
                    debug!("could not publish shutdown: {e}");
                }
                return;
            }
        };

        let (sink, mut incoming) = Framed::new(stream, report_codec()).split();
        let lost = CancellationToken::new();
        *slot.lock().await = Some(Peer {
            sink,
            lost: lost.clone(),
        });

        info!("peer attached");
        if lifecycle.update_state(SessionState::Connected).is_err() {
            return;
        }

        // Peers never send anything meaningful; reading only detects hangup.
        tokio::select! {
            _ = lost.cancelled() => {}
            _ = async {
                while let Some(Ok(frame)) = incoming.next().await {
                    trace!("ignoring {} byte(s) from peer", frame.len());
                }
            } => {}
        }

        slot.lock().await.take();
        info!("peer detached");
        if lifecycle.update_state(SessionState::Disconnected).is_err() {
            return;
        }
    }
}

fn is_peer_gone(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
    )
}

fn remove_socket(path: &Path) -> io::Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

// ── Tests ────────────────────────────────────────────────────────
