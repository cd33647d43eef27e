//! Integration tests: command lines written to a real FIFO, relayed to a
//! recording session, gated by the lifecycle channel.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use btkb_core::{
    CommandStreamReader, FifoOptions, Interpreter, LifecycleSender, PeripheralSession, Relay,
    RelayError, RelayStats, RelayTiming, Report, SessionError, SessionState, lifecycle_channel,
};
use tokio::task::JoinHandle;

// ── Helpers ──────────────────────────────────────────────────────

const TIMING: RelayTiming = RelayTiming {
    pending_poll: Duration::from_millis(10),
    disconnected_poll: Duration::from_millis(10),
    idle_interval: Duration::from_millis(10),
    line_timeout: Duration::from_millis(10),
};

/// Every report sent, with the instant it was sent.
#[derive(Default)]
struct Recorder {
    sent: Mutex<Vec<(Instant, Vec<u8>)>>,
}

impl Recorder {
    fn reports(&self) -> Vec<Vec<u8>> {
        self.sent.lock().unwrap().iter().map(|(_, r)| r.clone()).collect()
    }

    fn times(&self) -> Vec<Instant> {
        self.sent.lock().unwrap().iter().map(|(t, _)| *t).collect()
    }
}

#[async_trait]
impl PeripheralSession for Recorder {
    async fn send_report(&self, report: &Report) -> Result<(), SessionError> {
        self.sent
            .lock()
            .unwrap()
            .push((Instant::now(), report.as_bytes().to_vec()));
        Ok(())
    }
}

struct Harness {
    _dir: tempfile::TempDir,
    fifo: PathBuf,
    lifecycle: LifecycleSender,
    session: Arc<Recorder>,
    relay: JoinHandle<Result<RelayStats, RelayError>>,
}

fn start(interpreter: Interpreter) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let fifo = dir.path().join("btkb.fifo");
    let (reader, backlog) = CommandStreamReader::start(&FifoOptions::new(&fifo)).unwrap();
    let (lifecycle, coordinator) = lifecycle_channel();
    let session = Arc::new(Recorder::default());

    let relay = Relay::new(Arc::clone(&session), coordinator, backlog)
        .with_reader(reader)
        .with_interpreter(interpreter)
        .with_timing(TIMING);

    Harness {
        _dir: dir,
        fifo,
        lifecycle,
        session,
        relay: tokio::spawn(relay.run()),
    }
}

/// Open the FIFO as a writer, send `lines`, close it.
async fn write_lines(path: &Path, lines: &[&str]) {
    let path = path.to_path_buf();
    let body: String = lines.iter().map(|l| format!("{l}\n")).collect();
    tokio::task::spawn_blocking(move || {
        let mut f = std::fs::OpenOptions::new().write(true).open(path).unwrap();
        f.write_all(body.as_bytes()).unwrap();
    })
    .await
    .unwrap();
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(150)).await;
}

async fn finish(h: Harness) -> (Arc<Recorder>, RelayStats) {
    h.lifecycle.shutdown().unwrap();
    let stats = tokio::time::timeout(Duration::from_secs(5), h.relay)
        .await
        .expect("relay did not stop")
        .unwrap()
        .unwrap();
    assert!(!h.fifo.exists(), "FIFO left behind");
    (h.session, stats)
}

// ── Scenarios ────────────────────────────────────────────────────

#[tokio::test]
async fn ctrl_alt_delete_then_release() {
    let h = start(Interpreter::new());
    h.lifecycle.update_state(SessionState::Connected).unwrap();
    settle().await;

    write_lines(&h.fifo, &["KEY_CTRL+KEY_ALT+KEY_DELETE ACT_RELEASE"]).await;
    settle().await;

    let (session, stats) = finish(h).await;
    assert_eq!(
        session.reports(),
        vec![
            vec![0xA1, 0x01, 0x00, 0x00, 0xE0, 0xE2, 0x4C],
            vec![0xA1, 0x01, 0x00],
        ]
    );
    assert_eq!(stats.lines_relayed, 1);
}

#[tokio::test]
async fn held_shift_sets_modifier_byte() {
    let h = start(Interpreter::new());
    h.lifecycle.update_state(SessionState::Connected).unwrap();
    settle().await;

    write_lines(&h.fifo, &["MOD_LEFTSHIFT KEY_A ACT_RELEASE MOD_RESET KEY_A"]).await;
    settle().await;

    let (session, _) = finish(h).await;
    assert_eq!(
        session.reports(),
        vec![
            vec![0xA1, 0x01, 0x02, 0x00, 0x04],
            vec![0xA1, 0x01, 0x00],
            vec![0xA1, 0x01, 0x00, 0x00, 0x04],
        ]
    );
}

#[tokio::test]
async fn hold_delays_the_next_report() {
    let h = start(Interpreter::new());
    h.lifecycle.update_state(SessionState::Connected).unwrap();
    settle().await;

    write_lines(&h.fifo, &["KEY_A ACT_HOLD_0.25 ACT_RELEASE"]).await;
    tokio::time::sleep(Duration::from_millis(500)).await;

    let (session, _) = finish(h).await;
    let times = session.times();
    assert_eq!(times.len(), 2);
    assert!(times[1] - times[0] >= Duration::from_millis(250));
}

#[tokio::test]
async fn auto_release_follows_every_press() {
    let h = start(Interpreter::new().with_auto_release(true));
    h.lifecycle.update_state(SessionState::Connected).unwrap();
    settle().await;

    write_lines(&h.fifo, &["KEY_H KEY_I"]).await;
    settle().await;

    let (session, _) = finish(h).await;
    assert_eq!(
        session.reports(),
        vec![
            vec![0xA1, 0x01, 0x00, 0x00, 0x0B],
            vec![0xA1, 0x01, 0x00],
            vec![0xA1, 0x01, 0x00, 0x00, 0x0C],
            vec![0xA1, 0x01, 0x00],
        ]
    );
}

#[tokio::test]
async fn lines_written_while_disconnected_are_dropped() {
    let h = start(Interpreter::new());
    h.lifecycle.update_state(SessionState::Disconnected).unwrap();
    settle().await;

    write_lines(&h.fifo, &["KEY_A", "KEY_B"]).await;
    settle().await;

    h.lifecycle.update_state(SessionState::Connected).unwrap();
    settle().await;
    write_lines(&h.fifo, &["KEY_C"]).await;
    settle().await;

    let (session, stats) = finish(h).await;
    assert_eq!(session.reports(), vec![vec![0xA1, 0x01, 0x00, 0x00, 0x06]]);
    assert_eq!(stats.lines_discarded, 2);
}

#[tokio::test]
async fn unknown_tokens_are_ignored() {
    let h = start(Interpreter::new());
    h.lifecycle.update_state(SessionState::Connected).unwrap();
    settle().await;

    write_lines(&h.fifo, &["", "   ", "MOD_BOGUS ACT_NOPE KEY_NOPE+KEY_Z"]).await;
    settle().await;

    let (session, stats) = finish(h).await;
    assert_eq!(session.reports(), vec![vec![0xA1, 0x01, 0x00, 0x00, 0x1D]]);
    assert_eq!(stats.lines_relayed, 1);
}

#[tokio::test]
async fn shutdown_while_pending_removes_fifo() {
    let h = start(Interpreter::new());
    assert!(h.fifo.exists());
    let (session, stats) = finish(h).await;
    assert!(session.reports().is_empty());
    assert_eq!(stats, RelayStats::default());
}
