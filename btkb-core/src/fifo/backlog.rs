//! Backlog queue between the FIFO reader thread and the relay loop.
//!
//! Unbounded, so a slow relay never blocks the producer. The consumer
//! only ever waits with a deadline.

use std::time::Duration;

use tokio::sync::mpsc::{self, error::TryRecvError};

use crate::error::RelayError;

/// Outcome of [`Backlog::get_line`] when the producer is still alive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineRead {
    /// A command line, without its trailing newline.
    Line(String),
    /// Nothing arrived before the deadline.
    NoData,
}

/// Create a connected producer/consumer pair.
pub fn backlog() -> (BacklogSender, Backlog) {
    let (tx, rx) = mpsc::unbounded_channel();
    (BacklogSender { tx }, Backlog { rx })
}

// ── BacklogSender ────────────────────────────────────────────────

/// Producer half. Pushing never blocks, from any thread.
#[derive(Debug, Clone)]
pub struct BacklogSender {
    tx: mpsc::UnboundedSender<String>,
}

impl BacklogSender {
    /// Queue one line. Fails only once the [`Backlog`] is gone.
    pub fn push(&self, line: impl Into<String>) -> Result<(), RelayError> {
        self.tx.send(line.into())?;
        Ok(())
    }
}

// ── Backlog ──────────────────────────────────────────────────────

/// Consumer half, owned by the relay loop.
#[derive(Debug)]
pub struct Backlog {
    rx: mpsc::UnboundedReceiver<String>,
}

impl Backlog {
    /// Next line, waiting at most `timeout`.
    ///
    /// `Ok(LineRead::NoData)` means "nothing yet"; an error means every
    /// producer is gone and nothing will ever arrive. Cancel safe.
    pub async fn get_line(&mut self, timeout: Duration) -> Result<LineRead, RelayError> {
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Ok(Some(line)) => Ok(LineRead::Line(line)),
            Ok(None) => Err(RelayError::ReaderStopped),
            Err(_elapsed) => Ok(LineRead::NoData),
        }
    }

    /// Discard every queued line without waiting. Returns how many were
    /// dropped. A line pushed while the drain runs may or may not be
    /// discarded; later lines are kept.
    pub fn flush(&mut self) -> usize {
        let mut dropped = 0;
        loop {
            match self.rx.try_recv() {
                Ok(_) => dropped += 1,
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => return dropped,
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    const TICK: Duration = Duration::from_millis(20);

    #[tokio::test]
    async fn lines_arrive_in_order() {
        let (tx, mut rx) = backlog();
        for line in ["KEY_A", "KEY_B", "KEY_C"] {
            assert_ok!(tx.push(line));
        }
        for want in ["KEY_A", "KEY_B", "KEY_C"] {
            assert_eq!(rx.get_line(TICK).await.unwrap(), LineRead::Line(want.into()));
        }
    }

    #[tokio::test]
    async fn empty_queue_is_no_data_not_error() {
        let (_tx, mut rx) = backlog();
        assert_eq!(rx.get_line(TICK).await.unwrap(), LineRead::NoData);
    }

    #[tokio::test]
    async fn flush_discards_everything_queued() {
        let (tx, mut rx) = backlog();
        for i in 0..5 {
            assert_ok!(tx.push(format!("KEY_{i}")));
        }
        assert_eq!(rx.flush(), 5);
        assert_eq!(rx.flush(), 0);
        assert_eq!(rx.get_line(TICK).await.unwrap(), LineRead::NoData);

        // The queue keeps working after a flush.
        assert_ok!(tx.push("KEY_Z"));
        assert_eq!(rx.get_line(TICK).await.unwrap(), LineRead::Line("KEY_Z".into()));
    }

    #[tokio::test]
    async fn producer_gone_is_an_error() {
        let (tx, mut rx) = backlog();
        assert_ok!(tx.push("KEY_A"));
        drop(tx);
        assert_eq!(rx.get_line(TICK).await.unwrap(), LineRead::Line("KEY_A".into()));
        assert!(matches!(
            rx.get_line(TICK).await,
            Err(RelayError::ReaderStopped)
        ));
    }

    #[tokio::test]
    async fn push_after_consumer_dropped_fails() {
        let (tx, rx) = backlog();
        drop(rx);
        assert_err!(tx.push("KEY_A"));
    }

    #[tokio::test]
    async fn push_from_another_thread() {
        let (tx, mut rx) = backlog();
        std::thread::spawn(move || {
            for i in 0..100 {
                tx.push(format!("line {i}")).unwrap();
            }
        });
        for i in 0..100 {
            assert_eq!(
                rx.get_line(Duration::from_secs(5)).await.unwrap(),
                LineRead::Line(format!("line {i}"))
            );
        }
    }
}
