//! Command stream reader: a named FIFO drained by a dedicated thread.
//!
//! The FIFO is a long-lived rendezvous point. Writers come and go; each
//! time the last writer closes, the reader sees end-of-stream and simply
//! opens the FIFO again. Opening blocks until the next writer shows up, so
//! the reader lives on its own OS thread rather than on the runtime.

use std::ffi::CString;
use std::fs::{self, File, OpenOptions, Permissions};
use std::io::{self, BufRead, BufReader};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, trace, warn};

use crate::error::RelayError;
use crate::fifo::backlog::{Backlog, BacklogSender, backlog};

/// How long [`CommandStreamReader::shutdown`] waits for the thread to
/// notice the stop flag before detaching it.
const JOIN_GRACE: Duration = Duration::from_millis(200);

// ── FifoOptions ──────────────────────────────────────────────────

/// Where and how to create the command FIFO.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FifoOptions {
    pub path: PathBuf,
    /// Owner applied with `chown` after creation. `None` leaves it as is.
    pub owner_uid: Option<u32>,
    pub owner_gid: Option<u32>,
    /// Permission bits, applied explicitly so the umask does not matter.
    pub mode: u32,
}

impl Default for FifoOptions {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/tmp/btkb.fifo"),
            owner_uid: None,
            owner_gid: None,
            mode: 0o660,
        }
    }
}

impl FifoOptions {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }
}

// ── CommandStreamReader ──────────────────────────────────────────

/// Owns the FIFO and the thread that feeds its lines into a [`Backlog`].
#[derive(Debug)]
pub struct CommandStreamReader {
    path: PathBuf,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl CommandStreamReader {
    /// Create the FIFO and start reading it.
    ///
    /// A stale FIFO (or any file) already at the path is removed and
    /// creation retried once; a second failure is returned as
    /// [`RelayError::Fifo`].
    pub fn start(options: &FifoOptions) -> Result<(Self, Backlog), RelayError> {
        make_fifo(options)?;

        let (tx, rx) = backlog();
        let stop = Arc::new(AtomicBool::new(false));
        let path = options.path.clone();

        let handle = thread::Builder::new().name("btkb-fifo".into()).spawn({
            let path = path.clone();
            let stop = Arc::clone(&stop);
            move || read_loop(&path, &tx, &stop)
        })?;

        info!("reading commands from {}", path.display());
        Ok((
            Self {
                path,
                stop,
                handle: Some(handle),
            },
            rx,
        ))
    }

    /// Stop the reader thread and remove the FIFO. Safe to call twice.
    ///
    /// Blocks for up to [`JOIN_GRACE`]; async callers should run it on the
    /// blocking pool.
    pub fn shutdown(&mut self) -> Result<(), RelayError> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };

        self.stop.store(true, Ordering::SeqCst);
        if wake_until_finished(&self.path, &handle, JOIN_GRACE) {
            if handle.join().is_err() {
                warn!("fifo reader thread panicked");
            }
        } else {
            // Another writer still holds the FIFO open; the thread exits
            // when that writer closes.
            debug!("fifo reader still blocked; detaching");
        }

        remove_fifo(&self.path)?;
        info!("removed fifo {}", self.path.display());
        Ok(())
    }
}

impl Drop for CommandStreamReader {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!("fifo cleanup failed: {e}");
        }
    }
}

// ── FIFO management ──────────────────────────────────────────────

/// Create the FIFO described by `options`, replacing a stale one once.
pub fn make_fifo(options: &FifoOptions) -> Result<(), RelayError> {
    let path = &options.path;
    let fifo_err = |source: io::Error| RelayError::Fifo {
        path: path.clone(),
        source,
    };

    match mkfifo(path, options.mode) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            warn!("{} already exists; replacing it", path.display());
            remove_fifo(path).map_err(fifo_err)?;
            mkfifo(path, options.mode).map_err(fifo_err)?;
        }
        Err(e) => return Err(fifo_err(e)),
    }

    fs::set_permissions(path, Permissions::from_mode(options.mode)).map_err(fifo_err)?;
    if options.owner_uid.is_some() || options.owner_gid.is_some() {
        debug!(
            uid = ?options.owner_uid,
            gid = ?options.owner_gid,
            "setting fifo owner"
        );
        std::os::unix::fs::chown(path, options.owner_uid, options.owner_gid).map_err(fifo_err)?;
    }
    Ok(())
}

/// Remove the FIFO. A missing file is not an error.
pub fn remove_fifo(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

fn mkfifo(path: &Path, mode: u32) -> io::Result<()> {
    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    // SAFETY: `c_path` is a valid NUL-terminated string that outlives the call.
    let rc = unsafe { libc::mkfifo(c_path.as_ptr(), mode as libc::mode_t) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

/// Keep waking the reader until its thread finishes or `grace` runs out.
///
/// A single wake can miss a thread that checked the stop flag but has not
/// reached `open` yet; the next attempt catches it blocked there.
fn wake_until_finished(path: &Path, handle: &JoinHandle<()>, grace: Duration) -> bool {
    let deadline = Instant::now() + grace;
    loop {
        wake_reader(path);
        if handle.is_finished() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(5));
    }
}

/// Briefly open the FIFO as a writer so a reader blocked in `open` or
/// `read` returns and sees the stop flag.
fn wake_reader(path: &Path) {
    match OpenOptions::new()
        .write(true)
        .custom_flags(libc::O_NONBLOCK)
        .open(path)
    {
        Ok(writer) => drop(writer),
        // ENXIO: no reader has it open, nothing to wake.
        Err(e) => trace!("wake_reader: {e}"),
    }
}

// ── Reader thread ────────────────────────────────────────────────

fn read_loop(path: &Path, tx: &BacklogSender, stop: &AtomicBool) {
    while !stop.load(Ordering::SeqCst) {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                if !stop.load(Ordering::SeqCst) {
                    error!("cannot open fifo {}: {e}", path.display());
                }
                break;
            }
        };
        if stop.load(Ordering::SeqCst) {
            break;
        }
        trace!("fifo writer attached");

        if !drain_writer(BufReader::new(file), tx, stop) {
            break;
        }
        trace!("fifo writer closed; reopening");
    }
    debug!("fifo reader exiting");
}

/// Forward lines until the writer closes. Returns `false` when the reader
/// should exit entirely.
fn drain_writer<R: BufRead>(mut reader: R, tx: &BacklogSender, stop: &AtomicBool) -> bool {
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => return true,
            Ok(_) => {
                if stop.load(Ordering::SeqCst) {
                    return false;
                }
                let Some(line) = decode_line(&buf) else {
                    continue;
                };
                if tx.push(line).is_err() {
                    // Relay is gone.
                    return false;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!("fifo read error: {e}");
                return true;
            }
        }
    }
}

/// Strip the line ending and decode lossily. Blank lines yield `None`.
fn decode_line(raw: &[u8]) -> Option<String> {
    let line = String::from_utf8_lossy(raw);
    let line = line.trim_end_matches(['\n', '\r']);
    if line.trim().is_empty() {
        None
    } else {
        Some(line.to_owned())
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fifo::backlog::LineRead;
    use std::io::{Cursor, Write};
    use std::os::unix::fs::FileTypeExt;

    fn write_lines(path: PathBuf, lines: &'static [&'static str]) -> thread::JoinHandle<()> {
        thread::spawn(move || {
            let mut fifo = OpenOptions::new().write(true).open(path).unwrap();
            for line in lines {
                writeln!(fifo, "{line}").unwrap();
            }
        })
    }

    #[test]
    fn decode_strips_line_endings() {
        assert_eq!(decode_line(b"KEY_A\n").as_deref(), Some("KEY_A"));
        assert_eq!(decode_line(b"KEY_A ACT_RELEASE\r\n").as_deref(), Some("KEY_A ACT_RELEASE"));
        assert_eq!(decode_line(b"KEY_B").as_deref(), Some("KEY_B"));
        assert_eq!(decode_line(b"  \n"), None);
        assert_eq!(decode_line(b"\n"), None);
        assert_eq!(decode_line(b"KEY_\xffA\n").as_deref(), Some("KEY_\u{fffd}A"));
    }

    #[tokio::test]
    async fn drain_writer_forwards_lines_in_order() {
        let (tx, mut rx) = backlog();
        let stop = AtomicBool::new(false);
        let input = Cursor::new(b"KEY_A\n\nKEY_B+KEY_C\nKEY_D".to_vec());
        assert!(drain_writer(input, &tx, &stop));

        let tick = Duration::from_millis(10);
        for want in ["KEY_A", "KEY_B+KEY_C", "KEY_D"] {
            assert_eq!(rx.get_line(tick).await.unwrap(), LineRead::Line(want.into()));
        }
        assert_eq!(rx.get_line(tick).await.unwrap(), LineRead::NoData);
    }

    #[test]
    fn make_fifo_creates_and_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let options = FifoOptions::new(dir.path().join("cmd.fifo"));

        make_fifo(&options).unwrap();
        let meta = fs::metadata(&options.path).unwrap();
        assert!(meta.file_type().is_fifo());
        assert_eq!(meta.permissions().mode() & 0o777, 0o660);

        // Second creation hits EEXIST, removes, and retries.
        make_fifo(&options).unwrap();
        assert!(fs::metadata(&options.path).unwrap().file_type().is_fifo());
    }

    #[test]
    fn make_fifo_replaces_regular_file() {
        let dir = tempfile::tempdir().unwrap();
        let options = FifoOptions::new(dir.path().join("cmd.fifo"));
        fs::write(&options.path, b"stale").unwrap();

        make_fifo(&options).unwrap();
        assert!(fs::metadata(&options.path).unwrap().file_type().is_fifo());
    }

    #[test]
    fn make_fifo_reports_path_on_failure() {
        let options = FifoOptions::new("/nonexistent-dir/btkb/cmd.fifo");
        match make_fifo(&options) {
            Err(RelayError::Fifo { path, .. }) => assert_eq!(path, options.path),
            other => panic!("expected fifo error, got {other:?}"),
        }
    }

    #[test]
    fn make_fifo_fails_when_stale_entry_cannot_be_removed() {
        let dir = tempfile::tempdir().unwrap();
        let options = FifoOptions::new(dir.path().join("cmd.fifo"));
        // A non-empty directory: mkfifo hits EEXIST and remove_file refuses
        // it, even for root.
        fs::create_dir(&options.path).unwrap();
        fs::write(options.path.join("keep"), b"x").unwrap();

        match make_fifo(&options) {
            Err(RelayError::Fifo { path, .. }) => assert_eq!(path, options.path),
            other => panic!("expected fifo error, got {other:?}"),
        }
        assert!(options.path.is_dir());
    }

    #[test]
    fn wake_catches_reader_that_opens_late() {
        let dir = tempfile::tempdir().unwrap();
        let options = FifoOptions::new(dir.path().join("cmd.fifo"));
        make_fifo(&options).unwrap();

        // Nobody has the FIFO open during the first wake attempt; the
        // thread only blocks in open() afterwards.
        let path = options.path.clone();
        let late = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            drop(File::open(path).unwrap());
        });

        assert!(wake_until_finished(&options.path, &late, Duration::from_secs(2)));
        late.join().unwrap();
    }

    #[test]
    fn remove_missing_fifo_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        assert!(remove_fifo(&dir.path().join("nope")).is_ok());
    }

    #[tokio::test]
    async fn reads_lines_across_writers() {
        let dir = tempfile::tempdir().unwrap();
        let options = FifoOptions::new(dir.path().join("cmd.fifo"));
        let (mut reader, mut rx) = CommandStreamReader::start(&options).unwrap();
        let wait = Duration::from_secs(5);

        write_lines(options.path.clone(), &["KEY_A", "KEY_B ACT_RELEASE"])
            .join()
            .unwrap();
        assert_eq!(rx.get_line(wait).await.unwrap(), LineRead::Line("KEY_A".into()));
        assert_eq!(
            rx.get_line(wait).await.unwrap(),
            LineRead::Line("KEY_B ACT_RELEASE".into())
        );

        // First writer closed; the reader reopens for the next one.
        write_lines(options.path.clone(), &["KEY_C"]).join().unwrap();
        assert_eq!(rx.get_line(wait).await.unwrap(), LineRead::Line("KEY_C".into()));

        reader.shutdown().unwrap();
        assert!(!options.path.exists());
    }

    #[tokio::test]
    async fn shutdown_unblocks_idle_reader_and_removes_fifo() {
        let dir = tempfile::tempdir().unwrap();
        let options = FifoOptions::new(dir.path().join("cmd.fifo"));
        let (mut reader, mut rx) = CommandStreamReader::start(&options).unwrap();

        // Let the thread block in open().
        tokio::time::sleep(Duration::from_millis(50)).await;
        reader.shutdown().unwrap();
        assert!(!options.path.exists());
        assert!(reader.shutdown().is_ok());

        // Producer is gone, so the backlog reports it.
        assert!(matches!(
            rx.get_line(Duration::from_secs(1)).await,
            Err(RelayError::ReaderStopped)
        ));
    }
}
