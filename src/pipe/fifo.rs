use std::ffi::{CString, OsString};
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::FileTypeExt;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::bridge::BridgeEvent;

const FIFO_MODE: libc::mode_t = 0o666;
const REOPEN_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error)]
pub enum PipeError {
    #[error("Pipe path {0} contains a NUL byte")]
    InvalidPath(PathBuf),

    #[error("{0} exists but is not a FIFO")]
    NotAFifo(PathBuf),

    #[error("Failed to inspect {path}: {source}")]
    Inspect {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to create FIFO at {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to lock {path}: {source}")]
    Lock {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Another process is already reading {0}")]
    ReaderBusy(PathBuf),

    #[error("Failed to write to FIFO {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to spawn pipe reader thread: {0}")]
    Spawn(#[source] io::Error),
}

/// The command FIFO.
///
/// Exactly one reader may exist system-wide: lines written to a FIFO go to
/// whichever reader happens to call `read` first, so two bridges would each see
/// an arbitrary subset of commands. [`PipeChannel::spawn_reader`] takes an
/// exclusive `flock` on `<pipe>.lock` and refuses to start when it is held.
#[derive(Clone, Debug)]
pub struct PipeChannel {
    path: PathBuf,
}

/// Held for as long as the reader runs; the lock goes away with the file.
#[derive(Debug)]
pub struct ReaderLock {
    _file: File,
}

impl PipeChannel {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Creates the FIFO unless it is already there. Losing a creation race to the
    /// other side counts as success.
    pub fn ensure_exists(&self) -> Result<(), PipeError> {
        match std::fs::metadata(&self.path) {
            Ok(meta) if meta.file_type().is_fifo() => Ok(()),
            Ok(_) => Err(PipeError::NotAFifo(self.path.clone())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => self.create(),
            Err(source) => Err(PipeError::Inspect {
                path: self.path.clone(),
                source,
            }),
        }
    }

    fn create(&self) -> Result<(), PipeError> {
        let c_path = CString::new(self.path.as_os_str().as_bytes())
            .map_err(|_| PipeError::InvalidPath(self.path.clone()))?;

        // SAFETY: `c_path` is a valid NUL-terminated string that outlives the call.
        let rc = unsafe { libc::mkfifo(c_path.as_ptr(), FIFO_MODE) };
        if rc == 0 {
            info!("FIFO created at {}", self.path.display());
            return Ok(());
        }

        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::AlreadyExists {
            debug!("FIFO {} was created by the other side", self.path.display());
            return Ok(());
        }
        Err(PipeError::Create {
            path: self.path.clone(),
            source: err,
        })
    }

    pub fn lock_path(&self) -> PathBuf {
        let mut name: OsString = self.path.as_os_str().to_owned();
        name.push(".lock");
        PathBuf::from(name)
    }

    pub fn lock_reader(&self) -> Result<ReaderLock, PipeError> {
        let path = self.lock_path();
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|source| PipeError::Lock {
                path: path.clone(),
                source,
            })?;

        // SAFETY: the descriptor belongs to `file`, which is alive for the call.
        let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
        if rc != 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EWOULDBLOCK) {
                return Err(PipeError::ReaderBusy(self.path.clone()));
            }
            return Err(PipeError::Lock { path, source: err });
        }

        Ok(ReaderLock { _file: file })
    }

    /// Starts the dedicated reader thread. It runs for the process lifetime and
    /// has no stop mechanism; it only exits once `events` is closed.
    pub fn spawn_reader(
        &self,
        events: mpsc::Sender<BridgeEvent>,
    ) -> Result<thread::JoinHandle<()>, PipeError> {
        self.ensure_exists()?;
        let lock = self.lock_reader()?;
        let path = self.path.clone();

        thread::Builder::new()
            .name("pipe-reader".to_string())
            .spawn(move || {
                let _lock = lock;
                read_loop(&path, &events);
                info!("Pipe reader stopped");
            })
            .map_err(PipeError::Spawn)
    }

    /// Writer side: sends one command line, blocking until a reader is present.
    pub fn send_line(&self, line: &str) -> Result<(), PipeError> {
        self.ensure_exists()?;
        let write_err = |source: io::Error| PipeError::Write {
            path: self.path.clone(),
            source,
        };

        let mut fifo = OpenOptions::new()
            .write(true)
            .open(&self.path)
            .map_err(write_err)?;
        fifo.write_all(format!("{}\n", line.trim_end_matches('\n')).as_bytes())
            .map_err(write_err)
    }
}

fn read_loop(path: &Path, events: &mpsc::Sender<BridgeEvent>) {
    info!("Waiting for messages from FIFO {}", path.display());

    loop {
        // Opening for read blocks until a writer shows up.
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) => {
                error!("Error while opening FIFO {}: {}", path.display(), e);
                thread::sleep(REOPEN_DELAY);
                continue;
            }
        };

        let mut reader = BufReader::new(file);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                // Every writer closed its end.
                Ok(0) => break,
                Ok(_) => {
                    let line = match std::str::from_utf8(&buf) {
                        Ok(line) => line.trim(),
                        Err(e) => {
                            warn!("Skipping non UTF-8 line from FIFO: {}", e);
                            continue;
                        }
                    };
                    if line.is_empty() {
                        continue;
                    }
                    if events
                        .blocking_send(BridgeEvent::Pipe(line.to_string()))
                        .is_err()
                    {
                        return;
                    }
                }
                Err(e) => {
                    error!("Error while reading from FIFO: {}", e);
                    break;
                }
            }
        }
        debug!("FIFO writers gone, reopening {}", path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    const RECV_TIMEOUT: Duration = Duration::from_secs(5);

    async fn next_line(rx: &mut mpsc::Receiver<BridgeEvent>) -> String {
        match timeout(RECV_TIMEOUT, rx.recv()).await {
            Ok(Some(BridgeEvent::Pipe(line))) => line,
            other => panic!("expected a pipe line, got {:?}", other),
        }
    }

    async fn send(channel: &PipeChannel, line: &'static str) {
        let channel = channel.clone();
        tokio::task::spawn_blocking(move || channel.send_line(line))
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn ensure_exists_creates_a_fifo_once() {
        let dir = tempfile::tempdir().unwrap();
        let channel = PipeChannel::new(dir.path().join("test_pipe"));

        channel.ensure_exists().unwrap();
        channel.ensure_exists().unwrap();

        let meta = std::fs::metadata(channel.path()).unwrap();
        assert!(meta.file_type().is_fifo());
    }

    #[test]
    fn regular_file_is_not_a_fifo() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test_pipe");
        std::fs::write(&path, "").unwrap();

        let err = PipeChannel::new(&path).ensure_exists().unwrap_err();
        assert!(matches!(err, PipeError::NotAFifo(p) if p == path));
    }

    #[test]
    fn second_reader_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let channel = PipeChannel::new(dir.path().join("test_pipe"));

        let held = channel.lock_reader().unwrap();
        assert!(matches!(
            channel.lock_reader(),
            Err(PipeError::ReaderBusy(_))
        ));
        drop(held);
        channel.lock_reader().unwrap();
    }

    #[test]
    fn lock_file_sits_next_to_the_pipe() {
        let channel = PipeChannel::new("/usr/Brutus/test_pipe");
        assert_eq!(channel.lock_path(), PathBuf::from("/usr/Brutus/test_pipe.lock"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn reader_forwards_lines_across_writers() {
        let dir = tempfile::tempdir().unwrap();
        let channel = PipeChannel::new(dir.path().join("test_pipe"));
        let (tx, mut rx) = mpsc::channel(8);
        channel.spawn_reader(tx).unwrap();

        send(&channel, "RS-485-2/A1/Relay_1 true").await;
        assert_eq!(next_line(&mut rx).await, "RS-485-2/A1/Relay_1 true");

        // A new writer after the first one closed.
        send(&channel, "Virtual/Cardholder/state 0").await;
        assert_eq!(next_line(&mut rx).await, "Virtual/Cardholder/state 0");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn reader_skips_blank_and_invalid_lines() {
        let dir = tempfile::tempdir().unwrap();
        let channel = PipeChannel::new(dir.path().join("test_pipe"));
        let (tx, mut rx) = mpsc::channel(8);
        channel.spawn_reader(tx).unwrap();

        let path = channel.path().to_path_buf();
        tokio::task::spawn_blocking(move || {
            let mut fifo = OpenOptions::new().write(true).open(path).unwrap();
            fifo.write_all(b"   \n\xff\xfe\n  System/wb_gpio/A1_OUT 1  \nlast line\n")
                .unwrap();
        })
        .await
        .unwrap();

        assert_eq!(next_line(&mut rx).await, "System/wb_gpio/A1_OUT 1");
        assert_eq!(next_line(&mut rx).await, "last line");
    }
}
