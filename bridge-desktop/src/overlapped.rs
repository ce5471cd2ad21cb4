//! Overlapped File Writes
//!
//! Positional writes executed on the Tokio blocking pool. Each submission is a
//! `spawn_blocking` task that writes its region at an explicit offset and
//! reports back over a channel; the region is dropped before the result is
//! sent so the submitting pool can reclaim the storage once it observes
//! completion.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;

use bridge_traits::{
    device::OpenMode,
    error::{BridgeError, Result},
    overlapped::{Completion, OverlappedDevice, PendingWrite, SharedRegion},
};
use tokio::runtime::{Builder, Handle, Runtime};
use tracing::debug;

/// Blocking-pool runtime dedicated to overlapped writes.
///
/// Shuts down in the background on drop so it can be released from any
/// context, including inside another runtime.
pub(crate) struct IoPool {
    runtime: Option<Runtime>,
    handle: Handle,
}

impl IoPool {
    pub(crate) fn new(max_blocking_threads: usize) -> Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(max_blocking_threads.max(1))
            .thread_name("fstream-io")
            .build()
            .map_err(BridgeError::Io)?;
        let handle = runtime.handle().clone();
        Ok(Self {
            runtime: Some(runtime),
            handle,
        })
    }
}

impl Drop for IoPool {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

/// Write all of `data` at `offset` without moving any shared cursor.
fn write_all_at(file: &File, data: &[u8], offset: u64) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::FileExt;

        let mut written = 0usize;
        while written < data.len() {
            match file.write_at(&data[written..], offset + written as u64) {
                Ok(0) => return Err(io::Error::from(io::ErrorKind::WriteZero)),
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    #[cfg(windows)]
    {
        use std::os::windows::fs::FileExt;

        let mut written = 0usize;
        while written < data.len() {
            match file.seek_write(&data[written..], offset + written as u64) {
                Ok(0) => return Err(io::Error::from(io::ErrorKind::WriteZero)),
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

/// File opened for overlapped writes
pub struct OverlappedFile {
    file: Option<Arc<File>>,
    path: PathBuf,
    pool: Arc<IoPool>,
}

impl OverlappedFile {
    pub(crate) fn open(path: &Path, mode: OpenMode, pool: Arc<IoPool>) -> Result<Self> {
        // Positional writes must not go through an O_APPEND handle; the caller
        // addresses the end of file itself.
        let mut options = OpenOptions::new();
        options
            .write(true)
            .create(true)
            .truncate(!mode.contains(OpenMode::APPEND));
        let file = options.open(path).map_err(BridgeError::Io)?;
        debug!(path = ?path, mode = ?mode, "Opened overlapped file");
        Ok(Self {
            file: Some(Arc::new(file)),
            path: path.to_path_buf(),
            pool,
        })
    }

    fn file(&self) -> Result<&Arc<File>> {
        self.file
            .as_ref()
            .ok_or_else(|| BridgeError::OperationFailed(format!("{} is closed", self.path.display())))
    }
}

impl OverlappedDevice for OverlappedFile {
    fn submit_write(&mut self, region: SharedRegion, offset: u64) -> Result<Box<dyn PendingWrite>> {
        let file = Arc::clone(self.file()?);
        let len = region.len();
        let (tx, rx) = mpsc::sync_channel(1);

        self.pool.handle.spawn_blocking(move || {
            let result = write_all_at(&file, region.as_slice(), offset);
            drop(region);
            // The receiver may already be gone when the writer was dropped mid-flight.
            let _ = tx.send(result);
        });

        Ok(Box::new(DesktopPendingWrite {
            rx,
            offset,
            len,
            state: PendingState::InFlight,
        }))
    }

    fn size(&self) -> Result<u64> {
        Ok(self.file()?.metadata().map_err(BridgeError::Io)?.len())
    }

    fn close(&mut self) -> Result<()> {
        if self.file.take().is_some() {
            debug!(path = ?self.path, "Closed overlapped file");
        }
        Ok(())
    }
}

enum PendingState {
    InFlight,
    Complete,
    Failed,
}

/// Descriptor for one positional write running on the blocking pool
struct DesktopPendingWrite {
    rx: Receiver<io::Result<()>>,
    offset: u64,
    len: usize,
    state: PendingState,
}

impl DesktopPendingWrite {
    fn settle(&mut self, result: io::Result<()>) -> Result<Completion> {
        match result {
            Ok(()) => {
                self.state = PendingState::Complete;
                Ok(Completion::Complete)
            }
            Err(e) => {
                self.state = PendingState::Failed;
                Err(BridgeError::Io(e))
            }
        }
    }
}

impl PendingWrite for DesktopPendingWrite {
    fn poll(&mut self, wait: bool) -> Result<Completion> {
        match self.state {
            PendingState::Complete => return Ok(Completion::Complete),
            PendingState::Failed => {
                return Err(BridgeError::OperationFailed(
                    "overlapped write already failed".to_string(),
                ))
            }
            PendingState::InFlight => {}
        }

        if wait {
            return match self.rx.recv() {
                Ok(result) => self.settle(result),
                Err(_) => self.settle(Err(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "overlapped write task vanished",
                ))),
            };
        }

        match self.rx.try_recv() {
            Ok(result) => self.settle(result),
            Err(TryRecvError::Empty) => Ok(Completion::Incomplete),
            Err(TryRecvError::Disconnected) => self.settle(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "overlapped write task vanished",
            ))),
        }
    }

    fn offset(&self) -> u64 {
        self.offset
    }

    fn len(&self) -> usize {
        self.len
    }
}
