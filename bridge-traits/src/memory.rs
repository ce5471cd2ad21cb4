//! In-Memory Platform
//!
//! A [`PlatformIo`] implementation backed by process memory. It is used by the
//! stream engine's tests and by hosts that want to simulate file and console
//! traffic without touching the real file system.
//!
//! Besides storing file contents it records every primitive call as an
//! [`IoEvent`], defers overlapped completions until they are waited on (or
//! [`MemoryPlatform::complete_all`] is called), injects one-shot [`Fault`]s
//! and simulates a UTF-16 console.
//!
//! ```
//! use bridge_traits::memory::MemoryPlatform;
//! use bridge_traits::{OpenMode, PlatformIo};
//! use std::path::Path;
//!
//! let platform = MemoryPlatform::new();
//! let mut device = platform.open(Path::new("out.txt"), OpenMode::WRITE).unwrap();
//! device.write(b"hi").unwrap();
//! device.close().unwrap();
//! assert_eq!(platform.file("out.txt").unwrap(), b"hi");
//! ```

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::device::{Device, OpenMode, SeekOrigin};
use crate::error::{BridgeError, Result};
use crate::overlapped::{Completion, OverlappedDevice, PendingWrite, SharedRegion};
use crate::platform::{PlatformIo, StdDevice, StdHandleKind};

/// Native code reported by injected faults (EIO).
pub const FAULT_OS_CODE: i32 = 5;

/// A primitive call observed by the platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IoEvent {
    Open { path: PathBuf, mode: OpenMode },
    OpenOverlapped { path: PathBuf, mode: OpenMode },
    Write { path: PathBuf, len: usize },
    Read { path: PathBuf, requested: usize, returned: usize },
    Seek { path: PathBuf, position: u64 },
    Close { path: PathBuf },
    Submit { path: PathBuf, offset: u64, len: usize },
    Completed { path: PathBuf, offset: u64, len: usize },
    ConsoleWrite { units: usize },
    ConsoleRead { requested: usize, returned: usize },
}

/// Primitive that fails on its next invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    Open,
    Write,
    Read,
    Seek,
    Close,
    Submit,
    Poll,
    Console,
}

struct InFlight {
    path: PathBuf,
    offset: u64,
    region: SharedRegion,
}

struct MemoryState {
    files: HashMap<PathBuf, Vec<u8>>,
    events: Vec<IoEvent>,
    faults: HashSet<Fault>,
    max_transfer: usize,
    auto_complete: bool,
    next_op: u64,
    in_flight: BTreeMap<u64, InFlight>,
    console_output: Vec<u16>,
    console_input: VecDeque<u16>,
    redirected: bool,
    missing_handles: HashSet<StdHandleKind>,
}

impl Default for MemoryState {
    fn default() -> Self {
        Self {
            files: HashMap::new(),
            events: Vec::new(),
            faults: HashSet::new(),
            max_transfer: u32::MAX as usize,
            auto_complete: false,
            next_op: 0,
            in_flight: BTreeMap::new(),
            console_output: Vec::new(),
            console_input: VecDeque::new(),
            redirected: false,
            missing_handles: HashSet::new(),
        }
    }
}

impl MemoryState {
    fn take_fault(&mut self, fault: Fault) -> Result<()> {
        if self.faults.remove(&fault) {
            return Err(BridgeError::Io(io::Error::from_raw_os_error(FAULT_OS_CODE)));
        }
        Ok(())
    }

    fn write_at(&mut self, path: &Path, offset: u64, data: &[u8]) {
        let file = self.files.entry(path.to_path_buf()).or_default();
        let start = offset as usize;
        let end = start + data.len();
        if file.len() < end {
            file.resize(end, 0);
        }
        file[start..end].copy_from_slice(data);
    }

    fn complete(&mut self, id: u64) {
        if let Some(op) = self.in_flight.remove(&id) {
            let len = op.region.len();
            self.write_at(&op.path, op.offset, op.region.as_slice());
            self.events.push(IoEvent::Completed {
                path: op.path,
                offset: op.offset,
                len,
            });
        }
    }
}

/// Shared in-memory platform; clones observe the same state.
#[derive(Clone, Default)]
pub struct MemoryPlatform {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Limit the bytes a single overlapped descriptor may carry
    pub fn with_max_transfer(self, max_transfer: usize) -> Self {
        self.state.lock().max_transfer = max_transfer.max(1);
        self
    }

    /// Complete overlapped writes on their first poll instead of deferring them
    pub fn with_auto_complete(self, auto_complete: bool) -> Self {
        self.state.lock().auto_complete = auto_complete;
        self
    }

    /// Make standard handles behave like redirected byte streams
    pub fn with_redirected_std_handles(self, redirected: bool) -> Self {
        self.state.lock().redirected = redirected;
        self
    }

    /// Report `kind` as unavailable from [`PlatformIo::std_handle`]
    pub fn without_std_handle(self, kind: StdHandleKind) -> Self {
        self.state.lock().missing_handles.insert(kind);
        self
    }

    pub fn insert_file(&self, path: impl Into<PathBuf>, data: impl Into<Vec<u8>>) {
        self.state.lock().files.insert(path.into(), data.into());
    }

    /// Current contents of `path`, if it exists
    pub fn file(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        self.state.lock().files.get(path.as_ref()).cloned()
    }

    pub fn events(&self) -> Vec<IoEvent> {
        self.state.lock().events.clone()
    }

    pub fn clear_events(&self) {
        self.state.lock().events.clear();
    }

    /// Arm a one-shot failure for the next call of the given primitive
    pub fn inject_fault(&self, fault: Fault) {
        self.state.lock().faults.insert(fault);
    }

    /// Number of submitted overlapped writes not yet completed
    pub fn in_flight(&self) -> usize {
        self.state.lock().in_flight.len()
    }

    /// Complete every outstanding overlapped write in submission order
    pub fn complete_all(&self) {
        let mut state = self.state.lock();
        let ids: Vec<u64> = state.in_flight.keys().copied().collect();
        for id in ids {
            state.complete(id);
        }
    }

    pub fn console_output(&self) -> Vec<u16> {
        self.state.lock().console_output.clone()
    }

    pub fn console_text(&self) -> String {
        String::from_utf16_lossy(&self.state.lock().console_output)
    }

    /// Queue text for console reads, encoded as UTF-16
    pub fn push_console_input(&self, text: &str) {
        self.state.lock().console_input.extend(text.encode_utf16());
    }

    /// Queue raw UTF-16 units for console reads
    pub fn push_console_units(&self, units: &[u16]) {
        self.state.lock().console_input.extend(units.iter().copied());
    }

    fn std_path(kind: StdHandleKind) -> PathBuf {
        match kind {
            StdHandleKind::Input => PathBuf::from("<stdin>"),
            StdHandleKind::Output => PathBuf::from("<stdout>"),
            StdHandleKind::Error => PathBuf::from("<stderr>"),
        }
    }
}

impl PlatformIo for MemoryPlatform {
    fn open(&self, path: &Path, mode: OpenMode) -> Result<Box<dyn Device<Unit = u8>>> {
        let mut state = self.state.lock();
        state.take_fault(Fault::Open)?;

        let position = if mode.is_output() {
            let file = state.files.entry(path.to_path_buf()).or_default();
            if !mode.contains(OpenMode::APPEND) {
                file.clear();
            }
            file.len() as u64
        } else if state.files.contains_key(path) {
            0
        } else {
            return Err(BridgeError::Io(io::Error::from(io::ErrorKind::NotFound)));
        };

        state.events.push(IoEvent::Open {
            path: path.to_path_buf(),
            mode,
        });

        Ok(Box::new(MemoryFile {
            state: Arc::clone(&self.state),
            path: path.to_path_buf(),
            position,
            append: mode.contains(OpenMode::APPEND),
        }))
    }

    fn open_overlapped(&self, path: &Path, mode: OpenMode) -> Result<Box<dyn OverlappedDevice>> {
        let mut state = self.state.lock();
        state.take_fault(Fault::Open)?;

        let file = state.files.entry(path.to_path_buf()).or_default();
        if !mode.contains(OpenMode::APPEND) {
            file.clear();
        }
        state.events.push(IoEvent::OpenOverlapped {
            path: path.to_path_buf(),
            mode,
        });

        Ok(Box::new(MemoryOverlapped {
            state: Arc::clone(&self.state),
            path: path.to_path_buf(),
        }))
    }

    fn std_handle(&self, kind: StdHandleKind) -> Result<StdDevice> {
        let state = self.state.lock();
        if state.missing_handles.contains(&kind) {
            return Err(BridgeError::NotAvailable(format!("{:?} handle", kind)));
        }

        if state.redirected {
            let path = Self::std_path(kind);
            drop(state);
            let mode = match kind {
                StdHandleKind::Input => OpenMode::READ,
                _ => OpenMode::WRITE | OpenMode::APPEND,
            };
            if kind == StdHandleKind::Input {
                self.state.lock().files.entry(path.clone()).or_default();
            }
            return self.open(&path, mode).map(StdDevice::Stream);
        }

        Ok(StdDevice::Console(Box::new(MemoryConsole {
            state: Arc::clone(&self.state),
        })))
    }
}

struct MemoryFile {
    state: Arc<Mutex<MemoryState>>,
    path: PathBuf,
    position: u64,
    append: bool,
}

impl Device for MemoryFile {
    type Unit = u8;

    fn write(&mut self, data: &[u8]) -> Result<()> {
        let mut state = self.state.lock();
        state.take_fault(Fault::Write)?;

        if self.append {
            self.position = state.files.get(&self.path).map_or(0, |f| f.len() as u64);
        }
        state.write_at(&self.path, self.position, data);
        self.position += data.len() as u64;
        state.events.push(IoEvent::Write {
            path: self.path.clone(),
            len: data.len(),
        });
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut state = self.state.lock();
        state.take_fault(Fault::Read)?;

        let file = state.files.get(&self.path).map(Vec::as_slice).unwrap_or(&[]);
        let start = (self.position as usize).min(file.len());
        let count = buf.len().min(file.len() - start);
        buf[..count].copy_from_slice(&file[start..start + count]);
        self.position += count as u64;
        state.events.push(IoEvent::Read {
            path: self.path.clone(),
            requested: buf.len(),
            returned: count,
        });
        Ok(count)
    }

    fn seek(&mut self, offset: i64, origin: SeekOrigin) -> Result<u64> {
        let mut state = self.state.lock();
        state.take_fault(Fault::Seek)?;

        let len = state.files.get(&self.path).map_or(0, |f| f.len() as i64);
        let base = match origin {
            SeekOrigin::Start => 0,
            SeekOrigin::Current => self.position as i64,
            SeekOrigin::End => len,
        };
        let target = base + offset;
        if target < 0 {
            return Err(BridgeError::Io(io::Error::from(io::ErrorKind::InvalidInput)));
        }
        self.position = target as u64;
        state.events.push(IoEvent::Seek {
            path: self.path.clone(),
            position: self.position,
        });
        Ok(self.position)
    }

    fn close(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        state.take_fault(Fault::Close)?;
        state.events.push(IoEvent::Close {
            path: self.path.clone(),
        });
        Ok(())
    }
}

struct MemoryOverlapped {
    state: Arc<Mutex<MemoryState>>,
    path: PathBuf,
}

impl OverlappedDevice for MemoryOverlapped {
    fn submit_write(&mut self, region: SharedRegion, offset: u64) -> Result<Box<dyn PendingWrite>> {
        let mut state = self.state.lock();
        state.take_fault(Fault::Submit)?;

        if region.len() > state.max_transfer {
            return Err(BridgeError::OperationFailed(format!(
                "chunk of {} bytes exceeds transfer limit of {}",
                region.len(),
                state.max_transfer
            )));
        }

        let id = state.next_op;
        state.next_op += 1;
        let len = region.len();
        state.events.push(IoEvent::Submit {
            path: self.path.clone(),
            offset,
            len,
        });
        state.in_flight.insert(
            id,
            InFlight {
                path: self.path.clone(),
                offset,
                region,
            },
        );

        Ok(Box::new(MemoryPendingWrite {
            state: Arc::clone(&self.state),
            id,
            offset,
            len,
            done: false,
        }))
    }

    fn max_transfer(&self) -> usize {
        self.state.lock().max_transfer
    }

    fn size(&self) -> Result<u64> {
        let state = self.state.lock();
        Ok(state.files.get(&self.path).map_or(0, |f| f.len() as u64))
    }

    fn close(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        state.take_fault(Fault::Close)?;
        state.events.push(IoEvent::Close {
            path: self.path.clone(),
        });
        Ok(())
    }
}

struct MemoryPendingWrite {
    state: Arc<Mutex<MemoryState>>,
    id: u64,
    offset: u64,
    len: usize,
    done: bool,
}

impl PendingWrite for MemoryPendingWrite {
    fn poll(&mut self, wait: bool) -> Result<Completion> {
        if self.done {
            return Ok(Completion::Complete);
        }

        let mut state = self.state.lock();
        if state.take_fault(Fault::Poll).is_err() {
            // The failed operation releases its region like a real device would.
            state.in_flight.remove(&self.id);
            self.done = true;
            return Err(BridgeError::Io(io::Error::from_raw_os_error(FAULT_OS_CODE)));
        }

        if state.in_flight.contains_key(&self.id) {
            if !(wait || state.auto_complete) {
                return Ok(Completion::Incomplete);
            }
            state.complete(self.id);
        }

        self.done = true;
        Ok(Completion::Complete)
    }

    fn offset(&self) -> u64 {
        self.offset
    }

    fn len(&self) -> usize {
        self.len
    }
}

struct MemoryConsole {
    state: Arc<Mutex<MemoryState>>,
}

impl Device for MemoryConsole {
    type Unit = u16;

    fn write(&mut self, data: &[u16]) -> Result<()> {
        let mut state = self.state.lock();
        state.take_fault(Fault::Console)?;
        state.console_output.extend_from_slice(data);
        state.events.push(IoEvent::ConsoleWrite { units: data.len() });
        Ok(())
    }

    /// Behaves like a line-oriented console: a read stops after a line feed.
    fn read(&mut self, buf: &mut [u16]) -> Result<usize> {
        let mut state = self.state.lock();
        state.take_fault(Fault::Console)?;

        let mut count = 0;
        while count < buf.len() {
            let Some(unit) = state.console_input.pop_front() else {
                break;
            };
            buf[count] = unit;
            count += 1;
            if unit == u16::from(b'\n') {
                break;
            }
        }
        state.events.push(IoEvent::ConsoleRead {
            requested: buf.len(),
            returned: count,
        });
        Ok(count)
    }

    fn seek(&mut self, _offset: i64, _origin: SeekOrigin) -> Result<u64> {
        Err(BridgeError::NotAvailable("seek on console".to_string()))
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(bytes: &[u8]) -> SharedRegion {
        let data = Arc::new(bytes.to_vec());
        let len = data.len();
        SharedRegion::new(data, 0..len)
    }

    #[test]
    fn test_write_then_read_back() {
        let platform = MemoryPlatform::new();
        let mut out = platform.open(Path::new("a.bin"), OpenMode::WRITE).unwrap();
        out.write(b"abc").unwrap();
        out.write(b"def").unwrap();
        out.close().unwrap();

        let mut input = platform.open(Path::new("a.bin"), OpenMode::READ).unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(input.read(&mut buf).unwrap(), 4);
        assert_eq!(&buf, b"abcd");
        assert_eq!(input.read(&mut buf).unwrap(), 2);
        assert_eq!(input.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_open_missing_file_for_read_fails() {
        let platform = MemoryPlatform::new();
        assert!(platform.open(Path::new("missing"), OpenMode::READ).is_err());
    }

    #[test]
    fn test_overlapped_completion_is_deferred() {
        let platform = MemoryPlatform::new();
        let mut device = platform
            .open_overlapped(Path::new("o.bin"), OpenMode::WRITE)
            .unwrap();
        let mut op = device.submit_write(region(b"xyz"), 2).unwrap();

        assert_eq!(op.poll(false).unwrap(), Completion::Incomplete);
        assert_eq!(platform.file("o.bin").unwrap(), b"");
        assert_eq!(op.poll(true).unwrap(), Completion::Complete);
        assert_eq!(platform.file("o.bin").unwrap(), b"\0\0xyz");
        assert_eq!(op.poll(false).unwrap(), Completion::Complete);
        assert_eq!(platform.in_flight(), 0);
    }

    #[test]
    fn test_complete_all_releases_regions() {
        let platform = MemoryPlatform::new();
        let mut device = platform
            .open_overlapped(Path::new("o.bin"), OpenMode::WRITE)
            .unwrap();
        let data = Arc::new(b"1234".to_vec());
        let mut op = device
            .submit_write(SharedRegion::new(Arc::clone(&data), 0..4), 0)
            .unwrap();
        assert_eq!(Arc::strong_count(&data), 2);

        platform.complete_all();
        assert_eq!(Arc::strong_count(&data), 1);
        assert_eq!(op.poll(false).unwrap(), Completion::Complete);
    }

    #[test]
    fn test_injected_fault_carries_os_code() {
        let platform = MemoryPlatform::new();
        let mut out = platform.open(Path::new("f"), OpenMode::WRITE).unwrap();
        platform.inject_fault(Fault::Write);

        let err = out.write(b"x").unwrap_err();
        assert_eq!(err.os_code(), Some(FAULT_OS_CODE));
        // One-shot
        out.write(b"x").unwrap();
    }

    #[test]
    fn test_console_reads_stop_at_line_feed() {
        let platform = MemoryPlatform::new();
        platform.push_console_input("ab\ncd");
        let StdDevice::Console(mut console) = platform.std_handle(StdHandleKind::Input).unwrap()
        else {
            panic!("expected console");
        };

        let mut buf = [0u16; 16];
        assert_eq!(console.read(&mut buf).unwrap(), 3);
        assert_eq!(console.read(&mut buf).unwrap(), 2);
        assert_eq!(console.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_redirected_std_handles_are_streams() {
        let platform = MemoryPlatform::new().with_redirected_std_handles(true);
        let device = platform.std_handle(StdHandleKind::Output).unwrap();
        assert!(!device.is_console());

        let missing = MemoryPlatform::new().without_std_handle(StdHandleKind::Error);
        assert!(missing.std_handle(StdHandleKind::Error).is_err());
    }
}
