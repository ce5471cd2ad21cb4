//! # Asynchronous Buffered Writer
//!
//! Overlaps device writes with buffer filling. When the active buffer is
//! full it is submitted as one or more overlapped writes at the writer's
//! offset counter and parked in the [`BufferPool`]'s pending list while a
//! fresh buffer is acquired. Only [`flush`](AsyncFileWriter::flush) and
//! [`close`](AsyncFileWriter::close) wait for the device.
//!
//! Overlapped handles carry no file position, so the writer tracks the
//! offset itself. It only ever grows, by exactly the bytes submitted, which
//! keeps every outstanding operation on a disjoint byte range.

use std::path::{Path, PathBuf};

use bridge_traits::{OpenMode, OverlappedDevice, PlatformIo};
use tracing::{debug, trace, warn};

use crate::buffer::BufferMode;
use crate::error::{Result, StreamError};
use crate::pool::{BufferId, BufferPool};

struct Active {
    id: BufferId,
    len: usize,
}

/// Asynchronous buffered writer over an overlapped file
pub struct AsyncFileWriter {
    device: Option<Box<dyn OverlappedDevice>>,
    pool: BufferPool,
    active: Option<Active>,
    offset: u64,
    default_capacity: usize,
    path: PathBuf,
}

impl AsyncFileWriter {
    /// Closed writer acquiring buffers of at least `default_capacity` bytes
    pub fn new(default_capacity: usize) -> Self {
        Self {
            device: None,
            pool: BufferPool::new(u32::MAX as usize),
            active: None,
            offset: 0,
            default_capacity: default_capacity.max(1),
            path: PathBuf::new(),
        }
    }

    /// Writer over an already opened device, starting at `offset`
    pub fn with_device(
        device: Box<dyn OverlappedDevice>,
        offset: u64,
        default_capacity: usize,
    ) -> Self {
        let mut writer = Self::new(default_capacity);
        writer.pool = BufferPool::new(device.max_transfer());
        writer.device = Some(device);
        writer.offset = offset;
        writer
    }

    /// Open `path` for overlapped writes.
    ///
    /// With `APPEND` the offset counter starts at the current file length.
    pub fn open(&mut self, platform: &dyn PlatformIo, path: &Path, mode: OpenMode) -> Result<()> {
        if self.device.is_some() {
            return Err(StreamError::Misuse("stream is already open".to_string()));
        }
        if !mode.is_output() || mode.contains(OpenMode::READ) {
            return Err(StreamError::InvalidMode {
                mode,
                stream: "asynchronous file writer",
            });
        }

        let device = platform
            .open_overlapped(path, mode)
            .map_err(StreamError::device("open"))?;
        let offset = if mode.contains(OpenMode::APPEND) {
            device.size().map_err(StreamError::device("size"))?
        } else {
            0
        };

        debug!(path = ?path, mode = ?mode, offset, "Opened asynchronous writer");
        // Buffers from a previous file stay pooled; only the chunk limit can change.
        if self.pool.max_transfer() != device.max_transfer() {
            self.pool = BufferPool::new(device.max_transfer());
        }
        self.device = Some(device);
        self.offset = offset;
        self.path = path.to_path_buf();
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.device.is_some()
    }

    /// Offset the next submission will target
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Bytes accepted but not yet submitted
    pub fn buffered(&self) -> usize {
        self.active.as_ref().map_or(0, |active| active.len)
    }

    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    /// Adjust buffering.
    ///
    /// `Capacity` changes the size of future buffers; `Provided` adds the
    /// caller's storage to the pool. Overlapped writes always need a
    /// buffer, so `Unbuffered` is rejected.
    pub fn setbuf(&mut self, mode: BufferMode<u8>) -> Result<()> {
        match mode {
            BufferMode::Unbuffered => Err(StreamError::Misuse(
                "asynchronous writers cannot be unbuffered".to_string(),
            )),
            BufferMode::Capacity(0) => Err(StreamError::Misuse(
                "buffer capacity must be greater than 0".to_string(),
            )),
            BufferMode::Capacity(capacity) => {
                self.default_capacity = capacity;
                Ok(())
            }
            BufferMode::Provided(storage) => self.pool.adopt(storage),
        }
    }

    /// Submit the first `len` bytes of buffer `id` at the offset counter.
    fn submit(&mut self, id: BufferId, len: usize) -> Result<()> {
        if len == 0 {
            return self.pool.release_to_free(id);
        }
        let Some(device) = self.device.as_mut() else {
            self.pool.release_to_free(id)?;
            return Err(StreamError::NotOpen);
        };

        let chunk = device.max_transfer().max(1);
        let base = self.offset;
        let mut descriptors = Vec::with_capacity(len.div_ceil(chunk));
        let mut start = 0;

        while start < len {
            let end = (start + chunk).min(len);
            let region = match self.pool.region(id, start..end) {
                Ok(region) => region,
                Err(err) => {
                    self.pool.release_to_pending(id, descriptors)?;
                    self.offset = base + start as u64;
                    return Err(err);
                }
            };
            match device.submit_write(region, base + start as u64) {
                Ok(descriptor) => descriptors.push(descriptor),
                Err(err) => {
                    // Chunks already in flight keep their range; the offset
                    // moves past them so later writes cannot overlap.
                    self.pool.release_to_pending(id, descriptors)?;
                    self.offset = base + start as u64;
                    return Err(StreamError::device("submit")(err));
                }
            }
            start = end;
        }

        let chunks = descriptors.len();
        self.pool.release_to_pending(id, descriptors)?;
        self.offset = base + len as u64;
        trace!(offset = base, len, chunks, "Submitted overlapped write");
        Ok(())
    }

    fn submit_active(&mut self) -> Result<()> {
        match self.active.take() {
            Some(active) => self.submit(active.id, active.len),
            None => Ok(()),
        }
    }

    /// Acquire a buffer for `min_capacity` bytes, never smaller than the default
    fn acquire(&mut self, min_capacity: usize) -> Result<BufferId> {
        self.pool.acquire(min_capacity.max(self.default_capacity))
    }

    /// Accept `data`, submitting full buffers without waiting for them.
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        if self.device.is_none() {
            return Err(StreamError::NotOpen);
        }
        if data.is_empty() {
            return Ok(());
        }

        let mut rest = data;
        if let Some(active) = self.active.as_mut() {
            let storage = self.pool.storage_mut(active.id)?;
            let n = (storage.len() - active.len).min(rest.len());
            storage[active.len..active.len + n].copy_from_slice(&rest[..n]);
            active.len += n;
            rest = &rest[n..];
            if rest.is_empty() {
                return Ok(());
            }
            self.submit_active()?;
        }

        let id = self.acquire(rest.len())?;
        let storage = self.pool.storage_mut(id)?;
        storage[..rest.len()].copy_from_slice(rest);
        if rest.len() == storage.len() {
            self.submit(id, rest.len())
        } else {
            self.active = Some(Active {
                id,
                len: rest.len(),
            });
            Ok(())
        }
    }

    pub fn put(&mut self, byte: u8) -> Result<()> {
        self.write(&[byte])
    }

    /// Write `byte` `count` times without materializing the run.
    pub fn fill(&mut self, byte: u8, count: usize) -> Result<()> {
        if self.device.is_none() {
            return Err(StreamError::NotOpen);
        }

        let mut remaining = count;
        while remaining > 0 {
            let active = match self.active.take() {
                Some(active) => active,
                None => Active {
                    id: self.pool.acquire(self.default_capacity)?,
                    len: 0,
                },
            };
            let storage = self.pool.storage_mut(active.id)?;
            let space = storage.len() - active.len;
            let n = space.min(remaining);
            storage[active.len..active.len + n].fill(byte);
            remaining -= n;

            let filled = Active {
                id: active.id,
                len: active.len + n,
            };
            if filled.len == storage.len() {
                self.submit(filled.id, filled.len)?;
            } else {
                self.active = Some(filled);
            }
        }
        Ok(())
    }

    /// Submit the active buffer and wait for every outstanding write.
    pub fn flush(&mut self) -> Result<()> {
        if self.device.is_none() {
            return match self.active {
                None => Ok(()),
                Some(_) => Err(StreamError::NotOpen),
            };
        }
        self.submit_active()?;
        self.pool.drain()?;
        trace!(offset = self.offset, "Flushed asynchronous writer");
        Ok(())
    }

    /// Flush, wait for the device and release it.
    pub fn close(&mut self) -> Result<()> {
        if self.device.is_none() {
            return Ok(());
        }
        let flushed = self.flush();
        // Writes still in flight after a failed flush reference the file.
        let drained = self.pool.drain();
        let closed = match self.device.take() {
            Some(mut device) => device.close().map_err(StreamError::device("close")),
            None => Ok(()),
        };
        debug!(path = ?self.path, bytes = self.offset, "Closed asynchronous writer");
        flushed.and(drained).and(closed)
    }
}

impl Drop for AsyncFileWriter {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(path = ?self.path, error = %err, "Failed to close asynchronous writer on drop");
        }
    }
}

impl std::fmt::Debug for AsyncFileWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncFileWriter")
            .field("path", &self.path)
            .field("open", &self.is_open())
            .field("offset", &self.offset)
            .field("buffered", &self.buffered())
            .field("pool", &self.pool)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::memory::{Fault, IoEvent, MemoryPlatform};

    fn open(platform: &MemoryPlatform, capacity: usize) -> AsyncFileWriter {
        let mut writer = AsyncFileWriter::new(capacity);
        writer
            .open(platform, Path::new("async.bin"), OpenMode::WRITE)
            .unwrap();
        writer
    }

    fn submits(platform: &MemoryPlatform) -> Vec<(u64, usize)> {
        platform
            .events()
            .into_iter()
            .filter_map(|event| match event {
                IoEvent::Submit { offset, len, .. } => Some((offset, len)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_full_size_write_submits_directly() {
        let platform = MemoryPlatform::new();
        let mut writer = open(&platform, 4096);

        writer.write(&[7u8; 4096]).unwrap();
        assert_eq!(submits(&platform), vec![(0, 4096)]);
        assert_eq!(writer.buffered(), 0);
        assert_eq!(writer.offset(), 4096);
        assert_eq!(writer.pool().pending_count(), 1);
    }

    #[test]
    fn test_small_writes_stay_active_until_flush() {
        let platform = MemoryPlatform::new();
        let mut writer = open(&platform, 16);

        writer.write(b"hello ").unwrap();
        writer.write(b"async").unwrap();
        assert!(submits(&platform).is_empty());

        writer.flush().unwrap();
        assert_eq!(submits(&platform), vec![(0, 11)]);
        assert_eq!(platform.file("async.bin").unwrap(), b"hello async");
        assert_eq!(writer.pool().pending_count(), 0);
    }

    #[test]
    fn test_overflow_submits_full_buffer_and_continues() {
        let platform = MemoryPlatform::new();
        let mut writer = open(&platform, 8);

        writer.write(b"abcde").unwrap();
        writer.write(b"fghijk").unwrap();
        assert_eq!(submits(&platform), vec![(0, 8)]);
        assert_eq!(writer.buffered(), 3);

        writer.close().unwrap();
        assert_eq!(platform.file("async.bin").unwrap(), b"abcdefghijk");
    }

    #[test]
    fn test_large_remainder_gets_exact_buffer() {
        let platform = MemoryPlatform::new();
        let mut writer = open(&platform, 8);

        writer.write(&[1u8; 20]).unwrap();
        assert_eq!(submits(&platform), vec![(0, 20)]);
        assert_eq!(writer.buffered(), 0);
    }

    #[test]
    fn test_offsets_never_overlap() {
        let platform = MemoryPlatform::new();
        let mut writer = open(&platform, 8);

        for chunk in [3usize, 9, 1, 16, 7, 8, 2] {
            writer.write(&vec![b'x'; chunk]).unwrap();
        }
        writer.flush().unwrap();

        let ranges = submits(&platform);
        let mut expected = 0u64;
        for (offset, len) in &ranges {
            assert_eq!(*offset, expected);
            assert!(*len > 0);
            expected += *len as u64;
        }
        assert_eq!(expected, 46);
        assert_eq!(writer.offset(), 46);
    }

    #[test]
    fn test_chunks_respect_max_transfer() {
        let platform = MemoryPlatform::new().with_max_transfer(3);
        let mut writer = open(&platform, 8);

        writer.write(&[2u8; 8]).unwrap();
        assert_eq!(submits(&platform), vec![(0, 3), (3, 3), (6, 2)]);
        writer.close().unwrap();
        assert_eq!(platform.file("async.bin").unwrap(), vec![2u8; 8]);
    }

    #[test]
    fn test_completed_buffer_is_reused() {
        let platform = MemoryPlatform::new();
        let mut writer = open(&platform, 8);

        writer.write(&[0u8; 8]).unwrap();
        platform.complete_all();
        writer.write(&[1u8; 8]).unwrap();
        assert_eq!(writer.pool().len(), 1);
        writer.pool().check_invariants().unwrap();
    }

    #[test]
    fn test_flush_empty_is_noop() {
        let platform = MemoryPlatform::new();
        let mut writer = open(&platform, 8);
        platform.clear_events();

        writer.write(&[]).unwrap();
        writer.flush().unwrap();
        writer.flush().unwrap();
        assert!(platform.events().is_empty());
    }

    #[test]
    fn test_append_starts_at_file_length() {
        let platform = MemoryPlatform::new();
        platform.insert_file("log.bin", b"123".to_vec());

        let mut writer = AsyncFileWriter::new(8);
        writer
            .open(&platform, Path::new("log.bin"), OpenMode::WRITE | OpenMode::APPEND)
            .unwrap();
        assert_eq!(writer.offset(), 3);
        writer.write(b"45").unwrap();
        writer.close().unwrap();
        assert_eq!(platform.file("log.bin").unwrap(), b"12345");
    }

    #[test]
    fn test_fill_and_put() {
        let platform = MemoryPlatform::new();
        let mut writer = open(&platform, 4);

        writer.fill(b'-', 6).unwrap();
        writer.put(b'|').unwrap();
        writer.close().unwrap();
        assert_eq!(platform.file("async.bin").unwrap(), b"------|");
    }

    #[test]
    fn test_poll_failure_surfaces_on_flush() {
        let platform = MemoryPlatform::new();
        let mut writer = open(&platform, 4);

        writer.write(b"data").unwrap();
        platform.inject_fault(Fault::Poll);
        let err = writer.flush().unwrap_err();
        assert!(err.is_device_error());
        assert!(err.os_code().is_some());
        writer.pool().check_invariants().unwrap();
    }

    #[test]
    fn test_submit_failure_keeps_offsets_disjoint() {
        let platform = MemoryPlatform::new();
        let mut writer = open(&platform, 4);

        platform.inject_fault(Fault::Submit);
        assert!(writer.write(&[1u8; 4]).unwrap_err().is_device_error());
        assert_eq!(writer.offset(), 0);
        writer.pool().check_invariants().unwrap();

        writer.write(&[2u8; 4]).unwrap();
        writer.close().unwrap();
        assert_eq!(platform.file("async.bin").unwrap(), vec![2u8; 4]);
    }

    #[test]
    fn test_mode_and_setbuf_misuse() {
        let platform = MemoryPlatform::new();
        let mut writer = AsyncFileWriter::new(8);
        let err = writer
            .open(&platform, Path::new("r"), OpenMode::READ)
            .unwrap_err();
        assert!(matches!(err, StreamError::InvalidMode { .. }));
        assert!(writer.write(b"x").unwrap_err().is_misuse());
        assert!(writer.setbuf(BufferMode::Unbuffered).unwrap_err().is_misuse());
    }

    #[test]
    fn test_provided_buffer_joins_pool() {
        let platform = MemoryPlatform::new();
        let mut writer = open(&platform, 8);
        writer.setbuf(BufferMode::Provided(vec![0u8; 64])).unwrap();

        writer.write(b"abc").unwrap();
        assert_eq!(writer.pool().len(), 1);
        writer.close().unwrap();
        assert_eq!(platform.file("async.bin").unwrap(), b"abc");
    }
}
