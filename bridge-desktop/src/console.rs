//! Console and standard-handle devices
//!
//! Terminals are exposed as 16-bit devices so the stream engine drives them
//! with the same UTF-16 code path on every desktop platform; the device
//! converts to and from the terminal's UTF-8 at the boundary. Redirected
//! handles are plain byte devices.

use std::collections::VecDeque;
use std::io::{self, BufRead, Read, Write};

use bridge_traits::{
    device::{Device, SeekOrigin},
    error::{BridgeError, Result},
    platform::StdHandleKind,
};

const REPLACEMENT: char = '\u{FFFD}';

fn is_high_surrogate(unit: u16) -> bool {
    (0xD800..0xDC00).contains(&unit)
}

fn writer_for(kind: StdHandleKind) -> Box<dyn Write + Send> {
    match kind {
        StdHandleKind::Error => Box::new(io::stderr()),
        _ => Box::new(io::stdout()),
    }
}

fn no_seek() -> BridgeError {
    BridgeError::NotAvailable("seek on a standard handle".to_string())
}

/// UTF-16 console output over a terminal's stdout or stderr
pub struct ConsoleOut {
    out: Box<dyn Write + Send>,
    // High surrogate left over from the previous write
    carry: Option<u16>,
}

impl ConsoleOut {
    pub fn new(kind: StdHandleKind) -> Self {
        Self {
            out: writer_for(kind),
            carry: None,
        }
    }

    fn transcode(&mut self, data: &[u16]) -> String {
        let mut units: Vec<u16> = Vec::with_capacity(data.len() + 1);
        units.extend(self.carry.take());
        units.extend_from_slice(data);

        if let Some(&last) = units.last() {
            if is_high_surrogate(last) {
                self.carry = units.pop();
            }
        }

        char::decode_utf16(units.iter().copied())
            .map(|r| r.unwrap_or(REPLACEMENT))
            .collect()
    }
}

impl Device for ConsoleOut {
    type Unit = u16;

    fn write(&mut self, data: &[u16]) -> Result<()> {
        let text = self.transcode(data);
        self.out.write_all(text.as_bytes()).map_err(BridgeError::Io)?;
        self.out.flush().map_err(BridgeError::Io)
    }

    fn read(&mut self, _buf: &mut [u16]) -> Result<usize> {
        Err(BridgeError::NotAvailable("read from console output".to_string()))
    }

    fn seek(&mut self, _offset: i64, _origin: SeekOrigin) -> Result<u64> {
        Err(no_seek())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(_orphan) = self.carry.take() {
            self.out
                .write_all(REPLACEMENT.to_string().as_bytes())
                .map_err(BridgeError::Io)?;
        }
        self.out.flush().map_err(BridgeError::Io)
    }
}

/// UTF-16 console input over a terminal's stdin.
///
/// Reads one line at a time from the terminal, like a cooked-mode console.
pub struct ConsoleIn {
    pending: VecDeque<u16>,
}

impl ConsoleIn {
    pub fn new() -> Self {
        Self {
            pending: VecDeque::new(),
        }
    }
}

impl Default for ConsoleIn {
    fn default() -> Self {
        Self::new()
    }
}

impl Device for ConsoleIn {
    type Unit = u16;

    fn write(&mut self, _data: &[u16]) -> Result<()> {
        Err(BridgeError::NotAvailable("write to console input".to_string()))
    }

    fn read(&mut self, buf: &mut [u16]) -> Result<usize> {
        if self.pending.is_empty() {
            let mut line = String::new();
            let n = io::stdin().lock().read_line(&mut line).map_err(BridgeError::Io)?;
            if n == 0 {
                return Ok(0);
            }
            self.pending.extend(line.encode_utf16());
        }

        let count = buf.len().min(self.pending.len());
        for (slot, unit) in buf.iter_mut().zip(self.pending.drain(..count)) {
            *slot = unit;
        }
        Ok(count)
    }

    fn seek(&mut self, _offset: i64, _origin: SeekOrigin) -> Result<u64> {
        Err(no_seek())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Byte device over a redirected standard handle
pub struct StdStreamDevice {
    kind: StdHandleKind,
    out: Option<Box<dyn Write + Send>>,
}

impl StdStreamDevice {
    pub fn new(kind: StdHandleKind) -> Self {
        let out = match kind {
            StdHandleKind::Input => None,
            other => Some(writer_for(other)),
        };
        Self { kind, out }
    }
}

impl Device for StdStreamDevice {
    type Unit = u8;

    fn write(&mut self, data: &[u8]) -> Result<()> {
        let out = self
            .out
            .as_mut()
            .ok_or_else(|| BridgeError::NotAvailable(format!("write to {:?}", self.kind)))?;
        out.write_all(data).map_err(BridgeError::Io)?;
        out.flush().map_err(BridgeError::Io)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.kind != StdHandleKind::Input {
            return Err(BridgeError::NotAvailable(format!("read from {:?}", self.kind)));
        }
        loop {
            match io::stdin().lock().read(buf) {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(BridgeError::Io(e)),
            }
        }
    }

    fn seek(&mut self, _offset: i64, _origin: SeekOrigin) -> Result<u64> {
        Err(no_seek())
    }

    fn close(&mut self) -> Result<()> {
        match self.out.as_mut() {
            Some(out) => out.flush().map_err(BridgeError::Io),
            None => Ok(()),
        }
    }
}
