//! Bounded stream views: read-only windows over the shared source.
//!
//! A view is built from offsets already recorded in a part's ledger, so
//! reading it never re-runs the parser. Each view keeps its own position
//! and seeks the shared source on every read.

use std::io::{self, Read, Seek, SeekFrom};
use std::rc::Rc;

use super::cursor::SharedCursor;

/// A `Read + Seek` window `[start, end)` over the message source.
pub struct BoundedView {
    cursor: SharedCursor,
    start: u64,
    end: u64,
    /// Position relative to `start`.
    pos: u64,
}

impl BoundedView {
    /// Create a view over `[start, end)`.
    pub fn new(cursor: &SharedCursor, start: u64, end: u64) -> Self {
        debug_assert!(start <= end, "view range must not be inverted");
        Self {
            cursor: Rc::clone(cursor),
            start,
            end: end.max(start),
            pos: 0,
        }
    }

    /// Absolute offset of the first byte.
    pub fn start(&self) -> u64 {
        self.start
    }

    /// Absolute offset just past the last byte.
    pub fn end(&self) -> u64 {
        self.end
    }

    /// Length of the window in bytes.
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Read the whole window from the beginning, regardless of the current
    /// position. The position is left at the end.
    pub fn read_all(&mut self) -> io::Result<Vec<u8>> {
        self.pos = 0;
        let mut buf = Vec::with_capacity(self.len() as usize);
        self.read_to_end(&mut buf)?;
        Ok(buf)
    }
}

impl Read for BoundedView {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.len().saturating_sub(self.pos);
        if remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let want = (buf.len() as u64).min(remaining) as usize;
        let n = self
            .cursor
            .borrow_mut()
            .read_at(self.start + self.pos, &mut buf[..want])?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for BoundedView {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(n) => Some(n),
            SeekFrom::End(delta) => self.len().checked_add_signed(delta),
            SeekFrom::Current(delta) => self.pos.checked_add_signed(delta),
        };
        match target {
            Some(n) => {
                self.pos = n;
                Ok(n)
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "invalid seek to a negative or overflowing position",
            )),
        }
    }
}

impl std::fmt::Debug for BoundedView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedView")
            .field("start", &self.start)
            .field("end", &self.end)
            .field("pos", &self.pos)
            .finish()
    }
}
