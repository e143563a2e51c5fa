//! The single forward-reading cursor shared by every part of a message.
//!
//! Lines are read through a [`BufReader`] the same way the mbox scanner
//! does it: `fill_buf` + `consume`, never more than one physical line at a
//! time. Only the first `max_line_length` bytes of a line are kept for
//! classification; the remainder is skipped so memory stays bounded.

use std::cell::RefCell;
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom};
use std::rc::Rc;

use tracing::warn;

use crate::config::ParserConfig;

/// Anything the cursor can read lines from and later seek over.
pub trait Source: Read + Seek {}

impl<T: Read + Seek> Source for T {}

/// Cursor handle shared between the part tree and its bounded views.
pub type SharedCursor = Rc<RefCell<SourceCursor>>;

/// One physical line as seen by the parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    /// Offset of the first byte of the line.
    pub start: u64,
    /// Offset just past the line terminator.
    pub end: u64,
    /// Line bytes without the terminator, capped at `max_line_length`.
    pub text: Vec<u8>,
    /// Length of the terminator: 0 at EOF, 1 for `\n`, 2 for `\r\n`.
    pub ending: u8,
    /// `true` if `text` holds fewer bytes than the physical line.
    pub truncated: bool,
}

impl Line {
    /// The line with trailing whitespace removed, as used for delimiter
    /// comparison.
    pub fn trimmed(&self) -> &[u8] {
        let mut end = self.text.len();
        while end > 0 && matches!(self.text[end - 1], b' ' | b'\t' | b'\r') {
            end -= 1;
        }
        &self.text[..end]
    }

    /// Check whether the line has no content. A stray `\r` left before
    /// the terminator counts as empty; spaces and tabs do not.
    pub fn is_empty(&self) -> bool {
        matches!(self.text.as_slice(), [] | [b'\r'])
    }
}

/// Forward-reading, byte-seekable cursor over the raw message.
pub struct SourceCursor {
    reader: BufReader<Box<dyn Source>>,
    /// Logical position of the parser.
    position: u64,
    /// Position the underlying reader is actually at. Differs from
    /// `position` after a bounded view has read from the source.
    physical: u64,
    max_line_length: usize,
}

impl SourceCursor {
    /// Wrap a source positioned at its first byte.
    pub fn new(source: Box<dyn Source>, config: &ParserConfig) -> Self {
        Self {
            reader: BufReader::with_capacity(config.read_buffer_size.max(1), source),
            position: 0,
            physical: 0,
            max_line_length: config.max_line_length,
        }
    }

    /// Wrap the cursor in a shared handle.
    pub fn shared(self) -> SharedCursor {
        Rc::new(RefCell::new(self))
    }

    /// Current parser position.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Move the parser position back to a line start that has already been
    /// read. Used when the header reader peeks at the first body line.
    pub fn rewind_to(&mut self, offset: u64) {
        debug_assert!(offset <= self.position, "cursor only rewinds");
        self.position = offset;
    }

    /// Returns `true` if no bytes remain after the parser position.
    pub fn at_eof(&mut self) -> io::Result<bool> {
        self.sync()?;
        Ok(self.reader.fill_buf()?.is_empty())
    }

    /// Read the next physical line, or `None` at EOF.
    pub fn read_line(&mut self) -> io::Result<Option<Line>> {
        self.sync()?;

        let start = self.position;
        let mut text: Vec<u8> = Vec::with_capacity(128);
        let mut total: u64 = 0;
        let mut last_byte: Option<u8> = None;
        let mut ending: u8 = 0;

        loop {
            let buf = match self.reader.fill_buf() {
                Ok(buf) => buf,
                Err(e) => {
                    // Part of the line may already be consumed from the buffer.
                    self.physical = self.position + total;
                    return Err(e);
                }
            };
            if buf.is_empty() {
                break; // EOF
            }
            let newline_pos = memchr_newline(buf);
            let consume_len = match newline_pos {
                Some(pos) => pos + 1,
                None => buf.len(),
            };

            let room = self.max_line_length.saturating_sub(text.len());
            text.extend_from_slice(&buf[..consume_len.min(room)]);

            if newline_pos.is_some() {
                let before_newline = if consume_len >= 2 {
                    Some(buf[consume_len - 2])
                } else {
                    last_byte
                };
                ending = if before_newline == Some(b'\r') { 2 } else { 1 };
            } else {
                last_byte = buf.last().copied();
            }

            self.reader.consume(consume_len);
            total += consume_len as u64;
            if newline_pos.is_some() {
                break;
            }
        }

        if total == 0 {
            return Ok(None);
        }

        self.position += total;
        self.physical = self.position;

        let content_len = total - u64::from(ending);
        text.truncate(text.len().min(content_len as usize));
        let truncated = content_len > text.len() as u64;
        if truncated {
            warn!(
                offset = start,
                length = content_len,
                kept = text.len(),
                "Line exceeds maximum length, truncating for classification"
            );
        }

        Ok(Some(Line {
            start,
            end: self.position,
            text,
            ending,
            truncated,
        }))
    }

    /// Random-access read used by bounded views. Does not move the parser
    /// position.
    pub fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        if self.physical != offset {
            self.reader.seek(SeekFrom::Start(offset))?;
            self.physical = offset;
        }
        let n = self.reader.read(buf)?;
        self.physical += n as u64;
        Ok(n)
    }

    /// Bring the underlying reader back to the parser position.
    fn sync(&mut self) -> io::Result<()> {
        if self.physical != self.position {
            self.reader.seek(SeekFrom::Start(self.position))?;
            self.physical = self.position;
        }
        Ok(())
    }
}

/// Fast newline search (equivalent to memchr for `\n`).
#[inline]
fn memchr_newline(buf: &[u8]) -> Option<usize> {
    buf.iter().position(|&b| b == b'\n')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn cursor(data: &[u8]) -> SourceCursor {
        SourceCursor::new(Box::new(Cursor::new(data.to_vec())), &ParserConfig::default())
    }

    #[test]
    fn test_read_lines_with_mixed_endings() {
        let mut c = cursor(b"one\r\ntwo\nthree");
        let l1 = c.read_line().unwrap().unwrap();
        assert_eq!(l1.text, b"one");
        assert_eq!(l1.ending, 2);
        assert_eq!((l1.start, l1.end), (0, 5));

        let l2 = c.read_line().unwrap().unwrap();
        assert_eq!(l2.text, b"two");
        assert_eq!(l2.ending, 1);

        let l3 = c.read_line().unwrap().unwrap();
        assert_eq!(l3.text, b"three");
        assert_eq!(l3.ending, 0);
        assert_eq!(c.position(), 14);

        assert!(c.read_line().unwrap().is_none());
        assert!(c.at_eof().unwrap());
    }

    #[test]
    fn test_long_line_is_capped_but_fully_consumed() {
        let mut data = vec![b'a'; 5000];
        data.push(b'\n');
        data.extend_from_slice(b"next\n");
        let mut c = cursor(&data);

        let line = c.read_line().unwrap().unwrap();
        assert_eq!(line.text.len(), 4096);
        assert!(line.truncated);
        assert_eq!(c.position(), 5001);

        let next = c.read_line().unwrap().unwrap();
        assert_eq!(next.text, b"next");
    }

    #[test]
    fn test_long_line_across_small_buffers() {
        let config = ParserConfig {
            max_line_length: 8,
            read_buffer_size: 4,
            ..ParserConfig::default()
        };
        let mut c = SourceCursor::new(
            Box::new(Cursor::new(b"abcdefghijkl\r\nz".to_vec())),
            &config,
        );
        let line = c.read_line().unwrap().unwrap();
        assert_eq!(line.text, b"abcdefgh");
        assert_eq!(line.ending, 2);
        assert_eq!(line.end, 14);
    }

    #[test]
    fn test_read_at_does_not_move_parser() {
        let mut c = cursor(b"first\nsecond\n");
        c.read_line().unwrap();
        let mut buf = [0u8; 3];
        assert_eq!(c.read_at(0, &mut buf).unwrap(), 3);
        assert_eq!(&buf, b"fir");
        let line = c.read_line().unwrap().unwrap();
        assert_eq!(line.text, b"second");
    }

    #[test]
    fn test_rewind_rereads_line() {
        let mut c = cursor(b"a\nb\n");
        let a = c.read_line().unwrap().unwrap();
        c.rewind_to(a.start);
        assert_eq!(c.read_line().unwrap().unwrap().text, b"a");
    }

    #[test]
    fn test_trimmed_strips_padding() {
        let mut c = cursor(b"--abc \t\r\n");
        let line = c.read_line().unwrap().unwrap();
        assert_eq!(line.trimmed(), b"--abc");
    }

    #[test]
    fn test_only_content_free_lines_are_empty() {
        let mut c = cursor(b"\r\n \t\n\r\r\nx\n");
        assert!(c.read_line().unwrap().unwrap().is_empty());
        assert!(!c.read_line().unwrap().unwrap().is_empty());
        assert!(c.read_line().unwrap().unwrap().is_empty());
        assert!(!c.read_line().unwrap().unwrap().is_empty());
    }
}
