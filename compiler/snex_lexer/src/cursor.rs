//! Byte cursor over a sentinel-terminated buffer.
//!
//! The cursor advances byte-by-byte; EOF is detected when the current byte
//! equals the sentinel (`0x00`) and the position has reached the source
//! length. The sentinel guarantees safe termination without bounds checks
//! in the common case.

use memchr::memchr;

/// Sentinel byte appended after the source text.
pub const SENTINEL: u8 = 0x00;

pub struct Cursor<'a> {
    /// Source bytes followed by one sentinel byte.
    buf: &'a [u8],
    /// Length of the source, excluding the sentinel.
    source_len: usize,
    pos: usize,
}

impl<'a> Cursor<'a> {
    /// Create a cursor over `buf`, whose last byte must be the sentinel.
    pub fn new(buf: &'a [u8]) -> Self {
        debug_assert_eq!(buf.last(), Some(&SENTINEL), "buffer must be sentinel-terminated");
        Cursor {
            buf,
            source_len: buf.len() - 1,
            pos: 0,
        }
    }

    #[inline]
    pub fn pos(&self) -> u32 {
        self.pos as u32
    }

    #[inline]
    pub fn source_len(&self) -> usize {
        self.source_len
    }

    #[inline]
    pub fn is_eof(&self) -> bool {
        self.pos >= self.source_len
    }

    /// Current byte; the sentinel once at or past EOF.
    #[inline]
    pub fn current(&self) -> u8 {
        self.buf[self.pos.min(self.source_len)]
    }

    /// Byte after the current one, sentinel at the boundary.
    #[inline]
    pub fn peek(&self) -> u8 {
        self.buf[(self.pos + 1).min(self.source_len)]
    }

    #[inline]
    pub fn advance(&mut self) {
        if self.pos < self.source_len {
            self.pos += 1;
        }
    }

    /// Slice of source bytes in `start..end`.
    #[inline]
    pub fn slice(&self, start: u32, end: u32) -> &'a [u8] {
        &self.buf[start as usize..end as usize]
    }

    /// Advance while `pred` holds for the current byte. The sentinel never
    /// satisfies a lexeme predicate, so this terminates at EOF naturally.
    pub fn eat_while(&mut self, pred: impl Fn(u8) -> bool) {
        while self.pos < self.source_len && pred(self.buf[self.pos]) {
            self.pos += 1;
        }
    }

    /// Skip to the next `\n` (exclusive of the newline itself).
    pub fn skip_to_line_end(&mut self) {
        match memchr(b'\n', &self.buf[self.pos..self.source_len]) {
            Some(off) => self.pos += off,
            None => self.pos = self.source_len,
        }
    }

    /// Find the next occurrence of `needle` from the current position,
    /// returning its absolute offset.
    pub fn find(&self, needle: u8) -> Option<usize> {
        memchr(needle, &self.buf[self.pos..self.source_len]).map(|off| self.pos + off)
    }

    /// Move the cursor to an absolute position, clamped to EOF.
    pub fn seek(&mut self, pos: usize) {
        self.pos = pos.min(self.source_len);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cursor_for(src: &str) -> (Vec<u8>, usize) {
        let mut buf = src.as_bytes().to_vec();
        buf.push(SENTINEL);
        let len = src.len();
        (buf, len)
    }

    #[test]
    fn sentinel_terminates() {
        let (buf, _) = cursor_for("ab");
        let mut c = Cursor::new(&buf);
        assert_eq!(c.current(), b'a');
        c.advance();
        assert_eq!(c.current(), b'b');
        c.advance();
        assert!(c.is_eof());
        assert_eq!(c.current(), SENTINEL);
        c.advance(); // sticky at EOF
        assert!(c.is_eof());
    }

    #[test]
    fn eat_while_stops_at_eof() {
        let (buf, _) = cursor_for("aaa");
        let mut c = Cursor::new(&buf);
        c.eat_while(|b| b == b'a');
        assert!(c.is_eof());
        assert_eq!(c.pos(), 3);
    }

    #[test]
    fn skip_to_line_end() {
        let (buf, _) = cursor_for("// hi\nx");
        let mut c = Cursor::new(&buf);
        c.skip_to_line_end();
        assert_eq!(c.current(), b'\n');
    }
}
