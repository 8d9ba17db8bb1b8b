//! Byte cursor over a string.
//!
//! The cursor sits just past the most recently returned byte:
//!
//! ```text
//!   "a b"
//!    ▲       cursor 0: next() = 'a', previous() = empty
//!     ▲      cursor 1: next() = ' ', previous() = empty (back at 0)
//!        ▲   cursor 3: next() = empty, stays at 3
//! ```

use std::fmt;
use std::iter::FusedIterator;
use std::str::FromStr;

use crate::error::{RuntimeError, RuntimeResult};

/// Restartable cursor over a byte string.
///
/// Yields bytes forward as an [`Iterator`], and can also step back, peek,
/// and carve out substrings for line- and token-oriented parsers.
///
/// # Example
///
/// ```rust
/// use oroboros_runtime::StringIterator;
///
/// let mut line = StringIterator::new(b"v 1.0 -2.5 0.25");
/// assert_eq!(line.next_token(), Some(&b"v"[..]));
/// let x: f32 = line.parse_next().unwrap();
/// let y: f32 = line.parse_next().unwrap();
/// assert_eq!((x, y), (1.0, -2.5));
/// ```
#[derive(Clone)]
pub struct StringIterator<'a> {
    bytes: &'a [u8],
    cursor: usize,
}

impl<'a> StringIterator<'a> {
    /// A cursor at the first byte of `bytes`.
    #[must_use]
    pub const fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, cursor: 0 }
    }

    /// Bytes consumed so far.
    #[must_use]
    pub const fn cursor(&self) -> usize {
        self.cursor
    }

    /// Whether every byte has been consumed.
    #[must_use]
    pub const fn is_at_end(&self) -> bool {
        self.cursor >= self.bytes.len()
    }

    /// The unconsumed bytes.
    #[must_use]
    pub fn remaining(&self) -> &'a [u8] {
        &self.bytes[self.cursor..]
    }

    /// The next byte, without consuming it.
    #[must_use]
    pub fn peek(&self) -> Option<u8> {
        self.bytes.get(self.cursor).copied()
    }

    /// Steps back one byte and returns the byte now before the cursor.
    ///
    /// Empty once the cursor reaches the start; it never moves below 0.
    pub fn previous(&mut self) -> Option<u8> {
        self.cursor = self.cursor.checked_sub(1)?;
        self.cursor.checked_sub(1).map(|before| self.bytes[before])
    }

    /// Restarts at the first byte.
    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    /// Consumes bytes while `predicate` holds. Returns how many.
    pub fn advance_while(&mut self, mut predicate: impl FnMut(u8) -> bool) -> usize {
        let start = self.cursor;
        while let Some(byte) = self.peek() {
            if !predicate(byte) {
                break;
            }
            self.cursor += 1;
        }
        self.cursor - start
    }

    /// Consumes bytes while `predicate` holds and returns them.
    ///
    /// Empty if nothing was consumed.
    pub fn collect_while(&mut self, predicate: impl FnMut(u8) -> bool) -> Option<&'a [u8]> {
        let start = self.cursor;
        match self.advance_while(predicate) {
            0 => None,
            _ => Some(&self.bytes[start..self.cursor]),
        }
    }

    /// Consumes bytes until `predicate` holds and returns them. The
    /// matching byte is left unconsumed.
    ///
    /// Empty if nothing was consumed.
    pub fn collect_till(&mut self, mut predicate: impl FnMut(u8) -> bool) -> Option<&'a [u8]> {
        self.collect_while(|byte| !predicate(byte))
    }

    /// Consumes ASCII whitespace, including line breaks. Returns how many.
    pub fn skip_whitespace(&mut self) -> usize {
        self.advance_while(|byte| byte.is_ascii_whitespace())
    }

    /// The next whitespace-delimited token.
    pub fn next_token(&mut self) -> Option<&'a [u8]> {
        self.skip_whitespace();
        self.collect_till(|byte| byte.is_ascii_whitespace())
    }

    /// The rest of the current line, without its `\n` or `\r\n`.
    ///
    /// Blank lines come back as an empty slice; only the end of input is
    /// empty.
    pub fn next_line(&mut self) -> Option<&'a [u8]> {
        if self.is_at_end() {
            return None;
        }
        let line = self.collect_till(|byte| byte == b'\n').unwrap_or_default();
        if self.peek() == Some(b'\n') {
            self.cursor += 1;
        }
        Some(line.strip_suffix(b"\r").unwrap_or(line))
    }

    /// Parses the next token.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::Parse`] at the end of input or when the token does
    /// not parse, [`RuntimeError::Utf8`] when it is not text.
    pub fn parse_next<T>(&mut self) -> RuntimeResult<T>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        let token = self
            .next_token()
            .ok_or_else(|| RuntimeError::Parse("unexpected end of input".into()))?;
        super::parse_bytes(token)
    }
}

impl Iterator for StringIterator<'_> {
    type Item = u8;

    /// The byte at the cursor. Saturates at the end.
    fn next(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        self.cursor += 1;
        Some(byte)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.bytes.len() - self.cursor;
        (left, Some(left))
    }
}

impl ExactSizeIterator for StringIterator<'_> {}

impl FusedIterator for StringIterator<'_> {}

impl fmt::Debug for StringIterator<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StringIterator")
            .field("cursor", &self.cursor)
            .field("len", &self.bytes.len())
            .finish()
    }
}
