//! # Engine Strings
//!
//! Byte strings on the engine heap, plus the cursor the text-format parsers
//! are built on.
//!
//! ## Ownership
//!
//! A [`HeapString`] owns its bytes outright. Copies go through
//! [`HeapString::try_clone`] and never share storage.
//!
//! ## Encoding
//!
//! Strings are bytes with an explicit length, no terminator. UTF-8 is only
//! checked when a `&str` view is requested.

mod iter;

pub use iter::StringIterator;

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use crate::array::Array;
use crate::error::{OrFatal, RuntimeError, RuntimeResult};

/// How [`HeapString::split_with`] treats empty segments.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SplitMode {
    /// Keep every segment. `"a//b"` gives `["a", "", "b"]`.
    #[default]
    KeepEmpty,
    /// Drop zero-length segments. `"a//b"` gives `["a", "b"]`.
    SkipEmpty,
}

/// An owned byte string on the engine heap.
///
/// # Example
///
/// ```rust
/// use oroboros_runtime::{memory, HeapConfig, HeapString};
///
/// # let _ = memory::init(&HeapConfig::default());
/// let face: HeapString = "2/4/6".parse().unwrap();
/// let indices = face.split(b'/').unwrap();
/// assert_eq!(indices.len(), 3);
/// assert_eq!(indices[1], "4");
/// ```
#[derive(Default, PartialEq, Eq)]
pub struct HeapString {
    bytes: Array<u8>,
}

impl HeapString {
    /// An empty string. Does not allocate.
    #[must_use]
    pub const fn new() -> Self {
        Self { bytes: Array::new() }
    }

    /// Copies `bytes` into a new string.
    ///
    /// # Errors
    ///
    /// Any allocation error from the global heap.
    pub fn from_bytes(bytes: &[u8]) -> RuntimeResult<Self> {
        Ok(Self {
            bytes: Array::from_slice(bytes)?,
        })
    }

    /// Length in bytes.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the string has no bytes.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// The raw bytes.
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.bytes.as_slice()
    }

    /// The bytes as text.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::Utf8`] if the bytes are not valid UTF-8.
    pub fn as_str(&self) -> RuntimeResult<&str> {
        std::str::from_utf8(self.as_bytes()).map_err(|_| RuntimeError::Utf8)
    }

    /// Deep copy into a new allocation.
    ///
    /// # Errors
    ///
    /// Any allocation error from the global heap.
    pub fn try_clone(&self) -> RuntimeResult<Self> {
        Self::from_bytes(self.as_bytes())
    }

    /// Appends one byte.
    ///
    /// # Errors
    ///
    /// Any allocation error from the global heap.
    pub fn push(&mut self, byte: u8) -> RuntimeResult<()> {
        self.bytes.add(byte)
    }

    /// Appends text.
    ///
    /// # Errors
    ///
    /// Any allocation error from the global heap. Nothing is appended then.
    pub fn push_str(&mut self, text: &str) -> RuntimeResult<()> {
        self.bytes.extend_from_slice(text.as_bytes())
    }

    /// Splits on `separator`, keeping empty segments.
    ///
    /// `""` splits into one empty segment, `"/"` into two.
    ///
    /// # Errors
    ///
    /// Any allocation error from the global heap.
    pub fn split(&self, separator: u8) -> RuntimeResult<Array<HeapString>> {
        self.split_with(separator, SplitMode::KeepEmpty)
    }

    /// Splits on `separator` with an explicit empty-segment policy.
    ///
    /// # Errors
    ///
    /// Any allocation error from the global heap.
    pub fn split_with(&self, separator: u8, mode: SplitMode) -> RuntimeResult<Array<HeapString>> {
        let mut segments = Array::new();
        for segment in self.as_bytes().split(|&byte| byte == separator) {
            if mode == SplitMode::SkipEmpty && segment.is_empty() {
                continue;
            }
            segments.add(Self::from_bytes(segment)?)?;
        }
        Ok(segments)
    }

    /// The bytes without leading and trailing ASCII whitespace.
    #[must_use]
    pub fn trim(&self) -> &[u8] {
        trim_ascii(self.as_bytes())
    }

    /// Whether the string begins with `prefix`.
    #[must_use]
    pub fn starts_with(&self, prefix: impl AsRef<[u8]>) -> bool {
        self.as_bytes().starts_with(prefix.as_ref())
    }

    /// Whether the string ends with `suffix`.
    #[must_use]
    pub fn ends_with(&self, suffix: impl AsRef<[u8]>) -> bool {
        self.as_bytes().ends_with(suffix.as_ref())
    }

    /// Parses the trimmed text.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::Utf8`] or [`RuntimeError::Parse`].
    pub fn parse<T>(&self) -> RuntimeResult<T>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        parse_bytes(self.trim())
    }

    /// A cursor at the first byte.
    #[must_use]
    pub fn iter(&self) -> StringIterator<'_> {
        StringIterator::new(self.as_bytes())
    }
}

/// Strips ASCII whitespace from both ends.
fn trim_ascii(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|byte| !byte.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|byte| !byte.is_ascii_whitespace())
        .map_or(start, |last| last + 1);
    &bytes[start..end]
}

/// Parses `bytes` as UTF-8 text into `T`.
fn parse_bytes<T>(bytes: &[u8]) -> RuntimeResult<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    let text = std::str::from_utf8(bytes).map_err(|_| RuntimeError::Utf8)?;
    text.parse()
        .map_err(|error| RuntimeError::Parse(format!("{text:?}: {error}")))
}

impl FromStr for HeapString {
    type Err = RuntimeError;

    fn from_str(text: &str) -> RuntimeResult<Self> {
        Self::from_bytes(text.as_bytes())
    }
}

impl Clone for HeapString {
    #[track_caller]
    fn clone(&self) -> Self {
        self.try_clone().or_fatal("string clone")
    }
}

impl Hash for HeapString {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_bytes().hash(state);
    }
}

impl PartialEq<str> for HeapString {
    fn eq(&self, other: &str) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl PartialEq<&str> for HeapString {
    fn eq(&self, other: &&str) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl PartialEq<[u8]> for HeapString {
    fn eq(&self, other: &[u8]) -> bool {
        self.as_bytes() == other
    }
}

impl AsRef<[u8]> for HeapString {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl fmt::Display for HeapString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(self.as_bytes()))
    }
}

impl fmt::Debug for HeapString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&String::from_utf8_lossy(self.as_bytes()), f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::ensure_test_heap;

    fn heap(text: &str) -> HeapString {
        ensure_test_heap();
        HeapString::from_str(text).unwrap()
    }

    fn segments(parts: &Array<HeapString>) -> Vec<String> {
        parts.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_split_face_indices() {
        let parts = heap("2/4/6").split(b'/').unwrap();
        assert_eq!(segments(&parts), ["2", "4", "6"]);
    }

    #[test]
    fn test_split_keeps_empty_segments() {
        assert_eq!(segments(&heap("").split(b'/').unwrap()), [""]);
        assert_eq!(segments(&heap("1//3").split(b'/').unwrap()), ["1", "", "3"]);
        assert_eq!(segments(&heap("/").split(b'/').unwrap()), ["", ""]);
    }

    #[test]
    fn test_split_skip_empty() {
        let parts = heap("/1//3/").split_with(b'/', SplitMode::SkipEmpty).unwrap();
        assert_eq!(segments(&parts), ["1", "3"]);
        assert!(heap("").split_with(b'/', SplitMode::SkipEmpty).unwrap().is_empty());
    }

    #[test]
    fn test_copies_never_share_storage() {
        let original = heap("terrain");
        let mut copy = original.clone();
        copy.push_str("_lod1").unwrap();
        assert_eq!(original, "terrain");
        assert_eq!(copy, "terrain_lod1");
        assert_ne!(original.as_bytes().as_ptr(), copy.as_bytes().as_ptr());
    }

    #[test]
    fn test_trim_and_parse() {
        let value = heap("  42 \r\n");
        assert_eq!(value.trim(), b"42");
        assert_eq!(value.parse::<u32>(), Ok(42));
        assert!(matches!(heap("4x2").parse::<u32>(), Err(RuntimeError::Parse(_))));
        assert!(heap(" \t ").trim().is_empty());
    }

    #[test]
    fn test_utf8_checked_view() {
        ensure_test_heap();
        let raw = HeapString::from_bytes(&[0x66, 0xFF]).unwrap();
        assert_eq!(raw.as_str(), Err(RuntimeError::Utf8));
        assert_eq!(raw.parse::<u8>(), Err(RuntimeError::Utf8));
        assert_eq!(heap("ok").as_str(), Ok("ok"));
    }

    #[test]
    fn test_affixes_and_formatting() {
        let name = heap("shader.wgsl");
        assert!(name.starts_with("shader"));
        assert!(name.ends_with(b".wgsl"));
        assert!(!name.ends_with(".glsl"));
        assert_eq!(name.to_string(), "shader.wgsl");
        assert_eq!(format!("{name:?}"), "\"shader.wgsl\"");
    }

    #[test]
    fn test_push_bytes() {
        let mut line = HeapString::new();
        ensure_test_heap();
        for byte in b"vt" {
            line.push(*byte).unwrap();
        }
        assert_eq!(line.len(), 2);
        assert_eq!(line, "vt");
    }
}
