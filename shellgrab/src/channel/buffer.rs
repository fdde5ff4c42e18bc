//! Output accumulation buffer with tail-limited searches.
//!
//! Prompt detection only ever looks at the last `search_depth` bytes, so a
//! multi-megabyte configuration dump costs the same to check as a one-line
//! reply.

use std::borrow::Cow;
use std::fmt;

use vte::{Parser, Perform};

/// Buffer for accumulating shell output and searching it for prompts.
///
/// Escape sequences are stripped by one parser that lives as long as the
/// buffer, so a sequence or UTF-8 character split across reads is handled
/// the same as one that arrives whole.
pub struct PatternBuffer {
    /// The accumulated output buffer.
    buffer: Vec<u8>,

    /// How many bytes from the end to search for patterns.
    search_depth: usize,

    /// Escape parser, carries partial sequences between chunks.
    parser: Parser,
}

/// Keeps printable text, newlines and tabs.
struct Printable<'a>(&'a mut Vec<u8>);

impl Perform for Printable<'_> {
    fn print(&mut self, c: char) {
        let mut utf8 = [0u8; 4];
        self.0.extend_from_slice(c.encode_utf8(&mut utf8).as_bytes());
    }

    fn execute(&mut self, byte: u8) {
        if matches!(byte, b'\n' | b'\t') {
            self.0.push(byte);
        }
    }
}

impl PatternBuffer {
    /// Create a new pattern buffer with the specified search depth.
    pub fn new(search_depth: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(4096),
            search_depth,
            parser: Parser::new(),
        }
    }

    /// Extend the buffer with new data, stripping ANSI escape codes.
    pub fn extend(&mut self, data: &[u8]) {
        self.parser.advance(&mut Printable(&mut self.buffer), data);
    }

    /// The searchable tail of the buffer.
    fn tail(&self) -> &[u8] {
        let start = self.buffer.len().saturating_sub(self.search_depth);
        &self.buffer[start..]
    }

    /// The final, not yet newline-terminated line, with a trailing `\r` removed.
    ///
    /// Empty when the buffer ends in a newline. Only the searchable tail is
    /// considered, so a line longer than `search_depth` is cut at the front.
    pub fn trailing_line(&self) -> &[u8] {
        let tail = self.tail();
        let start = memchr::memrchr(b'\n', tail).map_or(0, |pos| pos + 1);
        let line = &tail[start..];
        line.strip_suffix(b"\r").unwrap_or(line)
    }

    /// Get a reference to the buffer contents.
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    /// Get the buffer contents as a string (lossy UTF-8 conversion).
    pub fn as_str_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.buffer)
    }

    /// Get the current buffer length.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

impl fmt::Debug for PatternBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PatternBuffer")
            .field("len", &self.buffer.len())
            .field("search_depth", &self.search_depth)
            .finish_non_exhaustive()
    }
}

impl Default for PatternBuffer {
    fn default() -> Self {
        Self::new(1000)
    }
}
