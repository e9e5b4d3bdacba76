//! Incremental parser for `multipart/mixed` response bodies.
//!
//! Incremental delivery sends one JSON document per part:
//!
//! ```text
//! \r\n---\r\n
//! content-type: application/json; charset=utf-8\r\n
//! \r\n
//! {"data":{...},"hasNext":true}\r\n
//! ---\r\n
//! content-type: application/json; charset=utf-8\r\n
//! \r\n
//! {"incremental":[...],"hasNext":false}\r\n
//! -----\r\n
//! ```
//!
//! Network reads do not line up with part boundaries, so the parser buffers bytes and
//! emits every part body that became complete with the latest read. A part is
//! complete once the next delimiter (`\r\n--{boundary}`) has been seen.
//!
//! # Parsing Flow
//!
//! 1. **Preamble**: skip bytes until the first `--{boundary}`
//! 2. **Delimiter**: after a delimiter, `--` closes the body, anything else ends the line
//! 3. **Headers**: skip part headers up to the blank line
//! 4. **Body**: accumulate until the next delimiter, then emit
//! 5. **Complete**: closing delimiter seen, remaining bytes are epilogue
//!
//! # Examples
//!
//! ```
//! use gallery_graphql_http::client::{MultipartParser, ParseState};
//!
//! let mut parser = MultipartParser::new("-");
//! let first = parser.feed(b"\r\n---\r\ncontent-type: application/json\r\n\r\n{\"hasNext\":true}").unwrap();
//! assert!(first.is_empty());
//!
//! let second = parser.feed(b"\r\n-----\r\n").unwrap();
//! assert_eq!(second.len(), 1);
//! assert_eq!(parser.state(), ParseState::Complete);
//! ```

use crate::error::{Result, TransportError};
use bytes::{Buf, Bytes, BytesMut};

const CRLF: &[u8] = b"\r\n";
const HEADER_END: &[u8] = b"\r\n\r\n";

/// Upper bound on buffered bytes for a single part.
const MAX_PART_SIZE: usize = 64 * 1024 * 1024;

/// Parse state for the multipart parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseState {
    /// Before the first delimiter
    Preamble,
    /// Just consumed a delimiter, deciding between a new part and the end of the body
    Delimiter,
    /// Skipping part headers
    Headers,
    /// Accumulating a part body
    Body,
    /// Closing delimiter seen
    Complete,
}

/// Streaming `multipart/mixed` parser.
#[derive(Debug)]
pub struct MultipartParser {
    /// Bytes received but not yet consumed
    buffer: BytesMut,
    /// `--{boundary}`
    delimiter: Vec<u8>,
    /// `\r\n--{boundary}`, which ends a part body
    body_end: Vec<u8>,
    state: ParseState,
    /// Buffer offset already searched for the current needle without a match
    scanned: usize,
}

impl MultipartParser {
    /// Create a parser for the given boundary (without the leading `--`).
    pub fn new(boundary: &str) -> Self {
        let delimiter = format!("--{}", boundary).into_bytes();
        let mut body_end = CRLF.to_vec();
        body_end.extend_from_slice(&delimiter);

        MultipartParser {
            buffer: BytesMut::with_capacity(8192),
            delimiter,
            body_end,
            state: ParseState::Preamble,
            scanned: 0,
        }
    }

    /// Feed bytes to the parser, returning the bodies of all parts completed by them.
    pub fn feed(&mut self, data: &[u8]) -> Result<Vec<Bytes>> {
        if self.state == ParseState::Complete {
            return Ok(Vec::new());
        }

        self.buffer.extend_from_slice(data);
        let mut parts = Vec::new();

        loop {
            match self.state {
                ParseState::Preamble => match scan(&self.buffer, &mut self.scanned, &self.delimiter) {
                    Some(pos) => {
                        self.buffer.advance(pos + self.delimiter.len());
                        self.state = ParseState::Delimiter;
                    }
                    None => break,
                },
                ParseState::Delimiter => {
                    if self.buffer.len() < 2 {
                        break;
                    }
                    if self.buffer.starts_with(b"--") {
                        self.buffer.clear();
                        self.state = ParseState::Complete;
                        break;
                    }
                    // Transport padding may follow the delimiter on the same line.
                    match scan(&self.buffer, &mut self.scanned, CRLF) {
                        Some(pos) => {
                            self.buffer.advance(pos + CRLF.len());
                            self.state = ParseState::Headers;
                        }
                        None => break,
                    }
                }
                ParseState::Headers => {
                    if self.buffer.starts_with(CRLF) {
                        self.buffer.advance(CRLF.len());
                        self.scanned = 0;
                        self.state = ParseState::Body;
                        continue;
                    }
                    match scan(&self.buffer, &mut self.scanned, HEADER_END) {
                        Some(pos) => {
                            self.buffer.advance(pos + HEADER_END.len());
                            self.state = ParseState::Body;
                        }
                        None => break,
                    }
                }
                ParseState::Body => match scan(&self.buffer, &mut self.scanned, &self.body_end) {
                    Some(pos) => {
                        let body = self.buffer.split_to(pos).freeze();
                        // Leave `--{boundary}` in place for the preamble search.
                        self.buffer.advance(CRLF.len());
                        self.state = ParseState::Preamble;
                        if !body.iter().all(u8::is_ascii_whitespace) {
                            parts.push(body);
                        }
                    }
                    None => break,
                },
                ParseState::Complete => break,
            }
        }

        if self.buffer.len() > MAX_PART_SIZE {
            return Err(TransportError::Multipart(format!(
                "part exceeds {} bytes without a delimiter",
                MAX_PART_SIZE
            )));
        }

        Ok(parts)
    }

    /// Get current parse state
    pub fn state(&self) -> ParseState {
        self.state
    }

    /// Whether the closing delimiter has been seen.
    pub fn is_complete(&self) -> bool {
        self.state == ParseState::Complete
    }

    /// Whether a part has started but not been terminated by a delimiter.
    ///
    /// A body that ends while this is true was truncated mid-part. Ending between
    /// parts (or before the first one) is not.
    pub fn has_pending(&self) -> bool {
        match self.state {
            ParseState::Headers => !self.buffer.is_empty(),
            ParseState::Body => !self.buffer.iter().all(u8::is_ascii_whitespace),
            _ => false,
        }
    }
}

/// Search for `needle`, resuming where the previous miss left off.
///
/// `scanned` is reset on a match, since the caller then consumes the buffer up to it.
fn scan(haystack: &[u8], scanned: &mut usize, needle: &[u8]) -> Option<usize> {
    let start = (*scanned).min(haystack.len());
    match find(&haystack[start..], needle) {
        Some(pos) => {
            *scanned = 0;
            Some(start + pos)
        }
        None => {
            // A needle may straddle the end of what has arrived so far.
            *scanned = haystack.len().saturating_sub(needle.len() - 1);
            None
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
