//! Line framing for the chat protocol
//!
//! Inbound bytes are tokenized on `\n`; a preceding `\r` is stripped so both
//! `\r\n` and bare `\n` clients work. Outbound lines get a single `\n`,
//! prompts are written as-is.

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::LineError;

/// Default upper bound on a single inbound line, in bytes
pub const DEFAULT_MAX_LINE_LENGTH: usize = 4096;

/// Server → Client frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// A complete line, terminated with `\n` on the wire
    Line(String),
    /// Text written without a terminator (e.g. the username prompt)
    Prompt(String),
}

/// Newline-delimited UTF-8 codec
#[derive(Debug, Clone)]
pub struct LineCodec {
    max_length: usize,
    /// Where to resume scanning for `\n` on the next `decode` call
    next_index: usize,
}

impl LineCodec {
    /// Create a codec with the default maximum line length
    pub fn new() -> Self {
        Self::with_max_length(DEFAULT_MAX_LINE_LENGTH)
    }

    /// Create a codec that rejects lines longer than `max_length` bytes
    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            max_length,
            next_index: 0,
        }
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = LineError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<String>, LineError> {
        let newline = buf[self.next_index..]
            .iter()
            .position(|b| *b == b'\n')
            .map(|offset| self.next_index + offset);

        let Some(newline) = newline else {
            // Leave room for a trailing '\r' that has not been followed by '\n' yet
            if buf.len() > self.max_length.saturating_add(1) {
                return Err(LineError::TooLong {
                    max: self.max_length,
                });
            }
            self.next_index = buf.len();
            return Ok(None);
        };

        self.next_index = 0;
        let mut line = buf.split_to(newline + 1);
        line.truncate(newline);
        if line.last() == Some(&b'\r') {
            line.truncate(line.len() - 1);
        }

        if line.len() > self.max_length {
            return Err(LineError::TooLong {
                max: self.max_length,
            });
        }

        std::str::from_utf8(&line)
            .map(|text| Some(text.to_owned()))
            .map_err(|_| LineError::InvalidUtf8)
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<String>, LineError> {
        if let Some(line) = self.decode(buf)? {
            return Ok(Some(line));
        }

        if buf.is_empty() {
            return Ok(None);
        }

        let leftover = buf.len();
        buf.clear();
        self.next_index = 0;
        Err(LineError::Unterminated(leftover))
    }
}

impl Encoder<Outbound> for LineCodec {
    type Error = LineError;

    fn encode(&mut self, item: Outbound, dst: &mut BytesMut) -> Result<(), LineError> {
        match item {
            Outbound::Line(text) => {
                dst.reserve(text.len() + 1);
                dst.put_slice(text.as_bytes());
                dst.put_u8(b'\n');
            }
            Outbound::Prompt(text) => {
                dst.put_slice(text.as_bytes());
            }
        }
        Ok(())
    }
}
