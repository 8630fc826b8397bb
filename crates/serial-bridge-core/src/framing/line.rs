//! Newline-delimited record framer for serial byte streams.
//!
//! # Why a framer is needed
//!
//! A serial port is a *stream*: a single `read()` may return half a line, or
//! three lines and the start of a fourth.  Devices that talk in text (the
//! typical microcontroller `println!` / `Serial.println()` output) terminate
//! each record with `\n`, often preceded by `\r`.  The [`LineFramer`]
//! accumulates chunks until a delimiter arrives and then hands back every
//! complete record, keeping any trailing partial line for the next call.
//!
//! ```text
//! feed("A\nB\n")  →  ["A", "B"]      buffer: ""
//! feed("C\nD")    →  ["C"]           buffer: "D"
//! feed("\r\n")    →  ["D"]           buffer: ""
//! ```
//!
//! The framer is scoped to exactly one open device.  Whoever owns it must call
//! [`LineFramer::reset`] when that device is replaced or closed so that bytes
//! from the old device never prefix the new device's first record.
//!
//! # Bounded buffering
//!
//! A device that never emits a delimiter would otherwise grow the buffer
//! forever.  A record longer than `max_record_len` bytes (counting a trailing
//! `\r`, not counting the `\n`) is never emitted.  As soon as the framer sees
//! that the current record is too long it reports one [`Framed::Overflow`],
//! drops what it holds, and keeps dropping bytes up to and including the next
//! delimiter.  The output is therefore the same however the stream happens to
//! be split into chunks.

use tracing::debug;

/// The record delimiter byte.
pub const DELIMITER: u8 = b'\n';

/// Default cap on the length of a single record (64 KiB).
pub const DEFAULT_MAX_RECORD_LEN: usize = 64 * 1024;

/// One item produced by [`LineFramer::feed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Framed {
    /// A complete record with the delimiter (and an optional trailing `\r`)
    /// stripped.
    Record(Vec<u8>),

    /// A record grew past the configured cap and is being thrown away.
    Overflow,
}

/// Accumulates raw byte chunks and splits them into `\n`-terminated records.
#[derive(Debug, Clone)]
pub struct LineFramer {
    /// Bytes received since the last delimiter.  Never contains `\n` and
    /// never exceeds `max_record_len` between calls to [`feed`](Self::feed).
    buffer: Vec<u8>,
    max_record_len: usize,
    /// Set after an overflow; cleared by the next delimiter.
    discarding: bool,
}

impl LineFramer {
    /// Creates an empty framer with the [`DEFAULT_MAX_RECORD_LEN`] cap.
    pub fn new() -> Self {
        Self::with_max_record_len(DEFAULT_MAX_RECORD_LEN)
    }

    /// Creates an empty framer that rejects records longer than
    /// `max_record_len` bytes.
    pub fn with_max_record_len(max_record_len: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_record_len,
            discarding: false,
        }
    }

    /// Appends `chunk` and returns every record completed by it, in order.
    ///
    /// The returned list is empty when `chunk` contains no delimiter.  Any
    /// suffix after the last delimiter stays buffered.  An over-long record
    /// shows up as a single [`Framed::Overflow`] in its place.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use serial_bridge_core::{Framed, LineFramer};
    ///
    /// let mut framer = LineFramer::new();
    /// assert_eq!(
    ///     framer.feed(b"temp=21\r\nhum"),
    ///     vec![Framed::Record(b"temp=21".to_vec())]
    /// );
    /// assert_eq!(framer.buffered(), b"hum");
    /// ```
    pub fn feed(&mut self, mut chunk: &[u8]) -> Vec<Framed> {
        let mut out = Vec::new();

        while !chunk.is_empty() {
            let delimiter = chunk.iter().position(|&b| b == DELIMITER);

            if self.discarding {
                let Some(end) = delimiter else {
                    break;
                };
                self.discarding = false;
                chunk = &chunk[end + 1..];
                continue;
            }

            match delimiter {
                Some(end) => {
                    let line = &chunk[..end];
                    if self.buffer.len() + line.len() > self.max_record_len {
                        self.overflow(&mut out);
                    } else {
                        self.buffer.extend_from_slice(line);
                        let mut record = self.buffer.as_slice();
                        if let Some((&b'\r', rest)) = record.split_last() {
                            record = rest;
                        }
                        out.push(Framed::Record(record.to_vec()));
                        self.buffer.clear();
                    }
                    chunk = &chunk[end + 1..];
                }
                None => {
                    if self.buffer.len() + chunk.len() > self.max_record_len {
                        self.overflow(&mut out);
                        self.discarding = true;
                    } else {
                        self.buffer.extend_from_slice(chunk);
                    }
                    break;
                }
            }
        }

        out
    }

    fn overflow(&mut self, out: &mut Vec<Framed>) {
        debug!(
            "line framer overflow: record longer than {} bytes dropped",
            self.max_record_len
        );
        self.buffer.clear();
        out.push(Framed::Overflow);
    }

    /// Discards any buffered partial record.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.discarding = false;
    }

    /// Returns the bytes currently held back waiting for a delimiter.
    pub fn buffered(&self) -> &[u8] {
        &self.buffer
    }

    /// Returns the configured cap on record length.
    pub fn max_record_len(&self) -> usize {
        self.max_record_len
    }
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
