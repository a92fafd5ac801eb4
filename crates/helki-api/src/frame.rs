//! Engine.IO v3 long-polling frame codec.
//!
//! A polling response body carries zero or more frames. A frame starting
//! with byte `0x00` is binary-flagged: the length digits run up to a `0xFF`
//! terminator and the UTF-8 payload continues until the next `0x00` or the
//! end of the buffer. Any other frame is plain text, terminated by `0x00`,
//! a record separator (`0x1E`), or the end of the buffer; a leading
//! `<n>:` length prefix is stripped. Decoding is best-effort: malformed
//! trailing bytes are dropped silently, invalid UTF-8 is replaced, and
//! empty input yields an empty sequence.

use std::borrow::Cow;

const BINARY_MARKER: u8 = 0x00;
const BINARY_TERMINATOR: u8 = 0xFF;
const RECORD_SEPARATOR: u8 = 0x1E;

/// Decode one polling response body into its text messages.
///
/// Pure and stateless; the returned iterator is finite and restartable
/// from a fresh call.
pub fn decode(bytes: &[u8]) -> Frames<'_> {
    Frames { buf: bytes, pos: 0 }
}

/// Encode a payload as a length-prefixed frame ready for POST.
///
/// The prefix is the payload's character count, not its byte count.
pub fn encode(payload: &str) -> String {
    format!("{}:{}", payload.chars().count(), payload)
}

/// Iterator over the text messages in one polling response body.
pub struct Frames<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Iterator for Frames<'a> {
    type Item = Cow<'a, str>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.pos < self.buf.len() {
            if self.buf[self.pos] == BINARY_MARKER {
                if let Some(msg) = self.next_binary() {
                    return Some(msg);
                }
                // No terminator: malformed trailing bytes, dropped.
                return None;
            }
            if let Some(msg) = self.next_text() {
                return Some(msg);
            }
        }
        None
    }
}

impl<'a> Frames<'a> {
    /// Binary-flagged frame: skip the marker and length digits up to the
    /// `0xFF` terminator, then take the payload until the next `0x00`
    /// marker or end of buffer. The trailing `0x00`, when present, opens
    /// the next frame and is left in place.
    fn next_binary(&mut self) -> Option<Cow<'a, str>> {
        let after_marker = self.pos + 1;
        let terminator = self.buf[after_marker..]
            .iter()
            .position(|&b| b == BINARY_TERMINATOR)?;

        let start = after_marker + terminator + 1;
        let len = self.buf[start..]
            .iter()
            .position(|&b| b == BINARY_MARKER)
            .unwrap_or(self.buf.len() - start);
        let end = start + len;

        self.pos = end;
        Some(String::from_utf8_lossy(&self.buf[start..end]))
    }

    /// Plain-text frame: take bytes until `0x00`, `0x1E`, or end of
    /// buffer, consuming the delimiter. Empty frames are skipped.
    fn next_text(&mut self) -> Option<Cow<'a, str>> {
        let start = self.pos;
        let len = self.buf[start..]
            .iter()
            .position(|&b| b == BINARY_MARKER || b == RECORD_SEPARATOR)
            .unwrap_or(self.buf.len() - start);
        let end = start + len;

        self.pos = if end < self.buf.len() { end + 1 } else { end };
        if end == start {
            return None;
        }
        Some(strip_length_prefix(String::from_utf8_lossy(
            &self.buf[start..end],
        )))
    }
}

/// Strip a leading `<digits>:` length prefix from a text frame.
fn strip_length_prefix(msg: Cow<'_, str>) -> Cow<'_, str> {
    let digits = msg.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 || msg.as_bytes().get(digits) != Some(&b':') {
        return msg;
    }
    match msg {
        Cow::Borrowed(s) => Cow::Borrowed(&s[digits + 1..]),
        Cow::Owned(s) => Cow::Owned(s[digits + 1..].to_owned()),
    }
}

// ── Message classification ───────────────────────────────────────────

/// One decoded message, classified by its leading type token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// `0{json}` — session opened; the body carries the `sid`.
    Handshake(String),
    /// `1` — server is closing the session.
    Close,
    /// `2` — ping; the client must answer with a pong.
    Ping,
    /// `3` — pong.
    Pong,
    /// `40` — namespace connection acknowledged.
    NamespaceAck,
    /// `42...` — event envelope; carries everything after the type token.
    Event(String),
    /// `6` — no-op filler emitted on idle polls.
    Noop,
    /// Anything else; ignored by callers.
    Other(String),
}

impl Message {
    pub fn classify(text: &str) -> Self {
        if let Some(envelope) = text.strip_prefix("42") {
            return Self::Event(envelope.to_owned());
        }
        if text == "40" || text.starts_with("40/") {
            return Self::NamespaceAck;
        }
        if let Some(body) = text.strip_prefix('0') {
            return Self::Handshake(body.to_owned());
        }
        match text {
            "1" => Self::Close,
            "2" => Self::Ping,
            "3" => Self::Pong,
            "6" => Self::Noop,
            other => Self::Other(other.to_owned()),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────
