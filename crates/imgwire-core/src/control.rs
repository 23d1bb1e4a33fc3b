//! Session control lines and handshake tokens.
//!
//! Multi-image streams put a `v0` line in front of every envelope:
//! `v0 expect <K> images` while more images follow, `v0 hangup` once the
//! sender is done. `K` is a hint and is never checked against the number
//! of images that actually arrive.

use crate::wire::{WireError, SESSION_VERSION};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionLine {
    /// Another image follows; the sender expects to send `K` in total
    /// (0 = unknown).
    Expect(u32),
    /// No further images.
    Hangup,
}

impl SessionLine {
    pub fn encode(&self) -> String {
        match self {
            SessionLine::Expect(k) => format!("{SESSION_VERSION} expect {k} images"),
            SessionLine::Hangup => format!("{SESSION_VERSION} hangup"),
        }
    }

    pub fn decode(line: &str) -> Result<Self, WireError> {
        let malformed = || WireError::MalformedSessionLine(line.to_string());
        let mut tokens = line.split_whitespace();

        if tokens.next() != Some(SESSION_VERSION) {
            return Err(malformed());
        }
        match tokens.next() {
            Some(verb) if verb.starts_with("hangup") => Ok(SessionLine::Hangup),
            Some(verb) if verb.starts_with("expect") => tokens
                .next()
                .and_then(|k| k.parse().ok())
                .map(SessionLine::Expect)
                .ok_or_else(malformed),
            _ => Err(malformed()),
        }
    }
}

/// Handshake tokens are compared by prefix, as the peers do.
pub fn matches_token(message: &[u8], token: &str) -> bool {
    message.starts_with(token.as_bytes())
}
