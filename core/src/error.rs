/*
 * error.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of smtptrack, a tracking SMTP relay.
 *
 * smtptrack is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * smtptrack is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with smtptrack.  If not, see <http://www.gnu.org/licenses/>.
 */

//! Error types for the relay, the tracker bindings, and header decoding.

use std::io;

use thiserror::Error;

/// Failures of one connection pair or one DATA transaction.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Unexpected reply ordering or code from the next hop. Fatal to the pair.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),
    /// Socket-level failure on either leg. Fatal to the pair.
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),
    #[error("message exceeds {limit} bytes")]
    OversizedMessage { limit: usize },
    #[error("tracker handler failed: {0}")]
    Handler(#[from] TrackerError),
    #[error("header decode failed: {0}")]
    Decode(#[from] DecodeError),
}

impl ProxyError {
    /// Whether this error ends the connection pair (as opposed to one transaction).
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ProxyError::ProtocolViolation(_) | ProxyError::Transport(_)
        )
    }
}

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("HTTP status {status}")]
    Http { status: u16 },
    #[error("I/O: {0}")]
    Io(#[from] io::Error),
    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("response has neither html nor imageSrc")]
    Unrecognized,
    #[error("handler process exited with {status}")]
    Process { status: String },
    #[error("handler timed out")]
    Timeout,
    #[error("handler task panicked")]
    Panicked,
    #[error("invalid handler URL: {0}")]
    InvalidUrl(String),
}

/// RFC 1342 / RFC 2047 encoded-word errors.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed encoded word")]
    Malformed,
    #[error("unknown encoded-word encoding '{0}'")]
    UnknownEncoding(char),
    #[error("unknown charset '{0}'")]
    UnknownCharset(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_classification() {
        assert!(ProxyError::ProtocolViolation("x".into()).is_fatal());
        assert!(ProxyError::from(io::Error::from(io::ErrorKind::BrokenPipe)).is_fatal());
        assert!(!ProxyError::OversizedMessage { limit: 1 }.is_fatal());
        assert!(!ProxyError::from(TrackerError::Unrecognized).is_fatal());
        assert!(!ProxyError::from(DecodeError::Malformed).is_fatal());
    }
}
