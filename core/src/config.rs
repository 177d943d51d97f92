/*
 * config.rs
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

//! Relay configuration: built once at startup, shared read-only by every connection pair.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Default body limit (1 GiB).
pub const DEFAULT_MAX_DATA_BYTES: usize = 1024 * 1024 * 1024;

/// Next-hop SMTP/LMTP server address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NextHop {
    pub host: String,
    pub port: u16,
}

impl NextHop {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for NextHop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NextHopParseError(pub String);

impl fmt::Display for NextHopParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid next hop '{}': expected HOST:PORT", self.0)
    }
}

impl std::error::Error for NextHopParseError {}

/// `host:port`, split at the last colon; `[v6addr]:port` brackets are stripped.
impl FromStr for NextHop {
    type Err = NextHopParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || NextHopParseError(s.to_string());
        let (host, port) = s.trim().rsplit_once(':').ok_or_else(err)?;
        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);
        let port: u16 = port.parse().map_err(|_| err())?;
        if host.is_empty() {
            return Err(err());
        }
        Ok(NextHop::new(host, port))
    }
}

#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub next_hop: NextHop,
    /// Name used in the greeting and local replies.
    pub hostname: String,
    /// Free text after `ESMTP`/`LMTP` in the greeting.
    pub banner: String,
    /// Downstream speaks LMTP: LHLO instead of HELO/EHLO, one DATA reply per recipient.
    pub lmtp: bool,
    pub max_data_bytes: usize,
    /// Upper bound on one tracker call. None waits indefinitely.
    pub tracker_timeout: Option<Duration>,
}

impl ProxyConfig {
    pub fn new(next_hop: NextHop) -> Self {
        Self {
            next_hop,
            hostname: "localhost".to_string(),
            banner: "smtptrack".to_string(),
            lmtp: false,
            max_data_bytes: DEFAULT_MAX_DATA_BYTES,
            tracker_timeout: None,
        }
    }

    pub fn greeting(&self) -> String {
        let protocol = if self.lmtp { "LMTP" } else { "ESMTP" };
        if self.banner.is_empty() {
            format!("{} {}", self.hostname, protocol)
        } else {
            format!("{} {} {}", self.hostname, protocol, self.banner)
        }
    }
}
