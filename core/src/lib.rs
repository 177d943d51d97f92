/*
 * lib.rs
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

//! smtptrack core: a transparent SMTP/LMTP relay that hands each message's headers and
//! envelope commands to a tracker generator and injects the generated HTML fragment
//! or image into the message's inline HTML parts on the way to the next hop.

pub mod config;
pub mod error;
pub mod mime;
pub mod net;
pub mod protocol;
pub mod relay;
pub mod server;
pub mod tracker;
pub mod uri;

pub use config::{NextHop, ProxyConfig};
pub use error::{DecodeError, ProxyError, TrackerError};
pub use relay::RelayBridge;
pub use server::{run_session, serve, serve_stdio};
pub use tracker::{CommandTracker, HttpTracker, TrackerHandler, TrackerRequest, TrackerResult};
