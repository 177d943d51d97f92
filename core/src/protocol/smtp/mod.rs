/*
 * mod.rs
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

//! SMTP on both legs of the relay: the downstream responder (server role) and the
//! upstream client, sharing the line/data stream parser, reply grouping, and the
//! pipelining queue that keeps replies in request order.

pub mod dot_stuffer;
pub mod pipeline;
pub mod reply;
pub mod responder;
pub mod stream;
pub mod upstream;

pub use dot_stuffer::DotStuffer;
pub use pipeline::PipelineQueue;
pub use reply::{Reply, ReplyAssembler};
pub use responder::{ClientEvent, DataOutcome, ReplyError, Responder};
pub use stream::{SmtpStream, StreamEvent};
pub use upstream::{parse_terminator, Upstream, UpstreamEvent, DEFAULT_TERMINATOR};
