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

//! MIME body pipeline (push model, non-blocking buffer contract): split a message into
//! nodes, hold inline HTML for rewriting, and re-join everything in document order.

pub mod base64;
pub mod charset;
mod content_disposition;
mod content_type;
mod headers;
pub mod quoted_printable;
mod rewriter;
pub mod rfc2047;
mod splitter;
mod utils;

pub use content_disposition::{parse_content_disposition, ContentDisposition};
pub use content_type::{parse_content_type, parse_parameter_list, ContentType};
pub use headers::{HeaderBlock, HeaderField};
pub use rewriter::MimeRewriter;
pub use rfc2047::{decode_encoded_words, decode_rfc1342};
pub use splitter::{MimeNode, MimeSplitter, SplitEvent};
pub use utils::is_token;
