/*
 * content_type.rs
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

//! Content-Type header (RFC 2045) and the shared `name=value` parameter list parser.

use std::collections::HashMap;

use crate::mime::utils::is_token;

#[derive(Debug, Clone)]
pub struct ContentType {
    primary_type: String,
    sub_type: String,
    parameter_map: HashMap<String, String>,
}

impl ContentType {
    pub fn new(
        primary_type: impl Into<String>,
        sub_type: impl Into<String>,
        parameters: Vec<(String, String)>,
    ) -> Self {
        let parameter_map = parameters
            .into_iter()
            .map(|(name, value)| (name.to_ascii_lowercase(), value))
            .collect();
        Self {
            primary_type: primary_type.into(),
            sub_type: sub_type.into(),
            parameter_map,
        }
    }

    pub fn primary_type(&self) -> &str {
        &self.primary_type
    }

    pub fn sub_type(&self) -> &str {
        &self.sub_type
    }

    /// `type/subtype`, lower-cased.
    pub fn mime_type(&self) -> String {
        format!(
            "{}/{}",
            self.primary_type.to_ascii_lowercase(),
            self.sub_type.to_ascii_lowercase()
        )
    }

    pub fn is_primary_type(&self, t: &str) -> bool {
        self.primary_type.eq_ignore_ascii_case(t)
    }

    pub fn is_mime_type(&self, primary: &str, sub: &str) -> bool {
        self.is_primary_type(primary) && self.sub_type.eq_ignore_ascii_case(sub)
    }

    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameter_map
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn charset(&self) -> Option<&str> {
        self.parameter("charset").filter(|c| !c.is_empty())
    }

    pub fn boundary(&self) -> Option<&str> {
        self.parameter("boundary")
    }
}

/// Parse a Content-Type header value. Returns None when there is no `type/subtype`.
pub fn parse_content_type(value: &str) -> Option<ContentType> {
    let value = value.trim();
    let (type_part, params_part) = match value.find(';') {
        Some(i) => (value[..i].trim(), &value[i + 1..]),
        None => (value, ""),
    };
    let slash = type_part.find('/')?;
    let primary = type_part[..slash].trim();
    let sub = type_part[slash + 1..].trim();
    if !is_token(primary) || !is_token(sub) {
        return None;
    }
    Some(ContentType::new(primary, sub, parse_parameter_list(params_part)))
}

/// Parse a semicolon-separated parameter list (`name=value; name="quoted value"`).
/// Malformed entries are skipped.
pub fn parse_parameter_list(params_part: &str) -> Vec<(String, String)> {
    let mut parameters = Vec::new();
    let bytes = params_part.as_bytes();
    let len = bytes.len();
    let mut pos = 0;

    while pos < len {
        while pos < len && (bytes[pos] == b';' || bytes[pos].is_ascii_whitespace()) {
            pos += 1;
        }
        if pos >= len {
            break;
        }
        let Some(eq) = bytes[pos..].iter().position(|&b| b == b'=' || b == b';') else {
            break;
        };
        let eq_abs = pos + eq;
        if bytes[eq_abs] == b';' {
            pos = eq_abs + 1;
            continue;
        }
        let name = params_part[pos..eq_abs].trim();
        pos = eq_abs + 1;
        while pos < len && (bytes[pos] == b' ' || bytes[pos] == b'\t') {
            pos += 1;
        }
        let value = if pos < len && bytes[pos] == b'"' {
            pos += 1;
            let mut v = Vec::new();
            while pos < len {
                let c = bytes[pos];
                if c == b'\\' && pos + 1 < len {
                    v.push(bytes[pos + 1]);
                    pos += 2;
                } else if c == b'"' {
                    pos += 1;
                    break;
                } else {
                    v.push(c);
                    pos += 1;
                }
            }
            String::from_utf8_lossy(&v).into_owned()
        } else {
            let end = bytes[pos..]
                .iter()
                .position(|&b| b == b';')
                .map(|i| pos + i)
                .unwrap_or(len);
            let v = params_part[pos..end].trim().to_string();
            pos = end;
            v
        };
        if is_token(name) {
            parameters.push((name.to_string(), value));
        }
    }
    parameters
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_with_quoted_charset() {
        let ct = parse_content_type("text/HTML; charset=\"ISO-8859-1\"").unwrap();
        assert!(ct.is_mime_type("text", "html"));
        assert_eq!(ct.mime_type(), "text/html");
        assert_eq!(ct.charset(), Some("ISO-8859-1"));
    }

    #[test]
    fn multipart_boundary_and_case_insensitive_names() {
        let ct = parse_content_type("multipart/alternative; BOUNDARY=abc-123; x=1").unwrap();
        assert!(ct.is_primary_type("multipart"));
        assert_eq!(ct.boundary(), Some("abc-123"));
        assert_eq!(ct.parameter("x"), Some("1"));
    }

    #[test]
    fn missing_subtype_is_rejected() {
        assert!(parse_content_type("text").is_none());
        assert!(parse_content_type("").is_none());
    }

    #[test]
    fn tolerates_stray_separators() {
        let ct = parse_content_type("text/plain;; charset=utf-8;").unwrap();
        assert_eq!(ct.charset(), Some("utf-8"));
    }
}
