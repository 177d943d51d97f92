/*
 * headers.rs
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

//! A parsed MIME header block: fields in declaration order, raw bytes kept for re-join.

use crate::mime::content_disposition::{parse_content_disposition, ContentDisposition};
use crate::mime::content_type::{parse_content_type, ContentType};
use crate::mime::rfc2047::decode_encoded_words;
use crate::mime::utils::{header_bytes_to_string, trim_eol, unfold};

#[derive(Debug, Clone)]
pub struct HeaderField {
    /// Lower-cased field name.
    pub name: String,
    /// Unfolded value with surrounding whitespace trimmed; encoded-words left as-is.
    pub value: String,
}

#[derive(Debug, Clone, Default)]
pub struct HeaderBlock {
    fields: Vec<HeaderField>,
}

impl HeaderBlock {
    /// Parse a header block (the bytes up to and including the blank separator line,
    /// which may be absent). Lines without a colon are ignored.
    pub fn parse(raw: &[u8]) -> Self {
        let mut fields = Vec::new();
        let mut current: Option<String> = None;
        for line in raw.split_inclusive(|&b| b == b'\n') {
            let content = trim_eol(line);
            if content.is_empty() {
                break;
            }
            if content[0] == b' ' || content[0] == b'\t' {
                if let Some(cur) = current.as_mut() {
                    cur.push_str("\r\n");
                    cur.push_str(&header_bytes_to_string(content));
                }
                continue;
            }
            if let Some(done) = current.take() {
                fields.extend(split_field(&done));
            }
            current = Some(header_bytes_to_string(content));
        }
        if let Some(done) = current.take() {
            fields.extend(split_field(&done));
        }
        Self { fields }
    }

    pub fn fields(&self) -> &[HeaderField] {
        &self.fields
    }

    pub fn get_first(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(name))
            .map(|f| f.value.as_str())
    }

    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.fields
            .iter()
            .filter(move |f| f.name.eq_ignore_ascii_case(name))
            .map(|f| f.value.as_str())
    }

    pub fn content_type(&self) -> Option<ContentType> {
        self.get_first("content-type").and_then(parse_content_type)
    }

    pub fn content_disposition(&self) -> Option<ContentDisposition> {
        self.get_first("content-disposition")
            .and_then(parse_content_disposition)
    }

    /// Lower-cased Content-Transfer-Encoding, if declared.
    pub fn transfer_encoding(&self) -> Option<String> {
        self.get_first("content-transfer-encoding")
            .map(|v| v.trim().to_ascii_lowercase())
    }

    /// Header list with keys deduplicated in first-seen order, each expanded to all of
    /// its values with encoded-words decoded.
    pub fn decoded_list(&self) -> Vec<(String, String)> {
        let mut keys: Vec<&str> = Vec::new();
        for f in &self.fields {
            if !keys.contains(&f.name.as_str()) {
                keys.push(&f.name);
            }
        }
        let mut list = Vec::with_capacity(self.fields.len());
        for key in keys {
            for value in self.get_all(key) {
                list.push((key.to_string(), decode_encoded_words(value)));
            }
        }
        list
    }
}

fn split_field(line: &str) -> Option<HeaderField> {
    let colon = line.find(':')?;
    let name = line[..colon].trim();
    if name.is_empty() {
        return None;
    }
    Some(HeaderField {
        name: name.to_ascii_lowercase(),
        value: unfold(&line[colon + 1..]).trim().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const RAW: &[u8] = b"Subject: =?UTF-8?B?SGVsbG8=?=\r\n\
Received: from a\r\n\
Message-ID: <1@x>\r\n\
Received: from b\r\n\
\x20by c\r\n\
Content-Type: text/html;\r\n\tcharset=iso-8859-1\r\n\
\r\n";

    #[test]
    fn parses_folded_fields() {
        let block = HeaderBlock::parse(RAW);
        assert_eq!(block.fields().len(), 5);
        assert_eq!(block.get_first("message-id"), Some("<1@x>"));
        let received: Vec<&str> = block.get_all("Received").collect();
        assert_eq!(received, vec!["from a", "from b by c"]);
        let ct = block.content_type().unwrap();
        assert!(ct.is_mime_type("text", "html"));
        assert_eq!(ct.charset(), Some("iso-8859-1"));
    }

    #[test]
    fn decoded_list_groups_duplicate_keys() {
        let block = HeaderBlock::parse(RAW);
        let list = block.decoded_list();
        let keys: Vec<&str> = list.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(
            keys,
            vec!["subject", "received", "received", "message-id", "content-type"]
        );
        assert_eq!(list[0].1, "Hello");
        assert_eq!(list[2].1, "from b by c");
    }

    #[test]
    fn disposition_is_parsed() {
        let block = HeaderBlock::parse(
            b"Content-Type: text/html\r\nContent-Disposition: attachment; filename=\"a.html\"\r\n\r\n",
        );
        let disposition = block.content_disposition().unwrap();
        assert!(disposition.is_attachment());
        assert_eq!(disposition.filename(), Some("a.html"));
    }

    #[test]
    fn missing_blank_line_and_junk() {
        let block = HeaderBlock::parse(b"no colon here\r\nX-A: 1");
        assert_eq!(block.fields().len(), 1);
        assert_eq!(block.get_first("x-a"), Some("1"));
        assert!(block.content_type().is_none());
    }
}
