/*
 * inject.rs
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

//! Append tracker content as the last child of `<body>` (or of `<html>`), leaving every
//! other byte of the document untouched.

use std::fmt::Write;

use crate::tracker::TrackerResult;

/// Insert the rendered tracker into `html`.
pub fn apply(html: &str, result: &TrackerResult) -> String {
    let fragment = match result {
        TrackerResult::HtmlFragment { html } => html.clone(),
        TrackerResult::ImageDescriptor { src, alt, styles } => {
            render_img(src, alt.as_deref(), styles.iter())
        }
    };
    let at = insertion_point(html);
    let mut out = String::with_capacity(html.len() + fragment.len());
    out.push_str(&html[..at]);
    out.push_str(&fragment);
    out.push_str(&html[at..]);
    out
}

/// Byte offset of the last `</body>` tag, else the last `</html>`, else the end.
fn insertion_point(html: &str) -> usize {
    let lower = html.to_ascii_lowercase();
    find_close_tag(&lower, "body")
        .or_else(|| find_close_tag(&lower, "html"))
        .unwrap_or(html.len())
}

fn find_close_tag(lower: &str, name: &str) -> Option<usize> {
    let needle = format!("</{}", name);
    let mut end = lower.len();
    while let Some(i) = lower[..end].rfind(&needle) {
        let next = lower.as_bytes().get(i + needle.len()).copied();
        if matches!(next, Some(b'>') | Some(b' ') | Some(b'\t') | Some(b'\r') | Some(b'\n') | None) {
            return Some(i);
        }
        end = i;
    }
    None
}

fn render_img<'a>(
    src: &str,
    alt: Option<&str>,
    styles: impl Iterator<Item = (&'a String, &'a String)>,
) -> String {
    let mut out = String::from("<img src=\"");
    out.push_str(&escape_attr(src));
    out.push('"');
    if let Some(alt) = alt.filter(|a| !a.is_empty()) {
        out.push_str(" alt=\"");
        out.push_str(&escape_attr(alt));
        out.push('"');
    }
    let mut style = String::new();
    for (name, value) in styles {
        if !style.is_empty() {
            style.push(' ');
        }
        let _ = write!(style, "{}: {};", css_property_name(name), value);
    }
    if !style.is_empty() {
        out.push_str(" style=\"");
        out.push_str(&escape_attr(&style));
        out.push('"');
    }
    out.push('>');
    out
}

/// DOM style property names (`borderWidth`) to CSS (`border-width`).
fn css_property_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for c in name.chars() {
        if c.is_ascii_uppercase() {
            out.push('-');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

fn escape_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}
