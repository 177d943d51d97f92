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

//! Tracker contract: the request sent to the content generator and the two shapes it
//! may answer with. Bindings: [`HttpTracker`] (POST to a URL) and [`CommandTracker`]
//! (a local executable speaking JSON on stdin/stdout).

mod command;
mod http;
pub mod inject;

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::TrackerError;

pub use command::CommandTracker;
pub use http::HttpTracker;

/// Synthetic header key carrying the strictly decoded Subject.
pub const DECODED_SUBJECT_KEY: &str = "$subject:decoded";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeaderEntry {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEntry {
    pub command: String,
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    pub headers: Vec<HeaderEntry>,
    pub commands: Vec<CommandEntry>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawTrackerResponse")]
pub enum TrackerResult {
    HtmlFragment {
        html: String,
    },
    ImageDescriptor {
        src: String,
        alt: Option<String>,
        /// CSS property name (as given) to value.
        styles: BTreeMap<String, String>,
    },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTrackerResponse {
    html: Option<String>,
    image_src: Option<String>,
    image_alt: Option<String>,
    image_styles: Option<BTreeMap<String, serde_json::Value>>,
}

impl TryFrom<RawTrackerResponse> for TrackerResult {
    type Error = TrackerError;

    fn try_from(raw: RawTrackerResponse) -> Result<Self, Self::Error> {
        if let Some(html) = raw.html.filter(|h| !h.is_empty()) {
            return Ok(TrackerResult::HtmlFragment { html });
        }
        let src = raw.image_src.ok_or(TrackerError::Unrecognized)?;
        let styles = raw
            .image_styles
            .unwrap_or_default()
            .into_iter()
            .filter_map(|(k, v)| match v {
                serde_json::Value::String(s) => Some((k, s)),
                serde_json::Value::Number(n) => Some((k, n.to_string())),
                _ => None,
            })
            .collect();
        Ok(TrackerResult::ImageDescriptor {
            src,
            alt: raw.image_alt,
            styles,
        })
    }
}

impl TrackerResult {
    /// Parse a JSON response body. Neither shape present is `Unrecognized`.
    pub fn from_json(body: &[u8]) -> Result<Self, TrackerError> {
        let raw: RawTrackerResponse = serde_json::from_slice(body)?;
        TrackerResult::try_from(raw)
    }
}

pub type TrackerFuture = Pin<Box<dyn Future<Output = Result<TrackerResult, TrackerError>> + Send>>;

/// Content generator binding. One instance is shared by every connection pair.
pub trait TrackerHandler: Send + Sync {
    fn generate(&self, request: TrackerRequest) -> TrackerFuture;
}

/// Run the handler, optionally bounded by `timeout`.
pub async fn generate_with_timeout(
    handler: &dyn TrackerHandler,
    request: TrackerRequest,
    timeout: Option<Duration>,
) -> Result<TrackerResult, TrackerError> {
    let fut = handler.generate(request);
    match timeout {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| TrackerError::Timeout)?,
        None => fut.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_uses_camel_case() {
        let request = TrackerRequest {
            message_id: Some("<1@x>".into()),
            headers: vec![HeaderEntry {
                key: "subject".into(),
                value: "Hi".into(),
            }],
            commands: vec![CommandEntry {
                command: "MAIL".into(),
                data: "FROM:<a@b>".into(),
            }],
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["messageId"], "<1@x>");
        assert_eq!(json["headers"][0]["key"], "subject");
        assert_eq!(json["commands"][0]["data"], "FROM:<a@b>");

        let anonymous = TrackerRequest {
            message_id: None,
            ..request
        };
        let json = serde_json::to_value(&anonymous).unwrap();
        assert!(json.get("messageId").is_none());
    }

    #[test]
    fn html_wins_over_image() {
        let result =
            TrackerResult::from_json(br#"{"html":"<p>t</p>","imageSrc":"http://t/x.png"}"#).unwrap();
        assert_eq!(
            result,
            TrackerResult::HtmlFragment {
                html: "<p>t</p>".into()
            }
        );
    }

    #[test]
    fn image_descriptor_with_styles() {
        let result = TrackerResult::from_json(
            br#"{"html":"","imageSrc":"http://t/x.png","imageAlt":"","imageStyles":{"width":"1px","borderWidth":0}}"#,
        )
        .unwrap();
        match result {
            TrackerResult::ImageDescriptor { src, alt, styles } => {
                assert_eq!(src, "http://t/x.png");
                assert_eq!(alt.as_deref(), Some(""));
                assert_eq!(styles.get("width").map(String::as_str), Some("1px"));
                assert_eq!(styles.get("borderWidth").map(String::as_str), Some("0"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn unrecognized_shape_is_an_error() {
        assert!(matches!(
            TrackerResult::from_json(br#"{"foo":1}"#),
            Err(TrackerError::Unrecognized)
        ));
        assert!(matches!(
            TrackerResult::from_json(b"not json"),
            Err(TrackerError::Json(_))
        ));
    }

    struct Slow;

    impl TrackerHandler for Slow {
        fn generate(&self, _request: TrackerRequest) -> TrackerFuture {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Err(TrackerError::Unrecognized)
            })
        }
    }

    #[tokio::test]
    async fn timeout_degrades_to_error() {
        let request = TrackerRequest {
            message_id: None,
            headers: Vec::new(),
            commands: Vec::new(),
        };
        let result =
            generate_with_timeout(&Slow, request, Some(Duration::from_millis(10))).await;
        assert!(matches!(result, Err(TrackerError::Timeout)));
    }
}
