//! Turning a raw transport result into exactly one outcome.
//!
//! # Design
//! `classify` is a pure function so that every branch can be tested without
//! a network. The rules:
//! - no response: failure carrying the transport error;
//! - status 200..=300 and a JSON media type: decode, failing on bad JSON;
//! - status 200..=300 otherwise: the body as UTF-8 text;
//! - any other status: an HTTP error carrying the request path.
//!
//! The JSON check compares the media type only (parameters such as
//! `charset` are ignored) against `application/json`, ignoring ASCII case.

use serde::de::DeserializeOwned;

use crate::error::WebError;
use crate::http::RawResponse;

const JSON_MEDIA_TYPE: &str = "application/json";

/// A decoded response body.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Json(serde_json::Value),
    Text(String),
}

impl ResponseBody {
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            ResponseBody::Json(value) => Some(value),
            ResponseBody::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ResponseBody::Text(text) => Some(text),
            ResponseBody::Json(_) => None,
        }
    }

    /// Deserialize the body into `T`. Text bodies are parsed as JSON too,
    /// for servers that send JSON with the wrong content type.
    pub fn deserialize<T: DeserializeOwned>(self) -> Result<T, WebError> {
        match self {
            ResponseBody::Json(value) => Ok(serde_json::from_value(value)?),
            ResponseBody::Text(text) => Ok(serde_json::from_str(&text)?),
        }
    }
}

/// The result of one completed request.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success { body: ResponseBody, status: u16 },
    Failure(WebError),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }
}

/// Statuses delivered to the success callback. The upper bound is
/// inclusive.
pub fn is_success_status(status: u16) -> bool {
    (200..=300).contains(&status)
}

/// Whether a `Content-Type` value names the JSON media type.
pub fn is_json_media_type(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .map(str::trim)
        .is_some_and(|media| media.eq_ignore_ascii_case(JSON_MEDIA_TYPE))
}

/// Classify a transport result for a request to `path`.
pub fn classify(path: &str, result: Result<RawResponse, WebError>) -> Outcome {
    let response = match result {
        Ok(response) => response,
        Err(err) => return Outcome::Failure(err),
    };
    let status = response.status;
    if !is_success_status(status) {
        return Outcome::Failure(WebError::Http {
            path: path.to_string(),
            status,
        });
    }
    if response.content_type().is_some_and(is_json_media_type) {
        return match serde_json::from_slice(&response.body) {
            Ok(value) => Outcome::Success {
                body: ResponseBody::Json(value),
                status,
            },
            Err(err) => Outcome::Failure(err.into()),
        };
    }
    let text = match String::from_utf8(response.body) {
        Ok(text) => text,
        Err(err) => String::from_utf8_lossy(err.as_bytes()).into_owned(),
    };
    Outcome::Success {
        body: ResponseBody::Text(text),
        status,
    }
}
