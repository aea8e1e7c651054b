//! Request body and query encoders.
//!
//! # Design
//! Form data is encoded pair by pair: every key and every value is
//! percent-encoded on its own before being joined with `=` and `&`, so a
//! `&` or `=` inside a value can never be mistaken for a separator and the
//! encoded string always parses back to the same pairs.
//!
//! Multipart bodies follow RFC 7578 with CRLF line endings and a boundary
//! built from a random v4 UUID.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use uuid::Uuid;

/// Bytes left as-is in form components: ASCII alphanumerics and `-._~`.
const FORM_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

pub const BOUNDARY_PREFIX: &str = "----WebKitFormBoundary";
pub const IMAGE_CONTENT_TYPE: &str = "image/jpeg";

/// A single form value.
///
/// Only `Text` values become multipart text fields; every variant is
/// rendered with `Display` for url-encoding.
#[derive(Debug, Clone, PartialEq)]
pub enum FormValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Binary(Vec<u8>),
}

impl FormValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FormValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for FormValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormValue::Text(s) => f.write_str(s),
            FormValue::Integer(n) => write!(f, "{n}"),
            FormValue::Float(n) => write!(f, "{n}"),
            FormValue::Bool(b) => write!(f, "{b}"),
            FormValue::Binary(bytes) => f.write_str(&String::from_utf8_lossy(bytes)),
        }
    }
}

impl From<&str> for FormValue {
    fn from(s: &str) -> Self {
        FormValue::Text(s.to_string())
    }
}

impl From<String> for FormValue {
    fn from(s: String) -> Self {
        FormValue::Text(s)
    }
}

impl From<&String> for FormValue {
    fn from(s: &String) -> Self {
        FormValue::Text(s.clone())
    }
}

impl From<i32> for FormValue {
    fn from(n: i32) -> Self {
        FormValue::Integer(i64::from(n))
    }
}

impl From<i64> for FormValue {
    fn from(n: i64) -> Self {
        FormValue::Integer(n)
    }
}

impl From<u32> for FormValue {
    fn from(n: u32) -> Self {
        FormValue::Integer(i64::from(n))
    }
}

impl From<f64> for FormValue {
    fn from(n: f64) -> Self {
        FormValue::Float(n)
    }
}

impl From<bool> for FormValue {
    fn from(b: bool) -> Self {
        FormValue::Bool(b)
    }
}

impl From<Vec<u8>> for FormValue {
    fn from(bytes: Vec<u8>) -> Self {
        FormValue::Binary(bytes)
    }
}

impl From<&[u8]> for FormValue {
    fn from(bytes: &[u8]) -> Self {
        FormValue::Binary(bytes.to_vec())
    }
}

/// Ordered key/value pairs for a query string, a form body, or the extra
/// fields of a multipart upload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormData {
    pairs: Vec<(String, FormValue)>,
}

impl FormData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<FormValue>) {
        self.pairs.push((key.into(), value.into()));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FormValue)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl<K: Into<String>, V: Into<FormValue>> FromIterator<(K, V)> for FormData {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut data = FormData::new();
        for (key, value) in iter {
            data.push(key, value);
        }
        data
    }
}

impl<K: Into<String>, V: Into<FormValue>, const N: usize> From<[(K, V); N]> for FormData {
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}

impl<K: Into<String>, V: Into<FormValue>> From<Vec<(K, V)>> for FormData {
    fn from(pairs: Vec<(K, V)>) -> Self {
        pairs.into_iter().collect()
    }
}

impl<K: Into<String>, V: Into<FormValue>, S> From<HashMap<K, V, S>> for FormData {
    fn from(map: HashMap<K, V, S>) -> Self {
        map.into_iter().collect()
    }
}

impl<K: Into<String>, V: Into<FormValue>> From<BTreeMap<K, V>> for FormData {
    fn from(map: BTreeMap<K, V>) -> Self {
        map.into_iter().collect()
    }
}

fn encode_component(s: &str) -> String {
    utf8_percent_encode(s, FORM_COMPONENT).to_string()
}

/// Encode `data` as `k1=v1&k2=v2`, percent-encoding each key and value.
pub fn encode_form(data: &FormData) -> String {
    data.iter()
        .map(|(key, value)| {
            format!(
                "{}={}",
                encode_component(key),
                encode_component(&value.to_string())
            )
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// Append an encoded query to `url`.
///
/// Uses `?` when the URL has no query yet and `&` when it does, and keeps a
/// trailing `#fragment` at the end.
pub fn append_query(url: &str, query: &str) -> String {
    if query.is_empty() {
        return url.to_string();
    }
    let (base, fragment) = match url.split_once('#') {
        Some((base, fragment)) => (base, Some(fragment)),
        None => (url, None),
    };
    let separator = if !base.contains('?') {
        "?"
    } else if base.ends_with('?') || base.ends_with('&') {
        ""
    } else {
        "&"
    };
    let mut out = format!("{base}{separator}{query}");
    if let Some(fragment) = fragment {
        out.push('#');
        out.push_str(fragment);
    }
    out
}

/// Milliseconds since the Unix epoch, used for upload file names.
fn epoch_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}

/// Quote-safe form of a field name or file name inside a
/// `Content-Disposition` header.
fn escape_disposition(s: &str) -> String {
    s.replace('"', "%22").replace('\r', "%0D").replace('\n', "%0A")
}

#[derive(Debug, Clone)]
struct Part {
    name: String,
    filename: Option<String>,
    content_type: Option<String>,
    data: Vec<u8>,
}

/// A `multipart/form-data` body under construction.
#[derive(Debug, Clone)]
pub struct MultipartBody {
    boundary: String,
    parts: Vec<Part>,
}

impl MultipartBody {
    /// Start an empty body with a fresh random boundary.
    pub fn new() -> Self {
        Self::with_boundary(format!("{BOUNDARY_PREFIX}{}", Uuid::new_v4().simple()))
    }

    pub fn with_boundary(boundary: impl Into<String>) -> Self {
        Self {
            boundary: boundary.into(),
            parts: Vec::new(),
        }
    }

    /// The body used for image uploads: one text part per `Text` value in
    /// `extra` (other values are skipped), then the file as
    /// `<epoch-millis>.jpg` with content type `image/jpeg`.
    pub fn image_upload(bytes: impl Into<Vec<u8>>, field_name: &str, extra: &FormData) -> Self {
        let mut body = Self::new();
        for (key, value) in extra.iter() {
            if let Some(text) = value.as_text() {
                body = body.text(key, text);
            }
        }
        body.file(
            field_name,
            format!("{}.jpg", epoch_millis()),
            IMAGE_CONTENT_TYPE,
            bytes,
        )
    }

    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parts.push(Part {
            name: name.into(),
            filename: None,
            content_type: None,
            data: value.into().into_bytes(),
        });
        self
    }

    pub fn file(
        mut self,
        name: impl Into<String>,
        filename: impl Into<String>,
        content_type: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
    ) -> Self {
        self.parts.push(Part {
            name: name.into(),
            filename: Some(filename.into()),
            content_type: Some(content_type.into()),
            data: bytes.into(),
        });
        self
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// Value for the request's `Content-Type` header.
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    /// Render the parts and the closing boundary.
    pub fn into_bytes(self) -> Vec<u8> {
        let mut out = Vec::new();
        for part in &self.parts {
            out.extend_from_slice(format!("--{}\r\n", self.boundary).as_bytes());
            let mut disposition = format!(
                "Content-Disposition: form-data; name=\"{}\"",
                escape_disposition(&part.name)
            );
            if let Some(filename) = &part.filename {
                disposition.push_str(&format!("; filename=\"{}\"", escape_disposition(filename)));
            }
            out.extend_from_slice(disposition.as_bytes());
            out.extend_from_slice(b"\r\n");
            if let Some(content_type) = &part.content_type {
                out.extend_from_slice(format!("Content-Type: {content_type}\r\n").as_bytes());
            }
            out.extend_from_slice(b"\r\n");
            out.extend_from_slice(&part.data);
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(format!("--{}--\r\n", self.boundary).as_bytes());
        out
    }
}

impl Default for MultipartBody {
    fn default() -> Self {
        Self::new()
    }
}
