//! `#[repr(C)]` types for the FFI boundary.
//!
//! # Design
//! Inputs from C (`FfiPair`, byte buffers) are borrowed for the duration of
//! the call and copied into owned Rust values. Outputs passed to callbacks
//! (`FfiError`, response bodies) are borrowed for the duration of the
//! callback only; C code must copy what it wants to keep.

use std::ffi::{c_void, CStr, CString};
use std::os::raw::c_char;

use webclient_core::{FormData, Headers, HttpMethod, Priority, ResponseBody, WebError, WebRequest};

/// Opaque handle to a `WebRequest`. C callers receive a pointer to this
/// and pass it back into every `webclient_request_*` function.
pub struct FfiRequest {
    inner: Option<WebRequest>,
}

impl FfiRequest {
    pub(crate) fn new(request: WebRequest) -> Self {
        Self {
            inner: Some(request),
        }
    }

    pub(crate) fn get(&self) -> Option<&WebRequest> {
        self.inner.as_ref()
    }

    /// Apply one of the consuming builder methods in place.
    pub(crate) fn update(&mut self, f: impl FnOnce(WebRequest) -> WebRequest) {
        if let Some(request) = self.inner.take() {
            self.inner = Some(f(request));
        }
    }
}

// ---------------------------------------------------------------------------
// Request inputs
// ---------------------------------------------------------------------------

/// HTTP method as a C enum.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiHttpMethod {
    Get = 0,
    Post = 1,
}

impl From<FfiHttpMethod> for HttpMethod {
    fn from(m: FfiHttpMethod) -> Self {
        match m {
            FfiHttpMethod::Get => HttpMethod::Get,
            FfiHttpMethod::Post => HttpMethod::Post,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiPriority {
    Low = 0,
    Normal = 1,
    High = 2,
}

impl From<FfiPriority> for Priority {
    fn from(p: FfiPriority) -> Self {
        match p {
            FfiPriority::Low => Priority::Low,
            FfiPriority::Normal => Priority::Normal,
            FfiPriority::High => Priority::High,
        }
    }
}

/// A key-value pair of borrowed C strings, used for headers and form data.
#[repr(C)]
pub struct FfiPair {
    pub key: *const c_char,
    pub value: *const c_char,
}

/// Result of every `webclient_request_*` call that can fail.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiStatus {
    Ok = 0,
    NullArg = 1,
    InvalidString = 2,
    Panic = 3,
}

/// Why an argument could not be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ArgError {
    Null,
    InvalidString,
}

impl From<ArgError> for FfiStatus {
    fn from(err: ArgError) -> Self {
        match err {
            ArgError::Null => FfiStatus::NullArg,
            ArgError::InvalidString => FfiStatus::InvalidString,
        }
    }
}

/// Borrow a C string as UTF-8.
///
/// # Safety
/// `s` must be null or point to a NUL-terminated string that outlives `'a`.
pub(crate) unsafe fn str_arg<'a>(s: *const c_char) -> Result<&'a str, ArgError> {
    if s.is_null() {
        return Err(ArgError::Null);
    }
    CStr::from_ptr(s).to_str().map_err(|_| ArgError::InvalidString)
}

/// Read `len` pairs starting at `pairs`. A null pointer reads as empty.
///
/// # Safety
/// `pairs` must be null or point to `len` valid `FfiPair` values whose
/// strings satisfy [`str_arg`].
pub(crate) unsafe fn pairs_arg(
    pairs: *const FfiPair,
    len: usize,
) -> Result<Vec<(String, String)>, ArgError> {
    if pairs.is_null() || len == 0 {
        return Ok(Vec::new());
    }
    std::slice::from_raw_parts(pairs, len)
        .iter()
        .map(|pair| Ok((str_arg(pair.key)?.to_string(), str_arg(pair.value)?.to_string())))
        .collect()
}

pub(crate) fn headers_from(pairs: Vec<(String, String)>) -> Headers {
    pairs.into_iter().collect()
}

pub(crate) fn form_from(pairs: Vec<(String, String)>) -> FormData {
    pairs.into_iter().collect()
}

// ---------------------------------------------------------------------------
// Callback outputs
// ---------------------------------------------------------------------------

/// How the success body should be read.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiBodyKind {
    /// The body is JSON text re-serialized from the decoded value.
    Json = 0,
    Text = 1,
}

/// Category of a failure.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiErrorKind {
    InvalidUrl = 0,
    Transport = 1,
    Http = 2,
    Decode = 3,
}

/// Error passed to the failure callback.
///
/// `domain` and `message` are valid only during the callback. `status` is
/// zero unless `kind` is `Http`.
#[repr(C)]
pub struct FfiError {
    pub kind: FfiErrorKind,
    pub code: i64,
    pub status: u16,
    pub domain: *const c_char,
    pub message: *const c_char,
}

/// Owns the strings an `FfiError` points into.
pub(crate) struct OwnedError {
    kind: FfiErrorKind,
    code: i64,
    status: u16,
    domain: CString,
    message: CString,
}

impl OwnedError {
    pub(crate) fn new(err: &WebError) -> Self {
        let kind = match err {
            WebError::InvalidUrl { .. } => FfiErrorKind::InvalidUrl,
            WebError::Transport(_) => FfiErrorKind::Transport,
            WebError::Http { .. } => FfiErrorKind::Http,
            WebError::Decode { .. } => FfiErrorKind::Decode,
        };
        Self {
            kind,
            code: err.code(),
            status: err.status().unwrap_or(0),
            domain: c_string_lossy(err.domain()),
            message: c_string_lossy(&err.to_string()),
        }
    }

    pub(crate) fn as_ffi(&self) -> FfiError {
        FfiError {
            kind: self.kind,
            code: self.code,
            status: self.status,
            domain: self.domain.as_ptr(),
            message: self.message.as_ptr(),
        }
    }
}

/// Body bytes handed to the success callback.
pub(crate) fn body_bytes(body: &ResponseBody) -> (FfiBodyKind, Vec<u8>) {
    match body {
        ResponseBody::Json(value) => (FfiBodyKind::Json, value.to_string().into_bytes()),
        ResponseBody::Text(text) => (FfiBodyKind::Text, text.clone().into_bytes()),
    }
}

/// Build a `CString`, dropping interior NUL bytes rather than failing.
pub(crate) fn c_string_lossy(s: &str) -> CString {
    CString::new(s.replace('\0', "")).unwrap_or_default()
}

/// Called with the body of a successful response. `body` is valid only
/// during the call.
pub type FfiSuccessCallback = Option<
    extern "C" fn(user_data: *mut c_void, kind: FfiBodyKind, body: *const u8, len: usize, status: u16),
>;

/// Called with the error of a failed request. `error` is valid only during
/// the call.
pub type FfiFailureCallback = Option<extern "C" fn(user_data: *mut c_void, error: *const FfiError)>;

/// The host's `user_data` pointer, carried to the completion thread.
#[derive(Clone, Copy)]
pub(crate) struct UserData(*mut c_void);

// The host promises `user_data` may be used from the completion thread.
unsafe impl Send for UserData {}

impl UserData {
    pub(crate) fn new(ptr: *mut c_void) -> Self {
        Self(ptr)
    }

    pub(crate) fn get(&self) -> *mut c_void {
        self.0
    }
}
