//! C-ABI wrapper around `webclient-core`.
//!
//! # Overview
//! Exposes the request builder through `extern "C"` functions so any
//! language with a C FFI can build a request, send it, and receive the
//! outcome through plain function-pointer callbacks.
//!
//! # Design
//! - Every `extern "C"` function wraps its body in `catch_unwind` so panics
//!   never cross the FFI boundary.
//! - Requests run on the process-wide dispatcher. Callbacks run on its
//!   completion thread, together with the host's `user_data` pointer.
//! - The C caller owns the `FfiRequest` handle and strings returned by
//!   `webclient_request_url`, and must release them with
//!   `webclient_request_free` / `webclient_free_string`. Pointers passed into
//!   callbacks are borrowed for the duration of the call.

pub mod types;

use std::ffi::{c_void, CString};
use std::os::raw::c_char;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::ptr;
use std::time::Duration;

use webclient_core::Dispatcher;

use types::*;

const LOG_TARGET: &str = "webclient_ffi";

/// Run `f` against the request behind `req`, mapping null pointers and
/// panics to a status.
fn with_request(req: *mut FfiRequest, f: impl FnOnce(&mut FfiRequest) -> FfiStatus) -> FfiStatus {
    if req.is_null() {
        return FfiStatus::NullArg;
    }
    catch_unwind(AssertUnwindSafe(|| f(unsafe { &mut *req }))).unwrap_or_else(|_| {
        tracing::warn!(target: LOG_TARGET, "panic caught at FFI boundary");
        FfiStatus::Panic
    })
}

// ---------------------------------------------------------------------------
// Request lifecycle
// ---------------------------------------------------------------------------

/// Create a request for `url` on the process-wide dispatcher.
///
/// Returns null if `url` is null or not UTF-8. An unparseable URL is not an
/// error here; it is reported through the failure callback on send.
/// The caller must free the returned pointer with `webclient_request_free`.
#[unsafe(no_mangle)]
pub extern "C" fn webclient_request_new(method: FfiHttpMethod, url: *const c_char) -> *mut FfiRequest {
    catch_unwind(|| {
        let url = match unsafe { str_arg(url) } {
            Ok(url) => url,
            Err(_) => return ptr::null_mut(),
        };
        let request = Dispatcher::global().request(method.into(), url);
        Box::into_raw(Box::new(FfiRequest::new(request)))
    })
    .unwrap_or(ptr::null_mut())
}

/// Free a request created by `webclient_request_new`. Safe to call with null.
///
/// Dispatches already sent keep running and still invoke their callbacks;
/// call `webclient_request_cancel` first to suppress them.
#[unsafe(no_mangle)]
pub extern "C" fn webclient_request_free(req: *mut FfiRequest) {
    if !req.is_null() {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            drop(unsafe { Box::from_raw(req) });
        }));
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Set a single header, replacing any header with the same name.
#[unsafe(no_mangle)]
pub extern "C" fn webclient_request_set_header(
    req: *mut FfiRequest,
    name: *const c_char,
    value: *const c_char,
) -> FfiStatus {
    with_request(req, |req| {
        let (name, value) = match unsafe { (str_arg(name), str_arg(value)) } {
            (Ok(name), Ok(value)) => (name.to_string(), value.to_string()),
            (Err(err), _) | (_, Err(err)) => return err.into(),
        };
        req.update(|r| r.header(name, value));
        FfiStatus::Ok
    })
}

/// Set several headers at once from `len` pairs.
#[unsafe(no_mangle)]
pub extern "C" fn webclient_request_set_headers(
    req: *mut FfiRequest,
    headers: *const FfiPair,
    len: usize,
) -> FfiStatus {
    with_request(req, |req| match unsafe { pairs_arg(headers, len) } {
        Ok(pairs) => {
            req.update(|r| r.headers(headers_from(pairs)));
            FfiStatus::Ok
        }
        Err(err) => err.into(),
    })
}

/// Attach url-encoded form data from `len` pairs: the query string for GET,
/// the body for POST. No-op when `len` is zero.
#[unsafe(no_mangle)]
pub extern "C" fn webclient_request_add_data(
    req: *mut FfiRequest,
    pairs: *const FfiPair,
    len: usize,
) -> FfiStatus {
    with_request(req, |req| match unsafe { pairs_arg(pairs, len) } {
        Ok(pairs) => {
            req.update(|r| r.data(form_from(pairs)));
            FfiStatus::Ok
        }
        Err(err) => err.into(),
    })
}

/// Upload `len` bytes as a JPEG file part named `field_name`, preceded by
/// `extra_len` text fields. Ignored for GET requests and empty files.
#[unsafe(no_mangle)]
pub extern "C" fn webclient_request_set_file(
    req: *mut FfiRequest,
    bytes: *const u8,
    len: usize,
    field_name: *const c_char,
    extra: *const FfiPair,
    extra_len: usize,
) -> FfiStatus {
    with_request(req, |req| {
        let field_name = match unsafe { str_arg(field_name) } {
            Ok(name) => name.to_string(),
            Err(err) => return err.into(),
        };
        let extra = match unsafe { pairs_arg(extra, extra_len) } {
            Ok(pairs) => form_from(pairs),
            Err(err) => return err.into(),
        };
        let bytes = if bytes.is_null() || len == 0 {
            Vec::new()
        } else {
            unsafe { std::slice::from_raw_parts(bytes, len) }.to_vec()
        };
        req.update(|r| r.file(bytes, &field_name, extra));
        FfiStatus::Ok
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn webclient_request_set_timeout_ms(req: *mut FfiRequest, timeout_ms: u64) -> FfiStatus {
    with_request(req, |req| {
        req.update(|r| r.timeout(Duration::from_millis(timeout_ms)));
        FfiStatus::Ok
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn webclient_request_set_priority(req: *mut FfiRequest, priority: FfiPriority) -> FfiStatus {
    with_request(req, |req| {
        req.update(|r| r.priority(priority.into()));
        FfiStatus::Ok
    })
}

/// Copy of the request's current URL, including any query added by
/// `webclient_request_add_data`.
///
/// Returns null if `req` is null. Free with `webclient_free_string`.
#[unsafe(no_mangle)]
pub extern "C" fn webclient_request_url(req: *const FfiRequest) -> *mut c_char {
    if req.is_null() {
        return ptr::null_mut();
    }
    catch_unwind(AssertUnwindSafe(|| {
        let req = unsafe { &*req };
        match req.get() {
            Some(request) => c_string_lossy(request.url()).into_raw(),
            None => ptr::null_mut(),
        }
    }))
    .unwrap_or(ptr::null_mut())
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Send the request. Returns immediately.
///
/// Exactly one of the callbacks runs later on the completion thread, unless
/// the request is cancelled or the matching callback is null. `user_data` is
/// passed through untouched and must be safe to use from that thread.
#[unsafe(no_mangle)]
pub extern "C" fn webclient_request_send(
    req: *mut FfiRequest,
    on_success: FfiSuccessCallback,
    on_failure: FfiFailureCallback,
    user_data: *mut c_void,
) -> FfiStatus {
    with_request(req, |req| {
        let Some(request) = req.get() else {
            return FfiStatus::NullArg;
        };
        let user_data = UserData::new(user_data);
        let success = on_success.and_then(|callback| {
            webclient_core::on_success(move |body, status| {
                let (kind, bytes) = body_bytes(&body);
                callback(user_data.get(), kind, bytes.as_ptr(), bytes.len(), status);
            })
        });
        let failure = on_failure.and_then(|callback| {
            webclient_core::on_failure(move |err| {
                let owned = OwnedError::new(&err);
                let ffi = owned.as_ffi();
                callback(user_data.get(), &ffi);
            })
        });
        request.send(success, failure);
        FfiStatus::Ok
    })
}

/// Cancel every dispatch sent from this request that has not delivered yet.
#[unsafe(no_mangle)]
pub extern "C" fn webclient_request_cancel(req: *mut FfiRequest) -> FfiStatus {
    with_request(req, |req| {
        if let Some(request) = req.get() {
            request.cancel();
        }
        FfiStatus::Ok
    })
}

// ---------------------------------------------------------------------------
// Free functions
// ---------------------------------------------------------------------------

/// Free a string returned by this library. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn webclient_free_string(s: *mut c_char) {
    if !s.is_null() {
        let _ = catch_unwind(|| {
            drop(unsafe { CString::from_raw(s) });
        });
    }
}
