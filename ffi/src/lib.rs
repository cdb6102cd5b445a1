//! C-ABI wrapper around `netkit-core`.
//!
//! # Overview
//! Exposes request building and response classification through
//! `extern "C"` functions so a native mobile host can perform the network
//! I/O itself while sharing header, codec and error rules with Rust callers.
//!
//! # Design
//! - Every `extern "C"` function wraps its body in `catch_unwind` so panics
//!   never cross the FFI boundary.
//! - `netkit_build_*` produce an `FfiHttpRequest`; `netkit_parse_response`
//!   consumes an `FfiHttpResponse` and yields one `FfiApiResult` envelope.
//! - A 401 seen by `netkit_parse_response` fires the registered
//!   unauthorized callback once, in addition to the `Unauthorized` result.
//! - The C caller owns all returned pointers and must call the matching
//!   `netkit_free_*` function to release them.

pub mod types;

use std::ffi::{c_void, CStr, CString};
use std::os::raw::c_char;
use std::panic::{catch_unwind, AssertUnwindSafe};

use netkit_core::{
    codec, Attachment, Endpoint, HttpResponse, KeyStrategy, MultipartField, MultipartForm,
    Session,
};

use types::*;

/// Borrow a C string as `&str`, treating null and invalid UTF-8 as absent.
fn opt_str<'a>(ptr: *const c_char) -> Option<&'a str> {
    if ptr.is_null() {
        return None;
    }
    unsafe { CStr::from_ptr(ptr) }.to_str().ok()
}

// ---------------------------------------------------------------------------
// Client lifecycle
// ---------------------------------------------------------------------------

/// Create a client session bound to `base_url`. `token` may be null, which
/// is the same as an empty token.
///
/// Returns null if `base_url` is null or not UTF-8.
/// The caller must free the returned pointer with `netkit_client_free`.
#[unsafe(no_mangle)]
pub extern "C" fn netkit_client_new(
    base_url: *const c_char,
    token: *const c_char,
) -> *mut FfiNetClient {
    catch_unwind(AssertUnwindSafe(|| {
        let Some(url) = opt_str(base_url) else {
            return std::ptr::null_mut();
        };
        let token = opt_str(token).unwrap_or_default();
        let client = FfiNetClient {
            inner: Session::new(url, token, KeyStrategy::SnakeCaseWire),
            listener: std::sync::Mutex::new(None),
        };
        Box::into_raw(Box::new(client))
    }))
    .unwrap_or(std::ptr::null_mut())
}

/// Free a client created by `netkit_client_new`. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn netkit_client_free(client: *mut FfiNetClient) {
    if !client.is_null() {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            drop(unsafe { Box::from_raw(client) });
        }));
    }
}

/// Replace the token used by requests built from now on.
///
/// Returns false if `client` or `token` is null.
#[unsafe(no_mangle)]
pub extern "C" fn netkit_client_set_token(client: *const FfiNetClient, token: *const c_char) -> bool {
    catch_unwind(AssertUnwindSafe(|| {
        if client.is_null() {
            return false;
        }
        let Some(token) = opt_str(token) else {
            return false;
        };
        unsafe { &*client }.inner.set_token(token);
        true
    }))
    .unwrap_or(false)
}

/// Register `callback` to run once per 401 classified by
/// `netkit_parse_response`, replacing any previous callback. Passing a null
/// callback unregisters.
///
/// The callback runs on the thread that called `netkit_parse_response`.
#[unsafe(no_mangle)]
pub extern "C" fn netkit_set_unauthorized_callback(
    client: *const FfiNetClient,
    callback: Option<extern "C" fn(*mut c_void)>,
    user_data: *mut c_void,
) -> bool {
    catch_unwind(AssertUnwindSafe(|| {
        if client.is_null() {
            return false;
        }
        let client = unsafe { &*client };
        let events = client.inner.unauthorized_events();
        let mut slot = client
            .listener
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(previous) = slot.take() {
            events.remove_listener(previous);
        }
        if let Some(callback) = callback {
            let target = CallbackTarget {
                callback,
                user_data,
            };
            *slot = Some(events.add_listener(move || target.fire()));
        }
        true
    }))
    .unwrap_or(false)
}

// ---------------------------------------------------------------------------
// Build request functions
// ---------------------------------------------------------------------------

/// Build a JSON request for `method` + `path`.
///
/// `json_body` may be null (no body). Its object keys are converted to the
/// wire convention. Returns null if `client` or `path` is null, if the URL
/// is invalid, or if `json_body` is not valid JSON.
/// The caller must free the returned pointer with `netkit_free_request`.
#[unsafe(no_mangle)]
pub extern "C" fn netkit_build_request(
    client: *const FfiNetClient,
    method: FfiHttpMethod,
    path: *const c_char,
    json_body: *const c_char,
) -> *mut FfiHttpRequest {
    catch_unwind(AssertUnwindSafe(|| {
        if client.is_null() {
            return std::ptr::null_mut();
        }
        let Some(path) = opt_str(path) else {
            return std::ptr::null_mut();
        };
        let session = &unsafe { &*client }.inner;
        let payload = if json_body.is_null() {
            None
        } else {
            let Some(raw) = opt_str(json_body) else {
                return std::ptr::null_mut();
            };
            match serde_json::from_str::<serde_json::Value>(raw) {
                Ok(value) => Some(value),
                Err(_) => return std::ptr::null_mut(),
            }
        };
        let endpoint = Endpoint::new(method.into(), path);
        match session.build_json_request(&endpoint, payload.as_ref()) {
            Ok(req) => FfiHttpRequest::from_core(req),
            Err(_) => std::ptr::null_mut(),
        }
    }))
    .unwrap_or(std::ptr::null_mut())
}

/// Build a multipart POST uploading `data` under `field_name` with a
/// generated file name.
///
/// Returns null if any pointer argument is null or the URL is invalid.
#[unsafe(no_mangle)]
pub extern "C" fn netkit_build_upload(
    client: *const FfiNetClient,
    path: *const c_char,
    field_name: *const c_char,
    kind: FfiMediaKind,
    data: *const u8,
    data_len: usize,
) -> *mut FfiHttpRequest {
    catch_unwind(AssertUnwindSafe(|| {
        if client.is_null() || (data.is_null() && data_len > 0) {
            return std::ptr::null_mut();
        }
        let (Some(path), Some(field_name)) = (opt_str(path), opt_str(field_name)) else {
            return std::ptr::null_mut();
        };
        let bytes = if data_len == 0 {
            Vec::new()
        } else {
            unsafe { std::slice::from_raw_parts(data, data_len) }.to_vec()
        };
        let mut form = MultipartForm::new();
        form.push(MultipartField::file(field_name, Attachment::new(kind.into(), bytes)));
        match unsafe { &*client }.inner.build_upload(path, &form) {
            Ok(req) => FfiHttpRequest::from_core(req),
            Err(_) => std::ptr::null_mut(),
        }
    }))
    .unwrap_or(std::ptr::null_mut())
}

// ---------------------------------------------------------------------------
// Parse response
// ---------------------------------------------------------------------------

/// Convert an `FfiHttpResponse` to a core `HttpResponse`.
fn ffi_response_to_core(resp: &FfiHttpResponse) -> HttpResponse {
    let body = if resp.body.is_null() || resp.body_len == 0 {
        Vec::new()
    } else {
        unsafe { std::slice::from_raw_parts(resp.body, resp.body_len) }.to_vec()
    };
    HttpResponse::new(resp.status, body)
}

/// Classify a response the host received and decode its JSON body.
///
/// Never returns null. Free the result with `netkit_free_result`.
#[unsafe(no_mangle)]
pub extern "C" fn netkit_parse_response(
    client: *const FfiNetClient,
    response: *const FfiHttpResponse,
) -> *mut FfiApiResult {
    catch_unwind(AssertUnwindSafe(|| {
        if client.is_null() {
            return FfiApiResult::null_arg("client");
        }
        if response.is_null() {
            return FfiApiResult::null_arg("response");
        }
        let session = &unsafe { &*client }.inner;
        let resp = ffi_response_to_core(unsafe { &*response });
        let status = resp.status;
        let decoded = session
            .parse_response::<serde_json::Value>(resp)
            .and_then(|value| {
                serde_json::to_vec(&value).map_err(netkit_core::ApiError::Decoding)
            });
        match decoded {
            Ok(body) => FfiApiResult::ok(status, body),
            Err(e) => FfiApiResult::from_error(e),
        }
    }))
    .unwrap_or_else(|_| FfiApiResult::panic("panic in netkit_parse_response"))
}

/// Convert the keys of a JSON document from the internal convention to the
/// wire convention. Returns null on invalid input; free with
/// `netkit_free_string`.
#[unsafe(no_mangle)]
pub extern "C" fn netkit_json_to_wire(json: *const c_char) -> *mut c_char {
    catch_unwind(AssertUnwindSafe(|| {
        let Some(raw) = opt_str(json) else {
            return std::ptr::null_mut();
        };
        match serde_json::from_str::<serde_json::Value>(raw) {
            Ok(value) => {
                let wire = codec::wire_value(value, KeyStrategy::SnakeCaseWire);
                c_string(wire.to_string())
            }
            Err(_) => std::ptr::null_mut(),
        }
    }))
    .unwrap_or(std::ptr::null_mut())
}

// ---------------------------------------------------------------------------
// Free functions
// ---------------------------------------------------------------------------

/// Free an `FfiHttpRequest` returned by any `netkit_build_*` function.
/// Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn netkit_free_request(req: *mut FfiHttpRequest) {
    if req.is_null() {
        return;
    }
    let _ = catch_unwind(AssertUnwindSafe(|| {
        let req = unsafe { Box::from_raw(req) };
        if !req.url.is_null() {
            drop(unsafe { CString::from_raw(req.url) });
        }
        free_raw_bytes(req.body, req.body_len);
        if !req.headers.is_null() && req.headers_len > 0 {
            let headers = unsafe {
                Box::from_raw(std::ptr::slice_from_raw_parts_mut(
                    req.headers,
                    req.headers_len as usize,
                ))
            };
            for h in headers.iter() {
                if !h.key.is_null() {
                    drop(unsafe { CString::from_raw(h.key) });
                }
                if !h.value.is_null() {
                    drop(unsafe { CString::from_raw(h.value) });
                }
            }
        }
    }));
}

/// Free an `FfiApiResult` returned by `netkit_parse_response`.
/// Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn netkit_free_result(result: *mut FfiApiResult) {
    if result.is_null() {
        return;
    }
    let _ = catch_unwind(AssertUnwindSafe(|| {
        let result = unsafe { Box::from_raw(result) };
        if !result.error_message.is_null() {
            drop(unsafe { CString::from_raw(result.error_message) });
        }
        free_raw_bytes(result.body, result.body_len);
    }));
}

/// Free a C string allocated by this library. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn netkit_free_string(s: *mut c_char) {
    if !s.is_null() {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            drop(unsafe { CString::from_raw(s) });
        }));
    }
}
