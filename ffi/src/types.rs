//! `#[repr(C)]` types for the FFI boundary.
//!
//! # Design
//! Each type mirrors a core type with C-compatible representations: C
//! strings for text, pointer + length for bytes, and enums with explicit
//! discriminants. Conversion functions live here to keep `lib.rs` focused on
//! the `extern "C"` surface.

use std::ffi::{c_void, CString};
use std::os::raw::c_char;
use std::sync::Mutex;

use netkit_core::{ApiError, HttpMethod, HttpRequest, ListenerId, MediaKind, Session};

/// Opaque handle to a client session. C callers receive a pointer to this
/// and pass it back into every FFI function.
pub struct FfiNetClient {
    pub(crate) inner: Session,
    pub(crate) listener: Mutex<Option<ListenerId>>,
}

/// Unauthorized callback plus the host pointer handed back to it.
#[derive(Clone, Copy)]
pub(crate) struct CallbackTarget {
    pub(crate) callback: extern "C" fn(*mut c_void),
    pub(crate) user_data: *mut c_void,
}

// The host guarantees `user_data` may be used from any thread for as long as
// the callback is registered.
unsafe impl Send for CallbackTarget {}
unsafe impl Sync for CallbackTarget {}

impl CallbackTarget {
    pub(crate) fn fire(self) {
        (self.callback)(self.user_data);
    }
}

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

/// HTTP method as a C enum.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiHttpMethod {
    Get = 0,
    Post = 1,
    Put = 2,
    Delete = 3,
}

impl From<HttpMethod> for FfiHttpMethod {
    fn from(m: HttpMethod) -> Self {
        match m {
            HttpMethod::Get => FfiHttpMethod::Get,
            HttpMethod::Post => FfiHttpMethod::Post,
            HttpMethod::Put => FfiHttpMethod::Put,
            HttpMethod::Delete => FfiHttpMethod::Delete,
        }
    }
}

impl From<FfiHttpMethod> for HttpMethod {
    fn from(m: FfiHttpMethod) -> Self {
        match m {
            FfiHttpMethod::Get => HttpMethod::Get,
            FfiHttpMethod::Post => HttpMethod::Post,
            FfiHttpMethod::Put => HttpMethod::Put,
            FfiHttpMethod::Delete => HttpMethod::Delete,
        }
    }
}

/// Media type of an uploaded file.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiMediaKind {
    Jpeg = 0,
    Png = 1,
    Mp4 = 2,
    QuickTime = 3,
}

impl From<FfiMediaKind> for MediaKind {
    fn from(kind: FfiMediaKind) -> Self {
        match kind {
            FfiMediaKind::Jpeg => MediaKind::Jpeg,
            FfiMediaKind::Png => MediaKind::Png,
            FfiMediaKind::Mp4 => MediaKind::Mp4,
            FfiMediaKind::QuickTime => MediaKind::QuickTime,
        }
    }
}

/// A single HTTP header as a key-value pair of C strings.
#[repr(C)]
pub struct FfiHeader {
    pub key: *mut c_char,
    pub value: *mut c_char,
}

/// An HTTP request described as C-compatible plain data.
///
/// Built by `netkit_build_*` functions. The host executes the request and
/// passes the response back through `netkit_parse_response`.
#[repr(C)]
pub struct FfiHttpRequest {
    pub method: FfiHttpMethod,
    pub url: *mut c_char,
    pub headers: *mut FfiHeader,
    pub headers_len: u32,
    pub body: *mut u8,
    pub body_len: usize,
}

/// Hand ownership of `bytes` to C as pointer + length.
pub(crate) fn bytes_into_raw(bytes: Vec<u8>) -> (*mut u8, usize) {
    if bytes.is_empty() {
        return (std::ptr::null_mut(), 0);
    }
    let boxed = bytes.into_boxed_slice();
    let len = boxed.len();
    (Box::into_raw(boxed).cast::<u8>(), len)
}

/// Reclaim a buffer produced by `bytes_into_raw`.
pub(crate) fn free_raw_bytes(ptr: *mut u8, len: usize) {
    if !ptr.is_null() && len > 0 {
        drop(unsafe { Box::from_raw(std::ptr::slice_from_raw_parts_mut(ptr, len)) });
    }
}

/// `CString` that tolerates interior NULs by dropping them.
pub(crate) fn c_string(s: String) -> *mut c_char {
    CString::new(s)
        .unwrap_or_else(|e| {
            let mut bytes = e.into_vec();
            bytes.retain(|b| *b != 0);
            CString::new(bytes).unwrap_or_default()
        })
        .into_raw()
}

impl FfiHttpRequest {
    /// Convert a core `HttpRequest` into a heap-allocated `FfiHttpRequest`.
    pub(crate) fn from_core(req: HttpRequest) -> *mut Self {
        let url = c_string(req.url);
        let (body, body_len) = bytes_into_raw(req.body.unwrap_or_default());

        let headers_len = u32::try_from(req.headers.len()).unwrap_or(u32::MAX);
        let headers = if req.headers.is_empty() {
            std::ptr::null_mut()
        } else {
            let ffi_headers: Box<[FfiHeader]> = req
                .headers
                .into_iter()
                .take(headers_len as usize)
                .map(|(k, v)| FfiHeader {
                    key: c_string(k),
                    value: c_string(v),
                })
                .collect();
            Box::into_raw(ffi_headers).cast::<FfiHeader>()
        };

        Box::into_raw(Box::new(FfiHttpRequest {
            method: req.method.into(),
            url,
            headers,
            headers_len,
            body,
            body_len,
        }))
    }
}

// ---------------------------------------------------------------------------
// Response input (caller-provided, not heap-allocated by us)
// ---------------------------------------------------------------------------

/// An HTTP response described as C-compatible plain data.
///
/// The host constructs this after executing a request and passes a pointer
/// to `netkit_parse_response`. The FFI layer reads but does not free these
/// fields.
#[repr(C)]
pub struct FfiHttpResponse {
    pub status: u16,
    pub body: *const u8,
    pub body_len: usize,
}

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// Error codes returned in `FfiApiResult`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiErrorCode {
    Ok = 0,
    InvalidUrl = 1,
    BodyEncoding = 2,
    Decoding = 3,
    Transport = 4,
    Unauthorized = 5,
    Validation = 6,
    Unknown = 7,
    Panic = 8,
    NullArg = 9,
}

/// Result envelope for `netkit_parse_response`.
///
/// On success `error_code` is `Ok`, `error_message` is null and `body` holds
/// the JSON payload with internal (camelCase) keys. On a validation error
/// `body` holds the raw response payload. Otherwise `body` is null.
#[repr(C)]
pub struct FfiApiResult {
    pub error_code: FfiErrorCode,
    pub error_message: *mut c_char,
    pub http_status: u16,
    pub body: *mut u8,
    pub body_len: usize,
}

impl FfiApiResult {
    fn boxed(
        error_code: FfiErrorCode,
        error_message: Option<String>,
        http_status: u16,
        body: Vec<u8>,
    ) -> *mut Self {
        let (body, body_len) = bytes_into_raw(body);
        Box::into_raw(Box::new(FfiApiResult {
            error_code,
            error_message: error_message.map_or(std::ptr::null_mut(), c_string),
            http_status,
            body,
            body_len,
        }))
    }

    pub(crate) fn ok(http_status: u16, body: Vec<u8>) -> *mut Self {
        Self::boxed(FfiErrorCode::Ok, None, http_status, body)
    }

    /// Build an error result from an `ApiError`.
    pub(crate) fn from_error(err: ApiError) -> *mut Self {
        let msg = err.to_string();
        match err {
            ApiError::InvalidUrl(_) => Self::boxed(FfiErrorCode::InvalidUrl, Some(msg), 0, Vec::new()),
            ApiError::BodyEncoding(_) => {
                Self::boxed(FfiErrorCode::BodyEncoding, Some(msg), 0, Vec::new())
            }
            ApiError::Decoding(_) => Self::boxed(FfiErrorCode::Decoding, Some(msg), 0, Vec::new()),
            ApiError::Transport(_) => Self::boxed(FfiErrorCode::Transport, Some(msg), 0, Vec::new()),
            ApiError::Unauthorized => {
                Self::boxed(FfiErrorCode::Unauthorized, Some(msg), 401, Vec::new())
            }
            ApiError::Validation(body) => Self::boxed(FfiErrorCode::Validation, Some(msg), 422, body),
            ApiError::Unknown { status } => {
                Self::boxed(FfiErrorCode::Unknown, Some(msg), status, Vec::new())
            }
        }
    }

    /// Build an error result for a null argument.
    pub(crate) fn null_arg(name: &str) -> *mut Self {
        Self::boxed(
            FfiErrorCode::NullArg,
            Some(format!("null argument: {name}")),
            0,
            Vec::new(),
        )
    }

    /// Build an error result for a caught panic.
    pub(crate) fn panic(msg: &str) -> *mut Self {
        Self::boxed(FfiErrorCode::Panic, Some(msg.to_string()), 0, Vec::new())
    }
}
