//! Typed JSON-over-HTTP client core for mobile backends.
//!
//! # Overview
//! Wraps a raw HTTP transport with typed request/response handling: URL and
//! header assembly with bearer-token injection, snake_case wire-key
//! conversion, status classification into `ApiError`, multipart uploads
//! (including a transcoded video), and a broadcast for 401 responses.
//!
//! # Design
//! - Request building and response classification are pure (host-does-IO);
//!   `Session::build_*` and `Session::parse_response` can be driven by a
//!   native host that performs the I/O itself.
//! - The async operations compose exactly those pieces around an
//!   `HttpTransport`. One call, one transport invocation, no retries.
//! - `ApiService` is the seam for substituting the whole client in tests.

pub mod classify;
pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod events;
pub mod http;
pub mod media;
pub mod multipart;
pub mod service;
pub mod session;
pub mod transport;

pub use classify::Classification;
pub use client::{ApiClient, VideoUpload};
pub use codec::KeyStrategy;
pub use config::{ClientConfig, ConfigError, IoContext};
pub use error::{ApiError, Result, TransportError};
pub use events::{ListenerId, UnauthorizedEvent, UnauthorizedEvents, UnauthorizedReceiver};
pub use http::{Endpoint, HttpMethod, HttpRequest, HttpResponse};
pub use media::{CopyTranscoder, FfmpegTranscoder, QualityPreset, TranscodeError, Transcoder};
pub use multipart::{Attachment, MediaKind, MultipartField, MultipartForm};
pub use service::ApiService;
pub use session::Session;
pub use transport::{HttpTransport, ReqwestTransport};
