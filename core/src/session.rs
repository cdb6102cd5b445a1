//! Request building and response handling for one backend session.
//!
//! # Design
//! `Session` holds the base URL, the bearer token and the codec settings,
//! plus the unauthorized broadcast. It builds `HttpRequest` values and
//! classifies `HttpResponse` values without touching the network, so the
//! async client and the C ABI share exactly the same rules.

use std::sync::{Arc, PoisonError, RwLock};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::classify::Classification;
use crate::codec::{self, KeyStrategy};
use crate::error::{ApiError, Result, TransportError};
use crate::events::{UnauthorizedEvents, UnauthorizedReceiver};
use crate::http::{set_header, Endpoint, HttpRequest, HttpResponse};
use crate::multipart::MultipartForm;

pub const CONTENT_TYPE: &str = "Content-Type";
pub const ACCEPT: &str = "Accept";
pub const AUTHORIZATION: &str = "Authorization";
const JSON: &str = "application/json";

#[derive(Debug)]
pub struct Session {
    base_url: String,
    token: RwLock<String>,
    key_strategy: KeyStrategy,
    events: Arc<UnauthorizedEvents>,
}

impl Session {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>, key_strategy: KeyStrategy) -> Self {
        Self {
            base_url: base_url.into(),
            token: RwLock::new(token.into()),
            key_strategy,
            events: Arc::new(UnauthorizedEvents::new()),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn key_strategy(&self) -> KeyStrategy {
        self.key_strategy
    }

    /// Requests built after this call carry the new token.
    pub fn set_token(&self, token: &str) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = token.to_string();
    }

    pub fn token(&self) -> String {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn unauthorized_events(&self) -> &Arc<UnauthorizedEvents> {
        &self.events
    }

    pub fn subscribe_unauthorized(&self) -> UnauthorizedReceiver {
        self.events.subscribe()
    }

    /// `base_url + path`, verbatim, if it parses as an absolute URL with a
    /// host written out after `scheme://`.
    pub fn build_url(&self, path: &str) -> Result<String> {
        let raw = format!("{}{path}", self.base_url);
        match url::Url::parse(&raw) {
            Ok(parsed) if parsed.has_host() && has_authority(&raw, parsed.scheme()) => Ok(raw),
            Ok(_) => Err(ApiError::InvalidUrl(format!("{raw}: missing host"))),
            Err(e) => Err(ApiError::InvalidUrl(format!("{raw}: {e}"))),
        }
    }

    /// JSON defaults plus the current token, then `extra` on top.
    pub fn headers(&self, extra: &[(String, String)]) -> Vec<(String, String)> {
        let mut headers = vec![
            (CONTENT_TYPE.to_string(), JSON.to_string()),
            (ACCEPT.to_string(), JSON.to_string()),
            (AUTHORIZATION.to_string(), self.token()),
        ];
        for (key, value) in extra {
            set_header(&mut headers, key, value);
        }
        headers
    }

    pub fn build_request(&self, endpoint: &Endpoint, body: Option<Vec<u8>>) -> Result<HttpRequest> {
        let url = self.build_url(&endpoint.path)?;
        Ok(HttpRequest {
            method: endpoint.method,
            url,
            headers: self.headers(&endpoint.extra_headers),
            body,
        })
    }

    /// Like `build_request`, with `payload` encoded as JSON. `None` sends no
    /// body.
    pub fn build_json_request<B: Serialize + ?Sized>(
        &self,
        endpoint: &Endpoint,
        payload: Option<&B>,
    ) -> Result<HttpRequest> {
        let mut request = self.build_request(endpoint, None)?;
        request.body = payload
            .map(|p| codec::encode_json(p, self.key_strategy))
            .transpose()?;
        Ok(request)
    }

    /// POST `form` to `path` with the multipart `Content-Type`.
    pub fn build_upload(&self, path: &str, form: &MultipartForm) -> Result<HttpRequest> {
        let mut request = self.build_request(&Endpoint::post(path), Some(form.encode()))?;
        request.set_header(CONTENT_TYPE, &form.content_type());
        Ok(request)
    }

    /// Classify a transport outcome. A 401 is broadcast exactly once here.
    pub fn classify(
        &self,
        outcome: std::result::Result<HttpResponse, TransportError>,
    ) -> Result<Vec<u8>> {
        let classification = Classification::from_outcome(outcome);
        match &classification {
            Classification::Unauthorized => {
                warn!("request unauthorized; notifying subscribers");
                self.events.emit();
            }
            Classification::Unknown(status) => warn!(status, "unexpected response status"),
            _ => {}
        }
        classification.into_result()
    }

    pub fn decode<R: DeserializeOwned>(&self, body: &[u8]) -> Result<R> {
        codec::decode_json(body, self.key_strategy)
    }

    pub fn parse_response<R: DeserializeOwned>(&self, response: HttpResponse) -> Result<R> {
        let body = self.classify(Ok(response))?;
        self.decode(&body)
    }
}

/// The parser repairs `https:///users` into `https://users/`, so the host
/// must also be present in the text we actually send.
fn has_authority(raw: &str, scheme: &str) -> bool {
    raw.get(scheme.len()..)
        .and_then(|rest| rest.strip_prefix("://"))
        .is_some_and(|rest| !rest.is_empty() && !rest.starts_with(['/', '\\', '?', '#']))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::UnauthorizedEvent;
    use serde::Deserialize;

    const BASE_URL: &str = "https://api.example.com";

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct User {
        first_name: String,
    }

    fn session() -> Session {
        Session::new(BASE_URL, "Bearer t0k", KeyStrategy::SnakeCaseWire)
    }

    #[test]
    fn build_request_sets_default_headers() {
        let req = session()
            .build_request(&Endpoint::get("/users/42"), None)
            .unwrap();
        assert_eq!(req.method, crate::HttpMethod::Get);
        assert_eq!(req.url, "https://api.example.com/users/42");
        assert_eq!(
            req.headers,
            vec![
                ("Content-Type".to_string(), "application/json".to_string()),
                ("Accept".to_string(), "application/json".to_string()),
                ("Authorization".to_string(), "Bearer t0k".to_string()),
            ]
        );
        assert!(req.body.is_none());
    }

    #[test]
    fn extra_headers_override_defaults() {
        let endpoint = Endpoint::get("/feed")
            .with_header("Accept", "application/vnd.feed+json")
            .with_header("X-Locale", "de");
        let req = session().build_request(&endpoint, None).unwrap();
        assert_eq!(req.header("Accept"), Some("application/vnd.feed+json"));
        assert_eq!(req.header("X-Locale"), Some("de"));
        assert_eq!(req.header("Authorization"), Some("Bearer t0k"));
        assert_eq!(req.headers.len(), 4);
    }

    #[test]
    fn path_is_appended_verbatim() {
        let s = Session::new("https://api.example.com/", "", KeyStrategy::default());
        let req = s.build_request(&Endpoint::get("/users"), None).unwrap();
        assert_eq!(req.url, "https://api.example.com//users");
    }

    #[test]
    fn invalid_urls_are_rejected() {
        for base in ["api.example.com", "", "https://", "mailto:ops", "not a url"] {
            let s = Session::new(base, "", KeyStrategy::default());
            let err = s.build_request(&Endpoint::get("/users"), None).unwrap_err();
            assert!(matches!(err, ApiError::InvalidUrl(_)), "{base}: {err:?}");
        }
    }

    #[test]
    fn empty_authority_is_rejected() {
        let s = Session::new("https://", "", KeyStrategy::default());
        for path in ["/users", "//users", "/"] {
            let err = s.build_url(path).unwrap_err();
            assert!(matches!(err, ApiError::InvalidUrl(_)), "{path}: {err:?}");
        }
        let s = Session::new("https:", "", KeyStrategy::default());
        assert!(s.build_url("/users").is_err());
        assert!(s.build_url("//api.example.com/users").is_ok());
    }

    #[test]
    fn uppercase_scheme_keeps_its_authority() {
        let s = Session::new("HTTPS://api.example.com", "", KeyStrategy::default());
        assert_eq!(s.build_url("/users").unwrap(), "HTTPS://api.example.com/users");
    }

    #[test]
    fn empty_token_is_sent_as_is() {
        let s = Session::new(BASE_URL, "", KeyStrategy::default());
        let req = s.build_request(&Endpoint::get("/public"), None).unwrap();
        assert_eq!(req.header("Authorization"), Some(""));
    }

    #[test]
    fn set_token_applies_to_later_requests() {
        let s = session();
        let before = s.build_request(&Endpoint::get("/me"), None).unwrap();
        s.set_token("Bearer rotated");
        let after = s.build_request(&Endpoint::get("/me"), None).unwrap();
        assert_eq!(before.header("Authorization"), Some("Bearer t0k"));
        assert_eq!(after.header("Authorization"), Some("Bearer rotated"));
    }

    #[test]
    fn build_json_request_encodes_wire_keys() {
        let user = User {
            first_name: "Ada".to_string(),
        };
        let req = session()
            .build_json_request(&Endpoint::post("/users"), Some(&user))
            .unwrap();
        assert_eq!(req.body.as_deref(), Some(&br#"{"first_name":"Ada"}"#[..]));

        let empty = session()
            .build_json_request::<User>(&Endpoint::post("/ping"), None)
            .unwrap();
        assert!(empty.body.is_none());
    }

    #[test]
    fn build_upload_overrides_content_type() {
        let form = MultipartForm::with_boundary("b0");
        let req = session().build_upload("/files", &form).unwrap();
        assert_eq!(req.method, crate::HttpMethod::Post);
        assert_eq!(req.header(CONTENT_TYPE), Some("multipart/form-data; boundary=b0"));
        assert_eq!(req.header(ACCEPT), Some("application/json"));
        assert_eq!(req.body.as_deref(), Some(&b"--b0--\r\n"[..]));
    }

    #[test]
    fn parse_response_decodes_success() {
        let user: User = session()
            .parse_response(HttpResponse::new(200, r#"{"first_name":"Ada"}"#))
            .unwrap();
        assert_eq!(user.first_name, "Ada");
    }

    #[test]
    fn parse_response_broadcasts_unauthorized() {
        let s = session();
        let mut rx = s.subscribe_unauthorized();
        let err = s.parse_response::<User>(HttpResponse::new(401, "")).unwrap_err();
        assert!(err.is_unauthorized());
        assert_eq!(rx.try_recv().unwrap(), UnauthorizedEvent);
        assert_eq!(s.unauthorized_events().emitted(), 1);
    }
}
