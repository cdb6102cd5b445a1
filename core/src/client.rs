//! Request executor.
//!
//! # Design
//! `ApiClient` pairs a `Session` (pure request building and response
//! classification) with an `HttpTransport`. Every async operation is
//! build -> `HttpTransport::execute` -> classify -> decode, with one
//! transport invocation per call and no retries.
//!
//! The only state shared between concurrent calls is the session token
//! (read when a request is built) and the unauthorized broadcast.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::runtime::Handle;
use tracing::debug;

use crate::config::{ClientConfig, IoContext};
use crate::error::{ApiError, Result, TransportError};
use crate::events::{UnauthorizedEvents, UnauthorizedReceiver};
use crate::http::{Endpoint, HttpRequest, HttpResponse};
use crate::media::{self, FfmpegTranscoder, QualityPreset, TranscodedFile, Transcoder};
use crate::multipart::{Attachment, MediaKind, MultipartField, MultipartForm};
use crate::session::Session;
use crate::transport::{HttpTransport, ReqwestTransport};

/// Everything `upload_with_video` sends in one multipart request.
#[derive(Debug, Clone, Default)]
pub struct VideoUpload {
    pub images: Vec<Attachment>,
    pub images_field: String,
    /// Source video; it is transcoded to a sibling file before upload.
    pub video: PathBuf,
    pub video_field: String,
    pub text_fields: Vec<(String, String)>,
}

impl VideoUpload {
    pub fn new(video: impl Into<PathBuf>, video_field: impl Into<String>) -> Self {
        Self {
            video: video.into(),
            video_field: video_field.into(),
            ..Self::default()
        }
    }

    pub fn with_images(mut self, field: impl Into<String>, images: Vec<Attachment>) -> Self {
        self.images_field = field.into();
        self.images = images;
        self
    }

    pub fn with_text(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.text_fields.push((field.into(), value.into()));
        self
    }
}

pub struct ApiClient<T = ReqwestTransport> {
    session: Session,
    io: IoContext,
    video_preset: QualityPreset,
    transport: Arc<T>,
    transcoder: Arc<dyn Transcoder>,
}

impl<T> std::fmt::Debug for ApiClient<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.session.base_url())
            .field("io", &self.io)
            .field("video_preset", &self.video_preset)
            .finish_non_exhaustive()
    }
}

impl ApiClient<ReqwestTransport> {
    pub fn new(config: ClientConfig) -> Self {
        Self::with_transport(config, ReqwestTransport::new())
    }
}

impl<T: HttpTransport + 'static> ApiClient<T> {
    pub fn with_transport(config: ClientConfig, transport: T) -> Self {
        Self {
            session: Session::new(config.base_url, config.token, config.key_strategy),
            io: config.io,
            video_preset: config.video_preset,
            transport: Arc::new(transport),
            transcoder: Arc::new(FfmpegTranscoder::new()),
        }
    }

    pub fn with_transcoder(mut self, transcoder: impl Transcoder + 'static) -> Self {
        self.transcoder = Arc::new(transcoder);
        self
    }

    /// Request building and response classification without I/O.
    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn set_token(&self, token: &str) {
        self.session.set_token(token);
    }

    pub fn unauthorized_events(&self) -> &Arc<UnauthorizedEvents> {
        self.session.unauthorized_events()
    }

    pub fn subscribe_unauthorized(&self) -> UnauthorizedReceiver {
        self.session.subscribe_unauthorized()
    }

    async fn dispatch(
        &self,
        request: HttpRequest,
    ) -> std::result::Result<HttpResponse, TransportError> {
        debug!(method = %request.method, url = %request.url, "dispatching request");
        let handle = match &self.io {
            IoContext::Inline => None,
            IoContext::Spawned(Some(handle)) => Some(handle.clone()),
            IoContext::Spawned(None) => Handle::try_current().ok(),
        };
        let url = request.url.clone();
        let outcome = match handle {
            Some(handle) => {
                let transport = Arc::clone(&self.transport);
                handle
                    .spawn(async move { transport.execute(request).await })
                    .await
                    .map_err(|e| TransportError::Join(e.to_string()))?
            }
            None => self.transport.execute(request).await,
        };
        match &outcome {
            Ok(response) => debug!(status = response.status, url = %url, "response received"),
            Err(e) => debug!(url = %url, error = %e, "transport failed"),
        }
        outcome
    }

    /// Execute a built request and decode the successful body.
    pub async fn send<R: DeserializeOwned>(&self, request: HttpRequest) -> Result<R> {
        let outcome = self.dispatch(request).await;
        let body = self.session.classify(outcome)?;
        self.session.decode(&body)
    }

    pub async fn fetch<R: DeserializeOwned>(
        &self,
        path: &str,
        extra_headers: &[(&str, &str)],
    ) -> Result<R> {
        let endpoint = Endpoint::get(path).with_headers(extra_headers.iter().copied());
        self.send(self.session.build_request(&endpoint, None)?).await
    }

    pub async fn post<B, R>(
        &self,
        path: &str,
        body: Option<&B>,
        extra_headers: &[(&str, &str)],
    ) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let endpoint = Endpoint::post(path).with_headers(extra_headers.iter().copied());
        self.send(self.session.build_json_request(&endpoint, body)?).await
    }

    pub async fn put<B, R>(
        &self,
        path: &str,
        body: Option<&B>,
        extra_headers: &[(&str, &str)],
    ) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let endpoint = Endpoint::put(path).with_headers(extra_headers.iter().copied());
        self.send(self.session.build_json_request(&endpoint, body)?).await
    }

    pub async fn delete<R: DeserializeOwned>(
        &self,
        path: &str,
        extra_headers: &[(&str, &str)],
    ) -> Result<R> {
        let endpoint = Endpoint::delete(path).with_headers(extra_headers.iter().copied());
        self.send(self.session.build_request(&endpoint, None)?).await
    }

    /// Upload one file under `field_name` with a generated file name.
    pub async fn upload_file<R: DeserializeOwned>(
        &self,
        path: &str,
        file: Attachment,
        field_name: &str,
    ) -> Result<R> {
        let mut form = MultipartForm::new();
        form.push(MultipartField::file(field_name, file));
        self.send(self.session.build_upload(path, &form)?).await
    }

    /// Transcode `upload.video`, then upload it together with the images
    /// (`field[0]`, `field[1]`, ...) and text fields in one request.
    ///
    /// Nothing is sent if the URL is invalid or the video cannot be
    /// prepared; the latter surfaces as `ApiError::BodyEncoding`.
    pub async fn upload_with_video<R: DeserializeOwned>(
        &self,
        path: &str,
        upload: VideoUpload,
    ) -> Result<R> {
        self.session.build_url(path)?;
        let video = self.prepare_video(&upload.video).await?;

        let mut form = MultipartForm::new();
        form.push_indexed_files(&upload.images_field, upload.images)
            .push(MultipartField::file(
                upload.video_field,
                Attachment::new(MediaKind::Mp4, video),
            ));
        for (field, value) in upload.text_fields {
            form.push(MultipartField::text(field, value));
        }
        self.send(self.session.build_upload(path, &form)?).await
    }

    async fn prepare_video(&self, input: &Path) -> Result<Vec<u8>> {
        // Guarded before transcoding so a partial output is removed too.
        let output = TranscodedFile::new(media::transcoded_path(input));
        let written = self
            .transcoder
            .transcode(input, output.path(), self.video_preset)
            .await
            .map_err(|e| ApiError::BodyEncoding(format!("video transcoding failed: {e}")))?;
        let _elsewhere = (written != input && written != output.path())
            .then(|| TranscodedFile::new(written.clone()));
        tokio::fs::read(&written)
            .await
            .map_err(|e| ApiError::BodyEncoding(format!("transcoded video unreadable: {e}")))
    }
}
