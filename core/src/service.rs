//! Operation set shared by the real client and test doubles.
//!
//! Application code that is generic over `ApiService` can be exercised
//! against a scripted implementation without any transport at all.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::client::{ApiClient, VideoUpload};
use crate::error::Result;
use crate::events::UnauthorizedReceiver;
use crate::multipart::Attachment;
use crate::transport::HttpTransport;

#[async_trait]
pub trait ApiService: Send + Sync {
    fn set_token(&self, token: &str);

    fn subscribe_unauthorized(&self) -> UnauthorizedReceiver;

    async fn fetch<R>(&self, path: &str, extra_headers: &[(&str, &str)]) -> Result<R>
    where
        R: DeserializeOwned + Send;

    async fn post<B, R>(
        &self,
        path: &str,
        body: Option<&B>,
        extra_headers: &[(&str, &str)],
    ) -> Result<R>
    where
        B: Serialize + Sync + ?Sized,
        R: DeserializeOwned + Send;

    async fn put<B, R>(
        &self,
        path: &str,
        body: Option<&B>,
        extra_headers: &[(&str, &str)],
    ) -> Result<R>
    where
        B: Serialize + Sync + ?Sized,
        R: DeserializeOwned + Send;

    async fn delete<R>(&self, path: &str, extra_headers: &[(&str, &str)]) -> Result<R>
    where
        R: DeserializeOwned + Send;

    async fn upload_file<R>(&self, path: &str, file: Attachment, field_name: &str) -> Result<R>
    where
        R: DeserializeOwned + Send;

    async fn upload_with_video<R>(&self, path: &str, upload: VideoUpload) -> Result<R>
    where
        R: DeserializeOwned + Send;
}

#[async_trait]
impl<T: HttpTransport + 'static> ApiService for ApiClient<T> {
    fn set_token(&self, token: &str) {
        ApiClient::set_token(self, token);
    }

    fn subscribe_unauthorized(&self) -> UnauthorizedReceiver {
        ApiClient::subscribe_unauthorized(self)
    }

    async fn fetch<R>(&self, path: &str, extra_headers: &[(&str, &str)]) -> Result<R>
    where
        R: DeserializeOwned + Send,
    {
        ApiClient::fetch(self, path, extra_headers).await
    }

    async fn post<B, R>(
        &self,
        path: &str,
        body: Option<&B>,
        extra_headers: &[(&str, &str)],
    ) -> Result<R>
    where
        B: Serialize + Sync + ?Sized,
        R: DeserializeOwned + Send,
    {
        ApiClient::post(self, path, body, extra_headers).await
    }

    async fn put<B, R>(
        &self,
        path: &str,
        body: Option<&B>,
        extra_headers: &[(&str, &str)],
    ) -> Result<R>
    where
        B: Serialize + Sync + ?Sized,
        R: DeserializeOwned + Send,
    {
        ApiClient::put(self, path, body, extra_headers).await
    }

    async fn delete<R>(&self, path: &str, extra_headers: &[(&str, &str)]) -> Result<R>
    where
        R: DeserializeOwned + Send,
    {
        ApiClient::delete(self, path, extra_headers).await
    }

    async fn upload_file<R>(&self, path: &str, file: Attachment, field_name: &str) -> Result<R>
    where
        R: DeserializeOwned + Send,
    {
        ApiClient::upload_file(self, path, file, field_name).await
    }

    async fn upload_with_video<R>(&self, path: &str, upload: VideoUpload) -> Result<R>
    where
        R: DeserializeOwned + Send,
    {
        ApiClient::upload_with_video(self, path, upload).await
    }
}
