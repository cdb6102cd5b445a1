//! Client configuration.

use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;

use crate::codec::KeyStrategy;
use crate::media::QualityPreset;

pub const ENV_BASE_URL: &str = "NETKIT_BASE_URL";
pub const ENV_TOKEN: &str = "NETKIT_TOKEN";

/// Where the transport future of each call runs.
#[derive(Debug, Clone)]
pub enum IoContext {
    /// Spawn the transport call as its own task, on the given runtime or on
    /// the runtime current at dispatch time when `None`.
    Spawned(Option<Handle>),
    /// Drive the transport call on the calling task.
    Inline,
}

impl Default for IoContext {
    fn default() -> Self {
        IoContext::Spawned(None)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("environment variable {0} is not set")]
    MissingVar(&'static str),
}

/// One logical backend session: base URL, bearer token and codec settings.
///
/// `token` is copied into the client at construction; later changes go
/// through `ApiClient::set_token`. An empty token is valid and simply sends
/// an empty `Authorization` header.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub base_url: String,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub key_strategy: KeyStrategy,
    /// Preset handed to the transcoder by `upload_with_video`.
    #[serde(default)]
    pub video_preset: QualityPreset,
    #[serde(skip)]
    pub io: IoContext,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: String::new(),
            key_strategy: KeyStrategy::default(),
            video_preset: QualityPreset::default(),
            io: IoContext::default(),
        }
    }

    /// Read `NETKIT_BASE_URL` (required) and `NETKIT_TOKEN` (optional).
    pub fn from_env() -> Result<Self, ConfigError> {
        let base_url =
            std::env::var(ENV_BASE_URL).map_err(|_| ConfigError::MissingVar(ENV_BASE_URL))?;
        let token = std::env::var(ENV_TOKEN).unwrap_or_default();
        Ok(Self::new(base_url).with_token(token))
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = token.into();
        self
    }

    pub fn with_key_strategy(mut self, key_strategy: KeyStrategy) -> Self {
        self.key_strategy = key_strategy;
        self
    }

    pub fn with_video_preset(mut self, preset: QualityPreset) -> Self {
        self.video_preset = preset;
        self
    }

    pub fn with_io_handle(mut self, handle: Handle) -> Self {
        self.io = IoContext::Spawned(Some(handle));
        self
    }

    pub fn with_inline_io(mut self) -> Self {
        self.io = IoContext::Inline;
        self
    }
}
