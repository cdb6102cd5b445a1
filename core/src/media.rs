//! Video preprocessing before a combined image + video upload.
//!
//! # Design
//! The client only needs "turn this input file into an upload-ready output
//! file". `Transcoder` is that seam; `FfmpegTranscoder` shells out to
//! `ffmpeg` on a tokio child process and `CopyTranscoder` is the identity
//! conversion for inputs that are already in the upload format.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityPreset {
    Low,
    #[default]
    Medium,
    High,
    /// Re-mux without re-encoding.
    Passthrough,
}

impl QualityPreset {
    /// x264 constant rate factor; `None` for stream copy.
    fn crf(self) -> Option<u8> {
        match self {
            QualityPreset::Low => Some(32),
            QualityPreset::Medium => Some(26),
            QualityPreset::High => Some(20),
            QualityPreset::Passthrough => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TranscodeError {
    #[error("failed to start transcoder: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("transcoder exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("I/O error during transcoding: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Convert `input` into `output` and return the path that now holds the
    /// upload-ready file.
    async fn transcode(
        &self,
        input: &Path,
        output: &Path,
        preset: QualityPreset,
    ) -> Result<PathBuf, TranscodeError>;
}

/// Transcodes to H.264/AAC MP4 with the `ffmpeg` binary.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    program: PathBuf,
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self {
            program: PathBuf::from("ffmpeg"),
        }
    }
}

impl FfmpegTranscoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific `ffmpeg` executable instead of the one on `PATH`.
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn args(input: &Path, output: &Path, preset: QualityPreset) -> Vec<String> {
        let mut args = vec![
            "-y".to_string(),
            "-i".to_string(),
            input.display().to_string(),
        ];
        match preset.crf() {
            Some(crf) => {
                let crf = crf.to_string();
                args.extend(
                    [
                        "-c:v",
                        "libx264",
                        "-preset",
                        "veryfast",
                        "-crf",
                        crf.as_str(),
                        "-c:a",
                        "aac",
                        "-movflags",
                        "+faststart",
                    ]
                    .map(str::to_string),
                );
            }
            None => args.extend(["-c", "copy"].map(str::to_string)),
        }
        args.push(output.display().to_string());
        args
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn transcode(
        &self,
        input: &Path,
        output: &Path,
        preset: QualityPreset,
    ) -> Result<PathBuf, TranscodeError> {
        debug!(?preset, "transcoding video");
        let result = Command::new(&self.program)
            .args(Self::args(input, output, preset))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(TranscodeError::Spawn)?;
        if !result.status.success() {
            return Err(TranscodeError::Failed {
                status: result.status.to_string(),
                stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            });
        }
        Ok(output.to_path_buf())
    }
}

/// Copies the input unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct CopyTranscoder;

#[async_trait]
impl Transcoder for CopyTranscoder {
    async fn transcode(
        &self,
        input: &Path,
        output: &Path,
        _preset: QualityPreset,
    ) -> Result<PathBuf, TranscodeError> {
        tokio::fs::copy(input, output).await?;
        Ok(output.to_path_buf())
    }
}

/// `clip.mov` -> `clip.<uuid-v4>.mp4`, next to the input. Every call
/// returns a fresh path.
pub fn transcoded_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map_or_else(|| "video".into(), |s| s.to_string_lossy());
    input.with_file_name(format!("{stem}.{}.mp4", Uuid::new_v4()))
}

/// Deletes a transcoder output when dropped, including when the owning
/// future is cancelled.
#[derive(Debug)]
pub(crate) struct TranscodedFile(PathBuf);

impl TranscodedFile {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self(path)
    }

    pub(crate) fn path(&self) -> &Path {
        &self.0
    }
}

impl Drop for TranscodedFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.0) {
            if e.kind() != std::io::ErrorKind::NotFound {
                debug!(path = %self.0.display(), error = %e, "could not remove transcoded file");
            }
        }
    }
}
