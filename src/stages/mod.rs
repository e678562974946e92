//! Pipeline stages
//!
//! Each stage runs exactly one external operation (a subprocess or a remote
//! call) and normalizes its outcome into a [`StageResult`]. Stages write into
//! the working directory they are handed and never touch the ledger.

use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub mod aws;
pub mod convert;
pub mod download;
pub mod progress;
pub mod render;
pub mod speech;

pub use aws::AwsTranscriber;
pub use convert::FfmpegTranscoder;
pub use download::YtDlpFetcher;
pub use progress::ProgressParser;
pub use render::HtmlRenderer;
pub use speech::GoogleSpeechTranscriber;

/// The four ordered steps of the per-item pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Download,
    Convert,
    Transcribe,
    Render,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Download => "download",
            Stage::Convert => "convert",
            Stage::Transcribe => "transcribe",
            Stage::Render => "render",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a stage did not produce its output
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("{stage} failed: {reason}")]
pub struct StageFailure {
    pub stage: Stage,
    pub reason: String,
}

impl StageFailure {
    pub fn new(stage: Stage, reason: impl Into<String>) -> Self {
        Self {
            stage,
            reason: reason.into(),
        }
    }

    pub fn download(reason: impl Into<String>) -> Self {
        Self::new(Stage::Download, reason)
    }

    pub fn convert(reason: impl Into<String>) -> Self {
        Self::new(Stage::Convert, reason)
    }

    pub fn transcribe(reason: impl Into<String>) -> Self {
        Self::new(Stage::Transcribe, reason)
    }

    pub fn render(reason: impl Into<String>) -> Self {
        Self::new(Stage::Render, reason)
    }
}

/// Outcome of a single stage
pub type StageResult<T> = std::result::Result<T, StageFailure>;

/// Receives the conversion progress as a percentage in `0.0..=100.0`
pub type ProgressFn = dyn Fn(f64) + Send + Sync;

/// Fetches the source audio of a catalog item
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AudioFetcher: Send + Sync {
    /// Download the audio of `item_id` into `dest_dir`, returning the mp3 path
    async fn download(&self, item_id: &str, dest_dir: &Path) -> StageResult<PathBuf>;
}

/// Resamples audio to the mono PCM stream the transcriber expects
#[async_trait]
pub trait AudioTranscoder: Send + Sync {
    /// Convert `src` into a wav file inside `dest_dir`
    async fn convert(&self, src: &Path, dest_dir: &Path, progress: &ProgressFn) -> StageResult<PathBuf>;
}

/// Speech-to-text backend
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe a mono 16 kHz wav file into newline separated text
    async fn transcribe(&self, wav_path: &Path) -> StageResult<String>;
}

/// Run a stage future, failing it when `limit` elapses first
///
/// Dropping the future on expiry kills any child process spawned with
/// `kill_on_drop`.
pub async fn bounded<T, F>(stage: Stage, limit: Option<Duration>, fut: F) -> StageResult<T>
where
    F: Future<Output = StageResult<T>>,
{
    match limit {
        Some(limit) => match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => Err(StageFailure::new(
                stage,
                format!("timed out after {}s", limit.as_secs()),
            )),
        },
        None => fut.await,
    }
}

/// Keep only the last `max_lines` of tool output for diagnostics
pub(crate) fn tail_lines(text: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(max_lines);
    lines[start..].join("\n")
}
