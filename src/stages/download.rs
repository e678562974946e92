use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

use super::{tail_lines, AudioFetcher, StageFailure, StageResult};
use crate::catalog::canonical_url;
use crate::utils::id_file_stem;

/// Audio fetcher backed by yt-dlp
pub struct YtDlpFetcher {
    yt_dlp_path: String,
}

impl YtDlpFetcher {
    pub fn new(yt_dlp_path: impl Into<String>) -> Self {
        Self {
            yt_dlp_path: yt_dlp_path.into(),
        }
    }
}

impl Default for YtDlpFetcher {
    fn default() -> Self {
        Self::new("yt-dlp")
    }
}

#[async_trait]
impl AudioFetcher for YtDlpFetcher {
    async fn download(&self, item_id: &str, dest_dir: &Path) -> StageResult<PathBuf> {
        let output_path = dest_dir.join(format!("{}.mp3", id_file_stem(item_id)));
        let url = canonical_url(item_id);
        let template = output_template(&output_path);
        tracing::debug!("Downloading audio for {} to {}", url, output_path.display());

        let output = Command::new(&self.yt_dlp_path)
            .args([
                "--extract-audio",
                "--audio-format",
                "mp3",
                "--no-playlist",
                "--no-progress",
                "--output",
                &template,
                &url,
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| StageFailure::download(format!("could not run {}: {}", self.yt_dlp_path, e)))?;

        if !output.status.success() {
            let captured = format!(
                "{}{}",
                String::from_utf8_lossy(&output.stdout),
                String::from_utf8_lossy(&output.stderr)
            );
            return Err(StageFailure::download(format!(
                "{} exited with {}:\n{}",
                self.yt_dlp_path,
                output.status,
                tail_lines(&captured, 20)
            )));
        }

        if !output_path.is_file() {
            return Err(StageFailure::download(format!(
                "{} reported success but {} was not written",
                self.yt_dlp_path,
                output_path.display()
            )));
        }

        Ok(output_path)
    }
}

/// yt-dlp reads `--output` as a template, so a literal `%` is doubled
fn output_template(path: &Path) -> String {
    path.to_string_lossy().replace('%', "%%")
}
