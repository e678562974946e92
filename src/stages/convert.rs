use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use super::{AudioTranscoder, ProgressFn, ProgressParser, StageFailure, StageResult};

/// Number of stderr lines kept for the failure message
const STDERR_TAIL: usize = 20;

/// Transcoder backed by ffmpeg, producing mono 16-bit PCM wav
pub struct FfmpegTranscoder {
    ffmpeg_path: String,
    sample_rate: u32,
}

impl FfmpegTranscoder {
    pub fn new(ffmpeg_path: impl Into<String>, sample_rate: u32) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            sample_rate,
        }
    }
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self::new("ffmpeg", 16000)
    }
}

#[async_trait]
impl AudioTranscoder for FfmpegTranscoder {
    async fn convert(&self, src: &Path, dest_dir: &Path, progress: &ProgressFn) -> StageResult<PathBuf> {
        let stem = src
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio".to_string());
        let target = dest_dir.join(format!("{}.wav", stem));
        let sample_rate = self.sample_rate.to_string();

        tracing::debug!("Converting {} -> {}", src.display(), target.display());

        let mut child = Command::new(&self.ffmpeg_path)
            .args([
                "-y",
                "-nostats",
                "-i",
                &src.to_string_lossy(),
                "-vn",
                "-ac",
                "1",
                "-ar",
                &sample_rate,
                "-c:a",
                "pcm_s16le",
                "-progress",
                "-",
                &target.to_string_lossy(),
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| StageFailure::convert(format!("could not run {}: {}", self.ffmpeg_path, e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| StageFailure::convert("ffmpeg stdout was not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| StageFailure::convert("ffmpeg stderr was not captured"))?;

        let mut stdout = BufReader::new(stdout).lines();
        let mut stderr = BufReader::new(stderr).lines();
        let mut stdout_open = true;
        let mut stderr_open = true;

        let mut parser = ProgressParser::new();
        let mut stderr_tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL);

        // Both pipes are drained so ffmpeg never blocks on a full buffer
        while stdout_open || stderr_open {
            tokio::select! {
                line = stdout.next_line(), if stdout_open => match line {
                    Ok(Some(line)) => {
                        if let Some(percent) = parser.feed(&line) {
                            progress(percent);
                        }
                    }
                    _ => stdout_open = false,
                },
                line = stderr.next_line(), if stderr_open => match line {
                    Ok(Some(line)) => {
                        if let Some(percent) = parser.feed(&line) {
                            progress(percent);
                        }
                        if stderr_tail.len() == STDERR_TAIL {
                            stderr_tail.pop_front();
                        }
                        stderr_tail.push_back(line);
                    }
                    _ => stderr_open = false,
                },
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| StageFailure::convert(format!("waiting for ffmpeg failed: {}", e)))?;

        if !status.success() {
            let captured: Vec<String> = stderr_tail.into_iter().collect();
            return Err(StageFailure::convert(format!(
                "{} exited with {}:\n{}",
                self.ffmpeg_path,
                status,
                captured.join("\n")
            )));
        }

        if !target.is_file() {
            return Err(StageFailure::convert(format!(
                "{} was not written",
                target.display()
            )));
        }

        // Without a known duration there is no progress to report
        if parser.total_seconds().is_some() {
            progress(100.0);
        }
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::Stage;
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn test_missing_binary_is_convert_failure() {
        let dir = tempfile::tempdir().unwrap();
        let transcoder = FfmpegTranscoder::new("definitely-not-ffmpeg-binary", 16000);

        let failure = transcoder
            .convert(&dir.path().join("abc123.mp3"), dir.path(), &|_| {})
            .await
            .unwrap_err();
        assert_eq!(failure.stage, Stage::Convert);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_zero_exit_is_convert_failure() {
        let dir = tempfile::tempdir().unwrap();
        let transcoder = FfmpegTranscoder::new("false", 16000);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let report = {
            let seen = Arc::clone(&seen);
            move |p: f64| seen.lock().unwrap().push(p)
        };

        let failure = transcoder
            .convert(&dir.path().join("abc123.mp3"), dir.path(), &report)
            .await
            .unwrap_err();

        assert_eq!(failure.stage, Stage::Convert);
        assert!(failure.reason.contains("exited with"));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[cfg(unix)]
    fn fake_ffmpeg(dir: &Path, progress_lines: &str) -> String {
        use std::os::unix::fs::PermissionsExt;

        // Prints the given progress lines, then writes the last argument
        let script = dir.join("fake-ffmpeg");
        fs_err::write(
            &script,
            format!(
                "#!/bin/sh\nprintf '{}'\nfor last; do :; done\n: > \"$last\"\n",
                progress_lines
            ),
        )
        .unwrap();
        fs_err::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        script.to_string_lossy().into_owned()
    }

    #[cfg(unix)]
    async fn reported(progress_lines: &str) -> Vec<f64> {
        let dir = tempfile::tempdir().unwrap();
        let transcoder = FfmpegTranscoder::new(fake_ffmpeg(dir.path(), progress_lines), 16000);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let report = {
            let seen = Arc::clone(&seen);
            move |p: f64| seen.lock().unwrap().push(p)
        };

        let wav = transcoder
            .convert(&dir.path().join("abc123.mp3"), dir.path(), &report)
            .await
            .unwrap();
        assert_eq!(wav, dir.path().join("abc123.wav"));

        let values = seen.lock().unwrap().clone();
        values
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_progress_reported_with_duration() {
        let values = reported("duration=120.0\\nout_time_ms=60000000\\nprogress=end\\n").await;
        assert_eq!(values, vec![50.0, 100.0]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_no_progress_without_duration() {
        let values = reported("out_time_ms=1000000\\nprogress=end\\n").await;
        assert!(values.is_empty(), "unexpected progress {:?}", values);
    }
}
