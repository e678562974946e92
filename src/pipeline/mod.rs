use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

use crate::catalog::CatalogItem;
use crate::stages::progress::format_percent;
use crate::stages::{
    bounded, AudioFetcher, AudioTranscoder, HtmlRenderer, Stage, StageFailure, StageResult,
    Transcriber,
};
use crate::utils::id_file_stem;

/// Successful outcome of one item
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedItem {
    pub title: String,
    pub transcript_link: String,
}

/// Scratch state of a single item's run
///
/// The working directory is private to the item and removed when the run is
/// dropped, whichever stage the run ended in.
struct PipelineRun {
    scratch: TempDir,
    raw_audio: Option<PathBuf>,
    wav_audio: Option<PathBuf>,
}

impl PipelineRun {
    fn start(work_dir: &Path, item_id: &str) -> StageResult<Self> {
        let prepare = || -> std::io::Result<TempDir> {
            fs_err::create_dir_all(work_dir)?;
            tempfile::Builder::new()
                .prefix(&format!("{}-", id_file_stem(item_id)))
                .tempdir_in(work_dir)
        };

        let scratch = prepare().map_err(|e| {
            StageFailure::download(format!(
                "could not prepare working directory in {}: {}",
                work_dir.display(),
                e
            ))
        })?;

        Ok(Self {
            scratch,
            raw_audio: None,
            wav_audio: None,
        })
    }

    fn dir(&self) -> &Path {
        self.scratch.path()
    }

    /// Keep the scratch directory on disk instead of deleting it
    fn keep(self) -> PathBuf {
        for artifact in self.raw_audio.iter().chain(self.wav_audio.iter()) {
            tracing::debug!("Keeping {}", artifact.display());
        }
        self.scratch.keep()
    }
}

/// Runs download, convert, transcribe and render for one item
///
/// Stages run strictly in order and the first failure ends the item. There
/// is no retry here; the batch decides what to do with a failed item.
pub struct ItemPipeline {
    fetcher: Box<dyn AudioFetcher>,
    transcoder: Box<dyn AudioTranscoder>,
    transcriber: Box<dyn Transcriber>,
    renderer: HtmlRenderer,
    work_dir: PathBuf,
    stage_timeout: Option<Duration>,
    keep_audio: bool,
    show_progress: bool,
}

impl ItemPipeline {
    pub fn new(
        fetcher: Box<dyn AudioFetcher>,
        transcoder: Box<dyn AudioTranscoder>,
        transcriber: Box<dyn Transcriber>,
        renderer: HtmlRenderer,
        work_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            fetcher,
            transcoder,
            transcriber,
            renderer,
            work_dir: work_dir.into(),
            stage_timeout: None,
            keep_audio: false,
            show_progress: false,
        }
    }

    pub fn with_stage_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.stage_timeout = timeout;
        self
    }

    pub fn with_keep_audio(mut self, keep_audio: bool) -> Self {
        self.keep_audio = keep_audio;
        self
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn renderer(&self) -> &HtmlRenderer {
        &self.renderer
    }

    /// Process one item, returning its rendered link or the failing stage
    pub async fn process(&self, item: &CatalogItem) -> StageResult<ProcessedItem> {
        let mut run = PipelineRun::start(&self.work_dir, &item.id)?;

        let spinner = self.spinner(format!("Downloading audio for {}...", item.id));
        let raw = bounded(
            Stage::Download,
            self.stage_timeout,
            self.fetcher.download(&item.id, run.dir()),
        )
        .await;
        spinner.finish_and_clear();
        let raw = run.raw_audio.insert(raw?).clone();

        let wav = self.convert(&raw, run.dir(), &item.id).await?;
        let wav = run.wav_audio.insert(wav).clone();

        let spinner = self.spinner(format!("Transcribing audio for {}...", item.id));
        let text = bounded(
            Stage::Transcribe,
            self.stage_timeout,
            self.transcriber.transcribe(&wav),
        )
        .await;
        spinner.finish_and_clear();
        let text = text?;

        let link = bounded(
            Stage::Render,
            self.stage_timeout,
            self.renderer.render(&item.id, &item.title, &text),
        )
        .await?;

        if self.keep_audio {
            let kept = run.keep();
            tracing::info!("Kept audio for {} in {}", item.id, kept.display());
        }

        Ok(ProcessedItem {
            title: item.title.clone(),
            transcript_link: link,
        })
    }

    async fn convert(&self, raw: &Path, dest_dir: &Path, item_id: &str) -> StageResult<PathBuf> {
        let bar = if self.show_progress {
            let bar = ProgressBar::new(100);
            if let Ok(style) = ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {msg}")
            {
                bar.set_style(style.progress_chars("#>-"));
            }
            bar
        } else {
            ProgressBar::hidden()
        };
        bar.set_message(format!("Converting audio format for {}", item_id));

        let report = {
            let bar = bar.clone();
            let item_id = item_id.to_string();
            move |percent: f64| {
                bar.set_position(percent.round() as u64);
                bar.set_message(format!(
                    "Converting audio format for {}: {}",
                    item_id,
                    format_percent(percent)
                ));
                tracing::trace!("{} conversion at {}", item_id, format_percent(percent));
            }
        };

        let result = bounded(
            Stage::Convert,
            self.stage_timeout,
            self.transcoder.convert(raw, dest_dir, &report),
        )
        .await;
        bar.finish_and_clear();
        result
    }

    fn spinner(&self, message: String) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }

        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
            spinner.set_style(style);
        }
        spinner.set_message(message);
        spinner.enable_steady_tick(Duration::from_millis(120));
        spinner
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    //! In-process stand-ins for the external tools

    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::path::{Path, PathBuf};

    use crate::stages::{
        AudioFetcher, AudioTranscoder, ProgressFn, StageFailure, StageResult, Transcriber,
    };

    /// Writes a fake mp3, failing for the listed ids
    #[derive(Default)]
    pub struct FakeFetcher {
        pub failing: HashSet<String>,
    }

    impl FakeFetcher {
        pub fn failing(ids: &[&str]) -> Self {
            Self {
                failing: ids.iter().map(|id| id.to_string()).collect(),
            }
        }
    }

    #[async_trait]
    impl AudioFetcher for FakeFetcher {
        async fn download(&self, item_id: &str, dest_dir: &Path) -> StageResult<PathBuf> {
            if self.failing.contains(item_id) {
                return Err(StageFailure::download("yt-dlp exited with exit status: 1"));
            }
            let path = dest_dir.join(format!("{}.mp3", item_id));
            fs_err::write(&path, b"ID3").map_err(|e| StageFailure::download(e.to_string()))?;
            Ok(path)
        }
    }

    /// Copies the source next to it as wav, reporting the ffmpeg-style progress lines
    pub struct FakeTranscoder;

    #[async_trait]
    impl AudioTranscoder for FakeTranscoder {
        async fn convert(&self, src: &Path, dest_dir: &Path, progress: &ProgressFn) -> StageResult<PathBuf> {
            let mut parser = crate::stages::ProgressParser::new();
            for line in ["duration=120.0", "out_time_ms=60000000", "progress=end"] {
                if let Some(percent) = parser.feed(line) {
                    progress(percent);
                }
            }
            let stem = src.file_stem().unwrap_or_default().to_string_lossy().into_owned();
            let target = dest_dir.join(format!("{}.wav", stem));
            fs_err::copy(src, &target).map_err(|e| StageFailure::convert(e.to_string()))?;
            Ok(target)
        }
    }

    /// Returns the same segments for every file
    pub struct FakeTranscriber {
        pub segments: Vec<String>,
    }

    impl FakeTranscriber {
        pub fn new(segments: &[&str]) -> Self {
            Self {
                segments: segments.iter().map(|s| s.to_string()).collect(),
            }
        }
    }

    #[async_trait]
    impl Transcriber for FakeTranscriber {
        async fn transcribe(&self, wav_path: &Path) -> StageResult<String> {
            if !wav_path.is_file() {
                return Err(StageFailure::transcribe("missing wav"));
            }
            Ok(self.segments.join("\n"))
        }
    }
}
