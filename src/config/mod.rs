use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::TranscriptorError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Video catalog source
    pub youtube: YoutubeConfig,

    /// Speech-to-text backend
    pub speech: SpeechConfig,

    /// Application settings
    pub app: AppConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YoutubeConfig {
    /// YouTube Data API key
    pub api_key: String,

    /// Channel URL, handle or `UC...` channel id
    pub channel: String,

    /// Data API root
    pub base_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeechBackend {
    Google,
    Aws,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    /// Which service transcribes the audio
    pub backend: SpeechBackend,

    /// Language code, fixed for the whole run
    pub language: String,

    /// Sample rate the audio is converted to
    pub sample_rate: u32,

    pub google: GoogleSpeechConfig,

    pub aws: AwsSpeechConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleSpeechConfig {
    /// API key for speech.googleapis.com
    pub api_key: String,

    /// Service root
    pub endpoint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwsSpeechConfig {
    /// AWS region
    pub region: String,

    /// S3 bucket for temporary audio storage
    pub s3_bucket: String,

    /// Optional S3 key prefix
    pub s3_key_prefix: Option<String>,
}

/// When the ledger is written back during a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PersistMode {
    /// After every recorded outcome
    EachItem,
    /// Once, after the last item
    EndOfBatch,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// CSV ledger of catalog items
    pub ledger_path: PathBuf,

    /// Scratch space for downloaded and converted audio
    pub work_dir: PathBuf,

    /// Where rendered transcripts are written
    pub output_dir: PathBuf,

    /// Keep audio files after a successful transcription
    pub keep_audio: bool,

    /// Upper bound for a single stage, 0 disables it
    pub stage_timeout_secs: u64,

    pub persist: PersistMode,

    pub yt_dlp_path: String,

    pub ffmpeg_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            youtube: YoutubeConfig {
                api_key: "".to_string(),
                channel: "".to_string(),
                base_url: "https://www.googleapis.com/youtube/v3".to_string(),
            },
            speech: SpeechConfig {
                backend: SpeechBackend::Google,
                language: "en-US".to_string(),
                sample_rate: 16000,
                google: GoogleSpeechConfig {
                    api_key: "".to_string(),
                    endpoint: "https://speech.googleapis.com".to_string(),
                },
                aws: AwsSpeechConfig {
                    region: "us-east-1".to_string(),
                    s3_bucket: "".to_string(),
                    s3_key_prefix: Some("transcriber/".to_string()),
                },
            },
            app: AppConfig {
                ledger_path: PathBuf::from("videos.csv"),
                work_dir: PathBuf::from("work"),
                output_dir: PathBuf::from("transcripts"),
                keep_audio: false,
                stage_timeout_secs: 1800,
                persist: PersistMode::EachItem,
                yt_dlp_path: "yt-dlp".to_string(),
                ffmpeg_path: "ffmpeg".to_string(),
            },
        }
    }
}

impl Config {
    /// Load configuration from the default location or create it
    pub async fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        Self::load_from(&config_path).await
    }

    /// Load configuration from `path`, writing defaults there if it is missing
    pub async fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = fs_err::read_to_string(path).context("Failed to read config file")?;

            let config: Config =
                serde_yaml::from_str(&content).context("Failed to parse config file")?;

            Ok(config)
        } else {
            let config = Self::default();
            config.save_to(path).await?;
            tracing::info!("Wrote default configuration to {}", path.display());
            Ok(config)
        }
    }

    /// Save configuration to `path`
    pub async fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs_err::create_dir_all(parent)?;
            }
        }

        let content = serde_yaml::to_string(self).context("Failed to serialize config")?;

        fs_err::write(path, content).context("Failed to write config file")?;

        Ok(())
    }

    /// Get configuration file path
    pub fn config_path() -> Result<PathBuf> {
        // First try current directory for easy testing
        let local_config = PathBuf::from("config.yaml");
        if local_config.exists() {
            return Ok(local_config);
        }

        let config_dir = dirs::config_dir().context("Could not determine config directory")?;

        Ok(config_dir.join("channel-transcriber").join("config.yaml"))
    }

    /// Check the settings needed to fetch the catalog
    pub fn validate_catalog(&self) -> Result<(), TranscriptorError> {
        if self.youtube.api_key.is_empty() {
            return Err(TranscriptorError::Config(
                "youtube.api_key must be configured (or set YOUTUBE_API_KEY)".into(),
            ));
        }
        if self.youtube.channel.is_empty() {
            return Err(TranscriptorError::Config(
                "youtube.channel must be configured (or pass --channel)".into(),
            ));
        }
        Ok(())
    }

    /// Check the settings needed by the selected speech backend
    pub fn validate_speech(&self) -> Result<(), TranscriptorError> {
        if self.speech.language.is_empty() {
            return Err(TranscriptorError::Config("speech.language must be set".into()));
        }
        if self.speech.sample_rate == 0 {
            return Err(TranscriptorError::Config(
                "speech.sample_rate must be positive".into(),
            ));
        }

        match self.speech.backend {
            SpeechBackend::Google if self.speech.google.api_key.is_empty() => {
                Err(TranscriptorError::Config(
                    "speech.google.api_key must be configured (or set GOOGLE_SPEECH_API_KEY)".into(),
                ))
            }
            SpeechBackend::Aws if self.speech.aws.s3_bucket.is_empty() => Err(
                TranscriptorError::Config("speech.aws.s3_bucket must be configured".into()),
            ),
            _ => Ok(()),
        }
    }

    /// Per-stage timeout, `None` when disabled
    pub fn stage_timeout(&self) -> Option<Duration> {
        match self.app.stage_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Display current configuration
    pub fn display(&self) {
        let secret = |value: &str| if value.is_empty() { "(not set)" } else { "********" };

        println!("Current Configuration:");
        println!("  YouTube API Key: {}", secret(&self.youtube.api_key));
        println!("  Channel: {}", self.youtube.channel);
        println!("  Speech Backend: {:?}", self.speech.backend);
        println!("  Language: {}", self.speech.language);
        println!("  Sample Rate: {} Hz", self.speech.sample_rate);
        match self.speech.backend {
            SpeechBackend::Google => {
                println!("  Google API Key: {}", secret(&self.speech.google.api_key));
            }
            SpeechBackend::Aws => {
                println!("  AWS Region: {}", self.speech.aws.region);
                println!("  S3 Bucket: {}", self.speech.aws.s3_bucket);
            }
        }
        println!("  Ledger: {}", self.app.ledger_path.display());
        println!("  Work Dir: {}", self.app.work_dir.display());
        println!("  Output Dir: {}", self.app.output_dir.display());
        println!("  Keep Audio: {}", self.app.keep_audio);
        println!("  Stage Timeout: {}s", self.app.stage_timeout_secs);
        println!("  Persist: {:?}", self.app.persist);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_file_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/config.yaml");

        let config = Config::load_from(&path).await.unwrap();
        assert!(path.exists());
        assert_eq!(config.speech.sample_rate, 16000);
        assert_eq!(config.app.persist, PersistMode::EachItem);

        let reloaded = Config::load_from(&path).await.unwrap();
        assert_eq!(reloaded.speech.language, "en-US");
    }

    #[test]
    fn test_yaml_enums() {
        let mut config = Config::default();
        config.speech.backend = SpeechBackend::Aws;
        config.app.persist = PersistMode::EndOfBatch;

        let yaml = serde_yaml::to_string(&config).unwrap();
        assert!(yaml.contains("backend: aws"));
        assert!(yaml.contains("persist: end-of-batch"));
    }

    #[test]
    fn test_validate_speech_backend() {
        let mut config = Config::default();
        assert!(matches!(config.validate_speech(), Err(TranscriptorError::Config(_))));

        config.speech.google.api_key = "key".into();
        assert!(config.validate_speech().is_ok());

        config.speech.backend = SpeechBackend::Aws;
        assert!(config.validate_speech().is_err());
        config.speech.aws.s3_bucket = "bucket".into();
        assert!(config.validate_speech().is_ok());
    }

    #[test]
    fn test_validate_catalog() {
        let mut config = Config::default();
        assert!(config.validate_catalog().is_err());
        config.youtube.api_key = "key".into();
        config.youtube.channel = "https://www.youtube.com/@StrategyU".into();
        assert!(config.validate_catalog().is_ok());
    }

    #[test]
    fn test_zero_timeout_disables() {
        let mut config = Config::default();
        assert_eq!(config.stage_timeout(), Some(Duration::from_secs(1800)));
        config.app.stage_timeout_secs = 0;
        assert_eq!(config.stage_timeout(), None);
    }
}
