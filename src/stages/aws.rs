use anyhow::Context;
use async_trait::async_trait;
use aws_sdk_s3::Client as S3Client;
use aws_sdk_transcribe::types::{LanguageCode, Media, MediaFormat, TranscriptionJob, TranscriptionJobStatus};
use aws_sdk_transcribe::Client as TranscribeClient;
use serde::Deserialize;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::time::Duration;
use tokio::time::sleep;
use uuid::Uuid;

use super::{StageFailure, StageResult, Transcriber};
use crate::config::AwsSpeechConfig;

/// Batch transcription through AWS Transcribe, staged via S3
pub struct AwsTranscriber {
    s3_client: S3Client,
    transcribe_client: TranscribeClient,
    bucket: String,
    key_prefix: String,
    language: String,
    sample_rate: u32,
}

/// Subset of the AWS Transcribe result document we read
#[derive(Debug, Deserialize)]
struct AwsTranscript {
    results: TranscriptResults,
}

#[derive(Debug, Deserialize)]
struct TranscriptResults {
    #[serde(default)]
    transcripts: Vec<TranscriptText>,
}

#[derive(Debug, Deserialize)]
struct TranscriptText {
    transcript: String,
}

impl AwsTranscriber {
    pub async fn new(config: &AwsSpeechConfig, language: &str, sample_rate: u32) -> Self {
        let aws_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_types::region::Region::new(config.region.clone()))
            .load()
            .await;

        Self {
            s3_client: S3Client::new(&aws_config),
            transcribe_client: TranscribeClient::new(&aws_config),
            bucket: config.s3_bucket.clone(),
            key_prefix: config.s3_key_prefix.clone().unwrap_or_default(),
            language: language.to_string(),
            sample_rate,
        }
    }

    async fn upload(&self, wav_path: &Path, key: &str) -> anyhow::Result<()> {
        tracing::info!("Uploading audio to S3: s3://{}/{}", self.bucket, key);
        let content = fs_err::read(wav_path)?;

        self.s3_client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(content.into())
            .content_type("audio/wav")
            .send()
            .await
            .context("Failed to upload audio to S3")?;

        Ok(())
    }

    async fn start_job(&self, key: &str, job_name: &str) -> anyhow::Result<()> {
        let media = Media::builder()
            .media_file_uri(format!("s3://{}/{}", self.bucket, key))
            .build();

        tracing::info!("Starting transcription job: {}", job_name);

        self.transcribe_client
            .start_transcription_job()
            .transcription_job_name(job_name)
            .media_format(MediaFormat::Wav)
            .media(media)
            .language_code(LanguageCode::from(self.language.as_str()))
            .media_sample_rate_hertz(self.sample_rate as i32)
            .send()
            .await
            .context("Failed to start transcription job")?;

        Ok(())
    }

    async fn get_job(&self, job_name: &str) -> anyhow::Result<TranscriptionJob> {
        let response = self
            .transcribe_client
            .get_transcription_job()
            .transcription_job_name(job_name)
            .send()
            .await
            .context("Failed to get transcription job status")?;

        response
            .transcription_job()
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("Transcription job not found"))
    }

    /// Poll until the job settles, backing off up to 30 seconds between checks
    async fn wait_for_job(&self, job_name: &str) -> anyhow::Result<TranscriptionJob> {
        let mut check_count: u64 = 0;

        loop {
            check_count += 1;
            let job = self.get_job(job_name).await?;

            match job.transcription_job_status() {
                Some(TranscriptionJobStatus::InProgress) | Some(TranscriptionJobStatus::Queued) => {
                    tracing::debug!("Job {} still running (check #{})", job_name, check_count);
                    let wait_time = std::cmp::min(5 + (check_count - 1) * 2, 30);
                    sleep(Duration::from_secs(wait_time)).await;
                }
                Some(TranscriptionJobStatus::Completed) => return Ok(job),
                Some(TranscriptionJobStatus::Failed) => {
                    let reason = job.failure_reason().unwrap_or("Unknown error");
                    anyhow::bail!("Transcription job failed: {}", reason);
                }
                _ => anyhow::bail!("Unexpected transcription job status"),
            }
        }
    }

    async fn fetch_transcript(&self, job: &TranscriptionJob) -> anyhow::Result<String> {
        let uri = job
            .transcript()
            .and_then(|t| t.transcript_file_uri())
            .ok_or_else(|| anyhow::anyhow!("No transcript URI found"))?;

        let response = reqwest::get(uri).await.context("Failed to download transcript")?;
        if !response.status().is_success() {
            anyhow::bail!("Failed to download transcript: HTTP {}", response.status());
        }

        let body = response.text().await.context("Failed to read transcript content")?;
        join_transcripts(&body)
    }

    async fn run(&self, wav_path: &Path, key: &str, job_name: &str) -> anyhow::Result<String> {
        self.upload(wav_path, key).await?;
        self.start_job(key, job_name).await?;
        let job = self.wait_for_job(job_name).await?;
        self.fetch_transcript(&job).await
    }

    async fn cleanup(&self, key: &str) {
        delete_object(self.s3_client.clone(), self.bucket.clone(), key.to_string()).await;
    }

    /// Cleanup for a run that was dropped before it finished
    fn abandon(&self, key: &str, job_name: &str) -> impl Future<Output = ()> + Send + 'static {
        let s3_client = self.s3_client.clone();
        let transcribe_client = self.transcribe_client.clone();
        let bucket = self.bucket.clone();
        let key = key.to_string();
        let job_name = job_name.to_string();

        async move {
            tracing::warn!("Transcription {} was interrupted, cleaning up", job_name);
            delete_object(s3_client, bucket, key).await;

            // The job may not exist yet if the upload was interrupted
            if let Err(e) = transcribe_client
                .delete_transcription_job()
                .transcription_job_name(&job_name)
                .send()
                .await
            {
                tracing::debug!("Could not delete transcription job {}: {}", job_name, e);
            }
        }
    }
}

#[async_trait]
impl Transcriber for AwsTranscriber {
    async fn transcribe(&self, wav_path: &Path) -> StageResult<String> {
        let key = format!("{}audio_{}.wav", self.key_prefix, Uuid::new_v4());
        let job_name = format!("transcriber_{}", Uuid::new_v4());

        let guard = CleanupOnDrop::new(self.abandon(&key, &job_name));
        let result = self.run(wav_path, &key, &job_name).await;
        guard.disarm();
        self.cleanup(&key).await;

        result.map_err(|e| StageFailure::transcribe(format!("{:#}", e)))
    }
}

async fn delete_object(client: S3Client, bucket: String, key: String) {
    tracing::debug!("Cleaning up S3 object: {}", key);

    let result = client.delete_object().bucket(&bucket).key(&key).send().await;
    if let Err(e) = result {
        tracing::warn!("Failed to clean up s3://{}/{}: {}", bucket, key, e);
    }
}

type CleanupTask = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Spawns `task` if dropped while still armed
///
/// A stage timeout drops the transcription future mid-poll, so cleanup
/// cannot simply follow the awaited work.
struct CleanupOnDrop {
    task: Option<CleanupTask>,
}

impl CleanupOnDrop {
    fn new(task: impl Future<Output = ()> + Send + 'static) -> Self {
        Self {
            task: Some(Box::pin(task)),
        }
    }

    fn disarm(mut self) {
        self.task = None;
    }
}

impl Drop for CleanupOnDrop {
    fn drop(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(task);
            }
            Err(_) => tracing::warn!("No runtime left to run transcription cleanup"),
        }
    }
}

/// Join every transcript alternative of the result document, one per line
fn join_transcripts(body: &str) -> anyhow::Result<String> {
    let transcript: AwsTranscript =
        serde_json::from_str(body).context("Failed to parse transcript JSON")?;

    Ok(transcript
        .results
        .transcripts
        .into_iter()
        .map(|t| t.transcript.trim().to_string())
        .collect::<Vec<_>>()
        .join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::{bounded, Stage};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_join_transcripts() {
        let body = r#"{
            "jobName": "transcriber_1",
            "accountId": "123",
            "status": "COMPLETED",
            "results": {
                "transcripts": [{"transcript": "Hello there."}, {"transcript": "Second part."}],
                "items": []
            }
        }"#;

        assert_eq!(join_transcripts(body).unwrap(), "Hello there.\nSecond part.");
    }

    #[test]
    fn test_join_transcripts_rejects_garbage() {
        assert!(join_transcripts("not json").is_err());
    }

    fn flagging_task(flag: &Arc<AtomicBool>) -> impl Future<Output = ()> + Send + 'static {
        let flag = Arc::clone(flag);
        async move { flag.store(true, Ordering::SeqCst) }
    }

    #[tokio::test]
    async fn test_cleanup_runs_when_stage_times_out() {
        let cleaned = Arc::new(AtomicBool::new(false));
        let task = flagging_task(&cleaned);

        let limit = Some(Duration::from_millis(20));
        let result: StageResult<String> = bounded(Stage::Transcribe, limit, async move {
            let guard = CleanupOnDrop::new(task);
            sleep(Duration::from_secs(5)).await;
            guard.disarm();
            Ok(String::new())
        })
        .await;

        let failure = tokio_test::assert_err!(result);
        assert!(failure.reason.contains("timed out"));

        for _ in 0..50 {
            if cleaned.load(Ordering::SeqCst) {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
        assert!(cleaned.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_disarmed_cleanup_does_not_run() {
        let cleaned = Arc::new(AtomicBool::new(false));

        let guard = CleanupOnDrop::new(flagging_task(&cleaned));
        guard.disarm();
        tokio::task::yield_now().await;
        sleep(Duration::from_millis(20)).await;

        assert!(!cleaned.load(Ordering::SeqCst));
    }
}
