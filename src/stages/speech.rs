use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{StageFailure, StageResult, Transcriber};

/// Synchronous recognition through the Google Cloud Speech-to-Text REST API
pub struct GoogleSpeechTranscriber {
    client: Client,
    endpoint: String,
    api_key: String,
    language: String,
    sample_rate: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RecognizeRequest<'a> {
    config: RecognitionConfig<'a>,
    audio: RecognitionAudio,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RecognitionConfig<'a> {
    encoding: &'static str,
    sample_rate_hertz: u32,
    audio_channel_count: u32,
    language_code: &'a str,
    enable_automatic_punctuation: bool,
}

#[derive(Debug, Serialize)]
struct RecognitionAudio {
    content: String,
}

#[derive(Debug, Deserialize)]
struct RecognizeResponse {
    #[serde(default)]
    results: Vec<SpeechResult>,
}

#[derive(Debug, Deserialize)]
struct SpeechResult {
    #[serde(default)]
    alternatives: Vec<Alternative>,
}

#[derive(Debug, Deserialize)]
struct Alternative {
    #[serde(default)]
    transcript: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
}

impl GoogleSpeechTranscriber {
    pub fn new(endpoint: &str, api_key: &str, language: &str, sample_rate: u32) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            language: language.to_string(),
            sample_rate,
        }
    }

    fn request_body(&self, audio: &[u8]) -> RecognizeRequest<'_> {
        RecognizeRequest {
            config: RecognitionConfig {
                encoding: "LINEAR16",
                sample_rate_hertz: self.sample_rate,
                audio_channel_count: 1,
                language_code: &self.language,
                enable_automatic_punctuation: true,
            },
            audio: RecognitionAudio {
                content: base64::engine::general_purpose::STANDARD.encode(audio),
            },
        }
    }
}

#[async_trait]
impl Transcriber for GoogleSpeechTranscriber {
    async fn transcribe(&self, wav_path: &Path) -> StageResult<String> {
        let audio = tokio::fs::read(wav_path).await.map_err(|e| {
            StageFailure::transcribe(format!("could not read {}: {}", wav_path.display(), e))
        })?;

        tracing::debug!(
            "Sending {} bytes to {} ({})",
            audio.len(),
            self.endpoint,
            self.language
        );

        let url = format!("{}/v1/speech:recognize", self.endpoint);
        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&self.request_body(&audio))
            .send()
            .await
            .map_err(|e| StageFailure::transcribe(format!("request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| StageFailure::transcribe(format!("reading response failed: {}", e)))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(StageFailure::transcribe(format!(
                "service returned HTTP {}: {}",
                status,
                message.trim()
            )));
        }

        parse_transcript(&body)
    }
}

/// Join the best alternative of every result, one per line
fn parse_transcript(body: &str) -> StageResult<String> {
    let response: RecognizeResponse = serde_json::from_str(body)
        .map_err(|e| StageFailure::transcribe(format!("unexpected response: {}", e)))?;

    let lines: Vec<String> = response
        .results
        .into_iter()
        .filter_map(|r| r.alternatives.into_iter().next())
        .map(|alt| alt.transcript.trim().to_string())
        .collect();

    Ok(lines.join("\n"))
}
