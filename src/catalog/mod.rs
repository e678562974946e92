use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub mod youtube;

use crate::Result;

/// Progress of one catalog item through the transcription pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TranscriptStatus {
    Pending,
    Skipped,
    Failed,
    Done,
}

impl TranscriptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TranscriptStatus::Pending => "Pending",
            TranscriptStatus::Skipped => "Skipped",
            TranscriptStatus::Failed => "Failed",
            TranscriptStatus::Done => "Done",
        }
    }
}

impl fmt::Display for TranscriptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TranscriptStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(TranscriptStatus::Pending),
            "skipped" => Ok(TranscriptStatus::Skipped),
            "failed" => Ok(TranscriptStatus::Failed),
            "done" => Ok(TranscriptStatus::Done),
            other => Err(format!("unknown transcript status '{}'", other)),
        }
    }
}

/// One video of the catalog and its transcript bookkeeping
///
/// `transcript_link` is non-empty exactly when the status is `Done`; the
/// `mark_*` methods are the only way to change either field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: String,
    pub title: String,
    pub description: String,
    pub published_at: DateTime<Utc>,
    status: TranscriptStatus,
    transcript_link: String,
}

impl CatalogItem {
    /// A freshly fetched item that has not been processed yet
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
        published_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: description.into(),
            published_at,
            status: TranscriptStatus::Pending,
            transcript_link: String::new(),
        }
    }

    /// Rebuild an item from persisted fields, rejecting a status/link mismatch
    pub(crate) fn restore(
        id: String,
        title: String,
        description: String,
        published_at: DateTime<Utc>,
        status: TranscriptStatus,
        transcript_link: String,
    ) -> std::result::Result<Self, String> {
        match (status, transcript_link.is_empty()) {
            (TranscriptStatus::Done, true) => {
                return Err(format!("item {} is Done but has no transcript link", id))
            }
            (s, false) if s != TranscriptStatus::Done => {
                return Err(format!("item {} is {} but has a transcript link", id, s))
            }
            _ => {}
        }

        Ok(Self {
            id,
            title,
            description,
            published_at,
            status,
            transcript_link,
        })
    }

    pub fn status(&self) -> TranscriptStatus {
        self.status
    }

    pub fn transcript_link(&self) -> &str {
        &self.transcript_link
    }

    pub fn is_done(&self) -> bool {
        self.status == TranscriptStatus::Done
    }

    pub fn mark_done(&mut self, link: impl Into<String>) {
        let link = link.into();
        if link.is_empty() {
            // An empty link would break the Done invariant
            self.mark_failed();
            return;
        }
        self.status = TranscriptStatus::Done;
        self.transcript_link = link;
    }

    pub fn mark_failed(&mut self) {
        self.status = TranscriptStatus::Failed;
        self.transcript_link.clear();
    }

    /// Only pending items become skipped; earlier outcomes are kept
    pub fn mark_skipped(&mut self) {
        if self.status == TranscriptStatus::Pending {
            self.status = TranscriptStatus::Skipped;
        }
    }

    /// Take over descriptive fields from a newer fetch of the same video
    pub fn refresh_from(&mut self, fetched: &CatalogItem) {
        self.title = fetched.title.clone();
        self.description = fetched.description.clone();
        self.published_at = fetched.published_at;
    }

    /// Watch URL handed to the audio fetcher
    pub fn canonical_url(&self) -> String {
        canonical_url(&self.id)
    }
}

/// Canonical watch URL for a video id
pub fn canonical_url(video_id: &str) -> String {
    format!(
        "https://www.youtube.com/watch?v={}",
        urlencoding::encode(video_id)
    )
}

/// Source of the full catalog of work items
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Fetch every item, following pagination to exhaustion
    async fn fetch_catalog(&self) -> Result<Vec<CatalogItem>>;
}
