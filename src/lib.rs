//! Channel Transcriber - resumable batch transcription of a video channel
//!
//! Every video of a channel is tracked as a row in a CSV ledger. A batch pass
//! downloads the audio of each selected video, converts it to mono 16 kHz PCM,
//! sends it to a speech-recognition service and publishes the transcript as a
//! small HTML document. Progress is written back to the ledger so an
//! interrupted run resumes where it stopped.

pub mod batch;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod ledger;
pub mod output;
pub mod pipeline;
pub mod stages;
pub mod utils;

pub use batch::{BatchRunner, BatchSummary, Decision, SelectionPolicy};
pub use catalog::{CatalogItem, CatalogSource, TranscriptStatus};
pub use cli::{Cli, Commands};
pub use config::Config;
pub use ledger::Ledger;
pub use pipeline::{ItemPipeline, ProcessedItem};
pub use stages::{Stage, StageFailure, StageResult};

/// Result type used throughout the library
pub type Result<T> = anyhow::Result<T>;

/// Errors that abort a whole run
#[derive(thiserror::Error, Debug)]
pub enum TranscriptorError {
    #[error("Catalog fetch failed: {0}")]
    Fetch(String),

    #[error("Ledger {path} is corrupt: {reason}")]
    LedgerCorrupt { path: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),
}
