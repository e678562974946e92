//! Batch orchestration over the ledger
//!
//! A run goes `FetchCatalog -> LoadLedger -> MergeRefresh -> for each item
//! {Select -> Skip | RunPipeline -> RecordResult} -> PersistLedger`. Only the
//! catalog fetch and the ledger load can abort a run; stage failures are
//! recorded on the item and the batch moves on.

use std::path::{Path, PathBuf};
use std::time::Instant;

pub mod prompt;

pub use prompt::{IncludeAll, LinePrompt};

use crate::catalog::{CatalogItem, CatalogSource};
use crate::config::PersistMode;
use crate::ledger::{Ledger, MergeStats};
use crate::output;
use crate::pipeline::{ItemPipeline, ProcessedItem};
use crate::stages::StageResult;
use crate::{Result, TranscriptorError};

/// Operator's answer for one offered item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Include,
    Exclude,
    /// Include this item and every later one without asking again
    IncludeAll,
}

/// Decides which offered items are processed
pub trait SelectionPolicy {
    fn decide(&mut self, item: &CatalogItem) -> Result<Decision>;
}

/// Per-run counts shown at the end of a batch
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Drives a full pass over the ledger
pub struct BatchRunner<'a> {
    pipeline: &'a ItemPipeline,
    policy: Box<dyn SelectionPolicy + 'a>,
    ledger_path: PathBuf,
    persist: PersistMode,
    redo: bool,
}

impl<'a> BatchRunner<'a> {
    pub fn new(
        pipeline: &'a ItemPipeline,
        policy: Box<dyn SelectionPolicy + 'a>,
        ledger_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            pipeline,
            policy,
            ledger_path: ledger_path.into(),
            persist: PersistMode::EachItem,
            redo: false,
        }
    }

    pub fn with_persist(mut self, persist: PersistMode) -> Self {
        self.persist = persist;
        self
    }

    /// Also offer items that already have a transcript
    pub fn with_redo(mut self, redo: bool) -> Self {
        self.redo = redo;
        self
    }

    /// Full pass: refresh the ledger from `source`, then process it
    pub async fn run(&mut self, source: &dyn CatalogSource) -> Result<(Ledger, BatchSummary)> {
        let (mut ledger, stats) = refresh_ledger(source, &self.ledger_path).await?;
        tracing::info!(
            "Ledger has {} items ({} new, {} refreshed)",
            ledger.len(),
            stats.added,
            stats.refreshed
        );

        let summary = self.process(&mut ledger).await?;
        Ok((ledger, summary))
    }

    /// Pass over the stored ledger without contacting the catalog
    pub async fn run_offline(&mut self) -> Result<(Ledger, BatchSummary)> {
        let mut ledger = Ledger::load(&self.ledger_path)?;
        let summary = self.process(&mut ledger).await?;
        Ok((ledger, summary))
    }

    /// Offer every eligible item, run the selected ones and record outcomes
    pub async fn process(&mut self, ledger: &mut Ledger) -> Result<BatchSummary> {
        let started = Instant::now();
        let mut summary = BatchSummary::default();
        let mut include_all = false;

        for index in 0..ledger.len() {
            let item = match ledger.item_mut(index) {
                Some(item) => item,
                None => break,
            };
            if item.is_done() && !self.redo {
                continue;
            }

            let include = if include_all {
                true
            } else {
                match self.policy.decide(item)? {
                    Decision::Include => true,
                    Decision::Exclude => false,
                    Decision::IncludeAll => {
                        include_all = true;
                        true
                    }
                }
            };

            if !include {
                item.mark_skipped();
                summary.skipped += 1;
                tracing::debug!("Skipped {}", item.id);
                self.persist_item(ledger)?;
                continue;
            }

            tracing::info!("Processing {} ({})", item.id, item.title);
            let outcome = self.pipeline.process(item).await;
            output::report_item(item, &outcome);
            record_outcome(item, &outcome, &mut summary);
            self.persist_item(ledger)?;
        }

        if self.persist == PersistMode::EndOfBatch {
            ledger.save(&self.ledger_path)?;
        }

        tracing::info!(
            "Batch finished in {:.1?}: {} processed, {} skipped, {} failed",
            started.elapsed(),
            summary.processed,
            summary.skipped,
            summary.failed
        );
        Ok(summary)
    }

    fn persist_item(&self, ledger: &Ledger) -> Result<()> {
        if self.persist == PersistMode::EachItem {
            ledger.save(&self.ledger_path)?;
        }
        Ok(())
    }
}

/// FetchCatalog, LoadLedger, MergeRefresh and PersistLedger
pub async fn refresh_ledger(source: &dyn CatalogSource, ledger_path: &Path) -> Result<(Ledger, MergeStats)> {
    let fetched = source.fetch_catalog().await.map_err(|e| {
        match e.downcast::<TranscriptorError>() {
            Ok(fatal) => anyhow::Error::new(fatal),
            Err(other) => TranscriptorError::Fetch(format!("{:#}", other)).into(),
        }
    })?;
    tracing::info!("Fetched {} catalog items", fetched.len());

    let mut ledger = Ledger::load(ledger_path)?;
    let stats = ledger.merge_refresh(fetched);
    ledger.save(ledger_path)?;

    Ok((ledger, stats))
}

/// Apply a pipeline outcome to the item it was run for
pub fn record_outcome(item: &mut CatalogItem, outcome: &StageResult<ProcessedItem>, summary: &mut BatchSummary) {
    match outcome {
        Ok(processed) => {
            item.mark_done(processed.transcript_link.clone());
            summary.processed += 1;
        }
        Err(failure) => {
            tracing::warn!("{} failed at {}: {}", item.id, failure.stage, failure.reason);
            item.mark_failed();
            summary.failed += 1;
        }
    }
}
