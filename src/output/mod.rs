use console::style;

use crate::batch::BatchSummary;
use crate::catalog::{CatalogItem, TranscriptStatus};
use crate::ledger::Ledger;
use crate::pipeline::ProcessedItem;
use crate::stages::StageResult;

/// Print the pass/fail line for one item
pub fn report_item(item: &CatalogItem, outcome: &StageResult<ProcessedItem>) {
    println!("{}", item_line(item, outcome));
}

fn item_line(item: &CatalogItem, outcome: &StageResult<ProcessedItem>) -> String {
    match outcome {
        Ok(processed) => format!(
            "{} {} {} -> {}",
            style("PASS").green().bold(),
            item.id,
            processed.title,
            processed.transcript_link
        ),
        Err(failure) => format!(
            "{} {} {} ({} stage): {}",
            style("FAIL").red().bold(),
            item.id,
            item.title,
            failure.stage,
            failure.reason.lines().next().unwrap_or_default()
        ),
    }
}

/// Print the final counts of a batch
pub fn print_summary(summary: &BatchSummary) {
    println!(
        "{} {} processed, {} skipped, {} failed",
        style("Done:").bold(),
        style(summary.processed).green(),
        style(summary.skipped).yellow(),
        style(summary.failed).red()
    );
}

/// Print every ledger row followed by the status counts
pub fn print_ledger(ledger: &Ledger) {
    for item in ledger.items() {
        println!(
            "{:<8} {:<14} {:<20} {}",
            status_label(item.status()),
            item.id,
            item.transcript_link(),
            item.title
        );
    }

    let counts: Vec<String> = ledger
        .status_counts()
        .into_iter()
        .map(|(status, count)| format!("{}: {}", status, count))
        .collect();
    println!("{} items ({})", ledger.len(), counts.join(", "));
}

fn status_label(status: TranscriptStatus) -> String {
    let label = status.as_str();
    match status {
        TranscriptStatus::Done => style(label).green().to_string(),
        TranscriptStatus::Failed => style(label).red().to_string(),
        TranscriptStatus::Skipped => style(label).yellow().to_string(),
        TranscriptStatus::Pending => label.to_string(),
    }
}
