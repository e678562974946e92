//! Durable record of the catalog and each item's transcript status
//!
//! The ledger is a CSV file with one row per catalog item. It is loaded at
//! the start of a batch, merged with a fresh catalog fetch, updated as items
//! finish, and always rewritten wholesale through a temporary file that is
//! renamed over the old one, so a crash never leaves a half-written ledger.

use anyhow::Context;
use chrono::{DateTime, SecondsFormat, Utc};
use csv::StringRecord;
use std::collections::HashSet;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

use crate::catalog::{CatalogItem, TranscriptStatus};
use crate::{Result, TranscriptorError};

/// Column layout written by [`Ledger::save`]
pub const HEADER: [&str; 6] = [
    "id",
    "title",
    "description",
    "published_at",
    "status",
    "transcript_link",
];

/// Older layout without an explicit status column
const LEGACY_HEADER: [&str; 5] = ["id", "title", "description", "published_at", "transcript_link"];

#[derive(Debug, Clone, Copy, PartialEq)]
enum Layout {
    Current,
    Legacy,
}

/// Counts reported by [`Ledger::merge_refresh`]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MergeStats {
    pub added: usize,
    pub refreshed: usize,
}

/// Ordered, id-unique sequence of catalog items
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Ledger {
    items: Vec<CatalogItem>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a ledger from items, folding repeated ids into one row
    pub fn from_items(items: Vec<CatalogItem>) -> Self {
        let mut ledger = Self::new();
        ledger.merge_refresh(items);
        ledger
    }

    pub fn items(&self) -> &[CatalogItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&CatalogItem> {
        self.items.iter().find(|item| item.id == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut CatalogItem> {
        self.items.iter_mut().find(|item| item.id == id)
    }

    /// Item at `index` in ledger order
    pub fn item_mut(&mut self, index: usize) -> Option<&mut CatalogItem> {
        self.items.get_mut(index)
    }

    /// Number of items in each status
    pub fn status_counts(&self) -> Vec<(TranscriptStatus, usize)> {
        [
            TranscriptStatus::Pending,
            TranscriptStatus::Skipped,
            TranscriptStatus::Failed,
            TranscriptStatus::Done,
        ]
        .into_iter()
        .map(|status| {
            let count = self.items.iter().filter(|item| item.status() == status).count();
            (status, count)
        })
        .collect()
    }

    /// Load the ledger at `path`; a missing file is an empty ledger
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::info!("No ledger at {}, starting empty", path.display());
            return Ok(Self::new());
        }

        let file = fs_err::File::open(path)?;
        Self::from_reader(file).map_err(|reason| {
            TranscriptorError::LedgerCorrupt {
                path: path.display().to_string(),
                reason,
            }
            .into()
        })
    }

    fn from_reader<R: std::io::Read>(reader: R) -> std::result::Result<Self, String> {
        let mut csv_reader = csv::ReaderBuilder::new().has_headers(true).from_reader(reader);

        let headers = csv_reader
            .headers()
            .map_err(|e| format!("unreadable header: {}", e))?
            .clone();
        let layout = if headers.iter().eq(HEADER.iter().copied()) {
            Layout::Current
        } else if headers.iter().eq(LEGACY_HEADER.iter().copied()) {
            Layout::Legacy
        } else {
            return Err(format!(
                "unexpected header '{}', expected '{}'",
                headers.iter().collect::<Vec<_>>().join(","),
                HEADER.join(",")
            ));
        };

        let mut items = Vec::new();
        let mut seen = HashSet::new();

        for (index, record) in csv_reader.records().enumerate() {
            // Header is line 1
            let line = index + 2;
            let record = record.map_err(|e| format!("line {}: {}", line, e))?;
            let item = parse_record(&record, layout).map_err(|e| format!("line {}: {}", line, e))?;

            if !seen.insert(item.id.clone()) {
                return Err(format!("line {}: duplicate id '{}'", line, item.id));
            }
            items.push(item);
        }

        Ok(Self { items })
    }

    /// Reconcile a fresh catalog fetch with the recorded progress
    ///
    /// Unknown ids are appended in fetch order. Known ids keep their status
    /// and link and only take over the descriptive fields.
    pub fn merge_refresh(&mut self, fetched: Vec<CatalogItem>) -> MergeStats {
        let mut stats = MergeStats::default();

        for item in fetched {
            match self.get_mut(&item.id) {
                Some(existing) => {
                    if existing.title != item.title
                        || existing.description != item.description
                        || existing.published_at != item.published_at
                    {
                        existing.refresh_from(&item);
                        stats.refreshed += 1;
                    }
                }
                None => {
                    self.items.push(item);
                    stats.added += 1;
                }
            }
        }

        stats
    }

    /// Atomically replace the ledger at `path`
    pub fn save(&self, path: &Path) -> Result<()> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => std::env::current_dir()?,
        };
        fs_err::create_dir_all(&dir)?;

        let mut temp = NamedTempFile::new_in(&dir)
            .with_context(|| format!("Failed to create temporary ledger in {}", dir.display()))?;

        self.write_to(temp.as_file_mut())
            .with_context(|| format!("Failed to write ledger {}", path.display()))?;
        temp.as_file_mut().sync_all()?;

        temp.persist(path)
            .with_context(|| format!("Failed to replace ledger {}", path.display()))?;

        tracing::debug!("Saved {} ledger rows to {}", self.items.len(), path.display());
        Ok(())
    }

    fn write_to<W: Write>(&self, writer: W) -> Result<()> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        csv_writer.write_record(HEADER)?;

        for item in &self.items {
            let published_at = item.published_at.to_rfc3339_opts(SecondsFormat::Secs, true);
            csv_writer.write_record([
                item.id.as_str(),
                item.title.as_str(),
                item.description.as_str(),
                published_at.as_str(),
                item.status().as_str(),
                item.transcript_link(),
            ])?;
        }

        csv_writer.flush()?;
        Ok(())
    }
}

fn parse_record(record: &StringRecord, layout: Layout) -> std::result::Result<CatalogItem, String> {
    let field = |index: usize| record.get(index).unwrap_or_default().to_string();

    let id = field(0);
    if id.trim().is_empty() {
        return Err("empty id".to_string());
    }

    let published_at = DateTime::parse_from_rfc3339(&field(3))
        .map_err(|e| format!("invalid published_at '{}': {}", field(3), e))?
        .with_timezone(&Utc);

    let (status, link) = match layout {
        Layout::Current => (field(4).parse::<TranscriptStatus>()?, field(5)),
        Layout::Legacy => {
            let link = field(4);
            let status = if link.is_empty() {
                TranscriptStatus::Pending
            } else {
                TranscriptStatus::Done
            };
            (status, link)
        }
    };

    CatalogItem::restore(id, field(1), field(2), published_at, status, link)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 1, day, 9, 30, 0).unwrap()
    }

    fn item(id: &str, title: &str) -> CatalogItem {
        CatalogItem::new(id, title, format!("About {}", title), at(1))
    }

    fn corrupt_reason(err: anyhow::Error) -> String {
        match err.downcast_ref::<TranscriptorError>() {
            Some(TranscriptorError::LedgerCorrupt { reason, .. }) => reason.clone(),
            other => panic!("expected LedgerCorrupt, got {:?}", other),
        }
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("videos.csv");

        let mut done = item("abc123", "Intro, part \"one\"");
        done.description = "line one\nline two".into();
        done.mark_done("abc123.html");
        let mut failed = item("def456", "Strategy");
        failed.mark_failed();
        let ledger = Ledger::from_items(vec![done, failed, item("ghi789", "Pending")]);

        ledger.save(&path).unwrap();
        let loaded = Ledger::load(&path).unwrap();

        assert_eq!(loaded, ledger);
        assert_eq!(loaded.get("abc123").unwrap().transcript_link(), "abc123.html");
        assert_eq!(loaded.get("def456").unwrap().status(), TranscriptStatus::Failed);
    }

    #[test]
    fn test_header_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("videos.csv");
        Ledger::new().save(&path).unwrap();

        let content = fs_err::read_to_string(&path).unwrap();
        assert_eq!(content.trim(), "id,title,description,published_at,status,transcript_link");
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Ledger::load(&dir.path().join("absent.csv")).unwrap();
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_save_replaces_without_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("videos.csv");

        Ledger::from_items(vec![item("a", "A"), item("b", "B")]).save(&path).unwrap();
        Ledger::from_items(vec![item("c", "C")]).save(&path).unwrap();

        let loaded = Ledger::load(&path).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.items()[0].id, "c");

        let entries = fs_err::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn test_wrong_header_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("videos.csv");
        fs_err::write(&path, "Title,URL,Body Text\nx,y,z\n").unwrap();

        let reason = corrupt_reason(Ledger::load(&path).unwrap_err());
        assert!(reason.contains("unexpected header"));
    }

    #[test]
    fn test_short_row_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("videos.csv");
        fs_err::write(
            &path,
            "id,title,description,published_at,status,transcript_link\nabc123,Intro\n",
        )
        .unwrap();

        let reason = corrupt_reason(Ledger::load(&path).unwrap_err());
        assert!(reason.starts_with("line 2"));
    }

    #[test]
    fn test_bad_rows_are_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("videos.csv");
        let header = "id,title,description,published_at,status,transcript_link\n";

        let cases = [
            ("abc,T,D,yesterday,Pending,\n", "invalid published_at"),
            ("abc,T,D,2023-01-01T00:00:00Z,Finished,\n", "unknown transcript status"),
            ("abc,T,D,2023-01-01T00:00:00Z,Done,\n", "no transcript link"),
            (",T,D,2023-01-01T00:00:00Z,Pending,\n", "empty id"),
            (
                "abc,T,D,2023-01-01T00:00:00Z,Pending,\nabc,T,D,2023-01-01T00:00:00Z,Pending,\n",
                "duplicate id",
            ),
        ];

        for (rows, expected) in cases {
            fs_err::write(&path, format!("{}{}", header, rows)).unwrap();
            let reason = corrupt_reason(Ledger::load(&path).unwrap_err());
            assert!(reason.contains(expected), "{} not in {}", expected, reason);
        }
    }

    #[test]
    fn test_legacy_header_derives_status() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("videos.csv");
        fs_err::write(
            &path,
            "id,title,description,published_at,transcript_link\n\
             abc123,Intro,,2023-01-01T00:00:00Z,abc123.html\n\
             def456,Next,,2023-01-02T00:00:00Z,\n",
        )
        .unwrap();

        let ledger = Ledger::load(&path).unwrap();
        assert_eq!(ledger.get("abc123").unwrap().status(), TranscriptStatus::Done);
        assert_eq!(ledger.get("def456").unwrap().status(), TranscriptStatus::Pending);
    }

    #[test]
    fn test_merge_preserves_progress() {
        let mut done = item("abc123", "Intro");
        done.mark_done("abc123.html");
        let mut ledger = Ledger::from_items(vec![done]);

        let mut renamed = item("abc123", "Intro (updated)");
        renamed.published_at = at(2);
        let stats = ledger.merge_refresh(vec![renamed, item("def456", "Next")]);

        assert_eq!(stats, MergeStats { added: 1, refreshed: 1 });
        let existing = ledger.get("abc123").unwrap();
        assert_eq!(existing.title, "Intro (updated)");
        assert_eq!(existing.published_at, at(2));
        assert_eq!(existing.status(), TranscriptStatus::Done);
        assert_eq!(existing.transcript_link(), "abc123.html");
        assert_eq!(ledger.items()[1].id, "def456");
    }

    #[test]
    fn test_merge_is_idempotent() {
        let mut done = item("abc123", "Intro");
        done.mark_done("abc123.html");
        let fetched = vec![item("abc123", "Intro"), item("def456", "Next"), item("def456", "Next")];

        let mut once = Ledger::from_items(vec![done]);
        once.merge_refresh(fetched.clone());
        let mut twice = once.clone();
        let stats = twice.merge_refresh(fetched);

        assert_eq!(once, twice);
        assert_eq!(stats, MergeStats::default());
        assert_eq!(twice.len(), 2);
    }

    #[test]
    fn test_status_counts() {
        let mut failed = item("b", "B");
        failed.mark_failed();
        let ledger = Ledger::from_items(vec![item("a", "A"), failed]);

        let counts = ledger.status_counts();
        assert!(counts.contains(&(TranscriptStatus::Pending, 1)));
        assert!(counts.contains(&(TranscriptStatus::Failed, 1)));
        assert!(counts.contains(&(TranscriptStatus::Done, 0)));
    }
}
