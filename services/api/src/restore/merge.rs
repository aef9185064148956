//! services/api/src/restore/merge.rs
//!
//! Combines per-page metadata from the dumps into one draft per
//! (book, page number). Sources are applied in order and a later source only
//! overrides the fields it actually carries.

use chrono::{DateTime, Utc};
use scriptorium_core::domain::PageStatus;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, warn};
use uuid::Uuid;

use super::extjson::{date_value, id_value, int_value, str_value};
use super::identity::IdentityMap;
use super::DumpEntry;

/// Prefix of dump paths holding per-book page metadata arrays.
pub const PAGES_PREFIX: &str = "data/pages/";

/// Compound key of a merged page.
pub type PageKey = (Uuid, i32);

/// Everything known about one page so far; `None` means "no source said".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageDraft {
    pub status: Option<PageStatus>,
    /// The claimant's id as it appeared in the dump.
    pub claimed_by: Option<String>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub thumbnail: Option<String>,
    pub content: Option<String>,
}

impl PageDraft {
    /// Field-by-field override: every field present in `newer` replaces ours.
    pub fn absorb(&mut self, newer: PageDraft) {
        if newer.status.is_some() {
            self.status = newer.status;
        }
        if newer.claimed_by.is_some() {
            self.claimed_by = newer.claimed_by;
        }
        if newer.claimed_at.is_some() {
            self.claimed_at = newer.claimed_at;
        }
        if newer.completed_at.is_some() {
            self.completed_at = newer.completed_at;
        }
        if newer.thumbnail.is_some() {
            self.thumbnail = newer.thumbnail;
        }
        if newer.content.is_some() {
            self.content = newer.content;
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPageMeta {
    #[serde(default)]
    number: Value,
    #[serde(default)]
    status: Value,
    #[serde(default)]
    claimed_by_id: Value,
    #[serde(default)]
    claimed_at: Value,
    #[serde(default)]
    completed_at: Value,
    #[serde(default)]
    thumbnail: Value,
}

impl RawPageMeta {
    fn into_draft(self) -> PageDraft {
        let status = self.status.as_str().and_then(|raw| {
            let parsed = PageStatus::parse(raw);
            if parsed.is_none() {
                warn!("Ignoring unknown page status '{}'", raw);
            }
            parsed
        });
        PageDraft {
            status,
            claimed_by: id_value(&self.claimed_by_id),
            claimed_at: date_value(&self.claimed_at),
            completed_at: date_value(&self.completed_at),
            thumbnail: str_value(&self.thumbnail),
            content: None,
        }
    }
}

/// Accumulates drafts for every page of every mapped book.
#[derive(Debug, Default)]
pub struct PageMerger {
    drafts: BTreeMap<PageKey, PageDraft>,
    dropped_entries: usize,
}

impl PageMerger {
    /// Applies one dump's page metadata entries on top of what is already merged.
    pub fn apply_metadata(&mut self, entries: &[DumpEntry], books: &IdentityMap) {
        for entry in entries.iter().filter(|e| e.path.starts_with(PAGES_PREFIX)) {
            let Some(pages) = entry.data.as_array() else {
                debug!("Skipping {}: no page array", entry.path);
                continue;
            };
            let book_name = book_name_from_path(&entry.path);
            let Some(book) = books.book(book_name) else {
                warn!("Skipping page metadata for unknown book '{}'", book_name);
                self.dropped_entries += 1;
                continue;
            };

            for raw in pages {
                let meta: RawPageMeta = match serde_json::from_value(raw.clone()) {
                    Ok(meta) => meta,
                    Err(e) => {
                        warn!("Skipping malformed page entry in {}: {}", entry.path, e);
                        continue;
                    }
                };
                let Some(number) = int_value(&meta.number) else {
                    warn!("Skipping page entry without a number in {}", entry.path);
                    continue;
                };
                let Ok(number) = i32::try_from(number) else {
                    warn!("Skipping out-of-range page number {} in {}", number, entry.path);
                    continue;
                };
                self.merge((book.id, number), meta.into_draft());
            }
        }
    }

    /// Merges `draft` into the page at `key`, creating it when absent.
    pub fn merge(&mut self, key: PageKey, draft: PageDraft) {
        self.drafts.entry(key).or_default().absorb(draft);
    }

    /// Attaches text to a page, creating an `available` placeholder when no
    /// metadata mentioned it.
    pub fn attach_content(&mut self, key: PageKey, thumbnail: String, content: String) {
        let draft = self.drafts.entry(key).or_insert_with(|| PageDraft {
            status: Some(PageStatus::Available),
            thumbnail: Some(thumbnail),
            ..Default::default()
        });
        draft.content = Some(content);
    }

    /// Metadata entries dropped because their book was not in the dump.
    pub fn dropped_entries(&self) -> usize {
        self.dropped_entries
    }

    pub fn into_drafts(self) -> BTreeMap<PageKey, PageDraft> {
        self.drafts
    }
}

/// `data/pages/<book name>.json` → `<book name>`.
fn book_name_from_path(path: &str) -> &str {
    let file = path.rsplit('/').next().unwrap_or(path);
    file.strip_suffix(".json").unwrap_or(file)
}
