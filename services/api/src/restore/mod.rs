//! services/api/src/restore/mod.rs
//!
//! Rebuilds users, books, pages and messages from three raw dumps:
//! a generic file export (`files.json`), a page backup export
//! (`backups.json`) and a message export (`messages.json`).
//!
//! The run is sequential and best effort. Missing or malformed dumps and
//! unresolvable references are tolerated; a storage failure aborts the run
//! with whatever was already written left in place.

pub mod content;
pub mod extjson;
pub mod identity;
pub mod loader;
pub mod merge;
pub mod messages;
pub mod reader;

use scriptorium_core::ports::{LibraryStore, PortError};
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use tracing::{info, warn};

use identity::IdentityMap;
use merge::PageMerger;

pub const FILES_DUMP: &str = "files.json";
pub const BACKUPS_DUMP: &str = "backups.json";
pub const MESSAGES_DUMP: &str = "messages.json";

const USERS_PATH: &str = "data/users.json";
const BOOKS_PATH: &str = "data/books.json";

#[derive(Debug, thiserror::Error)]
pub enum RestoreError {
    #[error("storage failure: {0}")]
    Storage(#[from] PortError),
}

/// One record of a file-export dump: a virtual file path and its parsed payload.
#[derive(Debug, Clone, Deserialize)]
pub struct DumpEntry {
    pub path: String,
    #[serde(default)]
    pub data: Value,
}

/// The raw records of all three dumps.
#[derive(Debug, Default)]
pub struct RestoreSources {
    pub files: Vec<Value>,
    pub backups: Vec<Value>,
    pub messages: Vec<Value>,
}

impl RestoreSources {
    /// Reads the three dumps from `dir`; absent or broken files come back empty.
    pub async fn load(dir: &Path) -> Self {
        info!("Reading raw files from {}...", dir.display());
        Self {
            files: reader::read_records(&dir.join(FILES_DUMP)).await,
            backups: reader::read_records(&dir.join(BACKUPS_DUMP)).await,
            messages: reader::read_records(&dir.join(MESSAGES_DUMP)).await,
        }
    }
}

/// What a restore run wrote and what it had to leave behind.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RestoreReport {
    pub users: usize,
    pub books: usize,
    pub pages: usize,
    pub completed_pages: usize,
    pub messages: usize,
    pub dropped_page_entries: usize,
    pub dropped_contents: usize,
    pub fallback_claimants: usize,
    pub dropped_messages: usize,
    pub dropped_replies: usize,
    pub unlinked_recipients: usize,
}

/// Runs the whole restore against `store`.
pub async fn run_restore(
    store: &dyn LibraryStore,
    sources: &RestoreSources,
) -> Result<RestoreReport, RestoreError> {
    let mut report = RestoreReport::default();
    let mut identities = IdentityMap::default();

    let files = dump_entries(&sources.files);
    let backups = dump_entries(&sources.backups);

    // --- 1. Users ---
    if let Some(users) = entry_array(&files, USERS_PATH) {
        info!("Processing {} users...", users.len());
        report.users = identity::import_users(store, users, &mut identities).await?;
        info!("Users imported.");
    }

    // --- 2. Books ---
    if let Some(books) = entry_array(&files, BOOKS_PATH) {
        info!("Processing {} books...", books.len());
        report.books = identity::import_books(store, books, &mut identities).await?;
        info!("Books imported.");
    }

    // --- 3. Pages: metadata from both dumps, then text ---
    info!("Merging page metadata and content...");
    let mut merger = PageMerger::default();
    merger.apply_metadata(&files, &identities);
    merger.apply_metadata(&backups, &identities);
    report.dropped_page_entries = merger.dropped_entries();
    report.dropped_contents = content::attach_contents(&files, &identities, &mut merger);

    let plan = loader::plan_pages(merger.into_drafts(), &identities);
    report.fallback_claimants = plan.fallback_claimants;
    report.completed_pages = plan.completed.values().map(|&c| c as usize).sum();
    report.pages = loader::load_pages(store, &plan).await?;
    if report.pages > 0 {
        info!("Pages imported.");
    }

    // --- 4. Messages ---
    if !sources.messages.is_empty() {
        info!("Importing {} messages...", sources.messages.len());
        let plan = messages::plan_messages(&sources.messages, &identities);
        report.dropped_messages = plan.dropped_messages;
        report.dropped_replies = plan.dropped_replies;
        report.unlinked_recipients = plan.unlinked_recipients;
        if plan.messages.is_empty() {
            warn!("No message could be re-linked; existing messages left untouched");
        } else {
            store.replace_messages(&plan.messages).await?;
            report.messages = plan.messages.len();
        }
        info!("Messages imported.");
    }

    Ok(report)
}

fn dump_entries(records: &[Value]) -> Vec<DumpEntry> {
    records
        .iter()
        .filter_map(|record| match serde_json::from_value::<DumpEntry>(record.clone()) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Skipping dump record without a path: {}", e);
                None
            }
        })
        .collect()
}

fn entry_array<'a>(entries: &'a [DumpEntry], path: &str) -> Option<&'a [Value]> {
    entries
        .iter()
        .find(|entry| entry.path == path)
        .and_then(|entry| entry.data.as_array())
        .map(Vec::as_slice)
}
