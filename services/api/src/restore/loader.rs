//! services/api/src/restore/loader.rs
//!
//! Turns merged drafts into page rows, replaces the page table in bounded
//! batches and rewrites every book's completed-page counter.

use scriptorium_core::domain::{NewPage, PageStatus};
use scriptorium_core::ports::{LibraryStore, PortResult};
use scriptorium_core::slug::page_image_path;
use std::collections::{BTreeMap, HashMap};
use tracing::{info, warn};
use uuid::Uuid;

use super::identity::IdentityMap;
use super::merge::{PageDraft, PageKey};

/// Rows per insert batch.
pub const CHUNK_SIZE: usize = 500;

/// Page rows ready to be written, with the per-book completed counts.
#[derive(Debug, Default)]
pub struct PagePlan {
    pub pages: Vec<NewPage>,
    pub completed: HashMap<Uuid, i32>,
    pub fallback_claimants: usize,
}

/// Resolves claimants and defaults for every draft. Every mapped book gets a
/// completed count, zero when none of its pages survived.
pub fn plan_pages(drafts: BTreeMap<PageKey, PageDraft>, identities: &IdentityMap) -> PagePlan {
    let mut plan = PagePlan {
        completed: identities.books().map(|book| (book.id, 0)).collect(),
        ..Default::default()
    };
    let slugs: HashMap<Uuid, &str> = identities
        .books()
        .map(|book| (book.id, book.slug.as_str()))
        .collect();

    for ((book_id, page_number), draft) in drafts {
        let Some(slug) = slugs.get(&book_id) else {
            continue;
        };

        let claimed_by = match draft.claimed_by.as_deref() {
            Some(old_id) => match identities.user(old_id) {
                Some(user_id) => Some(user_id),
                None => {
                    plan.fallback_claimants += 1;
                    identities.fallback_user()
                }
            },
            None => None,
        };

        let status = draft.status.unwrap_or_default();
        if status == PageStatus::Completed {
            *plan.completed.entry(book_id).or_insert(0) += 1;
        }

        plan.pages.push(NewPage {
            book_id,
            page_number,
            content: draft.content.unwrap_or_default(),
            status,
            claimed_by,
            claimed_at: draft.claimed_at,
            completed_at: draft.completed_at,
            image_path: draft
                .thumbnail
                .unwrap_or_else(|| page_image_path(slug, page_number)),
        });
    }

    if plan.fallback_claimants > 0 {
        warn!(
            "{} pages referenced unknown claimants and were assigned to a fallback user",
            plan.fallback_claimants
        );
    }
    plan
}

/// Replaces every page with the planned rows and rewrites the book counters.
/// With nothing planned the existing pages are left alone and the counters of
/// the mapped books are recounted from them.
pub async fn load_pages(store: &dyn LibraryStore, plan: &PagePlan) -> PortResult<usize> {
    if plan.pages.is_empty() {
        warn!("No pages reconstructed; existing pages left untouched");
        for book_id in plan.completed.keys() {
            store.refresh_completed_pages(*book_id).await?;
        }
        return Ok(0);
    }

    info!("Inserting {} pages...", plan.pages.len());
    store.clear_pages().await?;
    for (index, chunk) in plan.pages.chunks(CHUNK_SIZE).enumerate() {
        store.insert_pages(chunk).await?;
        info!("Inserted batch {} ({} pages)", index + 1, chunk.len());
    }

    info!("Updating book statistics...");
    for (book_id, completed) in &plan.completed {
        store.set_completed_pages(*book_id, *completed).await?;
    }
    Ok(plan.pages.len())
}
