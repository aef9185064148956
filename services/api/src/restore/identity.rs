//! services/api/src/restore/identity.rs
//!
//! Allocates fresh surrogate ids for dumped users and books, upserts them by
//! their natural keys (email, name) and records the old → new mapping used to
//! re-link every foreign reference later in the run.

use chrono::Utc;
use scriptorium_core::domain::{NewBook, Role, UserImport, DEFAULT_CATEGORY};
use scriptorium_core::ports::{LibraryStore, PortResult};
use scriptorium_core::slug::{book_folder_path, slugify};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, warn};
use uuid::Uuid;

use super::extjson::{date_value, id_value, int_value, saturating_i32};

/// Where a dumped book landed: its id and the slug its images live under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookRef {
    pub id: Uuid,
    pub slug: String,
}

/// Old-id → new-id tables built while importing users and books.
#[derive(Debug, Default)]
pub struct IdentityMap {
    users: HashMap<String, Uuid>,
    fallback_user: Option<Uuid>,
    books: HashMap<String, BookRef>,
}

impl IdentityMap {
    pub fn map_user(&mut self, old_id: impl Into<String>, new_id: Uuid) {
        self.fallback_user.get_or_insert(new_id);
        self.users.insert(old_id.into(), new_id);
    }

    pub fn map_book(&mut self, name: impl Into<String>, book: BookRef) {
        self.books.insert(name.into(), book);
    }

    pub fn user(&self, old_id: &str) -> Option<Uuid> {
        self.users.get(old_id).copied()
    }

    /// The first user mapped in this run, substituted for unresolvable claimants.
    pub fn fallback_user(&self) -> Option<Uuid> {
        self.fallback_user
    }

    pub fn book(&self, name: &str) -> Option<&BookRef> {
        self.books.get(name)
    }

    pub fn books(&self) -> impl Iterator<Item = &BookRef> {
        self.books.values()
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn book_count(&self) -> usize {
        self.books.len()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawUser {
    #[serde(default, alias = "_id")]
    id: Value,
    name: Option<String>,
    email: Option<String>,
    password: Option<String>,
    role: Option<String>,
    #[serde(default)]
    points: Value,
    #[serde(default)]
    created_at: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBook {
    name: Option<String>,
    #[serde(default)]
    total_pages: Value,
    category: Option<String>,
    #[serde(default)]
    created_at: Value,
}

/// Upserts every dumped user by email and maps its old id to the id the row
/// ended up with. Returns the number of users written.
pub async fn import_users(
    store: &dyn LibraryStore,
    records: &[Value],
    map: &mut IdentityMap,
) -> PortResult<usize> {
    let mut written = 0;
    for record in records {
        let raw: RawUser = match serde_json::from_value(record.clone()) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Skipping malformed user record: {}", e);
                continue;
            }
        };
        let Some(email) = raw.email.filter(|e| !e.trim().is_empty()) else {
            warn!("Skipping user record without an email");
            continue;
        };

        let import = UserImport {
            id: Uuid::new_v4(),
            name: raw.name.unwrap_or_else(|| email.clone()),
            email,
            password: raw.password.unwrap_or_default(),
            role: raw.role.as_deref().map(Role::parse).unwrap_or_default(),
            points: int_value(&raw.points).map(saturating_i32).unwrap_or(0),
            created_at: date_value(&raw.created_at).unwrap_or_else(Utc::now),
        };
        let user_id = store.upsert_user_by_email(&import).await?;
        match id_value(&raw.id) {
            Some(old_id) => map.map_user(old_id, user_id),
            None => debug!("User {} has no external id; nothing can reference it", import.email),
        }
        written += 1;
    }
    Ok(written)
}

/// Upserts every dumped book by name and maps the name to its id and slug.
/// Returns the number of books written.
pub async fn import_books(
    store: &dyn LibraryStore,
    records: &[Value],
    map: &mut IdentityMap,
) -> PortResult<usize> {
    let mut written = 0;
    for record in records {
        let raw: RawBook = match serde_json::from_value(record.clone()) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Skipping malformed book record: {}", e);
                continue;
            }
        };
        let Some(name) = raw.name.filter(|n| !n.trim().is_empty()) else {
            warn!("Skipping book record without a name");
            continue;
        };

        let slug = slugify(&name);
        let book = NewBook {
            id: Uuid::new_v4(),
            folder_path: book_folder_path(&slug),
            slug: slug.clone(),
            total_pages: int_value(&raw.total_pages).map(saturating_i32).unwrap_or(0),
            category: raw.category.unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
            created_at: date_value(&raw.created_at).unwrap_or_else(Utc::now),
            name,
        };
        let book_id = store.upsert_book_by_name(&book).await?;
        map.map_book(book.name, BookRef { id: book_id, slug });
        written += 1;
    }
    Ok(written)
}
