//! crates/scriptorium_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases or tools.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::Stream;
use std::path::Path;
use std::pin::Pin;
use uuid::Uuid;

use crate::domain::{
    Book, BookSummary, ExportedPage, LibraryStats, Message, NewBook, NewPage, Page,
    PageAssignment, PageFilter, PageListing, PageText, Reply, User, UserCredentials, UserImport,
    UserUpdate,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, tools).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

/// A boxed stream of exported pages.
pub type PageStream<'a> = Pin<Box<dyn Stream<Item = PortResult<ExportedPage>> + Send + 'a>>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait LibraryStore: Send + Sync {
    // --- Users ---

    /// Inserts or updates the user owning `user.email` and returns the id that
    /// row ends up with (the existing id when the email was already present).
    async fn upsert_user_by_email(&self, user: &UserImport) -> PortResult<Uuid>;

    async fn create_user(&self, name: &str, email: &str, hashed_password: &str) -> PortResult<User>;

    async fn get_user(&self, user_id: Uuid) -> PortResult<User>;

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials>;

    async fn list_users(&self) -> PortResult<Vec<User>>;

    async fn update_user(&self, user_id: Uuid, update: &UserUpdate) -> PortResult<User>;

    async fn delete_user(&self, user_id: Uuid) -> PortResult<()>;

    async fn add_points(&self, user_id: Uuid, points: i32) -> PortResult<()>;

    // --- Auth Sessions ---

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()>;

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid>;

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()>;

    // --- Books ---

    /// Inserts or updates the book named `book.name` and returns the id the row
    /// ends up with. An existing book keeps its completed counter.
    async fn upsert_book_by_name(&self, book: &NewBook) -> PortResult<Uuid>;

    async fn create_book(&self, book: &NewBook) -> PortResult<Book>;

    /// Looks a book up by slug first, then by exact name.
    async fn find_book(&self, slug_or_name: &str) -> PortResult<Book>;

    async fn list_books(&self) -> PortResult<Vec<BookSummary>>;

    async fn set_completed_pages(&self, book_id: Uuid, completed: i32) -> PortResult<()>;

    /// Recounts a book's completed pages and stores the result.
    async fn refresh_completed_pages(&self, book_id: Uuid) -> PortResult<i32>;

    // --- Pages ---

    async fn insert_pages(&self, pages: &[NewPage]) -> PortResult<()>;

    /// Deletes every page and zeroes every book's completed counter.
    async fn clear_pages(&self) -> PortResult<()>;

    async fn get_page(&self, book_id: Uuid, page_number: i32) -> PortResult<Page>;

    async fn get_page_by_id(&self, page_id: Uuid) -> PortResult<Page>;

    async fn save_page_text(&self, page_id: Uuid, text: &PageText) -> PortResult<Page>;

    /// Moves an `available` page to `in-progress` for `user_id`.
    async fn claim_page(&self, page_id: Uuid, user_id: Uuid, at: DateTime<Utc>) -> PortResult<Page>;

    /// Moves `user_id`'s `in-progress` page to `completed`.
    async fn complete_page(&self, page_id: Uuid, user_id: Uuid, at: DateTime<Utc>)
        -> PortResult<Page>;

    async fn assign_page(&self, page_id: Uuid, assignment: &PageAssignment) -> PortResult<Page>;

    async fn list_pages(&self, filter: &PageFilter) -> PortResult<(Vec<PageListing>, i64)>;

    /// Streams every page carrying text, ordered by book then page number.
    fn pages_with_text(&self) -> PageStream<'_>;

    async fn stats(&self) -> PortResult<LibraryStats>;

    // --- Messages ---

    /// Replaces the whole message collection.
    async fn replace_messages(&self, messages: &[Message]) -> PortResult<()>;

    async fn create_message(&self, message: &Message) -> PortResult<()>;

    /// All messages when `user_id` is `None`; otherwise those the user sent or
    /// received plus broadcasts sent by admins.
    async fn list_messages(&self, user_id: Option<Uuid>) -> PortResult<Vec<Message>>;

    async fn add_reply(&self, message_id: Uuid, reply: &Reply) -> PortResult<()>;

    async fn mark_message_read(&self, message_id: Uuid) -> PortResult<()>;
}

#[async_trait]
pub trait PageRasterizer: Send + Sync {
    /// Renders every page of `pdf` into `out_dir` as `page.<n>.jpg` (1-based)
    /// and returns the number of pages written.
    async fn rasterize(&self, pdf: &Path, out_dir: &Path) -> PortResult<usize>;
}
