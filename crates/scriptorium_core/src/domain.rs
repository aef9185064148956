//! crates/scriptorium_core/src/domain.rs
//!
//! Defines the pure, core data structures for the digitization library.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Subject used when a message arrives without one.
pub const DEFAULT_SUBJECT: &str = "ללא נושא";

/// Category assigned to books that do not carry one.
pub const DEFAULT_CATEGORY: &str = "כללי";

//=========================================================================================
// Users
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }

    /// Anything other than `admin` is treated as a regular user.
    pub fn parse(raw: &str) -> Self {
        if raw.eq_ignore_ascii_case("admin") {
            Role::Admin
        } else {
            Role::User
        }
    }
}

// Represents a user - used throughout app
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub points: i32,
    pub created_at: DateTime<Utc>,
}

// Only used internally for login/signup - contains sensitive data
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user_id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub hashed_password: String,
}

/// A user row as written by the restore tool, keyed by email.
#[derive(Debug, Clone)]
pub struct UserImport {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Role,
    pub points: i32,
    pub created_at: DateTime<Utc>,
}

/// Admin-side edits of a user; `None` leaves the field unchanged.
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub role: Option<Role>,
    pub points: Option<i32>,
}

//=========================================================================================
// Books
//=========================================================================================

#[derive(Debug, Clone)]
pub struct Book {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub total_pages: i32,
    /// Cached aggregate, recomputed rather than maintained transactionally.
    pub completed_pages: i32,
    pub category: String,
    pub folder_path: String,
    pub created_at: DateTime<Utc>,
}

/// A book row to create or upsert by name.
#[derive(Debug, Clone)]
pub struct NewBook {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub total_pages: i32,
    pub category: String,
    pub folder_path: String,
    pub created_at: DateTime<Utc>,
}

/// A book with its completed count computed live from the pages table.
#[derive(Debug, Clone)]
pub struct BookSummary {
    pub book: Book,
    pub completed_pages: i64,
}

//=========================================================================================
// Pages
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PageStatus {
    #[default]
    Available,
    InProgress,
    Completed,
}

impl PageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PageStatus::Available => "available",
            PageStatus::InProgress => "in-progress",
            PageStatus::Completed => "completed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "available" => Some(PageStatus::Available),
            "in-progress" => Some(PageStatus::InProgress),
            "completed" => Some(PageStatus::Completed),
            _ => None,
        }
    }
}

/// The editable text of a page: either one free-text body or two columns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageText {
    pub content: String,
    pub is_two_columns: bool,
    pub right_column: String,
    pub left_column: String,
    pub right_column_name: Option<String>,
    pub left_column_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Page {
    pub id: Uuid,
    pub book_id: Uuid,
    pub page_number: i32,
    pub text: PageText,
    pub status: PageStatus,
    pub claimed_by: Option<Uuid>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub image_path: String,
}

/// A page row to insert, produced by uploads and by the restore loader.
#[derive(Debug, Clone)]
pub struct NewPage {
    pub book_id: Uuid,
    pub page_number: i32,
    pub content: String,
    pub status: PageStatus,
    pub claimed_by: Option<Uuid>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub image_path: String,
}

impl NewPage {
    /// An unclaimed placeholder page, as created right after an upload.
    pub fn placeholder(book_id: Uuid, page_number: i32, image_path: String) -> Self {
        Self {
            book_id,
            page_number,
            content: String::new(),
            status: PageStatus::Available,
            claimed_by: None,
            claimed_at: None,
            completed_at: None,
            image_path,
        }
    }
}

/// Admin-side status change of a page. `claimed_by: Some(None)` clears the claimant.
#[derive(Debug, Clone, Default)]
pub struct PageAssignment {
    pub status: Option<PageStatus>,
    pub claimed_by: Option<Option<Uuid>>,
}

/// Filters for the admin page listing.
#[derive(Debug, Clone)]
pub struct PageFilter {
    pub status: Option<PageStatus>,
    pub book_id: Option<Uuid>,
    pub claimed_by: Option<Uuid>,
    pub offset: i64,
    pub limit: i64,
}

/// One row of the admin page listing, joined with book and claimant names.
#[derive(Debug, Clone)]
pub struct PageListing {
    pub id: Uuid,
    pub book_name: String,
    pub page_number: i32,
    pub status: PageStatus,
    pub claimed_by_name: Option<String>,
    pub claimed_by_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// A page with text, joined with its book name, as read by the content exporter.
#[derive(Debug, Clone)]
pub struct ExportedPage {
    pub book_name: String,
    pub page_number: i32,
    pub text: PageText,
}

//=========================================================================================
// Messages
//=========================================================================================

#[derive(Debug, Clone)]
pub struct Reply {
    pub sender_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Message {
    pub id: Uuid,
    pub sender_id: Uuid,
    /// `None` marks a broadcast.
    pub recipient_id: Option<Uuid>,
    pub subject: String,
    pub content: String,
    pub is_read: bool,
    pub replies: Vec<Reply>,
    pub created_at: DateTime<Utc>,
}

//=========================================================================================
// Statistics
//=========================================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LibraryStats {
    pub total_users: i64,
    pub admin_users: i64,
    pub total_books: i64,
    pub total_pages: i64,
    pub completed_pages: i64,
    pub in_progress_pages: i64,
    pub available_pages: i64,
}

impl LibraryStats {
    /// Integer percentage of completed pages, 0 for an empty library.
    pub fn completion_rate(&self) -> i64 {
        if self.total_pages == 0 {
            0
        } else {
            self.completed_pages * 100 / self.total_pages
        }
    }
}
