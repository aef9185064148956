//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `LibraryStore` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use scriptorium_core::domain::{
    Book, BookSummary, ExportedPage, LibraryStats, Message, NewBook, NewPage, Page,
    PageAssignment, PageFilter, PageListing, PageStatus, PageText, Reply, Role, User,
    UserCredentials, UserImport, UserUpdate,
};
use scriptorium_core::ports::{LibraryStore, PageStream, PortError, PortResult};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgConnection, PgPool, Postgres, QueryBuilder};
use std::collections::HashMap;
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `LibraryStore` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a connection pool to `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

/// Maps constraint violations on writes to the matching port errors.
fn write_error(what: &str) -> impl FnOnce(sqlx::Error) -> PortError + '_ {
    move |e| match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            PortError::Conflict(format!("{} already exists", what))
        }
        sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
            PortError::NotFound(format!("{} references a missing row", what))
        }
        _ => unexpected(e),
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

const USER_COLUMNS: &str = "id, name, email, role, points, created_at";

#[derive(FromRow)]
struct UserRecord {
    id: Uuid,
    name: String,
    email: String,
    role: String,
    points: i32,
    created_at: DateTime<Utc>,
}
impl UserRecord {
    fn to_domain(self) -> User {
        User {
            id: self.id,
            name: self.name,
            email: self.email,
            role: Role::parse(&self.role),
            points: self.points,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct CredentialsRecord {
    id: Uuid,
    name: String,
    email: String,
    role: String,
    password: String,
}
impl CredentialsRecord {
    fn to_domain(self) -> UserCredentials {
        UserCredentials {
            user_id: self.id,
            name: self.name,
            email: self.email,
            role: Role::parse(&self.role),
            hashed_password: self.password,
        }
    }
}

const BOOK_COLUMNS: &str =
    "id, name, slug, total_pages, completed_pages, category, folder_path, created_at";

#[derive(FromRow)]
struct BookRecord {
    id: Uuid,
    name: String,
    slug: String,
    total_pages: i32,
    completed_pages: i32,
    category: String,
    folder_path: String,
    created_at: DateTime<Utc>,
}
impl BookRecord {
    fn to_domain(self) -> Book {
        Book {
            id: self.id,
            name: self.name,
            slug: self.slug,
            total_pages: self.total_pages,
            completed_pages: self.completed_pages,
            category: self.category,
            folder_path: self.folder_path,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct BookSummaryRecord {
    #[sqlx(flatten)]
    book: BookRecord,
    live_completed: i64,
}

const PAGE_COLUMNS: &str = "id, book_id, page_number, content, is_two_columns, right_column, \
     left_column, right_column_name, left_column_name, status, claimed_by, claimed_at, \
     completed_at, image_path";

#[derive(FromRow)]
struct PageRecord {
    id: Uuid,
    book_id: Uuid,
    page_number: i32,
    content: String,
    is_two_columns: bool,
    right_column: String,
    left_column: String,
    right_column_name: Option<String>,
    left_column_name: Option<String>,
    status: String,
    claimed_by: Option<Uuid>,
    claimed_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    image_path: String,
}
impl PageRecord {
    fn to_domain(self) -> Page {
        Page {
            id: self.id,
            book_id: self.book_id,
            page_number: self.page_number,
            text: PageText {
                content: self.content,
                is_two_columns: self.is_two_columns,
                right_column: self.right_column,
                left_column: self.left_column,
                right_column_name: self.right_column_name,
                left_column_name: self.left_column_name,
            },
            status: PageStatus::parse(&self.status).unwrap_or_default(),
            claimed_by: self.claimed_by,
            claimed_at: self.claimed_at,
            completed_at: self.completed_at,
            image_path: self.image_path,
        }
    }
}

#[derive(FromRow)]
struct PageListingRecord {
    id: Uuid,
    book_name: String,
    page_number: i32,
    status: String,
    claimed_by_name: Option<String>,
    claimed_by_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}
impl PageListingRecord {
    fn to_domain(self) -> PageListing {
        PageListing {
            id: self.id,
            book_name: self.book_name,
            page_number: self.page_number,
            status: PageStatus::parse(&self.status).unwrap_or_default(),
            claimed_by_name: self.claimed_by_name,
            claimed_by_id: self.claimed_by_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
            completed_at: self.completed_at,
        }
    }
}

#[derive(FromRow)]
struct ExportRecord {
    book_name: String,
    page_number: i32,
    content: String,
    is_two_columns: bool,
    right_column: String,
    left_column: String,
    right_column_name: Option<String>,
    left_column_name: Option<String>,
}
impl ExportRecord {
    fn to_domain(self) -> ExportedPage {
        ExportedPage {
            book_name: self.book_name,
            page_number: self.page_number,
            text: PageText {
                content: self.content,
                is_two_columns: self.is_two_columns,
                right_column: self.right_column,
                left_column: self.left_column,
                right_column_name: self.right_column_name,
                left_column_name: self.left_column_name,
            },
        }
    }
}

#[derive(FromRow)]
struct MessageRecord {
    id: Uuid,
    sender_id: Uuid,
    recipient_id: Option<Uuid>,
    subject: String,
    content: String,
    is_read: bool,
    created_at: DateTime<Utc>,
}
impl MessageRecord {
    fn to_domain(self, replies: Vec<Reply>) -> Message {
        Message {
            id: self.id,
            sender_id: self.sender_id,
            recipient_id: self.recipient_id,
            subject: self.subject,
            content: self.content,
            is_read: self.is_read,
            replies,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct ReplyRecord {
    message_id: Uuid,
    sender_id: Uuid,
    content: String,
    created_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct StatsRecord {
    total_users: i64,
    admin_users: i64,
    total_books: i64,
    total_pages: i64,
    completed_pages: i64,
    in_progress_pages: i64,
    available_pages: i64,
}

//=========================================================================================
// Query Helpers
//=========================================================================================

async fn insert_message(conn: &mut PgConnection, message: &Message) -> PortResult<()> {
    sqlx::query(
        "INSERT INTO messages (id, sender_id, recipient_id, subject, content, is_read, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(message.id)
    .bind(message.sender_id)
    .bind(message.recipient_id)
    .bind(&message.subject)
    .bind(&message.content)
    .bind(message.is_read)
    .bind(message.created_at)
    .execute(&mut *conn)
    .await
    .map_err(write_error("Message"))?;

    if message.replies.is_empty() {
        return Ok(());
    }
    let mut builder = QueryBuilder::<Postgres>::new(
        "INSERT INTO message_replies (id, message_id, position, sender_id, content, created_at) ",
    );
    builder.push_values(message.replies.iter().enumerate(), |mut row, (position, reply)| {
        row.push_bind(Uuid::new_v4())
            .push_bind(message.id)
            .push_bind(position as i32)
            .push_bind(reply.sender_id)
            .push_bind(&reply.content)
            .push_bind(reply.created_at);
    });
    builder
        .build()
        .execute(&mut *conn)
        .await
        .map_err(write_error("Reply"))?;
    Ok(())
}

fn push_page_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &PageFilter) {
    builder.push(" WHERE TRUE");
    if let Some(status) = filter.status {
        builder.push(" AND p.status = ").push_bind(status.as_str());
    }
    if let Some(book_id) = filter.book_id {
        builder.push(" AND p.book_id = ").push_bind(book_id);
    }
    if let Some(user_id) = filter.claimed_by {
        builder.push(" AND p.claimed_by = ").push_bind(user_id);
    }
}

//=========================================================================================
// `LibraryStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl LibraryStore for DbAdapter {
    async fn upsert_user_by_email(&self, user: &UserImport) -> PortResult<Uuid> {
        sqlx::query_scalar::<_, Uuid>(
            "INSERT INTO users (id, name, email, password, role, points, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (email) DO UPDATE SET name = EXCLUDED.name, password = EXCLUDED.password, \
             role = EXCLUDED.role, points = EXCLUDED.points, created_at = EXCLUDED.created_at, \
             updated_at = now() \
             RETURNING id",
        )
        .bind(user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password)
        .bind(user.role.as_str())
        .bind(user.points)
        .bind(user.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)
    }

    async fn create_user(&self, name: &str, email: &str, hashed_password: &str) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            "INSERT INTO users (id, name, email, password) VALUES ($1, $2, $3, $4) RETURNING {}",
            USER_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(email)
        .bind(hashed_password)
        .fetch_one(&self.pool)
        .await
        .map_err(write_error("User"))?;
        Ok(record.to_domain())
    }

    async fn get_user(&self, user_id: Uuid) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {} FROM users WHERE id = $1",
            USER_COLUMNS
        ))
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::NotFound(format!("User {} not found", user_id)),
            _ => unexpected(e),
        })?;
        Ok(record.to_domain())
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        let record = sqlx::query_as::<_, CredentialsRecord>(
            "SELECT id, name, email, role, password FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::NotFound(format!("User {} not found", email)),
            _ => unexpected(e),
        })?;
        Ok(record.to_domain())
    }

    async fn list_users(&self) -> PortResult<Vec<User>> {
        let records = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {} FROM users ORDER BY created_at ASC",
            USER_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(UserRecord::to_domain).collect())
    }

    async fn update_user(&self, user_id: Uuid, update: &UserUpdate) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            "UPDATE users SET role = COALESCE($2, role), points = COALESCE($3, points), \
             updated_at = now() WHERE id = $1 RETURNING {}",
            USER_COLUMNS
        ))
        .bind(user_id)
        .bind(update.role.map(|r| r.as_str()))
        .bind(update.points)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .ok_or_else(|| PortError::NotFound(format!("User {} not found", user_id)))?;
        Ok(record.to_domain())
    }

    async fn delete_user(&self, user_id: Uuid) -> PortResult<()> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("User {} not found", user_id)));
        }
        Ok(())
    }

    async fn add_points(&self, user_id: Uuid, points: i32) -> PortResult<()> {
        sqlx::query("UPDATE users SET points = points + $2, updated_at = now() WHERE id = $1")
            .bind(user_id)
            .bind(points)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        sqlx::query("INSERT INTO auth_sessions (id, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(session_id)
            .bind(user_id)
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .map_err(write_error("Session"))?;
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid> {
        sqlx::query_scalar::<_, Uuid>(
            "SELECT user_id FROM auth_sessions WHERE id = $1 AND expires_at > now()",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .ok_or(PortError::Unauthorized)
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        sqlx::query("DELETE FROM auth_sessions WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn upsert_book_by_name(&self, book: &NewBook) -> PortResult<Uuid> {
        sqlx::query_scalar::<_, Uuid>(
            "INSERT INTO books (id, name, slug, total_pages, completed_pages, category, folder_path, created_at) \
             VALUES ($1, $2, $3, $4, 0, $5, $6, $7) \
             ON CONFLICT (name) DO UPDATE SET slug = EXCLUDED.slug, total_pages = EXCLUDED.total_pages, \
             category = EXCLUDED.category, folder_path = EXCLUDED.folder_path, \
             created_at = EXCLUDED.created_at, updated_at = now() \
             RETURNING id",
        )
        .bind(book.id)
        .bind(&book.name)
        .bind(&book.slug)
        .bind(book.total_pages)
        .bind(&book.category)
        .bind(&book.folder_path)
        .bind(book.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)
    }

    async fn create_book(&self, book: &NewBook) -> PortResult<Book> {
        let record = sqlx::query_as::<_, BookRecord>(&format!(
            "INSERT INTO books (id, name, slug, total_pages, category, folder_path, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {}",
            BOOK_COLUMNS
        ))
        .bind(book.id)
        .bind(&book.name)
        .bind(&book.slug)
        .bind(book.total_pages)
        .bind(&book.category)
        .bind(&book.folder_path)
        .bind(book.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(write_error("Book"))?;
        Ok(record.to_domain())
    }

    async fn find_book(&self, slug_or_name: &str) -> PortResult<Book> {
        let record = sqlx::query_as::<_, BookRecord>(&format!(
            "SELECT {} FROM books WHERE slug = $1 OR name = $1 ORDER BY (slug = $1) DESC LIMIT 1",
            BOOK_COLUMNS
        ))
        .bind(slug_or_name)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .ok_or_else(|| PortError::NotFound(format!("Book {} not found", slug_or_name)))?;
        Ok(record.to_domain())
    }

    async fn list_books(&self) -> PortResult<Vec<BookSummary>> {
        let records = sqlx::query_as::<_, BookSummaryRecord>(
            "SELECT b.id, b.name, b.slug, b.total_pages, b.completed_pages, b.category, \
             b.folder_path, b.created_at, \
             (SELECT COUNT(*) FROM pages p WHERE p.book_id = b.id AND p.status = 'completed') AS live_completed \
             FROM books b ORDER BY b.updated_at DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records
            .into_iter()
            .map(|r| BookSummary {
                book: r.book.to_domain(),
                completed_pages: r.live_completed,
            })
            .collect())
    }

    async fn set_completed_pages(&self, book_id: Uuid, completed: i32) -> PortResult<()> {
        sqlx::query("UPDATE books SET completed_pages = $2, updated_at = now() WHERE id = $1")
            .bind(book_id)
            .bind(completed)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn refresh_completed_pages(&self, book_id: Uuid) -> PortResult<i32> {
        sqlx::query_scalar::<_, i32>(
            "UPDATE books SET completed_pages = \
             (SELECT COUNT(*)::int FROM pages WHERE book_id = $1 AND status = 'completed'), \
             updated_at = now() WHERE id = $1 RETURNING completed_pages",
        )
        .bind(book_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .ok_or_else(|| PortError::NotFound(format!("Book {} not found", book_id)))
    }

    async fn insert_pages(&self, pages: &[NewPage]) -> PortResult<()> {
        if pages.is_empty() {
            return Ok(());
        }
        let mut builder = QueryBuilder::<Postgres>::new(
            "INSERT INTO pages (id, book_id, page_number, content, status, claimed_by, \
             claimed_at, completed_at, image_path) ",
        );
        builder.push_values(pages, |mut row, page| {
            row.push_bind(Uuid::new_v4())
                .push_bind(page.book_id)
                .push_bind(page.page_number)
                .push_bind(&page.content)
                .push_bind(page.status.as_str())
                .push_bind(page.claimed_by)
                .push_bind(page.claimed_at)
                .push_bind(page.completed_at)
                .push_bind(&page.image_path);
        });
        builder
            .build()
            .execute(&self.pool)
            .await
            .map_err(write_error("Page"))?;
        Ok(())
    }

    async fn clear_pages(&self) -> PortResult<()> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;
        sqlx::query("DELETE FROM pages")
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;
        sqlx::query("UPDATE books SET completed_pages = 0")
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;
        tx.commit().await.map_err(unexpected)?;
        Ok(())
    }

    async fn get_page(&self, book_id: Uuid, page_number: i32) -> PortResult<Page> {
        let record = sqlx::query_as::<_, PageRecord>(&format!(
            "SELECT {} FROM pages WHERE book_id = $1 AND page_number = $2",
            PAGE_COLUMNS
        ))
        .bind(book_id)
        .bind(page_number)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .ok_or_else(|| PortError::NotFound(format!("Page {} not found", page_number)))?;
        Ok(record.to_domain())
    }

    async fn get_page_by_id(&self, page_id: Uuid) -> PortResult<Page> {
        let record = sqlx::query_as::<_, PageRecord>(&format!(
            "SELECT {} FROM pages WHERE id = $1",
            PAGE_COLUMNS
        ))
        .bind(page_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .ok_or_else(|| PortError::NotFound(format!("Page {} not found", page_id)))?;
        Ok(record.to_domain())
    }

    async fn save_page_text(&self, page_id: Uuid, text: &PageText) -> PortResult<Page> {
        let record = sqlx::query_as::<_, PageRecord>(&format!(
            "UPDATE pages SET content = $2, is_two_columns = $3, right_column = $4, \
             left_column = $5, right_column_name = $6, left_column_name = $7, updated_at = now() \
             WHERE id = $1 RETURNING {}",
            PAGE_COLUMNS
        ))
        .bind(page_id)
        .bind(&text.content)
        .bind(text.is_two_columns)
        .bind(&text.right_column)
        .bind(&text.left_column)
        .bind(&text.right_column_name)
        .bind(&text.left_column_name)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .ok_or_else(|| PortError::NotFound(format!("Page {} not found", page_id)))?;
        Ok(record.to_domain())
    }

    async fn claim_page(&self, page_id: Uuid, user_id: Uuid, at: DateTime<Utc>) -> PortResult<Page> {
        let record = sqlx::query_as::<_, PageRecord>(&format!(
            "UPDATE pages SET status = 'in-progress', claimed_by = $2, claimed_at = $3, \
             updated_at = now() WHERE id = $1 AND status = 'available' RETURNING {}",
            PAGE_COLUMNS
        ))
        .bind(page_id)
        .bind(user_id)
        .bind(at)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        match record {
            Some(record) => Ok(record.to_domain()),
            None => {
                self.get_page_by_id(page_id).await?;
                Err(PortError::Conflict(format!("Page {} is not available", page_id)))
            }
        }
    }

    async fn complete_page(
        &self,
        page_id: Uuid,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> PortResult<Page> {
        let record = sqlx::query_as::<_, PageRecord>(&format!(
            "UPDATE pages SET status = 'completed', completed_at = $3, updated_at = now() \
             WHERE id = $1 AND status = 'in-progress' AND claimed_by = $2 RETURNING {}",
            PAGE_COLUMNS
        ))
        .bind(page_id)
        .bind(user_id)
        .bind(at)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        match record {
            Some(record) => Ok(record.to_domain()),
            None => {
                self.get_page_by_id(page_id).await?;
                Err(PortError::Conflict(format!(
                    "Page {} is not in progress for this user",
                    page_id
                )))
            }
        }
    }

    async fn assign_page(&self, page_id: Uuid, assignment: &PageAssignment) -> PortResult<Page> {
        let record = sqlx::query_as::<_, PageRecord>(&format!(
            "UPDATE pages SET \
             status = COALESCE($2::text, status), \
             claimed_by = CASE WHEN $3 THEN $4::uuid ELSE claimed_by END, \
             claimed_at = CASE WHEN $3 THEN (CASE WHEN $4::uuid IS NULL THEN NULL ELSE now() END) \
                          ELSE claimed_at END, \
             completed_at = CASE WHEN COALESCE($2::text, status) = 'completed' THEN completed_at \
                            ELSE NULL END, \
             updated_at = now() \
             WHERE id = $1 RETURNING {}",
            PAGE_COLUMNS
        ))
        .bind(page_id)
        .bind(assignment.status.map(|s| s.as_str()))
        .bind(assignment.claimed_by.is_some())
        .bind(assignment.claimed_by.flatten())
        .fetch_optional(&self.pool)
        .await
        .map_err(write_error("Page"))?
        .ok_or_else(|| PortError::NotFound(format!("Page {} not found", page_id)))?;
        Ok(record.to_domain())
    }

    async fn list_pages(&self, filter: &PageFilter) -> PortResult<(Vec<PageListing>, i64)> {
        let mut builder = QueryBuilder::<Postgres>::new(
            "SELECT p.id, b.name AS book_name, p.page_number, p.status, u.name AS claimed_by_name, \
             p.claimed_by AS claimed_by_id, p.created_at, p.updated_at, p.completed_at \
             FROM pages p JOIN books b ON b.id = p.book_id LEFT JOIN users u ON u.id = p.claimed_by",
        );
        push_page_filters(&mut builder, filter);
        builder
            .push(" ORDER BY b.name, p.page_number OFFSET ")
            .push_bind(filter.offset)
            .push(" LIMIT ")
            .push_bind(filter.limit);
        let records = builder
            .build_query_as::<PageListingRecord>()
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM pages p");
        push_page_filters(&mut count, filter);
        let total = count
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await
            .map_err(unexpected)?;

        Ok((
            records.into_iter().map(PageListingRecord::to_domain).collect(),
            total,
        ))
    }

    fn pages_with_text(&self) -> PageStream<'_> {
        let stream = sqlx::query_as::<_, ExportRecord>(
            "SELECT b.name AS book_name, p.page_number, p.content, p.is_two_columns, \
             p.right_column, p.left_column, p.right_column_name, p.left_column_name \
             FROM pages p JOIN books b ON b.id = p.book_id \
             WHERE p.content <> '' OR p.right_column <> '' OR p.left_column <> '' \
             ORDER BY b.name, p.page_number",
        )
        .fetch(&self.pool)
        .map_ok(ExportRecord::to_domain)
        .map_err(unexpected);
        Box::pin(stream)
    }

    async fn stats(&self) -> PortResult<LibraryStats> {
        let record = sqlx::query_as::<_, StatsRecord>(
            "SELECT \
             (SELECT COUNT(*) FROM users) AS total_users, \
             (SELECT COUNT(*) FROM users WHERE role = 'admin') AS admin_users, \
             (SELECT COUNT(*) FROM books) AS total_books, \
             (SELECT COUNT(*) FROM pages) AS total_pages, \
             (SELECT COUNT(*) FROM pages WHERE status = 'completed') AS completed_pages, \
             (SELECT COUNT(*) FROM pages WHERE status = 'in-progress') AS in_progress_pages, \
             (SELECT COUNT(*) FROM pages WHERE status = 'available') AS available_pages",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(LibraryStats {
            total_users: record.total_users,
            admin_users: record.admin_users,
            total_books: record.total_books,
            total_pages: record.total_pages,
            completed_pages: record.completed_pages,
            in_progress_pages: record.in_progress_pages,
            available_pages: record.available_pages,
        })
    }

    async fn replace_messages(&self, messages: &[Message]) -> PortResult<()> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;
        sqlx::query("DELETE FROM messages")
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;
        for message in messages {
            insert_message(&mut tx, message).await?;
        }
        tx.commit().await.map_err(unexpected)?;
        Ok(())
    }

    async fn create_message(&self, message: &Message) -> PortResult<()> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;
        insert_message(&mut tx, message).await?;
        tx.commit().await.map_err(unexpected)?;
        Ok(())
    }

    async fn list_messages(&self, user_id: Option<Uuid>) -> PortResult<Vec<Message>> {
        let records = match user_id {
            None => sqlx::query_as::<_, MessageRecord>(
                "SELECT id, sender_id, recipient_id, subject, content, is_read, created_at \
                 FROM messages ORDER BY created_at DESC",
            )
            .fetch_all(&self.pool)
            .await,
            Some(user_id) => sqlx::query_as::<_, MessageRecord>(
                "SELECT id, sender_id, recipient_id, subject, content, is_read, created_at \
                 FROM messages WHERE sender_id = $1 OR recipient_id = $1 \
                 OR (recipient_id IS NULL AND sender_id IN (SELECT id FROM users WHERE role = 'admin')) \
                 ORDER BY created_at DESC",
            )
            .bind(user_id)
            .fetch_all(&self.pool)
            .await,
        }
        .map_err(unexpected)?;

        let ids: Vec<Uuid> = records.iter().map(|r| r.id).collect();
        let replies = sqlx::query_as::<_, ReplyRecord>(
            "SELECT message_id, sender_id, content, created_at FROM message_replies \
             WHERE message_id = ANY($1) ORDER BY message_id, position",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        let mut by_message: HashMap<Uuid, Vec<Reply>> = HashMap::new();
        for reply in replies {
            by_message.entry(reply.message_id).or_default().push(Reply {
                sender_id: reply.sender_id,
                content: reply.content,
                created_at: reply.created_at,
            });
        }

        Ok(records
            .into_iter()
            .map(|r| {
                let replies = by_message.remove(&r.id).unwrap_or_default();
                r.to_domain(replies)
            })
            .collect())
    }

    async fn add_reply(&self, message_id: Uuid, reply: &Reply) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO message_replies (id, message_id, position, sender_id, content, created_at) \
             SELECT $1, $2, COALESCE(MAX(position) + 1, 0), $3, $4, $5 \
             FROM message_replies WHERE message_id = $2",
        )
        .bind(Uuid::new_v4())
        .bind(message_id)
        .bind(reply.sender_id)
        .bind(&reply.content)
        .bind(reply.created_at)
        .execute(&self.pool)
        .await
        .map_err(write_error("Reply"))?;
        Ok(())
    }

    async fn mark_message_read(&self, message_id: Uuid) -> PortResult<()> {
        let result = sqlx::query("UPDATE messages SET is_read = TRUE WHERE id = $1")
            .bind(message_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Message {} not found", message_id)));
        }
        Ok(())
    }
}
