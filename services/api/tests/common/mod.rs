//! In-memory `LibraryStore` and stub rasterizer used by the integration tests.

#![allow(dead_code)]

use api_lib::config::{Config, RasterConfig};
use api_lib::web::state::AppState;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use scriptorium_core::domain::{
    Book, BookSummary, LibraryStats, Message, NewBook, NewPage, Page, PageAssignment, PageFilter,
    PageListing, PageStatus, PageText, Reply, Role, User, UserCredentials, UserImport, UserUpdate,
    ExportedPage,
};
use scriptorium_core::ports::{
    LibraryStore, PageRasterizer, PageStream, PortError, PortResult,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    users: Vec<(User, String)>,
    sessions: HashMap<String, (Uuid, DateTime<Utc>)>,
    books: Vec<Book>,
    pages: Vec<Page>,
    messages: Vec<Message>,
    insert_batches: Vec<usize>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap()
    }

    pub fn users(&self) -> Vec<User> {
        self.lock().users.iter().map(|(u, _)| u.clone()).collect()
    }

    pub fn books(&self) -> Vec<Book> {
        self.lock().books.clone()
    }

    pub fn pages(&self) -> Vec<Page> {
        self.lock().pages.clone()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.lock().messages.clone()
    }

    /// Row counts of every `insert_pages` call, in order.
    pub fn insert_batches(&self) -> Vec<usize> {
        self.lock().insert_batches.clone()
    }

    /// Inserts a user with a known role and returns a live session id for it.
    pub fn seed_session(&self, name: &str, role: Role) -> (Uuid, String) {
        let mut tables = self.lock();
        let user = User {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: format!("{}@example.com", name),
            role,
            points: 0,
            created_at: Utc::now(),
        };
        let session = Uuid::new_v4().to_string();
        tables
            .sessions
            .insert(session.clone(), (user.id, Utc::now() + chrono::Duration::hours(1)));
        let id = user.id;
        tables.users.push((user, String::new()));
        (id, session)
    }
}

fn page_not_found(id: Uuid) -> PortError {
    PortError::NotFound(format!("Page {} not found", id))
}

fn completed_count(pages: &[Page], book_id: Uuid) -> i32 {
    pages
        .iter()
        .filter(|p| p.book_id == book_id && p.status == PageStatus::Completed)
        .count() as i32
}

fn book_from(new: &NewBook) -> Book {
    Book {
        id: new.id,
        name: new.name.clone(),
        slug: new.slug.clone(),
        total_pages: new.total_pages,
        completed_pages: 0,
        category: new.category.clone(),
        folder_path: new.folder_path.clone(),
        created_at: new.created_at,
    }
}

fn visible_to(tables: &Tables, user_id: Uuid, message: &Message) -> bool {
    let from_admin = tables
        .users
        .iter()
        .any(|(u, _)| u.id == message.sender_id && u.role == Role::Admin);
    message.sender_id == user_id
        || message.recipient_id == Some(user_id)
        || (message.recipient_id.is_none() && from_admin)
}

#[async_trait]
impl LibraryStore for MemoryStore {
    async fn upsert_user_by_email(&self, user: &UserImport) -> PortResult<Uuid> {
        let mut tables = self.lock();
        if let Some((existing, password)) = tables.users.iter_mut().find(|(u, _)| u.email == user.email) {
            existing.name = user.name.clone();
            existing.role = user.role;
            existing.points = user.points;
            *password = user.password.clone();
            return Ok(existing.id);
        }
        tables.users.push((
            User {
                id: user.id,
                name: user.name.clone(),
                email: user.email.clone(),
                role: user.role,
                points: user.points,
                created_at: user.created_at,
            },
            user.password.clone(),
        ));
        Ok(user.id)
    }

    async fn create_user(&self, name: &str, email: &str, hashed_password: &str) -> PortResult<User> {
        let mut tables = self.lock();
        if tables.users.iter().any(|(u, _)| u.name == name || u.email == email) {
            return Err(PortError::Conflict("User already exists".to_string()));
        }
        let user = User {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: email.to_string(),
            role: Role::User,
            points: 0,
            created_at: Utc::now(),
        };
        tables.users.push((user.clone(), hashed_password.to_string()));
        Ok(user)
    }

    async fn get_user(&self, user_id: Uuid) -> PortResult<User> {
        self.lock()
            .users
            .iter()
            .find(|(u, _)| u.id == user_id)
            .map(|(u, _)| u.clone())
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", user_id)))
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        self.lock()
            .users
            .iter()
            .find(|(u, _)| u.email == email)
            .map(|(u, password)| UserCredentials {
                user_id: u.id,
                name: u.name.clone(),
                email: u.email.clone(),
                role: u.role,
                hashed_password: password.clone(),
            })
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", email)))
    }

    async fn list_users(&self) -> PortResult<Vec<User>> {
        Ok(self.users())
    }

    async fn update_user(&self, user_id: Uuid, update: &UserUpdate) -> PortResult<User> {
        let mut tables = self.lock();
        let (user, _) = tables
            .users
            .iter_mut()
            .find(|(u, _)| u.id == user_id)
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", user_id)))?;
        if let Some(role) = update.role {
            user.role = role;
        }
        if let Some(points) = update.points {
            user.points = points;
        }
        Ok(user.clone())
    }

    async fn delete_user(&self, user_id: Uuid) -> PortResult<()> {
        let mut tables = self.lock();
        let before = tables.users.len();
        tables.users.retain(|(u, _)| u.id != user_id);
        if tables.users.len() == before {
            return Err(PortError::NotFound(format!("User {} not found", user_id)));
        }
        for page in tables.pages.iter_mut().filter(|p| p.claimed_by == Some(user_id)) {
            page.claimed_by = None;
        }
        Ok(())
    }

    async fn add_points(&self, user_id: Uuid, points: i32) -> PortResult<()> {
        let mut tables = self.lock();
        let (user, _) = tables
            .users
            .iter_mut()
            .find(|(u, _)| u.id == user_id)
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", user_id)))?;
        user.points += points;
        Ok(())
    }

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        self.lock()
            .sessions
            .insert(session_id.to_string(), (user_id, expires_at));
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid> {
        match self.lock().sessions.get(session_id) {
            Some((user_id, expires_at)) if *expires_at > Utc::now() => Ok(*user_id),
            _ => Err(PortError::Unauthorized),
        }
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        self.lock().sessions.remove(session_id);
        Ok(())
    }

    async fn upsert_book_by_name(&self, book: &NewBook) -> PortResult<Uuid> {
        let mut tables = self.lock();
        if let Some(existing) = tables.books.iter_mut().find(|b| b.name == book.name) {
            existing.slug = book.slug.clone();
            existing.total_pages = book.total_pages;
            existing.category = book.category.clone();
            existing.folder_path = book.folder_path.clone();
            return Ok(existing.id);
        }
        tables.books.push(book_from(book));
        Ok(book.id)
    }

    async fn create_book(&self, book: &NewBook) -> PortResult<Book> {
        let mut tables = self.lock();
        if tables.books.iter().any(|b| b.name == book.name) {
            return Err(PortError::Conflict("Book already exists".to_string()));
        }
        let book = book_from(book);
        tables.books.push(book.clone());
        Ok(book)
    }

    async fn find_book(&self, slug_or_name: &str) -> PortResult<Book> {
        let tables = self.lock();
        tables
            .books
            .iter()
            .find(|b| b.slug == slug_or_name)
            .or_else(|| tables.books.iter().find(|b| b.name == slug_or_name))
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Book {} not found", slug_or_name)))
    }

    async fn list_books(&self) -> PortResult<Vec<BookSummary>> {
        let tables = self.lock();
        let mut books: Vec<BookSummary> = tables
            .books
            .iter()
            .map(|b| BookSummary {
                book: b.clone(),
                completed_pages: i64::from(completed_count(&tables.pages, b.id)),
            })
            .collect();
        books.sort_by(|a, b| a.book.name.cmp(&b.book.name));
        Ok(books)
    }

    async fn set_completed_pages(&self, book_id: Uuid, completed: i32) -> PortResult<()> {
        let mut tables = self.lock();
        if let Some(book) = tables.books.iter_mut().find(|b| b.id == book_id) {
            book.completed_pages = completed;
        }
        Ok(())
    }

    async fn refresh_completed_pages(&self, book_id: Uuid) -> PortResult<i32> {
        let mut tables = self.lock();
        let completed = completed_count(&tables.pages, book_id);
        if let Some(book) = tables.books.iter_mut().find(|b| b.id == book_id) {
            book.completed_pages = completed;
        }
        Ok(completed)
    }

    async fn insert_pages(&self, pages: &[NewPage]) -> PortResult<()> {
        let mut tables = self.lock();
        tables.insert_batches.push(pages.len());
        for new in pages {
            if !tables.books.iter().any(|b| b.id == new.book_id) {
                return Err(PortError::NotFound("Page references a missing row".to_string()));
            }
            if tables
                .pages
                .iter()
                .any(|p| p.book_id == new.book_id && p.page_number == new.page_number)
            {
                return Err(PortError::Conflict("Page already exists".to_string()));
            }
            tables.pages.push(Page {
                id: Uuid::new_v4(),
                book_id: new.book_id,
                page_number: new.page_number,
                text: PageText {
                    content: new.content.clone(),
                    ..Default::default()
                },
                status: new.status,
                claimed_by: new.claimed_by,
                claimed_at: new.claimed_at,
                completed_at: new.completed_at,
                image_path: new.image_path.clone(),
            });
        }
        Ok(())
    }

    async fn clear_pages(&self) -> PortResult<()> {
        let mut tables = self.lock();
        tables.pages.clear();
        for book in tables.books.iter_mut() {
            book.completed_pages = 0;
        }
        Ok(())
    }

    async fn get_page(&self, book_id: Uuid, page_number: i32) -> PortResult<Page> {
        self.lock()
            .pages
            .iter()
            .find(|p| p.book_id == book_id && p.page_number == page_number)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Page {} not found", page_number)))
    }

    async fn get_page_by_id(&self, page_id: Uuid) -> PortResult<Page> {
        self.lock()
            .pages
            .iter()
            .find(|p| p.id == page_id)
            .cloned()
            .ok_or_else(|| page_not_found(page_id))
    }

    async fn save_page_text(&self, page_id: Uuid, text: &PageText) -> PortResult<Page> {
        let mut tables = self.lock();
        let page = tables
            .pages
            .iter_mut()
            .find(|p| p.id == page_id)
            .ok_or_else(|| page_not_found(page_id))?;
        page.text = text.clone();
        Ok(page.clone())
    }

    async fn claim_page(&self, page_id: Uuid, user_id: Uuid, at: DateTime<Utc>) -> PortResult<Page> {
        let mut tables = self.lock();
        let page = tables
            .pages
            .iter_mut()
            .find(|p| p.id == page_id)
            .ok_or_else(|| page_not_found(page_id))?;
        if page.status != PageStatus::Available {
            return Err(PortError::Conflict("Page is not available".to_string()));
        }
        page.status = PageStatus::InProgress;
        page.claimed_by = Some(user_id);
        page.claimed_at = Some(at);
        Ok(page.clone())
    }

    async fn complete_page(&self, page_id: Uuid, user_id: Uuid, at: DateTime<Utc>) -> PortResult<Page> {
        let mut tables = self.lock();
        let page = tables
            .pages
            .iter_mut()
            .find(|p| p.id == page_id)
            .ok_or_else(|| page_not_found(page_id))?;
        if page.status != PageStatus::InProgress || page.claimed_by != Some(user_id) {
            return Err(PortError::Conflict("Page is not in progress for this user".to_string()));
        }
        page.status = PageStatus::Completed;
        page.completed_at = Some(at);
        Ok(page.clone())
    }

    async fn assign_page(&self, page_id: Uuid, assignment: &PageAssignment) -> PortResult<Page> {
        let mut tables = self.lock();
        let page = tables
            .pages
            .iter_mut()
            .find(|p| p.id == page_id)
            .ok_or_else(|| page_not_found(page_id))?;
        if let Some(status) = assignment.status {
            page.status = status;
        }
        if let Some(claimed_by) = assignment.claimed_by {
            page.claimed_by = claimed_by;
            page.claimed_at = claimed_by.map(|_| Utc::now());
        }
        if page.status != PageStatus::Completed {
            page.completed_at = None;
        }
        Ok(page.clone())
    }

    async fn list_pages(&self, filter: &PageFilter) -> PortResult<(Vec<PageListing>, i64)> {
        let tables = self.lock();
        let mut matching: Vec<PageListing> = tables
            .pages
            .iter()
            .filter(|p| filter.status.map_or(true, |s| p.status == s))
            .filter(|p| filter.book_id.map_or(true, |b| p.book_id == b))
            .filter(|p| filter.claimed_by.map_or(true, |u| p.claimed_by == Some(u)))
            .filter_map(|p| {
                let book = tables.books.iter().find(|b| b.id == p.book_id)?;
                let claimant = p
                    .claimed_by
                    .and_then(|id| tables.users.iter().find(|(u, _)| u.id == id));
                Some(PageListing {
                    id: p.id,
                    book_name: book.name.clone(),
                    page_number: p.page_number,
                    status: p.status,
                    claimed_by_name: claimant.map(|(u, _)| u.name.clone()),
                    claimed_by_id: p.claimed_by,
                    created_at: book.created_at,
                    updated_at: book.created_at,
                    completed_at: p.completed_at,
                })
            })
            .collect();
        matching.sort_by(|a, b| (&a.book_name, a.page_number).cmp(&(&b.book_name, b.page_number)));
        let total = matching.len() as i64;
        let pages = matching
            .into_iter()
            .skip(filter.offset as usize)
            .take(filter.limit as usize)
            .collect();
        Ok((pages, total))
    }

    fn pages_with_text(&self) -> PageStream<'_> {
        let tables = self.lock();
        let mut exported: Vec<ExportedPage> = tables
            .pages
            .iter()
            .filter(|p| {
                !p.text.content.is_empty() || !p.text.right_column.is_empty() || !p.text.left_column.is_empty()
            })
            .filter_map(|p| {
                let book = tables.books.iter().find(|b| b.id == p.book_id)?;
                Some(ExportedPage {
                    book_name: book.name.clone(),
                    page_number: p.page_number,
                    text: p.text.clone(),
                })
            })
            .collect();
        exported.sort_by(|a, b| (&a.book_name, a.page_number).cmp(&(&b.book_name, b.page_number)));
        futures::stream::iter(exported.into_iter().map(Ok)).boxed()
    }

    async fn stats(&self) -> PortResult<LibraryStats> {
        let tables = self.lock();
        let count = |status: PageStatus| tables.pages.iter().filter(|p| p.status == status).count() as i64;
        Ok(LibraryStats {
            total_users: tables.users.len() as i64,
            admin_users: tables.users.iter().filter(|(u, _)| u.role == Role::Admin).count() as i64,
            total_books: tables.books.len() as i64,
            total_pages: tables.pages.len() as i64,
            completed_pages: count(PageStatus::Completed),
            in_progress_pages: count(PageStatus::InProgress),
            available_pages: count(PageStatus::Available),
        })
    }

    async fn replace_messages(&self, messages: &[Message]) -> PortResult<()> {
        self.lock().messages = messages.to_vec();
        Ok(())
    }

    async fn create_message(&self, message: &Message) -> PortResult<()> {
        self.lock().messages.push(message.clone());
        Ok(())
    }

    async fn list_messages(&self, user_id: Option<Uuid>) -> PortResult<Vec<Message>> {
        let tables = self.lock();
        let mut messages: Vec<Message> = tables
            .messages
            .iter()
            .filter(|m| user_id.map_or(true, |id| visible_to(&tables, id, m)))
            .cloned()
            .collect();
        messages.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(messages)
    }

    async fn add_reply(&self, message_id: Uuid, reply: &Reply) -> PortResult<()> {
        let mut tables = self.lock();
        let message = tables
            .messages
            .iter_mut()
            .find(|m| m.id == message_id)
            .ok_or_else(|| PortError::NotFound(format!("Message {} not found", message_id)))?;
        message.replies.push(reply.clone());
        Ok(())
    }

    async fn mark_message_read(&self, message_id: Uuid) -> PortResult<()> {
        let mut tables = self.lock();
        let message = tables
            .messages
            .iter_mut()
            .find(|m| m.id == message_id)
            .ok_or_else(|| PortError::NotFound(format!("Message {} not found", message_id)))?;
        message.is_read = true;
        Ok(())
    }
}

/// Pretends every PDF has a fixed number of pages and writes empty images.
pub struct StubRasterizer {
    pub pages: usize,
}

#[async_trait]
impl PageRasterizer for StubRasterizer {
    async fn rasterize(&self, _pdf: &Path, out_dir: &Path) -> PortResult<usize> {
        for n in 1..=self.pages {
            tokio::fs::write(out_dir.join(format!("page.{}.jpg", n)), b"")
                .await
                .map_err(|e| PortError::Unexpected(e.to_string()))?;
        }
        Ok(self.pages)
    }
}

pub fn test_config(upload_dir: PathBuf) -> Config {
    Config {
        bind_address: "127.0.0.1:0".parse().unwrap(),
        database_url: "postgres://unused".to_string(),
        log_level: tracing::Level::INFO,
        cors_origin: "http://localhost:3000".to_string(),
        upload_dir,
        raster: RasterConfig {
            binary: PathBuf::from("pdftoppm"),
            density: 150,
            width: 1200,
            height: 1600,
        },
        restore_dir: PathBuf::from("."),
        export_dir: PathBuf::from("."),
    }
}

pub fn app_state(store: Arc<MemoryStore>, upload_dir: PathBuf, pages: usize) -> Arc<AppState> {
    Arc::new(AppState {
        store,
        rasterizer: Arc::new(StubRasterizer { pages }),
        config: Arc::new(test_config(upload_dir)),
    })
}
