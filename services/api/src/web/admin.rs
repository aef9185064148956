//! services/api/src/web/admin.rs
//!
//! Admin-only endpoints: dashboard statistics, user management, page
//! reassignment, broadcast messages and PDF uploads. Every route here sits
//! behind `require_auth` and `require_admin`.

use axum::{
    extract::{Extension, Multipart, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use scriptorium_core::domain::{
    NewBook, NewPage, PageAssignment, PageFilter, PageListing, PageStatus, Role, UserUpdate,
    DEFAULT_CATEGORY,
};
use scriptorium_core::ports::PortError;
use scriptorium_core::slug::{book_folder_path, page_image_path, upload_slug};
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::web::messages::new_message;
use crate::web::rest::{port_failure, HandlerError, SuccessResponse, UserDto};
use crate::web::state::{AppState, CurrentUser};

const DEFAULT_PAGE_LIMIT: i64 = 5000;
const SOURCE_PDF: &str = "source.pdf";

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct UserCounts {
    pub total: i64,
    pub admins: i64,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatsPayload {
    pub users: UserCounts,
    pub total_books: i64,
    pub total_pages: i64,
    pub completed_pages: i64,
    pub in_progress_pages: i64,
    pub available_pages: i64,
    pub completion_rate: i64,
}

#[derive(Serialize, ToSchema)]
pub struct StatsResponse {
    pub success: bool,
    pub stats: StatsPayload,
}

#[derive(Serialize, ToSchema)]
pub struct UsersResponse {
    pub success: bool,
    pub users: Vec<UserDto>,
}

#[derive(Serialize, ToSchema)]
pub struct UserResponse {
    pub success: bool,
    pub user: UserDto,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub user_id: Uuid,
    pub role: Option<String>,
    pub points: Option<i32>,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserIdRequest {
    pub user_id: Uuid,
}

#[derive(Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct ListPagesQuery {
    pub status: Option<String>,
    /// Book slug or name.
    pub book: Option<String>,
    pub user_id: Option<Uuid>,
    /// 1-based page of results.
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PageListItem {
    pub id: Uuid,
    pub book_name: String,
    pub page_number: i32,
    pub status: String,
    pub claimed_by: Option<String>,
    pub claimed_by_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<PageListing> for PageListItem {
    fn from(listing: PageListing) -> Self {
        Self {
            id: listing.id,
            book_name: listing.book_name,
            page_number: listing.page_number,
            status: listing.status.as_str().to_string(),
            claimed_by: listing.claimed_by_name,
            claimed_by_id: listing.claimed_by_id,
            created_at: listing.created_at,
            updated_at: listing.updated_at,
            completed_at: listing.completed_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub total: i64,
    pub page: i64,
    pub limit: i64,
    pub total_pages: i64,
}

#[derive(Serialize, ToSchema)]
pub struct ListPagesResponse {
    pub success: bool,
    pub pages: Vec<PageListItem>,
    pub pagination: Pagination,
}

/// Distinguishes an absent field from an explicit `null`.
fn present<'de, D>(deserializer: D) -> Result<Option<Option<Uuid>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<Uuid>::deserialize(deserializer).map(Some)
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PageUpdates {
    pub status: Option<String>,
    /// `null` clears the claimant; omit to leave it unchanged.
    #[serde(default, deserialize_with = "present")]
    #[schema(value_type = Option<Uuid>)]
    pub claimed_by: Option<Option<Uuid>>,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePageRequest {
    pub book_name: String,
    pub page_number: i32,
    pub updates: PageUpdates,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AdminMessageRequest {
    pub subject: Option<String>,
    pub message: String,
    #[serde(default)]
    pub send_to_all: bool,
    pub recipient_id: Option<Uuid>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub success: bool,
    pub book_id: Uuid,
    pub total_pages: i32,
}

//=========================================================================================
// Request Translation
//=========================================================================================

fn parse_status(raw: &str) -> Result<PageStatus, HandlerError> {
    PageStatus::parse(raw).ok_or((StatusCode::BAD_REQUEST, format!("Unknown page status '{}'", raw)))
}

/// Turns the requested updates into an assignment. Releasing a page to
/// `available` clears its claimant unless one is given explicitly.
fn assignment_from(updates: PageUpdates) -> Result<PageAssignment, HandlerError> {
    let status = updates.status.as_deref().map(parse_status).transpose()?;
    let claimed_by = match (status, updates.claimed_by) {
        (Some(PageStatus::Available), None) => Some(None),
        (_, claimed_by) => claimed_by,
    };
    Ok(PageAssignment { status, claimed_by })
}

fn pagination(total: i64, page: i64, limit: i64) -> Pagination {
    Pagination {
        total,
        page,
        limit,
        total_pages: (total + limit - 1) / limit,
    }
}

//=========================================================================================
// Handlers
//=========================================================================================

/// Dashboard statistics.
#[utoipa::path(
    get,
    path = "/admin/stats",
    responses(
        (status = 200, description = "Library statistics", body = StatsResponse),
        (status = 401, description = "Not logged in"),
        (status = 403, description = "Not an admin")
    )
)]
pub async fn stats_handler(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, HandlerError> {
    let stats = state
        .store
        .stats()
        .await
        .map_err(port_failure("Failed to load statistics"))?;
    Ok(Json(StatsResponse {
        success: true,
        stats: StatsPayload {
            users: UserCounts {
                total: stats.total_users,
                admins: stats.admin_users,
            },
            total_books: stats.total_books,
            total_pages: stats.total_pages,
            completed_pages: stats.completed_pages,
            in_progress_pages: stats.in_progress_pages,
            available_pages: stats.available_pages,
            completion_rate: stats.completion_rate(),
        },
    }))
}

/// List every user.
#[utoipa::path(
    get,
    path = "/admin/users",
    responses((status = 200, description = "All users", body = UsersResponse))
)]
pub async fn list_users_handler(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, HandlerError> {
    let users = state
        .store
        .list_users()
        .await
        .map_err(port_failure("Failed to load users"))?;
    Ok(Json(UsersResponse {
        success: true,
        users: users.into_iter().map(UserDto::from).collect(),
    }))
}

/// Change a user's role or points.
#[utoipa::path(
    put,
    path = "/admin/users",
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "Updated user", body = UserResponse),
        (status = 400, description = "Unknown role"),
        (status = 404, description = "User not found")
    )
)]
pub async fn update_user_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<UpdateUserRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let role = match req.role.as_deref() {
        None => None,
        Some("user") => Some(Role::User),
        Some("admin") => Some(Role::Admin),
        Some(other) => return Err((StatusCode::BAD_REQUEST, format!("Unknown role '{}'", other))),
    };
    let update = UserUpdate { role, points: req.points };
    let user = state
        .store
        .update_user(req.user_id, &update)
        .await
        .map_err(port_failure("Failed to update user"))?;
    info!("User {} updated", user.id);
    Ok(Json(UserResponse { success: true, user: user.into() }))
}

/// Delete a user. Admins cannot delete themselves.
#[utoipa::path(
    delete,
    path = "/admin/users",
    request_body = UserIdRequest,
    responses(
        (status = 200, description = "User deleted", body = SuccessResponse),
        (status = 400, description = "Attempt to delete own account"),
        (status = 404, description = "User not found")
    )
)]
pub async fn delete_user_handler(
    State(state): State<Arc<AppState>>,
    Extension(admin): Extension<CurrentUser>,
    Json(req): Json<UserIdRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    if req.user_id == admin.id {
        return Err((StatusCode::BAD_REQUEST, "Cannot delete your own account".to_string()));
    }
    state
        .store
        .delete_user(req.user_id)
        .await
        .map_err(port_failure("Failed to delete user"))?;
    info!("User {} deleted by {}", req.user_id, admin.id);
    Ok(Json(SuccessResponse::with_message("המשתמש נמחק")))
}

/// Filtered, paginated page listing ordered by book then page number.
#[utoipa::path(
    get,
    path = "/admin/pages",
    params(ListPagesQuery),
    responses(
        (status = 200, description = "Matching pages", body = ListPagesResponse),
        (status = 400, description = "Unknown status")
    )
)]
pub async fn list_pages_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListPagesQuery>,
) -> Result<impl IntoResponse, HandlerError> {
    let status = query.status.as_deref().map(parse_status).transpose()?;
    let book_id = match query.book.as_deref().filter(|b| !b.is_empty()) {
        None => None,
        Some(book) => match state.store.find_book(book).await {
            Ok(book) => Some(book.id),
            Err(PortError::NotFound(_)) => {
                warn!("Ignoring filter on unknown book '{}'", book);
                None
            }
            Err(e) => return Err(port_failure("Failed to load book")(e)),
        },
    };
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.filter(|l| *l > 0).unwrap_or(DEFAULT_PAGE_LIMIT);

    let filter = PageFilter {
        status,
        book_id,
        claimed_by: query.user_id,
        offset: (page - 1) * limit,
        limit,
    };
    let (pages, total) = state
        .store
        .list_pages(&filter)
        .await
        .map_err(port_failure("Failed to load pages"))?;

    Ok(Json(ListPagesResponse {
        success: true,
        pages: pages.into_iter().map(PageListItem::from).collect(),
        pagination: pagination(total, page, limit),
    }))
}

/// Release or reassign a page and recompute the book's completed counter.
#[utoipa::path(
    put,
    path = "/admin/pages/update",
    request_body = UpdatePageRequest,
    responses(
        (status = 200, description = "Page updated", body = SuccessResponse),
        (status = 400, description = "Unknown status"),
        (status = 404, description = "Book or page not found")
    )
)]
pub async fn update_page_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<UpdatePageRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let assignment = assignment_from(req.updates)?;
    let book = state
        .store
        .find_book(&req.book_name)
        .await
        .map_err(port_failure("Failed to load book"))?;
    let page = state
        .store
        .get_page(book.id, req.page_number)
        .await
        .map_err(port_failure("Failed to load page"))?;
    state
        .store
        .assign_page(page.id, &assignment)
        .await
        .map_err(port_failure("Failed to update page"))?;
    let completed = state
        .store
        .refresh_completed_pages(book.id)
        .await
        .map_err(port_failure("Failed to update book statistics"))?;
    info!(
        "Page {} of '{}' updated, book now has {} completed pages",
        req.page_number, book.name, completed
    );
    Ok(Json(SuccessResponse::with_message("העמוד עודכן")))
}

/// Send a message to one user or broadcast it to everyone.
#[utoipa::path(
    post,
    path = "/admin/messages/send",
    request_body = AdminMessageRequest,
    responses(
        (status = 201, description = "Message sent", body = SuccessResponse),
        (status = 400, description = "Missing recipient or empty message"),
        (status = 404, description = "Recipient not found")
    )
)]
pub async fn send_admin_message_handler(
    State(state): State<Arc<AppState>>,
    Extension(admin): Extension<CurrentUser>,
    Json(req): Json<AdminMessageRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    if req.message.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Message is empty".to_string()));
    }
    let recipient_id = if req.send_to_all {
        None
    } else {
        let recipient_id = req
            .recipient_id
            .ok_or((StatusCode::BAD_REQUEST, "Missing recipient".to_string()))?;
        state
            .store
            .get_user(recipient_id)
            .await
            .map_err(port_failure("Failed to load recipient"))?;
        Some(recipient_id)
    };
    let message = new_message(admin.id, recipient_id, req.subject, req.message);
    state
        .store
        .create_message(&message)
        .await
        .map_err(port_failure("Failed to send message"))?;
    Ok((StatusCode::CREATED, Json(SuccessResponse::with_message("ההודעה נשלחה"))))
}

/// Upload a PDF, rasterize it and create the book with one available page per image.
#[utoipa::path(
    post,
    path = "/admin/books/upload",
    request_body(content_type = "multipart/form-data", description = "`pdf` file and `bookName` text field"),
    responses(
        (status = 201, description = "Book created", body = UploadResponse),
        (status = 400, description = "Missing file or book name"),
        (status = 409, description = "A book with this name already exists"),
        (status = 500, description = "Rasterization failed")
    )
)]
pub async fn upload_book_handler(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, HandlerError> {
    let bad_form = |e: axum::extract::multipart::MultipartError| (StatusCode::BAD_REQUEST, e.to_string());

    // 1. Collect the form fields
    let mut pdf: Option<Bytes> = None;
    let mut book_name: Option<String> = None;
    while let Some(field) = multipart.next_field().await.map_err(bad_form)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "pdf" => pdf = Some(field.bytes().await.map_err(bad_form)?),
            "bookName" => book_name = Some(field.text().await.map_err(bad_form)?),
            _ => {}
        }
    }
    let pdf = pdf
        .filter(|bytes| !bytes.is_empty())
        .ok_or((StatusCode::BAD_REQUEST, "Missing PDF file".to_string()))?;
    let book_name = book_name
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .ok_or((StatusCode::BAD_REQUEST, "Missing book name".to_string()))?;

    // 2. Store the source PDF in the book's folder
    let now = Utc::now();
    let slug = upload_slug(&book_name, now);
    let book_dir = state.config.upload_dir.join("books").join(&slug);
    let io_failure = |e: std::io::Error| {
        error!("Failed to store upload: {}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, "Failed to store upload".to_string())
    };
    tokio::fs::create_dir_all(&book_dir).await.map_err(io_failure)?;
    let pdf_path = book_dir.join(SOURCE_PDF);
    tokio::fs::write(&pdf_path, &pdf).await.map_err(io_failure)?;

    // 3. Rasterize into page images
    let page_count = state
        .rasterizer
        .rasterize(&pdf_path, &book_dir)
        .await
        .map_err(port_failure("Failed to convert PDF"))?;
    if page_count == 0 {
        error!("Rasterizing '{}' produced no pages", book_name);
        return Err((StatusCode::INTERNAL_SERVER_ERROR, "PDF produced no pages".to_string()));
    }
    let total_pages = i32::try_from(page_count)
        .map_err(|_| (StatusCode::BAD_REQUEST, "PDF has too many pages".to_string()))?;

    // 4. Create the book and its placeholder pages
    let book = state
        .store
        .create_book(&NewBook {
            id: Uuid::new_v4(),
            name: book_name,
            slug: slug.clone(),
            total_pages,
            category: DEFAULT_CATEGORY.to_string(),
            folder_path: book_folder_path(&slug),
            created_at: now,
        })
        .await
        .map_err(port_failure("Failed to create book"))?;
    let pages: Vec<NewPage> = (1..=total_pages)
        .map(|n| NewPage::placeholder(book.id, n, page_image_path(&slug, n)))
        .collect();
    state
        .store
        .insert_pages(&pages)
        .await
        .map_err(port_failure("Failed to create pages"))?;

    info!("Uploaded '{}' with {} pages", book.name, total_pages);
    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            success: true,
            book_id: book.id,
            total_pages,
        }),
    ))
}
