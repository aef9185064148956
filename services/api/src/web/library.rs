//! services/api/src/web/library.rs
//!
//! Volunteer-facing endpoints: the book list, the editor's page content, and
//! claiming and completing pages.

use axum::{
    extract::{Extension, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use percent_encoding::percent_decode_str;
use scriptorium_core::domain::{Page, PageText};
use scriptorium_core::ports::LibraryStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::web::rest::{port_failure, HandlerError, PageResponse, SuccessResponse};
use crate::web::state::{AppState, CurrentUser};

const RIGHT_COLUMN_DEFAULT: &str = "חלק 1";
const LEFT_COLUMN_DEFAULT: &str = "חלק 2";

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BookListItem {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    /// Same as `slug`; older clients address books by path.
    pub path: String,
    pub thumbnail: String,
    pub total_pages: i32,
    pub completed_pages: i64,
    pub category: String,
    pub status: String,
}

#[derive(Serialize, ToSchema)]
pub struct ListBooksResponse {
    pub success: bool,
    pub books: Vec<BookListItem>,
}

#[derive(Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct PageContentQuery {
    pub book_path: Option<String>,
    pub page_number: Option<String>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PageContentData {
    pub content: String,
    pub is_two_columns: bool,
    pub two_columns: bool,
    pub right_column: String,
    pub left_column: String,
    pub right_column_name: String,
    pub left_column_name: String,
}

#[derive(Serialize, ToSchema)]
pub struct PageContentResponse {
    pub success: bool,
    pub data: PageContentData,
}

/// Identifies a page either by id or by book path and page number.
#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PageRef {
    pub page_id: Option<Uuid>,
    pub book_path: Option<String>,
    pub page_number: Option<i32>,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SavePageRequest {
    pub page_id: Option<Uuid>,
    pub book_path: Option<String>,
    pub page_number: Option<i32>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub two_columns: bool,
    #[serde(default)]
    pub right_column: String,
    #[serde(default)]
    pub left_column: String,
    pub right_column_name: Option<String>,
    pub left_column_name: Option<String>,
}

//=========================================================================================
// Page Lookup
//=========================================================================================

/// Decodes a percent-encoded book path as sent by the editor.
fn decode_book_path(raw: &str) -> String {
    percent_decode_str(raw).decode_utf8_lossy().into_owned()
}

/// Resolves a page by id, or by book slug/name plus page number.
async fn locate_page(
    store: &dyn LibraryStore,
    page_id: Option<Uuid>,
    book_path: Option<&str>,
    page_number: Option<i32>,
) -> Result<Page, HandlerError> {
    if let Some(page_id) = page_id {
        return store
            .get_page_by_id(page_id)
            .await
            .map_err(port_failure("Failed to load page"));
    }
    let (Some(book_path), Some(page_number)) = (book_path, page_number) else {
        return Err((StatusCode::BAD_REQUEST, "Missing book identifier".to_string()));
    };
    let book = store
        .find_book(&decode_book_path(book_path))
        .await
        .map_err(port_failure("Failed to load book"))?;
    store
        .get_page(book.id, page_number)
        .await
        .map_err(port_failure("Failed to load page"))
}

//=========================================================================================
// Handlers
//=========================================================================================

/// List every book with its live completion count.
#[utoipa::path(
    get,
    path = "/library/books",
    responses(
        (status = 200, description = "All books", body = ListBooksResponse),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn list_books_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, HandlerError> {
    let books = state
        .store
        .list_books()
        .await
        .map_err(port_failure("Failed to load library"))?;

    let books = books
        .into_iter()
        .map(|summary| {
            let book = summary.book;
            let done = summary.completed_pages == i64::from(book.total_pages);
            BookListItem {
                id: book.id,
                thumbnail: format!("{}/page.1.jpg", book.folder_path),
                path: book.slug.clone(),
                slug: book.slug,
                name: book.name,
                total_pages: book.total_pages,
                completed_pages: summary.completed_pages,
                category: book.category,
                status: if done { "completed" } else { "in-progress" }.to_string(),
            }
        })
        .collect();

    Ok(Json(ListBooksResponse { success: true, books }))
}

/// Load a page's text for the editor.
#[utoipa::path(
    get,
    path = "/page-content",
    params(PageContentQuery),
    responses(
        (status = 200, description = "Page text", body = PageContentResponse),
        (status = 400, description = "Missing parameters"),
        (status = 404, description = "Book or page not found")
    )
)]
pub async fn get_page_content_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PageContentQuery>,
) -> Result<impl IntoResponse, HandlerError> {
    let (Some(book_path), Some(page_number)) = (query.book_path, query.page_number) else {
        return Err((StatusCode::BAD_REQUEST, "Missing parameters".to_string()));
    };
    let page_number = page_number
        .trim()
        .parse::<i32>()
        .map_err(|_| (StatusCode::BAD_REQUEST, "Invalid page number".to_string()))?;

    let page = locate_page(state.store.as_ref(), None, Some(&book_path), Some(page_number)).await?;

    let text = page.text;
    Ok(Json(PageContentResponse {
        success: true,
        data: PageContentData {
            content: text.content,
            is_two_columns: text.is_two_columns,
            two_columns: text.is_two_columns,
            right_column: text.right_column,
            left_column: text.left_column,
            right_column_name: text
                .right_column_name
                .unwrap_or_else(|| RIGHT_COLUMN_DEFAULT.to_string()),
            left_column_name: text
                .left_column_name
                .unwrap_or_else(|| LEFT_COLUMN_DEFAULT.to_string()),
        },
    }))
}

/// Save a page's text. The page must already exist.
#[utoipa::path(
    post,
    path = "/page-content",
    request_body = SavePageRequest,
    responses(
        (status = 200, description = "Saved", body = SuccessResponse),
        (status = 400, description = "Missing book identifier"),
        (status = 404, description = "Book or page not found")
    )
)]
pub async fn save_page_content_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SavePageRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let page = locate_page(
        state.store.as_ref(),
        req.page_id,
        req.book_path.as_deref(),
        req.page_number,
    )
    .await?;

    let text = PageText {
        content: req.content,
        is_two_columns: req.two_columns,
        right_column: req.right_column,
        left_column: req.left_column,
        right_column_name: req.right_column_name,
        left_column_name: req.left_column_name,
    };
    state
        .store
        .save_page_text(page.id, &text)
        .await
        .map_err(port_failure("Failed to save page"))?;

    Ok(Json(SuccessResponse::with_message("נשמר בהצלחה")))
}

/// Claim an available page for the caller.
#[utoipa::path(
    post,
    path = "/pages/claim",
    request_body = PageRef,
    responses(
        (status = 200, description = "Page claimed", body = PageResponse),
        (status = 404, description = "Page not found"),
        (status = 409, description = "Page is not available")
    )
)]
pub async fn claim_page_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Json(req): Json<PageRef>,
) -> Result<impl IntoResponse, HandlerError> {
    let page = locate_page(state.store.as_ref(), req.page_id, req.book_path.as_deref(), req.page_number)
        .await?;
    let page = state
        .store
        .claim_page(page.id, user.id, Utc::now())
        .await
        .map_err(port_failure("Failed to claim page"))?;
    info!("User {} claimed page {} of book {}", user.id, page.page_number, page.book_id);
    Ok(Json(PageResponse::new(page)))
}

/// Mark the caller's in-progress page as completed and award a point.
#[utoipa::path(
    post,
    path = "/pages/complete",
    request_body = PageRef,
    responses(
        (status = 200, description = "Page completed", body = PageResponse),
        (status = 404, description = "Page not found"),
        (status = 409, description = "Page is not in progress for this user")
    )
)]
pub async fn complete_page_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Json(req): Json<PageRef>,
) -> Result<impl IntoResponse, HandlerError> {
    let page = locate_page(state.store.as_ref(), req.page_id, req.book_path.as_deref(), req.page_number)
        .await?;
    let page = state
        .store
        .complete_page(page.id, user.id, Utc::now())
        .await
        .map_err(port_failure("Failed to complete page"))?;
    state
        .store
        .add_points(user.id, 1)
        .await
        .map_err(port_failure("Failed to award points"))?;
    state
        .store
        .refresh_completed_pages(page.book_id)
        .await
        .map_err(port_failure("Failed to update book statistics"))?;
    Ok(Json(PageResponse::new(page)))
}
