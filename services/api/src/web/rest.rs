//! services/api/src/web/rest.rs
//!
//! Shared response payloads and error mapping for the REST handlers, and the
//! master definition for the OpenAPI specification.

use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use scriptorium_core::domain::{Message, Page, Reply, User};
use scriptorium_core::ports::PortError;
use serde::Serialize;
use tracing::error;
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

use crate::web::{admin, auth, library, messages};

/// Error half of every handler result.
pub type HandlerError = (StatusCode, String);

/// Maps a port failure to a response, logging only unexpected ones.
pub fn port_failure(context: &'static str) -> impl FnOnce(PortError) -> HandlerError {
    move |e| match e {
        PortError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
        PortError::Conflict(msg) => (StatusCode::CONFLICT, msg),
        PortError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
        PortError::Unexpected(msg) => {
            error!("{}: {}", context, msg);
            (StatusCode::INTERNAL_SERVER_ERROR, context.to_string())
        }
    }
}

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::signup_handler,
        auth::login_handler,
        auth::logout_handler,
        library::list_books_handler,
        library::get_page_content_handler,
        library::save_page_content_handler,
        library::claim_page_handler,
        library::complete_page_handler,
        messages::list_messages_handler,
        messages::send_message_handler,
        messages::reply_handler,
        messages::mark_read_handler,
        admin::stats_handler,
        admin::list_users_handler,
        admin::update_user_handler,
        admin::delete_user_handler,
        admin::list_pages_handler,
        admin::update_page_handler,
        admin::send_admin_message_handler,
        admin::upload_book_handler,
    ),
    components(
        schemas(
            auth::SignupRequest, auth::LoginRequest, auth::AuthResponse,
            library::BookListItem, library::ListBooksResponse, library::PageContentData,
            library::PageContentResponse, library::SavePageRequest, library::PageRef,
            messages::SendMessageRequest, messages::ReplyRequest, messages::MessageIdRequest,
            messages::ListMessagesResponse,
            admin::StatsResponse, admin::StatsPayload, admin::UserCounts, admin::UsersResponse, admin::UserResponse,
            admin::UpdateUserRequest, admin::UserIdRequest, admin::PageListItem,
            admin::ListPagesResponse, admin::Pagination, admin::UpdatePageRequest,
            admin::PageUpdates, admin::AdminMessageRequest, admin::UploadResponse,
            PageDto, PageResponse, UserDto, MessageDto, ReplyDto, SuccessResponse
        )
    ),
    tags(
        (name = "Scriptorium API", description = "API endpoints for the collaborative book digitization library.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// Shared Response Payloads
//=========================================================================================

/// A bare acknowledgement, optionally with a human-readable message.
#[derive(Serialize, ToSchema)]
pub struct SuccessResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl SuccessResponse {
    pub fn ok() -> Self {
        Self { success: true, message: None }
    }

    pub fn with_message(message: &str) -> Self {
        Self { success: true, message: Some(message.to_string()) }
    }
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PageDto {
    pub id: Uuid,
    pub book_id: Uuid,
    pub page_number: i32,
    pub status: String,
    pub claimed_by: Option<Uuid>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub image_path: String,
}

impl From<Page> for PageDto {
    fn from(page: Page) -> Self {
        Self {
            id: page.id,
            book_id: page.book_id,
            page_number: page.page_number,
            status: page.status.as_str().to_string(),
            claimed_by: page.claimed_by,
            claimed_at: page.claimed_at,
            completed_at: page.completed_at,
            image_path: page.image_path,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct PageResponse {
    pub success: bool,
    pub page: PageDto,
}

impl PageResponse {
    pub fn new(page: Page) -> Self {
        Self { success: true, page: page.into() }
    }
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserDto {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: String,
    pub points: i32,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserDto {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            role: user.role.as_str().to_string(),
            points: user.points,
            created_at: user.created_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReplyDto {
    pub sender_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl From<Reply> for ReplyDto {
    fn from(reply: Reply) -> Self {
        Self {
            sender_id: reply.sender_id,
            content: reply.content,
            created_at: reply.created_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MessageDto {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub recipient_id: Option<Uuid>,
    pub subject: String,
    pub content: String,
    pub is_read: bool,
    pub replies: Vec<ReplyDto>,
    pub created_at: DateTime<Utc>,
}

impl From<Message> for MessageDto {
    fn from(message: Message) -> Self {
        Self {
            id: message.id,
            sender_id: message.sender_id,
            recipient_id: message.recipient_id,
            subject: message.subject,
            content: message.content,
            is_read: message.is_read,
            replies: message.replies.into_iter().map(ReplyDto::from).collect(),
            created_at: message.created_at,
        }
    }
}
