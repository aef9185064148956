//! services/api/src/web/messages.rs
//!
//! Internal messaging between volunteers and admins.

use axum::{
    extract::{Extension, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use scriptorium_core::domain::{Message, Reply, DEFAULT_SUBJECT};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::web::rest::{port_failure, HandlerError, MessageDto, SuccessResponse};
use crate::web::state::{AppState, CurrentUser};

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct ListMessagesResponse {
    pub success: bool,
    pub messages: Vec<MessageDto>,
}

#[derive(Deserialize, ToSchema)]
pub struct SendMessageRequest {
    pub subject: Option<String>,
    pub message: String,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReplyRequest {
    pub message_id: Uuid,
    pub reply: String,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MessageIdRequest {
    pub message_id: Uuid,
}

/// Builds a new message from `sender`; `recipient_id: None` is a broadcast
/// when the sender is an admin, and a note to the admins otherwise.
pub fn new_message(
    sender_id: Uuid,
    recipient_id: Option<Uuid>,
    subject: Option<String>,
    content: String,
) -> Message {
    Message {
        id: Uuid::new_v4(),
        sender_id,
        recipient_id,
        subject: subject
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SUBJECT.to_string()),
        content,
        is_read: false,
        replies: Vec::new(),
        created_at: Utc::now(),
    }
}

/// Fails with 404 unless the caller may see `message_id`.
async fn ensure_visible(state: &AppState, user: CurrentUser, message_id: Uuid) -> Result<(), HandlerError> {
    let scope = if user.is_admin() { None } else { Some(user.id) };
    let visible = state
        .store
        .list_messages(scope)
        .await
        .map_err(port_failure("Failed to load messages"))?
        .iter()
        .any(|m| m.id == message_id);
    if visible {
        Ok(())
    } else {
        Err((StatusCode::NOT_FOUND, format!("Message {} not found", message_id)))
    }
}

//=========================================================================================
// Handlers
//=========================================================================================

/// List the caller's messages; admins see every message.
#[utoipa::path(
    get,
    path = "/messages",
    responses(
        (status = 200, description = "Messages, newest first", body = ListMessagesResponse),
        (status = 401, description = "Not logged in")
    )
)]
pub async fn list_messages_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, HandlerError> {
    let scope = if user.is_admin() { None } else { Some(user.id) };
    let messages = state
        .store
        .list_messages(scope)
        .await
        .map_err(port_failure("Failed to load messages"))?;
    Ok(Json(ListMessagesResponse {
        success: true,
        messages: messages.into_iter().map(MessageDto::from).collect(),
    }))
}

/// Send a message to the admins.
#[utoipa::path(
    post,
    path = "/messages/send",
    request_body = SendMessageRequest,
    responses(
        (status = 201, description = "Message sent", body = SuccessResponse),
        (status = 400, description = "Empty message")
    )
)]
pub async fn send_message_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    if req.message.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Message is empty".to_string()));
    }
    let message = new_message(user.id, None, req.subject, req.message);
    state
        .store
        .create_message(&message)
        .await
        .map_err(port_failure("Failed to send message"))?;
    Ok((StatusCode::CREATED, Json(SuccessResponse::with_message("ההודעה נשלחה"))))
}

/// Append a reply to a message.
#[utoipa::path(
    post,
    path = "/messages/reply",
    request_body = ReplyRequest,
    responses(
        (status = 200, description = "Reply added", body = SuccessResponse),
        (status = 404, description = "Message not found")
    )
)]
pub async fn reply_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Json(req): Json<ReplyRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    if req.reply.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Reply is empty".to_string()));
    }
    ensure_visible(&state, user, req.message_id).await?;
    let reply = Reply {
        sender_id: user.id,
        content: req.reply,
        created_at: Utc::now(),
    };
    state
        .store
        .add_reply(req.message_id, &reply)
        .await
        .map_err(port_failure("Failed to add reply"))?;
    Ok(Json(SuccessResponse::ok()))
}

/// Mark a message as read.
#[utoipa::path(
    put,
    path = "/messages/mark-read",
    request_body = MessageIdRequest,
    responses(
        (status = 200, description = "Marked as read", body = SuccessResponse),
        (status = 404, description = "Message not found")
    )
)]
pub async fn mark_read_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Json(req): Json<MessageIdRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    ensure_visible(&state, user, req.message_id).await?;
    state
        .store
        .mark_message_read(req.message_id)
        .await
        .map_err(port_failure("Failed to update message"))?;
    Ok(Json(SuccessResponse::ok()))
}
