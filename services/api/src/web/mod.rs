pub mod admin;
pub mod auth;
pub mod library;
pub mod messages;
pub mod middleware;
pub mod rest;
pub mod state;

use axum::{
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::services::ServeDir;

pub use middleware::{require_admin, require_auth};
use state::AppState;

/// Uploaded PDFs can be large.
const UPLOAD_BODY_LIMIT: usize = 200 * 1024 * 1024;

/// Builds the application router: public, authenticated and admin routes,
/// plus the rasterized page images under `/uploads`.
pub fn router(state: Arc<AppState>) -> Router {
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/auth/signup", post(auth::signup_handler))
        .route("/auth/login", post(auth::login_handler))
        .route("/auth/logout", post(auth::logout_handler))
        .route("/library/books", get(library::list_books_handler))
        .route("/page-content", get(library::get_page_content_handler));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/page-content", post(library::save_page_content_handler))
        .route("/pages/claim", post(library::claim_page_handler))
        .route("/pages/complete", post(library::complete_page_handler))
        .route("/messages", get(messages::list_messages_handler))
        .route("/messages/send", post(messages::send_message_handler))
        .route("/messages/reply", post(messages::reply_handler))
        .route("/messages/mark-read", put(messages::mark_read_handler))
        .layer(axum_middleware::from_fn_with_state(state.clone(), require_auth));

    // Admin routes (auth + admin role required); layers run bottom-up
    let admin_routes = Router::new()
        .route("/admin/stats", get(admin::stats_handler))
        .route(
            "/admin/users",
            get(admin::list_users_handler)
                .put(admin::update_user_handler)
                .delete(admin::delete_user_handler),
        )
        .route("/admin/pages", get(admin::list_pages_handler))
        .route("/admin/pages/update", put(admin::update_page_handler))
        .route("/admin/messages/send", post(admin::send_admin_message_handler))
        .route(
            "/admin/books/upload",
            post(admin::upload_book_handler).layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT)),
        )
        .layer(axum_middleware::from_fn(require_admin))
        .layer(axum_middleware::from_fn_with_state(state.clone(), require_auth));

    let uploads = ServeDir::new(&state.config.upload_dir);

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(admin_routes)
        .nest_service("/uploads", uploads)
        .with_state(state)
}
