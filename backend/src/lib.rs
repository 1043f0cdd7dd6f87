//! # Notice Board Backend
//!
//! Community notice board server: events with RSVP, admin notices and push
//! notifications for new and changed events.
//!
//! ## Design Principles
//!
//! - **Atomic attendance**: join and leave are single store operations, so
//!   concurrent RSVPs never exceed the limit or duplicate an attendee
//! - **Switchable storage**: local JSON files or the document store,
//!   selected at runtime and persisted across restarts
//! - **Best-effort push**: notification failures never fail a write
//! - **No secrets at rest**: salted password hashes, hashed session tokens
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────────┐
//! │   Client    │────▶│  Handlers   │────▶│    Use-cases    │
//! └─────────────┘     └─────────────┘     └────────┬────────┘
//!                                                  │
//!                                     ┌────────────┴───────────┐
//!                                     │  Repositories (switch) │
//!                                     └─────┬────────────┬─────┘
//!                                           │            │
//!                                      LocalStore   DocumentStore ──▶ Dispatcher ──▶ APNS
//! ```
//!
//! ## API Overview
//!
//! | Endpoint | Method | Description |
//! |----------|--------|-------------|
//! | `/health` | GET | Health check |
//! | `/v1/auth/register` | POST | Register and log in |
//! | `/v1/auth/login` | POST | Log in |
//! | `/v1/auth/logout` | POST | Log out |
//! | `/v1/me` | GET | Current user |
//! | `/v1/me/push-token` | PUT | Refresh device push token |
//! | `/v1/me/notifications` | PUT | Enable / disable push |
//! | `/v1/users/:username/admin` | POST | Promote to administrator |
//! | `/v1/events` | GET, POST | List (reconciled) / create |
//! | `/v1/events/stream` | GET | SSE live event list |
//! | `/v1/events/:id` | GET, PUT, DELETE | Read / edit / delete |
//! | `/v1/events/:id/attend` | POST | RSVP |
//! | `/v1/events/:id/leave` | POST | Cancel RSVP |
//! | `/v1/events/:id/cancel` | POST | Cancel event |
//! | `/v1/events/:id/attending` | GET | Is the caller attending |
//! | `/v1/notices` | GET, POST | List / create notices |
//! | `/v1/notices/:id` | GET, DELETE | Read / delete notice |
//! | `/v1/settings/storage` | GET, PUT | Read / switch backing store |

pub mod auth;
pub mod clock;
pub mod config;
pub mod dispatcher;
pub mod handlers;
pub mod models;
pub mod push;
pub mod reconcile;
pub mod repository;
pub mod store;
pub mod usecases;

pub use config::Config;
pub use handlers::AppState;

use axum::{
    http::{header, Method},
    routing::{get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};

/// Maximum request body size (64 KiB).
pub const MAX_BODY_SIZE: usize = 64 * 1024;

/// Build the Axum router with all endpoints and middleware.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Health check (unauthenticated)
        .route("/health", get(handlers::health))
        // Accounts
        .route("/v1/auth/register", post(handlers::register))
        .route("/v1/auth/login", post(handlers::login))
        .route("/v1/auth/logout", post(handlers::logout))
        .route("/v1/me", get(handlers::me))
        .route("/v1/me/push-token", put(handlers::update_push_token))
        .route("/v1/me/notifications", put(handlers::update_notifications))
        .route("/v1/users/:username/admin", post(handlers::make_admin))
        // Events
        .route("/v1/events", get(handlers::list_events).post(handlers::create_event))
        .route("/v1/events/stream", get(handlers::event_stream))
        .route(
            "/v1/events/:id",
            get(handlers::get_event)
                .put(handlers::update_event)
                .delete(handlers::delete_event),
        )
        .route("/v1/events/:id/attend", post(handlers::attend_event))
        .route("/v1/events/:id/leave", post(handlers::leave_event))
        .route("/v1/events/:id/cancel", post(handlers::cancel_event))
        .route("/v1/events/:id/attending", get(handlers::is_attending))
        // Notices
        .route("/v1/notices", get(handlers::list_notices).post(handlers::create_notice))
        .route(
            "/v1/notices/:id",
            get(handlers::get_notice).delete(handlers::delete_notice),
        )
        // Settings
        .route(
            "/v1/settings/storage",
            get(handlers::get_storage).put(handlers::set_storage),
        )
        // Middleware stack (order matters: first added = outermost)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
                .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
