//! HTTP request handlers for the notice board API.
//!
//! Handlers resolve the acting user from the bearer token (a missing or
//! unknown token means "nobody"), call a use-case and map its error onto
//! a status code. Authorization decisions live in the use-cases.

use crate::auth::{extract_bearer_token, AuthError, SessionStore};
use crate::clock::Clock;
use crate::models::*;
use crate::repository::{DataSourceManager, EventRepository, NoticeRepository, UserRepository};
use crate::usecases::{AccountUseCases, EventFilter, EventUseCases, NoticeUseCases, UseCaseError};
use axum::{
    extract::{Path, Query, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{
        sse::{Event as SseEvent, KeepAlive, Sse},
        IntoResponse,
    },
    Json,
};
use futures::stream::{Stream, StreamExt};
use noticeboard_core::{Event, Notice, User};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub sources: Arc<DataSourceManager>,
    pub events: EventUseCases,
    pub notices: NoticeUseCases,
    pub accounts: AccountUseCases,
}

impl AppState {
    pub fn new(sources: Arc<DataSourceManager>, clock: Arc<dyn Clock>) -> Self {
        let events = EventUseCases::new(EventRepository::new(sources.clone()), clock.clone());
        let notices = NoticeUseCases::new(NoticeRepository::new(sources.clone()), clock);
        let accounts = AccountUseCases::new(UserRepository::new(sources.clone()), SessionStore::new());
        Self {
            sources,
            events,
            notices,
            accounts,
        }
    }
}

// === Health Check ===

/// GET /health - Health check endpoint
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// === Session Helpers ===

/// Bearer token from the `Authorization` header
fn extract_auth_token(headers: &HeaderMap) -> Result<String, AuthError> {
    let header_value = headers
        .get(AUTHORIZATION)
        .ok_or(AuthError::MissingHeader)?
        .to_str()
        .map_err(|_| AuthError::InvalidHeader)?;

    extract_bearer_token(header_value)
        .map(|s| s.to_string())
        .ok_or(AuthError::InvalidHeader)
}

/// Acting user, if the request carries a live session.
async fn acting_user(state: &AppState, headers: &HeaderMap) -> Option<User> {
    let token = extract_auth_token(headers).ok()?;
    state.accounts.current_user(&token).await
}

/// Acting user, or an auth error for endpoints that are meaningless without one.
async fn require_session(state: &AppState, headers: &HeaderMap) -> Result<User, ApiError> {
    let token = extract_auth_token(headers)?;
    state
        .accounts
        .current_user(&token)
        .await
        .ok_or(ApiError::Auth(AuthError::SessionEnded))
}

// === Accounts ===

/// POST /v1/auth/register - Create an account and start a session
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<SessionResponse>), ApiError> {
    let session = state.accounts.register(req.into()).await?;
    Ok((StatusCode::CREATED, Json(session.into())))
}

/// POST /v1/auth/login - Start a session
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    let session = state.accounts.login(&req.username, &req.password).await?;
    Ok(Json(session.into()))
}

/// POST /v1/auth/logout - End the current session
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Result<StatusCode, ApiError> {
    let token = extract_auth_token(&headers)?;
    state.accounts.logout(&token);
    Ok(StatusCode::NO_CONTENT)
}

/// GET /v1/me - Current user
pub async fn me(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<UserResponse>, ApiError> {
    let user = require_session(&state, &headers).await?;
    Ok(Json(user.into()))
}

/// PUT /v1/me/push-token - Refresh the device push token
pub async fn update_push_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<PushTokenRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    let user = acting_user(&state, &headers).await;
    let user = state.accounts.update_push_token(req.token, user.as_ref()).await?;
    Ok(Json(user.into()))
}

/// PUT /v1/me/notifications - Enable or disable push notifications
pub async fn update_notifications(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<NotificationsRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    let user = acting_user(&state, &headers).await;
    let user = state
        .accounts
        .set_notifications_enabled(req.enabled, user.as_ref())
        .await?;
    Ok(Json(user.into()))
}

/// POST /v1/users/:username/admin - Promote a user
pub async fn make_admin(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(username): Path<String>,
) -> Result<Json<UserResponse>, ApiError> {
    let user = acting_user(&state, &headers).await;
    let promoted = state.accounts.make_admin(&username, user.as_ref()).await?;
    Ok(Json(promoted.into()))
}

// === Events ===

/// GET /v1/events - Reconciled event list, optionally filtered
pub async fn list_events(
    State(state): State<AppState>,
    Query(query): Query<EventListQuery>,
) -> Result<Json<Vec<Event>>, ApiError> {
    let status = match query.status.as_deref() {
        None => None,
        Some(raw) => Some(
            parse_status(raw).ok_or_else(|| ApiError::InvalidInput(format!("Unknown event status: {raw}")))?,
        ),
    };
    let filter = EventFilter {
        status,
        created_by: query.created_by,
    };
    Ok(Json(state.events.list_events(&filter).await?))
}

/// POST /v1/events - Create an event (administrators)
pub async fn create_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<EventRequest>,
) -> Result<(StatusCode, Json<Event>), ApiError> {
    let user = acting_user(&state, &headers).await;
    let event = state.events.create_event(req.into(), user.as_ref()).await?;
    Ok((StatusCode::CREATED, Json(event)))
}

/// GET /v1/events/:id
pub async fn get_event(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
) -> Result<Json<Event>, ApiError> {
    Ok(Json(state.events.get_event(&event_id).await?))
}

/// PUT /v1/events/:id - Edit an upcoming event (administrators)
pub async fn update_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(event_id): Path<String>,
    Json(req): Json<EventRequest>,
) -> Result<Json<Event>, ApiError> {
    let user = acting_user(&state, &headers).await;
    let event = state
        .events
        .update_event(&event_id, req.into(), user.as_ref())
        .await?;
    Ok(Json(event))
}

/// DELETE /v1/events/:id (administrators)
pub async fn delete_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(event_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let user = acting_user(&state, &headers).await;
    state.events.delete_event(&event_id, user.as_ref()).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /v1/events/:id/attend
pub async fn attend_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(event_id): Path<String>,
) -> Result<Json<Event>, ApiError> {
    let user = acting_user(&state, &headers).await;
    Ok(Json(state.events.attend_event(&event_id, user.as_ref()).await?))
}

/// POST /v1/events/:id/leave
pub async fn leave_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(event_id): Path<String>,
) -> Result<Json<Event>, ApiError> {
    let user = acting_user(&state, &headers).await;
    Ok(Json(state.events.leave_event(&event_id, user.as_ref()).await?))
}

/// POST /v1/events/:id/cancel (administrators)
pub async fn cancel_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(event_id): Path<String>,
) -> Result<Json<Event>, ApiError> {
    let user = acting_user(&state, &headers).await;
    Ok(Json(state.events.cancel_event(&event_id, user.as_ref()).await?))
}

/// GET /v1/events/:id/attending
pub async fn is_attending(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(event_id): Path<String>,
) -> Result<Json<AttendingResponse>, ApiError> {
    let user = acting_user(&state, &headers).await;
    let attending = state.events.is_attending(&event_id, user.as_ref()).await?;
    Ok(Json(AttendingResponse { attending }))
}

// === SSE Event Stream ===

/// GET /v1/events/stream - Live event list
///
/// Sends the full list on connect and again after every write to the store
/// that was active when the client connected.
pub async fn event_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    info!("SSE client connected");

    let stream = state.events.repository().get_events().filter_map(|events| async move {
        match serde_json::to_string(&events) {
            Ok(json) => Some(Ok(SseEvent::default().event("events").data(json))),
            Err(e) => {
                warn!(error = %e, "Failed to serialize event snapshot");
                None
            }
        }
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

// === Notices ===

/// GET /v1/notices - Newest first
pub async fn list_notices(State(state): State<AppState>) -> Result<Json<Vec<Notice>>, ApiError> {
    Ok(Json(state.notices.list_notices().await?))
}

/// POST /v1/notices (administrators)
pub async fn create_notice(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<NoticeRequest>,
) -> Result<(StatusCode, Json<Notice>), ApiError> {
    let user = acting_user(&state, &headers).await;
    let notice = state.notices.create_notice(req.into(), user.as_ref()).await?;
    Ok((StatusCode::CREATED, Json(notice)))
}

/// GET /v1/notices/:id
pub async fn get_notice(
    State(state): State<AppState>,
    Path(notice_id): Path<String>,
) -> Result<Json<Notice>, ApiError> {
    Ok(Json(state.notices.get_notice(&notice_id).await?))
}

/// DELETE /v1/notices/:id (administrators)
pub async fn delete_notice(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(notice_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let user = acting_user(&state, &headers).await;
    state.notices.delete_notice(&notice_id, user.as_ref()).await?;
    Ok(StatusCode::NO_CONTENT)
}

// === Settings ===

/// GET /v1/settings/storage
pub async fn get_storage(State(state): State<AppState>) -> Json<StorageSettingsBody> {
    Json(StorageSettingsBody {
        storage_mode: state.sources.storage_mode(),
    })
}

/// PUT /v1/settings/storage - Switch the backing store (administrators)
pub async fn set_storage(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<StorageSettingsBody>,
) -> Result<Json<StorageSettingsBody>, ApiError> {
    let user = acting_user(&state, &headers)
        .await
        .ok_or(UseCaseError::NotAuthenticated)?;
    if !user.is_admin() {
        return Err(UseCaseError::Forbidden("Only administrators can change storage settings").into());
    }

    state
        .sources
        .set_storage_mode(req.storage_mode)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to persist storage settings");
            ApiError::Internal
        })?;

    Ok(Json(StorageSettingsBody {
        storage_mode: state.sources.storage_mode(),
    }))
}

// === Error Handling ===

/// API error types
#[derive(Debug)]
pub enum ApiError {
    InvalidInput(String),
    NotAuthenticated(String),
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    Internal,
    /// Missing or unusable session
    Auth(AuthError),
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        ApiError::Auth(err)
    }
}

impl From<UseCaseError> for ApiError {
    fn from(err: UseCaseError) -> Self {
        let message = err.to_string();
        match err {
            UseCaseError::InvalidArgument(_) => ApiError::InvalidInput(message),
            UseCaseError::NotAuthenticated => ApiError::NotAuthenticated(message),
            UseCaseError::Forbidden(_) => ApiError::Forbidden(message),
            UseCaseError::NotFound(_) => ApiError::NotFound(message),
            UseCaseError::Conflict(_) => ApiError::Conflict(message),
            UseCaseError::Storage(_) => {
                error!(error = %message, "Storage failure");
                ApiError::Internal
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, code, message) = match self {
            ApiError::Auth(auth_err) => return auth_err.into_response(),
            ApiError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, "INVALID_INPUT", msg),
            ApiError::NotAuthenticated(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHENTICATED", msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "internal server error".to_string(),
            ),
        };

        (status, Json(ErrorResponse { error: message, code })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn use_case_errors_map_to_status() {
        let cases = [
            (UseCaseError::InvalidArgument("Title cannot be empty".into()), StatusCode::BAD_REQUEST),
            (UseCaseError::NotAuthenticated, StatusCode::UNAUTHORIZED),
            (UseCaseError::Forbidden("no"), StatusCode::FORBIDDEN),
            (UseCaseError::NotFound("Event not found".into()), StatusCode::NOT_FOUND),
            (UseCaseError::Conflict("Event is at capacity".into()), StatusCode::CONFLICT),
            (UseCaseError::Storage("disk".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).into_response().status(), status);
        }
    }

    #[test]
    fn bearer_header_parsing() {
        let mut headers = HeaderMap::new();
        assert!(matches!(extract_auth_token(&headers), Err(AuthError::MissingHeader)));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert!(matches!(extract_auth_token(&headers), Err(AuthError::InvalidHeader)));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(extract_auth_token(&headers).unwrap(), "abc");
    }
}
