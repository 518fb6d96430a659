use axum::{
    Json,
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{HeaderMap, Method, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_sessions::Session;

use super::{ApiError, ApiResponse, AppState, UserSummary};
use crate::services::csrf::CsrfError;
use crate::services::session::{self, SESSION_RECORD_KEY, SessionRecord};
use crate::services::{AuditContext, AuthError};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub remember: bool,
    #[serde(default)]
    pub csrf_token: Option<String>,
}

#[derive(Serialize)]
pub struct CsrfResponse {
    pub csrf_token: String,
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserSummary>,
}

#[derive(Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Authenticated identity attached to the request by [`require_session`].
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user_id: i32,
    pub username: String,
    pub role: String,
}

// ============================================================================
// Request metadata helpers
// ============================================================================

/// Peer address as seen by the listener; "unknown" when the transport does
/// not expose one (e.g. in-process test calls).
pub fn client_ip(request: &Request) -> String {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map_or_else(|| "unknown".to_string(), |info| info.0.ip().to_string())
}

pub fn user_agent(headers: &HeaderMap) -> String {
    headers
        .get("user-agent")
        .and_then(|h| h.to_str().ok())
        .unwrap_or("unknown")
        .to_string()
}

/// Infallible extractor for the peer address, usable alongside
/// body-consuming extractors.
pub struct ClientIp(pub String);

impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map_or_else(|| "unknown".to_string(), |info| info.0.ip().to_string()),
        ))
    }
}

// ============================================================================
// Middleware
// ============================================================================

/// Session gate for the admin surface. Validates the stored record
/// (inactivity, address binding, rotation) and attaches [`CurrentUser`] to
/// the request.
pub async fn require_session(
    State(state): State<Arc<AppState>>,
    session: Session,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let peer = client_ip(&request);

    let record = session::authenticate(&session, state.session_policy(), &peer).await?;

    tracing::Span::current().record("user_id", record.username.as_str());

    request.extensions_mut().insert(CurrentUser {
        user_id: record.user_id,
        username: record.username,
        role: record.role,
    });

    Ok(next.run(request).await)
}

/// Anti-forgery gate; safe methods pass through, everything else must carry
/// a valid `X-Csrf-Token` bound to the caller's session.
pub async fn require_csrf(
    State(state): State<Arc<AppState>>,
    session: Session,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let mutating = !matches!(
        *request.method(),
        Method::GET | Method::HEAD | Method::OPTIONS
    );

    if mutating {
        let token = request
            .headers()
            .get("x-csrf-token")
            .and_then(|h| h.to_str().ok())
            .ok_or(ApiError::Csrf(CsrfError::Missing))?;

        let session_id = session
            .id()
            .map(|id| id.to_string())
            .ok_or(ApiError::Csrf(CsrfError::Missing))?;

        state.csrf().validate(&session_id, token)?;
    }

    Ok(next.run(request).await)
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/auth/csrf
/// Issue (or re-issue) the anti-forgery token bound to this session.
pub async fn get_csrf(
    State(state): State<Arc<AppState>>,
    session: Session,
) -> Result<Json<ApiResponse<CsrfResponse>>, ApiError> {
    // A brand-new session has no identifier until first persisted; the
    // token must bind to a stable id, so force the save.
    if session.id().is_none() {
        session
            .save()
            .await
            .map_err(|e| ApiError::internal(format!("Failed to persist session: {e}")))?;
    }

    let session_id = session
        .id()
        .ok_or_else(|| ApiError::internal("Session has no identifier after save"))?;

    let csrf_token = state.csrf().issue(&session_id.to_string());

    Ok(Json(ApiResponse::success(CsrfResponse { csrf_token })))
}

/// POST /api/auth/login
/// Full login flow: CSRF check, lockout check, credential verification,
/// session establishment.
pub async fn login(
    State(state): State<Arc<AppState>>,
    ClientIp(peer): ClientIp,
    headers: HeaderMap,
    session: Session,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<ApiResponse<UserSummary>>, ApiError> {
    if payload.username.is_empty() {
        return Err(ApiError::validation("Username is required"));
    }
    if payload.password.is_empty() {
        return Err(ApiError::validation("Password is required"));
    }

    // Login is itself a mutating request: the token from GET /api/auth/csrf
    // must accompany it, in the body or the header.
    let token = payload
        .csrf_token
        .as_deref()
        .or_else(|| headers.get("x-csrf-token").and_then(|h| h.to_str().ok()))
        .ok_or(ApiError::Csrf(CsrfError::Missing))?;

    let session_id = session
        .id()
        .map(|id| id.to_string())
        .ok_or(ApiError::Csrf(CsrfError::Missing))?;

    state.csrf().validate(&session_id, token)?;

    let meta = AuditContext::anonymous(peer.clone(), user_agent(&headers));

    let user = state
        .auth_service()
        .login(&payload.username, &payload.password, &meta)
        .await?;

    session::establish(&session, &user, payload.remember, &peer, state.session_policy()).await?;

    Ok(Json(ApiResponse::success(UserSummary::from(user))))
}

/// POST /api/auth/logout
/// Tear down the caller's session. Idempotent; an anonymous call succeeds.
pub async fn logout(
    State(state): State<Arc<AppState>>,
    ClientIp(peer): ClientIp,
    headers: HeaderMap,
    session: Session,
) -> impl IntoResponse {
    let record: Option<SessionRecord> = session.get(SESSION_RECORD_KEY).await.unwrap_or(None);

    session::destroy(&session).await;

    if let Some(record) = record {
        let meta = AuditContext {
            actor: Some(record.username),
            ip: peer,
            user_agent: user_agent(&headers),
        };
        state
            .audit()
            .record(&meta, "logout", "users", Some(i64::from(record.user_id)), None)
            .await;
    }

    Json(ApiResponse::success(MessageResponse {
        message: "Logged out".to_string(),
    }))
}

/// GET /api/auth/status
/// Current session's user, or anonymous. Never an error: a stale or
/// hijack-suspect session is invalidated and reported as anonymous.
pub async fn status(
    State(state): State<Arc<AppState>>,
    ClientIp(peer): ClientIp,
    session: Session,
) -> Result<Json<ApiResponse<StatusResponse>>, ApiError> {
    match session::authenticate(&session, state.session_policy(), &peer).await {
        Ok(record) => {
            let user = state
                .store()
                .get_user_by_id(record.user_id)
                .await
                .map_err(|e| ApiError::DatabaseError(e.to_string()))?
                .map(UserSummary::from);

            Ok(Json(ApiResponse::success(StatusResponse {
                authenticated: user.is_some(),
                user,
            })))
        }
        Err(
            AuthError::NotLoggedIn | AuthError::SessionExpired | AuthError::SecurityViolation,
        ) => Ok(Json(ApiResponse::success(StatusResponse {
            authenticated: false,
            user: None,
        }))),
        Err(err) => Err(err.into()),
    }
}

/// PUT /api/auth/password
/// Change the caller's own password (session + CSRF guarded).
pub async fn change_password(
    State(state): State<Arc<AppState>>,
    ClientIp(peer): ClientIp,
    headers: HeaderMap,
    axum::Extension(current): axum::Extension<CurrentUser>,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    state
        .auth_service()
        .change_password(
            &current.username,
            &payload.current_password,
            &payload.new_password,
        )
        .await?;

    let meta = AuditContext {
        actor: Some(current.username.clone()),
        ip: peer,
        user_agent: user_agent(&headers),
    };
    state
        .audit()
        .record(
            &meta,
            "password_changed",
            "users",
            Some(i64::from(current.user_id)),
            None,
        )
        .await;

    Ok(Json(ApiResponse::success(MessageResponse {
        message: "Password updated successfully".to_string(),
    })))
}
