use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::HeaderValue,
    middleware,
    routing::{delete, get, post, put},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer};

use time;

use crate::config::Config;
use crate::constants::uploads::PUBLIC_PREFIX;
use crate::db::Store;
use crate::services::{AuditService, AuthService, CsrfStore, SessionPolicy, UploadService};
use crate::state::SharedState;

pub mod albums;
pub mod audit;
pub mod auth;
pub mod content;
mod error;
mod observability;
pub mod public;
pub mod system;
mod types;

pub use error::ApiError;
pub use types::*;

use metrics_exporter_prometheus::PrometheusHandle;

#[derive(Clone)]
pub struct AppState {
    pub shared: Arc<SharedState>,

    pub start_time: std::time::Instant,

    pub prometheus_handle: Option<PrometheusHandle>,
}

impl AppState {
    #[must_use]
    pub fn config(&self) -> &Arc<Config> {
        &self.shared.config
    }

    #[must_use]
    pub fn store(&self) -> &Store {
        &self.shared.store
    }

    #[must_use]
    pub fn csrf(&self) -> &Arc<CsrfStore> {
        &self.shared.csrf
    }

    #[must_use]
    pub fn uploads(&self) -> &Arc<UploadService> {
        &self.shared.uploads
    }

    #[must_use]
    pub fn audit(&self) -> &Arc<AuditService> {
        &self.shared.audit
    }

    #[must_use]
    pub fn auth_service(&self) -> &Arc<AuthService> {
        &self.shared.auth
    }

    #[must_use]
    pub fn session_policy(&self) -> &SessionPolicy {
        &self.shared.session_policy
    }
}

pub async fn create_app_state(
    shared: Arc<SharedState>,
    prometheus_handle: Option<PrometheusHandle>,
) -> Arc<AppState> {
    Arc::new(AppState {
        shared,
        start_time: std::time::Instant::now(),
        prometheus_handle,
    })
}

pub async fn create_app_state_from_config(
    config: Config,
    prometheus_handle: Option<PrometheusHandle>,
) -> anyhow::Result<Arc<AppState>> {
    let shared = Arc::new(SharedState::new(config).await?);
    Ok(create_app_state(shared, prometheus_handle).await)
}

pub async fn router(state: Arc<AppState>) -> Router {
    let config = state.config();
    let cors_origins = config.server.cors_allowed_origins.clone();
    let upload_root = state.uploads().root().to_path_buf();
    let body_limit = config
        .uploads
        .max_document_bytes
        .max(config.uploads.max_image_bytes)
        .max(config.uploads.max_photo_bytes) as usize
        + 1024 * 1024;

    let session_store = MemoryStore::default();
    let session_layer = SessionManagerLayer::new(session_store)
        .with_secure(config.server.secure_cookies)
        .with_same_site(tower_sessions::cookie::SameSite::Lax)
        .with_http_only(true)
        // Persist (and re-emit the cookie for) a session even when the
        // handler only forced an id via save() without mutating data, e.g.
        // GET /api/auth/csrf establishing a fresh session.
        .with_always_save(true)
        // Layer-level backstop; the real inactivity handling lives in the
        // session middleware.
        .with_expiry(Expiry::OnInactivity(time::Duration::minutes(
            config.security.session.inactivity_minutes,
        )));

    let public_routes = Router::new()
        .route("/albums", get(public::list_albums))
        .route("/albums/{id}", get(public::get_album))
        .route("/albums/{id}/photos", get(public::list_album_photos))
        .route("/{kind}", get(public::list_content))
        .route("/{kind}/categories", get(public::list_categories))
        .route("/{kind}/{id}", get(public::get_content));

    let password_routes = Router::new()
        .route("/password", put(auth::change_password))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_csrf,
        ))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_session,
        ));

    let auth_routes = Router::new()
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/csrf", get(auth::get_csrf))
        .route("/status", get(auth::status))
        .merge(password_routes);

    let admin_routes = Router::new()
        .route(
            "/content/{kind}",
            get(content::list_content).post(content::create_content),
        )
        .route(
            "/content/{kind}/{id}",
            get(content::get_content)
                .put(content::update_content)
                .delete(content::delete_content),
        )
        .route(
            "/albums",
            get(albums::list_albums).post(albums::create_album),
        )
        .route(
            "/albums/{id}",
            put(albums::update_album).delete(albums::delete_album),
        )
        .route(
            "/albums/{id}/photos",
            get(albums::list_photos).post(albums::upload_photos),
        )
        .route("/albums/{id}/photos/order", put(albums::reorder_photos))
        .route("/albums/{id}/cover", put(albums::set_cover))
        .route("/photos/{id}", delete(albums::delete_photo))
        .route("/audit", get(audit::recent))
        .route("/system/status", get(system::get_status))
        .route("/metrics", get(observability::get_metrics))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_csrf,
        ))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_session,
        ));

    let api_router = Router::new()
        .nest("/public", public_routes)
        .nest("/auth", auth_routes)
        .nest("/admin", admin_routes)
        .layer(session_layer)
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state.clone());

    let cors_layer = if cors_origins.contains(&"*".to_string()) {
        CorsLayer::new().allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> =
            cors_origins.iter().filter_map(|s| s.parse().ok()).collect();
        CorsLayer::new().allow_origin(origins)
    };

    Router::new()
        .nest("/api", api_router)
        .nest_service(PUBLIC_PREFIX, ServeDir::new(upload_root))
        .layer(cors_layer.allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(
            observability::security_headers_middleware,
        ))
        .layer(middleware::from_fn(observability::logging_middleware))
}
