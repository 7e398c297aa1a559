//! Cashbacker Web Server
//!
//! Axum-based REST API for the cashbacker engine.
//!
//! Security features:
//! - API key authentication (secure by default, use --no-auth for local dev)
//! - Restrictive CORS policy
//! - Audit logging for every mutating call
//! - Sanitized error responses

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::{cors::CorsLayer, set_header::SetResponseHeaderLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use cashbacker_core::external::{AccountDirectory, TransactionSource};
use cashbacker_core::{AccountOnboarding, AppConfig, CashbackEngine, Database, Error as CoreError};

mod handlers;
mod scheduler;

pub use scheduler::{start_sync_scheduler, SyncScheduleConfig};

/// Maximum pagination limit
pub const MAX_PAGE_LIMIT: i64 = 1000;

/// Authorization header for API key auth
const AUTHORIZATION_HEADER: &str = "authorization";

/// Environment variable holding comma-separated API keys
pub const API_KEYS_ENV: &str = "CASHBACKER_API_KEYS";

/// Server configuration
#[derive(Clone)]
pub struct ServerConfig {
    /// Whether authentication is required (secure by default)
    pub require_auth: bool,
    /// Allowed CORS origins (empty = same-origin only)
    pub allowed_origins: Vec<String>,
    /// Accepted keys, sent as "Bearer <key>" in the Authorization header
    pub api_keys: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            require_auth: true,
            allowed_origins: vec![],
            api_keys: vec![],
        }
    }
}

impl ServerConfig {
    /// Read API keys from `CASHBACKER_API_KEYS`
    pub fn with_env_api_keys(mut self) -> Self {
        if let Ok(keys) = std::env::var(API_KEYS_ENV) {
            self.api_keys = parse_api_keys(&keys);
        }
        self
    }
}

/// Split a comma-separated key list, dropping blanks
pub fn parse_api_keys(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(String::from)
        .collect()
}

/// Shared application state
pub struct AppState {
    pub db: Database,
    pub engine: CashbackEngine,
    pub onboarding: AccountOnboarding,
    pub config: ServerConfig,
}

impl AppState {
    /// Build the engine and onboarding from the application config
    ///
    /// `directory` is optional: without it users are created without
    /// discovering their accounts.
    pub fn from_config(
        db: Database,
        app_config: &AppConfig,
        source: Arc<dyn TransactionSource>,
        directory: Option<Arc<dyn AccountDirectory>>,
        config: ServerConfig,
    ) -> anyhow::Result<Self> {
        let engine = CashbackEngine::from_config(db.clone(), app_config, source)?;
        let onboarding = AccountOnboarding::new(db.clone(), directory, app_config.sync.timeout());
        Ok(Self {
            db,
            engine,
            onboarding,
            config,
        })
    }
}

/// Authentication middleware - validates the bearer API key
///
/// Keys are compared in constant time.
async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    if !state.config.require_auth {
        return next.run(request).await;
    }

    let api_key_valid = request
        .headers()
        .get(AUTHORIZATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|auth| auth.strip_prefix("Bearer "))
        .map(|key| validate_api_key(key, &state.config.api_keys))
        .unwrap_or(false);

    if api_key_valid {
        return next.run(request).await;
    }

    warn!(path = %request.uri().path(), "Unauthorized request - no valid API key");
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({
            "error": "Authentication required"
        })),
    )
        .into_response()
}

/// Validate an API key against the configured keys using constant-time comparison
fn validate_api_key(provided: &str, valid_keys: &[String]) -> bool {
    use subtle::ConstantTimeEq;

    let provided_bytes = provided.as_bytes();
    valid_keys.iter().any(|key| {
        let key_bytes = key.as_bytes();
        provided_bytes.len() == key_bytes.len() && bool::from(provided_bytes.ct_eq(key_bytes))
    })
}

/// Actor recorded in the audit log: "api-key" for authenticated calls, "local-dev" otherwise
pub fn get_actor(headers: &HeaderMap) -> String {
    if headers
        .get(AUTHORIZATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|auth| auth.strip_prefix("Bearer "))
        .is_some()
    {
        return "api-key".to_string();
    }

    "local-dev".to_string()
}

/// Success response
#[derive(Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let config = state.config.clone();
    let state = Arc::new(state);

    let api_routes = Router::new()
        // Users
        .route("/users", post(handlers::register_user))
        .route("/users/:id/accounts", get(handlers::user_accounts))
        .route("/users/:id/sync", post(handlers::sync_user))
        .route("/users/:id/transactions", get(handlers::user_transactions))
        // Spending limits
        .route(
            "/users/:id/limits",
            get(handlers::list_limits).put(handlers::set_limit),
        )
        .route("/users/:id/limits/report", get(handlers::limit_report))
        .route("/users/:id/limits/:category", delete(handlers::delete_limit))
        // Accounts
        .route("/accounts", post(handlers::create_account))
        .route("/accounts/:id", get(handlers::get_account))
        .route("/accounts/:id/sync", post(handlers::sync_account))
        // Cashback
        .route(
            "/accounts/:id/cashback",
            get(handlers::get_cashback).delete(handlers::reset_cashback),
        )
        .route(
            "/accounts/:id/cashback/propose",
            post(handlers::propose_cashback),
        )
        .route(
            "/accounts/:id/cashback/choose",
            post(handlers::choose_cashback),
        )
        // Catalog and audit
        .route("/categories", get(handlers::list_categories))
        .route("/audit", get(handlers::list_audit_log));

    let cors = if config.allowed_origins.is_empty() {
        CorsLayer::new()
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
    } else {
        let origins: Vec<HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
    };

    Router::new()
        .nest("/api", api_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
}

/// Start the server
pub async fn serve(state: AppState, host: &str, port: u16) -> anyhow::Result<()> {
    if !state.config.require_auth {
        warn!("Authentication disabled - do not expose to network!");
    } else if state.config.api_keys.is_empty() {
        warn!(
            "No API keys configured (set {}); every request will be rejected",
            API_KEYS_ENV
        );
    }

    if let Some(schedule) = SyncScheduleConfig::from_env() {
        start_sync_scheduler(state.db.clone(), state.engine.sync_pipeline().clone(), schedule);
    }

    let app = create_router(state);
    let addr = format!("{}:{}", host, port);

    info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// Error Handling
// ============================================================================

/// Application error type with proper HTTP status codes
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
    internal: Option<anyhow::Error>,
}

impl AppError {
    pub fn bad_request(msg: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn not_found(msg: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    fn from_core(err: &CoreError) -> Option<Self> {
        let status = match err {
            CoreError::AccountNotFound(_) | CoreError::UserNotFound(_) => StatusCode::NOT_FOUND,
            CoreError::AccountNotEligible { .. } | CoreError::InvalidData(_) => {
                StatusCode::BAD_REQUEST
            }
            CoreError::CashbackAlreadyCommitted { .. } => StatusCode::CONFLICT,
            CoreError::SelectionMismatch(_) => StatusCode::UNPROCESSABLE_ENTITY,
            e if e.is_transient() => StatusCode::SERVICE_UNAVAILABLE,
            _ => return None,
        };
        Some(Self {
            status,
            message: err.to_string(),
            internal: None,
        })
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let Some(err) = &self.internal {
            error!(error = %err, "Internal error");
        }

        let body = Json(serde_json::json!({
            "error": self.message
        }));

        (self.status, body).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        let err = err.into();
        if let Some(mapped) = err.downcast_ref::<CoreError>().and_then(Self::from_core) {
            if mapped.status == StatusCode::SERVICE_UNAVAILABLE {
                warn!(error = %err, "Collaborator unavailable");
            }
            return mapped;
        }
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "An internal error occurred".to_string(),
            internal: Some(err),
        }
    }
}
