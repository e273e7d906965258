// 🌐 HTTP API - JSON endpoints over the record store
//
// Every response is wrapped as {success, data} or {success: false, error, errors?}.
// The caller is identified by the `x-user-id` header, set by the proxy in
// front of the server after it has authenticated the user.

pub mod circuits;
pub mod lookups;
pub mod pairings;
pub mod pigeons;
pub mod sales;

use crate::entities::{pigeon, sale, user, User};
use crate::error::{LoftError, ValidationErrors};
use axum::{
    async_trait,
    extract::{FromRequestParts, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use rusqlite::Connection;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use tower_http::trace::TraceLayer;

/// Header carrying the authenticated user's id
pub const USER_HEADER: &str = "x-user-id";

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Mutex<Connection>>,
}

impl AppState {
    pub fn new(conn: Connection) -> Self {
        Self {
            db: Arc::new(Mutex::new(conn)),
        }
    }

    pub fn conn(&self) -> crate::error::Result<MutexGuard<'_, Connection>> {
        self.db
            .lock()
            .map_err(|_| LoftError::Internal("database lock poisoned".to_string()))
    }
}

/// API Response wrapper
#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<ValidationErrors>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            errors: None,
        }
    }
}

impl ApiResponse<()> {
    fn failure(error: String, errors: Option<ValidationErrors>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
            errors,
        }
    }
}

pub type ApiResult<T> = Result<Json<ApiResponse<T>>, LoftError>;

pub(crate) fn ok<T>(data: T) -> ApiResult<T> {
    Ok(Json(ApiResponse::ok(data)))
}

/// 201 with the created record
pub(crate) fn created<T: Serialize>(data: T) -> Result<Response, LoftError> {
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(data))).into_response())
}

impl IntoResponse for LoftError {
    fn into_response(self) -> Response {
        let status = match &self {
            LoftError::NotFound(_) => StatusCode::NOT_FOUND,
            LoftError::Forbidden => StatusCode::FORBIDDEN,
            LoftError::Unauthorized => StatusCode::UNAUTHORIZED,
            LoftError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            LoftError::Conflict(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = match self {
            LoftError::Validation(errors) => {
                ApiResponse::failure("The given data was invalid.".to_string(), Some(errors))
            }
            e if status == StatusCode::INTERNAL_SERVER_ERROR => {
                tracing::error!(error = %e, "request failed");
                ApiResponse::failure("Internal server error".to_string(), None)
            }
            e => ApiResponse::failure(e.to_string(), None),
        };
        (status, Json(body)).into_response()
    }
}

// ============================================================================
// Identity
// ============================================================================

/// The user named by the `x-user-id` header (401 when missing or unknown)
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

impl CurrentUser {
    pub fn id(&self) -> i64 {
        self.0.id
    }
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = LoftError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let id: i64 = parts
            .headers
            .get(USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok())
            .ok_or(LoftError::Unauthorized)?;

        let conn = state.conn()?;
        user::get_user(&conn, id)?
            .map(CurrentUser)
            .ok_or(LoftError::Unauthorized)
    }
}

// ============================================================================
// Router
// ============================================================================

#[derive(Serialize)]
struct Health {
    status: &'static str,
    version: &'static str,
}

/// GET /api/health
async fn health() -> ApiResult<Health> {
    ok(Health {
        status: "ok",
        version: crate::VERSION,
    })
}

/// GET /api/dashboard
async fn dashboard(State(state): State<AppState>, user: CurrentUser) -> ApiResult<pigeon::Dashboard> {
    let conn = state.conn()?;
    ok(pigeon::dashboard(&conn, user.id())?)
}

/// GET /api/marketplace (public)
async fn marketplace(State(state): State<AppState>) -> ApiResult<Vec<sale::Listing>> {
    let conn = state.conn()?;
    ok(sale::marketplace(&conn)?)
}

/// Every `/api` route, with request tracing
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/health", get(health))
        .route("/dashboard", get(dashboard))
        .route("/marketplace", get(marketplace))
        .merge(pigeons::routes())
        .merge(lookups::routes())
        .merge(pairings::routes())
        .merge(sales::routes())
        .merge(circuits::routes());

    Router::new()
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
