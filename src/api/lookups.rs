// Bloodline and color tag endpoints

use super::{created, ok, ApiResult, AppState, CurrentUser};
use crate::entities::{bloodline, color_tag, Bloodline, ColorTag, ColorTagInput};
use crate::error::LoftError;
use axum::{
    extract::{Path, Query, State},
    response::Response,
    routing::{get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Deserialize)]
pub struct NameInput {
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
}

#[derive(Serialize)]
pub struct GetOrCreated {
    pub bloodline: Bloodline,
    pub created: bool,
}

#[derive(Serialize)]
pub struct TagRemoved {
    pub pigeons_affected: i64,
}

// ============================================================================
// Bloodlines
// ============================================================================

/// GET /api/bloodlines
async fn bloodlines(State(state): State<AppState>, user: CurrentUser) -> ApiResult<Vec<Bloodline>> {
    let conn = state.conn()?;
    ok(bloodline::list(&conn, user.id())?)
}

/// GET /api/bloodlines/search?q=
async fn search_bloodlines(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(q): Query<SearchQuery>,
) -> ApiResult<Vec<Bloodline>> {
    let conn = state.conn()?;
    ok(bloodline::search(&conn, user.id(), q.q.as_deref().unwrap_or(""))?)
}

/// POST /api/bloodlines
async fn create_bloodline(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(input): Json<NameInput>,
) -> Result<Response, LoftError> {
    let conn = state.conn()?;
    created(bloodline::create(&conn, user.id(), input.name.as_deref())?)
}

/// POST /api/bloodlines/get-or-create
async fn get_or_create_bloodline(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(input): Json<NameInput>,
) -> ApiResult<GetOrCreated> {
    let conn = state.conn()?;
    let (bloodline, created) = bloodline::get_or_create(&conn, user.id(), input.name.as_deref())?;
    ok(GetOrCreated { bloodline, created })
}

/// PATCH /api/bloodlines/:id
async fn update_bloodline(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(input): Json<NameInput>,
) -> ApiResult<Bloodline> {
    let conn = state.conn()?;
    ok(bloodline::update(&conn, user.id(), id, input.name.as_deref())?)
}

/// DELETE /api/bloodlines/:id
async fn delete_bloodline(State(state): State<AppState>, user: CurrentUser, Path(id): Path<i64>) -> ApiResult<()> {
    let conn = state.conn()?;
    bloodline::delete(&conn, user.id(), id)?;
    ok(())
}

// ============================================================================
// Color tags
// ============================================================================

/// GET /api/color-tags
async fn color_tags(State(state): State<AppState>, user: CurrentUser) -> ApiResult<Vec<ColorTag>> {
    let conn = state.conn()?;
    ok(color_tag::list(&conn, user.id())?)
}

/// POST /api/color-tags
async fn create_color_tag(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(input): Json<ColorTagInput>,
) -> Result<Response, LoftError> {
    let conn = state.conn()?;
    created(color_tag::create(&conn, user.id(), &input)?)
}

/// PATCH /api/color-tags/:id
async fn update_color_tag(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(input): Json<ColorTagInput>,
) -> ApiResult<ColorTag> {
    let conn = state.conn()?;
    ok(color_tag::update(&conn, user.id(), id, &input)?)
}

/// DELETE /api/color-tags/:id
async fn delete_color_tag(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> ApiResult<TagRemoved> {
    let conn = state.conn()?;
    let pigeons_affected = color_tag::delete(&conn, user.id(), id)?;
    ok(TagRemoved { pigeons_affected })
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/bloodlines", get(bloodlines).post(create_bloodline))
        .route("/bloodlines/search", get(search_bloodlines))
        .route("/bloodlines/get-or-create", post(get_or_create_bloodline))
        .route("/bloodlines/:id", patch(update_bloodline).delete(delete_bloodline))
        .route("/color-tags", get(color_tags).post(create_color_tag))
        .route("/color-tags/:id", patch(update_color_tag).delete(delete_color_tag))
}
