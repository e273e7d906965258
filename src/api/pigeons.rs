// Pigeon endpoints: CRUD, pickers, pedigree and ring-number checks

use super::{created, ok, ApiResult, AppState, CurrentUser};
use crate::entities::pigeon::{self, ParentOptions, PigeonFilter, PigeonInput, PigeonSummary, PigeonView};
use crate::entities::Page;
use crate::error::LoftError;
use crate::pedigree::PedigreeNode;
use crate::ring_match::RingCheck;
use axum::{
    extract::{Path, Query, State},
    response::Response,
    routing::get,
    Json, Router,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct ExcludeQuery {
    pub exclude: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct RingQuery {
    pub ring_number: Option<String>,
    pub exclude_id: Option<i64>,
}

/// GET /api/pigeons
async fn index(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(filter): Query<PigeonFilter>,
) -> ApiResult<Page<PigeonView>> {
    let conn = state.conn()?;
    ok(pigeon::list(&conn, user.id(), &filter)?)
}

/// POST /api/pigeons
async fn store(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(input): Json<PigeonInput>,
) -> Result<Response, LoftError> {
    let conn = state.conn()?;
    let created_pigeon = pigeon::create(&conn, user.id(), &input)?;
    created(pigeon::view(&conn, created_pigeon)?)
}

/// GET /api/pigeons/:id
async fn show(State(state): State<AppState>, user: CurrentUser, Path(id): Path<i64>) -> ApiResult<PigeonView> {
    let conn = state.conn()?;
    ok(pigeon::get_view(&conn, user.id(), id)?)
}

/// PATCH /api/pigeons/:id
async fn update(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(input): Json<PigeonInput>,
) -> ApiResult<PigeonView> {
    let conn = state.conn()?;
    let updated = pigeon::update(&conn, user.id(), id, &input)?;
    ok(pigeon::view(&conn, updated)?)
}

/// DELETE /api/pigeons/:id
async fn destroy(State(state): State<AppState>, user: CurrentUser, Path(id): Path<i64>) -> ApiResult<()> {
    let conn = state.conn()?;
    pigeon::delete(&conn, user.id(), id)?;
    ok(())
}

/// GET /api/pigeons/:id/pedigree
async fn pedigree(State(state): State<AppState>, user: CurrentUser, Path(id): Path<i64>) -> ApiResult<PedigreeNode> {
    let conn = state.conn()?;
    ok(pigeon::pedigree(&conn, user.id(), id)?)
}

/// GET /api/pigeons/parent-options?exclude=
async fn parent_options(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(q): Query<ExcludeQuery>,
) -> ApiResult<ParentOptions> {
    let conn = state.conn()?;
    ok(pigeon::parent_options(&conn, user.id(), q.exclude)?)
}

/// GET /api/pigeons/colors
async fn colors(State(state): State<AppState>, user: CurrentUser) -> ApiResult<Vec<String>> {
    let conn = state.conn()?;
    ok(pigeon::colors(&conn, user.id())?)
}

/// GET /api/pigeons/check-ring?ring_number=&exclude_id=
async fn check_ring(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(q): Query<RingQuery>,
) -> ApiResult<RingCheck<PigeonSummary>> {
    let conn = state.conn()?;
    let ring = q.ring_number.unwrap_or_default();
    ok(pigeon::check_ring_number(&conn, user.id(), &ring, q.exclude_id)?)
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/pigeons", get(index).post(store))
        .route("/pigeons/parent-options", get(parent_options))
        .route("/pigeons/colors", get(colors))
        .route("/pigeons/check-ring", get(check_ring))
        .route("/pigeons/:id", get(show).patch(update).delete(destroy))
        .route("/pigeons/:id/pedigree", get(pedigree))
}
