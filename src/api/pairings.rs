// Pairing and clutch endpoints

use super::{created, ok, ApiResult, AppState, CurrentUser};
use crate::entities::pairing::{
    self, AvailableParents, Clutch, ClutchInput, Pairing, PairingDetail, PairingFilter, PairingInput,
    PairingSummary,
};
use crate::entities::Page;
use crate::error::LoftError;
use axum::{
    extract::{Path, Query, State},
    response::Response,
    routing::{get, patch, post},
    Json, Router,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct EditingQuery {
    /// Pairing being edited; its own parents stay selectable
    pub editing: Option<i64>,
}

/// GET /api/pairings
async fn index(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(filter): Query<PairingFilter>,
) -> ApiResult<Page<PairingSummary>> {
    let conn = state.conn()?;
    ok(pairing::list(&conn, user.id(), &filter)?)
}

/// GET /api/pairings/available-parents
async fn available_parents(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(q): Query<EditingQuery>,
) -> ApiResult<AvailableParents> {
    let conn = state.conn()?;
    ok(pairing::available_parents(&conn, user.id(), q.editing)?)
}

/// POST /api/pairings
async fn store(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(input): Json<PairingInput>,
) -> Result<Response, LoftError> {
    let conn = state.conn()?;
    created(pairing::create(&conn, user.id(), &input)?)
}

/// GET /api/pairings/:id
async fn show(State(state): State<AppState>, user: CurrentUser, Path(id): Path<i64>) -> ApiResult<PairingDetail> {
    let conn = state.conn()?;
    ok(pairing::detail(&conn, user.id(), id)?)
}

/// PATCH /api/pairings/:id
async fn update(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(input): Json<PairingInput>,
) -> ApiResult<Pairing> {
    let conn = state.conn()?;
    ok(pairing::update(&conn, user.id(), id, &input)?)
}

/// DELETE /api/pairings/:id
async fn destroy(State(state): State<AppState>, user: CurrentUser, Path(id): Path<i64>) -> ApiResult<()> {
    let conn = state.conn()?;
    pairing::delete(&conn, user.id(), id)?;
    ok(())
}

/// POST /api/pairings/:id/end-session
async fn end_session(State(state): State<AppState>, user: CurrentUser, Path(id): Path<i64>) -> ApiResult<Pairing> {
    let conn = state.conn()?;
    ok(pairing::end_session(&conn, user.id(), id)?)
}

/// POST /api/pairings/:id/clutches
async fn store_clutch(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(input): Json<ClutchInput>,
) -> Result<Response, LoftError> {
    let conn = state.conn()?;
    created(pairing::create_clutch(&conn, user.id(), id, &input)?)
}

/// PATCH /api/pairings/:id/clutches/:clutch
async fn update_clutch(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((id, clutch)): Path<(i64, i64)>,
    Json(input): Json<ClutchInput>,
) -> ApiResult<Clutch> {
    let conn = state.conn()?;
    ok(pairing::update_clutch(&conn, user.id(), id, clutch, &input)?)
}

/// DELETE /api/pairings/:id/clutches/:clutch
async fn destroy_clutch(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((id, clutch)): Path<(i64, i64)>,
) -> ApiResult<()> {
    let conn = state.conn()?;
    pairing::delete_clutch(&conn, user.id(), id, clutch)?;
    ok(())
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/pairings", get(index).post(store))
        .route("/pairings/available-parents", get(available_parents))
        .route("/pairings/:id", get(show).patch(update).delete(destroy))
        .route("/pairings/:id/end-session", post(end_session))
        .route("/pairings/:id/clutches", post(store_clutch))
        .route("/pairings/:id/clutches/:clutch", patch(update_clutch).delete(destroy_clutch))
}
