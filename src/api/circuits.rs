// Club and one-loft race endpoints
//
// One set of handlers mounted twice, under /clubs and /olr-races. The
// `Circuit` each mount serves reaches the handlers as a request extension.

use super::{created, ok, ApiResult, AppState, CurrentUser};
use crate::entities::circuit::{
    self, Circuit, EntryInput, Organization, OrganizationDetail, OrganizationInput, RaceDetail,
    RaceInput, RaceResult, ResultInput, Season, SeasonDetail, SeasonEntry, SeasonInput, SeasonRace,
};
use crate::error::LoftError;
use axum::{
    extract::{Path, State},
    response::Response,
    routing::{get, patch, post},
    Extension, Json, Router,
};
use serde::Serialize;

#[derive(Serialize)]
pub struct EntriesAdded {
    pub added: usize,
}

// ============================================================================
// Organizations
// ============================================================================

async fn index(
    State(state): State<AppState>,
    Extension(c): Extension<Circuit>,
    user: CurrentUser,
) -> ApiResult<Vec<Organization>> {
    let conn = state.conn()?;
    ok(circuit::list_organizations(&conn, c, user.id())?)
}

async fn store(
    State(state): State<AppState>,
    Extension(c): Extension<Circuit>,
    user: CurrentUser,
    Json(input): Json<OrganizationInput>,
) -> Result<Response, LoftError> {
    let conn = state.conn()?;
    created(circuit::create_organization(&conn, c, user.id(), &input)?)
}

async fn show(
    State(state): State<AppState>,
    Extension(c): Extension<Circuit>,
    user: CurrentUser,
    Path(org): Path<i64>,
) -> ApiResult<OrganizationDetail> {
    let conn = state.conn()?;
    ok(circuit::organization_detail(&conn, c, user.id(), org)?)
}

async fn update(
    State(state): State<AppState>,
    Extension(c): Extension<Circuit>,
    user: CurrentUser,
    Path(org): Path<i64>,
    Json(input): Json<OrganizationInput>,
) -> ApiResult<Organization> {
    let conn = state.conn()?;
    ok(circuit::update_organization(&conn, c, user.id(), org, &input)?)
}

async fn destroy(
    State(state): State<AppState>,
    Extension(c): Extension<Circuit>,
    user: CurrentUser,
    Path(org): Path<i64>,
) -> ApiResult<()> {
    let conn = state.conn()?;
    circuit::delete_organization(&conn, c, user.id(), org)?;
    ok(())
}

// ============================================================================
// Seasons
// ============================================================================

async fn store_season(
    State(state): State<AppState>,
    Extension(c): Extension<Circuit>,
    user: CurrentUser,
    Path(org): Path<i64>,
    Json(input): Json<SeasonInput>,
) -> Result<Response, LoftError> {
    let conn = state.conn()?;
    created(circuit::create_season(&conn, c, user.id(), org, &input)?)
}

async fn show_season(
    State(state): State<AppState>,
    Extension(c): Extension<Circuit>,
    user: CurrentUser,
    Path((org, season)): Path<(i64, i64)>,
) -> ApiResult<SeasonDetail> {
    let conn = state.conn()?;
    ok(circuit::season_detail(&conn, c, user.id(), org, season)?)
}

async fn update_season(
    State(state): State<AppState>,
    Extension(c): Extension<Circuit>,
    user: CurrentUser,
    Path((org, season)): Path<(i64, i64)>,
    Json(input): Json<SeasonInput>,
) -> ApiResult<Season> {
    let conn = state.conn()?;
    ok(circuit::update_season(&conn, c, user.id(), org, season, &input)?)
}

async fn destroy_season(
    State(state): State<AppState>,
    Extension(c): Extension<Circuit>,
    user: CurrentUser,
    Path((org, season)): Path<(i64, i64)>,
) -> ApiResult<()> {
    let conn = state.conn()?;
    circuit::delete_season(&conn, c, user.id(), org, season)?;
    ok(())
}

// ============================================================================
// Entries
// ============================================================================

async fn store_entry(
    State(state): State<AppState>,
    Extension(c): Extension<Circuit>,
    user: CurrentUser,
    Path((org, season)): Path<(i64, i64)>,
    Json(input): Json<EntryInput>,
) -> Result<Response, LoftError> {
    let conn = state.conn()?;
    created(circuit::add_entry(&conn, c, user.id(), org, season, &input)?)
}

async fn update_entry(
    State(state): State<AppState>,
    Extension(c): Extension<Circuit>,
    user: CurrentUser,
    Path((org, season, pigeon)): Path<(i64, i64, i64)>,
    Json(input): Json<EntryInput>,
) -> ApiResult<SeasonEntry> {
    let conn = state.conn()?;
    ok(circuit::update_entry(&conn, c, user.id(), org, season, pigeon, &input)?)
}

async fn destroy_entry(
    State(state): State<AppState>,
    Extension(c): Extension<Circuit>,
    user: CurrentUser,
    Path((org, season, pigeon)): Path<(i64, i64, i64)>,
) -> ApiResult<()> {
    let conn = state.conn()?;
    circuit::remove_entry(&conn, c, user.id(), org, season, pigeon)?;
    ok(())
}

// ============================================================================
// Races
// ============================================================================

async fn store_race(
    State(state): State<AppState>,
    Extension(c): Extension<Circuit>,
    user: CurrentUser,
    Path((org, season)): Path<(i64, i64)>,
    Json(input): Json<RaceInput>,
) -> Result<Response, LoftError> {
    let conn = state.conn()?;
    created(circuit::create_race(&conn, c, user.id(), org, season, &input)?)
}

async fn show_race(
    State(state): State<AppState>,
    Extension(c): Extension<Circuit>,
    user: CurrentUser,
    Path((org, season, race)): Path<(i64, i64, i64)>,
) -> ApiResult<RaceDetail> {
    let conn = state.conn()?;
    ok(circuit::race_detail(&conn, c, user.id(), org, season, race)?)
}

async fn update_race(
    State(state): State<AppState>,
    Extension(c): Extension<Circuit>,
    user: CurrentUser,
    Path((org, season, race)): Path<(i64, i64, i64)>,
    Json(input): Json<RaceInput>,
) -> ApiResult<SeasonRace> {
    let conn = state.conn()?;
    ok(circuit::update_race(&conn, c, user.id(), org, season, race, &input)?)
}

async fn destroy_race(
    State(state): State<AppState>,
    Extension(c): Extension<Circuit>,
    user: CurrentUser,
    Path((org, season, race)): Path<(i64, i64, i64)>,
) -> ApiResult<()> {
    let conn = state.conn()?;
    circuit::delete_race(&conn, c, user.id(), org, season, race)?;
    ok(())
}

// ============================================================================
// Results
// ============================================================================

async fn store_result(
    State(state): State<AppState>,
    Extension(c): Extension<Circuit>,
    user: CurrentUser,
    Path((org, season, race)): Path<(i64, i64, i64)>,
    Json(input): Json<ResultInput>,
) -> Result<Response, LoftError> {
    let conn = state.conn()?;
    created(circuit::add_result(&conn, c, user.id(), org, season, race, &input)?)
}

async fn update_result(
    State(state): State<AppState>,
    Extension(c): Extension<Circuit>,
    user: CurrentUser,
    Path((org, season, race, pigeon)): Path<(i64, i64, i64, i64)>,
    Json(input): Json<ResultInput>,
) -> ApiResult<RaceResult> {
    let conn = state.conn()?;
    ok(circuit::update_result(&conn, c, user.id(), org, season, race, pigeon, &input)?)
}

async fn destroy_result(
    State(state): State<AppState>,
    Extension(c): Extension<Circuit>,
    user: CurrentUser,
    Path((org, season, race, pigeon)): Path<(i64, i64, i64, i64)>,
) -> ApiResult<()> {
    let conn = state.conn()?;
    circuit::remove_result(&conn, c, user.id(), org, season, race, pigeon)?;
    ok(())
}

async fn add_all_entries(
    State(state): State<AppState>,
    Extension(c): Extension<Circuit>,
    user: CurrentUser,
    Path((org, season, race)): Path<(i64, i64, i64)>,
) -> ApiResult<EntriesAdded> {
    let conn = state.conn()?;
    let added = circuit::add_all_entries(&conn, c, user.id(), org, season, race)?;
    ok(EntriesAdded { added })
}

fn circuit_routes(c: Circuit) -> Router<AppState> {
    Router::new()
        .route("/", get(index).post(store))
        .route("/:org", get(show).patch(update).delete(destroy))
        .route("/:org/seasons", post(store_season))
        .route(
            "/:org/seasons/:season",
            get(show_season).patch(update_season).delete(destroy_season),
        )
        .route("/:org/seasons/:season/entries", post(store_entry))
        .route(
            "/:org/seasons/:season/entries/:pigeon",
            patch(update_entry).delete(destroy_entry),
        )
        .route("/:org/seasons/:season/races", post(store_race))
        .route(
            "/:org/seasons/:season/races/:race",
            get(show_race).patch(update_race).delete(destroy_race),
        )
        .route("/:org/seasons/:season/races/:race/results", post(store_result))
        .route(
            "/:org/seasons/:season/races/:race/results/:pigeon",
            patch(update_result).delete(destroy_result),
        )
        .route(
            "/:org/seasons/:season/races/:race/add-all-entries",
            post(add_all_entries),
        )
        .layer(Extension(c))
}

pub fn routes() -> Router<AppState> {
    Circuit::ALL.iter().fold(Router::new(), |router, c| {
        router.nest(&format!("/{}", c.route_prefix()), circuit_routes(*c))
    })
}
