// Sale listing endpoints (the public marketplace lives in the root router)

use super::{created, ok, ApiResult, AppState, CurrentUser};
use crate::entities::sale::{self, Sale, SaleInput, SalesIndex};
use crate::error::LoftError;
use axum::{
    extract::{Path, State},
    response::Response,
    routing::{delete, get, post},
    Json, Router,
};

/// GET /api/sales
async fn index(State(state): State<AppState>, user: CurrentUser) -> ApiResult<SalesIndex> {
    let conn = state.conn()?;
    ok(sale::index(&conn, user.id())?)
}

/// POST /api/sales
async fn store(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(input): Json<SaleInput>,
) -> Result<Response, LoftError> {
    let conn = state.conn()?;
    created(sale::create(&conn, user.id(), &input)?)
}

/// DELETE /api/sales/:id
async fn destroy(State(state): State<AppState>, user: CurrentUser, Path(id): Path<i64>) -> ApiResult<()> {
    let conn = state.conn()?;
    sale::delete(&conn, user.id(), id)?;
    ok(())
}

/// POST /api/sales/:id/sold
async fn sold(State(state): State<AppState>, user: CurrentUser, Path(id): Path<i64>) -> ApiResult<Sale> {
    let conn = state.conn()?;
    ok(sale::mark_sold(&conn, user.id(), id)?)
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/sales", get(index).post(store))
        .route("/sales/:id", delete(destroy))
        .route("/sales/:id/sold", post(sold))
}
