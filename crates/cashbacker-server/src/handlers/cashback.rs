//! Cashback handlers: month state, propose, choose and reset

use std::sync::Arc;

use axum::{
    extract::{Path, Query, Request, State},
    Json,
};
use serde::{Deserialize, Serialize};

use super::{read_json, read_optional_json, resolve_month, MonthQuery};
use crate::{get_actor, AppError, AppState};
use cashbacker_core::{CashbackCategory, CashbackOffer, MonthCashbacks, SyncAndPropose};

/// Request body for proposing cashback
#[derive(Debug, Default, Deserialize)]
pub struct ProposeRequest {
    pub month: Option<String>,
}

/// Request body for choosing cashback
#[derive(Debug, Deserialize)]
pub struct ChooseRequest {
    pub month: String,
    pub cashbacks: Vec<CashbackOffer>,
}

#[derive(Serialize)]
pub struct ResetResponse {
    pub deleted: usize,
}

/// GET /api/accounts/:id/cashback - Month state and rows
pub async fn get_cashback(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Query(params): Query<MonthQuery>,
) -> Result<Json<MonthCashbacks>, AppError> {
    let month = resolve_month(params.month.as_deref())?;
    Ok(Json(state.engine.allocator().month_cashbacks(id, month)?))
}

/// POST /api/accounts/:id/cashback/propose - Sync, then propose for the month
///
/// The body is optional; an empty body proposes for the current month.
pub async fn propose_cashback(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    request: Request,
) -> Result<Json<SyncAndPropose>, AppError> {
    let actor = get_actor(request.headers());
    let req: ProposeRequest = read_optional_json(request).await?;
    let month = resolve_month(req.month.as_deref())?;

    let result = state.engine.sync_and_propose(id, month).await?;

    if result.proposal.created {
        state.db.log_audit(
            &actor,
            "propose",
            Some("cashback"),
            Some(id),
            Some(&format!(
                "month={}, categories={}",
                month,
                result.proposal.cashbacks.len()
            )),
        )?;
    }

    Ok(Json(result))
}

/// POST /api/accounts/:id/cashback/choose - Commit a subset of the proposal
pub async fn choose_cashback(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    request: Request,
) -> Result<Json<MonthCashbacks>, AppError> {
    let actor = get_actor(request.headers());
    let req: ChooseRequest = read_json(request).await?;
    let month = resolve_month(Some(&req.month))?;

    let result = state.engine.choose(id, month, &req.cashbacks)?;

    let chosen: Vec<String> = req
        .cashbacks
        .iter()
        .map(|c| format!("{}:{}", c.product_type, c.value))
        .collect();
    state.db.log_audit(
        &actor,
        "choose",
        Some("cashback"),
        Some(id),
        Some(&format!("month={}, chosen={}", month, chosen.join(","))),
    )?;

    Ok(Json(result))
}

/// DELETE /api/accounts/:id/cashback - Delete every cashback row of the account
pub async fn reset_cashback(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    request: Request,
) -> Result<Json<ResetResponse>, AppError> {
    let actor = get_actor(request.headers());

    let deleted = state.engine.allocator().reset(id)?;

    state.db.log_audit(
        &actor,
        "reset",
        Some("cashback"),
        Some(id),
        Some(&format!("deleted={}", deleted)),
    )?;

    Ok(Json(ResetResponse { deleted }))
}

/// GET /api/categories - Category catalog
pub async fn list_categories(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<CashbackCategory>>, AppError> {
    Ok(Json(state.db.list_categories()?))
}
