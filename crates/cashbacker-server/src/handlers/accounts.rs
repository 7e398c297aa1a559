//! Account management handlers

use std::sync::Arc;

use axum::{
    extract::{Path, Request, State},
    Json,
};
use serde::Deserialize;

use super::read_json;
use crate::{get_actor, AppError, AppState};
use cashbacker_core::{Account, SyncResult};

/// Request body for creating an account
#[derive(Debug, Deserialize)]
pub struct CreateAccountRequest {
    pub user_id: i64,
    pub number: String,
    pub bank: String,
    #[serde(default)]
    pub cards: Vec<String>,
}

/// POST /api/accounts - Create an account by hand
pub async fn create_account(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<Account>, AppError> {
    let actor = get_actor(request.headers());
    let req: CreateAccountRequest = read_json(request).await?;

    let cards: Vec<&str> = req.cards.iter().map(String::as_str).collect();
    let account = state
        .onboarding
        .add_account(req.user_id, &req.number, &req.bank, &cards)?;

    state.db.log_audit(
        &actor,
        "create",
        Some("account"),
        Some(account.id),
        Some(&format!(
            "user_id={}, bank={}, cards={}",
            account.user_id,
            account.bank,
            cards.len()
        )),
    )?;

    Ok(Json(account))
}

/// GET /api/accounts/:id - Get a single account
pub async fn get_account(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Account>, AppError> {
    let account = state
        .db
        .get_account(id)?
        .ok_or_else(|| AppError::not_found(&format!("Account {} not found", id)))?;

    Ok(Json(account))
}

/// POST /api/accounts/:id/sync - Pull new transactions for an account
pub async fn sync_account(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    request: Request,
) -> Result<Json<SyncResult>, AppError> {
    let actor = get_actor(request.headers());

    let result = state.engine.sync(id).await?;

    state.db.log_audit(
        &actor,
        "sync",
        Some("account"),
        Some(id),
        Some(&format!(
            "added={}, duplicates={}, throttled={}",
            result.transactions_added, result.duplicates_skipped, result.throttled
        )),
    )?;

    Ok(Json(result))
}
