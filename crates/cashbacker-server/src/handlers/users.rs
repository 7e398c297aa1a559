//! User handlers: onboarding, overview, sync and monthly transactions

use std::sync::Arc;

use axum::{
    extract::{Path, Query, Request, State},
    Json,
};
use serde::Deserialize;

use super::{read_json, resolve_month};
use crate::{get_actor, AppError, AppState};
use cashbacker_core::{
    AccountOverview, AccountSyncOutcome, AccountTransactions, NewUser, RegisteredUser,
};

/// Request body for registering a user
#[derive(Debug, Deserialize)]
pub struct RegisterUserRequest {
    pub external_id: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub surname: String,
    /// Month whose bank-side cashbacks are imported (defaults to current)
    pub month: Option<String>,
}

/// Optional `?month=` parameter
#[derive(Debug, Deserialize)]
pub struct MonthQuery {
    pub month: Option<String>,
}

/// POST /api/users - Register a user and discover their accounts
pub async fn register_user(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<RegisteredUser>, AppError> {
    let actor = get_actor(request.headers());
    let req: RegisterUserRequest = read_json(request).await?;

    let external_id = req.external_id.trim();
    if external_id.is_empty() {
        return Err(AppError::bad_request("external_id is required"));
    }
    let month = resolve_month(req.month.as_deref())?;

    let user = NewUser {
        external_id: external_id.to_string(),
        first_name: req.first_name,
        surname: req.surname,
    };
    let registered = state.onboarding.register(&user, month).await?;

    state.db.log_audit(
        &actor,
        "register",
        Some("user"),
        Some(registered.user_id),
        Some(&format!(
            "external_id={}, accounts={}",
            user.external_id,
            registered.accounts.len()
        )),
    )?;

    Ok(Json(registered))
}

/// GET /api/users/:id/accounts - Accounts with committed cashbacks for a month
pub async fn user_accounts(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Query(params): Query<MonthQuery>,
) -> Result<Json<Vec<AccountOverview>>, AppError> {
    let month = resolve_month(params.month.as_deref())?;
    Ok(Json(state.engine.allocator().overview(id, month)?))
}

/// POST /api/users/:id/sync - Sync every account of a user
pub async fn sync_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    request: Request,
) -> Result<Json<Vec<AccountSyncOutcome>>, AppError> {
    let actor = get_actor(request.headers());

    let outcomes = state.engine.sync_pipeline().sync_user(id).await?;
    let failed = outcomes.iter().filter(|o| !o.is_ok()).count();

    state.db.log_audit(
        &actor,
        "sync",
        Some("user"),
        Some(id),
        Some(&format!("accounts={}, failed={}", outcomes.len(), failed)),
    )?;

    Ok(Json(outcomes))
}

/// GET /api/users/:id/transactions - Transactions of every account for a month
pub async fn user_transactions(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Query(params): Query<MonthQuery>,
) -> Result<Json<Vec<AccountTransactions>>, AppError> {
    let month = resolve_month(params.month.as_deref())?;
    if state.db.get_user(id)?.is_none() {
        return Err(AppError::not_found(&format!("User {} not found", id)));
    }
    Ok(Json(state.db.user_transactions_for_month(id, month)?))
}
