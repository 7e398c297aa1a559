//! Category spending limit handlers

use std::sync::Arc;

use axum::{
    extract::{Path, Query, Request, State},
    Json,
};
use serde::Deserialize;

use super::{read_json, resolve_month, MonthQuery};
use crate::{get_actor, AppError, AppState, SuccessResponse};
use cashbacker_core::{CategoryLimit, LimitStatus};

/// Request body for setting a limit
#[derive(Debug, Deserialize)]
pub struct SetLimitRequest {
    pub category: String,
    pub value: i64,
}

fn require_user(state: &AppState, id: i64) -> Result<(), AppError> {
    match state.db.get_user(id)? {
        Some(_) => Ok(()),
        None => Err(AppError::not_found(&format!("User {} not found", id))),
    }
}

/// GET /api/users/:id/limits - List a user's limits
pub async fn list_limits(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<CategoryLimit>>, AppError> {
    require_user(&state, id)?;
    Ok(Json(state.db.list_category_limits(id)?))
}

/// PUT /api/users/:id/limits - Create or overwrite a limit
pub async fn set_limit(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    request: Request,
) -> Result<Json<Vec<CategoryLimit>>, AppError> {
    let actor = get_actor(request.headers());
    let req: SetLimitRequest = read_json(request).await?;

    let limit_id = state.db.set_category_limit(id, &req.category, req.value)?;

    state.db.log_audit(
        &actor,
        "set",
        Some("category_limit"),
        Some(limit_id),
        Some(&format!("user_id={}, category={}, value={}", id, req.category, req.value)),
    )?;

    Ok(Json(state.db.list_category_limits(id)?))
}

/// DELETE /api/users/:id/limits/:category - Remove a limit
pub async fn delete_limit(
    State(state): State<Arc<AppState>>,
    Path((id, category)): Path<(i64, String)>,
    request: Request,
) -> Result<Json<SuccessResponse>, AppError> {
    let actor = get_actor(request.headers());
    require_user(&state, id)?;

    if !state.db.delete_category_limit(id, &category)? {
        return Err(AppError::not_found(&format!(
            "No limit for category '{}'",
            category
        )));
    }

    state.db.log_audit(
        &actor,
        "delete",
        Some("category_limit"),
        None,
        Some(&format!("user_id={}, category={}", id, category)),
    )?;

    Ok(Json(SuccessResponse { success: true }))
}

/// GET /api/users/:id/limits/report - Spending against each limit for a month
pub async fn limit_report(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Query(params): Query<MonthQuery>,
) -> Result<Json<Vec<LimitStatus>>, AppError> {
    let month = resolve_month(params.month.as_deref())?;
    require_user(&state, id)?;
    Ok(Json(state.db.limit_report(id, month)?))
}
