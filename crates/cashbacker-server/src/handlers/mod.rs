//! HTTP request handlers organized by domain
//!
//! Each submodule contains handlers for a specific API area.

pub mod accounts;
pub mod audit;
pub mod cashback;
pub mod limits;
pub mod users;

// Re-export all handlers for use in router
pub use accounts::*;
pub use audit::*;
pub use cashback::*;
pub use limits::*;
pub use users::*;

use axum::extract::Request;
use chrono::{NaiveDate, Utc};
use serde::de::DeserializeOwned;

use crate::AppError;
use cashbacker_core::month;

/// Maximum accepted JSON body size
const MAX_BODY_SIZE: usize = 64 * 1024;

/// Read and parse a JSON request body
pub(crate) async fn read_json<T: DeserializeOwned>(request: Request) -> Result<T, AppError> {
    let bytes = axum::body::to_bytes(request.into_body(), MAX_BODY_SIZE)
        .await
        .map_err(|_| AppError::bad_request("Invalid request body"))?;
    serde_json::from_slice(&bytes).map_err(|e| AppError::bad_request(&format!("Invalid JSON: {}", e)))
}

/// Like `read_json`, but an empty body yields `T::default()`
pub(crate) async fn read_optional_json<T: DeserializeOwned + Default>(
    request: Request,
) -> Result<T, AppError> {
    let bytes = axum::body::to_bytes(request.into_body(), MAX_BODY_SIZE)
        .await
        .map_err(|_| AppError::bad_request("Invalid request body"))?;
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(&bytes).map_err(|e| AppError::bad_request(&format!("Invalid JSON: {}", e)))
}

/// Month from a `?month=` value, defaulting to the current month
pub(crate) fn resolve_month(value: Option<&str>) -> Result<NaiveDate, AppError> {
    match value.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => Ok(month::parse(s)?),
        None => Ok(month::current(Utc::now())),
    }
}
