//! Board shape persistence routes.
//!
//! The client saves the whole committed shape list in one request; the
//! server checks the edit capability and hands the list to the store.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Json;
use frames::{Shape, StoreError};
use tracing::warn;

use crate::state::AppState;

/// Header carrying the saving user's id, set by the auth layer in front.
pub const USER_HEADER: &str = "x-user-id";

/// `GET /api/boards/:id/shapes`: committed shapes, oldest first.
pub async fn load_shapes(
    State(state): State<AppState>,
    Path(board_id): Path<String>,
) -> Result<Json<Vec<Shape>>, StatusCode> {
    let shapes = state
        .store
        .load(&board_id)
        .await
        .map_err(|e| store_error_to_status(&board_id, e))?;
    Ok(Json(shapes))
}

/// `PUT /api/boards/:id/shapes`: replace the stored list. Last writer wins.
pub async fn save_shapes(
    State(state): State<AppState>,
    Path(board_id): Path<String>,
    headers: HeaderMap,
    Json(shapes): Json<Vec<Shape>>,
) -> Result<StatusCode, StatusCode> {
    let user_id = headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    if !state.policy.may_edit(&board_id, user_id) {
        return Err(store_error_to_status(&board_id, StoreError::Forbidden(board_id.clone())));
    }

    state
        .store
        .save(&board_id, &shapes)
        .await
        .map_err(|e| store_error_to_status(&board_id, e))?;
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) fn store_error_to_status(board_id: &str, err: StoreError) -> StatusCode {
    warn!(%board_id, error = %err, "shape store request failed");
    match err {
        StoreError::Forbidden(_) => StatusCode::FORBIDDEN,
        StoreError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        StoreError::Backend(_) | StoreError::Codec(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[cfg(test)]
#[path = "boards_test.rs"]
mod tests;
