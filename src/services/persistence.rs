//! Postgres-backed shape store.
//!
//! DESIGN
//! ======
//! One `board_shapes` row per board holds the whole committed shape list as
//! JSONB. `save` is an upsert of that row, so the last save wins; there is
//! no version column and no per-shape rows. Shapes are opaque to the server
//! beyond their JSON form.

use frames::{Shape, ShapeStore, StoreError};
use sqlx::PgPool;
use sqlx::types::Json;
use tracing::{error, info};

pub struct PgShapeStore {
    pool: PgPool,
}

impl PgShapeStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ShapeStore for PgShapeStore {
    async fn load(&self, board_id: &str) -> Result<Vec<Shape>, StoreError> {
        let row: Option<(Json<Vec<Shape>>,)> = sqlx::query_as("SELECT elements FROM board_shapes WHERE board_id = $1")
            .bind(board_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;

        Ok(row.map(|(Json(shapes),)| shapes).unwrap_or_default())
    }

    async fn save(&self, board_id: &str, shapes: &[Shape]) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO board_shapes (board_id, elements, updated_at)
             VALUES ($1, $2, now())
             ON CONFLICT (board_id) DO UPDATE
             SET elements = EXCLUDED.elements, updated_at = now()",
        )
        .bind(board_id)
        .bind(Json(shapes))
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        info!(%board_id, shapes = shapes.len(), "board shapes saved");
        Ok(())
    }
}

/// Connection-level failures are retryable; anything else is a backend fault.
fn store_error(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StoreError::Unavailable(err.to_string())
        }
        sqlx::Error::Decode(_) | sqlx::Error::ColumnDecode { .. } => {
            error!(error = %err, "stored shapes failed to decode");
            StoreError::Backend(err.to_string())
        }
        other => {
            error!(error = %other, "shape store query failed");
            StoreError::Backend(other.to_string())
        }
    }
}

#[cfg(test)]
#[path = "persistence_test.rs"]
mod tests;
