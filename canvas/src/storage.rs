//! Client-side stores behind the `ShapeStore` boundary.
//!
//! `FileStore` is the guest board's single-device storage: one JSON document
//! under a fixed key, ignoring the board id. `HttpStore` talks to the relay's
//! `/api/boards/{id}/shapes` endpoints.

#[cfg(test)]
#[path = "storage_test.rs"]
mod storage_test;

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use frames::{Shape, ShapeStore, StoreError};
use reqwest::StatusCode;
use tracing::debug;

use crate::consts::GUEST_STORAGE_KEY;

/// Header carrying the acting user on save requests.
pub const USER_HEADER: &str = "x-user-id";

// =============================================================================
// LOCAL FILE
// =============================================================================

pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    /// Store under `dir`, keyed as the guest board.
    #[must_use]
    pub fn guest(dir: impl AsRef<Path>) -> Self {
        Self::with_key(dir, GUEST_STORAGE_KEY)
    }

    #[must_use]
    pub fn with_key(dir: impl AsRef<Path>, key: &str) -> Self {
        Self { path: dir.as_ref().join(format!("{key}.json")) }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait::async_trait]
impl ShapeStore for FileStore {
    async fn load(&self, _board_id: &str) -> Result<Vec<Shape>, StoreError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::Unavailable(e.to_string())),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn save(&self, _board_id: &str, shapes: &[Shape]) -> Result<(), StoreError> {
        let body = serde_json::to_vec(shapes)?;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        }
        // Replace atomically: write a sibling file, then rename it over the target.
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        debug!(path = %self.path.display(), shapes = shapes.len(), "guest board saved");
        Ok(())
    }
}

// =============================================================================
// HTTP
// =============================================================================

pub struct HttpStore {
    http: reqwest::Client,
    base_url: String,
    user_id: String,
}

impl HttpStore {
    #[must_use]
    pub fn new(base_url: &str, user_id: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_owned(),
            user_id: user_id.into(),
        }
    }

    fn shapes_url(&self, board_id: &str) -> String {
        format!("{}/api/boards/{board_id}/shapes", self.base_url)
    }
}

#[async_trait::async_trait]
impl ShapeStore for HttpStore {
    async fn load(&self, board_id: &str) -> Result<Vec<Shape>, StoreError> {
        let response = self
            .http
            .get(self.shapes_url(board_id))
            .send()
            .await
            .map_err(transport_error)?;
        let response = check_status(board_id, response)?;
        response.json().await.map_err(transport_error)
    }

    async fn save(&self, board_id: &str, shapes: &[Shape]) -> Result<(), StoreError> {
        let response = self
            .http
            .put(self.shapes_url(board_id))
            .header(USER_HEADER, &self.user_id)
            .json(shapes)
            .send()
            .await
            .map_err(transport_error)?;
        check_status(board_id, response)?;
        Ok(())
    }
}

fn check_status(board_id: &str, response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
    match response.status() {
        status if status.is_success() => Ok(response),
        StatusCode::FORBIDDEN => Err(StoreError::Forbidden(board_id.to_owned())),
        StatusCode::SERVICE_UNAVAILABLE => Err(StoreError::Unavailable(format!("HTTP 503 for board {board_id}"))),
        status => Err(StoreError::Backend(format!("HTTP {} for board {board_id}", status.as_u16()))),
    }
}

fn transport_error(error: reqwest::Error) -> StoreError {
    if error.is_connect() || error.is_timeout() {
        StoreError::Unavailable(error.to_string())
    } else {
        StoreError::Backend(error.to_string())
    }
}
