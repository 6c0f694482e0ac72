pub mod auth;
pub mod comments;
pub mod dataset;
pub mod members;
pub mod projects;
pub mod statistics;
pub mod tasks;
pub mod users;
pub mod validate;

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::error::{AppError, Result};

/// `201 Created` with a `Location` header pointing at the new record.
pub fn created<T: Serialize>(location: String, record: T) -> Response {
    (
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(record),
    )
        .into_response()
}

/// Fails with `NotFound` unless a row with `id` exists in `table`.
pub async fn ensure_exists(pool: &SqlitePool, table: &str, id: &str, what: &str) -> Result<()> {
    let count = sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {table} WHERE id = ?"))
        .bind(id)
        .fetch_one(pool)
        .await?;

    if count == 0 {
        return Err(AppError::NotFound(format!("{what} not found")));
    }
    Ok(())
}

/// Like [`ensure_exists`], but a missing reference in a request body is a bad request.
pub async fn ensure_reference(pool: &SqlitePool, table: &str, id: &str, what: &str) -> Result<()> {
    ensure_exists(pool, table, id, what)
        .await
        .map_err(|err| match err {
            AppError::NotFound(_) => AppError::Validation(format!("{what} {id} does not exist")),
            other => other,
        })
}
