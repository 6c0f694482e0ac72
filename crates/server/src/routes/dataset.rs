//! Admin-only bulk test data tooling.

use std::time::Instant;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::{
    error::{AppError, Result},
    middleware::auth::AuthUser,
    services::{
        password::hash_password,
        permissions::{ensure, Permissions},
        seed::{self, DatasetSize, TableCounts},
    },
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/generate", post(generate_custom))
        .route("/generate/large", post(generate_large))
        .route("/generate/massive", post(generate_massive))
        .route("/clear", post(clear))
        .route("/stats", get(stats))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResponse {
    pub counts: TableCounts,
    pub elapsed_ms: u64,
}

fn ensure_admin(user: &AuthUser) -> Result<()> {
    ensure(
        Permissions::of(user).is_admin(),
        "Only administrators can manage test data",
    )
}

/// Custom sizes are capped at the largest preset.
fn check_limits(size: &DatasetSize) -> Result<()> {
    let max = DatasetSize::MASSIVE;
    if size.users > max.users
        || size.projects > max.projects
        || size.tasks > max.tasks
        || size.comments > max.comments
    {
        return Err(AppError::Validation(format!(
            "Dataset size may not exceed {} users, {} projects, {} tasks and {} comments",
            max.users, max.projects, max.tasks, max.comments
        )));
    }
    Ok(())
}

async fn run(
    state: &AppState,
    user: &AuthUser,
    size: DatasetSize,
) -> Result<Json<GenerationResponse>> {
    ensure_admin(user)?;

    let started = Instant::now();
    // One hash shared by every generated account
    let password_hash = hash_password(&state.config.seed_password)?;
    let counts = seed::generate(&state.db.pool, size, &password_hash, Some(&user.id)).await?;
    let elapsed_ms = started.elapsed().as_millis() as u64;

    tracing::info!(requested_by = %user.id, total = counts.total_records, elapsed_ms, "Generated dataset");

    Ok(Json(GenerationResponse { counts, elapsed_ms }))
}

async fn generate_custom(
    State(state): State<AppState>,
    user: AuthUser,
    Json(size): Json<DatasetSize>,
) -> Result<Json<GenerationResponse>> {
    ensure_admin(&user)?;
    check_limits(&size)?;
    run(&state, &user, size).await
}

async fn generate_large(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<GenerationResponse>> {
    run(&state, &user, DatasetSize::LARGE).await
}

async fn generate_massive(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<GenerationResponse>> {
    run(&state, &user, DatasetSize::MASSIVE).await
}

async fn clear(State(state): State<AppState>, user: AuthUser) -> Result<StatusCode> {
    ensure_admin(&user)?;

    seed::clear(&state.db.pool, Some(&user.id)).await?;
    tracing::info!(requested_by = %user.id, "Cleared dataset");

    Ok(StatusCode::NO_CONTENT)
}

async fn stats(State(state): State<AppState>, user: AuthUser) -> Result<Json<TableCounts>> {
    ensure_admin(&user)?;
    Ok(Json(seed::table_counts(&state.db.pool).await?))
}
