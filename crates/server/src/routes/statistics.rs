use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;

use crate::{
    db::models::{Project, TaskStatus, User},
    error::{AppError, Result},
    middleware::auth::AuthUser,
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/project/:id", get(project_statistics))
        .route("/user/:id", get(user_statistics))
        .route("/dashboard", get(dashboard))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCount {
    pub status: TaskStatus,
    pub count: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectStatistics {
    pub project_id: String,
    pub project_name: String,
    pub total_tasks: i64,
    pub completed_tasks: i64,
    pub completion_rate: f64,
    pub total_planned_hours: f64,
    pub total_actual_hours: f64,
    pub tasks_by_status: Vec<StatusCount>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStatistics {
    pub user_id: String,
    pub user_name: String,
    pub assigned_tasks: i64,
    pub completed_tasks: i64,
    pub created_tasks: i64,
    pub completion_rate: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub managed_projects: i64,
    pub member_projects: i64,
    pub assigned_open_tasks: i64,
    pub authored_tasks: i64,
}

/// Share of `completed` in `total` as an unrounded percentage; 0 for no tasks.
pub fn completion_rate(completed: i64, total: i64) -> f64 {
    if total <= 0 {
        return 0.0;
    }
    completed as f64 / total as f64 * 100.0
}

async fn project_statistics(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ProjectStatistics>> {
    let project = sqlx::query_as::<_, Project>("SELECT * FROM projects WHERE id = ?")
        .bind(&id)
        .fetch_optional(&state.db.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Project not found".to_string()))?;

    let (total_tasks, completed_tasks, total_planned_hours, total_actual_hours) =
        sqlx::query_as::<_, (i64, i64, f64, f64)>(
            r#"
            SELECT
                COUNT(*),
                COALESCE(SUM(CASE WHEN status = 'done' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(planned_hours), 0.0),
                COALESCE(SUM(actual_hours), 0.0)
            FROM tasks
            WHERE project_id = ?
            "#,
        )
        .bind(&id)
        .fetch_one(&state.db.pool)
        .await?;

    let grouped = sqlx::query_as::<_, (TaskStatus, i64)>(
        "SELECT status, COUNT(*) FROM tasks WHERE project_id = ? GROUP BY status",
    )
    .bind(&id)
    .fetch_all(&state.db.pool)
    .await?;

    // Every status is reported, including the empty ones
    let tasks_by_status = TaskStatus::ALL
        .into_iter()
        .map(|status| StatusCount {
            status,
            count: grouped
                .iter()
                .find(|(s, _)| *s == status)
                .map_or(0, |(_, count)| *count),
        })
        .collect();

    Ok(Json(ProjectStatistics {
        project_id: project.id,
        project_name: project.name,
        total_tasks,
        completed_tasks,
        completion_rate: completion_rate(completed_tasks, total_tasks),
        total_planned_hours,
        total_actual_hours,
        tasks_by_status,
    }))
}

async fn user_statistics(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<UserStatistics>> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(&id)
        .fetch_optional(&state.db.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    let (assigned_tasks, completed_tasks, created_tasks) = sqlx::query_as::<_, (i64, i64, i64)>(
        r#"
        SELECT
            (SELECT COUNT(*) FROM tasks WHERE assignee_id = ?1),
            (SELECT COUNT(*) FROM tasks WHERE assignee_id = ?1 AND status = 'done'),
            (SELECT COUNT(*) FROM tasks WHERE author_id = ?1)
        "#,
    )
    .bind(&id)
    .fetch_one(&state.db.pool)
    .await?;

    Ok(Json(UserStatistics {
        user_name: user.full_name(),
        user_id: user.id,
        assigned_tasks,
        completed_tasks,
        created_tasks,
        completion_rate: completion_rate(completed_tasks, assigned_tasks),
    }))
}

async fn dashboard(State(state): State<AppState>, user: AuthUser) -> Result<Json<Dashboard>> {
    let (managed_projects, member_projects, assigned_open_tasks, authored_tasks) =
        sqlx::query_as::<_, (i64, i64, i64, i64)>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM projects WHERE manager_id = ?1),
                (SELECT COUNT(*) FROM project_members WHERE user_id = ?1),
                (SELECT COUNT(*) FROM tasks WHERE assignee_id = ?1 AND status != 'done'),
                (SELECT COUNT(*) FROM tasks WHERE author_id = ?1)
            "#,
        )
        .bind(&user.id)
        .fetch_one(&state.db.pool)
        .await?;

    Ok(Json(Dashboard {
        managed_projects,
        member_projects,
        assigned_open_tasks,
        authored_tasks,
    }))
}
