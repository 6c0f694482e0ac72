use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Response,
    routing::{get, patch},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    db::{
        listing::{
            fetch_page, search_text, ListFilter, ListQuery, Page, PageMeta, PageParams, Predicates,
        },
        models::{Task, TaskPriority, TaskStatus},
    },
    error::{AppError, Result},
    middleware::auth::AuthUser,
    routes::{comments, created, ensure_reference, validate},
    services::permissions::{ensure, Permissions},
    AppState,
};

pub const TITLE_MAX: usize = 200;
pub const DESCRIPTION_MAX: usize = 4000;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_tasks).post(create_task))
        .route("/:id", get(get_task).put(update_task).delete(delete_task))
        .route("/:id/status", patch(update_status))
        .route("/:id/assignee", patch(update_assignee))
        .route(
            "/:id/comments",
            get(comments::list_task_comments).post(comments::create_task_comment),
        )
}

const TASKS: ListQuery<'static> = ListQuery {
    select: r#"SELECT t.*, p.name AS project_name,
        a.first_name || ' ' || a.last_name AS author_name,
        s.first_name || ' ' || s.last_name AS assignee_name"#,
    from: r#"FROM tasks t
        JOIN projects p ON p.id = t.project_id
        JOIN users a ON a.id = t.author_id
        LEFT JOIN users s ON s.id = t.assignee_id"#,
    order_by: "t.created_at DESC, t.rowid DESC",
};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskFilter {
    pub search: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub project_id: Option<String>,
    pub author_id: Option<String>,
    pub assignee_id: Option<String>,
}

impl ListFilter for TaskFilter {
    fn apply<'args>(&'args self, predicates: &mut Predicates<'_, 'args>) {
        predicates.search("t.search_text", self.search.as_deref());
        predicates.eq_opt("t.status", self.status);
        predicates.eq_opt("t.priority", self.priority);
        predicates.eq_opt("t.project_id", self.project_id.as_deref());
        predicates.eq_opt("t.author_id", self.author_id.as_deref());
        predicates.eq_opt("t.assignee_id", self.assignee_id.as_deref());
    }
}

#[derive(Debug, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TaskListItem {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub task: Task,
    pub project_name: String,
    pub author_name: String,
    pub assignee_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TaskListResponse {
    pub tasks: Vec<TaskListItem>,
    #[serde(flatten)]
    pub meta: PageMeta,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDetail {
    #[serde(flatten)]
    pub task: TaskListItem,
    pub comments_count: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskRequest {
    pub title: String,
    pub description: Option<String>,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: TaskPriority,
    pub project_id: String,
    pub author_id: Option<String>,
    pub assignee_id: Option<String>,
    #[serde(default)]
    pub planned_hours: f64,
    pub actual_hours: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTaskRequest {
    pub id: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub project_id: String,
    pub assignee_id: Option<String>,
    pub planned_hours: f64,
    pub actual_hours: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: TaskStatus,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAssigneeRequest {
    pub assignee_id: Option<String>,
}

pub(crate) async fn find_task(state: &AppState, id: &str) -> Result<Task> {
    sqlx::query_as::<_, Task>("SELECT * FROM tasks WHERE id = ?")
        .bind(id)
        .fetch_optional(&state.db.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Task not found".to_string()))
}

fn optional_hours(field: &str, value: Option<f64>) -> Result<Option<f64>> {
    value.map(|hours| validate::hours(field, hours)).transpose()
}

async fn ensure_assignee(state: &AppState, assignee_id: Option<&str>) -> Result<()> {
    match assignee_id {
        Some(id) => ensure_reference(&state.db.pool, "users", id, "Assignee").await,
        None => Ok(()),
    }
}

async fn list_tasks(
    State(state): State<AppState>,
    Query(paging): Query<PageParams>,
    Query(filter): Query<TaskFilter>,
) -> Result<Json<TaskListResponse>> {
    let page: Page<TaskListItem> =
        fetch_page(&state.db.pool, &TASKS, &filter, paging.try_into()?).await?;

    Ok(Json(TaskListResponse {
        tasks: page.items,
        meta: page.meta,
    }))
}

async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TaskDetail>> {
    let sql = format!("{} {} WHERE t.id = ?", TASKS.select, TASKS.from);
    let task = sqlx::query_as::<_, TaskListItem>(&sql)
        .bind(&id)
        .fetch_optional(&state.db.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Task not found".to_string()))?;

    let comments_count =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM comments WHERE task_id = ?")
            .bind(&id)
            .fetch_one(&state.db.pool)
            .await?;

    Ok(Json(TaskDetail {
        task,
        comments_count,
    }))
}

async fn create_task(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<CreateTaskRequest>,
) -> Result<Response> {
    let permissions = Permissions::of(&user);
    ensure(
        permissions.can_create_task(),
        "Only managers and administrators can create tasks",
    )?;

    let title = validate::required_text("title", &body.title, TITLE_MAX)?;
    let description =
        validate::optional_text("description", body.description.as_deref(), DESCRIPTION_MAX)?;
    let planned_hours = validate::hours("plannedHours", body.planned_hours)?;
    let actual_hours = optional_hours("actualHours", body.actual_hours)?;

    let author_id = body.author_id.unwrap_or_else(|| user.id.clone());
    if author_id != user.id {
        ensure(
            permissions.is_admin(),
            "Only administrators can create tasks on behalf of another user",
        )?;
    }

    ensure_reference(&state.db.pool, "projects", &body.project_id, "Project").await?;
    ensure_reference(&state.db.pool, "users", &author_id, "Author").await?;
    ensure_assignee(&state, body.assignee_id.as_deref()).await?;

    let now = Utc::now();
    let task = sqlx::query_as::<_, Task>(
        r#"
        INSERT INTO tasks (id, title, description, status, priority, project_id, author_id,
                           assignee_id, created_at, updated_at, planned_hours, actual_hours,
                           search_text)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(&title)
    .bind(&description)
    .bind(body.status)
    .bind(body.priority)
    .bind(&body.project_id)
    .bind(&author_id)
    .bind(&body.assignee_id)
    .bind(now)
    .bind(now)
    .bind(planned_hours)
    .bind(actual_hours)
    .bind(search_text(&[&title, &description]))
    .fetch_one(&state.db.pool)
    .await?;

    tracing::info!(task_id = %task.id, project_id = %task.project_id, author_id = %task.author_id, "Created task");

    Ok(created(format!("/api/tasks/{}", task.id), task))
}

async fn update_task(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(body): Json<UpdateTaskRequest>,
) -> Result<Json<Task>> {
    validate::id_matches(&id, body.id.as_deref())?;
    let existing = find_task(&state, &id).await?;
    ensure(
        Permissions::of(&user).can_edit_task(&existing.author_id),
        "You can only edit tasks you created",
    )?;

    let title = validate::required_text("title", &body.title, TITLE_MAX)?;
    let description =
        validate::optional_text("description", body.description.as_deref(), DESCRIPTION_MAX)?;
    let planned_hours = validate::hours("plannedHours", body.planned_hours)?;
    let actual_hours = optional_hours("actualHours", body.actual_hours)?;

    ensure_reference(&state.db.pool, "projects", &body.project_id, "Project").await?;
    ensure_assignee(&state, body.assignee_id.as_deref()).await?;

    let task = sqlx::query_as::<_, Task>(
        r#"
        UPDATE tasks
        SET title = ?, description = ?, status = ?, priority = ?, project_id = ?,
            assignee_id = ?, planned_hours = ?, actual_hours = ?, updated_at = ?,
            search_text = ?
        WHERE id = ?
        RETURNING *
        "#,
    )
    .bind(&title)
    .bind(&description)
    .bind(body.status)
    .bind(body.priority)
    .bind(&body.project_id)
    .bind(&body.assignee_id)
    .bind(planned_hours)
    .bind(actual_hours)
    .bind(Utc::now())
    .bind(search_text(&[&title, &description]))
    .bind(&id)
    .fetch_optional(&state.db.pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Task not found".to_string()))?;

    tracing::info!(task_id = %task.id, updated_by = %user.id, "Updated task");

    Ok(Json(task))
}

async fn update_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(body): Json<UpdateStatusRequest>,
) -> Result<Json<Task>> {
    let existing = find_task(&state, &id).await?;
    ensure(
        Permissions::of(&user).can_edit_task(&existing.author_id),
        "You can only change the status of tasks you created",
    )?;

    let task = sqlx::query_as::<_, Task>(
        "UPDATE tasks SET status = ?, updated_at = ? WHERE id = ? RETURNING *",
    )
    .bind(body.status)
    .bind(Utc::now())
    .bind(&id)
    .fetch_optional(&state.db.pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Task not found".to_string()))?;

    tracing::info!(task_id = %task.id, status = ?task.status, "Changed task status");

    Ok(Json(task))
}

async fn update_assignee(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(body): Json<UpdateAssigneeRequest>,
) -> Result<Json<Task>> {
    let existing = find_task(&state, &id).await?;
    let permissions = Permissions::of(&user);
    ensure(
        permissions.can_assign_tasks(),
        "Only managers and administrators can assign tasks",
    )?;
    ensure(
        permissions.can_edit_task(&existing.author_id),
        "You can only assign tasks you created",
    )?;
    ensure_assignee(&state, body.assignee_id.as_deref()).await?;

    let task = sqlx::query_as::<_, Task>(
        "UPDATE tasks SET assignee_id = ?, updated_at = ? WHERE id = ? RETURNING *",
    )
    .bind(&body.assignee_id)
    .bind(Utc::now())
    .bind(&id)
    .fetch_optional(&state.db.pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Task not found".to_string()))?;

    tracing::info!(task_id = %task.id, assignee_id = ?task.assignee_id, "Changed task assignee");

    Ok(Json(task))
}

async fn delete_task(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    let task = find_task(&state, &id).await?;
    ensure(
        Permissions::of(&user).can_delete_task(&task.author_id),
        "You can only delete tasks you created",
    )?;

    sqlx::query("DELETE FROM tasks WHERE id = ?")
        .bind(&id)
        .execute(&state.db.pool)
        .await?;

    tracing::info!(task_id = %id, deleted_by = %user.id, "Deleted task");

    Ok(StatusCode::NO_CONTENT)
}
