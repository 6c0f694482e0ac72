use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Response,
    routing::get,
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
        models::Comment,
    },
    error::{AppError, Result},
    middleware::auth::AuthUser,
    routes::{created, ensure_exists, ensure_reference, tasks::find_task, validate},
    services::permissions::{ensure, Permissions},
    AppState,
};

pub const CONTENT_MAX: usize = 2000;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_comments).post(create_comment))
        .route(
            "/:id",
            get(get_comment).put(update_comment).delete(delete_comment),
        )
}

const COMMENTS: ListQuery<'static> = ListQuery {
    select: "SELECT c.*, u.first_name || ' ' || u.last_name AS author_name, t.title AS task_title",
    from: "FROM comments c JOIN users u ON u.id = c.author_id LEFT JOIN tasks t ON t.id = c.task_id",
    order_by: "c.created_at DESC, c.rowid DESC",
};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentFilter {
    pub search: Option<String>,
    pub task_id: Option<String>,
    pub author_id: Option<String>,
    /// Comments on any task of this project.
    #[serde(skip)]
    pub project_id: Option<String>,
}

impl ListFilter for CommentFilter {
    fn apply<'args>(&'args self, predicates: &mut Predicates<'_, 'args>) {
        predicates.search("c.search_text", self.search.as_deref());
        predicates.eq_opt("c.task_id", self.task_id.as_deref());
        predicates.eq_opt("c.author_id", self.author_id.as_deref());
        predicates.eq_opt("t.project_id", self.project_id.as_deref());
    }
}

#[derive(Debug, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CommentListItem {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub comment: Comment,
    pub author_name: String,
    pub task_title: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CommentListResponse {
    pub comments: Vec<CommentListItem>,
    #[serde(flatten)]
    pub meta: PageMeta,
}

impl From<Page<CommentListItem>> for CommentListResponse {
    fn from(page: Page<CommentListItem>) -> Self {
        Self {
            comments: page.items,
            meta: page.meta,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCommentRequest {
    pub content: String,
    pub task_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CommentContent {
    pub content: String,
}

async fn list_comments(
    State(state): State<AppState>,
    Query(paging): Query<PageParams>,
    Query(filter): Query<CommentFilter>,
) -> Result<Json<CommentListResponse>> {
    let page = fetch_page(&state.db.pool, &COMMENTS, &filter, paging.try_into()?).await?;
    Ok(Json(page.into()))
}

pub(crate) async fn list_task_comments(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
    Query(paging): Query<PageParams>,
    Query(filter): Query<CommentFilter>,
) -> Result<Json<CommentListResponse>> {
    ensure_exists(&state.db.pool, "tasks", &task_id, "Task").await?;

    let filter = CommentFilter {
        task_id: Some(task_id),
        ..filter
    };
    let page = fetch_page(&state.db.pool, &COMMENTS, &filter, paging.try_into()?).await?;
    Ok(Json(page.into()))
}

pub(crate) async fn list_project_comments(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Query(paging): Query<PageParams>,
    Query(filter): Query<CommentFilter>,
) -> Result<Json<CommentListResponse>> {
    ensure_exists(&state.db.pool, "projects", &project_id, "Project").await?;

    let filter = CommentFilter {
        project_id: Some(project_id),
        ..filter
    };
    let page = fetch_page(&state.db.pool, &COMMENTS, &filter, paging.try_into()?).await?;
    Ok(Json(page.into()))
}

async fn get_comment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CommentListItem>> {
    let sql = format!("{} {} WHERE c.id = ?", COMMENTS.select, COMMENTS.from);
    let comment = sqlx::query_as::<_, CommentListItem>(&sql)
        .bind(&id)
        .fetch_optional(&state.db.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Comment not found".to_string()))?;

    Ok(Json(comment))
}

/// Stores a comment and, when it belongs to a task, bumps that task's `updated_at`
/// in the same transaction.
async fn insert_comment(
    state: &AppState,
    author_id: &str,
    content: &str,
    task_id: Option<&str>,
) -> Result<Comment> {
    let content = validate::required_text("content", content, CONTENT_MAX)?;
    let now = Utc::now();

    let mut tx = state.db.pool.begin().await?;

    let comment = sqlx::query_as::<_, Comment>(
        "INSERT INTO comments (id, content, task_id, author_id, created_at, search_text) VALUES (?, ?, ?, ?, ?, ?) RETURNING *",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(&content)
    .bind(task_id)
    .bind(author_id)
    .bind(now)
    .bind(search_text(&[&content]))
    .fetch_one(&mut *tx)
    .await?;

    if let Some(task_id) = task_id {
        sqlx::query("UPDATE tasks SET updated_at = ? WHERE id = ?")
            .bind(now)
            .bind(task_id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;

    tracing::info!(comment_id = %comment.id, task_id = ?comment.task_id, author_id, "Created comment");

    Ok(comment)
}

async fn create_comment(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<CreateCommentRequest>,
) -> Result<Response> {
    if let Some(task_id) = body.task_id.as_deref() {
        ensure_reference(&state.db.pool, "tasks", task_id, "Task").await?;
    }

    let comment = insert_comment(&state, &user.id, &body.content, body.task_id.as_deref()).await?;

    Ok(created(format!("/api/comments/{}", comment.id), comment))
}

pub(crate) async fn create_task_comment(
    State(state): State<AppState>,
    user: AuthUser,
    Path(task_id): Path<String>,
    Json(body): Json<CommentContent>,
) -> Result<Response> {
    let task = find_task(&state, &task_id).await?;

    let comment = insert_comment(&state, &user.id, &body.content, Some(&task.id)).await?;

    Ok(created(format!("/api/comments/{}", comment.id), comment))
}

async fn find_comment(state: &AppState, id: &str) -> Result<Comment> {
    sqlx::query_as::<_, Comment>("SELECT * FROM comments WHERE id = ?")
        .bind(id)
        .fetch_optional(&state.db.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Comment not found".to_string()))
}

async fn update_comment(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(body): Json<CommentContent>,
) -> Result<Json<Comment>> {
    let existing = find_comment(&state, &id).await?;
    ensure(
        Permissions::of(&user).can_modify_comment(&existing.author_id),
        "You can only edit your own comments",
    )?;

    let content = validate::required_text("content", &body.content, CONTENT_MAX)?;

    let comment = sqlx::query_as::<_, Comment>(
        "UPDATE comments SET content = ?, search_text = ? WHERE id = ? RETURNING *",
    )
    .bind(&content)
    .bind(search_text(&[&content]))
    .bind(&id)
    .fetch_optional(&state.db.pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Comment not found".to_string()))?;

    tracing::info!(comment_id = %comment.id, updated_by = %user.id, "Updated comment");

    Ok(Json(comment))
}

async fn delete_comment(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    let comment = find_comment(&state, &id).await?;
    ensure(
        Permissions::of(&user).can_modify_comment(&comment.author_id),
        "You can only delete your own comments",
    )?;

    sqlx::query("DELETE FROM comments WHERE id = ?")
        .bind(&id)
        .execute(&state.db.pool)
        .await?;

    tracing::info!(comment_id = %id, deleted_by = %user.id, "Deleted comment");

    Ok(StatusCode::NO_CONTENT)
}
