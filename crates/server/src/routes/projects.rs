use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Response,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    db::{
        listing::{
            fetch_page, search_text, ListFilter, ListQuery, Page, PageMeta, PageParams, Predicates,
        },
        models::{Project, ProjectStatus},
    },
    error::{AppError, Result},
    middleware::auth::AuthUser,
    routes::{comments, created, ensure_reference, validate},
    services::permissions::{ensure, Permissions},
    AppState,
};

pub const NAME_MAX: usize = 200;
pub const DESCRIPTION_MAX: usize = 2000;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_projects).post(create_project))
        .route("/mine", get(list_my_projects))
        .route(
            "/:id",
            get(get_project).put(update_project).delete(delete_project),
        )
        .route("/:id/comments", get(comments::list_project_comments))
}

const PROJECTS: ListQuery<'static> = ListQuery {
    select: "SELECT p.*, u.first_name || ' ' || u.last_name AS manager_name",
    from: "FROM projects p JOIN users u ON u.id = p.manager_id",
    order_by: "p.created_at DESC, p.rowid DESC",
};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectFilter {
    pub search: Option<String>,
    pub status: Option<ProjectStatus>,
    pub manager_id: Option<String>,
    pub member_id: Option<String>,
    /// Restricts to projects the user manages or belongs to.
    #[serde(skip)]
    pub involving: Option<String>,
}

impl ListFilter for ProjectFilter {
    fn apply<'args>(&'args self, predicates: &mut Predicates<'_, 'args>) {
        predicates.search("p.search_text", self.search.as_deref());
        predicates.eq_opt("p.status", self.status);
        predicates.eq_opt("p.manager_id", self.manager_id.as_deref());

        if let Some(member_id) = self.member_id.as_deref() {
            predicates
                .and()
                .push("EXISTS (SELECT 1 FROM project_members pm WHERE pm.project_id = p.id AND pm.user_id = ")
                .push_bind(member_id)
                .push(")");
        }

        if let Some(user_id) = self.involving.as_deref() {
            predicates
                .and()
                .push("(p.manager_id = ")
                .push_bind(user_id)
                .push(" OR EXISTS (SELECT 1 FROM project_members pm WHERE pm.project_id = p.id AND pm.user_id = ")
                .push_bind(user_id)
                .push("))");
        }
    }
}

#[derive(Debug, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ProjectListItem {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub project: Project,
    pub manager_name: String,
}

#[derive(Debug, Serialize)]
pub struct ProjectListResponse {
    pub projects: Vec<ProjectListItem>,
    #[serde(flatten)]
    pub meta: PageMeta,
}

impl From<Page<ProjectListItem>> for ProjectListResponse {
    fn from(page: Page<ProjectListItem>) -> Self {
        Self {
            projects: page.items,
            meta: page.meta,
        }
    }
}

#[derive(Debug, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ManagerSummary {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectDetail {
    #[serde(flatten)]
    pub project: Project,
    pub manager: ManagerSummary,
    pub tasks_count: i64,
    pub members_count: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProjectRequest {
    pub name: String,
    pub description: Option<String>,
    pub manager_id: Option<String>,
    #[serde(default)]
    pub status: ProjectStatus,
    pub deadline: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProjectRequest {
    pub id: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub manager_id: String,
    pub status: ProjectStatus,
    pub deadline: Option<DateTime<Utc>>,
}

pub(crate) async fn find_project(state: &AppState, id: &str) -> Result<Project> {
    sqlx::query_as::<_, Project>("SELECT * FROM projects WHERE id = ?")
        .bind(id)
        .fetch_optional(&state.db.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Project not found".to_string()))
}

async fn list_projects(
    State(state): State<AppState>,
    Query(paging): Query<PageParams>,
    Query(filter): Query<ProjectFilter>,
) -> Result<Json<ProjectListResponse>> {
    let page = fetch_page(&state.db.pool, &PROJECTS, &filter, paging.try_into()?).await?;
    Ok(Json(page.into()))
}

async fn list_my_projects(
    State(state): State<AppState>,
    user: AuthUser,
    Query(paging): Query<PageParams>,
    Query(filter): Query<ProjectFilter>,
) -> Result<Json<ProjectListResponse>> {
    let filter = ProjectFilter {
        involving: Some(user.id),
        ..filter
    };
    let page = fetch_page(&state.db.pool, &PROJECTS, &filter, paging.try_into()?).await?;
    Ok(Json(page.into()))
}

async fn get_project(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ProjectDetail>> {
    let project = find_project(&state, &id).await?;

    let manager = sqlx::query_as::<_, ManagerSummary>(
        "SELECT id, first_name, last_name, email FROM users WHERE id = ?",
    )
    .bind(&project.manager_id)
    .fetch_one(&state.db.pool)
    .await?;

    let (tasks_count, members_count) = sqlx::query_as::<_, (i64, i64)>(
        r#"
        SELECT
            (SELECT COUNT(*) FROM tasks WHERE project_id = ?1),
            (SELECT COUNT(*) FROM project_members WHERE project_id = ?1)
        "#,
    )
    .bind(&id)
    .fetch_one(&state.db.pool)
    .await?;

    Ok(Json(ProjectDetail {
        project,
        manager,
        tasks_count,
        members_count,
    }))
}

async fn create_project(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<CreateProjectRequest>,
) -> Result<Response> {
    let permissions = Permissions::of(&user);
    ensure(
        permissions.can_create_project(),
        "Only managers and administrators can create projects",
    )?;

    let name = validate::required_text("name", &body.name, NAME_MAX)?;
    let description =
        validate::optional_text("description", body.description.as_deref(), DESCRIPTION_MAX)?;

    let manager_id = body.manager_id.unwrap_or_else(|| user.id.clone());
    if manager_id != user.id {
        ensure(
            permissions.is_admin(),
            "Only administrators can create projects for another manager",
        )?;
    }
    ensure_reference(&state.db.pool, "users", &manager_id, "Manager").await?;

    let project = sqlx::query_as::<_, Project>(
        "INSERT INTO projects (id, name, description, manager_id, status, created_at, deadline, search_text) VALUES (?, ?, ?, ?, ?, ?, ?, ?) RETURNING *",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(&name)
    .bind(&description)
    .bind(&manager_id)
    .bind(body.status)
    .bind(Utc::now())
    .bind(body.deadline)
    .bind(search_text(&[&name, &description]))
    .fetch_one(&state.db.pool)
    .await?;

    tracing::info!(project_id = %project.id, manager_id = %project.manager_id, "Created project");

    Ok(created(format!("/api/projects/{}", project.id), project))
}

async fn update_project(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(body): Json<UpdateProjectRequest>,
) -> Result<Json<Project>> {
    validate::id_matches(&id, body.id.as_deref())?;
    let existing = find_project(&state, &id).await?;
    ensure(
        Permissions::of(&user).can_edit_project(&existing.manager_id),
        "You can only edit projects you manage",
    )?;

    let name = validate::required_text("name", &body.name, NAME_MAX)?;
    let description =
        validate::optional_text("description", body.description.as_deref(), DESCRIPTION_MAX)?;
    ensure_reference(&state.db.pool, "users", &body.manager_id, "Manager").await?;

    let project = sqlx::query_as::<_, Project>(
        r#"
        UPDATE projects
        SET name = ?, description = ?, manager_id = ?, status = ?, deadline = ?, search_text = ?
        WHERE id = ?
        RETURNING *
        "#,
    )
    .bind(&name)
    .bind(&description)
    .bind(&body.manager_id)
    .bind(body.status)
    .bind(body.deadline)
    .bind(search_text(&[&name, &description]))
    .bind(&id)
    .fetch_optional(&state.db.pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Project not found".to_string()))?;

    tracing::info!(project_id = %project.id, updated_by = %user.id, "Updated project");

    Ok(Json(project))
}

async fn delete_project(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    let project = find_project(&state, &id).await?;
    ensure(
        Permissions::of(&user).can_delete_project(&project.manager_id),
        "You can only delete projects you manage",
    )?;

    // Tasks, their comments and memberships go with it through ON DELETE CASCADE
    sqlx::query("DELETE FROM projects WHERE id = ?")
        .bind(&id)
        .execute(&state.db.pool)
        .await?;

    tracing::info!(project_id = %id, deleted_by = %user.id, "Deleted project");

    Ok(StatusCode::NO_CONTENT)
}
