//! Project membership, mounted under `/api/projects/:id`.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Response,
    routing::{get, put},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    db::{
        listing::{fetch_page, ListFilter, ListQuery, Page, PageMeta, PageParams, Predicates},
        models::{ProjectMember, Role, User},
    },
    error::{AppError, Result},
    middleware::auth::AuthUser,
    routes::{created, ensure_exists, ensure_reference, projects::find_project, validate},
    services::permissions::{ensure, Permissions},
    AppState,
};

pub const ROLE_IN_PROJECT_MAX: usize = 100;
pub const DEFAULT_ROLE_IN_PROJECT: &str = "Member";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/:id/members", get(list_members).post(add_member))
        .route(
            "/:id/members/:user_id",
            put(update_member).delete(remove_member),
        )
        .route("/:id/available-users", get(list_available_users))
}

const MEMBERS: ListQuery<'static> = ListQuery {
    select: "SELECT pm.*, u.first_name, u.last_name, u.email, u.role AS user_role",
    from: "FROM project_members pm JOIN users u ON u.id = pm.user_id",
    order_by: "pm.joined_at DESC, pm.rowid DESC",
};

const AVAILABLE_USERS: ListQuery<'static> = ListQuery {
    select: "SELECT u.*",
    from: "FROM users u",
    order_by: "u.last_name ASC, u.first_name ASC, u.rowid ASC",
};

#[derive(Debug, Default, Deserialize)]
pub struct MemberSearch {
    pub search: Option<String>,
}

struct MembersOf<'a> {
    project_id: &'a str,
    search: Option<&'a str>,
}

impl ListFilter for MembersOf<'_> {
    fn apply<'args>(&'args self, predicates: &mut Predicates<'_, 'args>) {
        predicates.eq("pm.project_id", self.project_id);
        predicates.search("u.search_text", self.search);
    }
}

struct NotMembersOf<'a> {
    project_id: &'a str,
    search: Option<&'a str>,
}

impl ListFilter for NotMembersOf<'_> {
    fn apply<'args>(&'args self, predicates: &mut Predicates<'_, 'args>) {
        predicates
            .and()
            .push("NOT EXISTS (SELECT 1 FROM project_members pm WHERE pm.user_id = u.id AND pm.project_id = ")
            .push_bind(self.project_id)
            .push(")");
        predicates.search("u.search_text", self.search);
    }
}

#[derive(Debug, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct MemberListItem {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub membership: ProjectMember,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub user_role: Role,
}

#[derive(Debug, Serialize)]
pub struct MemberListResponse {
    pub members: Vec<MemberListItem>,
    #[serde(flatten)]
    pub meta: PageMeta,
}

#[derive(Debug, Serialize)]
pub struct AvailableUsersResponse {
    pub users: Vec<User>,
    #[serde(flatten)]
    pub meta: PageMeta,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddMemberRequest {
    pub user_id: String,
    pub role_in_project: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMemberRequest {
    pub role_in_project: String,
}

/// Loads the project and checks the caller may change its membership.
async fn ensure_can_manage(state: &AppState, user: &AuthUser, project_id: &str) -> Result<()> {
    let project = find_project(state, project_id).await?;
    ensure(
        Permissions::of(user).can_edit_project(&project.manager_id),
        "You can only manage members of projects you manage",
    )
}

async fn list_members(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Query(paging): Query<PageParams>,
    Query(search): Query<MemberSearch>,
) -> Result<Json<MemberListResponse>> {
    ensure_exists(&state.db.pool, "projects", &project_id, "Project").await?;

    let filter = MembersOf {
        project_id: &project_id,
        search: search.search.as_deref(),
    };
    let page: Page<MemberListItem> =
        fetch_page(&state.db.pool, &MEMBERS, &filter, paging.try_into()?).await?;

    Ok(Json(MemberListResponse {
        members: page.items,
        meta: page.meta,
    }))
}

async fn list_available_users(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Query(paging): Query<PageParams>,
    Query(search): Query<MemberSearch>,
) -> Result<Json<AvailableUsersResponse>> {
    ensure_exists(&state.db.pool, "projects", &project_id, "Project").await?;

    let filter = NotMembersOf {
        project_id: &project_id,
        search: search.search.as_deref(),
    };
    let page: Page<User> =
        fetch_page(&state.db.pool, &AVAILABLE_USERS, &filter, paging.try_into()?).await?;

    Ok(Json(AvailableUsersResponse {
        users: page.items,
        meta: page.meta,
    }))
}

async fn add_member(
    State(state): State<AppState>,
    user: AuthUser,
    Path(project_id): Path<String>,
    Json(body): Json<AddMemberRequest>,
) -> Result<Response> {
    ensure_can_manage(&state, &user, &project_id).await?;
    ensure_reference(&state.db.pool, "users", &body.user_id, "User").await?;

    let role_in_project = validate::optional_text(
        "roleInProject",
        body.role_in_project.as_deref(),
        ROLE_IN_PROJECT_MAX,
    )?;
    let role_in_project = if role_in_project.is_empty() {
        DEFAULT_ROLE_IN_PROJECT.to_string()
    } else {
        role_in_project
    };

    let existing = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM project_members WHERE project_id = ? AND user_id = ?",
    )
    .bind(&project_id)
    .bind(&body.user_id)
    .fetch_one(&state.db.pool)
    .await?;

    if existing > 0 {
        return Err(AppError::Conflict(
            "User is already a member of this project".to_string(),
        ));
    }

    let membership = sqlx::query_as::<_, ProjectMember>(
        "INSERT INTO project_members (id, project_id, user_id, role_in_project, joined_at) VALUES (?, ?, ?, ?, ?) RETURNING *",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(&project_id)
    .bind(&body.user_id)
    .bind(role_in_project)
    .bind(Utc::now())
    .fetch_one(&state.db.pool)
    .await?;

    tracing::info!(project_id = %project_id, user_id = %membership.user_id, added_by = %user.id, "Added project member");

    Ok(created(
        format!("/api/projects/{project_id}/members/{}", membership.user_id),
        membership,
    ))
}

async fn update_member(
    State(state): State<AppState>,
    user: AuthUser,
    Path((project_id, member_id)): Path<(String, String)>,
    Json(body): Json<UpdateMemberRequest>,
) -> Result<Json<ProjectMember>> {
    ensure_can_manage(&state, &user, &project_id).await?;

    let role_in_project =
        validate::required_text("roleInProject", &body.role_in_project, ROLE_IN_PROJECT_MAX)?;

    let membership = sqlx::query_as::<_, ProjectMember>(
        "UPDATE project_members SET role_in_project = ? WHERE project_id = ? AND user_id = ? RETURNING *",
    )
    .bind(role_in_project)
    .bind(&project_id)
    .bind(&member_id)
    .fetch_optional(&state.db.pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Project member not found".to_string()))?;

    tracing::info!(project_id = %project_id, user_id = %member_id, "Updated project member");

    Ok(Json(membership))
}

async fn remove_member(
    State(state): State<AppState>,
    user: AuthUser,
    Path((project_id, member_id)): Path<(String, String)>,
) -> Result<StatusCode> {
    ensure_can_manage(&state, &user, &project_id).await?;

    let removed = sqlx::query("DELETE FROM project_members WHERE project_id = ? AND user_id = ?")
        .bind(&project_id)
        .bind(&member_id)
        .execute(&state.db.pool)
        .await?
        .rows_affected();

    if removed == 0 {
        return Err(AppError::NotFound("Project member not found".to_string()));
    }

    tracing::info!(project_id = %project_id, user_id = %member_id, removed_by = %user.id, "Removed project member");

    Ok(StatusCode::NO_CONTENT)
}
