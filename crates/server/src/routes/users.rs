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
        models::{ProjectStatus, Role, User},
    },
    error::{AppError, Result},
    middleware::auth::AuthUser,
    routes::{created, ensure_exists, validate},
    services::{
        accounts::{self, SqliteAccountStore},
        password::hash_password,
        permissions::{ensure, Permissions},
    },
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_users).post(create_user))
        .route("/:id", get(get_user).put(update_user).delete(delete_user))
        .route("/:id/projects", get(list_user_projects))
}

const USERS: ListQuery<'static> = ListQuery {
    select: "SELECT *",
    from: "FROM users",
    order_by: "created_at DESC, rowid DESC",
};

const USER_PROJECTS: ListQuery<'static> = ListQuery {
    select: "SELECT p.id AS project_id, p.name AS project_name, p.status AS project_status, pm.role_in_project, pm.joined_at",
    from: "FROM project_members pm JOIN projects p ON p.id = pm.project_id",
    order_by: "pm.joined_at DESC, pm.rowid DESC",
};

#[derive(Debug, Default, Deserialize)]
pub struct UserFilter {
    pub search: Option<String>,
    pub role: Option<Role>,
}

impl ListFilter for UserFilter {
    fn apply<'args>(&'args self, predicates: &mut Predicates<'_, 'args>) {
        predicates.search("search_text", self.search.as_deref());
        predicates.eq_opt("role", self.role);
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchFilter {
    pub search: Option<String>,
}

struct MembershipsOf<'a> {
    user_id: &'a str,
    search: Option<&'a str>,
}

impl ListFilter for MembershipsOf<'_> {
    fn apply<'args>(&'args self, predicates: &mut Predicates<'_, 'args>) {
        predicates.eq("pm.user_id", self.user_id);
        predicates.search("p.search_text", self.search);
    }
}

#[derive(Debug, Serialize)]
pub struct UserListResponse {
    pub users: Vec<User>,
    #[serde(flatten)]
    pub meta: PageMeta,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDetail {
    #[serde(flatten)]
    pub user: User,
    pub managed_projects_count: i64,
    pub authored_tasks_count: i64,
    pub assigned_tasks_count: i64,
    pub comments_count: i64,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct UserProject {
    pub project_id: String,
    pub project_name: String,
    pub project_status: ProjectStatus,
    pub role_in_project: String,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct UserProjectListResponse {
    pub projects: Vec<UserProject>,
    #[serde(flatten)]
    pub meta: PageMeta,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    #[serde(default = "default_role")]
    pub role: Role,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub id: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role: Role,
    /// Left out (or blank) to keep the current password.
    pub password: Option<String>,
}

fn default_role() -> Role {
    Role::User
}

async fn list_users(
    State(state): State<AppState>,
    Query(paging): Query<PageParams>,
    Query(filter): Query<UserFilter>,
) -> Result<Json<UserListResponse>> {
    let page: Page<User> = fetch_page(&state.db.pool, &USERS, &filter, paging.try_into()?).await?;

    Ok(Json(UserListResponse {
        users: page.items,
        meta: page.meta,
    }))
}

async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<UserDetail>> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(&id)
        .fetch_optional(&state.db.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    let (managed_projects_count, authored_tasks_count, assigned_tasks_count, comments_count) =
        sqlx::query_as::<_, (i64, i64, i64, i64)>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM projects WHERE manager_id = ?1),
                (SELECT COUNT(*) FROM tasks WHERE author_id = ?1),
                (SELECT COUNT(*) FROM tasks WHERE assignee_id = ?1),
                (SELECT COUNT(*) FROM comments WHERE author_id = ?1)
            "#,
        )
        .bind(&id)
        .fetch_one(&state.db.pool)
        .await?;

    Ok(Json(UserDetail {
        user,
        managed_projects_count,
        authored_tasks_count,
        assigned_tasks_count,
        comments_count,
    }))
}

async fn email_taken(state: &AppState, email: &str, except_id: Option<&str>) -> Result<bool> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM users WHERE email = ? AND id != COALESCE(?, '')",
    )
    .bind(email)
    .bind(except_id)
    .fetch_one(&state.db.pool)
    .await?;
    Ok(count > 0)
}

async fn create_user(
    State(state): State<AppState>,
    caller: AuthUser,
    Json(body): Json<CreateUserRequest>,
) -> Result<Response> {
    ensure(
        Permissions::of(&caller).can_manage_users(),
        "Only administrators can create users",
    )?;

    let first_name = validate::person_name("firstName", &body.first_name)?;
    let last_name = validate::person_name("lastName", &body.last_name)?;
    let email = validate::email(&body.email)?;
    validate::password(&body.password)?;

    if email_taken(&state, &email, None).await? {
        return Err(AppError::Conflict(
            "User with this email already exists".to_string(),
        ));
    }

    let password_hash = hash_password(&body.password)?;

    let user = sqlx::query_as::<_, User>(
        "INSERT INTO users (id, first_name, last_name, email, password_hash, role, created_at, search_text) VALUES (?, ?, ?, ?, ?, ?, ?, ?) RETURNING *",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(&first_name)
    .bind(&last_name)
    .bind(&email)
    .bind(&password_hash)
    .bind(body.role)
    .bind(Utc::now())
    .bind(search_text(&[&first_name, &last_name, &email]))
    .fetch_one(&state.db.pool)
    .await?;

    tracing::info!(user_id = %user.id, role = ?user.role, created_by = %caller.id, "Created user");

    Ok(created(format!("/api/users/{}", user.id), user))
}

async fn update_user(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
    Json(body): Json<UpdateUserRequest>,
) -> Result<Json<User>> {
    ensure(
        Permissions::of(&caller).can_manage_users(),
        "Only administrators can edit users",
    )?;
    validate::id_matches(&id, body.id.as_deref())?;
    ensure_exists(&state.db.pool, "users", &id, "User").await?;

    let first_name = validate::person_name("firstName", &body.first_name)?;
    let last_name = validate::person_name("lastName", &body.last_name)?;
    let email = validate::email(&body.email)?;

    let password_hash = match body.password.as_deref().filter(|p| !p.is_empty()) {
        Some(password) => {
            validate::password(password)?;
            Some(hash_password(password)?)
        }
        None => None,
    };

    if email_taken(&state, &email, Some(&id)).await? {
        return Err(AppError::Conflict(
            "User with this email already exists".to_string(),
        ));
    }

    let user = sqlx::query_as::<_, User>(
        r#"
        UPDATE users
        SET first_name = ?, last_name = ?, email = ?, role = ?,
            password_hash = COALESCE(?, password_hash), search_text = ?
        WHERE id = ?
        RETURNING *
        "#,
    )
    .bind(&first_name)
    .bind(&last_name)
    .bind(&email)
    .bind(body.role)
    .bind(password_hash)
    .bind(search_text(&[&first_name, &last_name, &email]))
    .bind(&id)
    .fetch_optional(&state.db.pool)
    .await?
    .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    tracing::info!(user_id = %user.id, role = ?user.role, updated_by = %caller.id, "Updated user");

    Ok(Json(user))
}

async fn delete_user(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    ensure(
        Permissions::of(&caller).can_manage_users(),
        "Only administrators can delete users",
    )?;
    if caller.id == id {
        return Err(AppError::Validation(
            "You cannot delete your own account".to_string(),
        ));
    }

    let mut tx = state.db.pool.begin().await?;
    let report = accounts::delete_user(&mut SqliteAccountStore::new(&mut *tx), &id).await?;
    tx.commit().await?;

    tracing::info!(
        user_id = %id,
        tasks = ?report.tasks,
        comments_deleted = report.comments_deleted,
        deleted_by = %caller.id,
        "Deleted user"
    );

    Ok(StatusCode::NO_CONTENT)
}

async fn list_user_projects(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(paging): Query<PageParams>,
    Query(filter): Query<SearchFilter>,
) -> Result<Json<UserProjectListResponse>> {
    ensure_exists(&state.db.pool, "users", &id, "User").await?;

    let filter = MembershipsOf {
        user_id: &id,
        search: filter.search.as_deref(),
    };
    let page: Page<UserProject> =
        fetch_page(&state.db.pool, &USER_PROJECTS, &filter, paging.try_into()?).await?;

    Ok(Json(UserProjectListResponse {
        projects: page.items,
        meta: page.meta,
    }))
}
