//! Bulk test-data generation.
//!
//! Rows are produced in memory one batch at a time and written with a single
//! multi-row `INSERT` per batch, each batch in its own transaction, which keeps
//! both memory and transaction size bounded regardless of the dataset size.

use chrono::{DateTime, Duration, Utc};
use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use sqlx::{query_builder::Separated, QueryBuilder, Sqlite, SqlitePool};
use uuid::Uuid;

use crate::{
    db::{
        listing::search_text,
        models::{ProjectStatus, Role, TaskPriority, TaskStatus},
    },
    error::{AppError, Result},
};

pub const USER_BATCH: usize = 1000;
pub const PROJECT_BATCH: usize = 500;
pub const MEMBER_BATCH: usize = 1000;
pub const TASK_BATCH: usize = 1000;
pub const COMMENT_BATCH: usize = 2000;

const FIRST_NAMES: &[&str] = &[
    "Alex", "Maria", "Ivan", "Olga", "John", "Emma", "Liam", "Sofia", "Noah", "Anna", "Lucas",
    "Elena", "Mateo", "Chloe", "Dmitry", "Grace", "Omar", "Yuki", "Nina", "Pavel",
];
const LAST_NAMES: &[&str] = &[
    "Smith", "Ivanova", "Garcia", "Muller", "Rossi", "Kowalski", "Novak", "Tanaka", "Petrov",
    "Silva", "Brown", "Dubois", "Jensen", "Moreau", "Horvat", "Larsen", "Costa", "Weber",
];
const ADJECTIVES: &[&str] = &[
    "Ergonomic", "Rustic", "Sleek", "Intelligent", "Gorgeous", "Handcrafted", "Refined",
    "Practical", "Unbranded", "Fantastic", "Incredible", "Generic",
];
const NOUNS: &[&str] = &[
    "Chair", "Keyboard", "Portal", "Gateway", "Dashboard", "Pipeline", "Ledger", "Tracker",
    "Catalog", "Scheduler", "Inventory", "Console",
];
const WORDS: &[&str] = &[
    "lorem", "ipsum", "dolor", "sit", "amet", "consectetur", "adipiscing", "elit", "sed", "do",
    "eiusmod", "tempor", "incididunt", "ut", "labore", "et", "dolore", "magna", "aliqua",
    "enim", "minim", "veniam", "quis", "nostrud", "exercitation", "ullamco", "laboris",
];
const MEMBER_ROLES: &[&str] = &[
    "Developer", "Designer", "Tester", "Analyst", "Architect", "Team Lead", "QA",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberRange {
    pub min: usize,
    pub max: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetSize {
    pub users: usize,
    pub projects: usize,
    pub tasks: usize,
    pub comments: usize,
    pub members_per_project: MemberRange,
}

impl DatasetSize {
    pub const LARGE: Self = Self {
        users: 1000,
        projects: 500,
        tasks: 50_000,
        comments: 100_000,
        members_per_project: MemberRange { min: 10, max: 50 },
    };

    pub const MASSIVE: Self = Self {
        users: 2000,
        projects: 1000,
        tasks: 100_000,
        comments: 200_000,
        members_per_project: MemberRange { min: 10, max: 50 },
    };

    pub fn validate(&self) -> Result<()> {
        if self.projects > 0 && self.users == 0 {
            return Err(AppError::Validation(
                "Projects need at least one generated user".to_string(),
            ));
        }
        if self.tasks > 0 && self.projects == 0 {
            return Err(AppError::Validation(
                "Tasks need at least one generated project".to_string(),
            ));
        }
        if self.comments > 0 && self.tasks == 0 {
            return Err(AppError::Validation(
                "Comments need at least one generated task".to_string(),
            ));
        }
        if self.members_per_project.min > self.members_per_project.max {
            return Err(AppError::Validation(
                "membersPerProject.min must not exceed membersPerProject.max".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableCounts {
    pub users: i64,
    pub projects: i64,
    pub project_members: i64,
    pub tasks: i64,
    pub comments: i64,
    pub total_records: i64,
}

impl TableCounts {
    fn with_total(mut self) -> Self {
        self.total_records =
            self.users + self.projects + self.project_members + self.tasks + self.comments;
        self
    }
}

pub async fn table_counts(pool: &SqlitePool) -> Result<TableCounts> {
    let (users, projects, project_members, tasks, comments) =
        sqlx::query_as::<_, (i64, i64, i64, i64, i64)>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM users),
                (SELECT COUNT(*) FROM projects),
                (SELECT COUNT(*) FROM project_members),
                (SELECT COUNT(*) FROM tasks),
                (SELECT COUNT(*) FROM comments)
            "#,
        )
        .fetch_one(pool)
        .await?;

    Ok(TableCounts {
        users,
        projects,
        project_members,
        tasks,
        comments,
        total_records: 0,
    }
    .with_total())
}

/// Empties every table, children first. `keep_user_id` survives so the caller's
/// session stays valid.
pub async fn clear(pool: &SqlitePool, keep_user_id: Option<&str>) -> Result<()> {
    tracing::info!("Clearing database");

    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM comments").execute(&mut *tx).await?;
    sqlx::query("DELETE FROM tasks").execute(&mut *tx).await?;
    sqlx::query("DELETE FROM project_members")
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM projects").execute(&mut *tx).await?;
    match keep_user_id {
        Some(id) => {
            sqlx::query("DELETE FROM users WHERE id != ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        None => {
            sqlx::query("DELETE FROM users").execute(&mut *tx).await?;
        }
    }
    tx.commit().await?;

    tracing::info!("Database cleared");
    Ok(())
}

/// Clears the database (except `keep_user_id`) and fills it with `size` rows.
/// Every generated account gets `password_hash`.
pub async fn generate(
    pool: &SqlitePool,
    size: DatasetSize,
    password_hash: &str,
    keep_user_id: Option<&str>,
) -> Result<TableCounts> {
    size.validate()?;
    tracing::info!(?size, "Starting test data generation");

    clear(pool, keep_user_id).await?;

    let mut generator = Generator::new();
    let users = generator.users(pool, size.users, password_hash).await?;
    let projects = generator.projects(pool, size.projects, &users).await?;
    let members = generator
        .memberships(pool, &projects, &users, size.members_per_project)
        .await?;
    let tasks = generator.tasks(pool, size.tasks, &projects, &users).await?;
    let comments = generator
        .comments(pool, size.comments, &tasks, &users)
        .await?;

    let counts = TableCounts {
        users: users.len() as i64,
        projects: projects.len() as i64,
        project_members: members as i64,
        tasks: tasks.len() as i64,
        comments: comments as i64,
        total_records: 0,
    }
    .with_total();

    tracing::info!(total = counts.total_records, "Test data generation completed");
    Ok(counts)
}

struct GeneratedUser {
    id: String,
    role: Role,
}

struct Generator {
    rng: StdRng,
    now: DateTime<Utc>,
}

impl Generator {
    fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
            now: Utc::now(),
        }
    }

    fn pick<'a>(&mut self, items: &'a [&'a str]) -> &'a str {
        items.choose(&mut self.rng).copied().unwrap_or_default()
    }

    fn sentence(&mut self, min_words: usize, max_words: usize) -> String {
        let count = self.rng.gen_range(min_words..=max_words);
        let mut sentence = (0..count)
            .map(|_| self.pick(WORDS))
            .collect::<Vec<_>>()
            .join(" ");
        if let Some(first) = sentence.get_mut(..1) {
            first.make_ascii_uppercase();
        }
        sentence.push('.');
        sentence
    }

    fn paragraph(&mut self) -> String {
        let sentences = self.rng.gen_range(2..=5);
        (0..sentences)
            .map(|_| self.sentence(5, 12))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn past(&mut self, max_days: i64) -> DateTime<Utc> {
        self.now - Duration::minutes(self.rng.gen_range(0..max_days * 24 * 60))
    }

    async fn users(
        &mut self,
        pool: &SqlitePool,
        count: usize,
        password_hash: &str,
    ) -> Result<Vec<GeneratedUser>> {
        tracing::info!(count, "Generating users");
        let mut generated = Vec::with_capacity(count);

        for start in (0..count).step_by(USER_BATCH) {
            let batch_size = USER_BATCH.min(count - start);
            let rows: Vec<_> = (start..start + batch_size)
                .map(|n| {
                    let first = self.pick(FIRST_NAMES);
                    let last = self.pick(LAST_NAMES);
                    let role = match self.rng.gen_range(0..3) {
                        0 => Role::User,
                        1 => Role::Manager,
                        _ => Role::Admin,
                    };
                    (
                        Uuid::new_v4().to_string(),
                        first,
                        last,
                        format!("{}.{}.{n}@example.com", first, last).to_lowercase(),
                        role,
                        self.past(3 * 365),
                    )
                })
                .collect();

            insert_rows(
                pool,
                "INSERT INTO users (id, first_name, last_name, email, password_hash, role, created_at, search_text) ",
                &rows,
                |mut b, (id, first, last, email, role, created_at)| {
                    b.push_bind(id.as_str())
                        .push_bind(*first)
                        .push_bind(*last)
                        .push_bind(email.as_str())
                        .push_bind(password_hash)
                        .push_bind(*role)
                        .push_bind(*created_at)
                        .push_bind(search_text(&[first, last, email]));
                },
            )
            .await?;

            generated.extend(
                rows.into_iter()
                    .map(|(id, _, _, _, role, _)| GeneratedUser { id, role }),
            );
            tracing::info!("Generated {}/{} users", start + batch_size, count);
        }

        Ok(generated)
    }

    async fn projects(
        &mut self,
        pool: &SqlitePool,
        count: usize,
        users: &[GeneratedUser],
    ) -> Result<Vec<String>> {
        tracing::info!(count, "Generating projects");

        let mut managers: Vec<&str> = users
            .iter()
            .filter(|u| u.role >= Role::Manager)
            .map(|u| u.id.as_str())
            .collect();
        if managers.is_empty() {
            managers = users.iter().take(10).map(|u| u.id.as_str()).collect();
        }

        let mut generated = Vec::with_capacity(count);
        for start in (0..count).step_by(PROJECT_BATCH) {
            let batch_size = PROJECT_BATCH.min(count - start);
            let rows: Vec<_> = (0..batch_size)
                .map(|_| {
                    let name = format!(
                        "{} {} Project",
                        self.pick(ADJECTIVES),
                        self.pick(NOUNS)
                    );
                    let status = match self.rng.gen_range(0..3) {
                        0 => ProjectStatus::Active,
                        1 => ProjectStatus::Completed,
                        _ => ProjectStatus::Paused,
                    };
                    let deadline = self.now + Duration::days(self.rng.gen_range(1..=365));
                    (
                        Uuid::new_v4().to_string(),
                        name,
                        self.paragraph(),
                        self.pick(&managers).to_string(),
                        status,
                        self.past(2 * 365),
                        deadline,
                    )
                })
                .collect();

            insert_rows(
                pool,
                "INSERT INTO projects (id, name, description, manager_id, status, created_at, deadline, search_text) ",
                &rows,
                |mut b, (id, name, description, manager_id, status, created_at, deadline)| {
                    b.push_bind(id.as_str())
                        .push_bind(name.as_str())
                        .push_bind(description.as_str())
                        .push_bind(manager_id.as_str())
                        .push_bind(*status)
                        .push_bind(*created_at)
                        .push_bind(*deadline)
                        .push_bind(search_text(&[name, description]));
                },
            )
            .await?;

            generated.extend(rows.into_iter().map(|row| row.0));
            tracing::info!("Generated {}/{} projects", start + batch_size, count);
        }

        Ok(generated)
    }

    async fn memberships(
        &mut self,
        pool: &SqlitePool,
        projects: &[String],
        users: &[GeneratedUser],
        range: MemberRange,
    ) -> Result<usize> {
        tracing::info!("Generating project memberships");

        let mut pending = Vec::with_capacity(MEMBER_BATCH);
        let mut total = 0;

        for project_id in projects {
            let wanted = self.rng.gen_range(range.min..=range.max).min(users.len());
            let participants: Vec<&GeneratedUser> =
                users.choose_multiple(&mut self.rng, wanted).collect();

            for user in participants {
                pending.push((
                    Uuid::new_v4().to_string(),
                    project_id.as_str(),
                    user.id.as_str(),
                    self.pick(MEMBER_ROLES),
                    self.past(365),
                ));
            }

            if pending.len() >= MEMBER_BATCH {
                total += self.flush_memberships(pool, &pending).await?;
                pending.clear();
            }
        }

        if !pending.is_empty() {
            total += self.flush_memberships(pool, &pending).await?;
        }

        tracing::info!(total, "Generated project memberships");
        Ok(total)
    }

    async fn flush_memberships(
        &self,
        pool: &SqlitePool,
        rows: &[(String, &str, &str, &str, DateTime<Utc>)],
    ) -> Result<usize> {
        insert_rows(
            pool,
            "INSERT INTO project_members (id, project_id, user_id, role_in_project, joined_at) ",
            rows,
            |mut b, (id, project_id, user_id, role, joined_at)| {
                b.push_bind(id.as_str())
                    .push_bind(*project_id)
                    .push_bind(*user_id)
                    .push_bind(*role)
                    .push_bind(*joined_at);
            },
        )
        .await?;
        Ok(rows.len())
    }

    async fn tasks(
        &mut self,
        pool: &SqlitePool,
        count: usize,
        projects: &[String],
        users: &[GeneratedUser],
    ) -> Result<Vec<String>> {
        tracing::info!(count, "Generating tasks");
        let mut generated = Vec::with_capacity(count);

        for start in (0..count).step_by(TASK_BATCH) {
            let batch_size = TASK_BATCH.min(count - start);
            let rows: Vec<_> = (0..batch_size)
                .map(|_| self.task_row(projects, users))
                .collect();

            insert_rows(
                pool,
                "INSERT INTO tasks (id, title, description, status, priority, project_id, author_id, assignee_id, created_at, updated_at, planned_hours, actual_hours, search_text) ",
                &rows,
                |mut b, row| {
                    b.push_bind(row.id.as_str())
                        .push_bind(row.title.as_str())
                        .push_bind(row.description.as_str())
                        .push_bind(row.status)
                        .push_bind(row.priority)
                        .push_bind(row.project_id.as_str())
                        .push_bind(row.author_id.as_str())
                        .push_bind(row.assignee_id.as_str())
                        .push_bind(row.created_at)
                        .push_bind(row.updated_at)
                        .push_bind(row.planned_hours)
                        .push_bind(row.actual_hours)
                        .push_bind(search_text(&[&row.title, &row.description]));
                },
            )
            .await?;

            generated.extend(rows.into_iter().map(|row| row.id));
            tracing::info!("Generated {}/{} tasks", start + batch_size, count);
        }

        Ok(generated)
    }

    fn task_row(&mut self, projects: &[String], users: &[GeneratedUser]) -> TaskRow {
        let status = TaskStatus::ALL[self.rng.gen_range(0..TaskStatus::ALL.len())];
        let priority = match self.rng.gen_range(0..4) {
            0 => TaskPriority::Low,
            1 => TaskPriority::Medium,
            2 => TaskPriority::High,
            _ => TaskPriority::Critical,
        };
        let created_at = self.past(365);
        let since_created = (self.now - created_at).num_minutes().max(1);
        let updated_at = created_at + Duration::minutes(self.rng.gen_range(0..since_created));
        let planned_hours = round_tenth(self.rng.gen_range(1.0..40.0));
        let actual_hours = (status == TaskStatus::Done)
            .then(|| round_tenth(planned_hours * self.rng.gen_range(0.5..1.5)));

        TaskRow {
            id: Uuid::new_v4().to_string(),
            title: self.sentence(3, 8),
            description: self.paragraph(),
            status,
            priority,
            project_id: projects.choose(&mut self.rng).cloned().unwrap_or_default(),
            author_id: users
                .choose(&mut self.rng)
                .map(|u| u.id.clone())
                .unwrap_or_default(),
            assignee_id: users
                .choose(&mut self.rng)
                .map(|u| u.id.clone())
                .unwrap_or_default(),
            created_at,
            updated_at,
            planned_hours,
            actual_hours,
        }
    }

    async fn comments(
        &mut self,
        pool: &SqlitePool,
        count: usize,
        tasks: &[String],
        users: &[GeneratedUser],
    ) -> Result<usize> {
        tracing::info!(count, "Generating comments");

        for start in (0..count).step_by(COMMENT_BATCH) {
            let batch_size = COMMENT_BATCH.min(count - start);
            let rows: Vec<_> = (0..batch_size)
                .map(|_| {
                    (
                        Uuid::new_v4().to_string(),
                        self.paragraph(),
                        tasks.choose(&mut self.rng).cloned().unwrap_or_default(),
                        users
                            .choose(&mut self.rng)
                            .map(|u| u.id.clone())
                            .unwrap_or_default(),
                        self.past(365),
                    )
                })
                .collect();

            insert_rows(
                pool,
                "INSERT INTO comments (id, content, task_id, author_id, created_at, search_text) ",
                &rows,
                |mut b, (id, content, task_id, author_id, created_at)| {
                    b.push_bind(id.as_str())
                        .push_bind(content.as_str())
                        .push_bind(task_id.as_str())
                        .push_bind(author_id.as_str())
                        .push_bind(*created_at)
                        .push_bind(search_text(&[content]));
                },
            )
            .await?;

            tracing::info!("Generated {}/{} comments", start + batch_size, count);
        }

        Ok(count)
    }
}

struct TaskRow {
    id: String,
    title: String,
    description: String,
    status: TaskStatus,
    priority: TaskPriority,
    project_id: String,
    author_id: String,
    assignee_id: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    planned_hours: f64,
    actual_hours: Option<f64>,
}

fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Writes `rows` with one multi-row `INSERT` inside its own transaction.
async fn insert_rows<'a, T>(
    pool: &SqlitePool,
    insert: &str,
    rows: &'a [T],
    push_row: impl FnMut(Separated<'_, 'a, Sqlite, &'static str>, &'a T),
) -> Result<()> {
    if rows.is_empty() {
        return Ok(());
    }

    let mut builder = QueryBuilder::<Sqlite>::new(insert);
    builder.push_values(rows, push_row);

    let mut tx = pool.begin().await?;
    builder.build().execute(&mut *tx).await?;
    tx.commit().await?;
    Ok(())
}
