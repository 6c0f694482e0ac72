//! Account removal.
//!
//! Deleting a user must not leave tasks or comments pointing at a missing row, so the
//! removal runs as a fixed sequence against an [`AccountStore`]:
//!
//! 1. refuse if the user still manages a project;
//! 2. hand their authored and assigned tasks to the fallback admin, or delete those
//!    tasks when there is no other admin;
//! 3. delete the comments they wrote;
//! 4. delete the user row (memberships cascade).

use axum::async_trait;
use serde::Serialize;
use sqlx::SqliteConnection;

use crate::error::{AppError, Result};

#[async_trait]
pub trait AccountStore: Send {
    async fn user_exists(&mut self, user_id: &str) -> Result<bool>;
    async fn count_managed_projects(&mut self, user_id: &str) -> Result<i64>;
    /// The admin that inherits orphaned tasks, never `excluding` itself.
    async fn find_fallback_admin(&mut self, excluding: &str) -> Result<Option<String>>;
    /// Hands every task `from` wrote or is assigned to over to `to`.
    /// Returns the number of distinct tasks touched.
    async fn reassign_tasks(&mut self, from: &str, to: &str) -> Result<u64>;
    async fn delete_tasks_of(&mut self, user_id: &str) -> Result<u64>;
    async fn delete_comments_by(&mut self, user_id: &str) -> Result<u64>;
    async fn delete_user(&mut self, user_id: &str) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "action")]
pub enum TaskDisposition {
    Reassigned { to: String, count: u64 },
    Deleted { count: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletionReport {
    pub user_id: String,
    pub tasks: TaskDisposition,
    pub comments_deleted: u64,
}

pub async fn delete_user<S>(store: &mut S, user_id: &str) -> Result<DeletionReport>
where
    S: AccountStore + ?Sized,
{
    if !store.user_exists(user_id).await? {
        return Err(AppError::NotFound("User not found".to_string()));
    }

    let managed = store.count_managed_projects(user_id).await?;
    if managed > 0 {
        return Err(AppError::Conflict(format!(
            "Cannot delete a user who manages {managed} project(s); reassign them to another manager first"
        )));
    }

    let tasks = match store.find_fallback_admin(user_id).await? {
        Some(admin_id) => {
            let count = store.reassign_tasks(user_id, &admin_id).await?;
            TaskDisposition::Reassigned {
                to: admin_id,
                count,
            }
        }
        None => TaskDisposition::Deleted {
            count: store.delete_tasks_of(user_id).await?,
        },
    };

    let comments_deleted = store.delete_comments_by(user_id).await?;
    store.delete_user(user_id).await?;

    Ok(DeletionReport {
        user_id: user_id.to_string(),
        tasks,
        comments_deleted,
    })
}

/// [`AccountStore`] over a single SQLite connection, normally an open transaction.
pub struct SqliteAccountStore<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> SqliteAccountStore<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl AccountStore for SqliteAccountStore<'_> {
    async fn user_exists(&mut self, user_id: &str) -> Result<bool> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_one(&mut *self.conn)
            .await?;
        Ok(count > 0)
    }

    async fn count_managed_projects(&mut self, user_id: &str) -> Result<i64> {
        let count =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM projects WHERE manager_id = ?")
                .bind(user_id)
                .fetch_one(&mut *self.conn)
                .await?;
        Ok(count)
    }

    async fn find_fallback_admin(&mut self, excluding: &str) -> Result<Option<String>> {
        let admin = sqlx::query_scalar::<_, String>(
            "SELECT id FROM users WHERE role = 'admin' AND id != ? ORDER BY created_at ASC, rowid ASC LIMIT 1",
        )
        .bind(excluding)
        .fetch_optional(&mut *self.conn)
        .await?;
        Ok(admin)
    }

    async fn reassign_tasks(&mut self, from: &str, to: &str) -> Result<u64> {
        // One statement, so a task both written and assigned by `from` counts once
        let reassigned = sqlx::query(
            r#"
            UPDATE tasks
            SET author_id = CASE WHEN author_id = ?1 THEN ?2 ELSE author_id END,
                assignee_id = CASE WHEN assignee_id = ?1 THEN ?2 ELSE assignee_id END
            WHERE author_id = ?1 OR assignee_id = ?1
            "#,
        )
        .bind(from)
        .bind(to)
        .execute(&mut *self.conn)
        .await?
        .rows_affected();
        Ok(reassigned)
    }

    async fn delete_tasks_of(&mut self, user_id: &str) -> Result<u64> {
        let deleted = sqlx::query("DELETE FROM tasks WHERE assignee_id = ? OR author_id = ?")
            .bind(user_id)
            .bind(user_id)
            .execute(&mut *self.conn)
            .await?
            .rows_affected();
        Ok(deleted)
    }

    async fn delete_comments_by(&mut self, user_id: &str) -> Result<u64> {
        let deleted = sqlx::query("DELETE FROM comments WHERE author_id = ?")
            .bind(user_id)
            .execute(&mut *self.conn)
            .await?
            .rows_affected();
        Ok(deleted)
    }

    async fn delete_user(&mut self, user_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(user_id)
            .execute(&mut *self.conn)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct FakeStore {
        exists: bool,
        managed_projects: i64,
        admin: Option<String>,
        calls: Vec<String>,
    }

    #[async_trait]
    impl AccountStore for FakeStore {
        async fn user_exists(&mut self, _user_id: &str) -> Result<bool> {
            Ok(self.exists)
        }

        async fn count_managed_projects(&mut self, _user_id: &str) -> Result<i64> {
            self.calls.push("count_managed_projects".into());
            Ok(self.managed_projects)
        }

        async fn find_fallback_admin(&mut self, _excluding: &str) -> Result<Option<String>> {
            self.calls.push("find_fallback_admin".into());
            Ok(self.admin.clone())
        }

        async fn reassign_tasks(&mut self, from: &str, to: &str) -> Result<u64> {
            self.calls.push(format!("reassign_tasks {from}->{to}"));
            Ok(3)
        }

        async fn delete_tasks_of(&mut self, user_id: &str) -> Result<u64> {
            self.calls.push(format!("delete_tasks_of {user_id}"));
            Ok(2)
        }

        async fn delete_comments_by(&mut self, user_id: &str) -> Result<u64> {
            self.calls.push(format!("delete_comments_by {user_id}"));
            Ok(4)
        }

        async fn delete_user(&mut self, user_id: &str) -> Result<()> {
            self.calls.push(format!("delete_user {user_id}"));
            Ok(())
        }
    }

    #[tokio::test]
    async fn reassigns_tasks_before_removing_comments_and_user() {
        let mut store = FakeStore {
            exists: true,
            admin: Some("root".into()),
            ..Default::default()
        };

        let report = delete_user(&mut store, "u1").await.unwrap();

        assert_eq!(
            store.calls,
            vec![
                "count_managed_projects",
                "find_fallback_admin",
                "reassign_tasks u1->root",
                "delete_comments_by u1",
                "delete_user u1",
            ]
        );
        assert_eq!(
            report.tasks,
            TaskDisposition::Reassigned {
                to: "root".into(),
                count: 3
            }
        );
        assert_eq!(report.comments_deleted, 4);
    }

    #[tokio::test]
    async fn deletes_tasks_when_no_admin_remains() {
        let mut store = FakeStore {
            exists: true,
            ..Default::default()
        };

        let report = delete_user(&mut store, "u1").await.unwrap();

        assert_eq!(
            store.calls,
            vec![
                "count_managed_projects",
                "find_fallback_admin",
                "delete_tasks_of u1",
                "delete_comments_by u1",
                "delete_user u1",
            ]
        );
        assert_eq!(report.tasks, TaskDisposition::Deleted { count: 2 });
    }

    #[tokio::test]
    async fn project_managers_are_protected() {
        let mut store = FakeStore {
            exists: true,
            managed_projects: 2,
            admin: Some("root".into()),
            ..Default::default()
        };

        let err = delete_user(&mut store, "u1").await.unwrap_err();

        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(store.calls, vec!["count_managed_projects"]);
    }

    #[tokio::test]
    async fn unknown_user_is_not_found() {
        let mut store = FakeStore::default();

        let err = delete_user(&mut store, "ghost").await.unwrap_err();

        assert!(matches!(err, AppError::NotFound(_)));
        assert!(store.calls.is_empty());
    }

    mod sqlite {
        use chrono::Utc;

        use crate::{
            db::Database,
            services::accounts::{delete_user, DeletionReport, SqliteAccountStore, TaskDisposition},
        };

        async fn add_user(db: &Database, id: &str, role: &str) {
            sqlx::query(
                "INSERT INTO users (id, first_name, last_name, email, password_hash, role, created_at) VALUES (?, 'Test', 'Person', ?, 'x', ?, ?)",
            )
            .bind(id)
            .bind(format!("{id}@example.com"))
            .bind(role)
            .bind(Utc::now())
            .execute(&db.pool)
            .await
            .unwrap();
        }

        async fn add_task(db: &Database, id: &str, author: &str, assignee: Option<&str>) {
            let now = Utc::now();
            sqlx::query(
                "INSERT INTO tasks (id, title, project_id, author_id, assignee_id, created_at, updated_at) VALUES (?, ?, 'p1', ?, ?, ?, ?)",
            )
            .bind(id)
            .bind(format!("Task {id}"))
            .bind(author)
            .bind(assignee)
            .bind(now)
            .bind(now)
            .execute(&db.pool)
            .await
            .unwrap();
        }

        async fn add_comment(db: &Database, id: &str, task: &str, author: &str) {
            sqlx::query(
                "INSERT INTO comments (id, content, task_id, author_id, created_at) VALUES (?, 'Noted', ?, ?, ?)",
            )
            .bind(id)
            .bind(task)
            .bind(author)
            .bind(Utc::now())
            .execute(&db.pool)
            .await
            .unwrap();
        }

        /// A manager owning project `p1` and the user `u1` who is deleted.
        async fn setup() -> Database {
            let db = Database::connect_in_memory().await.unwrap();
            db.run_migrations().await.unwrap();
            add_user(&db, "m1", "manager").await;
            add_user(&db, "u1", "user").await;
            sqlx::query(
                "INSERT INTO projects (id, name, manager_id, created_at) VALUES ('p1', 'Apollo', 'm1', ?)",
            )
            .bind(Utc::now())
            .execute(&db.pool)
            .await
            .unwrap();

            add_task(&db, "t-both", "u1", Some("u1")).await;
            add_task(&db, "t-authored", "u1", Some("m1")).await;
            add_task(&db, "t-assigned", "m1", Some("u1")).await;
            add_task(&db, "t-other", "m1", None).await;
            add_comment(&db, "c-own", "t-other", "u1").await;
            add_comment(&db, "c-on-deleted-task", "t-both", "m1").await;
            db
        }

        async fn delete(db: &Database, user_id: &str) -> DeletionReport {
            let mut tx = db.pool.begin().await.unwrap();
            let report = delete_user(&mut SqliteAccountStore::new(&mut *tx), user_id)
                .await
                .unwrap();
            tx.commit().await.unwrap();
            report
        }

        async fn count(db: &Database, sql: &str) -> i64 {
            sqlx::query_scalar::<_, i64>(sql)
                .fetch_one(&db.pool)
                .await
                .unwrap()
        }

        #[tokio::test]
        async fn without_an_admin_the_users_tasks_are_deleted() {
            let db = setup().await;

            let report = delete(&db, "u1").await;

            assert_eq!(report.tasks, TaskDisposition::Deleted { count: 3 });
            assert_eq!(report.comments_deleted, 1);
            assert_eq!(
                count(&db, "SELECT COUNT(*) FROM tasks WHERE author_id = 'u1' OR assignee_id = 'u1'").await,
                0
            );
            assert_eq!(count(&db, "SELECT COUNT(*) FROM tasks").await, 1);
            // Comments on the removed tasks go with them
            assert_eq!(count(&db, "SELECT COUNT(*) FROM comments").await, 0);
            assert_eq!(count(&db, "SELECT COUNT(*) FROM users WHERE id = 'u1'").await, 0);
        }

        #[tokio::test]
        async fn with_an_admin_each_task_is_reassigned_once() {
            let db = setup().await;
            add_user(&db, "a1", "admin").await;

            let report = delete(&db, "u1").await;

            assert_eq!(
                report.tasks,
                TaskDisposition::Reassigned {
                    to: "a1".into(),
                    count: 3
                }
            );
            assert_eq!(count(&db, "SELECT COUNT(*) FROM tasks").await, 4);
            assert_eq!(
                count(&db, "SELECT COUNT(*) FROM tasks WHERE author_id = 'a1' AND assignee_id = 'a1'").await,
                1
            );
            assert_eq!(
                count(&db, "SELECT COUNT(*) FROM tasks WHERE author_id = 'u1' OR assignee_id = 'u1'").await,
                0
            );
            assert_eq!(count(&db, "SELECT COUNT(*) FROM comments").await, 1);
        }
    }
}
