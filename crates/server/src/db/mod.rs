pub mod listing;
pub mod models;

use chrono::Utc;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use uuid::Uuid;

use crate::services::password;

#[derive(Clone)]
pub struct Database {
    pub pool: SqlitePool,
}

impl Database {
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        // Ensure the data directory exists
        if let Some(path) = url.strip_prefix("sqlite:") {
            let path = path.split('?').next().unwrap_or(path);
            if let Some(parent) = std::path::Path::new(path).parent() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await?;

        Ok(Self { pool })
    }

    /// A private in-memory database. Every connection to `sqlite::memory:` opens a
    /// fresh database, so the pool is pinned to a single connection that never expires.
    pub async fn connect_in_memory() -> anyhow::Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Creates the bootstrap admin account when the users table is empty.
    /// Returns whether an account was created.
    pub async fn ensure_default_admin(&self, email: &str, plain_password: &str) -> anyhow::Result<bool> {
        let users = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        if users > 0 {
            return Ok(false);
        }

        let password_hash = password::hash_password(plain_password)?;
        let id = Uuid::new_v4().to_string();
        let email = email.trim().to_lowercase();

        sqlx::query(
            "INSERT INTO users (id, first_name, last_name, email, password_hash, role, created_at, search_text) VALUES (?, ?, ?, ?, ?, 'admin', ?, ?)",
        )
        .bind(&id)
        .bind("admin")
        .bind("admin")
        .bind(&email)
        .bind(&password_hash)
        .bind(Utc::now())
        .bind(listing::search_text(&["admin", "admin", &email]))
        .execute(&self.pool)
        .await?;

        tracing::info!(user_id = %id, email = %email, "Created default admin account");
        Ok(true)
    }
}
