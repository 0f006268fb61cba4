use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo_types::{NewUser, ProfileChanges, User};

const USER_COLUMNS: &str =
    "id, full_name, email, password_hash, bio, avatar_url, role, created_at, updated_at";

#[derive(Debug, thiserror::Error)]
pub enum CreateUserError {
    #[error("email already registered")]
    Duplicate,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Access to the `users` table.
#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>>;
    async fn create(&self, new_user: NewUser) -> Result<User, CreateUserError>;
    /// Returns the updated row, or `None` when the user does not exist.
    async fn update_profile(
        &self,
        id: Uuid,
        changes: ProfileChanges,
    ) -> anyhow::Result<Option<User>>;
    async fn update_password(&self, id: Uuid, password_hash: &str) -> anyhow::Result<()>;
    /// Newest first. `search` matches full name or email, case-insensitively.
    async fn list(
        &self,
        search: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> anyhow::Result<Vec<User>>;
    async fn count(&self, search: Option<&str>) -> anyhow::Result<i64>;
    async fn count_created_since(&self, since: OffsetDateTime) -> anyhow::Result<i64>;
    /// Returns `false` when no row was deleted.
    async fn delete(&self, id: Uuid) -> anyhow::Result<bool>;
}

#[derive(Clone)]
pub struct PgUserRepo {
    db: PgPool,
}

impl PgUserRepo {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn like_pattern(search: Option<&str>) -> Option<String> {
    search.map(|s| {
        let escaped = s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
        format!("%{}%", escaped)
    })
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(e) if e.code().as_deref() == Some("23505"))
}

#[async_trait]
impl UserRepo for PgUserRepo {
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await
        .context("find user by email")?;
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("find user by id")?;
        Ok(user)
    }

    async fn create(&self, new_user: NewUser) -> Result<User, CreateUserError> {
        let inserted = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (full_name, email, password_hash)
            VALUES ($1, $2, $3)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(new_user.full_name)
        .bind(new_user.email)
        .bind(new_user.password_hash)
        .fetch_one(&self.db)
        .await;

        inserted.map_err(|e| {
            if is_unique_violation(&e) {
                CreateUserError::Duplicate
            } else {
                CreateUserError::Other(anyhow::Error::new(e).context("insert user"))
            }
        })
    }

    async fn update_profile(
        &self,
        id: Uuid,
        changes: ProfileChanges,
    ) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
               SET full_name  = COALESCE($2, full_name),
                   bio        = COALESCE($3, bio),
                   avatar_url = COALESCE($4, avatar_url),
                   updated_at = now()
             WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(changes.full_name)
        .bind(changes.bio)
        .bind(changes.avatar_url)
        .fetch_optional(&self.db)
        .await
        .context("update profile")?;
        Ok(user)
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> anyhow::Result<()> {
        sqlx::query("UPDATE users SET password_hash = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(password_hash)
            .execute(&self.db)
            .await
            .context("update password")?;
        Ok(())
    }

    async fn list(
        &self,
        search: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> anyhow::Result<Vec<User>> {
        let rows = sqlx::query_as::<_, User>(&format!(
            r#"
            SELECT {USER_COLUMNS}
              FROM users
             WHERE $1::text IS NULL OR full_name ILIKE $1 OR email ILIKE $1
             ORDER BY created_at DESC
             LIMIT $2 OFFSET $3
            "#
        ))
        .bind(like_pattern(search))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db)
        .await
        .context("list users")?;
        Ok(rows)
    }

    async fn count(&self, search: Option<&str>) -> anyhow::Result<i64> {
        let (n,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*)
              FROM users
             WHERE $1::text IS NULL OR full_name ILIKE $1 OR email ILIKE $1
            "#,
        )
        .bind(like_pattern(search))
        .fetch_one(&self.db)
        .await
        .context("count users")?;
        Ok(n)
    }

    async fn count_created_since(&self, since: OffsetDateTime) -> anyhow::Result<i64> {
        let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE created_at >= $1")
            .bind(since)
            .fetch_one(&self.db)
            .await
            .context("count recent users")?;
        Ok(n)
    }

    async fn delete(&self, id: Uuid) -> anyhow::Result<bool> {
        let res = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await
            .context("delete user")?;
        Ok(res.rows_affected() > 0)
    }
}
