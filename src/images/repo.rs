use anyhow::Context;
use async_trait::async_trait;
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

/// Generated image metadata.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    pub id: Uuid,
    pub user_id: Uuid,
    pub prompt: String,
    pub image_url: String,
    pub storage_path: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewImage {
    pub user_id: Uuid,
    pub prompt: String,
    pub image_url: String,
    pub storage_path: String,
}

/// Access to the `images` table.
#[async_trait]
pub trait ImageRepo: Send + Sync {
    async fn insert(&self, image: NewImage) -> anyhow::Result<Image>;
    /// Newest first.
    async fn list_by_user(&self, user_id: Uuid) -> anyhow::Result<Vec<Image>>;
    /// Only returns the image when it belongs to `user_id`.
    async fn find_owned(&self, id: Uuid, user_id: Uuid) -> anyhow::Result<Option<Image>>;
    async fn delete(&self, id: Uuid) -> anyhow::Result<bool>;
    async fn delete_by_user(&self, user_id: Uuid) -> anyhow::Result<u64>;
    async fn count(&self) -> anyhow::Result<i64>;
    async fn count_created_since(&self, since: OffsetDateTime) -> anyhow::Result<i64>;
}

#[derive(Clone)]
pub struct PgImageRepo {
    db: PgPool,
}

impl PgImageRepo {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ImageRepo for PgImageRepo {
    async fn insert(&self, image: NewImage) -> anyhow::Result<Image> {
        let row = sqlx::query_as::<_, Image>(
            r#"
            INSERT INTO images (user_id, prompt, image_url, storage_path)
            VALUES ($1, $2, $3, $4)
            RETURNING id, user_id, prompt, image_url, storage_path, created_at
            "#,
        )
        .bind(image.user_id)
        .bind(image.prompt)
        .bind(image.image_url)
        .bind(image.storage_path)
        .fetch_one(&self.db)
        .await
        .context("insert image")?;
        Ok(row)
    }

    async fn list_by_user(&self, user_id: Uuid) -> anyhow::Result<Vec<Image>> {
        let rows = sqlx::query_as::<_, Image>(
            r#"
            SELECT id, user_id, prompt, image_url, storage_path, created_at
              FROM images
             WHERE user_id = $1
             ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await
        .context("list images by user")?;
        Ok(rows)
    }

    async fn find_owned(&self, id: Uuid, user_id: Uuid) -> anyhow::Result<Option<Image>> {
        let row = sqlx::query_as::<_, Image>(
            r#"
            SELECT id, user_id, prompt, image_url, storage_path, created_at
              FROM images
             WHERE id = $1 AND user_id = $2
            "#,
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.db)
        .await
        .context("find owned image")?;
        Ok(row)
    }

    async fn delete(&self, id: Uuid) -> anyhow::Result<bool> {
        let res = sqlx::query("DELETE FROM images WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await
            .context("delete image")?;
        Ok(res.rows_affected() > 0)
    }

    async fn delete_by_user(&self, user_id: Uuid) -> anyhow::Result<u64> {
        let res = sqlx::query("DELETE FROM images WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.db)
            .await
            .context("delete images by user")?;
        Ok(res.rows_affected())
    }

    async fn count(&self) -> anyhow::Result<i64> {
        let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM images")
            .fetch_one(&self.db)
            .await
            .context("count images")?;
        Ok(n)
    }

    async fn count_created_since(&self, since: OffsetDateTime) -> anyhow::Result<i64> {
        let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM images WHERE created_at >= $1")
            .bind(since)
            .fetch_one(&self.db)
            .await
            .context("count recent images")?;
        Ok(n)
    }
}
