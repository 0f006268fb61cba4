use std::{fmt, str::FromStr};

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

/// What the user did.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ActivityAction {
    Generate,
    Delete,
    Download,
    View,
    Edit,
}

impl ActivityAction {
    pub const ALL: [ActivityAction; 5] = [
        ActivityAction::Generate,
        ActivityAction::Delete,
        ActivityAction::Download,
        ActivityAction::View,
        ActivityAction::Edit,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityAction::Generate => "generate",
            ActivityAction::Delete => "delete",
            ActivityAction::Download => "download",
            ActivityAction::View => "view",
            ActivityAction::Edit => "edit",
        }
    }
}

impl fmt::Display for ActivityAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown activity action: {0}")]
pub struct UnknownAction(pub String);

impl FromStr for ActivityAction {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| UnknownAction(s.to_string()))
    }
}

/// Row in the `activities` table.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: Uuid,
    pub user_id: Uuid,
    pub action: String,
    pub image_id: Option<Uuid>,
    pub additional_data: Value,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewActivity {
    pub user_id: Uuid,
    pub action: ActivityAction,
    pub image_id: Option<Uuid>,
    pub additional_data: Value,
}

/// Minimal image fields joined onto a listed activity.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ActivityImage {
    pub id: Uuid,
    pub prompt: String,
    pub image_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActivityEntry {
    #[serde(flatten)]
    pub activity: Activity,
    pub image: Option<ActivityImage>,
}

#[derive(Debug, FromRow)]
struct ActivityRow {
    id: Uuid,
    user_id: Uuid,
    action: String,
    image_id: Option<Uuid>,
    additional_data: Value,
    created_at: OffsetDateTime,
    joined_image_id: Option<Uuid>,
    image_prompt: Option<String>,
    image_url: Option<String>,
}

impl From<ActivityRow> for ActivityEntry {
    fn from(r: ActivityRow) -> Self {
        let image = match (r.joined_image_id, r.image_prompt, r.image_url) {
            (Some(id), Some(prompt), Some(image_url)) => Some(ActivityImage {
                id,
                prompt,
                image_url,
            }),
            _ => None,
        };
        Self {
            activity: Activity {
                id: r.id,
                user_id: r.user_id,
                action: r.action,
                image_id: r.image_id,
                additional_data: r.additional_data,
                created_at: r.created_at,
            },
            image,
        }
    }
}

/// Access to the append-only `activities` table.
#[async_trait]
pub trait ActivityRepo: Send + Sync {
    async fn insert(&self, entry: NewActivity) -> anyhow::Result<Activity>;
    /// Newest first, joined with the referenced image when it still exists.
    async fn list(
        &self,
        user_id: Uuid,
        action: Option<ActivityAction>,
        limit: i64,
        offset: i64,
    ) -> anyhow::Result<Vec<ActivityEntry>>;
    async fn count(&self, user_id: Uuid, action: Option<ActivityAction>) -> anyhow::Result<i64>;
}

#[derive(Clone)]
pub struct PgActivityRepo {
    db: PgPool,
}

impl PgActivityRepo {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ActivityRepo for PgActivityRepo {
    async fn insert(&self, entry: NewActivity) -> anyhow::Result<Activity> {
        let row = sqlx::query_as::<_, Activity>(
            r#"
            INSERT INTO activities (user_id, action, image_id, additional_data)
            VALUES ($1, $2, $3, $4)
            RETURNING id, user_id, action, image_id, additional_data, created_at
            "#,
        )
        .bind(entry.user_id)
        .bind(entry.action.as_str())
        .bind(entry.image_id)
        .bind(entry.additional_data)
        .fetch_one(&self.db)
        .await
        .context("insert activity")?;
        Ok(row)
    }

    async fn list(
        &self,
        user_id: Uuid,
        action: Option<ActivityAction>,
        limit: i64,
        offset: i64,
    ) -> anyhow::Result<Vec<ActivityEntry>> {
        let rows = sqlx::query_as::<_, ActivityRow>(
            r#"
            SELECT a.id, a.user_id, a.action, a.image_id, a.additional_data, a.created_at,
                   i.id        AS joined_image_id,
                   i.prompt    AS image_prompt,
                   i.image_url AS image_url
              FROM activities a
              LEFT JOIN images i ON i.id = a.image_id
             WHERE a.user_id = $1
               AND ($2::text IS NULL OR a.action = $2)
             ORDER BY a.created_at DESC
             LIMIT $3 OFFSET $4
            "#,
        )
        .bind(user_id)
        .bind(action.map(|a| a.as_str()))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db)
        .await
        .context("list activities")?;
        Ok(rows.into_iter().map(ActivityEntry::from).collect())
    }

    async fn count(&self, user_id: Uuid, action: Option<ActivityAction>) -> anyhow::Result<i64> {
        let (n,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*)
              FROM activities
             WHERE user_id = $1
               AND ($2::text IS NULL OR action = $2)
            "#,
        )
        .bind(user_id)
        .bind(action.map(|a| a.as_str()))
        .fetch_one(&self.db)
        .await
        .context("count activities")?;
        Ok(n)
    }
}
