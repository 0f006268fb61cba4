use anyhow::Context;
use time::{Duration, OffsetDateTime};
use tracing::{info, warn};
use uuid::Uuid;

use super::dto::Stats;
use crate::state::AppState;

/// Window used for the "new users" and "recent images" counters.
pub const RECENT_WINDOW: Duration = Duration::days(30);

pub async fn collect_stats(st: &AppState, now: OffsetDateTime) -> anyhow::Result<Stats> {
    let since = now - RECENT_WINDOW;
    let (total_users, total_images, new_users, recent_images) = tokio::try_join!(
        st.users.count(None),
        st.images.count(),
        st.users.count_created_since(since),
        st.images.count_created_since(since),
    )?;
    Ok(Stats {
        total_users,
        total_images,
        new_users,
        recent_images,
    })
}

/// Removes a user together with their images.
///
/// Storage objects go first, then image rows, then the user. Only a failed user delete
/// aborts; earlier failures are logged. Returns `false` when the user does not exist.
pub async fn delete_user_cascade(st: &AppState, user_id: Uuid) -> anyhow::Result<bool> {
    if st.users.find_by_id(user_id).await?.is_none() {
        return Ok(false);
    }

    let bucket = &st.config.storage.images_bucket;
    match st.images.list_by_user(user_id).await {
        Ok(images) => {
            for image in &images {
                if let Err(e) = st.storage.delete_object(bucket, &image.storage_path).await {
                    warn!(error = %e, image_id = %image.id, "storage delete failed during cascade");
                }
            }
        }
        Err(e) => warn!(error = %e, %user_id, "listing images for cascade failed"),
    }

    match st.images.delete_by_user(user_id).await {
        Ok(n) => info!(%user_id, removed = n, "image rows removed"),
        Err(e) => warn!(error = %e, %user_id, "image row delete failed during cascade"),
    }

    let deleted = st
        .users
        .delete(user_id)
        .await
        .context("delete user row")?;
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::auth::{claims::Role, repo::UserRepo};
    use crate::images::repo::ImageRepo;
    use crate::testing::TestContext;

    #[tokio::test]
    async fn stats_count_trailing_window() {
        let ctx = TestContext::new();
        let now = OffsetDateTime::now_utc();
        let fresh = ctx.seed_user("Ada", "ada@example.com", "Secret#1x", Role::User).await;
        let old = ctx.seed_user("Bob", "bob@example.com", "Secret#1x", Role::User).await;
        ctx.users.backdate(old.id, now - Duration::days(45));

        let recent = ctx.seed_image(fresh.id, "a red fox").await;
        let stale = ctx.seed_image(old.id, "a grey wolf").await;
        ctx.images.backdate(stale.id, now - Duration::days(31));
        assert_ne!(recent.id, stale.id);

        let stats = collect_stats(&ctx.state, now).await.unwrap();
        assert_eq!(
            stats,
            Stats {
                total_users: 2,
                total_images: 2,
                new_users: 1,
                recent_images: 1,
            }
        );
    }

    #[tokio::test]
    async fn cascade_survives_storage_failures() {
        let ctx = TestContext::new();
        let user = ctx.seed_user("Ada", "ada@example.com", "Secret#1x", Role::User).await;
        ctx.seed_image(user.id, "a red fox").await;
        ctx.storage.fail_deletes.store(true, Ordering::SeqCst);

        assert!(delete_user_cascade(&ctx.state, user.id).await.unwrap());
        assert!(ctx.users.find_by_id(user.id).await.unwrap().is_none());
        assert!(ctx.images.list_by_user(user.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn cascade_on_missing_user_is_false() {
        let ctx = TestContext::new();
        assert!(!delete_user_cascade(&ctx.state, Uuid::new_v4()).await.unwrap());
    }
}
