use anyhow::Context;
use serde_json::json;
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use super::repo::{Image, NewImage};
use crate::{
    activities::{
        logger::prompt_snippet,
        repo::{ActivityAction, NewActivity},
    },
    state::AppState,
    storage::ext_from_mime,
};

/// Object key for a freshly generated image: `generations/<user>/<unix millis>.<ext>`.
pub fn generation_key(user_id: Uuid, at: OffsetDateTime, ext: &str) -> String {
    let millis = at.unix_timestamp_nanos() / 1_000_000;
    format!("generations/{}/{}.{}", user_id, millis, ext)
}

/// Generate an image for `prompt`, store it and record it. Any failing step aborts.
pub async fn generate_and_store(st: &AppState, user_id: Uuid, prompt: &str) -> anyhow::Result<Image> {
    let generated = st.generator.generate(prompt).await?;

    let bucket = &st.config.storage.images_bucket;
    let ext = ext_from_mime(&generated.content_type).unwrap_or("png");
    let key = generation_key(user_id, OffsetDateTime::now_utc(), ext);
    st.storage
        .put_object(bucket, &key, generated.body, &generated.content_type)
        .await
        .context("upload generated image")?;
    let image_url = st.storage.public_url(bucket, &key);

    let inserted = st
        .images
        .insert(NewImage {
            user_id,
            prompt: prompt.to_string(),
            image_url,
            storage_path: key.clone(),
        })
        .await;
    let image = match inserted {
        Ok(image) => image,
        Err(e) => {
            if let Err(cleanup) = st.storage.delete_object(bucket, &key).await {
                warn!(error = %cleanup, %key, "failed to remove orphaned upload");
            }
            return Err(e.context("save image metadata"));
        }
    };

    st.activity_log.spawn(NewActivity {
        user_id,
        action: ActivityAction::Generate,
        image_id: Some(image.id),
        additional_data: json!({ "prompt": prompt_snippet(prompt) }),
    });

    info!(image_id = %image.id, %user_id, "image generated");
    Ok(image)
}

/// Delete an image owned by `user_id`. Returns `None` when no such image exists
/// for that owner. Storage removal failures are logged and do not stop the row delete.
pub async fn delete_owned(
    st: &AppState,
    user_id: Uuid,
    image_id: Uuid,
) -> anyhow::Result<Option<Image>> {
    let Some(image) = st.images.find_owned(image_id, user_id).await? else {
        return Ok(None);
    };

    if let Err(e) = st
        .storage
        .delete_object(&st.config.storage.images_bucket, &image.storage_path)
        .await
    {
        warn!(error = %e, image_id = %image.id, "storage removal failed; deleting row anyway");
    }

    st.images.delete(image.id).await?;

    st.activity_log.spawn(NewActivity {
        user_id,
        action: ActivityAction::Delete,
        image_id: Some(image.id),
        additional_data: json!({ "prompt": prompt_snippet(&image.prompt) }),
    });

    info!(image_id = %image.id, %user_id, "image deleted");
    Ok(Some(image))
}
