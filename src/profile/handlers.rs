use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    routing::{get, patch},
    Json, Router,
};
use bytes::Bytes;
use time::OffsetDateTime;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::dto::{ChangePasswordRequest, MessageResponse, ProfileResponse, UpdateProfileResponse};
use crate::{
    auth::{
        extractors::AuthUser,
        password::{check_policy, hash_blocking, verify_blocking},
        repo_types::ProfileChanges,
    },
    error::AppError,
    extract::AppJson,
    state::AppState,
    storage::ext_from_mime,
};

pub fn profile_routes() -> Router<AppState> {
    Router::new()
        .route("/profile", get(get_profile).patch(update_profile))
        .route("/change-password", patch(change_password))
}

struct AvatarUpload {
    body: Bytes,
    content_type: String,
}

#[derive(Default)]
struct ProfileForm {
    name: Option<String>,
    bio: Option<String>,
    avatar: Option<AvatarUpload>,
}

async fn read_profile_form(mut mp: Multipart) -> Result<ProfileForm, AppError> {
    let mut form = ProfileForm::default();
    while let Some(field) = mp
        .next_field()
        .await
        .map_err(|e| AppError::bad_request(format!("Invalid multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "name" | "fullName" => {
                let text = field.text().await.map_err(|e| AppError::bad_request(e.to_string()))?;
                let text = text.trim();
                if !text.is_empty() {
                    form.name = Some(text.to_string());
                }
            }
            "bio" => {
                let text = field.text().await.map_err(|e| AppError::bad_request(e.to_string()))?;
                form.bio = Some(text.trim().to_string());
            }
            "avatar" => {
                let content_type = field
                    .content_type()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "application/octet-stream".into());
                let body = field.bytes().await.map_err(|e| AppError::bad_request(e.to_string()))?;
                if !body.is_empty() {
                    form.avatar = Some(AvatarUpload { body, content_type });
                }
            }
            other => warn!(field = %other, "ignoring unknown profile field"),
        }
    }
    Ok(form)
}

pub fn avatar_key(user_id: Uuid, at: OffsetDateTime, ext: &str) -> String {
    let millis = at.unix_timestamp_nanos() / 1_000_000;
    format!("{}/avatar-{}.{}", user_id, millis, ext)
}

#[instrument(skip(state, auth), fields(user_id = %auth.id()))]
pub async fn get_profile(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<ProfileResponse>, AppError> {
    let user = state
        .users
        .find_by_id(auth.id())
        .await
        .map_err(|e| {
            error!(error = %e, "load profile failed");
            AppError::upstream("Failed to fetch profile", e)
        })?
        .ok_or_else(|| AppError::not_found("User not found"))?;
    Ok(Json(ProfileResponse::from(user)))
}

#[instrument(skip(state, auth, mp), fields(user_id = %auth.id()))]
pub async fn update_profile(
    State(state): State<AppState>,
    auth: AuthUser,
    mp: Result<Multipart, MultipartRejection>,
) -> Result<Json<UpdateProfileResponse>, AppError> {
    let user_id = auth.id();
    let form = read_profile_form(mp?).await?;

    let bucket = &state.config.storage.avatars_bucket;
    let uploaded_key = match form.avatar {
        Some(upload) => {
            let ext = ext_from_mime(&upload.content_type).unwrap_or("bin");
            let key = avatar_key(user_id, OffsetDateTime::now_utc(), ext);
            state
                .storage
                .put_object(bucket, &key, upload.body, &upload.content_type)
                .await
                .map_err(|e| {
                    error!(error = %e, "avatar upload failed");
                    AppError::upstream("Failed to update profile", e)
                })?;
            Some(key)
        }
        None => None,
    };

    let changes = ProfileChanges {
        full_name: form.name,
        bio: form.bio,
        avatar_url: uploaded_key
            .as_deref()
            .map(|key| state.storage.public_url(bucket, key)),
    };
    let updated = match state.users.update_profile(user_id, changes).await {
        Ok(Some(profile)) => Ok(profile),
        Ok(None) => Err(AppError::not_found("User not found")),
        Err(e) => {
            error!(error = %e, "profile update failed");
            Err(AppError::upstream("Failed to update profile", e))
        }
    };
    let profile = match updated {
        Ok(profile) => profile,
        Err(err) => {
            // The row was not updated; drop the avatar nobody points at.
            if let Some(key) = uploaded_key.as_deref() {
                if let Err(cleanup) = state.storage.delete_object(bucket, key).await {
                    warn!(error = %cleanup, %key, "failed to remove orphaned avatar");
                }
            }
            return Err(err);
        }
    };

    info!("profile updated");
    Ok(Json(UpdateProfileResponse {
        success: true,
        profile,
    }))
}

#[instrument(skip(state, auth, payload), fields(user_id = %auth.id()))]
pub async fn change_password(
    State(state): State<AppState>,
    auth: AuthUser,
    AppJson(payload): AppJson<ChangePasswordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    if payload.current_password.is_empty() || payload.new_password.is_empty() {
        return Err(AppError::bad_request(
            "Current password and new password are required",
        ));
    }

    let failures = check_policy(&payload.new_password);
    if !failures.is_empty() {
        return Err(AppError::validation(
            "Password does not meet requirements",
            failures,
        ));
    }

    let user = state
        .users
        .find_by_id(auth.id())
        .await
        .map_err(|e| {
            error!(error = %e, "load user failed");
            AppError::upstream("Failed to change password", e)
        })?
        .ok_or_else(|| AppError::not_found("User not found"))?;

    let matches = verify_blocking(payload.current_password, user.password_hash)
        .await
        .map_err(|e| AppError::upstream("Failed to change password", e))?;
    if !matches {
        warn!("current password mismatch");
        return Err(AppError::bad_request("Current password is incorrect"));
    }

    let new_hash = hash_blocking(payload.new_password, state.config.bcrypt_cost)
        .await
        .map_err(|e| AppError::upstream("Failed to change password", e))?;
    state
        .users
        .update_password(user.id, &new_hash)
        .await
        .map_err(|e| {
            error!(error = %e, "password update failed");
            AppError::upstream("Failed to change password", e)
        })?;

    info!("password changed");
    Ok(Json(MessageResponse {
        success: true,
        message: "Password updated successfully".to_string(),
    }))
}
