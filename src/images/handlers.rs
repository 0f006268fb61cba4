use axum::{
    extract::{Path, State},
    routing::{delete, get, post},
    Json, Router,
};
use tracing::{error, instrument, warn};
use uuid::Uuid;

use super::{
    dto::{DeleteImageResponse, GenerateImageRequest, GenerateImageResponse},
    repo::Image,
    services,
};
use crate::{auth::extractors::AuthUser, error::AppError, extract::AppJson, state::AppState};

pub fn image_routes() -> Router<AppState> {
    Router::new()
        .route("/generate-image", post(generate_image))
        .route("/my-creations", get(my_creations))
        .route("/images/:image_id", delete(delete_image))
}

#[instrument(skip(state, auth, payload), fields(user_id = %auth.id()))]
pub async fn generate_image(
    State(state): State<AppState>,
    auth: AuthUser,
    AppJson(payload): AppJson<GenerateImageRequest>,
) -> Result<Json<GenerateImageResponse>, AppError> {
    let prompt = payload.prompt.trim();
    if prompt.is_empty() {
        return Err(AppError::bad_request("Prompt is required"));
    }

    let image = services::generate_and_store(&state, auth.id(), prompt)
        .await
        .map_err(|e| {
            error!(error = %e, "image generation failed");
            AppError::upstream("Failed to generate image", e)
        })?;

    Ok(Json(GenerateImageResponse {
        success: true,
        image_url: image.image_url,
        image_id: image.id,
    }))
}

#[instrument(skip(state, auth), fields(user_id = %auth.id()))]
pub async fn my_creations(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<Image>>, AppError> {
    let images = state.images.list_by_user(auth.id()).await.map_err(|e| {
        error!(error = %e, "list creations failed");
        AppError::upstream("Failed to fetch images", e)
    })?;
    Ok(Json(images))
}

#[instrument(skip(state, auth), fields(user_id = %auth.id()))]
pub async fn delete_image(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(image_id): Path<String>,
) -> Result<Json<DeleteImageResponse>, AppError> {
    let Ok(image_id) = Uuid::parse_str(&image_id) else {
        warn!(%image_id, "malformed image id");
        return Err(AppError::not_found("Image not found"));
    };

    match services::delete_owned(&state, auth.id(), image_id).await {
        Ok(Some(_)) => Ok(Json(DeleteImageResponse {
            success: true,
            message: "Image deleted successfully".to_string(),
        })),
        Ok(None) => Err(AppError::not_found("Image not found")),
        Err(e) => {
            error!(error = %e, %image_id, "delete image failed");
            Err(AppError::upstream("Failed to delete image", e))
        }
    }
}
