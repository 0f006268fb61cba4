use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use time::OffsetDateTime;
use tracing::{error, info, instrument};
use uuid::Uuid;

use super::{
    dto::{DeleteUserResponse, StatsResponse, UserDetailResponse, UserListQuery, UserListResponse},
    services::{collect_stats, delete_user_cascade},
};
use crate::{
    auth::extractors::AdminUser, error::AppError, extract::AppQuery, pagination::Pagination,
    state::AppState,
};

const USER_NOT_FOUND: &str = "User not found";

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/admin/users", get(list_users))
        .route("/admin/stats", get(stats))
        .route("/admin/users/:user_id", get(get_user).delete(delete_user))
}

fn parse_user_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::not_found(USER_NOT_FOUND))
}

#[instrument(skip(state, _admin))]
pub async fn list_users(
    State(state): State<AppState>,
    _admin: AdminUser,
    AppQuery(q): AppQuery<UserListQuery>,
) -> Result<Json<UserListResponse>, AppError> {
    let req = q.page_request();
    let search = q.search();

    let (users, total) = tokio::try_join!(
        state.users.list(search, req.limit, req.offset()),
        state.users.count(search),
    )
    .map_err(|e| {
        error!(error = %e, "list users failed");
        AppError::upstream("Failed to fetch users", e)
    })?;

    Ok(Json(UserListResponse {
        users,
        pagination: Pagination::new(req, total),
    }))
}

#[instrument(skip(state, _admin))]
pub async fn stats(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<StatsResponse>, AppError> {
    let stats = collect_stats(&state, OffsetDateTime::now_utc())
        .await
        .map_err(|e| {
            error!(error = %e, "collect stats failed");
            AppError::upstream("Failed to fetch stats", e)
        })?;
    Ok(Json(StatsResponse { stats }))
}

#[instrument(skip(state, _admin))]
pub async fn get_user(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(user_id): Path<String>,
) -> Result<Json<UserDetailResponse>, AppError> {
    let user_id = parse_user_id(&user_id)?;

    let user = state
        .users
        .find_by_id(user_id)
        .await
        .map_err(|e| {
            error!(error = %e, "load user failed");
            AppError::upstream("Failed to fetch user", e)
        })?
        .ok_or_else(|| AppError::not_found(USER_NOT_FOUND))?;

    let images = state.images.list_by_user(user_id).await.map_err(|e| {
        error!(error = %e, "load user images failed");
        AppError::upstream("Failed to fetch user", e)
    })?;

    Ok(Json(UserDetailResponse { user, images }))
}

#[instrument(skip(state, admin), fields(admin_id = %admin.0.sub))]
pub async fn delete_user(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(user_id): Path<String>,
) -> Result<Json<DeleteUserResponse>, AppError> {
    let user_id = parse_user_id(&user_id)?;

    let deleted = delete_user_cascade(&state, user_id).await.map_err(|e| {
        error!(error = %e, %user_id, "user cascade failed");
        AppError::upstream("Failed to delete user", e)
    })?;
    if !deleted {
        return Err(AppError::not_found(USER_NOT_FOUND));
    }

    info!(%user_id, "user deleted");
    Ok(Json(DeleteUserResponse {
        success: true,
        message: "User deleted successfully".to_string(),
    }))
}
