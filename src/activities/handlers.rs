use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde_json::Value;
use tracing::{error, info, instrument};

use super::{
    dto::{
        ActivityListQuery, ActivityListResponse, LogActivityRequest, LogActivityResponse,
        ProbeResponse,
    },
    repo::{ActivityAction, NewActivity},
};
use crate::{
    auth::extractors::AuthUser,
    error::AppError,
    extract::{AppJson, AppQuery},
    pagination::Pagination,
    state::AppState,
};

pub fn activity_routes() -> Router<AppState> {
    Router::new()
        .route("/activities", get(list_activities))
        .route("/activities/log", post(log_activity))
        .route("/test-activities", get(probe_activities))
}

fn parse_action(raw: &str) -> Result<ActivityAction, AppError> {
    raw.trim().parse::<ActivityAction>().map_err(|_| {
        AppError::validation(
            "Invalid action",
            vec![format!(
                "action must be one of: {}",
                ActivityAction::ALL.map(|a| a.as_str()).join(", ")
            )],
        )
    })
}

#[instrument(skip(state, auth), fields(user_id = %auth.id()))]
pub async fn list_activities(
    State(state): State<AppState>,
    auth: AuthUser,
    AppQuery(q): AppQuery<ActivityListQuery>,
) -> Result<Json<ActivityListResponse>, AppError> {
    let user_id = auth.id();
    let action = match q.action.as_deref().filter(|a| !a.trim().is_empty()) {
        Some(raw) => Some(parse_action(raw)?),
        None => None,
    };
    let req = q.page_request();

    let (activities, total) = tokio::try_join!(
        state.activities.list(user_id, action, req.limit, req.offset()),
        state.activities.count(user_id, action),
    )
    .map_err(|e| {
        error!(error = %e, "list activities failed");
        AppError::upstream("Failed to fetch activities", e)
    })?;

    Ok(Json(ActivityListResponse {
        activities,
        pagination: Pagination::new(req, total),
    }))
}

#[instrument(skip(state, auth, payload), fields(user_id = %auth.id()))]
pub async fn log_activity(
    State(state): State<AppState>,
    auth: AuthUser,
    AppJson(payload): AppJson<LogActivityRequest>,
) -> Result<Json<LogActivityResponse>, AppError> {
    let raw = payload
        .action
        .as_deref()
        .filter(|a| !a.trim().is_empty())
        .ok_or_else(|| AppError::bad_request("Action is required"))?;
    let action = parse_action(raw)?;

    let additional_data = match payload.additional_data {
        None | Some(Value::Null) => Value::Object(Default::default()),
        Some(v @ Value::Object(_)) => v,
        Some(_) => return Err(AppError::bad_request("additionalData must be an object")),
    };

    let activity = state
        .activity_log
        .record(NewActivity {
            user_id: auth.id(),
            action,
            image_id: payload.image_id,
            additional_data,
        })
        .await
        .map_err(|e| {
            error!(error = %e, "explicit activity log failed");
            AppError::upstream("Failed to log activity", e)
        })?;

    info!(activity_id = %activity.id, %action, "activity logged");
    Ok(Json(LogActivityResponse {
        success: true,
        activity,
    }))
}

/// Reports whether the activities table is reachable for this user.
#[instrument(skip(state, auth), fields(user_id = %auth.id()))]
pub async fn probe_activities(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<ProbeResponse>, AppError> {
    match state.activities.count(auth.id(), None).await {
        Ok(count) => Ok(Json(ProbeResponse {
            success: true,
            message: "Activities table is available".to_string(),
            count,
        })),
        Err(e) => {
            error!(error = %e, "activities probe failed");
            Err(AppError::upstream("Activities table is not available", e)
                .with_suggestion("Apply the database migrations to create the activities table"))
        }
    }
}
