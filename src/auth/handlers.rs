use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use tracing::{error, info, instrument, warn};

use crate::{
    auth::{
        dto::{LoginRequest, LoginResponse, PublicUser, RegisterRequest, RegisterResponse},
        password::{check_policy, hash_blocking, is_valid_email, verify_blocking},
        repo::CreateUserError,
        repo_types::NewUser,
    },
    error::AppError,
    extract::AppJson,
    state::AppState,
};

const EMAIL_TAKEN: &str = "User with this email already exists";
const INVALID_CREDENTIALS: &str = "Invalid credentials";

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    AppJson(payload): AppJson<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), AppError> {
    let full_name = payload.full_name.trim().to_string();
    let email = payload.email.trim().to_lowercase();

    if full_name.is_empty() || email.is_empty() || payload.password.is_empty() {
        return Err(AppError::bad_request("All fields are required"));
    }

    if !is_valid_email(&email) {
        warn!(%email, "invalid email");
        return Err(AppError::bad_request("Invalid email"));
    }

    let failures = check_policy(&payload.password);
    if !failures.is_empty() {
        warn!(failed_rules = failures.len(), "weak password rejected");
        return Err(AppError::validation(
            "Password does not meet requirements",
            failures,
        ));
    }

    match state.users.find_by_email(&email).await {
        Ok(Some(_)) => {
            warn!(%email, "email already registered");
            return Err(AppError::bad_request(EMAIL_TAKEN));
        }
        Ok(None) => {}
        Err(e) => {
            error!(error = %e, "find_by_email failed");
            return Err(AppError::upstream("Registration failed", e));
        }
    }

    let password_hash = hash_blocking(payload.password, state.config.bcrypt_cost)
        .await
        .map_err(|e| {
            error!(error = %e, "hash_password failed");
            AppError::upstream("Registration failed", e)
        })?;

    let user = match state
        .users
        .create(NewUser {
            full_name,
            email,
            password_hash,
        })
        .await
    {
        Ok(u) => u,
        Err(CreateUserError::Duplicate) => {
            warn!("email registered concurrently");
            return Err(AppError::bad_request(EMAIL_TAKEN));
        }
        Err(CreateUserError::Other(e)) => {
            error!(error = %e, "create user failed");
            return Err(AppError::upstream("Registration failed", e));
        }
    };

    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "User registered successfully".to_string(),
            user: PublicUser::from(user),
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    AppJson(payload): AppJson<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let email = payload.email.trim().to_lowercase();
    if email.is_empty() || payload.password.is_empty() {
        return Err(AppError::bad_request("Email and password are required"));
    }

    let user = match state.users.find_by_email(&email).await {
        Ok(Some(u)) => u,
        Ok(None) => {
            warn!(%email, "login unknown email");
            return Err(AppError::Unauthorized(INVALID_CREDENTIALS.into()));
        }
        Err(e) => {
            error!(error = %e, "find_by_email failed");
            return Err(AppError::upstream("Login failed", e));
        }
    };

    let ok = verify_blocking(payload.password, user.password_hash.clone())
        .await
        .map_err(|e| {
            error!(error = %e, user_id = %user.id, "verify_password failed");
            AppError::upstream("Login failed", e)
        })?;
    if !ok {
        warn!(user_id = %user.id, "login invalid password");
        return Err(AppError::Unauthorized(INVALID_CREDENTIALS.into()));
    }

    let token = state
        .jwt
        .sign(user.id, &user.email, user.role())
        .map_err(|e| {
            error!(error = %e, "jwt sign failed");
            AppError::upstream("Login failed", e)
        })?;

    info!(user_id = %user.id, "user logged in");
    Ok(Json(LoginResponse {
        token,
        user: PublicUser::from(user),
    }))
}
