use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::{
        dto::{AuthResponse, LoginRequest, RegisterRequest, UpdateProfileRequest, UserResponse},
        jwt::AuthUser,
    },
    error::AppResult,
    response::ApiResponse,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(get_me).put(update_me))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<UserResponse>>)> {
    let user = state.auth.register(payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok("user registered successfully", user.into())),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<ApiResponse<AuthResponse>>> {
    let (token, user) = state.auth.login(payload).await?;
    Ok(Json(ApiResponse::ok(
        "login successful",
        AuthResponse {
            token,
            user: user.into(),
        },
    )))
}

#[instrument(skip(state, user), fields(user_id = user.user_id))]
pub async fn get_me(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<UserResponse>>> {
    let user = state.auth.get_user_by_id(user.user_id).await?;
    Ok(Json(ApiResponse::ok("profile retrieved", user.into())))
}

#[instrument(skip(state, user, payload), fields(user_id = user.user_id))]
pub async fn update_me(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<UpdateProfileRequest>,
) -> AppResult<Json<ApiResponse<UserResponse>>> {
    let user = state.auth.update_profile(user.user_id, payload).await?;
    Ok(Json(ApiResponse::ok("profile updated", user.into())))
}
