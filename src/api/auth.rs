//! Authentication API endpoints

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use validator::Validate;

use crate::{
    middleware::{create_access_token, AuthUser},
    models::{AuthResponse, LoginRequest, UserPublic},
    services::AuthService,
    utils::AppError,
    AppState,
};

pub fn public_routes() -> Router<AppState> {
    Router::new().route("/login", post(login))
}

pub fn protected_routes() -> Router<AppState> {
    Router::new().route("/me", get(me))
}

async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    request.validate()?;

    let service = AuthService::new(state.db.clone());
    let user = service
        .authenticate(&request.username, &request.password)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Authentication failed");
            AppError::internal("Authentication failed")
        })?
        .ok_or_else(|| AppError::unauthorized("Invalid username or password"))?;

    let expires_in = state.config.auth.token_expiry_secs;
    let access_token = create_access_token(&user, &state.config.auth.jwt_secret, expires_in)?;

    Ok(Json(AuthResponse {
        access_token,
        token_type: "Bearer".to_string(),
        expires_in,
        user: user.into(),
    }))
}

async fn me(State(state): State<AppState>, auth_user: AuthUser) -> Result<Json<UserPublic>, AppError> {
    let repo = crate::db::UserRepository::new(&state.db);
    let user = repo
        .get_by_id(auth_user.id)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;
    Ok(Json(user.into()))
}
