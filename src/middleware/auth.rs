//! JWT Authentication Middleware
//!
//! Bearer-token authentication for the API. The token carries identity
//! only; the actor's role and permission matrix are re-resolved from
//! storage on every request so revocations take effect immediately.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    db::UserRepository,
    models::{PermissionMatrix, User},
    services::PermissionHolder,
    utils::error::ErrorResponse,
    AppState,
};

/// JWT Claims structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    pub username: String,
    /// Organization/tenant ID
    pub organization_id: String,
    /// Role name at issue time (informational; re-resolved per request)
    pub role: String,
    /// Issued at timestamp
    pub iat: i64,
    /// Expiration timestamp
    pub exp: i64,
    /// Not before timestamp
    pub nbf: i64,
    /// JWT ID (unique identifier for this token)
    pub jti: String,
}

/// Create a signed access token for a user
pub fn create_access_token(user: &User, secret: &str, expiry_secs: u64) -> anyhow::Result<String> {
    let now = Utc::now();
    let claims = Claims {
        sub: user.id.to_string(),
        username: user.username.clone(),
        organization_id: user.organization_id.to_string(),
        role: user.role.clone(),
        iat: now.timestamp(),
        exp: (now + Duration::seconds(expiry_secs as i64)).timestamp(),
        nbf: now.timestamp(),
        jti: Uuid::new_v4().to_string(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| anyhow::anyhow!("Failed to sign access token: {}", e))
}

fn decode_token(token: &str, secret: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(data.claims)
}

/// Authenticated actor attached to the request after auth middleware
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub username: String,
    /// Role name resolved from storage
    pub role: String,
    pub role_display_name: Option<String>,
    /// Permission matrix resolved from the role
    pub permissions: PermissionMatrix,
}

impl PermissionHolder for AuthUser {
    fn actor_id(&self) -> Uuid {
        self.id
    }

    fn actor_organization_id(&self) -> Uuid {
        self.organization_id
    }

    fn role_name(&self) -> &str {
        &self.role
    }

    fn role_display_name(&self) -> Option<&str> {
        self.role_display_name.as_deref()
    }

    fn permission_matrix(&self) -> &PermissionMatrix {
        &self.permissions
    }
}

fn unauthorized(message: &str) -> Response {
    let body = ErrorResponse::new("unauthorized", message).with_code("AUTH_REQUIRED");
    (StatusCode::UNAUTHORIZED, Json(body)).into_response()
}

/// Authentication middleware for protected routes
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(token) = bearer_token(&request) else {
        return unauthorized("Missing authorization token");
    };

    let claims = match decode_token(&token, &state.config.auth.jwt_secret) {
        Ok(claims) => claims,
        Err(_) => return unauthorized("Invalid or expired token"),
    };

    let Ok(user_id) = Uuid::parse_str(&claims.sub) else {
        return unauthorized("Invalid token subject");
    };

    let repo = UserRepository::new(&state.db);
    let resolved = match repo.resolve(user_id).await {
        Ok(Some(resolved)) if resolved.user.is_active => resolved,
        Ok(_) => return unauthorized("Unknown or inactive user"),
        Err(err) => {
            tracing::error!(error = %err, "Failed to resolve authenticated user");
            return unauthorized("Unknown or inactive user");
        }
    };

    let auth_user = AuthUser {
        id: resolved.user.id,
        organization_id: resolved.user.organization_id,
        username: resolved.user.username.clone(),
        role: resolved.user.role.clone(),
        role_display_name: resolved.role_display_name.clone(),
        permissions: resolved.permissions.clone(),
    };

    request.extensions_mut().insert(auth_user);
    next.run(request).await
}

fn bearer_token(request: &Request) -> Option<String> {
    request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_string)
}

/// Extractor for AuthUser from request extensions
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or_else(|| unauthorized("Authentication required"))
    }
}
