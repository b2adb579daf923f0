//! Role management API endpoints

use axum::{
    extract::State,
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::Utc;
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::RoleRepository,
    middleware::{check_permission, AuthUser, RequirePermission},
    models::{action, resource, CreateRoleRequest, Role},
    services::AuditEvent,
    utils::AppError,
    AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new().route("/", get(list_roles).post(create_role))
}

async fn list_roles(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<Json<Vec<Role>>, AppError> {
    check_permission(&state.authz, &auth_user, RequirePermission::read(resource::ROLES))?;

    let repo = RoleRepository::new(&state.db);
    let roles = repo.list(auth_user.organization_id).await?;
    Ok(Json(roles))
}

async fn create_role(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(request): Json<CreateRoleRequest>,
) -> Result<(StatusCode, Json<Role>), AppError> {
    check_permission(
        &state.authz,
        &auth_user,
        RequirePermission::new(resource::ROLES, action::WRITE),
    )?;
    request.validate()?;

    let repo = RoleRepository::new(&state.db);
    // Internal key form: lowercase, spaces as underscores
    let name = request.name.trim().to_lowercase().replace(' ', "_");
    if repo.get_by_name(auth_user.organization_id, &name).await?.is_some() {
        return Err(AppError::Conflict(format!("Role '{}' already exists", name)));
    }

    let now = Utc::now();
    let role = Role {
        id: Uuid::new_v4(),
        organization_id: auth_user.organization_id,
        name,
        display_name: request.display_name,
        description: request.description,
        is_system: false,
        permissions: request.permissions,
        created_at: now,
        updated_at: now,
    };
    let created = repo.create(&role).await?;

    state.audit.record(AuditEvent {
        organization_id: auth_user.organization_id,
        user_id: Some(auth_user.id),
        user_name: Some(auth_user.username.clone()),
        action: "create_role".to_string(),
        resource: resource::ROLES.to_string(),
        resource_id: Some(created.id.to_string()),
        before: None,
        after: serde_json::to_value(&created).ok(),
        metadata: None,
    });

    Ok((StatusCode::CREATED, Json(created)))
}
