//! Audit log API endpoints

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};

use crate::{
    db::AuditRepository,
    middleware::AuthUser,
    models::{AuditLogEntry, AuditLogQuery},
    utils::AppError,
    AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new().route("/", get(list_audit_logs))
}

async fn list_audit_logs(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Query(query): Query<AuditLogQuery>,
) -> Result<Json<Vec<AuditLogEntry>>, AppError> {
    state
        .authz
        .authorize_role(&auth_user, &["admin", "superadmin", "auditor"])
        .map_err(|denied| AppError::Forbidden(denied.to_string()))?;

    // Cross-tenant listing is reserved for super-org administrators
    let org_id = match query.organization_id {
        Some(org_id) if org_id != auth_user.organization_id => {
            state
                .authz
                .authorize_role(&auth_user, &["superadmin"])
                .map_err(|denied| AppError::Forbidden(denied.to_string()))?;
            org_id
        }
        Some(org_id) => org_id,
        None => auth_user.organization_id,
    };

    let repo = AuditRepository::new(&state.db);
    let logs = repo.list(org_id, &query).await.map_err(|e| {
        tracing::error!(error = %e, "Failed to list audit logs");
        AppError::internal("Failed to list audit logs")
    })?;

    Ok(Json(logs))
}
