//! Permission enforcement for API routes
//!
//! Thin translation layer: handlers call [`check_permission`] with the
//! authenticated actor and the authorization engine decides; a denial
//! becomes a 403 with the `INSUFFICIENT_PERMISSIONS` code and a message
//! naming the refused resource, action, and the actor's role.

use crate::{
    services::{AuthorizationEngine, PermissionHolder},
    utils::error::AppError,
};

/// Permission requirement for a route
#[derive(Debug, Clone)]
pub struct RequirePermission {
    pub resource: &'static str,
    pub action: &'static str,
}

impl RequirePermission {
    pub fn new(resource: &'static str, action: &'static str) -> Self {
        Self { resource, action }
    }

    pub fn read(resource: &'static str) -> Self {
        Self::new(resource, crate::models::action::READ)
    }

    pub fn write(resource: &'static str) -> Self {
        Self::new(resource, crate::models::action::WRITE)
    }
}

/// Check that the actor holds the permission, or produce the 403 error
pub fn check_permission(
    engine: &AuthorizationEngine,
    actor: &impl PermissionHolder,
    permission: RequirePermission,
) -> Result<(), AppError> {
    engine
        .authorize_permission(actor, permission.resource, permission.action)
        .map(|_rule| ())
        .map_err(|denied| AppError::Forbidden(denied.to_string()))
}
