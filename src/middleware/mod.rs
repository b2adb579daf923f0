//! HTTP middleware

pub mod auth;
pub mod rbac;

pub use auth::{auth_middleware, create_access_token, AuthUser, Claims};
pub use rbac::{check_permission, RequirePermission};
