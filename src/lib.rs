//! Vigilit Library
//!
//! Core functionality for the Vigilit literature-triage platform:
//! workflow state machine, batch allocation, authorization, and the
//! audit trail, plus the HTTP surface that exposes them.

pub mod api;
pub mod config;
pub mod db;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

pub use config::AppConfig;
pub use db::DbPool;
pub use middleware::{auth_middleware, AuthUser, Claims};
use services::{AuditRecorder, AuthorizationEngine};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,
    /// Database connection pool
    pub db: DbPool,
    /// Authorization engine (role + permission decisions)
    pub authz: AuthorizationEngine,
    /// Best-effort audit trail recorder
    pub audit: AuditRecorder,
}

impl AppState {
    pub fn new(config: AppConfig, db: DbPool) -> Self {
        let authz = AuthorizationEngine::new(config.authorization.super_admin_org_id);
        let audit = AuditRecorder::new(db.clone());
        Self {
            config,
            db,
            authz,
            audit,
        }
    }
}
