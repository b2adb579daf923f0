//! Database layer
//!
//! SQLite-backed repositories for the study store, RBAC records, and the
//! audit trail. Uuids and timestamps are stored as TEXT (RFC 3339 for
//! times); every query is scoped by `organization_id` for tenant isolation.

pub mod audit_repository;
pub mod organization_repository;
pub mod role_repository;
pub mod study_repository;
pub mod user_repository;

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Sqlite};
use uuid::Uuid;

pub use audit_repository::AuditRepository;
pub use organization_repository::OrganizationRepository;
pub use role_repository::RoleRepository;
pub use study_repository::StudyRepository;
pub use user_repository::UserRepository;

/// Database connection pool type
pub type DbPool = Pool<Sqlite>;

/// Initialize the database connection pool and run migrations
pub async fn init_pool(database_url: &str, max_connections: u32) -> Result<DbPool> {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

pub(crate) fn parse_db_timestamp(ts: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(ts) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(ts, "%Y-%m-%d %H:%M:%S") {
        return DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc);
    }
    Utc::now()
}

pub(crate) fn parse_db_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| anyhow::anyhow!("Invalid UUID in database: {} ({})", s, e))
}
