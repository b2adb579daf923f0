//! Shared test fixtures
//!
//! Builds an in-memory SQLite database with the full migration set applied,
//! plus factories for the entities the workflow tests need.

use chrono::{Duration, Utc};
use uuid::Uuid;

use vigilit::db::{DbPool, OrganizationRepository, RoleRepository, StudyRepository};
use vigilit::models::{default_organization_uuid, IcsrClassification, Organization, Study};

/// Fresh in-memory database with migrations applied
///
/// A single connection keeps every query on the same in-memory store.
pub async fn test_pool() -> DbPool {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("connect in-memory sqlite");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("run migrations");

    pool
}

/// Seed the default organization with its system roles, returning its id
pub async fn seed_default_org(pool: &DbPool) -> Uuid {
    let org_id = default_organization_uuid();
    let now = Utc::now();
    OrganizationRepository::new(pool)
        .ensure(&Organization {
            id: org_id,
            name: "Default Organization".to_string(),
            slug: "default".to_string(),
            created_at: now,
            updated_at: now,
        })
        .await
        .expect("seed organization");

    RoleRepository::new(pool)
        .seed_system_roles(org_id)
        .await
        .expect("seed system roles");

    org_id
}

/// Insert a queued study with a creation-time offset for ordering tests
pub async fn insert_queued_study(
    pool: &DbPool,
    org_id: Uuid,
    pmid: &str,
    classification: IcsrClassification,
    created_offset_secs: i64,
) -> Study {
    let mut study = Study::new_classified(
        org_id,
        pmid.to_string(),
        Some(format!("Study {}", pmid)),
        classification,
        None,
    );
    study.created_at = Utc::now() + Duration::seconds(created_offset_secs);
    study.updated_at = study.created_at;

    StudyRepository::new(pool)
        .create(&study)
        .await
        .expect("insert study")
}
