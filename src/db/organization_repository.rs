//! Organization repository

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::{parse_db_timestamp, parse_db_uuid};
use crate::models::Organization;

#[derive(Debug, sqlx::FromRow)]
struct OrganizationRow {
    id: String,
    name: String,
    slug: String,
    created_at: String,
    updated_at: String,
}

fn row_to_organization(row: OrganizationRow) -> Result<Organization> {
    Ok(Organization {
        id: parse_db_uuid(&row.id)?,
        name: row.name,
        slug: row.slug,
        created_at: parse_db_timestamp(&row.created_at),
        updated_at: parse_db_timestamp(&row.updated_at),
    })
}

pub struct OrganizationRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> OrganizationRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Organization>> {
        let row = sqlx::query_as::<_, OrganizationRow>(
            "SELECT id, name, slug, created_at, updated_at FROM organizations WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(self.pool)
        .await
        .context("Failed to fetch organization")?;

        row.map(row_to_organization).transpose()
    }

    /// Insert an organization if it does not already exist
    pub async fn ensure(&self, organization: &Organization) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO organizations (id, name, slug, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(organization.id.to_string())
        .bind(&organization.name)
        .bind(&organization.slug)
        .bind(organization.created_at.to_rfc3339())
        .bind(organization.updated_at.to_rfc3339())
        .execute(self.pool)
        .await
        .context("Failed to ensure organization")?;

        Ok(())
    }
}
