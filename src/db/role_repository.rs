//! Role repository

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::info;
use uuid::Uuid;

use crate::db::{parse_db_timestamp, parse_db_uuid};
use crate::models::{PermissionMatrix, Role, SystemRole};

#[derive(Debug, sqlx::FromRow)]
struct RoleRow {
    id: String,
    organization_id: String,
    name: String,
    display_name: String,
    description: Option<String>,
    is_system: bool,
    permissions: String,
    created_at: String,
    updated_at: String,
}

fn row_to_role(row: RoleRow) -> Result<Role> {
    Ok(Role {
        id: parse_db_uuid(&row.id)?,
        organization_id: parse_db_uuid(&row.organization_id)?,
        name: row.name,
        display_name: row.display_name,
        description: row.description,
        is_system: row.is_system,
        permissions: serde_json::from_str(&row.permissions).unwrap_or_default(),
        created_at: parse_db_timestamp(&row.created_at),
        updated_at: parse_db_timestamp(&row.updated_at),
    })
}

pub struct RoleRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> RoleRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn list(&self, organization_id: Uuid) -> Result<Vec<Role>> {
        let rows = sqlx::query_as::<_, RoleRow>(
            "SELECT id, organization_id, name, display_name, description, is_system, \
             permissions, created_at, updated_at \
             FROM roles WHERE organization_id = ? ORDER BY name",
        )
        .bind(organization_id.to_string())
        .fetch_all(self.pool)
        .await
        .context("Failed to list roles")?;

        rows.into_iter().map(row_to_role).collect()
    }

    pub async fn get_by_name(&self, organization_id: Uuid, name: &str) -> Result<Option<Role>> {
        let row = sqlx::query_as::<_, RoleRow>(
            "SELECT id, organization_id, name, display_name, description, is_system, \
             permissions, created_at, updated_at \
             FROM roles WHERE organization_id = ? AND name = ?",
        )
        .bind(organization_id.to_string())
        .bind(name)
        .fetch_optional(self.pool)
        .await
        .context("Failed to fetch role")?;

        row.map(row_to_role).transpose()
    }

    pub async fn create(&self, role: &Role) -> Result<Role> {
        let permissions = serde_json::to_string(&role.permissions)
            .context("Failed to serialize role permissions")?;

        sqlx::query(
            r#"
            INSERT INTO roles (id, organization_id, name, display_name, description, is_system,
                permissions, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(role.id.to_string())
        .bind(role.organization_id.to_string())
        .bind(&role.name)
        .bind(&role.display_name)
        .bind(&role.description)
        .bind(role.is_system)
        .bind(&permissions)
        .bind(role.created_at.to_rfc3339())
        .bind(role.updated_at.to_rfc3339())
        .execute(self.pool)
        .await
        .context("Failed to insert role")?;

        Ok(role.clone())
    }

    /// Resolve the permission matrix for a role name
    ///
    /// Missing role degrades to an empty matrix; the authorization engine's
    /// fallback rules still apply.
    pub async fn permissions_for(
        &self,
        organization_id: Uuid,
        role_name: &str,
    ) -> Result<(PermissionMatrix, Option<String>)> {
        match self.get_by_name(organization_id, role_name).await? {
            Some(role) => Ok((role.permissions, Some(role.display_name))),
            None => Ok((PermissionMatrix::new(), None)),
        }
    }

    /// Seed the built-in system roles for an organization, skipping existing
    pub async fn seed_system_roles(&self, organization_id: Uuid) -> Result<()> {
        for system_role in SystemRole::all() {
            if self
                .get_by_name(organization_id, system_role.name())
                .await?
                .is_some()
            {
                continue;
            }
            let role = system_role.to_role(organization_id);
            self.create(&role).await?;
            info!(
                organization_id = %organization_id,
                role = system_role.name(),
                "Seeded system role"
            );
        }
        Ok(())
    }

    /// Update a custom role's permissions and display metadata
    ///
    /// System roles are immutable once created.
    pub async fn update(&self, role: &Role) -> Result<Role> {
        if role.is_system {
            anyhow::bail!("Cannot modify system roles");
        }

        let permissions = serde_json::to_string(&role.permissions)
            .context("Failed to serialize role permissions")?;
        let now = Utc::now();

        sqlx::query(
            r#"
            UPDATE roles
            SET display_name = ?, description = ?, permissions = ?, updated_at = ?
            WHERE id = ? AND organization_id = ? AND is_system = 0
            "#,
        )
        .bind(&role.display_name)
        .bind(&role.description)
        .bind(&permissions)
        .bind(now.to_rfc3339())
        .bind(role.id.to_string())
        .bind(role.organization_id.to_string())
        .execute(self.pool)
        .await
        .context("Failed to update role")?;

        let mut updated = role.clone();
        updated.updated_at = now;
        Ok(updated)
    }
}
