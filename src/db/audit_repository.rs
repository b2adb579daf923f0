//! Audit log repository

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::{parse_db_timestamp, parse_db_uuid};
use crate::models::{AuditLogEntry, AuditLogQuery, FieldChange};

#[derive(Debug, sqlx::FromRow)]
struct AuditRow {
    id: String,
    organization_id: String,
    user_id: Option<String>,
    user_name: Option<String>,
    action: String,
    resource: String,
    resource_id: Option<String>,
    details: Option<String>,
    changes: Option<String>,
    before_value: Option<String>,
    after_value: Option<String>,
    metadata: Option<String>,
    created_at: String,
}

fn row_to_entry(row: AuditRow) -> AuditLogEntry {
    AuditLogEntry {
        id: parse_db_uuid(&row.id).unwrap_or_else(|_| Uuid::nil()),
        organization_id: parse_db_uuid(&row.organization_id).unwrap_or_else(|_| Uuid::nil()),
        user_id: row.user_id.as_deref().and_then(|s| Uuid::parse_str(s).ok()),
        user_name: row.user_name,
        action: row.action,
        resource: row.resource,
        resource_id: row.resource_id,
        details: row.details,
        changes: row
            .changes
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default(),
        before_value: row.before_value.and_then(|s| serde_json::from_str(&s).ok()),
        after_value: row.after_value.and_then(|s| serde_json::from_str(&s).ok()),
        metadata: row.metadata.and_then(|s| serde_json::from_str(&s).ok()),
        created_at: parse_db_timestamp(&row.created_at),
    }
}

pub struct AuditRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> AuditRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn insert(
        &self,
        organization_id: Uuid,
        user_id: Option<Uuid>,
        user_name: Option<&str>,
        action: &str,
        resource: &str,
        resource_id: Option<&str>,
        details: Option<&str>,
        changes: &[FieldChange],
        before_value: Option<&serde_json::Value>,
        after_value: Option<&serde_json::Value>,
        metadata: Option<&serde_json::Value>,
    ) -> Result<AuditLogEntry> {
        let id = Uuid::new_v4();
        let created_at = Utc::now();
        let changes_json = serde_json::to_string(changes).unwrap_or_else(|_| "[]".to_string());

        sqlx::query(
            r#"
            INSERT INTO audit_log (id, organization_id, user_id, user_name, action, resource,
                resource_id, details, changes, before_value, after_value, metadata, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(organization_id.to_string())
        .bind(user_id.map(|u| u.to_string()))
        .bind(user_name)
        .bind(action)
        .bind(resource)
        .bind(resource_id)
        .bind(details)
        .bind(&changes_json)
        .bind(before_value.map(|v| v.to_string()))
        .bind(after_value.map(|v| v.to_string()))
        .bind(metadata.map(|v| v.to_string()))
        .bind(created_at.to_rfc3339())
        .execute(self.pool)
        .await
        .context("Failed to insert audit log entry")?;

        Ok(AuditLogEntry {
            id,
            organization_id,
            user_id,
            user_name: user_name.map(str::to_string),
            action: action.to_string(),
            resource: resource.to_string(),
            resource_id: resource_id.map(str::to_string),
            details: details.map(str::to_string),
            changes: changes.to_vec(),
            before_value: before_value.cloned(),
            after_value: after_value.cloned(),
            metadata: metadata.cloned(),
            created_at,
        })
    }

    /// List entries for an organization, newest first
    pub async fn list(
        &self,
        organization_id: Uuid,
        query: &AuditLogQuery,
    ) -> Result<Vec<AuditLogEntry>> {
        let mut sql = String::from(
            "SELECT id, organization_id, user_id, user_name, action, resource, resource_id, \
             details, changes, before_value, after_value, metadata, created_at \
             FROM audit_log WHERE organization_id = ?",
        );

        if query.user_id.is_some() {
            sql.push_str(" AND user_id = ?");
        }
        if query.resource.is_some() {
            sql.push_str(" AND resource = ?");
        }
        if query.action.is_some() {
            sql.push_str(" AND action = ?");
        }
        sql.push_str(" ORDER BY created_at DESC LIMIT ? OFFSET ?");

        let mut q = sqlx::query_as::<_, AuditRow>(&sql).bind(organization_id.to_string());
        if let Some(user_id) = query.user_id {
            q = q.bind(user_id.to_string());
        }
        if let Some(ref resource) = query.resource {
            q = q.bind(resource);
        }
        if let Some(ref action) = query.action {
            q = q.bind(action);
        }
        q = q
            .bind(query.limit.unwrap_or(100) as i64)
            .bind(query.offset.unwrap_or(0) as i64);

        let rows = q
            .fetch_all(self.pool)
            .await
            .context("Failed to list audit logs")?;

        Ok(rows.into_iter().map(row_to_entry).collect())
    }
}
