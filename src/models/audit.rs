//! Audit log models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One field-level difference between two entity snapshots
///
/// Values are pre-formatted for display; `None` means the field was absent
/// or null on that side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChange {
    pub field: String,
    pub before: Option<String>,
    pub after: Option<String>,
}

/// Immutable audit trail entry, one per mutating action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub user_id: Option<Uuid>,
    pub user_name: Option<String>,
    pub action: String,
    pub resource: String,
    pub resource_id: Option<String>,
    /// Human-readable change description
    pub details: Option<String>,
    #[serde(default)]
    pub changes: Vec<FieldChange>,
    pub before_value: Option<serde_json::Value>,
    pub after_value: Option<serde_json::Value>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Filters for listing audit log entries
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AuditLogQuery {
    pub organization_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub resource: Option<String>,
    pub action: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}
