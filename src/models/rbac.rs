//! Role-Based Access Control (RBAC) models
//!
//! Permissions are carried as a string-keyed matrix (resource name -> action
//! name -> bool) so custom roles can grant arbitrary combinations without a
//! schema change. Well-known resource and action names live in [`resource`]
//! and [`action`].

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Well-known resource names
pub mod resource {
    pub const STUDIES: &str = "studies";
    pub const TRIAGE: &str = "triage";
    pub const QA: &str = "qa";
    pub const QC: &str = "qc";
    pub const MEDICAL_REVIEW: &str = "medical_review";
    pub const ROLES: &str = "roles";
    pub const USERS: &str = "users";
    pub const AUDIT_LOGS: &str = "audit_logs";
    pub const ICSR_TRACK: &str = "icsr_track";
    pub const AOI_TRACK: &str = "aoi_track";
    pub const NO_CASE_TRACK: &str = "no_case_track";
}

/// Well-known action names
pub mod action {
    pub const READ: &str = "read";
    pub const WRITE: &str = "write";
    pub const DELETE: &str = "delete";
    pub const TRIAGE: &str = "triage";
    pub const ASSESSMENT: &str = "assessment";
}

/// Resource -> action -> granted matrix
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PermissionMatrix(pub HashMap<String, HashMap<String, bool>>);

impl PermissionMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    /// True only for an explicit `true` entry
    pub fn allows(&self, resource: &str, action: &str) -> bool {
        self.0
            .get(resource)
            .and_then(|actions| actions.get(action))
            .copied()
            .unwrap_or(false)
    }

    /// Grant one action on one resource
    pub fn grant(&mut self, resource: &str, action: &str) -> &mut Self {
        self.0
            .entry(resource.to_string())
            .or_default()
            .insert(action.to_string(), true);
        self
    }

    /// True if any of the three track resources grants `action`
    pub fn any_track_allows(&self, action: &str) -> bool {
        [
            resource::ICSR_TRACK,
            resource::AOI_TRACK,
            resource::NO_CASE_TRACK,
        ]
        .iter()
        .any(|track| self.allows(track, action))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A role assignable to users within an organization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    pub id: Uuid,
    pub organization_id: Uuid,
    /// Internal name, lowercase-normalized key (e.g. "triage_reviewer")
    pub name: String,
    pub display_name: String,
    pub description: Option<String>,
    /// System roles are seeded and immutable
    pub is_system: bool,
    #[serde(default)]
    pub permissions: PermissionMatrix,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request to create a custom role
#[derive(Debug, Clone, Deserialize, validator::Validate)]
pub struct CreateRoleRequest {
    #[validate(length(min = 2, max = 64))]
    pub name: String,
    #[validate(length(min = 2, max = 128))]
    pub display_name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub permissions: PermissionMatrix,
}

/// Built-in system roles seeded for every organization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemRole {
    SuperAdmin,
    Admin,
    TriageReviewer,
    Assessor,
    MedicalReviewer,
    Auditor,
}

impl SystemRole {
    pub fn all() -> Vec<SystemRole> {
        vec![
            SystemRole::SuperAdmin,
            SystemRole::Admin,
            SystemRole::TriageReviewer,
            SystemRole::Assessor,
            SystemRole::MedicalReviewer,
            SystemRole::Auditor,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            SystemRole::SuperAdmin => "superadmin",
            SystemRole::Admin => "admin",
            SystemRole::TriageReviewer => "triage_reviewer",
            SystemRole::Assessor => "assessor",
            SystemRole::MedicalReviewer => "medical_reviewer",
            SystemRole::Auditor => "auditor",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            SystemRole::SuperAdmin => "Super Admin",
            SystemRole::Admin => "Administrator",
            SystemRole::TriageReviewer => "Triage Reviewer",
            SystemRole::Assessor => "Safety Assessor",
            SystemRole::MedicalReviewer => "Medical Reviewer",
            SystemRole::Auditor => "Quality Auditor",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            SystemRole::SuperAdmin => "Cross-tenant administration",
            SystemRole::Admin => "Full access within the organization",
            SystemRole::TriageReviewer => "Works the triage queues across all tracks",
            SystemRole::Assessor => "Assesses allocated batches and submits decisions",
            SystemRole::MedicalReviewer => "Performs medical review of confirmed ICSRs",
            SystemRole::Auditor => "Read access with audit trail visibility",
        }
    }

    /// Default permission matrix for this role
    ///
    /// Admin roles rely on the blanket role grant and carry an empty matrix;
    /// the track roles carry the track entries the fallback rules read.
    pub fn default_permissions(&self) -> PermissionMatrix {
        let mut matrix = PermissionMatrix::new();
        match self {
            SystemRole::SuperAdmin | SystemRole::Admin => {}
            SystemRole::TriageReviewer => {
                matrix
                    .grant(resource::ICSR_TRACK, action::TRIAGE)
                    .grant(resource::AOI_TRACK, action::TRIAGE)
                    .grant(resource::NO_CASE_TRACK, action::TRIAGE);
            }
            SystemRole::Assessor => {
                matrix
                    .grant(resource::ICSR_TRACK, action::ASSESSMENT)
                    .grant(resource::AOI_TRACK, action::ASSESSMENT)
                    .grant(resource::NO_CASE_TRACK, action::ASSESSMENT);
            }
            SystemRole::MedicalReviewer => {
                matrix
                    .grant(resource::MEDICAL_REVIEW, action::READ)
                    .grant(resource::MEDICAL_REVIEW, action::WRITE);
            }
            SystemRole::Auditor => {
                matrix
                    .grant(resource::AUDIT_LOGS, action::READ)
                    .grant(resource::TRIAGE, action::READ)
                    .grant(resource::QA, action::READ)
                    .grant(resource::QC, action::READ);
            }
        }
        matrix
    }

    /// Materialize the Role record for one organization
    pub fn to_role(&self, organization_id: Uuid) -> Role {
        let now = Utc::now();
        Role {
            id: Uuid::new_v4(),
            organization_id,
            name: self.name().to_string(),
            display_name: self.display_name().to_string(),
            description: Some(self.description().to_string()),
            is_system: true,
            permissions: self.default_permissions(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matrix_allows_requires_explicit_true() {
        let mut matrix = PermissionMatrix::new();
        assert!(!matrix.allows(resource::TRIAGE, action::READ));

        matrix.grant(resource::TRIAGE, action::READ);
        assert!(matrix.allows(resource::TRIAGE, action::READ));
        assert!(!matrix.allows(resource::TRIAGE, action::WRITE));
    }

    #[test]
    fn test_matrix_explicit_false_is_not_a_grant() {
        let mut matrix = PermissionMatrix::new();
        matrix
            .0
            .entry(resource::TRIAGE.to_string())
            .or_default()
            .insert(action::READ.to_string(), false);
        assert!(!matrix.allows(resource::TRIAGE, action::READ));
    }

    #[test]
    fn test_any_track_allows() {
        let mut matrix = PermissionMatrix::new();
        assert!(!matrix.any_track_allows(action::TRIAGE));

        matrix.grant(resource::AOI_TRACK, action::TRIAGE);
        assert!(matrix.any_track_allows(action::TRIAGE));
        assert!(!matrix.any_track_allows(action::ASSESSMENT));
    }

    #[test]
    fn test_triage_reviewer_defaults() {
        let matrix = SystemRole::TriageReviewer.default_permissions();
        assert!(matrix.allows(resource::ICSR_TRACK, action::TRIAGE));
        assert!(matrix.allows(resource::NO_CASE_TRACK, action::TRIAGE));
        assert!(!matrix.allows(resource::ICSR_TRACK, action::ASSESSMENT));
    }

    #[test]
    fn test_admin_roles_rely_on_blanket_grant() {
        assert!(SystemRole::Admin.default_permissions().is_empty());
        assert!(SystemRole::SuperAdmin.default_permissions().is_empty());
    }

    #[test]
    fn test_to_role_is_system() {
        let role = SystemRole::Auditor.to_role(Uuid::new_v4());
        assert_eq!(role.name, "auditor");
        assert!(role.is_system);
        assert!(role.permissions.allows(resource::AUDIT_LOGS, action::READ));
    }

    #[test]
    fn test_matrix_serde_round_trip() {
        let mut matrix = PermissionMatrix::new();
        matrix.grant(resource::QA, action::WRITE);
        let json = serde_json::to_string(&matrix).unwrap();
        let back: PermissionMatrix = serde_json::from_str(&json).unwrap();
        assert!(back.allows(resource::QA, action::WRITE));
    }
}
