//! Authorization engine
//!
//! Answers "can this actor perform this action on this resource" and "does
//! this actor hold this role". Permission checks are an ordered list of
//! named policy rules combined with OR: the explicit matrix, blanket admin
//! roles, the implicit study grant, track-based fallbacks, and the
//! super-admin-organization override. Every rule is evaluated on its own so
//! custom roles, system roles, and track roles compose without enumerating
//! the full matrix each time.
//!
//! Role names are normalized (lowercased, whitespace and underscores
//! stripped) before comparison, so "Super Admin", "super_admin" and
//! "SUPERADMIN" are the same role.

use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::models::{action, resource, PermissionMatrix, ResolvedUser};

/// Normalize a role name for comparison
pub fn normalize_role(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_whitespace() && *c != '_')
        .collect::<String>()
        .to_lowercase()
}

const ROLE_ADMIN: &str = "admin";
const ROLE_SUPERADMIN: &str = "superadmin";

/// Anything that can be authorized
///
/// Implemented by both the request actor extracted from a token and the
/// plain user record loaded from storage, so the engine has exactly one
/// resolution path.
pub trait PermissionHolder {
    fn actor_id(&self) -> Uuid;
    fn actor_organization_id(&self) -> Uuid;
    /// Internal role name (e.g. "triage_reviewer")
    fn role_name(&self) -> &str;
    /// Display name, when the role was resolved from storage
    fn role_display_name(&self) -> Option<&str>;
    fn permission_matrix(&self) -> &PermissionMatrix;
}

impl PermissionHolder for ResolvedUser {
    fn actor_id(&self) -> Uuid {
        self.user.id
    }

    fn actor_organization_id(&self) -> Uuid {
        self.user.organization_id
    }

    fn role_name(&self) -> &str {
        &self.user.role
    }

    fn role_display_name(&self) -> Option<&str> {
        self.role_display_name.as_deref()
    }

    fn permission_matrix(&self) -> &PermissionMatrix {
        &self.permissions
    }
}

/// The policy rules a permission check evaluates, in order
///
/// All rules are OR'd; the first granting rule is reported but later rules
/// would grant identically. Short-circuiting on the matrix alone would
/// silently regress the blanket and fallback grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyRule {
    /// `permissions[resource][action] == true`
    ExplicitGrant,
    /// Normalized role (or display name) is admin/superadmin
    BlanketAdminRole,
    /// `studies:read` and `studies:write` for any authenticated actor
    ImplicitStudyAccess,
    /// Track permissions imply triage and QA/QC access
    TrackFallback,
    /// Admin inside the super-admin organization
    SuperOrgOverride,
}

impl PolicyRule {
    pub fn all() -> [PolicyRule; 5] {
        [
            PolicyRule::ExplicitGrant,
            PolicyRule::BlanketAdminRole,
            PolicyRule::ImplicitStudyAccess,
            PolicyRule::TrackFallback,
            PolicyRule::SuperOrgOverride,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            PolicyRule::ExplicitGrant => "explicit_grant",
            PolicyRule::BlanketAdminRole => "blanket_admin_role",
            PolicyRule::ImplicitStudyAccess => "implicit_study_access",
            PolicyRule::TrackFallback => "track_fallback",
            PolicyRule::SuperOrgOverride => "super_org_override",
        }
    }
}

/// Denied permission check, with enough context to diagnose
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Permission denied: {action} on {resource} (role: {role})")]
pub struct AccessDenied {
    pub resource: String,
    pub action: String,
    pub role: String,
}

/// Role- and permission-matrix-based access decisions
#[derive(Debug, Clone)]
pub struct AuthorizationEngine {
    /// Members of this tenant receive the elevated cross-tenant checks
    super_admin_org_id: Option<Uuid>,
}

impl AuthorizationEngine {
    pub fn new(super_admin_org_id: Option<Uuid>) -> Self {
        Self { super_admin_org_id }
    }

    fn is_super_org(&self, actor: &impl PermissionHolder) -> bool {
        self.super_admin_org_id
            .map(|org| actor.actor_organization_id() == org)
            .unwrap_or(false)
    }

    /// Whether the actor's role (by name or display name) is a blanket admin
    fn has_admin_role(&self, actor: &impl PermissionHolder) -> bool {
        let names = [
            Some(actor.role_name()),
            actor.role_display_name(),
        ];
        names.into_iter().flatten().any(|name| {
            let normalized = normalize_role(name);
            normalized == ROLE_ADMIN || normalized == ROLE_SUPERADMIN
        })
    }

    /// Whether the actor counts as an administrator
    ///
    /// Either a blanket admin role, or membership in the super-admin
    /// organization (which elevates independent of the stored role).
    pub fn is_admin(&self, actor: &impl PermissionHolder) -> bool {
        self.has_admin_role(actor) || self.is_super_org(actor)
    }

    /// Check that the actor holds one of the allowed roles
    ///
    /// An actor inside the super-admin organization satisfies any check
    /// whose allowed set names `superadmin`, independent of stored role.
    pub fn authorize_role(
        &self,
        actor: &impl PermissionHolder,
        allowed: &[&str],
    ) -> Result<(), AccessDenied> {
        let allowed_normalized: Vec<String> =
            allowed.iter().map(|name| normalize_role(name)).collect();

        if self.is_super_org(actor)
            && allowed_normalized.iter().any(|name| name == ROLE_SUPERADMIN)
        {
            return Ok(());
        }

        let actor_roles = [Some(actor.role_name()), actor.role_display_name()];
        let matched = actor_roles
            .into_iter()
            .flatten()
            .map(normalize_role)
            .any(|role| allowed_normalized.contains(&role));

        if matched {
            Ok(())
        } else {
            Err(AccessDenied {
                resource: "role".to_string(),
                action: allowed.join(","),
                role: actor.role_name().to_string(),
            })
        }
    }

    /// Evaluate one policy rule for a permission check
    pub fn rule_grants(
        &self,
        rule: PolicyRule,
        actor: &impl PermissionHolder,
        res: &str,
        act: &str,
    ) -> bool {
        let matrix = actor.permission_matrix();
        match rule {
            PolicyRule::ExplicitGrant => matrix.allows(res, act),
            PolicyRule::BlanketAdminRole => self.has_admin_role(actor),
            PolicyRule::ImplicitStudyAccess => {
                res == resource::STUDIES && (act == action::READ || act == action::WRITE)
            }
            PolicyRule::TrackFallback => {
                let read_or_write = act == action::READ || act == action::WRITE;
                if !read_or_write {
                    return false;
                }
                if res.eq_ignore_ascii_case(resource::TRIAGE) {
                    matrix.any_track_allows(action::TRIAGE)
                } else if res.eq_ignore_ascii_case(resource::QA)
                    || res.eq_ignore_ascii_case(resource::QC)
                {
                    // QA and QC share the assessment fallback source
                    matrix.any_track_allows(action::ASSESSMENT)
                } else {
                    false
                }
            }
            PolicyRule::SuperOrgOverride => self.is_super_org(actor) && self.has_admin_role(actor),
        }
    }

    /// Check a `(resource, action)` permission for the actor
    ///
    /// Returns the rule that granted, or a denial naming what was refused.
    pub fn authorize_permission(
        &self,
        actor: &impl PermissionHolder,
        res: &str,
        act: &str,
    ) -> Result<PolicyRule, AccessDenied> {
        for rule in PolicyRule::all() {
            if self.rule_grants(rule, actor, res, act) {
                debug!(
                    actor_id = %actor.actor_id(),
                    resource = res,
                    action = act,
                    rule = rule.name(),
                    "Permission granted"
                );
                return Ok(rule);
            }
        }

        Err(AccessDenied {
            resource: res.to_string(),
            action: act.to_string(),
            role: actor.role_name().to_string(),
        })
    }

    /// Whether the actor may act on the given user's records
    ///
    /// Self-service or administrator.
    pub fn can_act_on_user(&self, actor: &impl PermissionHolder, target_user_id: Uuid) -> bool {
        actor.actor_id() == target_user_id || self.is_admin(actor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    struct TestActor {
        id: Uuid,
        organization_id: Uuid,
        role: String,
        role_display_name: Option<String>,
        permissions: PermissionMatrix,
    }

    impl TestActor {
        fn new(role: &str) -> Self {
            Self {
                id: Uuid::new_v4(),
                organization_id: Uuid::new_v4(),
                role: role.to_string(),
                role_display_name: None,
                permissions: PermissionMatrix::new(),
            }
        }
    }

    impl PermissionHolder for TestActor {
        fn actor_id(&self) -> Uuid {
            self.id
        }

        fn actor_organization_id(&self) -> Uuid {
            self.organization_id
        }

        fn role_name(&self) -> &str {
            &self.role
        }

        fn role_display_name(&self) -> Option<&str> {
            self.role_display_name.as_deref()
        }

        fn permission_matrix(&self) -> &PermissionMatrix {
            &self.permissions
        }
    }

    fn engine() -> AuthorizationEngine {
        AuthorizationEngine::new(None)
    }

    #[rstest]
    #[case("Super Admin", "superadmin")]
    #[case("super_admin", "superadmin")]
    #[case("SUPERADMIN", "superadmin")]
    #[case("Triage Reviewer", "triagereviewer")]
    #[case("  admin ", "admin")]
    fn test_normalize_role(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(normalize_role(input), expected);
    }

    #[test]
    fn test_authorize_role_is_normalization_insensitive() {
        let eng = engine();
        let actor = TestActor::new("super_admin");

        assert!(eng.authorize_role(&actor, &["SuperAdmin"]).is_ok());
        assert!(eng.authorize_role(&actor, &["super admin"]).is_ok());
        assert!(eng.authorize_role(&actor, &["admin"]).is_err());
    }

    #[test]
    fn test_authorize_role_checks_display_name_too() {
        let eng = engine();
        let mut actor = TestActor::new("custom_role_7");
        actor.role_display_name = Some("Quality Auditor".to_string());

        assert!(eng.authorize_role(&actor, &["quality_auditor"]).is_ok());
    }

    #[test]
    fn test_super_org_satisfies_superadmin_role_check_regardless_of_role() {
        let super_org = Uuid::new_v4();
        let eng = AuthorizationEngine::new(Some(super_org));
        let mut actor = TestActor::new("viewer");
        actor.organization_id = super_org;

        assert!(eng.authorize_role(&actor, &["superadmin"]).is_ok());
        // The override only applies to checks that include superadmin
        assert!(eng.authorize_role(&actor, &["auditor"]).is_err());
    }

    #[test]
    fn test_explicit_matrix_grant() {
        let eng = engine();
        let mut actor = TestActor::new("custom");
        actor.permissions.grant(resource::ROLES, action::WRITE);

        assert_eq!(
            eng.authorize_permission(&actor, resource::ROLES, action::WRITE),
            Ok(PolicyRule::ExplicitGrant)
        );
        assert!(eng
            .authorize_permission(&actor, resource::ROLES, action::DELETE)
            .is_err());
    }

    #[rstest]
    #[case("admin")]
    #[case("Super Admin")]
    #[case("superadmin")]
    fn test_blanket_admin_grant(#[case] role: &str) {
        let eng = engine();
        let actor = TestActor::new(role);

        assert_eq!(
            eng.authorize_permission(&actor, resource::AUDIT_LOGS, action::DELETE),
            Ok(PolicyRule::BlanketAdminRole)
        );
    }

    #[test]
    fn test_blanket_admin_from_display_name() {
        let eng = engine();
        let mut actor = TestActor::new("org_owner");
        actor.role_display_name = Some("Administrator".to_string());
        // "Administrator" normalizes to "administrator", not "admin"
        assert!(eng
            .authorize_permission(&actor, resource::ROLES, action::WRITE)
            .is_err());

        actor.role_display_name = Some("Admin".to_string());
        assert_eq!(
            eng.authorize_permission(&actor, resource::ROLES, action::WRITE),
            Ok(PolicyRule::BlanketAdminRole)
        );
    }

    #[test]
    fn test_studies_read_write_implicit_delete_not() {
        let eng = engine();
        let actor = TestActor::new("viewer");

        assert_eq!(
            eng.authorize_permission(&actor, resource::STUDIES, action::READ),
            Ok(PolicyRule::ImplicitStudyAccess)
        );
        assert_eq!(
            eng.authorize_permission(&actor, resource::STUDIES, action::WRITE),
            Ok(PolicyRule::ImplicitStudyAccess)
        );
        assert!(eng
            .authorize_permission(&actor, resource::STUDIES, action::DELETE)
            .is_err());
    }

    #[test]
    fn test_track_triage_fallback() {
        let eng = engine();
        let mut actor = TestActor::new("triage_reviewer");
        actor.permissions.grant(resource::ICSR_TRACK, action::TRIAGE);

        assert_eq!(
            eng.authorize_permission(&actor, resource::TRIAGE, action::READ),
            Ok(PolicyRule::TrackFallback)
        );
        assert_eq!(
            eng.authorize_permission(&actor, resource::TRIAGE, action::WRITE),
            Ok(PolicyRule::TrackFallback)
        );
        assert!(eng
            .authorize_permission(&actor, resource::TRIAGE, action::DELETE)
            .is_err());
    }

    #[test]
    fn test_track_assessment_fallback_covers_qa_and_qc_identically() {
        let eng = engine();
        let mut actor = TestActor::new("assessor");
        actor
            .permissions
            .grant(resource::NO_CASE_TRACK, action::ASSESSMENT);

        for res in [resource::QA, resource::QC] {
            assert_eq!(
                eng.authorize_permission(&actor, res, action::READ),
                Ok(PolicyRule::TrackFallback),
                "assessment fallback should grant {}:read",
                res
            );
            assert_eq!(
                eng.authorize_permission(&actor, res, action::WRITE),
                Ok(PolicyRule::TrackFallback)
            );
        }
        // Triage access does not follow from assessment
        assert!(eng
            .authorize_permission(&actor, resource::TRIAGE, action::READ)
            .is_err());
    }

    #[test]
    fn test_super_org_override_requires_admin_role() {
        let super_org = Uuid::new_v4();
        let eng = AuthorizationEngine::new(Some(super_org));

        let mut admin = TestActor::new("admin");
        admin.organization_id = super_org;
        assert_eq!(
            eng.authorize_permission(&admin, "anything", "everything"),
            Ok(PolicyRule::BlanketAdminRole)
        );
        assert!(eng.rule_grants(PolicyRule::SuperOrgOverride, &admin, "anything", "everything"));

        // Super-org membership alone does not grant arbitrary permissions
        let mut plain = TestActor::new("viewer");
        plain.organization_id = super_org;
        assert!(eng
            .authorize_permission(&plain, resource::ROLES, action::WRITE)
            .is_err());
    }

    #[test]
    fn test_denial_names_resource_action_and_role() {
        let eng = engine();
        let actor = TestActor::new("viewer");

        let err = eng
            .authorize_permission(&actor, resource::TRIAGE, action::WRITE)
            .unwrap_err();
        assert_eq!(err.resource, "triage");
        assert_eq!(err.action, "write");
        assert_eq!(err.role, "viewer");
        assert!(err.to_string().contains("triage"));
        assert!(err.to_string().contains("viewer"));
    }

    #[test]
    fn test_can_act_on_user_self_or_admin() {
        let eng = engine();
        let actor = TestActor::new("assessor");
        assert!(eng.can_act_on_user(&actor, actor.id));
        assert!(!eng.can_act_on_user(&actor, Uuid::new_v4()));

        let admin = TestActor::new("admin");
        assert!(eng.can_act_on_user(&admin, Uuid::new_v4()));
    }

    #[test]
    fn test_all_rules_evaluated_not_just_matrix() {
        // An actor with an empty matrix must still pass via fallback rules.
        let eng = engine();
        let mut actor = TestActor::new("custom");
        actor.permissions.grant(resource::AOI_TRACK, action::TRIAGE);
        assert!(actor.permissions.allows(resource::TRIAGE, action::READ) == false);

        assert!(eng
            .authorize_permission(&actor, resource::TRIAGE, action::READ)
            .is_ok());
    }
}
