//! Business logic services

pub mod allocator;
pub mod audit;
pub mod auth;
pub mod authorization;
pub mod workflow;

pub use allocator::{select_batch, AllocatedBatch, BatchAllocator};
pub use audit::{
    describe_changes, extract_changes, AuditEvent, AuditRecorder, Sanitizer, REDACTION_MARKER,
};
pub use auth::AuthService;
pub use authorization::{
    normalize_role, AccessDenied, AuthorizationEngine, PermissionHolder, PolicyRule,
};
pub use workflow::{apply_decision, DecisionOutcome, StageChange, TriageDecision};
