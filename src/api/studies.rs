//! Study workflow API endpoints
//!
//! Allocation, decision, and release are the three mutating operations of
//! the triage workflow; each is permission-gated and recorded in the audit
//! trail with before/after snapshots.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::StudyRepository,
    middleware::{check_permission, AuthUser, RequirePermission},
    models::{
        resource, AllocateBatchRequest, BatchResponse, CreateStudyRequest, DecisionRequest,
        IcsrClassification, Study, StudyQuery, WorkflowTrack,
    },
    services::{
        allocator::BatchAllocator, apply_decision, AuditEvent, TriageDecision,
    },
    utils::AppError,
    AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_studies).post(create_study))
        .route("/batch", post(allocate_batch))
        .route("/{id}", get(get_study))
        .route("/{id}/decision", post(submit_decision))
}

pub fn batch_routes() -> Router<AppState> {
    Router::new().route("/{id}/release", post(release_batch))
}

async fn list_studies(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Query(query): Query<StudyQuery>,
) -> Result<Json<Vec<Study>>, AppError> {
    check_permission(&state.authz, &auth_user, RequirePermission::read(resource::STUDIES))?;

    let repo = StudyRepository::new(&state.db);
    let studies = repo.list(auth_user.organization_id, &query).await?;
    Ok(Json(studies))
}

async fn get_study(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Study>, AppError> {
    check_permission(&state.authz, &auth_user, RequirePermission::read(resource::STUDIES))?;

    let repo = StudyRepository::new(&state.db);
    let study = repo
        .get(auth_user.organization_id, id)
        .await?
        .ok_or_else(|| AppError::not_found("Study not found"))?;
    Ok(Json(study))
}

async fn create_study(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(request): Json<CreateStudyRequest>,
) -> Result<(StatusCode, Json<Study>), AppError> {
    check_permission(&state.authz, &auth_user, RequirePermission::write(resource::STUDIES))?;
    request.validate()?;

    let classification: IcsrClassification = request
        .classification
        .parse()
        .map_err(AppError::BadRequest)?;

    let study = Study::new_classified(
        auth_user.organization_id,
        request.pmid,
        request.title,
        classification,
        Some(auth_user.id),
    );

    let repo = StudyRepository::new(&state.db);
    let created = repo.create(&study).await?;

    state.audit.record(AuditEvent {
        organization_id: auth_user.organization_id,
        user_id: Some(auth_user.id),
        user_name: Some(auth_user.username.clone()),
        action: "create_study".to_string(),
        resource: resource::STUDIES.to_string(),
        resource_id: Some(created.id.to_string()),
        before: None,
        after: serde_json::to_value(&created).ok(),
        metadata: None,
    });

    Ok((StatusCode::CREATED, Json(created)))
}

async fn allocate_batch(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(request): Json<AllocateBatchRequest>,
) -> Result<Json<BatchResponse>, AppError> {
    check_permission(&state.authz, &auth_user, RequirePermission::write(resource::TRIAGE))?;

    let track: WorkflowTrack = request.track.parse().map_err(AppError::BadRequest)?;

    let repo = StudyRepository::new(&state.db);
    let allocator = BatchAllocator::new(repo, &state.config.workflow);
    let batch = allocator
        .allocate(auth_user.organization_id, track, auth_user.id)
        .await?;

    state.audit.record(AuditEvent {
        organization_id: auth_user.organization_id,
        user_id: Some(auth_user.id),
        user_name: Some(auth_user.username.clone()),
        action: "allocate_batch".to_string(),
        resource: resource::STUDIES.to_string(),
        resource_id: Some(batch.batch_id.to_string()),
        before: None,
        after: None,
        metadata: Some(json!({
            "track": track.as_str(),
            "count": batch.studies.len(),
        })),
    });

    Ok(Json(BatchResponse {
        batch_id: batch.batch_id,
        track: batch.track,
        qc_sampling_rate: batch.qc_sampling_rate,
        studies: batch.studies,
    }))
}

async fn submit_decision(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
    Json(request): Json<DecisionRequest>,
) -> Result<Json<Study>, AppError> {
    check_permission(&state.authz, &auth_user, RequirePermission::write(resource::TRIAGE))?;
    request.validate()?;

    // Reject unknown decision strings at the boundary; the state machine
    // itself treats them as inert for non-HTTP callers.
    if TriageDecision::parse(&request.decision).is_none() {
        return Err(AppError::bad_request(format!(
            "Unknown decision: {}",
            request.decision
        )));
    }

    let repo = StudyRepository::new(&state.db);
    let study = repo
        .get(auth_user.organization_id, id)
        .await?
        .ok_or_else(|| AppError::not_found("Study not found"))?;

    if study.assigned_to != Some(auth_user.id) && !state.authz.is_admin(&auth_user) {
        return Err(AppError::Conflict(
            "Study is not assigned to this reviewer".to_string(),
        ));
    }

    let outcome = apply_decision(&study, &request.decision);
    let updated = repo.apply_decision(&study, &outcome).await?;

    state.audit.record(AuditEvent {
        organization_id: auth_user.organization_id,
        user_id: Some(auth_user.id),
        user_name: Some(auth_user.username.clone()),
        action: "triage_decision".to_string(),
        resource: resource::STUDIES.to_string(),
        resource_id: Some(updated.id.to_string()),
        before: serde_json::to_value(&study).ok(),
        after: serde_json::to_value(&updated).ok(),
        metadata: Some(json!({ "decision": request.decision })),
    });

    Ok(Json(updated))
}

#[derive(Debug, Serialize)]
struct ReleaseResponse {
    batch_id: Uuid,
    released: u64,
}

async fn release_batch(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ReleaseResponse>, AppError> {
    check_permission(&state.authz, &auth_user, RequirePermission::write(resource::TRIAGE))?;

    let repo = StudyRepository::new(&state.db);
    let allocator = BatchAllocator::new(repo, &state.config.workflow);
    let released = allocator.release(auth_user.organization_id, id).await?;

    if released > 0 {
        state.audit.record(AuditEvent {
            organization_id: auth_user.organization_id,
            user_id: Some(auth_user.id),
            user_name: Some(auth_user.username.clone()),
            action: "release_batch".to_string(),
            resource: resource::STUDIES.to_string(),
            resource_id: Some(id.to_string()),
            before: None,
            after: None,
            metadata: Some(json!({ "released": released })),
        });
    }

    Ok(Json(ReleaseResponse {
        batch_id: id,
        released,
    }))
}
