//! Workflow integration tests
//!
//! Exercises the allocator, state machine, and audit trail together against
//! a real (in-memory) database, including the concurrency and idempotence
//! guarantees the API layer relies on.

mod common;

use uuid::Uuid;

use common::{insert_queued_study, seed_default_org, test_pool};
use vigilit::config::WorkflowConfig;
use vigilit::db::{AuditRepository, StudyRepository};
use vigilit::models::{AuditLogQuery, FieldChange, IcsrClassification, WorkflowStage, WorkflowTrack};
use vigilit::services::allocator::BatchAllocator;
use vigilit::services::{apply_decision, DecisionOutcome};

fn config_with(batch_size_aoi: u32) -> WorkflowConfig {
    WorkflowConfig {
        batch_size_aoi,
        ..WorkflowConfig::default()
    }
}

#[tokio::test]
async fn test_end_to_end_aoi_confirmation() {
    let pool = test_pool().await;
    let org = seed_default_org(&pool).await;
    let study = insert_queued_study(&pool, org, "38010001", IcsrClassification::ProbableAoi, 0).await;
    assert_eq!(study.workflow_stage, WorkflowStage::TriageQueueAoi);

    let reviewer = Uuid::new_v4();
    let config = config_with(1);

    // Allocate: the study moves into assessment, exclusively held
    let repo = StudyRepository::new(&pool);
    let allocator = BatchAllocator::new(repo, &config);
    let batch = allocator
        .allocate(org, WorkflowTrack::Aoi, reviewer)
        .await
        .unwrap();

    assert_eq!(batch.studies.len(), 1);
    let allocated = &batch.studies[0];
    assert_eq!(allocated.id, study.id);
    assert_eq!(allocated.workflow_stage, WorkflowStage::AssessmentAoi);
    assert_eq!(allocated.status, "Under Assessment");
    assert_eq!(allocated.assigned_to, Some(reviewer));
    assert_eq!(allocated.batch_id, Some(batch.batch_id));
    assert!(allocated.allocated_at.is_some());

    // Decide: Confirm AOI lands in reporting with the assignment released
    let outcome = apply_decision(allocated, "Confirm AOI");
    let repo = StudyRepository::new(&pool);
    let updated = repo.apply_decision(allocated, &outcome).await.unwrap();

    assert_eq!(updated.workflow_stage, WorkflowStage::Reporting);
    assert_eq!(updated.status, "Reporting");
    assert_eq!(
        updated.icsr_classification,
        Some(IcsrClassification::ProbableAoi)
    );
    assert_eq!(updated.assigned_to, None);
    assert_eq!(updated.batch_id, None);
    assert_eq!(updated.allocated_at, None);

    // The stored row matches the returned view
    let stored = repo.get(org, study.id).await.unwrap().unwrap();
    assert_eq!(stored.workflow_stage, WorkflowStage::Reporting);
    assert_eq!(stored.assigned_to, None);
}

#[tokio::test]
async fn test_allocation_is_exclusive_between_reviewers() {
    let pool = test_pool().await;
    let org = seed_default_org(&pool).await;
    for i in 0..2 {
        insert_queued_study(
            &pool,
            org,
            &format!("3802000{}", i),
            IcsrClassification::ProbableAoi,
            i,
        )
        .await;
    }

    let config = config_with(1);
    let first = BatchAllocator::new(StudyRepository::new(&pool), &config)
        .allocate(org, WorkflowTrack::Aoi, Uuid::new_v4())
        .await
        .unwrap();
    let second = BatchAllocator::new(StudyRepository::new(&pool), &config)
        .allocate(org, WorkflowTrack::Aoi, Uuid::new_v4())
        .await
        .unwrap();

    assert_eq!(first.studies.len(), 1);
    assert_eq!(second.studies.len(), 1);
    assert_ne!(first.studies[0].id, second.studies[0].id);
    assert_ne!(first.batch_id, second.batch_id);

    // Supply exhausted: a third allocation gets an empty batch, not an error
    let third = BatchAllocator::new(StudyRepository::new(&pool), &config)
        .allocate(org, WorkflowTrack::Aoi, Uuid::new_v4())
        .await
        .unwrap();
    assert!(third.studies.is_empty());
}

#[tokio::test]
async fn test_allocation_caps_at_batch_size_oldest_first() {
    let pool = test_pool().await;
    let org = seed_default_org(&pool).await;
    let oldest = insert_queued_study(&pool, org, "38030001", IcsrClassification::NoCase, -300).await;
    let middle = insert_queued_study(&pool, org, "38030002", IcsrClassification::NoCase, -200).await;
    insert_queued_study(&pool, org, "38030003", IcsrClassification::NoCase, -100).await;

    let config = WorkflowConfig {
        batch_size_no_case: 2,
        ..WorkflowConfig::default()
    };
    let batch = BatchAllocator::new(StudyRepository::new(&pool), &config)
        .allocate(org, WorkflowTrack::NoCase, Uuid::new_v4())
        .await
        .unwrap();

    assert_eq!(batch.studies.len(), 2);
    assert_eq!(batch.studies[0].id, oldest.id);
    assert_eq!(batch.studies[1].id, middle.id);
    // One batch id shared by every allocated study
    assert!(batch
        .studies
        .iter()
        .all(|s| s.batch_id == Some(batch.batch_id)));
}

#[tokio::test]
async fn test_allocation_ignores_other_tracks() {
    let pool = test_pool().await;
    let org = seed_default_org(&pool).await;
    insert_queued_study(&pool, org, "38040001", IcsrClassification::ProbableIcsr, 0).await;

    let config = WorkflowConfig::default();
    let batch = BatchAllocator::new(StudyRepository::new(&pool), &config)
        .allocate(org, WorkflowTrack::Aoi, Uuid::new_v4())
        .await
        .unwrap();

    assert!(batch.studies.is_empty());
}

#[tokio::test]
async fn test_release_returns_batch_to_queue_and_is_idempotent() {
    let pool = test_pool().await;
    let org = seed_default_org(&pool).await;
    let study = insert_queued_study(&pool, org, "38050001", IcsrClassification::ProbableAoi, 0).await;

    let config = config_with(5);
    let reviewer = Uuid::new_v4();
    let allocator = BatchAllocator::new(StudyRepository::new(&pool), &config);
    let batch = allocator
        .allocate(org, WorkflowTrack::Aoi, reviewer)
        .await
        .unwrap();
    assert_eq!(batch.studies.len(), 1);

    let released = allocator.release(org, batch.batch_id).await.unwrap();
    assert_eq!(released, 1);

    let repo = StudyRepository::new(&pool);
    let back = repo.get(org, study.id).await.unwrap().unwrap();
    assert_eq!(back.workflow_stage, WorkflowStage::TriageQueueAoi);
    assert_eq!(back.status, "Under Triage Review");
    assert_eq!(back.assigned_to, None);
    assert_eq!(back.batch_id, None);
    assert_eq!(back.allocated_at, None);

    // Second release of the same batch is a safe no-op
    let again = allocator.release(org, batch.batch_id).await.unwrap();
    assert_eq!(again, 0);
    let unchanged = repo.get(org, study.id).await.unwrap().unwrap();
    assert_eq!(unchanged.workflow_stage, WorkflowStage::TriageQueueAoi);

    // Releasing an unknown batch is also a no-op
    let unknown = allocator.release(org, Uuid::new_v4()).await.unwrap();
    assert_eq!(unknown, 0);
}

#[tokio::test]
async fn test_release_skips_finalized_studies() {
    let pool = test_pool().await;
    let org = seed_default_org(&pool).await;
    insert_queued_study(&pool, org, "38060001", IcsrClassification::ProbableAoi, 0).await;
    insert_queued_study(&pool, org, "38060002", IcsrClassification::ProbableAoi, 1).await;

    let config = config_with(5);
    let allocator = BatchAllocator::new(StudyRepository::new(&pool), &config);
    let batch = allocator
        .allocate(org, WorkflowTrack::Aoi, Uuid::new_v4())
        .await
        .unwrap();
    assert_eq!(batch.studies.len(), 2);

    // Finalize one of the two before the batch is abandoned
    let decided = &batch.studies[0];
    let outcome = apply_decision(decided, "Confirm AOI");
    let repo = StudyRepository::new(&pool);
    repo.apply_decision(decided, &outcome).await.unwrap();

    let released = allocator.release(org, batch.batch_id).await.unwrap();
    assert_eq!(released, 1);

    let finalized = repo.get(org, decided.id).await.unwrap().unwrap();
    assert_eq!(finalized.workflow_stage, WorkflowStage::Reporting);
}

#[tokio::test]
async fn test_claim_race_loses_gracefully() {
    let pool = test_pool().await;
    let org = seed_default_org(&pool).await;
    let study = insert_queued_study(&pool, org, "38070001", IcsrClassification::ProbableIcsr, 0).await;

    let config = WorkflowConfig::default();
    let winner = BatchAllocator::new(StudyRepository::new(&pool), &config)
        .allocate(org, WorkflowTrack::Icsr, Uuid::new_v4())
        .await
        .unwrap();
    assert_eq!(winner.studies.len(), 1);

    // A second claim against the same (now stale) snapshot must lose
    use vigilit::services::allocator::AllocationStamp;
    let repo = StudyRepository::new(&pool);
    let stamp = AllocationStamp {
        reviewer_id: Uuid::new_v4(),
        batch_id: Uuid::new_v4(),
        workflow_stage: WorkflowStage::AssessmentIcsr,
        status: "Under Assessment".to_string(),
        sub_status: Some("With Reviewer".to_string()),
        last_queue_stage: WorkflowStage::TriageQueueIcsr,
        allocated_at: chrono::Utc::now(),
    };
    let claim = repo.try_claim(&study, &stamp).await.unwrap();
    assert!(claim.is_none());
}

#[tokio::test]
async fn test_unknown_decision_releases_without_stage_change() {
    let pool = test_pool().await;
    let org = seed_default_org(&pool).await;
    insert_queued_study(&pool, org, "38080001", IcsrClassification::ProbableIcsr, 0).await;

    let config = WorkflowConfig::default();
    let allocator = BatchAllocator::new(StudyRepository::new(&pool), &config);
    let batch = allocator
        .allocate(org, WorkflowTrack::Icsr, Uuid::new_v4())
        .await
        .unwrap();
    let allocated = &batch.studies[0];

    let outcome = apply_decision(allocated, "Archive Forever");
    assert!(matches!(outcome, DecisionOutcome::Unrecognized { .. }));

    let repo = StudyRepository::new(&pool);
    let updated = repo.apply_decision(allocated, &outcome).await.unwrap();

    // Assignment released, classification and stage untouched
    assert_eq!(updated.assigned_to, None);
    assert_eq!(updated.batch_id, None);
    assert_eq!(updated.workflow_stage, WorkflowStage::AssessmentIcsr);
    assert_eq!(
        updated.icsr_classification,
        Some(IcsrClassification::ProbableIcsr)
    );
}

#[tokio::test]
async fn test_every_decision_clears_assignment_and_hits_its_target() {
    let cases = [
        ("Confirm ICSR", WorkflowStage::DataEntry, IcsrClassification::ProbableIcsr),
        ("Confirm AOI", WorkflowStage::Reporting, IcsrClassification::ProbableAoi),
        ("Confirm No Case", WorkflowStage::Completed, IcsrClassification::NoCase),
        ("Upgrade to ICSR", WorkflowStage::TriageQueueIcsr, IcsrClassification::ProbableIcsr),
        ("Downgrade to AOI", WorkflowStage::TriageQueueAoi, IcsrClassification::ProbableAoi),
        ("Downgrade to No Case", WorkflowStage::TriageQueueNoCase, IcsrClassification::NoCase),
    ];

    for (i, (decision, stage, classification)) in cases.into_iter().enumerate() {
        let pool = test_pool().await;
        let org = seed_default_org(&pool).await;
        insert_queued_study(
            &pool,
            org,
            &format!("3810000{}", i),
            IcsrClassification::ProbableAoi,
            0,
        )
        .await;

        let config = WorkflowConfig::default();
        let batch = BatchAllocator::new(StudyRepository::new(&pool), &config)
            .allocate(org, WorkflowTrack::Aoi, Uuid::new_v4())
            .await
            .unwrap();
        let allocated = &batch.studies[0];

        let outcome = apply_decision(allocated, decision);
        let repo = StudyRepository::new(&pool);
        let updated = repo.apply_decision(allocated, &outcome).await.unwrap();

        assert_eq!(updated.workflow_stage, stage, "decision: {}", decision);
        assert_eq!(
            updated.icsr_classification,
            Some(classification),
            "decision: {}",
            decision
        );
        assert_eq!(
            updated.workflow_track,
            Some(classification.track()),
            "decision: {}",
            decision
        );
        assert_eq!(updated.assigned_to, None, "decision: {}", decision);
        assert_eq!(updated.batch_id, None, "decision: {}", decision);
        assert_eq!(updated.allocated_at, None, "decision: {}", decision);
    }
}

#[tokio::test]
async fn test_audit_log_round_trip() {
    let pool = test_pool().await;
    let org = seed_default_org(&pool).await;

    let repo = AuditRepository::new(&pool);
    let changes = vec![FieldChange {
        field: "workflowStage".to_string(),
        before: Some("ASSESSMENT_AOI".to_string()),
        after: Some("REPORTING".to_string()),
    }];
    let entry = repo
        .insert(
            org,
            Some(Uuid::new_v4()),
            Some("reviewer1"),
            "triage_decision",
            "studies",
            Some("study-1"),
            Some("Changed Workflow Stage from \"ASSESSMENT_AOI\" to \"REPORTING\""),
            &changes,
            None,
            None,
            Some(&serde_json::json!({ "decision": "Confirm AOI" })),
        )
        .await
        .unwrap();

    let listed = repo
        .list(org, &AuditLogQuery::default())
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, entry.id);
    assert_eq!(listed[0].action, "triage_decision");
    assert_eq!(listed[0].changes, changes);
    assert_eq!(
        listed[0].metadata.as_ref().unwrap()["decision"],
        "Confirm AOI"
    );

    // Tenant isolation: another organization sees nothing
    let other = repo
        .list(Uuid::new_v4(), &AuditLogQuery::default())
        .await
        .unwrap();
    assert!(other.is_empty());
}

#[tokio::test]
async fn test_tenant_isolation_for_allocation() {
    let pool = test_pool().await;
    let org = seed_default_org(&pool).await;
    let other_org = Uuid::new_v4();
    insert_queued_study(&pool, org, "38090001", IcsrClassification::ProbableAoi, 0).await;

    let config = WorkflowConfig::default();
    let batch = BatchAllocator::new(StudyRepository::new(&pool), &config)
        .allocate(other_org, WorkflowTrack::Aoi, Uuid::new_v4())
        .await
        .unwrap();

    assert!(batch.studies.is_empty());
}
