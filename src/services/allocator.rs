//! Batch allocator
//!
//! Pulls eligible studies from a track's triage queue and assigns them
//! exclusively to a reviewer for one working session. Selection is a pure
//! function over the candidate snapshot; the claim itself is a conditional
//! write in the repository so two concurrent requests can never hold the
//! same study (the loser simply receives a smaller batch).
//!
//! Ordering contract: candidates are taken oldest-first by `created_at`,
//! with the study id string as the final tie-break. Tests pin this.

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::WorkflowConfig;
use crate::db::StudyRepository;
use crate::models::{IcsrClassification, Study, WorkflowStage, WorkflowTrack};

/// Classification labels that belong to a track's queue
pub fn track_labels(track: WorkflowTrack) -> &'static [IcsrClassification] {
    match track {
        WorkflowTrack::Icsr => &[IcsrClassification::ProbableIcsr],
        WorkflowTrack::Aoi => &[IcsrClassification::ProbableAoi],
        WorkflowTrack::NoCase => &[IcsrClassification::NoCase],
    }
}

/// Batch size policy for a track
pub fn batch_size(config: &WorkflowConfig, track: WorkflowTrack) -> u32 {
    match track {
        WorkflowTrack::Icsr => config.batch_size_icsr,
        WorkflowTrack::Aoi => config.batch_size_aoi,
        WorkflowTrack::NoCase => config.batch_size_no_case,
    }
}

/// Secondary-QC sampling percentage for a track
///
/// Policy input for downstream QC processing only; selection below never
/// drops eligible items based on it.
pub fn sampling_rate(config: &WorkflowConfig, track: WorkflowTrack) -> Option<u8> {
    match track {
        WorkflowTrack::Icsr => None,
        WorkflowTrack::Aoi => Some(config.sampling_rate_aoi),
        WorkflowTrack::NoCase => Some(config.sampling_rate_no_case),
    }
}

/// Field updates stamped onto each claimed study
#[derive(Debug, Clone)]
pub struct AllocationStamp {
    pub reviewer_id: Uuid,
    pub batch_id: Uuid,
    pub workflow_stage: WorkflowStage,
    pub status: String,
    pub sub_status: Option<String>,
    /// Queue the study is returned to if the batch is released
    pub last_queue_stage: WorkflowStage,
    pub allocated_at: DateTime<Utc>,
}

impl AllocationStamp {
    fn for_study(
        study: &Study,
        track: WorkflowTrack,
        reviewer_id: Uuid,
        batch_id: Uuid,
        now: DateTime<Utc>,
    ) -> Self {
        let stage = WorkflowStage::assessment(track);
        let last_queue_stage = if study.workflow_stage.is_triage_queue() {
            study.workflow_stage
        } else {
            WorkflowStage::triage_queue(track)
        };
        Self {
            reviewer_id,
            batch_id,
            workflow_stage: stage,
            status: stage.status_label().to_string(),
            sub_status: stage.sub_status_label().map(str::to_string),
            last_queue_stage,
            allocated_at: now,
        }
    }
}

/// Select up to `batch_size` eligible studies from a candidate snapshot
///
/// Eligibility: classification belongs to the track, no current assignee,
/// and the study sits in the track's queue (by stage or by the triage
/// status mirror). Deterministic oldest-first order, `id` tie-break.
pub fn select_batch<'a>(
    candidates: &'a [Study],
    track: WorkflowTrack,
    batch_size: u32,
) -> Vec<&'a Study> {
    let labels = track_labels(track);
    let queue_stage = WorkflowStage::triage_queue(track);

    let mut eligible: Vec<&Study> = candidates
        .iter()
        .filter(|s| {
            s.icsr_classification
                .map(|c| labels.contains(&c))
                .unwrap_or(false)
        })
        .filter(|s| s.assigned_to.is_none())
        .filter(|s| s.status == "Under Triage Review" || s.workflow_stage == queue_stage)
        .collect();

    eligible.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.id.to_string().cmp(&b.id.to_string()))
    });
    eligible.truncate(batch_size as usize);
    eligible
}

/// A successfully allocated working batch
#[derive(Debug, Clone)]
pub struct AllocatedBatch {
    pub batch_id: Uuid,
    pub track: WorkflowTrack,
    pub qc_sampling_rate: Option<u8>,
    pub studies: Vec<Study>,
}

/// Allocates and releases working batches against the study store
pub struct BatchAllocator<'a> {
    studies: StudyRepository<'a>,
    config: &'a WorkflowConfig,
}

impl<'a> BatchAllocator<'a> {
    pub fn new(studies: StudyRepository<'a>, config: &'a WorkflowConfig) -> Self {
        Self { studies, config }
    }

    /// Allocate a batch of queued studies to a reviewer
    ///
    /// Zero eligible candidates is a normal outcome: the reviewer gets an
    /// empty batch, never an error. Losing a claim race shrinks the batch.
    pub async fn allocate(
        &self,
        organization_id: Uuid,
        track: WorkflowTrack,
        reviewer_id: Uuid,
    ) -> Result<AllocatedBatch> {
        let candidates = self
            .studies
            .queue_candidates(organization_id, track)
            .await?;
        let selected = select_batch(&candidates, track, batch_size(self.config, track));

        let batch_id = Uuid::new_v4();
        let now = Utc::now();
        let mut claimed = Vec::with_capacity(selected.len());

        for study in selected {
            let stamp = AllocationStamp::for_study(study, track, reviewer_id, batch_id, now);
            match self.studies.try_claim(study, &stamp).await? {
                Some(updated) => claimed.push(updated),
                None => {
                    // Lost the race to another allocation request
                    debug!(study_id = %study.id, "Study claimed concurrently, skipping");
                }
            }
        }

        info!(
            organization_id = %organization_id,
            track = %track,
            reviewer_id = %reviewer_id,
            batch_id = %batch_id,
            count = claimed.len(),
            "Allocated triage batch"
        );

        Ok(AllocatedBatch {
            batch_id,
            track,
            qc_sampling_rate: sampling_rate(self.config, track),
            studies: claimed,
        })
    }

    /// Release every unfinalized study in a batch back to its queue
    ///
    /// Idempotent: releasing an already-released or unknown batch is a
    /// no-op returning zero.
    pub async fn release(&self, organization_id: Uuid, batch_id: Uuid) -> Result<u64> {
        let released = self.studies.release_batch(organization_id, batch_id).await?;
        if released > 0 {
            info!(
                organization_id = %organization_id,
                batch_id = %batch_id,
                count = released,
                "Released triage batch"
            );
        }
        Ok(released)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn queued_study(
        org: Uuid,
        classification: IcsrClassification,
        created_offset_secs: i64,
    ) -> Study {
        let mut study = Study::new_classified(
            org,
            format!("pmid-{}", created_offset_secs),
            None,
            classification,
            None,
        );
        study.created_at = Utc::now() + Duration::seconds(created_offset_secs);
        study
    }

    #[test]
    fn test_select_filters_other_tracks() {
        let org = Uuid::new_v4();
        let candidates = vec![
            queued_study(org, IcsrClassification::ProbableAoi, 0),
            queued_study(org, IcsrClassification::ProbableIcsr, 1),
            queued_study(org, IcsrClassification::NoCase, 2),
        ];

        let selected = select_batch(&candidates, WorkflowTrack::Aoi, 10);
        assert_eq!(selected.len(), 1);
        assert_eq!(
            selected[0].icsr_classification,
            Some(IcsrClassification::ProbableAoi)
        );
    }

    #[test]
    fn test_select_skips_assigned() {
        let org = Uuid::new_v4();
        let mut taken = queued_study(org, IcsrClassification::ProbableAoi, 0);
        taken.assigned_to = Some(Uuid::new_v4());
        let free = queued_study(org, IcsrClassification::ProbableAoi, 1);
        let candidates = vec![taken, free.clone()];

        let selected = select_batch(&candidates, WorkflowTrack::Aoi, 10);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].id, free.id);
    }

    #[test]
    fn test_select_caps_at_batch_size() {
        let org = Uuid::new_v4();
        let candidates: Vec<Study> = (0..10)
            .map(|i| queued_study(org, IcsrClassification::NoCase, i))
            .collect();

        let selected = select_batch(&candidates, WorkflowTrack::NoCase, 3);
        assert_eq!(selected.len(), 3);
    }

    #[test]
    fn test_select_is_oldest_first_and_deterministic() {
        let org = Uuid::new_v4();
        let newest = queued_study(org, IcsrClassification::ProbableIcsr, 30);
        let oldest = queued_study(org, IcsrClassification::ProbableIcsr, -30);
        let middle = queued_study(org, IcsrClassification::ProbableIcsr, 0);
        let candidates = vec![newest.clone(), oldest.clone(), middle.clone()];

        let selected = select_batch(&candidates, WorkflowTrack::Icsr, 2);
        assert_eq!(selected[0].id, oldest.id);
        assert_eq!(selected[1].id, middle.id);

        // Same snapshot, same order
        let again = select_batch(&candidates, WorkflowTrack::Icsr, 2);
        let ids: Vec<Uuid> = selected.iter().map(|s| s.id).collect();
        let ids_again: Vec<Uuid> = again.iter().map(|s| s.id).collect();
        assert_eq!(ids, ids_again);
    }

    #[test]
    fn test_select_ties_break_on_id() {
        let org = Uuid::new_v4();
        let now = Utc::now();
        let mut a = queued_study(org, IcsrClassification::ProbableAoi, 0);
        let mut b = queued_study(org, IcsrClassification::ProbableAoi, 0);
        a.created_at = now;
        b.created_at = now;

        let candidates = vec![a.clone(), b.clone()];
        let selected = select_batch(&candidates, WorkflowTrack::Aoi, 2);

        let mut expected = vec![a.id.to_string(), b.id.to_string()];
        expected.sort();
        assert_eq!(selected[0].id.to_string(), expected[0]);
        assert_eq!(selected[1].id.to_string(), expected[1]);
    }

    #[test]
    fn test_select_empty_candidates_is_empty_batch() {
        let selected = select_batch(&[], WorkflowTrack::Icsr, 10);
        assert!(selected.is_empty());
    }

    #[test]
    fn test_sampling_rate_never_shrinks_selection() {
        // Sampling is downstream QC policy; even a 0% rate leaves the
        // allocator returning every eligible item up to the cap.
        let org = Uuid::new_v4();
        let candidates: Vec<Study> = (0..5)
            .map(|i| queued_study(org, IcsrClassification::ProbableAoi, i))
            .collect();

        let selected = select_batch(&candidates, WorkflowTrack::Aoi, 25);
        assert_eq!(selected.len(), 5);

        let config = WorkflowConfig {
            sampling_rate_aoi: 0,
            ..WorkflowConfig::default()
        };
        assert_eq!(sampling_rate(&config, WorkflowTrack::Aoi), Some(0));
        assert_eq!(sampling_rate(&config, WorkflowTrack::Icsr), None);
    }

    #[test]
    fn test_stamp_remembers_origin_queue() {
        let org = Uuid::new_v4();
        let study = queued_study(org, IcsrClassification::NoCase, 0);
        let stamp = AllocationStamp::for_study(
            &study,
            WorkflowTrack::NoCase,
            Uuid::new_v4(),
            Uuid::new_v4(),
            Utc::now(),
        );

        assert_eq!(stamp.workflow_stage, WorkflowStage::AssessmentNoCase);
        assert_eq!(stamp.status, "Under Assessment");
        assert_eq!(stamp.last_queue_stage, WorkflowStage::TriageQueueNoCase);
    }
}
