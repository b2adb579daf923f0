//! Study model and workflow enums
//!
//! A study is one article pulled from the literature feed. Its position in
//! the review workflow is carried by `WorkflowStage`; the classification and
//! track enums preserve the exact string values used by the document store
//! and the upstream classifier.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Safety-relevance track a study is routed on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkflowTrack {
    #[serde(rename = "ICSR")]
    Icsr,
    #[serde(rename = "AOI")]
    Aoi,
    #[serde(rename = "NO_CASE")]
    NoCase,
}

impl WorkflowTrack {
    pub fn all() -> [WorkflowTrack; 3] {
        [WorkflowTrack::Icsr, WorkflowTrack::Aoi, WorkflowTrack::NoCase]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowTrack::Icsr => "ICSR",
            WorkflowTrack::Aoi => "AOI",
            WorkflowTrack::NoCase => "NO_CASE",
        }
    }
}

impl std::fmt::Display for WorkflowTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for WorkflowTrack {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ICSR" => Ok(WorkflowTrack::Icsr),
            "AOI" => Ok(WorkflowTrack::Aoi),
            "NO_CASE" => Ok(WorkflowTrack::NoCase),
            _ => Err(format!("Invalid workflow track: {}", s)),
        }
    }
}

/// Machine/human classification label for a study
///
/// The string forms cross the storage boundary and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IcsrClassification {
    #[serde(rename = "Probable ICSR")]
    ProbableIcsr,
    #[serde(rename = "Probable AOI")]
    ProbableAoi,
    #[serde(rename = "No Case")]
    NoCase,
}

impl IcsrClassification {
    pub fn as_str(&self) -> &'static str {
        match self {
            IcsrClassification::ProbableIcsr => "Probable ICSR",
            IcsrClassification::ProbableAoi => "Probable AOI",
            IcsrClassification::NoCase => "No Case",
        }
    }

    /// The track this classification routes to
    pub fn track(&self) -> WorkflowTrack {
        match self {
            IcsrClassification::ProbableIcsr => WorkflowTrack::Icsr,
            IcsrClassification::ProbableAoi => WorkflowTrack::Aoi,
            IcsrClassification::NoCase => WorkflowTrack::NoCase,
        }
    }
}

impl std::fmt::Display for IcsrClassification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for IcsrClassification {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Probable ICSR" => Ok(IcsrClassification::ProbableIcsr),
            "Probable AOI" => Ok(IcsrClassification::ProbableAoi),
            "No Case" => Ok(IcsrClassification::NoCase),
            _ => Err(format!("Invalid classification: {}", s)),
        }
    }
}

/// Stage a study occupies in the review workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowStage {
    TriageQueueIcsr,
    TriageQueueAoi,
    TriageQueueNoCase,
    AssessmentIcsr,
    AssessmentAoi,
    AssessmentNoCase,
    DataEntry,
    MedicalReview,
    Reporting,
    Completed,
}

impl WorkflowStage {
    /// The triage queue for a track (initial stage for a classified study)
    pub fn triage_queue(track: WorkflowTrack) -> Self {
        match track {
            WorkflowTrack::Icsr => WorkflowStage::TriageQueueIcsr,
            WorkflowTrack::Aoi => WorkflowStage::TriageQueueAoi,
            WorkflowTrack::NoCase => WorkflowStage::TriageQueueNoCase,
        }
    }

    /// The assessment stage a batch from a track's queue moves into
    pub fn assessment(track: WorkflowTrack) -> Self {
        match track {
            WorkflowTrack::Icsr => WorkflowStage::AssessmentIcsr,
            WorkflowTrack::Aoi => WorkflowStage::AssessmentAoi,
            WorkflowTrack::NoCase => WorkflowStage::AssessmentNoCase,
        }
    }

    /// The track a queue/assessment stage belongs to, if any
    pub fn track(&self) -> Option<WorkflowTrack> {
        match self {
            WorkflowStage::TriageQueueIcsr | WorkflowStage::AssessmentIcsr => {
                Some(WorkflowTrack::Icsr)
            }
            WorkflowStage::TriageQueueAoi | WorkflowStage::AssessmentAoi => {
                Some(WorkflowTrack::Aoi)
            }
            WorkflowStage::TriageQueueNoCase | WorkflowStage::AssessmentNoCase => {
                Some(WorkflowTrack::NoCase)
            }
            _ => None,
        }
    }

    pub fn is_triage_queue(&self) -> bool {
        matches!(
            self,
            WorkflowStage::TriageQueueIcsr
                | WorkflowStage::TriageQueueAoi
                | WorkflowStage::TriageQueueNoCase
        )
    }

    pub fn is_assessment(&self) -> bool {
        matches!(
            self,
            WorkflowStage::AssessmentIcsr
                | WorkflowStage::AssessmentAoi
                | WorkflowStage::AssessmentNoCase
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkflowStage::Completed)
    }

    /// Human-readable status mirror, persisted alongside the stage
    pub fn status_label(&self) -> &'static str {
        match self {
            WorkflowStage::TriageQueueIcsr
            | WorkflowStage::TriageQueueAoi
            | WorkflowStage::TriageQueueNoCase => "Under Triage Review",
            WorkflowStage::AssessmentIcsr
            | WorkflowStage::AssessmentAoi
            | WorkflowStage::AssessmentNoCase => "Under Assessment",
            WorkflowStage::DataEntry => "Data Entry",
            WorkflowStage::MedicalReview => "Medical Review",
            WorkflowStage::Reporting => "Reporting",
            WorkflowStage::Completed => "Completed",
        }
    }

    /// Secondary status mirror shown in worklists
    pub fn sub_status_label(&self) -> Option<&'static str> {
        match self {
            WorkflowStage::TriageQueueIcsr
            | WorkflowStage::TriageQueueAoi
            | WorkflowStage::TriageQueueNoCase => Some("Awaiting Triage"),
            WorkflowStage::AssessmentIcsr
            | WorkflowStage::AssessmentAoi
            | WorkflowStage::AssessmentNoCase => Some("With Reviewer"),
            WorkflowStage::DataEntry => Some("R3 Form Pending"),
            WorkflowStage::MedicalReview => Some("Awaiting Medical Review"),
            WorkflowStage::Reporting => Some("Report Due"),
            WorkflowStage::Completed => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStage::TriageQueueIcsr => "TRIAGE_QUEUE_ICSR",
            WorkflowStage::TriageQueueAoi => "TRIAGE_QUEUE_AOI",
            WorkflowStage::TriageQueueNoCase => "TRIAGE_QUEUE_NO_CASE",
            WorkflowStage::AssessmentIcsr => "ASSESSMENT_ICSR",
            WorkflowStage::AssessmentAoi => "ASSESSMENT_AOI",
            WorkflowStage::AssessmentNoCase => "ASSESSMENT_NO_CASE",
            WorkflowStage::DataEntry => "DATA_ENTRY",
            WorkflowStage::MedicalReview => "MEDICAL_REVIEW",
            WorkflowStage::Reporting => "REPORTING",
            WorkflowStage::Completed => "COMPLETED",
        }
    }
}

impl std::fmt::Display for WorkflowStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for WorkflowStage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TRIAGE_QUEUE_ICSR" => Ok(WorkflowStage::TriageQueueIcsr),
            "TRIAGE_QUEUE_AOI" => Ok(WorkflowStage::TriageQueueAoi),
            "TRIAGE_QUEUE_NO_CASE" => Ok(WorkflowStage::TriageQueueNoCase),
            "ASSESSMENT_ICSR" => Ok(WorkflowStage::AssessmentIcsr),
            "ASSESSMENT_AOI" => Ok(WorkflowStage::AssessmentAoi),
            "ASSESSMENT_NO_CASE" => Ok(WorkflowStage::AssessmentNoCase),
            "DATA_ENTRY" => Ok(WorkflowStage::DataEntry),
            "MEDICAL_REVIEW" => Ok(WorkflowStage::MedicalReview),
            "REPORTING" => Ok(WorkflowStage::Reporting),
            "COMPLETED" => Ok(WorkflowStage::Completed),
            _ => Err(format!("Invalid workflow stage: {}", s)),
        }
    }
}

/// Study entity (one article under safety review)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Study {
    pub id: Uuid,
    pub organization_id: Uuid,
    /// External literature source identifier
    pub pmid: String,
    pub title: Option<String>,
    pub icsr_classification: Option<IcsrClassification>,
    /// Human override of the machine classification
    pub user_tag: Option<String>,
    pub workflow_track: Option<WorkflowTrack>,
    pub workflow_stage: WorkflowStage,
    pub status: String,
    pub sub_status: Option<String>,
    /// Exclusive holder while the study sits in an assessment batch
    pub assigned_to: Option<Uuid>,
    pub batch_id: Option<Uuid>,
    pub allocated_at: Option<DateTime<Utc>>,
    /// Queue the study was pulled from, used to return it on release
    pub last_queue_stage: Option<WorkflowStage>,
    pub qa_approval_status: Option<String>,
    pub r3_form_status: Option<String>,
    pub medical_review_status: Option<String>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Study {
    /// Create a newly classified study sitting in its track's triage queue
    pub fn new_classified(
        organization_id: Uuid,
        pmid: String,
        title: Option<String>,
        classification: IcsrClassification,
        created_by: Option<Uuid>,
    ) -> Self {
        let track = classification.track();
        let stage = WorkflowStage::triage_queue(track);
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            organization_id,
            pmid,
            title,
            icsr_classification: Some(classification),
            user_tag: None,
            workflow_track: Some(track),
            workflow_stage: stage,
            status: stage.status_label().to_string(),
            sub_status: stage.sub_status_label().map(str::to_string),
            assigned_to: None,
            batch_id: None,
            allocated_at: None,
            last_queue_stage: None,
            qa_approval_status: None,
            r3_form_status: None,
            medical_review_status: None,
            created_by,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the study can be picked into a working batch
    pub fn is_allocatable(&self) -> bool {
        self.assigned_to.is_none()
            && (self.status == "Under Triage Review" || self.workflow_stage.is_triage_queue())
    }
}

/// Request to register a classified study
#[derive(Debug, Clone, Deserialize, validator::Validate)]
pub struct CreateStudyRequest {
    #[validate(length(min = 1, max = 32))]
    pub pmid: String,
    #[validate(length(max = 1024))]
    pub title: Option<String>,
    /// One of "Probable ICSR", "Probable AOI", "No Case"
    pub classification: String,
}

/// Request to allocate a working batch for a reviewer
#[derive(Debug, Clone, Deserialize)]
pub struct AllocateBatchRequest {
    /// One of "ICSR", "AOI", "NO_CASE"
    pub track: String,
}

/// Request to submit a triage decision for an assessed study
#[derive(Debug, Clone, Deserialize, validator::Validate)]
pub struct DecisionRequest {
    #[validate(length(min = 1, max = 64))]
    pub decision: String,
}

/// Query filters for the study worklist
#[derive(Debug, Clone, Deserialize, Default)]
pub struct StudyQuery {
    pub stage: Option<String>,
    pub track: Option<String>,
    pub assigned_to: Option<Uuid>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

/// Allocated batch returned to the reviewer
#[derive(Debug, Clone, Serialize)]
pub struct BatchResponse {
    pub batch_id: Uuid,
    pub track: WorkflowTrack,
    /// Sampling percentage downstream secondary QC applies to this track
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qc_sampling_rate: Option<u8>,
    pub studies: Vec<Study>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_strings_round_trip() {
        for c in [
            IcsrClassification::ProbableIcsr,
            IcsrClassification::ProbableAoi,
            IcsrClassification::NoCase,
        ] {
            let parsed: IcsrClassification = c.as_str().parse().unwrap();
            assert_eq!(parsed, c);
        }
    }

    #[test]
    fn test_classification_serde_uses_external_labels() {
        let json = serde_json::to_string(&IcsrClassification::ProbableAoi).unwrap();
        assert_eq!(json, "\"Probable AOI\"");
        let back: IcsrClassification = serde_json::from_str("\"No Case\"").unwrap();
        assert_eq!(back, IcsrClassification::NoCase);
    }

    #[test]
    fn test_stage_serde_uses_screaming_snake() {
        let json = serde_json::to_string(&WorkflowStage::TriageQueueNoCase).unwrap();
        assert_eq!(json, "\"TRIAGE_QUEUE_NO_CASE\"");
    }

    #[test]
    fn test_stage_track_consistency() {
        for track in WorkflowTrack::all() {
            assert_eq!(WorkflowStage::triage_queue(track).track(), Some(track));
            assert_eq!(WorkflowStage::assessment(track).track(), Some(track));
        }
        assert_eq!(WorkflowStage::DataEntry.track(), None);
    }

    #[test]
    fn test_new_classified_lands_in_track_queue() {
        let study = Study::new_classified(
            Uuid::new_v4(),
            "38011234".to_string(),
            Some("Case report".to_string()),
            IcsrClassification::ProbableAoi,
            None,
        );

        assert_eq!(study.workflow_stage, WorkflowStage::TriageQueueAoi);
        assert_eq!(study.workflow_track, Some(WorkflowTrack::Aoi));
        assert_eq!(study.status, "Under Triage Review");
        assert!(study.assigned_to.is_none());
        assert!(study.is_allocatable());
    }

    #[test]
    fn test_assigned_study_is_not_allocatable() {
        let mut study = Study::new_classified(
            Uuid::new_v4(),
            "38011234".to_string(),
            None,
            IcsrClassification::ProbableIcsr,
            None,
        );
        study.assigned_to = Some(Uuid::new_v4());
        assert!(!study.is_allocatable());
    }
}
