//! Workflow state machine
//!
//! Maps a reviewer's triage decision onto the study's next workflow position.
//! Every decision releases the study from its batch (assignment fields are
//! cleared unconditionally); only recognized decisions also move the stage.
//!
//! The decision table:
//!
//! | Decision             | Target stage        | Classification | Track   |
//! |----------------------|---------------------|----------------|---------|
//! | Confirm ICSR         | DATA_ENTRY          | Probable ICSR  | ICSR    |
//! | Confirm AOI          | REPORTING           | Probable AOI   | AOI     |
//! | Confirm No Case      | COMPLETED           | No Case        | NO_CASE |
//! | Upgrade to ICSR      | TRIAGE_QUEUE_ICSR   | Probable ICSR  | ICSR    |
//! | Downgrade to AOI     | TRIAGE_QUEUE_AOI    | Probable AOI   | AOI     |
//! | Downgrade to No Case | TRIAGE_QUEUE_NO_CASE| No Case        | NO_CASE |
//!
//! Upgrade/downgrade always re-queue for fresh triage; only a same-track
//! confirm advances the study past assessment.

use tracing::warn;

use crate::models::{IcsrClassification, Study, WorkflowStage, WorkflowTrack};

/// A reviewer decision recognized by the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriageDecision {
    ConfirmIcsr,
    ConfirmAoi,
    ConfirmNoCase,
    UpgradeToIcsr,
    DowngradeToAoi,
    DowngradeToNoCase,
}

impl TriageDecision {
    pub fn all() -> [TriageDecision; 6] {
        [
            TriageDecision::ConfirmIcsr,
            TriageDecision::ConfirmAoi,
            TriageDecision::ConfirmNoCase,
            TriageDecision::UpgradeToIcsr,
            TriageDecision::DowngradeToAoi,
            TriageDecision::DowngradeToNoCase,
        ]
    }

    /// Parse the decision string submitted by the reviewer
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Confirm ICSR" => Some(TriageDecision::ConfirmIcsr),
            "Confirm AOI" => Some(TriageDecision::ConfirmAoi),
            "Confirm No Case" => Some(TriageDecision::ConfirmNoCase),
            "Upgrade to ICSR" => Some(TriageDecision::UpgradeToIcsr),
            "Downgrade to AOI" => Some(TriageDecision::DowngradeToAoi),
            "Downgrade to No Case" => Some(TriageDecision::DowngradeToNoCase),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TriageDecision::ConfirmIcsr => "Confirm ICSR",
            TriageDecision::ConfirmAoi => "Confirm AOI",
            TriageDecision::ConfirmNoCase => "Confirm No Case",
            TriageDecision::UpgradeToIcsr => "Upgrade to ICSR",
            TriageDecision::DowngradeToAoi => "Downgrade to AOI",
            TriageDecision::DowngradeToNoCase => "Downgrade to No Case",
        }
    }
}

/// Stage-affecting part of a decision's update set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageChange {
    pub workflow_stage: WorkflowStage,
    pub status: String,
    pub sub_status: Option<String>,
    pub icsr_classification: IcsrClassification,
    pub workflow_track: WorkflowTrack,
}

impl StageChange {
    fn to_stage(stage: WorkflowStage, classification: IcsrClassification) -> Self {
        Self {
            workflow_stage: stage,
            status: stage.status_label().to_string(),
            sub_status: stage.sub_status_label().map(str::to_string),
            icsr_classification: classification,
            workflow_track: classification.track(),
        }
    }
}

/// Outcome of applying a decision to a study
///
/// Regardless of the variant, the caller must clear `assigned_to`,
/// `allocated_at` and `batch_id` in the same write: the reviewer releases
/// the study on every decision, recognized or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecisionOutcome {
    /// Recognized decision: release plus stage change
    Transition(StageChange),
    /// Unknown decision string: release only, stage untouched
    Unrecognized { decision: String },
}

impl DecisionOutcome {
    pub fn stage_change(&self) -> Option<&StageChange> {
        match self {
            DecisionOutcome::Transition(change) => Some(change),
            DecisionOutcome::Unrecognized { .. } => None,
        }
    }

    pub fn is_recognized(&self) -> bool {
        matches!(self, DecisionOutcome::Transition(_))
    }
}

/// Compute the update set for a reviewer decision
///
/// Never fails: unknown input degrades to a release-only outcome so bad
/// decision strings can never corrupt workflow state.
pub fn apply_decision(study: &Study, decision: &str) -> DecisionOutcome {
    let Some(decision) = TriageDecision::parse(decision) else {
        warn!(
            study_id = %study.id,
            decision = decision,
            stage = %study.workflow_stage,
            "Unrecognized triage decision, releasing without stage change"
        );
        return DecisionOutcome::Unrecognized {
            decision: decision.to_string(),
        };
    };

    let change = match decision {
        TriageDecision::ConfirmIcsr => {
            StageChange::to_stage(WorkflowStage::DataEntry, IcsrClassification::ProbableIcsr)
        }
        TriageDecision::ConfirmAoi => {
            StageChange::to_stage(WorkflowStage::Reporting, IcsrClassification::ProbableAoi)
        }
        TriageDecision::ConfirmNoCase => {
            StageChange::to_stage(WorkflowStage::Completed, IcsrClassification::NoCase)
        }
        TriageDecision::UpgradeToIcsr => StageChange::to_stage(
            WorkflowStage::TriageQueueIcsr,
            IcsrClassification::ProbableIcsr,
        ),
        TriageDecision::DowngradeToAoi => StageChange::to_stage(
            WorkflowStage::TriageQueueAoi,
            IcsrClassification::ProbableAoi,
        ),
        TriageDecision::DowngradeToNoCase => StageChange::to_stage(
            WorkflowStage::TriageQueueNoCase,
            IcsrClassification::NoCase,
        ),
    };

    DecisionOutcome::Transition(change)
}
