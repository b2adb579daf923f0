//! Study repository
//!
//! All workflow writes are single-statement whole-update-set UPDATEs so a
//! study can never be observed half-transitioned. The batch claim is a
//! conditional write on `assigned_to IS NULL`: it is the only concurrency
//! guard against double-assignment and the caller must treat a zero-row
//! result as having lost the race.

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::{parse_db_timestamp, parse_db_uuid};
use crate::models::{Study, StudyQuery, WorkflowStage, WorkflowTrack};
use crate::services::allocator::{track_labels, AllocationStamp};
use crate::services::workflow::DecisionOutcome;

const STUDY_COLUMNS: &str = "id, organization_id, pmid, title, icsr_classification, user_tag, \
     workflow_track, workflow_stage, status, sub_status, assigned_to, batch_id, allocated_at, \
     last_queue_stage, qa_approval_status, r3_form_status, medical_review_status, created_by, \
     created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct StudyRow {
    id: String,
    organization_id: String,
    pmid: String,
    title: Option<String>,
    icsr_classification: Option<String>,
    user_tag: Option<String>,
    workflow_track: Option<String>,
    workflow_stage: String,
    status: String,
    sub_status: Option<String>,
    assigned_to: Option<String>,
    batch_id: Option<String>,
    allocated_at: Option<String>,
    last_queue_stage: Option<String>,
    qa_approval_status: Option<String>,
    r3_form_status: Option<String>,
    medical_review_status: Option<String>,
    created_by: Option<String>,
    created_at: String,
    updated_at: String,
}

fn row_to_study(row: StudyRow) -> Result<Study> {
    Ok(Study {
        id: parse_db_uuid(&row.id)?,
        organization_id: parse_db_uuid(&row.organization_id)?,
        pmid: row.pmid,
        title: row.title,
        icsr_classification: row
            .icsr_classification
            .as_deref()
            .map(str::parse)
            .transpose()
            .map_err(|e: String| anyhow::anyhow!(e))?,
        user_tag: row.user_tag,
        workflow_track: row
            .workflow_track
            .as_deref()
            .map(str::parse)
            .transpose()
            .map_err(|e: String| anyhow::anyhow!(e))?,
        workflow_stage: row
            .workflow_stage
            .parse()
            .map_err(|e: String| anyhow::anyhow!(e))?,
        status: row.status,
        sub_status: row.sub_status,
        assigned_to: row.assigned_to.as_deref().map(parse_db_uuid).transpose()?,
        batch_id: row.batch_id.as_deref().map(parse_db_uuid).transpose()?,
        allocated_at: row.allocated_at.as_deref().map(parse_db_timestamp),
        last_queue_stage: row
            .last_queue_stage
            .as_deref()
            .map(str::parse)
            .transpose()
            .map_err(|e: String| anyhow::anyhow!(e))?,
        qa_approval_status: row.qa_approval_status,
        r3_form_status: row.r3_form_status,
        medical_review_status: row.medical_review_status,
        created_by: row.created_by.as_deref().map(parse_db_uuid).transpose()?,
        created_at: parse_db_timestamp(&row.created_at),
        updated_at: parse_db_timestamp(&row.updated_at),
    })
}

pub struct StudyRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> StudyRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a new study
    pub async fn create(&self, study: &Study) -> Result<Study> {
        sqlx::query(
            r#"
            INSERT INTO studies (id, organization_id, pmid, title, icsr_classification, user_tag,
                workflow_track, workflow_stage, status, sub_status, assigned_to, batch_id,
                allocated_at, last_queue_stage, qa_approval_status, r3_form_status,
                medical_review_status, created_by, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(study.id.to_string())
        .bind(study.organization_id.to_string())
        .bind(&study.pmid)
        .bind(&study.title)
        .bind(study.icsr_classification.map(|c| c.as_str()))
        .bind(&study.user_tag)
        .bind(study.workflow_track.map(|t| t.as_str()))
        .bind(study.workflow_stage.as_str())
        .bind(&study.status)
        .bind(&study.sub_status)
        .bind(study.assigned_to.map(|u| u.to_string()))
        .bind(study.batch_id.map(|b| b.to_string()))
        .bind(study.allocated_at.map(|t| t.to_rfc3339()))
        .bind(study.last_queue_stage.map(|s| s.as_str()))
        .bind(&study.qa_approval_status)
        .bind(&study.r3_form_status)
        .bind(&study.medical_review_status)
        .bind(study.created_by.map(|u| u.to_string()))
        .bind(study.created_at.to_rfc3339())
        .bind(study.updated_at.to_rfc3339())
        .execute(self.pool)
        .await
        .context("Failed to insert study")?;

        Ok(study.clone())
    }

    /// Get one study by id within an organization
    pub async fn get(&self, organization_id: Uuid, id: Uuid) -> Result<Option<Study>> {
        let sql = format!("SELECT {} FROM studies WHERE organization_id = ? AND id = ?", STUDY_COLUMNS);
        let row = sqlx::query_as::<_, StudyRow>(&sql)
            .bind(organization_id.to_string())
            .bind(id.to_string())
            .fetch_optional(self.pool)
            .await
            .context("Failed to fetch study")?;

        row.map(row_to_study).transpose()
    }

    /// List studies for the worklist, newest first
    pub async fn list(&self, organization_id: Uuid, query: &StudyQuery) -> Result<Vec<Study>> {
        let mut sql = format!(
            "SELECT {} FROM studies WHERE organization_id = ?",
            STUDY_COLUMNS
        );
        if query.stage.is_some() {
            sql.push_str(" AND workflow_stage = ?");
        }
        if query.track.is_some() {
            sql.push_str(" AND workflow_track = ?");
        }
        if query.assigned_to.is_some() {
            sql.push_str(" AND assigned_to = ?");
        }
        sql.push_str(" ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?");

        let mut q = sqlx::query_as::<_, StudyRow>(&sql).bind(organization_id.to_string());
        if let Some(ref stage) = query.stage {
            q = q.bind(stage);
        }
        if let Some(ref track) = query.track {
            q = q.bind(track);
        }
        if let Some(assigned_to) = query.assigned_to {
            q = q.bind(assigned_to.to_string());
        }
        q = q
            .bind(query.limit.unwrap_or(100) as i64)
            .bind(query.offset.unwrap_or(0) as i64);

        let rows = q
            .fetch_all(self.pool)
            .await
            .context("Failed to list studies")?;

        rows.into_iter().map(row_to_study).collect()
    }

    /// Unassigned queue candidates for a track, oldest first
    pub async fn queue_candidates(
        &self,
        organization_id: Uuid,
        track: WorkflowTrack,
    ) -> Result<Vec<Study>> {
        let labels = track_labels(track);
        let placeholders = vec!["?"; labels.len()].join(", ");
        let sql = format!(
            "SELECT {} FROM studies \
             WHERE organization_id = ? AND assigned_to IS NULL \
               AND icsr_classification IN ({}) \
               AND (status = 'Under Triage Review' OR workflow_stage = ?) \
             ORDER BY created_at ASC, id ASC",
            STUDY_COLUMNS, placeholders
        );

        let mut q = sqlx::query_as::<_, StudyRow>(&sql).bind(organization_id.to_string());
        for label in labels {
            q = q.bind(label.as_str());
        }
        q = q.bind(WorkflowStage::triage_queue(track).as_str());

        let rows = q
            .fetch_all(self.pool)
            .await
            .context("Failed to fetch queue candidates")?;

        rows.into_iter().map(row_to_study).collect()
    }

    /// Attempt to claim one study for a batch
    ///
    /// Compare-and-set on `assigned_to IS NULL`: returns the stamped study
    /// on success, `None` when another allocation won the race.
    pub async fn try_claim(
        &self,
        study: &Study,
        stamp: &AllocationStamp,
    ) -> Result<Option<Study>> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE studies
            SET assigned_to = ?, batch_id = ?, allocated_at = ?, workflow_stage = ?,
                status = ?, sub_status = ?, last_queue_stage = ?, updated_at = ?
            WHERE id = ? AND organization_id = ? AND assigned_to IS NULL
            "#,
        )
        .bind(stamp.reviewer_id.to_string())
        .bind(stamp.batch_id.to_string())
        .bind(stamp.allocated_at.to_rfc3339())
        .bind(stamp.workflow_stage.as_str())
        .bind(&stamp.status)
        .bind(&stamp.sub_status)
        .bind(stamp.last_queue_stage.as_str())
        .bind(now.to_rfc3339())
        .bind(study.id.to_string())
        .bind(study.organization_id.to_string())
        .execute(self.pool)
        .await
        .context("Failed to claim study for batch")?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        let mut claimed = study.clone();
        claimed.assigned_to = Some(stamp.reviewer_id);
        claimed.batch_id = Some(stamp.batch_id);
        claimed.allocated_at = Some(stamp.allocated_at);
        claimed.workflow_stage = stamp.workflow_stage;
        claimed.status = stamp.status.clone();
        claimed.sub_status = stamp.sub_status.clone();
        claimed.last_queue_stage = Some(stamp.last_queue_stage);
        claimed.updated_at = now;
        Ok(Some(claimed))
    }

    /// Apply a triage decision's update set in one write
    ///
    /// Assignment fields are cleared for every outcome; stage fields change
    /// only for recognized decisions.
    pub async fn apply_decision(
        &self,
        study: &Study,
        outcome: &DecisionOutcome,
    ) -> Result<Study> {
        let now = Utc::now();
        let mut updated = study.clone();
        updated.assigned_to = None;
        updated.batch_id = None;
        updated.allocated_at = None;
        updated.updated_at = now;

        match outcome.stage_change() {
            Some(change) => {
                sqlx::query(
                    r#"
                    UPDATE studies
                    SET assigned_to = NULL, batch_id = NULL, allocated_at = NULL,
                        workflow_stage = ?, status = ?, sub_status = ?,
                        icsr_classification = ?, workflow_track = ?, updated_at = ?
                    WHERE id = ? AND organization_id = ?
                    "#,
                )
                .bind(change.workflow_stage.as_str())
                .bind(&change.status)
                .bind(&change.sub_status)
                .bind(change.icsr_classification.as_str())
                .bind(change.workflow_track.as_str())
                .bind(now.to_rfc3339())
                .bind(study.id.to_string())
                .bind(study.organization_id.to_string())
                .execute(self.pool)
                .await
                .context("Failed to apply decision update")?;

                updated.workflow_stage = change.workflow_stage;
                updated.status = change.status.clone();
                updated.sub_status = change.sub_status.clone();
                updated.icsr_classification = Some(change.icsr_classification);
                updated.workflow_track = Some(change.workflow_track);
            }
            None => {
                sqlx::query(
                    r#"
                    UPDATE studies
                    SET assigned_to = NULL, batch_id = NULL, allocated_at = NULL, updated_at = ?
                    WHERE id = ? AND organization_id = ?
                    "#,
                )
                .bind(now.to_rfc3339())
                .bind(study.id.to_string())
                .bind(study.organization_id.to_string())
                .execute(self.pool)
                .await
                .context("Failed to apply release update")?;
            }
        }

        Ok(updated)
    }

    /// Return every unfinalized study in a batch to its originating queue
    ///
    /// Finalized studies already had their batch cleared by the decision
    /// write, so they never match. Idempotent: a second release matches
    /// zero rows.
    pub async fn release_batch(&self, organization_id: Uuid, batch_id: Uuid) -> Result<u64> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE studies
            SET assigned_to = NULL, batch_id = NULL, allocated_at = NULL,
                workflow_stage = COALESCE(last_queue_stage,
                    CASE workflow_track
                        WHEN 'ICSR' THEN 'TRIAGE_QUEUE_ICSR'
                        WHEN 'AOI' THEN 'TRIAGE_QUEUE_AOI'
                        WHEN 'NO_CASE' THEN 'TRIAGE_QUEUE_NO_CASE'
                        ELSE workflow_stage
                    END),
                status = 'Under Triage Review',
                sub_status = 'Awaiting Triage',
                updated_at = ?
            WHERE organization_id = ? AND batch_id = ?
            "#,
        )
        .bind(now.to_rfc3339())
        .bind(organization_id.to_string())
        .bind(batch_id.to_string())
        .execute(self.pool)
        .await
        .context("Failed to release batch")?;

        Ok(result.rows_affected())
    }
}
