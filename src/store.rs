//! Data-access contracts consumed by the health updater and the submission
//! flow. Postgres implements them in `db`; tests use an in-memory store.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    Activity, CheckIn, CheckInSignal, Feedback, FeedbackSignal, Profile, Project, ProjectStatus,
    Risk, RiskSignal,
};
use crate::week::IsoWeek;

#[async_trait]
pub trait FeedbackReader: Send + Sync {
    /// Feedback for `project_id` in any of `weeks`, most recent first.
    async fn recent_feedback(&self, project_id: Uuid, weeks: &[IsoWeek])
        -> Result<Vec<FeedbackSignal>>;

    /// All-time count of feedback records with the issue flag set.
    async fn flagged_issue_count(&self, project_id: Uuid) -> Result<i64>;
}

#[async_trait]
pub trait CheckInReader: Send + Sync {
    async fn recent_check_ins(&self, project_id: Uuid, weeks: &[IsoWeek])
        -> Result<Vec<CheckInSignal>>;
}

#[async_trait]
pub trait RiskReader: Send + Sync {
    async fn open_risks(&self, project_id: Uuid) -> Result<Vec<RiskSignal>>;
}

#[async_trait]
pub trait ProjectRepository: Send + Sync {
    async fn find_project(&self, project_id: Uuid) -> Result<Option<Project>>;

    async fn active_project_ids(&self) -> Result<Vec<Uuid>>;

    /// Overwrites the stored score, leaving status alone. A project that is
    /// already completed is never touched.
    async fn update_health_score(&self, project_id: Uuid, score: i32) -> Result<()>;

    /// Moves the project from `from` to `status` and persists the new score
    /// together with the status-change activity as a single all-or-nothing
    /// write. Returns `false`, writing nothing, when the stored status is no
    /// longer `from` or the project is gone.
    async fn record_status_change(
        &self,
        project_id: Uuid,
        from: ProjectStatus,
        score: i32,
        status: ProjectStatus,
        activity: &Activity,
    ) -> Result<bool>;
}

#[async_trait]
pub trait SubmissionStore: Send + Sync {
    async fn find_profile(&self, profile_id: Uuid) -> Result<Option<Profile>>;

    /// Inserts the check-in, raises the project's progress by its contribution
    /// (capped at 100) and appends `activity`, all atomically. A second
    /// check-in for the same employee, project and ISO week fails with
    /// `HealthError::Conflict`; a completed project fails with
    /// `HealthError::Forbidden`.
    async fn insert_check_in(&self, check_in: &CheckIn, activity: &Activity) -> Result<()>;

    /// Inserts the feedback together with `activity`. Fails with
    /// `HealthError::Conflict` on a second feedback for the same client,
    /// project and ISO week.
    async fn insert_feedback(&self, feedback: &Feedback, activity: &Activity) -> Result<()>;

    async fn insert_risk(&self, risk: &Risk, activity: &Activity) -> Result<()>;
}

/// Everything the health updater and submission flow need from storage.
pub trait HealthStore:
    FeedbackReader + CheckInReader + RiskReader + ProjectRepository + SubmissionStore
{
}

impl<T> HealthStore for T where
    T: FeedbackReader
        + CheckInReader
        + RiskReader
        + ProjectRepository
        + SubmissionStore
{
}
