//! In-memory `HealthStore` for exercising the updater and submission flow
//! without Postgres.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::error::{HealthError, Result};
use crate::models::{
    Activity, CheckIn, CheckInSignal, Feedback, FeedbackSignal, Profile, Project, ProjectStatus,
    Risk, RiskSeverity, RiskSignal, RiskStatus,
};
use crate::store::{CheckInReader, FeedbackReader, ProjectRepository, RiskReader, SubmissionStore};
use crate::week::IsoWeek;

#[derive(Default)]
struct State {
    profiles: HashMap<Uuid, Profile>,
    projects: HashMap<Uuid, Project>,
    check_ins: Vec<CheckIn>,
    feedback: Vec<Feedback>,
    risks: Vec<Risk>,
    activities: Vec<Activity>,
    /// Remaining injected read failures per project.
    read_failures: HashMap<Uuid, u32>,
    /// Remaining injected failures of the activity half of a write.
    activity_failures: u32,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

fn outage() -> HealthError {
    HealthError::DataAccess(sqlx::Error::PoolTimedOut)
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut State) -> T) -> T {
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut state)
    }

    pub fn add_profile(&self, profile: Profile) {
        self.with_state(|state| state.profiles.insert(profile.id(), profile));
    }

    pub fn add_project(&self, project: Project) {
        self.with_state(|state| state.projects.insert(project.id, project));
    }

    pub fn add_check_in(&self, check_in: CheckIn) {
        self.with_state(|state| state.check_ins.push(check_in));
    }

    pub fn add_feedback(&self, feedback: Feedback) {
        self.with_state(|state| state.feedback.push(feedback));
    }

    pub fn add_open_risk(&self, project_id: Uuid, severity: RiskSeverity) {
        self.with_state(|state| {
            state.risks.push(Risk {
                id: Uuid::new_v4(),
                project_id,
                employee_id: Uuid::new_v4(),
                title: format!("{severity} risk"),
                severity,
                mitigation_plan: "monitor".to_string(),
                status: RiskStatus::Open,
                created_at: Utc::now(),
            })
        });
    }

    pub fn fail_reads(&self, project_id: Uuid, times: u32) {
        self.with_state(|state| state.read_failures.insert(project_id, times));
    }

    pub fn fail_activity_writes(&self, times: u32) {
        self.with_state(|state| state.activity_failures = times);
    }

    pub fn remove_project(&self, project_id: Uuid) {
        self.with_state(|state| state.projects.remove(&project_id));
    }

    pub fn project(&self, project_id: Uuid) -> Option<Project> {
        self.with_state(|state| state.projects.get(&project_id).cloned())
    }

    pub fn activities(&self) -> Vec<Activity> {
        self.with_state(|state| state.activities.clone())
    }

    pub fn check_in_count(&self) -> usize {
        self.with_state(|state| state.check_ins.len())
    }

    fn take_failure(state: &mut State, project_id: Uuid) -> Result<()> {
        if let Some(remaining) = state.read_failures.get_mut(&project_id) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(outage());
            }
        }
        Ok(())
    }

    /// Runs before any mutation so a failed activity write leaves no trace.
    fn take_activity_failure(state: &mut State) -> Result<()> {
        if state.activity_failures > 0 {
            state.activity_failures -= 1;
            return Err(outage());
        }
        Ok(())
    }
}

/// A project running from `start` for `length_days`, assigned to `employee_ids`.
pub fn sample_project(
    client_id: Uuid,
    employee_ids: Vec<Uuid>,
    start: DateTime<Utc>,
    length_days: i64,
) -> Project {
    Project {
        id: Uuid::new_v4(),
        name: "Atlas Migration".to_string(),
        client_id,
        employee_ids,
        start_date: start,
        end_date: start + Duration::days(length_days),
        progress_percentage: 0,
        health_score: 100,
        status: ProjectStatus::OnTrack,
    }
}

#[async_trait]
impl FeedbackReader for MemoryStore {
    async fn recent_feedback(
        &self,
        project_id: Uuid,
        weeks: &[IsoWeek],
    ) -> Result<Vec<FeedbackSignal>> {
        self.with_state(|state| {
            Self::take_failure(state, project_id)?;
            let mut matching: Vec<&Feedback> = state
                .feedback
                .iter()
                .filter(|f| f.project_id == project_id && weeks.contains(&f.week))
                .collect();
            matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(matching
                .into_iter()
                .map(|f| FeedbackSignal {
                    satisfaction_rating: f.satisfaction_rating,
                })
                .collect())
        })
    }

    async fn flagged_issue_count(&self, project_id: Uuid) -> Result<i64> {
        self.with_state(|state| {
            Ok(state
                .feedback
                .iter()
                .filter(|f| f.project_id == project_id && f.issue_flagged)
                .count() as i64)
        })
    }
}

#[async_trait]
impl CheckInReader for MemoryStore {
    async fn recent_check_ins(
        &self,
        project_id: Uuid,
        weeks: &[IsoWeek],
    ) -> Result<Vec<CheckInSignal>> {
        self.with_state(|state| {
            Ok(state
                .check_ins
                .iter()
                .filter(|c| c.project_id == project_id && weeks.contains(&c.week))
                .map(|c| CheckInSignal {
                    confidence_level: c.confidence_level,
                })
                .collect())
        })
    }
}

#[async_trait]
impl RiskReader for MemoryStore {
    async fn open_risks(&self, project_id: Uuid) -> Result<Vec<RiskSignal>> {
        self.with_state(|state| {
            Ok(state
                .risks
                .iter()
                .filter(|r| r.project_id == project_id && r.status == RiskStatus::Open)
                .map(|r| RiskSignal {
                    severity: r.severity,
                })
                .collect())
        })
    }
}

#[async_trait]
impl ProjectRepository for MemoryStore {
    async fn find_project(&self, project_id: Uuid) -> Result<Option<Project>> {
        let project = self.project(project_id);
        // Let other tasks run between this read and the caller's write.
        tokio::task::yield_now().await;
        Ok(project)
    }

    async fn active_project_ids(&self) -> Result<Vec<Uuid>> {
        self.with_state(|state| {
            Ok(state
                .projects
                .values()
                .filter(|p| ProjectStatus::ACTIVE.contains(&p.status))
                .map(|p| p.id)
                .collect())
        })
    }

    async fn update_health_score(&self, project_id: Uuid, score: i32) -> Result<()> {
        self.with_state(|state| {
            if let Some(project) = state.projects.get_mut(&project_id) {
                if project.status.is_active() {
                    project.health_score = score;
                }
            }
            Ok(())
        })
    }

    async fn record_status_change(
        &self,
        project_id: Uuid,
        from: ProjectStatus,
        score: i32,
        status: ProjectStatus,
        activity: &Activity,
    ) -> Result<bool> {
        self.with_state(|state| {
            let current = state.projects.get(&project_id).map(|p| p.status);
            if current != Some(from) {
                return Ok(false);
            }
            Self::take_activity_failure(state)?;
            if let Some(project) = state.projects.get_mut(&project_id) {
                project.health_score = score;
                project.status = status;
            }
            state.activities.push(activity.clone());
            Ok(true)
        })
    }
}

#[async_trait]
impl SubmissionStore for MemoryStore {
    async fn find_profile(&self, profile_id: Uuid) -> Result<Option<Profile>> {
        Ok(self.with_state(|state| state.profiles.get(&profile_id).cloned()))
    }

    async fn insert_check_in(&self, check_in: &CheckIn, activity: &Activity) -> Result<()> {
        self.with_state(|state| {
            let status = state
                .projects
                .get(&check_in.project_id)
                .map(|p| p.status)
                .ok_or_else(|| HealthError::project_not_found(check_in.project_id))?;
            if !status.is_active() {
                return Err(HealthError::Forbidden(format!(
                    "project {} is completed",
                    check_in.project_id
                )));
            }

            let duplicate = state.check_ins.iter().any(|c| {
                c.employee_id == check_in.employee_id
                    && c.project_id == check_in.project_id
                    && c.week == check_in.week
            });
            if duplicate {
                return Err(HealthError::Conflict(format!(
                    "check-in already submitted for {}",
                    check_in.week
                )));
            }
            Self::take_activity_failure(state)?;

            if let Some(project) = state.projects.get_mut(&check_in.project_id) {
                project.progress_percentage =
                    (project.progress_percentage + check_in.complete_percentage).min(100);
            }
            state.check_ins.push(check_in.clone());
            state.activities.push(activity.clone());
            Ok(())
        })
    }

    async fn insert_feedback(&self, feedback: &Feedback, activity: &Activity) -> Result<()> {
        self.with_state(|state| {
            let duplicate = state.feedback.iter().any(|f| {
                f.client_id == feedback.client_id
                    && f.project_id == feedback.project_id
                    && f.week == feedback.week
            });
            if duplicate {
                return Err(HealthError::Conflict(format!(
                    "feedback already submitted for {}",
                    feedback.week
                )));
            }
            Self::take_activity_failure(state)?;
            state.feedback.push(feedback.clone());
            state.activities.push(activity.clone());
            Ok(())
        })
    }

    async fn insert_risk(&self, risk: &Risk, activity: &Activity) -> Result<()> {
        self.with_state(|state| {
            Self::take_activity_failure(state)?;
            state.risks.push(risk.clone());
            state.activities.push(activity.clone());
            Ok(())
        })
    }
}
