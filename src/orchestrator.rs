use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{HealthError, Result};
use crate::health::compute_score;
use crate::models::{Activity, ProjectStatus};
use crate::store::HealthStore;
use crate::week::{recent_weeks, Clock};

/// Re-reads allowed when another writer moves the status between our read
/// and our write.
const MAX_STATUS_RACES: u32 = 3;

#[derive(Debug, Clone)]
pub struct HealthConfig {
    /// Number of ISO weeks, ending at the current one, sampled for feedback
    /// and check-ins.
    pub lookback_weeks: usize,
    /// Attempts per project per run before deferring to the next run.
    pub max_attempts: u32,
    pub retry_backoff: Duration,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            lookback_weeks: 2,
            max_attempts: 3,
            retry_backoff: Duration::from_millis(250),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecomputeOutcome {
    Unchanged {
        score: i32,
        status: ProjectStatus,
    },
    StatusChanged {
        score: i32,
        from: ProjectStatus,
        to: ProjectStatus,
    },
    /// Completed projects keep their last score.
    SkippedCompleted,
}

impl RecomputeOutcome {
    pub fn score(&self) -> Option<i32> {
        match self {
            RecomputeOutcome::Unchanged { score, .. }
            | RecomputeOutcome::StatusChanged { score, .. } => Some(*score),
            RecomputeOutcome::SkippedCompleted => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub scanned: usize,
    pub updated: usize,
    pub status_changes: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl RunSummary {
    fn record(&mut self, outcome: RecomputeOutcome) {
        match outcome {
            RecomputeOutcome::Unchanged { .. } => self.updated += 1,
            RecomputeOutcome::StatusChanged { .. } => {
                self.updated += 1;
                self.status_changes += 1;
            }
            RecomputeOutcome::SkippedCompleted => self.skipped += 1,
        }
    }
}

/// Recomputes and persists project health scores.
#[derive(Clone)]
pub struct HealthUpdater {
    store: Arc<dyn HealthStore>,
    clock: Arc<dyn Clock>,
    config: HealthConfig,
}

impl HealthUpdater {
    pub fn new(store: Arc<dyn HealthStore>, clock: Arc<dyn Clock>, config: HealthConfig) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    pub fn store(&self) -> &dyn HealthStore {
        self.store.as_ref()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Re-derives one project's score from its currently stored signals.
    ///
    /// Safe to call repeatedly and concurrently. When the derived status
    /// differs from the stored one, the status flip and a STATUS_CHANGE
    /// activity are written together, and only if the stored status is still
    /// the one that was read; otherwise only the score is overwritten.
    pub async fn recompute_health_score(&self, project_id: Uuid) -> Result<RecomputeOutcome> {
        for _ in 0..MAX_STATUS_RACES {
            if let Some(outcome) = self.try_recompute(project_id).await? {
                return Ok(outcome);
            }
            debug!(%project_id, "status changed underneath recompute, re-reading");
        }
        Err(HealthError::Conflict(format!(
            "status of project {project_id} kept changing during recompute"
        )))
    }

    /// `None` when the stored status moved between the read and the flip.
    async fn try_recompute(&self, project_id: Uuid) -> Result<Option<RecomputeOutcome>> {
        let project = self
            .store
            .find_project(project_id)
            .await?
            .ok_or_else(|| HealthError::project_not_found(project_id))?;

        if !project.status.is_active() {
            debug!(%project_id, "project completed, keeping last score");
            return Ok(Some(RecomputeOutcome::SkippedCompleted));
        }

        let now = self.clock.now();
        let weeks = recent_weeks(now, self.config.lookback_weeks);

        let feedback = self.store.recent_feedback(project_id, &weeks).await?;
        let check_ins = self.store.recent_check_ins(project_id, &weeks).await?;
        let open_risks = self.store.open_risks(project_id).await?;
        let flagged_issues = self.store.flagged_issue_count(project_id).await?;

        let health = compute_score(
            &project,
            &feedback,
            &check_ins,
            &open_risks,
            flagged_issues,
            now,
        );
        debug!(
            %project_id,
            previous = project.health_score,
            score = health.score,
            client = health.breakdown.client,
            employee = health.breakdown.employee,
            progress = health.breakdown.progress,
            risk = health.breakdown.risk,
            "computed health score"
        );

        if health.status == project.status {
            self.store
                .update_health_score(project_id, health.score)
                .await?;
            return Ok(Some(RecomputeOutcome::Unchanged {
                score: health.score,
                status: health.status,
            }));
        }

        let activity =
            Activity::status_change(project_id, project.status, health.status, health.score, now);
        let flipped = self
            .store
            .record_status_change(
                project_id,
                project.status,
                health.score,
                health.status,
                &activity,
            )
            .await?;
        if !flipped {
            return Ok(None);
        }
        info!(
            %project_id,
            from = %project.status,
            to = %health.status,
            score = health.score,
            "project status changed"
        );

        Ok(Some(RecomputeOutcome::StatusChanged {
            score: health.score,
            from: project.status,
            to: health.status,
        }))
    }

    async fn recompute_with_retry(&self, project_id: Uuid) -> Result<RecomputeOutcome> {
        let mut attempt = 1;
        loop {
            match self.recompute_health_score(project_id).await {
                Err(err) if err.is_transient() && attempt < self.config.max_attempts => {
                    warn!(%project_id, attempt, error = %err, "health recompute failed, retrying");
                    attempt += 1;
                    tokio::time::sleep(self.config.retry_backoff).await;
                }
                result => return result,
            }
        }
    }

    /// Rescores every active project concurrently. A failing project is
    /// logged and left for the next run; the run itself always completes.
    pub async fn recompute_all(&self) -> RunSummary {
        let mut summary = RunSummary::default();

        let project_ids = match self.store.active_project_ids().await {
            Ok(ids) => ids,
            Err(err) => {
                error!(error = %err, "could not list active projects");
                return summary;
            }
        };
        summary.scanned = project_ids.len();

        let mut tasks = JoinSet::new();
        for project_id in project_ids {
            let updater = self.clone();
            tasks.spawn(async move {
                let result = updater.recompute_with_retry(project_id).await;
                (project_id, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(outcome))) => summary.record(outcome),
                Ok((project_id, Err(err))) if err.is_not_found() => {
                    info!(%project_id, "project disappeared before scoring");
                    summary.skipped += 1;
                }
                Ok((project_id, Err(err))) => {
                    warn!(%project_id, error = %err, "health recompute deferred to next run");
                    summary.failed += 1;
                }
                Err(err) => {
                    error!(error = %err, "health recompute task panicked");
                    summary.failed += 1;
                }
            }
        }

        info!(
            scanned = summary.scanned,
            updated = summary.updated,
            status_changes = summary.status_changes,
            skipped = summary.skipped,
            failed = summary.failed,
            "health score update finished"
        );
        summary
    }
}
