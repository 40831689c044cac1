use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgExecutor, PgPool, Row};
use uuid::Uuid;

use crate::error::{HealthError, Result};
use crate::models::{
    Activity, CheckIn, CheckInSignal, Feedback, FeedbackSignal, HighRiskSummary, NewCheckIn,
    NewProject, Profile, Project, ProjectHealthRow, ProjectStatus, Risk, RiskSignal,
    TimelineEntry,
};
use crate::store::{CheckInReader, FeedbackReader, ProjectRepository, RiskReader, SubmissionStore};
use crate::submit;
use crate::week::{weeks_between, IsoWeek};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn conflict_or_data_access(err: sqlx::Error, message: &str) -> HealthError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return HealthError::Conflict(message.to_string());
        }
    }
    HealthError::DataAccess(err)
}

fn week_columns(weeks: &[IsoWeek]) -> (Vec<i32>, Vec<i32>) {
    weeks
        .iter()
        .map(|w| (w.year, w.week as i32))
        .unzip()
}

fn project_from_row(row: &PgRow) -> Result<Project> {
    let status: String = row.try_get("status")?;
    Ok(Project {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        client_id: row.try_get("client_id")?,
        employee_ids: row.try_get("employee_ids")?,
        start_date: row.try_get("start_date")?,
        end_date: row.try_get("end_date")?,
        progress_percentage: row.try_get("progress_percentage")?,
        health_score: row.try_get("health_score")?,
        status: status.parse()?,
    })
}

async fn insert_activity<'e, E>(executor: E, activity: &Activity) -> Result<()>
where
    E: PgExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO project_health.activities
        (id, project_id, activity_type, content, metadata, reference_id,
         performer_role, performed_by, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(activity.id)
    .bind(activity.project_id)
    .bind(activity.activity_type.as_str())
    .bind(&activity.content)
    .bind(&activity.metadata)
    .bind(activity.reference_id)
    .bind(activity.performer_role.as_str())
    .bind(activity.performed_by)
    .bind(activity.created_at)
    .execute(executor)
    .await?;
    Ok(())
}

#[async_trait]
impl FeedbackReader for PgStore {
    async fn recent_feedback(
        &self,
        project_id: Uuid,
        weeks: &[IsoWeek],
    ) -> Result<Vec<FeedbackSignal>> {
        let (years, week_numbers) = week_columns(weeks);
        let rows = sqlx::query(
            r#"
            SELECT satisfaction_rating
            FROM project_health.client_feedback
            WHERE project_id = $1
              AND (year, week) IN (SELECT * FROM UNNEST($2::int4[], $3::int4[]))
            ORDER BY created_at DESC
            "#,
        )
        .bind(project_id)
        .bind(years)
        .bind(week_numbers)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(FeedbackSignal {
                    satisfaction_rating: row.try_get("satisfaction_rating")?,
                })
            })
            .collect()
    }

    async fn flagged_issue_count(&self, project_id: Uuid) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM project_health.client_feedback \
             WHERE project_id = $1 AND issue_flagged",
        )
        .bind(project_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}

#[async_trait]
impl CheckInReader for PgStore {
    async fn recent_check_ins(
        &self,
        project_id: Uuid,
        weeks: &[IsoWeek],
    ) -> Result<Vec<CheckInSignal>> {
        let (years, week_numbers) = week_columns(weeks);
        let rows = sqlx::query(
            r#"
            SELECT confidence_level
            FROM project_health.employee_check_ins
            WHERE project_id = $1
              AND (year, week) IN (SELECT * FROM UNNEST($2::int4[], $3::int4[]))
            ORDER BY created_at DESC
            "#,
        )
        .bind(project_id)
        .bind(years)
        .bind(week_numbers)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(CheckInSignal {
                    confidence_level: row.try_get("confidence_level")?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl RiskReader for PgStore {
    async fn open_risks(&self, project_id: Uuid) -> Result<Vec<RiskSignal>> {
        let rows = sqlx::query(
            "SELECT severity FROM project_health.project_risks \
             WHERE project_id = $1 AND status = 'open'",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let severity: String = row.try_get("severity")?;
                Ok(RiskSignal {
                    severity: severity.parse()?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl ProjectRepository for PgStore {
    async fn find_project(&self, project_id: Uuid) -> Result<Option<Project>> {
        let row = sqlx::query(
            r#"
            SELECT p.id, p.name, p.client_id, p.start_date, p.end_date,
                   p.progress_percentage, p.health_score, p.status,
                   ARRAY(
                       SELECT pe.employee_id FROM project_health.project_employees pe
                       WHERE pe.project_id = p.id
                   ) AS employee_ids
            FROM project_health.projects p
            WHERE p.id = $1
            "#,
        )
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(project_from_row).transpose()
    }

    async fn active_project_ids(&self) -> Result<Vec<Uuid>> {
        let active: Vec<&str> = ProjectStatus::ACTIVE.iter().map(|s| s.as_str()).collect();
        let ids = sqlx::query_scalar(
            "SELECT id FROM project_health.projects WHERE status = ANY($1)",
        )
        .bind(active)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn update_health_score(&self, project_id: Uuid, score: i32) -> Result<()> {
        sqlx::query(
            "UPDATE project_health.projects SET health_score = $2, updated_at = now() \
             WHERE id = $1 AND status <> 'completed'",
        )
        .bind(project_id)
        .bind(score)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_status_change(
        &self,
        project_id: Uuid,
        from: ProjectStatus,
        score: i32,
        status: ProjectStatus,
        activity: &Activity,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE project_health.projects \
             SET health_score = $2, status = $3, updated_at = now() \
             WHERE id = $1 AND status = $4",
        )
        .bind(project_id)
        .bind(score)
        .bind(status.as_str())
        .bind(from.as_str())
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        insert_activity(&mut *tx, activity).await?;
        tx.commit().await?;
        Ok(true)
    }
}

#[async_trait]
impl SubmissionStore for PgStore {
    async fn find_profile(&self, profile_id: Uuid) -> Result<Option<Profile>> {
        let row = sqlx::query(
            "SELECT id, role, full_name, position, company_name \
             FROM project_health.profiles WHERE id = $1",
        )
        .bind(profile_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let role: String = row.try_get("role")?;
                Profile::from_parts(
                    row.try_get("id")?,
                    &role,
                    row.try_get("full_name")?,
                    row.try_get("position")?,
                    row.try_get("company_name")?,
                )
                .map(Some)
            }
            None => Ok(None),
        }
    }

    async fn insert_check_in(&self, check_in: &CheckIn, activity: &Activity) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let status: Option<String> = sqlx::query_scalar(
            "SELECT status FROM project_health.projects WHERE id = $1 FOR UPDATE",
        )
        .bind(check_in.project_id)
        .fetch_optional(&mut *tx)
        .await?;
        match status.as_deref().map(str::parse::<ProjectStatus>).transpose()? {
            None => {
                tx.rollback().await?;
                return Err(HealthError::project_not_found(check_in.project_id));
            }
            Some(status) if !status.is_active() => {
                tx.rollback().await?;
                return Err(HealthError::Forbidden(format!(
                    "project {} is completed",
                    check_in.project_id
                )));
            }
            Some(_) => {}
        }

        sqlx::query(
            r#"
            INSERT INTO project_health.employee_check_ins
            (id, project_id, employee_id, progress_summary, blockers, confidence_level,
             complete_percentage, week, year, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(check_in.id)
        .bind(check_in.project_id)
        .bind(check_in.employee_id)
        .bind(&check_in.progress_summary)
        .bind(&check_in.blockers)
        .bind(check_in.confidence_level)
        .bind(check_in.complete_percentage)
        .bind(check_in.week.week as i32)
        .bind(check_in.week.year)
        .bind(check_in.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|err| {
            conflict_or_data_access(err, &format!("check-in already submitted for {}", check_in.week))
        })?;

        sqlx::query(
            "UPDATE project_health.projects \
             SET progress_percentage = LEAST(100, progress_percentage + $2), updated_at = now() \
             WHERE id = $1",
        )
        .bind(check_in.project_id)
        .bind(check_in.complete_percentage)
        .execute(&mut *tx)
        .await?;

        insert_activity(&mut *tx, activity).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn insert_feedback(&self, feedback: &Feedback, activity: &Activity) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO project_health.client_feedback
            (id, project_id, client_id, satisfaction_rating, communication_rating, comment,
             issue_flagged, issue_description, week, year, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(feedback.id)
        .bind(feedback.project_id)
        .bind(feedback.client_id)
        .bind(feedback.satisfaction_rating)
        .bind(feedback.communication_rating)
        .bind(&feedback.comment)
        .bind(feedback.issue_flagged)
        .bind(&feedback.issue_description)
        .bind(feedback.week.week as i32)
        .bind(feedback.week.year)
        .bind(feedback.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|err| {
            conflict_or_data_access(err, &format!("feedback already submitted for {}", feedback.week))
        })?;

        insert_activity(&mut *tx, activity).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn insert_risk(&self, risk: &Risk, activity: &Activity) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO project_health.project_risks
            (id, project_id, employee_id, title, severity, mitigation_plan, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(risk.id)
        .bind(risk.project_id)
        .bind(risk.employee_id)
        .bind(&risk.title)
        .bind(risk.severity.as_str())
        .bind(&risk.mitigation_plan)
        .bind(risk.status.as_str())
        .bind(risk.created_at)
        .execute(&mut *tx)
        .await?;

        insert_activity(&mut *tx, activity).await?;
        tx.commit().await?;
        Ok(())
    }
}

pub async fn insert_project(pool: &PgPool, project: &NewProject) -> anyhow::Result<Uuid> {
    let client_role: Option<String> =
        sqlx::query_scalar("SELECT role FROM project_health.profiles WHERE id = $1")
            .bind(project.client_id)
            .fetch_optional(pool)
            .await?;
    if client_role.as_deref() != Some("client") {
        anyhow::bail!("client not found: {}", project.client_id);
    }

    let employee_count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM project_health.profiles WHERE role = 'employee' AND id = ANY($1)",
    )
    .bind(project.employee_ids.as_slice())
    .fetch_one(pool)
    .await?;
    if employee_count != project.employee_ids.len() as i64 {
        anyhow::bail!("one or more employees were not found");
    }

    let id = Uuid::new_v4();
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO project_health.projects
        (id, name, description, client_id, start_date, end_date)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(id)
    .bind(&project.name)
    .bind(&project.description)
    .bind(project.client_id)
    .bind(project.start_date)
    .bind(project.end_date)
    .execute(&mut *tx)
    .await?;

    for employee_id in &project.employee_ids {
        sqlx::query(
            "INSERT INTO project_health.project_employees (project_id, employee_id) VALUES ($1, $2)",
        )
        .bind(id)
        .bind(employee_id)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(id)
}

pub async fn complete_project(pool: &PgPool, project_id: Uuid) -> anyhow::Result<bool> {
    let result = sqlx::query(
        "UPDATE project_health.projects SET status = 'completed', updated_at = now() \
         WHERE id = $1 AND status <> 'completed'",
    )
    .bind(project_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn fetch_project_health(pool: &PgPool) -> anyhow::Result<Vec<ProjectHealthRow>> {
    let rows = sqlx::query(
        "SELECT name, status, health_score, progress_percentage \
         FROM project_health.projects ORDER BY health_score ASC, name ASC",
    )
    .fetch_all(pool)
    .await?;

    let mut projects = Vec::new();
    for row in rows {
        let status: String = row.get("status");
        projects.push(ProjectHealthRow {
            name: row.get("name"),
            status: status.parse()?,
            health_score: row.get("health_score"),
            progress_percentage: row.get("progress_percentage"),
        });
    }

    Ok(projects)
}

pub async fn fetch_high_risk_summaries(
    pool: &PgPool,
    threshold: i32,
    now: DateTime<Utc>,
) -> anyhow::Result<Vec<HighRiskSummary>> {
    let rows = sqlx::query(
        r#"
        SELECT p.name, p.health_score, p.progress_percentage, p.start_date,
               (SELECT COUNT(*) FROM project_health.project_employees pe
                WHERE pe.project_id = p.id) AS employee_count,
               (SELECT COUNT(*) FROM project_health.employee_check_ins c
                WHERE c.project_id = p.id) AS submitted_check_ins,
               (SELECT COUNT(*) FROM project_health.client_feedback f
                WHERE f.project_id = p.id) AS submitted_feedback,
               (SELECT COUNT(*) FROM project_health.project_risks r
                WHERE r.project_id = p.id AND r.status = 'open') AS open_risks,
               (SELECT COUNT(*) FROM project_health.client_feedback f
                WHERE f.project_id = p.id AND f.issue_flagged) AS flagged_issues
        FROM project_health.projects p
        WHERE p.status <> 'completed' AND p.health_score < $1
        ORDER BY p.health_score ASC
        "#,
    )
    .bind(threshold)
    .fetch_all(pool)
    .await?;

    let mut summaries = Vec::new();
    for row in rows {
        let start_date: DateTime<Utc> = row.get("start_date");
        let employee_count: i64 = row.get("employee_count");
        let elapsed_weeks = weeks_between(start_date, now).len().saturating_sub(1) as i64;

        summaries.push(HighRiskSummary {
            name: row.get("name"),
            health_score: row.get("health_score"),
            progress_percentage: row.get("progress_percentage"),
            submitted_check_ins: row.get("submitted_check_ins"),
            expected_check_ins: elapsed_weeks * employee_count,
            submitted_feedback: row.get("submitted_feedback"),
            open_risks: row.get("open_risks"),
            flagged_issues: row.get("flagged_issues"),
        });
    }

    Ok(summaries)
}

pub async fn fetch_projects_missing_check_ins(
    pool: &PgPool,
    weeks: &[IsoWeek],
) -> anyhow::Result<Vec<ProjectHealthRow>> {
    let (years, week_numbers) = week_columns(weeks);
    let rows = sqlx::query(
        r#"
        SELECT p.name, p.status, p.health_score, p.progress_percentage
        FROM project_health.projects p
        WHERE p.status <> 'completed'
          AND NOT EXISTS (
              SELECT 1 FROM project_health.employee_check_ins c
              WHERE c.project_id = p.id
                AND (c.year, c.week) IN (SELECT * FROM UNNEST($1::int4[], $2::int4[]))
          )
        ORDER BY p.name ASC
        "#,
    )
    .bind(years)
    .bind(week_numbers)
    .fetch_all(pool)
    .await?;

    let mut projects = Vec::new();
    for row in rows {
        let status: String = row.get("status");
        projects.push(ProjectHealthRow {
            name: row.get("name"),
            status: status.parse()?,
            health_score: row.get("health_score"),
            progress_percentage: row.get("progress_percentage"),
        });
    }

    Ok(projects)
}

pub async fn fetch_recent_activity(pool: &PgPool, limit: i64) -> anyhow::Result<Vec<TimelineEntry>> {
    let rows = sqlx::query(
        r#"
        SELECT p.name, a.activity_type, a.content, a.created_at
        FROM project_health.activities a
        JOIN project_health.projects p ON p.id = a.project_id
        ORDER BY a.created_at DESC
        LIMIT $1
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    let mut entries = Vec::new();
    for row in rows {
        let activity_type: String = row.get("activity_type");
        entries.push(TimelineEntry {
            project_name: row.get("name"),
            activity_type: activity_type.parse()?,
            content: row.get("content"),
            created_at: row.get("created_at"),
        });
    }

    Ok(entries)
}

#[derive(Debug, Default)]
pub struct ImportSummary {
    pub inserted: usize,
    pub skipped: usize,
    /// Projects that received at least one check-in.
    pub touched: Vec<Uuid>,
}

/// Loads historical check-ins from CSV. Each row is held to the live
/// submission rules; rows for unknown employees, unassigned employees,
/// completed or missing projects, and weeks already checked in are skipped.
pub async fn import_check_ins(
    store: &PgStore,
    csv_path: &std::path::Path,
) -> anyhow::Result<ImportSummary> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        employee_email: String,
        project_id: Uuid,
        progress_summary: String,
        blockers: Option<String>,
        confidence_level: i32,
        complete_percentage: i32,
        submitted_on: NaiveDate,
    }

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut summary = ImportSummary::default();

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        let employee_id: Option<Uuid> = sqlx::query_scalar(
            "SELECT id FROM project_health.profiles WHERE email = $1 AND role = 'employee'",
        )
        .bind(&row.employee_email)
        .fetch_optional(store.pool())
        .await?;
        let Some(employee_id) = employee_id else {
            tracing::warn!(employee = %row.employee_email, "skipping check-in for unknown employee");
            summary.skipped += 1;
            continue;
        };

        let submitted_at = row
            .submitted_on
            .and_hms_opt(12, 0, 0)
            .context("invalid submission date")?
            .and_utc();
        let payload = NewCheckIn::new(
            row.project_id,
            row.progress_summary,
            row.blockers,
            row.confidence_level,
            row.complete_percentage,
        )?;

        match submit::record_check_in(store, employee_id, payload, submitted_at).await {
            Ok(check_in) => {
                summary.inserted += 1;
                if !summary.touched.contains(&check_in.project_id) {
                    summary.touched.push(check_in.project_id);
                }
            }
            Err(
                err @ (HealthError::Conflict(_)
                | HealthError::Forbidden(_)
                | HealthError::NotFound { .. }),
            ) => {
                tracing::warn!(employee = %row.employee_email, project_id = %row.project_id, error = %err, "skipping check-in");
                summary.skipped += 1;
            }
            Err(err) => return Err(err.into()),
        }
    }

    Ok(summary)
}

pub async fn insert_profile(pool: &PgPool, profile: &Profile, email: &str) -> anyhow::Result<()> {
    let (position, company_name) = match profile {
        Profile::Admin { .. } => (None, None),
        Profile::Employee { position, .. } => (Some(position.as_str()), None),
        Profile::Client { company_name, .. } => (None, company_name.as_deref()),
    };

    sqlx::query(
        r#"
        INSERT INTO project_health.profiles (id, role, full_name, email, position, company_name)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(profile.id())
    .bind(profile.role().as_str())
    .bind(profile.name())
    .bind(email)
    .bind(position)
    .bind(company_name)
    .execute(pool)
    .await
    .with_context(|| format!("failed to add profile {email}"))?;
    Ok(())
}
