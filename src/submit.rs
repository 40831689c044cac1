use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{HealthError, Result};
use crate::models::{
    Activity, CheckIn, Feedback, NewCheckIn, NewFeedback, NewRisk, Profile, Project, Risk,
};
use crate::orchestrator::HealthUpdater;
use crate::store::HealthStore;

async fn open_project(store: &dyn HealthStore, project_id: Uuid) -> Result<Project> {
    let project = store
        .find_project(project_id)
        .await?
        .ok_or_else(|| HealthError::project_not_found(project_id))?;
    if !project.status.is_active() {
        return Err(HealthError::Forbidden(format!(
            "project {project_id} is completed"
        )));
    }
    Ok(project)
}

fn ensure_assigned(project: &Project, employee_id: Uuid) -> Result<()> {
    if project.has_employee(employee_id) {
        Ok(())
    } else {
        Err(HealthError::Forbidden(format!(
            "employee {employee_id} is not assigned to {}",
            project.name
        )))
    }
}

/// Submissions are already committed when this runs, so a failed rescore is
/// left to the next scheduled run.
async fn rescore(updater: &HealthUpdater, project_id: Uuid) {
    match updater.recompute_health_score(project_id).await {
        Ok(outcome) => info!(%project_id, score = ?outcome.score(), "rescored after submission"),
        Err(err) => warn!(%project_id, error = %err, "rescore after submission failed"),
    }
}

/// Stores a check-in stamped with the ISO week of `at`, applying the same
/// project and assignment rules as a live submission. Does not rescore.
pub async fn record_check_in(
    store: &dyn HealthStore,
    employee_id: Uuid,
    payload: NewCheckIn,
    at: DateTime<Utc>,
) -> Result<CheckIn> {
    let project = open_project(store, payload.project_id).await?;
    ensure_assigned(&project, employee_id)?;

    let check_in = CheckIn::from_new(employee_id, payload, at);
    store
        .insert_check_in(&check_in, &Activity::check_in(&check_in))
        .await?;
    Ok(check_in)
}

pub async fn submit_check_in(
    updater: &HealthUpdater,
    actor: &Profile,
    payload: NewCheckIn,
) -> Result<CheckIn> {
    let employee_id = match actor {
        Profile::Employee { id, .. } => *id,
        other => {
            return Err(HealthError::Forbidden(format!(
                "{} profiles cannot submit check-ins",
                other.role()
            )))
        }
    };

    let check_in = record_check_in(updater.store(), employee_id, payload, updater.now()).await?;
    rescore(updater, check_in.project_id).await;
    Ok(check_in)
}

pub async fn submit_feedback(
    updater: &HealthUpdater,
    actor: &Profile,
    payload: NewFeedback,
) -> Result<Feedback> {
    let client_id = match actor {
        Profile::Client { id, .. } => *id,
        other => {
            return Err(HealthError::Forbidden(format!(
                "{} profiles cannot submit feedback",
                other.role()
            )))
        }
    };

    let project = open_project(updater.store(), payload.project_id).await?;
    if project.client_id != client_id {
        return Err(HealthError::Forbidden(format!(
            "{} is not the client of {}",
            actor.name(),
            project.name
        )));
    }

    let feedback = Feedback::from_new(client_id, payload, updater.now());
    updater
        .store()
        .insert_feedback(&feedback, &Activity::feedback(&feedback))
        .await?;

    rescore(updater, project.id).await;
    Ok(feedback)
}

pub async fn submit_risk(updater: &HealthUpdater, actor: &Profile, payload: NewRisk) -> Result<Risk> {
    let employee_id = match actor {
        Profile::Employee { id, .. } => *id,
        other => {
            return Err(HealthError::Forbidden(format!(
                "{} profiles cannot raise risks",
                other.role()
            )))
        }
    };

    let project = open_project(updater.store(), payload.project_id).await?;
    ensure_assigned(&project, employee_id)?;

    let risk = Risk::from_new(employee_id, payload, updater.now());
    updater
        .store()
        .insert_risk(&risk, &Activity::risk(&risk))
        .await?;

    rescore(updater, project.id).await;
    Ok(risk)
}
