use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::HealthError;
use crate::week::IsoWeek;

macro_rules! text_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = HealthError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value {
                    $($text => Ok($name::$variant),)+
                    other => Err(HealthError::Validation(format!(
                        "unknown {} value: {other}",
                        stringify!($name)
                    ))),
                }
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    OnTrack,
    AtRisk,
    Critical,
    Completed,
}

text_enum!(ProjectStatus {
    OnTrack => "on_track",
    AtRisk => "at_risk",
    Critical => "critical",
    Completed => "completed",
});

impl ProjectStatus {
    pub const ACTIVE: [ProjectStatus; 3] = [
        ProjectStatus::OnTrack,
        ProjectStatus::AtRisk,
        ProjectStatus::Critical,
    ];

    pub fn is_active(&self) -> bool {
        !matches!(self, ProjectStatus::Completed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskSeverity {
    High,
    Medium,
    Low,
}

text_enum!(RiskSeverity {
    High => "high",
    Medium => "medium",
    Low => "low",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskStatus {
    Open,
    Resolved,
}

text_enum!(RiskStatus {
    Open => "open",
    Resolved => "resolved",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    CheckIn,
    Feedback,
    Risk,
    StatusChange,
}

text_enum!(ActivityType {
    CheckIn => "checkin",
    Feedback => "feedback",
    Risk => "risk",
    StatusChange => "status_change",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerformerRole {
    Admin,
    Employee,
    Client,
    System,
}

text_enum!(PerformerRole {
    Admin => "admin",
    Employee => "employee",
    Client => "client",
    System => "system",
});

#[derive(Debug, Clone)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub client_id: Uuid,
    pub employee_ids: Vec<Uuid>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub progress_percentage: i32,
    pub health_score: i32,
    pub status: ProjectStatus,
}

impl Project {
    pub fn has_employee(&self, employee_id: Uuid) -> bool {
        self.employee_ids.contains(&employee_id)
    }
}

/// A signed-in user. Role-specific fields are only reachable after matching
/// on the role.
#[derive(Debug, Clone, PartialEq)]
pub enum Profile {
    Admin {
        id: Uuid,
        name: String,
    },
    Employee {
        id: Uuid,
        name: String,
        position: String,
    },
    Client {
        id: Uuid,
        name: String,
        company_name: Option<String>,
    },
}

impl Profile {
    pub fn id(&self) -> Uuid {
        match self {
            Profile::Admin { id, .. } | Profile::Employee { id, .. } | Profile::Client { id, .. } => {
                *id
            }
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Profile::Admin { name, .. }
            | Profile::Employee { name, .. }
            | Profile::Client { name, .. } => name,
        }
    }

    pub fn role(&self) -> PerformerRole {
        match self {
            Profile::Admin { .. } => PerformerRole::Admin,
            Profile::Employee { .. } => PerformerRole::Employee,
            Profile::Client { .. } => PerformerRole::Client,
        }
    }

    /// Rebuilds a profile from its stored role tag and optional columns.
    pub fn from_parts(
        id: Uuid,
        role: &str,
        name: String,
        position: Option<String>,
        company_name: Option<String>,
    ) -> Result<Self, HealthError> {
        match role {
            "admin" => Ok(Profile::Admin { id, name }),
            "employee" => Ok(Profile::Employee {
                id,
                name,
                position: position.unwrap_or_default(),
            }),
            "client" => Ok(Profile::Client {
                id,
                name,
                company_name,
            }),
            other => Err(HealthError::Validation(format!("unknown profile role: {other}"))),
        }
    }
}

fn required_text(field: &str, value: String) -> Result<String, HealthError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(HealthError::Validation(format!("{field} must not be empty")));
    }
    Ok(trimmed.to_string())
}

fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

fn rating(field: &str, value: i32) -> Result<i32, HealthError> {
    if !(1..=5).contains(&value) {
        return Err(HealthError::Validation(format!(
            "{field} must be between 1 and 5, got {value}"
        )));
    }
    Ok(value)
}

fn percentage(field: &str, value: i32) -> Result<i32, HealthError> {
    if !(0..=100).contains(&value) {
        return Err(HealthError::Validation(format!(
            "{field} must be between 0 and 100, got {value}"
        )));
    }
    Ok(value)
}

#[derive(Debug, Clone)]
pub struct NewProject {
    pub name: String,
    pub description: String,
    pub client_id: Uuid,
    pub employee_ids: Vec<Uuid>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

impl NewProject {
    pub fn new(
        name: String,
        description: String,
        client_id: Uuid,
        employee_ids: Vec<Uuid>,
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
    ) -> Result<Self, HealthError> {
        let name = required_text("name", name)?;
        if !(2..=100).contains(&name.chars().count()) {
            return Err(HealthError::Validation(
                "name must be between 2 and 100 characters".to_string(),
            ));
        }
        let description = required_text("description", description)?;
        if employee_ids.is_empty() {
            return Err(HealthError::Validation(
                "at least one employee must be assigned".to_string(),
            ));
        }
        if end_date <= start_date {
            return Err(HealthError::Validation(
                "end date must be after start date".to_string(),
            ));
        }

        let mut employee_ids = employee_ids;
        employee_ids.sort();
        employee_ids.dedup();

        Ok(NewProject {
            name,
            description,
            client_id,
            employee_ids,
            start_date,
            end_date,
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewCheckIn {
    pub project_id: Uuid,
    pub progress_summary: String,
    pub blockers: Option<String>,
    pub confidence_level: i32,
    pub complete_percentage: i32,
}

impl NewCheckIn {
    pub fn new(
        project_id: Uuid,
        progress_summary: String,
        blockers: Option<String>,
        confidence_level: i32,
        complete_percentage: i32,
    ) -> Result<Self, HealthError> {
        Ok(NewCheckIn {
            project_id,
            progress_summary: required_text("progress summary", progress_summary)?,
            blockers: optional_text(blockers),
            confidence_level: rating("confidence level", confidence_level)?,
            complete_percentage: percentage("complete percentage", complete_percentage)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewFeedback {
    pub project_id: Uuid,
    pub satisfaction_rating: i32,
    pub communication_rating: i32,
    pub comment: Option<String>,
    pub issue_description: Option<String>,
}

impl NewFeedback {
    pub fn new(
        project_id: Uuid,
        satisfaction_rating: i32,
        communication_rating: i32,
        comment: Option<String>,
        issue_description: Option<String>,
    ) -> Result<Self, HealthError> {
        let comment = optional_text(comment);
        if comment.as_ref().is_some_and(|text| text.chars().count() > 500) {
            return Err(HealthError::Validation(
                "comment must be under 500 characters".to_string(),
            ));
        }

        Ok(NewFeedback {
            project_id,
            satisfaction_rating: rating("satisfaction rating", satisfaction_rating)?,
            communication_rating: rating("communication rating", communication_rating)?,
            comment,
            issue_description: optional_text(issue_description),
        })
    }

    pub fn issue_flagged(&self) -> bool {
        self.issue_description.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct NewRisk {
    pub project_id: Uuid,
    pub title: String,
    pub severity: RiskSeverity,
    pub mitigation_plan: String,
}

impl NewRisk {
    pub fn new(
        project_id: Uuid,
        title: String,
        severity: RiskSeverity,
        mitigation_plan: String,
    ) -> Result<Self, HealthError> {
        Ok(NewRisk {
            project_id,
            title: required_text("title", title)?,
            severity,
            mitigation_plan: required_text("mitigation plan", mitigation_plan)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct CheckIn {
    pub id: Uuid,
    pub project_id: Uuid,
    pub employee_id: Uuid,
    pub progress_summary: String,
    pub blockers: Option<String>,
    pub confidence_level: i32,
    pub complete_percentage: i32,
    pub week: IsoWeek,
    pub created_at: DateTime<Utc>,
}

impl CheckIn {
    pub fn from_new(employee_id: Uuid, payload: NewCheckIn, now: DateTime<Utc>) -> Self {
        CheckIn {
            id: Uuid::new_v4(),
            project_id: payload.project_id,
            employee_id,
            progress_summary: payload.progress_summary,
            blockers: payload.blockers,
            confidence_level: payload.confidence_level,
            complete_percentage: payload.complete_percentage,
            week: IsoWeek::of(now),
            created_at: now,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Feedback {
    pub id: Uuid,
    pub project_id: Uuid,
    pub client_id: Uuid,
    pub satisfaction_rating: i32,
    pub communication_rating: i32,
    pub comment: Option<String>,
    pub issue_flagged: bool,
    pub issue_description: Option<String>,
    pub week: IsoWeek,
    pub created_at: DateTime<Utc>,
}

impl Feedback {
    pub fn from_new(client_id: Uuid, payload: NewFeedback, now: DateTime<Utc>) -> Self {
        Feedback {
            id: Uuid::new_v4(),
            project_id: payload.project_id,
            client_id,
            satisfaction_rating: payload.satisfaction_rating,
            communication_rating: payload.communication_rating,
            issue_flagged: payload.issue_flagged(),
            comment: payload.comment,
            issue_description: payload.issue_description,
            week: IsoWeek::of(now),
            created_at: now,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Risk {
    pub id: Uuid,
    pub project_id: Uuid,
    pub employee_id: Uuid,
    pub title: String,
    pub severity: RiskSeverity,
    pub mitigation_plan: String,
    pub status: RiskStatus,
    pub created_at: DateTime<Utc>,
}

impl Risk {
    pub fn from_new(employee_id: Uuid, payload: NewRisk, now: DateTime<Utc>) -> Self {
        Risk {
            id: Uuid::new_v4(),
            project_id: payload.project_id,
            employee_id,
            title: payload.title,
            severity: payload.severity,
            mitigation_plan: payload.mitigation_plan,
            status: RiskStatus::Open,
            created_at: now,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeedbackSignal {
    pub satisfaction_rating: i32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CheckInSignal {
    pub confidence_level: i32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskSignal {
    pub severity: RiskSeverity,
}

/// Append-only project timeline entry.
#[derive(Debug, Clone)]
pub struct Activity {
    pub id: Uuid,
    pub project_id: Uuid,
    pub activity_type: ActivityType,
    pub content: String,
    pub metadata: serde_json::Value,
    pub reference_id: Option<Uuid>,
    pub performer_role: PerformerRole,
    pub performed_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Activity {
    pub fn status_change(
        project_id: Uuid,
        from: ProjectStatus,
        to: ProjectStatus,
        score: i32,
        now: DateTime<Utc>,
    ) -> Self {
        Activity {
            id: Uuid::new_v4(),
            project_id,
            activity_type: ActivityType::StatusChange,
            content: format!(
                "Project status automatically shifted from {from} to {to} (Health Score: {score})"
            ),
            metadata: serde_json::json!({
                "from": from,
                "to": to,
                "healthScore": score,
            }),
            reference_id: Some(project_id),
            performer_role: PerformerRole::System,
            performed_by: None,
            created_at: now,
        }
    }

    pub fn check_in(check_in: &CheckIn) -> Self {
        Activity {
            id: Uuid::new_v4(),
            project_id: check_in.project_id,
            activity_type: ActivityType::CheckIn,
            content: format!(
                "Submitted weekly check-in with {}/5 confidence.",
                check_in.confidence_level
            ),
            metadata: serde_json::json!({ "confidence": check_in.confidence_level }),
            reference_id: Some(check_in.id),
            performer_role: PerformerRole::Employee,
            performed_by: Some(check_in.employee_id),
            created_at: check_in.created_at,
        }
    }

    pub fn feedback(feedback: &Feedback) -> Self {
        Activity {
            id: Uuid::new_v4(),
            project_id: feedback.project_id,
            activity_type: ActivityType::Feedback,
            content: format!(
                "Client provided weekly feedback with a rating of {}/5.",
                feedback.satisfaction_rating
            ),
            metadata: serde_json::json!({
                "rating": feedback.satisfaction_rating,
                "issueFlagged": feedback.issue_flagged,
                "comment": feedback.comment,
            }),
            reference_id: Some(feedback.id),
            performer_role: PerformerRole::Client,
            performed_by: Some(feedback.client_id),
            created_at: feedback.created_at,
        }
    }

    pub fn risk(risk: &Risk) -> Self {
        Activity {
            id: Uuid::new_v4(),
            project_id: risk.project_id,
            activity_type: ActivityType::Risk,
            content: format!("New {} severity risk: \"{}\"", risk.severity, risk.title),
            metadata: serde_json::json!({
                "severity": risk.severity,
                "status": risk.status,
            }),
            reference_id: Some(risk.id),
            performer_role: PerformerRole::Employee,
            performed_by: Some(risk.employee_id),
            created_at: risk.created_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProjectHealthRow {
    pub name: String,
    pub status: ProjectStatus,
    pub health_score: i32,
    pub progress_percentage: i32,
}

#[derive(Debug, Clone)]
pub struct HighRiskSummary {
    pub name: String,
    pub health_score: i32,
    pub progress_percentage: i32,
    pub submitted_check_ins: i64,
    pub expected_check_ins: i64,
    pub submitted_feedback: i64,
    pub open_risks: i64,
    pub flagged_issues: i64,
}

#[derive(Debug, Clone)]
pub struct TimelineEntry {
    pub project_name: String,
    pub activity_type: ActivityType,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl HighRiskSummary {
    pub fn missing_check_ins(&self) -> i64 {
        (self.expected_check_ins - self.submitted_check_ins).max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn status_text_round_trips_through_storage_form() {
        for status in [
            ProjectStatus::OnTrack,
            ProjectStatus::AtRisk,
            ProjectStatus::Critical,
            ProjectStatus::Completed,
        ] {
            assert_eq!(status.as_str().parse::<ProjectStatus>().unwrap(), status);
        }
        assert!("paused".parse::<ProjectStatus>().is_err());
        assert!(!ProjectStatus::Completed.is_active());
    }

    #[test]
    fn new_project_rejects_inverted_schedule() {
        let start = Utc.with_ymd_and_hms(2026, 1, 5, 0, 0, 0).unwrap();
        let result = NewProject::new(
            "Atlas".to_string(),
            "Migration project".to_string(),
            Uuid::new_v4(),
            vec![Uuid::new_v4()],
            start,
            start - Duration::days(1),
        );
        assert!(matches!(result, Err(HealthError::Validation(_))));
    }

    #[test]
    fn new_project_requires_an_employee() {
        let start = Utc.with_ymd_and_hms(2026, 1, 5, 0, 0, 0).unwrap();
        let result = NewProject::new(
            "Atlas".to_string(),
            "Migration project".to_string(),
            Uuid::new_v4(),
            Vec::new(),
            start,
            start + Duration::days(30),
        );
        assert!(matches!(result, Err(HealthError::Validation(_))));
    }

    #[test]
    fn check_in_ratings_are_bounded() {
        let project = Uuid::new_v4();
        assert!(NewCheckIn::new(project, "done".into(), None, 0, 10).is_err());
        assert!(NewCheckIn::new(project, "done".into(), None, 6, 10).is_err());
        assert!(NewCheckIn::new(project, "done".into(), None, 3, 101).is_err());
        assert!(NewCheckIn::new(project, "   ".into(), None, 3, 10).is_err());

        let ok = NewCheckIn::new(project, " shipped api ".into(), Some("  ".into()), 5, 0).unwrap();
        assert_eq!(ok.progress_summary, "shipped api");
        assert_eq!(ok.blockers, None);
    }

    #[test]
    fn feedback_flags_issue_only_with_description() {
        let project = Uuid::new_v4();
        let quiet = NewFeedback::new(project, 4, 4, Some("fine".into()), Some(" ".into())).unwrap();
        assert!(!quiet.issue_flagged());

        let flagged =
            NewFeedback::new(project, 2, 3, None, Some("Staging is down".into())).unwrap();
        assert!(flagged.issue_flagged());

        assert!(NewFeedback::new(project, 0, 3, None, None).is_err());
    }

    #[test]
    fn profile_role_tag_controls_fields() {
        let id = Uuid::new_v4();
        let employee = Profile::from_parts(
            id,
            "employee",
            "Kiara Patel".to_string(),
            Some("Engineer".to_string()),
            None,
        )
        .unwrap();
        assert_eq!(employee.role(), PerformerRole::Employee);
        assert_eq!(employee.id(), id);
        assert!(matches!(employee, Profile::Employee { ref position, .. } if position == "Engineer"));
        assert!(Profile::from_parts(id, "system", "x".into(), None, None).is_err());
    }

    #[test]
    fn status_change_activity_names_both_statuses() {
        let project = Uuid::new_v4();
        let now = Utc.with_ymd_and_hms(2026, 10, 16, 9, 0, 0).unwrap();
        let activity =
            Activity::status_change(project, ProjectStatus::OnTrack, ProjectStatus::AtRisk, 72, now);
        assert_eq!(activity.activity_type, ActivityType::StatusChange);
        assert_eq!(activity.performer_role, PerformerRole::System);
        assert_eq!(activity.reference_id, Some(project));
        assert_eq!(
            activity.content,
            "Project status automatically shifted from on_track to at_risk (Health Score: 72)"
        );
    }
}
