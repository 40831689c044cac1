use chrono::{DateTime, Utc};

use crate::models::{CheckInSignal, FeedbackSignal, Project, ProjectStatus, RiskSeverity, RiskSignal};

pub const CLIENT_WEIGHT: f64 = 25.0;
pub const EMPLOYEE_WEIGHT: f64 = 30.0;
pub const PROGRESS_WEIGHT: f64 = 20.0;
pub const RISK_WEIGHT: f64 = 25.0;

/// Points assigned when nobody reported during the lookback window.
pub const SILENCE_POINTS: f64 = 50.0;
pub const FLAGGED_ISSUE_PENALTY: f64 = 10.0;
/// Points lost per percentage point of progress behind schedule.
pub const SCHEDULE_SLIP_PENALTY: f64 = 2.0;

pub const CRITICAL_BELOW: i32 = 60;
pub const ON_TRACK_FROM: i32 = 80;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubScores {
    pub client: f64,
    pub employee: f64,
    pub progress: f64,
    pub risk: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HealthScore {
    pub score: i32,
    pub status: ProjectStatus,
    pub breakdown: SubScores,
}

pub fn compute_score(
    project: &Project,
    recent_feedback: &[FeedbackSignal],
    recent_check_ins: &[CheckInSignal],
    open_risks: &[RiskSignal],
    flagged_issues: i64,
    now: DateTime<Utc>,
) -> HealthScore {
    let breakdown = SubScores {
        client: client_points(recent_feedback),
        employee: employee_points(recent_check_ins),
        progress: progress_points(
            project.progress_percentage,
            expected_progress(project.start_date, project.end_date, now),
        ),
        risk: risk_points(open_risks, flagged_issues),
    };

    let score = weighted_score(&breakdown);
    HealthScore {
        score,
        status: classify(score),
        breakdown,
    }
}

pub fn classify(score: i32) -> ProjectStatus {
    if score < CRITICAL_BELOW {
        ProjectStatus::Critical
    } else if score < ON_TRACK_FROM {
        ProjectStatus::AtRisk
    } else {
        ProjectStatus::OnTrack
    }
}

fn rating_points(ratings: impl ExactSizeIterator<Item = i32>) -> f64 {
    let count = ratings.len();
    if count == 0 {
        return SILENCE_POINTS;
    }
    let average = ratings.map(f64::from).sum::<f64>() / count as f64;
    clamp_points(average / 5.0 * 100.0)
}

pub fn client_points(recent_feedback: &[FeedbackSignal]) -> f64 {
    rating_points(recent_feedback.iter().map(|f| f.satisfaction_rating))
}

pub fn employee_points(recent_check_ins: &[CheckInSignal]) -> f64 {
    rating_points(recent_check_ins.iter().map(|c| c.confidence_level))
}

/// Share of the schedule that has elapsed at `now`, as a percentage.
///
/// A schedule whose end is not after its start counts as fully due.
pub fn expected_progress(start: DateTime<Utc>, end: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let total = (end - start).num_milliseconds();
    if total <= 0 {
        return 100.0;
    }

    let elapsed = (now - start).num_milliseconds();
    if elapsed < 0 {
        return 0.0;
    }

    (elapsed as f64 / total as f64 * 100.0).min(100.0)
}

pub fn progress_points(actual_progress: i32, expected_progress: f64) -> f64 {
    let actual = f64::from(actual_progress.clamp(0, 100));
    if actual >= expected_progress {
        return 100.0;
    }
    clamp_points(100.0 - (expected_progress - actual) * SCHEDULE_SLIP_PENALTY)
}

pub fn severity_penalty(severity: RiskSeverity) -> f64 {
    match severity {
        RiskSeverity::High => 15.0,
        RiskSeverity::Medium => 10.0,
        RiskSeverity::Low => 5.0,
    }
}

pub fn risk_points(open_risks: &[RiskSignal], flagged_issues: i64) -> f64 {
    let risk_penalty: f64 = open_risks.iter().map(|r| severity_penalty(r.severity)).sum();
    let issue_penalty = flagged_issues.max(0) as f64 * FLAGGED_ISSUE_PENALTY;
    clamp_points(100.0 - risk_penalty - issue_penalty)
}

fn weighted_score(points: &SubScores) -> i32 {
    // Weights are whole percentages so the halfway cases stay exact.
    let total = points.client * CLIENT_WEIGHT
        + points.employee * EMPLOYEE_WEIGHT
        + points.progress * PROGRESS_WEIGHT
        + points.risk * RISK_WEIGHT;
    (total / 100.0).round().clamp(0.0, 100.0) as i32
}

fn clamp_points(points: f64) -> f64 {
    points.clamp(0.0, 100.0)
}
