use std::fmt::Write;

use chrono::{DateTime, Utc};

use crate::models::{HighRiskSummary, ProjectHealthRow, ProjectStatus, TimelineEntry};
use crate::week::IsoWeek;

#[derive(Debug, Clone, PartialEq)]
pub struct StatusSummary {
    pub status: ProjectStatus,
    pub count: usize,
    pub avg_score: f64,
}

pub fn summarize_by_status(projects: &[ProjectHealthRow]) -> Vec<StatusSummary> {
    let order = [
        ProjectStatus::Critical,
        ProjectStatus::AtRisk,
        ProjectStatus::OnTrack,
        ProjectStatus::Completed,
    ];

    order
        .into_iter()
        .filter_map(|status| {
            let scores: Vec<i32> = projects
                .iter()
                .filter(|p| p.status == status)
                .map(|p| p.health_score)
                .collect();
            if scores.is_empty() {
                return None;
            }
            Some(StatusSummary {
                status,
                count: scores.len(),
                avg_score: scores.iter().sum::<i32>() as f64 / scores.len() as f64,
            })
        })
        .collect()
}

pub struct ReportInput<'a> {
    pub generated_at: DateTime<Utc>,
    pub lookback: &'a [IsoWeek],
    pub high_risk_threshold: i32,
    pub projects: &'a [ProjectHealthRow],
    pub high_risk: &'a [HighRiskSummary],
    pub missing_check_ins: &'a [ProjectHealthRow],
    pub recent_activity: &'a [TimelineEntry],
}

pub fn build_report(input: &ReportInput<'_>) -> String {
    let summaries = summarize_by_status(input.projects);
    let mut output = String::new();

    let window = match (input.lookback.last(), input.lookback.first()) {
        (Some(oldest), Some(newest)) if oldest != newest => format!("{oldest} to {newest}"),
        (Some(only), _) => only.to_string(),
        _ => "no weeks".to_string(),
    };

    let _ = writeln!(output, "# Project Health Report");
    let _ = writeln!(
        output,
        "Generated {} (lookback {})",
        input.generated_at.format("%Y-%m-%d %H:%M UTC"),
        window
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Status Mix");

    if summaries.is_empty() {
        let _ = writeln!(output, "No projects recorded.");
    } else {
        for summary in &summaries {
            let _ = writeln!(
                output,
                "- {}: {} projects (avg score {:.1})",
                summary.status, summary.count, summary.avg_score
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Projects");

    if input.projects.is_empty() {
        let _ = writeln!(output, "No projects recorded.");
    } else {
        for project in input.projects {
            let _ = writeln!(
                output,
                "- {} [{}] score {} progress {}%",
                project.name, project.status, project.health_score, project.progress_percentage
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(
        output,
        "## High Risk (score below {})",
        input.high_risk_threshold
    );

    if input.high_risk.is_empty() {
        let _ = writeln!(output, "No active projects below the threshold.");
    } else {
        for project in input.high_risk {
            let _ = writeln!(
                output,
                "- {} score {} progress {}%: check-ins {}/{} ({} missing), feedback {}, open risks {}, flagged issues {}",
                project.name,
                project.health_score,
                project.progress_percentage,
                project.submitted_check_ins,
                project.expected_check_ins,
                project.missing_check_ins(),
                project.submitted_feedback,
                project.open_risks,
                project.flagged_issues
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## No Recent Check-ins");

    if input.missing_check_ins.is_empty() {
        let _ = writeln!(output, "Every active project has a check-in in the lookback window.");
    } else {
        for project in input.missing_check_ins {
            let _ = writeln!(
                output,
                "- {} [{}] score {}",
                project.name, project.status, project.health_score
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Recent Activity");

    if input.recent_activity.is_empty() {
        let _ = writeln!(output, "No activity recorded.");
    } else {
        for entry in input.recent_activity {
            let _ = writeln!(
                output,
                "- {} ({}) on {}: {}",
                entry.project_name,
                entry.activity_type,
                entry.created_at.format("%Y-%m-%d"),
                entry.content
            );
        }
    }

    output
}
