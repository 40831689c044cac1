use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod config;
mod db;
mod error;
mod health;
#[cfg(test)]
mod memory;
mod models;
mod orchestrator;
mod report;
mod scheduler;
mod store;
mod submit;
mod week;

use config::Settings;
use db::PgStore;
use models::{NewCheckIn, NewFeedback, NewProject, NewRisk, Profile, RiskSeverity};
use orchestrator::{HealthUpdater, RecomputeOutcome};
use scheduler::HealthScheduler;
use store::SubmissionStore;
use week::{recent_weeks, SystemClock};

#[derive(Parser)]
#[command(name = "project-health")]
#[command(about = "Project health scoring for check-ins, client feedback, and risks", long_about = None)]
struct Cli {
    #[command(flatten)]
    settings: Settings,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Register an admin, employee, or client profile
    AddProfile {
        #[arg(long, value_parser = ["admin", "employee", "client"])]
        role: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        position: Option<String>,
        #[arg(long)]
        company: Option<String>,
    },
    /// Create a project for a client and its assigned employees
    CreateProject {
        #[arg(long)]
        name: String,
        #[arg(long)]
        description: String,
        #[arg(long)]
        client: Uuid,
        #[arg(long = "employee", required = true)]
        employees: Vec<Uuid>,
        #[arg(long)]
        start: NaiveDate,
        #[arg(long)]
        end: NaiveDate,
    },
    /// Mark a project completed; it is no longer rescored
    CompleteProject {
        #[arg(long)]
        project: Uuid,
    },
    /// Submit this week's check-in for an employee
    CheckIn {
        #[arg(long)]
        employee: Uuid,
        #[arg(long)]
        project: Uuid,
        #[arg(long)]
        confidence: i32,
        #[arg(long)]
        complete: i32,
        #[arg(long)]
        summary: String,
        #[arg(long)]
        blockers: Option<String>,
    },
    /// Submit this week's client feedback
    Feedback {
        #[arg(long)]
        client: Uuid,
        #[arg(long)]
        project: Uuid,
        #[arg(long)]
        satisfaction: i32,
        #[arg(long)]
        communication: i32,
        #[arg(long)]
        comment: Option<String>,
        /// Describing an issue flags the feedback
        #[arg(long)]
        issue: Option<String>,
    },
    /// Raise a project risk
    Risk {
        #[arg(long)]
        employee: Uuid,
        #[arg(long)]
        project: Uuid,
        #[arg(long)]
        title: String,
        #[arg(long)]
        severity: RiskSeverity,
        #[arg(long)]
        mitigation: String,
    },
    /// Import historical check-ins from a CSV file
    ImportCheckIns {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Recompute health scores now, for one project or every active one
    Recompute {
        #[arg(long)]
        project: Option<Uuid>,
    },
    /// Recompute health scores on a fixed interval until interrupted
    Run,
    /// Generate a markdown health report
    Report {
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
        #[arg(long, default_value_t = 10)]
        activity_limit: i64,
    },
}

async fn load_profile(store: &PgStore, id: Uuid) -> anyhow::Result<Profile> {
    store
        .find_profile(id)
        .await?
        .with_context(|| format!("profile not found: {id}"))
}

fn describe(outcome: RecomputeOutcome) -> String {
    match outcome {
        RecomputeOutcome::Unchanged { score, status } => format!("score {score}, still {status}"),
        RecomputeOutcome::StatusChanged { score, from, to } => {
            format!("score {score}, status {from} -> {to}")
        }
        RecomputeOutcome::SkippedCompleted => "completed, not rescored".to_string(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let settings = cli.settings;

    let pool = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .connect(&settings.database_url)
        .await
        .context("failed to connect to Postgres")?;

    let store = Arc::new(PgStore::new(pool.clone()));
    let updater = HealthUpdater::new(
        store.clone(),
        Arc::new(SystemClock),
        settings.health_config(),
    );

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::AddProfile {
            role,
            name,
            email,
            position,
            company,
        } => {
            let profile = Profile::from_parts(Uuid::new_v4(), &role, name, position, company)?;
            db::insert_profile(&pool, &profile, &email).await?;
            println!("Added {} profile {}.", profile.role(), profile.id());
        }
        Commands::CreateProject {
            name,
            description,
            client,
            employees,
            start,
            end,
        } => {
            let start = start.and_hms_opt(0, 0, 0).context("invalid start date")?.and_utc();
            let end = end.and_hms_opt(0, 0, 0).context("invalid end date")?.and_utc();
            let project = NewProject::new(name, description, client, employees, start, end)?;
            let id = db::insert_project(&pool, &project).await?;
            println!("Created project {id}.");
        }
        Commands::CompleteProject { project } => {
            if db::complete_project(&pool, project).await? {
                println!("Project {project} marked completed.");
            } else {
                println!("Project {project} was not found or is already completed.");
            }
        }
        Commands::CheckIn {
            employee,
            project,
            confidence,
            complete,
            summary,
            blockers,
        } => {
            let actor = load_profile(&store, employee).await?;
            let payload = NewCheckIn::new(project, summary, blockers, confidence, complete)?;
            let check_in = submit::submit_check_in(&updater, &actor, payload).await?;
            println!("Check-in recorded for {}.", check_in.week);
        }
        Commands::Feedback {
            client,
            project,
            satisfaction,
            communication,
            comment,
            issue,
        } => {
            let actor = load_profile(&store, client).await?;
            let payload = NewFeedback::new(project, satisfaction, communication, comment, issue)?;
            let feedback = submit::submit_feedback(&updater, &actor, payload).await?;
            println!(
                "Feedback recorded for {}{}.",
                feedback.week,
                if feedback.issue_flagged { " (issue flagged)" } else { "" }
            );
        }
        Commands::Risk {
            employee,
            project,
            title,
            severity,
            mitigation,
        } => {
            let actor = load_profile(&store, employee).await?;
            let payload = NewRisk::new(project, title, severity, mitigation)?;
            let risk = submit::submit_risk(&updater, &actor, payload).await?;
            println!("Risk {} opened.", risk.id);
        }
        Commands::ImportCheckIns { csv } => {
            let summary = db::import_check_ins(&store, &csv).await?;
            for project_id in &summary.touched {
                updater.recompute_health_score(*project_id).await?;
            }
            println!(
                "Inserted {} check-ins from {} ({} skipped) and rescored {} projects.",
                summary.inserted,
                csv.display(),
                summary.skipped,
                summary.touched.len()
            );
        }
        Commands::Recompute { project } => match project {
            Some(project_id) => {
                let outcome = updater.recompute_health_score(project_id).await?;
                println!("Project {project_id}: {}.", describe(outcome));
            }
            None => {
                let summary = updater.recompute_all().await;
                println!(
                    "Scanned {} projects: {} updated, {} status changes, {} skipped, {} failed.",
                    summary.scanned,
                    summary.updated,
                    summary.status_changes,
                    summary.skipped,
                    summary.failed
                );
            }
        },
        Commands::Run => {
            let handle = HealthScheduler::new(updater, settings.interval()).start();
            tokio::signal::ctrl_c()
                .await
                .context("failed to listen for shutdown signal")?;
            handle.stop().await;
        }
        Commands::Report {
            out,
            activity_limit,
        } => {
            let now = Utc::now();
            let lookback = recent_weeks(now, settings.health_config().lookback_weeks);
            let projects = db::fetch_project_health(&pool).await?;
            let high_risk =
                db::fetch_high_risk_summaries(&pool, settings.high_risk_threshold, now).await?;
            let missing = db::fetch_projects_missing_check_ins(&pool, &lookback).await?;
            let activity = db::fetch_recent_activity(&pool, activity_limit).await?;

            let report = report::build_report(&report::ReportInput {
                generated_at: now,
                lookback: &lookback,
                high_risk_threshold: settings.high_risk_threshold,
                projects: &projects,
                high_risk: &high_risk,
                missing_check_ins: &missing,
                recent_activity: &activity,
            });
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
