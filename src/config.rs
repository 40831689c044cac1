use std::time::Duration;

use clap::Args;

use crate::orchestrator::HealthConfig;

/// One year of ISO weeks.
pub const MAX_LOOKBACK_WEEKS: usize = 52;

#[derive(Debug, Clone, Args)]
pub struct Settings {
    /// Postgres connection string
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: String,

    #[arg(long, env = "HEALTH_MAX_CONNECTIONS", default_value_t = 5)]
    pub max_connections: u32,

    /// ISO weeks of feedback and check-ins sampled when scoring
    #[arg(long, env = "HEALTH_LOOKBACK_WEEKS", default_value_t = 2)]
    pub lookback_weeks: usize,

    /// Attempts per project per run before deferring to the next run
    #[arg(long, env = "HEALTH_MAX_ATTEMPTS", default_value_t = 3)]
    pub max_attempts: u32,

    #[arg(long, env = "HEALTH_RETRY_BACKOFF_MS", default_value_t = 250)]
    pub retry_backoff_ms: u64,

    /// Seconds between scheduled recomputes
    #[arg(long, env = "HEALTH_INTERVAL_SECS", default_value_t = 1800)]
    pub interval_secs: u64,

    /// Health score below which a project is reported as high risk
    #[arg(long, env = "HEALTH_HIGH_RISK_THRESHOLD", default_value_t = 60)]
    pub high_risk_threshold: i32,
}

impl Settings {
    pub fn health_config(&self) -> HealthConfig {
        HealthConfig {
            lookback_weeks: self.lookback_weeks.clamp(1, MAX_LOOKBACK_WEEKS),
            max_attempts: self.max_attempts.max(1),
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        settings: Settings,
    }

    #[test]
    fn defaults_match_thirty_minute_two_week_policy() {
        let harness =
            Harness::try_parse_from(["health", "--database-url", "postgres://localhost/health"])
                .unwrap();
        let config = harness.settings.health_config();

        assert_eq!(config.lookback_weeks, 2);
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.retry_backoff, Duration::from_millis(250));
        assert_eq!(harness.settings.interval(), Duration::from_secs(1800));
        assert_eq!(harness.settings.high_risk_threshold, 60);
    }

    #[test]
    fn zero_values_are_raised_to_one() {
        let harness = Harness::try_parse_from([
            "health",
            "--database-url",
            "postgres://localhost/health",
            "--lookback-weeks",
            "0",
            "--max-attempts",
            "0",
            "--interval-secs",
            "0",
        ])
        .unwrap();

        assert_eq!(harness.settings.health_config().lookback_weeks, 1);
        assert_eq!(harness.settings.health_config().max_attempts, 1);
        assert_eq!(harness.settings.interval(), Duration::from_secs(1));
    }

    #[test]
    fn lookback_is_capped_at_a_year() {
        let harness = Harness::try_parse_from([
            "health",
            "--database-url",
            "postgres://localhost/health",
            "--lookback-weeks",
            "1000000",
        ])
        .unwrap();

        assert_eq!(
            harness.settings.health_config().lookback_weeks,
            MAX_LOOKBACK_WEEKS
        );
    }
}
