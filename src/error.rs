use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum HealthError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("data access failed: {0}")]
    DataAccess(#[from] sqlx::Error),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("forbidden: {0}")]
    Forbidden(String),
}

impl HealthError {
    pub fn project_not_found(id: Uuid) -> Self {
        HealthError::NotFound {
            entity: "project",
            id,
        }
    }

    /// Only data-access failures are worth another attempt within the same run.
    pub fn is_transient(&self) -> bool {
        matches!(self, HealthError::DataAccess(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, HealthError::NotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, HealthError>;
