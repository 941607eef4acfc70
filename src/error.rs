use thiserror::Error;

#[derive(Error, Debug)]
pub enum GradingError {
    #[error("no grade level covers {0}%")]
    NotFoundInScale(f64),

    #[error("invalid grade level configuration: {0}")]
    ConfigurationError(String),

    #[error("{0} is already flagged on another row in the same scope")]
    ExclusivityViolation(&'static str),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("the primary grading system cannot be deleted")]
    PrimaryDeletion,

    #[error("grade level is referenced by {0} grade entries")]
    LevelInUse(i64),

    #[error("grade scale is referenced by {0} grade entries")]
    ScaleInUse(i64),

    #[error("a grading system must keep at least one grade scale")]
    LastSystemScale,

    #[error("school has no primary grading system with a default grade scale")]
    NoActiveScale,

    #[error("{0}")]
    InvalidInput(String),

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),
}

impl GradingError {
    /// Stable wire code reported in IPC error responses.
    pub fn code(&self) -> &'static str {
        match self {
            GradingError::NotFoundInScale(_) => "not_found_in_scale",
            GradingError::ConfigurationError(_) => "configuration_error",
            GradingError::ExclusivityViolation(_) => "exclusivity_violation",
            GradingError::NotFound(_) => "not_found",
            GradingError::PrimaryDeletion => "primary_system_delete",
            GradingError::LevelInUse(_) => "level_in_use",
            GradingError::ScaleInUse(_) => "scale_in_use",
            GradingError::LastSystemScale => "last_system_scale",
            GradingError::NoActiveScale => "no_active_scale",
            GradingError::InvalidInput(_) => "bad_params",
            GradingError::Db(_) => "db_query_failed",
        }
    }
}

pub type GradingResult<T> = Result<T, GradingError>;
