//! Error types for reelcap.

use thiserror::Error;

/// Application result type.
pub type AppResult<T> = Result<T, AppError>;

/// Application error type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AppError {
    // === Validation Errors ===
    #[error("No target channel set")]
    NoTargetChannel,

    #[error("No quality selected")]
    NoQualitySelected,

    #[error("Validation error: {0}")]
    Validation(String),

    // === Storage Errors ===
    #[error("Storage backend unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("History error: {0}")]
    History(String),

    // === Other ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns the stable error code for this error.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::NoTargetChannel => "NO_TARGET_CHANNEL",
            Self::NoQualitySelected => "NO_QUALITY_SELECTED",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Unavailable(_) => "BACKEND_UNAVAILABLE",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Storage(_) => "STORAGE_ERROR",
            Self::History(_) => "HISTORY_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns whether this error was raised before any state was touched.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::NoTargetChannel | Self::NoQualitySelected | Self::Validation(_)
        )
    }

    /// Returns whether the backend that raised this error is unreachable.
    #[must_use]
    pub const fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

// === From implementations ===

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Storage(format!("Malformed record: {err}"))
    }
}
