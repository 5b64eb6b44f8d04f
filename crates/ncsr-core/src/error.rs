use thiserror::Error;

/// Application-specific error types
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("Connection pool error: {0}")]
    ConnectionPool(String),

    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Validation errors: {0}")]
    ValidationErrors(#[from] validator::ValidationErrors),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid date format: {0}")]
    InvalidDateFormat(String),

    #[error("External API error: {0}")]
    ExternalApiError(String),

    #[error("Parser error: {0}")]
    ParserError(String),

    #[error("Out of memory: {0}")]
    OutOfMemory(String),

    #[error("Timeout: {operation} exceeded {seconds}s")]
    Timeout { operation: String, seconds: u64 },

    #[error("Migration error: {0}")]
    MigrationError(String),
}

/// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;

/// Convert from bb8 pool error
impl From<bb8::RunError<diesel_async::pooled_connection::PoolError>> for AppError {
    fn from(err: bb8::RunError<diesel_async::pooled_connection::PoolError>) -> Self {
        AppError::ConnectionPool(err.to_string())
    }
}

/// Convert from diesel migration error
impl From<diesel_migrations::MigrationError> for AppError {
    fn from(err: diesel_migrations::MigrationError) -> Self {
        AppError::MigrationError(err.to_string())
    }
}

/// Convert from chrono parse error
impl From<chrono::ParseError> for AppError {
    fn from(err: chrono::ParseError) -> Self {
        AppError::InvalidDateFormat(err.to_string())
    }
}

/// Convert from bigdecimal parse error
impl From<bigdecimal::ParseBigDecimalError> for AppError {
    fn from(err: bigdecimal::ParseBigDecimalError) -> Self {
        AppError::Validation(format!("Invalid decimal: {}", err))
    }
}

/// Utility constructors for common error scenarios
impl AppError {
    pub fn not_found<T: std::fmt::Display>(resource: T) -> Self {
        AppError::NotFound(format!("{} not found", resource))
    }

    pub fn internal_error<T: std::fmt::Display>(message: T) -> Self {
        AppError::InternalError(message.to_string())
    }

    pub fn config_error<T: std::fmt::Display>(message: T) -> Self {
        AppError::ConfigError(message.to_string())
    }

    pub fn parser_error<T: std::fmt::Display>(message: T) -> Self {
        AppError::ParserError(message.to_string())
    }

    /// Log the error with appropriate level and context
    pub fn log_with_context(&self, context: &str) {
        match self {
            // Critical errors that need immediate attention
            AppError::Database(_)
            | AppError::ConnectionPool(_)
            | AppError::MigrationError(_)
            | AppError::InternalError(_)
            | AppError::OutOfMemory(_) => {
                tracing::error!("{} - {}: {}", context, self.error_type(), self);
            }
            // External service errors
            AppError::ExternalApiError(_) => {
                tracing::error!("{} - {}: {}", context, self.error_type(), self);
            }
            // Client/data errors (warnings)
            AppError::Validation(_)
            | AppError::ValidationErrors(_)
            | AppError::InvalidDateFormat(_)
            | AppError::ParserError(_)
            | AppError::Timeout { .. } => {
                tracing::warn!("{} - {}: {}", context, self.error_type(), self);
            }
            // Not found errors (info level)
            AppError::NotFound(_) => {
                tracing::info!("{} - {}: {}", context, self.error_type(), self);
            }
            // Other errors
            _ => {
                tracing::error!("{} - {}: {}", context, self.error_type(), self);
            }
        }
    }

    /// Get a human-readable error type for logging
    fn error_type(&self) -> &'static str {
        match self {
            AppError::Database(_) => "DatabaseError",
            AppError::ConnectionPool(_) => "ConnectionPoolError",
            AppError::JsonSerialization(_) => "JsonSerializationError",
            AppError::Validation(_) => "ValidationError",
            AppError::ValidationErrors(_) => "ValidationErrors",
            AppError::ConfigError(_) => "ConfigError",
            AppError::Io(_) => "IoError",
            AppError::InternalError(_) => "InternalError",
            AppError::NotFound(_) => "NotFound",
            AppError::InvalidDateFormat(_) => "InvalidDateFormat",
            AppError::ExternalApiError(_) => "ExternalApiError",
            AppError::ParserError(_) => "ParserError",
            AppError::OutOfMemory(_) => "OutOfMemory",
            AppError::Timeout { .. } => "Timeout",
            AppError::MigrationError(_) => "MigrationError",
        }
    }
}
