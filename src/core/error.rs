use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    /// An interface declaration cannot be turned into an implementation.
    #[error("Generation error: {0}")]
    GenerationError(String),

    /// A declared entity field has no matching result column, or its value
    /// does not convert to the field type.
    #[error("Mapping error: {0}")]
    MappingError(String),

    #[error("No rows returned where exactly one was expected")]
    NotFound,

    #[error("Too many rows: expected at most one")]
    TooManyRows,

    /// The underlying connection failed. The owning session is unusable afterwards.
    #[error("Connectivity error: {0}")]
    ConnectivityError(String),

    #[error("Execution error: {0}")]
    ExecutionError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Cursor is closed")]
    CursorClosed,

    #[error("Session is closed")]
    SessionClosed,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Lock error: {0}")]
    LockError(String),
}

impl DbError {
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::ConnectivityError(_))
    }
}

pub type Result<T> = std::result::Result<T, DbError>;

impl<T> From<std::sync::PoisonError<T>> for DbError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}
