use thiserror::Error;

/// Errors raised by the filter / aggregate / chart pipeline
#[derive(Debug, Error, PartialEq)]
pub enum DashError {
    /// Required column missing or of an unusable type. Fatal for the session.
    #[error("Schema error: {0}")]
    Schema(String),

    /// A chart or aggregation was bound to a column it cannot use
    #[error("Cannot bind column '{column}' for {target}: {reason}")]
    IncompatibleBinding {
        target: String,
        column: String,
        reason: String,
    },

    /// Date window with start after end
    #[error("Invalid date range: start {start} is after end {end}")]
    InvalidDateRange { start: String, end: String },

    /// Any other rejected input (empty group-by list, bad bin count, ...)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Input bytes could not be turned into a table
    #[error("Load error: {0}")]
    Load(String),

    /// A table could not be serialised
    #[error("Export error: {0}")]
    Export(String),

    /// Query text could not be parsed
    #[error("Parse error: {0}")]
    Parse(String),
}

impl DashError {
    pub fn binding(
        target: impl Into<String>,
        column: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        DashError::IncompatibleBinding {
            target: target.into(),
            column: column.into(),
            reason: reason.into(),
        }
    }

    /// Schema errors end the session; everything else can be corrected by the user.
    pub fn is_fatal(&self) -> bool {
        matches!(self, DashError::Schema(_))
    }
}

/// Type alias for Results using DashError
pub type Result<T> = std::result::Result<T, DashError>;

/// Non-fatal conditions reported next to a successful result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineWarning {
    /// A stage produced zero rows
    EmptyResult { stage: String },
}

impl std::fmt::Display for PipelineWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineWarning::EmptyResult { stage } => write!(f, "{} produced no rows", stage),
        }
    }
}
