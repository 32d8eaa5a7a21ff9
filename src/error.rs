use thiserror::Error;

/// A single problem found while validating an import, addressed by data row
/// and (where applicable) column header. Collected, never thrown mid-batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Zero-based data row index (the header row is not counted).
    pub row: usize,
    /// Header of the offending column, if the problem is column-specific.
    pub column: Option<String>,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.column {
            Some(column) => write!(f, "row {}, column '{}': {}", self.row + 1, column, self.message),
            None => write!(f, "row {}: {}", self.row + 1, self.message),
        }
    }
}

#[derive(Error, Debug)]
pub enum SalesEngineError {
    #[error("invalid month {0}: must be between 1 and 12")]
    InvalidMonth(u32),

    #[error("date error: {0}")]
    Date(String),

    #[error("no usable field schema for store: {0}")]
    MissingSchema(String),

    #[error("import validation failed with {} error(s)", .errors.len())]
    ImportValidation { errors: Vec<ValidationError> },

    #[error("remote fetch failed for {key}: {message}")]
    RemoteFetch { key: String, message: String },

    #[error("remote write failed for {key}: {message}")]
    RemoteWrite { key: String, message: String },

    #[error("mutation rolled back for {key}: {message}")]
    MutationFailed { key: String, message: String },

    #[error("no cache entry for {0}")]
    CacheMiss(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[cfg(feature = "forecast")]
    #[error("prediction service error: {0}")]
    Prediction(String),

    #[cfg(feature = "forecast")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, SalesEngineError>;
