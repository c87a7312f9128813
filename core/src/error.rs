use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid configuration: {field} {reason}")]
    InvalidConfig { field: String, reason: String },

    #[error("Invalid dosing profile: {reason}")]
    InvalidDosingProfile { reason: String },

    #[error("Cannot read {path}: {source}")]
    Io {
        path:   String,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CoreError {
    pub fn config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        CoreError::InvalidConfig {
            field:  field.into(),
            reason: reason.into(),
        }
    }

    pub fn dosing(reason: impl Into<String>) -> Self {
        CoreError::InvalidDosingProfile { reason: reason.into() }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
