use thiserror::Error;
use types::{ErrorCategory, RuntimeError};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error("Pipeline not found: {0}")]
    NotFound(String),

    #[error("Invalid pipeline {id}: {reason}")]
    InvalidPipeline { id: String, reason: String },
}

impl PipelineError {
    pub fn invalid(id: impl Into<String>, reason: impl Into<String>) -> Self {
        PipelineError::InvalidPipeline {
            id: id.into(),
            reason: reason.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        ErrorCategory::Client
    }
}

impl From<PipelineError> for RuntimeError {
    fn from(err: PipelineError) -> Self {
        RuntimeError::invalid_atom(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
