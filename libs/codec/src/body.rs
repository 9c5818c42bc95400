//! JSON bodies carried in `result` and `error` frames

use serde::{Deserialize, Serialize};
use serde_json::Value;
use types::{ErrorCategory, RuntimeError};

/// Successful processing of one atom
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultBody {
    pub atom_id: String,
    pub result: Value,
    pub duration_ms: u64,
}

/// Failed processing of one atom, or a connection-level failure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub atom_id: String,
    pub category: ErrorCategory,
    pub code: String,
    pub message: String,
    pub retryable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
}

impl ErrorBody {
    pub fn from_error(atom_id: impl Into<String>, err: &RuntimeError) -> Self {
        Self {
            atom_id: atom_id.into(),
            category: err.category(),
            code: err.code().to_string(),
            message: err.to_string(),
            retryable: err.is_retryable(),
            retry_after_ms: err.retry_after().map(|d| d.as_millis() as u64),
        }
    }

    /// Rebuild the runtime error on the calling side
    pub fn into_error(self) -> RuntimeError {
        RuntimeError::from_wire(&self.code, &self.atom_id, self.message, self.retry_after_ms)
    }
}

/// Per-atom outcome inside a batch reply, in submission order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum BatchItem {
    Ok(ResultBody),
    Error(ErrorBody),
}

impl BatchItem {
    pub fn atom_id(&self) -> &str {
        match self {
            BatchItem::Ok(body) => &body.atom_id,
            BatchItem::Error(body) => &body.atom_id,
        }
    }

    pub fn into_result(self) -> Result<ResultBody, RuntimeError> {
        match self {
            BatchItem::Ok(body) => Ok(body),
            BatchItem::Error(body) => Err(body.into_error()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BatchResultBody {
    pub items: Vec<BatchItem>,
}
