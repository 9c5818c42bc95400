//! Pipeline definitions

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use types::PacketGroup;

/// Overall budget when a definition does not set one
pub const DEFAULT_PIPELINE_TIMEOUT_S: u64 = 300;
/// Longest accepted run budget, same bound as a single atom
pub const MAX_PIPELINE_TIMEOUT_S: u64 = types::MAX_TIMEOUT_S;

fn default_timeout() -> u64 {
    DEFAULT_PIPELINE_TIMEOUT_S
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineStep {
    pub group: PacketGroup,
    pub element: String,
    /// Static parameters merged over the running result
    #[serde(default)]
    pub data: Value,
    /// Per-step cap; the remaining pipeline budget always applies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_s: Option<u64>,
}

impl PipelineStep {
    pub fn new(group: PacketGroup, element: impl Into<String>) -> Self {
        Self {
            group,
            element: element.into(),
            data: Value::Null,
            timeout_s: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    pub fn with_timeout(mut self, timeout_s: u64) -> Self {
        self.timeout_s = Some(timeout_s);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    pub id: String,
    #[serde(default)]
    pub steps: Vec<PipelineStep>,
    #[serde(default = "default_timeout")]
    pub timeout_s: u64,
}

impl Pipeline {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            steps: Vec::new(),
            timeout_s: DEFAULT_PIPELINE_TIMEOUT_S,
        }
    }

    pub fn step(mut self, step: PipelineStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn with_timeout(mut self, timeout_s: u64) -> Self {
        self.timeout_s = timeout_s;
        self
    }

    /// Atom id of the step at `index` (1-based)
    pub fn step_atom_id(&self, index: usize) -> String {
        format!("{}_step_{}", self.id, index)
    }

    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(PipelineError::invalid(&self.id, "id must not be empty"));
        }
        if self.timeout_s == 0 || self.timeout_s > MAX_PIPELINE_TIMEOUT_S {
            return Err(PipelineError::invalid(
                &self.id,
                format!("timeout_s {} outside 1..={}", self.timeout_s, MAX_PIPELINE_TIMEOUT_S),
            ));
        }
        if let Some(pos) = self.steps.iter().position(|s| s.element.is_empty()) {
            return Err(PipelineError::invalid(
                &self.id,
                format!("step {} has an empty element", pos + 1),
            ));
        }
        Ok(())
    }
}
