//! Atom: the classified unit of work
//!
//! An atom is created by a caller (or by a handler issuing a nested call),
//! consumed exactly once by a reactor and never persisted. Nested calls
//! derive their ids from the parent as `<parent>_call_<n>` so a causal chain
//! can be reconstructed from ids alone.

use crate::error::{Result, RuntimeError};
use crate::group::PacketGroup;
use crate::time::current_timestamp_ms;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

pub const MIN_PRIORITY: u8 = 1;
pub const MAX_PRIORITY: u8 = 10;
pub const DEFAULT_PRIORITY: u8 = 5;
pub const DEFAULT_TIMEOUT_S: u64 = 30;
/// One day; longer deadlines are rejected before any clock arithmetic
pub const MAX_TIMEOUT_S: u64 = 86_400;

fn default_priority() -> u8 {
    DEFAULT_PRIORITY
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_S
}

/// Classified unit of work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Atom {
    pub id: String,
    #[serde(alias = "g")]
    pub group: PacketGroup,
    #[serde(alias = "e")]
    pub element: String,
    #[serde(default, alias = "d")]
    pub data: Value,
    #[serde(default = "default_priority")]
    pub priority: u8,
    #[serde(default = "default_timeout")]
    pub timeout_s: u64,
    /// Milliseconds since the Unix epoch
    #[serde(default)]
    pub timestamp: u64,
}

impl Atom {
    /// Create an atom with default priority and timeout
    pub fn new(
        id: impl Into<String>,
        group: PacketGroup,
        element: impl Into<String>,
        data: Value,
    ) -> Self {
        Self {
            id: id.into(),
            group,
            element: element.into(),
            data,
            priority: DEFAULT_PRIORITY,
            timeout_s: DEFAULT_TIMEOUT_S,
            timestamp: current_timestamp_ms(),
        }
    }

    /// Create an atom with a freshly generated id
    pub fn generate(group: PacketGroup, element: impl Into<String>, data: Value) -> Self {
        Self::new(
            format!("atom-{}", Uuid::new_v4().simple()),
            group,
            element,
            data,
        )
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_timeout(mut self, timeout_s: u64) -> Self {
        self.timeout_s = timeout_s;
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    /// `(group, element)` key as printed in logs, e.g. `cf:ping`
    pub fn key(&self) -> String {
        format!("{}:{}", self.group, self.element)
    }

    /// Id for the n-th nested call issued while handling this atom
    pub fn child_id(&self, n: u32) -> String {
        format!("{}_call_{}", self.id, n)
    }

    /// Derive the atom for the n-th nested call, inheriting group, element,
    /// priority and timeout. Callers usually retarget group/element after.
    pub fn child(&self, n: u32) -> Self {
        Self {
            id: self.child_id(n),
            group: self.group,
            element: self.element.clone(),
            data: Value::Null,
            priority: self.priority,
            timeout_s: self.timeout_s,
            timestamp: current_timestamp_ms(),
        }
    }

    /// Validate client-supplied fields
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(RuntimeError::invalid_atom("atom id must not be empty"));
        }
        if self.element.is_empty() {
            return Err(RuntimeError::invalid_atom(format!(
                "atom {} has an empty element",
                self.id
            )));
        }
        if !(MIN_PRIORITY..=MAX_PRIORITY).contains(&self.priority) {
            return Err(RuntimeError::invalid_atom(format!(
                "atom {} priority {} outside {}..={}",
                self.id, self.priority, MIN_PRIORITY, MAX_PRIORITY
            )));
        }
        if self.timeout_s == 0 || self.timeout_s > MAX_TIMEOUT_S {
            return Err(RuntimeError::invalid_atom(format!(
                "atom {} timeout_s {} outside 1..={}",
                self.id, self.timeout_s, MAX_TIMEOUT_S
            )));
        }
        Ok(())
    }
}
