//! Handler Registry
//!
//! Concurrent `(group, element) -> handler` table. A key is bound at most
//! once; replacing a binding requires [`HandlerRegistry::hot_swap`].

use crate::handler::{AtomHandler, HandlerLevel, HandlerMetadata};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};
use types::{PacketGroup, Result, RuntimeError};

type HandlerKey = (PacketGroup, String);

/// A bound handler with its metadata
#[derive(Clone)]
pub struct HandlerEntry {
    pub handler: Arc<dyn AtomHandler>,
    pub metadata: HandlerMetadata,
}

/// Listing row returned by `cf:info`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HandlerInfo {
    pub key: String,
    pub group: PacketGroup,
    pub element: String,
    pub level: HandlerLevel,
    pub timeout_s: Option<u64>,
    pub description: String,
}

#[derive(Default)]
pub struct HandlerRegistry {
    handlers: DashMap<HandlerKey, HandlerEntry>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a handler, failing with `DuplicateHandler` if the key is taken
    pub fn register(
        &self,
        group: PacketGroup,
        element: impl Into<String>,
        handler: Arc<dyn AtomHandler>,
        metadata: HandlerMetadata,
    ) -> Result<()> {
        let element = element.into();
        match self.handlers.entry((group, element)) {
            Entry::Occupied(occupied) => {
                let (group, element) = occupied.key();
                Err(RuntimeError::duplicate_handler(group, element.clone()))
            }
            Entry::Vacant(vacant) => {
                debug!(group = %group, element = %vacant.key().1, "Handler registered");
                vacant.insert(HandlerEntry { handler, metadata });
                Ok(())
            }
        }
    }

    /// Bind or replace a handler. Returns true if a previous binding existed.
    ///
    /// Invocations already running keep the handler they started with.
    pub fn hot_swap(
        &self,
        group: PacketGroup,
        element: impl Into<String>,
        handler: Arc<dyn AtomHandler>,
        metadata: HandlerMetadata,
    ) -> bool {
        let element = element.into();
        let replaced = self
            .handlers
            .insert((group, element.clone()), HandlerEntry { handler, metadata })
            .is_some();
        info!(group = %group, element = %element, replaced, "Handler hot-swapped");
        replaced
    }

    /// Remove a binding. Returns true if one existed.
    pub fn unregister(&self, group: PacketGroup, element: &str) -> bool {
        let removed = self
            .handlers
            .remove(&(group, element.to_string()))
            .is_some();
        if removed {
            info!(group = %group, element = %element, "Handler unregistered");
        }
        removed
    }

    pub fn lookup(&self, group: PacketGroup, element: &str) -> Option<HandlerEntry> {
        self.handlers
            .get(&(group, element.to_string()))
            .map(|entry| entry.value().clone())
    }

    pub fn contains(&self, group: PacketGroup, element: &str) -> bool {
        self.handlers.contains_key(&(group, element.to_string()))
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// All bindings sorted by key
    pub fn list(&self) -> Vec<HandlerInfo> {
        let mut rows: Vec<HandlerInfo> = self
            .handlers
            .iter()
            .map(|entry| {
                let (group, element) = entry.key();
                let metadata = &entry.value().metadata;
                HandlerInfo {
                    key: format!("{}:{}", group, element),
                    group: *group,
                    element: element.clone(),
                    level: metadata.level,
                    timeout_s: metadata.timeout_s,
                    description: metadata.description.clone(),
                }
            })
            .collect();
        rows.sort_by(|a, b| a.key.cmp(&b.key));
        rows
    }
}
