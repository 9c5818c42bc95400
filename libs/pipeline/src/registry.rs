//! Named pipeline definitions

use crate::definition::Pipeline;
use crate::engine::{PipelineEngine, PipelineResult};
use crate::error::{PipelineError, Result};
use dashmap::DashMap;
use reactor::AtomExecutor;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

/// Stores validated pipelines by id and runs them on one engine
pub struct PipelineRegistry<E> {
    engine: PipelineEngine<E>,
    pipelines: DashMap<String, Arc<Pipeline>>,
}

impl<E: AtomExecutor> PipelineRegistry<E> {
    pub fn new(engine: PipelineEngine<E>) -> Self {
        Self {
            engine,
            pipelines: DashMap::new(),
        }
    }

    pub fn engine(&self) -> &PipelineEngine<E> {
        &self.engine
    }

    /// Add or replace a definition; returns true when it replaced one
    pub fn register(&self, pipeline: Pipeline) -> Result<bool> {
        pipeline.validate()?;
        let id = pipeline.id.clone();
        let steps = pipeline.steps.len();
        let replaced = self.pipelines.insert(id.clone(), Arc::new(pipeline)).is_some();
        info!(pipeline_id = %id, steps, replaced, "Pipeline registered");
        Ok(replaced)
    }

    pub fn unregister(&self, id: &str) -> Option<Arc<Pipeline>> {
        self.pipelines.remove(id).map(|(_, pipeline)| pipeline)
    }

    pub fn get(&self, id: &str) -> Option<Arc<Pipeline>> {
        self.pipelines.get(id).map(|entry| entry.value().clone())
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.pipelines.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }

    pub async fn execute(&self, id: &str, input: Value) -> Result<PipelineResult> {
        let pipeline = self
            .get(id)
            .ok_or_else(|| PipelineError::NotFound(id.to_string()))?;
        Ok(self.engine.execute(&pipeline, input).await)
    }

    /// Run with the budget clipped to `max_timeout_s`, for callers that are
    /// themselves under a deadline
    pub async fn execute_within(
        &self,
        id: &str,
        input: Value,
        max_timeout_s: u64,
    ) -> Result<PipelineResult> {
        let pipeline = self
            .get(id)
            .ok_or_else(|| PipelineError::NotFound(id.to_string()))?;
        if pipeline.timeout_s <= max_timeout_s {
            return Ok(self.engine.execute(&pipeline, input).await);
        }
        let clipped = Pipeline::clone(&pipeline).with_timeout(max_timeout_s.max(1));
        Ok(self.engine.execute(&clipped, input).await)
    }
}
