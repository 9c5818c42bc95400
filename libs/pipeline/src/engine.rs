//! Pipeline Engine
//!
//! Runs a [`Pipeline`] one step at a time through an [`AtomExecutor`]. Each
//! step becomes an atom `<pipeline_id>_step_<n>` whose data is the running
//! result merged with the step's static data; its result feeds the next step.
//!
//! The first failure stops the run. Steps already executed are not rolled
//! back. The pipeline `timeout_s` is one budget for the whole run: each step
//! atom gets at most what is left of it.

use crate::definition::{Pipeline, PipelineStep};
use reactor::AtomExecutor;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use types::{Atom, ErrorCategory, RuntimeError};

/// One executed step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepTrace {
    /// 1-based position in the pipeline
    pub step: usize,
    pub atom_id: String,
    pub element: String,
    pub success: bool,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Why a run stopped
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepFailure {
    /// Failed step, or 0 when the definition was rejected before running
    pub step: usize,
    pub code: String,
    pub category: ErrorCategory,
    pub message: String,
    pub retryable: bool,
}

impl StepFailure {
    fn new(step: usize, err: &RuntimeError) -> Self {
        Self {
            step,
            code: err.code().to_string(),
            category: err.category(),
            message: err.to_string(),
            retryable: err.is_retryable(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineResult {
    pub pipeline_id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    pub completed_steps: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<StepFailure>,
    pub trace: Vec<StepTrace>,
    pub total_duration_ms: u64,
}

/// Step input: the running result as the base, static keys win.
///
/// A running value that is not an object is placed under `"input"`; static
/// data that is not an object is placed under `"params"`.
pub fn merge_step_data(running: &Value, static_data: &Value) -> Value {
    let mut merged = match running {
        Value::Object(map) => map.clone(),
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("input".to_string(), other.clone());
            map
        }
    };
    match static_data {
        Value::Object(map) => {
            for (key, value) in map {
                merged.insert(key.clone(), value.clone());
            }
        }
        Value::Null => {}
        other => {
            merged.insert("params".to_string(), other.clone());
        }
    }
    Value::Object(merged)
}

pub struct PipelineEngine<E> {
    executor: E,
}

impl<E: AtomExecutor> PipelineEngine<E> {
    pub fn new(executor: E) -> Self {
        Self { executor }
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub async fn execute(&self, pipeline: &Pipeline, input: Value) -> PipelineResult {
        let started = Instant::now();
        let deadline = match pipeline.validate().map_err(RuntimeError::from).and_then(|()| {
            started
                .checked_add(Duration::from_secs(pipeline.timeout_s))
                .ok_or_else(|| RuntimeError::invalid_atom("pipeline deadline overflows the clock"))
        }) {
            Ok(deadline) => deadline,
            Err(err) => {
                warn!(pipeline_id = %pipeline.id, error = %err, "Pipeline rejected");
                return PipelineResult {
                    pipeline_id: pipeline.id.clone(),
                    success: false,
                    result: None,
                    completed_steps: 0,
                    error: Some(StepFailure::new(0, &err)),
                    trace: Vec::new(),
                    total_duration_ms: 0,
                };
            }
        };
        let mut running = input;
        let mut trace = Vec::with_capacity(pipeline.steps.len());

        info!(
            pipeline_id = %pipeline.id,
            steps = pipeline.steps.len(),
            timeout_s = pipeline.timeout_s,
            "Pipeline started"
        );

        for (offset, step) in pipeline.steps.iter().enumerate() {
            let index = offset + 1;
            let atom_id = pipeline.step_atom_id(index);
            let step_started = Instant::now();

            match self.run_step(pipeline, step, &atom_id, &running, deadline).await {
                Ok(result) => {
                    let duration_ms = step_started.elapsed().as_millis() as u64;
                    debug!(
                        pipeline_id = %pipeline.id,
                        atom_id = %atom_id,
                        element = %step.element,
                        duration_ms,
                        "Pipeline step completed"
                    );
                    trace.push(StepTrace {
                        step: index,
                        atom_id,
                        element: step.element.clone(),
                        success: true,
                        duration_ms,
                        error: None,
                    });
                    running = result;
                }
                Err(err) => {
                    let total_duration_ms = started.elapsed().as_millis() as u64;
                    warn!(
                        pipeline_id = %pipeline.id,
                        atom_id = %atom_id,
                        element = %step.element,
                        completed_steps = offset,
                        error = %err,
                        "Pipeline step failed"
                    );
                    trace.push(StepTrace {
                        step: index,
                        atom_id,
                        element: step.element.clone(),
                        success: false,
                        duration_ms: step_started.elapsed().as_millis() as u64,
                        error: Some(err.to_string()),
                    });
                    return PipelineResult {
                        pipeline_id: pipeline.id.clone(),
                        success: false,
                        result: None,
                        completed_steps: offset,
                        error: Some(StepFailure::new(index, &err)),
                        trace,
                        total_duration_ms,
                    };
                }
            }
        }

        let total_duration_ms = started.elapsed().as_millis() as u64;
        info!(
            pipeline_id = %pipeline.id,
            steps = pipeline.steps.len(),
            duration_ms = total_duration_ms,
            "Pipeline completed"
        );
        PipelineResult {
            pipeline_id: pipeline.id.clone(),
            success: true,
            result: Some(running),
            completed_steps: pipeline.steps.len(),
            error: None,
            trace,
            total_duration_ms,
        }
    }

    async fn run_step(
        &self,
        pipeline: &Pipeline,
        step: &PipelineStep,
        atom_id: &str,
        running: &Value,
        deadline: Instant,
    ) -> Result<Value, RuntimeError> {
        let budget = Duration::from_secs(pipeline.timeout_s);
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(RuntimeError::timeout(
                format!("pipeline {}", pipeline.id),
                budget,
            ));
        }

        // Atom deadlines are whole seconds; the outer timeout_at is exact
        let mut timeout_s = remaining.as_secs_f64().ceil() as u64;
        if let Some(cap) = step.timeout_s {
            timeout_s = timeout_s.min(cap);
        }
        let atom = Atom::new(
            atom_id,
            step.group,
            step.element.clone(),
            merge_step_data(running, &step.data),
        )
        .with_timeout(timeout_s.max(1));

        match tokio::time::timeout_at(deadline, self.executor.execute(atom)).await {
            Ok(outcome) => outcome.map(|outcome| outcome.result),
            Err(_) => Err(RuntimeError::timeout(
                format!("pipeline {}", pipeline.id),
                budget,
            )),
        }
    }
}
