// Plan Engine
// Top-level orchestration: graph construction, level fan-out, reporting

use crate::execution::context::ExecutionContext;
use crate::execution::events::{EventSender, ExecutionEvent, ProgressSender};
use crate::execution::executor::StageExecutor;
use crate::execution::graph::DependencyGraph;
use crate::execution::metrics;
use crate::execution::state::{ExecutionState, ExecutionTracker};
use crate::model::{
    ExecutionPlan, ExecutionResult, ExecutionStatus, StageError, StageResult,
};
use crate::plugin::{Plugin, PluginRegistry};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default per-stage time budget (5 minutes)
pub const DEFAULT_STAGE_TIMEOUT_SECS: u64 = 300;

/// Configuration for a plan engine instance
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Applied to stages that declare no timeout of their own
    pub default_stage_timeout: Duration,
    /// Accepted for configuration compatibility (0 = unlimited).
    /// Fan-out within a level is currently bounded only by the plan's
    /// own graph shape, not by this value.
    pub max_concurrent_stages: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_stage_timeout: Duration::from_secs(DEFAULT_STAGE_TIMEOUT_SECS),
            max_concurrent_stages: 0,
        }
    }
}

/// Plan execution engine.
///
/// Owns its plugin registry and active-plan tracker; multiple engine
/// instances coexist without shared state. Callers always receive a
/// structured `ExecutionResult` from `execute_plan`: failures are
/// normalized, never raised.
pub struct PlanEngine {
    registry: Arc<PluginRegistry>,
    tracker: Arc<ExecutionTracker>,
    executor: Arc<StageExecutor>,
    config: EngineConfig,
    event_tx: Option<ProgressSender>,
}

impl PlanEngine {
    /// Create an engine with the default configuration
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// Create an engine with the given configuration
    pub fn with_config(config: EngineConfig) -> Self {
        let registry = Arc::new(PluginRegistry::new());
        let tracker = Arc::new(ExecutionTracker::new());
        let executor = Arc::new(StageExecutor::new(
            Arc::clone(&registry),
            Arc::clone(&tracker),
            config.default_stage_timeout,
        ));
        Self {
            registry,
            tracker,
            executor,
            config,
            event_tx: None,
        }
    }

    /// Set progress event sender
    pub fn with_progress(mut self, tx: ProgressSender) -> Self {
        self.executor = Arc::new(
            StageExecutor::new(
                Arc::clone(&self.registry),
                Arc::clone(&self.tracker),
                self.config.default_stage_timeout,
            )
            .with_progress(tx.clone()),
        );
        self.event_tx = Some(tx);
        self
    }

    /// Register a plugin under its manifest name
    pub fn register_plugin(&self, plugin: Arc<dyn Plugin>) {
        self.registry.register(plugin);
    }

    /// Names of all registered plugins
    pub fn plugin_names(&self) -> Vec<String> {
        self.registry.names()
    }

    /// Ids of plans currently in progress
    pub fn active_executions(&self) -> Vec<String> {
        self.tracker.active_ids()
    }

    /// Status snapshot of an active plan, or `None` once it completed
    /// or was cancelled
    pub fn execution_status(&self, plan_id: &str) -> Option<ExecutionStatus> {
        self.tracker.status(plan_id)
    }

    /// Advisory cancellation of an active plan. Stages already
    /// dispatched keep running detached; no further level starts.
    pub fn cancel_execution(&self, plan_id: &str) -> bool {
        let cancelled = self.tracker.cancel(plan_id);
        if cancelled {
            info!(plan_id = %plan_id, "execution cancelled");
            self.event_tx.send_event(ExecutionEvent::PlanCancelled {
                plan_id: plan_id.to_string(),
            });
        }
        cancelled
    }

    /// Execute a plan to completion and return a structured report.
    ///
    /// Levels run strictly in order; stages within a level fan out
    /// concurrently and are always joined in full before their results
    /// are folded into plan state. Whatever the outcome, the plan is
    /// removed from the active registry before this returns.
    pub async fn execute_plan(&self, plan: ExecutionPlan) -> ExecutionResult {
        let started = Instant::now();
        let plan_id = plan.id.clone();
        info!(plan_id = %plan_id, stages = plan.stages.len(), "executing plan");

        let state = ExecutionState::new(plan.clone());
        let cancel = state.cancel.clone();
        self.tracker.insert(state);

        let (results, error) = self.run_levels(&plan, &cancel).await;

        // Guaranteed cleanup, whatever happened above. A cancelled
        // plan's tracker entry is already gone, so fall back to folding
        // artifacts from the stage results that were still joined.
        let artifacts = match self.tracker.remove(&plan_id) {
            Some(state) => state.artifacts,
            None => results
                .values()
                .filter(|r| r.success)
                .flat_map(|r| r.artifacts.iter().cloned())
                .collect(),
        };

        let total_duration = started.elapsed();
        let metrics = metrics::aggregate(&results, total_duration);
        let success = error.is_none() && results.values().all(|r| r.success);

        info!(
            plan_id = %plan_id,
            success,
            stages = results.len(),
            duration_ms = total_duration.as_millis() as u64,
            "plan execution finished"
        );
        self.event_tx.send_event(ExecutionEvent::plan_completed(
            &plan_id,
            success,
            total_duration,
        ));

        ExecutionResult {
            success,
            plan_id,
            results,
            artifacts,
            metrics,
            error,
        }
    }

    /// Run all levels, returning every terminal stage result gathered
    /// and the fatal error (if any) that stopped the plan
    async fn run_levels(
        &self,
        plan: &ExecutionPlan,
        cancel: &CancellationToken,
    ) -> (HashMap<String, StageResult>, Option<StageError>) {
        let mut results: HashMap<String, StageResult> = HashMap::new();

        let graph = match DependencyGraph::from_plan(plan) {
            Ok(graph) => graph,
            Err(error) => return (results, Some(error)),
        };
        // A cycle is fatal before any plugin runs
        let levels = match graph.levels() {
            Ok(levels) => levels,
            Err(error) => return (results, Some(error)),
        };

        self.event_tx.send_event(ExecutionEvent::plan_started(
            &plan.id,
            plan.stages.len(),
            levels.len(),
        ));

        let mut base_ctx = ExecutionContext::base(&plan.id);

        for (level_idx, level) in levels.iter().enumerate() {
            if cancel.is_cancelled() || !self.tracker.contains(&plan.id) {
                debug!(plan_id = %plan.id, level = level_idx, "plan cancelled before level dispatch");
                return (results, Some(StageError::cancelled(&plan.id)));
            }

            let stage_ids: Vec<String> = level.iter().map(|s| s.id.clone()).collect();
            debug!(plan_id = %plan.id, level = level_idx, stages = ?stage_ids, "dispatching level");
            self.event_tx.send_event(ExecutionEvent::level_started(
                &plan.id,
                level_idx,
                stage_ids,
            ));

            // Fan out every stage in the level concurrently.
            // TODO: bound the fan-out with a semaphore once
            // max_concurrent_stages is enforced
            let mut handles = Vec::with_capacity(level.len());
            for stage in level {
                let executor = Arc::clone(&self.executor);
                let stage = (*stage).clone();
                let ctx = base_ctx.clone();
                let token = cancel.clone();
                let stage_id = stage.id.clone();
                handles.push((
                    stage_id,
                    tokio::spawn(async move { executor.execute(stage, ctx, token).await }),
                ));
            }

            // Join every outcome before acting on any failure; one
            // stage's failure never hides its siblings' results
            let mut fatal: Option<StageError> = None;
            for (stage_id, handle) in handles {
                let result = match handle.await {
                    Ok(result) => result,
                    Err(join_err) => StageResult::failure(
                        StageError::execution(format!("stage '{stage_id}' task panicked"))
                            .with_cause(join_err.to_string()),
                    ),
                };

                if result.success {
                    if let Some(output) = &result.output {
                        base_ctx.record_intermediate(&stage_id, output.clone());
                    }
                    self.tracker.with_state(&plan.id, |state| {
                        state.record_success(&stage_id, result.clone());
                    });
                } else {
                    self.tracker.with_state(&plan.id, |state| {
                        state.record_failure(&stage_id);
                    });
                    if let Some(error) = &result.error {
                        if !error.retryable && fatal.is_none() {
                            fatal = Some(error.clone());
                        }
                    }
                }

                results.insert(stage_id, result);
            }

            // A non-retryable terminal failure aborts the remaining
            // levels; results gathered so far are preserved
            if let Some(error) = fatal {
                warn!(plan_id = %plan.id, code = error.code(), "aborting plan after fatal stage failure");
                return (results, Some(error));
            }
        }

        (results, None)
    }
}

impl Default for PlanEngine {
    fn default() -> Self {
        Self::new()
    }
}
