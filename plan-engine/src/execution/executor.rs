// Stage Executor
// Runs one stage's plugin under a time budget with bounded retries

use crate::execution::context::ExecutionContext;
use crate::execution::events::{EventSender, ExecutionEvent, ProgressSender};
use crate::execution::state::ExecutionTracker;
use crate::model::{ExecutionStage, StageError, StageMetrics, StageResult};
use crate::plugin::PluginRegistry;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use std::sync::Arc;
use std::time::{Duration, Instant};

/// Executes single stages: plugin resolution, context preparation,
/// timeout enforcement, and retry policy application
pub struct StageExecutor {
    registry: Arc<PluginRegistry>,
    tracker: Arc<ExecutionTracker>,
    default_timeout: Duration,
    event_tx: Option<ProgressSender>,
}

impl StageExecutor {
    pub fn new(
        registry: Arc<PluginRegistry>,
        tracker: Arc<ExecutionTracker>,
        default_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            tracker,
            default_timeout,
            event_tx: None,
        }
    }

    /// Set progress event sender
    pub fn with_progress(mut self, tx: ProgressSender) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// Execute a stage to its terminal result.
    ///
    /// Each attempt races the plugin call against the stage's time
    /// budget. A timed-out attempt is abandoned, not aborted: the
    /// plugin task keeps running detached with its cancellation token
    /// signalled, and its eventual result is discarded. Failed attempts
    /// are re-dispatched while the stage's retry policy permits.
    pub async fn execute(
        &self,
        stage: ExecutionStage,
        base_ctx: ExecutionContext,
        cancel: CancellationToken,
    ) -> StageResult {
        let plan_id = base_ctx.plan_id.clone();

        let plugin = match self.registry.resolve(&stage.plugin) {
            Some(plugin) => plugin,
            None => {
                warn!(plan_id = %plan_id, stage_id = %stage.id, plugin = %stage.plugin, "plugin not registered");
                let error = StageError::plugin_not_found(&stage.plugin);
                self.event_tx.send_event(ExecutionEvent::stage_completed(
                    &plan_id,
                    &stage.id,
                    false,
                    Duration::ZERO,
                ));
                return StageResult::failure(error).with_metrics(StageMetrics {
                    error_count: 1,
                    ..StageMetrics::default()
                });
            }
        };

        let max_attempts = stage.retry_policy.max_attempts.max(1);
        let budget = stage.timeout.unwrap_or(self.default_timeout);
        let mut attempt = 0u32;
        let mut retries = 0u64;

        loop {
            attempt += 1;

            let artifacts = self
                .tracker
                .with_state(&plan_id, |state| state.dependency_artifacts(&stage))
                .unwrap_or_default();
            let ctx = base_ctx.for_stage(&stage.id, attempt, artifacts);

            self.tracker.with_state(&plan_id, |state| {
                state.running.insert(stage.id.clone());
            });
            self.event_tx
                .send_event(ExecutionEvent::stage_started(&plan_id, &stage.id, attempt));
            debug!(plan_id = %plan_id, stage_id = %stage.id, attempt, "dispatching stage attempt");

            let started = Instant::now();
            let attempt_cancel = cancel.child_token();
            let plugin_call = {
                let plugin = Arc::clone(&plugin);
                let token = attempt_cancel.clone();
                tokio::spawn(async move { plugin.execute(ctx, token).await })
            };

            let outcome = tokio::time::timeout(budget, plugin_call).await;

            self.tracker.with_state(&plan_id, |state| {
                state.running.remove(&stage.id);
            });
            let duration = started.elapsed();

            let (error, mut metrics) = match outcome {
                // Timer fired first. The plugin task is left running
                // detached; signalling the token lets compliant plugins
                // stop their own work, and any late result is discarded.
                Err(_) => {
                    attempt_cancel.cancel();
                    warn!(plan_id = %plan_id, stage_id = %stage.id, attempt, ?budget, "stage attempt timed out");
                    (StageError::timeout(&stage.id, budget), StageMetrics::default())
                }
                // The plugin task panicked or was aborted externally
                Ok(Err(join_err)) => (
                    StageError::execution(format!(
                        "plugin '{}' task aborted unexpectedly",
                        stage.plugin
                    ))
                    .with_cause(join_err.to_string()),
                    StageMetrics::default(),
                ),
                Ok(Ok(Ok(mut result))) => {
                    result.metrics.duration = duration;
                    if result.success {
                        result.metrics.retry_count = retries;
                        self.event_tx.send_event(ExecutionEvent::stage_completed(
                            &plan_id, &stage.id, true, duration,
                        ));
                        return result;
                    }
                    let error = result.error.take().unwrap_or_else(|| {
                        StageError::execution("plugin reported failure without error detail")
                    });
                    (error, result.metrics)
                }
                // Unstructured escape from the plugin call; the wrapper
                // is always classified retryable regardless of cause
                Ok(Ok(Err(e))) => (
                    StageError::execution(format!("plugin '{}' failed: {e}", stage.plugin)),
                    StageMetrics::default(),
                ),
            };

            let may_retry = attempt < max_attempts
                && error.retryable
                && stage.retry_policy.allows(error.code())
                && !cancel.is_cancelled();

            if !may_retry {
                metrics.duration = duration;
                metrics.error_count += 1;
                metrics.retry_count = retries;
                warn!(
                    plan_id = %plan_id,
                    stage_id = %stage.id,
                    code = error.code(),
                    attempts = attempt,
                    "stage failed terminally"
                );
                self.event_tx.send_event(ExecutionEvent::stage_completed(
                    &plan_id, &stage.id, false, duration,
                ));
                return StageResult::failure(error).with_metrics(metrics);
            }

            retries += 1;
            debug!(plan_id = %plan_id, stage_id = %stage.id, code = error.code(), next_attempt = attempt + 1, "retrying stage");
            self.event_tx.send_event(ExecutionEvent::stage_retrying(
                &plan_id,
                &stage.id,
                attempt + 1,
                error.code(),
            ));
        }
    }
}
