// Plan Engine Library
// DAG-based plan execution with pluggable stage workers, per-stage
// timeouts, retry policies, artifact routing, and metrics aggregation

pub mod execution;
pub mod model;
pub mod plugin;

// Re-export commonly used types
pub use execution::{
    progress_channel, EngineConfig, EventSender, ExecutionContext, ExecutionEvent, PlanEngine,
    ProgressReceiver, ProgressSender, StageData,
};
pub use model::{
    Artifact, ExecutionPlan, ExecutionResult, ExecutionStage, ExecutionStatus, PlanMetrics,
    RetryPolicy, StageError, StageErrorKind, StageMetrics, StageResult,
};
pub use plugin::{CancellationToken, Plugin, PluginError, PluginManifest, PluginRegistry};
