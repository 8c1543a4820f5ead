// Data Model Module
// Plans, stages, retry policies, results, artifacts, and metrics

pub mod plan;
pub mod result;

// Re-export key types
pub use plan::{ExecutionPlan, ExecutionStage, RetryPolicy};
pub use result::{
    Artifact, ExecutionResult, ExecutionStatus, PlanMetrics, StageError, StageErrorKind,
    StageMetrics, StageResult,
};
