// Result Model
// Stage and plan outcomes: artifacts, classified errors, and metrics

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use std::collections::HashMap;
use std::time::Duration;

/// Opaque output payload produced by a stage and routed to its dependents.
/// Identity and schema are plugin-defined; the engine never inspects `data`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    /// Plugin-assigned identifier
    pub id: String,
    /// Plugin-defined content kind (e.g. "web-page", "entity-list")
    pub kind: String,
    /// Arbitrary payload
    pub data: Value,
}

impl Artifact {
    pub fn new(id: impl Into<String>, kind: impl Into<String>, data: Value) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            data,
        }
    }
}

/// Classification of a stage failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageErrorKind {
    /// The plan's dependency graph contains a cycle
    CircularDependency,
    /// A stage names a dependency that is not part of the plan
    MissingDependency,
    /// No plugin registered under the stage's plugin name
    PluginNotFound,
    /// The stage's attempt outlived its time budget
    ExecutionTimeout,
    /// An unstructured error escaped the plugin call
    StageExecution,
    /// The plan was cancelled while this stage was pending
    ExecutionCancelled,
    /// Plugin-supplied classification code from a structured failure
    Plugin(String),
}

impl StageErrorKind {
    /// String code retry policies match against
    pub fn code(&self) -> &str {
        match self {
            Self::CircularDependency => "CIRCULAR_DEPENDENCY",
            Self::MissingDependency => "MISSING_DEPENDENCY",
            Self::PluginNotFound => "PLUGIN_NOT_FOUND",
            Self::ExecutionTimeout => "EXECUTION_TIMEOUT",
            Self::StageExecution => "STAGE_EXECUTION_ERROR",
            Self::ExecutionCancelled => "EXECUTION_CANCELLED",
            Self::Plugin(code) => code,
        }
    }
}

/// A classified stage failure carrying retry eligibility and an optional cause
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("{}: {}", .kind.code(), .message)]
pub struct StageError {
    pub kind: StageErrorKind,
    pub message: String,
    /// Whether the error classification itself permits retry; the stage's
    /// policy must additionally list the code (or the wildcard)
    pub retryable: bool,
    /// Underlying cause, rendered to a string
    pub cause: Option<String>,
}

impl StageError {
    /// Cycle discovered during graph construction; fatal, never retried
    pub fn circular_dependency(stage_id: &str) -> Self {
        Self {
            kind: StageErrorKind::CircularDependency,
            message: format!("circular dependency involving stage '{stage_id}'"),
            retryable: false,
            cause: None,
        }
    }

    /// Dependency naming no stage in the plan; fatal, never retried
    pub fn missing_dependency(stage_id: &str, dependency: &str) -> Self {
        Self {
            kind: StageErrorKind::MissingDependency,
            message: format!("stage '{stage_id}' depends on unknown stage '{dependency}'"),
            retryable: false,
            cause: None,
        }
    }

    /// No plugin registered under the given name; fatal for the plan
    pub fn plugin_not_found(name: &str) -> Self {
        Self {
            kind: StageErrorKind::PluginNotFound,
            message: format!("no plugin registered under name '{name}'"),
            retryable: false,
            cause: None,
        }
    }

    /// Attempt exceeded its time budget; classified retryable
    pub fn timeout(stage_id: &str, budget: Duration) -> Self {
        Self {
            kind: StageErrorKind::ExecutionTimeout,
            message: format!("stage '{stage_id}' timed out after {budget:?}"),
            retryable: true,
            cause: None,
        }
    }

    /// Wrapper for an unstructured error escaping a plugin call.
    /// Always classified retryable, regardless of the underlying cause;
    /// a plugin that wants a terminal failure must return a structured
    /// result with `retryable: false`.
    pub fn execution(message: impl Into<String>) -> Self {
        Self {
            kind: StageErrorKind::StageExecution,
            message: message.into(),
            retryable: true,
            cause: None,
        }
    }

    /// Plan cancelled before the stage reached a terminal outcome
    pub fn cancelled(plan_id: &str) -> Self {
        Self {
            kind: StageErrorKind::ExecutionCancelled,
            message: format!("execution of plan '{plan_id}' was cancelled"),
            retryable: false,
            cause: None,
        }
    }

    /// Structured plugin failure with a plugin-chosen code and retry flag
    pub fn plugin(code: impl Into<String>, message: impl Into<String>, retryable: bool) -> Self {
        Self {
            kind: StageErrorKind::Plugin(code.into()),
            message: message.into(),
            retryable,
            cause: None,
        }
    }

    /// Attach the underlying cause
    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    /// String code retry policies match against
    pub fn code(&self) -> &str {
        self.kind.code()
    }
}

/// Metrics recorded for one stage's terminal result
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageMetrics {
    /// Duration of the final attempt
    #[serde(default)]
    pub duration: Duration,
    /// Peak memory attributed by the plugin, in bytes
    #[serde(default)]
    pub memory_bytes: u64,
    /// Outbound API calls made by the plugin
    #[serde(default)]
    pub api_calls: u64,
    /// Failures observed while producing this result
    #[serde(default)]
    pub error_count: u64,
    /// Retries consumed before the terminal outcome
    #[serde(default)]
    pub retry_count: u64,
    /// Plugin-defined counters, sum-merged at the plan level
    #[serde(default)]
    pub custom: HashMap<String, f64>,
}

/// Terminal outcome of one stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageResult {
    pub success: bool,
    /// Plugin output, exposed to dependents as an intermediate result
    pub output: Option<Value>,
    /// Artifacts routed to dependent stages
    pub artifacts: Vec<Artifact>,
    pub error: Option<StageError>,
    pub metrics: StageMetrics,
}

impl StageResult {
    /// Successful result with the given output
    pub fn success(output: Option<Value>) -> Self {
        Self {
            success: true,
            output,
            artifacts: Vec::new(),
            error: None,
            metrics: StageMetrics::default(),
        }
    }

    /// Failed result carrying a classified error
    pub fn failure(error: StageError) -> Self {
        Self {
            success: false,
            output: None,
            artifacts: Vec::new(),
            error: Some(error),
            metrics: StageMetrics::default(),
        }
    }

    /// Attach produced artifacts
    pub fn with_artifacts(mut self, artifacts: Vec<Artifact>) -> Self {
        self.artifacts = artifacts;
        self
    }

    /// Attach recorded metrics
    pub fn with_metrics(mut self, metrics: StageMetrics) -> Self {
        self.metrics = metrics;
        self
    }
}

/// Plan-level metrics folded from all stage results
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanMetrics {
    /// Longest single-stage duration; stages in a level run concurrently,
    /// so stage durations are not additive
    pub duration: Duration,
    /// Wall-clock time from submission to return
    pub total_duration: Duration,
    pub memory_bytes: u64,
    pub api_calls: u64,
    pub error_count: u64,
    pub retry_count: u64,
    /// Key-wise sums of plugin-defined counters
    pub custom: HashMap<String, f64>,
}

/// Outcome of one `execute_plan` call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub plan_id: String,
    /// Terminal results for every stage that reached one, including
    /// failures gathered before an abort
    pub results: HashMap<String, StageResult>,
    /// Aggregate artifacts from all successful stages
    pub artifacts: Vec<Artifact>,
    pub metrics: PlanMetrics,
    pub error: Option<StageError>,
}

/// Point-in-time snapshot of an active plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionStatus {
    pub total_stages: usize,
    pub completed: Vec<String>,
    pub failed: Vec<String>,
    pub running: Vec<String>,
    pub artifacts: Vec<Artifact>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            StageError::circular_dependency("a").code(),
            "CIRCULAR_DEPENDENCY"
        );
        assert_eq!(
            StageError::plugin_not_found("x").code(),
            "PLUGIN_NOT_FOUND"
        );
        assert_eq!(
            StageError::timeout("a", Duration::from_secs(1)).code(),
            "EXECUTION_TIMEOUT"
        );
        assert_eq!(StageError::execution("boom").code(), "STAGE_EXECUTION_ERROR");
        assert_eq!(
            StageError::plugin("PLUGIN_ERROR", "bad input", false).code(),
            "PLUGIN_ERROR"
        );
    }

    #[test]
    fn test_retryable_classification() {
        assert!(StageError::timeout("a", Duration::from_secs(1)).retryable);
        assert!(StageError::execution("anything").retryable);
        assert!(!StageError::plugin_not_found("x").retryable);
        assert!(!StageError::circular_dependency("a").retryable);
        assert!(!StageError::plugin("PLUGIN_ERROR", "fatal", false).retryable);
    }

    #[test]
    fn test_error_display_carries_code() {
        let err = StageError::timeout("fetch", Duration::from_millis(5));
        let rendered = err.to_string();
        assert!(rendered.starts_with("EXECUTION_TIMEOUT:"));
        assert!(rendered.contains("fetch"));
    }

    #[test]
    fn test_failure_result_shape() {
        let result = StageResult::failure(StageError::plugin("PLUGIN_ERROR", "bad", false));
        assert!(!result.success);
        assert!(result.output.is_none());
        assert_eq!(result.error.as_ref().unwrap().code(), "PLUGIN_ERROR");
    }
}
