// Plan Model
// Execution plans submitted to the engine: stages, dependencies, retry policies

use serde::{Deserialize, Serialize};

use std::time::Duration;

/// A DAG-shaped unit of work submitted for execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPlan {
    /// Plan identifier, unique among active executions
    pub id: String,
    /// Stages forming the dependency graph
    pub stages: Vec<ExecutionStage>,
}

impl ExecutionPlan {
    /// Create a plan from a stage list
    pub fn new(id: impl Into<String>, stages: Vec<ExecutionStage>) -> Self {
        Self {
            id: id.into(),
            stages,
        }
    }
}

/// One node in a plan's graph, bound to a named plugin
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionStage {
    /// Stage identifier, unique within the plan
    pub id: String,
    /// Name of the plugin that performs this stage's work
    pub plugin: String,
    /// Ids of stages whose results feed this stage
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Per-stage timeout; the engine default applies when unset
    #[serde(default)]
    pub timeout: Option<Duration>,
    /// Bounds retry attempts and classifies retryable error codes
    #[serde(default)]
    pub retry_policy: RetryPolicy,
}

impl ExecutionStage {
    /// Create a stage with no dependencies and the default retry policy
    pub fn new(id: impl Into<String>, plugin: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            plugin: plugin.into(),
            dependencies: Vec::new(),
            timeout: None,
            retry_policy: RetryPolicy::default(),
        }
    }

    /// Set the stages this stage depends on
    pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        self.dependencies = dependencies;
        self
    }

    /// Set a per-stage timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the retry policy
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }
}

/// Per-stage retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts allowed (first attempt + retries)
    pub max_attempts: u32,
    /// Error codes eligible for retry; `"*"` matches any retryable error
    #[serde(default)]
    pub retryable_errors: Vec<String>,
}

impl RetryPolicy {
    /// Wildcard matching any retryable error classification
    pub const WILDCARD: &'static str = "*";

    /// Policy allowing `max_attempts` retries of the given error codes
    pub fn new(max_attempts: u32, retryable_errors: Vec<String>) -> Self {
        Self {
            max_attempts,
            retryable_errors,
        }
    }

    /// Whether the policy classifies the given error code as retryable
    pub fn allows(&self, code: &str) -> bool {
        self.retryable_errors
            .iter()
            .any(|c| c == Self::WILDCARD || c == code)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            retryable_errors: Vec::new(),
        }
    }
}
